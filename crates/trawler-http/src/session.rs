//! Per-site session bookkeeping and lifecycle state machine.

use std::collections::HashMap;
use std::sync::RwLock;

/// Lifecycle state of a site session.
///
/// Transitions: `Fresh → Active` on set-credentials; `Active → Expired` on
/// the clock; `Active/Expired → Invalid` on an auth-failure response;
/// `Invalid/Expired → Active` on a successful re-login (incrementing the
/// login count). Requests are only issued from `Active`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No credentials recorded yet.
    #[default]
    Fresh,
    /// Credentials present and unexpired.
    Active,
    /// Past the recorded expiry time.
    Expired,
    /// Last request was rejected as unauthenticated.
    Invalid,
}

/// Credential material and counters for one site.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Session cookie sent verbatim in the `Cookie` header.
    pub cookie: String,
    /// API key for key-authenticated schemas.
    pub api_key: String,
    /// Challenge/session token for Transmission-style endpoints.
    pub session_id: String,
    /// Number of successful (re-)logins.
    pub login_count: u32,
    /// Unix seconds after which the session is stale; 0 means no expiry.
    pub expires_at: i64,
    state: SessionState,
}

impl Session {
    /// Whether any credential is present and the expiry has not passed.
    #[must_use]
    pub fn is_valid(&self, now: i64) -> bool {
        let has_credential =
            !self.cookie.is_empty() || !self.api_key.is_empty() || !self.session_id.is_empty();
        has_credential && (self.expires_at == 0 || self.expires_at > now)
    }

    /// Lifecycle state at `now`, folding the clock into the stored state.
    #[must_use]
    pub fn state_at(&self, now: i64) -> SessionState {
        match self.state {
            SessionState::Active if self.expires_at != 0 && self.expires_at <= now => {
                SessionState::Expired
            }
            other => other,
        }
    }

    fn record_credentials(&mut self, now: i64) {
        // Fold a lapsed expiry in first so a re-login after expiry counts.
        if matches!(
            self.state_at(now),
            SessionState::Invalid | SessionState::Expired
        ) {
            self.login_count += 1;
        }
        self.state = SessionState::Active;
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(0))
}

/// Synchronized map of sessions keyed by site id, lazily populated.
#[derive(Default)]
pub struct SessionPool {
    inner: RwLock<HashMap<String, Session>>,
}

impl SessionPool {
    /// Snapshot of the session for `site`; a default `Fresh` session when
    /// none exists yet.
    #[must_use]
    pub fn get(&self, site: &str) -> Session {
        self.inner
            .read()
            .expect("session pool poisoned")
            .get(site)
            .cloned()
            .unwrap_or_default()
    }

    /// Set the cookie credential, activating the session.
    pub fn set_cookie(&self, site: &str, cookie: &str) {
        let now = unix_now();
        self.mutate(site, |session| {
            session.cookie = cookie.to_string();
            session.record_credentials(now);
        });
    }

    /// Set the API-key credential, activating the session.
    pub fn set_api_key(&self, site: &str, api_key: &str) {
        let now = unix_now();
        self.mutate(site, |session| {
            session.api_key = api_key.to_string();
            session.record_credentials(now);
        });
    }

    /// Set the challenge/session token, activating the session.
    pub fn set_session_id(&self, site: &str, session_id: &str) {
        let now = unix_now();
        self.mutate(site, |session| {
            session.session_id = session_id.to_string();
            session.record_credentials(now);
        });
    }

    /// Record an expiry instant (unix seconds; 0 clears it).
    pub fn set_expires_at(&self, site: &str, expires_at: i64) {
        self.mutate(site, |session| session.expires_at = expires_at);
    }

    /// Mark the session invalid after an authentication failure.
    pub fn mark_invalid(&self, site: &str) {
        self.mutate(site, |session| session.state = SessionState::Invalid);
    }

    /// Composite validity check per the session contract.
    #[must_use]
    pub fn is_valid(&self, site: &str, now: i64) -> bool {
        self.inner
            .read()
            .expect("session pool poisoned")
            .get(site)
            .is_some_and(|session| session.is_valid(now))
    }

    /// Lifecycle state for `site` at `now`.
    #[must_use]
    pub fn state(&self, site: &str, now: i64) -> SessionState {
        self.inner
            .read()
            .expect("session pool poisoned")
            .get(site)
            .map_or(SessionState::Fresh, |session| session.state_at(now))
    }

    fn mutate(&self, site: &str, apply: impl FnOnce(&mut Session)) {
        let mut inner = self.inner.write().expect("session pool poisoned");
        apply(inner.entry(site.to_string()).or_default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_sessions_activate_on_credentials() {
        let pool = SessionPool::default();
        assert_eq!(pool.state("demo", 0), SessionState::Fresh);
        pool.set_cookie("demo", "uid=1; pass=abc");
        assert_eq!(pool.state("demo", 0), SessionState::Active);
        assert_eq!(pool.get("demo").login_count, 0);
        assert!(pool.is_valid("demo", 0));
    }

    #[test]
    fn expiry_is_folded_in_by_the_clock() {
        let pool = SessionPool::default();
        pool.set_api_key("demo", "key");
        pool.set_expires_at("demo", 100);
        assert_eq!(pool.state("demo", 50), SessionState::Active);
        assert_eq!(pool.state("demo", 100), SessionState::Expired);
        assert!(!pool.is_valid("demo", 100));
    }

    #[test]
    fn auth_failure_invalidates_until_relogin() {
        let pool = SessionPool::default();
        pool.set_cookie("demo", "uid=1");
        pool.mark_invalid("demo");
        assert_eq!(pool.state("demo", 0), SessionState::Invalid);
        assert!(pool.is_valid("demo", 0), "credentials still present");

        pool.set_cookie("demo", "uid=1; refreshed");
        assert_eq!(pool.state("demo", 0), SessionState::Active);
        assert_eq!(pool.get("demo").login_count, 1, "re-login counted");
    }

    #[test]
    fn relogin_from_expired_increments_count() {
        let pool = SessionPool::default();
        pool.set_cookie("demo", "uid=1");
        pool.set_expires_at("demo", 10);
        // The stored state only flips on mutation; the clock-derived view
        // already reports Expired.
        assert_eq!(pool.state("demo", 20), SessionState::Expired);
        pool.mark_invalid("demo");
        pool.set_session_id("demo", "token");
        assert_eq!(pool.get("demo").login_count, 1);
    }

    #[test]
    fn validity_requires_any_credential() {
        let session = Session::default();
        assert!(!session.is_valid(0));
        let session = Session {
            session_id: "challenge".to_string(),
            ..Session::default()
        };
        assert!(session.is_valid(0));
    }
}
