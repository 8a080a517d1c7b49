//! Definition-driven multi-step user-info pipeline.
//!
//! Steps run strictly in declared order; each step's parsed fields join an
//! environment that later steps reference through dot-path assertions
//! (`params.id = <field>`). An optional delay between steps keeps the
//! request cadence looking human on sites that rate-limit per session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use scraper::Html;
use tracing::{debug, warn};
use trawler_extract::{Value, select_from_document, select_from_json};
use trawler_site_core::{
    DriverRequest, FieldSelector, HttpExecutor, HttpMethod, ResponseType, SiteDefinition,
    SiteError, SiteResult, UserInfo, UserInfoStep,
};

enum StepBody {
    Document(Box<Html>),
    Json(serde_json::Value),
}

/// Execute the definition's user-info process and materialise a
/// [`UserInfo`] snapshot.
///
/// `auth_headers` are attached to every step request; the driver supplies
/// whatever its schema requires (cookie, API key).
///
/// # Errors
///
/// Surfaces transport errors from the substrate and parse errors for
/// undecodable bodies or unknown filters.
pub async fn run_user_info_pipeline(
    site_id: &str,
    definition: &SiteDefinition,
    http: &Arc<dyn HttpExecutor>,
    auth_headers: &[(String, String)],
) -> SiteResult<UserInfo> {
    let config = definition
        .user_info
        .as_ref()
        .ok_or(SiteError::Unsupported {
            operation: "get_user_info",
        })?;
    let mut env: HashMap<String, Value> = HashMap::new();

    for (index, step) in config.process.iter().enumerate() {
        if index > 0 && config.request_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.request_delay_ms)).await;
        }
        let request = build_step_request(step, &env, auth_headers);
        debug!(site = %site_id, step = index, path = %step.request.path, "user-info step");
        let response = http.execute(site_id, request).await?;

        let body = match step.request.response_type {
            ResponseType::Document => {
                StepBody::Document(Box::new(Html::parse_document(&response.text())))
            }
            ResponseType::Json => StepBody::Json(serde_json::from_slice(&response.body).map_err(
                |_| SiteError::Parse {
                    site: site_id.to_string(),
                    what: "user info",
                    snippet: response.snippet(),
                },
            )?),
        };
        for field in &step.fields {
            let value = extract_field(site_id, &body, field, &config.selectors)?;
            env.insert(field.clone(), value);
        }
    }

    Ok(materialize(site_id, &env))
}

fn build_step_request(
    step: &UserInfoStep,
    env: &HashMap<String, Value>,
    auth_headers: &[(String, String)],
) -> DriverRequest {
    let mut request = if step.request.method.eq_ignore_ascii_case("post") {
        DriverRequest::post(&step.request.path)
    } else {
        DriverRequest::get(&step.request.path)
    };
    for (key, value) in &step.request.params {
        request = request.with_query(key, value);
    }
    let mut form: Vec<(String, String)> = step
        .request
        .data
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    // Assertions merge carried-forward fields into the query or the body.
    for (target, source) in &step.assertions {
        let Some(value) = env.get(source) else {
            warn!(target, source, "assertion source missing from pipeline environment");
            continue;
        };
        match target.split_once('.') {
            Some(("params", key)) => {
                request = request.with_query(key, value.to_str_value());
            }
            Some(("data", key)) => form.push((key.to_string(), value.to_str_value())),
            _ => warn!(target, "unsupported assertion target"),
        }
    }
    if request.method == HttpMethod::Post && !form.is_empty() {
        request = request.with_form(form);
    }
    for (name, value) in auth_headers {
        request = request.with_header(name, value);
    }
    request
}

fn extract_field(
    site_id: &str,
    body: &StepBody,
    field: &str,
    selectors: &HashMap<String, FieldSelector>,
) -> SiteResult<Value> {
    let Some(selector) = selectors.get(field) else {
        warn!(site = %site_id, field, "no selector declared for pipeline field");
        return Ok(Value::Null);
    };
    let extracted = match body {
        StepBody::Document(document) => select_from_document(document, selector),
        StepBody::Json(root) => select_from_json(root, selector),
    };
    extracted.map_err(|err| SiteError::Parse {
        site: site_id.to_string(),
        what: "user info field",
        snippet: format!("{field}: {err}"),
    })
}

fn materialize(site_id: &str, env: &HashMap<String, Value>) -> UserInfo {
    let text = |key: &str| env.get(key).map(Value::to_str_value).unwrap_or_default();
    let unsigned = |key: &str| {
        env.get(key)
            .map(|value| value.to_i64().max(0).unsigned_abs())
            .unwrap_or_default()
    };
    let count = |key: &str| u32::try_from(unsigned(key)).unwrap_or(u32::MAX);
    let float = |key: &str| env.get(key).map(Value::to_f64).unwrap_or_default();
    let stamp = |key: &str| env.get(key).map(Value::to_i64).unwrap_or_default();

    let uploaded = unsigned("uploaded");
    let downloaded = unsigned("downloaded");
    let ratio = if env.contains_key("ratio") {
        float("ratio")
    } else if downloaded == 0 && uploaded > 0 {
        // No recorded download: the site reports an infinite ratio.
        -1.0
    } else if downloaded > 0 {
        #[allow(clippy::cast_precision_loss)]
        let computed = uploaded as f64 / downloaded as f64;
        computed
    } else {
        0.0
    };

    UserInfo {
        site: site_id.to_string(),
        user_id: text("id"),
        username: text("username"),
        level_id: text("level_id"),
        level_name: text("level_name"),
        uploaded,
        downloaded,
        ratio,
        bonus: float("bonus"),
        bonus_per_hour: float("bonus_per_hour"),
        seeding_bonus: float("seeding_bonus"),
        seeding: count("seeding"),
        seeding_size: unsigned("seeding_size"),
        leeching: count("leeching"),
        leeching_size: unsigned("leeching_size"),
        uploads: count("uploads"),
        unread_message_count: count("unread"),
        join_date: stamp("join_date"),
        last_access: stamp("last_access"),
        last_update: chrono::Utc::now().timestamp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use trawler_site_core::{
        DriverResponse, RequestConfig, SiteSchema, UserInfoConfig,
    };

    struct ScriptedExecutor {
        responses: Mutex<Vec<DriverResponse>>,
        seen: Mutex<Vec<DriverRequest>>,
    }

    impl ScriptedExecutor {
        fn new(bodies: Vec<(&str, &str)>) -> Self {
            let responses = bodies
                .into_iter()
                .map(|(content_type, body)| DriverResponse {
                    status: 200,
                    content_type: Some(content_type.to_string()),
                    body: body.as_bytes().to_vec(),
                    final_url: None,
                })
                .collect();
            Self {
                responses: Mutex::new(responses),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            _site: &str,
            request: DriverRequest,
        ) -> SiteResult<DriverResponse> {
            self.seen.lock().expect("seen poisoned").push(request);
            let mut responses = self.responses.lock().expect("responses poisoned");
            if responses.is_empty() {
                return Err(SiteError::NoUrls {
                    site: "scripted".into(),
                });
            }
            Ok(responses.remove(0))
        }
    }

    fn two_step_definition() -> SiteDefinition {
        let mut selectors = HashMap::new();
        selectors.insert(
            "id".to_string(),
            FieldSelector::css(&["a.username"])
                .with_attr("href")
                .with_filter("querystring", &["id"]),
        );
        selectors.insert(
            "username".to_string(),
            FieldSelector::css(&["a.username b"]),
        );
        selectors.insert(
            "uploaded".to_string(),
            FieldSelector::css(&["td.uploaded"]).with_filter("parseSize", &[]),
        );
        selectors.insert(
            "bonus".to_string(),
            FieldSelector::css(&["td.bonus"]).with_filter("parseNumber", &[]),
        );

        let mut step_two_assertions = HashMap::new();
        step_two_assertions.insert("params.id".to_string(), "id".to_string());

        let mut listing_selectors = HashMap::new();
        listing_selectors.insert("title".to_string(), "a b".to_string());
        SiteDefinition {
            selectors: listing_selectors,
            user_info: Some(UserInfoConfig {
                process: vec![
                    UserInfoStep {
                        request: RequestConfig {
                            path: "/index.php".to_string(),
                            ..RequestConfig::default()
                        },
                        assertions: HashMap::new(),
                        fields: vec!["id".to_string(), "username".to_string()],
                    },
                    UserInfoStep {
                        request: RequestConfig {
                            path: "/userdetails.php".to_string(),
                            ..RequestConfig::default()
                        },
                        assertions: step_two_assertions,
                        fields: vec!["uploaded".to_string(), "bonus".to_string()],
                    },
                ],
                selectors,
                pick_last: vec!["uploaded".to_string()],
                request_delay_ms: 0,
            }),
            ..SiteDefinition::new(
                "pipedemo",
                "Pipe Demo",
                SiteSchema::NexusPhp,
                &["https://pipedemo.example.org"],
            )
        }
    }

    #[tokio::test]
    async fn assertions_carry_values_between_steps() {
        let definition = two_step_definition();
        let executor = Arc::new(ScriptedExecutor::new(vec![
            (
                "text/html",
                r#"<html><a class="username" href="userdetails.php?id=42"><b>seeder</b></a></html>"#,
            ),
            (
                "text/html",
                r#"<html><table><tr><td class="uploaded">1.50 TB</td><td class="bonus">12,345</td></tr></table></html>"#,
            ),
        ]));
        let http: Arc<dyn HttpExecutor> = Arc::clone(&executor) as Arc<dyn HttpExecutor>;

        let info = run_user_info_pipeline("pipedemo", &definition, &http, &[])
            .await
            .expect("pipeline");

        let seen = executor.seen.lock().expect("seen poisoned");
        assert_eq!(seen.len(), 2);
        assert!(
            seen[1]
                .query
                .iter()
                .any(|(key, value)| key == "id" && value == "42"),
            "step 2 carries step 1's id: {:?}",
            seen[1].query
        );
        assert_eq!(info.user_id, "42");
        assert_eq!(info.username, "seeder");
        assert_eq!(info.uploaded, 1_649_267_441_664);
        assert!((info.bonus - 12_345.0).abs() < f64::EPSILON);
        assert!(info.is_infinite_ratio(), "no download recorded");
    }

    #[tokio::test]
    async fn json_steps_use_dot_paths() {
        let mut selectors = HashMap::new();
        selectors.insert(
            "username".to_string(),
            FieldSelector::css(&["data.username"]),
        );
        selectors.insert(
            "uploaded".to_string(),
            FieldSelector::css(&["data.uploaded"]),
        );
        let definition = SiteDefinition {
            user_info: Some(UserInfoConfig {
                process: vec![UserInfoStep {
                    request: RequestConfig {
                        path: "/api/member/profile".to_string(),
                        response_type: ResponseType::Json,
                        ..RequestConfig::default()
                    },
                    assertions: HashMap::new(),
                    fields: vec!["username".to_string(), "uploaded".to_string()],
                }],
                selectors,
                pick_last: Vec::new(),
                request_delay_ms: 0,
            }),
            ..SiteDefinition::new(
                "jsondemo",
                "Json Demo",
                SiteSchema::MTorrent,
                &["https://jsondemo.example.org"],
            )
        };
        let executor = Arc::new(ScriptedExecutor::new(vec![(
            "application/json",
            r#"{"data":{"username":"seeder","uploaded":"2048"}}"#,
        )]));
        let http: Arc<dyn HttpExecutor> = executor as Arc<dyn HttpExecutor>;

        let info = run_user_info_pipeline("jsondemo", &definition, &http, &[])
            .await
            .expect("pipeline");
        assert_eq!(info.username, "seeder");
        assert_eq!(info.uploaded, 2048);
    }

    #[tokio::test]
    async fn malformed_json_is_a_parse_error() {
        let definition = SiteDefinition {
            user_info: Some(UserInfoConfig {
                process: vec![UserInfoStep {
                    request: RequestConfig {
                        path: "/api/member/profile".to_string(),
                        response_type: ResponseType::Json,
                        ..RequestConfig::default()
                    },
                    ..UserInfoStep::default()
                }],
                ..UserInfoConfig::default()
            }),
            ..SiteDefinition::new(
                "baddemo",
                "Bad Demo",
                SiteSchema::MTorrent,
                &["https://baddemo.example.org"],
            )
        };
        let executor = Arc::new(ScriptedExecutor::new(vec![("application/json", "<html>")]));
        let http: Arc<dyn HttpExecutor> = executor as Arc<dyn HttpExecutor>;
        let error = run_user_info_pipeline("baddemo", &definition, &http, &[])
            .await
            .unwrap_err();
        assert!(matches!(error, SiteError::Parse { .. }));
    }
}
