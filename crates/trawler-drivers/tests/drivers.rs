//! Integration tests: listing parsers, the factory, and an end-to-end
//! search against the stub server.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use trawler_drivers::{SiteFactory, register_builtin};
use trawler_site_core::{
    DiscountLevel, DriverContext, DriverRequest, DriverResponse, HttpExecutor, SearchQuery,
    SiteConfig, SiteError, SiteResult, SiteSchema, definition_registry, driver_registry,
};
use trawler_test_support::{StubResponse, StubServer, init_test_logging};

struct CannedExecutor {
    body: &'static str,
    content_type: &'static str,
}

#[async_trait]
impl HttpExecutor for CannedExecutor {
    async fn execute(&self, _site: &str, _request: DriverRequest) -> SiteResult<DriverResponse> {
        Ok(DriverResponse {
            status: 200,
            content_type: Some(self.content_type.to_string()),
            body: self.body.as_bytes().to_vec(),
            final_url: None,
        })
    }
}

const NEXUS_LISTING: &str = r#"
<html><body>
<table class="torrents">
  <tr><td class="colhead">Type</td><td class="colhead">Title</td></tr>
  <tr>
    <td><img alt="Movies" src="cat.png"/></td>
    <td>
      <table class="torrentname"><tr><td class="embedded">
        <a href="details.php?id=101&amp;hit=1"><b>Demo.Movie.2024.1080p.WEB-DL</b></a>
        <img class="pro_free" alt="free"/>
        <span title="2030-01-01 00:00:00">free until</span>
        <a href="download.php?id=101">DL</a>
      </td></tr></table>
    </td>
    <td>5</td>
    <td><span title="2024-03-01 12:30:00">1h ago</span></td>
    <td>1.5 GB</td>
    <td>12</td>
    <td>3</td>
    <td>45</td>
  </tr>
  <tr>
    <td><img alt="TV" src="cat.png"/></td>
    <td>
      <table class="torrentname"><tr><td class="embedded">
        <a href="details.php?id=102"><b>Demo.Show.S01.2160p</b></a>
        <a href="download.php?id=102">DL</a>
      </td></tr></table>
    </td>
    <td>0</td>
    <td><span title="2024-03-02 08:00:00">earlier</span></td>
    <td>40.2 GB</td>
    <td>7</td>
    <td>1</td>
    <td>9</td>
  </tr>
</table>
</body></html>
"#;

fn nexus_context(executor: Arc<dyn HttpExecutor>) -> DriverContext {
    register_builtin();
    let definition = definition_registry()
        .get("hdsky")
        .expect("hdsky definition registered");
    let mut config = SiteConfig::new(SiteSchema::NexusPhp, "hdsky");
    config.options = serde_json::json!({"cookie": "uid=1; pass=abc"});
    DriverContext {
        definition,
        config,
        http: executor,
    }
}

#[tokio::test]
async fn nexusphp_listing_parses_rows() -> Result<()> {
    init_test_logging();
    let executor = Arc::new(CannedExecutor {
        body: NEXUS_LISTING,
        content_type: "text/html",
    });
    let context = nexus_context(executor);
    let driver = driver_registry().create(SiteSchema::NexusPhp, context)?;

    let request = driver.prepare_search(&SearchQuery::keyword("demo"))?;
    let response = driver.execute(request).await?;
    let items = driver.parse_search(&response)?;

    assert_eq!(items.len(), 2, "header row skipped");
    let first = &items[0];
    assert_eq!(first.id, "101");
    assert_eq!(first.title, "Demo.Movie.2024.1080p.WEB-DL");
    assert_eq!(first.size_bytes, 1_610_612_736);
    assert_eq!(first.seeders, 12);
    assert_eq!(first.leechers, 3);
    assert_eq!(first.snatched, 45);
    assert_eq!(first.discount_level, DiscountLevel::Free);
    assert!(first.discount_end_time.is_some());
    assert_eq!(first.category, "Movies");
    assert_eq!(first.download_url, "download.php?id=101");
    // 2024-03-01 12:30 at +0800 == 04:30 UTC.
    assert_eq!(first.uploaded_at, 1_709_267_400);

    let second = &items[1];
    assert_eq!(second.id, "102");
    assert_eq!(second.discount_level, DiscountLevel::None);
    assert_eq!(second.discount_end_time, None);
    Ok(())
}

const MTEAM_LISTING: &str = r#"{
  "code": "0",
  "message": "SUCCESS",
  "data": {
    "pageNumber": 1,
    "pageSize": 100,
    "total": "2",
    "data": [
      {
        "id": "868524",
        "name": "Demo.Movie.2024.1080p.BluRay",
        "smallDescr": "demo subtitle",
        "category": "401",
        "size": "1610612736",
        "createdDate": "2024-03-01 12:30:00",
        "labels": ["官方", "中字"],
        "status": {
          "seeders": "21",
          "leechers": "2",
          "timesCompleted": "55",
          "discount": "FREE",
          "discountEndTime": "2024-03-05 12:00:00"
        }
      },
      {
        "id": 868525,
        "name": "Demo.Show.S01.2160p.WEB-DL",
        "size": 43159756800,
        "createdDate": "2024-03-02 08:00:00",
        "status": {
          "seeders": 3,
          "leechers": 1,
          "timesCompleted": 4,
          "discount": "NORMAL"
        }
      }
    ]
  }
}"#;

#[tokio::test]
async fn mtorrent_listing_tolerates_string_numbers() -> Result<()> {
    init_test_logging();
    register_builtin();
    let definition = definition_registry()
        .get("mteam")
        .expect("mteam definition registered");
    let mut config = SiteConfig::new(SiteSchema::MTorrent, "mteam");
    config.options = serde_json::json!({"apiKey": "test-key"});
    let context = DriverContext {
        definition,
        config,
        http: Arc::new(CannedExecutor {
            body: MTEAM_LISTING,
            content_type: "application/json",
        }),
    };
    let driver = driver_registry().create(SiteSchema::MTorrent, context)?;

    let request = driver.prepare_search(&SearchQuery::keyword("demo"))?;
    let response = driver.execute(request).await?;
    let items = driver.parse_search(&response)?;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id, "868524");
    assert_eq!(items[0].seeders, 21);
    assert_eq!(items[0].size_bytes, 1_610_612_736);
    assert_eq!(items[0].discount_level, DiscountLevel::Free);
    assert!(items[0].discount_end_time.is_some());
    assert_eq!(items[0].tags, vec!["官方".to_string(), "中字".to_string()]);
    assert_eq!(items[1].seeders, 3);
    assert_eq!(items[1].discount_level, DiscountLevel::None);
    Ok(())
}

#[test]
fn factory_rejects_missing_credentials() {
    init_test_logging();
    let factory = SiteFactory::new();
    let config = SiteConfig::new(SiteSchema::NexusPhp, "hdsky");
    let error = factory.create(config).unwrap_err();
    assert!(matches!(error, SiteError::InvalidCredentials { .. }));
}

#[test]
fn factory_rejects_schema_mismatch() {
    init_test_logging();
    let factory = SiteFactory::new();
    let mut config = SiteConfig::new(SiteSchema::Gazelle, "hdsky");
    config.options = serde_json::json!({"cookie": "uid=1"});
    let error = factory.create(config).unwrap_err();
    assert!(matches!(error, SiteError::InvalidQuery { .. }));
}

#[test]
fn factory_rejects_unusable_ad_hoc_definitions() {
    init_test_logging();
    let factory = SiteFactory::new();
    // NexusPHP needs selectors and a pipeline; an unregistered id cannot
    // synthesise those.
    let mut config = SiteConfig::new(SiteSchema::NexusPhp, "mystery-site");
    config.base_url = "https://mystery.example.org".to_string();
    config.options = serde_json::json!({"cookie": "uid=1"});
    let error = factory.create(config).unwrap_err();
    assert!(matches!(error, SiteError::InvalidQuery { .. }));
}

const GAZELLE_BROWSE: &str = r#"{
  "status": "success",
  "response": {
    "results": [
      {
        "groupId": 7,
        "groupName": "Demo Album",
        "torrentId": 9001,
        "size": 104857600,
        "seeders": 31,
        "leechers": 1,
        "snatches": 77,
        "isFreeleech": true,
        "groupTime": 1709267400,
        "tags": ["electronic"]
      }
    ]
  }
}"#;

#[tokio::test]
async fn factory_site_searches_end_to_end() -> Result<()> {
    init_test_logging();
    let server = StubServer::start(vec![("/ajax.php", vec![StubResponse::json(GAZELLE_BROWSE)])])
        .await;
    let factory = SiteFactory::new();
    let mut config = SiteConfig::new(SiteSchema::Gazelle, "stubgz");
    config.base_url = server.base_url();
    config.options = serde_json::json!({"cookie": "session=abc"});
    let site = factory.create(config)?;

    let items = site.search(&SearchQuery::keyword("demo")).await?;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].source_site, "stubgz", "wrapper tags the source");
    assert_eq!(items[0].seeders, 31);
    assert_eq!(items[0].discount_level, DiscountLevel::Free);

    let captured = server.requests();
    assert_eq!(captured.len(), 1);
    assert!(captured[0].query.contains("action=browse"));
    assert!(captured[0].query.contains("searchstr=demo"));
    assert_eq!(captured[0].cookie.as_deref(), Some("session=abc"));
    Ok(())
}
