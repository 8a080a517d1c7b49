//! Driver for the NexusPHP family: server-rendered HTML with session
//! cookies, scraped through CSS selectors merged from schema defaults, the
//! site definition, and per-config overrides.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;
use trawler_extract::{Value, select_from_element};
use trawler_site_core::{
    DiscountLevel, DriverContext, DriverRequest, DriverResponse, FieldSelector, HttpExecutor,
    SearchQuery, SiteDefinition, SiteDriver, SiteError, SiteResult, SortField, TorrentItem,
    UserInfo,
};
use trawler_torrent::is_torrent_content_type;

use crate::detail::{TorrentDetail, parse_detail_page};
use crate::listing::ListingCache;
use crate::pipeline::run_user_info_pipeline;

/// Stock NexusPHP promotion classes. Definitions may extend the map via
/// their `detail_parser.discount_classes`.
static DISCOUNT_CLASSES: Lazy<HashMap<&'static str, DiscountLevel>> = Lazy::new(|| {
    HashMap::from([
        ("pro_free", DiscountLevel::Free),
        ("pro_free2up", DiscountLevel::TwoXFree),
        ("pro_2up", DiscountLevel::TwoXUp),
        ("pro_50pctdown", DiscountLevel::Percent50),
        ("pro_50pctdown2up", DiscountLevel::TwoX50),
        ("pro_30pctdown", DiscountLevel::Percent30),
        ("pro_70pctdown", DiscountLevel::Percent70),
    ])
});

fn default_selectors() -> HashMap<String, String> {
    // The standard NexusPHP torrents table; sites deviate via definition
    // or config overrides.
    [
        ("rows", "table.torrents > tbody > tr"),
        ("link", "a[href*='details.php']"),
        ("title", "a[href*='details.php'] b"),
        ("subtitle", ""),
        ("download", "a[href*='download.php']"),
        ("category", "td:nth-child(1) img"),
        ("date", "td:nth-child(4) span[title]"),
        ("size", "td:nth-child(5)"),
        ("seeders", "td:nth-child(6)"),
        ("leechers", "td:nth-child(7)"),
        ("snatched", "td:nth-child(8)"),
        ("discount", "img[class*='pro_']"),
        ("discount_end", "span[title]"),
        ("hr", "img.hitandrun"),
        ("tags", ""),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value.to_string()))
    .collect()
}

/// NexusPHP schema driver.
pub struct NexusPhpDriver {
    definition: Arc<SiteDefinition>,
    site_id: String,
    cookie: String,
    selectors: HashMap<String, String>,
    http: Arc<dyn HttpExecutor>,
    listing: ListingCache,
}

/// Driver constructor registered for the `nexusphp` schema.
///
/// # Errors
///
/// Returns [`SiteError::InvalidCredentials`] when the config carries no
/// cookie.
pub(crate) fn create(context: DriverContext) -> SiteResult<Arc<dyn SiteDriver>> {
    let DriverContext {
        definition,
        config,
        http,
    } = context;
    let cookie = config.require_option("cookie")?;
    let mut selectors = default_selectors();
    selectors.extend(
        definition
            .selectors
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    if let Some(overrides) = config
        .options
        .get("selectors")
        .and_then(serde_json::Value::as_object)
    {
        for (key, value) in overrides {
            if let Some(text) = value.as_str() {
                selectors.insert(key.clone(), text.to_string());
            }
        }
    }
    Ok(Arc::new(NexusPhpDriver {
        site_id: config.id,
        cookie,
        selectors,
        definition,
        http,
        listing: ListingCache::new(),
    }))
}

impl NexusPhpDriver {
    fn selector(&self, key: &str) -> &str {
        self.selectors.get(key).map_or("", String::as_str)
    }

    fn compile(&self, key: &str) -> SiteResult<Option<Selector>> {
        let raw = self.selector(key);
        if raw.is_empty() {
            return Ok(None);
        }
        Selector::parse(raw)
            .map(Some)
            .map_err(|_| SiteError::Parse {
                site: self.site_id.clone(),
                what: "listing selector",
                snippet: raw.to_string(),
            })
    }

    fn field(&self, row: ElementRef<'_>, field: &FieldSelector) -> SiteResult<Value> {
        select_from_element(row, field).map_err(|err| SiteError::Parse {
            site: self.site_id.clone(),
            what: "listing field",
            snippet: err.to_string(),
        })
    }

    fn parse_row(&self, row: ElementRef<'_>) -> SiteResult<Option<TorrentItem>> {
        let title = self
            .field(row, &FieldSelector::css(&[self.selector("title")]))?
            .to_str_value();
        if title.is_empty() {
            // Header and spacer rows carry no detail link.
            return Ok(None);
        }

        let link = self.selector("link");
        let id = self
            .field(
                row,
                &FieldSelector::css(&[link])
                    .with_attr("href")
                    .with_filter("querystring", &["id"]),
            )?
            .to_str_value();
        let url = self
            .field(row, &FieldSelector::css(&[link]).with_attr("href"))?
            .to_str_value();
        let download_url = self
            .field(
                row,
                &FieldSelector::css(&[self.selector("download")]).with_attr("href"),
            )?
            .to_str_value();
        let size_bytes = self
            .field(
                row,
                &FieldSelector::css(&[self.selector("size")]).with_filter("parseSize", &[]),
            )?
            .to_i64()
            .max(0)
            .unsigned_abs();
        let counter = |key: &str| -> SiteResult<u32> {
            let value = self
                .field(
                    row,
                    &FieldSelector::css(&[self.selector(key)]).with_filter("parseNumber", &[]),
                )?
                .to_i64()
                .max(0);
            Ok(u32::try_from(value).unwrap_or(u32::MAX))
        };
        let uploaded_at = self
            .field(
                row,
                &FieldSelector::css(&[self.selector("date")])
                    .with_attr("title")
                    .with_filter("parseTime", &[&self.definition.timezone_offset]),
            )?
            .to_i64();
        let category = self
            .field(
                row,
                &FieldSelector::css(&[self.selector("category")]).with_attr("alt"),
            )?
            .to_str_value();
        let subtitle = match self.selector("subtitle") {
            "" => None,
            selector => {
                let text = self
                    .field(row, &FieldSelector::css(&[selector]))?
                    .to_str_value();
                (!text.is_empty()).then_some(text)
            }
        };

        let mut item = TorrentItem {
            id,
            title,
            subtitle,
            size_bytes,
            seeders: counter("seeders")?,
            leechers: counter("leechers")?,
            snatched: counter("snatched")?,
            category,
            url,
            download_url,
            uploaded_at,
            ..TorrentItem::default()
        };
        self.apply_discount(row, &mut item)?;
        if let Some(hr) = self.compile("hr")? {
            item.has_hr = row.select(&hr).next().is_some();
        }
        if let Some(tags) = self.compile("tags")? {
            for element in row.select(&tags) {
                item.add_tag(element.text().collect::<String>().trim().to_string());
            }
        }
        Ok(Some(item))
    }

    fn apply_discount(&self, row: ElementRef<'_>, item: &mut TorrentItem) -> SiteResult<()> {
        let Some(selector) = self.compile("discount")? else {
            return Ok(());
        };
        let extra = self
            .definition
            .detail_parser
            .as_ref()
            .map(|config| &config.discount_classes);
        'candidates: for element in row.select(&selector) {
            for class in element.value().classes() {
                let level = extra
                    .and_then(|classes| classes.get(class).copied())
                    .or_else(|| DISCOUNT_CLASSES.get(class).copied());
                if let Some(level) = level {
                    item.discount_level = level;
                    break 'candidates;
                }
            }
        }
        if item.discount_level != DiscountLevel::None {
            let end = self
                .field(
                    row,
                    &FieldSelector::css(&[self.selector("discount_end")])
                        .with_attr("title")
                        .with_filter("parseTime", &[&self.definition.timezone_offset]),
                )?
                .to_i64();
            if end > 0 {
                item.discount_end_time = Some(end);
            }
        }
        Ok(())
    }

    fn auth_headers(&self) -> Vec<(String, String)> {
        vec![("Cookie".to_string(), self.cookie.clone())]
    }

    /// Detail lookup used by RSS enrichment: answered from the listing
    /// cache when possible, scraped from the detail page otherwise.
    ///
    /// # Errors
    ///
    /// Surfaces transport and parse failures from the detail fetch.
    pub async fn torrent_detail(&self, id: &str) -> SiteResult<TorrentDetail> {
        if let Some(item) = self.listing.find(id) {
            #[allow(clippy::cast_precision_loss)]
            return Ok(TorrentDetail {
                title: item.title,
                id: item.id,
                discount_level: item.discount_level,
                discount_end_time: item.discount_end_time,
                size_mb: item.size_bytes as f64 / (1024.0 * 1024.0),
                has_hr: item.has_hr,
            });
        }
        let request = DriverRequest::get("details.php")
            .with_query("id", id)
            .with_header("Cookie", self.cookie.clone());
        let response = self.execute(request).await?;
        parse_detail_page(&self.definition, &response.text())
    }
}

#[async_trait]
impl SiteDriver for NexusPhpDriver {
    fn definition(&self) -> &Arc<SiteDefinition> {
        &self.definition
    }

    fn prepare_search(&self, query: &SearchQuery) -> SiteResult<DriverRequest> {
        let mut request = DriverRequest::get("torrents.php")
            .with_query("incldead", "1")
            .with_query("search", &query.keyword);
        if let Some(category) = &query.category {
            request = request.with_query("cat", category);
        }
        if query.page > 0 {
            request = request.with_query("page", query.page.to_string());
        }
        if query.free_only {
            request = request.with_query("spstate", "2");
        }
        if let Some(sort) = query.sort_by {
            let code = match sort {
                SortField::UploadedAt => "4",
                SortField::Size => "5",
                SortField::Seeders => "7",
                SortField::Leechers => "8",
                SortField::Snatched => "9",
            };
            request = request.with_query("sort", code).with_query(
                "type",
                match query.order {
                    trawler_site_core::SortOrder::Desc => "desc",
                    trawler_site_core::SortOrder::Asc => "asc",
                },
            );
        }
        Ok(request.with_header("Cookie", self.cookie.clone()))
    }

    async fn execute(&self, request: DriverRequest) -> SiteResult<DriverResponse> {
        self.http.execute(&self.site_id, request).await
    }

    fn parse_search(&self, response: &DriverResponse) -> SiteResult<Vec<TorrentItem>> {
        if response
            .final_url
            .as_deref()
            .is_some_and(|url| url.contains("login.php"))
        {
            return Err(SiteError::InvalidCredentials {
                site: self.site_id.clone(),
                detail: "redirected to the login page".to_string(),
            });
        }
        let document = Html::parse_document(&response.text());
        let rows = self.compile("rows")?.ok_or_else(|| SiteError::Parse {
            site: self.site_id.clone(),
            what: "listing selector",
            snippet: "rows selector is empty".to_string(),
        })?;
        let mut items = Vec::new();
        for row in document.select(&rows) {
            match self.parse_row(row) {
                Ok(Some(item)) => items.push(item),
                Ok(None) => {}
                Err(err) => {
                    warn!(site = %self.site_id, %err, "skipping unparseable listing row");
                }
            }
        }
        if items.is_empty() && !response.text().contains("torrents") {
            return Err(SiteError::Parse {
                site: self.site_id.clone(),
                what: "search listing",
                snippet: response.snippet(),
            });
        }
        self.listing.fill(&items);
        Ok(items)
    }

    fn prepare_download(&self, item: &TorrentItem) -> SiteResult<DriverRequest> {
        let request = if item.download_url.is_empty() {
            DriverRequest::get("download.php").with_query("id", &item.id)
        } else {
            DriverRequest::get(&item.download_url)
        };
        Ok(request.with_header("Cookie", self.cookie.clone()))
    }

    fn parse_download(&self, response: &DriverResponse) -> SiteResult<Vec<u8>> {
        let content_ok = response
            .content_type
            .as_deref()
            .is_some_and(is_torrent_content_type);
        if content_ok || response.body.first() == Some(&b'd') {
            return Ok(response.body.clone());
        }
        Err(SiteError::Parse {
            site: self.site_id.clone(),
            what: "torrent payload",
            snippet: response.snippet(),
        })
    }

    fn prepare_user_info(&self) -> SiteResult<DriverRequest> {
        let step = self
            .definition
            .user_info
            .as_ref()
            .and_then(|config| config.process.first())
            .ok_or(SiteError::Unsupported {
                operation: "prepare_user_info",
            })?;
        let mut request = DriverRequest::get(&step.request.path);
        for (key, value) in &step.request.params {
            request = request.with_query(key, value);
        }
        Ok(request.with_header("Cookie", self.cookie.clone()))
    }

    fn parse_user_info(&self, _response: &DriverResponse) -> SiteResult<UserInfo> {
        // Single responses carry only a fragment of the snapshot; the
        // composite pipeline below is the real entry point.
        Err(SiteError::Unsupported {
            operation: "parse_user_info",
        })
    }

    async fn get_user_info(&self) -> SiteResult<UserInfo> {
        run_user_info_pipeline(
            &self.site_id,
            &self.definition,
            &self.http,
            &self.auth_headers(),
        )
        .await
    }
}
