// =============================================================================
// paginated_html.rs — PAGINATED HTML INDEX DISCOVERY
// =============================================================================
//
// Shared by `doem`, `diof`, `instar`, `amm-mt`, `siganet`, `modernizacao`,
// `municipio-online`: a paged HTML index of entries, each with a date
// embedded in its heading or link fragment. Pagination follows a "next"
// link until it disappears or `maxPages` is hit. Entries whose text
// mentions "extra" or "extraordinário" are flagged as extra editions.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use crate::circuit_breaker::CircuitBreaker;
use crate::errors::SpiderError;
use crate::models::{DateRange, Gazette, PaginatedHtmlConfig, Power};
use crate::rate_limiter::RateLimiter;
use crate::spiders::{finish, guarded_get, host_of, CircuitBreakerConfig, GazetteCandidate, Spider};

static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").unwrap());
static BR_DATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{2})/(\d{2})/(\d{4})").unwrap());
static EXTRA_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)extra(ordin[aá]rio)?").unwrap());

const DEFAULT_MAX_PAGES: u32 = 50;

pub struct PaginatedHtmlSpider {
    territory_id: String,
    date_range: DateRange,
    config: PaginatedHtmlConfig,
    http: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    circuit_breaker: CircuitBreaker,
    request_count: AtomicU64,
}

impl PaginatedHtmlSpider {
    pub fn new(
        territory_id: String,
        date_range: DateRange,
        config: PaginatedHtmlConfig,
        http: reqwest::Client,
        rate_limiter: Arc<RateLimiter>,
        cb_config: CircuitBreakerConfig,
    ) -> Self {
        let host = host_of(&config.base_url);
        Self {
            territory_id,
            date_range,
            config,
            http,
            rate_limiter,
            circuit_breaker: CircuitBreaker::new(
                host,
                cb_config.failure_threshold,
                cb_config.reset_timeout,
                cb_config.success_threshold,
            ),
            request_count: AtomicU64::new(0),
        }
    }

    fn index_url(&self) -> String {
        format!("{}{}", self.config.base_url, self.config.index_path)
    }

    fn parse_date(text: &str) -> Option<NaiveDate> {
        if let Some(caps) = ISO_DATE.captures(text) {
            let y: i32 = caps[1].parse().ok()?;
            let m: u32 = caps[2].parse().ok()?;
            let d: u32 = caps[3].parse().ok()?;
            return NaiveDate::from_ymd_opt(y, m, d);
        }
        if let Some(caps) = BR_DATE.captures(text) {
            let d: u32 = caps[1].parse().ok()?;
            let m: u32 = caps[2].parse().ok()?;
            let y: i32 = caps[3].parse().ok()?;
            return NaiveDate::from_ymd_opt(y, m, d);
        }
        None
    }

    fn parse_entry(&self, entry: scraper::ElementRef) -> Option<GazetteCandidate> {
        let link_selector = Selector::parse("a[href]").ok()?;
        let link = entry.select(&link_selector).next()?;
        let file_url = link.value().attr("href")?.to_string();
        let file_url = self.absolutize(&file_url);

        let text = entry.text().collect::<Vec<_>>().join(" ");
        let date = Self::parse_date(&text).or_else(|| Self::parse_date(&file_url))?;
        let is_extra_edition = EXTRA_MARKER.is_match(&text);

        Some(GazetteCandidate {
            territory_id: self.territory_id.clone(),
            date,
            file_url,
            edition_number: None,
            is_extra_edition,
            power: Power::Executive,
        })
    }

    fn absolutize(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else if let Some(stripped) = href.strip_prefix('/') {
            format!("{}/{}", self.config.base_url.trim_end_matches('/'), stripped)
        } else {
            format!("{}/{}", self.config.base_url.trim_end_matches('/'), href)
        }
    }

    fn next_page_url(&self, document: &Html) -> Option<String> {
        let selector_str = self.config.next_page_selector.as_ref()?;
        let selector = Selector::parse(selector_str).ok()?;
        let href = document.select(&selector).next()?.value().attr("href")?;
        Some(self.absolutize(href))
    }
}

#[async_trait]
impl Spider for PaginatedHtmlSpider {
    async fn crawl(&self) -> Result<Vec<Gazette>, SpiderError> {
        let execution_start = chrono::Utc::now();
        let host = host_of(&self.config.base_url);
        let max_pages = self.config.max_pages.unwrap_or(DEFAULT_MAX_PAGES);
        let entry_selector =
            Selector::parse(&self.config.entry_selector).map_err(|e| SpiderError::ParseFailure {
                host: host.clone(),
                reason: format!("invalid entry selector '{}': {e:?}", self.config.entry_selector),
            })?;

        let mut candidates = Vec::new();
        let mut next_url = Some(self.index_url());
        let mut pages_fetched = 0;

        while let Some(url) = next_url.take() {
            if pages_fetched >= max_pages {
                break;
            }
            debug!(url = %url, page = pages_fetched, "fetching paginated index page");
            let response =
                guarded_get(&self.http, &self.circuit_breaker, &self.rate_limiter, &host, &url)
                    .await?;
            self.request_count.fetch_add(1, Ordering::Relaxed);
            pages_fetched += 1;

            let body = response.text().await.map_err(|e| SpiderError::NetworkFailure {
                host: host.clone(),
                source: e,
            })?;
            let document = Html::parse_document(&body);

            for entry in document.select(&entry_selector) {
                if let Some(candidate) = self.parse_entry(entry) {
                    candidates.push(candidate);
                }
            }

            let oldest_on_page = document
                .select(&entry_selector)
                .filter_map(|e| self.parse_entry(e))
                .map(|c| c.date)
                .min();
            if let Some(oldest) = oldest_on_page {
                if oldest < self.date_range.start {
                    break;
                }
            }

            next_url = self.next_page_url(&document);
        }

        Ok(finish(
            &self.territory_id,
            &self.date_range,
            execution_start,
            candidates,
        ))
    }

    fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }
}
