// =============================================================================
// detail_follow.rs — INDEX + DETAIL-PAGE FOLLOW-UP DISCOVERY
// =============================================================================
//
// Shared by `adiarios_v1`: the index page lists only titles and dates,
// never the PDF URL directly. Each entry requires one follow-up GET to
// its detail page to resolve the download link via `detail_link_attr`.
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
use crate::models::{DateRange, DetailFollowConfig, Gazette, Power};
use crate::rate_limiter::RateLimiter;
use crate::spiders::{finish, guarded_get, host_of, CircuitBreakerConfig, GazetteCandidate, Spider};

static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").unwrap());
static BR_DATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{2})/(\d{2})/(\d{4})").unwrap());

struct IndexEntry {
    date: NaiveDate,
    detail_url: String,
}

pub struct DetailFollowSpider {
    territory_id: String,
    date_range: DateRange,
    config: DetailFollowConfig,
    http: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    circuit_breaker: CircuitBreaker,
    request_count: AtomicU64,
}

impl DetailFollowSpider {
    pub fn new(
        territory_id: String,
        date_range: DateRange,
        config: DetailFollowConfig,
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
            return NaiveDate::from_ymd_opt(
                caps[1].parse().ok()?,
                caps[2].parse().ok()?,
                caps[3].parse().ok()?,
            );
        }
        if let Some(caps) = BR_DATE.captures(text) {
            return NaiveDate::from_ymd_opt(
                caps[3].parse().ok()?,
                caps[2].parse().ok()?,
                caps[1].parse().ok()?,
            );
        }
        None
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

    fn parse_index_entry(&self, entry: scraper::ElementRef) -> Option<IndexEntry> {
        let link_selector = Selector::parse("a[href]").ok()?;
        let link = entry.select(&link_selector).next()?;
        let detail_url = self.absolutize(link.value().attr("href")?);
        let text = entry.text().collect::<Vec<_>>().join(" ");
        let date = Self::parse_date(&text)?;
        Some(IndexEntry { date, detail_url })
    }

    fn parse_detail_page(&self, body: &str, date: NaiveDate) -> Option<GazetteCandidate> {
        let document = Html::parse_document(body);
        let link_selector = Selector::parse(&format!("[{}]", self.config.detail_link_attr)).ok()?;
        let element = document.select(&link_selector).next()?;
        let file_url = element.value().attr(self.config.detail_link_attr.as_str())?;
        let file_url = self.absolutize(file_url);
        let text = document.root_element().text().collect::<Vec<_>>().join(" ");
        let is_extra_edition = regex::Regex::new(r"(?i)extra(ordin[aá]rio)?")
            .map(|re| re.is_match(&text))
            .unwrap_or(false);

        Some(GazetteCandidate {
            territory_id: self.territory_id.clone(),
            date,
            file_url,
            edition_number: None,
            is_extra_edition,
            power: Power::Executive,
        })
    }
}

#[async_trait]
impl Spider for DetailFollowSpider {
    async fn crawl(&self) -> Result<Vec<Gazette>, SpiderError> {
        let execution_start = chrono::Utc::now();
        let host = host_of(&self.config.base_url);
        let entry_selector =
            Selector::parse(&self.config.entry_selector).map_err(|e| SpiderError::ParseFailure {
                host: host.clone(),
                reason: format!("invalid entry selector '{}': {e:?}", self.config.entry_selector),
            })?;

        let index_url = self.index_url();
        debug!(url = %index_url, "fetching detail-follow index page");
        let index_response =
            guarded_get(&self.http, &self.circuit_breaker, &self.rate_limiter, &host, &index_url)
                .await?;
        self.request_count.fetch_add(1, Ordering::Relaxed);

        let index_body = index_response.text().await.map_err(|e| SpiderError::NetworkFailure {
            host: host.clone(),
            source: e,
        })?;
        let index_document = Html::parse_document(&index_body);

        let entries: Vec<IndexEntry> = index_document
            .select(&entry_selector)
            .filter_map(|e| self.parse_index_entry(e))
            .filter(|e| self.date_range.contains(e.date))
            .collect();

        let mut candidates = Vec::new();
        for entry in entries {
            let detail_response = guarded_get(
                &self.http,
                &self.circuit_breaker,
                &self.rate_limiter,
                &host,
                &entry.detail_url,
            )
            .await?;
            self.request_count.fetch_add(1, Ordering::Relaxed);

            let detail_body = detail_response.text().await.map_err(|e| SpiderError::NetworkFailure {
                host: host.clone(),
                source: e,
            })?;
            if let Some(candidate) = self.parse_detail_page(&detail_body, entry.date) {
                candidates.push(candidate);
            }
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

#[cfg(test)]
mod tests {
    use super::*;

    fn spider() -> DetailFollowSpider {
        DetailFollowSpider::new(
            "4106902".to_string(),
            DateRange::new(
                NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            )
            .unwrap(),
            DetailFollowConfig {
                base_url: "https://adiarios.example.org".to_string(),
                index_path: "/diarios".to_string(),
                entry_selector: "li.item".to_string(),
                detail_link_attr: "data-pdf-url".to_string(),
            },
            reqwest::Client::new(),
            Arc::new(RateLimiter::new(5, Default::default())),
            CircuitBreakerConfig {
                failure_threshold: 5,
                reset_timeout: std::time::Duration::from_secs(60),
                success_threshold: 2,
            },
        )
    }

    #[test]
    fn parse_index_entry_extracts_date_and_detail_link() {
        let s = spider();
        let html = Html::parse_fragment(
            r#"<li class="item">05/01/2026 <a href="/detalhe/55">ver</a></li>"#,
        );
        let selector = Selector::parse("li.item").unwrap();
        let entry = html.select(&selector).next().unwrap();
        let parsed = s.parse_index_entry(entry).unwrap();
        assert_eq!(parsed.date, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
        assert_eq!(parsed.detail_url, "https://adiarios.example.org/detalhe/55");
    }

    #[test]
    fn parse_detail_page_reads_custom_link_attribute() {
        let s = spider();
        let body = r#"<html><body><a data-pdf-url="/arq/55.pdf">baixar</a></body></html>"#;
        let candidate = s
            .parse_detail_page(body, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
            .unwrap();
        assert_eq!(candidate.file_url, "https://adiarios.example.org/arq/55.pdf");
    }
}
