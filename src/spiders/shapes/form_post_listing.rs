// =============================================================================
// form_post_listing.rs — FORM-POST LISTING DISCOVERY
// =============================================================================
//
// Shared by `aplus`, `diario-ba`, `administracao_publica`, `ptio`: a
// single POST carrying the date range and city slug returns the whole
// listing as one HTML table. Rows carry a `DD/MM/YYYY` date and a file
// link; a trailing `-N` suffix on the edition number marks an extra
// edition.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use scraper::{Html, Selector};

use crate::circuit_breaker::CircuitBreaker;
use crate::errors::SpiderError;
use crate::models::{DateRange, FormPostListingConfig, Gazette, Power};
use crate::rate_limiter::RateLimiter;
use crate::spiders::{finish, guarded_post_form, host_of, CircuitBreakerConfig, GazetteCandidate, Spider};

static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{2})/(\d{2})/(\d{4})").unwrap());
static EDITION_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.*?)-(\d+)$").unwrap());

pub struct FormPostListingSpider {
    territory_id: String,
    date_range: DateRange,
    config: FormPostListingConfig,
    http: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    circuit_breaker: CircuitBreaker,
    request_count: AtomicU64,
}

impl FormPostListingSpider {
    pub fn new(
        territory_id: String,
        date_range: DateRange,
        config: FormPostListingConfig,
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

    fn listing_url(&self) -> String {
        format!("{}{}", self.config.base_url, self.config.listing_path)
    }

    fn parse_row(&self, row: scraper::ElementRef) -> Option<GazetteCandidate> {
        let text = row.text().collect::<Vec<_>>().join(" ");
        let captures = DATE_PATTERN.captures(&text)?;
        let day: u32 = captures.get(1)?.as_str().parse().ok()?;
        let month: u32 = captures.get(2)?.as_str().parse().ok()?;
        let year: i32 = captures.get(3)?.as_str().parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;

        let link_selector = Selector::parse("a[href]").ok()?;
        let file_url = row
            .select(&link_selector)
            .next()?
            .value()
            .attr("href")?
            .to_string();
        let file_url = self.absolutize(&file_url);

        let raw_edition = text.split_whitespace().find(|tok| tok.chars().any(|c| c.is_ascii_digit()) && tok.contains('-'));
        let (edition_number, is_extra_edition) = match raw_edition.and_then(|tok| EDITION_SUFFIX.captures(tok)) {
            Some(caps) => (Some(caps[1].to_string()), true),
            None => (None, false),
        };

        Some(GazetteCandidate {
            territory_id: self.territory_id.clone(),
            date,
            file_url,
            edition_number,
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
}

#[async_trait]
impl Spider for FormPostListingSpider {
    async fn crawl(&self) -> Result<Vec<Gazette>, SpiderError> {
        let execution_start = chrono::Utc::now();
        let host = host_of(&self.config.base_url);
        let url = self.listing_url();
        let start = self.date_range.start.format("%d/%m/%Y").to_string();
        let end = self.date_range.end.format("%d/%m/%Y").to_string();

        let response = guarded_post_form(
            &self.http,
            &self.circuit_breaker,
            &self.rate_limiter,
            &host,
            &url,
            &[
                ("cidade", self.config.city_slug.as_str()),
                ("data_inicial", start.as_str()),
                ("data_final", end.as_str()),
            ],
        )
        .await?;
        self.request_count.fetch_add(1, Ordering::Relaxed);

        let body = response.text().await.map_err(|e| SpiderError::NetworkFailure {
            host: host.clone(),
            source: e,
        })?;

        let row_selector = Selector::parse(&self.config.row_selector).map_err(|e| SpiderError::ParseFailure {
            host: host.clone(),
            reason: format!("invalid row selector '{}': {e:?}", self.config.row_selector),
        })?;

        let document = Html::parse_document(&body);
        let candidates: Vec<GazetteCandidate> = document
            .select(&row_selector)
            .filter_map(|row| self.parse_row(row))
            .collect();

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

    fn spider() -> FormPostListingSpider {
        FormPostListingSpider::new(
            "2927408".to_string(),
            DateRange::new(
                NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            )
            .unwrap(),
            FormPostListingConfig {
                base_url: "https://listagem.example.org".to_string(),
                listing_path: "/diarios/listar".to_string(),
                city_slug: "cidade-exemplo".to_string(),
                row_selector: "table tr.diario".to_string(),
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
    fn parse_row_extracts_date_and_extra_edition_suffix() {
        let s = spider();
        let html = Html::parse_fragment(
            r#"<tr class="diario"><td>10/01/2026</td><td>Edição 120-2</td><td><a href="/files/120.pdf">baixar</a></td></tr>"#,
        );
        let row_selector = Selector::parse("tr.diario").unwrap();
        let row = html.select(&row_selector).next().unwrap();
        let candidate = s.parse_row(row).unwrap();
        assert_eq!(candidate.date, NaiveDate::from_ymd_opt(2026, 1, 10).unwrap());
        assert!(candidate.is_extra_edition);
        assert_eq!(candidate.edition_number.as_deref(), Some("120"));
        assert_eq!(candidate.file_url, "https://listagem.example.org/files/120.pdf");
    }

    #[test]
    fn parse_row_without_date_returns_none() {
        let s = spider();
        let html = Html::parse_fragment(r#"<tr class="diario"><td>sem data</td></tr>"#);
        let row_selector = Selector::parse("tr.diario").unwrap();
        let row = html.select(&row_selector).next().unwrap();
        assert!(s.parse_row(row).is_none());
    }

    #[test]
    fn absolutize_preserves_absolute_urls() {
        let s = spider();
        assert_eq!(
            s.absolutize("https://other.example.org/a.pdf"),
            "https://other.example.org/a.pdf"
        );
    }
}
