// =============================================================================
// month_walk_json.rs — CALENDAR/JSON DISCOVERY
// =============================================================================
//
// Shared by `barco_digital`, `sigpub`, `diario_oficial_br`, `dioenet`,
// `dom_sc`: one JSON fetch per calendar month in range, ISO dates in the
// payload, extras flagged by a non-1 `tipo_edicao_id`-style field.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use crate::circuit_breaker::CircuitBreaker;
use crate::errors::SpiderError;
use crate::models::{DateRange, Gazette, MonthWalkJsonConfig, Power};
use crate::rate_limiter::RateLimiter;
use crate::spiders::{finish, guarded_get, host_of, CircuitBreakerConfig, GazetteCandidate, Spider};

pub struct MonthWalkJsonSpider {
    territory_id: String,
    platform_start_date: NaiveDate,
    date_range: DateRange,
    config: MonthWalkJsonConfig,
    http: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    circuit_breaker: CircuitBreaker,
    request_count: AtomicU64,
}

impl MonthWalkJsonSpider {
    pub fn new(
        territory_id: String,
        platform_start_date: NaiveDate,
        date_range: DateRange,
        config: MonthWalkJsonConfig,
        http: reqwest::Client,
        rate_limiter: Arc<RateLimiter>,
        cb_config: CircuitBreakerConfig,
    ) -> Self {
        let host = host_of(&config.base_url);
        Self {
            territory_id,
            platform_start_date,
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

    fn calendar_url(&self, year: i32, month: u32) -> String {
        self.config
            .calendar_path_template
            .replace("{base}", &self.config.base_url)
            .replace("{year}", &year.to_string())
            .replace("{month}", &format!("{month:02}"))
    }

    fn parse_entry(&self, entry: &serde_json::Value) -> Option<GazetteCandidate> {
        let date_str = entry.get(&self.config.date_field)?.as_str()?;
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").ok()?;
        let file_url = entry
            .get(&self.config.file_url_field)?
            .as_str()?
            .to_string();
        let is_extra = entry
            .get(&self.config.extra_edition_field)
            .and_then(|v| v.as_i64())
            .map(|v| v != 1)
            .unwrap_or(false);
        let edition_number = entry
            .get("edicao")
            .and_then(|v| v.as_str().map(|s| s.to_string()).or_else(|| v.as_i64().map(|n| n.to_string())));

        Some(GazetteCandidate {
            territory_id: self.territory_id.clone(),
            date,
            file_url,
            edition_number,
            is_extra_edition: is_extra,
            power: Power::Executive,
        })
    }
}

#[async_trait]
impl Spider for MonthWalkJsonSpider {
    async fn crawl(&self) -> Result<Vec<Gazette>, SpiderError> {
        let execution_start = chrono::Utc::now();
        let host = host_of(&self.config.base_url);
        let months = self.date_range.months_from(self.platform_start_date);
        let mut candidates = Vec::new();

        for (year, month) in months {
            let url = self.calendar_url(year, month);
            debug!(url = %url, "fetching month-walk calendar page");
            let response =
                guarded_get(&self.http, &self.circuit_breaker, &self.rate_limiter, &host, &url)
                    .await?;
            self.request_count.fetch_add(1, Ordering::Relaxed);

            let entries: Vec<serde_json::Value> =
                response.json().await.map_err(|e| SpiderError::ParseFailure {
                    host: host.clone(),
                    reason: format!("invalid JSON from calendar endpoint: {e}"),
                })?;

            for entry in &entries {
                if let Some(candidate) = self.parse_entry(entry) {
                    candidates.push(candidate);
                }
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
