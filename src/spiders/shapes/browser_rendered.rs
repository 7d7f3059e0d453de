// =============================================================================
// browser_rendered.rs — BROWSER-RENDERED DISCOVERY
// =============================================================================
//
// `adiarios_v2` renders its listing client-side; a plain HTTP GET
// returns an empty shell. Discovery delegates to an out-of-process
// rendering service reachable at `render_service_url`. When that service
// isn't configured the adapter fails loudly rather than silently
// returning zero gazettes, since an empty crawl and an unconfigured
// platform must not look the same to the dispatcher.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use crate::circuit_breaker::CircuitBreaker;
use crate::errors::SpiderError;
use crate::models::{BrowserRenderedConfig, DateRange, Gazette, Power};
use crate::rate_limiter::RateLimiter;
use crate::spiders::{finish, guarded_get, host_of, CircuitBreakerConfig, GazetteCandidate, Spider};

#[derive(Serialize)]
struct RenderRequest<'a> {
    #[serde(rename = "targetUrl")]
    target_url: &'a str,
    #[serde(rename = "startDate")]
    start_date: NaiveDate,
    #[serde(rename = "endDate")]
    end_date: NaiveDate,
}

pub struct BrowserRenderedSpider {
    territory_id: String,
    date_range: DateRange,
    config: BrowserRenderedConfig,
    http: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    circuit_breaker: CircuitBreaker,
    request_count: AtomicU64,
}

impl BrowserRenderedSpider {
    pub fn new(
        territory_id: String,
        date_range: DateRange,
        config: BrowserRenderedConfig,
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

    fn parse_entry(&self, entry: &serde_json::Value) -> Option<GazetteCandidate> {
        let date_str = entry.get("date")?.as_str()?;
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").ok()?;
        let file_url = entry.get("fileUrl")?.as_str()?.to_string();
        let is_extra_edition = entry
            .get("isExtraEdition")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let edition_number = entry
            .get("editionNumber")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Some(GazetteCandidate {
            territory_id: self.territory_id.clone(),
            date,
            file_url,
            edition_number,
            is_extra_edition,
            power: Power::Executive,
        })
    }
}

#[async_trait]
impl Spider for BrowserRenderedSpider {
    async fn crawl(&self) -> Result<Vec<Gazette>, SpiderError> {
        let execution_start = chrono::Utc::now();

        let Some(render_service_url) = self.config.render_service_url.as_deref() else {
            return Err(SpiderError::Unavailable {
                spider_id: self.territory_id.clone(),
            });
        };

        let host = host_of(render_service_url);
        let request = RenderRequest {
            target_url: &self.config.base_url,
            start_date: self.date_range.start,
            end_date: self.date_range.end,
        };

        self.rate_limiter.acquire(&host).await?;
        if !self.circuit_breaker.allow_request() {
            return Err(SpiderError::HttpStatus { host, status: 503 });
        }

        let response = self
            .http
            .post(render_service_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                self.circuit_breaker.record_failure();
                SpiderError::NetworkFailure {
                    host: host.clone(),
                    source: e,
                }
            })?;
        self.request_count.fetch_add(1, Ordering::Relaxed);

        let status = response.status();
        if status.as_u16() >= 400 {
            self.circuit_breaker.record_failure();
            return Err(SpiderError::HttpStatus {
                host,
                status: status.as_u16(),
            });
        }
        self.circuit_breaker.record_success();

        let entries: Vec<serde_json::Value> =
            response.json().await.map_err(|e| SpiderError::ParseFailure {
                host: host.clone(),
                reason: format!("invalid JSON from render service: {e}"),
            })?;

        let candidates: Vec<GazetteCandidate> =
            entries.iter().filter_map(|e| self.parse_entry(e)).collect();

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

    fn spider(render_service_url: Option<String>) -> BrowserRenderedSpider {
        BrowserRenderedSpider::new(
            "3550308".to_string(),
            DateRange::new(
                NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            )
            .unwrap(),
            BrowserRenderedConfig {
                base_url: "https://adiarios-v2.example.org".to_string(),
                render_service_url,
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

    #[tokio::test]
    async fn crawl_without_render_service_returns_unavailable() {
        let s = spider(None);
        let err = s.crawl().await.unwrap_err();
        assert!(matches!(err, SpiderError::Unavailable { .. }));
    }

    #[test]
    fn parse_entry_reads_rendering_service_payload_shape() {
        let s = spider(Some("https://renderer.example.org/render".to_string()));
        let entry = serde_json::json!({
            "date": "2026-01-08",
            "fileUrl": "https://adiarios-v2.example.org/arq/8.pdf",
            "isExtraEdition": false,
            "editionNumber": "77"
        });
        let candidate = s.parse_entry(&entry).unwrap();
        assert_eq!(candidate.date, NaiveDate::from_ymd_opt(2026, 1, 8).unwrap());
        assert_eq!(candidate.edition_number.as_deref(), Some("77"));
    }
}
