// =============================================================================
// tenant_slug.rs — API-BY-TENANT DISCOVERY
// =============================================================================
//
// Shared by `dosp`, `atende-v2`: a shared multi-tenant API addressed by
// journal/section/tenant identifiers. One GET covers the whole date
// range; payload dates are ISO, and a boolean flag marks extras.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::circuit_breaker::CircuitBreaker;
use crate::errors::SpiderError;
use crate::models::{DateRange, Gazette, Power, TenantSlugConfig};
use crate::rate_limiter::RateLimiter;
use crate::spiders::{finish, guarded_get, host_of, CircuitBreakerConfig, GazetteCandidate, Spider};

pub struct TenantSlugSpider {
    territory_id: String,
    date_range: DateRange,
    config: TenantSlugConfig,
    http: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    circuit_breaker: CircuitBreaker,
    request_count: AtomicU64,
}

impl TenantSlugSpider {
    pub fn new(
        territory_id: String,
        date_range: DateRange,
        config: TenantSlugConfig,
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

    fn search_url(&self) -> String {
        format!(
            "{}/api/v1/publicacoes?tenant={}&jornal={}&secao={}&inicio={}&fim={}",
            self.config.base_url,
            self.config.tenant_id,
            self.config.journal,
            self.config.section,
            self.date_range.start,
            self.date_range.end,
        )
    }

    fn parse_entry(&self, entry: &serde_json::Value) -> Option<GazetteCandidate> {
        let date_str = entry.get("data")?.as_str()?;
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").ok()?;
        let file_url = entry.get("url")?.as_str()?.to_string();
        let is_extra_edition = entry
            .get("extra")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let edition_number = entry
            .get("numero")
            .and_then(|v| v.as_str().map(|s| s.to_string()).or_else(|| v.as_i64().map(|n| n.to_string())));

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
impl Spider for TenantSlugSpider {
    async fn crawl(&self) -> Result<Vec<Gazette>, SpiderError> {
        let execution_start = chrono::Utc::now();
        let host = host_of(&self.config.base_url);
        let url = self.search_url();

        let response =
            guarded_get(&self.http, &self.circuit_breaker, &self.rate_limiter, &host, &url)
                .await?;
        self.request_count.fetch_add(1, Ordering::Relaxed);

        let entries: Vec<serde_json::Value> =
            response.json().await.map_err(|e| SpiderError::ParseFailure {
                host: host.clone(),
                reason: format!("invalid JSON from tenant API: {e}"),
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

    fn spider() -> TenantSlugSpider {
        TenantSlugSpider::new(
            "3550308".to_string(),
            DateRange::new(
                NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            )
            .unwrap(),
            TenantSlugConfig {
                base_url: "https://dosp.example.org".to_string(),
                journal: "oficial".to_string(),
                section: "municipal".to_string(),
                tenant_id: "t-3550308".to_string(),
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
    fn search_url_includes_tenant_journal_and_section() {
        let url = spider().search_url();
        assert!(url.contains("tenant=t-3550308"));
        assert!(url.contains("jornal=oficial"));
        assert!(url.contains("secao=municipal"));
    }

    #[test]
    fn parse_entry_reads_boolean_extra_flag() {
        let s = spider();
        let entry = serde_json::json!({
            "data": "2026-01-20",
            "url": "https://dosp.example.org/pub/20.pdf",
            "extra": true,
            "numero": 501
        });
        let candidate = s.parse_entry(&entry).unwrap();
        assert!(candidate.is_extra_edition);
        assert_eq!(candidate.edition_number.as_deref(), Some("501"));
    }
}
