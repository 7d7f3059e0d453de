// =============================================================================
// spiders/mod.rs — THE SPIDER CONTRACT
// =============================================================================
//
// Every publishing-platform adapter implements the same two-operation
// contract. Adapters are grouped into "shapes" (see `shapes/`) that share
// the discovery algorithm for a family of platforms; this module defines
// the contract itself and the invariant-enforcement helper every shape
// calls on its way out, so the four adapter invariants are checked in
// exactly one place rather than once per platform.
// =============================================================================

pub mod registry;
pub mod shapes;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;
use url::Url;

use crate::circuit_breaker::CircuitBreaker;
use crate::errors::SpiderError;
use crate::models::{is_valid_territory_id, DateRange, Gazette, Power};
use crate::rate_limiter::RateLimiter;

/// Circuit breaker tuning, threaded down from `Config` to every spider
/// constructor. Building a breaker is pure bookkeeping, not I/O, so
/// constructing one at spider-construction time doesn't violate the "no
/// constructor I/O" invariant.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub success_threshold: u32,
}

/// Extract the host component of a URL for rate-limiter/circuit-breaker
/// keying, falling back to the whole string if it doesn't parse.
pub(crate) fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| url.to_string())
}

/// Issue one rate-limited, circuit-breaker-guarded GET request. Shared
/// by every shape so per-host resilience is implemented once.
pub(crate) async fn guarded_get(
    http: &reqwest::Client,
    circuit_breaker: &CircuitBreaker,
    rate_limiter: &RateLimiter,
    host: &str,
    url: &str,
) -> Result<reqwest::Response, SpiderError> {
    rate_limiter.acquire(host).await?;

    if !circuit_breaker.allow_request() {
        return Err(SpiderError::HttpStatus {
            host: host.to_string(),
            status: 503,
        });
    }

    let response = http.get(url).send().await.map_err(|e| {
        circuit_breaker.record_failure();
        SpiderError::NetworkFailure {
            host: host.to_string(),
            source: e,
        }
    })?;

    let status = response.status();
    if status.as_u16() >= 400 {
        circuit_breaker.record_failure();
        return Err(SpiderError::HttpStatus {
            host: host.to_string(),
            status: status.as_u16(),
        });
    }

    circuit_breaker.record_success();
    Ok(response)
}

/// Issue one rate-limited, circuit-breaker-guarded POST request with a
/// form body.
pub(crate) async fn guarded_post_form(
    http: &reqwest::Client,
    circuit_breaker: &CircuitBreaker,
    rate_limiter: &RateLimiter,
    host: &str,
    url: &str,
    form: &[(&str, &str)],
) -> Result<reqwest::Response, SpiderError> {
    rate_limiter.acquire(host).await?;

    if !circuit_breaker.allow_request() {
        return Err(SpiderError::HttpStatus {
            host: host.to_string(),
            status: 503,
        });
    }

    let response = http.post(url).form(form).send().await.map_err(|e| {
        circuit_breaker.record_failure();
        SpiderError::NetworkFailure {
            host: host.to_string(),
            source: e,
        }
    })?;

    let status = response.status();
    if status.as_u16() >= 400 {
        circuit_breaker.record_failure();
        return Err(SpiderError::HttpStatus {
            host: host.to_string(),
            status: status.as_u16(),
        });
    }

    circuit_breaker.record_success();
    Ok(response)
}

/// Uniform contract every platform adapter implements.
#[async_trait]
pub trait Spider: Send + Sync {
    /// Discover every gazette published within the configured date range.
    /// A zero-length result is legitimate (no publications in the window).
    async fn crawl(&self) -> Result<Vec<Gazette>, SpiderError>;

    /// Number of outbound HTTP calls issued so far. Monotonically
    /// non-decreasing across the lifetime of the spider.
    fn request_count(&self) -> u64;
}

/// A not-yet-validated gazette, as an adapter first parses it off the
/// wire, before `finish` enforces the record invariants and converts it
/// to a `Gazette`.
#[derive(Debug, Clone)]
pub struct GazetteCandidate {
    pub territory_id: String,
    pub date: chrono::NaiveDate,
    pub file_url: String,
    pub edition_number: Option<String>,
    pub is_extra_edition: bool,
    pub power: Power,
}

/// Enforce every adapter invariant from the data model in one place:
/// territory match, date-range membership, absolute http(s) URL,
/// edition-number whitespace normalization. Candidates that fail any
/// check are dropped and logged rather than propagated, since a single
/// malformed row must not fail the whole crawl.
pub(crate) fn finish(
    territory_id: &str,
    date_range: &DateRange,
    execution_start: DateTime<Utc>,
    candidates: Vec<GazetteCandidate>,
) -> Vec<Gazette> {
    candidates
        .into_iter()
        .filter_map(|c| match finish_one(territory_id, date_range, execution_start, c) {
            Ok(g) => Some(g),
            Err(e) => {
                warn!(error = %e, "dropping candidate gazette that failed validation");
                None
            }
        })
        .collect()
}

fn finish_one(
    territory_id: &str,
    date_range: &DateRange,
    execution_start: DateTime<Utc>,
    candidate: GazetteCandidate,
) -> Result<Gazette, SpiderError> {
    if candidate.territory_id != territory_id {
        return Err(SpiderError::ValidationFailure(format!(
            "candidate territoryId {} does not match configured {}",
            candidate.territory_id, territory_id
        )));
    }
    if !is_valid_territory_id(&candidate.territory_id) {
        return Err(SpiderError::ValidationFailure(format!(
            "candidate territoryId {} is not exactly 7 digits",
            candidate.territory_id
        )));
    }
    if !date_range.contains(candidate.date) {
        return Err(SpiderError::ValidationFailure(format!(
            "candidate date {} outside range {}..={}",
            candidate.date, date_range.start, date_range.end
        )));
    }
    let file_url = Url::parse(&candidate.file_url)
        .map_err(|e| SpiderError::ParseFailure {
            host: territory_id.to_string(),
            reason: format!("invalid fileUrl '{}': {e}", candidate.file_url),
        })?;
    if file_url.scheme() != "http" && file_url.scheme() != "https" {
        return Err(SpiderError::ValidationFailure(format!(
            "fileUrl scheme '{}' is not http/https",
            file_url.scheme()
        )));
    }
    let edition_number = candidate
        .edition_number
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());

    Ok(Gazette {
        territory_id: candidate.territory_id,
        date: candidate.date,
        file_url,
        edition_number,
        is_extra_edition: candidate.is_extra_edition,
        power: candidate.power,
        scraped_at: execution_start.max(Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        )
        .unwrap()
    }

    fn candidate(date: chrono::NaiveDate, url: &str) -> GazetteCandidate {
        GazetteCandidate {
            territory_id: "2927408".to_string(),
            date,
            file_url: url.to_string(),
            edition_number: Some("  42  ".to_string()),
            is_extra_edition: false,
            power: Power::Executive,
        }
    }

    #[test]
    fn finish_drops_candidate_outside_range() {
        let past = Utc::now();
        let out = finish(
            "2927408",
            &range(),
            past,
            vec![candidate(
                NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
                "https://example.org/a.pdf",
            )],
        );
        assert!(out.is_empty());
    }

    #[test]
    fn finish_drops_mismatched_territory() {
        let past = Utc::now();
        let mut c = candidate(
            NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            "https://example.org/a.pdf",
        );
        c.territory_id = "9999999".to_string();
        let out = finish("2927408", &range(), past, vec![c]);
        assert!(out.is_empty());
    }

    #[test]
    fn finish_normalizes_edition_whitespace() {
        let past = Utc::now();
        let out = finish(
            "2927408",
            &range(),
            past,
            vec![candidate(
                NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
                "https://example.org/a.pdf",
            )],
        );
        assert_eq!(out[0].edition_number.as_deref(), Some("42"));
    }

    #[test]
    fn finish_rejects_non_http_scheme() {
        let past = Utc::now();
        let out = finish(
            "2927408",
            &range(),
            past,
            vec![candidate(
                NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
                "ftp://example.org/a.pdf",
            )],
        );
        assert!(out.is_empty());
    }
}
