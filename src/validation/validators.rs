// =============================================================================
// validation/validators.rs — STRUCTURAL, CONTENT, AND PERFORMANCE CHECKS
// =============================================================================
//
// Three validator categories, run in sequence against one city's
// `CrawlResult`. Each returns a list of human-readable failure strings;
// an empty list means the city passed that category outright.
// =============================================================================

use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use crate::models::{is_valid_territory_id, CrawlResult, Power, SpiderConfig};

/// Execution-time thresholds, in seconds: below `warn` is healthy,
/// between `warn` and `fail` is a warning, at or above `fail` is a hard
/// failure.
const PERFORMANCE_WARN_SECS: u64 = 60;
const PERFORMANCE_FAIL_SECS: u64 = 120;

/// Requests-per-gazette thresholds.
const REQUEST_EFFICIENCY_WARN: f64 = 5.0;
const REQUEST_EFFICIENCY_FAIL: f64 = 10.0;

/// HEAD-probe sample size and timeout for the content validator's
/// `fileUrl` reachability check.
const URL_PROBE_SAMPLE: usize = 3;
const URL_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// One validator category's verdict for a single city.
#[derive(Debug, Clone, Default)]
pub struct CategoryOutcome {
    pub failures: Vec<String>,
    pub warnings: Vec<String>,
}

impl CategoryOutcome {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Record-schema and §3-invariant checks: does every produced gazette
/// actually satisfy the universal invariants every adapter promises?
pub fn validate_structural(result: &CrawlResult) -> CategoryOutcome {
    let mut outcome = CategoryOutcome::default();

    for gazette in &result.gazettes {
        if gazette.territory_id != result.territory_id {
            outcome.failures.push(format!(
                "gazette territoryId {} does not match crawl territoryId {}",
                gazette.territory_id, result.territory_id
            ));
        }
        if !result.stats.date_range.contains(gazette.date) {
            outcome.failures.push(format!(
                "gazette date {} falls outside requested range {}..={}",
                gazette.date, result.stats.date_range.start, result.stats.date_range.end
            ));
        }
        if gazette.file_url.as_str().is_empty() || gazette.file_url.cannot_be_a_base() {
            outcome.failures.push(format!("fileUrl {} is not a usable absolute URL", gazette.file_url));
        }
        if !is_valid_territory_id(&gazette.territory_id) {
            outcome.failures.push(format!("gazette territoryId {} is not exactly 7 digits", gazette.territory_id));
        }
    }

    if result.stats.total_found != result.gazettes.len() {
        outcome
            .warnings
            .push(format!("stats.totalFound ({}) disagrees with gazette count ({})", result.stats.total_found, result.gazettes.len()));
    }

    outcome
}

/// Territory/config cross-checks, `power` enum validity (already
/// enforced by the type system, so this mostly exists for the
/// recency and URL-probe checks), and an optional HEAD probe.
pub async fn validate_content(result: &CrawlResult, config: &SpiderConfig, probe_urls: bool, http: &reqwest::Client) -> CategoryOutcome {
    let mut outcome = CategoryOutcome::default();

    if result.territory_id != config.territory_id {
        outcome.failures.push(format!(
            "crawl result territoryId {} does not match registered config territoryId {}",
            result.territory_id, config.territory_id
        ));
    }

    let now = Utc::now();
    for gazette in &result.gazettes {
        if gazette.scraped_at > now {
            outcome.failures.push(format!("gazette scrapedAt {} is in the future", gazette.scraped_at));
        }
        match gazette.power {
            Power::Executive | Power::Legislative | Power::ExecutiveLegislative => {}
        }
    }

    if probe_urls {
        for gazette in result.gazettes.iter().take(URL_PROBE_SAMPLE) {
            let probe = tokio::time::timeout(URL_PROBE_TIMEOUT, http.head(gazette.file_url.clone()).send()).await;
            match probe {
                Ok(Ok(resp)) if resp.status().is_success() || resp.status().is_redirection() => {}
                Ok(Ok(resp)) => {
                    outcome.warnings.push(format!("HEAD {} returned {}", gazette.file_url, resp.status()));
                }
                Ok(Err(e)) => {
                    outcome.warnings.push(format!("HEAD {} failed: {e}", gazette.file_url));
                }
                Err(_) => {
                    outcome.warnings.push(format!("HEAD {} timed out after {:?}", gazette.file_url, URL_PROBE_TIMEOUT));
                }
            }
        }
    } else {
        debug!(spider_id = %config.id, "skipping fileUrl HEAD probe");
    }

    outcome
}

/// Execution-time and request-efficiency thresholds.
pub fn validate_performance(result: &CrawlResult) -> CategoryOutcome {
    let mut outcome = CategoryOutcome::default();

    let elapsed_secs = result.stats.execution_time_ms / 1000;
    if elapsed_secs >= PERFORMANCE_FAIL_SECS {
        outcome.failures.push(format!("execution time {elapsed_secs}s exceeds the {PERFORMANCE_FAIL_SECS}s failure threshold"));
    } else if elapsed_secs >= PERFORMANCE_WARN_SECS {
        outcome.warnings.push(format!("execution time {elapsed_secs}s exceeds the {PERFORMANCE_WARN_SECS}s warning threshold"));
    }

    if !result.gazettes.is_empty() {
        let efficiency = result.stats.request_count as f64 / result.gazettes.len() as f64;
        if efficiency >= REQUEST_EFFICIENCY_FAIL {
            outcome.failures.push(format!("{efficiency:.1} requests per gazette exceeds the {REQUEST_EFFICIENCY_FAIL} failure threshold"));
        } else if efficiency >= REQUEST_EFFICIENCY_WARN {
            outcome.warnings.push(format!("{efficiency:.1} requests per gazette exceeds the {REQUEST_EFFICIENCY_WARN} warning threshold"));
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DateRange, Gazette, SpiderConfigVariant, SpiderType, TenantSlugConfig};
    use crate::models::CrawlStats;
    use chrono::{NaiveDate, TimeZone};
    use url::Url;

    fn range() -> DateRange {
        DateRange::new(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()).unwrap()
    }

    fn gazette(territory_id: &str, date: NaiveDate) -> Gazette {
        Gazette {
            territory_id: territory_id.to_string(),
            date,
            file_url: Url::parse("https://example.org/diario.pdf").unwrap(),
            edition_number: None,
            is_extra_edition: false,
            power: Power::Executive,
            scraped_at: Utc::now(),
        }
    }

    fn result_with(gazettes: Vec<Gazette>, request_count: usize, execution_time_ms: u64) -> CrawlResult {
        let total_found = gazettes.len();
        CrawlResult {
            spider_id: "city-1".to_string(),
            territory_id: "2927408".to_string(),
            gazettes,
            stats: CrawlStats { total_found, date_range: range(), request_count, execution_time_ms },
            error: None,
        }
    }

    #[test]
    fn structural_flags_territory_mismatch() {
        let result = result_with(vec![gazette("0000000", NaiveDate::from_ymd_opt(2026, 1, 15).unwrap())], 1, 100);
        let outcome = validate_structural(&result);
        assert!(!outcome.passed());
    }

    #[test]
    fn structural_flags_date_outside_range() {
        let result = result_with(vec![gazette("2927408", NaiveDate::from_ymd_opt(2026, 2, 1).unwrap())], 1, 100);
        let outcome = validate_structural(&result);
        assert!(!outcome.passed());
    }

    #[test]
    fn structural_passes_a_well_formed_result() {
        let result = result_with(vec![gazette("2927408", NaiveDate::from_ymd_opt(2026, 1, 15).unwrap())], 1, 100);
        let outcome = validate_structural(&result);
        assert!(outcome.passed());
    }

    #[test]
    fn performance_fails_past_120_seconds() {
        let result = result_with(vec![], 1, 121_000);
        let outcome = validate_performance(&result);
        assert!(!outcome.passed());
    }

    #[test]
    fn performance_warns_past_60_seconds() {
        let result = result_with(vec![], 1, 61_000);
        let outcome = validate_performance(&result);
        assert!(outcome.passed());
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn performance_fails_on_request_inefficiency() {
        let gazettes = vec![gazette("2927408", NaiveDate::from_ymd_opt(2026, 1, 15).unwrap())];
        let result = result_with(gazettes, 11, 100);
        let outcome = validate_performance(&result);
        assert!(!outcome.passed());
    }

    #[tokio::test]
    async fn content_flags_future_scraped_at() {
        let mut g = gazette("2927408", NaiveDate::from_ymd_opt(2026, 1, 15).unwrap());
        g.scraped_at = Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap();
        let result = result_with(vec![g], 1, 100);
        let config = SpiderConfig {
            id: "city-1".to_string(),
            name: "City One".to_string(),
            territory_id: "2927408".to_string(),
            spider_type: SpiderType::Dosp,
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            config: SpiderConfigVariant::TenantSlug(TenantSlugConfig {
                base_url: "https://dosp.invalid.example".to_string(),
                journal: "diario".to_string(),
                section: "1".to_string(),
                tenant_id: "t".to_string(),
            }),
        };
        let http = reqwest::Client::new();
        let outcome = validate_content(&result, &config, false, &http).await;
        assert!(!outcome.passed());
    }
}
