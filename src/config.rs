// =============================================================================
// config.rs — RUNTIME CONFIGURATION
// =============================================================================
//
// Every tunable knob in the pipeline lives here, loaded from environment
// variables with sensible defaults so the binary runs out of the box.
// Variables are prefixed `GAZETTE_PIPELINE_`.
// =============================================================================

use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Every tunable parameter in the pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // SPIDER REGISTRY
    // =========================================================================
    /// Path to the JSON file describing every registered spider
    /// configuration (see `crate::spiders::registry`).
    pub spider_registry_path: String,

    // =========================================================================
    // EXECUTION
    // =========================================================================
    /// Number of concurrent crawl executor workers.
    pub parallel_workers: usize,

    /// Per-city crawl deadline.
    pub timeout_per_city: Duration,

    /// Default crawl window when a request doesn't specify one, in days.
    pub search_days: i64,

    /// Delay inserted between consecutive requests to the same host, on
    /// top of the token-bucket rate limiter.
    pub request_delay: Duration,

    /// Maximum retries for a retryable `SpiderError` before the message
    /// is dead-lettered.
    pub max_retries: u32,

    /// Fraction of registered spiders the validation harness samples by
    /// default (0.0–1.0).
    pub sample_percentage: f64,

    /// Enables verbose (debug-level) logging regardless of `RUST_LOG`.
    pub verbose: bool,

    // =========================================================================
    // RATE LIMITING
    // =========================================================================
    /// Default requests/second for hosts with no explicit override.
    pub rate_limit_default_rps: u32,

    /// Per-host requests/second overrides, e.g. `{"doem.org.br": 3}`.
    pub rate_limit_overrides: HashMap<String, u32>,

    // =========================================================================
    // DEDUPLICATION (bloom filter + LRU)
    // =========================================================================
    pub bloom_expected_items: u64,
    pub bloom_false_positive_rate: f64,
    pub bloom_rotation_interval: Duration,
    pub lru_cache_size: usize,

    // =========================================================================
    // CIRCUIT BREAKER
    // =========================================================================
    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_reset_timeout: Duration,
    pub circuit_breaker_success_threshold: u32,

    // =========================================================================
    // METRICS
    // =========================================================================
    pub metrics_port: u16,

    // =========================================================================
    // ANALYZER
    // =========================================================================
    /// Minimum confidence a finding needs before it is forwarded to the
    /// webhook queue. The fixed `>= 0.7` "high confidence" tier used for
    /// the resultado_parcial suppression rule is independent of this and
    /// not configurable.
    pub min_confidence_threshold: f64,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset. Reads a `.env` file first if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Config {
            spider_registry_path: env_or_default(
                "GAZETTE_PIPELINE_REGISTRY_PATH",
                "config/spiders.json",
            ),

            parallel_workers: env_or_default("GAZETTE_PIPELINE_PARALLEL_WORKERS", "8")
                .parse()
                .unwrap_or(8),
            timeout_per_city: Duration::from_secs(
                env_or_default("GAZETTE_PIPELINE_TIMEOUT_PER_CITY_SECS", "60")
                    .parse()
                    .unwrap_or(60),
            ),
            search_days: env_or_default("GAZETTE_PIPELINE_SEARCH_DAYS", "30")
                .parse()
                .unwrap_or(30),
            request_delay: Duration::from_millis(
                env_or_default("GAZETTE_PIPELINE_REQUEST_DELAY_MS", "0")
                    .parse()
                    .unwrap_or(0),
            ),
            max_retries: env_or_default("GAZETTE_PIPELINE_MAX_RETRIES", "3")
                .parse()
                .unwrap_or(3),
            sample_percentage: env_or_default("GAZETTE_PIPELINE_SAMPLE_PERCENTAGE", "0.1")
                .parse()
                .unwrap_or(0.1),
            verbose: env_or_default("GAZETTE_PIPELINE_VERBOSE", "false")
                .parse()
                .unwrap_or(false),

            rate_limit_default_rps: env_or_default("GAZETTE_PIPELINE_RATE_LIMIT_DEFAULT_RPS", "5")
                .parse()
                .unwrap_or(5),
            rate_limit_overrides: parse_rps_overrides(&env_or_default(
                "GAZETTE_PIPELINE_RATE_LIMIT_OVERRIDES",
                "doem.org.br:3,adiarios.com.br:3",
            )),

            bloom_expected_items: env_or_default("GAZETTE_PIPELINE_BLOOM_ITEMS", "500000")
                .parse()
                .unwrap_or(500_000),
            bloom_false_positive_rate: env_or_default("GAZETTE_PIPELINE_BLOOM_FP_RATE", "0.01")
                .parse()
                .unwrap_or(0.01),
            bloom_rotation_interval: Duration::from_secs(
                env_or_default("GAZETTE_PIPELINE_BLOOM_ROTATION_SECS", "86400")
                    .parse()
                    .unwrap_or(86_400),
            ),
            lru_cache_size: env_or_default("GAZETTE_PIPELINE_LRU_CACHE_SIZE", "50000")
                .parse()
                .unwrap_or(50_000),

            circuit_breaker_failure_threshold: env_or_default(
                "GAZETTE_PIPELINE_CB_FAILURE_THRESHOLD",
                "5",
            )
            .parse()
            .unwrap_or(5),
            circuit_breaker_reset_timeout: Duration::from_secs(
                env_or_default("GAZETTE_PIPELINE_CB_RESET_TIMEOUT_SECS", "300")
                    .parse()
                    .unwrap_or(300),
            ),
            circuit_breaker_success_threshold: env_or_default(
                "GAZETTE_PIPELINE_CB_SUCCESS_THRESHOLD",
                "2",
            )
            .parse()
            .unwrap_or(2),

            metrics_port: env_or_default("GAZETTE_PIPELINE_METRICS_PORT", "9090")
                .parse()
                .unwrap_or(9090),

            min_confidence_threshold: env_or_default("GAZETTE_PIPELINE_MIN_CONFIDENCE", "0.3")
                .parse()
                .unwrap_or(0.3),
        }
    }
}

fn parse_rps_overrides(raw: &str) -> HashMap<String, u32> {
    raw.split(',')
        .filter_map(|entry| {
            let (host, rps) = entry.split_once(':')?;
            let rps: u32 = rps.trim().parse().ok()?;
            Some((host.trim().to_string(), rps))
        })
        .collect()
}

/// Read an environment variable with a default fallback.
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rps_overrides_handles_well_formed_pairs() {
        let overrides = parse_rps_overrides("doem.org.br:3,adiarios.com.br:3");
        assert_eq!(overrides.get("doem.org.br"), Some(&3));
        assert_eq!(overrides.get("adiarios.com.br"), Some(&3));
    }

    #[test]
    fn parse_rps_overrides_skips_malformed_entries() {
        let overrides = parse_rps_overrides("doem.org.br:3,garbage,another:notanumber");
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides.get("doem.org.br"), Some(&3));
    }

    #[test]
    fn parse_rps_overrides_handles_empty_string() {
        let overrides = parse_rps_overrides("");
        assert!(overrides.is_empty());
    }
}
