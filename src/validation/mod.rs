// =============================================================================
// validation/mod.rs — VALIDATION HARNESS ORCHESTRATION
// =============================================================================
//
// Drives a subset of the registry through a live crawl and grades each
// city against the structural, content, and performance validators.
// Cities are partitioned into chunks of `parallel_workers`; each chunk
// runs to completion (its crawls concurrently, via tokio) before the
// next chunk starts, with `request_delay` paced between chunks so the
// harness itself doesn't violate the same rate limits the adapters do.
// Once every crawl result is in hand, the CPU-bound structural and
// performance checks run over the whole batch in parallel via rayon —
// there's no I/O left in that pass, just grading.
// =============================================================================

pub mod report;
pub mod validators;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::ValidationError;
use crate::models::{CrawlResult, CrawlStats, DateRange, SpiderConfig, SpiderType};
use crate::spiders::registry::{create_spider, SpiderRegistry, SpiderRuntime};
use crate::validation::report::{PlatformRollup, ValidationReport};
use crate::validation::validators::{validate_content, validate_performance, validate_structural, CategoryOutcome};

/// Which cities to drive through a validation run.
#[derive(Debug, Clone)]
pub enum ValidationMode {
    /// Every registered spider.
    Full,
    /// A deterministic pseudo-random percentage of the registry
    /// (0.0–1.0), selected by hashing each spider id so repeated runs
    /// against an unchanged registry are reproducible.
    Sample(f64),
    /// Every city registered under one platform adapter kind.
    Platform(SpiderType),
    /// Exactly the named spider ids.
    Single(Vec<String>),
    /// Re-run exactly the ids that failed a previous run.
    Regression(Vec<String>),
}

impl ValidationMode {
    fn label(&self) -> String {
        match self {
            ValidationMode::Full => "full".to_string(),
            ValidationMode::Sample(pct) => format!("sample({pct})"),
            ValidationMode::Platform(t) => format!("platform({t:?})"),
            ValidationMode::Single(_) => "single".to_string(),
            ValidationMode::Regression(_) => "regression".to_string(),
        }
    }
}

/// Tunable knobs for a validation run. Defaults match the harness's
/// documented behavior independent of the pipeline-wide `Config`.
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    pub parallel_workers: usize,
    pub timeout_per_city: Duration,
    pub search_days: i64,
    pub request_delay: Duration,
    pub probe_urls: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            parallel_workers: 10,
            timeout_per_city: Duration::from_secs(60),
            search_days: 7,
            request_delay: Duration::from_millis(500),
            probe_urls: false,
        }
    }
}

/// One validator category's outcome, serialized into the report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryReport {
    pub failures: Vec<String>,
    pub warnings: Vec<String>,
}

impl From<CategoryOutcome> for CategoryReport {
    fn from(o: CategoryOutcome) -> Self {
        Self { failures: o.failures, warnings: o.warnings }
    }
}

/// One city's full verdict: pass iff all three categories passed.
#[derive(Debug, Clone, Serialize)]
pub struct CityReport {
    pub spider_id: String,
    pub passed: bool,
    pub structural: CategoryReport,
    pub content: CategoryReport,
    pub performance: CategoryReport,
}

impl CityReport {
    pub fn all_failures(&self) -> Vec<String> {
        self.structural
            .failures
            .iter()
            .chain(self.content.failures.iter())
            .chain(self.performance.failures.iter())
            .cloned()
            .collect()
    }
}

pub struct ValidationHarness {
    registry: Arc<SpiderRegistry>,
    runtime: SpiderRuntime,
    options: ValidationOptions,
}

impl ValidationHarness {
    pub fn new(registry: Arc<SpiderRegistry>, runtime: SpiderRuntime, options: ValidationOptions) -> Self {
        Self { registry, runtime, options }
    }

    /// Resolve a mode into the concrete list of configs to drive, in
    /// registry order (stable across calls for `Full`/`Platform`).
    fn select(&self, mode: &ValidationMode) -> Result<Vec<SpiderConfig>, ValidationError> {
        let configs = match mode {
            ValidationMode::Full => self.registry.all().cloned().collect(),
            ValidationMode::Sample(pct) => {
                let pct = pct.clamp(0.0, 1.0);
                self.registry.all().filter(|c| sample_bucket(&c.id) < pct).cloned().collect()
            }
            ValidationMode::Platform(spider_type) => {
                self.registry.by_type(*spider_type).into_iter().cloned().collect()
            }
            ValidationMode::Single(ids) | ValidationMode::Regression(ids) => {
                let mut out = Vec::with_capacity(ids.len());
                for id in ids {
                    match self.registry.get(id) {
                        Some(c) => out.push(c.clone()),
                        None => return Err(ValidationError::UnknownCity(id.clone())),
                    }
                }
                out
            }
        };
        Ok(configs)
    }

    /// Run a full validation pass and produce a report.
    pub async fn run(&self, mode: ValidationMode) -> Result<ValidationReport, ValidationError> {
        let configs = self.select(&mode)?;
        let today = chrono::Utc::now().date_naive();
        let date_range = DateRange::new(today - chrono::Duration::days(self.options.search_days), today)
            .unwrap_or_else(|_| DateRange::last_30_days(today));

        info!(mode = %mode.label(), cities = configs.len(), "starting validation run");

        let mut results: Vec<(SpiderConfig, CrawlResult)> = Vec::with_capacity(configs.len());
        for (i, chunk) in configs.chunks(self.options.parallel_workers.max(1)).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.options.request_delay).await;
            }
            let futures = chunk.iter().map(|config| self.crawl_one(config, date_range));
            let chunk_results = futures::future::join_all(futures).await;
            results.extend(chunk.iter().cloned().zip(chunk_results));
        }

        let probe_urls = self.options.probe_urls;
        let http = self.runtime.http.clone();
        let mut content_reports = Vec::with_capacity(results.len());
        for (config, result) in &results {
            content_reports.push(validate_content(result, config, probe_urls, &http).await);
        }

        // CPU-bound grading: no I/O left, so this is where rayon earns
        // its keep rather than fighting the tokio runtime for threads.
        let structural_reports: Vec<CategoryOutcome> = results.par_iter().map(|(_, r)| validate_structural(r)).collect();
        let performance_reports: Vec<CategoryOutcome> = results.par_iter().map(|(_, r)| validate_performance(r)).collect();

        let mut cities = Vec::with_capacity(results.len());
        for (((config, _), structural), (content, performance)) in
            results.iter().zip(structural_reports).zip(content_reports.into_iter().zip(performance_reports))
        {
            let structural: CategoryReport = structural.into();
            let content: CategoryReport = content.into();
            let performance: CategoryReport = performance.into();
            let passed = structural.failures.is_empty() && content.failures.is_empty() && performance.failures.is_empty();
            cities.push(CityReport { spider_id: config.id.clone(), passed, structural, content, performance });
        }

        Ok(build_report(mode.label(), &results, cities))
    }

    async fn crawl_one(&self, config: &SpiderConfig, date_range: DateRange) -> CrawlResult {
        let start = Instant::now();
        let spider = match create_spider(config, date_range, &self.runtime) {
            Ok(s) => s,
            Err(e) => {
                return CrawlResult {
                    spider_id: config.id.clone(),
                    territory_id: config.territory_id.clone(),
                    gazettes: Vec::new(),
                    stats: CrawlStats { total_found: 0, date_range, request_count: 0, execution_time_ms: 0 },
                    error: Some(e.to_string()),
                };
            }
        };

        let outcome = tokio::time::timeout(self.options.timeout_per_city, spider.crawl()).await;
        let execution_time_ms = start.elapsed().as_millis() as u64;
        let request_count = spider.request_count() as usize;

        match outcome {
            Ok(Ok(gazettes)) => CrawlResult {
                spider_id: config.id.clone(),
                territory_id: config.territory_id.clone(),
                stats: CrawlStats { total_found: gazettes.len(), date_range, request_count, execution_time_ms },
                gazettes,
                error: None,
            },
            Ok(Err(e)) => {
                warn!(spider_id = %config.id, error = %e, "validation crawl failed");
                CrawlResult {
                    spider_id: config.id.clone(),
                    territory_id: config.territory_id.clone(),
                    gazettes: Vec::new(),
                    stats: CrawlStats { total_found: 0, date_range, request_count, execution_time_ms },
                    error: Some(e.to_string()),
                }
            }
            Err(_) => {
                warn!(spider_id = %config.id, "validation crawl timed out");
                CrawlResult {
                    spider_id: config.id.clone(),
                    territory_id: config.territory_id.clone(),
                    gazettes: Vec::new(),
                    stats: CrawlStats { total_found: 0, date_range, request_count, execution_time_ms },
                    error: Some(ValidationError::Timeout(config.id.clone()).to_string()),
                }
            }
        }
    }
}

/// Deterministic stand-in for a uniform [0, 1) draw, keyed on spider id
/// so `Sample` is reproducible against an unchanged registry without
/// pulling in a RNG dependency for one call site.
fn sample_bucket(id: &str) -> f64 {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    (hasher.finish() % 10_000) as f64 / 10_000.0
}

fn build_report(mode: String, results: &[(SpiderConfig, CrawlResult)], cities: Vec<CityReport>) -> ValidationReport {
    let total = cities.len();
    let passed = cities.iter().filter(|c| c.passed).count();
    let failed = total - passed;

    let mut rollups: Vec<PlatformRollup> = Vec::new();
    for (config, _) in results {
        let label = format!("{:?}", config.spider_type);
        let city_passed = cities.iter().find(|c| c.spider_id == config.id).map(|c| c.passed).unwrap_or(false);
        if let Some(r) = rollups.iter_mut().find(|r| r.spider_type == label) {
            r.total += 1;
            if city_passed {
                r.passed += 1;
            } else {
                r.failed += 1;
            }
        } else {
            rollups.push(PlatformRollup {
                spider_type: label,
                total: 1,
                passed: city_passed as usize,
                failed: (!city_passed) as usize,
            });
        }
    }

    ValidationReport { mode, total, passed, failed, platform_rollups: rollups, cities }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SpiderConfigVariant, TenantSlugConfig};
    use crate::rate_limiter::RateLimiter;
    use crate::spiders::CircuitBreakerConfig;
    use chrono::NaiveDate;

    fn write_registry(configs: &[SpiderConfig]) -> Arc<SpiderRegistry> {
        let path = std::env::temp_dir().join(format!("validation_test_{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, serde_json::to_string(configs).unwrap()).unwrap();
        let registry = SpiderRegistry::load(&[&path]).unwrap();
        let _ = std::fs::remove_file(&path);
        Arc::new(registry)
    }

    fn config(id: &str) -> SpiderConfig {
        SpiderConfig {
            id: id.to_string(),
            name: id.to_string(),
            territory_id: "2927408".to_string(),
            spider_type: SpiderType::Dosp,
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            config: SpiderConfigVariant::TenantSlug(TenantSlugConfig {
                base_url: "https://dosp.invalid.example".to_string(),
                journal: "diario".to_string(),
                section: "1".to_string(),
                tenant_id: "t".to_string(),
            }),
        }
    }

    fn runtime() -> SpiderRuntime {
        SpiderRuntime {
            http: reqwest::Client::new(),
            rate_limiter: Arc::new(RateLimiter::new(5, Default::default())),
            circuit_breaker_config: CircuitBreakerConfig {
                failure_threshold: 5,
                reset_timeout: Duration::from_secs(60),
                success_threshold: 2,
            },
        }
    }

    #[test]
    fn sample_bucket_is_deterministic() {
        assert_eq!(sample_bucket("city-1"), sample_bucket("city-1"));
    }

    #[tokio::test]
    async fn single_mode_rejects_unknown_city() {
        let registry = write_registry(&[config("city-1")]);
        let harness = ValidationHarness::new(registry, runtime(), ValidationOptions::default());
        let result = harness.run(ValidationMode::Single(vec!["nope".to_string()])).await;
        assert!(matches!(result, Err(ValidationError::UnknownCity(_))));
    }

    #[tokio::test]
    async fn full_mode_against_unreachable_hosts_reports_every_city_as_crawl_failure() {
        let registry = write_registry(&[config("city-1"), config("city-2")]);
        let options = ValidationOptions { timeout_per_city: Duration::from_secs(5), ..Default::default() };
        let harness = ValidationHarness::new(registry, runtime(), options);
        let report = harness.run(ValidationMode::Full).await.unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.platform_rollups.len(), 1);
        assert_eq!(report.platform_rollups[0].total, 2);
    }
}
