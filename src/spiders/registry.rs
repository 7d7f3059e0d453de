// =============================================================================
// spiders/registry.rs — SPIDER CONFIGURATION REGISTRY
// =============================================================================
//
// Loads every registered spider configuration from one or more JSON
// files and builds the concrete `Spider` for a given config. A territory
// may have more than one configuration (a platform migration, a backup
// mirror); `fallbacks` returns every configuration for a territory in
// the order it was loaded, so the first one is always the primary.
// =============================================================================

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::circuit_breaker::CircuitBreaker;
use crate::errors::SpiderError;
use crate::models::{DateRange, SpiderConfig, SpiderConfigVariant, SpiderType};
use crate::rate_limiter::RateLimiter;
use crate::spiders::shapes::{
    BrowserRenderedSpider, DetailFollowSpider, FormPostListingSpider, MonthWalkJsonSpider,
    PaginatedHtmlSpider, TenantSlugSpider,
};
use crate::spiders::{CircuitBreakerConfig, Spider};

/// Everything a registry needs to turn a `SpiderConfig` into a live
/// `Spider`: a shared HTTP client, the default/override rate limiter,
/// and circuit breaker tuning.
#[derive(Clone)]
pub struct SpiderRuntime {
    pub http: reqwest::Client,
    pub rate_limiter: Arc<RateLimiter>,
    pub circuit_breaker_config: CircuitBreakerConfig,
}

pub struct SpiderRegistry {
    /// Every loaded configuration, in load order, keyed by territory.
    by_territory: HashMap<String, Vec<SpiderConfig>>,
    /// Every loaded configuration, keyed by its own id.
    by_id: HashMap<String, SpiderConfig>,
}

impl SpiderRegistry {
    /// Load configurations from every path, in order. On a duplicate
    /// `id` the first occurrence wins; later ones are dropped with a
    /// warning. Configurations for the same territory are kept in the
    /// order they were encountered so `fallbacks` can walk them in
    /// priority order.
    pub fn load(paths: &[impl AsRef<Path>]) -> Result<Self, SpiderError> {
        let mut by_territory: HashMap<String, Vec<SpiderConfig>> = HashMap::new();
        let mut by_id: HashMap<String, SpiderConfig> = HashMap::new();

        for path in paths {
            let path = path.as_ref();
            let contents = std::fs::read_to_string(path).map_err(|e| SpiderError::ParseFailure {
                host: path.display().to_string(),
                reason: format!("could not read registry file: {e}"),
            })?;
            let configs: Vec<SpiderConfig> =
                serde_json::from_str(&contents).map_err(|e| SpiderError::ParseFailure {
                    host: path.display().to_string(),
                    reason: format!("invalid registry JSON: {e}"),
                })?;

            for config in configs {
                if by_id.contains_key(&config.id) {
                    warn!(id = %config.id, path = %path.display(), "duplicate spider id, keeping first-loaded configuration");
                    continue;
                }
                by_territory
                    .entry(config.territory_id.clone())
                    .or_default()
                    .push(config.clone());
                by_id.insert(config.id.clone(), config);
            }
        }

        Ok(Self { by_territory, by_id })
    }

    /// Every configuration registered for a territory, in fallback
    /// order (load order: the first is primary, the rest are
    /// fallbacks tried in sequence on a failover-eligible error).
    pub fn fallbacks(&self, territory_id: &str) -> &[SpiderConfig] {
        self.by_territory
            .get(territory_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn by_type(&self, spider_type: SpiderType) -> Vec<&SpiderConfig> {
        self.by_id
            .values()
            .filter(|c| std::mem::discriminant(&c.spider_type) == std::mem::discriminant(&spider_type))
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&SpiderConfig> {
        self.by_id.get(id)
    }

    pub fn all(&self) -> impl Iterator<Item = &SpiderConfig> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Instantiate the concrete `Spider` for a configuration's platform
/// tag. Every platform tag maps onto exactly one of the six shapes;
/// an unrecognized tag returns `SpiderError::UnknownSpiderType` rather
/// than panicking, since registry contents come from an external file.
pub fn create_spider(
    config: &SpiderConfig,
    date_range: DateRange,
    runtime: &SpiderRuntime,
) -> Result<Box<dyn Spider>, SpiderError> {
    let territory_id = config.territory_id.clone();

    match &config.config {
        SpiderConfigVariant::MonthWalkJson(c) => Ok(Box::new(MonthWalkJsonSpider::new(
            territory_id,
            config.start_date,
            date_range,
            c.clone(),
            runtime.http.clone(),
            runtime.rate_limiter.clone(),
            runtime.circuit_breaker_config,
        ))),
        SpiderConfigVariant::FormPostListing(c) => Ok(Box::new(FormPostListingSpider::new(
            territory_id,
            date_range,
            c.clone(),
            runtime.http.clone(),
            runtime.rate_limiter.clone(),
            runtime.circuit_breaker_config,
        ))),
        SpiderConfigVariant::PaginatedHtml(c) => Ok(Box::new(PaginatedHtmlSpider::new(
            territory_id,
            date_range,
            c.clone(),
            runtime.http.clone(),
            runtime.rate_limiter.clone(),
            runtime.circuit_breaker_config,
        ))),
        SpiderConfigVariant::TenantSlug(c) => Ok(Box::new(TenantSlugSpider::new(
            territory_id,
            date_range,
            c.clone(),
            runtime.http.clone(),
            runtime.rate_limiter.clone(),
            runtime.circuit_breaker_config,
        ))),
        SpiderConfigVariant::DetailFollow(c) => Ok(Box::new(DetailFollowSpider::new(
            territory_id,
            date_range,
            c.clone(),
            runtime.http.clone(),
            runtime.rate_limiter.clone(),
            runtime.circuit_breaker_config,
        ))),
        SpiderConfigVariant::BrowserRendered(c) => Ok(Box::new(BrowserRenderedSpider::new(
            territory_id,
            date_range,
            c.clone(),
            runtime.http.clone(),
            runtime.rate_limiter.clone(),
            runtime.circuit_breaker_config,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn write_registry_file(contents: &str) -> tempfile_path::TempJsonFile {
        tempfile_path::TempJsonFile::new(contents)
    }

    mod tempfile_path {
        use std::io::Write;
        use std::sync::atomic::{AtomicU64, Ordering};

        static COUNTER: AtomicU64 = AtomicU64::new(0);

        pub struct TempJsonFile {
            pub path: std::path::PathBuf,
        }

        impl TempJsonFile {
            pub fn new(contents: &str) -> Self {
                let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
                let mut path = std::env::temp_dir();
                path.push(format!(
                    "gazette_pipeline_registry_test_{}_{unique}.json",
                    std::process::id()
                ));
                let mut file = std::fs::File::create(&path).unwrap();
                file.write_all(contents.as_bytes()).unwrap();
                Self { path }
            }
        }

        impl Drop for TempJsonFile {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }

    fn sample_json(id: &str, territory_id: &str) -> String {
        format!(
            r#"[{{
                "id": "{id}",
                "name": "Example City",
                "territoryId": "{territory_id}",
                "spiderType": "dosp",
                "startDate": "2020-01-01",
                "config": {{
                    "type": "tenant_slug",
                    "baseUrl": "https://dosp.example.org",
                    "journal": "oficial",
                    "section": "municipal",
                    "tenantId": "t-1"
                }}
            }}]"#
        )
    }

    #[test]
    fn load_keeps_first_occurrence_of_duplicate_id() {
        let file_a = write_registry_file(&sample_json("city-1", "2927408"));
        let file_b = write_registry_file(&sample_json("city-1", "9999999"));
        let registry = SpiderRegistry::load(&[&file_a.path, &file_b.path]).unwrap();
        assert_eq!(registry.get("city-1").unwrap().territory_id, "2927408");
    }

    #[test]
    fn fallbacks_returns_configs_in_load_order() {
        let json = format!(
            "[{},{}]",
            sample_json("city-1", "2927408").trim_start_matches('[').trim_end_matches(']'),
            sample_json("city-1-mirror", "2927408").trim_start_matches('[').trim_end_matches(']')
        );
        let file = write_registry_file(&json);
        let registry = SpiderRegistry::load(&[&file.path]).unwrap();
        let fallbacks = registry.fallbacks("2927408");
        assert_eq!(fallbacks.len(), 2);
        assert_eq!(fallbacks[0].id, "city-1");
        assert_eq!(fallbacks[1].id, "city-1-mirror");
    }

    #[test]
    fn fallbacks_for_unknown_territory_is_empty() {
        let file = write_registry_file(&sample_json("city-1", "2927408"));
        let registry = SpiderRegistry::load(&[&file.path]).unwrap();
        assert!(registry.fallbacks("0000000").is_empty());
    }

    #[test]
    fn create_spider_builds_tenant_slug_spider_for_dosp() {
        let file = write_registry_file(&sample_json("city-1", "2927408"));
        let registry = SpiderRegistry::load(&[&file.path]).unwrap();
        let config = registry.get("city-1").unwrap();
        let runtime = SpiderRuntime {
            http: reqwest::Client::new(),
            rate_limiter: Arc::new(RateLimiter::new(5, Default::default())),
            circuit_breaker_config: CircuitBreakerConfig {
                failure_threshold: 5,
                reset_timeout: std::time::Duration::from_secs(60),
                success_threshold: 2,
            },
        };
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        )
        .unwrap();
        let spider = create_spider(config, range, &runtime).unwrap();
        assert_eq!(spider.request_count(), 0);
    }
}
