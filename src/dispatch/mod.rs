// =============================================================================
// dispatch/mod.rs — REQUEST TO QUEUE SUBMISSION
// =============================================================================
//
// Translates a caller's request ("crawl these cities over this date
// window") into a batched stream of crawl-queue messages. This is the
// seam an out-of-process HTTP/CLI layer attaches to: every type here
// matches a wire shape directly, and submission goes through the
// `CrawlQueueClient` trait rather than a concrete broker.
// =============================================================================

pub mod http;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::DispatchError;
use crate::models::{CrawlQueueMessage, DateRange, SpiderConfig, SpiderType};
use crate::queue::{CrawlQueueClient, SendOutcome};
use crate::spiders::registry::SpiderRegistry;

/// Maximum number of messages submitted to the queue in one `send_batch`
/// call — the downstream broker enforces this ceiling.
const BATCH_SIZE: usize = 100;

/// `{cities: list | "all", ...}` — a bare `"all"` string or an explicit
/// list of registry ids.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CitiesSelector {
    All(AllMarker),
    Ids(Vec<String>),
}

/// The literal string `"all"`, deserialized as its own marker type so
/// `CitiesSelector`'s untagged enum can distinguish it from a list.
#[derive(Debug, Clone)]
pub struct AllMarker;

impl<'de> Deserialize<'de> for AllMarker {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s == "all" {
            Ok(AllMarker)
        } else {
            Err(serde::de::Error::custom(format!("expected \"all\", got \"{s}\"")))
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlRequest {
    pub cities: CitiesSelector,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Success,
    Partial,
    Failure,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResponse {
    pub enqueued: usize,
    pub failed: usize,
    pub status: DispatchStatus,
    pub city_ids: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayYesterdayRequest {
    pub platform_filter: Option<SpiderType>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpiderListing {
    pub id: String,
    pub name: String,
    pub territory_id: String,
    pub spider_type: SpiderType,
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total: usize,
    pub by_platform: HashMap<String, usize>,
    pub estimated_batches: usize,
}

pub struct Dispatcher<Q: CrawlQueueClient> {
    registry: Arc<SpiderRegistry>,
    queue: Arc<Q>,
    search_days: i64,
}

impl<Q: CrawlQueueClient> Dispatcher<Q> {
    pub fn new(registry: Arc<SpiderRegistry>, queue: Arc<Q>, search_days: i64) -> Self {
        Self { registry, queue, search_days }
    }

    /// Translate a crawl request into queue messages and submit them in
    /// batches of `BATCH_SIZE`, falling back to per-message submission
    /// when a batch is rejected wholesale.
    pub async fn submit_crawl(&self, request: CrawlRequest) -> Result<CrawlResponse, DispatchError> {
        let configs = self.resolve_cities(&request.cities)?;
        if configs.is_empty() {
            return Err(DispatchError::InputInvalid("no matching cities to crawl".to_string()));
        }

        let range = self.effective_range(request.start_date, request.end_date);
        let messages: Vec<CrawlQueueMessage> = configs
            .iter()
            .map(|c| to_message(c, range))
            .collect();
        let city_ids: Vec<String> = configs.iter().map(|c| c.id.clone()).collect();

        let (enqueued, failed) = submit_in_batches(self.queue.as_ref(), messages).await;
        Ok(response_from_counts(enqueued, failed, city_ids))
    }

    /// Force a 2-day (today + yesterday) window, optionally restricted to
    /// a single platform.
    pub async fn submit_today_yesterday(
        &self,
        request: TodayYesterdayRequest,
    ) -> Result<CrawlResponse, DispatchError> {
        let today = Utc::now().date_naive();
        let range = DateRange::today_yesterday(today);

        let configs: Vec<&SpiderConfig> = match request.platform_filter {
            Some(spider_type) => self.registry.by_type(spider_type),
            None => self.registry.all().collect(),
        };
        if configs.is_empty() {
            return Err(DispatchError::InputInvalid("no registered spiders match the filter".to_string()));
        }

        let messages: Vec<CrawlQueueMessage> = configs.iter().map(|c| to_message(c, range)).collect();
        let city_ids: Vec<String> = configs.iter().map(|c| c.id.clone()).collect();

        let (enqueued, failed) = submit_in_batches(self.queue.as_ref(), messages).await;
        Ok(response_from_counts(enqueued, failed, city_ids))
    }

    pub fn list_spiders(&self, type_filter: Option<SpiderType>) -> Vec<SpiderListing> {
        let configs: Vec<&SpiderConfig> = match type_filter {
            Some(t) => self.registry.by_type(t),
            None => self.registry.all().collect(),
        };
        configs
            .into_iter()
            .map(|c| SpiderListing {
                id: c.id.clone(),
                name: c.name.clone(),
                territory_id: c.territory_id.clone(),
                spider_type: c.spider_type,
                start_date: c.start_date,
            })
            .collect()
    }

    pub fn stats(&self) -> StatsResponse {
        let total = self.registry.len();
        let mut by_platform: HashMap<String, usize> = HashMap::new();
        for config in self.registry.all() {
            *by_platform.entry(format!("{:?}", config.spider_type)).or_insert(0) += 1;
        }
        let estimated_batches = total.div_ceil(BATCH_SIZE);
        StatsResponse { total, by_platform, estimated_batches }
    }

    fn resolve_cities(&self, selector: &CitiesSelector) -> Result<Vec<&SpiderConfig>, DispatchError> {
        match selector {
            CitiesSelector::All(_) => Ok(self.registry.all().collect()),
            CitiesSelector::Ids(ids) => {
                if ids.is_empty() {
                    return Err(DispatchError::InputInvalid("cities list must not be empty".to_string()));
                }
                let mut configs = Vec::with_capacity(ids.len());
                for id in ids {
                    match self.registry.get(id) {
                        Some(config) => configs.push(config),
                        None => return Err(DispatchError::UnknownSpider(id.clone())),
                    }
                }
                Ok(configs)
            }
        }
    }

    fn effective_range(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> DateRange {
        let today = Utc::now().date_naive();
        match (start, end) {
            (None, None) => DateRange::last_30_days(today),
            (Some(s), None) => DateRange::new(s, today).unwrap_or_else(|_| DateRange::last_30_days(today)),
            (None, Some(e)) => {
                let s = e - chrono::Duration::days(self.search_days);
                DateRange::new(s, e).unwrap_or_else(|_| DateRange::last_30_days(today))
            }
            (Some(s), Some(e)) => DateRange::new(s, e).unwrap_or_else(|_| DateRange::last_30_days(today)),
        }
    }
}

fn to_message(config: &SpiderConfig, range: DateRange) -> CrawlQueueMessage {
    CrawlQueueMessage {
        spider_id: config.id.clone(),
        territory_id: config.territory_id.clone(),
        spider_type: config.spider_type,
        config: config.config.clone(),
        date_range: range,
    }
}

fn response_from_counts(enqueued: usize, failed: usize, city_ids: Vec<String>) -> CrawlResponse {
    let status = if failed == 0 {
        DispatchStatus::Success
    } else if enqueued > 0 {
        DispatchStatus::Partial
    } else {
        DispatchStatus::Failure
    };
    CrawlResponse { enqueued, failed, status, city_ids, error: None }
}

/// Submit `messages` in fixed-size batches. Each batch is attempted as
/// one bulk `send_batch` call; if the whole batch comes back rejected
/// (queue-level failure), fall back to submitting every message in that
/// batch individually and count per-message failures.
async fn submit_in_batches<Q: CrawlQueueClient + ?Sized>(
    queue: &Q,
    messages: Vec<CrawlQueueMessage>,
) -> (usize, usize) {
    let mut enqueued = 0usize;
    let mut failed = 0usize;

    for (batch_index, chunk) in messages.chunks(BATCH_SIZE).enumerate() {
        match queue.send_batch(chunk.to_vec()).await {
            Ok(outcomes) => {
                for outcome in outcomes {
                    match outcome {
                        SendOutcome::Accepted => enqueued += 1,
                        SendOutcome::Rejected(reason) => {
                            warn!(batch = batch_index, reason, "message rejected from batch submission");
                            failed += 1;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(batch = batch_index, error = %e, "bulk batch submission failed, falling back to per-message submission");
                for message in chunk {
                    match queue.send_one(message.clone()).await {
                        Ok(()) => enqueued += 1,
                        Err(e) => {
                            warn!(spider_id = %message.spider_id, error = %e, "per-message submission failed");
                            failed += 1;
                        }
                    }
                }
            }
        }
        info!(batch = batch_index, enqueued, failed, "batch submission progress");
    }

    (enqueued, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use parking_lot::Mutex;

    use crate::errors::QueueError;
    use crate::models::{SpiderConfigVariant, TenantSlugConfig};

    fn config(id: &str, territory_id: &str) -> SpiderConfig {
        SpiderConfig {
            id: id.to_string(),
            name: "Example".to_string(),
            territory_id: territory_id.to_string(),
            spider_type: SpiderType::Dosp,
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            config: SpiderConfigVariant::TenantSlug(TenantSlugConfig {
                base_url: "https://dosp.example.org".to_string(),
                journal: "diario".to_string(),
                section: "1".to_string(),
                tenant_id: "t".to_string(),
            }),
        }
    }

    fn registry_with(configs: Vec<SpiderConfig>) -> Arc<SpiderRegistry> {
        let dir = std::env::temp_dir();
        let unique = uuid::Uuid::new_v4();
        let path = dir.join(format!("dispatch_test_{unique}.json"));
        std::fs::write(&path, serde_json::to_string(&configs).unwrap()).unwrap();
        let registry = SpiderRegistry::load(&[&path]).unwrap();
        let _ = std::fs::remove_file(&path);
        Arc::new(registry)
    }

    /// A queue stub whose batch/per-message acceptance behavior is
    /// controlled by the test.
    struct StubQueue {
        reject_batches: bool,
        reject_every_nth: Option<usize>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl CrawlQueueClient for StubQueue {
        async fn send_batch(&self, messages: Vec<CrawlQueueMessage>) -> Result<Vec<SendOutcome>, QueueError> {
            if self.reject_batches {
                return Err(QueueError::BatchRejected {
                    queue: "crawl".to_string(),
                    count: messages.len(),
                    reason: "stub bulk rejection".to_string(),
                });
            }
            Ok(messages.into_iter().map(|_| SendOutcome::Accepted).collect())
        }

        async fn send_one(&self, _message: CrawlQueueMessage) -> Result<(), QueueError> {
            let mut calls = self.calls.lock();
            *calls += 1;
            if let Some(n) = self.reject_every_nth {
                if *calls % n == 0 {
                    return Err(QueueError::SendRejected {
                        queue: "crawl".to_string(),
                        reason: "stub per-item rejection".to_string(),
                    });
                }
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn bulk_fallback_recovers_all_messages() {
        let configs: Vec<SpiderConfig> = (0..250).map(|i| config(&format!("city-{i}"), "2927408")).collect();
        let registry = registry_with(configs);
        let queue = Arc::new(StubQueue { reject_batches: true, reject_every_nth: None, calls: Mutex::new(0) });
        let dispatcher = Dispatcher::new(registry, queue, 30);

        let response = dispatcher
            .submit_crawl(CrawlRequest { cities: CitiesSelector::All(AllMarker), start_date: None, end_date: None })
            .await
            .unwrap();

        assert_eq!(response.enqueued, 250);
        assert_eq!(response.failed, 0);
        assert_eq!(response.status, DispatchStatus::Success);
    }

    #[tokio::test]
    async fn partial_failure_reports_partial_status() {
        let configs: Vec<SpiderConfig> = (0..250).map(|i| config(&format!("city-{i}"), "2927408")).collect();
        let registry = registry_with(configs);
        let queue = Arc::new(StubQueue { reject_batches: true, reject_every_nth: Some(10), calls: Mutex::new(0) });
        let dispatcher = Dispatcher::new(registry, queue, 30);

        let response = dispatcher
            .submit_crawl(CrawlRequest { cities: CitiesSelector::All(AllMarker), start_date: None, end_date: None })
            .await
            .unwrap();

        assert_eq!(response.enqueued, 225);
        assert_eq!(response.failed, 25);
        assert_eq!(response.status, DispatchStatus::Partial);
    }

    #[tokio::test]
    async fn defaults_to_last_30_days_when_unset() {
        let registry = registry_with(vec![config("city-1", "2927408")]);
        let queue = Arc::new(StubQueue { reject_batches: false, reject_every_nth: None, calls: Mutex::new(0) });
        let dispatcher = Dispatcher::new(registry.clone(), queue.clone(), 30);

        dispatcher
            .submit_crawl(CrawlRequest {
                cities: CitiesSelector::Ids(vec!["city-1".to_string()]),
                start_date: None,
                end_date: None,
            })
            .await
            .unwrap();

        let today = Utc::now().date_naive();
        let expected = DateRange::last_30_days(today);
        let range = dispatcher.effective_range(None, None);
        assert_eq!(range, expected);
    }

    #[tokio::test]
    async fn unknown_city_id_is_rejected() {
        let registry = registry_with(vec![config("city-1", "2927408")]);
        let queue = Arc::new(StubQueue { reject_batches: false, reject_every_nth: None, calls: Mutex::new(0) });
        let dispatcher = Dispatcher::new(registry, queue, 30);

        let result = dispatcher
            .submit_crawl(CrawlRequest {
                cities: CitiesSelector::Ids(vec!["does-not-exist".to_string()]),
                start_date: None,
                end_date: None,
            })
            .await;
        assert!(matches!(result, Err(DispatchError::UnknownSpider(_))));
    }

    #[tokio::test]
    async fn today_yesterday_spans_exactly_two_days() {
        let registry = registry_with(vec![config("city-1", "2927408")]);
        let queue = Arc::new(StubQueue { reject_batches: false, reject_every_nth: None, calls: Mutex::new(0) });
        let dispatcher = Dispatcher::new(registry, queue, 30);

        let response = dispatcher.submit_today_yesterday(TodayYesterdayRequest { platform_filter: None }).await.unwrap();
        assert_eq!(response.enqueued, 1);

        let today = Utc::now().date_naive();
        let range = DateRange::today_yesterday(today);
        assert_eq!((range.end - range.start).num_days(), 1);
    }

    #[test]
    fn stats_reports_estimated_batches() {
        let configs: Vec<SpiderConfig> = (0..150).map(|i| config(&format!("city-{i}"), "2927408")).collect();
        let registry = registry_with(configs);
        let queue = Arc::new(StubQueue { reject_batches: false, reject_every_nth: None, calls: Mutex::new(0) });
        let dispatcher = Dispatcher::new(registry, queue, 30);

        let stats = dispatcher.stats();
        assert_eq!(stats.total, 150);
        assert_eq!(stats.estimated_batches, 2);
    }
}
