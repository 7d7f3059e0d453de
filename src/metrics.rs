// =============================================================================
// metrics.rs — PIPELINE-STAGE COUNTERS
// =============================================================================
//
// Lock-free atomic counters for every pipeline stage (dispatch, crawl,
// OCR handoff, analysis, webhook delivery), exposed as JSON over a tiny
// hand-rolled HTTP server so an operator or dashboard can poll engine
// health without pulling in a full web framework.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info};

/// The metrics snapshot serialized to JSON at the metrics endpoint.
#[derive(Debug, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub spiders_dispatched: u64,
    pub gazettes_crawled: u64,
    pub gazettes_deduplicated: u64,
    pub ocr_jobs_enqueued: u64,
    pub analyses_completed: u64,
    pub concurso_findings: u64,
    pub webhooks_enqueued: u64,
    pub dispatch_errors: u64,
    pub crawl_errors: u64,
    pub analyzer_errors: u64,
    pub queue_send_failures: u64,
    pub uptime_seconds: u64,
    pub gazettes_per_minute: f64,
    pub circuit_breaker_trips: u64,
    pub bloom_filter_rotations: u64,
    pub status: String,
}

/// Thread-safe atomic counters covering every pipeline stage.
pub struct MetricsCollector {
    spiders_dispatched: AtomicU64,
    gazettes_crawled: AtomicU64,
    gazettes_deduplicated: AtomicU64,
    ocr_jobs_enqueued: AtomicU64,
    analyses_completed: AtomicU64,
    concurso_findings: AtomicU64,
    webhooks_enqueued: AtomicU64,
    dispatch_errors: AtomicU64,
    crawl_errors: AtomicU64,
    analyzer_errors: AtomicU64,
    queue_send_failures: AtomicU64,
    circuit_breaker_trips: AtomicU64,
    bloom_filter_rotations: AtomicU64,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            spiders_dispatched: AtomicU64::new(0),
            gazettes_crawled: AtomicU64::new(0),
            gazettes_deduplicated: AtomicU64::new(0),
            ocr_jobs_enqueued: AtomicU64::new(0),
            analyses_completed: AtomicU64::new(0),
            concurso_findings: AtomicU64::new(0),
            webhooks_enqueued: AtomicU64::new(0),
            dispatch_errors: AtomicU64::new(0),
            crawl_errors: AtomicU64::new(0),
            analyzer_errors: AtomicU64::new(0),
            queue_send_failures: AtomicU64::new(0),
            circuit_breaker_trips: AtomicU64::new(0),
            bloom_filter_rotations: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn increment_dispatched(&self) {
        self.spiders_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_crawled(&self, count: u64) {
        self.gazettes_crawled.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_deduplicated(&self) {
        self.gazettes_deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_ocr_enqueued(&self) {
        self.ocr_jobs_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_analyses_completed(&self) {
        self.analyses_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_concurso_findings(&self, count: u64) {
        self.concurso_findings.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_webhooks_enqueued(&self) {
        self.webhooks_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_dispatch_errors(&self) {
        self.dispatch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_crawl_errors(&self) {
        self.crawl_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_analyzer_errors(&self) {
        self.analyzer_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queue_send_failures(&self) {
        self.queue_send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_circuit_breaker_trips(&self) {
        self.circuit_breaker_trips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_bloom_rotations(&self) {
        self.bloom_filter_rotations.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a lock-free snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self.start_time.elapsed().as_secs();
        let crawled = self.gazettes_crawled.load(Ordering::Relaxed);
        let gazettes_per_minute = if uptime > 0 {
            (crawled as f64 / uptime as f64) * 60.0
        } else {
            0.0
        };

        MetricsSnapshot {
            spiders_dispatched: self.spiders_dispatched.load(Ordering::Relaxed),
            gazettes_crawled: crawled,
            gazettes_deduplicated: self.gazettes_deduplicated.load(Ordering::Relaxed),
            ocr_jobs_enqueued: self.ocr_jobs_enqueued.load(Ordering::Relaxed),
            analyses_completed: self.analyses_completed.load(Ordering::Relaxed),
            concurso_findings: self.concurso_findings.load(Ordering::Relaxed),
            webhooks_enqueued: self.webhooks_enqueued.load(Ordering::Relaxed),
            dispatch_errors: self.dispatch_errors.load(Ordering::Relaxed),
            crawl_errors: self.crawl_errors.load(Ordering::Relaxed),
            analyzer_errors: self.analyzer_errors.load(Ordering::Relaxed),
            queue_send_failures: self.queue_send_failures.load(Ordering::Relaxed),
            uptime_seconds: uptime,
            gazettes_per_minute,
            circuit_breaker_trips: self.circuit_breaker_trips.load(Ordering::Relaxed),
            bloom_filter_rotations: self.bloom_filter_rotations.load(Ordering::Relaxed),
            status: "operational".to_string(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a tiny HTTP server serving the metrics snapshot as JSON on
/// every accepted connection, regardless of path or method.
pub async fn run_metrics_server(
    metrics: Arc<MetricsCollector>,
    port: u16,
    shutdown: &mut watch::Receiver<bool>,
) {
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    let addr = format!("0.0.0.0:{port}");
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("failed to bind metrics server on {}: {}", addr, e);
            return;
        }
    };

    info!("metrics server listening on http://{}", addr);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((mut stream, _addr)) => {
                        let snapshot = metrics.snapshot();
                        let json = serde_json::to_string_pretty(&snapshot)
                            .unwrap_or_else(|_| "{}".to_string());

                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nAccess-Control-Allow-Origin: *\r\nContent-Length: {}\r\n\r\n{}",
                            json.len(),
                            json,
                        );

                        let _ = stream.write_all(response.as_bytes()).await;
                    }
                    Err(e) => {
                        error!("metrics server accept error: {}", e);
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("metrics server shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_computes_throughput_after_uptime() {
        let collector = MetricsCollector::new();
        collector.increment_crawled(10);
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.gazettes_crawled, 10);
        assert_eq!(snapshot.status, "operational");
    }

    #[test]
    fn counters_are_independent() {
        let collector = MetricsCollector::new();
        collector.increment_dispatched();
        collector.increment_dispatch_errors();
        collector.increment_crawl_errors();
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.spiders_dispatched, 1);
        assert_eq!(snapshot.dispatch_errors, 1);
        assert_eq!(snapshot.crawl_errors, 1);
        assert_eq!(snapshot.gazettes_crawled, 0);
    }
}
