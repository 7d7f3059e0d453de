// ██████╗  ██╗ █████╗ ██████╗ ██╗ ██████╗
// ██╔══██╗██║██╔══██╗██╔══██╗██║██╔═══██╗
// ██║  ██║██║███████║██████╔╝██║██║   ██║
// ██║  ██║██║██╔══██║██╔══██╗██║██║   ██║
// ██████╔╝██║██║  ██║██║  ██║██║╚██████╔╝
// ╚═════╝ ╚═╝╚═╝  ╚═╝╚═╝  ╚═╝╚═╝ ╚═════╝
//
//  C O N C U R S O   P I P E L I N E
//
// Dispatches per-city crawl jobs across ~20 Brazilian municipal
// gazette platforms, classifies OCR'd text for concurso publico
// notices, and validates platform health.

mod analyzer;
mod circuit_breaker;
mod config;
mod dedup;
mod dispatch;
mod errors;
mod executor;
mod metrics;
mod models;
mod queue;
mod rate_limiter;
mod spiders;
mod validation;

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::dedup::DedupEngine;
use crate::dispatch::Dispatcher;
use crate::executor::Executor;
use crate::metrics::MetricsCollector;
use crate::models::{CrawlQueueMessage, OcrQueueMessage, WebhookQueueMessage};
use crate::queue::InMemoryQueue;
use crate::rate_limiter::RateLimiter;
use crate::spiders::registry::SpiderRegistry;
use crate::spiders::CircuitBreakerConfig;

fn print_banner() {
    let banner = r#"
    ╔══════════════════════════════════════════════════════════════════╗
    ║                                                                  ║
    ║     ██████╗  ██╗ █████╗ ██████╗ ██╗ ██████╗                     ║
    ║     ██╔══██╗██║██╔══██║██╔══██╗██║██╔═══██╗                    ║
    ║     ██║  ██║██║███████║██████╔╝██║██║   ██║                    ║
    ║     ██████╔╝██║██║  ██║██║  ██║██║╚██████╔╝                    ║
    ║     ╚═════╝ ╚═╝╚═╝  ╚═╝╚═╝  ╚═╝╚═╝ ╚═════╝                     ║
    ║                                                                  ║
    ║   Concurso publico gazette crawl + classification pipeline      ║
    ║   Platforms:  ~20 municipal publishing adapters                  ║
    ║   Dedup:      Bloom filter + LRU cache hybrid                    ║
    ║   Analysis:   Aho-Corasick proximity + regex classification       ║
    ║   Queues:     crawl -> OCR -> analyzer -> webhook                 ║
    ║                                                                  ║
    ╚══════════════════════════════════════════════════════════════════╝
    "#;
    println!("{banner}");
}

#[tokio::main(flavor = "multi_thread", worker_threads = 8)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(Config::from_env());

    let default_filter = if config.verbose { "debug" } else { "info" };
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    print_banner();
    info!("concurso pipeline initializing");

    info!(registry_path = %config.spider_registry_path, parallel_workers = config.parallel_workers, "configuration loaded");

    let registry = match SpiderRegistry::load(&[&config.spider_registry_path]) {
        Ok(r) => Arc::new(r),
        Err(e) => {
            error!(error = %e, "failed to load spider registry, starting with an empty one");
            Arc::new(SpiderRegistry::load(&[] as &[&str]).expect("empty registry always loads"))
        }
    };
    info!(registered = registry.len(), "spider registry loaded");

    let runtime = crate::spiders::registry::SpiderRuntime {
        http: reqwest::Client::new(),
        rate_limiter: Arc::new(RateLimiter::new(config.rate_limit_default_rps, config.rate_limit_overrides.clone())),
        circuit_breaker_config: CircuitBreakerConfig {
            failure_threshold: config.circuit_breaker_failure_threshold,
            reset_timeout: config.circuit_breaker_reset_timeout,
            success_threshold: config.circuit_breaker_success_threshold,
        },
    };

    // `concurso-pipeline validate [full|sample|<id,id,...>]` runs the
    // validation harness against the live registry and exits, instead
    // of starting the dispatcher/executor/metrics servers.
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) == Some("validate") {
        return run_validation_cli(registry, runtime, args.get(2).cloned()).await;
    }

    let dedup_engine = Arc::new(DedupEngine::new(
        config.bloom_expected_items,
        config.bloom_false_positive_rate,
        config.lru_cache_size,
        config.bloom_rotation_interval.as_secs(),
    ));
    info!("deduplication engine online");

    let metrics_collector = Arc::new(MetricsCollector::new());

    let crawl_queue: Arc<InMemoryQueue<CrawlQueueMessage>> = Arc::new(InMemoryQueue::new("crawl", 10_000));
    let ocr_queue: Arc<InMemoryQueue<OcrQueueMessage>> = Arc::new(InMemoryQueue::new("ocr", 10_000));
    let webhook_queue: Arc<InMemoryQueue<WebhookQueueMessage>> = Arc::new(InMemoryQueue::new("webhook", 10_000));
    info!("in-process queues online (crawl, ocr, webhook)");

    let dispatcher = Arc::new(Dispatcher::new(registry.clone(), crawl_queue.clone(), config.search_days));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Dispatcher HTTP surface.
    let dispatch_for_server = dispatcher.clone();
    let mut dispatch_shutdown = shutdown_rx.clone();
    let dispatch_port = config.metrics_port + 1;
    let dispatch_handle = tokio::spawn(async move {
        info!("dispatch server starting");
        crate::dispatch::http::run_dispatch_server(dispatch_for_server, dispatch_port, &mut dispatch_shutdown).await;
        info!("dispatch server offline");
    });

    // Crawl executor workers: each drains the in-process crawl queue
    // and runs a message to completion before pulling the next one.
    let executor = Arc::new(
        Executor::new(registry.clone(), runtime.clone(), ocr_queue.clone(), config.max_retries)
            .with_metrics(metrics_collector.clone()),
    );
    let mut executor_handles = Vec::with_capacity(config.parallel_workers);
    for worker_id in 0..config.parallel_workers {
        let executor = executor.clone();
        let crawl_queue = crawl_queue.clone();
        let mut shutdown = shutdown_rx.clone();
        executor_handles.push(tokio::spawn(async move {
            info!(worker_id, "crawl executor worker online");
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {
                        if let Some(message) = crawl_queue.try_recv() {
                            let outcome = executor.execute(message).await;
                            if outcome.dead_lettered {
                                warn!(worker_id, spider_id = %outcome.result.spider_id, "message dead-lettered");
                            }
                        }
                    }
                }
            }
            info!(worker_id, "crawl executor worker offline");
        }));
    }

    // OCR-queue drain: in production an external OCR service consumes
    // this queue and eventually writes results that feed the analyzer.
    // This process only owns the dedup check on the way out.
    let ocr_drain_queue = ocr_queue.clone();
    let ocr_drain_dedup = dedup_engine.clone();
    let ocr_drain_metrics = metrics_collector.clone();
    let mut ocr_drain_shutdown = shutdown_rx.clone();
    let ocr_drain_handle = tokio::spawn(async move {
        info!("OCR queue drain online");
        loop {
            tokio::select! {
                biased;
                _ = ocr_drain_shutdown.changed() => break,
                _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {
                    if let Some(message) = ocr_drain_queue.try_recv() {
                        if ocr_drain_dedup.check_and_insert(&message.gazette.dedup_key()) {
                            ocr_drain_metrics.increment_ocr_enqueued();
                        } else {
                            ocr_drain_metrics.increment_deduplicated();
                        }
                    }
                }
            }
        }
        info!("OCR queue drain offline");
    });

    // Webhook-queue drain: in production an external webhook worker
    // consumes this; here we only count what would have been sent.
    let webhook_drain_queue = webhook_queue.clone();
    let webhook_drain_metrics = metrics_collector.clone();
    let mut webhook_drain_shutdown = shutdown_rx.clone();
    let webhook_drain_handle = tokio::spawn(async move {
        info!("webhook queue drain online");
        loop {
            tokio::select! {
                biased;
                _ = webhook_drain_shutdown.changed() => break,
                _ = tokio::time::sleep(std::time::Duration::from_millis(200)) => {
                    if webhook_drain_queue.try_recv().is_some() {
                        webhook_drain_metrics.increment_webhooks_enqueued();
                    }
                }
            }
        }
        info!("webhook queue drain offline");
    });

    let metrics_for_server = metrics_collector.clone();
    let mut metrics_shutdown = shutdown_rx.clone();
    let metrics_port = config.metrics_port;
    let metrics_handle = tokio::spawn(async move {
        info!(port = metrics_port, "metrics server starting");
        metrics::run_metrics_server(metrics_for_server, metrics_port, &mut metrics_shutdown).await;
        info!("metrics server offline");
    });

    info!("═══════════════════════════════════════════════════════");
    info!(spiders = registry.len(), "concurso pipeline online");
    info!("dispatch http at http://0.0.0.0:{}", dispatch_port);
    info!("metrics at http://0.0.0.0:{}/metrics", metrics_port);
    info!("press ctrl+c for graceful shutdown");
    info!("═══════════════════════════════════════════════════════");

    match signal::ctrl_c().await {
        Ok(()) => warn!("shutdown signal received"),
        Err(err) => error!(error = %err, "signal listener error"),
    }
    let _ = shutdown_tx.send(true);

    info!("waiting for tasks to complete (timeout: 10s)");
    let _ = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        let _ = futures::future::join_all(executor_handles).await;
        let _ = tokio::join!(dispatch_handle, ocr_drain_handle, webhook_drain_handle, metrics_handle);
    })
    .await;

    info!("concurso pipeline offline");
    Ok(())
}

/// Entry point for `validate [full|sample|<id,id,...>]`: drives the
/// named mode's cities through a live crawl and prints a console
/// report. Any other report format is reachable through
/// `validation::report::ValidationReport::render` for callers that
/// embed the harness rather than run it from this binary.
async fn run_validation_cli(
    registry: Arc<SpiderRegistry>,
    runtime: crate::spiders::registry::SpiderRuntime,
    mode_arg: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    use crate::validation::report::ReportFormat;
    use crate::validation::{ValidationHarness, ValidationMode, ValidationOptions};

    let mode = match mode_arg.as_deref() {
        None | Some("full") => ValidationMode::Full,
        Some("sample") => ValidationMode::Sample(0.1),
        Some(ids) => ValidationMode::Single(ids.split(',').map(str::trim).map(str::to_string).collect()),
    };

    let harness = ValidationHarness::new(registry, runtime, ValidationOptions::default());
    let report = harness.run(mode).await?;
    println!("{}", report.render(ReportFormat::Console));
    Ok(())
}
