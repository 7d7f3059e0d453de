// =============================================================================
// dispatch/http.rs — THE DISPATCHER'S HTTP SURFACE
// =============================================================================
//
// A tiny hand-rolled HTTP/1.1 server in the same idiom as
// `crate::metrics::run_metrics_server`: no web framework, just a raw
// `TcpListener` loop parsing just enough of the request line, query
// string, and JSON body to route to the `Dispatcher`. Good enough for
// an internal service whose only clients are other pipeline components
// and operators, and it avoids pulling in a web framework for a handful
// of routes.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::dispatch::{CrawlRequest, Dispatcher, TodayYesterdayRequest};
use crate::errors::DispatchError;
use crate::models::SpiderType;
use crate::queue::CrawlQueueClient;

const MAX_BODY_BYTES: usize = 1_000_000;

struct ParsedRequest {
    method: String,
    path: String,
    query: HashMap<String, String>,
    body: Vec<u8>,
}

/// Serve the `/crawl`, `/spiders`, `/stats`, and `/health/queue` routes
/// described for this service until `shutdown` fires.
pub async fn run_dispatch_server<Q: CrawlQueueClient + 'static>(
    dispatcher: Arc<Dispatcher<Q>>,
    port: u16,
    shutdown: &mut watch::Receiver<bool>,
) {
    let addr = format!("0.0.0.0:{port}");
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("failed to bind dispatch server on {}: {}", addr, e);
            return;
        }
    };

    info!("dispatch server listening on http://{}", addr);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, _addr)) => {
                        let dispatcher = dispatcher.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, dispatcher).await {
                                warn!(error = %e, "dispatch server connection error");
                            }
                        });
                    }
                    Err(e) => error!("dispatch server accept error: {}", e),
                }
            }
            _ = shutdown.changed() => {
                info!("dispatch server shutting down");
                break;
            }
        }
    }
}

async fn handle_connection<Q: CrawlQueueClient>(stream: TcpStream, dispatcher: Arc<Dispatcher<Q>>) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);
    let request = match read_request(&mut reader).await? {
        Some(r) => r,
        None => return Ok(()),
    };

    let (status, body) = route(&request, dispatcher.as_ref()).await;
    write_response(reader.get_mut(), status, &body).await
}

async fn read_request(reader: &mut BufReader<TcpStream>) -> std::io::Result<Option<ParsedRequest>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let target = parts.next().unwrap_or("/").to_string();

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).await? == 0 {
            break;
        }
        let trimmed = header.trim();
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0).min(MAX_BODY_BYTES);
            }
        }
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body).await?;
    }

    let (path, query) = split_target(&target);
    Ok(Some(ParsedRequest { method, path, query, body }))
}

fn split_target(target: &str) -> (String, HashMap<String, String>) {
    match target.split_once('?') {
        Some((path, qs)) => (path.to_string(), parse_query(qs)),
        None => (target.to_string(), HashMap::new()),
    }
}

fn parse_query(qs: &str) -> HashMap<String, String> {
    qs.split('&')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            Some((
                urlencoding::decode(k).ok()?.into_owned(),
                urlencoding::decode(v).ok()?.into_owned(),
            ))
        })
        .collect()
}

async fn route<Q: CrawlQueueClient>(request: &ParsedRequest, dispatcher: &Dispatcher<Q>) -> (u16, serde_json::Value) {
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => (200, json!({
            "service": "gazette-concurso-pipeline",
            "version": env!("CARGO_PKG_VERSION"),
            "spidersRegistered": dispatcher.stats().total,
        })),
        ("POST", "/crawl") | ("POST", "/crawl/cities") => match parse_body::<CrawlRequest>(&request.body) {
            Ok(req) => crawl_response(dispatcher.submit_crawl(req).await),
            Err(e) => (400, error_body(&e)),
        },
        ("POST", "/crawl/today-yesterday") => match parse_body::<TodayYesterdayRequest>(&request.body) {
            Ok(req) => crawl_response(dispatcher.submit_today_yesterday(req).await),
            Err(e) => (400, error_body(&e)),
        },
        ("GET", "/spiders") => {
            let type_filter = request.query.get("type").and_then(|t| serde_json::from_value::<SpiderType>(json!(t)).ok());
            let spiders = dispatcher.list_spiders(type_filter);
            (200, json!({"total": spiders.len(), "spiders": spiders}))
        }
        ("GET", "/stats") => (200, serde_json::to_value(dispatcher.stats()).unwrap_or(json!({}))),
        ("GET", "/health/queue") => (200, json!({"status": "ok", "spidersRegistered": dispatcher.stats().total})),
        _ => (404, json!({"error": "not found"})),
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, String> {
    if body.is_empty() {
        return serde_json::from_str("{}").map_err(|e| e.to_string());
    }
    serde_json::from_slice(body).map_err(|e| format!("malformed request body: {e}"))
}

fn error_body(message: &str) -> serde_json::Value {
    json!({"success": false, "error": message})
}

fn crawl_response(result: Result<impl Serialize, DispatchError>) -> (u16, serde_json::Value) {
    match result {
        Ok(response) => {
            let mut value = serde_json::to_value(&response).unwrap_or(json!({}));
            let status = value.get("status").and_then(|s| s.as_str()).unwrap_or("success").to_string();
            let http_status = if status == "failure" { 400 } else if status == "partial" { 207 } else { 200 };
            if let Some(obj) = value.as_object_mut() {
                obj.insert("success".to_string(), json!(status != "failure"));
            }
            (http_status, value)
        }
        Err(e @ (DispatchError::InputInvalid(_) | DispatchError::UnknownSpider(_))) => (400, error_body(&e.to_string())),
        Err(e) => (500, error_body(&e.to_string())),
    }
}

async fn write_response(stream: &mut TcpStream, status: u16, body: &serde_json::Value) -> std::io::Result<()> {
    let reason = match status {
        200 => "OK",
        207 => "Multi-Status",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Internal Server Error",
    };
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nAccess-Control-Allow-Origin: *\r\nContent-Length: {}\r\n\r\n{}",
        json.len(),
        json,
    );
    stream.write_all(response.as_bytes()).await
}
