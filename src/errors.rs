// =============================================================================
// errors.rs — THE CLOSED SET OF THINGS THAT ARE ALLOWED TO GO WRONG
// =============================================================================
//
// Every failure mode in the pipeline belongs to exactly one of a small,
// closed set of kinds. Each kind carries its own retry disposition so
// callers never have to string-match an error message to decide whether
// to back off, fail over, or give up.
// =============================================================================

use std::time::Duration;

/// Errors raised while a `Spider` is discovering or parsing gazette records.
#[derive(Debug, thiserror::Error)]
pub enum SpiderError {
    #[error("network failure talking to {host}: {source}")]
    NetworkFailure {
        host: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{host} returned HTTP {status}")]
    HttpStatus { host: String, status: u16 },

    #[error("could not interpret response from {host}: {reason}")]
    ParseFailure { host: String, reason: String },

    #[error("unknown spider type: {0}")]
    UnknownSpiderType(String),

    #[error("local rate limiter starved for host {host} beyond {waited:?}")]
    RateLimited { host: String, waited: Duration },

    #[error("remote rendering service unavailable for spider {spider_id}")]
    Unavailable { spider_id: String },

    #[error("record failed validation: {0}")]
    ValidationFailure(String),
}

impl SpiderError {
    /// Whether the crawl executor should retry the whole message on this
    /// error.
    pub fn is_retryable(&self) -> bool {
        match self {
            SpiderError::NetworkFailure { .. } => true,
            SpiderError::HttpStatus { status, .. } => {
                *status == 429 || (500..600).contains(status)
            }
            SpiderError::ParseFailure { .. } => false,
            SpiderError::UnknownSpiderType(_) => false,
            SpiderError::RateLimited { .. } => false,
            SpiderError::Unavailable { .. } => false,
            SpiderError::ValidationFailure(_) => false,
        }
    }

    /// Whether the registry should fail over to the next fallback
    /// configuration for this territory. Only `ParseFailure` and
    /// persistent `HttpStatus` trigger failover; input errors never do.
    pub fn should_fail_over(&self) -> bool {
        matches!(
            self,
            SpiderError::ParseFailure { .. } | SpiderError::HttpStatus { .. }
        )
    }
}

/// Errors raised by the dispatcher while translating a request into queue
/// submissions.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid input: {0}")]
    InputInvalid(String),

    #[error("unknown spider id or type: {0}")]
    UnknownSpider(String),

    #[error("queue rejected the submission: {0}")]
    QueueEnqueueFailure(String),
}

/// Errors raised by the crawl executor while processing one queue message.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Spider(#[from] SpiderError),

    #[error("message processing exceeded its deadline of {0:?}")]
    Timeout(Duration),

    #[error("downstream queue rejected the message: {0}")]
    QueueEnqueueFailure(String),
}

/// Errors local to a single analyzer plug-in; never fatal to the
/// orchestration as a whole.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("analyzer '{analyzer}' exceeded its {timeout:?} budget")]
    AnalyzerTimeout { analyzer: String, timeout: Duration },

    #[error("analyzer '{analyzer}' failed internally: {reason}")]
    AnalyzerInternal { analyzer: String, reason: String },

    /// The orchestrator's own input was invalid — this one IS fatal, and
    /// produces a single synthetic `GazetteAnalysis` with no findings.
    #[error("invalid analyzer input: {0}")]
    InvalidInput(String),
}

/// Errors raised by the queue abstraction (the crawl/OCR/webhook queues).
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue '{queue}' rejected batch of {count} messages: {reason}")]
    BatchRejected {
        queue: String,
        count: usize,
        reason: String,
    },

    #[error("queue '{queue}' rejected message: {reason}")]
    SendRejected { queue: String, reason: String },
}

/// Errors raised by the validation harness while driving a sample of
/// adapters.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("city '{0}' is not registered")]
    UnknownCity(String),

    #[error("validation run exceeded its deadline for city '{0}'")]
    Timeout(String),
}
