// =============================================================================
// circuit_breaker.rs — PER-HOST FAILURE PROTECTION
// =============================================================================
//
// When a publishing platform starts timing out or 500ing, repeatedly
// retrying it is pointless and risks an IP ban. This circuit breaker
// trips after N consecutive failures and stops issuing requests for a
// cooldown period, then sends one tentative request (half-open) to see
// if the host recovered.
//
// The same mechanism backs two uses: per-host request gating in the
// crawl executor, and territory-fallback rotation in the spider
// registry, where "failure" means a spider configuration that keeps
// failing over to the next fallback.
// =============================================================================

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// The three states of a circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum CircuitState {
    /// Normal operation. Requests flow through.
    Closed,
    /// Circuit is tripped. No requests allowed.
    Open,
    /// Testing the waters. One request allowed to see if the host is back.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Internal mutable state for the circuit breaker.
struct CircuitBreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
    last_state_change: Instant,
    total_trips: u64,
}

/// Thread-safe, configurable failure guard for one host or one
/// territory's spider rotation.
pub struct CircuitBreaker {
    /// Name of this circuit breaker, e.g. a hostname or territory id.
    /// Used for logging and the metrics snapshot.
    name: String,

    inner: Arc<RwLock<CircuitBreakerInner>>,

    /// Number of failures before the circuit trips.
    failure_threshold: u32,

    /// How long to wait before trying again after the circuit trips.
    reset_timeout: Duration,

    /// Number of successes in half-open state before fully closing.
    success_threshold: u32,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    ///
    /// # Arguments
    /// * `name` - Human-readable name for logging
    /// * `failure_threshold` - Failures before tripping
    /// * `reset_timeout` - Cooldown duration when tripped
    /// * `success_threshold` - Successes in half-open before closing
    pub fn new(
        name: impl Into<String>,
        failure_threshold: u32,
        reset_timeout: Duration,
        success_threshold: u32,
    ) -> Self {
        let name = name.into();
        info!(
            name = %name,
            failure_threshold = failure_threshold,
            reset_timeout_secs = reset_timeout.as_secs(),
            success_threshold = success_threshold,
            "circuit breaker initialized"
        );

        Self {
            name,
            inner: Arc::new(RwLock::new(CircuitBreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_time: None,
                last_state_change: Instant::now(),
                total_trips: 0,
            })),
            failure_threshold,
            reset_timeout,
            success_threshold,
        }
    }

    /// Check if a request is allowed to proceed.
    ///
    /// Returns `true` if the request can go through, `false` if the
    /// circuit is open and still in its cooldown window. In the
    /// HalfOpen state this transitions on the first call but still
    /// allows the request through for testing.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.write();

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if let Some(last_failure) = inner.last_failure_time {
                    if last_failure.elapsed() >= self.reset_timeout {
                        info!(
                            name = %self.name,
                            "circuit breaker transitioning OPEN -> HALF_OPEN"
                        );
                        inner.state = CircuitState::HalfOpen;
                        inner.success_count = 0;
                        inner.last_state_change = Instant::now();
                        true
                    } else {
                        let remaining = self.reset_timeout - last_failure.elapsed();
                        warn!(
                            name = %self.name,
                            remaining_secs = remaining.as_secs(),
                            "circuit breaker OPEN, request blocked"
                        );
                        false
                    }
                } else {
                    // Open without a recorded failure time shouldn't happen;
                    // fail open rather than wedge the circuit shut forever.
                    true
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    /// Record a successful request.
    pub fn record_success(&self) {
        let mut inner = self.inner.write();

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;

                if inner.success_count >= self.success_threshold {
                    info!(
                        name = %self.name,
                        successes = inner.success_count,
                        "circuit breaker transitioning HALF_OPEN -> CLOSED"
                    );
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.last_state_change = Instant::now();
                }
            }
            CircuitState::Open => {
                warn!(name = %self.name, "success recorded while circuit is OPEN");
            }
        }
    }

    /// Record a failed request.
    pub fn record_failure(&self) {
        let mut inner = self.inner.write();

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                inner.last_failure_time = Some(Instant::now());

                if inner.failure_count >= self.failure_threshold {
                    warn!(
                        name = %self.name,
                        failures = inner.failure_count,
                        "circuit breaker TRIPPED, transitioning CLOSED -> OPEN"
                    );
                    inner.state = CircuitState::Open;
                    inner.total_trips += 1;
                    inner.last_state_change = Instant::now();
                } else {
                    warn!(
                        name = %self.name,
                        failures = inner.failure_count,
                        threshold = self.failure_threshold,
                        "failure recorded"
                    );
                }
            }
            CircuitState::HalfOpen => {
                warn!(name = %self.name, "test request failed in HALF_OPEN, reopening");
                inner.state = CircuitState::Open;
                inner.failure_count = self.failure_threshold;
                inner.last_failure_time = Some(Instant::now());
                inner.total_trips += 1;
                inner.last_state_change = Instant::now();
            }
            CircuitState::Open => {
                inner.last_failure_time = Some(Instant::now());
            }
        }
    }

    /// Get the current state of the circuit breaker.
    pub fn state(&self) -> CircuitState {
        self.inner.read().state.clone()
    }

    /// Get the name of this circuit breaker.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a snapshot of circuit breaker stats for metrics.
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.inner.read();
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: inner.state.clone(),
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_trips: inner.total_trips,
            time_in_current_state_secs: inner.last_state_change.elapsed().as_secs(),
        }
    }
}

/// A serializable snapshot of circuit breaker state for the metrics endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_trips: u64,
    pub time_in_current_state_secs: u64,
}
