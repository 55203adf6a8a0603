//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: trial calls test whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: first call after reset_timeout (checked lazily)
//! Half-Open → Closed: half_open_success_threshold consecutive successes
//! Half-Open → Open: any trial failure
//! ```
//!
//! # Design Decisions
//! - One breaker per named dependency; breakers never share a lock
//! - The breaker imposes no per-call timeout, only the reset timeout
//! - Open is left only when a caller arrives; there is no timer per breaker
//! - Outcomes of calls admitted before a concurrent transition are ignored
//! - Transition callbacks run detached from the caller

use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::BreakerConfig;
use crate::lifecycle::task::notify_detached;
use crate::observability::metrics;

/// Default number of half-open successes needed to close.
pub const DEFAULT_HALF_OPEN_SUCCESSES: u32 = 5;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "CLOSED"),
            BreakerState::Open => write!(f, "OPEN"),
            BreakerState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Called with (breaker name, from, to) on every transition.
pub type TransitionCallback = Arc<dyn Fn(&str, BreakerState, BreakerState) + Send + Sync>;

/// Result of a protected call.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Rejected without running the operation.
    #[error("circuit breaker {name} is open")]
    Open { name: String },

    /// The operation ran and failed.
    #[error("{0}")]
    Failed(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// The operation's own error, if it ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Open { .. } => None,
            BreakerError::Failed(e) => Some(e),
        }
    }
}

/// Operator view of one breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub failures: u32,
    pub failure_threshold: u32,
    pub half_open_successes: u32,
    pub half_open_success_threshold: u32,
    pub reset_timeout_ms: u64,
    pub since_last_change_ms: u64,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failures: u32,
    half_open_successes: u32,
    last_state_change: Instant,
}

/// Failure-isolation state machine guarding one dependency.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    half_open_success_threshold: u32,
    inner: Mutex<Inner>,
    on_state_change: RwLock<Option<TransitionCallback>>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a closed breaker with the default half-open threshold.
    pub fn new(name: impl Into<String>, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            half_open_success_threshold: DEFAULT_HALF_OPEN_SUCCESSES,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                half_open_successes: 0,
                last_state_change: Instant::now(),
            }),
            on_state_change: RwLock::new(None),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &BreakerConfig) -> Self {
        Self::new(name, config.failure_threshold, config.reset_timeout())
            .with_half_open_successes(config.half_open_success_threshold)
    }

    pub fn with_half_open_successes(mut self, threshold: u32) -> Self {
        self.half_open_success_threshold = threshold.max(1);
        self
    }

    /// Register the transition callback, replacing any previous one.
    pub fn set_on_state_change(&self, callback: TransitionCallback) {
        *self
            .on_state_change
            .write()
            .expect("breaker callback lock poisoned") = Some(callback);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state. Open is reported until a caller performs the
    /// Half-Open check.
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("breaker state lock poisoned")
    }

    /// Run a synchronous operation through the breaker.
    pub fn call<T, E, F>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let admitted = self.admit()?;
        let result = operation();
        self.record(admitted, result.is_ok());
        result.map_err(BreakerError::Failed)
    }

    /// Run an asynchronous operation through the breaker. The future is
    /// not created when the breaker rejects the call.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admitted = self.admit()?;
        let result = operation().await;
        self.record(admitted, result.is_ok());
        result.map_err(BreakerError::Failed)
    }

    /// Force the breaker closed with zeroed counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.failures = 0;
        inner.half_open_successes = 0;
        inner.last_state_change = Instant::now();
        self.transition(&mut inner, BreakerState::Closed);
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failures: inner.failures,
            failure_threshold: self.failure_threshold,
            half_open_successes: inner.half_open_successes,
            half_open_success_threshold: self.half_open_success_threshold,
            reset_timeout_ms: self.reset_timeout.as_millis() as u64,
            since_last_change_ms: inner.last_state_change.elapsed().as_millis() as u64,
        }
    }

    /// Decide whether a call may run, performing Open → Half-Open when the
    /// reset timeout has elapsed.
    fn admit<E>(&self) -> Result<BreakerState, BreakerError<E>> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(inner.state),
            BreakerState::Open => {
                if inner.last_state_change.elapsed() >= self.reset_timeout {
                    self.transition(&mut inner, BreakerState::HalfOpen);
                    Ok(BreakerState::HalfOpen)
                } else {
                    tracing::debug!(breaker = %self.name, "Call rejected, circuit open");
                    Err(BreakerError::Open {
                        name: self.name.clone(),
                    })
                }
            }
        }
    }

    fn record(&self, admitted: BreakerState, success: bool) {
        let mut inner = self.lock();
        if inner.state != admitted {
            return;
        }

        match (inner.state, success) {
            (BreakerState::Closed, true) => inner.failures = 0,
            (BreakerState::Closed, false) => {
                inner.failures += 1;
                if inner.failures >= self.failure_threshold {
                    inner.half_open_successes = 0;
                    self.transition(&mut inner, BreakerState::Open);
                }
            }
            (BreakerState::HalfOpen, true) => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.half_open_success_threshold {
                    inner.failures = 0;
                    inner.half_open_successes = 0;
                    self.transition(&mut inner, BreakerState::Closed);
                }
            }
            (BreakerState::HalfOpen, false) => {
                inner.failures += 1;
                inner.half_open_successes = 0;
                self.transition(&mut inner, BreakerState::Open);
            }
            (BreakerState::Open, _) => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        inner.last_state_change = Instant::now();

        match to {
            BreakerState::Open => tracing::warn!(
                breaker = %self.name,
                %from,
                failures = inner.failures,
                reset_timeout_ms = self.reset_timeout.as_millis() as u64,
                "Circuit opened"
            ),
            _ => tracing::info!(breaker = %self.name, %from, %to, "Circuit state changed"),
        }
        metrics::record_breaker_state(&self.name, to);

        let callback = self
            .on_state_change
            .read()
            .expect("breaker callback lock poisoned")
            .clone();
        if let Some(callback) = callback {
            let name = self.name.clone();
            notify_detached(move || callback(&name, from, to));
        }
    }
}
