//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: dependency assumed down, requests fail fast
//! - Half-Open: a limited number of trial requests test for recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: ready_to_trip(counts) after a failure
//! Closed → Closed (new generation): interval elapsed
//! Open → Half-Open: after timeout, evaluated lazily on the next read
//! Half-Open → Closed: max_requests consecutive successes
//! Half-Open → Open: any failure
//! ```
//!
//! # Design Decisions
//! - Per-dependency circuit breaker (no registry, no shared state)
//! - Every state change starts a new generation and resets counts; a result
//!   produced under an older generation is discarded
//! - The guarded call runs outside the lock; only the bookkeeping before and
//!   after it is serialized
//! - State-change hooks, logging and metrics run after the lock is released

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::{self, SharedClock};
use crate::error::{Error, Result};
use crate::lifecycle::Context;
use crate::observability::{metrics, Logger};

/// Open-state duration used when none is configured.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request outcomes within the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    /// Failures over requests; 0.0 before any request.
    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        f64::from(self.total_failures) / f64::from(self.requests)
    }
}

/// Trips after at least 5 requests with a failure ratio of 60% or more.
pub fn default_ready_to_trip(counts: &Counts) -> bool {
    counts.requests >= 5 && counts.failure_ratio() >= 0.6
}

pub type ReadyToTrip = Arc<dyn Fn(&Counts) -> bool + Send + Sync>;
pub type StateChangeHook = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// Configuration for a circuit breaker.
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    /// Name used in errors, logs and metrics.
    pub name: String,

    /// Trial requests allowed while half-open; also the run of successes
    /// needed to close. Zero is treated as one.
    pub max_requests: u32,

    /// Closed-state period after which counts are cleared. Zero never clears.
    pub interval: Duration,

    /// Open-state duration before probing. Zero means 60 seconds.
    pub timeout: Duration,

    /// Decides whether a failure in the closed state opens the circuit.
    pub ready_to_trip: Option<ReadyToTrip>,

    /// Called after every state change with (name, from, to).
    pub on_state_change: Option<StateChangeHook>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            max_requests: 1,
            interval: Duration::ZERO,
            timeout: DEFAULT_TIMEOUT,
            ready_to_trip: None,
            on_state_change: None,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_ready_to_trip<F>(mut self, ready_to_trip: F) -> Self
    where
        F: Fn(&Counts) -> bool + Send + Sync + 'static,
    {
        self.ready_to_trip = Some(Arc::new(ready_to_trip));
        self
    }

    pub fn with_on_state_change<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("name", &self.name)
            .field("max_requests", &self.max_requests)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("custom_ready_to_trip", &self.ready_to_trip.is_some())
            .field("on_state_change", &self.on_state_change.is_some())
            .finish()
    }
}

/// Returned instead of running the request when the breaker rejects it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit breaker '{name}' is {state}")]
pub struct CircuitBreakerError {
    pub name: String,
    pub state: CircuitState,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    /// Closed: end of the counting interval (`None` = never). Open: end of
    /// the timeout. Half-open: always `None`.
    expiry: Option<Instant>,
}

/// A state change observed inside a critical section, reported after it.
#[derive(Debug, Clone, Copy)]
struct Transition {
    from: CircuitState,
    to: CircuitState,
    counts: Counts,
}

/// A state machine that stops calling a dependency that keeps failing.
pub struct CircuitBreaker {
    name: String,
    max_requests: u32,
    interval: Duration,
    timeout: Duration,
    ready_to_trip: ReadyToTrip,
    on_state_change: Option<StateChangeHook>,
    inner: Mutex<BreakerInner>,
    clock: SharedClock,
    logger: Logger,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, clock::system())
    }

    pub fn with_clock(config: CircuitBreakerConfig, clock: SharedClock) -> Self {
        let now = clock.now();
        let breaker = Self {
            name: config.name,
            max_requests: config.max_requests.max(1),
            interval: config.interval,
            timeout: if config.timeout.is_zero() {
                DEFAULT_TIMEOUT
            } else {
                config.timeout
            },
            ready_to_trip: config
                .ready_to_trip
                .unwrap_or_else(|| Arc::new(default_ready_to_trip)),
            on_state_change: config.on_state_change,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry: None,
            }),
            clock,
            logger: Logger::default(),
        };
        breaker.to_new_generation(&mut breaker.lock(), now);
        breaker
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, applying any transition that is due.
    pub fn state(&self) -> CircuitState {
        let mut transitions = Vec::new();
        let state = {
            let mut inner = self.lock();
            self.current_state(&mut inner, self.clock.now(), &mut transitions).0
        };
        self.report(&transitions);
        state
    }

    /// Snapshot of the counts in the current generation.
    pub fn counts(&self) -> Counts {
        self.lock().counts
    }

    /// Run `request` if the breaker accepts it.
    ///
    /// A rejected call returns [`Error::CircuitOpen`] without invoking
    /// `request`. Otherwise the request's own result is returned unchanged.
    /// A panic inside `request` counts as a failure and is then resumed.
    /// Dropping the returned future before it completes also counts as a
    /// failure, so an abandoned half-open trial still settles the state.
    pub async fn execute<T, F, Fut>(&self, ctx: &Context, request: F) -> Result<T>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let generation = self.before_request().map_err(|e| {
            metrics::record_circuit_rejection(&self.name);
            self.logger.in_scope(|| {
                tracing::debug!(name = %self.name, state = %e.state, "Circuit breaker rejected request")
            });
            Error::CircuitOpen(e)
        })?;
        let pending = PendingRequest {
            breaker: self,
            generation,
            armed: true,
        };

        let ctx = ctx.clone();
        match AssertUnwindSafe(async move { request(ctx).await })
            .catch_unwind()
            .await
        {
            Ok(result) => {
                pending.finish(result.is_ok());
                result
            }
            Err(panic) => {
                pending.finish(false);
                std::panic::resume_unwind(panic)
            }
        }
    }

    /// [`execute`](Self::execute) with a background context.
    pub async fn call<T, F, Fut>(&self, request: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute(&Context::background(), |_| request()).await
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn before_request(&self) -> std::result::Result<u64, CircuitBreakerError> {
        let mut transitions = Vec::new();
        let outcome = {
            let mut inner = self.lock();
            let (state, generation) = self.current_state(&mut inner, self.clock.now(), &mut transitions);

            if state == CircuitState::Open
                || (state == CircuitState::HalfOpen && inner.counts.requests >= self.max_requests)
            {
                Err(CircuitBreakerError {
                    name: self.name.clone(),
                    state,
                })
            } else {
                inner.counts.on_request();
                Ok(generation)
            }
        };
        self.report(&transitions);
        outcome
    }

    fn after_request(&self, before: u64, success: bool) {
        let mut transitions = Vec::new();
        {
            let mut inner = self.lock();
            let now = self.clock.now();
            let (state, generation) = self.current_state(&mut inner, now, &mut transitions);
            if generation == before {
                if success {
                    self.on_success(&mut inner, state, now, &mut transitions);
                } else {
                    self.on_failure(&mut inner, state, now, &mut transitions);
                }
            }
        }
        self.report(&transitions);
    }

    fn on_success(
        &self,
        inner: &mut BreakerInner,
        state: CircuitState,
        now: Instant,
        transitions: &mut Vec<Transition>,
    ) {
        inner.counts.on_success();

        if state == CircuitState::HalfOpen && inner.counts.consecutive_successes >= self.max_requests {
            self.set_state(inner, CircuitState::Closed, now, transitions);
        }
    }

    fn on_failure(
        &self,
        inner: &mut BreakerInner,
        state: CircuitState,
        now: Instant,
        transitions: &mut Vec<Transition>,
    ) {
        inner.counts.on_failure();

        match state {
            CircuitState::Closed => {
                if (self.ready_to_trip)(&inner.counts) {
                    self.set_state(inner, CircuitState::Open, now, transitions);
                }
            }
            CircuitState::HalfOpen => self.set_state(inner, CircuitState::Open, now, transitions),
            CircuitState::Open => {}
        }
    }

    fn current_state(
        &self,
        inner: &mut BreakerInner,
        now: Instant,
        transitions: &mut Vec<Transition>,
    ) -> (CircuitState, u64) {
        match inner.state {
            CircuitState::Closed => {
                if inner.expiry.is_some_and(|expiry| expiry < now) {
                    self.to_new_generation(inner, now);
                }
            }
            CircuitState::Open => {
                if inner.expiry.is_some_and(|expiry| expiry < now) {
                    self.set_state(inner, CircuitState::HalfOpen, now, transitions);
                }
            }
            CircuitState::HalfOpen => {}
        }
        (inner.state, inner.generation)
    }

    fn set_state(
        &self,
        inner: &mut BreakerInner,
        state: CircuitState,
        now: Instant,
        transitions: &mut Vec<Transition>,
    ) {
        if inner.state == state {
            return;
        }

        let from = inner.state;
        let counts = inner.counts;
        inner.state = state;
        self.to_new_generation(inner, now);

        transitions.push(Transition { from, to: state, counts });
    }

    fn to_new_generation(&self, inner: &mut BreakerInner, now: Instant) {
        inner.generation += 1;
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            CircuitState::Closed if self.interval.is_zero() => None,
            CircuitState::Closed => Some(now + self.interval),
            CircuitState::Open => Some(now + self.timeout),
            CircuitState::HalfOpen => None,
        };
    }

    fn report(&self, transitions: &[Transition]) {
        for t in transitions {
            metrics::record_circuit_state(&self.name, t.to);
            self.logger.in_scope(|| {
                tracing::info!(
                    name = %self.name,
                    from = %t.from,
                    to = %t.to,
                    requests = t.counts.requests,
                    total_failures = t.counts.total_failures,
                    consecutive_failures = t.counts.consecutive_failures,
                    "Circuit breaker state changed"
                )
            });
            if let Some(hook) = &self.on_state_change {
                hook(&self.name, t.from, t.to);
            }
        }
    }
}

/// An admitted request whose outcome is not recorded yet.
///
/// Dropped without [`finish`](Self::finish) (the caller abandoned the
/// future), it records a failure for its generation.
struct PendingRequest<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    armed: bool,
}

impl PendingRequest<'_> {
    fn finish(mut self, success: bool) {
        self.armed = false;
        self.breaker.after_request(self.generation, success);
    }
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.breaker.logger.in_scope(|| {
            tracing::debug!(name = %self.breaker.name, "Guarded call dropped before completion, counting as failure")
        });
        self.breaker.after_request(self.generation, false);
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("generation", &inner.generation)
            .field("counts", &inner.counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::error::AppError;
    use crate::observability::CapturedLogs;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::oneshot;

    fn breaker(config: CircuitBreakerConfig) -> (CircuitBreaker, Arc<MockClock>) {
        let clock = Arc::new(MockClock::new());
        (CircuitBreaker::with_clock(config, clock.clone()), clock)
    }

    async fn fail(cb: &CircuitBreaker) -> Result<()> {
        cb.call(|| async { Err(AppError::external("scanner", "boom").into()) }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<()> {
        cb.call(|| async { Ok(()) }).await
    }

    #[test]
    fn test_default_ready_to_trip() {
        let mut counts = Counts {
            requests: 4,
            total_failures: 4,
            ..Counts::default()
        };
        assert!(!default_ready_to_trip(&counts));

        counts.requests = 5;
        counts.total_failures = 3;
        assert!(default_ready_to_trip(&counts));

        counts.requests = 7;
        counts.total_failures = 4;
        assert!(!default_ready_to_trip(&counts));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(CircuitState::Closed.to_string(), "CLOSED");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
        let err = CircuitBreakerError {
            name: "github".into(),
            state: CircuitState::Open,
        };
        assert_eq!(err.to_string(), "circuit breaker 'github' is OPEN");
    }

    #[tokio::test]
    async fn test_passes_through_guarded_error() {
        let (cb, _) = breaker(CircuitBreakerConfig::new("semgrep"));
        let err = fail(&cb).await.unwrap_err();
        assert_eq!(err.code(), "EXTERNAL_SERVICE_ERROR");
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.counts().total_failures, 1);
    }

    #[tokio::test]
    async fn test_opens_and_rejects_without_calling() {
        let (cb, _) = breaker(CircuitBreakerConfig::new("semgrep"));
        for _ in 0..5 {
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        let calls = AtomicU32::new(0);
        let err = cb
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(err.is_circuit_breaker());
        match err {
            Error::CircuitOpen(e) => assert_eq!(e.state, CircuitState::Open),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let config = CircuitBreakerConfig::new("bandit")
            .with_max_requests(2)
            .with_timeout(Duration::from_secs(1));
        let (cb, clock) = breaker(config);
        for _ in 0..5 {
            let _ = fail(&cb).await;
        }
        clock.advance(Duration::from_millis(1100));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_half_open_limits_in_flight_trials() {
        let config = CircuitBreakerConfig::new("eslint")
            .with_max_requests(1)
            .with_timeout(Duration::from_secs(1))
            .with_ready_to_trip(|counts| counts.consecutive_failures >= 1);
        let clock = Arc::new(MockClock::new());
        let cb = Arc::new(CircuitBreaker::with_clock(config, clock.clone()));

        let _ = fail(&cb).await;
        clock.advance(Duration::from_secs(2));

        let (tx, rx) = oneshot::channel::<()>();
        let trial = {
            let cb = cb.clone();
            tokio::spawn(async move {
                cb.call(|| async move {
                    let _ = rx.await;
                    Ok(())
                })
                .await
            })
        };
        while cb.counts().requests == 0 {
            tokio::task::yield_now().await;
        }

        match succeed(&cb).await.unwrap_err() {
            Error::CircuitOpen(e) => assert_eq!(e.state, CircuitState::HalfOpen),
            other => panic!("unexpected error: {other}"),
        }

        tx.send(()).unwrap();
        trial.await.unwrap().unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_interval_starts_new_generation() {
        let config = CircuitBreakerConfig::new("trivy").with_interval(Duration::from_secs(10));
        let (cb, clock) = breaker(config);
        for _ in 0..3 {
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.counts().total_failures, 3);

        clock.advance(Duration::from_secs(11));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.counts(), Counts::default());
    }

    #[tokio::test]
    async fn test_stale_generation_result_is_discarded() {
        let config = CircuitBreakerConfig::new("gosec").with_interval(Duration::from_secs(10));
        let clock = Arc::new(MockClock::new());
        let cb = Arc::new(CircuitBreaker::with_clock(config, clock.clone()));

        let (tx, rx) = oneshot::channel::<()>();
        let slow = {
            let cb = cb.clone();
            tokio::spawn(async move {
                cb.call(|| async move {
                    let _ = rx.await;
                    Err::<(), _>(AppError::timeout("gosec scan").into())
                })
                .await
            })
        };
        while cb.counts().requests == 0 {
            tokio::task::yield_now().await;
        }

        clock.advance(Duration::from_secs(11));
        assert_eq!(cb.counts().requests, 1);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.counts().requests, 0);

        tx.send(()).unwrap();
        assert!(slow.await.unwrap().is_err());
        assert_eq!(cb.counts().total_failures, 0);
    }

    #[tokio::test]
    async fn test_panic_is_recorded_and_resumed() {
        let config = CircuitBreakerConfig::new("panicky").with_ready_to_trip(|counts| counts.total_failures >= 1);
        let cb = Arc::new(breaker(config).0);

        let handle = {
            let cb = cb.clone();
            tokio::spawn(async move {
                cb.call(|| async {
                    if true {
                        panic!("scanner crashed");
                    }
                    Ok(())
                })
                .await
            })
        };

        let err = handle.await.unwrap_err();
        assert!(err.is_panic());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_half_open_trial_reopens() {
        let config = CircuitBreakerConfig::new("semgrep")
            .with_max_requests(1)
            .with_timeout(Duration::from_secs(5))
            .with_ready_to_trip(|counts| counts.consecutive_failures >= 1);
        let (cb, clock) = breaker(config);

        let _ = fail(&cb).await;
        clock.advance(Duration::from_secs(6));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let trial = cb.call(|| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });
        assert!(tokio::time::timeout(Duration::from_millis(10), trial).await.is_err());

        assert_eq!(cb.state(), CircuitState::Open);
        clock.advance(Duration::from_secs(6));
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_abandoned_closed_call_counts_as_failure() {
        let (cb, _) = breaker(CircuitBreakerConfig::new("bandit"));
        let call = cb.call(|| async { Ok(()) });
        drop(call);
        // Never polled, never admitted.
        assert_eq!(cb.counts(), Counts::default());

        let (tx, rx) = oneshot::channel::<()>();
        let mut call = Box::pin(cb.call(|| async move {
            let _ = rx.await;
            Ok(())
        }));
        assert!(futures_util::poll!(call.as_mut()).is_pending());
        drop(call);
        drop(tx);

        let counts = cb.counts();
        assert_eq!(counts.requests, 1);
        assert_eq!(counts.total_failures, 1);
    }

    #[tokio::test]
    async fn test_state_change_hook_and_log() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hook_seen = seen.clone();
        let config = CircuitBreakerConfig::new("snyk")
            .with_ready_to_trip(|counts| counts.consecutive_failures >= 2)
            .with_on_state_change(move |name, from, to| {
                hook_seen.lock().unwrap().push((name.to_string(), from, to));
            });
        let (logger, logs) = CapturedLogs::logger();
        let cb = breaker(config).0.with_logger(logger);

        let _ = fail(&cb).await;
        let _ = fail(&cb).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![("snyk".to_string(), CircuitState::Closed, CircuitState::Open)]
        );
        assert!(logs.contains("Circuit breaker state changed"));
        assert!(logs.contains("to=OPEN"));
    }
}
