//! Retry logic.
//!
//! # Responsibilities
//! - Determine if a failure is retryable (pluggable predicate)
//! - Execute retries with exponential backoff + jitter
//! - Abort promptly when the caller's context is cancelled
//!
//! # Design Decisions
//! - Only transient failures (timeouts, external dependencies) are retried
//!   by default; an open circuit is systemic and fails fast
//! - The wait between attempts races the context, so a parked retry wakes
//!   as soon as the caller gives up
//! - Jittered backoff prevents synchronized retry storms

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, ErrorKind, Result};
use crate::lifecycle::Context;
use crate::observability::{metrics, Logger};
use crate::resilience::backoff::calculate_backoff;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

pub type RetryPredicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;
pub type RetryHook = Arc<dyn Fn(u32, &Error, Duration) + Send + Sync>;

/// Retry policy.
#[derive(Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub initial_delay: Duration,

    /// Upper bound on any single delay, before jitter.
    pub max_delay: Duration,

    pub backoff_multiplier: f64,

    /// Add up to 10% random delay.
    pub jitter: bool,

    /// Decides whether a failure is worth another attempt.
    /// `None` uses [`default_retryable_errors`].
    pub retryable_errors: Option<RetryPredicate>,

    /// Called with (attempt, error, delay) before each wait.
    pub on_retry: Option<RetryHook>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: true,
            retryable_errors: None,
            on_retry: None,
        }
    }
}

impl RetryConfig {
    /// The default policy: 3 attempts, 100ms doubling up to 30s, jitter on.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_retryable_errors<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.retryable_errors = Some(Arc::new(predicate));
        self
    }

    pub fn with_on_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(u32, &Error, Duration) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    fn normalized(mut self) -> Self {
        self.max_attempts = self.max_attempts.max(1);
        if self.initial_delay.is_zero() {
            self.initial_delay = DEFAULT_INITIAL_DELAY;
        }
        if self.max_delay.is_zero() {
            self.max_delay = DEFAULT_MAX_DELAY;
        }
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier <= 0.0 {
            self.backoff_multiplier = DEFAULT_BACKOFF_MULTIPLIER;
        }
        self
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("jitter", &self.jitter)
            .field("custom_retryable_errors", &self.retryable_errors.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

/// Timeouts and external-dependency failures are retryable. Validation,
/// authentication, authorization, not-found, open-circuit and context
/// errors are not. Anything else is.
pub fn default_retryable_errors(err: &Error) -> bool {
    if matches!(err, Error::Context(_)) || err.is_circuit_breaker() {
        return false;
    }

    !matches!(
        err.kind(),
        ErrorKind::Validation | ErrorKind::Authentication | ErrorKind::Authorization | ErrorKind::NotFound
    )
}

/// Runs operations with bounded retries.
#[derive(Debug, Clone)]
pub struct Retrier {
    config: RetryConfig,
    logger: Logger,
}

impl Retrier {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config: config.normalized(),
            logger: Logger::default(),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Effective policy after normalisation.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub async fn execute<F, Fut>(&self, ctx: &Context, operation: F) -> Result<()>
    where
        F: FnMut(Context) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.execute_with_result(ctx, operation).await
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// runs out of attempts, or `ctx` is done.
    ///
    /// Exhaustion returns [`Error::RetriesExhausted`] wrapping the last
    /// failure. Cancellation returns the context's error.
    pub async fn execute_with_result<T, F, Fut>(&self, ctx: &Context, mut operation: F) -> Result<T>
    where
        F: FnMut(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts;
        let mut attempt = 0;

        loop {
            attempt += 1;

            if let Some(e) = ctx.err() {
                return Err(e.into());
            }

            let err = match operation(ctx.clone()).await {
                Ok(value) => {
                    if attempt > 1 {
                        self.logger.in_scope(|| {
                            tracing::info!(attempt, total_attempts = max_attempts, "Operation succeeded after retry")
                        });
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !self.is_retryable(&err) {
                self.logger
                    .in_scope(|| tracing::debug!(error = %err, attempt, "Error is not retryable, stopping"));
                return Err(err);
            }

            if attempt >= max_attempts {
                self.logger.in_scope(|| {
                    tracing::error!(error = %err, attempts = max_attempts, "Operation failed after all retry attempts")
                });
                metrics::record_retries_exhausted();
                return Err(Error::RetriesExhausted {
                    attempts: max_attempts,
                    last: Box::new(err),
                });
            }

            let delay = calculate_backoff(
                attempt,
                self.config.initial_delay,
                self.config.max_delay,
                self.config.backoff_multiplier,
                self.config.jitter,
            );

            self.logger.in_scope(|| {
                tracing::debug!(
                    error = %err,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying"
                )
            });
            metrics::record_retry_attempt();

            if let Some(hook) = &self.config.on_retry {
                hook(attempt, &err, delay);
            }

            tokio::select! {
                e = ctx.done() => return Err(e.into()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn is_retryable(&self, err: &Error) -> bool {
        match &self.config.retryable_errors {
            Some(predicate) => predicate(err),
            None => default_retryable_errors(err),
        }
    }
}

/// Run `operation` under the default policy.
pub async fn retry<F, Fut>(ctx: &Context, operation: F) -> Result<()>
where
    F: FnMut(Context) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    retry_with_config(ctx, RetryConfig::default(), operation).await
}

pub async fn retry_with_config<F, Fut>(ctx: &Context, config: RetryConfig, operation: F) -> Result<()>
where
    F: FnMut(Context) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    Retrier::new(config).execute(ctx, operation).await
}

pub async fn retry_with_result<T, F, Fut>(ctx: &Context, operation: F) -> Result<T>
where
    F: FnMut(Context) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    Retrier::new(RetryConfig::default())
        .execute_with_result(ctx, operation)
        .await
}
