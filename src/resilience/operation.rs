//! Retry + circuit breaker composition for one named dependency.
//!
//! Every retry attempt passes through the breaker. Once the breaker opens it
//! rejects with a circuit-breaker error, which the default retry predicate
//! treats as non-retryable, so the operation fails on that attempt instead
//! of spending the remaining retry budget.

use std::future::Future;
use std::sync::Mutex;

use crate::clock::{self, SharedClock};
use crate::error::Result;
use crate::lifecycle::Context;
use crate::observability::Logger;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, Counts};
use crate::resilience::retries::{RetryConfig, Retrier};

#[derive(Debug)]
pub struct RetryableOperation {
    breaker: CircuitBreaker,
    retrier: Retrier,
}

impl RetryableOperation {
    /// The breaker is named after the operation unless its config names it.
    pub fn new(name: &str, breaker_config: CircuitBreakerConfig, retry_config: RetryConfig) -> Self {
        Self::with_clock(name, breaker_config, retry_config, clock::system())
    }

    pub fn with_clock(
        name: &str,
        mut breaker_config: CircuitBreakerConfig,
        retry_config: RetryConfig,
        clock: SharedClock,
    ) -> Self {
        if breaker_config.name.is_empty() {
            breaker_config.name = name.to_string();
        }

        Self {
            breaker: CircuitBreaker::with_clock(breaker_config, clock),
            retrier: Retrier::new(retry_config),
        }
    }

    pub fn with_logger(self, logger: Logger) -> Self {
        Self {
            breaker: self.breaker.with_logger(logger.clone()),
            retrier: self.retrier.with_logger(logger),
        }
    }

    /// `operation` is only invoked for attempts the breaker admits.
    pub async fn execute<T, F, Fut>(&self, ctx: &Context, operation: F) -> Result<T>
    where
        F: FnMut(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let operation = &Mutex::new(operation);
        let breaker = &self.breaker;
        self.retrier
            .execute_with_result(ctx, move |attempt_ctx| async move {
                breaker
                    .execute(&attempt_ctx, |ctx| {
                        let mut operation = operation.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                        (&mut *operation)(ctx)
                    })
                    .await
            })
            .await
    }

    pub async fn execute_void<F, Fut>(&self, ctx: &Context, operation: F) -> Result<()>
    where
        F: FnMut(Context) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.execute(ctx, operation).await
    }

    pub fn state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn counts(&self) -> Counts {
        self.breaker.counts()
    }

    pub fn name(&self) -> &str {
        self.breaker.name()
    }
}
