//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use scan_resilience::{Alert, AlertHandler, AppError, Context, Error, Result};

/// Alert handler that keeps every alert it receives.
#[derive(Default)]
pub struct RecordingHandler {
    name: String,
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingHandler {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            alerts: Mutex::new(Vec::new()),
        })
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.alerts().into_iter().map(|a| a.title).collect()
    }

    pub fn count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }
}

#[async_trait]
impl AlertHandler for RecordingHandler {
    async fn handle_alert(&self, _ctx: &Context, alert: &Alert) -> Result<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Alert handler that rejects everything.
pub struct FailingHandler {
    pub calls: AtomicU32,
}

impl FailingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl AlertHandler for FailingHandler {
    async fn handle_alert(&self, _ctx: &Context, _alert: &Alert) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::external("webhook", "connection refused").into())
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// A programmable dependency: the first `failures` calls fail with `error`,
/// later calls succeed. Counts every invocation.
#[derive(Clone)]
pub struct FlakyDependency {
    calls: Arc<AtomicU32>,
    failures: u32,
    error: fn() -> Error,
}

impl FlakyDependency {
    pub fn new(failures: u32, error: fn() -> Error) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            failures,
            error,
        }
    }

    pub fn always_failing(error: fn() -> Error) -> Self {
        Self::new(u32::MAX, error)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// One invocation of the dependency.
    pub fn call(&self) -> impl Future<Output = Result<u32>> + Send + 'static {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = if n < self.failures { Err((self.error)()) } else { Ok(n) };
        async move { outcome }
    }
}

pub fn timeout_error() -> Error {
    AppError::timeout("semgrep scan").into()
}

pub fn external_error() -> Error {
    AppError::external("github", "502 Bad Gateway").into()
}

pub fn validation_error() -> Error {
    AppError::validation("invalid repository url").into()
}
