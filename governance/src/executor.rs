//! External execution collaborator
//!
//! The governed call itself (an AI model request in production) sits behind
//! [`Executor`] so the engine never depends on a particular provider.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by an executor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// Provider returned an error
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Provider could not be reached
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    /// Call exceeded the configured timeout
    #[error("execution timed out after {0:?}")]
    Timeout(Duration),
}

/// Performs the metered external call
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run the call and return its textual result
    async fn execute(&self, payload: &str) -> Result<String, ExecutionError>;
}

/// Canned executor for local runs and tests
///
/// Clones share one call counter.
#[derive(Debug, Clone)]
pub struct MockExecutor {
    latency: Duration,
    outcome: Result<String, ExecutionError>,
    calls: Arc<AtomicUsize>,
}

impl MockExecutor {
    /// Always answer with `response`
    pub fn responding(response: impl Into<String>) -> Self {
        Self {
            latency: Duration::ZERO,
            outcome: Ok(response.into()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always fail with `error`
    pub fn failing(error: ExecutionError) -> Self {
        Self {
            latency: Duration::ZERO,
            outcome: Err(error),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait this long before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of times `execute` has been entered
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn execute(&self, payload: &str) -> Result<String, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(payload_chars = payload.chars().count(), "Mock executor called");

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.outcome.clone()
    }
}
