// src/activation/best_effort.rs

use std::future::Future;

use tracing::{debug, warn};

use crate::errors::Result;

/// A step whose failure was logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFailure {
    pub step: String,
    pub error: String,
}

/// Runs cleanup steps that must not abort the surrounding operation.
///
/// Each failure is logged at `warn` and kept, so callers can report what was
/// left behind. Fatal steps use `?` instead.
#[derive(Debug, Default)]
pub struct BestEffort {
    failures: Vec<SkippedFailure>,
}

impl BestEffort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Await `fut`; returns whether it succeeded.
    pub async fn attempt<F>(&mut self, step: &str, fut: F) -> bool
    where
        F: Future<Output = Result<()>>,
    {
        match fut.await {
            Ok(()) => {
                debug!(step, "best-effort step succeeded");
                true
            }
            Err(err) => {
                warn!(step, error = %err, "best-effort step failed; continuing");
                self.failures.push(SkippedFailure {
                    step: step.to_string(),
                    error: err.to_string(),
                });
                false
            }
        }
    }

    pub fn failures(&self) -> &[SkippedFailure] {
        &self.failures
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
