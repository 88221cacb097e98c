// src/readiness.rs

//! Bounded exponential-backoff wait for a supervised program to come up.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::supervisor::ProcessSupervisor;
use crate::types::ProgramStatus;

/// Outcome of [`wait_until_ready`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Running,
    /// The supervisor gave up on the program.
    Fatal,
    /// The status could not be read.
    Unavailable(String),
    /// Every poll saw a transitional status; holds the last one seen.
    Exhausted { last: String, tries: u32 },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Running)
    }

    /// Human-readable reason for a non-ready outcome.
    pub fn describe(&self) -> String {
        match self {
            Readiness::Running => "running".to_string(),
            Readiness::Fatal => "supervisor reports FATAL".to_string(),
            Readiness::Unavailable(reason) => format!("status unavailable: {reason}"),
            Readiness::Exhausted { last, tries } => {
                format!("still {last} after {tries} status checks")
            }
        }
    }
}

/// Poll `program` up to `max_tries` times in total.
///
/// `RUNNING` succeeds at once; `FATAL` and an unreadable status fail at once.
/// Any other status sleeps and polls again, starting at `initial_wait` and
/// doubling after every poll. There is no sleep after the final poll.
pub async fn wait_until_ready(
    supervisor: &dyn ProcessSupervisor,
    program: &str,
    max_tries: u32,
    initial_wait: Duration,
) -> Readiness {
    let mut wait = initial_wait;
    let mut last = String::new();

    for attempt in 1..=max_tries {
        let raw = match supervisor.status(program).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(program, attempt, error = %err, "program status unavailable");
                return Readiness::Unavailable(err.to_string());
            }
        };

        match ProgramStatus::parse(&raw) {
            ProgramStatus::Running => {
                info!(program, attempt, "program is running");
                return Readiness::Running;
            }
            ProgramStatus::Fatal => {
                warn!(program, attempt, "program entered FATAL state");
                return Readiness::Fatal;
            }
            ProgramStatus::Transitional(status) => {
                debug!(program, attempt, max_tries, %status, ?wait, "program not running yet");
                last = status;
            }
        }

        if attempt < max_tries {
            tokio::time::sleep(wait).await;
            wait = wait.saturating_mul(2);
        }
    }

    warn!(program, max_tries, %last, "program did not reach RUNNING");
    Readiness::Exhausted {
        last,
        tries: max_tries,
    }
}
