// src/activation/mod.rs

//! Activation: start a new backend from the last good build, health-check
//! it, point the reverse proxy at it and retire the previous backend.

pub mod backend;
pub mod best_effort;
pub mod orchestrator;
pub mod spec;

pub use best_effort::{BestEffort, SkippedFailure};
pub use orchestrator::{ActivationOutcome, ActivationState, Activator};
pub use spec::{ActivationSpec, BackendSpec, ProxySpec, StaticMapping};
