// src/build/mod.rs

//! Build pipeline: turns source repositories (or a peer's archived build)
//! into a named, installed environment and records it as last good.

pub mod git;
pub mod pipeline;
pub mod spec;
pub mod virtualenv;

pub use pipeline::BuildPipeline;
pub use spec::{BuildPlan, BuildSource, BuildSpec, CopyFromSpec, PostBuildCommand, TestPlan};
