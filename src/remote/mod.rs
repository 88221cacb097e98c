// src/remote/mod.rs

//! Remote execution layer.
//!
//! Everything that touches a host goes through a [`RemoteExecutor`]: a
//! handle bound to one host (and one login user) that can run a shell
//! command and write a file.
//!
//! - [`executor`] defines the trait, [`RemoteCommand`] and [`CommandOutput`].
//! - [`process`] spawns the local `sh`/`ssh` child processes.
//! - [`local`] runs commands on this machine (`sh -c`).
//! - [`ssh`] runs commands on a remote host through the `ssh` binary, and
//!   provides the [`HostConnector`] used to open executors per host.
//! - [`probe`] holds small read-only host queries (free port, cpu count,
//!   HTTP probe, file tests).

pub mod executor;
pub mod local;
pub mod probe;
pub mod process;
pub mod ssh;

pub use executor::{BoxFuture, CommandOutput, RemoteCommand, RemoteExecutor, quote, run_checked};
pub use local::LocalExecutor;
pub use ssh::{DefaultConnector, HostConnector, SshExecutor, SshTarget};
