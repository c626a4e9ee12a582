//! Multi-world lock-step orchestration.
//!
//! Provides the [`Orchestrator`] that owns one [`Runner`] per simulation
//! world and advances them together, inline when there is a single world
//! and through a shared [`WorkerPool`] otherwise. Runners are built from
//! [`WorldDescription`]s whose plugins are instantiated by a
//! [`SystemLoader`]. Termination signals reach the orchestrator through a
//! [`SignalHub`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod orchestrator;
pub mod pool;
pub mod runner;
pub mod signal;
pub mod world;

pub use config::{ConfigError, HostConfig};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, RunError, RunnerFailure, StartSignal};
pub use pool::{WorkBatch, WorkerPool};
pub use runner::{Runner, RunnerError, RunnerFactory};
pub use signal::{SignalHub, SubscriptionId, SIGINT, SIGTERM};
pub use world::{load_systems, PluginDescription, System, SystemLoader, Systems, WorldDescription};
