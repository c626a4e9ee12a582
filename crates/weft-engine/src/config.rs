//! Host configuration, validation, and error types.
//!
//! [`HostConfig`] controls the worker pool an [`Orchestrator`] creates
//! when it is not handed a shared one, and which signal numbers count as
//! termination requests. [`validate()`](HostConfig::validate) checks the
//! structural invariants before anything is spawned.
//!
//! [`Orchestrator`]: crate::orchestrator::Orchestrator

use thiserror::Error;

use crate::runner::RunnerError;
use crate::signal::{SIGINT, SIGTERM};

/// Upper bound on pool threads, explicit or auto-detected.
pub const MAX_WORKERS: usize = 64;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while validating a [`HostConfig`] or building an
/// orchestrator.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `worker_count` was explicitly set to zero.
    #[error("worker_count must be at least 1, got {configured}")]
    InvalidWorkerCount {
        /// The configured value.
        configured: usize,
    },
    /// `thread_name_prefix` was empty.
    #[error("thread_name_prefix must not be empty")]
    EmptyThreadPrefix,
    /// Two worlds share a name.
    #[error("duplicate world name '{name}'")]
    DuplicateWorld {
        /// The repeated name.
        name: String,
    },
    /// The runner factory could not build a runner for a world.
    #[error("world '{world}': runner creation failed")]
    RunnerCreation {
        /// Name of the world being built.
        world: String,
        /// The factory's error.
        #[source]
        source: RunnerError,
    },
    /// A background thread could not be spawned.
    #[error("thread spawn failed: {reason}")]
    ThreadSpawnFailed {
        /// Description of which thread failed.
        reason: String,
    },
}

// ── HostConfig ─────────────────────────────────────────────────────

/// Configuration for an [`Orchestrator`](crate::orchestrator::Orchestrator)
/// and the worker pool it creates on demand.
#[derive(Clone, Debug)]
pub struct HostConfig {
    /// Number of pool threads. `None` = auto-detect
    /// (`available_parallelism`, capped at the runner count).
    pub worker_count: Option<usize>,
    /// Prefix for pool thread names; threads are named `{prefix}-{i}`.
    /// Default: `"weft-worker"`.
    pub thread_name_prefix: String,
    /// Signal numbers that trigger `stop()`. Empty = every signal.
    /// Default: `[SIGINT, SIGTERM]`.
    pub termination_signals: Vec<i32>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            thread_name_prefix: "weft-worker".into(),
            termination_signals: vec![SIGINT, SIGTERM],
        }
    }
}

impl HostConfig {
    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(0) = self.worker_count {
            return Err(ConfigError::InvalidWorkerCount { configured: 0 });
        }
        if self.thread_name_prefix.is_empty() {
            return Err(ConfigError::EmptyThreadPrefix);
        }
        Ok(())
    }

    /// Resolve the pool size for `runner_count` runners.
    ///
    /// Explicit values are clamped to `[1, MAX_WORKERS]`. Auto-detection
    /// never spawns more threads than there are runners to step.
    pub fn resolved_worker_count(&self, runner_count: usize) -> usize {
        match self.worker_count {
            Some(n) => n.clamp(1, MAX_WORKERS),
            None => {
                let cpus = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4);
                cpus.min(runner_count.max(1)).clamp(1, MAX_WORKERS)
            }
        }
    }

    /// Whether `signum` should stop the orchestrator.
    pub fn is_termination_signal(&self, signum: i32) -> bool {
        self.termination_signals.is_empty() || self.termination_signals.contains(&signum)
    }
}
