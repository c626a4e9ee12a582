//! The runner contract: one independently steppable simulation world.
//!
//! The orchestrator only ever sees a runner through [`Runner`]. What a
//! step does (physics, sensors, rendering, per-phase worker threads) is
//! the implementor's business.

use thiserror::Error;

use crate::world::{Systems, WorldDescription};

/// Errors reported by a [`Runner`] or [`RunnerFactory`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RunnerError {
    /// `stop()` was observed before the requested iterations finished.
    #[error("runner stopped before completing its iterations")]
    Stopped,
    /// A step failed inside the runner.
    #[error("step failed: {reason}")]
    StepFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// The runner panicked while advancing.
    #[error("runner panicked while advancing")]
    Panicked,
    /// The runner could not be constructed for its world.
    #[error("construction failed: {reason}")]
    Construction {
        /// Human-readable description of the failure.
        reason: String,
    },
}

/// A single independently steppable simulation world.
///
/// Implementations must be `Send + Sync`: [`advance()`](Runner::advance)
/// runs on a pool thread while [`stop()`](Runner::stop) may arrive from
/// any other thread, including a signal callback.
pub trait Runner: Send + Sync {
    /// Advance the world by `iterations` steps, blocking until done.
    ///
    /// Must poll its own stop condition often enough that a concurrent
    /// `stop()` makes this return promptly.
    fn advance(&self, iterations: u64) -> Result<(), RunnerError>;

    /// Request that the current or next `advance()` return early.
    ///
    /// Non-blocking and idempotent.
    fn stop(&self);

    /// Diagnostic name.
    fn name(&self) -> &str {
        "runner"
    }
}

/// Builds one [`Runner`] from a world description and its loaded systems.
pub trait RunnerFactory {
    /// Create the runner for `world`.
    fn create(
        &self,
        world: &WorldDescription,
        systems: Systems,
    ) -> Result<Box<dyn Runner>, RunnerError>;
}

impl<F> RunnerFactory for F
where
    F: Fn(&WorldDescription, Systems) -> Result<Box<dyn Runner>, RunnerError>,
{
    fn create(
        &self,
        world: &WorldDescription,
        systems: Systems,
    ) -> Result<Box<dyn Runner>, RunnerError> {
        self(world, systems)
    }
}
