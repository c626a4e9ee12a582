//! Weft: lock-step stepping of one or more simulation worlds.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the Weft sub-crates. For most users, adding `weft` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
//! use weft::prelude::*;
//!
//! // A runner that counts iterations and honours stop requests.
//! #[derive(Default)]
//! struct Counter {
//!     steps: AtomicU64,
//!     stopped: AtomicBool,
//! }
//!
//! impl Runner for Counter {
//!     fn advance(&self, iterations: u64) -> Result<(), RunnerError> {
//!         for _ in 0..iterations {
//!             if self.stopped.load(Ordering::Acquire) {
//!                 return Err(RunnerError::Stopped);
//!             }
//!             self.steps.fetch_add(1, Ordering::Relaxed);
//!         }
//!         Ok(())
//!     }
//!
//!     fn stop(&self) {
//!         self.stopped.store(true, Ordering::Release);
//!     }
//! }
//!
//! let hub = SignalHub::new();
//! let orchestrator = Orchestrator::builder(HostConfig::default())
//!     .signals(&hub)
//!     .runner("earth", Box::new(Counter::default()))?
//!     .runner("mars", Box::new(Counter::default()))?
//!     .build()?;
//!
//! orchestrator.run(100).expect("both worlds advance");
//!
//! // A termination signal stops every world.
//! hub.deliver(SIGTERM);
//! assert!(orchestrator.run(1).is_err());
//! # Ok::<(), ConfigError>(())
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`sync`] | `weft-sync` | `RendezvousBarrier` and `BarrierWait` |
//! | [`engine`] | `weft-engine` | Runners, world descriptions, worker pool, signals, orchestrator |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Synchronization primitives (`weft-sync`).
///
/// [`sync::RendezvousBarrier`] lets a fixed set of threads meet once per
/// cycle, with cancellation that wakes everyone.
pub use weft_sync as sync;

/// Orchestration (`weft-engine`).
///
/// [`engine::Orchestrator`] owns one [`engine::Runner`] per world and
/// advances them inline or through an [`engine::WorkerPool`].
pub use weft_engine as engine;

/// Common imports for typical Weft usage.
///
/// ```rust
/// use weft::prelude::*;
/// ```
pub mod prelude {
    // Synchronization
    pub use weft_sync::{BarrierWait, RendezvousBarrier};

    // World descriptions and systems
    pub use weft_engine::{
        PluginDescription, System, SystemLoader, Systems, WorldDescription,
    };

    // Runners
    pub use weft_engine::{Runner, RunnerError, RunnerFactory};

    // Orchestration
    pub use weft_engine::{
        ConfigError, HostConfig, Orchestrator, OrchestratorBuilder, RunError, StartSignal,
        WorkerPool,
    };

    // Signals
    pub use weft_engine::{SignalHub, SIGINT, SIGTERM};
}
