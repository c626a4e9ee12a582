//! Test utilities and mock types for Weft development.
//!
//! Provides mock implementations of the engine contracts ([`System`],
//! [`SystemLoader`], [`RunnerFactory`]), reusable runner fixtures in
//! [`fixtures`], and a one-call tracing setup for tests.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;

use parking_lot::Mutex;
use weft_engine::{
    PluginDescription, Runner, RunnerError, RunnerFactory, System, SystemLoader, Systems,
    WorldDescription,
};

pub use fixtures::{CountingRunner, PhasedRunner};

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A system that only knows its name.
pub struct NamedSystem {
    pub name: String,
}

impl System for NamedSystem {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Loader that instantiates a [`NamedSystem`] for every plugin whose
/// filename was registered, and declines the rest.
#[derive(Default)]
pub struct MapLoader {
    known: HashSet<String>,
    attempts: AtomicUsize,
}

impl MapLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loadable filename.
    pub fn with(mut self, filename: impl Into<String>) -> Self {
        self.known.insert(filename.into());
        self
    }

    /// Number of `load` calls so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl SystemLoader for MapLoader {
    fn load(&self, plugin: &PluginDescription) -> Option<Box<dyn System>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.known.contains(&plugin.filename).then(|| {
            Box::new(NamedSystem {
                name: plugin.name.clone(),
            }) as Box<dyn System>
        })
    }
}

/// What [`CountingFactory`] built for one world.
#[derive(Clone)]
pub struct CreatedRunner {
    pub world: String,
    pub systems: Vec<String>,
    pub runner: CountingRunner,
}

/// Factory producing a [`CountingRunner`] per world and remembering each
/// one so tests can inspect it after the orchestrator takes ownership.
///
/// Worlds listed via [`fail_world`](Self::fail_world) get a runner whose
/// advance fails; [`reject_world`](Self::reject_world) makes creation
/// itself fail.
#[derive(Default)]
pub struct CountingFactory {
    created: Mutex<Vec<CreatedRunner>>,
    failing: HashSet<String>,
    rejected: HashSet<String>,
}

impl CountingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_world(mut self, world: impl Into<String>) -> Self {
        self.failing.insert(world.into());
        self
    }

    pub fn reject_world(mut self, world: impl Into<String>) -> Self {
        self.rejected.insert(world.into());
        self
    }

    /// Everything created so far, in creation order.
    pub fn created(&self) -> Vec<CreatedRunner> {
        self.created.lock().clone()
    }

    /// Handle to the runner created for `world`.
    pub fn runner(&self, world: &str) -> Option<CountingRunner> {
        self.created
            .lock()
            .iter()
            .find(|c| c.world == world)
            .map(|c| c.runner.clone())
    }
}

impl RunnerFactory for CountingFactory {
    fn create(
        &self,
        world: &WorldDescription,
        systems: Systems,
    ) -> Result<Box<dyn Runner>, RunnerError> {
        if self.rejected.contains(&world.name) {
            return Err(RunnerError::Construction {
                reason: format!("world '{}' rejected", world.name),
            });
        }
        let mut runner = CountingRunner::new(world.name.clone());
        if self.failing.contains(&world.name) {
            runner = runner.failing();
        }
        self.created.lock().push(CreatedRunner {
            world: world.name.clone(),
            systems: systems.iter().map(|s| s.name().to_owned()).collect(),
            runner: runner.clone(),
        });
        Ok(Box::new(runner))
    }
}
