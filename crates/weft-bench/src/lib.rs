//! Benchmark workloads for the Weft lock-step host.
//!
//! - [`SpinRunner`]: a runner doing a fixed amount of arithmetic per iteration
//! - [`spin_orchestrator`]: an orchestrator over `n` spin runners
//! - [`cycle_barrier`]: drives a barrier through a number of cycles with scoped threads

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::hint::black_box;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

use weft_engine::{ConfigError, HostConfig, Orchestrator, Runner, RunnerError};
use weft_sync::RendezvousBarrier;

/// Runner that burns `work` multiply-adds per iteration.
pub struct SpinRunner {
    name: String,
    work: u64,
    acc: AtomicU64,
    stopped: AtomicBool,
}

impl SpinRunner {
    pub fn new(name: impl Into<String>, work: u64) -> Self {
        Self {
            name: name.into(),
            work,
            acc: AtomicU64::new(1),
            stopped: AtomicBool::new(false),
        }
    }
}

impl Runner for SpinRunner {
    fn advance(&self, iterations: u64) -> Result<(), RunnerError> {
        let mut acc = self.acc.load(Ordering::Relaxed);
        for _ in 0..iterations {
            if self.stopped.load(Ordering::Relaxed) {
                return Err(RunnerError::Stopped);
            }
            for i in 0..self.work {
                acc = black_box(acc.wrapping_mul(6364136223846793005).wrapping_add(i));
            }
        }
        self.acc.store(acc, Ordering::Relaxed);
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Build an orchestrator over `runners` spin runners.
///
/// One runner steps inline; more share a pool of `runners` workers.
pub fn spin_orchestrator(runners: usize, work: u64) -> Result<Orchestrator, ConfigError> {
    let config = HostConfig {
        worker_count: Some(runners.max(1)),
        ..HostConfig::default()
    };
    let mut builder = Orchestrator::builder(config);
    for i in 0..runners {
        let name = format!("spin{i}");
        builder = builder.runner(name.clone(), Box::new(SpinRunner::new(name, work)))?;
    }
    builder.build()
}

/// Run `threads` threads through `cycles` rendezvous on a fresh barrier.
///
/// Returns how many cycles completed.
pub fn cycle_barrier(threads: usize, cycles: u64) -> u64 {
    let barrier = RendezvousBarrier::new(threads);
    let completed = AtomicU64::new(0);
    thread::scope(|s| {
        for _ in 0..threads {
            s.spawn(|| {
                for _ in 0..cycles {
                    if barrier.wait().is_last_arriver() {
                        completed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });
    completed.into_inner()
}
