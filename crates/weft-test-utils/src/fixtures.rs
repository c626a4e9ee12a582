//! Reusable runner fixtures.
//!
//! - [`CountingRunner`]: counts executed iterations and polls its stop
//!   flag before each one. It can also sleep or fail.
//! - [`PhasedRunner`]: steps each iteration as a series of phases run by
//!   several threads that rendezvous on a [`RendezvousBarrier`].
//!
//! Both are cheap handles: clones share counters, so a test can keep one
//! clone for assertions after boxing another into an orchestrator.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use weft_engine::{Runner, RunnerError};
use weft_sync::{BarrierWait, RendezvousBarrier};

// ── CountingRunner ──────────────────────────────────────────────

#[derive(Default)]
struct Counters {
    executed: AtomicU64,
    advances: AtomicU64,
    stop_calls: AtomicU64,
    stopped: AtomicBool,
}

/// Runner that executes one iteration at a time and counts them.
#[derive(Clone)]
pub struct CountingRunner {
    name: Arc<str>,
    delay: Option<Duration>,
    fail: bool,
    counters: Arc<Counters>,
}

impl CountingRunner {
    pub fn new(name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            delay: None,
            fail: false,
            counters: Arc::default(),
        }
    }

    /// Sleep `delay` per iteration.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Execute every requested iteration, then report a step failure.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Iterations executed across all advances.
    pub fn executed(&self) -> u64 {
        self.counters.executed.load(Ordering::SeqCst)
    }

    /// Number of `advance` calls.
    pub fn advances(&self) -> u64 {
        self.counters.advances.load(Ordering::SeqCst)
    }

    /// Number of `stop` calls.
    pub fn stop_calls(&self) -> u64 {
        self.counters.stop_calls.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.counters.stopped.load(Ordering::Acquire)
    }
}

impl Runner for CountingRunner {
    fn advance(&self, iterations: u64) -> Result<(), RunnerError> {
        self.counters.advances.fetch_add(1, Ordering::SeqCst);
        for _ in 0..iterations {
            if self.is_stopped() {
                return Err(RunnerError::Stopped);
            }
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            self.counters.executed.fetch_add(1, Ordering::SeqCst);
        }
        if self.fail {
            return Err(RunnerError::StepFailed {
                reason: format!("{} failed", self.name),
            });
        }
        Ok(())
    }

    fn stop(&self) {
        self.counters.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.counters.stopped.store(true, Ordering::Release);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ── PhasedRunner ────────────────────────────────────────────────

struct PhasedState {
    barrier: RendezvousBarrier,
    /// Cycles completed, counted by each cycle's last arriver.
    cycles: AtomicU64,
    /// Phase arrivals across all threads.
    arrivals: AtomicU64,
    /// Times a thread left a cycle before every thread had arrived.
    violations: AtomicU64,
}

/// Runner whose every iteration is `phases` barrier cycles executed by
/// `threads` scoped worker threads.
///
/// [`stop()`](Runner::stop) cancels the barrier, so every worker leaves
/// at its next rendezvous. Cancellation is permanent: a stopped
/// `PhasedRunner` stays stopped.
#[derive(Clone)]
pub struct PhasedRunner {
    name: Arc<str>,
    threads: usize,
    phases: u64,
    fail_at_cycle: Option<u64>,
    state: Arc<PhasedState>,
}

impl PhasedRunner {
    /// # Panics
    ///
    /// Panics if `threads` is zero.
    pub fn new(name: impl Into<String>, threads: usize, phases: u64) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            threads,
            phases,
            fail_at_cycle: None,
            state: Arc::new(PhasedState {
                barrier: RendezvousBarrier::new(threads),
                cycles: AtomicU64::new(0),
                arrivals: AtomicU64::new(0),
                violations: AtomicU64::new(0),
            }),
        }
    }

    /// Make worker 0 fail at global cycle `cycle`. It cancels the barrier
    /// so its siblings are not left waiting for it.
    pub fn fail_at_cycle(mut self, cycle: u64) -> Self {
        self.fail_at_cycle = Some(cycle);
        self
    }

    pub fn cycles(&self) -> u64 {
        self.state.cycles.load(Ordering::SeqCst)
    }

    pub fn violations(&self) -> u64 {
        self.state.violations.load(Ordering::SeqCst)
    }

    pub fn barrier_generation(&self) -> u64 {
        self.state.barrier.generation()
    }

    fn phase_worker(&self, worker: usize, first_cycle: u64, cycles: u64) -> Result<(), RunnerError> {
        let threads = self.threads as u64;
        for cycle in first_cycle..first_cycle.saturating_add(cycles) {
            if worker == 0 && self.fail_at_cycle == Some(cycle) {
                self.state.barrier.cancel();
                return Err(RunnerError::StepFailed {
                    reason: format!("{} failed at cycle {cycle}", self.name),
                });
            }

            self.state.arrivals.fetch_add(1, Ordering::SeqCst);
            match self.state.barrier.wait() {
                BarrierWait::GenerationComplete => {
                    self.state.cycles.fetch_add(1, Ordering::SeqCst);
                }
                BarrierWait::GenerationPending => {}
                BarrierWait::Cancelled => return Err(RunnerError::Stopped),
            }

            if self.state.arrivals.load(Ordering::SeqCst) < threads.saturating_mul(cycle + 1) {
                self.state.violations.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}

impl Runner for PhasedRunner {
    fn advance(&self, iterations: u64) -> Result<(), RunnerError> {
        if self.state.barrier.is_cancelled() {
            return Err(RunnerError::Stopped);
        }
        let first_cycle = self.cycles();
        let cycles = iterations.saturating_mul(self.phases);

        let results: Vec<Result<(), RunnerError>> = thread::scope(|s| {
            let handles: Vec<_> = (0..self.threads)
                .map(|worker| s.spawn(move || self.phase_worker(worker, first_cycle, cycles)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or(Err(RunnerError::Panicked)))
                .collect()
        });

        // A real failure outranks the Stopped its cancellation caused.
        let mut outcome = Ok(());
        for result in results {
            match result {
                Ok(()) => {}
                Err(RunnerError::Stopped) => {
                    if outcome.is_ok() {
                        outcome = Err(RunnerError::Stopped);
                    }
                }
                Err(e) => return Err(e),
            }
        }
        outcome
    }

    fn stop(&self) {
        self.state.barrier.cancel();
    }

    fn name(&self) -> &str {
        &self.name
    }
}
