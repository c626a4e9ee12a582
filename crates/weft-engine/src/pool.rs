//! Fixed worker pool for fanning runner steps out across threads.
//!
//! Workers pull boxed jobs from an unbounded crossbeam channel. Work is
//! submitted through a [`WorkBatch`], which owns its own result channel,
//! so several orchestrators can share one pool without seeing each
//! other's results. A panicking unit is caught on the worker and counted
//! as a failure, so [`WorkBatch::wait_for_results()`] always returns.
//!
//! Units must not block on another batch of the same pool: with every
//! worker busy waiting, nothing would be left to run the inner batch.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};

use crate::config::{ConfigError, HostConfig};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed set of threads executing submitted units of work.
pub struct WorkerPool {
    job_tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `threads` workers named `{name_prefix}-{i}`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidWorkerCount`] if `threads` is zero,
    /// [`ConfigError::ThreadSpawnFailed`] if the OS refuses a thread.
    /// Workers spawned before the failure are joined before returning.
    pub fn new(threads: usize, name_prefix: &str) -> Result<Self, ConfigError> {
        if threads == 0 {
            return Err(ConfigError::InvalidWorkerCount { configured: 0 });
        }

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job>();
        let mut pool = Self {
            job_tx: Some(job_tx),
            workers: Vec::with_capacity(threads),
        };

        for i in 0..threads {
            let rx = job_rx.clone();
            let name = format!("{name_prefix}-{i}");
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(rx))
                .map_err(|e| ConfigError::ThreadSpawnFailed {
                    reason: format!("{name}: {e}"),
                })?;
            pool.workers.push(handle);
        }

        Ok(pool)
    }

    /// Spawn a pool sized by `config` for `runner_count` runners.
    pub fn from_config(config: &HostConfig, runner_count: usize) -> Result<Self, ConfigError> {
        config.validate()?;
        Self::new(
            config.resolved_worker_count(runner_count),
            &config.thread_name_prefix,
        )
    }

    /// Number of worker threads.
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Start a new, empty batch of work.
    pub fn batch(&self) -> WorkBatch<'_> {
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        WorkBatch {
            pool: self,
            result_tx,
            result_rx,
            submitted: 0,
        }
    }

    fn submit(&self, job: Job) {
        match &self.job_tx {
            Some(tx) => {
                if let Err(crossbeam_channel::SendError(job)) = tx.send(job) {
                    // Every worker is gone; run it here rather than lose it.
                    job();
                }
            }
            None => job(),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the queue lets every worker drain and exit.
        self.job_tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.workers.len())
            .finish()
    }
}

fn worker_loop(job_rx: Receiver<Job>) {
    let current = thread::current();
    debug!(thread = ?current.name(), "pool worker started");
    while let Ok(job) = job_rx.recv() {
        job();
    }
    debug!(thread = ?current.name(), "pool worker exiting");
}

// ── WorkBatch ───────────────────────────────────────────────────

/// A group of units submitted to a [`WorkerPool`] and awaited together.
pub struct WorkBatch<'p> {
    pool: &'p WorkerPool,
    result_tx: Sender<bool>,
    result_rx: Receiver<bool>,
    submitted: usize,
}

impl WorkBatch<'_> {
    /// Queue `unit` on the pool. Its return value is its outcome.
    pub fn add_work<F>(&mut self, unit: F)
    where
        F: FnOnce() -> bool + Send + 'static,
    {
        let result_tx = self.result_tx.clone();
        self.pool.submit(Box::new(move || {
            let ok = match panic::catch_unwind(AssertUnwindSafe(unit)) {
                Ok(ok) => ok,
                Err(_) => {
                    warn!("work unit panicked");
                    false
                }
            };
            // The batch may have been dropped without waiting.
            let _ = result_tx.send(ok);
        }));
        self.submitted += 1;
    }

    /// Units submitted so far.
    pub fn len(&self) -> usize {
        self.submitted
    }

    /// Whether no unit has been submitted.
    pub fn is_empty(&self) -> bool {
        self.submitted == 0
    }

    /// Block until every submitted unit has finished.
    ///
    /// Returns `true` only if every unit returned `true`. An empty batch
    /// returns `true` immediately. Completion order does not matter.
    pub fn wait_for_results(self) -> bool {
        let WorkBatch {
            result_tx,
            result_rx,
            submitted,
            ..
        } = self;
        // Without our sender, a unit dropped unrun disconnects the channel
        // instead of blocking us forever.
        drop(result_tx);

        let mut all_ok = true;
        for _ in 0..submitted {
            match result_rx.recv() {
                Ok(ok) => all_ok &= ok,
                Err(_) => return false,
            }
        }
        all_ok
    }
}
