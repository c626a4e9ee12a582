//! Multi-world orchestrator: owns the runners and steps them together.
//!
//! [`Orchestrator`] owns one [`Runner`] per world, created once at build
//! time and released together at teardown. [`run()`](Orchestrator::run)
//! advances every runner by the same number of iterations:
//!
//! - one runner: stepped inline on the calling thread, no pool dispatch;
//! - several runners: one unit of work per runner on the [`WorkerPool`],
//!   awaited as a batch. A failing runner never cancels its siblings.
//!
//! [`stop()`](Orchestrator::stop) only *requests* cessation: it forwards
//! to every runner and returns without waiting. It is safe from any
//! thread, including a [`SignalHub`] callback, and safe to call whether
//! or not a run is in flight.
//!
//! # Ownership
//!
//! ```text
//! Orchestrator ──owns──> Arc<Shared> ──owns──> IndexMap<world, Box<dyn Runner>>
//!      │                      │
//!      │                      └──refs──> Arc<WorkerPool>   (shared, longer-lived)
//!      └──owns──> background run thread (joined on drop)
//! ```
//!
//! The runner map is never mutated after build, so `run`/`stop` iterate
//! it without locking. The only lock guards the `running` flag.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, HostConfig};
use crate::pool::WorkerPool;
use crate::runner::{Runner, RunnerError, RunnerFactory};
use crate::signal::{SignalHub, SubscriptionId};
use crate::world::{load_systems, SystemLoader, WorldDescription};

// ── Error types ─────────────────────────────────────────────────

/// One runner's failed advance, annotated with its position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunnerFailure {
    /// Index of the runner (0-based, world order).
    pub index: usize,
    /// Name of the runner's world.
    pub world: String,
    /// The runner's error.
    pub error: RunnerError,
}

/// Error from [`Orchestrator::run()`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RunError {
    /// Another run is already in flight on this orchestrator.
    #[error("orchestrator is already running")]
    AlreadyRunning,
    /// At least one runner failed to advance.
    #[error("{} of {runners} runners failed", .failures.len())]
    RunnersFailed {
        /// Total runners stepped.
        runners: usize,
        /// The failing runners, in world order.
        failures: Vec<RunnerFailure>,
    },
    /// The background run thread could not be spawned.
    #[error("run thread spawn failed: {reason}")]
    ThreadSpawnFailed {
        /// OS error description.
        reason: String,
    },
    /// The background run thread panicked.
    #[error("run thread panicked")]
    RunThreadPanicked,
}

impl RunError {
    /// Failing runners, empty for non-runner errors.
    pub fn failures(&self) -> &[RunnerFailure] {
        match self {
            Self::RunnersFailed { failures, .. } => failures,
            _ => &[],
        }
    }
}

// ── StartSignal ─────────────────────────────────────────────────

/// One-shot latch fired when a run enters the running state.
///
/// Pass it to [`Orchestrator::run_notify()`] from one thread and
/// [`wait()`](StartSignal::wait) on it from another.
#[derive(Default)]
pub struct StartSignal {
    started: Mutex<bool>,
    cv: Condvar,
}

impl StartSignal {
    /// Create an unfired latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the latch, waking every waiter. Idempotent.
    pub fn notify(&self) {
        *self.started.lock() = true;
        self.cv.notify_all();
    }

    /// Block until the latch fires.
    pub fn wait(&self) {
        let mut started = self.started.lock();
        while !*started {
            self.cv.wait(&mut started);
        }
    }

    /// Block until the latch fires or `timeout` elapses.
    /// Returns whether it fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut started = self.started.lock();
        if !*started {
            self.cv.wait_while_for(&mut started, |s| !*s, timeout);
        }
        *started
    }

    /// Whether the latch has fired.
    pub fn is_set(&self) -> bool {
        *self.started.lock()
    }
}

// ── Shared state ────────────────────────────────────────────────

struct Shared {
    runners: IndexMap<String, Box<dyn Runner>>,
    /// Present whenever there is more than one runner.
    pool: Option<Arc<WorkerPool>>,
    running: Mutex<bool>,
    config: HostConfig,
}

impl Shared {
    /// Enter the running state, firing `started` once it holds.
    fn begin(self: &Arc<Self>, started: Option<&StartSignal>) -> Result<RunningGuard, RunError> {
        let mut running = self.running.lock();
        if *running {
            return Err(RunError::AlreadyRunning);
        }
        *running = true;
        if let Some(started) = started {
            started.notify();
        }
        Ok(RunningGuard {
            shared: Arc::clone(self),
        })
    }

    fn step_all(self: &Arc<Self>, iterations: u64) -> Result<(), RunError> {
        debug!(iterations, runners = self.runners.len(), "run started");
        let failures = match (self.runners.len(), &self.pool) {
            (0, _) => Vec::new(),
            (1, _) | (_, None) => self.step_inline(iterations),
            (_, Some(pool)) => self.step_pooled(pool, iterations),
        };
        debug!(iterations, failed = failures.len(), "run finished");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RunError::RunnersFailed {
                runners: self.runners.len(),
                failures,
            })
        }
    }

    fn step_inline(&self, iterations: u64) -> Vec<RunnerFailure> {
        self.runners
            .values()
            .enumerate()
            .filter_map(|(index, runner)| {
                advance_caught(runner.as_ref(), iterations)
                    .err()
                    .map(|error| self.failure(index, error))
            })
            .collect()
    }

    fn step_pooled(self: &Arc<Self>, pool: &WorkerPool, iterations: u64) -> Vec<RunnerFailure> {
        let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded();
        let mut batch = pool.batch();
        for index in 0..self.runners.len() {
            let shared = Arc::clone(self);
            let outcome_tx = outcome_tx.clone();
            batch.add_work(move || {
                let result = advance_caught(shared.runners[index].as_ref(), iterations);
                let ok = result.is_ok();
                let _ = outcome_tx.send((index, result));
                ok
            });
        }
        drop(outcome_tx);
        let all_ok = batch.wait_for_results();

        let mut outcomes: Vec<Option<Result<(), RunnerError>>> = vec![None; self.runners.len()];
        for (index, result) in outcome_rx.try_iter() {
            outcomes[index] = Some(result);
        }
        // The batch only reports an aggregate; the outcome channel names
        // which runners failed and why. Both must agree.
        let failures: Vec<RunnerFailure> = outcomes
            .into_iter()
            .enumerate()
            .filter_map(|(index, outcome)| match outcome {
                Some(Ok(())) => None,
                Some(Err(error)) => Some(self.failure(index, error)),
                None => Some(self.failure(index, RunnerError::Panicked)),
            })
            .collect();
        debug_assert_eq!(all_ok, failures.is_empty());
        failures
    }

    fn failure(&self, index: usize, error: RunnerError) -> RunnerFailure {
        let world = self
            .runners
            .get_index(index)
            .map(|(name, _)| name.clone())
            .unwrap_or_default();
        warn!(index, world = %world, error = %error, "runner failed to advance");
        RunnerFailure {
            index,
            world,
            error,
        }
    }

    fn stop(&self) {
        debug!(runners = self.runners.len(), "stop requested");
        for runner in self.runners.values() {
            runner.stop();
        }
    }

    fn on_signal(&self, signum: i32) {
        debug!(signum, "orchestrator received signal");
        if self.config.is_termination_signal(signum) {
            self.stop();
        }
    }
}

/// Clears `running` when dropped, even if stepping unwinds.
struct RunningGuard {
    shared: Arc<Shared>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        *self.shared.running.lock() = false;
    }
}

fn advance_caught(runner: &dyn Runner, iterations: u64) -> Result<(), RunnerError> {
    panic::catch_unwind(AssertUnwindSafe(|| runner.advance(iterations)))
        .unwrap_or(Err(RunnerError::Panicked))
}

/// Target of the signal hub callback.
///
/// Callbacks hold the read lock for the whole delivery; teardown takes the
/// write lock to clear the target, so it waits out any delivery in flight
/// and no later delivery can reach the runners.
type SignalTarget = Arc<RwLock<Option<Weak<Shared>>>>;

struct Subscription {
    hub: SignalHub,
    id: SubscriptionId,
    target: SignalTarget,
}

impl Subscription {
    fn cancel(self) {
        self.hub.unsubscribe(self.id);
        *self.target.write() = None;
    }
}

// ── Orchestrator ────────────────────────────────────────────────

/// Owns one runner per world and advances them in lock-step.
///
/// Built with an [`OrchestratorBuilder`]. `run` calls must be serialized
/// by the caller; an overlapping call returns
/// [`RunError::AlreadyRunning`] without stepping anything.
///
/// Dropping the orchestrator unsubscribes from the signal hub (waiting for
/// a delivery already in flight), stops every runner, and joins the
/// background run thread before the runners are released.
pub struct Orchestrator {
    shared: Arc<Shared>,
    run_thread: Mutex<Option<JoinHandle<Result<(), RunError>>>>,
    subscription: Option<Subscription>,
}

// Compile-time assertion: Orchestrator must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Orchestrator>();
};

impl Orchestrator {
    /// Start building an orchestrator.
    pub fn builder(config: HostConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    /// Advance every runner by `iterations`, blocking until all finish.
    pub fn run(&self, iterations: u64) -> Result<(), RunError> {
        self.run_notify(iterations, None)
    }

    /// Like [`run()`](Self::run), firing `started` once the orchestrator
    /// has entered the running state and before any stepping begins.
    ///
    /// The running-state lock is released before stepping, so
    /// [`is_running()`](Self::is_running) and [`stop()`](Self::stop)
    /// never wait on a long step.
    pub fn run_notify(&self, iterations: u64, started: Option<&StartSignal>) -> Result<(), RunError> {
        let _guard = self.shared.begin(started)?;
        self.shared.step_all(iterations)
    }

    /// Run on an owned background thread and return once it is running.
    ///
    /// When this returns `Ok`, [`is_running()`](Self::is_running) is
    /// `true` until the run finishes. Collect the outcome with
    /// [`join_background()`](Self::join_background); the outcome of an
    /// earlier, never-joined background run is discarded.
    pub fn run_in_background(&self, iterations: u64) -> Result<(), RunError> {
        let mut slot = self.run_thread.lock();
        let guard = self.shared.begin(None)?;
        if let Some(previous) = slot.take() {
            let _ = previous.join();
        }

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("weft-run".into())
            .spawn(move || {
                let _guard = guard;
                shared.step_all(iterations)
            })
            .map_err(|e| RunError::ThreadSpawnFailed {
                reason: e.to_string(),
            })?;
        *slot = Some(handle);
        Ok(())
    }

    /// Wait for the background run started by
    /// [`run_in_background()`](Self::run_in_background).
    ///
    /// Returns `None` if there is no background run to join.
    pub fn join_background(&self) -> Option<Result<(), RunError>> {
        let handle = self.run_thread.lock().take()?;
        Some(handle.join().unwrap_or(Err(RunError::RunThreadPanicked)))
    }

    /// Request every runner to stop. Non-blocking and idempotent.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// React to a delivered process signal: stop on termination signals.
    pub fn on_signal(&self, signum: i32) {
        self.shared.on_signal(signum);
    }

    /// Whether a run is in flight.
    pub fn is_running(&self) -> bool {
        *self.shared.running.lock()
    }

    /// Number of owned runners.
    pub fn runner_count(&self) -> usize {
        self.shared.runners.len()
    }

    /// World names, in runner order.
    pub fn runner_names(&self) -> impl Iterator<Item = &str> {
        self.shared.runners.keys().map(String::as_str)
    }

    /// Runner at `index` (world order).
    pub fn runner(&self, index: usize) -> Option<&dyn Runner> {
        self.shared
            .runners
            .get_index(index)
            .map(|(_, runner)| runner.as_ref())
    }

    /// Runner for the world named `world`.
    pub fn runner_by_name(&self, world: &str) -> Option<&dyn Runner> {
        self.shared.runners.get(world).map(|runner| runner.as_ref())
    }

    /// The pool used for multi-runner dispatch, if any.
    pub fn pool(&self) -> Option<&Arc<WorkerPool>> {
        self.shared.pool.as_ref()
    }

    /// The configuration this orchestrator was built with.
    pub fn config(&self) -> &HostConfig {
        &self.shared.config
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
        self.stop();
        if let Some(handle) = self.run_thread.get_mut().take() {
            *self.shared.running.lock() = false;
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("runners", &self.shared.runners.keys().collect::<Vec<_>>())
            .field("running", &self.is_running())
            .field("pooled", &self.shared.pool.is_some())
            .finish()
    }
}

// ── OrchestratorBuilder ─────────────────────────────────────────

/// Collects runners, a pool, and a signal hub for an [`Orchestrator`].
///
/// ```ignore
/// let orchestrator = Orchestrator::builder(HostConfig::default())
///     .signals(&hub)
///     .worlds(&worlds, &loader, &factory)?
///     .build()?;
/// orchestrator.run(1000)?;
/// ```
pub struct OrchestratorBuilder {
    config: HostConfig,
    pool: Option<Arc<WorkerPool>>,
    signals: Option<SignalHub>,
    runners: IndexMap<String, Box<dyn Runner>>,
}

impl OrchestratorBuilder {
    /// Start with no runners, no pool, and no signal hub.
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            pool: None,
            signals: None,
            runners: IndexMap::new(),
        }
    }

    /// Use a shared pool instead of creating one on demand.
    pub fn pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Subscribe the orchestrator to `hub` for termination signals.
    pub fn signals(mut self, hub: &SignalHub) -> Self {
        self.signals = Some(hub.clone());
        self
    }

    /// Add a pre-built runner for the world named `world`.
    pub fn runner(
        mut self,
        world: impl Into<String>,
        runner: Box<dyn Runner>,
    ) -> Result<Self, ConfigError> {
        let world = world.into();
        if self.runners.contains_key(&world) {
            return Err(ConfigError::DuplicateWorld { name: world });
        }
        self.runners.insert(world, runner);
        Ok(self)
    }

    /// Create one runner per world description, in order.
    ///
    /// Each world's plugins go through `loader`; plugins it declines are
    /// skipped. `factory` then builds the runner from the world and the
    /// systems that did load.
    pub fn worlds(
        mut self,
        worlds: &[WorldDescription],
        loader: &dyn SystemLoader,
        factory: &dyn RunnerFactory,
    ) -> Result<Self, ConfigError> {
        for world in worlds {
            let systems = load_systems(world, loader);
            let system_count = systems.len();
            let runner =
                factory
                    .create(world, systems)
                    .map_err(|source| ConfigError::RunnerCreation {
                        world: world.name.clone(),
                        source,
                    })?;
            info!(world = %world.name, systems = system_count, "created runner");
            self = self.runner(world.name.clone(), runner)?;
        }
        Ok(self)
    }

    /// Validate the configuration and build the orchestrator.
    ///
    /// With more than one runner and no shared pool, a pool sized by
    /// [`HostConfig::resolved_worker_count()`] is created and owned.
    pub fn build(self) -> Result<Orchestrator, ConfigError> {
        self.config.validate()?;

        let pool = match self.pool {
            Some(pool) => Some(pool),
            None if self.runners.len() > 1 => Some(Arc::new(WorkerPool::from_config(
                &self.config,
                self.runners.len(),
            )?)),
            None => None,
        };

        let shared = Arc::new(Shared {
            runners: self.runners,
            pool,
            running: Mutex::new(false),
            config: self.config,
        });

        let subscription = self.signals.map(|hub| {
            let target: SignalTarget = Arc::new(RwLock::new(Some(Arc::downgrade(&shared))));
            let callback_target = Arc::clone(&target);
            let id = hub.subscribe(move |signum| {
                let target = callback_target.read();
                if let Some(shared) = target.as_ref().and_then(Weak::upgrade) {
                    shared.on_signal(signum);
                }
            });
            Subscription { hub, id, target }
        });

        info!(
            runners = shared.runners.len(),
            pooled = shared.runners.len() > 1,
            "orchestrator ready"
        );

        Ok(Orchestrator {
            shared,
            run_thread: Mutex::new(None),
            subscription,
        })
    }
}
