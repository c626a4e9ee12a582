//! Cyclic rendezvous barrier with generation counting and cancellation.
//!
//! [`RendezvousBarrier`] blocks a fixed number of participant threads
//! until all of them have arrived, releases them together, and re-arms
//! itself for the next cycle. There is no leader election: the thread
//! whose arrival completes a cycle learns so from the return value
//! ([`BarrierWait::GenerationComplete`]) and can run once-per-cycle work.
//!
//! # Generations
//!
//! Every completed cycle bumps a generation counter. A waiting thread is
//! released only when the generation differs from the value it captured
//! on arrival, so a straggler from cycle K can never be mistaken for an
//! early arrival of cycle K+1.
//!
//! # Cancellation
//!
//! [`cancel()`](RendezvousBarrier::cancel) is one-way and global. It
//! wakes every blocked thread with [`BarrierWait::Cancelled`], and every
//! later `wait()` returns `Cancelled` without blocking. The fast path is
//! a single atomic load.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};

// ── BarrierWait ─────────────────────────────────────────────────

/// Outcome of [`RendezvousBarrier::wait()`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BarrierWait {
    /// This thread was the last arriver and completed the cycle.
    GenerationComplete,
    /// The cycle was completed by another thread's arrival.
    GenerationPending,
    /// The barrier was cancelled. Callers must stop, not retry.
    Cancelled,
}

impl BarrierWait {
    /// Whether this thread completed the cycle.
    pub fn is_last_arriver(self) -> bool {
        self == Self::GenerationComplete
    }

    /// Whether the barrier was cancelled.
    pub fn is_cancelled(self) -> bool {
        self == Self::Cancelled
    }
}

// ── RendezvousBarrier ───────────────────────────────────────────

struct BarrierState {
    /// Threads still expected in the current cycle. Always in
    /// `1..=participants` while the lock is released.
    remaining: usize,
    generation: u64,
}

/// A reusable, generation-counted barrier for `N` participant threads.
///
/// Share it between threads with an [`Arc`](std::sync::Arc).
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
/// use weft_sync::{BarrierWait, RendezvousBarrier};
///
/// let barrier = Arc::new(RendezvousBarrier::new(2));
/// let other = Arc::clone(&barrier);
/// let handle = thread::spawn(move || other.wait());
/// let mine = barrier.wait();
/// let theirs = handle.join().unwrap();
///
/// // Exactly one of the two completed the cycle.
/// assert!(mine.is_last_arriver() ^ theirs.is_last_arriver());
/// assert_ne!(mine, BarrierWait::Cancelled);
/// assert_eq!(barrier.generation(), 1);
/// ```
pub struct RendezvousBarrier {
    participants: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
    cancelled: AtomicBool,
}

// Compile-time assertion: RendezvousBarrier must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<RendezvousBarrier>();
};

impl RendezvousBarrier {
    /// Create a barrier for `participants` threads per cycle.
    ///
    /// # Panics
    ///
    /// Panics if `participants` is zero. Use [`try_new()`](Self::try_new)
    /// to handle that case without panicking.
    pub fn new(participants: usize) -> Self {
        assert!(
            participants > 0,
            "RendezvousBarrier requires at least one participant"
        );
        Self::with_participants(participants)
    }

    /// Create a barrier, returning `None` if `participants` is zero.
    pub fn try_new(participants: usize) -> Option<Self> {
        (participants > 0).then(|| Self::with_participants(participants))
    }

    fn with_participants(participants: usize) -> Self {
        Self {
            participants,
            state: Mutex::new(BarrierState {
                remaining: participants,
                generation: 0,
            }),
            released: Condvar::new(),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Arrive at the barrier and block until the cycle completes or the
    /// barrier is cancelled.
    ///
    /// The last arriver does not block: it advances the generation,
    /// re-arms the counter, wakes everyone, and returns
    /// [`BarrierWait::GenerationComplete`]. All of that happens under
    /// the lock, so it is ordered before any woken thread resumes.
    pub fn wait(&self) -> BarrierWait {
        if self.cancelled.load(Ordering::Acquire) {
            return BarrierWait::Cancelled;
        }

        let mut state = self.state.lock();

        // cancel() may have won the race for the lock.
        if self.cancelled.load(Ordering::Acquire) {
            return BarrierWait::Cancelled;
        }

        let generation = state.generation;
        state.remaining -= 1;
        if state.remaining == 0 {
            state.generation = state.generation.wrapping_add(1);
            state.remaining = self.participants;
            self.released.notify_all();
            return BarrierWait::GenerationComplete;
        }

        while state.generation == generation && !self.cancelled.load(Ordering::Acquire) {
            self.released.wait(&mut state);
        }

        if self.cancelled.load(Ordering::Acquire) {
            BarrierWait::Cancelled
        } else {
            BarrierWait::GenerationPending
        }
    }

    /// Cancel the barrier, waking every blocked thread.
    ///
    /// Idempotent. The generation keeps advancing on repeated calls but
    /// the barrier stays cancelled forever.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.generation = state.generation.wrapping_add(1);
        self.cancelled.store(true, Ordering::Release);
        self.released.notify_all();
    }

    /// Number of threads expected per cycle.
    pub fn participants(&self) -> usize {
        self.participants
    }

    /// Number of completed cycles, plus one per `cancel()` call.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Threads that have arrived in the current, incomplete cycle.
    ///
    /// Diagnostic only: the value may be stale by the time it is read.
    pub fn arrived(&self) -> usize {
        self.participants - self.state.lock().remaining
    }

    /// Whether [`cancel()`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl fmt::Debug for RendezvousBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RendezvousBarrier")
            .field("participants", &self.participants)
            .field("remaining", &state.remaining)
            .field("generation", &state.generation)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Spin until `cond` holds, failing the test after a generous timeout.
    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    #[should_panic(expected = "at least one participant")]
    fn zero_participants_panics() {
        let _ = RendezvousBarrier::new(0);
    }

    #[test]
    fn try_new_rejects_zero() {
        assert!(RendezvousBarrier::try_new(0).is_none());
        assert_eq!(RendezvousBarrier::try_new(3).unwrap().participants(), 3);
    }

    #[test]
    fn single_participant_always_completes() {
        let barrier = RendezvousBarrier::new(1);
        for expected in 1..=5 {
            assert_eq!(barrier.wait(), BarrierWait::GenerationComplete);
            assert_eq!(barrier.generation(), expected);
        }
        assert_eq!(barrier.arrived(), 0);
    }

    #[test]
    fn arrival_order_scenario() {
        let barrier = Arc::new(RendezvousBarrier::new(3));
        let before = barrier.generation();

        let a = {
            let b = Arc::clone(&barrier);
            thread::spawn(move || b.wait())
        };
        wait_until(|| barrier.arrived() == 1);

        let b = {
            let b = Arc::clone(&barrier);
            thread::spawn(move || b.wait())
        };
        wait_until(|| barrier.arrived() == 2);

        // C is the third arrival.
        assert_eq!(barrier.wait(), BarrierWait::GenerationComplete);
        assert_eq!(a.join().unwrap(), BarrierWait::GenerationPending);
        assert_eq!(b.join().unwrap(), BarrierWait::GenerationPending);
        assert_eq!(barrier.generation(), before + 1);
        assert_eq!(barrier.arrived(), 0);
    }

    #[test]
    fn cancel_wakes_blocked_threads() {
        let n = 4;
        let barrier = Arc::new(RendezvousBarrier::new(n));
        let handles: Vec<_> = (0..n - 1)
            .map(|_| {
                let b = Arc::clone(&barrier);
                thread::spawn(move || b.wait())
            })
            .collect();
        wait_until(|| barrier.arrived() == n - 1);

        let start = Instant::now();
        barrier.cancel();
        for h in handles {
            assert_eq!(h.join().unwrap(), BarrierWait::Cancelled);
        }
        assert!(start.elapsed() < Duration::from_secs(5));

        assert!(barrier.is_cancelled());
        assert_eq!(barrier.wait(), BarrierWait::Cancelled);
    }

    #[test]
    fn cancel_is_idempotent() {
        let barrier = RendezvousBarrier::new(2);
        barrier.cancel();
        let after_first = barrier.generation();
        barrier.cancel();
        assert!(barrier.is_cancelled());
        assert!(barrier.generation() > after_first);
        for _ in 0..3 {
            assert!(barrier.wait().is_cancelled());
        }
    }

    #[test]
    fn cancelled_single_participant_does_not_complete() {
        let barrier = RendezvousBarrier::new(1);
        barrier.cancel();
        assert_eq!(barrier.wait(), BarrierWait::Cancelled);
    }

    #[test]
    fn outcome_helpers() {
        assert!(BarrierWait::GenerationComplete.is_last_arriver());
        assert!(!BarrierWait::GenerationPending.is_last_arriver());
        assert!(BarrierWait::Cancelled.is_cancelled());
        assert!(!BarrierWait::GenerationComplete.is_cancelled());
    }

    #[test]
    fn debug_reports_state() {
        let barrier = RendezvousBarrier::new(2);
        let text = format!("{barrier:?}");
        assert!(text.contains("participants: 2"));
        assert!(text.contains("cancelled: false"));
    }
}
