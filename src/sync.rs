//! Synchronization primitives for search control.
//!
//! Provides the shared cancellation and timing state that the dispatcher,
//! worker, and watchdog threads cooperate through.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct TimeWindow {
    started: Option<Instant>,
    deadline: Option<Instant>,
}

/// Shared search-control state for one engine instance.
///
/// Two independent cancellation reasons are tracked: a full stop (user or
/// dispatcher requested) and a timeout (watchdog deadline reached). Both
/// mean "stop now" to a polling work body, but they are exposed separately
/// so a search can still report its best move on timeout while aborting
/// silently on a full stop.
///
/// Cancellation is cooperative: setting a reason bit never interrupts a
/// thread. Work bodies must poll [`should_stop`](Self::should_stop) at
/// bounded intervals.
#[derive(Debug, Default)]
pub struct SearchControl {
    stop: AtomicBool,
    timeout: AtomicBool,
    searching: AtomicBool,
    ponder_hit: AtomicBool,
    window: Mutex<TimeWindow>,
}

impl SearchControl {
    #[must_use]
    pub fn new() -> Self {
        SearchControl::default()
    }

    /// Clear all reason bits and the timing window.
    ///
    /// Called once at the start of each new background task.
    pub fn reset(&self) {
        self.stop.store(false, Ordering::Relaxed);
        self.timeout.store(false, Ordering::Relaxed);
        self.searching.store(false, Ordering::Relaxed);
        self.ponder_hit.store(false, Ordering::Relaxed);
        *self.window.lock() = TimeWindow::default();
    }

    /// Request a full stop. Safe to call from any thread; never blocks.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Flag the current search as timed out. Set by the watchdog only.
    pub fn request_timeout(&self) {
        self.timeout.store(true, Ordering::Relaxed);
    }

    /// Was a full stop requested?
    #[inline]
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Did the watchdog flag a timeout?
    #[inline]
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.timeout.load(Ordering::Relaxed)
    }

    /// Should the current work body wind down? True for either reason.
    #[inline]
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop_requested() || self.timed_out()
    }

    #[inline]
    #[must_use]
    pub fn is_searching(&self) -> bool {
        self.searching.load(Ordering::Relaxed)
    }

    /// Notify the engine that its predicted opponent move was played.
    pub fn raise_ponder_hit(&self) {
        self.ponder_hit.store(true, Ordering::Relaxed);
    }

    /// Consume a pending ponder-hit notification.
    pub fn take_ponder_hit(&self) -> bool {
        self.ponder_hit.swap(false, Ordering::Relaxed)
    }

    /// Mark a search round as started with an optional time budget.
    ///
    /// Clears a stale timeout from the previous round, records the start
    /// instant, and arms the deadline the watchdog enforces.
    pub fn begin_search(&self, budget: Option<Duration>) {
        self.timeout.store(false, Ordering::Relaxed);
        self.ponder_hit.store(false, Ordering::Relaxed);
        let start = Instant::now();
        *self.window.lock() = TimeWindow {
            started: Some(start),
            deadline: budget.map(|b| start + b),
        };
        self.searching.store(true, Ordering::Relaxed);
    }

    /// Mark the current search round as finished.
    pub fn end_search(&self) {
        self.searching.store(false, Ordering::Relaxed);
    }

    /// Replace the armed deadline (e.g. after a ponder hit).
    pub fn set_deadline(&self, deadline: Option<Instant>) {
        self.window.lock().deadline = deadline;
    }

    /// The absolute instant the current search should stop at, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.window.lock().deadline
    }

    /// When the current search round started, if one is in progress.
    #[must_use]
    pub fn started_at(&self) -> Option<Instant> {
        self.window.lock().started
    }

    /// Time spent in the current search round, zero when idle.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at().map_or(Duration::ZERO, |s| s.elapsed())
    }
}
