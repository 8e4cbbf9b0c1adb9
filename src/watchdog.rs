//! Watchdog thread for search timeouts and progress reporting.
//!
//! One watchdog per engine instance, spawned lazily when the first search
//! starts. On a fixed poll interval it arms the timeout reason bit when
//! the search deadline is imminent and emits periodic progress lines from
//! the shared stats snapshot. It never terminates the worker thread;
//! cancellation stays cooperative.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::engine::StatsCell;
use crate::sync::SearchControl;
use crate::uci::print;

/// Timing knobs for the watchdog loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// How long to sleep between polls of the shared search state.
    pub poll_interval: Duration,
    /// Minimum time between two progress lines.
    pub progress_interval: Duration,
    /// How early before the deadline the timeout bit is raised, to cover
    /// the worker's own polling latency.
    pub timeout_margin: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        WatchdogConfig {
            poll_interval: Duration::from_millis(100),
            progress_interval: Duration::from_millis(1000),
            timeout_margin: Duration::from_millis(100),
        }
    }
}

/// Deadline and progress monitor for one engine instance.
///
/// The loop runs until a full stop is requested, so a plain "stop" command
/// ends the current watchdog round; the next search spawns a fresh one.
/// Polling while no search is in progress does nothing but sleep.
#[derive(Debug)]
pub struct Watchdog {
    config: WatchdogConfig,
    control: Arc<SearchControl>,
    stats: Arc<StatsCell>,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    #[must_use]
    pub fn new(control: Arc<SearchControl>, stats: Arc<StatsCell>, config: WatchdogConfig) -> Self {
        Watchdog {
            config,
            control,
            stats,
            thread: None,
        }
    }

    /// Spawn the watchdog thread if none is running.
    ///
    /// A thread that exited after an earlier stop is joined and replaced.
    /// Call after the shared control state has been reset for a new task.
    pub fn ensure_running(&mut self) {
        if let Some(thread) = &self.thread {
            if !thread.is_finished() {
                return;
            }
            self.join();
        }

        let config = self.config.clone();
        let control = Arc::clone(&self.control);
        let stats = Arc::clone(&self.stats);
        let thread = thread::Builder::new()
            .name("watchdog".to_string())
            .spawn(move || Watchdog::run(&config, &control, &stats))
            .expect("failed to spawn watchdog thread");
        self.thread = Some(thread);
    }

    /// Request a full stop and join the watchdog thread.
    pub fn shutdown(&mut self) {
        self.control.request_stop();
        self.join();
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("watchdog thread died abnormally");
            }
        }
    }

    fn run(config: &WatchdogConfig, control: &SearchControl, stats: &StatsCell) {
        let poll = config.poll_interval.max(Duration::from_millis(1));
        let mut last_progress = Instant::now();

        while !control.stop_requested() {
            let mut sleep_for = poll;

            if control.is_searching() && !control.timed_out() {
                let now = Instant::now();
                match control.deadline() {
                    Some(deadline) if now + config.timeout_margin >= deadline => {
                        // The worker observes the bit on its own cadence;
                        // never terminate it from here.
                        control.request_timeout();
                    }
                    deadline => {
                        if last_progress.elapsed() >= config.progress_interval {
                            print::progress(&stats.snapshot());
                            last_progress = Instant::now();
                        }
                        if let Some(deadline) = deadline {
                            let until = deadline
                                .saturating_duration_since(now)
                                .saturating_sub(config.timeout_margin)
                                .max(Duration::from_millis(1));
                            sleep_for = sleep_for.min(until);
                        }
                    }
                }
            }

            thread::sleep(sleep_for);
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> WatchdogConfig {
        WatchdogConfig {
            poll_interval: Duration::from_millis(5),
            progress_interval: Duration::from_millis(50),
            timeout_margin: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_timeout_bit_raised_near_deadline() {
        let control = Arc::new(SearchControl::new());
        let stats = Arc::new(StatsCell::new());
        let mut watchdog = Watchdog::new(Arc::clone(&control), stats, quick_config());

        control.begin_search(Some(Duration::from_millis(40)));
        watchdog.ensure_running();

        thread::sleep(Duration::from_millis(200));
        assert!(control.timed_out());
        assert!(!control.stop_requested());

        control.end_search();
        watchdog.shutdown();
    }

    #[test]
    fn test_idle_watchdog_raises_nothing() {
        let control = Arc::new(SearchControl::new());
        let stats = Arc::new(StatsCell::new());
        let mut watchdog = Watchdog::new(Arc::clone(&control), stats, quick_config());
        watchdog.ensure_running();

        thread::sleep(Duration::from_millis(50));
        assert!(!control.timed_out());
        watchdog.shutdown();
    }

    #[test]
    fn test_restart_after_stop() {
        let control = Arc::new(SearchControl::new());
        let stats = Arc::new(StatsCell::new());
        let mut watchdog = Watchdog::new(Arc::clone(&control), stats, quick_config());

        watchdog.ensure_running();
        control.request_stop();
        thread::sleep(Duration::from_millis(30));

        // A new round resets the control state and revives the watchdog.
        control.reset();
        watchdog.ensure_running();
        control.begin_search(Some(Duration::from_millis(20)));
        thread::sleep(Duration::from_millis(100));
        assert!(control.timed_out());

        watchdog.shutdown();
    }

    #[test]
    fn test_infinite_search_never_times_out() {
        let control = Arc::new(SearchControl::new());
        let stats = Arc::new(StatsCell::new());
        let mut watchdog = Watchdog::new(Arc::clone(&control), stats, quick_config());

        control.begin_search(None);
        watchdog.ensure_running();
        thread::sleep(Duration::from_millis(60));
        assert!(!control.timed_out());

        watchdog.shutdown();
    }
}
