//! Background task machinery.
//!
//! Long-running commands (search, perft, test suites, registration) run on
//! a dedicated worker thread, one at a time per adapter. The dispatcher
//! owns the handle of the last task started and always stops and joins it
//! before installing a new one.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::params::Params;
use crate::sync::SearchControl;
use crate::uci::print;

/// One background command: parsed from its remaining tokens, then run to
/// completion on a worker thread.
///
/// `parse` reports its own diagnostics and must perform no side effects
/// when it fails. `run` is the cancellable work body; it must poll the
/// shared [`SearchControl`] at bounded intervals.
pub trait Command: Send + 'static {
    /// Usage syntax, e.g. `"perft [depth <x>] [file <x>]"`.
    fn usage(&self) -> String;

    /// One-line description of the command.
    fn description(&self) -> &'static str;

    /// Parse command parameters. Returns false (after printing a
    /// diagnostic) when the given parameters are invalid.
    fn parse(&mut self, params: &mut Params) -> bool;

    /// The work body, executed once on the worker thread.
    fn run(self: Box<Self>);
}

/// Handle to one in-flight background task.
///
/// `stop` only sets cancellation reason bits and never blocks; `wait`
/// blocks the calling thread until the worker has exited. Panics inside
/// the work body are caught at the thread boundary and logged; the worker
/// always exits cleanly.
#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    control: Arc<SearchControl>,
    worker: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Start `command` on a new worker thread.
    ///
    /// The caller must ensure no other task of the same adapter is
    /// running; the shared control state is expected to have been reset.
    pub fn spawn(
        name: &'static str,
        control: Arc<SearchControl>,
        command: Box<dyn Command>,
    ) -> TaskHandle {
        let task_name = name;
        let worker = thread::Builder::new()
            .name(format!("{name}-task"))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| command.run()));
                if let Err(payload) = result {
                    let detail = payload
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    log::error!("{task_name} task failed: {detail}");
                    print::info(&format!("ERROR: {task_name} command failed: {detail}"));
                }
            })
            .expect("failed to spawn task thread");

        TaskHandle {
            name,
            control,
            worker: Some(worker),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Is the worker thread still executing the work body?
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Request cancellation. Safe from any thread; never blocks.
    pub fn stop(&self) {
        self.control.request_stop();
    }

    /// Block until the worker thread has exited. Returns immediately when
    /// the task already finished or was joined before.
    pub fn wait(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                // The panic was already caught and reported inside the
                // worker; a join error here means the catch itself blew up.
                log::error!("{} task thread died abnormally", self.name);
            }
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.stop();
        self.wait();
    }
}
