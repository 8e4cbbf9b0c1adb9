//! UCI protocol adapter for chess engines.
//!
//! Implement the [`Engine`] trait for your search engine and hand it to
//! [`uci::run_loop`]; the adapter takes care of protocol parsing, the
//! background-task concurrency model, and algebraic move resolution.

pub mod engine;
pub mod options;
pub mod params;
pub mod resolver;
pub mod sync;
pub mod task;
pub mod uci;
pub mod watchdog;

pub use engine::{
    Engine, GoParams, SearchContext, SearchOutcome, SearchStats, StatsCell, STARTPOS,
};
pub use options::{EngineOption, OptionKind};
pub use resolver::{FenError, MoveResolver};
pub use sync::SearchControl;
pub use uci::{run_loop, UciAdapter};
pub use watchdog::WatchdogConfig;
