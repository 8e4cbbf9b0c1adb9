//! The engine collaborator boundary.
//!
//! The adapter drives any engine that implements [`Engine`]. The engine
//! performs search, move generation, and evaluation; the adapter performs
//! protocol parsing, background-task concurrency, and notation handling.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::options::EngineOption;
use crate::resolver::FenError;
use crate::sync::SearchControl;

/// FEN string of the standard chess start position.
pub const STARTPOS: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Bounds for one search, parsed from the "go" command.
///
/// Immutable once parsed; passed by reference into [`Engine::go`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GoParams {
    /// Search until a stop is requested.
    pub infinite: bool,
    /// Start searching in pondering mode.
    pub ponder: bool,
    /// Maximum number of half-moves (plies) to search.
    pub depth: u32,
    /// Number of moves remaining until the next time control.
    pub movestogo: u32,
    /// Maximum number of nodes to search.
    pub nodes: u64,
    /// Maximum milliseconds to spend on this move.
    pub movetime: u64,
    /// Milliseconds remaining on white's clock.
    pub wtime: u64,
    /// White increment per move in milliseconds.
    pub winc: u64,
    /// Milliseconds remaining on black's clock.
    pub btime: u64,
    /// Black increment per move in milliseconds.
    pub binc: u64,
}

impl GoParams {
    /// Moves assumed to remain until time control when the caller gave none.
    pub const DEFAULT_MOVES_TO_GO: u32 = 15;

    /// Derive the time budget for this search round.
    ///
    /// A fixed move time wins; otherwise a slice of the remaining clock
    /// time is used, whichever is sooner. Infinite and ponder searches
    /// have no budget.
    #[must_use]
    pub fn planned_budget(&self, white_to_move: bool) -> Option<Duration> {
        if self.infinite || self.ponder {
            return None;
        }

        let mut budget = (self.movetime > 0).then(|| Duration::from_millis(self.movetime));

        let remaining = if white_to_move { self.wtime } else { self.btime };
        if remaining > 0 {
            let moves = if self.movestogo > 0 {
                self.movestogo
            } else {
                Self::DEFAULT_MOVES_TO_GO
            };
            let per_move = Duration::from_millis(remaining / u64::from(moves));
            budget = Some(budget.map_or(per_move, |b| b.min(per_move)));
        }

        budget
    }
}

/// Statistics about the current (or last) search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchStats {
    /// The current search depth.
    pub depth: u32,
    /// The maximum selective depth reached.
    pub seldepth: u32,
    /// The number of nodes searched so far.
    pub nodes: u64,
    /// The number of quiescence nodes searched so far.
    pub qnodes: u64,
    /// Milliseconds spent searching so far.
    pub msecs: u64,
    /// The move currently being searched, e.g. "e2e4".
    pub curr_move: Option<String>,
    /// The ordinal of the move currently being searched, 0 when unknown.
    pub curr_move_number: u32,
}

impl SearchStats {
    /// Nodes per second, zero when no time has elapsed.
    #[must_use]
    pub fn nps(&self) -> u64 {
        if self.msecs == 0 {
            return 0;
        }
        self.nodes.saturating_mul(1000) / self.msecs
    }
}

impl fmt::Display for SearchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "depth {} seldepth {} nodes {} time {} nps {}",
            self.depth,
            self.seldepth,
            self.nodes,
            self.msecs,
            self.nps()
        )
    }
}

/// Lock-guarded [`SearchStats`] snapshot shared between threads.
///
/// The worker publishes; the watchdog and dispatcher read. Single writer,
/// so a plain mutex-guarded copy is sufficient.
#[derive(Debug, Default)]
pub struct StatsCell(Mutex<SearchStats>);

impl StatsCell {
    #[must_use]
    pub fn new() -> Self {
        StatsCell::default()
    }

    /// Replace the shared snapshot.
    pub fn publish(&self, stats: SearchStats) {
        *self.0.lock() = stats;
    }

    /// Copy of the latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SearchStats {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        *self.0.lock() = SearchStats::default();
    }
}

/// Per-engine-instance context handed to search and perft calls.
///
/// Carries the shared cancellation state, the stats snapshot the engine
/// publishes into, and the protocol debug flag. Cloning is cheap; all
/// clones refer to the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct SearchContext {
    /// Cancellation reasons, search-in-progress flag, and deadline window.
    pub control: Arc<SearchControl>,
    /// Snapshot the engine publishes progress statistics into.
    pub stats: Arc<StatsCell>,
    debug: Arc<AtomicBool>,
}

impl SearchContext {
    #[must_use]
    pub fn new() -> Self {
        SearchContext::default()
    }

    /// Is protocol debug mode enabled?
    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub fn set_debug(&self, on: bool) {
        self.debug.store(on, Ordering::Relaxed);
    }
}

/// Result of one search: a best move and an optional ponder move, both in
/// coordinate notation. `best_move` of `None` means no move was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOutcome {
    pub best_move: Option<String>,
    pub ponder_move: Option<String>,
}

/// A chess engine the adapter can drive.
///
/// Long-running methods ([`go`](Self::go), [`perft`](Self::perft)) run on a
/// worker thread and must poll `ctx.control` for cancellation at bounded
/// intervals (e.g. once per few thousand nodes); a body that never polls
/// will hang the dispatcher on the next blocking join. They should also
/// publish [`SearchStats`] into `ctx.stats` periodically so the watchdog
/// can emit progress lines, and a pondering search should watch
/// [`SearchControl::take_ponder_hit`] to switch to normal search.
///
/// Registration and copy-protection hooks default to "no-op, always
/// succeeds" and only need overriding by engines that use them.
pub trait Engine: Send + 'static {
    /// The engine name, reported in the "uci" identity block.
    fn name(&self) -> String;

    /// The engine version, e.g. "1.0.0".
    fn version(&self) -> String;

    /// The engine author name(s).
    fn author(&self) -> String;

    fn email(&self) -> Option<String> {
        None
    }

    fn country(&self) -> Option<String> {
        None
    }

    /// Options supported by the engine, with their current values.
    fn options(&self) -> Vec<EngineOption> {
        Vec::new()
    }

    /// Set the named option. Returns false for an unknown name or a value
    /// outside the option's domain.
    fn set_option(&mut self, name: &str, value: &str) -> bool {
        let _ = (name, value);
        false
    }

    /// One-time engine initialization, performed lazily by the adapter.
    fn initialize(&mut self);

    fn is_initialized(&self) -> bool;

    /// Set the board position from the leading FEN fields of `fen`.
    ///
    /// Returns the unconsumed tail of the input (move lists, EPD opcodes)
    /// on success. Only position data may be consumed.
    fn set_position<'a>(&mut self, fen: &'a str) -> Result<&'a str, FenError>;

    /// Apply one move, in coordinate notation, to the current position.
    /// Returns false if the move text is not a valid move.
    fn make_move(&mut self, mv: &str) -> bool;

    /// FEN string of the current position.
    fn fen(&self) -> String;

    /// Output a text representation of the current position.
    fn print_board(&self);

    fn white_to_move(&self) -> bool;

    /// Clear data that persists between searches (transposition tables,
    /// killer moves, and the like).
    fn clear_search_data(&mut self);

    /// Search the current position within the given bounds.
    fn go(&mut self, params: &GoParams, ctx: &SearchContext) -> SearchOutcome;

    /// Count leaf nodes of the move-generation tree at `depth`.
    fn perft(&mut self, depth: u32, ctx: &SearchContext) -> u64;

    fn is_registered(&self) -> bool {
        true
    }

    fn register_later(&mut self) {}

    fn register(&mut self, name: &str, code: &str) -> bool {
        let _ = (name, code);
        true
    }

    fn is_copy_protected(&self) -> bool {
        false
    }

    fn copy_is_ok(&mut self) -> bool {
        true
    }

    /// Reset custom engine counters reported by the "test" command.
    fn reset_counters(&mut self) {}

    /// Output custom engine counters gathered since the last reset.
    fn show_counters(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planned_budget_movetime() {
        let params = GoParams {
            movetime: 500,
            ..GoParams::default()
        };
        assert_eq!(params.planned_budget(true), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_planned_budget_clock_slice() {
        let params = GoParams {
            wtime: 60_000,
            movestogo: 20,
            ..GoParams::default()
        };
        assert_eq!(params.planned_budget(true), Some(Duration::from_millis(3000)));
        // Black's clock is not set, so black to move has no budget.
        assert_eq!(params.planned_budget(false), None);
    }

    #[test]
    fn test_planned_budget_takes_sooner_bound() {
        let params = GoParams {
            movetime: 10_000,
            btime: 30_000,
            ..GoParams::default()
        };
        let expected = 30_000 / u64::from(GoParams::DEFAULT_MOVES_TO_GO);
        assert_eq!(
            params.planned_budget(false),
            Some(Duration::from_millis(expected))
        );
    }

    #[test]
    fn test_planned_budget_infinite_and_ponder() {
        let infinite = GoParams {
            infinite: true,
            movetime: 100,
            ..GoParams::default()
        };
        assert_eq!(infinite.planned_budget(true), None);

        let ponder = GoParams {
            ponder: true,
            wtime: 1000,
            ..GoParams::default()
        };
        assert_eq!(ponder.planned_budget(true), None);
    }

    #[test]
    fn test_stats_display() {
        let stats = SearchStats {
            depth: 8,
            seldepth: 12,
            nodes: 4000,
            qnodes: 1000,
            msecs: 2000,
            ..SearchStats::default()
        };
        assert_eq!(
            stats.to_string(),
            "depth 8 seldepth 12 nodes 4000 time 2000 nps 2000"
        );
    }

    #[test]
    fn test_stats_cell_round_trip() {
        let cell = StatsCell::new();
        cell.publish(SearchStats {
            nodes: 42,
            ..SearchStats::default()
        });
        assert_eq!(cell.snapshot().nodes, 42);
        cell.clear();
        assert_eq!(cell.snapshot().nodes, 0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_go_params_serde_round_trip() {
        let params = GoParams {
            depth: 9,
            movetime: 250,
            ..GoParams::default()
        };
        let json = serde_json::to_string(&params).unwrap();
        let back: GoParams = serde_json::from_str(&json).unwrap();
        assert_eq!(params, back);
    }
}
