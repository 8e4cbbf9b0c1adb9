//! Protocol output helpers.
//!
//! Every helper emits exactly one newline-terminated line per call, so
//! output from different threads never interleaves mid-line. Diagnostic
//! lines carry the UCI "info string" prefix; primary responses are raw.

use crate::engine::{SearchOutcome, SearchStats};

/// Emit one diagnostic line, prefixed with "info string".
pub fn info(msg: &str) {
    println!("info string {msg}");
}

/// Emit one primary response line, unprefixed.
pub fn raw(msg: &str) {
    println!("{msg}");
}

/// Emit the final best-move line for a search.
pub fn bestmove(outcome: &SearchOutcome) {
    match (&outcome.best_move, &outcome.ponder_move) {
        (Some(best), Some(ponder)) => println!("bestmove {best} ponder {ponder}"),
        (Some(best), None) => println!("bestmove {best}"),
        (None, _) => println!("bestmove none"),
    }
}

/// Emit one watchdog progress line from a stats snapshot.
pub fn progress(stats: &SearchStats) {
    match &stats.curr_move {
        Some(mv) if stats.curr_move_number > 0 => println!(
            "info {stats} currmovenumber {} currmove {mv}",
            stats.curr_move_number
        ),
        _ => println!("info {stats}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Output goes straight to stdout; these only pin the formatting of the
    // pieces that feed the lines.
    #[test]
    fn test_bestmove_variants_do_not_panic() {
        bestmove(&SearchOutcome::default());
        bestmove(&SearchOutcome {
            best_move: Some("e2e4".to_string()),
            ponder_move: Some("e7e5".to_string()),
        });
    }

    #[test]
    fn test_progress_with_and_without_move() {
        progress(&SearchStats::default());
        progress(&SearchStats {
            curr_move: Some("e2e4".to_string()),
            curr_move_number: 3,
            ..SearchStats::default()
        });
    }
}
