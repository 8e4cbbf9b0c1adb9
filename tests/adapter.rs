//! End-to-end tests driving the adapter with a scripted engine that
//! records every collaborator call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use ucibridge::resolver::FenError;
use ucibridge::{
    Engine, GoParams, SearchContext, SearchOutcome, SearchStats, UciAdapter, WatchdogConfig,
};

#[derive(Clone, Default)]
struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    fn calls(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn count_prefix(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn index_of(&self, entry: &str) -> Option<usize> {
        self.0.lock().iter().position(|c| c.starts_with(entry))
    }
}

struct MockEngine {
    log: CallLog,
    initialized: bool,
    registered: bool,
    /// When true, `go` loops until a cancellation reason is raised.
    busy_search: bool,
    best_move: Option<String>,
}

impl MockEngine {
    fn new(log: CallLog) -> Self {
        MockEngine {
            log,
            initialized: false,
            registered: true,
            busy_search: false,
            best_move: Some("e2e4".to_string()),
        }
    }
}

/// Everything after the first four whitespace-separated fields, i.e. the
/// part of an EPD line that is not position data.
fn split_off_fen(line: &str) -> &str {
    let mut rest = line;
    for _ in 0..4 {
        rest = rest.trim_start();
        match rest.find(char::is_whitespace) {
            Some(i) => rest = &rest[i..],
            None => return "",
        }
    }
    rest.trim_start()
}

impl Engine for MockEngine {
    fn name(&self) -> String {
        "mock".to_string()
    }

    fn version(&self) -> String {
        "1.0".to_string()
    }

    fn author(&self) -> String {
        "test".to_string()
    }

    fn initialize(&mut self) {
        self.log.push("initialize");
        self.initialized = true;
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn set_position<'a>(&mut self, fen: &'a str) -> Result<&'a str, FenError> {
        self.log.push(format!("set_position:{fen}"));
        Ok(split_off_fen(fen))
    }

    fn make_move(&mut self, mv: &str) -> bool {
        self.log.push(format!("make_move:{mv}"));
        // A null-ish move (same origin and destination) is rejected.
        mv.len() < 4 || mv[..2] != mv[2..4]
    }

    fn fen(&self) -> String {
        self.log.push("fen");
        "8/8/8/8/8/8/8/8 w - -".to_string()
    }

    fn print_board(&self) {
        self.log.push("print_board");
    }

    fn white_to_move(&self) -> bool {
        true
    }

    fn clear_search_data(&mut self) {
        self.log.push("clear_search_data");
    }

    fn set_option(&mut self, name: &str, value: &str) -> bool {
        self.log.push(format!("set_option:{name}={value}"));
        name == "Hash"
    }

    fn go(&mut self, _params: &GoParams, ctx: &SearchContext) -> SearchOutcome {
        self.log.push("go:start");
        let mut nodes = 0u64;
        if self.busy_search {
            while !ctx.control.should_stop() {
                nodes += 1000;
                ctx.stats.publish(SearchStats {
                    depth: 1,
                    nodes,
                    msecs: ctx.control.elapsed().as_millis() as u64,
                    ..SearchStats::default()
                });
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        self.log.push(format!(
            "go:end stop={} timeout={}",
            ctx.control.stop_requested(),
            ctx.control.timed_out()
        ));
        SearchOutcome {
            best_move: self.best_move.clone(),
            ponder_move: None,
        }
    }

    fn perft(&mut self, depth: u32, _ctx: &SearchContext) -> u64 {
        self.log.push(format!("perft:{depth}"));
        match depth {
            1 => 20,
            2 => 400,
            _ => 0,
        }
    }

    fn is_registered(&self) -> bool {
        self.registered
    }

    fn register_later(&mut self) {
        self.log.push("register_later");
    }

    fn register(&mut self, name: &str, code: &str) -> bool {
        self.log.push(format!("register:{name}:{code}"));
        true
    }
}

fn adapter_with(log: &CallLog) -> UciAdapter<MockEngine> {
    UciAdapter::new(MockEngine::new(log.clone()))
}

fn quick_watchdog() -> WatchdogConfig {
    WatchdogConfig {
        poll_interval: Duration::from_millis(5),
        progress_interval: Duration::from_millis(100),
        timeout_margin: Duration::from_millis(5),
    }
}

/// Join the in-flight task (if any) without stopping it.
fn sync(adapter: &mut UciAdapter<MockEngine>) {
    assert!(adapter.handle_line("isready"));
}

#[test]
fn failed_parse_makes_no_engine_calls() {
    let log = CallLog::default();
    let mut adapter = adapter_with(&log);

    assert!(adapter.handle_line("go depth three"));
    assert!(adapter.handle_line("perft depth x"));
    assert!(adapter.handle_line("test count x"));
    assert_eq!(log.calls(), Vec::<String>::new());
}

#[test]
fn empty_and_unknown_lines_keep_the_loop_alive() {
    let log = CallLog::default();
    let mut adapter = adapter_with(&log);

    assert!(adapter.handle_line(""));
    assert!(adapter.handle_line("   "));
    assert!(adapter.handle_line("flibbertigibbet"));
    assert_eq!(log.calls(), Vec::<String>::new());
}

#[test]
fn quit_terminates_the_loop() {
    let log = CallLog::default();
    let mut adapter = adapter_with(&log);
    assert!(!adapter.handle_line("quit"));

    let mut adapter = adapter_with(&log);
    assert!(!adapter.handle_line("exit"));

    // "quit help" explains instead of quitting.
    let mut adapter = adapter_with(&log);
    assert!(adapter.handle_line("quit help"));
}

#[test]
fn running_search_is_stopped_and_joined_before_next_mutating_command() {
    let log = CallLog::default();
    let mut adapter = UciAdapter::new({
        let mut engine = MockEngine::new(log.clone());
        engine.busy_search = true;
        engine
    });

    assert!(adapter.handle_line("go infinite"));
    std::thread::sleep(Duration::from_millis(30));
    assert!(adapter.handle_line("position startpos moves e2e4"));

    let end = log.index_of("go:end").expect("search finished");
    let set = log.index_of("set_position").expect("position applied");
    assert!(end < set, "search must be joined before the engine is touched");

    let calls = log.calls();
    assert!(calls[end].contains("stop=true"));
    assert!(adapter.handle_line("quit") == false);
}

#[test]
fn prior_task_is_joined_even_when_the_new_command_fails_to_parse() {
    let log = CallLog::default();
    let mut adapter = UciAdapter::new({
        let mut engine = MockEngine::new(log.clone());
        engine.busy_search = true;
        engine
    });

    assert!(adapter.handle_line("go infinite"));
    std::thread::sleep(Duration::from_millis(30));
    assert!(adapter.handle_line("go depth three"));

    assert!(log.index_of("go:end").is_some());
    assert_eq!(log.count_prefix("go:start"), 1);
}

#[test]
fn isready_with_no_task_answers_immediately() {
    let log = CallLog::default();
    let mut adapter = adapter_with(&log);

    let start = Instant::now();
    assert!(adapter.handle_line("isready"));
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(log.count_prefix("initialize"), 1);
}

#[test]
fn position_prefix_extension_applies_only_the_suffix() {
    let log = CallLog::default();
    let mut adapter = adapter_with(&log);

    assert!(adapter.handle_line("position startpos moves e2e4 e7e5"));
    assert_eq!(log.count_prefix("set_position"), 1);
    assert_eq!(log.count_prefix("make_move"), 2);

    assert!(adapter.handle_line("position startpos moves e2e4 e7e5 g1f3"));
    assert_eq!(log.count_prefix("set_position"), 1, "no rebuild on prefix match");
    assert_eq!(log.count_prefix("make_move"), 3);
    assert_eq!(log.calls().last().unwrap(), "make_move:g1f3");
}

#[test]
fn position_mismatch_falls_back_to_full_rebuild() {
    let log = CallLog::default();
    let mut adapter = adapter_with(&log);

    assert!(adapter.handle_line("position startpos moves e2e4 e7e5"));
    assert!(adapter.handle_line("position startpos moves d2d4"));

    assert_eq!(log.count_prefix("set_position"), 2);
    assert_eq!(log.calls().last().unwrap(), "make_move:d2d4");
}

#[test]
fn invalid_move_leaves_earlier_moves_applied() {
    let log = CallLog::default();
    let mut adapter = adapter_with(&log);

    // e2e2 is rejected by the engine; g8f6 must never be attempted.
    assert!(adapter.handle_line("position startpos moves e2e4 e2e2 g8f6"));
    assert_eq!(log.count_prefix("set_position"), 1);
    assert_eq!(log.count_prefix("make_move"), 2);
    assert!(log.index_of("make_move:g8f6").is_none());

    // The remembered position was cleared, so the next position command
    // rebuilds from scratch even though it extends the failed one.
    assert!(adapter.handle_line("position startpos moves e2e4 e2e2 g8f6 b8c6"));
    assert_eq!(log.count_prefix("set_position"), 2);
}

#[test]
fn fixed_move_time_is_enforced_by_the_watchdog() {
    let log = CallLog::default();
    let mut adapter = UciAdapter::with_watchdog_config(
        {
            let mut engine = MockEngine::new(log.clone());
            engine.busy_search = true;
            engine
        },
        quick_watchdog(),
    );

    let start = Instant::now();
    assert!(adapter.handle_line("go movetime 100"));
    sync(&mut adapter);
    let elapsed = start.elapsed();

    let end = log.index_of("go:end").expect("search finished");
    assert!(log.calls()[end].contains("timeout=true"));
    assert!(log.calls()[end].contains("stop=false"));
    assert!(
        elapsed < Duration::from_millis(2000),
        "movetime 100 took {elapsed:?}"
    );
}

#[test]
fn bare_coordinate_move_is_applied_to_the_position() {
    let log = CallLog::default();
    let mut adapter = adapter_with(&log);

    assert!(adapter.handle_line("e2e4 g8f6"));
    assert_eq!(log.count_prefix("make_move:e2e4"), 1);
    assert_eq!(log.count_prefix("make_move:g8f6"), 1);
}

#[test]
fn setoption_forwards_name_and_value() {
    let log = CallLog::default();
    let mut adapter = adapter_with(&log);

    assert!(adapter.handle_line("setoption name Hash value 128"));
    assert_eq!(log.count_prefix("set_option:Hash=128"), 1);

    // Multi-word names are joined; a missing value stays empty.
    assert!(adapter.handle_line("setoption name Clear Hash"));
    assert_eq!(log.count_prefix("set_option:Clear Hash="), 1);

    // Malformed setoption performs no engine call.
    assert!(adapter.handle_line("setoption value 5"));
    assert_eq!(log.count_prefix("set_option"), 2);
}

#[test]
fn ucinewgame_clears_search_data() {
    let log = CallLog::default();
    let mut adapter = adapter_with(&log);

    assert!(adapter.handle_line("ucinewgame"));
    assert_eq!(log.count_prefix("clear_search_data"), 1);
}

#[test]
fn register_runs_as_a_background_task() {
    let log = CallLog::default();
    let mut adapter = UciAdapter::new({
        let mut engine = MockEngine::new(log.clone());
        engine.registered = false;
        engine
    });

    assert!(adapter.handle_line("register later"));
    sync(&mut adapter);
    assert_eq!(log.count_prefix("register_later"), 1);

    assert!(adapter.handle_line("register name Jane code 4711"));
    sync(&mut adapter);
    assert_eq!(log.count_prefix("register:Jane:4711"), 1);
}

#[test]
fn command_help_short_circuits_without_side_effects() {
    let log = CallLog::default();
    let mut adapter = adapter_with(&log);

    assert!(adapter.handle_line("go help"));
    assert!(adapter.handle_line("position help"));
    assert!(adapter.handle_line("perft help"));
    assert!(adapter.handle_line("test help"));
    assert!(adapter.handle_line("register help"));
    assert!(adapter.handle_line("ucinewgame help"));
    assert_eq!(log.calls(), Vec::<String>::new());
}

#[test]
fn perft_over_an_annotated_file() {
    let log = CallLog::default();
    let mut adapter = adapter_with(&log);

    let path = std::env::temp_dir().join(format!("ucibridge_perft_{}.epd", std::process::id()));
    std::fs::write(
        &path,
        "# comment line\n\
         rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - ;D1 20; D2 400\n",
    )
    .expect("write temp epd");

    assert!(adapter.handle_line(&format!("perft file {}", path.display())));
    sync(&mut adapter);

    assert_eq!(log.count_prefix("set_position"), 1);
    assert_eq!(log.count_prefix("perft:1"), 1);
    assert_eq!(log.count_prefix("perft:2"), 1);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn perft_with_unreadable_file_reports_and_no_ops() {
    let log = CallLog::default();
    let mut adapter = adapter_with(&log);

    assert!(adapter.handle_line("perft file /no/such/file.epd"));
    sync(&mut adapter);
    assert_eq!(log.count_prefix("set_position"), 0);
    assert_eq!(log.count_prefix("perft:"), 0);
}

#[test]
fn test_suite_searches_each_annotated_position() {
    let log = CallLog::default();
    let mut adapter = UciAdapter::new({
        let mut engine = MockEngine::new(log.clone());
        engine.best_move = Some("e1e2".to_string());
        engine
    });

    let path = std::env::temp_dir().join(format!("ucibridge_test_{}.epd", std::process::id()));
    std::fs::write(
        &path,
        "4k3/8/8/8/8/8/8/4K3 w - - bm e1e2\n\
         4k3/8/8/8/8/8/8/4K3 w - - am e1d1\n",
    )
    .expect("write temp epd");

    assert!(adapter.handle_line(&format!("test file {}", path.display())));
    sync(&mut adapter);

    assert_eq!(log.count_prefix("set_position"), 2);
    assert_eq!(log.count_prefix("go:start"), 2);
    assert_eq!(log.count_prefix("clear_search_data"), 2);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn debug_toggle_echoes_and_prints_board_after_position() {
    let log = CallLog::default();
    let mut adapter = adapter_with(&log);

    assert!(adapter.handle_line("debug"));
    assert!(adapter.context().debug());
    assert!(adapter.handle_line("position startpos"));
    assert_eq!(log.count_prefix("print_board"), 1);

    assert!(adapter.handle_line("debug"));
    assert!(!adapter.context().debug());
}

#[test]
fn fen_command_queries_the_engine() {
    let log = CallLog::default();
    let mut adapter = adapter_with(&log);

    assert!(adapter.handle_line("fen"));
    assert_eq!(log.count_prefix("fen"), 1);

    assert!(adapter.handle_line("print"));
    assert_eq!(log.count_prefix("print_board"), 1);
}

#[test]
fn go_parse_is_idempotent_across_fresh_tasks() {
    let log = CallLog::default();
    let mut adapter = adapter_with(&log);

    // The same command twice produces two identical searches.
    assert!(adapter.handle_line("go depth 3"));
    sync(&mut adapter);
    assert!(adapter.handle_line("go depth 3"));
    sync(&mut adapter);

    assert_eq!(log.count_prefix("go:start"), 2);
    let ends = log
        .calls()
        .iter()
        .filter(|c| c.starts_with("go:end"))
        .cloned()
        .collect::<Vec<_>>();
    assert_eq!(ends.len(), 2);
    assert_eq!(ends[0], ends[1]);
}
