//! Universal Chess Interface (UCI) protocol implementation.
//!
//! The adapter owns the protocol loop: it splits each input line into
//! tokens, routes the leading keyword to a handler, and manages the one
//! background task and the watchdog thread of its engine instance.
//! Commands that mutate search or position state stop and join any prior
//! background task before touching the engine, so the engine never sees
//! two concurrent mutating calls.

use std::collections::HashMap;
use std::io::{self, BufRead};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::engine::{Engine, SearchContext, STARTPOS};
use crate::options::OptionKind;
use crate::params::Params;
use crate::task::{Command, TaskHandle};
use crate::watchdog::{Watchdog, WatchdogConfig};

mod commands;
pub mod print;

use commands::{GoCommand, PerftCommand, RegisterCommand, TestCommand};

/// The fixed command keywords understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Debug,
    Exit,
    Fen,
    Go,
    Help,
    IsReady,
    New,
    Opts,
    Perft,
    PonderHit,
    Position,
    Print,
    Quit,
    Register,
    SetOption,
    Stop,
    Test,
    Uci,
    UciNewGame,
}

static KEYWORDS: Lazy<HashMap<&'static str, Keyword>> = Lazy::new(|| {
    HashMap::from([
        ("debug", Keyword::Debug),
        ("exit", Keyword::Exit),
        ("fen", Keyword::Fen),
        ("go", Keyword::Go),
        ("help", Keyword::Help),
        ("isready", Keyword::IsReady),
        ("new", Keyword::New),
        ("opts", Keyword::Opts),
        ("perft", Keyword::Perft),
        ("ponderhit", Keyword::PonderHit),
        ("position", Keyword::Position),
        ("print", Keyword::Print),
        ("quit", Keyword::Quit),
        ("register", Keyword::Register),
        ("setoption", Keyword::SetOption),
        ("stop", Keyword::Stop),
        ("test", Keyword::Test),
        ("uci", Keyword::Uci),
        ("ucinewgame", Keyword::UciNewGame),
    ])
});

/// Is this token a coordinate move: file-rank-file-rank plus an optional
/// promotion piece letter?
#[must_use]
pub fn is_coordinate_move(token: &str) -> bool {
    let b = token.as_bytes();
    if b.len() != 4 && b.len() != 5 {
        return false;
    }
    if !(b'a'..=b'h').contains(&b[0])
        || !(b'1'..=b'8').contains(&b[1])
        || !(b'a'..=b'h').contains(&b[2])
        || !(b'1'..=b'8').contains(&b[3])
    {
        return false;
    }
    b.len() == 4 || matches!(b[4], b'b' | b'n' | b'q' | b'r')
}

/// The UCI protocol dispatcher for one engine instance.
///
/// Feed it one command line at a time via [`handle_line`](Self::handle_line),
/// or hand the whole stdin loop over with [`run_loop`].
pub struct UciAdapter<E: Engine> {
    engine: Arc<Mutex<E>>,
    ctx: SearchContext,
    watchdog: Watchdog,
    last_task: Option<TaskHandle>,
    last_position: String,
}

impl<E: Engine> UciAdapter<E> {
    #[must_use]
    pub fn new(engine: E) -> Self {
        UciAdapter::with_watchdog_config(engine, WatchdogConfig::default())
    }

    #[must_use]
    pub fn with_watchdog_config(engine: E, config: WatchdogConfig) -> Self {
        let ctx = SearchContext::new();
        let watchdog = Watchdog::new(
            Arc::clone(&ctx.control),
            Arc::clone(&ctx.stats),
            config,
        );
        UciAdapter {
            engine: Arc::new(Mutex::new(engine)),
            ctx,
            watchdog,
            last_task: None,
            last_position: String::new(),
        }
    }

    /// Shared handle to the engine. The lock is held by the worker thread
    /// for the duration of a background task.
    #[must_use]
    pub fn engine(&self) -> &Arc<Mutex<E>> {
        &self.engine
    }

    /// The shared search context of this adapter.
    #[must_use]
    pub fn context(&self) -> &SearchContext {
        &self.ctx
    }

    /// Process one command line.
    ///
    /// Returns false when the protocol loop should terminate (quit/exit);
    /// every other outcome, including unknown commands and handler errors,
    /// keeps the loop alive.
    pub fn handle_line(&mut self, line: &str) -> bool {
        let mut params = Params::new(line);
        let Some(command) = params.pop_front() else {
            return true; // ignore empty lines
        };

        if self.ctx.debug() {
            print::info(&format!("received command: {line}"));
        }

        match KEYWORDS.get(command.to_ascii_lowercase().as_str()) {
            Some(Keyword::Go) => {
                self.do_stop();
                let command = GoCommand::new(Arc::clone(&self.engine), self.ctx.clone());
                self.execute("go", Box::new(command), &mut params);
            }
            Some(Keyword::Position) => {
                self.do_stop();
                self.do_position(line, &mut params);
            }
            Some(Keyword::Stop) => self.do_stop_command(&mut params),
            Some(Keyword::SetOption) => self.do_set_option(&mut params),
            Some(Keyword::IsReady) => self.do_is_ready(&mut params),
            Some(Keyword::Uci) => self.do_uci(&mut params),
            Some(Keyword::UciNewGame) => {
                self.do_stop();
                self.do_new_game(&mut params);
            }
            Some(Keyword::New) => {
                self.do_stop();
                self.do_new(&mut params);
            }
            Some(Keyword::Debug) => self.do_debug(&mut params),
            Some(Keyword::Register) => {
                self.do_stop();
                let command = RegisterCommand::new(Arc::clone(&self.engine));
                self.execute("register", Box::new(command), &mut params);
            }
            Some(Keyword::PonderHit) => self.ctx.control.raise_ponder_hit(),
            Some(Keyword::Fen) => self.do_fen(&mut params),
            Some(Keyword::Print) => self.do_print(&mut params),
            Some(Keyword::Perft) => {
                self.do_stop();
                let command = PerftCommand::new(Arc::clone(&self.engine), self.ctx.clone());
                self.execute("perft", Box::new(command), &mut params);
            }
            Some(Keyword::Test) => {
                self.do_stop();
                let command = TestCommand::new(Arc::clone(&self.engine), self.ctx.clone());
                self.execute("test", Box::new(command), &mut params);
            }
            Some(Keyword::Opts) => self.do_opts(),
            Some(Keyword::Help) => self.do_help(),
            Some(Keyword::Quit) | Some(Keyword::Exit) => {
                if self.do_quit(&mut params) {
                    return false;
                }
            }
            None if is_coordinate_move(&command) => {
                self.do_stop();
                params.push_front(command);
                self.do_move(&mut params);
            }
            None => {
                print::info(&format!("Unknown command: '{command}'"));
                print::info("Enter 'help' for a list of commands");
            }
        }
        true
    }

    /// Request cancellation of the running background task, if any.
    fn do_stop(&mut self) {
        self.ctx.control.request_stop();
    }

    /// Block until the running background task, if any, has exited.
    fn join_task(&mut self) {
        if let Some(task) = &mut self.last_task {
            task.wait();
        }
    }

    /// Stop and join the running background task, if any.
    fn stop_and_join(&mut self) {
        if let Some(task) = &mut self.last_task {
            task.stop();
            task.wait();
        }
    }

    fn initialize_engine(&mut self) {
        let mut engine = self.engine.lock();
        if !engine.is_initialized() {
            engine.initialize();
        }
    }

    /// Run a background command: print usage on "help", stop and join the
    /// previous task, parse, then start the work body on a worker thread.
    fn execute(&mut self, name: &'static str, mut command: Box<dyn Command>, params: &mut Params) {
        if params.first_is("help") {
            print::info(&format!("usage: {}", command.usage()));
            print::info(command.description());
            return;
        }

        self.stop_and_join();

        if !command.parse(params) {
            return;
        }

        if self.last_task.as_ref().is_some_and(TaskHandle::is_running) {
            print::info("Another background command is still active, can't execute");
            return;
        }

        self.initialize_engine();
        if self.ctx.control.stop_requested() {
            // A raised stop bit means the current watchdog round is winding
            // down; join it before the reset below would mask the bit.
            self.watchdog.shutdown();
        }
        self.ctx.control.reset();
        self.watchdog.ensure_running();
        self.last_task = Some(TaskHandle::spawn(
            name,
            Arc::clone(&self.ctx.control),
            command,
        ));
    }

    fn do_stop_command(&mut self, params: &mut Params) {
        if params.first_is("help") {
            print::info("usage: stop");
            print::info("Stop engine if it is calculating.");
            return;
        }
        self.do_stop();
    }

    fn do_is_ready(&mut self, params: &mut Params) {
        if params.first_is("help") {
            print::info("usage: isready");
            print::info("Output readyok when engine is ready to receive input.");
            return;
        }

        // Join only; a readiness probe must not abort a search in flight.
        self.join_task();
        self.initialize_engine();
        print::raw("readyok");
    }

    fn do_debug(&mut self, params: &mut Params) {
        if params.first_is("help") {
            print::info("usage: debug");
            print::info("Toggle debug mode.");
            return;
        }

        let on = !self.ctx.debug();
        self.ctx.set_debug(on);
        print::info(if on { "debug on" } else { "debug off" });
    }

    fn do_uci(&mut self, params: &mut Params) {
        if params.first_is("help") {
            print::info("usage: uci");
            print::info("Output engine info and options followed by uciok.");
            return;
        }

        let mut engine = self.engine.lock();
        print::raw(&format!("id name {} {}", engine.name(), engine.version()));
        print::raw(&format!("id author {}", engine.author()));
        if let Some(email) = engine.email() {
            print::raw(&format!("id email {email}"));
        }
        if let Some(country) = engine.country() {
            print::raw(&format!("id country {country}"));
        }

        for opt in engine.options() {
            let mut line = format!("option name {} type {}", opt.name(), opt.kind().type_name());
            if !opt.default_value().is_empty() {
                line.push_str(&format!(" default {}", opt.default_value()));
            }
            if opt.min() > i64::MIN {
                line.push_str(&format!(" min {}", opt.min()));
            }
            if opt.max() < i64::MAX {
                line.push_str(&format!(" max {}", opt.max()));
            }
            for value in opt.combo_values() {
                line.push_str(&format!(" var {value}"));
            }
            print::raw(&line);
        }

        print::raw("uciok");

        if engine.is_copy_protected() {
            print::raw("copyprotection checking");
            if engine.copy_is_ok() {
                print::raw("copyprotection ok");
            } else {
                print::raw("copyprotection error");
            }
        }
        if !engine.is_registered() {
            print::raw("registration error");
        }
    }

    fn do_new_game(&mut self, params: &mut Params) {
        if params.first_is("help") {
            print::info("usage: ucinewgame");
            print::info("Clear all search data.");
            return;
        }

        self.stop_and_join();
        self.initialize_engine();
        self.last_position.clear();
        self.engine.lock().clear_search_data();
    }

    /// The "new" command (not a UCI command): clear search data, set the
    /// position (startpos when unspecified), and apply moves.
    fn do_new(&mut self, params: &mut Params) {
        if params.first_is("help") {
            print::info("usage: new [startpos|fen <fen_string>] [moves] <movelist>");
            print::info("Clear search data, set position, and apply <movelist>.");
            print::info("If no position is specified startpos is assumed.");
            return;
        }

        self.do_new_game(&mut Params::default());

        let mut engine = self.engine.lock();
        if params.is_empty() || params.pop_keyword("startpos") || params.first_is("moves") {
            if let Err(err) = engine.set_position(STARTPOS) {
                print::info(&err.to_string());
                return;
            }
        } else {
            params.pop_keyword("fen");
            let text = params.to_string();
            match engine.set_position(&text) {
                Ok(remain) => {
                    let remain = remain.to_string();
                    params.parse(&remain);
                }
                Err(err) => {
                    print::info(&err.to_string());
                    return;
                }
            }
        }

        params.pop_keyword("moves");
        while let Some(front) = params.front() {
            if !is_coordinate_move(front) {
                break;
            }
            let mv = params.pop_token();
            if !engine.make_move(&mv) {
                print::info(&format!("Invalid move: {mv}"));
                break;
            }
        }

        if self.ctx.debug() {
            engine.print_board();
        }
    }

    fn do_position(&mut self, line: &str, params: &mut Params) {
        if params.is_empty() || params.first_is("help") {
            print::info("usage: position {startpos|fen <fen_string>} [moves <movelist>]");
            print::info("Set a new position and apply <movelist> (if given).");
            return;
        }

        self.stop_and_join();
        {
            let mut engine = self.engine.lock();
            if !engine.is_initialized() {
                engine.initialize();
                self.last_position.clear();
            }
        }

        let mut engine = self.engine.lock();

        if !self.last_position.is_empty() && line.starts_with(&self.last_position) {
            // The new command extends the remembered one: replay only the
            // suffix instead of rebuilding the position. Purely a shortcut;
            // any mismatch above falls back to the full rebuild.
            let suffix = line.get(self.last_position.len() + 1..).unwrap_or("");
            params.parse(suffix);
        } else if params.pop_keyword("startpos") {
            if let Err(err) = engine.set_position(STARTPOS) {
                print::info(&err.to_string());
                return;
            }
        } else {
            params.pop_keyword("fen");
            let text = params.to_string();
            match engine.set_position(&text) {
                Ok(remain) => {
                    let remain = remain.to_string();
                    params.parse(&remain);
                }
                Err(err) => {
                    print::info(&err.to_string());
                    return;
                }
            }
        }

        // Remember this position command for next time.
        self.last_position = line.to_string();

        params.pop_keyword("moves");
        while let Some(front) = params.front() {
            if !is_coordinate_move(front) {
                break;
            }
            let mv = params.pop_token();
            if !engine.make_move(&mv) {
                // Moves already applied before this one stay applied.
                print::info(&format!("Invalid move: {mv}"));
                self.last_position.clear();
                break;
            }
        }

        if self.ctx.debug() {
            engine.print_board();
        }
    }

    fn do_set_option(&mut self, params: &mut Params) {
        if params.is_empty() || params.first_is("help") {
            print::info("usage: setoption name <option_name> [value <option_value>]");
            print::info("Set the value of the specified option name.");
            print::info("If no value specified the option's default value is used,");
            print::info("or the option will be triggered if it's a button option.");
            return;
        }

        if !params.first_is("name") {
            print::info("Missing name token");
            return;
        }
        let Some(name) = params.pop_value("name", Some("value")) else {
            print::info("Missing name value");
            return;
        };

        let mut value = String::new();
        if params.first_is("value") {
            match params.pop_value("value", None) {
                Some(v) => value = v,
                None => {
                    print::info("Missing value");
                    return;
                }
            }
        }

        if !params.is_empty() {
            print::info(&format!(
                "Unexpected token: {}",
                params.front().unwrap_or_default()
            ));
            return;
        }

        if !self.engine.lock().set_option(&name, &value) {
            print::info(&format!(
                "Unknown option name '{name}' or invalid option value '{value}'"
            ));
        }
    }

    fn do_fen(&mut self, params: &mut Params) {
        if params.first_is("help") {
            print::info("usage: fen");
            print::info("Output FEN string of the current position.");
            return;
        }

        self.stop_and_join();
        self.initialize_engine();
        print::info(&self.engine.lock().fen());
    }

    fn do_print(&mut self, params: &mut Params) {
        if params.first_is("help") {
            print::info("usage: print");
            print::info("Output text representation of the current position.");
            return;
        }

        self.initialize_engine();
        self.engine.lock().print_board();
    }

    fn do_opts(&mut self) {
        for opt in self.engine.lock().options() {
            match opt.kind() {
                OptionKind::Combo => {
                    let mut line = format!("{}:{}", opt.kind().type_name(), opt.name());
                    for value in opt.combo_values() {
                        line.push(' ');
                        line.push_str(value);
                    }
                    print::info(&line);
                }
                _ => print::info(&format!(
                    "{}:{} {}",
                    opt.kind().type_name(),
                    opt.name(),
                    opt.value()
                )),
            }
        }
    }

    /// Apply one or more coordinate moves to the current position.
    fn do_move(&mut self, params: &mut Params) {
        self.stop_and_join();
        self.initialize_engine();

        self.last_position.clear();
        let mut engine = self.engine.lock();
        while !params.is_empty() {
            let mv = params.pop_token();
            if !is_coordinate_move(&mv) || !engine.make_move(&mv) {
                print::info(&format!("Invalid move: {mv}"));
                return;
            }
            if self.ctx.debug() {
                engine.print_board();
            }
        }
    }

    fn do_help(&mut self) {
        let engine = self.engine.lock();
        print::info(&format!(
            "{} {} by {}",
            engine.name(),
            engine.version(),
            engine.author()
        ));
        drop(engine);

        print::info("UCI commands:");
        for keyword in ["debug", "go", "isready", "position", "quit", "register"] {
            print::info(&format!("  {keyword}"));
        }
        for keyword in ["setoption", "stop", "uci", "ucinewgame"] {
            print::info(&format!("  {keyword}"));
        }
        print::info("Additional commands:");
        for keyword in ["exit", "fen", "help", "new", "opts", "perft", "print", "test"] {
            print::info(&format!("  {keyword}"));
        }
        print::info("Also try '<command> help' for help on a specific command");
        print::info("Or enter move(s) in coordinate notation, e.g. d2d4 g8f6");
    }

    fn do_quit(&mut self, params: &mut Params) -> bool {
        if params.first_is("help") {
            print::info("usage: quit");
            print::info("Stop engine and terminate program.");
            return false;
        }

        self.ctx.control.request_stop();
        self.stop_and_join();
        self.watchdog.shutdown();
        true
    }
}

/// Read command lines from stdin and dispatch them until quit/exit or
/// end of input.
pub fn run_loop<E: Engine>(engine: E) {
    let mut adapter = UciAdapter::new(engine);
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };
        if !adapter.handle_line(&line) {
            break;
        }
    }
}
