//! Background command handlers.
//!
//! One handler per long-running command (go, perft, test, register). Each
//! parses its own remaining tokens, then runs to completion on a worker
//! thread via [`crate::task::TaskHandle`].

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::engine::{Engine, GoParams, SearchContext};
use crate::params::Params;
use crate::resolver::MoveResolver;
use crate::task::Command;
use crate::uci::print;

fn percent(top: u64, bottom: u64) -> f64 {
    if bottom == 0 {
        0.0
    } else {
        top as f64 * 100.0 / bottom as f64
    }
}

fn average(total: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

/// Units per second given a count and elapsed milliseconds.
fn rate(count: f64, msecs: u64) -> f64 {
    if msecs == 0 {
        0.0
    } else {
        count * 1000.0 / msecs as f64
    }
}

/// Handler for the UCI "go" command.
pub(crate) struct GoCommand<E: Engine> {
    engine: Arc<Mutex<E>>,
    ctx: SearchContext,
    params: GoParams,
}

impl<E: Engine> GoCommand<E> {
    pub(crate) fn new(engine: Arc<Mutex<E>>, ctx: SearchContext) -> Self {
        GoCommand {
            engine,
            ctx,
            params: GoParams::default(),
        }
    }
}

impl<E: Engine> Command for GoCommand<E> {
    fn usage(&self) -> String {
        "go [infinite] [ponder] [depth <x>] [nodes <x>] \
         [wtime <x>] [btime <x>] [winc <x>] [binc <x>] \
         [movetime <msecs>] [movestogo <x>]"
            .to_string()
    }

    fn description(&self) -> &'static str {
        "Find the best move for the current position."
    }

    fn parse(&mut self, params: &mut Params) -> bool {
        self.params = GoParams::default();

        while !params.is_empty() {
            if params.first_is("searchmoves") {
                print::info("searchmoves is not implemented");
                break;
            }
            let mut invalid = false;
            if params.pop_flag("infinite", &mut self.params.infinite)
                || params.pop_flag("ponder", &mut self.params.ponder)
                || params.pop_number("depth", &mut self.params.depth, &mut invalid)
                || params.pop_number("movestogo", &mut self.params.movestogo, &mut invalid)
                || params.pop_number("binc", &mut self.params.binc, &mut invalid)
                || params.pop_number("btime", &mut self.params.btime, &mut invalid)
                || params.pop_number("movetime", &mut self.params.movetime, &mut invalid)
                || params.pop_number("nodes", &mut self.params.nodes, &mut invalid)
                || params.pop_number("winc", &mut self.params.winc, &mut invalid)
                || params.pop_number("wtime", &mut self.params.wtime, &mut invalid)
            {
                continue;
            }
            if invalid {
                print::info(&format!("usage: {}", self.usage()));
            } else {
                print::info(&format!(
                    "Unexpected token: {}",
                    params.front().unwrap_or_default()
                ));
            }
            return false;
        }

        true
    }

    fn run(self: Box<Self>) {
        let mut engine = self.engine.lock();
        let budget = self.params.planned_budget(engine.white_to_move());
        self.ctx.control.begin_search(budget);
        let outcome = engine.go(&self.params, &self.ctx);
        self.ctx.control.end_search();
        print::bestmove(&outcome);
    }
}

/// Handler for the "perft" command (not a UCI command).
pub(crate) struct PerftCommand<E: Engine> {
    engine: Arc<Mutex<E>>,
    ctx: SearchContext,
    count: u32,
    skip: u32,
    max_depth: u32,
    max_leafs: u64,
    file: String,
}

impl<E: Engine> PerftCommand<E> {
    const DEFAULT_SUITE: &'static str = "epd/perftsuite.epd";

    pub(crate) fn new(engine: Arc<Mutex<E>>, ctx: SearchContext) -> Self {
        PerftCommand {
            engine,
            ctx,
            count: 0,
            skip: 0,
            max_depth: 0,
            max_leafs: 0,
            file: String::new(),
        }
    }

    /// Run one `D<depth> <leafs>` annotation. Returns false when the
    /// engine's leaf count disagrees and the whole run should stop.
    fn process(&self, engine: &mut E, depth: u32, expected: u64, total: &mut u64) -> bool {
        if self.max_depth > 0 && depth > self.max_depth {
            return true;
        }
        if self.max_leafs > 0 && expected > self.max_leafs {
            return true;
        }

        print::info(&format!("--- {depth} => {expected}"));
        let leafs = engine.perft(depth, &self.ctx);
        *total += leafs;

        if leafs != expected {
            print::info(&format!("--- {leafs} != {expected}"));
            return false;
        }
        true
    }
}

impl<E: Engine> Command for PerftCommand<E> {
    fn usage(&self) -> String {
        format!(
            "perft [depth <x>] [count <x>] [skip <x>] [leafs <x>] \
             [epd] [file <x> (default={})]",
            Self::DEFAULT_SUITE
        )
    }

    fn description(&self) -> &'static str {
        "Execute performance test."
    }

    fn parse(&mut self, params: &mut Params) -> bool {
        self.count = 0;
        self.skip = 0;
        self.max_depth = 0;
        self.max_leafs = 0;
        self.file.clear();

        let mut epd = false;
        while !params.is_empty() {
            let mut invalid = false;
            if params.pop_flag("epd", &mut epd)
                || params.pop_number("count", &mut self.count, &mut invalid)
                || params.pop_number("skip", &mut self.skip, &mut invalid)
                || params.pop_number("depth", &mut self.max_depth, &mut invalid)
                || params.pop_number("leafs", &mut self.max_leafs, &mut invalid)
                || params
                    .pop_value("file", None)
                    .map(|f| self.file = f)
                    .is_some()
            {
                continue;
            }
            if invalid {
                print::info(&format!("usage: {}", self.usage()));
            } else {
                print::info(&format!(
                    "Unexpected token: {}",
                    params.front().unwrap_or_default()
                ));
            }
            return false;
        }

        if epd && self.file.is_empty() {
            self.file = Self::DEFAULT_SUITE.to_string();
        }
        true
    }

    fn run(self: Box<Self>) {
        let mut engine = self.engine.lock();

        if self.file.is_empty() {
            let start = Instant::now();
            let leafs = engine.perft(self.max_depth, &self.ctx);
            let msecs = start.elapsed().as_millis() as u64;
            print::info(&format!(
                "perft depth {} leafs {} time {} ({:.1} KLeafs/sec)",
                self.max_depth,
                leafs,
                msecs,
                rate(leafs as f64 / 1000.0, msecs)
            ));
            return;
        }

        let file = match File::open(&self.file) {
            Ok(file) => file,
            Err(err) => {
                print::info(&format!("cannot read {}: {err}", self.file));
                return;
            }
        };
        let reader = BufReader::new(file);

        let start = Instant::now();
        let mut total: u64 = 0;
        let mut done = false;
        let mut positions: u32 = 0;
        let mut line_no: u32 = 0;

        for line in reader.lines() {
            line_no += 1;
            let text = match line {
                Ok(text) => text,
                Err(err) => {
                    print::info(&format!("read error in {}: {err}", self.file));
                    break;
                }
            };
            let text = text.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            positions += 1;
            if self.skip > 0 && positions <= self.skip {
                continue;
            }
            if self.ctx.control.should_stop() {
                break;
            }

            print::info(&format!("{} line {line_no} {text}", self.file));
            let remain = match engine.set_position(text) {
                Ok(remain) => remain,
                Err(err) => {
                    print::info(&err.to_string());
                    break;
                }
            };

            // Process "D<depth> <leafs>" annotations, e.g. "D5 4865609".
            let mut annotations = Params::new(remain);
            while !done && !annotations.is_empty() {
                let token = annotations.pop_token();
                let token = token.trim_matches(|c| c == ' ' || c == ';');
                let Some(depth_text) = token.strip_prefix('D') else {
                    continue;
                };
                let depth = depth_text.parse::<u32>().unwrap_or(0);
                if depth < 1 {
                    print::info(&format!("--- invalid depth: {token}"));
                    break;
                }
                if annotations.is_empty() {
                    print::info("--- missing expected leaf count");
                    break;
                }
                let count_token = annotations.pop_token();
                let count_token = count_token.trim_matches(|c| c == ' ' || c == ';');
                let expected = count_token.parse::<u64>().unwrap_or(0);
                if expected < 1 {
                    print::info("--- invalid expected leaf count");
                    break;
                }
                done = !self.process(&mut engine, depth, expected, &mut total);
            }

            done = done || (self.count > 0 && positions >= self.count);
            if done {
                break;
            }
        }

        let msecs = start.elapsed().as_millis() as u64;
        print::info(&format!(
            "Total Perft {} ({:.1} KLeafs/sec)",
            total,
            rate(total as f64 / 1000.0, msecs)
        ));
    }
}

/// Handler for the "test" command (not a UCI command): search a suite of
/// positions annotated with best ("bm") and avoid ("am") moves.
pub(crate) struct TestCommand<E: Engine> {
    engine: Arc<Mutex<E>>,
    ctx: SearchContext,
    print_board: bool,
    no_clear: bool,
    max_count: u32,
    max_depth: u32,
    max_fails: u32,
    skip: u32,
    max_time: u64,
    file: String,
}

struct FailedTest {
    bestmove: String,
    fen: String,
    line: u32,
}

impl<E: Engine> TestCommand<E> {
    const DEFAULT_SUITE: &'static str = "epd/test.epd";

    pub(crate) fn new(engine: Arc<Mutex<E>>, ctx: SearchContext) -> Self {
        TestCommand {
            engine,
            ctx,
            print_board: false,
            no_clear: false,
            max_count: 0,
            max_depth: 0,
            max_fails: 0,
            skip: 0,
            max_time: 0,
            file: String::new(),
        }
    }
}

impl<E: Engine> Command for TestCommand<E> {
    fn usage(&self) -> String {
        format!(
            "test [print] [noclear] [skip <x>] [count <x>] [depth <x>] \
             [time <msecs>] [fail <x>] [file <x> (default={})]",
            Self::DEFAULT_SUITE
        )
    }

    fn description(&self) -> &'static str {
        "Find the best move for a suite of test positions."
    }

    fn parse(&mut self, params: &mut Params) -> bool {
        self.print_board = false;
        self.no_clear = false;
        self.max_count = 0;
        self.max_depth = 0;
        self.max_fails = 0;
        self.skip = 0;
        self.max_time = 0;
        self.file.clear();

        while !params.is_empty() {
            let mut invalid = false;
            if params.pop_flag("noclear", &mut self.no_clear)
                || params.pop_flag("print", &mut self.print_board)
                || params.pop_number("count", &mut self.max_count, &mut invalid)
                || params.pop_number("depth", &mut self.max_depth, &mut invalid)
                || params.pop_number("fail", &mut self.max_fails, &mut invalid)
                || params.pop_number("skip", &mut self.skip, &mut invalid)
                || params.pop_number("time", &mut self.max_time, &mut invalid)
                || params
                    .pop_value("file", None)
                    .map(|f| self.file = f)
                    .is_some()
            {
                continue;
            }
            if invalid {
                print::info(&format!("usage: {}", self.usage()));
            } else {
                print::info(&format!(
                    "Unexpected token: {}",
                    params.front().unwrap_or_default()
                ));
            }
            return false;
        }

        if self.file.is_empty() {
            self.file = Self::DEFAULT_SUITE.to_string();
        }
        true
    }

    fn run(self: Box<Self>) {
        let file = match File::open(&self.file) {
            Ok(file) => file,
            Err(err) => {
                print::info(&format!("cannot read {}: {err}", self.file));
                return;
            }
        };
        let reader = BufReader::new(file);

        let mut resolver = MoveResolver::new();
        let mut failed: Vec<FailedTest> = Vec::new();
        let mut line_no: u32 = 0;
        let mut positions: u32 = 0;
        let mut tested: u32 = 0;
        let mut passed: u32 = 0;
        let mut min_depth: Option<u32> = None;
        let mut max_depth: u32 = 0;
        let mut min_seldepth: Option<u32> = None;
        let mut max_seldepth: u32 = 0;
        let mut total_depth: u64 = 0;
        let mut total_seldepth: u64 = 0;
        let mut total_nodes: u64 = 0;
        let mut total_qnodes: u64 = 0;
        let mut total_time: u64 = 0;

        let mut engine = self.engine.lock();
        engine.reset_counters();

        for line in reader.lines() {
            line_no += 1;
            let text = match line {
                Ok(text) => text,
                Err(err) => {
                    print::info(&format!("read error in {}: {err}", self.file));
                    break;
                }
            };
            let text = text.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            positions += 1;
            if self.skip > 0 && positions <= self.skip {
                continue;
            }

            tested += 1;
            print::info(&format!("--- Test {tested} at line {line_no} {text}"));

            if let Err(err) = resolver.load_fen(text) {
                print::info(&err.to_string());
                break;
            }
            let remain = match engine.set_position(text) {
                Ok(remain) => remain,
                Err(err) => {
                    print::info(&err.to_string());
                    break;
                }
            };

            // Consume "bm" and "am" annotations, translating each move to
            // coordinates against the loaded position.
            let mut annotations = Params::new(remain);
            let mut avoid: BTreeSet<String> = BTreeSet::new();
            let mut best: BTreeSet<String> = BTreeSet::new();
            while !annotations.is_empty() {
                if annotations.pop_keyword("am") {
                    while let Some(front) = annotations.front() {
                        match resolver.resolve(front) {
                            Some(coord) => {
                                annotations.pop_front();
                                avoid.insert(coord);
                            }
                            None => break,
                        }
                    }
                } else if annotations.pop_keyword("bm") {
                    while let Some(front) = annotations.front() {
                        match resolver.resolve(front) {
                            Some(coord) => {
                                annotations.pop_front();
                                best.insert(coord);
                            }
                            None => break,
                        }
                    }
                } else {
                    annotations.pop_front();
                }
            }

            if avoid.is_empty() && best.is_empty() {
                print::info(&format!(
                    "error at line {line_no}, no best or avoid moves specified"
                ));
                break;
            }

            if !self.no_clear {
                engine.clear_search_data();
            }
            if self.print_board && !self.ctx.debug() {
                engine.print_board();
            }

            let go = GoParams {
                depth: self.max_depth,
                movetime: self.max_time,
                ..GoParams::default()
            };
            let budget = go.planned_budget(engine.white_to_move());
            self.ctx.control.begin_search(budget);
            let outcome = engine.go(&go, &self.ctx);
            self.ctx.control.end_search();
            let stats = self.ctx.stats.snapshot();

            let bestmove = outcome.best_move.unwrap_or_default();
            if bestmove.is_empty() {
                print::raw("bestmove none");
            } else {
                print::raw(&format!("bestmove {bestmove}"));
            }

            let fail = bestmove.is_empty()
                || (!best.is_empty() && !best.contains(&bestmove))
                || (!avoid.is_empty() && avoid.contains(&bestmove));
            if fail {
                print::info(&format!(
                    "--- FAILED! line {line_no} ({:.1}%) {text}",
                    percent(u64::from(passed), u64::from(tested))
                ));
                failed.push(FailedTest {
                    bestmove,
                    fen: text.to_string(),
                    line: line_no,
                });
                if self.max_fails > 0 && failed.len() >= self.max_fails as usize {
                    break;
                }
            } else {
                passed += 1;
                print::info(&format!(
                    "--- Passed. line {line_no} ({:.1}%) {text}",
                    percent(u64::from(passed), u64::from(tested))
                ));
            }

            max_depth = max_depth.max(stats.depth);
            max_seldepth = max_seldepth.max(stats.seldepth);
            min_depth = Some(min_depth.map_or(stats.depth, |d| d.min(stats.depth)));
            min_seldepth = Some(min_seldepth.map_or(stats.seldepth, |d| d.min(stats.seldepth)));
            total_depth += u64::from(stats.depth);
            total_seldepth += u64::from(stats.seldepth);
            total_nodes += stats.nodes;
            total_qnodes += stats.qnodes;
            total_time += stats.msecs;

            if self.ctx.control.stop_requested()
                || (self.max_count > 0 && tested >= self.max_count)
            {
                break;
            }
        }

        print::info(&format!("--- Completed {tested} test positions"));
        print::info(&format!(
            "--- Passed    {passed} passed ({:.1}%)",
            percent(u64::from(passed), u64::from(tested))
        ));
        print::info(&format!(
            "--- Time      {total_time} ({:.1} avg)",
            average(total_time, u64::from(tested))
        ));
        print::info(&format!(
            "--- Nodes     {total_nodes}, {:.1} KNodes/sec",
            rate(total_nodes as f64 / 1000.0, total_time)
        ));
        print::info(&format!(
            "--- QNodes    {total_qnodes} ({:.1}%)",
            percent(total_qnodes, total_nodes)
        ));
        print::info(&format!(
            "--- Depth     {} min, {:.0} avg, {} max",
            min_depth.unwrap_or(0),
            average(total_depth, u64::from(tested)),
            max_depth
        ));
        print::info(&format!(
            "--- SelDepth  {} min, {:.0} avg, {} max",
            min_seldepth.unwrap_or(0),
            average(total_seldepth, u64::from(tested)),
            max_seldepth
        ));
        engine.show_counters();

        for fail in &failed {
            print::info(&format!("--- Failed line {} {}", fail.line, fail.fen));
            print::info(&format!("--- Engine move: {}", fail.bestmove));
            if (self.print_board || self.ctx.debug())
                && engine.set_position(&fail.fen).is_ok()
            {
                engine.print_board();
            }
        }
    }
}

/// Handler for the UCI "register" command.
pub(crate) struct RegisterCommand<E: Engine> {
    engine: Arc<Mutex<E>>,
    later: bool,
    name: String,
    code: String,
}

impl<E: Engine> RegisterCommand<E> {
    pub(crate) fn new(engine: Arc<Mutex<E>>) -> Self {
        RegisterCommand {
            engine,
            later: false,
            name: String::new(),
            code: String::new(),
        }
    }
}

impl<E: Engine> Command for RegisterCommand<E> {
    fn usage(&self) -> String {
        "register [later] [name <x>] [code <x>]".to_string()
    }

    fn description(&self) -> &'static str {
        "Register the chess engine to enable full functionality."
    }

    fn parse(&mut self, params: &mut Params) -> bool {
        self.later = false;
        self.name.clear();
        self.code.clear();

        params.pop_flag("later", &mut self.later);
        if let Some(name) = params.pop_value("name", Some("code")) {
            self.name = name;
        }
        if let Some(code) = params.pop_value("code", None) {
            self.code = code;
        }

        if !params.is_empty() {
            print::info(&format!(
                "Unexpected token: {}",
                params.front().unwrap_or_default()
            ));
            return false;
        }
        true
    }

    fn run(self: Box<Self>) {
        print::raw("registration checking");

        let mut engine = self.engine.lock();
        let ok = if engine.is_registered() {
            true
        } else if self.later {
            engine.register_later();
            true
        } else {
            engine.register(&self.name, &self.code)
        };

        if ok {
            print::raw("registration ok");
        } else {
            print::raw("registration error");
        }
    }
}
