//! End-to-end scenarios: scripts loaded into an engine and run through the
//! command and event entry points.

use std::sync::Arc;
use std::thread;

use pretty_assertions::assert_eq;

use lingo::engine::{Engine, EngineBuilder};
use lingo::error::{ExecError, ExecResult};
use lingo::event::EventInfo;
use lingo::script::change::ChangeMode;
use lingo::script::context::{Context, EventHandle};
use lingo::script::loader::{Element, ParseCx, Want};
use lingo::script::node::Node;
use lingo::script::{Termination, Value};
use lingo::trigger::Report;
use lingo::types::ClassInfo;

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Feeds every player, printing one line each.
#[derive(Debug)]
struct Feed {
    players: Box<dyn Node>,
    amount: Option<Box<dyn Node>>,
}

impl Node for Feed {
    fn execute(&self, ctx: &mut Context) -> ExecResult<Value> {
        let amount = match &self.amount {
            Some(n) => n.execute(ctx)?,
            None => Value::Int(1),
        };
        for p in &self.players.execute_multi(ctx)? {
            ctx.print(format!("fed {p} {amount}"));
        }
        Ok(Value::None)
    }
}

fn player(id: &str) -> Option<Value> {
    let known = ["steve", "alex"];
    known
        .iter()
        .find(|k| k.eq_ignore_ascii_case(id))
        .map(|k| Value::Object { type_name: Arc::from("player"), id: (*k).to_owned() })
}

fn engine() -> Arc<Engine> {
    EngineBuilder::new()
        .register_type(ClassInfo::new("player").plural("players").parser(player))
        .with_builtins()
        .unwrap()
        .register_element(
            Element::effect(&["feed [the] %players% [by %number% [beef[s]]]"], |mut b, _| {
                Ok(Box::new(Feed { players: b.expect(0)?, amount: b.take(1) }))
            })
            .unwrap(),
        )
        .register_event(EventInfo::new("join", &["[player] join[ing]"]).unwrap())
        .build()
}

fn run(engine: &Engine, src: &str, line: &str) -> Report {
    let scripts = engine.scripts();
    let script = scripts.load("test", src);
    assert!(script.errors().is_empty(), "parse errors: {:?}", script.errors());
    scripts.run_command(line, None).expect("command defined")
}

fn output(engine: &Engine, src: &str, line: &str) -> Vec<String> {
    let report = run(engine, src, line);
    assert!(!report.termination.is_failure(), "{:?}", report.termination);
    report.output
}

// ── Spec scenarios ────────────────────────────────────────────────────────────

#[test]
fn scenario_a_feed_binds_players_and_amount() {
    let e = engine();
    let src = "command /feed:\n    feed the Steve by 3 beefs\n    feed alex and steve\n";
    assert_eq!(output(&e, src, "/feed"), ["fed steve 3", "fed alex 1", "fed steve 1"]);
}

#[test]
fn scenario_b_constant_arithmetic_folds() {
    let e = engine();
    let want = Want::of(e.types(), &["number"]).unwrap();
    let node = e.loader().force_parse("1 + 2", &want, &ParseCx::at(1)).unwrap();
    assert!(node.is_precomputed());
    let mut detached = Context::detached(Arc::clone(e.types()));
    assert_eq!(node.execute(&mut detached).unwrap(), Value::Int(3));

    let live = e.loader().force_parse("{x} + 2", &want, &ParseCx::at(1)).unwrap();
    assert!(!live.is_precomputed());
}

#[test]
fn scenario_c_change_dispatch() {
    let e = engine();
    let ok = run(&e, "command /c:\n    set {x} to 5\n    print {x}\n", "/c");
    assert!(matches!(ok.termination, Termination::Completed));
    assert_eq!(ok.output, ["5"]);

    let bad = run(&e, "command /c:\n    print \"before\"\n    add 5 to 3\n    print \"after\"\n", "/c");
    assert_eq!(bad.output, ["before"]);
    match bad.termination {
        Termination::Failed(err) => {
            assert_eq!(err.line(), Some(3));
            let ExecError::AtLine { source, .. } = err else { panic!("no line attached") };
            assert!(matches!(*source, ExecError::Unsupported { mode: ChangeMode::Add, .. }));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn scenario_d_exit_two_loops_resumes_outer_loop() {
    let e = engine();
    let src = "\
command /d:
    loop 3 times:
        print \"outer %loop-value%\"
        loop 2 times:
            loop 2 times:
                print \"inner %loop-value-2%.%loop-value-3%\"
                exit 2 loops
            print \"unreachable\"
        print \"after %loop-value%\"
    print \"done\"
";
    assert_eq!(
        output(&e, src, "/d"),
        [
            "outer 1", "inner 1.1", "after 1",
            "outer 2", "inner 1.1", "after 2",
            "outer 3", "inner 1.1", "after 3",
            "done",
        ]
    );
}

// ── Unwinding ─────────────────────────────────────────────────────────────────

#[test]
fn exit_everything_from_any_depth() {
    let e = engine();
    let src = "\
command /x:
    loop 3 times:
        if loop-value is 2:
            while true is true:
                print \"deep\"
                exit everything
        print \"%loop-value%\"
    print \"never\"
";
    let report = run(&e, src, "/x");
    assert!(matches!(report.termination, Termination::Exited));
    assert_eq!(report.output, ["1", "deep"]);
}

#[test]
fn continue_skips_rest_of_iteration() {
    let e = engine();
    let src = "\
command /odd:
    loop integers from 1 to 6:
        if mod(loop-value, 2) is 0:
            continue
        add loop-value to {_odd::*}
    print {_odd::*}
";
    assert_eq!(output(&e, src, "/odd"), ["1, 3 and 5"]);
}

#[test]
fn exit_conditional_and_section() {
    let e = engine();
    let src = "\
command /s:
    if 1 is 1:
        print \"a\"
        if 2 is 2:
            print \"b\"
            exit 2 conditionals
        print \"not printed\"
    print \"c\"
    loop 2 times:
        exit section
        print \"not printed\"
    print \"d\"
";
    assert_eq!(output(&e, src, "/s"), ["a", "b", "c", "d"]);
}

#[test]
fn while_loop_and_else_chain() {
    let e = engine();
    let src = "\
command /w:
    set {_i} to 0
    while {_i} < 4:
        add 1 to {_i}
        if {_i} is 1:
            print \"one\"
        else if {_i} is 2:
            print \"two\"
        else:
            print \"many\"
";
    assert_eq!(output(&e, src, "/w"), ["one", "two", "many", "many"]);
}

#[test]
fn false_condition_halts_quietly() {
    let e = engine();
    let report = run(&e, "command /h:\n    print \"a\"\n    1 is 2\n    print \"b\"\n", "/h");
    assert!(matches!(report.termination, Termination::Halted));
    assert_eq!(report.output, ["a"]);
}

// ── Dispatch & arguments ──────────────────────────────────────────────────────

#[test]
fn command_arguments_and_sender() {
    let e = engine();
    let src = "\
command /greet <player> [<text>]:
    print \"hi %arg-1%, from %sender%\"
    print size of arguments
";
    let script = e.scripts().load("greet", src);
    assert!(script.errors().is_empty(), "{:?}", script.errors());
    let r = e.scripts().run_command("/greet steve \"good day\"", Some(Value::Text("console".into()))).unwrap();
    assert_eq!(r.output, ["hi steve, from console", "2"]);
    assert!(e.scripts().run_command("/missing", None).is_none());
}

#[test]
fn events_share_the_handle() {
    let e = engine();
    e.scripts().load("a", "on player join:\n    print \"hello %event-name%\"\n");
    e.scripts().load("b", "on join:\n    cancel event\n");
    let fired = e.scripts().fire_event("join", EventHandle::new("join").with("name", "alex".into()));
    assert_eq!(fired.output().cloned().collect::<Vec<_>>(), ["hello alex"]);
    assert!(fired.event.is_cancelled());
}

#[test]
fn runtime_failure_is_contained() {
    let e = engine();
    let src = "command /f:\n    set {x} to \"abc\"\n    print {x} + 1\n    print \"never\"\n";
    let report = run(&e, src, "/f");
    match &report.termination {
        Termination::Failed(err) => assert_eq!(err.line(), Some(3)),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(report.output.is_empty());
    // The engine keeps working afterwards.
    assert_eq!(output(&e, "command /ok:\n    print 1\n", "/ok"), ["1"]);
}

#[test]
fn functions_and_lists() {
    let e = engine();
    let src = "\
command /fn:
    set {_l::*} to 3, 1 and 2
    print max of {_l::*}
    print sum of {_l::*}
    print upper(\"abc\")
    remove 1 from {_l::*}
    print {_l::*}
    if {_l::*} contains 3:
        print \"has 3\"
    if {_l::*} does not contain 1:
        print \"no 1\"
";
    assert_eq!(output(&e, src, "/fn"), ["3", "6", "ABC", "3 and 2", "has 3", "no 1"]);
}

// ── Concurrency ───────────────────────────────────────────────────────────────

#[test]
fn concurrent_invocations_share_globals_not_locals() {
    let e = engine();
    e.scripts().load(
        "count",
        "command /count:\n    add 1 to {_mine}\n    add 1 to {total}\n    print {_mine}\n",
    );

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let e = Arc::clone(&e);
            thread::spawn(move || {
                for _ in 0..50 {
                    let r = e.scripts().run_command("/count", None).unwrap();
                    assert_eq!(r.output, ["1"]);
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(e.globals().get("total"), Some(Value::Int(400)));
}
