use proptest::prelude::*;

use lingo::engine::EngineBuilder;
use lingo::pattern::Pattern;
use lingo::script::builtins::call_builtin;
use lingo::script::stmt::parse_tree;
use lingo::script::value::Value;

/// Templates exercising every group kind, as written in the built-in library.
const TEMPLATES: &[&str] = &[
    "feed [the] %players% [by %number% [beef[s]]]",
    "exit [%*number%] (1¦section|2¦loop|3¦conditional)[s]",
    "%number% (is|are) [1¦not] (2¦greater|4¦less) than [8¦or equal to] %number%",
    "(1¦sum|2¦product|3¦min|4¦max) of %numbers%",
    "[the] [command] sender",
    "loop-(1¦value|2¦iteration|3¦index)[-<\\d+>]",
    "remove all %objects% from %objects%",
    "integers (between|from) %number% (and|to) %number%",
];

/// Replace every `%…%` placeholder and `<…>` regex in a phrasing with a
/// concrete word the group accepts.
fn instantiate(phrasing: &str) -> String {
    let mut out = String::new();
    let mut chars = phrasing.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => {
                for c2 in chars.by_ref() {
                    if c2 == '%' {
                        break;
                    }
                }
                out.push_str("x7");
            }
            '<' => {
                for c2 in chars.by_ref() {
                    if c2 == '>' {
                        break;
                    }
                }
                out.push('2');
            }
            c => out.push(c),
        }
    }
    out
}

#[test]
fn every_phrasing_matches_its_template() {
    for src in TEMPLATES {
        let p = Pattern::compile(src).unwrap();
        for phrasing in p.phrasings(256) {
            let text = instantiate(&phrasing);
            let results = p.matches(&text);
            assert!(
                results.iter().any(|m| !m.unmatched),
                "{src}: phrasing {text:?} did not match cleanly"
            );
        }
    }
}

#[test]
fn mark_accumulates_over_branches() {
    let p = Pattern::compile("(1¦a|2¦b) [4¦c]").unwrap();
    let marks: Vec<u32> = p.matches("a c").iter().map(|m| m.mark).collect();
    assert_eq!(marks, [5]);
    assert_eq!(p.matches("b").first().map(|m| m.mark), Some(2));
}

/// Operands at and around the edges of the integer range.
fn edge_int() -> impl Strategy<Value = i64> {
    prop_oneof![Just(i64::MIN), Just(i64::MAX), Just(-1i64), Just(0i64), any::<i64>()]
}

/// Binary arithmetic written either as an operator or a function call.
fn arith_line() -> impl Strategy<Value = String> {
    (edge_int(), edge_int(), 0usize..6).prop_map(|(a, b, op)| match op {
        0 => format!("{a} + {b}"),
        1 => format!("{a} - {b}"),
        2 => format!("{a} * {b}"),
        3 => format!("{a} / {b}"),
        4 => format!("mod({a}, {b})"),
        _ => format!("abs({a}) + {b}"),
    })
}

proptest! {
    /// Extreme integers either compute or fail the invocation; neither
    /// loading (which folds constants) nor running may panic.
    #[test]
    fn extreme_arithmetic_never_panics(expr in arith_line(), a in edge_int(), b in edge_int()) {
        let engine = EngineBuilder::new().with_builtins().unwrap().build();
        let src = format!(
            "command /c:\n    print {expr}\n\
             command /v:\n    set {{_a}} to {a}\n    set {{_b}} to {b}\n    \
             print {{_a}} / {{_b}}\n    print mod({{_a}}, {{_b}})\n    print {{_a}} * {{_b}}\n"
        );
        let script = engine.scripts().load("edge", &src);
        prop_assert_eq!(script.triggers().len(), 2);
        prop_assert!(engine.scripts().run_command("/c", None).is_some());
        prop_assert!(engine.scripts().run_command("/v", None).is_some());
    }

    /// Matching the same text twice yields the same ordered results.
    #[test]
    fn matching_is_deterministic(words in proptest::collection::vec("[a-z0-9]{1,6}", 0..8)) {
        let text = words.join(" and ");
        for src in TEMPLATES {
            let p = Pattern::compile(src).unwrap();
            prop_assert_eq!(p.matches(&text), p.matches(&text));
        }
    }

    /// The template compiler returns `Ok` or `Err` for any input.
    #[test]
    fn compiler_does_not_panic(s in "\\PC{0,40}") {
        let _ = Pattern::compile(&s);
    }

    /// The matcher never panics, whatever the template and text.
    #[test]
    fn matcher_does_not_panic(t in "[a-z%\\[\\]()|¦ 0-9]{0,24}", s in "\\PC{0,40}") {
        if let Ok(p) = Pattern::compile(&t) {
            let _ = p.matches(&s);
        }
    }

    /// Script text never panics the line splitter.
    #[test]
    fn line_tree_does_not_panic(s in "\\PC*") {
        let _ = parse_tree(&s);
    }

    /// Loading arbitrary lines reports errors instead of panicking.
    #[test]
    fn loader_does_not_panic(body in proptest::collection::vec("[ -~]{0,30}", 0..6)) {
        let engine = EngineBuilder::new().with_builtins().unwrap().build();
        let src: String = std::iter::once("command /p:".to_owned())
            .chain(body.iter().map(|l| format!("    {l}")))
            .collect::<Vec<_>>()
            .join("\n");
        let script = engine.load_script("prop", &src);
        prop_assert!(script.errors().iter().all(|e| e.line() >= 1));
    }

    /// Constant arithmetic folds to the value the operators compute.
    #[test]
    fn folded_sums_are_exact(a in -1000i64..1000, b in -1000i64..1000, c in 1i64..50) {
        let engine = EngineBuilder::new().with_builtins().unwrap().build();
        engine.scripts().load("p", &format!("command /f:\n    print {a} + {b} * {c}\n"));
        let report = engine.scripts().run_command("/f", None).unwrap();
        prop_assert_eq!(report.output, vec![(a + b * c).to_string()]);
    }

    /// `substr` returns a run of the input's characters.
    #[test]
    fn substr_properties(s in "\\PC*", start in 0i64..100i64, len in 0i64..100i64) {
        let args = [Value::Text(s.clone()), Value::Int(start), Value::Int(len)];
        if let Some(Ok(Value::Text(out))) = call_builtin("substr", &args) {
            prop_assert!(out.chars().count() <= s.chars().count());
            prop_assert!(s.contains(&out));
        }
    }
}
