use std::sync::Arc;

use std::sync::atomic::AtomicBool;

use super::check_bundle;
use crate::bundle::{ParsedSnippet, ParsedUnit, SourceBundle};
use crate::diagnostic::{Category, Diagnostic};
use crate::interp::{Budget, Exhausted};
use crate::parser::MAX_NESTING;
use crate::types::MAX_TYPE_NODES;
use crate::level::LanguageLevel;
use crate::value::Value;

const LIB: &str = r#"
type Windows;
type Violations;
type Real;
type ActivityInstance { kind: "ActivityInstance", alias: string, activityType: string }
type Constraint = Windows | Violations;

static fn Real.Resource(name: string) -> Real {
    return node Real { kind: "RealResource", name: name };
}
static fn Real.Value(value: number) -> Real {
    return node Real { kind: "RealValue", value: value };
}
fn Real.lessThan(other: Real) -> Windows {
    return node Windows { kind: "RealLessThan", left: self, right: other };
}
fn Windows.and(...others: Windows[]) -> Windows {
    return node Windows { kind: "WindowsAnd", expressions: others };
}
fn Windows.violations() -> Violations {
    return node Violations { kind: "ViolationsOf", expression: self };
}
static fn Violations.ForEachActivity(
    activityType: string,
    expression: (instance: ActivityInstance) => Constraint
) -> Violations {
    const alias = "instance";
    return node Violations {
        kind: "ForEachActivity",
        activityType: activityType,
        alias: alias,
        expression: expression(node ActivityInstance { kind: "ActivityInstance", alias: alias, activityType: activityType })
    };
}
fn ActivityInstance.window() -> Windows {
    return node Windows { kind: "ActivityWindow", alias: self.alias };
}
"#;

fn check_with(units: &[(&str, &str)], snippet: &str, bindings: &[(String, Value)]) -> Vec<Diagnostic> {
    let units = units
        .iter()
        .map(|(name, text)| Arc::new(ParsedUnit::parse(*name, *text, LanguageLevel::default())))
        .collect();
    let snippet = ParsedSnippet::parse("constraint.edsl", snippet, LanguageLevel::default());
    let bundle = SourceBundle::new(units, snippet).unwrap();
    assert!(bundle.syntax_diagnostics().is_empty(), "{:?}", bundle.syntax_diagnostics());
    check_bundle(&bundle, "Constraint", bindings, &Budget::unlimited()).unwrap()
}

fn check(snippet: &str) -> Vec<Diagnostic> {
    check_with(&[("lib.edsl", LIB)], snippet, &[])
}

fn categories(diags: &[Diagnostic]) -> Vec<Category> {
    diags.iter().map(|d| d.category).collect()
}

// ---- valid programs ----

#[test]
fn library_alone_checks_clean() {
    let diags = check("return Real.Resource('x').lessThan(Real.Value(1));");
    assert!(diags.is_empty(), "{diags:?}");
}

#[test]
fn fluent_chain_with_lambda_context() {
    let diags = check(
        "return Violations.ForEachActivity('A', (i) => i.window().and(Real.Resource('x').lessThan(Real.Value(2))));",
    );
    assert!(diags.is_empty(), "{diags:?}");
}

#[test]
fn locals_and_control_flow() {
    let diags = check(
        r#"
        let threshold = 10;
        let i = 0;
        while (i < 3) {
            threshold = threshold * 2;
            i = i + 1;
        }
        const w = Real.Resource("power").lessThan(Real.Value(threshold));
        if (threshold > 50) {
            return w.violations();
        } else {
            return w;
        }
        "#,
    );
    assert!(diags.is_empty(), "{diags:?}");
}

#[test]
fn rest_arguments_accept_any_count() {
    let diags = check(
        "const w = Real.Resource('x').lessThan(Real.Value(1));\nreturn w.and(w, w, w);",
    );
    assert!(diags.is_empty(), "{diags:?}");
}

#[test]
fn later_unit_types_are_visible_to_earlier_units() {
    let diags = check_with(
        &[
            ("lib.edsl", "fn kinds() -> ActivityType[] { return ['A', 'B']; }\ntype Windows;\ntype Constraint = Windows;"),
            ("model.edsl", "type ActivityType = 'A' | 'B';"),
        ],
        "const k = kinds();\nreturn node Windows { count: k.length };",
        &[],
    );
    assert!(diags.is_empty(), "{diags:?}");
}

#[test]
fn bindings_are_typed_from_values() {
    let diags = check_with(
        &[("lib.edsl", LIB)],
        "return Real.Resource(resource).lessThan(Real.Value(limit));",
        &[
            ("resource".to_string(), Value::string("battery")),
            ("limit".to_string(), Value::Number(3.0)),
        ],
    );
    assert!(diags.is_empty(), "{diags:?}");
}

// ---- names ----

#[test]
fn undefined_name() {
    let diags = check("return nope;");
    assert_eq!(categories(&diags), vec![Category::UndefinedName]);
    assert!(diags[0].message.contains("'nope'"));
}

#[test]
fn type_used_as_value() {
    let diags = check("return Windows;");
    assert_eq!(categories(&diags), vec![Category::UndefinedName]);
    assert!(diags[0].message.contains("only refers to a type"));
}

#[test]
fn locals_shadow_static_namespaces() {
    let diags = check("const Real = 1;\nreturn Real.Resource('x');");
    assert_eq!(categories(&diags), vec![Category::UnknownProperty]);
}

#[test]
fn duplicate_declarations() {
    let diags = check_with(
        &[("a.edsl", "type Windows;\ntype Constraint = Windows;"), ("b.edsl", "type Windows;\nfn f() -> number { return 1; }\nfn f() -> number { return 2; }")],
        "return node Windows {};",
        &[],
    );
    assert_eq!(categories(&diags), vec![Category::DuplicateName, Category::DuplicateName]);
    assert_eq!(diags[0].unit, 1);
}

#[test]
fn redeclared_local() {
    let diags = check("const a = 1;\nconst a = 2;\nreturn node Windows {};");
    assert_eq!(categories(&diags), vec![Category::DuplicateName]);
}

// ---- types ----

#[test]
fn unknown_type_in_annotation() {
    let diags = check("const x: Missing = 1;\nreturn node Windows {};");
    assert_eq!(categories(&diags), vec![Category::UnknownType]);
}

#[test]
fn circular_alias() {
    let diags = check_with(
        &[("a.edsl", "type Windows;\ntype Constraint = Windows;\ntype A = B | number;\ntype B = A[];")],
        "return node Windows {};",
        &[],
    );
    assert_eq!(categories(&diags), vec![Category::CircularType]);
}

#[test]
fn wrong_return_type() {
    let diags = check("return Real.Value(1);");
    assert_eq!(categories(&diags), vec![Category::TypeMismatch]);
    assert!(diags[0].message.contains("type 'Real' is not assignable"));
}

#[test]
fn argument_type_mismatch() {
    let diags = check("return Real.Resource(1).lessThan(Real.Value(1));");
    assert_eq!(categories(&diags), vec![Category::TypeMismatch]);
}

#[test]
fn wrong_argument_count() {
    let diags = check("return Real.Resource('a', 'b').lessThan(Real.Value(1));");
    assert_eq!(categories(&diags), vec![Category::WrongArgCount]);
    assert!(diags[0].message.contains("expected 1 arguments, but got 2"));
}

#[test]
fn let_widens_const_keeps_literal() {
    let lib = "type Windows;\ntype Constraint = Windows;\nfn only_a(x: 'A') -> Windows { return node Windows {}; }";
    assert!(check_with(&[("a.edsl", lib)], "const a = 'A';\nreturn only_a(a);", &[]).is_empty());
    let diags = check_with(&[("a.edsl", lib)], "let a = 'A';\nreturn only_a(a);", &[]);
    assert_eq!(categories(&diags), vec![Category::TypeMismatch]);
}

#[test]
fn unknown_property_and_method() {
    let diags = check("const w = Real.Value(1);\nreturn w.greaterThan(w);");
    assert_eq!(categories(&diags), vec![Category::UnknownProperty]);

    let diags = check("return Real.Nope(1);");
    assert_eq!(categories(&diags), vec![Category::UnknownProperty]);
}

#[test]
fn field_access_needs_schema() {
    let diags = check("const w = Real.Value(1);\nconst k = w.kind;\nreturn w.lessThan(w);");
    assert_eq!(categories(&diags), vec![Category::UnknownProperty]);
}

#[test]
fn node_literal_schema_is_enforced() {
    let diags = check(
        "const i = node ActivityInstance { kind: 'ActivityInstance', alias: 1, extra: 2 };\nreturn i.window();",
    );
    assert_eq!(
        categories(&diags),
        vec![Category::TypeMismatch, Category::TypeMismatch, Category::UnknownProperty]
    );
}

#[test]
fn operators_are_typed() {
    let diags = check("const x = 'a' - 1;\nconst y = !1;\nreturn node Windows {};");
    assert_eq!(categories(&diags), vec![Category::TypeMismatch, Category::TypeMismatch]);

    assert!(check("const s = 'a' + 1;\nconst t = 1 + 'a';\nreturn node Windows {};").is_empty());
}

#[test]
fn comparison_without_overlap() {
    let diags = check("const same = 1 == 'a';\nreturn node Windows {};");
    assert_eq!(categories(&diags), vec![Category::TypeMismatch]);
}

#[test]
fn lambda_without_context_needs_annotations() {
    let diags = check("const f = (x) => x;\nreturn node Windows {};");
    assert_eq!(categories(&diags), vec![Category::UnknownType]);
    assert!(check("const f = (x: number) => x * 2;\nconst y: number = f(2);\nreturn node Windows {};").is_empty());
}

#[test]
fn throw_requires_string() {
    let diags = check("throw 1;");
    assert_eq!(categories(&diags), vec![Category::TypeMismatch]);
    assert!(check("throw 'bad';").is_empty());
}

// ---- assignment ----

#[test]
fn assignment_to_constant() {
    let diags = check("const a = 1;\na = 2;\nreturn node Windows {};");
    assert_eq!(categories(&diags), vec![Category::InvalidAssignment]);
}

#[test]
fn assignment_to_captured_variable() {
    let diags = check(
        "let count = 0;\nconst f = (x: number) => { count = x; return x; };\nreturn node Windows {};",
    );
    assert_eq!(categories(&diags), vec![Category::InvalidAssignment]);
}

// ---- returns ----

#[test]
fn empty_snippet_is_missing_return() {
    let diags = check("");
    assert_eq!(categories(&diags), vec![Category::MissingReturn]);
}

#[test]
fn if_without_else_does_not_terminate() {
    let diags = check("if (true) { return node Windows {}; }");
    assert_eq!(categories(&diags), vec![Category::MissingReturn]);
}

#[test]
fn infinite_loop_terminates() {
    assert!(check("while (true) {}").is_empty());
}

#[test]
fn function_missing_return() {
    let diags = check_with(
        &[("a.edsl", "type Windows;\ntype Constraint = Windows;\nfn f(x: number) -> number { if (x > 1) { return x; } }")],
        "return node Windows {};",
        &[],
    );
    assert_eq!(categories(&diags), vec![Category::MissingReturn]);
}

#[test]
fn unknown_expected_type() {
    let units = vec![Arc::new(ParsedUnit::parse("a.edsl", "type Windows;", LanguageLevel::default()))];
    let snippet = ParsedSnippet::parse("constraint.edsl", "return node Windows {};", LanguageLevel::default());
    let bundle = SourceBundle::new(units, snippet).unwrap();
    let diags = check_bundle(&bundle, "Constraint", &[], &Budget::unlimited()).unwrap();
    assert_eq!(categories(&diags), vec![Category::UnknownType]);
    assert_eq!(diags[0].unit, bundle.snippet_unit());
}

// ---- ordering ----

#[test]
fn diagnostics_are_ordered_by_unit_then_position() {
    let diags = check_with(
        &[("a.edsl", "type Windows;\ntype Constraint = Windows;\nfn f() -> number { return 'x'; }")],
        "const b = nope2;\nconst a = nope1;\nreturn node Windows {};",
        &[],
    );
    assert_eq!(diags.len(), 3);
    assert_eq!(diags[0].unit, 0);
    assert!(diags[1].message.contains("nope2"));
    assert!(diags[2].message.contains("nope1"));
}

// ---- limits ----

const HEADER: &str = "type Windows;\ntype Constraint = Windows;\n";

#[test]
fn long_array_alias_chain_is_cut_at_nesting_limit() {
    let mut source = HEADER.to_string();
    for i in 0..20_000 {
        source.push_str(&format!("type A{i} = A{}[];\n", i + 1));
    }
    source.push_str("type A20000 = number;\n");

    let diags = check_with(&[("model.edsl", source.as_str())], "return node Windows {};", &[]);
    assert!(!diags.is_empty());
    assert!(diags.iter().all(|d| d.category == Category::CircularType), "{:?}", &diags[..1]);
    assert_eq!(
        diags[0].message,
        format!("type alias 'A{MAX_NESTING}' is nested too deeply (limit {MAX_NESTING})")
    );
}

#[test]
fn alias_chain_declared_bottom_up_hits_size_limit() {
    let mut source = format!("{HEADER}type B0 = number;\n");
    for i in 1..2_000 {
        source.push_str(&format!("type B{i} = B{}[];\n", i - 1));
    }

    let diags = check_with(&[("model.edsl", source.as_str())], "return node Windows {};", &[]);
    assert_eq!(categories(&diags), vec![Category::CircularType]);
    assert_eq!(
        diags[0].message,
        format!("type is too complex (limit {MAX_TYPE_NODES} parts)")
    );
}

#[test]
fn doubling_union_aliases_hit_size_limit() {
    let mut source = format!("{HEADER}type T0 = number;\n");
    for i in 1..40 {
        source.push_str(&format!("type T{i} = T{p} | T{p}[];\n", p = i - 1));
    }

    let diags = check_with(&[("model.edsl", source.as_str())], "return node Windows {};", &[]);
    assert_eq!(categories(&diags), vec![Category::CircularType]);
    assert!(diags[0].message.contains("too complex"));
}

#[test]
fn doubling_expression_types_hit_size_limit() {
    let mut snippet = "const t0 = 1;\n".to_string();
    for i in 1..10 {
        snippet.push_str(&format!("const t{i} = [t{p}, [t{p}]];\n", p = i - 1));
    }
    snippet.push_str("return node Windows {};");

    let diags = check_with(&[("a.edsl", HEADER)], &snippet, &[]);
    assert_eq!(categories(&diags), vec![Category::TypeMismatch]);
    assert!(diags[0].message.contains("too complex"), "{}", diags[0].message);
}

#[test]
fn spent_budget_stops_checking() {
    let units = vec![Arc::new(ParsedUnit::parse("lib.edsl", LIB, LanguageLevel::default()))];
    let snippet = ParsedSnippet::parse("constraint.edsl", "return node Windows {};", LanguageLevel::default());
    let bundle = SourceBundle::new(units, snippet).unwrap();

    let cancelled = Budget::new(None, Arc::new(AtomicBool::new(true)));
    assert_eq!(check_bundle(&bundle, "Constraint", &[], &cancelled), Err(Exhausted));
}
