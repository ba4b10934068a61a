//! End-to-end generation through the library API

use celgen::*;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;

fn envs() -> Environments {
    Environments::new(&GeneratorConfig::default()).unwrap()
}

fn find<'a>(suite: &'a IncrementalSuite, name: &str) -> &'a IncrementalTest {
    suite
        .tests
        .iter()
        .find(|t| t.original.name() == name)
        .unwrap_or_else(|| panic!("no test {}", name))
}

#[test]
fn test_conformance_directory() {
    let envs = envs();
    let assembled = Assembler::new(&envs, false)
        .assemble(Path::new("tests/fixtures/conformance"), Path::new("go.mod"))
        .unwrap();
    assert_eq!(assembled.provenance, "tests/fixtures/conformance");

    let suite = &assembled.suite;
    assert_eq!(suite.name, "conformance");
    let files: Vec<_> = suite.suites.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(files, vec!["basic", "macros"]);
    assert_eq!(suite.test_count(), 8);

    let basic = &suite.suites[0];
    let sections: Vec<_> = basic.suites.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(sections, vec!["self_eval_zeroish", "variables"]);

    let zero = find(&basic.suites[0], "self_eval_int_zero");
    assert_eq!(zero.ast.as_deref(), Some("0^#*expr.Constant_Int64Value#"));
    assert_eq!(zero.ty.as_deref(), Some("int"));
    assert_eq!(zero.section.as_deref(), Some("self_eval_zeroish"));
    assert_eq!(
        find(&basic.suites[0], "self_eval_string_empty").ty.as_deref(),
        Some("string")
    );

    let variables = &basic.suites[1];
    assert_eq!(find(variables, "self_eval_bound_lookup").ty.as_deref(), Some("int"));
    let unbound = find(variables, "self_eval_unbound_lookup");
    assert_eq!(unbound.ty, None);
    assert!(unbound
        .error
        .as_deref()
        .unwrap()
        .contains("undeclared reference to 'x'"));
    assert_eq!(find(variables, "html_escaped").ty.as_deref(), Some("bool"));

    let macros = &suite.suites[1];
    let exists = &macros.suites[0];
    assert_eq!(find(exists, "list_elem_some_true").ty.as_deref(), Some("bool"));
    let no_macros = find(exists, "no_macros");
    assert!(no_macros.ast.is_some());
    assert!(no_macros.error.is_some());
    assert_eq!(
        find(&macros.suites[1], "list_double").ty.as_deref(),
        Some("list(int)")
    );
}

#[test]
fn test_unknown_fields_survive() {
    let envs = envs();
    let suite = Assembler::new(&envs, true)
        .from_directory(Path::new("tests/fixtures/conformance"))
        .unwrap();
    let json = emit::to_json(&suite, false).unwrap();
    assert!(json.contains(r#""value":{"int64Value":"123"}"#));
    assert!(json.contains(r#""bindings":"#));
    assert!(json.contains(r#"1 \u003c 2 \u0026\u0026"#));
}

#[test]
fn test_parallel_matches_sequential() {
    let envs = envs();
    let dir = Path::new("tests/fixtures/conformance");
    let sequential = Assembler::new(&envs, false).from_directory(dir).unwrap();
    let parallel = Assembler::new(&envs, true).from_directory(dir).unwrap();
    assert_eq!(sequential, parallel);
}

#[test]
fn test_parser_tests_from_module_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let go_mod = tmp.path().join("go.mod");
    fs::write(
        &go_mod,
        "module example.com/x\n\nrequire github.com/google/cel-go v0.0.1\n",
    )
    .unwrap();
    let parser_dir = tmp.path().join("mod/github.com/google/cel-go@v0.0.1/parser");
    fs::create_dir_all(&parser_dir).unwrap();
    fs::copy(
        "tests/fixtures/cel-go/parser/parser_test.go",
        parser_dir.join("parser_test.go"),
    )
    .unwrap();

    let file = upstream::read_from_cache(&tmp.path().join("mod"), &go_mod, "parser/parser_test.go")
        .unwrap();
    let envs = envs();
    let suite = Assembler::new(&envs, false)
        .from_go_source("parser/parser_test.go", &file)
        .unwrap();

    assert_eq!(suite.name, "parsing");
    let exprs: Vec<_> = suite.tests.iter().map(|t| t.original.expr.as_str()).collect();
    assert_eq!(exprs, vec!["\"A\"", "a.b(5)", "*@a | b", "has(m.f)"]);

    assert_eq!(suite.tests[0].ty.as_deref(), Some("string"));
    assert!(suite.tests[1].ast.as_deref().unwrap().starts_with("a^#*expr.Expr_IdentExpr#.b("));
    assert!(suite.tests[2].ast.is_none());
    assert!(suite.tests[2].error.as_deref().unwrap().starts_with("ERROR: :1:"));
    assert!(suite.tests[3].ast.is_some());
}

#[test]
fn test_comprehension_tests() {
    let text = fs::read_to_string("tests/fixtures/cel-go/ext/comprehensions_test.go").unwrap();
    let source = GoSource::parse(text.as_str()).unwrap();
    let extractor = extractor_for("ext/comprehensions_test.go").unwrap();
    let tests = extractor.extract(&source).unwrap();
    let exprs: Vec<_> = tests.iter().map(|t| t.expr.as_str()).collect();
    assert_eq!(
        exprs,
        vec![
            "[1, 2].all(i, v, i < v)",
            "{'a': 1}.exists(k, v, k == 'a' && v == 1)",
            "[].all(i, i, i < i)",
        ]
    );

    let envs = envs();
    for test in tests {
        let compiled = envs.compile(test);
        assert!(compiled.ast.is_some(), "{:?}", compiled);
    }
}
