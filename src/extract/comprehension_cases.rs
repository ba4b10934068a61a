//! `ext/comprehensions_test.go`: the `expr:` fields of the table each
//! `Test*` function assigns in its first statement.

use super::{collect_keyed_literals, expression_list, named_children, Extractor, GoSource};
use crate::error::Result;
use crate::model::Test;
use tree_sitter::Node;

const EXPR_FIELD: &str = "expr";

#[derive(Debug, Clone, Copy, Default)]
pub struct ComprehensionCases;

impl Extractor for ComprehensionCases {
    fn suite_name(&self) -> &'static str {
        "comprehension"
    }

    fn extract(&self, source: &GoSource) -> Result<Vec<Test>> {
        let mut tests = Vec::new();
        for decl in named_children(source.root()) {
            if !matches!(decl.kind(), "function_declaration" | "method_declaration") {
                continue;
            }
            let is_test = decl
                .child_by_field_name("name")
                .is_some_and(|n| source.text_of(n).starts_with("Test"));
            if !is_test {
                continue;
            }
            let Some(first) = decl.child_by_field_name("body").and_then(first_statement) else {
                continue;
            };
            if !matches!(first.kind(), "short_var_declaration" | "assignment_statement") {
                continue;
            }
            let Some(right) = first.child_by_field_name("right") else {
                continue;
            };
            for value in expression_list(right) {
                collect_keyed_literals(source, value, EXPR_FIELD, &mut tests)?;
            }
        }
        tracing::debug!(count = tests.len(), "extracted comprehension test expressions");
        Ok(tests)
    }
}

fn first_statement(block: Node<'_>) -> Option<Node<'_>> {
    let first = named_children(block).into_iter().next()?;
    if first.kind() == "statement_list" {
        return named_children(first).into_iter().next();
    }
    Some(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn exprs(go: &str) -> Vec<String> {
        let source = GoSource::parse(go).unwrap();
        ComprehensionCases
            .extract(&source)
            .unwrap()
            .into_iter()
            .map(|t| t.expr)
            .collect()
    }

    #[test]
    fn test_extracts_from_first_assignment() {
        let go = r#"package ext

import "testing"

func TestTwoVarComprehensions(t *testing.T) {
	// comment before the table
	tests := []struct {
		name string
		expr string
	}{
		{name: "all", expr: `[1, 2].all(i, v, v > 0)`},
		{expr: "{'a': 1}.exists(k, v, v == 1)"},
		{name: "no expr"},
	}
	for _, tst := range tests {
		_ = tst
	}
}
"#;
        assert_eq!(
            exprs(go),
            vec!["[1, 2].all(i, v, v > 0)", "{'a': 1}.exists(k, v, v == 1)"]
        );
    }

    #[test]
    fn test_skips_non_matching_functions() {
        let go = r#"package ext

func helper() {
	tests := []struct{ expr string }{{expr: "helper"}}
	_ = tests
}

func TestLater(t *testing.T) {
	env := newEnv()
	tests := []struct{ expr string }{{expr: "not first"}}
	_, _ = env, tests
}

func TestAssign(t *testing.T) {
	var tests []struct{ expr string }
	tests = []struct{ expr string }{{expr: "assigned"}, {expr: 42.5e0}}
	_ = tests
}

func TestEmpty(t *testing.T) {}

func TestMatch(t *testing.T) {
	tests := []struct{ expr string }{{expr: "picked"}}
	_ = tests
}
"#;
        assert_eq!(exprs(go), vec!["picked"]);
    }
}
