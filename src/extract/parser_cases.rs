//! `parser/parser_test.go`: every `I:` field of the package-level
//! `testCases` table.

use super::{collect_keyed_literals, expression_list, named_children, Extractor, GoSource};
use crate::error::Result;
use crate::model::Test;
use tree_sitter::Node;

const TABLE_NAME: &str = "testCases";
const EXPR_FIELD: &str = "I";

#[derive(Debug, Clone, Copy, Default)]
pub struct ParserCases;

impl Extractor for ParserCases {
    fn suite_name(&self) -> &'static str {
        "parsing"
    }

    fn extract(&self, source: &GoSource) -> Result<Vec<Test>> {
        let mut tests = Vec::new();
        for decl in named_children(source.root()) {
            if decl.kind() != "var_declaration" {
                continue;
            }
            for spec in var_specs(decl) {
                let mut cursor = spec.walk();
                let names: Vec<_> = spec.children_by_field_name("name", &mut cursor).collect();
                let values = spec
                    .child_by_field_name("value")
                    .map(expression_list)
                    .unwrap_or_default();
                for name in names {
                    if source.text_of(name) != TABLE_NAME {
                        continue;
                    }
                    for &value in &values {
                        collect_keyed_literals(source, value, EXPR_FIELD, &mut tests)?;
                    }
                }
            }
        }
        tracing::debug!(count = tests.len(), "extracted parser test expressions");
        Ok(tests)
    }
}

/// `var x = ...` and the grouped `var ( ... )` form
fn var_specs(decl: Node<'_>) -> Vec<Node<'_>> {
    let mut specs = Vec::new();
    for child in named_children(decl) {
        match child.kind() {
            "var_spec" => specs.push(child),
            "var_spec_list" => specs.extend(
                named_children(child)
                    .into_iter()
                    .filter(|c| c.kind() == "var_spec"),
            ),
            _ => {}
        }
    }
    specs
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn exprs(go: &str) -> Vec<String> {
        let source = GoSource::parse(go).unwrap();
        ParserCases
            .extract(&source)
            .unwrap()
            .into_iter()
            .map(|t| t.expr)
            .collect()
    }

    #[test]
    fn test_extracts_in_document_order() {
        let go = r#"package parser

var testCases = []testInfo{
	{
		I: `"A"`,
		P: `"A"^#1:*expr.Constant_StringValue#`,
	},
	{
		P: `x`,
		I: "a || b",
	},
	{I: `has(m.f)`, E: ""},
}
"#;
        assert_eq!(exprs(go), vec!["\"A\"", "a || b", "has(m.f)"]);
    }

    #[test]
    fn test_ignores_unrelated_declarations() {
        let go = r#"package parser

import "testing"

var otherCases = []testInfo{{I: "skipped"}}

var (
	unrelated = 1
	testCases = []testInfo{
		{I: "1 + 2"},
		{I: someConst},
		{Name: "x", I: "3"},
		testInfo{I: "4"},
		{In: "nope"},
	}
)

func TestParse(t *testing.T) {
	testCases := []testInfo{{I: "local"}}
	_ = testCases
}
"#;
        assert_eq!(exprs(go), vec!["1 + 2", "3", "4"]);
    }

    #[test]
    fn test_empty_file() {
        assert!(exprs("package parser\n").is_empty());
    }
}
