//! Test expression extraction from upstream Go test sources
//!
//! cel-go keeps many of its test expressions in table-driven Go tests.
//! Each [`Extractor`] recognizes one such table layout and returns the
//! expressions it finds, in document order. Anything that does not match
//! the expected shape is skipped.

mod comprehension_cases;
mod parser_cases;
mod unquote;

pub use comprehension_cases::ComprehensionCases;
pub use parser_cases::ParserCases;
pub use unquote::{unquote, UnquoteError};

use crate::error::{Error, Result};
use crate::model::Test;
use tree_sitter::{Node, Parser, Tree};

/// A parsed Go source file
pub struct GoSource {
    text: String,
    tree: Tree,
}

impl GoSource {
    pub fn parse(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_go::LANGUAGE.into())
            .map_err(|e| Error::SourceParse(format!("Failed to set language: {}", e)))?;

        let tree = parser
            .parse(&text, None)
            .ok_or_else(|| Error::SourceParse("Failed to parse source".into()))?;

        let root = tree.root_node();
        if root.has_error() {
            let at = first_error(root).unwrap_or(root).start_position();
            return Err(Error::SourceParse(format!(
                "syntax error at {}:{}",
                at.row + 1,
                at.column + 1
            )));
        }
        Ok(Self { text, tree })
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn text_of(&self, node: Node<'_>) -> &str {
        node.utf8_text(self.text.as_bytes()).unwrap_or("")
    }
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error())
        .find_map(first_error)
}

/// One upstream test-table layout
pub trait Extractor: Send + Sync {
    /// Name of the flat suite the extracted tests are placed in
    fn suite_name(&self) -> &'static str;

    fn extract(&self, source: &GoSource) -> Result<Vec<Test>>;
}

/// Pick the extractor for an upstream file by its name
pub fn extractor_for(path: &str) -> Option<Box<dyn Extractor>> {
    if path.ends_with("parser_test.go") {
        Some(Box::new(ParserCases))
    } else if path.ends_with("comprehensions_test.go") {
        Some(Box::new(ComprehensionCases))
    } else {
        None
    }
}

// ============================================================================
// Shared tree helpers
// ============================================================================

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .collect()
}

/// Strip the `literal_element` wrapper tree-sitter puts around values
/// inside composite literals
fn unwrap_element(node: Node<'_>) -> Node<'_> {
    if node.kind() == "literal_element" {
        if let Some(inner) = named_children(node).into_iter().next() {
            return inner;
        }
    }
    node
}

/// Elements of a composite literal. Elements of a typed slice may omit
/// their type (`{...}` instead of `T{...}`), so bare bodies count too.
fn composite_elements(node: Node<'_>) -> Option<Vec<Node<'_>>> {
    let body = match node.kind() {
        "composite_literal" => node.child_by_field_name("body")?,
        "literal_value" => node,
        _ => return None,
    };
    Some(named_children(body))
}

fn is_basic_literal(node: Node<'_>) -> bool {
    matches!(
        node.kind(),
        "interpreted_string_literal"
            | "raw_string_literal"
            | "rune_literal"
            | "int_literal"
            | "float_literal"
            | "imaginary_literal"
    )
}

/// Expressions of `expression_list` (or a lone expression)
fn expression_list(node: Node<'_>) -> Vec<Node<'_>> {
    if node.kind() == "expression_list" {
        named_children(node)
    } else {
        vec![node]
    }
}

/// Collect `key: "literal"` entries from every element of `outer`
///
/// `outer` is a composite literal of composite literals, the usual
/// table-driven test layout. Matching values are unquoted in order.
fn collect_keyed_literals(
    source: &GoSource,
    outer: Node<'_>,
    key: &str,
    tests: &mut Vec<Test>,
) -> Result<()> {
    let Some(elements) = composite_elements(outer) else {
        return Ok(());
    };
    for element in elements {
        let Some(fields) = composite_elements(unwrap_element(element)) else {
            continue;
        };
        for field in fields {
            if field.kind() != "keyed_element" {
                continue;
            }
            let parts = named_children(field);
            let (Some(k), Some(v)) = (
                field.child_by_field_name("key").or(parts.first().copied()),
                field.child_by_field_name("value").or(parts.get(1).copied()),
            ) else {
                continue;
            };
            let k = unwrap_element(k);
            if !matches!(k.kind(), "identifier" | "field_identifier") || source.text_of(k) != key {
                continue;
            }
            let v = unwrap_element(v);
            if !is_basic_literal(v) {
                continue;
            }
            let literal = source.text_of(v);
            let expr = unquote(literal)
                .map_err(|e| Error::Extract(format!("cannot unquote {}: {}", literal, e)))?;
            tests.push(Test::from_expr(expr));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extractor_selection() {
        assert_eq!(
            extractor_for("parser/parser_test.go").map(|e| e.suite_name()),
            Some("parsing")
        );
        assert_eq!(
            extractor_for("ext/comprehensions_test.go").map(|e| e.suite_name()),
            Some("comprehension")
        );
        assert!(extractor_for("checker/checker_test.go").is_none());
    }

    #[test]
    fn test_syntax_error_is_fatal() {
        let err = GoSource::parse("package x\nfunc (").err().unwrap();
        assert!(matches!(err, Error::SourceParse(_)), "{}", err);
    }

    #[test]
    fn test_unquote_failure_names_literal() {
        let source = GoSource::parse(
            "package p\nvar testCases = []testInfo{\n\t{I: 42},\n}\n",
        )
        .unwrap();
        let err = ParserCases.extract(&source).unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to extract expressions: cannot unquote 42: invalid syntax"
        );
    }
}
