//! `cel.block` conformance macros.
//!
//! Optimized CEL programs spell common subexpressions as
//! `cel.block([e0, e1, ...], body)` with `cel.index(n)` references, and
//! name comprehension variables `cel.iterVar(depth, unique)` /
//! `cel.accuVar(depth, unique)`. The macros rewrite those calls into the
//! synthetic identifiers the optimizer would have produced, so fixtures
//! can assert on the exact names.

use super::ast::{Expr, ExprKind, Literal};
use super::decls::VariableDecl;
use super::env::Library;
use super::macros::{target_matches_namespace, Macro, MacroError, MacroHelper, MacroResult};
use super::types::Type;

pub const BLOCK_FUNCTION: &str = "cel.@block";
pub const INDEX_PREFIX: &str = "@index";
pub const ITER_VAR_PREFIX: &str = "@it";
pub const ACCU_VAR_PREFIX: &str = "@ac";

/// Declares `@index0 .. @index{indices-1}` as `dyn` and registers the
/// four macros.
#[derive(Debug, Clone, Copy)]
pub struct BlockLibrary {
    pub indices: usize,
}

impl Library for BlockLibrary {
    fn name(&self) -> &'static str {
        "cel.lib.ext.cel.block.conformance"
    }

    fn macros(&self) -> Vec<Macro> {
        vec![
            Macro::receiver("block", 2, expand_block),
            Macro::receiver("index", 1, expand_index),
            Macro::receiver("iterVar", 2, expand_iter_var),
            Macro::receiver("accuVar", 2, expand_accu_var),
        ]
    }

    fn variables(&self) -> Vec<VariableDecl> {
        (0..self.indices)
            .map(|i| VariableDecl::new(format!("{}{}", INDEX_PREFIX, i), Type::Dyn))
            .collect()
    }
}

fn expand_block(h: &mut MacroHelper<'_>, target: Option<&Expr>, args: &[Expr]) -> MacroResult {
    if !target_matches_namespace("cel", target) {
        return Ok(None);
    }
    if !args[0].is_list() {
        return Err(h.error(
            &args[0],
            "cel.block requires the first arg to be a list literal",
        ));
    }
    Ok(Some(h.call(BLOCK_FUNCTION, args.to_vec())))
}

fn expand_index(h: &mut MacroHelper<'_>, target: Option<&Expr>, args: &[Expr]) -> MacroResult {
    if !target_matches_namespace("cel", target) {
        return Ok(None);
    }
    let index = non_negative_int(&args[0]).ok_or_else(|| {
        h.error(
            &args[0],
            "cel.index requires a single non-negative int constant arg",
        )
    })?;
    Ok(Some(h.ident(&format!("{}{}", INDEX_PREFIX, index))))
}

fn expand_iter_var(h: &mut MacroHelper<'_>, target: Option<&Expr>, args: &[Expr]) -> MacroResult {
    expand_comprehension_var(h, target, args, "cel.iterVar", ITER_VAR_PREFIX)
}

fn expand_accu_var(h: &mut MacroHelper<'_>, target: Option<&Expr>, args: &[Expr]) -> MacroResult {
    expand_comprehension_var(h, target, args, "cel.accuVar", ACCU_VAR_PREFIX)
}

fn expand_comprehension_var(
    h: &mut MacroHelper<'_>,
    target: Option<&Expr>,
    args: &[Expr],
    function: &str,
    prefix: &str,
) -> MacroResult {
    if !target_matches_namespace("cel", target) {
        return Ok(None);
    }
    let invalid = |h: &MacroHelper<'_>, arg: &Expr| -> MacroError {
        h.error(
            arg,
            format!("{} requires two non-negative int constant args", function),
        )
    };
    let depth = non_negative_int(&args[0]).ok_or_else(|| invalid(h, &args[0]))?;
    let unique = non_negative_int(&args[1]).ok_or_else(|| invalid(h, &args[1]))?;
    Ok(Some(h.ident(&format!("{}:{}:{}", prefix, depth, unique))))
}

/// Signed integer literal `>= 0`; uint literals do not qualify
fn non_negative_int(expr: &Expr) -> Option<i64> {
    match &expr.kind {
        ExprKind::Literal(Literal::Int(n)) if *n >= 0 => Some(*n),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cel::debug::to_debug_string;
    use crate::cel::macros::MacroRegistry;
    use crate::cel::parser::{Parser, ParserOptions};
    use crate::cel::source::Source;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::sync::Arc;

    fn parser() -> Parser {
        let mut registry = MacroRegistry::new();
        registry.extend(BlockLibrary { indices: 30 }.macros());
        Parser::new(ParserOptions::default(), Arc::new(registry))
    }

    fn parse(text: &str) -> Result<String, String> {
        let source = Source::new(text, "<input>");
        parser()
            .parse(&source)
            .map(|ast| to_debug_string(&ast.expr))
            .map_err(|issues| issues.to_display_string(&source))
    }

    #[rstest]
    #[case("cel.index(0)", "@index0")]
    #[case("cel.index(29)", "@index29")]
    #[case("cel.iterVar(0, 1)", "@it:0:1")]
    #[case("cel.accuVar(2, 0)", "@ac:2:0")]
    fn test_synthetic_identifiers(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(parse(text), Ok(expected.to_string()));
    }

    #[test]
    fn test_block_rewrites_to_internal_call() {
        let rendered = parse("cel.block([1], cel.index(0))").unwrap();
        assert!(rendered.starts_with("cel.@block("), "{}", rendered);
        assert!(rendered.contains("@index0"), "{}", rendered);
    }

    #[rstest]
    #[case("cel.index(-1)", "cel.index requires a single non-negative int constant arg")]
    #[case("cel.index('x')", "cel.index requires a single non-negative int constant arg")]
    #[case("cel.index(1u)", "cel.index requires a single non-negative int constant arg")]
    #[case("cel.block(1, 2)", "cel.block requires the first arg to be a list literal")]
    #[case("cel.iterVar(0, -2)", "cel.iterVar requires two non-negative int constant args")]
    #[case("cel.accuVar(x, 0)", "cel.accuVar requires two non-negative int constant args")]
    fn test_invalid_arguments(#[case] text: &str, #[case] message: &str) {
        let err = parse(text).unwrap_err();
        assert!(err.contains(message), "{}", err);
    }

    #[test]
    fn test_other_namespaces_untouched() {
        assert_eq!(parse("x.index(0)"), Ok("x.index(\n  0\n)".to_string()));
    }

    #[test]
    fn test_index_variables_declared() {
        let vars = BlockLibrary { indices: 30 }.variables();
        assert_eq!(vars.len(), 30);
        assert_eq!(vars[0], VariableDecl::new("@index0", Type::Dyn));
        assert_eq!(vars[29].name, "@index29");
    }
}
