//! Compilation pipeline
//!
//! Every test goes through the same steps:
//!
//! 1. parse with the shared parser (standard macros, bounded recursion and
//!    error recovery); a failure fills `error` and ends the test
//! 2. render the annotated tree into `ast`
//! 3. derive a checking environment from the test's `container` and
//!    `typeEnv`; the base environment is picked by `disableMacros`
//! 4. compile under the derived environment and record the output type,
//!    or the rendered issues as `error`
//!
//! [`Environments`] is built once per run and only read afterwards, so
//! one instance can serve tests on any number of threads.

use crate::cel::{
    self,
    debug::{to_adorned_debug_string, KindAdorner},
    decls,
    env::Env,
    macros::{standard_macros, MacroRegistry},
    parser::{Parser, ParserOptions},
    registry::{TypeCatalog, TypeRegistry},
    source::Source,
};
use crate::config::GeneratorConfig;
use crate::error::{Error, Result};
use crate::model::{IncrementalTest, Test};
use std::sync::Arc;

/// Shared parser and the macro-enabled and macro-free base environments
#[derive(Debug, Clone)]
pub struct Environments {
    parser: Parser,
    with_macros: Env,
    without_macros: Env,
    annotate_macro_calls: bool,
}

impl Environments {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let types = Arc::new(type_registry(config)?);
        let without_macros =
            cel::base_env(types, config.block_indices).map_err(Error::Environment)?;
        let with_macros = without_macros
            .extend()
            .standard_macros()
            .build()
            .map_err(Error::Environment)?;

        let mut registry = MacroRegistry::new();
        registry.extend(standard_macros());
        let parser = Parser::new(ParserOptions::from(&config.parser), Arc::new(registry));

        tracing::debug!(
            variables = without_macros.variable_count(),
            macros = with_macros.macros().len(),
            "environments ready"
        );
        Ok(Self {
            parser,
            with_macros,
            without_macros,
            annotate_macro_calls: config.annotate_macro_calls,
        })
    }

    /// Base environment for a test
    pub fn env(&self, disable_macros: bool) -> &Env {
        if disable_macros {
            &self.without_macros
        } else {
            &self.with_macros
        }
    }

    /// Run one test through the pipeline
    pub fn compile(&self, test: Test) -> IncrementalTest {
        let mut result = IncrementalTest::new(test);
        self.supplement(&mut result);
        match &result.error {
            Some(error) => tracing::debug!(
                name = result.original.name(),
                expr = %result.original.expr,
                error = %error.lines().next().unwrap_or_default(),
                "test produced an error"
            ),
            None => tracing::debug!(
                name = result.original.name(),
                expr = %result.original.expr,
                ty = result.ty.as_deref().unwrap_or_default(),
                "test compiled"
            ),
        }
        result
    }

    fn supplement(&self, result: &mut IncrementalTest) {
        let test = &result.original;
        let source = Source::new(&test.expr, test.name());
        let parsed = match self.parser.parse(&source) {
            Ok(parsed) => parsed,
            Err(issues) => {
                result.error = Some(issues.to_display_string(&source));
                return;
            }
        };

        let adorner = if self.annotate_macro_calls {
            KindAdorner::with_macro_calls(&parsed.source_info.macro_calls)
        } else {
            KindAdorner::new()
        };
        result.ast = Some(to_adorned_debug_string(&parsed.expr, &adorner));

        let env = match derive_env(self.env(test.disable_macros), test) {
            Ok(env) => env,
            Err(e) => {
                result.error = Some(e);
                return;
            }
        };
        match env.compile(&test.expr) {
            Ok(checked) => result.ty = Some(checked.output_type.to_string()),
            Err(e) => result.error = Some(e),
        }
    }
}

/// Extend `base` with the test's container and declarations
fn derive_env(base: &Env, test: &Test) -> std::result::Result<Env, String> {
    let declarations = test
        .type_env
        .iter()
        .map(decls::from_model)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut builder = base.extend();
    if !test.container().is_empty() {
        builder = builder.container(test.container());
    }
    for decl in declarations {
        builder = builder.declaration(decl);
    }
    builder.build()
}

fn type_registry(config: &GeneratorConfig) -> Result<TypeRegistry> {
    let mut types = TypeRegistry::new();
    if config.conformance_types {
        let catalog = TypeCatalog::conformance().map_err(Error::Environment)?;
        types.add_catalog(&catalog).map_err(Error::Environment)?;
    }
    let configured = TypeCatalog {
        messages: config.messages.clone(),
        enums: config.enums.clone(),
    };
    types
        .add_catalog(&configured)
        .map_err(|e| Error::Config(format!("invalid message declaration: {}", e)))?;
    Ok(types)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldConfig, MessageConfig};
    use crate::model::{Decl, OverloadDecl, TypeSpec};
    use pretty_assertions::assert_eq;
    use std::sync::LazyLock;

    static ENVS: LazyLock<Environments> =
        LazyLock::new(|| Environments::new(&GeneratorConfig::default()).unwrap());

    fn compile(test: Test) -> IncrementalTest {
        ENVS.compile(test)
    }

    #[test]
    fn test_literal() {
        let t = compile(Test::from_expr("1"));
        assert_eq!(t.ast.as_deref(), Some("1^#*expr.Constant_Int64Value#"));
        assert_eq!(t.ty.as_deref(), Some("int"));
        assert_eq!(t.error, None);
    }

    #[test]
    fn test_null_type_formatting() {
        for (expr, ty) in [
            ("null", "null"),
            ("type(null)", "type(null)"),
            ("null_type", "type(null)"),
        ] {
            let t = compile(Test::from_expr(expr));
            assert_eq!(t.ty.as_deref(), Some(ty), "{}", expr);
        }

        let t = compile(Test::from_expr("1 != null"));
        assert!(t.ty.is_none());
        assert!(
            t.error
                .as_deref()
                .unwrap()
                .starts_with("ERROR: <input>:1:3: found no matching overload for '_!=_' applied to '(int, null)'"),
            "{:?}",
            t.error
        );
    }

    #[test]
    fn test_parse_error_stops_pipeline() {
        let t = compile(Test::from_expr("1 +"));
        assert!(t.ast.is_none());
        assert!(t.ty.is_none());
        assert!(t.error.unwrap().starts_with("ERROR: :1:"));
    }

    #[test]
    fn test_parse_error_uses_test_name() {
        let mut test = Test::from_expr("has(m)");
        test.name = Some("bad_has".into());
        let t = compile(test);
        assert_eq!(
            t.error.as_deref(),
            Some("ERROR: bad_has:1:5: invalid argument to has() macro\n | has(m)\n | ....^")
        );
    }

    #[test]
    fn test_check_error_keeps_ast() {
        let t = compile(Test::from_expr("x"));
        assert_eq!(t.ast.as_deref(), Some("x^#*expr.Expr_IdentExpr#"));
        assert_eq!(
            t.error.as_deref(),
            Some("ERROR: <input>:1:1: undeclared reference to 'x' (in container '')\n | x\n | ^")
        );
        assert!(t.ty.is_none());
    }

    #[test]
    fn test_block_macros_expand_during_check() {
        let t = compile(Test::from_expr("cel.index(0)"));
        assert!(t.ast.unwrap().starts_with("cel^#*expr.Expr_IdentExpr#.index("));
        assert_eq!(t.ty.as_deref(), Some("dyn"));

        let t = compile(Test::from_expr("cel.index(-1)"));
        assert!(t.ast.is_some());
        assert!(t
            .error
            .unwrap()
            .contains("cel.index requires a single non-negative int constant arg"));
    }

    #[test]
    fn test_disable_macros() {
        let mut test = Test::from_expr("[1].all(x, x > 0)");
        let t = compile(test.clone());
        assert_eq!(t.ty.as_deref(), Some("bool"));

        test.disable_macros = true;
        let t = compile(test);
        // the shared parser still expands, checking sees a plain call
        assert!(t.ast.unwrap().contains("__comprehension__"));
        assert!(t.error.unwrap().contains("undeclared reference to 'x'"));
    }

    #[test]
    fn test_type_env_and_container() {
        let mut test = Test::from_expr("y + f(2)");
        test.container = Some("ns".into());
        test.type_env = vec![
            Decl::ident("ns.y", TypeSpec::primitive("INT64")),
            Decl::function(
                "f",
                vec![OverloadDecl {
                    overload_id: "f_int".into(),
                    params: vec![TypeSpec::primitive("INT64")],
                    result_type: Some(TypeSpec::primitive("INT64")),
                    ..Default::default()
                }],
            ),
        ];
        let t = compile(test);
        assert_eq!(t.error, None);
        assert_eq!(t.ty.as_deref(), Some("int"));
    }

    #[test]
    fn test_decl_conversion_failure() {
        let mut test = Test::from_expr("x");
        test.type_env = vec![Decl {
            name: "x".into(),
            ident: Some(Default::default()),
            function: None,
        }];
        let t = compile(test);
        assert!(t.ast.is_some());
        assert_eq!(t.error.as_deref(), Some("unsupported type: <nil>"));
    }

    #[test]
    fn test_env_extension_failure() {
        let mut test = Test::from_expr("true");
        test.type_env = vec![Decl::ident("@index0", TypeSpec::primitive("STRING"))];
        let t = compile(test);
        assert_eq!(
            t.error.as_deref(),
            Some("overlapping identifier for name '@index0'")
        );
    }

    #[test]
    fn test_configured_messages() {
        let mut config = GeneratorConfig::default();
        config.conformance_types = false;
        config.messages.push(MessageConfig {
            name: "acme.Order".into(),
            fields: vec![FieldConfig {
                name: "total".into(),
                ty: TypeSpec::primitive("DOUBLE"),
            }],
        });
        let envs = Environments::new(&config).unwrap();
        let t = envs.compile(Test::from_expr("acme.Order{total: 1.5}.total"));
        assert_eq!(t.ty.as_deref(), Some("double"));

        let t = envs.compile(Test::from_expr("cel.expr.conformance.proto3.TestAllTypes{}"));
        assert!(t.error.unwrap().contains("undeclared reference"));
    }

    #[test]
    fn test_macro_annotation() {
        let config = GeneratorConfig {
            annotate_macro_calls: true,
            ..Default::default()
        };
        let envs = Environments::new(&config).unwrap();
        let t = envs.compile(Test::from_expr("has(a.b)"));
        assert_eq!(t.ast.as_deref(), Some("a^#*expr.Expr_IdentExpr#.b~test-only~^#has#"));
    }
}
