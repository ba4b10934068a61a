//! Type-checking environments.
//!
//! An [`Env`] is immutable once built. Per-test customization (container,
//! extra declarations) goes through [`Env::extend`], which shares the
//! base tables until they are modified, so one base environment can serve
//! many tests concurrently.

use super::checker::{self, CheckedAst};
use super::decls::{Declaration, FunctionDecl, VariableDecl};
use super::macros::{standard_macros, Macro, MacroRegistry};
use super::parser::{Parser, ParserOptions};
use super::registry::TypeRegistry;
use super::source::Source;
use super::types::Type;
use std::collections::HashMap;
use std::sync::Arc;

/// Description given to sources compiled through [`Env::compile`]
pub const COMPILE_SOURCE_NAME: &str = "<input>";

/// Bundle of declarations and macros added to an environment as a unit
pub trait Library {
    fn name(&self) -> &'static str;

    fn macros(&self) -> Vec<Macro> {
        Vec::new()
    }

    fn variables(&self) -> Vec<VariableDecl> {
        Vec::new()
    }

    fn functions(&self) -> Result<Vec<FunctionDecl>, String> {
        Ok(Vec::new())
    }
}

/// Parser settings used by [`Env::compile`]: the usual CEL defaults with
/// optional and escaped-identifier syntax enabled.
pub fn compile_parser_options() -> ParserOptions {
    ParserOptions {
        max_recursion_depth: 250,
        error_recovery_limit: 30,
        error_recovery_lookahead_limit: 256,
        optional_syntax: true,
        identifier_escape_syntax: true,
        populate_macro_calls: false,
    }
}

#[derive(Debug, Clone)]
pub struct Env {
    container: String,
    variables: Arc<HashMap<String, VariableDecl>>,
    functions: Arc<HashMap<String, FunctionDecl>>,
    macros: Arc<MacroRegistry>,
    types: Arc<TypeRegistry>,
    parser: Parser,
}

/// A resolved identifier: its fully qualified name and type
#[derive(Debug, Clone, PartialEq)]
pub struct IdentRef {
    pub name: String,
    pub ty: Type,
}

impl Env {
    pub fn builder(types: Arc<TypeRegistry>) -> EnvBuilder {
        let macros = Arc::new(MacroRegistry::new());
        EnvBuilder::new(Env {
            container: String::new(),
            variables: Arc::default(),
            functions: Arc::default(),
            parser: Parser::new(compile_parser_options(), macros.clone()),
            macros,
            types,
        })
    }

    /// Start a derived environment; `self` is left untouched
    pub fn extend(&self) -> EnvBuilder {
        EnvBuilder::new(self.clone())
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn macros(&self) -> &MacroRegistry {
        &self.macros
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Names to try for `name` within the container, most qualified
    /// first. A leading `.` means the root namespace only.
    pub fn candidate_names(&self, name: &str) -> Vec<String> {
        if let Some(rooted) = name.strip_prefix('.') {
            return vec![rooted.to_string()];
        }
        if self.container.is_empty() {
            return vec![name.to_string()];
        }
        let mut candidates = vec![format!("{}.{}", self.container, name)];
        let mut next = self.container.as_str();
        while let Some(i) = next.rfind('.') {
            next = &next[..i];
            candidates.push(format!("{}.{}", next, name));
        }
        candidates.push(name.to_string());
        candidates
    }

    /// Declared variable, message type, or enum constant for one
    /// already-qualified candidate name
    pub fn find_ident(&self, candidate: &str) -> Option<IdentRef> {
        if let Some(decl) = self.variables.get(candidate) {
            return Some(IdentRef {
                name: decl.name.clone(),
                ty: decl.ty.clone(),
            });
        }
        if let Some(t) = self.types.find_struct_type(candidate) {
            return Some(IdentRef {
                name: candidate.to_string(),
                ty: t,
            });
        }
        self.types.enum_value(candidate).map(|_| IdentRef {
            name: candidate.to_string(),
            ty: Type::Int,
        })
    }

    pub fn lookup_ident(&self, name: &str) -> Option<IdentRef> {
        self.candidate_names(name)
            .iter()
            .find_map(|candidate| self.find_ident(candidate))
    }

    pub fn lookup_function(&self, name: &str) -> Option<&FunctionDecl> {
        self.candidate_names(name)
            .iter()
            .find_map(|candidate| self.functions.get(candidate))
    }

    /// Parse `text` with this environment's macros and syntax options
    pub fn parse(&self, source: &Source) -> Result<super::ast::ParsedAst, super::issues::Issues> {
        self.parser.parse(source)
    }

    /// Parse and check. Errors come back rendered, one `ERROR:` block per
    /// issue.
    pub fn compile(&self, text: &str) -> Result<CheckedAst, String> {
        let source = Source::new(text, COMPILE_SOURCE_NAME);
        let parsed = self
            .parse(&source)
            .map_err(|issues| issues.to_display_string(&source))?;
        checker::check(self, &parsed).map_err(|issues| issues.to_display_string(&source))
    }
}

/// Accumulates changes to an [`Env`]. Declaration errors are collected
/// and reported by [`EnvBuilder::build`].
pub struct EnvBuilder {
    env: Env,
    container_error: Option<String>,
    function_errors: Vec<String>,
    ident_errors: Vec<String>,
    macros_changed: bool,
}

impl EnvBuilder {
    fn new(env: Env) -> Self {
        Self {
            env,
            container_error: None,
            function_errors: Vec::new(),
            ident_errors: Vec::new(),
            macros_changed: false,
        }
    }

    pub fn container(mut self, name: &str) -> Self {
        if name.starts_with('.') {
            self.container_error = Some(format!(
                "container name must not contain a leading '.': {}",
                name
            ));
        } else {
            self.env.container = name.to_string();
        }
        self
    }

    pub fn macros(mut self, macros: impl IntoIterator<Item = Macro>) -> Self {
        Arc::make_mut(&mut self.env.macros).extend(macros);
        self.macros_changed = true;
        self
    }

    pub fn standard_macros(self) -> Self {
        self.macros(standard_macros())
    }

    pub fn variable(mut self, decl: VariableDecl) -> Self {
        let equivalent = self.env.variables.get(&decl.name).map(|e| e.ty == decl.ty);
        match equivalent {
            Some(true) => {}
            Some(false) => self
                .ident_errors
                .push(format!("overlapping identifier for name '{}'", decl.name)),
            None => {
                Arc::make_mut(&mut self.env.variables).insert(decl.name.clone(), decl);
            }
        }
        self
    }

    pub fn function(mut self, decl: FunctionDecl) -> Self {
        if !self.function_errors.is_empty() {
            return self;
        }
        let functions = Arc::make_mut(&mut self.env.functions);
        let merged = match functions.get(&decl.name) {
            Some(existing) => {
                let mut merged = existing.clone();
                if let Err(e) = merged.merge(&decl) {
                    self.function_errors.push(e);
                    return self;
                }
                merged
            }
            None => decl,
        };
        match macro_overlaps(&merged) {
            None => {
                functions.insert(merged.name.clone(), merged);
            }
            Some(error) => self.function_errors.push(error),
        }
        self
    }

    pub fn declaration(self, decl: Declaration) -> Self {
        match decl {
            Declaration::Variable(v) => self.variable(v),
            Declaration::Function(f) => self.function(f),
        }
    }

    pub fn library(mut self, lib: &dyn Library) -> Self {
        tracing::trace!(library = lib.name(), "adding library");
        let macros = lib.macros();
        if !macros.is_empty() {
            self = self.macros(macros);
        }
        for v in lib.variables() {
            self = self.variable(v);
        }
        match lib.functions() {
            Ok(functions) => {
                for f in functions {
                    self = self.function(f);
                }
            }
            Err(e) => self.function_errors.push(e),
        }
        self
    }

    pub fn build(mut self) -> Result<Env, String> {
        if let Some(e) = self.container_error {
            return Err(e);
        }
        if let Some(first) = self.function_errors.first() {
            return Err(first.clone());
        }
        if !self.ident_errors.is_empty() {
            return Err(self.ident_errors.join("\n"));
        }
        if self.macros_changed {
            let options = self.env.parser.options().clone();
            self.env.parser = Parser::new(options, self.env.macros.clone());
        }
        Ok(self.env)
    }
}

/// Overloads that would be shadowed by a standard macro of the same
/// name, call style and arity. Only the first offending overload is
/// reported.
fn macro_overlaps(decl: &FunctionDecl) -> Option<String> {
    let standard = standard_macros();
    decl.overloads()
        .iter()
        .find(|overload| {
            standard.iter().any(|m| {
                m.name() == decl.name
                    && m.is_receiver() == overload.member
                    && m.arg_count() == Some(overload.args.len())
            })
        })
        .map(|overload| {
            format!(
                "overlapping macro for name '{}' with {} args",
                decl.name,
                overload.args.len()
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cel::decls::OverloadDecl;
    use pretty_assertions::assert_eq;

    fn base() -> Env {
        Env::builder(Arc::new(TypeRegistry::new()))
            .variable(VariableDecl::new("x", Type::Int))
            .build()
            .unwrap()
    }

    #[test]
    fn test_candidate_names() {
        let env = base().extend().container("a.b.c").build().unwrap();
        assert_eq!(
            env.candidate_names("x"),
            vec!["a.b.c.x", "a.b.x", "a.x", "x"]
        );
        assert_eq!(env.candidate_names(".x"), vec!["x"]);
        assert_eq!(base().candidate_names("x"), vec!["x"]);
    }

    #[test]
    fn test_rooted_container_rejected() {
        let err = base().extend().container(".a.b").build().unwrap_err();
        assert_eq!(err, "container name must not contain a leading '.': .a.b");
    }

    #[test]
    fn test_container_resolution_prefers_qualified() {
        let env = base()
            .extend()
            .container("ns")
            .variable(VariableDecl::new("ns.x", Type::String))
            .build()
            .unwrap();
        assert_eq!(env.lookup_ident("x").unwrap().ty, Type::String);
        assert_eq!(env.lookup_ident(".x").unwrap().ty, Type::Int);
    }

    #[test]
    fn test_message_and_enum_idents() {
        let env = base();
        assert_eq!(
            env.lookup_ident("google.protobuf.Duration").unwrap().ty,
            Type::type_of(Type::Duration)
        );
        assert_eq!(
            env.lookup_ident("google.protobuf.NullValue.NULL_VALUE").unwrap().ty,
            Type::Int
        );
        assert!(env.lookup_ident("y").is_none());
    }

    #[test]
    fn test_extend_leaves_base_untouched() {
        let env = base();
        let derived = env
            .extend()
            .variable(VariableDecl::new("y", Type::Bool))
            .build()
            .unwrap();
        assert!(derived.lookup_ident("y").is_some());
        assert!(env.lookup_ident("y").is_none());
    }

    #[test]
    fn test_overlapping_identifier() {
        let err = base()
            .extend()
            .variable(VariableDecl::new("x", Type::String))
            .build()
            .unwrap_err();
        assert_eq!(err, "overlapping identifier for name 'x'");
        // same type is not an overlap
        assert!(base()
            .extend()
            .variable(VariableDecl::new("x", Type::Int))
            .build()
            .is_ok());
    }

    #[test]
    fn test_overlapping_macro() {
        let f = FunctionDecl::new(
            "has",
            vec![OverloadDecl::global("has_dyn", vec![Type::Dyn], Type::Bool)],
        )
        .unwrap();
        let err = base().extend().function(f).build().unwrap_err();
        assert_eq!(err, "overlapping macro for name 'has' with 1 args");
    }

    #[test]
    fn test_overlapping_macro_reported_once() {
        let f = FunctionDecl::new(
            "has",
            vec![
                OverloadDecl::global("has_int", vec![Type::Int], Type::Bool),
                OverloadDecl::global("has_string", vec![Type::String], Type::Bool),
            ],
        )
        .unwrap();
        assert_eq!(
            macro_overlaps(&f),
            Some("overlapping macro for name 'has' with 1 args".to_string())
        );
        let ok = FunctionDecl::new(
            "has",
            vec![OverloadDecl::global("has_two", vec![Type::Dyn, Type::Dyn], Type::Bool)],
        )
        .unwrap();
        assert_eq!(macro_overlaps(&ok), None);
    }

    #[test]
    fn test_function_merge_collision() {
        let first = FunctionDecl::new(
            "f",
            vec![OverloadDecl::global("f_int", vec![Type::Int], Type::Int)],
        )
        .unwrap();
        let second = FunctionDecl::new(
            "f",
            vec![OverloadDecl::global("f_int_again", vec![Type::Int], Type::Int)],
        )
        .unwrap();
        let err = base()
            .extend()
            .function(first)
            .function(second)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            "function declaration merge failed: overload signature collision in function f: f_int collides with f_int_again"
        );
    }

    #[test]
    fn test_macros_reach_parser() {
        let env = base().extend().standard_macros().build().unwrap();
        let source = Source::new("[1].all(x, x > 0)", COMPILE_SOURCE_NAME);
        let parsed = env.parse(&source).unwrap();
        assert!(matches!(
            parsed.expr.kind,
            super::super::ast::ExprKind::Comprehension(_)
        ));
    }
}
