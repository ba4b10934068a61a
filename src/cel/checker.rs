//! Static type checker.
//!
//! Walks a parsed expression bottom-up, resolving identifiers and
//! functions against an [`Env`] and inferring a type for every node.
//! Type parameters in overload signatures are instantiated with fresh
//! `_varN` variables per call site; whatever is still unbound at the end
//! becomes `dyn`.

use super::ast::{Comprehension, Entry, EntryKey, Expr, ExprId, ExprKind, Literal, ParsedAst, SourceInfo};
use super::decls::FunctionDecl;
use super::env::{Env, IdentRef};
use super::issues::Issues;
use super::stdlib::is_overload_disabled;
use super::types::{is_assignable, is_assignable_list, most_general, substitute, Kind, Mapping, Type};
use std::collections::HashMap;

const OPT_SELECT: &str = "_?._";
const LOGICAL_AND: &str = "_&&_";
const LOGICAL_OR: &str = "_||_";

#[derive(Debug, Clone)]
pub struct CheckedAst {
    pub expr: Expr,
    pub source_info: SourceInfo,
    pub type_map: HashMap<ExprId, Type>,
    pub output_type: Type,
}

/// Type-check `parsed` under `env`
pub fn check(env: &Env, parsed: &ParsedAst) -> Result<CheckedAst, Issues> {
    let mut checker = Checker {
        env,
        source_info: &parsed.source_info,
        mappings: Mapping::new(),
        type_map: HashMap::new(),
        scopes: Vec::new(),
        free_type_vars: 0,
        issues: Issues::new(),
    };
    checker.check(&parsed.expr);
    if !checker.issues.is_empty() {
        tracing::trace!(issues = checker.issues.len(), "check failed");
        return Err(checker.issues);
    }

    let mappings = checker.mappings;
    let type_map: HashMap<ExprId, Type> = checker
        .type_map
        .into_iter()
        .map(|(id, t)| (id, substitute(&mappings, &t, true)))
        .collect();
    let output_type = type_map
        .get(&parsed.expr.id)
        .cloned()
        .unwrap_or(Type::Error);
    Ok(CheckedAst {
        expr: parsed.expr.clone(),
        source_info: parsed.source_info.clone(),
        type_map,
        output_type,
    })
}

struct Checker<'a> {
    env: &'a Env,
    source_info: &'a SourceInfo,
    mappings: Mapping,
    type_map: HashMap<ExprId, Type>,
    /// Comprehension variables, innermost scope last
    scopes: Vec<HashMap<String, Type>>,
    free_type_vars: usize,
    issues: Issues,
}

impl Checker<'_> {
    fn check(&mut self, e: &Expr) {
        match &e.kind {
            ExprKind::Literal(lit) => self.set_type(e.id, literal_type(lit)),
            ExprKind::Ident(name) => self.check_ident(e, name),
            ExprKind::Select {
                operand,
                field,
                test_only,
            } => self.check_select(e, operand, field, *test_only),
            ExprKind::Call {
                target,
                function,
                args,
            } => self.check_call(e, target.as_deref(), function, args),
            ExprKind::List {
                elements,
                optional_indices,
            } => self.check_create_list(e, elements, optional_indices),
            ExprKind::Map { entries } => self.check_create_map(e, entries),
            ExprKind::Struct {
                message_name,
                entries,
            } => self.check_create_struct(e, message_name, entries),
            ExprKind::Comprehension(c) => self.check_comprehension(e, c),
            ExprKind::Unspecified => {
                self.report(e.id, "unrecognized ast type: unspecified".to_string());
                self.set_type(e.id, Type::Error);
            }
        }
    }

    fn report(&mut self, id: ExprId, message: String) {
        let offset = self.source_info.offset(id);
        self.issues.report(id, offset, message);
    }

    fn set_type(&mut self, id: ExprId, t: Type) {
        self.type_map.insert(id, t);
    }

    fn get_type(&self, id: ExprId) -> Type {
        self.type_map.get(&id).cloned().unwrap_or(Type::Error)
    }

    fn new_type_var(&mut self) -> Type {
        let t = Type::param(&format!("_var{}", self.free_type_vars));
        self.free_type_vars += 1;
        t
    }

    fn is_assignable(&mut self, t1: &Type, t2: &Type) -> bool {
        match is_assignable(&self.mappings, t1, t2) {
            Some(m) => {
                self.mappings = m;
                true
            }
            None => false,
        }
    }

    fn is_assignable_list(&mut self, l1: &[Type], l2: &[Type]) -> bool {
        match is_assignable_list(&self.mappings, l1, l2) {
            Some(m) => {
                self.mappings = m;
                true
            }
            None => false,
        }
    }

    fn type_mismatch(&mut self, id: ExprId, expected: &Type, actual: &Type) {
        self.report(
            id,
            format!("expected type '{}' but got '{}'", expected, actual),
        );
    }

    fn undeclared_reference(&mut self, id: ExprId, name: &str) {
        let message = format!(
            "undeclared reference to '{}' (in container '{}')",
            name,
            self.env.container()
        );
        self.report(id, message);
    }

    /// Comprehension variables shadow globals only within the same
    /// candidate name.
    fn lookup_ident(&self, name: &str) -> Option<IdentRef> {
        for candidate in self.env.candidate_names(name) {
            for scope in self.scopes.iter().rev() {
                if let Some(t) = scope.get(&candidate) {
                    return Some(IdentRef {
                        name: candidate,
                        ty: t.clone(),
                    });
                }
            }
            if let Some(found) = self.env.find_ident(&candidate) {
                return Some(found);
            }
        }
        None
    }

    fn check_ident(&mut self, e: &Expr, name: &str) {
        match self.lookup_ident(name) {
            Some(ident) => self.set_type(e.id, ident.ty),
            None => {
                self.set_type(e.id, Type::Error);
                self.undeclared_reference(e.id, name);
            }
        }
    }

    fn check_select(&mut self, e: &Expr, operand: &Expr, field: &str, test_only: bool) {
        // a dotted name may itself be a declared identifier
        if let Some(ident) = e.to_qualified_name().and_then(|q| self.lookup_ident(&q)) {
            self.set_type(e.id, ident.ty);
            return;
        }
        let mut result = self.check_select_field(e.id, operand, field, false);
        if test_only {
            result = Type::Bool;
        }
        let result = substitute(&self.mappings, &result, false);
        self.set_type(e.id, result);
    }

    fn check_opt_select(&mut self, e: &Expr, args: &[Expr]) {
        let field = match args.get(1).map(|f| &f.kind) {
            Some(ExprKind::Literal(Literal::String(name))) => name.clone(),
            _ => {
                let (id, shown) = match args.get(1) {
                    Some(f) => (f.id, super::debug::to_debug_string(f)),
                    None => (e.id, String::new()),
                };
                self.report(id, format!("unsupported optional field selection: {}", shown));
                return;
            }
        };
        let result = self.check_select_field(e.id, &args[0], &field, true);
        let result = substitute(&self.mappings, &result, false);
        self.set_type(e.id, result);
    }

    fn check_select_field(&mut self, id: ExprId, operand: &Expr, field: &str, optional: bool) -> Type {
        self.check(operand);
        let operand_type = substitute(&self.mappings, &self.get_type(operand.id), false);
        let (target, is_opt) = operand_type.unwrap_optional();

        let result = match &target {
            Type::Map(_, value) => (**value).clone(),
            Type::Message(name) => self.lookup_field_type(id, name, field).unwrap_or(Type::Error),
            Type::TypeParam(_) => {
                self.is_assignable(&Type::Dyn, &target);
                Type::Dyn
            }
            _ => {
                if !target.is_dyn_or_error() {
                    self.report(
                        id,
                        format!("type '{}' does not support field selection", target),
                    );
                }
                Type::Dyn
            }
        };
        if is_opt || optional {
            Type::optional(result)
        } else {
            result
        }
    }

    fn lookup_field_type(&mut self, id: ExprId, message: &str, field: &str) -> Option<Type> {
        let env = self.env;
        let types = env.types();
        if !types.has_message(message) {
            self.report(id, format!("unexpected failed resolution of '{}'", message));
            return None;
        }
        match types.find_field_type(message, field) {
            Some(t) => Some(t),
            None => {
                self.report(id, format!("undefined field '{}'", field));
                None
            }
        }
    }

    fn check_call(&mut self, e: &Expr, target: Option<&Expr>, function: &str, args: &[Expr]) {
        if function == OPT_SELECT {
            self.check_opt_select(e, args);
            return;
        }
        for arg in args {
            self.check(arg);
        }

        let env = self.env;
        let Some(target) = target else {
            match env.lookup_function(function) {
                Some(decl) => self.resolve_overload_or_error(e, decl, None, args),
                None => {
                    self.undeclared_reference(e.id, function);
                    self.set_type(e.id, Type::Error);
                }
            }
            return;
        };

        // `a.b.f()` may name a namespaced function rather than a method on `a.b`
        if let Some(prefix) = target.to_qualified_name() {
            let qualified = format!("{}.{}", prefix, function);
            if let Some(decl) = env.lookup_function(&qualified) {
                self.resolve_overload_or_error(e, decl, None, args);
                return;
            }
        }

        self.check(target);
        match env.lookup_function(function) {
            Some(decl) => self.resolve_overload_or_error(e, decl, Some(target), args),
            None => {
                self.set_type(e.id, Type::Error);
                self.undeclared_reference(e.id, function);
            }
        }
    }

    fn resolve_overload_or_error(
        &mut self,
        e: &Expr,
        decl: &FunctionDecl,
        target: Option<&Expr>,
        args: &[Expr],
    ) {
        let t = self.resolve_overload(e, decl, target, args);
        self.set_type(e.id, t.unwrap_or(Type::Error));
    }

    fn resolve_overload(
        &mut self,
        call: &Expr,
        decl: &FunctionDecl,
        target: Option<&Expr>,
        args: &[Expr],
    ) -> Option<Type> {
        let mut arg_types: Vec<Type> = target
            .into_iter()
            .chain(args.iter())
            .map(|a| self.get_type(a.id))
            .collect();

        let mut result: Option<Type> = None;
        for overload in decl.overloads() {
            if is_overload_disabled(&overload.id) {
                continue;
            }
            if target.is_some() != overload.member {
                continue;
            }

            if decl.name == LOGICAL_AND || decl.name == LOGICAL_OR {
                let mut failed = false;
                for (i, arg_type) in arg_types.iter().enumerate() {
                    if !self.is_assignable(arg_type, &Type::Bool) {
                        self.type_mismatch(args[i].id, &Type::Bool, arg_type);
                        failed = true;
                    }
                }
                return if failed { None } else { Some(Type::Bool) };
            }

            let mut params = overload.args.clone();
            let mut result_type = overload.result.clone();
            let type_params = overload.type_params();
            if !type_params.is_empty() {
                let mut fresh = Mapping::new();
                for name in type_params {
                    let var = self.new_type_var();
                    fresh.add(Type::param(&name), var);
                }
                params = params.iter().map(|p| substitute(&fresh, p, false)).collect();
                result_type = substitute(&fresh, &result_type, false);
            }

            if self.is_assignable_list(&arg_types, &params) {
                let resolved = substitute(&self.mappings, &result_type, false);
                result = match result {
                    None => Some(resolved),
                    Some(prev) if !prev.is_dyn() && prev != resolved => Some(Type::Dyn),
                    Some(prev) => Some(prev),
                };
            }
        }

        if result.is_none() {
            for t in arg_types.iter_mut() {
                *t = substitute(&self.mappings, t, true);
            }
            let signature = format_signature(&arg_types, target.is_some());
            self.report(
                call.id,
                format!(
                    "found no matching overload for '{}' applied to '{}'",
                    decl.name, signature
                ),
            );
        }
        result
    }

    fn join_types(&mut self, previous: Option<Type>, current: Type) -> Type {
        match previous {
            None => current,
            Some(prev) if self.is_assignable(&prev, &current) => most_general(&prev, &current),
            // heterogeneous literals widen to dyn
            Some(_) => Type::Dyn,
        }
    }

    /// Element type of an optional entry, reporting when it is neither
    /// optional nor dynamic
    fn optional_entry_type(&mut self, value: &Expr) -> Type {
        let (inner, is_opt) = self.get_type(value.id).unwrap_optional();
        if !is_opt && !inner.is_dyn() {
            self.type_mismatch(value.id, &Type::optional(inner.clone()), &inner);
        }
        inner
    }

    fn check_create_list(&mut self, e: &Expr, elements: &[Expr], optional_indices: &[usize]) {
        let mut elem_type: Option<Type> = None;
        for (i, elem) in elements.iter().enumerate() {
            self.check(elem);
            let t = if optional_indices.contains(&i) {
                self.optional_entry_type(elem)
            } else {
                self.get_type(elem.id)
            };
            elem_type = Some(self.join_types(elem_type, t));
        }
        let elem_type = match elem_type {
            Some(t) => t,
            None => self.new_type_var(),
        };
        self.set_type(e.id, Type::list(elem_type));
    }

    fn check_create_map(&mut self, e: &Expr, entries: &[Entry]) {
        let mut key_type: Option<Type> = None;
        let mut value_type: Option<Type> = None;
        for entry in entries {
            if let EntryKey::Map(key) = &entry.key {
                self.check(key);
                let t = self.get_type(key.id);
                key_type = Some(self.join_types(key_type, t));
            }
            self.check(&entry.value);
            let t = if entry.optional {
                self.optional_entry_type(&entry.value)
            } else {
                self.get_type(entry.value.id)
            };
            value_type = Some(self.join_types(value_type, t));
        }
        let (key_type, value_type) = match (key_type, value_type) {
            (Some(k), Some(v)) => (k, v),
            _ => (self.new_type_var(), self.new_type_var()),
        };
        self.set_type(e.id, Type::map(key_type, value_type));
    }

    fn check_create_struct(&mut self, e: &Expr, message_name: &str, entries: &[Entry]) {
        let Some(ident) = self.lookup_ident(message_name) else {
            self.undeclared_reference(e.id, message_name);
            self.set_type(e.id, Type::Error);
            return;
        };

        let mut type_name = ident.name.clone();
        let mut result = Type::Error;
        match &ident.ty {
            Type::Error => {}
            Type::Type(Some(inner)) => {
                if let Some(wkt) = well_known_type_name(inner) {
                    type_name = wkt.to_string();
                    result = (**inner).clone();
                } else if let Type::Message(name) = inner.as_ref() {
                    type_name = name.clone();
                    result = (**inner).clone();
                } else {
                    self.report(e.id, format!("'{}' is not a message type", inner.type_name()));
                }
            }
            other => {
                self.report(e.id, format!("'{}' is not a type", other.type_name()));
            }
        }
        self.set_type(e.id, result);

        for entry in entries {
            let EntryKey::Field(field) = &entry.key else {
                continue;
            };
            self.check(&entry.value);
            let field_type = self
                .lookup_field_type(entry.id, &type_name, field)
                .unwrap_or(Type::Error);
            let value_type = if entry.optional {
                self.optional_entry_type(&entry.value)
            } else {
                self.get_type(entry.value.id)
            };
            if !self.is_assignable(&field_type, &value_type) {
                self.report(
                    entry.id,
                    format!(
                        "expected type of field '{}' is '{}' but provided type is '{}'",
                        field, field_type, value_type
                    ),
                );
            }
        }
    }

    fn check_comprehension(&mut self, e: &Expr, c: &Comprehension) {
        self.check(&c.iter_range);
        self.check(&c.accu_init);
        let range_type = substitute(&self.mappings, &self.get_type(c.iter_range.id), false);
        let accu_type = self.get_type(c.accu_init.id);

        self.scopes
            .push(HashMap::from([(c.accu_var.clone(), accu_type.clone())]));

        let var_type = match range_type.kind() {
            Kind::List | Kind::Map => range_type.parameters()[0].clone(),
            Kind::Dyn | Kind::Error | Kind::TypeParam => {
                self.is_assignable(&Type::Dyn, &range_type);
                Type::Dyn
            }
            _ => {
                self.report(
                    c.iter_range.id,
                    format!(
                        "expression of type '{}' cannot be range of a comprehension (must be list, map, or dynamic)",
                        range_type
                    ),
                );
                Type::Error
            }
        };

        self.scopes
            .push(HashMap::from([(c.iter_var.clone(), var_type)]));
        self.check(&c.loop_condition);
        self.assert_type(&c.loop_condition, &Type::Bool);
        self.check(&c.loop_step);
        self.assert_type(&c.loop_step, &accu_type);
        self.scopes.pop();

        self.check(&c.result);
        self.scopes.pop();

        let result = substitute(&self.mappings, &self.get_type(c.result.id), false);
        self.set_type(e.id, result);
    }

    fn assert_type(&mut self, e: &Expr, expected: &Type) {
        let actual = self.get_type(e.id);
        if !self.is_assignable(expected, &actual) {
            self.type_mismatch(e.id, expected, &actual);
        }
    }
}

fn literal_type(lit: &Literal) -> Type {
    match lit {
        Literal::Bool(_) => Type::Bool,
        Literal::Bytes(_) => Type::Bytes,
        Literal::Double(_) => Type::Double,
        Literal::Int(_) => Type::Int,
        Literal::Null => Type::Null,
        Literal::String(_) => Type::String,
        Literal::Uint(_) => Type::Uint,
    }
}

/// Protobuf message name used to construct a well-known CEL type with
/// message syntax, e.g. `google.protobuf.Int64Value{value: 1}`
fn well_known_type_name(t: &Type) -> Option<&'static str> {
    let name = match t {
        Type::Any => "google.protobuf.Any",
        Type::Duration => "google.protobuf.Duration",
        Type::Timestamp => "google.protobuf.Timestamp",
        Type::Dyn => "google.protobuf.Value",
        Type::Null => "google.protobuf.NullValue",
        Type::Wrapper(inner) => match inner.as_ref() {
            Type::Bool => "google.protobuf.BoolValue",
            Type::Bytes => "google.protobuf.BytesValue",
            Type::Double => "google.protobuf.DoubleValue",
            Type::Int => "google.protobuf.Int64Value",
            Type::String => "google.protobuf.StringValue",
            Type::Uint => "google.protobuf.UInt64Value",
            _ => return None,
        },
        Type::List(elem) if **elem == Type::Dyn => "google.protobuf.ListValue",
        Type::Map(k, v) if **k == Type::String && **v == Type::Dyn => "google.protobuf.Struct",
        _ => return None,
    };
    Some(name)
}

/// `(a, b)` for global calls, `target.(a, b)` for member calls
fn format_signature(arg_types: &[Type], member: bool) -> String {
    let mut out = String::new();
    let mut args = arg_types;
    if member {
        if let Some((target, rest)) = arg_types.split_first() {
            out.push_str(&format!("{}.", target));
            args = rest;
        }
    }
    let joined: Vec<String> = args.iter().map(Type::to_string).collect();
    out.push('(');
    out.push_str(&joined.join(", "));
    out.push(')');
    out
}
