//! Parse-time macros
//!
//! A macro is looked up by function name, argument count, and call style
//! (global or receiver). Expanders get a [`MacroHelper`] for building new
//! nodes and return:
//! - `Ok(Some(expr))` to replace the call,
//! - `Ok(None)` to leave the call untouched,
//! - `Err(MacroError)` when the call matched but its arguments are invalid.

use super::ast::{Comprehension, Expr, ExprId, ExprKind, Literal, SourceInfo};
use std::collections::HashMap;

/// Accumulator variable used by the comprehension macros
pub const ACCUMULATOR_NAME: &str = "@result";
/// Legacy accumulator name, still reserved
pub const HIDDEN_ACCUMULATOR_NAME: &str = "__result__";
/// Iteration variable for comprehensions that never iterate
pub const UNUSED_ITER_VAR: &str = "#unused";

/// Argument validation failure, attached to the offending node
#[derive(Debug, Clone, PartialEq)]
pub struct MacroError {
    pub expr_id: ExprId,
    pub message: String,
}

pub type MacroResult = Result<Option<Expr>, MacroError>;

pub type Expander = fn(&mut MacroHelper<'_>, Option<&Expr>, &[Expr]) -> MacroResult;

#[derive(Clone)]
pub struct Macro {
    name: String,
    /// `None` accepts any number of arguments
    arg_count: Option<usize>,
    receiver: bool,
    expander: Expander,
}

impl std::fmt::Debug for Macro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

impl Macro {
    pub fn global(name: &str, arg_count: usize, expander: Expander) -> Self {
        Self {
            name: name.to_string(),
            arg_count: Some(arg_count),
            receiver: false,
            expander,
        }
    }

    pub fn receiver(name: &str, arg_count: usize, expander: Expander) -> Self {
        Self {
            name: name.to_string(),
            arg_count: Some(arg_count),
            receiver: true,
            expander,
        }
    }

    pub fn receiver_var_arg(name: &str, expander: Expander) -> Self {
        Self {
            name: name.to_string(),
            arg_count: None,
            receiver: true,
            expander,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_receiver(&self) -> bool {
        self.receiver
    }

    /// `None` for var-arg macros
    pub fn arg_count(&self) -> Option<usize> {
        self.arg_count
    }

    pub fn key(&self) -> String {
        match self.arg_count {
            Some(n) => macro_key(&self.name, n, self.receiver),
            None => var_arg_key(&self.name, self.receiver),
        }
    }

    pub fn expand(
        &self,
        helper: &mut MacroHelper<'_>,
        target: Option<&Expr>,
        args: &[Expr],
    ) -> MacroResult {
        (self.expander)(helper, target, args)
    }
}

fn macro_key(name: &str, args: usize, receiver: bool) -> String {
    format!("{}:{}:{}", name, args, receiver)
}

fn var_arg_key(name: &str, receiver: bool) -> String {
    format!("{}:*:{}", name, receiver)
}

/// Macros visible to one parser
#[derive(Debug, Clone, Default)]
pub struct MacroRegistry {
    macros: HashMap<String, Macro>,
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later registrations replace earlier ones with the same key
    pub fn add(&mut self, m: Macro) {
        self.macros.insert(m.key(), m);
    }

    pub fn extend(&mut self, macros: impl IntoIterator<Item = Macro>) {
        for m in macros {
            self.add(m);
        }
    }

    pub fn clear(&mut self) {
        self.macros.clear();
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Exact arity first, then var-arg
    pub fn lookup(&self, name: &str, args: usize, receiver: bool) -> Option<&Macro> {
        self.macros
            .get(&macro_key(name, args, receiver))
            .or_else(|| self.macros.get(&var_arg_key(name, receiver)))
    }
}

/// Node factory handed to expanders. New nodes take the offset of the
/// call being expanded.
pub struct MacroHelper<'a> {
    next_id: &'a mut ExprId,
    source_info: &'a mut SourceInfo,
    offset: Option<usize>,
}

impl<'a> MacroHelper<'a> {
    pub fn new(
        next_id: &'a mut ExprId,
        source_info: &'a mut SourceInfo,
        offset: Option<usize>,
    ) -> Self {
        Self {
            next_id,
            source_info,
            offset,
        }
    }

    fn id_at(&mut self, offset: Option<usize>) -> ExprId {
        *self.next_id += 1;
        let id = *self.next_id;
        if let Some(o) = offset {
            self.source_info.offsets.insert(id, o);
        }
        id
    }

    fn new_expr(&mut self, kind: ExprKind) -> Expr {
        let id = self.id_at(self.offset);
        Expr::new(id, kind)
    }

    pub fn error(&self, expr: &Expr, message: impl Into<String>) -> MacroError {
        MacroError {
            expr_id: expr.id,
            message: message.into(),
        }
    }

    pub fn literal(&mut self, lit: Literal) -> Expr {
        self.new_expr(ExprKind::Literal(lit))
    }

    pub fn ident(&mut self, name: &str) -> Expr {
        self.new_expr(ExprKind::Ident(name.to_string()))
    }

    pub fn accu_ident(&mut self) -> Expr {
        self.ident(ACCUMULATOR_NAME)
    }

    pub fn call(&mut self, function: &str, args: Vec<Expr>) -> Expr {
        self.new_expr(ExprKind::Call {
            target: None,
            function: function.to_string(),
            args,
        })
    }

    pub fn member_call(&mut self, function: &str, target: Expr, args: Vec<Expr>) -> Expr {
        self.new_expr(ExprKind::Call {
            target: Some(Box::new(target)),
            function: function.to_string(),
            args,
        })
    }

    pub fn list(&mut self, elements: Vec<Expr>) -> Expr {
        self.new_expr(ExprKind::List {
            elements,
            optional_indices: Vec::new(),
        })
    }

    pub fn select(&mut self, operand: Expr, field: &str) -> Expr {
        self.new_expr(ExprKind::Select {
            operand: Box::new(operand),
            field: field.to_string(),
            test_only: false,
        })
    }

    pub fn presence_test(&mut self, operand: Expr, field: &str) -> Expr {
        self.new_expr(ExprKind::Select {
            operand: Box::new(operand),
            field: field.to_string(),
            test_only: true,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn comprehension(
        &mut self,
        iter_range: Expr,
        iter_var: &str,
        accu_var: &str,
        accu_init: Expr,
        loop_condition: Expr,
        loop_step: Expr,
        result: Expr,
    ) -> Expr {
        self.new_expr(ExprKind::Comprehension(Box::new(Comprehension {
            iter_var: iter_var.to_string(),
            iter_range,
            accu_var: accu_var.to_string(),
            accu_init,
            loop_condition,
            loop_step,
            result,
        })))
    }

    /// Deep copy with fresh ids; each copied node keeps its original offset
    pub fn copy(&mut self, expr: &Expr) -> Expr {
        let offset = self.source_info.offset(expr.id);
        let id = self.id_at(offset);
        let kind = match &expr.kind {
            ExprKind::Unspecified => ExprKind::Unspecified,
            ExprKind::Literal(lit) => ExprKind::Literal(lit.clone()),
            ExprKind::Ident(name) => ExprKind::Ident(name.clone()),
            ExprKind::Select {
                operand,
                field,
                test_only,
            } => ExprKind::Select {
                operand: Box::new(self.copy(operand)),
                field: field.clone(),
                test_only: *test_only,
            },
            ExprKind::Call {
                target,
                function,
                args,
            } => ExprKind::Call {
                target: target.as_ref().map(|t| Box::new(self.copy(t))),
                function: function.clone(),
                args: args.iter().map(|a| self.copy(a)).collect(),
            },
            ExprKind::List {
                elements,
                optional_indices,
            } => ExprKind::List {
                elements: elements.iter().map(|e| self.copy(e)).collect(),
                optional_indices: optional_indices.clone(),
            },
            ExprKind::Map { entries } => ExprKind::Map {
                entries: self.copy_entries(entries),
            },
            ExprKind::Struct {
                message_name,
                entries,
            } => ExprKind::Struct {
                message_name: message_name.clone(),
                entries: self.copy_entries(entries),
            },
            ExprKind::Comprehension(c) => ExprKind::Comprehension(Box::new(Comprehension {
                iter_var: c.iter_var.clone(),
                iter_range: self.copy(&c.iter_range),
                accu_var: c.accu_var.clone(),
                accu_init: self.copy(&c.accu_init),
                loop_condition: self.copy(&c.loop_condition),
                loop_step: self.copy(&c.loop_step),
                result: self.copy(&c.result),
            })),
        };
        Expr::new(id, kind)
    }

    fn copy_entries(&mut self, entries: &[super::ast::Entry]) -> Vec<super::ast::Entry> {
        use super::ast::{Entry, EntryKey};
        entries
            .iter()
            .map(|entry| {
                let offset = self.source_info.offset(entry.id);
                let id = self.id_at(offset);
                let key = match &entry.key {
                    EntryKey::Field(name) => EntryKey::Field(name.clone()),
                    EntryKey::Map(k) => EntryKey::Map(self.copy(k)),
                };
                Entry {
                    id,
                    key,
                    value: self.copy(&entry.value),
                    optional: entry.optional,
                }
            })
            .collect()
    }
}

/// True when `target` is the bare identifier `namespace`
pub fn target_matches_namespace(namespace: &str, target: Option<&Expr>) -> bool {
    target.and_then(Expr::as_ident) == Some(namespace)
}

// Standard macros

/// `has`, `all`, `exists`, `exists_one`, `existsOne`, `map` (2 and 3 args),
/// `filter`
pub fn standard_macros() -> Vec<Macro> {
    vec![
        Macro::global("has", 1, expand_has),
        Macro::receiver("all", 2, expand_all),
        Macro::receiver("exists", 2, expand_exists),
        Macro::receiver("exists_one", 2, expand_exists_one),
        Macro::receiver("existsOne", 2, expand_exists_one),
        Macro::receiver("map", 2, expand_map),
        Macro::receiver("map", 3, expand_map),
        Macro::receiver("filter", 2, expand_filter),
    ]
}

fn expand_has(h: &mut MacroHelper<'_>, _target: Option<&Expr>, args: &[Expr]) -> MacroResult {
    match &args[0].kind {
        ExprKind::Select { operand, field, .. } => {
            Ok(Some(h.presence_test((**operand).clone(), field)))
        }
        _ => Err(h.error(&args[0], "invalid argument to has() macro")),
    }
}

#[derive(Clone, Copy)]
enum Quantifier {
    All,
    Exists,
    ExistsOne,
}

fn iter_var_name<'e>(
    h: &MacroHelper<'_>,
    arg: &'e Expr,
    not_ident: &str,
) -> Result<&'e str, MacroError> {
    let name = arg.as_ident().ok_or_else(|| h.error(arg, not_ident))?;
    if name == ACCUMULATOR_NAME || name == HIDDEN_ACCUMULATOR_NAME {
        return Err(h.error(arg, "iteration variable overwrites accumulator variable"));
    }
    Ok(name)
}

fn quantifier(
    kind: Quantifier,
    h: &mut MacroHelper<'_>,
    target: Option<&Expr>,
    args: &[Expr],
) -> MacroResult {
    let var = iter_var_name(h, &args[0], "argument must be a simple name")?;
    let Some(target) = target else {
        return Ok(None);
    };
    let predicate = args[1].clone();
    let (init, condition, step, result) = match kind {
        Quantifier::All => {
            let init = h.literal(Literal::Bool(true));
            let accu = h.accu_ident();
            let condition = h.call("@not_strictly_false", vec![accu]);
            let accu = h.accu_ident();
            let step = h.call("_&&_", vec![accu, predicate]);
            let result = h.accu_ident();
            (init, condition, step, result)
        }
        Quantifier::Exists => {
            let init = h.literal(Literal::Bool(false));
            let accu = h.accu_ident();
            let not = h.call("!_", vec![accu]);
            let condition = h.call("@not_strictly_false", vec![not]);
            let accu = h.accu_ident();
            let step = h.call("_||_", vec![accu, predicate]);
            let result = h.accu_ident();
            (init, condition, step, result)
        }
        Quantifier::ExistsOne => {
            let init = h.literal(Literal::Int(0));
            let condition = h.literal(Literal::Bool(true));
            let accu = h.accu_ident();
            let one = h.literal(Literal::Int(1));
            let inc = h.call("_+_", vec![accu, one]);
            let accu = h.accu_ident();
            let step = h.call("_?_:_", vec![predicate, inc, accu]);
            let accu = h.accu_ident();
            let one = h.literal(Literal::Int(1));
            let result = h.call("_==_", vec![accu, one]);
            (init, condition, step, result)
        }
    };
    Ok(Some(h.comprehension(
        target.clone(),
        var,
        ACCUMULATOR_NAME,
        init,
        condition,
        step,
        result,
    )))
}

fn expand_all(h: &mut MacroHelper<'_>, target: Option<&Expr>, args: &[Expr]) -> MacroResult {
    quantifier(Quantifier::All, h, target, args)
}

fn expand_exists(h: &mut MacroHelper<'_>, target: Option<&Expr>, args: &[Expr]) -> MacroResult {
    quantifier(Quantifier::Exists, h, target, args)
}

fn expand_exists_one(
    h: &mut MacroHelper<'_>,
    target: Option<&Expr>,
    args: &[Expr],
) -> MacroResult {
    quantifier(Quantifier::ExistsOne, h, target, args)
}

fn expand_map(h: &mut MacroHelper<'_>, target: Option<&Expr>, args: &[Expr]) -> MacroResult {
    let var = iter_var_name(h, &args[0], "argument is not an identifier")?;
    let Some(target) = target else {
        return Ok(None);
    };
    let (filter, transform) = match args.len() {
        3 => (Some(args[1].clone()), args[2].clone()),
        _ => (None, args[1].clone()),
    };
    let init = h.list(Vec::new());
    let condition = h.literal(Literal::Bool(true));
    let accu = h.accu_ident();
    let single = h.list(vec![transform]);
    let mut step = h.call("_+_", vec![accu, single]);
    if let Some(filter) = filter {
        let accu = h.accu_ident();
        step = h.call("_?_:_", vec![filter, step, accu]);
    }
    let result = h.accu_ident();
    Ok(Some(h.comprehension(
        target.clone(),
        var,
        ACCUMULATOR_NAME,
        init,
        condition,
        step,
        result,
    )))
}

fn expand_filter(h: &mut MacroHelper<'_>, target: Option<&Expr>, args: &[Expr]) -> MacroResult {
    let var = iter_var_name(h, &args[0], "argument is not an identifier")?;
    let Some(target) = target else {
        return Ok(None);
    };
    let init = h.list(Vec::new());
    let condition = h.literal(Literal::Bool(true));
    let accu = h.accu_ident();
    let single = h.list(vec![args[0].clone()]);
    let append = h.call("_+_", vec![accu, single]);
    let accu = h.accu_ident();
    let step = h.call("_?_:_", vec![args[1].clone(), append, accu]);
    let result = h.accu_ident();
    Ok(Some(h.comprehension(
        target.clone(),
        var,
        ACCUMULATOR_NAME,
        init,
        condition,
        step,
        result,
    )))
}

// Extension-library macros

/// `cel.bind(var, init, expr)`
pub fn bindings_macros() -> Vec<Macro> {
    vec![Macro::receiver("bind", 3, expand_bind)]
}

fn expand_bind(h: &mut MacroHelper<'_>, target: Option<&Expr>, args: &[Expr]) -> MacroResult {
    if !target_matches_namespace("cel", target) {
        return Ok(None);
    }
    let var = args[0]
        .as_ident()
        .ok_or_else(|| h.error(&args[0], "cel.bind() variable names must be simple identifiers"))?;
    let range = h.list(Vec::new());
    let condition = h.literal(Literal::Bool(false));
    let step = h.ident(var);
    Ok(Some(h.comprehension(
        range,
        UNUSED_ITER_VAR,
        var,
        args[1].clone(),
        condition,
        step,
        args[2].clone(),
    )))
}

/// `math.greatest(...)` and `math.least(...)`
pub fn math_macros() -> Vec<Macro> {
    vec![
        Macro::receiver_var_arg("greatest", expand_greatest),
        Macro::receiver_var_arg("least", expand_least),
    ]
}

fn expand_greatest(h: &mut MacroHelper<'_>, target: Option<&Expr>, args: &[Expr]) -> MacroResult {
    expand_min_max(h, target, args, "math.greatest()", "math.@max")
}

fn expand_least(h: &mut MacroHelper<'_>, target: Option<&Expr>, args: &[Expr]) -> MacroResult {
    expand_min_max(h, target, args, "math.least()", "math.@min")
}

fn expand_min_max(
    h: &mut MacroHelper<'_>,
    target: Option<&Expr>,
    args: &[Expr],
    display: &str,
    function: &str,
) -> MacroResult {
    let Some(namespace) = target.filter(|t| t.as_ident() == Some("math")) else {
        return Ok(None);
    };
    match args.len() {
        0 => Err(h.error(
            namespace,
            format!("{} requires at least one argument", display),
        )),
        1 => {
            if is_numeric_list_literal(&args[0]) || is_valid_min_max_arg(&args[0]) {
                Ok(Some(h.call(function, vec![args[0].clone()])))
            } else {
                Err(h.error(&args[0], format!("{} invalid single argument value", display)))
            }
        }
        n => {
            for arg in args {
                if !is_valid_min_max_arg(arg) {
                    return Err(h.error(
                        arg,
                        format!("{} simple literal arguments must be numeric", display),
                    ));
                }
            }
            if n == 2 {
                Ok(Some(h.call(function, args.to_vec())))
            } else {
                let list = h.list(args.to_vec());
                Ok(Some(h.call(function, vec![list])))
            }
        }
    }
}

fn is_valid_min_max_arg(arg: &Expr) -> bool {
    match &arg.kind {
        ExprKind::Literal(lit) => matches!(
            lit,
            Literal::Double(_) | Literal::Int(_) | Literal::Uint(_)
        ),
        ExprKind::List { .. } | ExprKind::Map { .. } | ExprKind::Struct { .. } => false,
        _ => true,
    }
}

fn is_numeric_list_literal(arg: &Expr) -> bool {
    match &arg.kind {
        ExprKind::List { elements, .. } => {
            !elements.is_empty() && elements.iter().all(is_valid_min_max_arg)
        }
        _ => false,
    }
}

/// `proto.getExt(msg, ext.name)` and `proto.hasExt(msg, ext.name)`
pub fn proto_macros() -> Vec<Macro> {
    vec![
        Macro::receiver("getExt", 2, expand_get_ext),
        Macro::receiver("hasExt", 2, expand_has_ext),
    ]
}

fn extension_field_name(h: &MacroHelper<'_>, expr: &Expr) -> Result<String, MacroError> {
    match &expr.kind {
        ExprKind::Select { .. } => expr.to_qualified_name(),
        _ => None,
    }
    .ok_or_else(|| h.error(expr, "invalid extension field"))
}

fn expand_get_ext(h: &mut MacroHelper<'_>, target: Option<&Expr>, args: &[Expr]) -> MacroResult {
    if !target_matches_namespace("proto", target) {
        return Ok(None);
    }
    let field = extension_field_name(h, &args[1])?;
    Ok(Some(h.select(args[0].clone(), &field)))
}

fn expand_has_ext(h: &mut MacroHelper<'_>, target: Option<&Expr>, args: &[Expr]) -> MacroResult {
    if !target_matches_namespace("proto", target) {
        return Ok(None);
    }
    let field = extension_field_name(h, &args[1])?;
    Ok(Some(h.presence_test(args[0].clone(), &field)))
}

/// `opt.optMap(v, expr)` and `opt.optFlatMap(v, expr)`
pub fn optional_macros() -> Vec<Macro> {
    vec![
        Macro::receiver("optMap", 2, expand_opt_map),
        Macro::receiver("optFlatMap", 2, expand_opt_flat_map),
    ]
}

fn expand_opt_map(h: &mut MacroHelper<'_>, target: Option<&Expr>, args: &[Expr]) -> MacroResult {
    expand_optional(h, target, args, "optMap", true)
}

fn expand_opt_flat_map(
    h: &mut MacroHelper<'_>,
    target: Option<&Expr>,
    args: &[Expr],
) -> MacroResult {
    expand_optional(h, target, args, "optFlatMap", false)
}

fn expand_optional(
    h: &mut MacroHelper<'_>,
    target: Option<&Expr>,
    args: &[Expr],
    name: &str,
    wrap: bool,
) -> MacroResult {
    let Some(target) = target else {
        return Ok(None);
    };
    let var = args[0].as_ident().ok_or_else(|| {
        h.error(
            &args[0],
            format!("{}() variable name must be a simple identifier", name),
        )
    })?;
    let has_value = h.member_call("hasValue", target.clone(), Vec::new());
    let copied = h.copy(target);
    let value = h.member_call("value", copied, Vec::new());
    let range = h.list(Vec::new());
    let condition = h.literal(Literal::Bool(false));
    let step = h.ident(var);
    let mut mapped = h.comprehension(
        range,
        UNUSED_ITER_VAR,
        var,
        value,
        condition,
        step,
        args[1].clone(),
    );
    if wrap {
        mapped = h.call("optional.of", vec![mapped]);
    }
    let none = h.call("optional.none", Vec::new());
    Ok(Some(h.call("_?_:_", vec![has_value, mapped, none])))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(id: ExprId, name: &str) -> Expr {
        Expr::new(id, ExprKind::Ident(name.to_string()))
    }

    #[test]
    fn test_registry_prefers_exact_arity() {
        let mut registry = MacroRegistry::new();
        registry.extend(standard_macros());
        registry.extend(math_macros());
        assert_eq!(registry.lookup("map", 3, true).map(Macro::key), Some("map:3:true".into()));
        assert_eq!(registry.lookup("greatest", 7, true).map(Macro::key), Some("greatest:*:true".into()));
        assert!(registry.lookup("has", 1, true).is_none());
        assert!(registry.lookup("all", 2, false).is_none());
    }

    #[test]
    fn test_quantifier_rejects_accumulator_name() {
        let mut next = 10;
        let mut info = SourceInfo::default();
        let mut h = MacroHelper::new(&mut next, &mut info, Some(0));
        let target = ident(1, "m");
        let err = expand_all(&mut h, Some(&target), &[ident(2, "__result__"), ident(3, "p")])
            .unwrap_err();
        assert_eq!(err.expr_id, 2);
        assert_eq!(err.message, "iteration variable overwrites accumulator variable");
    }

    #[test]
    fn test_bind_ignores_other_namespaces() {
        let mut next = 10;
        let mut info = SourceInfo::default();
        let mut h = MacroHelper::new(&mut next, &mut info, Some(0));
        let target = ident(1, "other");
        let args = [ident(2, "x"), ident(3, "y"), ident(4, "x")];
        assert_eq!(expand_bind(&mut h, Some(&target), &args), Ok(None));
    }

    #[test]
    fn test_copy_assigns_fresh_ids_and_keeps_offsets() {
        let mut next = 10;
        let mut info = SourceInfo::default();
        info.offsets.insert(1, 7);
        let mut h = MacroHelper::new(&mut next, &mut info, Some(0));
        let copy = h.copy(&ident(1, "x"));
        assert_eq!(copy.id, 11);
        assert_eq!(copy.as_ident(), Some("x"));
        assert_eq!(info.offset(11), Some(7));
    }
}
