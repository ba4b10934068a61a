//! Expression tree produced by the parser and consumed by the checker
//! and the debug writer.

use std::collections::{BTreeMap, HashMap};

/// Node identifier, unique within one parsed expression
pub type ExprId = i64;

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: ExprId,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Placeholder left where a syntax or macro error was reported
    Unspecified,
    Literal(Literal),
    Ident(String),
    Select {
        operand: Box<Expr>,
        field: String,
        test_only: bool,
    },
    Call {
        target: Option<Box<Expr>>,
        function: String,
        args: Vec<Expr>,
    },
    List {
        elements: Vec<Expr>,
        optional_indices: Vec<usize>,
    },
    Map {
        entries: Vec<Entry>,
    },
    Struct {
        message_name: String,
        entries: Vec<Entry>,
    },
    Comprehension(Box<Comprehension>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Bytes(Vec<u8>),
    Double(f64),
    Int(i64),
    Null,
    String(String),
    Uint(u64),
}

/// Map entry or struct field initializer
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: ExprId,
    pub key: EntryKey,
    pub value: Expr,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryKey {
    Field(String),
    Map(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub iter_var: String,
    pub iter_range: Expr,
    pub accu_var: String,
    pub accu_init: Expr,
    pub loop_condition: Expr,
    pub loop_step: Expr,
    pub result: Expr,
}

impl Expr {
    pub fn new(id: ExprId, kind: ExprKind) -> Self {
        Self { id, kind }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<(Option<&Expr>, &str, &[Expr])> {
        match &self.kind {
            ExprKind::Call {
                target,
                function,
                args,
            } => Some((target.as_deref(), function, args)),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match &self.kind {
            ExprKind::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self.kind, ExprKind::List { .. })
    }

    /// Direct subexpressions, entry keys and values included
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Unspecified | ExprKind::Literal(_) | ExprKind::Ident(_) => Vec::new(),
            ExprKind::Select { operand, .. } => vec![operand.as_ref()],
            ExprKind::Call { target, args, .. } => {
                target.as_deref().into_iter().chain(args.iter()).collect()
            }
            ExprKind::List { elements, .. } => elements.iter().collect(),
            ExprKind::Map { entries } | ExprKind::Struct { entries, .. } => entries
                .iter()
                .flat_map(|entry| {
                    let key = match &entry.key {
                        EntryKey::Map(key) => Some(key),
                        EntryKey::Field(_) => None,
                    };
                    key.into_iter().chain(std::iter::once(&entry.value))
                })
                .collect(),
            ExprKind::Comprehension(c) => vec![
                &c.iter_range,
                &c.accu_init,
                &c.loop_condition,
                &c.loop_step,
                &c.result,
            ],
        }
    }

    /// Dotted name for an ident or a chain of non-test-only selects
    pub fn to_qualified_name(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Ident(name) => Some(name.clone()),
            ExprKind::Select {
                operand,
                field,
                test_only: false,
            } => operand
                .to_qualified_name()
                .map(|prefix| format!("{}.{}", prefix, field)),
            _ => None,
        }
    }
}

/// Original call recorded for a macro expansion
#[derive(Debug, Clone, PartialEq)]
pub struct MacroCall {
    pub function: String,
    pub target: Option<Expr>,
    pub args: Vec<Expr>,
}

/// Side tables kept alongside the tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceInfo {
    /// Code-point offset of each node (and each entry)
    pub offsets: HashMap<ExprId, usize>,
    /// Macro calls keyed by the id of their expansion
    pub macro_calls: BTreeMap<ExprId, MacroCall>,
}

impl SourceInfo {
    pub fn offset(&self, id: ExprId) -> Option<usize> {
        self.offsets.get(&id).copied()
    }
}

/// Parser output
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAst {
    pub expr: Expr,
    pub source_info: SourceInfo,
}
