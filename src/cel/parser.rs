//! Recursive-descent CEL parser
//!
//! Builds the expression tree in one pass and expands macros as calls are
//! completed. Diagnostics mirror the ANTLR-generated parser used by cel-go:
//! syntax errors carry the `Syntax error:` prefix and its expected-token
//! sets, error recovery is bounded by an attempt budget, and two depth
//! limits apply (grammar nesting and operator tree depth).

use super::ast::{Entry, EntryKey, Expr, ExprId, ExprKind, Literal, MacroCall, ParsedAst, SourceInfo};
use super::issues::Issues;
use super::lexer::{tokenize, Token, TokenKind};
use super::literal;
use super::macros::{MacroHelper, MacroRegistry};
use super::source::Source;
use crate::config::ParserConfig;
use std::collections::HashMap;
use std::sync::Arc;

const EXPR_START: &str = "{'[', '{', '(', '.', '-', '!', 'true', 'false', 'null', NUM_FLOAT, NUM_INT, NUM_UINT, STRING, BYTES, IDENTIFIER}";
const MAP_START: &str = "{'[', '{', '}', '(', '.', ',', '-', '!', '?', 'true', 'false', 'null', NUM_FLOAT, NUM_INT, NUM_UINT, STRING, BYTES, IDENTIFIER}";
const STRUCT_START: &str = "{'}', ',', '?', IDENTIFIER, ESC_IDENTIFIER}";
const FIELD_NAME: &str = "{IDENTIFIER, ESC_IDENTIFIER}";

const RESERVED_IDENTIFIERS: &[&str] = &[
    "as", "break", "const", "continue", "else", "for", "function", "if", "import", "let", "loop",
    "package", "namespace", "return", "var", "void", "while",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ParserOptions {
    pub max_recursion_depth: usize,
    pub error_recovery_limit: usize,
    pub error_recovery_lookahead_limit: usize,
    pub optional_syntax: bool,
    pub identifier_escape_syntax: bool,
    /// Keep the original call for every macro expansion
    pub populate_macro_calls: bool,
}

impl From<&ParserConfig> for ParserOptions {
    fn from(config: &ParserConfig) -> Self {
        Self {
            max_recursion_depth: config.max_recursion_depth,
            error_recovery_limit: config.error_recovery_limit,
            error_recovery_lookahead_limit: config.error_recovery_lookahead_limit,
            optional_syntax: config.optional_syntax,
            identifier_escape_syntax: config.identifier_escape_syntax,
            populate_macro_calls: true,
        }
    }
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self::from(&ParserConfig::default())
    }
}

/// Parser bound to one macro registry. Cheap to clone and share.
#[derive(Debug, Clone)]
pub struct Parser {
    options: ParserOptions,
    macros: Arc<MacroRegistry>,
}

/// Conditions that stop parsing outright
enum Abort {
    Recursion,
    RecoveryLimit,
    Lookahead,
}

type Parsed = std::result::Result<Expr, Abort>;

impl Parser {
    pub fn new(options: ParserOptions, macros: Arc<MacroRegistry>) -> Self {
        Self { options, macros }
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    pub fn macros(&self) -> &MacroRegistry {
        &self.macros
    }

    /// Parse and expand macros. Any diagnostic makes the parse fail.
    pub fn parse(&self, source: &Source) -> std::result::Result<ParsedAst, Issues> {
        let (tokens, lex_errors) = tokenize(source.chars());
        let mut state = State::new(self, tokens);
        let outcome = state.start();

        // tokens past an abort were never requested from the lexer
        let lexed_up_to = match outcome {
            Ok(_) => usize::MAX,
            Err(_) => state.peek().offset,
        };
        for err in lex_errors.iter().filter(|e| e.offset < lexed_up_to) {
            state.issues.report(
                0,
                Some(err.offset),
                format!("Syntax error: token recognition error at: '{}'", err.text),
            );
        }
        match outcome {
            Err(Abort::Recursion) => state.issues.report(
                0,
                None,
                format!(
                    "expression recursion limit exceeded: {}",
                    self.options.max_recursion_depth
                ),
            ),
            Err(Abort::Lookahead) => state.issues.report(
                0,
                None,
                format!(
                    "error recovery token lookahead limit exceeded: {}",
                    self.options.error_recovery_lookahead_limit
                ),
            ),
            _ => {}
        }
        if state.halted {
            state.issues.report(0, None, "max recursion depth exceeded");
        }

        match outcome {
            Ok(expr) if state.issues.is_empty() => Ok(ParsedAst {
                expr,
                source_info: state.source_info,
            }),
            _ => {
                tracing::trace!(issues = state.issues.len(), "parse failed");
                Err(state.issues)
            }
        }
    }
}

fn starts_expr(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::LBracket
            | TokenKind::LBrace
            | TokenKind::LParen
            | TokenKind::Dot
            | TokenKind::Minus
            | TokenKind::Not
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Null
            | TokenKind::Double(_)
            | TokenKind::Int(_)
            | TokenKind::Uint(_)
            | TokenKind::Str(_)
            | TokenKind::Bytes(_)
            | TokenKind::Ident(_)
    )
}

fn starts_member(kind: &TokenKind) -> bool {
    starts_expr(kind) && !matches!(kind, TokenKind::Not)
}

fn starts_field(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Ident(_) | TokenKind::EscapedIdent(_) | TokenKind::Question
    )
}

/// Tokens at which recovery stops instead of discarding input
fn is_sync(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::RParen
            | TokenKind::RBracket
            | TokenKind::RBrace
            | TokenKind::Comma
            | TokenKind::Colon
            | TokenKind::Eof
    )
}

/// Whether `next` may directly follow `expected`; lets a missing token be
/// reported as missing rather than mismatched
fn can_follow(expected: &TokenKind, next: &TokenKind) -> bool {
    match expected {
        TokenKind::Colon => starts_expr(next),
        _ => !starts_expr(next) || matches!(next, TokenKind::Dot | TokenKind::LBracket | TokenKind::Minus),
    }
}

fn relation_function(kind: &TokenKind) -> Option<&'static str> {
    Some(match kind {
        TokenKind::Lt => "_<_",
        TokenKind::Le => "_<=_",
        TokenKind::Ge => "_>=_",
        TokenKind::Gt => "_>_",
        TokenKind::Eq => "_==_",
        TokenKind::Ne => "_!=_",
        TokenKind::In => "@in",
        _ => return None,
    })
}

fn additive_function(kind: &TokenKind) -> Option<&'static str> {
    match kind {
        TokenKind::Plus => Some("_+_"),
        TokenKind::Minus => Some("_-_"),
        _ => None,
    }
}

fn multiplicative_function(kind: &TokenKind) -> Option<&'static str> {
    match kind {
        TokenKind::Star => Some("_*_"),
        TokenKind::Slash => Some("_/_"),
        TokenKind::Percent => Some("_%_"),
        _ => None,
    }
}

struct State<'p> {
    options: &'p ParserOptions,
    macros: &'p MacroRegistry,
    tokens: Vec<Token>,
    pos: usize,
    issues: Issues,
    next_id: ExprId,
    source_info: SourceInfo,
    /// Operator tree depth per node, for the post-parse depth limit
    weights: HashMap<ExprId, usize>,
    depth: usize,
    attempts: usize,
    /// Set after a syntax error until the next token is consumed; further
    /// syntax errors are dropped meanwhile
    recovering: bool,
    /// Non-zero while parsing subtrees whose semantic errors are discarded
    muted: usize,
    /// Operator depth limit hit; semantic checks stop
    halted: bool,
}

impl<'p> State<'p> {
    fn new(parser: &'p Parser, tokens: Vec<Token>) -> Self {
        Self {
            options: &parser.options,
            macros: &parser.macros,
            tokens,
            pos: 0,
            issues: Issues::new(),
            next_id: 0,
            source_info: SourceInfo::default(),
            weights: HashMap::new(),
            depth: 0,
            attempts: 0,
            recovering: false,
            muted: 0,
            halted: false,
        }
    }

    // Token access

    fn peek_at(&self, n: usize) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + n).min(last)]
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        self.recovering = false;
        token
    }

    // Diagnostics

    fn attempt(&mut self) -> Result<(), Abort> {
        if self.attempts >= self.options.error_recovery_limit {
            let offset = self.peek().offset;
            self.issues.report(
                0,
                Some(offset),
                format!(
                    "Syntax error: error recovery attempt limit exceeded: {}",
                    self.options.error_recovery_limit
                ),
            );
            return Err(Abort::RecoveryLimit);
        }
        self.attempts += 1;
        Ok(())
    }

    fn syntax_error(&mut self, offset: usize, message: String) -> Result<(), Abort> {
        if self.recovering {
            return Ok(());
        }
        self.attempt()?;
        self.issues
            .report(0, Some(offset), format!("Syntax error: {}", message));
        self.recovering = true;
        Ok(())
    }

    fn mismatched(&mut self, expected: &str) -> Result<(), Abort> {
        let token = self.peek();
        let (offset, text) = (token.offset, token.display());
        self.syntax_error(
            offset,
            format!("mismatched input '{}' expecting {}", text, expected),
        )
    }

    fn extraneous(&mut self, expected: &str) -> Result<(), Abort> {
        let token = self.peek();
        let (offset, text) = (token.offset, token.display());
        self.syntax_error(
            offset,
            format!("extraneous input '{}' expecting {}", text, expected),
        )
    }

    /// Reported at the current token; `prefix` is the input consumed since
    /// the failed decision began
    fn no_viable(&mut self, prefix: &str) -> Result<(), Abort> {
        self.attempt()?;
        let token = self.peek();
        let offending = match token.kind {
            TokenKind::Eof => String::new(),
            _ => token.text.clone(),
        };
        let offset = token.offset;
        self.issues.report(
            0,
            Some(offset),
            format!(
                "Syntax error: no viable alternative at input '{}{}'",
                prefix, offending
            ),
        );
        Ok(())
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> Result<bool, Abort> {
        if self.at(kind) {
            self.advance();
            return Ok(true);
        }
        if &self.peek_at(1).kind == kind {
            self.extraneous(expected)?;
            self.advance();
            self.advance();
            return Ok(true);
        }
        if can_follow(kind, &self.peek().kind) {
            let token = self.peek();
            let (offset, text) = (token.offset, token.display());
            self.syntax_error(offset, format!("missing {} at '{}'", expected, text))?;
            return Ok(false);
        }
        self.mismatched(expected)?;
        Ok(false)
    }

    fn visitor_report(&mut self, offset: usize, message: impl Into<String>) {
        if self.muted == 0 && !self.halted {
            self.issues.report(0, Some(offset), message);
        }
    }

    fn visitor_error(&mut self, offset: usize, message: impl Into<String>) -> Expr {
        self.visitor_report(offset, message);
        self.error_node(offset)
    }

    // Node construction

    fn node(&mut self, offset: usize, kind: ExprKind) -> Expr {
        self.next_id += 1;
        self.source_info.offsets.insert(self.next_id, offset);
        Expr::new(self.next_id, kind)
    }

    fn error_node(&mut self, offset: usize) -> Expr {
        self.node(offset, ExprKind::Unspecified)
    }

    fn call_node(&mut self, offset: usize, function: &str, args: Vec<Expr>) -> Expr {
        self.node(
            offset,
            ExprKind::Call {
                target: None,
                function: function.to_string(),
                args,
            },
        )
    }

    fn weight_of(&self, expr: &Expr) -> usize {
        self.weights.get(&expr.id).copied().unwrap_or(0)
    }

    /// Record operator depth; `counted` nodes add a level
    fn weigh(&mut self, expr: &Expr, counted: bool) {
        let deepest = expr
            .children()
            .into_iter()
            .map(|child| self.weight_of(child))
            .max()
            .unwrap_or(0);
        self.set_weight(expr.id, deepest + usize::from(counted));
    }

    fn set_weight(&mut self, id: ExprId, weight: usize) {
        if weight > 0 {
            self.weights.insert(id, weight);
        }
        if weight > self.options.max_recursion_depth {
            self.halted = true;
        }
    }

    fn binary(&mut self, offset: usize, function: &str, lhs: Expr, rhs: Expr) -> Expr {
        let call = self.call_node(offset, function, vec![lhs, rhs]);
        self.weigh(&call, true);
        call
    }

    // Grammar

    fn start(&mut self) -> Parsed {
        let expr = self.expr()?;
        if !self.at(&TokenKind::Eof) {
            if self.peek_at(1).kind == TokenKind::Eof {
                self.extraneous("<EOF>")?;
            } else {
                self.mismatched("<EOF>")?;
            }
        }
        Ok(expr)
    }

    fn expr(&mut self) -> Parsed {
        self.depth += 1;
        if self.depth > self.options.max_recursion_depth {
            return Err(Abort::Recursion);
        }
        let result = self.conditional();
        self.depth -= 1;
        result
    }

    fn conditional(&mut self) -> Parsed {
        let condition = self.logical(true)?;
        if !self.at(&TokenKind::Question) {
            return Ok(condition);
        }
        let op = self.advance();
        let truthy = self.logical(true)?;
        self.expect(&TokenKind::Colon, "':'")?;
        let falsy = self.expr()?;
        let call = self.call_node(op.offset, "_?_:_", vec![condition, truthy, falsy]);
        self.weigh(&call, true);
        Ok(call)
    }

    /// `||` chains over `&&` chains, both built as balanced trees
    fn logical(&mut self, or: bool) -> Parsed {
        let (token, function) = if or {
            (TokenKind::Or, "_||_")
        } else {
            (TokenKind::And, "_&&_")
        };
        let first = if or {
            self.logical(false)?
        } else {
            self.relation()?
        };
        if !self.at(&token) {
            return Ok(first);
        }
        let mut terms = vec![Some(first)];
        let mut ops = Vec::new();
        while self.at(&token) {
            ops.push(self.advance().offset);
            let term = if or {
                self.logical(false)?
            } else {
                self.relation()?
            };
            terms.push(Some(term));
        }
        Ok(self.balance(function, &ops, &mut terms, 0, ops.len() - 1))
    }

    fn balance(
        &mut self,
        function: &str,
        ops: &[usize],
        terms: &mut [Option<Expr>],
        lo: usize,
        hi: usize,
    ) -> Expr {
        let mid = (lo + hi + 1) / 2;
        let left = if mid == lo {
            self.take_term(terms, mid, ops[mid])
        } else {
            self.balance(function, ops, terms, lo, mid - 1)
        };
        let right = if mid == hi {
            self.take_term(terms, mid + 1, ops[mid])
        } else {
            self.balance(function, ops, terms, mid + 1, hi)
        };
        let call = self.call_node(ops[mid], function, vec![left, right]);
        self.weigh(&call, false);
        call
    }

    fn take_term(&mut self, terms: &mut [Option<Expr>], index: usize, offset: usize) -> Expr {
        match terms.get_mut(index).and_then(Option::take) {
            Some(term) => term,
            None => self.error_node(offset),
        }
    }

    fn relation(&mut self) -> Parsed {
        let mut lhs = self.additive()?;
        while let Some(function) = relation_function(&self.peek().kind) {
            let op = self.advance();
            let rhs = self.additive()?;
            lhs = self.binary(op.offset, function, lhs, rhs);
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Parsed {
        let mut lhs = self.multiplicative()?;
        while let Some(function) = additive_function(&self.peek().kind) {
            let op = self.advance();
            let rhs = self.multiplicative()?;
            lhs = self.binary(op.offset, function, lhs, rhs);
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Parsed {
        let mut lhs = self.unary()?;
        while let Some(function) = multiplicative_function(&self.peek().kind) {
            let op = self.advance();
            let rhs = self.unary()?;
            lhs = self.binary(op.offset, function, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Parsed {
        let kind = self.peek().kind.clone();
        let negate = match kind {
            TokenKind::Minus => true,
            TokenKind::Not => false,
            _ => return self.member(),
        };
        // `-1` and `-2.5` are signed literals
        if negate
            && matches!(
                self.peek_at(1).kind,
                TokenKind::Int(_) | TokenKind::Double(_)
            )
        {
            return self.member();
        }
        let first = self.peek().offset;
        let mut count = 0usize;
        let mut last = String::new();
        while self.peek().kind == kind {
            last = self.advance().text;
            count += 1;
        }
        if negate && !starts_member(&self.peek().kind) {
            self.no_viable(&last)?;
        }
        let operand = self.member()?;
        if count % 2 == 0 {
            return Ok(operand);
        }
        let function = if negate { "-_" } else { "!_" };
        let call = self.call_node(first, function, vec![operand]);
        self.weigh(&call, false);
        Ok(call)
    }

    fn member(&mut self) -> Parsed {
        let mut operand = self.primary()?;
        loop {
            operand = match self.peek().kind {
                TokenKind::Dot => match self.select(operand)? {
                    Selected::Continue(expr) => expr,
                    Selected::Stop(expr) => return Ok(expr),
                },
                TokenKind::LBracket => self.index(operand)?,
                _ => return Ok(operand),
            };
        }
    }

    fn select(&mut self, operand: Expr) -> std::result::Result<Selected, Abort> {
        let resyncing = self.recovering;
        let dot = self.advance();
        let optional = if self.at(&TokenKind::Question) {
            self.advance();
            true
        } else {
            false
        };
        let field_token = self.peek().clone();
        let (field, escaped) = match &field_token.kind {
            TokenKind::Ident(name) => (name.clone(), false),
            TokenKind::EscapedIdent(name) => (name.clone(), true),
            TokenKind::True | TokenKind::False | TokenKind::Null | TokenKind::In => {
                self.mismatched("IDENTIFIER")?;
                self.advance();
                return Ok(Selected::Continue(self.error_node(field_token.offset)));
            }
            _ => {
                // no token matched since the last error, so it stays silent
                if resyncing {
                    self.attempt()?;
                } else {
                    let prefix = if optional { ".?" } else { "." };
                    self.no_viable(prefix)?;
                }
                if !is_sync(&field_token.kind) {
                    self.advance();
                }
                return Ok(Selected::Stop(self.error_node(field_token.offset)));
            }
        };
        self.advance();
        let field = if escaped && !self.options.identifier_escape_syntax {
            self.visitor_report(field_token.offset, "unsupported syntax: '`'");
            String::new()
        } else {
            field
        };

        if !optional && !escaped && self.at(&TokenKind::LParen) {
            let open = self.advance();
            let args = self.call_args()?;
            return Ok(Selected::Continue(self.receiver_call(
                open.offset,
                &field,
                operand,
                args,
            )));
        }
        if optional {
            if !self.options.optional_syntax {
                return Ok(Selected::Continue(
                    self.visitor_error(dot.offset, "unsupported syntax '.?'"),
                ));
            }
            let name = self.node(field_token.offset, ExprKind::Literal(Literal::String(field)));
            let call = self.call_node(dot.offset, "_?._", vec![operand, name]);
            self.weigh(&call, true);
            return Ok(Selected::Continue(call));
        }
        let select = self.node(
            dot.offset,
            ExprKind::Select {
                operand: Box::new(operand),
                field,
                test_only: false,
            },
        );
        self.weigh(&select, true);
        Ok(Selected::Continue(select))
    }

    fn index(&mut self, operand: Expr) -> Parsed {
        let open = self.advance();
        let optional = if self.at(&TokenKind::Question) {
            self.advance();
            true
        } else {
            false
        };
        let index = self.expr()?;
        self.expect(&TokenKind::RBracket, "']'")?;
        if optional && !self.options.optional_syntax {
            return Ok(self.visitor_error(open.offset, "unsupported syntax '[?'"));
        }
        let function = if optional { "_[?_]" } else { "_[_]" };
        let call = self.call_node(open.offset, function, vec![operand, index]);
        self.weigh(&call, true);
        Ok(call)
    }

    fn call_args(&mut self) -> std::result::Result<Vec<Expr>, Abort> {
        let mut args = Vec::new();
        if !self.at(&TokenKind::RParen) {
            args.push(self.expr()?);
            while self.at(&TokenKind::Comma) {
                self.advance();
                args.push(self.expr()?);
            }
        }
        self.expect(&TokenKind::RParen, "{')', ','}")?;
        Ok(args)
    }

    fn primary(&mut self) -> Parsed {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Ident(_) => self.ident_or_call(false),
            TokenKind::Dot => {
                if matches!(self.peek_at(1).kind, TokenKind::Ident(_)) {
                    return self.ident_or_call(true);
                }
                self.advance();
                self.no_viable(".")?;
                let offending = self.peek().kind.clone();
                if !is_sync(&offending) {
                    self.advance();
                }
                Ok(self.error_node(token.offset))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::LBracket => self.list(),
            TokenKind::LBrace => self.map(),
            TokenKind::Minus
                if matches!(
                    self.peek_at(1).kind,
                    TokenKind::Int(_) | TokenKind::Double(_)
                ) =>
            {
                self.advance();
                self.literal(Some(token.offset))
            }
            TokenKind::Int(_)
            | TokenKind::Uint(_)
            | TokenKind::Double(_)
            | TokenKind::Str(_)
            | TokenKind::Bytes(_)
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Null => self.literal(None),
            _ => self.recover_primary(),
        }
    }

    /// Resynchronize when no expression can start at the current token
    fn recover_primary(&mut self) -> Parsed {
        let mut dropped = 0;
        loop {
            let token = self.peek().clone();
            if is_sync(&token.kind) {
                self.mismatched(EXPR_START)?;
                self.attempt()?;
                return Ok(self.error_node(token.offset));
            }
            if starts_expr(&self.peek_at(1).kind) {
                self.extraneous(EXPR_START)?;
                self.advance();
                self.attempt()?;
                return self.primary();
            }
            self.mismatched(EXPR_START)?;
            self.advance();
            if matches!(token.kind, TokenKind::EscapedIdent(_)) {
                return Ok(self.error_node(token.offset));
            }
            self.attempt()?;
            dropped += 1;
            if dropped > self.options.error_recovery_lookahead_limit {
                return Err(Abort::Lookahead);
            }
        }
    }

    fn literal(&mut self, sign: Option<usize>) -> Parsed {
        let token = self.advance();
        let offset = sign.unwrap_or(token.offset);
        let negative = sign.is_some();
        let value = match &token.kind {
            TokenKind::Int(text) => literal::parse_int(text, negative).map(Literal::Int),
            TokenKind::Uint(text) => literal::parse_uint(text).map(Literal::Uint),
            TokenKind::Double(text) => literal::parse_double(text, negative).map(Literal::Double),
            TokenKind::Str(raw) => literal::decode_quoted(raw, false),
            TokenKind::Bytes(raw) => literal::decode_quoted(raw, true),
            TokenKind::True => Ok(Literal::Bool(true)),
            TokenKind::False => Ok(Literal::Bool(false)),
            TokenKind::Null => Ok(Literal::Null),
            _ => {
                self.mismatched(EXPR_START)?;
                return Ok(self.error_node(offset));
            }
        };
        Ok(match value {
            Ok(lit) => self.node(offset, ExprKind::Literal(lit)),
            Err(message) => self.visitor_error(offset, message),
        })
    }

    /// `IDENT`, `.IDENT`, `IDENT(args)`, or a message literal `a.b.C{...}`
    fn ident_or_call(&mut self, leading_dot: bool) -> Parsed {
        let start = self.peek().offset;
        if leading_dot {
            self.advance();
        }
        let id = self.advance();
        let mut name = if leading_dot {
            format!(".{}", id.text)
        } else {
            id.text.clone()
        };
        if self.message_ahead() {
            while self.at(&TokenKind::Dot) {
                self.advance();
                name.push('.');
                name.push_str(&self.advance().text);
            }
            return self.message(name);
        }

        let reserved = RESERVED_IDENTIFIERS.contains(&id.text.as_str());
        if self.at(&TokenKind::LParen) {
            let open = self.advance();
            if reserved {
                self.muted += 1;
            }
            let args = self.call_args();
            if reserved {
                self.muted -= 1;
            }
            let args = args?;
            if reserved {
                return Ok(self.visitor_error(start, format!("reserved identifier: {}", id.text)));
            }
            return Ok(self.global_call(open.offset, &name, args));
        }
        if reserved {
            return Ok(self.visitor_error(start, format!("reserved identifier: {}", id.text)));
        }
        Ok(self.node(id.offset, ExprKind::Ident(name)))
    }

    /// `(. IDENT)* {` follows the identifier just consumed
    fn message_ahead(&self) -> bool {
        let mut n = 0;
        loop {
            match (&self.peek_at(n).kind, &self.peek_at(n + 1).kind) {
                (TokenKind::LBrace, _) => return true,
                (TokenKind::Dot, TokenKind::Ident(_)) => n += 2,
                _ => return false,
            }
        }
    }

    fn message(&mut self, message_name: String) -> Parsed {
        let open = self.advance();
        let mut entries = Vec::new();
        if !self.at(&TokenKind::RBrace) {
            loop {
                if !self.entry_start(STRUCT_START, starts_field)? {
                    break;
                }
                let question = self.optional_marker();
                let field_token = self.peek().clone();
                let field = match &field_token.kind {
                    TokenKind::Ident(name) => name.clone(),
                    TokenKind::EscapedIdent(name) => {
                        if !self.options.identifier_escape_syntax {
                            self.visitor_report(field_token.offset, "unsupported syntax: '`'");
                        }
                        name.clone()
                    }
                    _ => {
                        self.mismatched(FIELD_NAME)?;
                        // the ':' and value recoveries and the closing brace
                        for _ in 0..4 {
                            self.attempt()?;
                        }
                        break;
                    }
                };
                self.advance();
                let colon = self.peek().offset;
                if !self.expect(&TokenKind::Colon, "':'")? {
                    break;
                }
                let skipped = question.is_some() && !self.options.optional_syntax;
                let value = self.muted_if(skipped, |state| state.expr())?;
                match question {
                    Some(q) if skipped => self.visitor_report(q, "unsupported syntax '?'"),
                    _ => {
                        self.next_id += 1;
                        let id = self.next_id;
                        self.source_info.offsets.insert(id, colon);
                        entries.push(Entry {
                            id,
                            key: EntryKey::Field(field),
                            value,
                            optional: question.is_some(),
                        });
                    }
                }
                if !self.entry_separator(&TokenKind::RBrace) {
                    break;
                }
            }
        }
        self.skip_trailing_comma(&TokenKind::RBrace);
        self.expect(&TokenKind::RBrace, "{'}', ','}")?;
        let expr = self.node(
            open.offset,
            ExprKind::Struct {
                message_name,
                entries,
            },
        );
        self.weigh(&expr, false);
        Ok(expr)
    }

    fn map(&mut self) -> Parsed {
        let open = self.advance();
        let mut entries = Vec::new();
        let starts_entry = |kind: &TokenKind| starts_expr(kind) || matches!(kind, TokenKind::Question);
        if !self.at(&TokenKind::RBrace) {
            loop {
                if !self.entry_start(MAP_START, starts_entry)? {
                    break;
                }
                let question = self.optional_marker();
                let skipped = question.is_some() && !self.options.optional_syntax;
                let key = self.muted_if(skipped, |state| state.expr())?;
                let colon = self.peek().offset;
                if !self.expect(&TokenKind::Colon, "':'")? {
                    break;
                }
                let value = self.muted_if(skipped, |state| state.expr())?;
                match question {
                    Some(q) if skipped => self.visitor_report(q, "unsupported syntax '?'"),
                    _ => {
                        self.next_id += 1;
                        let id = self.next_id;
                        self.source_info.offsets.insert(id, colon);
                        entries.push(Entry {
                            id,
                            key: EntryKey::Map(key),
                            value,
                            optional: question.is_some(),
                        });
                    }
                }
                if !self.entry_separator(&TokenKind::RBrace) {
                    break;
                }
            }
        }
        self.skip_trailing_comma(&TokenKind::RBrace);
        self.expect(&TokenKind::RBrace, "{'}', ','}")?;
        let expr = self.node(open.offset, ExprKind::Map { entries });
        self.weigh(&expr, false);
        Ok(expr)
    }

    fn list(&mut self) -> Parsed {
        let open = self.advance();
        let mut elements = Vec::new();
        let mut optional_indices = Vec::new();
        if !self.at(&TokenKind::RBracket) && !self.at(&TokenKind::Comma) {
            loop {
                let question = self.optional_marker();
                let element = self.expr()?;
                if let Some(q) = question {
                    if self.options.optional_syntax {
                        optional_indices.push(elements.len());
                    } else {
                        self.visitor_report(q, "unsupported syntax '?'");
                    }
                }
                elements.push(element);
                if !self.entry_separator(&TokenKind::RBracket) {
                    break;
                }
            }
        }
        self.skip_trailing_comma(&TokenKind::RBracket);
        self.expect(&TokenKind::RBracket, "{']', ','}")?;
        let expr = self.node(
            open.offset,
            ExprKind::List {
                elements,
                optional_indices,
            },
        );
        self.weigh(&expr, false);
        Ok(expr)
    }

    /// Offset of a consumed `?` entry prefix
    fn optional_marker(&mut self) -> Option<usize> {
        if self.at(&TokenKind::Question) {
            Some(self.advance().offset)
        } else {
            None
        }
    }

    /// Consume a `,` that is followed by another entry. A trailing comma is
    /// left for the caller.
    fn entry_separator(&mut self, close: &TokenKind) -> bool {
        if !self.at(&TokenKind::Comma) || &self.peek_at(1).kind == close {
            return false;
        }
        self.advance();
        true
    }

    fn skip_trailing_comma(&mut self, close: &TokenKind) {
        if self.at(&TokenKind::Comma) && &self.peek_at(1).kind == close {
            self.advance();
        }
    }

    /// Check that an entry can begin here, dropping one stray token when
    /// the token after it can
    fn entry_start(
        &mut self,
        expected: &str,
        starts: impl Fn(&TokenKind) -> bool,
    ) -> std::result::Result<bool, Abort> {
        let kind = self.peek().kind.clone();
        if starts(&kind) {
            return Ok(true);
        }
        let trailing_comma =
            kind == TokenKind::Comma && self.peek_at(1).kind == TokenKind::RBrace;
        if kind == TokenKind::RBrace || trailing_comma {
            return Ok(false);
        }
        if starts(&self.peek_at(1).kind) {
            self.extraneous(expected)?;
            self.advance();
            self.attempt()?;
            return Ok(true);
        }
        self.mismatched(expected)?;
        Ok(false)
    }

    fn muted_if(&mut self, mute: bool, parse: impl FnOnce(&mut Self) -> Parsed) -> Parsed {
        if mute {
            self.muted += 1;
        }
        let result = parse(self);
        if mute {
            self.muted -= 1;
        }
        result
    }

    // Calls and macros

    fn global_call(&mut self, offset: usize, function: &str, args: Vec<Expr>) -> Expr {
        if let Some(expanded) = self.expand_macro(offset, function, None, &args) {
            return expanded;
        }
        let call = self.call_node(offset, function, args);
        self.weigh(&call, false);
        call
    }

    fn receiver_call(&mut self, offset: usize, function: &str, target: Expr, args: Vec<Expr>) -> Expr {
        if let Some(expanded) = self.expand_macro(offset, function, Some(&target), &args) {
            return expanded;
        }
        let call = self.node(
            offset,
            ExprKind::Call {
                target: Some(Box::new(target)),
                function: function.to_string(),
                args,
            },
        );
        self.weigh(&call, true);
        call
    }

    fn expand_macro(
        &mut self,
        offset: usize,
        function: &str,
        target: Option<&Expr>,
        args: &[Expr],
    ) -> Option<Expr> {
        if self.halted {
            return None;
        }
        let registry = self.macros;
        let definition = registry.lookup(function, args.len(), target.is_some())?;
        let deepest = target
            .into_iter()
            .chain(args.iter())
            .map(|e| self.weight_of(e))
            .max()
            .unwrap_or(0);
        let weight = deepest + usize::from(target.is_some());

        let mut helper = MacroHelper::new(&mut self.next_id, &mut self.source_info, Some(offset));
        match definition.expand(&mut helper, target, args) {
            Ok(None) => None,
            Ok(Some(expanded)) => {
                if self.options.populate_macro_calls {
                    self.source_info.macro_calls.insert(
                        expanded.id,
                        MacroCall {
                            function: function.to_string(),
                            target: target.cloned(),
                            args: args.to_vec(),
                        },
                    );
                }
                self.set_weight(expanded.id, weight);
                Some(expanded)
            }
            Err(err) => {
                let at = self.source_info.offset(err.expr_id).unwrap_or(offset);
                Some(self.visitor_error(at, err.message))
            }
        }
    }
}

enum Selected {
    Continue(Expr),
    /// Parsing of the postfix chain stops after a failed selection
    Stop(Expr),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cel::macros::standard_macros;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn parser() -> Parser {
        let mut registry = MacroRegistry::new();
        registry.extend(standard_macros());
        Parser::new(ParserOptions::default(), Arc::new(registry))
    }

    fn errors(text: &str) -> String {
        let source = Source::new(text, "");
        match parser().parse(&source) {
            Ok(ast) => panic!("expected errors, parsed {:?}", ast.expr),
            Err(issues) => issues.to_display_string(&source),
        }
    }

    #[test]
    fn test_balanced_logical_chain() {
        let ast = parser()
            .parse(&Source::new("a || b || c || d", ""))
            .unwrap();
        let (_, function, args) = ast.expr.as_call().unwrap();
        assert_eq!(function, "_||_");
        // ((a || b) || (c || d))
        assert_eq!(args[0].as_call().map(|c| c.1), Some("_||_"));
        assert_eq!(args[1].as_call().map(|c| c.1), Some("_||_"));
    }

    #[test]
    fn test_offsets_follow_operator_tokens() {
        let ast = parser().parse(&Source::new("a.b[0] + f(x)", "")).unwrap();
        let info = &ast.source_info;
        assert_eq!(info.offset(ast.expr.id), Some(7));
        let (_, _, args) = ast.expr.as_call().unwrap();
        assert_eq!(info.offset(args[0].id), Some(3));
        assert_eq!(info.offset(args[1].id), Some(10));
    }

    #[test]
    fn test_macro_expansion_recorded() {
        let ast = parser().parse(&Source::new("[1].all(x, x > 0)", "")).unwrap();
        assert!(matches!(ast.expr.kind, ExprKind::Comprehension(_)));
        let call = &ast.source_info.macro_calls[&ast.expr.id];
        assert_eq!(call.function, "all");
    }

    #[test]
    fn test_negation_cancels() {
        let ast = parser().parse(&Source::new("!!true", "")).unwrap();
        assert_eq!(ast.expr.as_literal(), Some(&Literal::Bool(true)));
        let ast = parser().parse(&Source::new("4--4", "")).unwrap();
        let (_, _, args) = ast.expr.as_call().unwrap();
        assert_eq!(args[1].as_literal(), Some(&Literal::Int(-4)));
    }

    #[rstest]
    #[case(
        "a | b",
        "ERROR: :1:3: Syntax error: token recognition error at: '| '\n | a | b\n | ..^\nERROR: :1:5: Syntax error: extraneous input 'b' expecting <EOF>\n | a | b\n | ....^"
    )]
    #[case(
        "{a}",
        "ERROR: :1:3: Syntax error: mismatched input '}' expecting ':'\n | {a}\n | ..^"
    )]
    #[case(
        "self.true == 1",
        "ERROR: :1:6: Syntax error: mismatched input 'true' expecting IDENTIFIER\n | self.true == 1\n | .....^"
    )]
    #[case(
        "has(m)",
        "ERROR: :1:5: invalid argument to has() macro\n | has(m)\n | ....^"
    )]
    #[case(
        "a.?b",
        "ERROR: :1:2: unsupported syntax '.?'\n | a.?b\n | .^"
    )]
    #[case("while", "ERROR: :1:1: reserved identifier: while\n | while\n | ^")]
    fn test_error_messages(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(errors(text), expected);
    }

    #[rstest]
    #[case(
        "x{.",
        "ERROR: :1:3: Syntax error: mismatched input '.' expecting {'}', ',', '?', IDENTIFIER, ESC_IDENTIFIER}\n | x{.\n | ..^"
    )]
    #[case(
        "x{?.",
        "ERROR: :1:4: Syntax error: mismatched input '.' expecting {IDENTIFIER, ESC_IDENTIFIER}\n | x{?.\n | ...^\nERROR: :1:4: Syntax error: error recovery attempt limit exceeded: 4\n | x{?.\n | ...^"
    )]
    fn test_message_recovery(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(errors(text), expected);
    }

    #[test]
    fn test_recovery_limit() {
        let out = errors("a ? b ((?))");
        assert!(out.ends_with(
            "ERROR: :1:12: Syntax error: error recovery attempt limit exceeded: 4\n | a ? b ((?))\n | ...........^"
        ));
    }

    #[test]
    fn test_expression_nesting_limit() {
        let text = format!("{}1{}", "[".repeat(32), "]".repeat(32));
        assert_eq!(
            errors(&text),
            "ERROR: :-1:0: expression recursion limit exceeded: 32"
        );
    }

    #[test]
    fn test_operator_depth_limit() {
        let text = (1..=34).map(|i| i.to_string()).collect::<Vec<_>>().join(" + ");
        assert_eq!(errors(&text), "ERROR: :-1:0: max recursion depth exceeded");
        let text = (1..=33).map(|i| i.to_string()).collect::<Vec<_>>().join(" + ");
        assert!(parser().parse(&Source::new(&text, "")).is_ok());
    }

    #[test]
    fn test_optional_syntax_enabled() {
        let options = ParserOptions {
            optional_syntax: true,
            ..ParserOptions::default()
        };
        let parser = Parser::new(options, Arc::new(MacroRegistry::new()));
        let ast = parser.parse(&Source::new("[?a, b]", "")).unwrap();
        match ast.expr.kind {
            ExprKind::List {
                optional_indices, ..
            } => assert_eq!(optional_indices, vec![0]),
            other => panic!("unexpected {:?}", other),
        }
    }
}
