//! Adorned debug rendering of expression trees.
//!
//! The layout is line oriented with two-space indentation. Every node and
//! every map or struct entry is followed by the metadata string its
//! [`Adorner`] returns, so two renderings of the same tree are identical.

use super::ast::{Entry, EntryKey, Expr, ExprId, ExprKind, Literal, MacroCall};
use std::collections::BTreeMap;

/// Per-node metadata callback
pub trait Adorner {
    fn expr_metadata(&self, expr: &Expr) -> String;
    fn entry_metadata(&self, entry: &Entry) -> String;
}

/// Tags each node with its structural kind, or with the macro name when
/// the node is a recorded macro expansion.
#[derive(Debug, Default, Clone, Copy)]
pub struct KindAdorner<'a> {
    macro_calls: Option<&'a BTreeMap<ExprId, MacroCall>>,
}

impl<'a> KindAdorner<'a> {
    pub fn new() -> Self {
        Self { macro_calls: None }
    }

    pub fn with_macro_calls(macro_calls: &'a BTreeMap<ExprId, MacroCall>) -> Self {
        Self {
            macro_calls: Some(macro_calls),
        }
    }
}

impl Adorner for KindAdorner<'_> {
    fn expr_metadata(&self, expr: &Expr) -> String {
        if let Some(call) = self.macro_calls.and_then(|calls| calls.get(&expr.id)) {
            return format!("^#{}#", call.function);
        }
        format!("^#{}#", kind_label(expr))
    }

    fn entry_metadata(&self, _entry: &Entry) -> String {
        "^#*expr.Expr_CreateStruct_Entry#".to_string()
    }
}

fn kind_label(expr: &Expr) -> &'static str {
    match &expr.kind {
        ExprKind::Unspecified => "",
        ExprKind::Call { .. } => "*expr.Expr_CallExpr",
        ExprKind::Comprehension(_) => "*expr.Expr_ComprehensionExpr",
        ExprKind::Ident(_) => "*expr.Expr_IdentExpr",
        ExprKind::Literal(lit) => match lit {
            Literal::Bool(_) => "*expr.Constant_BoolValue",
            Literal::Bytes(_) => "*expr.Constant_BytesValue",
            Literal::Double(_) => "*expr.Constant_DoubleValue",
            Literal::Int(_) => "*expr.Constant_Int64Value",
            Literal::Null => "*expr.Constant_NullValue",
            Literal::String(_) => "*expr.Constant_StringValue",
            Literal::Uint(_) => "*expr.Constant_Uint64Value",
        },
        ExprKind::List { .. } => "*expr.Expr_ListExpr",
        ExprKind::Map { .. } | ExprKind::Struct { .. } => "*expr.Expr_StructExpr",
        ExprKind::Select { .. } => "*expr.Expr_SelectExpr",
    }
}

/// Render `expr` with `adorner` metadata after every node and entry
pub fn to_adorned_debug_string(expr: &Expr, adorner: &dyn Adorner) -> String {
    let mut writer = Writer {
        adorner,
        buffer: String::new(),
        indent: 0,
        line_start: true,
    };
    writer.expr(expr);
    writer.buffer
}

/// Render without metadata
pub fn to_debug_string(expr: &Expr) -> String {
    struct Plain;
    impl Adorner for Plain {
        fn expr_metadata(&self, _: &Expr) -> String {
            String::new()
        }
        fn entry_metadata(&self, _: &Entry) -> String {
            String::new()
        }
    }
    to_adorned_debug_string(expr, &Plain)
}

struct Writer<'a> {
    adorner: &'a dyn Adorner,
    buffer: String,
    indent: usize,
    line_start: bool,
}

impl Writer<'_> {
    fn append(&mut self, text: &str) {
        if self.line_start {
            self.line_start = false;
            for _ in 0..self.indent {
                self.buffer.push_str("  ");
            }
        }
        self.buffer.push_str(text);
    }

    fn newline(&mut self) {
        self.buffer.push('\n');
        self.line_start = true;
    }

    fn expr(&mut self, e: &Expr) {
        match &e.kind {
            ExprKind::Unspecified => {}
            ExprKind::Literal(lit) => self.append(&format_literal(lit)),
            ExprKind::Ident(name) => self.append(name),
            ExprKind::Select {
                operand,
                field,
                test_only,
            } => {
                self.expr(operand);
                self.append(".");
                self.append(field);
                if *test_only {
                    self.append("~test-only~");
                }
            }
            ExprKind::Call {
                target,
                function,
                args,
            } => {
                if let Some(target) = target {
                    self.expr(target);
                    self.append(".");
                }
                self.append(function);
                self.append("(");
                if !args.is_empty() {
                    self.indent += 1;
                    self.newline();
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            self.append(",");
                            self.newline();
                        }
                        self.expr(arg);
                    }
                    self.indent -= 1;
                    self.newline();
                }
                self.append(")");
            }
            ExprKind::List {
                elements,
                optional_indices,
            } => {
                self.append("[");
                if !elements.is_empty() {
                    self.newline();
                    self.indent += 1;
                    for (i, elem) in elements.iter().enumerate() {
                        if i > 0 {
                            self.append(",");
                            self.newline();
                        }
                        if optional_indices.contains(&i) {
                            self.append("?");
                        }
                        self.expr(elem);
                    }
                    self.indent -= 1;
                    self.newline();
                }
                self.append("]");
            }
            ExprKind::Map { entries } => {
                self.append("{");
                self.entries(entries);
                self.append("}");
            }
            ExprKind::Struct {
                message_name,
                entries,
            } => {
                self.append(message_name);
                self.append("{");
                self.entries(entries);
                self.append("}");
            }
            ExprKind::Comprehension(c) => {
                self.append("__comprehension__(");
                self.indent += 1;
                self.newline();
                self.section("Variable");
                self.append(&c.iter_var);
                self.append(",");
                self.newline();
                self.section("Target");
                self.expr(&c.iter_range);
                self.append(",");
                self.newline();
                self.section("Accumulator");
                self.append(&c.accu_var);
                self.append(",");
                self.newline();
                self.section("Init");
                self.expr(&c.accu_init);
                self.append(",");
                self.newline();
                self.section("LoopCondition");
                self.expr(&c.loop_condition);
                self.append(",");
                self.newline();
                self.section("LoopStep");
                self.expr(&c.loop_step);
                self.append(",");
                self.newline();
                self.section("Result");
                self.expr(&c.result);
                self.append(")");
                self.indent -= 1;
            }
        }
        let metadata = self.adorner.expr_metadata(e);
        self.append(&metadata);
    }

    fn section(&mut self, title: &str) {
        self.append("// ");
        self.append(title);
        self.newline();
    }

    fn entries(&mut self, entries: &[Entry]) {
        if entries.is_empty() {
            return;
        }
        self.newline();
        self.indent += 1;
        for (i, entry) in entries.iter().enumerate() {
            if i > 0 {
                self.append(",");
                self.newline();
            }
            if entry.optional {
                self.append("?");
            }
            match &entry.key {
                EntryKey::Field(name) => self.append(name),
                EntryKey::Map(key) => self.expr(key),
            }
            self.append(":");
            self.expr(&entry.value);
            let metadata = self.adorner.entry_metadata(entry);
            self.append(&metadata);
        }
        self.indent -= 1;
        self.newline();
    }
}

/// Literal text as a Go `%v`/`strconv.Quote` rendering would print it
pub fn format_literal(lit: &Literal) -> String {
    match lit {
        Literal::Bool(b) => b.to_string(),
        Literal::Bytes(bytes) => format!("b{}", quote_bytes(bytes)),
        Literal::Double(d) => format_double(*d),
        Literal::Int(i) => i.to_string(),
        Literal::Null => "null".to_string(),
        Literal::String(s) => quote_bytes(s.as_bytes()),
        Literal::Uint(u) => format!("{}u", u),
    }
}

/// Shortest round-trip digits, switching to exponent form below 1e-4 or
/// at 1e6 and above the way Go's `%v` does for float64.
pub fn format_double(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    let sci = format!("{:e}", value);
    let (mantissa, exponent) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    if exponent < -4 || exponent >= 6 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    } else {
        format!("{}", value)
    }
}

/// Double-quoted with Go escapes. Valid UTF-8 that prints stays raw;
/// invalid bytes become `\xNN`.
pub fn quote_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');
    for chunk in bytes.utf8_chunks() {
        for c in chunk.valid().chars() {
            quote_char(&mut out, c);
        }
        for b in chunk.invalid() {
            out.push_str(&format!("\\x{:02x}", b));
        }
    }
    out.push('"');
    out
}

fn quote_char(out: &mut String, c: char) {
    match c {
        '"' => out.push_str("\\\""),
        '\\' => out.push_str("\\\\"),
        '\u{07}' => out.push_str("\\a"),
        '\u{08}' => out.push_str("\\b"),
        '\u{0c}' => out.push_str("\\f"),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        '\u{0b}' => out.push_str("\\v"),
        c if is_printable(c) => out.push(c),
        c if (c as u32) < 0x80 => out.push_str(&format!("\\x{:02x}", c as u32)),
        c if (c as u32) < 0x10000 => out.push_str(&format!("\\u{:04x}", c as u32)),
        c => out.push_str(&format!("\\U{:08x}", c as u32)),
    }
}

/// Approximates Go's `strconv.IsPrint`: letters, marks, numbers,
/// punctuation, symbols and the ASCII space.
fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    if c.is_control() || c.is_whitespace() {
        return false;
    }
    let code = c as u32;
    let format_char = matches!(
        code,
        0x00AD
            | 0x0600..=0x0605
            | 0x061C
            | 0x06DD
            | 0x070F
            | 0x180E
            | 0x200B..=0x200F
            | 0x202A..=0x202E
            | 0x2060..=0x206F
            | 0xFEFF
            | 0xFFF9..=0xFFFB
            | 0xE0001
            | 0xE0020..=0xE007F
    );
    let private_use = matches!(code, 0xE000..=0xF8FF | 0xF0000..=0x10FFFF);
    let noncharacter = matches!(code, 0xFDD0..=0xFDEF) || code & 0xFFFE == 0xFFFE;
    !(format_char || private_use || noncharacter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cel::ast::Comprehension;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn ident(id: ExprId, name: &str) -> Expr {
        Expr::new(id, ExprKind::Ident(name.into()))
    }

    fn int(id: ExprId, v: i64) -> Expr {
        Expr::new(id, ExprKind::Literal(Literal::Int(v)))
    }

    fn render_parsed(text: &str) -> String {
        use crate::cel::macros::{standard_macros, MacroRegistry};
        use crate::cel::parser::{Parser, ParserOptions};
        use crate::cel::source::Source;
        use std::sync::Arc;

        let mut registry = MacroRegistry::new();
        registry.extend(standard_macros());
        let parser = Parser::new(ParserOptions::default(), Arc::new(registry));
        let ast = parser.parse(&Source::new(text, "")).unwrap();
        to_adorned_debug_string(&ast.expr, &KindAdorner::new())
    }

    #[rstest]
    #[case("true", "true^#*expr.Constant_BoolValue#")]
    #[case("b'a'", "b\"a\"^#*expr.Constant_BytesValue#")]
    #[case("1.5", "1.5^#*expr.Constant_DoubleValue#")]
    #[case("null", "null^#*expr.Constant_NullValue#")]
    #[case("'s'", "\"s\"^#*expr.Constant_StringValue#")]
    #[case("1u", "1u^#*expr.Constant_Uint64Value#")]
    #[case("7", "7^#*expr.Constant_Int64Value#")]
    fn test_literal_tags(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(render_parsed(text), expected);
    }

    #[rstest]
    #[case("[1]", "^#*expr.Expr_ListExpr#")]
    #[case("{1: 2}", "^#*expr.Expr_StructExpr#")]
    #[case("a.b", "^#*expr.Expr_SelectExpr#")]
    #[case("[1].all(x, x > 0)", "^#*expr.Expr_ComprehensionExpr#")]
    fn test_node_tags(#[case] text: &str, #[case] suffix: &str) {
        let rendered = render_parsed(text);
        assert!(rendered.ends_with(suffix), "{}", rendered);
    }

    #[test]
    fn test_call_layout() {
        let e = Expr::new(
            2,
            ExprKind::Call {
                target: None,
                function: "_+_".into(),
                args: vec![ident(1, "a"), int(3, 1)],
            },
        );
        assert_eq!(
            to_adorned_debug_string(&e, &KindAdorner::new()),
            "_+_(\n  a^#*expr.Expr_IdentExpr#,\n  1^#*expr.Constant_Int64Value#\n)^#*expr.Expr_CallExpr#"
        );
    }

    #[test]
    fn test_receiver_call_and_empty_args() {
        let e = Expr::new(
            2,
            ExprKind::Call {
                target: Some(Box::new(ident(1, "x"))),
                function: "size".into(),
                args: vec![],
            },
        );
        assert_eq!(to_debug_string(&e), "x.size()");
    }

    #[test]
    fn test_select_and_presence() {
        let e = Expr::new(
            2,
            ExprKind::Select {
                operand: Box::new(ident(1, "m")),
                field: "f".into(),
                test_only: true,
            },
        );
        assert_eq!(
            to_adorned_debug_string(&e, &KindAdorner::new()),
            "m^#*expr.Expr_IdentExpr#.f~test-only~^#*expr.Expr_SelectExpr#"
        );
    }

    #[test]
    fn test_map_and_struct_entries() {
        let map = Expr::new(
            1,
            ExprKind::Map {
                entries: vec![Entry {
                    id: 2,
                    key: EntryKey::Map(int(3, 1)),
                    value: int(4, 2),
                    optional: false,
                }],
            },
        );
        assert_eq!(
            to_adorned_debug_string(&map, &KindAdorner::new()),
            "{\n  1^#*expr.Constant_Int64Value#:2^#*expr.Constant_Int64Value#^#*expr.Expr_CreateStruct_Entry#\n}^#*expr.Expr_StructExpr#"
        );
        let msg = Expr::new(
            1,
            ExprKind::Struct {
                message_name: "a.B".into(),
                entries: vec![Entry {
                    id: 2,
                    key: EntryKey::Field("f".into()),
                    value: int(3, 7),
                    optional: true,
                }],
            },
        );
        assert_eq!(to_debug_string(&msg), "a.B{\n  ?f:7\n}");
        let empty = Expr::new(1, ExprKind::Map { entries: vec![] });
        assert_eq!(to_debug_string(&empty), "{}");
    }

    #[test]
    fn test_nested_list_indent() {
        let inner = Expr::new(
            2,
            ExprKind::List {
                elements: vec![int(3, 1)],
                optional_indices: vec![],
            },
        );
        let outer = Expr::new(
            1,
            ExprKind::List {
                elements: vec![inner, int(4, 2)],
                optional_indices: vec![1],
            },
        );
        assert_eq!(to_debug_string(&outer), "[\n  [\n    1\n  ],\n  ?2\n]");
    }

    #[test]
    fn test_comprehension_layout() {
        let c = Comprehension {
            iter_var: "x".into(),
            iter_range: ident(1, "l"),
            accu_var: "@result".into(),
            accu_init: Expr::new(2, ExprKind::Literal(Literal::Bool(true))),
            loop_condition: ident(3, "c"),
            loop_step: ident(4, "s"),
            result: ident(5, "@result"),
        };
        let e = Expr::new(6, ExprKind::Comprehension(Box::new(c)));
        assert_eq!(
            to_debug_string(&e),
            "__comprehension__(\n  // Variable\n  x,\n  // Target\n  l,\n  // Accumulator\n  @result,\n  // Init\n  true,\n  // LoopCondition\n  c,\n  // LoopStep\n  s,\n  // Result\n  @result)"
        );
    }

    #[test]
    fn test_macro_tag_replaces_kind() {
        let mut calls = BTreeMap::new();
        calls.insert(
            1,
            MacroCall {
                function: "has".into(),
                target: None,
                args: vec![],
            },
        );
        let adorner = KindAdorner::with_macro_calls(&calls);
        assert_eq!(
            to_adorned_debug_string(&ident(1, "x"), &adorner),
            "x^#has#"
        );
    }

    #[rstest]
    #[case(Literal::Double(2.0), "2")]
    #[case(Literal::Double(-4.1), "-4.1")]
    #[case(Literal::Double(1e-5), "1e-05")]
    #[case(Literal::Double(1e21), "1e+21")]
    #[case(Literal::Double(1e6), "1e+06")]
    #[case(Literal::Double(123456.0), "123456")]
    #[case(Literal::Double(123456789.0), "1.23456789e+08")]
    #[case(Literal::Uint(23), "23u")]
    #[case(Literal::Null, "null")]
    #[case(Literal::Bytes(b"abc".to_vec()), r#"b"abc""#)]
    #[case(Literal::Bytes(vec![0xff, 0x00]), r#"b"\xff\x00""#)]
    #[case(Literal::String("❤ 'q'\n\"".into()), r#""❤ 'q'\n\"""#)]
    #[case(Literal::String("\u{c3}\u{bf}".into()), "\"Ã¿\"")]
    #[case(Literal::String("\u{200b}\u{7f}".into()), r#""\u200b\x7f""#)]
    fn test_format_literal(#[case] lit: Literal, #[case] expected: &str) {
        assert_eq!(format_literal(&lit), expected);
    }
}
