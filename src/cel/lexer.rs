//! CEL tokenizer
//!
//! Works on code points so token offsets line up with [`Source`] locations.
//! Unrecognized input produces a `token recognition error` and lexing
//! resumes after the offending character.
//!
//! [`Source`]: super::source::Source

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    /// Backtick-quoted identifier, without the backticks
    EscapedIdent(String),
    Int(String),
    Uint(String),
    Double(String),
    /// Quoted string literal, raw text including prefix and quotes
    Str(String),
    /// Quoted bytes literal, raw text including prefix and quotes
    Bytes(String),
    True,
    False,
    Null,
    In,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Question,
    Colon,
    Comma,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
    pub text: String,
}

impl Token {
    /// Text as quoted in syntax error messages
    pub fn display(&self) -> String {
        match self.kind {
            TokenKind::Eof => "<EOF>".to_string(),
            _ => self.text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub offset: usize,
    pub text: String,
}

struct Lexer<'a> {
    chars: &'a [char],
    pos: usize,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
}

pub fn tokenize(chars: &[char]) -> (Vec<Token>, Vec<LexError>) {
    let mut lexer = Lexer {
        chars,
        pos: 0,
        tokens: Vec::new(),
        errors: Vec::new(),
    };
    lexer.run();
    (lexer.tokens, lexer.errors)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_escaped_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/' | ' ')
}

impl<'a> Lexer<'a> {
    fn peek(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn text(&self, start: usize, end: usize) -> String {
        self.chars[start..end].iter().collect()
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        let text = self.text(start, self.pos);
        self.tokens.push(Token {
            kind,
            offset: start,
            text,
        });
    }

    /// Record a recognition error covering `start..=pos` (the failing char
    /// is consumed unless at end of input).
    fn fail(&mut self, start: usize) {
        if self.pos < self.chars.len() {
            self.pos += 1;
        }
        let text = self.text(start, self.pos);
        self.errors.push(LexError {
            offset: start,
            text,
        });
    }

    fn run(&mut self) {
        while let Some(c) = self.peek(0) {
            let start = self.pos;
            match c {
                ' ' | '\t' | '\n' | '\r' | '\u{0c}' => self.pos += 1,
                '/' if self.peek(1) == Some('/') => {
                    while let Some(c) = self.peek(0) {
                        if c == '\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                '0'..='9' => self.number(start),
                '.' if self.peek(1).is_some_and(|c| c.is_ascii_digit()) => self.number(start),
                '"' | '\'' => self.string(start, false, false),
                '`' => self.escaped_ident(start),
                c if is_ident_start(c) => {
                    if !self.string_with_prefix(start) {
                        self.ident(start);
                    }
                }
                _ => self.operator(start, c),
            }
        }
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            offset: self.chars.len(),
            text: String::new(),
        });
    }

    fn operator(&mut self, start: usize, c: char) {
        let next = self.peek(1);
        let (kind, len) = match (c, next) {
            ('=', Some('=')) => (TokenKind::Eq, 2),
            ('!', Some('=')) => (TokenKind::Ne, 2),
            ('<', Some('=')) => (TokenKind::Le, 2),
            ('>', Some('=')) => (TokenKind::Ge, 2),
            ('&', Some('&')) => (TokenKind::And, 2),
            ('|', Some('|')) => (TokenKind::Or, 2),
            ('=', _) | ('&', _) | ('|', _) => {
                // first char of a two-char operator; the next char is the failure point
                self.pos += 1;
                self.fail(start);
                return;
            }
            ('!', _) => (TokenKind::Not, 1),
            ('<', _) => (TokenKind::Lt, 1),
            ('>', _) => (TokenKind::Gt, 1),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('%', _) => (TokenKind::Percent, 1),
            ('?', _) => (TokenKind::Question, 1),
            (':', _) => (TokenKind::Colon, 1),
            (',', _) => (TokenKind::Comma, 1),
            ('.', _) => (TokenKind::Dot, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('[', _) => (TokenKind::LBracket, 1),
            (']', _) => (TokenKind::RBracket, 1),
            ('{', _) => (TokenKind::LBrace, 1),
            ('}', _) => (TokenKind::RBrace, 1),
            _ => {
                self.fail(start);
                return;
            }
        };
        self.pos += len;
        self.push(kind, start);
    }

    fn ident(&mut self, start: usize) {
        while self.peek(0).is_some_and(is_ident_char) {
            self.pos += 1;
        }
        let text = self.text(start, self.pos);
        let kind = match text.as_str() {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "in" => TokenKind::In,
            _ => TokenKind::Ident(text),
        };
        self.push(kind, start);
    }

    fn escaped_ident(&mut self, start: usize) {
        self.pos += 1;
        let body_start = self.pos;
        while self.peek(0).is_some_and(is_escaped_ident_char) {
            self.pos += 1;
        }
        if self.pos == body_start || self.peek(0) != Some('`') {
            self.fail(start);
            return;
        }
        let name = self.text(body_start, self.pos);
        self.pos += 1;
        self.push(TokenKind::EscapedIdent(name), start);
    }

    fn digits(&mut self) -> usize {
        let from = self.pos;
        while self.peek(0).is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        self.pos - from
    }

    fn exponent(&mut self) -> bool {
        if !matches!(self.peek(0), Some('e') | Some('E')) {
            return false;
        }
        let mut n = 1;
        if matches!(self.peek(1), Some('+') | Some('-')) {
            n = 2;
        }
        if !self.peek(n).is_some_and(|c| c.is_ascii_digit()) {
            return false;
        }
        self.pos += n;
        self.digits();
        true
    }

    fn number(&mut self, start: usize) {
        if self.peek(0) == Some('0')
            && matches!(self.peek(1), Some('x') | Some('X'))
            && self.peek(2).is_some_and(|c| c.is_ascii_hexdigit())
        {
            self.pos += 2;
            while self.peek(0).is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            if matches!(self.peek(0), Some('u') | Some('U')) {
                self.pos += 1;
                return self.push_number(TokenKind::Uint, start);
            }
            return self.push_number(TokenKind::Int, start);
        }

        let mut is_double = false;
        if self.peek(0) == Some('.') {
            self.pos += 1;
            self.digits();
            is_double = true;
        } else {
            self.digits();
            if self.peek(0) == Some('.') && self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
                self.digits();
                is_double = true;
            }
        }
        if self.exponent() {
            is_double = true;
        }
        if is_double {
            return self.push_number(TokenKind::Double, start);
        }
        if matches!(self.peek(0), Some('u') | Some('U')) {
            self.pos += 1;
            return self.push_number(TokenKind::Uint, start);
        }
        self.push_number(TokenKind::Int, start);
    }

    fn push_number(&mut self, make: fn(String) -> TokenKind, start: usize) {
        let text = self.text(start, self.pos);
        self.push(make(text), start);
    }

    /// `r"..."`, `b'...'`, `rb"""..."""` and friends
    fn string_with_prefix(&mut self, start: usize) -> bool {
        let lower = |c: Option<char>| c.map(|c| c.to_ascii_lowercase());
        let (raw, bytes, len) = match (lower(self.peek(0)), lower(self.peek(1))) {
            (Some('r'), Some('b')) | (Some('b'), Some('r')) => (true, true, 2),
            (Some('r'), _) => (true, false, 1),
            (Some('b'), _) => (false, true, 1),
            _ => return false,
        };
        if !matches!(self.peek(len), Some('"') | Some('\'')) {
            return false;
        }
        self.pos += len;
        self.string(start, raw, bytes);
        true
    }

    fn string(&mut self, start: usize, raw: bool, bytes: bool) {
        let Some(quote) = self.peek(0) else {
            return;
        };
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        loop {
            let Some(c) = self.peek(0) else {
                self.fail(start);
                return;
            };
            if triple {
                if c == quote && self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            } else if c == quote {
                self.pos += 1;
                break;
            } else if c == '\n' || c == '\r' {
                self.fail(start);
                return;
            }
            if c == '\\' && !raw {
                self.pos += 1;
                if !self.escape() {
                    self.fail(start);
                    return;
                }
                continue;
            }
            self.pos += 1;
        }

        let text = self.text(start, self.pos);
        let kind = if bytes {
            TokenKind::Bytes(text)
        } else {
            TokenKind::Str(text)
        };
        self.push(kind, start);
    }

    /// Validate one escape sequence after the backslash. On failure `pos`
    /// is left on the offending character.
    fn escape(&mut self) -> bool {
        let Some(c) = self.peek(0) else {
            return false;
        };
        match c {
            'a' | 'b' | 'f' | 'n' | 'r' | 't' | 'v' | '"' | '\'' | '\\' | '?' | '`' => {
                self.pos += 1;
                true
            }
            'x' | 'X' => self.hex_digits(2),
            'u' => self.hex_digits(4),
            'U' => self.hex_digits(8),
            '0'..='3' => {
                self.pos += 1;
                for _ in 0..2 {
                    if !self.peek(0).is_some_and(|c| ('0'..='7').contains(&c)) {
                        return false;
                    }
                    self.pos += 1;
                }
                true
            }
            _ => false,
        }
    }

    fn hex_digits(&mut self, n: usize) -> bool {
        self.pos += 1;
        for _ in 0..n {
            if !self.peek(0).is_some_and(|c| c.is_ascii_hexdigit()) {
                return false;
            }
            self.pos += 1;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let chars: Vec<char> = input.chars().collect();
        tokenize(&chars).0.into_iter().map(|t| t.kind).collect()
    }

    fn errors(input: &str) -> Vec<String> {
        let chars: Vec<char> = input.chars().collect();
        tokenize(&chars).1.into_iter().map(|e| e.text).collect()
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1 2u 0x1F 0xFu 1.5 .5e3 1e-7"),
            vec![
                TokenKind::Int("1".into()),
                TokenKind::Uint("2u".into()),
                TokenKind::Int("0x1F".into()),
                TokenKind::Uint("0xFu".into()),
                TokenKind::Double("1.5".into()),
                TokenKind::Double(".5e3".into()),
                TokenKind::Double("1e-7".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_member_on_int_is_not_double() {
        assert_eq!(
            kinds("1.all"),
            vec![
                TokenKind::Int("1".into()),
                TokenKind::Dot,
                TokenKind::Ident("all".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_prefixes() {
        assert_eq!(
            kinds(r#"r"\d" b'x' rb"""a"b""""#),
            vec![
                TokenKind::Str(r#"r"\d""#.into()),
                TokenKind::Bytes("b'x'".into()),
                TokenKind::Bytes(r#"rb"""a"b""""#.into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_and_operators() {
        assert_eq!(
            kinds("a in b && !c != null"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::In,
                TokenKind::Ident("b".into()),
                TokenKind::And,
                TokenKind::Not,
                TokenKind::Ident("c".into()),
                TokenKind::Ne,
                TokenKind::Null,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_recognition_errors() {
        assert_eq!(errors("a | b"), vec!["| "]);
        assert_eq!(errors("1 + $"), vec!["$"]);
        assert_eq!(errors(r#""\xFh""#), vec![r#""\xFh"#, "\""]);
        assert_eq!(errors("a.`$b`"), vec!["`$", "`"]);
    }

    #[test]
    fn test_comment_skipped() {
        assert_eq!(
            kinds("a // trailing\n+ b"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Plus,
                TokenKind::Ident("b".into()),
                TokenKind::Eof,
            ]
        );
    }
}
