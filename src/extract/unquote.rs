//! Go string literal unquoting.
//!
//! Accepts interpreted (`"..."`), raw (`` `...` ``) and rune (`'x'`)
//! literals with Go's escape rules. Raw literals drop carriage returns.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnquoteError {
    #[error("invalid syntax")]
    Syntax,

    /// `\x` and octal escapes can spell bytes that are not UTF-8
    #[error("invalid UTF-8")]
    InvalidUtf8,
}

pub fn unquote(literal: &str) -> Result<String, UnquoteError> {
    let bytes = literal.as_bytes();
    if bytes.len() < 2 {
        return Err(UnquoteError::Syntax);
    }
    let quote = bytes[0];
    if bytes[bytes.len() - 1] != quote {
        return Err(UnquoteError::Syntax);
    }
    let body = &literal[1..literal.len() - 1];

    match quote {
        b'`' => {
            if body.contains('`') {
                return Err(UnquoteError::Syntax);
            }
            Ok(body.replace('\r', ""))
        }
        b'"' | b'\'' => {
            if body.contains('\n') {
                return Err(UnquoteError::Syntax);
            }
            let mut out = Vec::with_capacity(body.len());
            let mut rest = body;
            let mut chars = 0;
            while !rest.is_empty() {
                rest = unquote_char(rest, quote, &mut out)?;
                chars += 1;
            }
            if quote == b'\'' && chars != 1 {
                return Err(UnquoteError::Syntax);
            }
            String::from_utf8(out).map_err(|_| UnquoteError::InvalidUtf8)
        }
        _ => Err(UnquoteError::Syntax),
    }
}

/// Decode one (possibly escaped) character from the front of `s` into
/// `out`, returning the remainder
fn unquote_char<'a>(s: &'a str, quote: u8, out: &mut Vec<u8>) -> Result<&'a str, UnquoteError> {
    let first = s.as_bytes()[0];
    if first == quote {
        return Err(UnquoteError::Syntax);
    }
    if first != b'\\' {
        let len = s.chars().next().map(char::len_utf8).unwrap_or(1);
        out.extend_from_slice(&s.as_bytes()[..len]);
        return Ok(&s[len..]);
    }

    let escaped = s
        .as_bytes()
        .get(1)
        .copied()
        .filter(u8::is_ascii)
        .ok_or(UnquoteError::Syntax)?;
    let rest = &s[2..];
    let simple = match escaped {
        b'a' => Some(0x07),
        b'b' => Some(0x08),
        b'f' => Some(0x0c),
        b'n' => Some(b'\n'),
        b'r' => Some(b'\r'),
        b't' => Some(b'\t'),
        b'v' => Some(0x0b),
        b'\\' => Some(b'\\'),
        b'\'' | b'"' if escaped == quote => Some(escaped),
        _ => None,
    };
    if let Some(b) = simple {
        out.push(b);
        return Ok(rest);
    }

    match escaped {
        b'x' => {
            let v = hex_value(rest, 2)?;
            out.push(v as u8);
            Ok(&rest[2..])
        }
        b'u' | b'U' => {
            let n = if escaped == b'u' { 4 } else { 8 };
            let v = hex_value(rest, n)?;
            let c = char::from_u32(v).ok_or(UnquoteError::Syntax)?;
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            Ok(&rest[n..])
        }
        b'0'..=b'7' => {
            let digits = rest.as_bytes();
            if digits.len() < 2 {
                return Err(UnquoteError::Syntax);
            }
            let mut v = u32::from(escaped - b'0');
            for &d in &digits[..2] {
                if !(b'0'..=b'7').contains(&d) {
                    return Err(UnquoteError::Syntax);
                }
                v = (v << 3) | u32::from(d - b'0');
            }
            if v > 255 {
                return Err(UnquoteError::Syntax);
            }
            out.push(v as u8);
            Ok(&rest[2..])
        }
        _ => Err(UnquoteError::Syntax),
    }
}

fn hex_value(s: &str, digits: usize) -> Result<u32, UnquoteError> {
    let hex = s.get(..digits).ok_or(UnquoteError::Syntax)?;
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(UnquoteError::Syntax);
    }
    u32::from_str_radix(hex, 16).map_err(|_| UnquoteError::Syntax)
}
