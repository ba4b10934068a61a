//! Literal decoding: quoted strings and bytes, numeric tokens.

use super::ast::Literal;

const UNABLE: &str = "unable to unescape string";
const BAD_OCTAL: &str = "unable to unescape octal sequence in string";
const BAD_CODE_POINT: &str = "invalid unicode code point";

/// Decode a quoted string or bytes token (prefix and quotes included in
/// `raw`). Bytes tokens carry their `b` prefix.
pub fn decode_quoted(raw: &str, is_bytes: bool) -> Result<Literal, String> {
    let mut text = raw;
    if is_bytes {
        text = strip_prefix_char(text, &['b', 'B']);
    }
    let mut is_raw = false;
    if text.starts_with(['r', 'R']) {
        text = &text[1..];
        is_raw = true;
    }
    if is_bytes {
        // `rb"..."` spelling
        text = strip_prefix_char(text, &['b', 'B']);
    }
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let body = strip_quotes(&normalized)?;

    let bytes = if is_raw || !body.contains('\\') {
        body.as_bytes().to_vec()
    } else {
        unescape(body, is_bytes)?
    };
    if is_bytes {
        Ok(Literal::Bytes(bytes))
    } else {
        String::from_utf8(bytes)
            .map(Literal::String)
            .map_err(|_| BAD_CODE_POINT.to_string())
    }
}

fn strip_prefix_char<'a>(text: &'a str, prefixes: &[char]) -> &'a str {
    match text.chars().next() {
        Some(c) if prefixes.contains(&c) => &text[1..],
        _ => text,
    }
}

fn strip_quotes(text: &str) -> Result<&str, String> {
    let n = text.len();
    if n < 2 {
        return Err(UNABLE.into());
    }
    for triple in ["'''", "\"\"\""] {
        if n >= 6 && text.starts_with(triple) {
            if !text.ends_with(triple) {
                return Err(UNABLE.into());
            }
            return Ok(&text[3..n - 3]);
        }
    }
    let first = text.as_bytes()[0];
    if first != text.as_bytes()[n - 1] || (first != b'"' && first != b'\'') {
        return Err(UNABLE.into());
    }
    Ok(&text[1..n - 1])
}

fn unescape(body: &str, is_bytes: bool) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            push_char(&mut out, c);
            continue;
        }
        let Some(esc) = chars.next() else {
            return Err("unable to unescape string, found '\\' as last character".into());
        };
        match esc {
            'a' => out.push(0x07),
            'b' => out.push(0x08),
            'f' => out.push(0x0c),
            'n' => out.push(b'\n'),
            'r' => out.push(b'\r'),
            't' => out.push(b'\t'),
            'v' => out.push(0x0b),
            '\\' | '\'' | '"' | '`' | '?' => out.push(esc as u8),
            'x' | 'X' | 'u' | 'U' => {
                let width = match esc {
                    'x' | 'X' => 2,
                    'u' => 4,
                    _ => 8,
                };
                if is_bytes && width > 2 {
                    return Err(UNABLE.into());
                }
                let mut value: u32 = 0;
                for _ in 0..width {
                    let digit = chars
                        .next()
                        .and_then(|d| d.to_digit(16))
                        .ok_or_else(|| UNABLE.to_string())?;
                    value = value << 4 | digit;
                }
                push_code(&mut out, value, is_bytes && width == 2)?;
            }
            '0'..='3' => {
                let mut value = esc as u32 - '0' as u32;
                for _ in 0..2 {
                    let digit = chars
                        .next()
                        .filter(|d| ('0'..='7').contains(d))
                        .ok_or_else(|| BAD_OCTAL.to_string())?;
                    value = value * 8 + (digit as u32 - '0' as u32);
                }
                push_code(&mut out, value, is_bytes)?;
            }
            _ => return Err(UNABLE.into()),
        }
    }
    Ok(out)
}

fn push_char(out: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

fn push_code(out: &mut Vec<u8>, value: u32, raw_byte: bool) -> Result<(), String> {
    if raw_byte {
        out.push(value as u8);
        return Ok(());
    }
    let c = char::from_u32(value).ok_or_else(|| BAD_CODE_POINT.to_string())?;
    push_char(out, c);
    Ok(())
}

fn split_radix(text: &str) -> (&str, u32) {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (text, 10),
    }
}

pub fn parse_int(text: &str, negative: bool) -> Result<i64, String> {
    let (digits, radix) = split_radix(text);
    let magnitude =
        u64::from_str_radix(digits, radix).map_err(|_| "invalid int literal".to_string())?;
    let value = if negative {
        -(magnitude as i128)
    } else {
        magnitude as i128
    };
    i64::try_from(value).map_err(|_| "invalid int literal".to_string())
}

pub fn parse_uint(text: &str) -> Result<u64, String> {
    let trimmed = text.trim_end_matches(['u', 'U']);
    let (digits, radix) = split_radix(trimmed);
    u64::from_str_radix(digits, radix).map_err(|_| "invalid uint literal".to_string())
}

pub fn parse_double(text: &str, negative: bool) -> Result<f64, String> {
    let value: f64 = text
        .parse()
        .map_err(|_| "invalid double literal".to_string())?;
    if value.is_infinite() {
        return Err("invalid double literal".into());
    }
    Ok(if negative { -value } else { value })
}
