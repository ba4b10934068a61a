//! Expression source text with line/column lookup.
//!
//! Offsets are code-point offsets, matching the reference implementation's
//! rune-based locations.

/// Zero-based column, one-based line. `NONE` marks issues with no position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location {
    pub line: i32,
    pub column: i32,
}

impl Location {
    pub const NONE: Location = Location {
        line: -1,
        column: -1,
    };
}

/// Expression text plus the description used in rendered diagnostics
#[derive(Debug, Clone)]
pub struct Source {
    description: String,
    chars: Vec<char>,
    line_starts: Vec<usize>,
}

impl Source {
    pub fn new(content: &str, description: &str) -> Self {
        let chars: Vec<char> = content.chars().collect();
        let mut line_starts = vec![0];
        for (i, c) in chars.iter().enumerate() {
            if *c == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            description: description.to_string(),
            chars,
            line_starts,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    pub fn location(&self, offset: usize) -> Location {
        let idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        Location {
            line: idx as i32 + 1,
            column: (offset - self.line_starts[idx]) as i32,
        }
    }

    /// Text of a one-based line, without its newline
    pub fn snippet(&self, line: i32) -> Option<String> {
        if line < 1 || line as usize > self.line_starts.len() {
            return None;
        }
        let idx = line as usize - 1;
        let start = self.line_starts[idx];
        let end = match self.line_starts.get(idx + 1) {
            Some(next) => next - 1,
            None => self.chars.len(),
        };
        Some(self.chars[start..end].iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_multiline() {
        let src = Source::new("a &&\n  b", "<input>");
        assert_eq!(src.location(0), Location { line: 1, column: 0 });
        assert_eq!(src.location(2), Location { line: 1, column: 2 });
        assert_eq!(src.location(7), Location { line: 2, column: 2 });
    }

    #[test]
    fn test_snippet() {
        let src = Source::new("first\nsecond", "");
        assert_eq!(src.snippet(1).as_deref(), Some("first"));
        assert_eq!(src.snippet(2).as_deref(), Some("second"));
        assert_eq!(src.snippet(3), None);
        assert_eq!(src.snippet(-1), None);
    }
}
