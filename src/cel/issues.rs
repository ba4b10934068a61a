//! Parse and check diagnostics, rendered the way cel-go renders them.

use super::ast::ExprId;
use super::source::{Location, Source};

const MAX_ISSUES_TO_REPORT: usize = 100;

/// One diagnostic. `offset` is absent for errors without a position
/// (e.g. the recursion limit).
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub expr_id: ExprId,
    pub offset: Option<usize>,
    pub message: String,
}

/// Ordered collection of diagnostics from one parse or check
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Issues {
    items: Vec<Issue>,
}

impl Issues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, expr_id: ExprId, offset: Option<usize>, message: impl Into<String>) {
        self.items.push(Issue {
            expr_id,
            offset,
            message: message.into(),
        });
    }

    pub fn extend(&mut self, other: Issues) {
        self.items.extend(other.items);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.items.iter()
    }

    /// Render all issues sorted by position, one `ERROR:` block each,
    /// joined by newlines.
    pub fn to_display_string(&self, source: &Source) -> String {
        let mut located: Vec<(Location, &Issue)> = self
            .items
            .iter()
            .map(|issue| {
                let loc = issue
                    .offset
                    .map(|o| source.location(o))
                    .unwrap_or(Location::NONE);
                (loc, issue)
            })
            .collect();
        // stable: equal positions keep report order
        located.sort_by(|a, b| a.0.cmp(&b.0));

        let mut lines: Vec<String> = located
            .iter()
            .take(MAX_ISSUES_TO_REPORT)
            .map(|(loc, issue)| display_issue(source, *loc, &issue.message))
            .collect();
        if located.len() > MAX_ISSUES_TO_REPORT {
            lines.push(format!(
                "{} more errors were truncated",
                located.len() - MAX_ISSUES_TO_REPORT
            ));
        }
        lines.join("\n")
    }
}

fn display_issue(source: &Source, loc: Location, message: &str) -> String {
    let mut out = format!(
        "ERROR: {}:{}:{}: {}",
        source.description(),
        loc.line,
        loc.column + 1,
        message
    );
    if let Some(snippet) = source.snippet(loc.line) {
        let snippet = snippet.replace('\t', " ");
        out.push_str("\n | ");
        out.push_str(&snippet);
        out.push_str("\n | ");
        let chars: Vec<char> = snippet.chars().collect();
        let column = loc.column.max(0) as usize;
        for c in chars.iter().take(column) {
            out.push(if c.len_utf8() > 1 { '\u{ff0e}' } else { '.' });
        }
        let wide = chars.get(column).is_some_and(|c| c.len_utf8() > 1);
        out.push(if wide { '\u{ff3e}' } else { '^' });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display_with_snippet() {
        let src = Source::new("4--4.1", "<input>");
        let mut issues = Issues::new();
        issues.report(1, Some(1), "found no matching overload for '_-_' applied to '(int, double)'");
        assert_eq!(
            issues.to_display_string(&src),
            "ERROR: <input>:1:2: found no matching overload for '_-_' applied to '(int, double)'\n | 4--4.1\n | .^"
        );
    }

    #[test]
    fn test_display_sorted_by_position() {
        let src = Source::new("a || b", "<input>");
        let mut issues = Issues::new();
        issues.report(2, Some(5), "second");
        issues.report(1, Some(0), "first");
        let out = issues.to_display_string(&src);
        assert!(out.starts_with("ERROR: <input>:1:1: first"));
        assert!(out.contains("ERROR: <input>:1:6: second"));
    }

    #[test]
    fn test_display_without_location() {
        let src = Source::new("x", "");
        let mut issues = Issues::new();
        issues.report(0, None, "expression recursion limit exceeded: 32");
        assert_eq!(
            issues.to_display_string(&src),
            "ERROR: :-1:0: expression recursion limit exceeded: 32"
        );
    }

    #[test]
    fn test_display_tabs_and_wide_chars() {
        let src = Source::new("\t'é' + x", "");
        let mut issues = Issues::new();
        issues.report(0, Some(2), "wide");
        assert_eq!(
            issues.to_display_string(&src),
            "ERROR: :1:3: wide\n |  'é' + x\n | ..\u{ff3e}"
        );
    }
}
