//! Output serialization
//!
//! The suite is written either as plain JSON or as a TypeScript module
//! exporting it, picked by the output path's extension. JSON escaping
//! matches Go's `encoding/json`, so `<`, `>` and `&` appear as `\u003c`,
//! `\u003e` and `\u0026` and regenerated files diff cleanly.

use crate::error::{Error, Result};
use crate::model::IncrementalSuite;
use crate::suite::Assembled;
use genco::prelude::*;
use std::path::Path;

/// Type the generated module's `tests` export is declared as
pub const SUITE_TYPE: &str = "SerializedIncrementalTestSuite";

/// Module the suite type is imported from
pub const SUITE_TYPE_MODULE: &str = "./tests.js";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    TypeScript,
}

impl OutputFormat {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("ts") => OutputFormat::TypeScript,
            _ => OutputFormat::Json,
        }
    }
}

pub fn to_json(suite: &IncrementalSuite, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(suite)?
    } else {
        serde_json::to_string(suite)?
    };
    Ok(escape_html(&json))
}

/// `export const tests` module preceded by a provenance comment
pub fn to_typescript(suite: &IncrementalSuite, provenance: &str, pretty: bool) -> Result<String> {
    let json = to_json(suite, pretty)?;
    let tokens: js::Tokens = quote! {
        $(format!("// Generated from cel-go {}", provenance))
        $(format!("import type {{ {} }} from '{}';", SUITE_TYPE, SUITE_TYPE_MODULE))
        $['\n']
        export const tests: $SUITE_TYPE = $json as const;
    };
    tokens
        .to_file_string()
        .map_err(|e| Error::Emit(format!("cannot format module: {}", e)))
}

pub fn render(assembled: &Assembled, format: OutputFormat, pretty: bool) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(&assembled.suite, pretty),
        OutputFormat::TypeScript => {
            to_typescript(&assembled.suite, &assembled.provenance, pretty)
        }
    }
}

/// Serialize the whole suite, then write it in one go
pub fn write_output(path: &Path, assembled: &Assembled, pretty: bool) -> Result<()> {
    let format = OutputFormat::for_path(path);
    let content = render(assembled, format, pretty)?;
    std::fs::write(path, content).map_err(|e| Error::Emit(e.to_string()))?;
    tracing::info!(
        path = %path.display(),
        format = ?format,
        tests = assembled.suite.test_count(),
        "wrote suite"
    );
    Ok(())
}

/// Same characters Go's encoder escapes inside strings. None of them can
/// appear in JSON outside a string.
fn escape_html(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IncrementalTest, Test};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn sample() -> Assembled {
        let mut test = IncrementalTest::new(Test::from_expr("a < b && c > d"));
        test.ty = Some("bool".into());
        let mut suite = IncrementalSuite::new("parsing");
        suite.tests.push(test);
        Assembled {
            suite,
            provenance: "github.com/google/cel-go@v0.22.0/parser/parser_test.go".into(),
        }
    }

    #[rstest]
    #[case("out/suite.ts", OutputFormat::TypeScript)]
    #[case("suite.json", OutputFormat::Json)]
    #[case("output", OutputFormat::Json)]
    #[case("suite.ts.json", OutputFormat::Json)]
    fn test_format_for_path(#[case] path: &str, #[case] expected: OutputFormat) {
        assert_eq!(OutputFormat::for_path(Path::new(path)), expected);
    }

    #[test]
    fn test_json_is_compact_and_escaped() {
        let json = to_json(&sample().suite, false).unwrap();
        assert_eq!(
            json,
            r#"{"name":"parsing","tests":[{"original":{"expr":"a \u003c b \u0026\u0026 c \u003e d"},"type":"bool"}]}"#
        );
        let back: IncrementalSuite = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample().suite);
    }

    #[test]
    fn test_pretty_json() {
        let json = to_json(&sample().suite, true).unwrap();
        assert!(json.starts_with("{\n  \"name\": \"parsing\""));
    }

    #[test]
    fn test_typescript_module() {
        let assembled = sample();
        let ts = render(&assembled, OutputFormat::TypeScript, false).unwrap();
        let mut lines = ts.lines();
        assert_eq!(
            lines.next(),
            Some("// Generated from cel-go github.com/google/cel-go@v0.22.0/parser/parser_test.go")
        );
        assert_eq!(
            lines.next(),
            Some("import type { SerializedIncrementalTestSuite } from './tests.js';")
        );
        let json = to_json(&assembled.suite, false).unwrap();
        assert!(ts.contains(&format!("{} as const;", json)), "{}", ts);
        assert!(ts.contains("export const tests"));
    }

    #[test]
    fn test_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing/out.json");
        let err = write_output(&path, &sample(), false).unwrap_err();
        assert!(err.to_string().starts_with("failed to write output: "));
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_output(&path, &sample(), false).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, to_json(&sample().suite, false).unwrap());
    }
}
