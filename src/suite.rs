//! Suite assembly
//!
//! A directory of conformance `SimpleTestFile` JSON documents becomes a
//! `conformance` suite with one child per file and one grandchild per
//! section. A single cel-go source file becomes a flat suite named after
//! its extractor. Either way, order follows the input.

use crate::error::{Error, Result};
use crate::extract::{extractor_for, GoSource};
use crate::model::{IncrementalSuite, IncrementalTest, SimpleTestFile, Test};
use crate::pipeline::Environments;
use crate::upstream::{self, UpstreamFile};
use rayon::prelude::*;
use std::path::Path;

pub const CONFORMANCE_SUITE: &str = "conformance";

/// A finished suite and a description of where its tests came from
#[derive(Debug, Clone, PartialEq)]
pub struct Assembled {
    pub suite: IncrementalSuite,
    pub provenance: String,
}

pub struct Assembler<'a> {
    envs: &'a Environments,
    parallel: bool,
}

impl<'a> Assembler<'a> {
    pub fn new(envs: &'a Environments, parallel: bool) -> Self {
        Self { envs, parallel }
    }

    /// Build the suite for `source`: a directory of JSON test files, or a
    /// path inside the cel-go module pinned by `go_mod`
    pub fn assemble(&self, source: &Path, go_mod: &Path) -> Result<Assembled> {
        if source.is_dir() {
            let suite = self.from_directory(source)?;
            return Ok(Assembled {
                suite,
                provenance: source.display().to_string(),
            });
        }

        let path = source.to_string_lossy();
        if extractor_for(&path).is_none() {
            return Err(Error::UnknownShape(path.into_owned()));
        }
        let file = upstream::read_cel_go_file(go_mod, &path)?;
        let suite = self.from_go_source(&path, &file)?;
        Ok(Assembled {
            suite,
            provenance: file.provenance,
        })
    }

    pub fn from_directory(&self, dir: &Path) -> Result<IncrementalSuite> {
        let mut names: Vec<String> = std::fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<_>>()?;
        names.sort();

        let mut suite = IncrementalSuite::new(CONFORMANCE_SUITE);
        for name in names.iter().filter(|n| n.ends_with(".json")) {
            let path = dir.join(name);
            let content = std::fs::read_to_string(&path)?;
            let file: SimpleTestFile =
                serde_json::from_str(&content).map_err(|source| Error::TestFile {
                    path: path.display().to_string(),
                    source,
                })?;
            suite.suites.push(self.file_suite(file));
        }
        tracing::info!(
            files = suite.suites.len(),
            tests = suite.test_count(),
            "assembled conformance suite"
        );
        Ok(suite)
    }

    fn file_suite(&self, file: SimpleTestFile) -> IncrementalSuite {
        let mut file_suite = IncrementalSuite::new(file.name);
        for section in file.section {
            let mut section_suite = IncrementalSuite::new(section.name.clone());
            section_suite.tests = self.compile_all(section.test);
            for test in &mut section_suite.tests {
                test.section = Some(section.name.clone());
            }
            file_suite.suites.push(section_suite);
        }
        tracing::info!(
            file = %file_suite.name,
            tests = file_suite.test_count(),
            "compiled test file"
        );
        file_suite
    }

    /// Extract and compile the tests of one upstream Go file
    pub fn from_go_source(&self, path: &str, file: &UpstreamFile) -> Result<IncrementalSuite> {
        let extractor = extractor_for(path).ok_or_else(|| Error::UnknownShape(path.to_string()))?;
        let source = GoSource::parse(file.text.as_str())?;
        let tests = extractor.extract(&source)?;

        let mut suite = IncrementalSuite::new(extractor.suite_name());
        suite.tests = self.compile_all(tests);
        tracing::info!(
            suite = %suite.name,
            tests = suite.tests.len(),
            source = %file.provenance,
            "assembled extracted suite"
        );
        Ok(suite)
    }

    fn compile_all(&self, tests: Vec<Test>) -> Vec<IncrementalTest> {
        if self.parallel {
            tests
                .into_par_iter()
                .map(|t| self.envs.compile(t))
                .collect()
        } else {
            tests.into_iter().map(|t| self.envs.compile(t)).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::sync::LazyLock;

    static ENVS: LazyLock<Environments> =
        LazyLock::new(|| Environments::new(&GeneratorConfig::default()).unwrap());

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let suite = Assembler::new(&ENVS, false).from_directory(dir.path()).unwrap();
        assert_eq!(suite, IncrementalSuite::new("conformance"));
    }

    #[test]
    fn test_directory_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("b.json"),
            r#"{"name":"b","section":[{"name":"s1","test":[{"name":"t","expr":"1u"}]}]}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("a.json"),
            r#"{"name":"a","section":[{"name":"s","test":[{"expr":"'x'"},{"expr":"2.0"}]}]}"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let suite = Assembler::new(&ENVS, false).from_directory(dir.path()).unwrap();
        let files: Vec<_> = suite.suites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(files, vec!["a", "b"]);

        let section = &suite.suites[0].suites[0];
        assert_eq!(section.name, "s");
        let types: Vec<_> = section.tests.iter().map(|t| t.ty.as_deref()).collect();
        assert_eq!(types, vec![Some("string"), Some("double")]);
        assert_eq!(section.tests[0].section.as_deref(), Some("s"));
        assert_eq!(suite.test_count(), 3);
    }

    #[test]
    fn test_malformed_json_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), "{").unwrap();
        let err = Assembler::new(&ENVS, false)
            .from_directory(dir.path())
            .unwrap_err();
        assert!(matches!(err, Error::TestFile { .. }), "{}", err);
    }

    #[test]
    fn test_parallel_keeps_order() {
        let exprs: Vec<String> = (0..64).map(|i| format!("{} + 1", i)).collect();
        let tests: Vec<Test> = exprs.iter().map(Test::from_expr).collect();
        let compiled = Assembler::new(&ENVS, true).compile_all(tests);
        let seen: Vec<_> = compiled.iter().map(|t| t.original.expr.clone()).collect();
        assert_eq!(seen, exprs);
    }

    #[test]
    fn test_unknown_shape() {
        let err = Assembler::new(&ENVS, false)
            .assemble(Path::new("checker/checker_test.go"), Path::new("go.mod"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "do not know what to extract from checker/checker_test.go"
        );
    }

    #[test]
    fn test_go_source_suite() {
        let file = UpstreamFile {
            provenance: "github.com/google/cel-go@v0/parser/parser_test.go".into(),
            text: "package parser\nvar testCases = []testInfo{{I: `a.b`}, {I: \"1 +\"}}\n".into(),
        };
        let suite = Assembler::new(&ENVS, false)
            .from_go_source("parser/parser_test.go", &file)
            .unwrap();
        assert_eq!(suite.name, "parsing");
        assert!(suite.suites.is_empty());
        assert_eq!(suite.tests.len(), 2);
        assert!(suite.tests[0].ast.is_some());
        assert!(suite.tests[1].ast.is_none());
        assert!(suite.tests[1].error.is_some());
    }
}
