//! Error types for celgen
//!
//! Only fatal errors live here. Problems with an individual test expression
//! (syntax errors, macro argument errors, type-check issues) are recorded on
//! the test itself and never abort a run.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal celgen errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to parse source: {0}")]
    Upstream(String),

    #[error("failed to parse source: {0}")]
    SourceParse(String),

    #[error("failed to extract expressions: {0}")]
    Extract(String),

    #[error("do not know what to extract from {0}")]
    UnknownShape(String),

    #[error("failed to unmarshal file {path}: {source}")]
    TestFile {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid environment: {0}")]
    Environment(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("failed to write output: {0}")]
    Emit(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}
