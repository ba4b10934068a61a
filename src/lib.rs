// Production-quality lints
#![warn(
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![deny(clippy::mem_forget)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! # celgen
//!
//! Generates incremental CEL test fixtures. Each upstream test expression
//! is parsed, macro-expanded and type-checked, and the intermediate results
//! are recorded next to the original test so a CEL implementation can be
//! brought up one stage at a time.
//!
//! ## Inputs
//!
//! - a directory of conformance `SimpleTestFile` JSON documents
//! - `parser/parser_test.go` or `ext/comprehensions_test.go` from the
//!   cel-go version pinned in a `go.mod`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use celgen::{Assembler, Environments, GeneratorConfig, emit};
//! use std::path::Path;
//!
//! let config = GeneratorConfig::default();
//! let envs = Environments::new(&config)?;
//! let assembled = Assembler::new(&envs, config.parallel)
//!     .assemble(Path::new("testdata"), Path::new("go.mod"))?;
//! emit::write_output(Path::new("conformance.ts"), &assembled, config.pretty)?;
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! expr ──► parse (standard macros) ──► ast: annotated debug string
//!              │
//!              └─► derive env (container, typeEnv) ──► compile ──► type | error
//! ```

pub mod cel;
pub mod config;
pub mod emit;
pub mod error;
pub mod extract;
pub mod model;
pub mod pipeline;
pub mod suite;
pub mod upstream;

// Re-exports
pub use config::GeneratorConfig;
pub use emit::{write_output, OutputFormat};
pub use error::{Error, Result};
pub use extract::{extractor_for, Extractor, GoSource};
pub use model::{IncrementalSuite, IncrementalTest, SimpleTestFile, Test};
pub use pipeline::Environments;
pub use suite::{Assembled, Assembler};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
