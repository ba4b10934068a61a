//! A CEL front end: parser, macro expansion, debug rendering and a type
//! checker, with declarations for the standard and extension libraries.

pub mod ast;
pub mod block;
pub mod checker;
pub mod debug;
pub mod decls;
pub mod env;
pub mod issues;
pub mod lexer;
pub mod literal;
pub mod macros;
pub mod parser;
pub mod registry;
pub mod source;
pub mod stdlib;
pub mod types;

use block::BlockLibrary;
use env::Env;
use registry::TypeRegistry;
use std::sync::Arc;
use stdlib::{
    BindingsLibrary, EncodersLibrary, MathLibrary, OptionalLibrary, ProtosLibrary,
    StandardLibrary, StringsLibrary,
};

/// Environment every test is checked against: the standard library and
/// the extension libraries, `block_indices` `@indexN` variables, and no
/// standard macros.
pub fn base_env(types: Arc<TypeRegistry>, block_indices: usize) -> Result<Env, String> {
    Env::builder(types)
        .library(&StandardLibrary)
        .library(&OptionalLibrary)
        .library(&BindingsLibrary)
        .library(&EncodersLibrary)
        .library(&MathLibrary)
        .library(&ProtosLibrary)
        .library(&StringsLibrary)
        .library(&BlockLibrary {
            indices: block_indices,
        })
        .build()
}
