//! The compilation pipeline, end to end.
//!
//! source text -> `tokenizer` -> tokens -> `parser` -> AST -> `codegen` -> NASM text
//!
//! - `tokenizer` turns source text into positioned tokens.
//! - `parser` owns all syntactic knowledge and returns the program AST.
//! - `ty` holds struct layouts, collected in a pre-pass over the AST.
//! - `symbols` and `strings` are the per-function slot table and the data
//!   section table filled in during generation.
//! - `codegen` lowers the AST into x86-64 assembly text.
//! - `error` renders fatal diagnostics with a caret under the source line.
//!
//! Syntax errors are fatal and reported with their source position. Unknown
//! names and fields are not errors: they degrade to zero values or comments
//! in the emitted text.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod parser;
pub mod strings;
pub mod symbols;
pub mod tokenizer;
pub mod ty;

use log::debug;

pub use codegen::Assembly;
pub use error::{CompileError, CompileResult};

/// Lex and parse a source string.
pub fn parse_source(source: &str) -> CompileResult<ast::Program> {
  let tokens = tokenizer::tokenize(source);
  debug!("lexed {} token(s)", tokens.len());
  parser::parse(tokens, source)
}

/// Run the whole pipeline, keeping the tables built along the way.
pub fn compile(source: &str) -> CompileResult<Assembly> {
  let program = parse_source(source)?;
  Ok(codegen::generate(&program))
}

/// Compile a source string into NASM assembly text.
pub fn generate_assembly(source: &str) -> CompileResult<String> {
  compile(source).map(|asm| asm.text)
}
