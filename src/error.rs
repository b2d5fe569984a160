//! Shared error utilities used across the compilation pipeline.
//!
//! Diagnostics are fatal: the first one raised aborts the whole compilation.
//! Each error carries the 1-based position of the offending byte together
//! with the source line it sits on and a caret pointing at it.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
pub enum CompileError {
  #[snafu(display("line {line}, column {column}: {message}\n{source_line}\n{marker}"))]
  WithLocation {
    line: usize,
    column: usize,
    source_line: String,
    marker: String,
    message: String,
  },
}

impl CompileError {
  /// Construct an error anchored at a specific byte offset in the source.
  pub fn at(source: &str, loc: usize, message: impl Into<String>) -> Self {
    let mut safe_loc = loc.min(source.len());
    while !source.is_char_boundary(safe_loc) {
      safe_loc -= 1;
    }
    let line_start = source[..safe_loc].rfind('\n').map_or(0, |i| i + 1);
    let line_end = source[safe_loc..]
      .find('\n')
      .map_or(source.len(), |i| safe_loc + i);
    let line = source[..line_start].matches('\n').count() + 1;
    let column = source[line_start..safe_loc].chars().count() + 1;
    let source_line = source[line_start..line_end].trim_end_matches('\r').to_string();
    let marker = format!("{}^", " ".repeat(column - 1));
    Self::WithLocation {
      line,
      column,
      source_line,
      marker,
      message: message.into(),
    }
  }

  /// 1-based line of the offending token.
  pub fn line(&self) -> usize {
    match self {
      Self::WithLocation { line, .. } => *line,
    }
  }

  /// 1-based column of the offending token.
  pub fn column(&self) -> usize {
    match self {
      Self::WithLocation { column, .. } => *column,
    }
  }

  pub fn message(&self) -> &str {
    match self {
      Self::WithLocation { message, .. } => message,
    }
  }
}
