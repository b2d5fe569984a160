use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use chronosc::tokenizer::{Lexer, TokenKind, token_text};
use chronosc::{CompileError, compile, parse_source};
use clap::{Parser, ValueEnum};
use log::{LevelFilter, error, info};
use snafu::{ResultExt, Snafu};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
  /// NASM assembly
  Asm,
  /// One token per line
  Tokens,
  /// Indented syntax tree
  Ast,
}

/// Compile a Chronos source file to x86-64 NASM assembly.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
  /// Source file
  input: PathBuf,

  /// Output file, `-` for stdout [default: input with an .asm extension]
  #[arg(short, long)]
  output: Option<PathBuf>,

  /// What to write
  #[arg(long, value_enum, default_value_t = Emit::Asm)]
  emit: Emit,

  /// Raise log verbosity (-v debug, -vv trace)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

#[derive(Debug, Snafu)]
enum CliError {
  #[snafu(display("cannot read {}: {source}", path.display()))]
  ReadSource { path: PathBuf, source: io::Error },

  #[snafu(display("cannot write {}: {source}", path.display()))]
  WriteOutput { path: PathBuf, source: io::Error },

  #[snafu(display("{}: {source}", path.display()))]
  Compile { path: PathBuf, source: CompileError },
}

fn dump_tokens(source: &str) -> String {
  let mut out = String::new();
  for token in Lexer::new(source) {
    let text = match token.kind {
      TokenKind::Eof if token.len == 0 => "",
      _ => token_text(&token, source),
    };
    out.push_str(&format!(
      "{:<10} '{}' @ {}:{}\n",
      token.kind.name(),
      text,
      token.line,
      token.column
    ));
  }
  out
}

fn run(args: &Args) -> Result<(), CliError> {
  let source = fs::read_to_string(&args.input).context(ReadSourceSnafu {
    path: args.input.clone(),
  })?;
  info!("compiling {}", args.input.display());

  let compiled = match args.emit {
    Emit::Asm => compile(&source).map(|asm| asm.text),
    Emit::Tokens => Ok(dump_tokens(&source)),
    Emit::Ast => parse_source(&source).map(|program| program.to_string()),
  };
  let text = compiled.context(CompileSnafu {
    path: args.input.clone(),
  })?;

  let output = args.output.clone().unwrap_or_else(|| match args.emit {
    Emit::Asm => args.input.with_extension("asm"),
    Emit::Tokens | Emit::Ast => PathBuf::from("-"),
  });

  if output.as_os_str() == "-" {
    io::stdout()
      .write_all(text.as_bytes())
      .context(WriteOutputSnafu { path: output })?;
  } else {
    fs::write(&output, text).context(WriteOutputSnafu {
      path: output.clone(),
    })?;
    info!("wrote {}", output.display());
  }
  Ok(())
}

fn main() {
  let args = Args::parse();

  let level = match args.verbose {
    0 => LevelFilter::Warn,
    1 => LevelFilter::Debug,
    _ => LevelFilter::Trace,
  };
  env_logger::Builder::new()
    .filter_level(level)
    .parse_default_env()
    .init();

  if let Err(err) = run(&args) {
    error!("compilation failed");
    eprintln!("{err}");
    process::exit(1);
  }
}
