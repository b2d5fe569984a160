//! Lexical analysis: turns the raw input string into a sequence of tokens.
//!
//! The lexer is a cursor over the source bytes. Whitespace and `//` line
//! comments are skipped before every token, and two-character operators are
//! matched before their one-character prefixes. A character the lexer does not
//! recognise produces a terminal token at that position; the cursor makes no
//! further progress past it, so the parser sees an early end of input and
//! reports it.

use std::fmt;

use log::trace;

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Eof,
  Ident,
  Num,
  Str,
  // keywords
  Fn,
  Let,
  If,
  Else,
  While,
  Return,
  Struct,
  // punctuation
  LParen,
  RParen,
  LBrace,
  RBrace,
  LBracket,
  RBracket,
  Semi,
  Colon,
  Comma,
  Dot,
  // operators
  Plus,
  Minus,
  Star,
  Slash,
  Assign,
  EqEq,
  NotEq,
  Lt,
  Gt,
  Le,
  Ge,
  AndAnd,
  OrOr,
  Arrow,
}

impl TokenKind {
  fn keyword(text: &str) -> Option<Self> {
    let kind = match text {
      "fn" => Self::Fn,
      "let" => Self::Let,
      "if" => Self::If,
      "else" => Self::Else,
      "while" => Self::While,
      "return" => Self::Return,
      "struct" => Self::Struct,
      _ => return None,
    };
    Some(kind)
  }

  /// Short name used by the token dump and by "expected ..." diagnostics.
  pub fn name(self) -> &'static str {
    match self {
      Self::Eof => "EOF",
      Self::Ident => "identifier",
      Self::Num => "number",
      Self::Str => "string",
      Self::Fn => "fn",
      Self::Let => "let",
      Self::If => "if",
      Self::Else => "else",
      Self::While => "while",
      Self::Return => "return",
      Self::Struct => "struct",
      Self::LParen => "(",
      Self::RParen => ")",
      Self::LBrace => "{",
      Self::RBrace => "}",
      Self::LBracket => "[",
      Self::RBracket => "]",
      Self::Semi => ";",
      Self::Colon => ":",
      Self::Comma => ",",
      Self::Dot => ".",
      Self::Plus => "+",
      Self::Minus => "-",
      Self::Star => "*",
      Self::Slash => "/",
      Self::Assign => "=",
      Self::EqEq => "==",
      Self::NotEq => "!=",
      Self::Lt => "<",
      Self::Gt => ">",
      Self::Le => "<=",
      Self::Ge => ">=",
      Self::AndAnd => "&&",
      Self::OrOr => "||",
      Self::Arrow => "->",
    }
  }
}

impl fmt::Display for TokenKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

const TWO_CHAR_OPS: [(&str, TokenKind); 7] = [
  ("==", TokenKind::EqEq),
  ("!=", TokenKind::NotEq),
  ("<=", TokenKind::Le),
  (">=", TokenKind::Ge),
  ("&&", TokenKind::AndAnd),
  ("||", TokenKind::OrOr),
  ("->", TokenKind::Arrow),
];

fn single_char_op(c: u8) -> Option<TokenKind> {
  let kind = match c {
    b'(' => TokenKind::LParen,
    b')' => TokenKind::RParen,
    b'{' => TokenKind::LBrace,
    b'}' => TokenKind::RBrace,
    b'[' => TokenKind::LBracket,
    b']' => TokenKind::RBracket,
    b';' => TokenKind::Semi,
    b':' => TokenKind::Colon,
    b',' => TokenKind::Comma,
    b'.' => TokenKind::Dot,
    b'+' => TokenKind::Plus,
    b'-' => TokenKind::Minus,
    b'*' => TokenKind::Star,
    b'/' => TokenKind::Slash,
    b'=' => TokenKind::Assign,
    b'<' => TokenKind::Lt,
    b'>' => TokenKind::Gt,
    _ => return None,
  };
  Some(kind)
}

/// Thin wrapper for lexical information needed by later stages.
///
/// `loc` and `len` are byte offsets into the source; `line` and `column` are
/// 1-based and only used for diagnostics. Number tokens keep no parsed value:
/// their digits are carried as written through `token_text`.
#[derive(Debug, Clone)]
pub struct Token {
  pub kind: TokenKind,
  pub loc: usize,
  pub len: usize,
  pub line: usize,
  pub column: usize,
}

impl Token {
  /// A terminal token produced at the true end of input has zero length; one
  /// produced at an unrecognised character covers that character.
  pub fn is_lexical_dead_end(&self) -> bool {
    self.kind == TokenKind::Eof && self.len > 0
  }
}

/// Restartable cursor over the source text.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
  source: &'a str,
  pos: usize,
  line: usize,
  column: usize,
  finished: bool,
}

impl<'a> Lexer<'a> {
  pub fn new(source: &'a str) -> Self {
    Self {
      source,
      pos: 0,
      line: 1,
      column: 1,
      finished: false,
    }
  }

  /// Reset the cursor to the start of the source.
  pub fn rewind(&mut self) {
    *self = Self::new(self.source);
  }

  /// Produce the next token and advance the cursor past it.
  ///
  /// Once the terminal token has been produced, every further call returns a
  /// terminal token at the same position.
  pub fn next_token(&mut self) -> Token {
    self.skip_trivia();

    let bytes = self.source.as_bytes();
    let start = self.pos;
    let line = self.line;
    let column = self.column;
    let make = |kind, end: usize| Token {
      kind,
      loc: start,
      len: end - start,
      line,
      column,
    };

    let Some(&c) = bytes.get(start) else {
      return make(TokenKind::Eof, start);
    };

    if c.is_ascii_alphabetic() || c == b'_' {
      let end = self.scan_while(start + 1, |b| b.is_ascii_alphanumeric() || b == b'_');
      let kind = TokenKind::keyword(&self.source[start..end]).unwrap_or(TokenKind::Ident);
      self.advance_to(end);
      return make(kind, end);
    }

    if c.is_ascii_digit() {
      let end = self.scan_while(start + 1, |b| b.is_ascii_digit());
      self.advance_to(end);
      return make(TokenKind::Num, end);
    }

    if c == b'"' {
      let mut end = start + 1;
      while end < bytes.len() && bytes[end] != b'"' {
        if bytes[end] == b'\\' {
          end += 1;
        }
        end += 1;
      }
      let end = if end < bytes.len() { end + 1 } else { bytes.len() };
      self.advance_to(end);
      return make(TokenKind::Str, end);
    }

    if let Some((op, kind)) = TWO_CHAR_OPS
      .into_iter()
      .find(|(op, _)| self.source[start..].starts_with(op))
    {
      let end = start + op.len();
      self.advance_to(end);
      return make(kind, end);
    }

    if let Some(kind) = single_char_op(c) {
      self.advance_to(start + 1);
      return make(kind, start + 1);
    }

    // Dead end: the cursor stays put and the token spans the bad character.
    let width = self.source[start..].chars().next().map_or(1, char::len_utf8);
    self.finished = true;
    make(TokenKind::Eof, start + width)
  }

  fn skip_trivia(&mut self) {
    if self.finished {
      return;
    }
    let bytes = self.source.as_bytes();
    loop {
      match bytes.get(self.pos) {
        Some(b' ' | b'\t' | b'\r' | b'\n') => self.advance_to(self.pos + 1),
        Some(b'/') if bytes.get(self.pos + 1) == Some(&b'/') => {
          let end = self.scan_while(self.pos, |b| b != b'\n');
          self.advance_to(end);
        }
        _ => break,
      }
    }
  }

  fn scan_while(&self, from: usize, pred: impl Fn(u8) -> bool) -> usize {
    let bytes = self.source.as_bytes();
    let mut end = from;
    while end < bytes.len() && pred(bytes[end]) {
      end += 1;
    }
    end
  }

  /// Move the cursor to `end`, keeping line and column in step. Columns count
  /// characters, so UTF-8 continuation bytes do not advance them.
  fn advance_to(&mut self, end: usize) {
    for &b in &self.source.as_bytes()[self.pos..end] {
      if b == b'\n' {
        self.line += 1;
        self.column = 1;
      } else if b & 0xC0 != 0x80 {
        self.column += 1;
      }
    }
    self.pos = end;
  }
}

impl Iterator for Lexer<'_> {
  type Item = Token;

  /// Yields every token up to and including the terminal one, then stops.
  fn next(&mut self) -> Option<Self::Item> {
    if self.finished && self.pos >= self.source.len() {
      return None;
    }
    let token = self.next_token();
    if token.kind == TokenKind::Eof {
      self.finished = true;
      // park the cursor at the end so iteration terminates
      self.pos = self.source.len();
    }
    Some(token)
  }
}

/// Lex the input into a flat vector of tokens terminated by an `Eof` marker.
pub fn tokenize(input: &str) -> Vec<Token> {
  let mut tokens = Vec::new();
  for token in Lexer::new(input) {
    trace!(
      "token {} {:?} @ {}:{}",
      token.kind,
      token_text(&token, input),
      token.line,
      token.column
    );
    tokens.push(token);
  }
  tokens
}

/// Return the slice from the source that produced this token.
pub fn token_text<'a>(token: &Token, source: &'a str) -> &'a str {
  let end = token.loc + token.len;
  &source[token.loc..end]
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: Option<&Token>, source: &str) -> String {
  match token {
    Some(t) => match t.kind {
      TokenKind::Eof if t.len == 0 => "EOF".to_string(),
      _ => token_text(t, source).to_string(),
    },
    None => "EOF".to_string(),
  }
}
