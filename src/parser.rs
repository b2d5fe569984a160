//! Recursive-descent parser producing the program AST.
//!
//! Expression parsing climbs a fixed ladder, tightest first: postfix
//! (`[index]`, `.field`), multiplicative, additive, comparison. `&&` and `||`
//! are lexed but have no rung, so they surface as an unexpected token.
//!
//! After an identifier, one token of lookahead picks between a struct
//! literal (`{`), a call (`(`), an assignment (`=`) and a plain reference.
//! The first violated expectation aborts the parse; there is no recovery.

use log::debug;

use crate::ast::{
  BinaryOp, Block, CompareOp, Expr, FieldDecl, Function, Item, Param, Program, Stmt, StructDef,
};
use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Token, TokenKind, describe_token, token_text};

/// Parse a whole program from the token stream.
pub fn parse(tokens: Vec<Token>, source: &str) -> CompileResult<Program> {
  let mut stream = TokenStream::new(tokens, source);
  let mut items = Vec::new();

  while !stream.is_eof() {
    if stream.check(TokenKind::Struct) {
      items.push(Item::Struct(parse_struct_def(&mut stream)?));
    } else {
      items.push(Item::Function(parse_function(&mut stream)?));
    }
  }

  // A terminal token that is not at the true end came from a character the
  // lexer could not classify.
  if stream.peek().is_some_and(Token::is_lexical_dead_end) {
    return Err(stream.unexpected("a declaration"));
  }

  debug!("parsed {} top-level item(s)", items.len());
  Ok(Program { items })
}

fn parse_struct_def(stream: &mut TokenStream) -> CompileResult<StructDef> {
  stream.skip(TokenKind::Struct)?;
  let name = stream.get_ident()?;
  stream.skip(TokenKind::LBrace)?;

  let mut fields = Vec::new();
  while !stream.check(TokenKind::RBrace) {
    let field = stream.get_ident()?;
    stream.skip(TokenKind::Colon)?;
    let ty = stream.get_ident()?;
    fields.push(FieldDecl { name: field, ty });
    stream.skip_separator(TokenKind::RBrace)?;
  }
  stream.skip(TokenKind::RBrace)?;

  Ok(StructDef { name, fields })
}

fn parse_function(stream: &mut TokenStream) -> CompileResult<Function> {
  stream.skip(TokenKind::Fn)?;
  let name = stream.get_ident()?;
  stream.skip(TokenKind::LParen)?;

  let mut params = Vec::new();
  while !stream.check(TokenKind::RParen) {
    let param = stream.get_ident()?;
    let ty = if stream.equal(TokenKind::Colon) {
      Some(stream.get_ident()?)
    } else {
      None
    };
    params.push(Param { name: param, ty });
    stream.skip_separator(TokenKind::RParen)?;
  }
  stream.skip(TokenKind::RParen)?;

  let ret = if stream.equal(TokenKind::Arrow) {
    Some(stream.get_ident()?)
  } else {
    None
  };

  let body = parse_block(stream)?;
  Ok(Function {
    name,
    params,
    ret,
    body,
  })
}

fn parse_block(stream: &mut TokenStream) -> CompileResult<Block> {
  stream.skip(TokenKind::LBrace)?;
  let mut stmts = Vec::new();
  while !stream.check(TokenKind::RBrace) && !stream.is_eof() {
    stmts.push(parse_stmt(stream)?);
  }
  stream.skip(TokenKind::RBrace)?;
  Ok(Block { stmts })
}

fn parse_stmt(stream: &mut TokenStream) -> CompileResult<Stmt> {
  if stream.equal(TokenKind::Return) {
    let value = if stream.check(TokenKind::Semi) {
      None
    } else {
      Some(parse_expr(stream)?)
    };
    stream.skip(TokenKind::Semi)?;
    return Ok(Stmt::Return(value));
  }

  if stream.equal(TokenKind::Let) {
    let name = stream.get_ident()?;
    let ty = if stream.equal(TokenKind::Colon) {
      Some(stream.get_ident()?)
    } else {
      None
    };
    let init = if stream.equal(TokenKind::Assign) {
      Some(parse_expr(stream)?)
    } else {
      None
    };
    stream.skip(TokenKind::Semi)?;
    return Ok(Stmt::Let { name, ty, init });
  }

  if stream.equal(TokenKind::If) {
    let cond = parse_condition(stream)?;
    let then = parse_block(stream)?;
    let els = if stream.equal(TokenKind::Else) {
      Some(parse_block(stream)?)
    } else {
      None
    };
    return Ok(Stmt::If { cond, then, els });
  }

  if stream.equal(TokenKind::While) {
    let cond = parse_condition(stream)?;
    let body = parse_block(stream)?;
    return Ok(Stmt::While { cond, body });
  }

  let expr = parse_expr(stream)?;
  stream.skip(TokenKind::Semi)?;
  Ok(Stmt::Expr(expr))
}

fn parse_condition(stream: &mut TokenStream) -> CompileResult<Expr> {
  stream.skip(TokenKind::LParen)?;
  let cond = parse_expr(stream)?;
  stream.skip(TokenKind::RParen)?;
  Ok(cond)
}

fn parse_expr(stream: &mut TokenStream) -> CompileResult<Expr> {
  parse_comparison(stream)
}

fn parse_comparison(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_additive(stream)?;

  loop {
    let op = match stream.peek_kind() {
      TokenKind::EqEq => CompareOp::Eq,
      TokenKind::NotEq => CompareOp::Ne,
      TokenKind::Lt => CompareOp::Lt,
      TokenKind::Gt => CompareOp::Gt,
      TokenKind::Le => CompareOp::Le,
      TokenKind::Ge => CompareOp::Ge,
      _ => break,
    };
    stream.advance();
    let rhs = parse_additive(stream)?;
    node = Expr::compare(op, node, rhs);
  }

  Ok(node)
}

fn parse_additive(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_multiplicative(stream)?;

  loop {
    let op = match stream.peek_kind() {
      TokenKind::Plus => BinaryOp::Add,
      TokenKind::Minus => BinaryOp::Sub,
      _ => break,
    };
    stream.advance();
    let rhs = parse_multiplicative(stream)?;
    node = Expr::binary(op, node, rhs);
  }

  Ok(node)
}

fn parse_multiplicative(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_postfix(stream)?;

  loop {
    let op = match stream.peek_kind() {
      TokenKind::Star => BinaryOp::Mul,
      TokenKind::Slash => BinaryOp::Div,
      _ => break,
    };
    stream.advance();
    let rhs = parse_postfix(stream)?;
    node = Expr::binary(op, node, rhs);
  }

  Ok(node)
}

fn parse_postfix(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_primary(stream)?;

  loop {
    if stream.equal(TokenKind::LBracket) {
      let index = parse_expr(stream)?;
      stream.skip(TokenKind::RBracket)?;
      node = Expr::Index {
        base: Box::new(node),
        index: Box::new(index),
      };
    } else if stream.equal(TokenKind::Dot) {
      let field = stream.get_ident()?;
      node = Expr::Field {
        base: Box::new(node),
        field,
      };
    } else {
      return Ok(node);
    }
  }
}

fn parse_primary(stream: &mut TokenStream) -> CompileResult<Expr> {
  match stream.peek_kind() {
    TokenKind::Num => {
      let digits = stream.get_number()?;
      Ok(Expr::Number(digits))
    }
    TokenKind::Str => {
      let text = stream.get_string()?;
      Ok(Expr::Str(text))
    }
    TokenKind::LBracket => {
      stream.advance();
      let elems = parse_list(stream, TokenKind::RBracket)?;
      Ok(Expr::Array(elems))
    }
    TokenKind::Ident => {
      let name = stream.get_ident()?;
      parse_ident_suffix(stream, name)
    }
    TokenKind::LParen => {
      stream.advance();
      let node = parse_expr(stream)?;
      stream.skip(TokenKind::RParen)?;
      Ok(node)
    }
    _ => Err(stream.unexpected("an expression")),
  }
}

/// Decide what an identifier starts from the single token after it.
fn parse_ident_suffix(stream: &mut TokenStream, name: String) -> CompileResult<Expr> {
  if stream.equal(TokenKind::LBrace) {
    let mut fields = Vec::new();
    while !stream.check(TokenKind::RBrace) {
      let field = stream.get_ident()?;
      stream.skip(TokenKind::Colon)?;
      let value = parse_expr(stream)?;
      fields.push((field, value));
      stream.skip_separator(TokenKind::RBrace)?;
    }
    stream.skip(TokenKind::RBrace)?;
    return Ok(Expr::StructLit { ty: name, fields });
  }

  if stream.equal(TokenKind::LParen) {
    let args = parse_list(stream, TokenKind::RParen)?;
    return Ok(Expr::Call { name, args });
  }

  if stream.equal(TokenKind::Assign) {
    let value = parse_expr(stream)?;
    return Ok(Expr::Assign {
      name,
      value: Box::new(value),
    });
  }

  Ok(Expr::Ident(name))
}

/// Comma-separated expressions up to and including `close`; a trailing comma
/// is allowed.
fn parse_list(stream: &mut TokenStream, close: TokenKind) -> CompileResult<Vec<Expr>> {
  let mut elems = Vec::new();
  while !stream.check(close) {
    elems.push(parse_expr(stream)?);
    stream.skip_separator(close)?;
  }
  stream.skip(close)?;
  Ok(elems)
}

/// Lightweight cursor over the token vector.
struct TokenStream<'a> {
  tokens: Vec<Token>,
  source: &'a str,
  pos: usize,
}

impl<'a> TokenStream<'a> {
  /// Take ownership of the token stream; the parser will advance `pos` as it consumes input.
  fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    Self {
      tokens,
      source,
      pos: 0,
    }
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn peek_kind(&self) -> TokenKind {
    self.peek().map_or(TokenKind::Eof, |token| token.kind)
  }

  fn check(&self, kind: TokenKind) -> bool {
    self.peek_kind() == kind
  }

  fn advance(&mut self) {
    if self.pos < self.tokens.len() {
      self.pos += 1;
    }
  }

  /// Consume the current token if it has the given kind.
  fn equal(&mut self, kind: TokenKind) -> bool {
    if self.check(kind) && kind != TokenKind::Eof {
      self.pos += 1;
      return true;
    }
    false
  }

  fn skip(&mut self, kind: TokenKind) -> CompileResult<()> {
    if self.equal(kind) {
      Ok(())
    } else {
      Err(self.unexpected(&format!("\"{kind}\"")))
    }
  }

  /// Inside a delimited list, a comma is required unless the closing token
  /// comes next.
  fn skip_separator(&mut self, close: TokenKind) -> CompileResult<()> {
    if self.check(close) {
      Ok(())
    } else {
      self.skip(TokenKind::Comma)
    }
  }

  fn get_ident(&mut self) -> CompileResult<String> {
    match self.peek() {
      Some(token) if token.kind == TokenKind::Ident => {
        let name = token_text(token, self.source).to_string();
        self.pos += 1;
        Ok(name)
      }
      _ => Err(self.unexpected("an identifier")),
    }
  }

  /// Digits of the current integer literal, exactly as written.
  fn get_number(&mut self) -> CompileResult<String> {
    match self.peek() {
      Some(token) if token.kind == TokenKind::Num => {
        let digits = token_text(token, self.source).to_string();
        self.pos += 1;
        Ok(digits)
      }
      _ => Err(self.unexpected("a number")),
    }
  }

  /// Body of a string literal: everything after the opening quote, minus the
  /// closing quote when there is one.
  fn get_string(&mut self) -> CompileResult<String> {
    match self.peek() {
      Some(token) if token.kind == TokenKind::Str => {
        let text = token_text(token, self.source);
        let body = &text[1..];
        let body = if body.is_empty() {
          body
        } else {
          body.strip_suffix('"').unwrap_or(body)
        };
        let body = body.to_string();
        self.pos += 1;
        Ok(body)
      }
      _ => Err(self.unexpected("a string")),
    }
  }

  fn is_eof(&self) -> bool {
    self.check(TokenKind::Eof)
  }

  /// Build the diagnostic for the current token not being `expected`.
  fn unexpected(&self, expected: &str) -> CompileError {
    let Some(token) = self.peek() else {
      return CompileError::at(
        self.source,
        self.source.len(),
        format!("expected {expected}, but reached end of input"),
      );
    };
    let got = describe_token(Some(token), self.source);
    let message = if token.is_lexical_dead_end() {
      format!("unexpected character '{got}'")
    } else {
      format!("expected {expected}, but got \"{got}\"")
    };
    CompileError::at(self.source, token.loc, message)
  }
}
