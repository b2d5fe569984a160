//! Abstract syntax tree produced by the parser.
//!
//! The tree is strictly owned: every node belongs to exactly one parent and
//! the `Program` root owns the top-level items. Code generation only reads it.

use std::fmt;

/// Arithmetic operators, split from comparisons because they lower
/// differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
  Eq,
  Ne,
  Lt,
  Gt,
  Le,
  Ge,
}

impl BinaryOp {
  pub fn symbol(self) -> &'static str {
    match self {
      Self::Add => "+",
      Self::Sub => "-",
      Self::Mul => "*",
      Self::Div => "/",
    }
  }
}

impl CompareOp {
  pub fn symbol(self) -> &'static str {
    match self {
      Self::Eq => "==",
      Self::Ne => "!=",
      Self::Lt => "<",
      Self::Gt => ">",
      Self::Le => "<=",
      Self::Ge => ">=",
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
  pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
  Struct(StructDef),
  Function(Function),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
  pub name: String,
  pub fields: Vec<FieldDecl>,
}

/// A declared struct field. The type annotation is kept for the dump only;
/// every field occupies one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
  pub name: String,
  pub ty: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
  pub name: String,
  pub params: Vec<Param>,
  pub ret: Option<String>,
  pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
  pub name: String,
  pub ty: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
  pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
  Return(Option<Expr>),
  Let {
    name: String,
    ty: Option<String>,
    init: Option<Expr>,
  },
  If {
    cond: Expr,
    then: Block,
    els: Option<Block>,
  },
  While {
    cond: Expr,
    body: Block,
  },
  Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  /// Decimal digits as written. The value is not range-checked; the
  /// assembler sees the same digits.
  Number(String),
  /// Raw bytes between the quotes; escapes are not interpreted.
  Str(String),
  Ident(String),
  Assign {
    name: String,
    value: Box<Expr>,
  },
  Binary {
    op: BinaryOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  Compare {
    op: CompareOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  Call {
    name: String,
    args: Vec<Expr>,
  },
  Array(Vec<Expr>),
  Index {
    base: Box<Expr>,
    index: Box<Expr>,
  },
  StructLit {
    ty: String,
    fields: Vec<(String, Expr)>,
  },
  Field {
    base: Box<Expr>,
    field: String,
  },
}

impl Expr {
  pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
    Self::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }

  pub fn compare(op: CompareOp, lhs: Expr, rhs: Expr) -> Self {
    Self::Compare {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }

  /// Name of the variable this expression refers to, if it is a plain
  /// identifier. Indexing and field access only resolve through these.
  pub fn as_ident(&self) -> Option<&str> {
    match self {
      Self::Ident(name) => Some(name),
      _ => None,
    }
  }

  fn node_count(&self) -> usize {
    1 + match self {
      Self::Number(_) | Self::Str(_) | Self::Ident(_) => 0,
      Self::Assign { value, .. } => value.node_count(),
      Self::Binary { lhs, rhs, .. } | Self::Compare { lhs, rhs, .. } => {
        lhs.node_count() + rhs.node_count()
      }
      Self::Call { args, .. } | Self::Array(args) => args.iter().map(Expr::node_count).sum(),
      Self::Index { base, index } => base.node_count() + index.node_count(),
      // each initializer counts as a field node owning its value
      Self::StructLit { fields, .. } => fields.iter().map(|(_, e)| 1 + e.node_count()).sum(),
      Self::Field { base, .. } => base.node_count(),
    }
  }
}

impl Block {
  fn node_count(&self) -> usize {
    1 + self.stmts.iter().map(Stmt::node_count).sum::<usize>()
  }
}

impl Stmt {
  fn node_count(&self) -> usize {
    match self {
      Self::Return(value) => 1 + value.as_ref().map_or(0, Expr::node_count),
      Self::Let { init, .. } => 1 + init.as_ref().map_or(0, Expr::node_count),
      Self::If { cond, then, els } => {
        1 + cond.node_count() + then.node_count() + els.as_ref().map_or(0, Block::node_count)
      }
      Self::While { cond, body } => 1 + cond.node_count() + body.node_count(),
      Self::Expr(expr) => expr.node_count(),
    }
  }
}

impl Program {
  /// Total number of nodes in the tree, counting the root. Parameters and
  /// struct fields count as leaf nodes.
  pub fn node_count(&self) -> usize {
    1 + self
      .items
      .iter()
      .map(|item| match item {
        Item::Struct(def) => 1 + def.fields.len(),
        Item::Function(func) => 1 + func.params.len() + func.body.node_count(),
      })
      .sum::<usize>()
  }

  pub fn functions(&self) -> impl Iterator<Item = &Function> {
    self.items.iter().filter_map(|item| match item {
      Item::Function(func) => Some(func),
      Item::Struct(_) => None,
    })
  }

  pub fn structs(&self) -> impl Iterator<Item = &StructDef> {
    self.items.iter().filter_map(|item| match item {
      Item::Struct(def) => Some(def),
      Item::Function(_) => None,
    })
  }
}

// Indented tree dump used by `--emit ast`.

struct Dump<'a, T>(&'a T, usize);

fn pad(f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
  write!(f, "{:width$}", "", width = depth * 2)
}

impl fmt::Display for Program {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "Program")?;
    for item in &self.items {
      match item {
        Item::Struct(def) => {
          writeln!(f, "  StructDef {}", def.name)?;
          for field in &def.fields {
            writeln!(f, "    Field {}: {}", field.name, field.ty)?;
          }
        }
        Item::Function(func) => {
          write!(f, "  Function {}", func.name)?;
          if let Some(ret) = &func.ret {
            write!(f, " -> {ret}")?;
          }
          writeln!(f)?;
          for param in &func.params {
            match &param.ty {
              Some(ty) => writeln!(f, "    Param {}: {ty}", param.name)?,
              None => writeln!(f, "    Param {}", param.name)?,
            }
          }
          write!(f, "{}", Dump(&func.body, 2))?;
        }
      }
    }
    Ok(())
  }
}

impl fmt::Display for Dump<'_, Block> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let Dump(block, depth) = *self;
    pad(f, depth)?;
    writeln!(f, "Block")?;
    for stmt in &block.stmts {
      write!(f, "{}", Dump(stmt, depth + 1))?;
    }
    Ok(())
  }
}

impl fmt::Display for Dump<'_, Stmt> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let Dump(stmt, depth) = *self;
    match stmt {
      Stmt::Return(value) => {
        pad(f, depth)?;
        writeln!(f, "Return")?;
        if let Some(value) = value {
          write!(f, "{}", Dump(value, depth + 1))?;
        }
      }
      Stmt::Let { name, ty, init } => {
        pad(f, depth)?;
        match ty {
          Some(ty) => writeln!(f, "Let {name}: {ty}")?,
          None => writeln!(f, "Let {name}")?,
        }
        if let Some(init) = init {
          write!(f, "{}", Dump(init, depth + 1))?;
        }
      }
      Stmt::If { cond, then, els } => {
        pad(f, depth)?;
        writeln!(f, "If")?;
        write!(f, "{}", Dump(cond, depth + 1))?;
        write!(f, "{}", Dump(then, depth + 1))?;
        if let Some(els) = els {
          write!(f, "{}", Dump(els, depth + 1))?;
        }
      }
      Stmt::While { cond, body } => {
        pad(f, depth)?;
        writeln!(f, "While")?;
        write!(f, "{}", Dump(cond, depth + 1))?;
        write!(f, "{}", Dump(body, depth + 1))?;
      }
      Stmt::Expr(expr) => write!(f, "{}", Dump(expr, depth))?,
    }
    Ok(())
  }
}

impl fmt::Display for Dump<'_, Expr> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let Dump(expr, depth) = *self;
    pad(f, depth)?;
    match expr {
      Expr::Number(value) => writeln!(f, "Number {value}"),
      Expr::Str(text) => writeln!(f, "String {text:?}"),
      Expr::Ident(name) => writeln!(f, "Identifier {name}"),
      Expr::Assign { name, value } => {
        writeln!(f, "Assign {name}")?;
        write!(f, "{}", Dump(value.as_ref(), depth + 1))
      }
      Expr::Binary { op, lhs, rhs } => {
        writeln!(f, "BinaryOp {}", op.symbol())?;
        write!(f, "{}", Dump(lhs.as_ref(), depth + 1))?;
        write!(f, "{}", Dump(rhs.as_ref(), depth + 1))
      }
      Expr::Compare { op, lhs, rhs } => {
        writeln!(f, "Compare {}", op.symbol())?;
        write!(f, "{}", Dump(lhs.as_ref(), depth + 1))?;
        write!(f, "{}", Dump(rhs.as_ref(), depth + 1))
      }
      Expr::Call { name, args } => {
        writeln!(f, "Call {name}")?;
        args
          .iter()
          .try_for_each(|arg| write!(f, "{}", Dump(arg, depth + 1)))
      }
      Expr::Array(elems) => {
        writeln!(f, "ArrayLiteral [{}]", elems.len())?;
        elems
          .iter()
          .try_for_each(|elem| write!(f, "{}", Dump(elem, depth + 1)))
      }
      Expr::Index { base, index } => {
        writeln!(f, "Index")?;
        write!(f, "{}", Dump(base.as_ref(), depth + 1))?;
        write!(f, "{}", Dump(index.as_ref(), depth + 1))
      }
      Expr::StructLit { ty, fields } => {
        writeln!(f, "StructLiteral {ty}")?;
        for (name, value) in fields {
          pad(f, depth + 1)?;
          writeln!(f, "{name}:")?;
          write!(f, "{}", Dump(value, depth + 2))?;
        }
        Ok(())
      }
      Expr::Field { base, field } => {
        writeln!(f, "FieldAccess .{field}")?;
        write!(f, "{}", Dump(base.as_ref(), depth + 1))
      }
    }
  }
}
