//! Code generation: lower the parsed AST into x86-64 NASM assembly.
//!
//! The emitter uses an accumulator discipline: every expression leaves its
//! value in `rax`. Binary operators evaluate the left operand, park it on the
//! machine stack, evaluate the right operand, move it to `rbx` and pop the
//! left operand back, so evaluation is always left to right and nothing
//! short-circuits. String literals are the one exception to the single-value
//! rule: they yield the data address in `rax` and the byte length in `rbx`.
//!
//! Symbol, string and label state is filled in while the tree is walked.
//! Array and struct literals store their elements into the slots of the most
//! recently declared local, which only works because `let` allocates the
//! symbol immediately before the initializer is generated. Do not reorder
//! those two steps.

use log::debug;

use crate::ast::{BinaryOp, Block, CompareOp, Expr, Function, Program, Stmt};
use crate::strings::StringTable;
use crate::symbols::SymbolTable;
use crate::ty::{SLOT_SIZE, StructType, TypeTable};

/// Bytes reserved below the saved frame pointer for locals in every
/// function. Fixed rather than computed from the locals actually declared.
pub const FRAME_SIZE: i64 = 128;

/// Frame offset of the byte `println` uses to write its trailing newline.
pub const NEWLINE_SCRATCH: i64 = -256;

/// Integer argument registers of the System V calling convention.
pub const ARG_REGS: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];

pub const PRINT_INT: &str = "__print_int";

const SYS_WRITE: i64 = 1;
const SYS_EXIT: i64 = 60;
const STDOUT: i64 = 1;

/// Decimal printer shared by every `print_int` call. Takes the value in
/// `rax` and writes it one digit at a time, most significant first.
const PRINT_INT_HELPER: &str = "
__print_int:
    push rbp
    mov rbp, rsp
    sub rsp, 32
    mov rbx, rax
    test rbx, rbx
    jns .positive
    neg rbx
    push rbx
    mov byte [rbp-1], 45
    lea rsi, [rbp-1]
    mov rdi, 1
    mov rdx, 1
    mov rax, 1
    syscall
    pop rbx
.positive:
    lea rdi, [rbp-32]
    mov rax, rbx
    mov rcx, 10
.loop:
    xor rdx, rdx
    div rcx
    add dl, 48
    mov [rdi], dl
    inc rdi
    test rax, rax
    jnz .loop
    mov r8, rdi
    dec rdi
.print_loop:
    lea rax, [rbp-32]
    cmp rdi, rax
    jl .done
    push rdi
    mov rsi, rdi
    mov rdi, 1
    mov rdx, 1
    mov rax, 1
    syscall
    pop rdi
    dec rdi
    jmp .print_loop
.done:
    leave
    ret
";

/// Everything produced by one compilation.
#[derive(Debug)]
pub struct Assembly {
  /// Final text: header, data section, then the buffered text section.
  pub text: String,
  pub strings: StringTable,
  pub types: TypeTable,
  /// Number of `.L` labels allocated.
  pub labels: usize,
}

/// Emit assembly for a whole program.
pub fn generate(program: &Program) -> Assembly {
  let types = TypeTable::collect(program);
  let mut cg = CodeGen::new(&types);

  cg.emit_entry();
  cg.asm.push_str(PRINT_INT_HELPER);
  for func in program.functions() {
    cg.gen_function(func);
  }

  let CodeGen {
    asm, strings, labels, ..
  } = cg;

  let mut text = String::with_capacity(asm.len() + 256);
  text.push_str(&format!(
    "; chronosc {} - x86-64 NASM output\n\n",
    env!("CARGO_PKG_VERSION")
  ));
  text.push_str("section .data\n");
  for entry in strings.entries() {
    text.push_str(&format!("{}: db {}\n", entry.label, entry.db_operands()));
  }
  text.push_str(&asm);

  debug!(
    "generated {} bytes of assembly, {} string(s), {} label(s)",
    text.len(),
    strings.len(),
    labels
  );

  Assembly {
    text,
    strings,
    types,
    labels,
  }
}

/// `[rbp-8]`-style operand for a frame offset.
fn slot(offset: i64) -> String {
  format!("[rbp{offset:+}]")
}

struct CodeGen<'a> {
  asm: String,
  labels: usize,
  symbols: SymbolTable,
  strings: StringTable,
  types: &'a TypeTable,
}

impl<'a> CodeGen<'a> {
  fn new(types: &'a TypeTable) -> Self {
    Self {
      asm: String::new(),
      labels: 0,
      symbols: SymbolTable::new(),
      strings: StringTable::new(),
      types,
    }
  }

  fn inst(&mut self, text: &str) {
    self.asm.push_str("    ");
    self.asm.push_str(text);
    self.asm.push('\n');
  }

  fn label(&mut self, id: usize) {
    self.asm.push_str(&format!(".L{id}:\n"));
  }

  fn new_label(&mut self) -> usize {
    let id = self.labels;
    self.labels += 1;
    id
  }

  /// Process entry: run `main` and hand its result to `exit`.
  fn emit_entry(&mut self) {
    self.asm.push_str("\nsection .text\n    global _start\n\n_start:\n");
    self.inst("call main");
    self.inst("mov rdi, rax");
    self.inst(&format!("mov rax, {SYS_EXIT}"));
    self.inst("syscall");
  }

  fn gen_function(&mut self, func: &Function) {
    debug!("generating function {}", func.name);
    self.symbols = SymbolTable::new();

    self.asm.push_str(&format!("\n{}:\n", func.name));
    self.inst("push rbp");
    self.inst("mov rbp, rsp");

    for (param, reg) in func.params.iter().zip(ARG_REGS) {
      let offset = self.symbols.add(&param.name, 1);
      self.inst(&format!("mov {}, {reg}", slot(offset)));
    }
    if func.params.len() > ARG_REGS.len() {
      debug!(
        "function {}: parameters past the sixth are not bound",
        func.name
      );
    }

    self.inst(&format!("sub rsp, {FRAME_SIZE}"));
    for stmt in &func.body.stmts {
      self.gen_stmt(stmt);
    }

    // falling off the end returns 0
    self.inst("xor rax, rax");
    self.inst("leave");
    self.inst("ret");

    debug!(
      "function {}: {} local(s), {} byte(s) of stack",
      func.name,
      self.symbols.len(),
      self.symbols.stack_size()
    );
  }

  fn gen_block(&mut self, block: &Block) {
    for stmt in &block.stmts {
      self.gen_stmt(stmt);
    }
  }

  fn gen_stmt(&mut self, stmt: &Stmt) {
    match stmt {
      Stmt::Return(value) => {
        match value {
          Some(value) => self.gen_expr(value),
          None => self.inst("xor rax, rax"),
        }
        self.inst("leave");
        self.inst("ret");
      }
      Stmt::Let { name, init, .. } => self.gen_let(name, init.as_ref()),
      Stmt::If { cond, then, els } => {
        let else_label = self.new_label();
        let end_label = self.new_label();
        self.gen_expr(cond);
        self.inst("test rax, rax");
        self.inst(&format!("jz .L{else_label}"));
        self.gen_block(then);
        self.inst(&format!("jmp .L{end_label}"));
        self.label(else_label);
        if let Some(els) = els {
          self.gen_block(els);
        }
        self.label(end_label);
      }
      Stmt::While { cond, body } => {
        let start_label = self.new_label();
        let end_label = self.new_label();
        self.label(start_label);
        self.gen_expr(cond);
        self.inst("test rax, rax");
        self.inst(&format!("jz .L{end_label}"));
        self.gen_block(body);
        self.inst(&format!("jmp .L{start_label}"));
        self.label(end_label);
      }
      Stmt::Expr(expr @ (Expr::Call { .. } | Expr::Assign { .. })) => self.gen_expr(expr),
      Stmt::Expr(_) => debug!("expression statement without effect skipped"),
    }
  }

  /// Allocate the local first, then generate its initializer. Array and
  /// struct literals rely on this order to find their storage.
  fn gen_let(&mut self, name: &str, init: Option<&Expr>) {
    if let Some(init) = init
      && let Expr::StructLit { ty, .. } = init
      && let Some(slots) = self.types.lookup(ty).map(StructType::slots)
    {
      self.symbols.add_struct(name, ty, slots);
      self.gen_expr(init);
      return;
    }

    let slots = match init {
      Some(Expr::Array(elems)) => elems.len(),
      _ => 1,
    };
    let offset = self.symbols.add(name, slots);

    if let Some(init) = init {
      self.gen_expr(init);
      if !matches!(init, Expr::Array(_)) {
        self.inst(&format!("mov {}, rax", slot(offset)));
      }
    }
  }

  fn gen_expr(&mut self, expr: &Expr) {
    match expr {
      Expr::Number(value) => self.inst(&format!("mov rax, {value}")),
      Expr::Str(text) => {
        let entry = self.strings.add(text);
        let (label, len) = (entry.label.clone(), entry.len());
        self.inst(&format!("mov rax, {label}"));
        self.inst(&format!("mov rbx, {len}"));
      }
      Expr::Ident(name) => match self.symbols.lookup(name).map(|s| s.offset) {
        Some(offset) => self.inst(&format!("mov rax, {}", slot(offset))),
        None => {
          debug!("unknown variable {name} reads as 0");
          self.inst(&format!("mov rax, 0  ; unknown var {name}"));
        }
      },
      Expr::Assign { name, value } => {
        self.gen_expr(value);
        match self.symbols.lookup(name).map(|s| s.offset) {
          Some(offset) => self.inst(&format!("mov {}, rax", slot(offset))),
          None => debug!("assignment to unknown variable {name} dropped"),
        }
      }
      Expr::Binary { op, lhs, rhs } => {
        self.gen_operands(lhs, rhs);
        match op {
          BinaryOp::Add => self.inst("add rax, rbx"),
          BinaryOp::Sub => self.inst("sub rax, rbx"),
          BinaryOp::Mul => self.inst("imul rax, rbx"),
          BinaryOp::Div => {
            self.inst("cqo");
            self.inst("idiv rbx");
          }
        }
      }
      Expr::Compare { op, lhs, rhs } => {
        self.gen_operands(lhs, rhs);
        self.inst("cmp rax, rbx");
        let set = match op {
          CompareOp::Eq => "sete",
          CompareOp::Ne => "setne",
          CompareOp::Lt => "setl",
          CompareOp::Gt => "setg",
          CompareOp::Le => "setle",
          CompareOp::Ge => "setge",
        };
        self.inst(&format!("{set} al"));
        self.inst("movzx rax, al");
      }
      Expr::Call { name, args } => self.gen_call(name, args),
      Expr::Array(elems) => {
        self.inst("; array literal");
        let Some(base) = self.symbols.last().map(|s| s.offset) else {
          debug!("array literal outside any local skipped");
          return;
        };
        for (i, elem) in elems.iter().enumerate() {
          self.gen_expr(elem);
          let offset = base + i as i64 * SLOT_SIZE;
          self.inst(&format!("mov {}, rax", slot(offset)));
        }
        self.inst(&format!("lea rax, {}", slot(base)));
      }
      Expr::Index { base, index } => {
        let name = base.as_ident().unwrap_or("<expr>");
        let Some(offset) = self.symbols.lookup(name).map(|s| s.offset) else {
          debug!("indexing unknown array {name} skipped");
          self.inst(&format!("; unknown array {name}"));
          return;
        };
        self.gen_expr(index);
        self.inst(&format!("imul rax, {SLOT_SIZE}"));
        self.inst("mov rbx, rax");
        self.inst(&format!("mov rax, [rbp{offset:+}+rbx]"));
      }
      Expr::StructLit { ty, fields } => {
        self.inst(&format!("; struct literal {ty}"));
        let Some(base) = self.symbols.last().map(|s| s.offset) else {
          debug!("struct literal {ty} outside any local skipped");
          return;
        };
        for (field, value) in fields {
          self.gen_expr(value);
          match self.types.field_offset(ty, field) {
            Some(field_offset) => self.inst(&format!("mov {}, rax", slot(base + field_offset))),
            None => {
              debug!("struct {ty} has no field {field}");
              self.inst(&format!("; unknown field {field}"));
            }
          }
        }
        self.inst(&format!("lea rax, {}", slot(base)));
      }
      Expr::Field { base, field } => {
        let name = base.as_ident().unwrap_or("<expr>");
        let resolved = self.symbols.lookup(name).and_then(|sym| {
          let ty = sym.struct_type.as_deref()?;
          Some(sym.offset + self.types.field_offset(ty, field)?)
        });
        match resolved {
          Some(offset) => self.inst(&format!("mov rax, {}", slot(offset))),
          None => {
            debug!("field {field} of {name} does not resolve");
            self.inst(&format!("; unknown field {field}"));
          }
        }
      }
    }
  }

  /// Left operand ends up in `rax`, right operand in `rbx`.
  fn gen_operands(&mut self, lhs: &Expr, rhs: &Expr) {
    self.gen_expr(lhs);
    self.inst("push rax");
    self.gen_expr(rhs);
    self.inst("mov rbx, rax");
    self.inst("pop rax");
  }

  fn gen_call(&mut self, name: &str, args: &[Expr]) {
    match name {
      "print" => {
        if let Some(arg) = args.first() {
          self.gen_expr(arg);
          self.emit_write_string();
        }
      }
      "println" => {
        if let Some(arg) = args.first() {
          self.gen_expr(arg);
          self.emit_write_string();
        }
        self.inst(&format!("mov byte {}, 10", slot(NEWLINE_SCRATCH)));
        self.inst(&format!("lea rsi, {}", slot(NEWLINE_SCRATCH)));
        self.inst(&format!("mov rdi, {STDOUT}"));
        self.inst("mov rdx, 1");
        self.inst(&format!("mov rax, {SYS_WRITE}"));
        self.inst("syscall");
      }
      "print_int" => {
        if let Some(arg) = args.first() {
          self.gen_expr(arg);
          self.inst(&format!("call {PRINT_INT}"));
        }
      }
      "exit" => {
        match args.first() {
          Some(arg) => {
            self.gen_expr(arg);
            self.inst("mov rdi, rax");
          }
          None => self.inst("xor rdi, rdi"),
        }
        self.inst(&format!("mov rax, {SYS_EXIT}"));
        self.inst("syscall");
      }
      _ => {
        if args.len() > ARG_REGS.len() {
          debug!(
            "call to {name}: {} argument(s) past the sixth dropped",
            args.len() - ARG_REGS.len()
          );
        }
        for (arg, reg) in args.iter().zip(ARG_REGS) {
          self.gen_expr(arg);
          self.inst(&format!("mov {reg}, rax"));
        }
        self.inst(&format!("call {name}"));
      }
    }
  }

  /// `write(1, rax, rbx)` for a string value.
  fn emit_write_string(&mut self) {
    self.inst("mov rsi, rax");
    self.inst("mov rdx, rbx");
    self.inst(&format!("mov rdi, {STDOUT}"));
    self.inst(&format!("mov rax, {SYS_WRITE}"));
    self.inst("syscall");
  }
}
