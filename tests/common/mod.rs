//! A tiny interpreter for the subset of x86-64 NASM the compiler emits.
//!
//! It understands the data section (`label: db ...`), labels, and the handful
//! of instructions the code generator and the `__print_int` helper use. The
//! `write` and `exit` system calls are captured instead of performed.

#![allow(dead_code)]

use std::collections::HashMap;

const MEMORY_SIZE: usize = 1 << 20;
const DATA_BASE: u64 = 0x1000;
const STACK_TOP: u64 = (MEMORY_SIZE as u64) - 64;
const STEP_LIMIT: usize = 5_000_000;

const REGS: [&str; 10] = ["rax", "rbx", "rcx", "rdx", "rsi", "rdi", "rbp", "rsp", "r8", "r9"];
const RAX: usize = 0;
const RDX: usize = 3;
const RSI: usize = 4;
const RDI: usize = 5;
const RBP: usize = 6;
const RSP: usize = 7;

#[derive(Debug, Clone, PartialEq)]
enum Operand {
  Reg(usize),
  /// Low byte of a 64-bit register (`al`, `dl`).
  Low(usize),
  Imm(i64),
  Mem { terms: Vec<(i64, Term)>, byte: bool },
  Label(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Term {
  Reg(usize),
  Disp(i64),
}

#[derive(Debug, Clone)]
struct Inst {
  op: String,
  args: Vec<Operand>,
  line: String,
}

/// Outcome of running a compiled program to its `exit` system call.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
  pub exit_code: i64,
  pub stdout: Vec<u8>,
}

impl Run {
  pub fn stdout_text(&self) -> String {
    String::from_utf8_lossy(&self.stdout).into_owned()
  }
}

fn reg_index(name: &str) -> Option<usize> {
  REGS.iter().position(|r| *r == name)
}

fn parse_operand(text: &str) -> Operand {
  let text = text.trim();
  if let Some(rest) = text.strip_prefix("byte ") {
    return match parse_operand(rest) {
      Operand::Mem { terms, .. } => Operand::Mem { terms, byte: true },
      other => panic!("byte prefix on non-memory operand {other:?}"),
    };
  }
  if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
    let mut terms = Vec::new();
    let mut sign = 1;
    let mut current = String::new();
    for c in inner.chars() {
      if c == '+' || c == '-' {
        if !current.is_empty() {
          terms.push((sign, parse_term(&current)));
          current.clear();
        }
        sign = if c == '-' { -1 } else { 1 };
      } else if !c.is_whitespace() {
        current.push(c);
      }
    }
    if !current.is_empty() {
      terms.push((sign, parse_term(&current)));
    }
    return Operand::Mem { terms, byte: false };
  }
  if let Some(index) = reg_index(text) {
    return Operand::Reg(index);
  }
  match text {
    "al" => return Operand::Low(RAX),
    "dl" => return Operand::Low(RDX),
    _ => {}
  }
  if let Ok(value) = text.parse::<i64>() {
    return Operand::Imm(value);
  }
  // NASM takes unsigned 64-bit immediates too
  if let Ok(value) = text.parse::<u64>() {
    return Operand::Imm(value as i64);
  }
  Operand::Label(text.to_string())
}

fn parse_term(text: &str) -> Term {
  match reg_index(text) {
    Some(index) => Term::Reg(index),
    None => Term::Disp(
      text
        .parse()
        .unwrap_or_else(|_| panic!("bad address term {text}")),
    ),
  }
}

struct Machine {
  regs: [u64; REGS.len()],
  memory: Vec<u8>,
  code: Vec<Inst>,
  code_labels: HashMap<String, usize>,
  data_labels: HashMap<String, u64>,
  zf: bool,
  sf: bool,
  lt: bool,
  stdout: Vec<u8>,
}

impl Machine {
  fn load(asm: &str) -> Self {
    let mut machine = Self {
      regs: [0; REGS.len()],
      memory: vec![0; MEMORY_SIZE],
      code: Vec::new(),
      code_labels: HashMap::new(),
      data_labels: HashMap::new(),
      zf: false,
      sf: false,
      lt: false,
      stdout: Vec::new(),
    };
    let mut data_ptr = DATA_BASE;

    for raw in asm.lines() {
      let line = raw.split(';').next().unwrap_or("").trim();
      if line.is_empty() || line.starts_with("section") || line.starts_with("global") {
        continue;
      }
      if let Some((label, bytes)) = line.split_once(": db ") {
        machine.data_labels.insert(label.to_string(), data_ptr);
        for byte in bytes.split(',') {
          let value: u8 = byte.trim().parse().expect("data byte");
          machine.memory[data_ptr as usize] = value;
          data_ptr += 1;
        }
        continue;
      }
      if let Some(label) = line.strip_suffix(':') {
        let previous = machine
          .code_labels
          .insert(label.to_string(), machine.code.len());
        assert!(previous.is_none(), "label {label} defined twice");
        continue;
      }
      let (op, rest) = line.split_once(' ').unwrap_or((line, ""));
      let args = if rest.trim().is_empty() {
        Vec::new()
      } else {
        rest.split(',').map(parse_operand).collect()
      };
      machine.code.push(Inst {
        op: op.to_string(),
        args,
        line: line.to_string(),
      });
    }
    machine
  }

  fn address(&self, terms: &[(i64, Term)]) -> u64 {
    terms.iter().fold(0u64, |acc, (sign, term)| {
      let value = match term {
        Term::Reg(index) => self.regs[*index] as i64,
        Term::Disp(disp) => *disp,
      };
      acc.wrapping_add((sign * value) as u64)
    })
  }

  fn read_u64(&self, addr: u64) -> u64 {
    let addr = addr as usize;
    let bytes: [u8; 8] = self.memory[addr..addr + 8].try_into().expect("8 bytes");
    u64::from_le_bytes(bytes)
  }

  fn write_u64(&mut self, addr: u64, value: u64) {
    let addr = addr as usize;
    self.memory[addr..addr + 8].copy_from_slice(&value.to_le_bytes());
  }

  fn value(&self, operand: &Operand) -> u64 {
    match operand {
      Operand::Reg(index) => self.regs[*index],
      Operand::Low(index) => self.regs[*index] & 0xff,
      Operand::Imm(value) => *value as u64,
      Operand::Mem { terms, byte } => {
        let addr = self.address(terms);
        if *byte {
          self.memory[addr as usize] as u64
        } else {
          self.read_u64(addr)
        }
      }
      Operand::Label(name) => *self
        .data_labels
        .get(name)
        .unwrap_or_else(|| panic!("unknown data label {name}")),
    }
  }

  fn store(&mut self, operand: &Operand, value: u64, byte_source: bool) {
    match operand {
      Operand::Reg(index) => self.regs[*index] = value,
      Operand::Low(index) => {
        self.regs[*index] = (self.regs[*index] & !0xff) | (value & 0xff);
      }
      Operand::Mem { terms, byte } => {
        let addr = self.address(terms);
        if *byte || byte_source {
          self.memory[addr as usize] = value as u8;
        } else {
          self.write_u64(addr, value);
        }
      }
      other => panic!("cannot store to {other:?}"),
    }
  }

  fn push(&mut self, value: u64) {
    self.regs[RSP] -= 8;
    self.write_u64(self.regs[RSP], value);
  }

  fn pop(&mut self) -> u64 {
    let value = self.read_u64(self.regs[RSP]);
    self.regs[RSP] += 8;
    value
  }

  fn set_flags(&mut self, result: u64, lt: bool) {
    self.zf = result == 0;
    self.sf = (result as i64) < 0;
    self.lt = lt;
  }

  fn jump_target(&self, inst: &Inst) -> usize {
    match &inst.args[0] {
      Operand::Label(name) => *self
        .code_labels
        .get(name)
        .unwrap_or_else(|| panic!("undefined label {name}")),
      other => panic!("bad jump target {other:?}"),
    }
  }

  fn run(mut self) -> Run {
    self.regs[RSP] = STACK_TOP;
    let mut pc = *self.code_labels.get("_start").expect("_start label");

    for _ in 0..STEP_LIMIT {
      let inst = self.code[pc].clone();
      let args = &inst.args;
      pc += 1;
      match inst.op.as_str() {
        "mov" => {
          let byte_source = matches!(args[1], Operand::Low(_));
          let value = self.value(&args[1]);
          self.store(&args[0], value, byte_source);
        }
        "movzx" => {
          let value = self.value(&args[1]);
          self.store(&args[0], value, false);
        }
        "lea" => match &args[1] {
          Operand::Mem { terms, .. } => {
            let addr = self.address(terms);
            self.store(&args[0], addr, false);
          }
          other => panic!("lea of {other:?}"),
        },
        "push" => {
          let value = self.value(&args[0]);
          self.push(value);
        }
        "pop" => {
          let value = self.pop();
          self.store(&args[0], value, false);
        }
        "add" | "sub" | "imul" | "xor" => {
          let a = self.value(&args[0]);
          let b = self.value(&args[1]);
          let result = match inst.op.as_str() {
            "add" => a.wrapping_add(b),
            "sub" => a.wrapping_sub(b),
            "imul" => (a as i64).wrapping_mul(b as i64) as u64,
            _ => a ^ b,
          };
          self.store(&args[0], result, false);
        }
        "neg" | "inc" | "dec" => {
          let a = self.value(&args[0]) as i64;
          let result = match inst.op.as_str() {
            "neg" => a.wrapping_neg(),
            "inc" => a.wrapping_add(1),
            _ => a.wrapping_sub(1),
          };
          self.store(&args[0], result as u64, false);
        }
        "cqo" => {
          self.regs[RDX] = if (self.regs[RAX] as i64) < 0 { u64::MAX } else { 0 };
        }
        "idiv" => {
          let divisor = self.value(&args[0]) as i64;
          assert!(divisor != 0, "division by zero");
          let dividend = self.regs[RAX] as i64;
          self.regs[RAX] = dividend.wrapping_div(divisor) as u64;
          self.regs[RDX] = dividend.wrapping_rem(divisor) as u64;
        }
        "div" => {
          let divisor = self.value(&args[0]);
          assert!(divisor != 0, "division by zero");
          let dividend = self.regs[RAX];
          self.regs[RAX] = dividend / divisor;
          self.regs[RDX] = dividend % divisor;
        }
        "cmp" => {
          let a = self.value(&args[0]);
          let b = self.value(&args[1]);
          self.set_flags(a.wrapping_sub(b), (a as i64) < (b as i64));
        }
        "test" => {
          let result = self.value(&args[0]) & self.value(&args[1]);
          self.set_flags(result, (result as i64) < 0);
        }
        "sete" | "setne" | "setl" | "setg" | "setle" | "setge" => {
          let flag = match inst.op.as_str() {
            "sete" => self.zf,
            "setne" => !self.zf,
            "setl" => self.lt,
            "setg" => !self.zf && !self.lt,
            "setle" => self.zf || self.lt,
            _ => !self.lt,
          };
          self.store(&args[0], flag as u64, false);
        }
        "jmp" | "jz" | "jnz" | "jns" | "jl" => {
          let taken = match inst.op.as_str() {
            "jmp" => true,
            "jz" => self.zf,
            "jnz" => !self.zf,
            "jns" => !self.sf,
            _ => self.lt,
          };
          if taken {
            pc = self.jump_target(&inst);
          }
        }
        "call" => {
          let target = self.jump_target(&inst);
          self.push(pc as u64);
          pc = target;
        }
        "ret" => {
          pc = self.pop() as usize;
        }
        "leave" => {
          self.regs[RSP] = self.regs[RBP];
          self.regs[RBP] = self.pop();
        }
        "syscall" => match self.regs[RAX] {
          1 => {
            let start = self.regs[RSI] as usize;
            let len = self.regs[RDX] as usize;
            assert_eq!(self.regs[RDI], 1, "write to fd other than stdout");
            self.stdout.extend_from_slice(&self.memory[start..start + len]);
            self.regs[RAX] = len as u64;
          }
          60 => {
            return Run {
              exit_code: self.regs[RDI] as i64,
              stdout: self.stdout,
            };
          }
          other => panic!("unsupported syscall {other}"),
        },
        other => panic!("unsupported instruction {other} in `{}`", inst.line),
      }
    }
    panic!("program did not exit within {STEP_LIMIT} steps");
  }
}

/// Execute assembly text produced by the compiler.
pub fn run(asm: &str) -> Run {
  Machine::load(asm).run()
}

/// Compile `source` and execute the result.
pub fn compile_and_run(source: &str) -> Run {
  let asm = chronosc::generate_assembly(source)
    .unwrap_or_else(|err| panic!("compilation failed:\n{err}"));
  run(&asm)
}

/// Exit value of `main` for `source`.
pub fn result_of(source: &str) -> i64 {
  compile_and_run(source).exit_code
}
