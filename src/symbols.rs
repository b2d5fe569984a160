//! Per-function stack-slot table.
//!
//! Locals are laid out downwards from the frame base: each new symbol grows
//! the cumulative stack size and takes the lowest address of its range, so
//! `offset` is always negative and ranges never overlap.

use crate::ty::SLOT_SIZE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
  pub name: String,
  /// Byte offset from the frame base (`rbp`) of the lowest slot.
  pub offset: i64,
  /// Number of 8-byte slots: 1 for scalars, N for arrays and N-field structs.
  pub slots: usize,
  /// Struct type name for struct-valued locals.
  pub struct_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
  symbols: Vec<Symbol>,
  stack_size: i64,
}

impl SymbolTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Allocate `slots` consecutive slots and return the symbol's offset.
  ///
  /// A zero-slot symbol (`let e = [];`, an instance of a field-less struct)
  /// reserves nothing and shares the previous symbol's offset, so writes
  /// through it land in that symbol's slot.
  pub fn add(&mut self, name: &str, slots: usize) -> i64 {
    self.push(name, slots, None)
  }

  pub fn add_struct(&mut self, name: &str, struct_type: &str, slots: usize) -> i64 {
    self.push(name, slots, Some(struct_type.to_string()))
  }

  fn push(&mut self, name: &str, slots: usize, struct_type: Option<String>) -> i64 {
    self.stack_size += slots as i64 * SLOT_SIZE;
    let offset = -self.stack_size;
    self.symbols.push(Symbol {
      name: name.to_string(),
      offset,
      slots,
      struct_type,
    });
    offset
  }

  /// First declaration wins; later redeclarations of the same name still
  /// consume stack but are never found.
  pub fn lookup(&self, name: &str) -> Option<&Symbol> {
    self.symbols.iter().find(|s| s.name == name)
  }

  /// The most recently declared symbol. Array and struct literals store
  /// their elements into this symbol's slots.
  pub fn last(&self) -> Option<&Symbol> {
    self.symbols.last()
  }

  pub fn stack_size(&self) -> i64 {
    self.stack_size
  }

  pub fn len(&self) -> usize {
    self.symbols.len()
  }

  pub fn is_empty(&self) -> bool {
    self.symbols.is_empty()
  }
}
