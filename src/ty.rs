//! Struct layouts.
//!
//! The language has a single scalar width, so every struct field occupies one
//! 8-byte slot and field `i` lives at byte offset `8 * i`.

use log::debug;

use crate::ast::Program;

/// Size in bytes of every scalar, array element and struct field.
pub const SLOT_SIZE: i64 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructField {
  pub name: String,
  pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructType {
  pub name: String,
  pub fields: Vec<StructField>,
  pub size: i64,
}

impl StructType {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      fields: Vec::new(),
      size: 0,
    }
  }

  pub fn field_offset(&self, field: &str) -> Option<i64> {
    self
      .fields
      .iter()
      .find(|f| f.name == field)
      .map(|f| f.offset)
  }

  /// Number of 8-byte slots an instance occupies.
  pub fn slots(&self) -> usize {
    self.fields.len()
  }
}

/// All struct types declared in a program. Lookups are linear scans.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
  types: Vec<StructType>,
}

impl TypeTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Pre-pass over the top-level struct declarations, so functions declared
  /// before a struct can still use it.
  pub fn collect(program: &Program) -> Self {
    let mut table = Self::new();
    for def in program.structs() {
      table.register(&def.name);
      for field in &def.fields {
        table.add_field(&def.name, &field.name);
      }
      debug!(
        "struct {} registered with {} field(s)",
        def.name,
        def.fields.len()
      );
    }
    table
  }

  pub fn register(&mut self, name: &str) {
    self.types.push(StructType::new(name));
  }

  /// Append a field at the next slot. Unknown structs and repeated field
  /// names are ignored, keeping the first declaration.
  pub fn add_field(&mut self, struct_name: &str, field_name: &str) {
    let Some(ty) = self.types.iter_mut().find(|t| t.name == struct_name) else {
      return;
    };
    if ty.field_offset(field_name).is_some() {
      debug!("duplicate field {field_name} in struct {struct_name} ignored");
      return;
    }
    ty.fields.push(StructField {
      name: field_name.to_string(),
      offset: ty.size,
    });
    ty.size += SLOT_SIZE;
  }

  pub fn lookup(&self, name: &str) -> Option<&StructType> {
    self.types.iter().find(|t| t.name == name)
  }

  pub fn field_offset(&self, struct_name: &str, field_name: &str) -> Option<i64> {
    self.lookup(struct_name)?.field_offset(field_name)
  }

  pub fn len(&self) -> usize {
    self.types.len()
  }

  pub fn is_empty(&self) -> bool {
    self.types.is_empty()
  }
}
