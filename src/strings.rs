//! String literals collected for the data section.
//!
//! Every literal evaluated during code generation gets its own row, even if
//! the same text appeared before; labels are `str_0`, `str_1`, ... in the
//! order the generator reaches them.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringEntry {
  pub label: String,
  pub bytes: Vec<u8>,
}

impl StringEntry {
  pub fn len(&self) -> usize {
    self.bytes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }

  /// `db` directive body. An empty literal still needs one byte for the
  /// directive to assemble; its recorded length stays 0.
  pub fn db_operands(&self) -> String {
    if self.bytes.is_empty() {
      return "0".to_string();
    }
    self
      .bytes
      .iter()
      .map(u8::to_string)
      .collect::<Vec<_>>()
      .join(", ")
  }
}

#[derive(Debug, Clone, Default)]
pub struct StringTable {
  entries: Vec<StringEntry>,
}

impl StringTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a literal and return its entry.
  pub fn add(&mut self, text: &str) -> &StringEntry {
    let label = format!("str_{}", self.entries.len());
    self.entries.push(StringEntry {
      label,
      bytes: text.as_bytes().to_vec(),
    });
    &self.entries[self.entries.len() - 1]
  }

  pub fn entries(&self) -> &[StringEntry] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
