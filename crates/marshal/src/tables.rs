//! Per-call symbol and object tables
//!
//! Both tables are created at the start of one Dump or Load and dropped at
//! its end. Indices are stream-local and assigned in first-occurrence order.

use crate::error::{CodecError, Result};
use crate::value::{Symbol, Value};
use std::collections::HashMap;

/// Symbol table used while writing
#[derive(Debug, Default)]
pub struct SymbolWriter {
    indices: HashMap<Symbol, usize>,
}

impl SymbolWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of an already written symbol, or `None` after registering it
    /// under the next index
    pub fn lookup_or_insert(&mut self, symbol: &Symbol) -> Option<usize> {
        if let Some(index) = self.indices.get(symbol) {
            return Some(*index);
        }
        let next = self.indices.len();
        self.indices.insert(symbol.clone(), next);
        None
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Symbol table used while reading
#[derive(Debug, Default)]
pub struct SymbolReader {
    symbols: Vec<Symbol>,
}

impl SymbolReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly defined symbol under the next index
    pub fn define(&mut self, symbol: Symbol) -> usize {
        self.symbols.push(symbol);
        self.symbols.len() - 1
    }

    pub fn get(&self, index: usize) -> Result<Symbol> {
        self.symbols
            .get(index)
            .cloned()
            .ok_or_else(|| CodecError::format(format!("bad symbol link {}", index)))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Object table used while writing
///
/// Maps value identity to stream index. Values without identity (floats,
/// bignums) still consume an index so the reader's numbering stays aligned,
/// but can never be linked back to.
#[derive(Debug, Default)]
pub struct ObjectWriter {
    indices: HashMap<usize, usize>,
    next: usize,
    /// Values created during the call (hook results) kept alive so their
    /// addresses are not reused by later allocations
    retained: Vec<Value>,
}

impl ObjectWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of a value already written
    pub fn lookup(&self, value: &Value) -> Option<usize> {
        value.identity().and_then(|id| self.indices.get(&id).copied())
    }

    /// Reserve the next index for `value` before its children are written
    pub fn reserve(&mut self, value: &Value) -> usize {
        let index = self.next;
        self.next += 1;
        if let Some(id) = value.identity() {
            self.indices.insert(id, index);
        }
        index
    }

    pub fn retain(&mut self, value: Value) {
        self.retained.push(value);
    }

    /// Number of indices handed out so far
    pub fn len(&self) -> usize {
        self.next
    }

    pub fn is_empty(&self) -> bool {
        self.next == 0
    }
}

/// Object table used while reading
///
/// A slot is reserved before a value's children are read and filled as soon
/// as the value's shell exists, so children can link back to it.
#[derive(Debug, Default)]
pub struct ObjectReader {
    slots: Vec<Option<Value>>,
}

impl ObjectReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self) -> usize {
        self.slots.push(None);
        self.slots.len() - 1
    }

    pub fn fill(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(value);
        }
    }

    pub fn get(&self, index: usize) -> Result<Value> {
        match self.slots.get(index) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => Err(CodecError::format(format!(
                "object link {} refers to a value still being read",
                index
            ))),
            None => Err(CodecError::format(format!("dump format error (unlinked index {})", index))),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
