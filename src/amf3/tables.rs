//! Session-scoped reference tables
//!
//! One read or write call owns one set of tables: strings, objects and
//! traits, each addressed by insertion index. Tables are created with the
//! session and dropped with it.

use indexmap::IndexSet;

use super::arena::Arena;
use super::marker::TypeMarker;
use super::traits::Trait;
use super::value::Value;
use crate::error::{DataError, RefTable, Result};

/// Tables filled while decoding
#[derive(Debug, Default)]
pub(crate) struct ReadTables {
    strings: Vec<String>,
    objects: Vec<Value>,
    traits: Vec<Trait>,
}

impl ReadTables {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Empty strings are never stored
    pub(crate) fn add_string(&mut self, s: &str) {
        if !s.is_empty() {
            self.strings.push(s.to_string());
        }
    }

    pub(crate) fn string(&self, index: u32) -> Result<&str> {
        self.strings
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| invalid(RefTable::String, index))
    }

    /// Composite values are added before their children are read
    pub(crate) fn add_object(&mut self, value: Value) {
        self.objects.push(value);
    }

    /// Resolve an object reference, checking it has the expected marker
    pub(crate) fn object(&self, index: u32, expected: TypeMarker) -> Result<Value> {
        let value = self
            .objects
            .get(index as usize)
            .ok_or_else(|| invalid(RefTable::Object, index))?;
        let found = value.marker();
        if found != expected {
            return Err(DataError::ReferenceTypeMismatch { expected, found }.into());
        }
        Ok(value.clone())
    }

    pub(crate) fn add_trait(&mut self, t: Trait) {
        self.traits.push(t);
    }

    pub(crate) fn trait_at(&self, index: u32) -> Result<&Trait> {
        self.traits
            .get(index as usize)
            .ok_or_else(|| invalid(RefTable::Trait, index))
    }
}

fn invalid(table: RefTable, index: u32) -> crate::error::Error {
    DataError::InvalidReference { table, index }.into()
}

/// Tables consulted while encoding
///
/// With `lookup` off (bare values) nothing is ever found, the string and
/// trait tables stay empty, and object slots are only counted so indices
/// keep matching what a reader would assign.
#[derive(Debug)]
pub(crate) struct WriteTables {
    lookup: bool,
    strings: IndexSet<String>,
    objects: Vec<Value>,
    traits: Vec<Trait>,
}

impl WriteTables {
    pub(crate) fn new(lookup: bool) -> Self {
        Self {
            lookup,
            strings: IndexSet::new(),
            objects: Vec::new(),
            traits: Vec::new(),
        }
    }

    pub(crate) fn find_string(&self, s: &str) -> Option<usize> {
        if !self.lookup || s.is_empty() {
            return None;
        }
        self.strings.get_index_of(s)
    }

    pub(crate) fn add_string(&mut self, s: &str) {
        if self.lookup && !s.is_empty() {
            self.strings.insert(s.to_string());
        }
    }

    /// Earlier slot holding a value equal to `value`
    ///
    /// Arrays and objects are never found, so they are always written out
    /// in full.
    pub(crate) fn find_object(&self, arena: &Arena, value: &Value) -> Option<usize> {
        if !self.lookup || matches!(value, Value::Array(_) | Value::Object(_)) {
            return None;
        }
        let marker = value.marker();
        self.objects
            .iter()
            .position(|v| v.marker() == marker && arena.structural_eq(v, arena, value))
    }

    /// Take the next object slot and return its index
    pub(crate) fn add_object(&mut self, value: &Value) -> usize {
        debug_assert!(value.marker().is_object_referenced());
        let stored = if self.lookup {
            value.clone()
        } else {
            Value::Null
        };
        self.objects.push(stored);
        self.objects.len() - 1
    }

    pub(crate) fn find_trait(&self, t: &Trait) -> Option<usize> {
        if !self.lookup {
            return None;
        }
        self.traits.iter().position(|known| known == t)
    }

    pub(crate) fn add_trait(&mut self, t: Trait) {
        if self.lookup {
            self.traits.push(t);
        }
    }
}
