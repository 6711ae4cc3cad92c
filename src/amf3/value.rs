//! AMF3 value types
//!
//! Leaf values carry their payload inline. Values that can contain other
//! values (arrays, objects, dictionaries, generic vectors) may form cycles,
//! so they live in an [`Arena`](super::arena::Arena) and are referenced
//! here by [`NodeId`] handles.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::arena::NodeId;
use super::marker::TypeMarker;
use crate::error::ValueError;

/// AMF3 value
///
/// Derived equality is shallow: handles compare by identity. Use
/// [`Arena::structural_eq`](super::arena::Arena::structural_eq) to compare
/// the graphs behind them.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Undefined (0x00)
    Undefined,

    /// Null (0x01)
    #[default]
    Null,

    /// Boolean (False 0x02 / True 0x03, no payload byte)
    Boolean(bool),

    /// 29-bit signed integer (0x04)
    Integer(i32),

    /// IEEE 754 double (0x05)
    Double(f64),

    /// UTF-8 string (0x06)
    String(String),

    /// Legacy XML document (0x07)
    XmlDoc(String),

    /// Date as milliseconds since the Unix epoch (0x08)
    Date(Date),

    /// E4X XML (0x0B)
    Xml(String),

    /// Raw bytes (0x0C)
    ByteArray(ByteArray),

    /// Vector of int (0x0D)
    VectorInt(Vector<i32>),

    /// Vector of uint (0x0E), stored as 32-bit patterns
    VectorUInt(Vector<u32>),

    /// Vector of Number (0x0F)
    VectorDouble(Vector<f64>),

    /// Dense + associative array (0x09)
    Array(NodeId),

    /// Object instance of a trait (0x0A)
    Object(NodeId),

    /// Vector of objects with a type name (0x10)
    VectorGeneric(NodeId),

    /// Value-keyed dictionary (0x11)
    Dictionary(NodeId),
}

impl Value {
    /// The wire marker for this value
    pub fn marker(&self) -> TypeMarker {
        match self {
            Value::Undefined => TypeMarker::Undefined,
            Value::Null => TypeMarker::Null,
            Value::Boolean(false) => TypeMarker::False,
            Value::Boolean(true) => TypeMarker::True,
            Value::Integer(_) => TypeMarker::Integer,
            Value::Double(_) => TypeMarker::Double,
            Value::String(_) => TypeMarker::String,
            Value::XmlDoc(_) => TypeMarker::XmlDoc,
            Value::Date(_) => TypeMarker::Date,
            Value::Xml(_) => TypeMarker::Xml,
            Value::ByteArray(_) => TypeMarker::ByteArray,
            Value::VectorInt(_) => TypeMarker::VectorInt,
            Value::VectorUInt(_) => TypeMarker::VectorUInt,
            Value::VectorDouble(_) => TypeMarker::VectorDouble,
            Value::Array(_) => TypeMarker::Array,
            Value::Object(_) => TypeMarker::Object,
            Value::VectorGeneric(_) => TypeMarker::VectorGeneric,
            Value::Dictionary(_) => TypeMarker::Dictionary,
        }
    }

    /// Arena handle, for values stored in an arena
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Value::Array(id)
            | Value::Object(id)
            | Value::VectorGeneric(id)
            | Value::Dictionary(id) => Some(*id),
            _ => None,
        }
    }

    /// Try to get this value as a string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Text of a string or either XML flavor
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Xml(s) | Value::XmlDoc(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get this value as a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(n) => Some(*n),
            Value::Integer(i) => Some(*i as f64),
            Value::Date(d) => Some(d.millis()),
            _ => None,
        }
    }

    /// Try to get this value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<Date> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_byte_array(&self) -> Option<&ByteArray> {
        match self {
            Value::ByteArray(b) => Some(b),
            _ => None,
        }
    }

    /// Check if this value is null or undefined
    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Date> for Value {
    fn from(v: Date) -> Self {
        Value::Date(v)
    }
}

impl From<ByteArray> for Value {
    fn from(v: ByteArray) -> Self {
        Value::ByteArray(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::ByteArray(ByteArray::from(v))
    }
}

/// Wall-clock instant as milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Date(f64);

impl Date {
    pub fn from_millis(millis: f64) -> Self {
        Date(millis)
    }

    pub fn millis(&self) -> f64 {
        self.0
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        let millis = match time.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_millis() as f64,
            Err(e) => -(e.duration().as_millis() as f64),
        };
        Date(millis)
    }

    /// `None` for NaN or infinite timestamps
    pub fn to_system_time(&self) -> Option<SystemTime> {
        if !self.0.is_finite() {
            return None;
        }
        let whole = self.0.trunc();
        let offset = Duration::from_millis(whole.abs() as u64);
        if whole >= 0.0 {
            UNIX_EPOCH.checked_add(offset)
        } else {
            UNIX_EPOCH.checked_sub(offset)
        }
    }
}

/// Growable byte buffer with stack-like access at the tail
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ByteArray {
    data: Vec<u8>,
}

impl ByteArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn push(&mut self, b: u8) {
        self.data.push(b);
    }

    pub fn push_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Remove and return the last byte
    pub fn pop(&mut self) -> Result<u8, ValueError> {
        self.data.pop().ok_or(ValueError::Underflow {
            requested: 1,
            available: 0,
        })
    }

    /// Remove the last `count` bytes, returned in their original order
    pub fn pop_n(&mut self, count: usize) -> Result<Vec<u8>, ValueError> {
        let available = self.data.len();
        if count > available {
            return Err(ValueError::Underflow {
                requested: count,
                available,
            });
        }
        Ok(self.data.split_off(available - count))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for ByteArray {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl From<&[u8]> for ByteArray {
    fn from(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }
}

/// Typed vector with an optional fixed length
///
/// While `fixed_length` is set the vector never grows past `capacity`.
#[derive(Debug, Clone, Default)]
pub struct Vector<T> {
    items: Vec<T>,
    fixed_length: bool,
    capacity: Option<usize>,
}

impl<T> Vector<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            fixed_length: false,
            capacity: None,
        }
    }

    /// Fixed-length vector that can hold at most `capacity` items
    pub fn fixed(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity.min(1024)),
            fixed_length: true,
            capacity: Some(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_fixed_length(&self) -> bool {
        self.fixed_length
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Fixing the length pins the capacity to at least the current length
    pub fn set_fixed_length(&mut self, fixed: bool) {
        self.fixed_length = fixed;
        if fixed {
            let len = self.items.len();
            self.capacity = Some(self.capacity.map_or(len, |capacity| capacity.max(len)));
        }
    }

    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), ValueError> {
        if self.fixed_length && capacity < self.items.len() {
            return Err(ValueError::CapacityExceeded { capacity });
        }
        self.capacity = Some(capacity);
        Ok(())
    }

    pub fn push(&mut self, item: T) -> Result<(), ValueError> {
        if self.fixed_length {
            let capacity = self.capacity.unwrap_or(self.items.len());
            if self.items.len() >= capacity {
                return Err(ValueError::CapacityExceeded { capacity });
            }
        }
        self.items.push(item);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T: PartialEq> PartialEq for Vector<T> {
    fn eq(&self, other: &Self) -> bool {
        // Capacity is bookkeeping, not content
        self.fixed_length == other.fixed_length && self.items == other.items
    }
}

impl<T> From<Vec<T>> for Vector<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            items,
            fixed_length: false,
            capacity: None,
        }
    }
}

impl<'a, T> IntoIterator for &'a Vector<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
