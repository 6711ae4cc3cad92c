//! Arena-backed composite values
//!
//! Arrays, objects, dictionaries and generic vectors can reference each
//! other (and themselves), so the graph is stored as a flat arena addressed
//! by [`NodeId`]. A [`Value`] holding a handle is only meaningful together
//! with the arena that issued it.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use bytes::BytesMut;
use indexmap::IndexMap;

use super::externalizable::Externalizable;
use super::marker::TypeMarker;
use super::traits::Trait;
use super::value::{Value, Vector};
use crate::error::ValueError;

/// Handle of a composite value inside an [`Arena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Array with a dense part and a string-keyed associative part
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Array {
    pub(crate) dense: Vec<Value>,
    pub(crate) associative: IndexMap<String, Value>,
}

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dense(dense: Vec<Value>) -> Self {
        Self {
            dense,
            associative: IndexMap::new(),
        }
    }

    /// Dense length plus associative length
    pub fn len(&self) -> usize {
        self.dense.len() + self.associative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&mut self, value: Value) {
        self.dense.push(value);
    }

    /// Set an associative entry. The empty key is reserved as the wire terminator.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Result<Option<Value>, ValueError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ValueError::EmptyKey);
        }
        Ok(self.associative.insert(key, value))
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.dense.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Value> {
        self.dense.get_mut(index)
    }

    pub fn get_key(&self, key: &str) -> Option<&Value> {
        self.associative.get(key)
    }

    pub fn get_key_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.associative.get_mut(key)
    }

    pub fn remove(&mut self, index: usize) -> Option<Value> {
        (index < self.dense.len()).then(|| self.dense.remove(index))
    }

    pub fn remove_key(&mut self, key: &str) -> Option<Value> {
        self.associative.shift_remove(key)
    }

    pub fn dense(&self) -> &[Value] {
        &self.dense
    }

    pub fn dense_mut(&mut self) -> &mut Vec<Value> {
        &mut self.dense
    }

    pub fn associative(&self) -> &IndexMap<String, Value> {
        &self.associative
    }

    pub fn clear(&mut self) {
        self.dense.clear();
        self.associative.clear();
    }
}

/// Object instance: sealed members described by its trait, optional
/// dynamic members and an optional externalizable payload
#[derive(Debug, Clone, Default)]
pub struct Object {
    pub(crate) trait_name: String,
    pub(crate) dynamic: bool,
    pub(crate) externalizable: bool,
    pub(crate) sealed: IndexMap<String, Value>,
    pub(crate) dynamic_members: IndexMap<String, Value>,
    pub(crate) external: Option<Arc<dyn Externalizable>>,
}

impl Object {
    /// Sealed, non-dynamic instance of the named class
    pub fn new(trait_name: impl Into<String>) -> Self {
        Self {
            trait_name: trait_name.into(),
            ..Default::default()
        }
    }

    /// Plain anonymous dynamic object
    pub fn anonymous() -> Self {
        Self {
            dynamic: true,
            ..Default::default()
        }
    }

    /// Instance of `t` with every sealed member set to undefined
    pub fn from_trait(t: &Trait) -> Self {
        Self {
            trait_name: t.name.clone(),
            dynamic: t.dynamic,
            externalizable: t.externalizable,
            sealed: t
                .properties
                .iter()
                .map(|p| (p.clone(), Value::Undefined))
                .collect(),
            ..Default::default()
        }
    }

    pub fn trait_name(&self) -> &str {
        &self.trait_name
    }

    pub fn set_trait_name(&mut self, name: impl Into<String>) {
        self.trait_name = name.into();
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn set_dynamic(&mut self, dynamic: bool) {
        self.dynamic = dynamic;
    }

    pub fn is_externalizable(&self) -> bool {
        self.externalizable
    }

    pub fn set_externalizable(&mut self, externalizable: bool) {
        self.externalizable = externalizable;
    }

    /// Trait derived from the current shape of this object
    pub fn trait_info(&self) -> Trait {
        Trait {
            name: self.trait_name.clone(),
            dynamic: self.dynamic,
            externalizable: self.externalizable,
            properties: self.sealed.keys().cloned().collect(),
        }
    }

    pub fn sealed(&self) -> &IndexMap<String, Value> {
        &self.sealed
    }

    /// Set a sealed member, adding it to the trait if new
    pub fn set_sealed(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.sealed.insert(key.into(), value)
    }

    pub fn remove_sealed(&mut self, key: &str) -> Option<Value> {
        self.sealed.shift_remove(key)
    }

    pub fn dynamic_members(&self) -> &IndexMap<String, Value> {
        &self.dynamic_members
    }

    /// Set a dynamic member. The empty key is reserved as the wire terminator.
    pub fn set_dynamic_member(
        &mut self,
        key: impl Into<String>,
        value: Value,
    ) -> Result<Option<Value>, ValueError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ValueError::EmptyKey);
        }
        Ok(self.dynamic_members.insert(key, value))
    }

    pub fn remove_dynamic_member(&mut self, key: &str) -> Option<Value> {
        self.dynamic_members.shift_remove(key)
    }

    /// Sealed member first, then dynamic member
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.sealed
            .get(key)
            .or_else(|| self.dynamic_members.get(key))
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        if self.sealed.contains_key(key) {
            return self.sealed.get_mut(key);
        }
        self.dynamic_members.get_mut(key)
    }

    pub fn external(&self) -> Option<&Arc<dyn Externalizable>> {
        self.external.as_ref()
    }

    pub fn set_external(&mut self, external: Option<Arc<dyn Externalizable>>) {
        self.external = external;
    }
}

/// Dictionary keyed by arbitrary values, in insertion order
///
/// Keys compare shallowly: composite keys match by identity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dictionary {
    pub(crate) weak_keys: bool,
    pub(crate) entries: Vec<(Value, Value)>,
}

impl Dictionary {
    pub fn new(weak_keys: bool) -> Self {
        Self {
            weak_keys,
            entries: Vec::new(),
        }
    }

    pub fn has_weak_keys(&self) -> bool {
        self.weak_keys
    }

    pub fn set_weak_keys(&mut self, weak_keys: bool) {
        self.weak_keys = weak_keys;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace in place, returning the previous value
    pub fn insert(&mut self, key: Value, value: Value) -> Option<Value> {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &Value) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Lookup by string key
    pub fn get_str(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

/// `Vector.<T>` of object values with its element type name
#[derive(Debug, Clone, PartialEq)]
pub struct GenericVector {
    pub(crate) type_name: String,
    pub(crate) items: Vector<Value>,
}

impl GenericVector {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            items: Vector::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn set_type_name(&mut self, type_name: impl Into<String>) {
        self.type_name = type_name.into();
    }

    pub fn items(&self) -> &Vector<Value> {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut Vector<Value> {
        &mut self.items
    }
}

impl Default for GenericVector {
    fn default() -> Self {
        // "*" is the untyped vector
        Self::new("*")
    }
}

/// Arena slot
#[derive(Debug, Clone)]
pub enum Node {
    Array(Array),
    Object(Object),
    Dictionary(Dictionary),
    Vector(GenericVector),
}

impl Node {
    pub fn marker(&self) -> TypeMarker {
        match self {
            Node::Array(_) => TypeMarker::Array,
            Node::Object(_) => TypeMarker::Object,
            Node::Dictionary(_) => TypeMarker::Dictionary,
            Node::Vector(_) => TypeMarker::VectorGeneric,
        }
    }
}

/// Owner of all composite values of one graph
#[derive(Debug, Clone, Default)]
pub struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Store a node and return the value handle for it
    pub fn insert(&mut self, node: Node) -> Value {
        let id = NodeId(self.nodes.len() as u32);
        let value = match &node {
            Node::Array(_) => Value::Array(id),
            Node::Object(_) => Value::Object(id),
            Node::Dictionary(_) => Value::Dictionary(id),
            Node::Vector(_) => Value::VectorGeneric(id),
        };
        self.nodes.push(node);
        value
    }

    pub fn insert_array(&mut self, array: Array) -> Value {
        self.insert(Node::Array(array))
    }

    pub fn insert_object(&mut self, object: Object) -> Value {
        self.insert(Node::Object(object))
    }

    pub fn insert_dictionary(&mut self, dictionary: Dictionary) -> Value {
        self.insert(Node::Dictionary(dictionary))
    }

    pub fn insert_vector(&mut self, vector: GenericVector) -> Value {
        self.insert(Node::Vector(vector))
    }

    /// Overwrite a slot, keeping its kind
    pub(crate) fn replace(&mut self, id: NodeId, node: Node) {
        if let Some(slot) = self.nodes.get_mut(id.index()) {
            debug_assert_eq!(slot.marker(), node.marker());
            *slot = node;
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    pub fn array(&self, id: NodeId) -> Option<&Array> {
        match self.node(id)? {
            Node::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn array_mut(&mut self, id: NodeId) -> Option<&mut Array> {
        match self.node_mut(id)? {
            Node::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn object(&self, id: NodeId) -> Option<&Object> {
        match self.node(id)? {
            Node::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn object_mut(&mut self, id: NodeId) -> Option<&mut Object> {
        match self.node_mut(id)? {
            Node::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn dictionary(&self, id: NodeId) -> Option<&Dictionary> {
        match self.node(id)? {
            Node::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    pub fn dictionary_mut(&mut self, id: NodeId) -> Option<&mut Dictionary> {
        match self.node_mut(id)? {
            Node::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    pub fn vector(&self, id: NodeId) -> Option<&GenericVector> {
        match self.node(id)? {
            Node::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn vector_mut(&mut self, id: NodeId) -> Option<&mut GenericVector> {
        match self.node_mut(id)? {
            Node::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Structural equality of `a` in this arena and `b` in `other`
    ///
    /// Terminates on cyclic graphs: a pair of handles already under
    /// comparison is assumed equal.
    pub fn structural_eq(&self, a: &Value, other: &Arena, b: &Value) -> bool {
        StructuralEq {
            left: self,
            right: other,
            visited: HashSet::new(),
            trail: Vec::new(),
        }
        .values(a, b)
    }

    /// Render a value in a compact `Array{k=v,...}` form
    pub fn display<'a>(&'a self, value: &'a Value) -> DisplayValue<'a> {
        DisplayValue { arena: self, value }
    }
}

struct StructuralEq<'a> {
    left: &'a Arena,
    right: &'a Arena,
    visited: HashSet<(NodeId, NodeId)>,
    /// Pairs in the order they were marked, so a failed attempt can be undone
    trail: Vec<(NodeId, NodeId)>,
}

impl StructuralEq<'_> {
    fn values(&mut self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Array(x), Value::Array(y))
            | (Value::Object(x), Value::Object(y))
            | (Value::Dictionary(x), Value::Dictionary(y))
            | (Value::VectorGeneric(x), Value::VectorGeneric(y)) => self.nodes(*x, *y),
            (Value::Double(x), Value::Double(y)) => same_number(*x, *y),
            (Value::Date(x), Value::Date(y)) => same_number(x.millis(), y.millis()),
            (Value::VectorDouble(x), Value::VectorDouble(y)) => {
                x.is_fixed_length() == y.is_fixed_length()
                    && x.len() == y.len()
                    && x.iter().zip(y.iter()).all(|(p, q)| same_number(*p, *q))
            }
            _ => a == b,
        }
    }

    fn nodes(&mut self, x: NodeId, y: NodeId) -> bool {
        if !self.visited.insert((x, y)) {
            return true;
        }
        self.trail.push((x, y));
        let (left, right) = (self.left, self.right);
        match (left.node(x), right.node(y)) {
            (Some(Node::Array(a)), Some(Node::Array(b))) => self.arrays(a, b),
            (Some(Node::Object(a)), Some(Node::Object(b))) => self.objects(a, b),
            (Some(Node::Dictionary(a)), Some(Node::Dictionary(b))) => self.dictionaries(a, b),
            (Some(Node::Vector(a)), Some(Node::Vector(b))) => {
                a.type_name == b.type_name
                    && a.items.is_fixed_length() == b.items.is_fixed_length()
                    && self.sequences(a.items.as_slice(), b.items.as_slice())
            }
            _ => false,
        }
    }

    fn sequences(&mut self, a: &[Value], b: &[Value]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| self.values(x, y))
    }

    fn maps(&mut self, a: &IndexMap<String, Value>, b: &IndexMap<String, Value>) -> bool {
        a.len() == b.len()
            && a.iter()
                .all(|(k, v)| b.get(k).is_some_and(|w| self.values(v, w)))
    }

    fn arrays(&mut self, a: &Array, b: &Array) -> bool {
        self.sequences(&a.dense, &b.dense) && self.maps(&a.associative, &b.associative)
    }

    fn objects(&mut self, a: &Object, b: &Object) -> bool {
        if a.trait_name != b.trait_name
            || a.dynamic != b.dynamic
            || a.externalizable != b.externalizable
            || !a.sealed.keys().eq(b.sealed.keys())
        {
            return false;
        }
        let sealed = a
            .sealed
            .values()
            .zip(b.sealed.values())
            .all(|(x, y)| self.values(x, y));
        sealed && self.maps(&a.dynamic_members, &b.dynamic_members) && payloads_eq(a, b)
    }

    fn dictionaries(&mut self, a: &Dictionary, b: &Dictionary) -> bool {
        if a.weak_keys != b.weak_keys || a.entries.len() != b.entries.len() {
            return false;
        }
        // Each entry of `a` claims a distinct entry of `b`
        let mut used = vec![false; b.entries.len()];
        a.entries.iter().all(|(ka, va)| {
            let found = b.entries.iter().enumerate().position(|(i, (kb, vb))| {
                !used[i] && self.attempt(|eq| eq.values(ka, kb) && eq.values(va, vb))
            });
            match found {
                Some(i) => {
                    used[i] = true;
                    true
                }
                None => false,
            }
        })
    }

    /// Run `compare`, forgetting any pairs it marked if it fails
    fn attempt(&mut self, compare: impl FnOnce(&mut Self) -> bool) -> bool {
        let mark = self.trail.len();
        let matched = compare(self);
        if !matched {
            for pair in self.trail.drain(mark..) {
                self.visited.remove(&pair);
            }
        }
        matched
    }
}

fn same_number(x: f64, y: f64) -> bool {
    x == y || (x.is_nan() && y.is_nan())
}

/// Externalizable payloads compare by their serialized bytes
fn payloads_eq(a: &Object, b: &Object) -> bool {
    match (&a.external, &b.external) {
        (None, None) => true,
        (Some(x), Some(y)) if Arc::ptr_eq(x, y) => true,
        (Some(x), Some(y)) => {
            let mut left = BytesMut::new();
            let mut right = BytesMut::new();
            x.write_payload(&mut left).is_ok()
                && y.write_payload(&mut right).is_ok()
                && left == right
        }
        _ => false,
    }
}

/// A single value graph with its arena
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub arena: Arena,
    pub root: Value,
}

impl Document {
    pub fn new(arena: Arena, root: Value) -> Self {
        Self { arena, root }
    }

    /// Structural equality with another document
    pub fn structural_eq(&self, other: &Document) -> bool {
        self.arena
            .structural_eq(&self.root, &other.arena, &other.root)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.arena.display(&self.root).fmt(f)
    }
}

/// Display adapter returned by [`Arena::display`]
pub struct DisplayValue<'a> {
    arena: &'a Arena,
    value: &'a Value,
}

impl fmt::Display for DisplayValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut path = Vec::new();
        write_value(f, self.arena, self.value, &mut path)
    }
}

fn write_value(
    f: &mut fmt::Formatter<'_>,
    arena: &Arena,
    value: &Value,
    path: &mut Vec<NodeId>,
) -> fmt::Result {
    match value {
        Value::Undefined => write!(f, "Undefined"),
        Value::Null => write!(f, "Null"),
        Value::Boolean(b) => write!(f, "{}", b),
        Value::Integer(i) => write!(f, "{}", i),
        Value::Double(d) => write!(f, "{:?}", d),
        Value::String(s) => write!(f, "{:?}", s),
        Value::XmlDoc(s) => write!(f, "XMLDoc[{}]", s),
        Value::Xml(s) => write!(f, "XML[{}]", s),
        Value::Date(d) => write!(f, "Date[{}]", d.millis()),
        Value::ByteArray(bytes) => {
            write!(f, "ByteArray{{")?;
            for (i, b) in bytes.as_slice().iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{:02x}", b)?;
            }
            write!(f, "}}")
        }
        Value::VectorInt(v) => write_list(f, "VectorInt", v.iter()),
        Value::VectorUInt(v) => write_list(f, "VectorUInt", v.iter()),
        Value::VectorDouble(v) => write_list(f, "VectorDouble", v.iter()),
        Value::Array(id) | Value::Object(id) | Value::Dictionary(id) | Value::VectorGeneric(id) => {
            if path.contains(id) {
                return write!(f, "<cycle>");
            }
            path.push(*id);
            let result = write_node(f, arena, *id, path);
            path.pop();
            result
        }
    }
}

fn write_node(
    f: &mut fmt::Formatter<'_>,
    arena: &Arena,
    id: NodeId,
    path: &mut Vec<NodeId>,
) -> fmt::Result {
    let node = match arena.node(id) {
        Some(node) => node,
        None => return write!(f, "<dangling>"),
    };
    let mut first = true;
    let mut sep = |f: &mut fmt::Formatter<'_>| {
        let s = if first { "" } else { "," };
        first = false;
        write!(f, "{}", s)
    };
    match node {
        Node::Array(a) => {
            write!(f, "Array{{")?;
            for (k, v) in &a.associative {
                sep(f)?;
                write!(f, "{}=", k)?;
                write_value(f, arena, v, path)?;
            }
            for v in &a.dense {
                sep(f)?;
                write_value(f, arena, v, path)?;
            }
        }
        Node::Object(o) => {
            write!(f, "Object:{}{{", o.trait_name)?;
            for (k, v) in o.sealed.iter().chain(o.dynamic_members.iter()) {
                sep(f)?;
                write!(f, "{}=", k)?;
                write_value(f, arena, v, path)?;
            }
        }
        Node::Dictionary(d) => {
            write!(f, "Dictionary{{")?;
            for (k, v) in &d.entries {
                sep(f)?;
                write_value(f, arena, k, path)?;
                write!(f, "=")?;
                write_value(f, arena, v, path)?;
            }
        }
        Node::Vector(v) => {
            write!(f, "Vector<{}>{{", v.type_name)?;
            for item in v.items.iter() {
                sep(f)?;
                write_value(f, arena, item, path)?;
            }
        }
    }
    write!(f, "}}")
}

fn write_list<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    items: impl Iterator<Item = T>,
) -> fmt::Result {
    write!(f, "{}{{", name)?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(f, ",")?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, "}}")
}
