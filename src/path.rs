//! Dotted-path navigation through decoded values
//!
//! `"player.inventory.0"` walks array keys (falling back to dense indices
//! for numeric segments), object members (sealed first), dictionary string
//! keys and generic vector indices. Empty segments are ignored.

use crate::amf3::{Arena, Node, TypeMarker, Value};
use crate::error::{Result, ValueError};
use crate::sol::SolFile;

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

fn child<'a>(arena: &'a Arena, container: &Value, key: &str) -> Option<&'a Value> {
    let id = container.node_id()?;
    match arena.node(id)? {
        Node::Array(array) => array
            .get_key(key)
            .or_else(|| key.parse().ok().and_then(|i| array.get(i))),
        Node::Object(object) => object.get(key),
        Node::Dictionary(dictionary) => dictionary.get_str(key),
        Node::Vector(vector) => key.parse().ok().and_then(|i| vector.items().get(i)),
    }
}

fn child_mut<'a>(arena: &'a mut Arena, container: &Value, key: &str) -> Option<&'a mut Value> {
    let id = container.node_id()?;
    match arena.node_mut(id)? {
        Node::Array(array) => {
            if array.get_key(key).is_some() {
                return array.get_key_mut(key);
            }
            let index = key.parse().ok()?;
            array.get_mut(index)
        }
        Node::Object(object) => object.get_mut(key),
        Node::Dictionary(dictionary) => dictionary.get_mut(&Value::from(key)),
        Node::Vector(vector) => vector.items_mut().get_mut(key.parse().ok()?),
    }
}

/// Value at `path` below `root`; an empty path is `root` itself
pub fn resolve<'a>(arena: &'a Arena, root: &'a Value, path: &str) -> Option<&'a Value> {
    segments(path).try_fold(root, |current, key| child(arena, current, key))
}

/// Mutable slot at `path` below `root`; the path must name at least one step
pub fn resolve_mut<'a>(arena: &'a mut Arena, root: &Value, path: &str) -> Option<&'a mut Value> {
    let steps: Vec<&str> = segments(path).collect();
    let (last, parents) = steps.split_last()?;
    let mut container = root.clone();
    for key in parents {
        container = child(arena, &container, key)?.clone();
    }
    child_mut(arena, &container, last)
}

pub fn get_i32(arena: &Arena, root: &Value, path: &str) -> Option<i32> {
    resolve(arena, root, path)?.as_i32()
}

/// Numeric value at `path`; integers and dates convert
pub fn get_f64(arena: &Arena, root: &Value, path: &str) -> Option<f64> {
    resolve(arena, root, path)?.as_f64()
}

pub fn get_bool(arena: &Arena, root: &Value, path: &str) -> Option<bool> {
    resolve(arena, root, path)?.as_bool()
}

pub fn get_str<'a>(arena: &'a Arena, root: &'a Value, path: &str) -> Option<&'a str> {
    resolve(arena, root, path)?.as_text()
}

/// Replace the value at `path`, returning the old one
///
/// The new value must have the same type as the one it replaces; `true`
/// and `false` count as one type.
pub fn set(arena: &mut Arena, root: &Value, path: &str, value: Value) -> Result<Value> {
    let slot = resolve_mut(arena, root, path)
        .ok_or_else(|| ValueError::MissingPath(path.to_string()))?;
    replace_same_kind(slot, value)
}

fn replace_same_kind(slot: &mut Value, value: Value) -> Result<Value> {
    let (expected, found) = (kind(slot), kind(&value));
    if expected != found {
        return Err(ValueError::TypeMismatch { expected, found }.into());
    }
    Ok(std::mem::replace(slot, value))
}

fn kind(value: &Value) -> TypeMarker {
    match value.marker() {
        TypeMarker::False => TypeMarker::True,
        marker => marker,
    }
}

impl SolFile {
    /// Value at `path`, whose first segment is an entry key
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        let mut steps = segments(path);
        let entry = self.entries.get(steps.next()?)?;
        steps.try_fold(entry, |current, key| child(&self.arena, current, key))
    }

    pub fn get_i32(&self, path: &str) -> Option<i32> {
        self.resolve(path)?.as_i32()
    }

    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.resolve(path)?.as_f64()
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.resolve(path)?.as_bool()
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.resolve(path)?.as_text()
    }

    /// Replace the value at `path` without changing its type
    pub fn set(&mut self, path: &str, value: Value) -> Result<Value> {
        let missing = || ValueError::MissingPath(path.to_string());
        let mut steps = segments(path);
        let key = steps.next().ok_or_else(missing)?;
        let rest: Vec<&str> = steps.collect();

        if rest.is_empty() {
            let slot = self.entries.get_mut(key).ok_or_else(missing)?;
            return replace_same_kind(slot, value);
        }
        let root = self.entries.get(key).ok_or_else(missing)?.clone();
        let slot = resolve_mut(&mut self.arena, &root, &rest.join(".")).ok_or_else(missing)?;
        replace_same_kind(slot, value)
    }
}
