use std::{fs, io, path::Path};

use indexmap::IndexMap;
use serde::{de, ser::SerializeMap, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use super::{
    error::StoreError,
    path::{is_reserved, join, PathExpr},
    Value,
};

/// A path-addressable nested store.
///
/// Nested mappings are always `Node`s and keys starting with `__` are never
/// stored. Values are addressed with dotted paths (`engine.models.name`).
///
/// The accessors hand out live references into the tree, not copies: a
/// value changed through [`Node::get_mut`] or [`Node::node_mut`] is changed
/// in the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    entries: IndexMap<String, Value>,
}

impl Node {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a raw JSON value, which must be an object.
    pub fn from_json(json: JsonValue) -> Result<Self, StoreError> {
        match json {
            JsonValue::Object(map) => Ok(Self::from_map(map)),
            other => Err(StoreError::InvalidInput(json_type_name(&other))),
        }
    }

    pub fn from_map(map: Map<String, JsonValue>) -> Self {
        let mut node = Self::new();
        node.update(map);
        node
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let json: JsonValue =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Deserialization {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(json)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let io_error = |source: io::Error| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let serialized = serde_json::to_vec_pretty(self)
            .map_err(io::Error::from)
            .map_err(io_error)?;
        fs::write(path, serialized).map_err(io_error)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Key-level lookup, no path parsing.
    pub fn entry_value(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Key-level insert, no path parsing. Reserved keys are refused.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> bool {
        let key = key.into();
        if is_reserved(&key) {
            debug!("dropping reserved key `{key}`");
            return false;
        }
        self.entries.insert(key, value.into());
        true
    }

    /// Assigns every entry at the top level of this node.
    ///
    /// A mapping replaces whatever was stored under its key; nested mappings
    /// are not merged field by field.
    pub fn update<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (key, value) in entries {
            self.insert(key, value);
        }
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.walk(PathExpr::parse(path).segments()).ok()
    }

    pub fn get_strict(&self, path: &str) -> Result<&Value, StoreError> {
        let expr = PathExpr::parse(path);
        let segments = expr.segments();
        self.walk(segments)
            .map_err(|depth| StoreError::not_found(path, &segments[..depth]))
    }

    /// Strict lookup of a string value.
    pub fn get_str(&self, path: &str) -> Result<&str, StoreError> {
        let value = self.get_strict(path)?;
        value.as_str().ok_or_else(|| StoreError::TypeMismatch {
            path: path.to_string(),
            expected: "string",
            found: value.type_name(),
        })
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Value> {
        let expr = PathExpr::parse(path);
        let (last, parents) = expr.split_last()?;
        self.descend_mut(parents)?.entries.get_mut(last)
    }

    /// The node at `path`; the empty path is this node.
    pub fn node(&self, path: &str) -> Option<&Node> {
        let expr = PathExpr::parse(path);
        if expr.is_root() {
            return Some(self);
        }
        self.walk(expr.segments()).ok()?.as_node()
    }

    pub fn node_mut(&mut self, path: &str) -> Option<&mut Node> {
        let expr = PathExpr::parse(path);
        self.descend_mut(expr.segments())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Stores `value` at `path`, creating intermediate nodes on the way.
    ///
    /// Siblings along the path are kept. A non-node value in the middle of
    /// the path is replaced by a fresh node. Returns `false` when the path is
    /// empty or names a reserved key.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> bool {
        let expr = PathExpr::parse(path);
        if expr.has_reserved_segment() {
            debug!("refusing to set reserved path `{path}`");
            return false;
        }
        let Some((last, parents)) = expr.split_last() else {
            return false;
        };

        let mut current = self;
        for segment in parents {
            let slot = current
                .entries
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Node(Node::new()));
            if !slot.is_node() {
                *slot = Value::Node(Node::new());
            }
            let Value::Node(next) = slot else {
                return false;
            };
            current = next;
        }
        current.insert(last, value)
    }

    /// Like [`Node::set`], but only overwrites: the full path must already
    /// hold a value.
    pub fn set_strict(&mut self, path: &str, value: impl Into<Value>) -> Result<(), StoreError> {
        self.get_strict(path)?;
        self.set(path, value);
        Ok(())
    }

    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let expr = PathExpr::parse(path);
        let (last, parents) = expr.split_last()?;
        self.descend_mut(parents)?.entries.shift_remove(last)
    }

    pub fn remove_strict(&mut self, path: &str) -> Result<Value, StoreError> {
        self.get_strict(path)?;
        self.remove(path)
            .ok_or_else(|| StoreError::not_found(path, &[]))
    }

    /// Every non-node value with its dotted path, depth first.
    pub fn leaves(&self) -> Vec<(String, &Value)> {
        let mut found = Vec::new();
        self.collect_leaves(&mut Vec::new(), &mut found);
        found
    }

    pub fn to_mapping(&self) -> Map<String, JsonValue> {
        self.entries
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect()
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(self.to_mapping())
    }

    /// Resolves `segments`; on failure returns how many of them resolved.
    fn walk(&self, segments: &[&str]) -> Result<&Value, usize> {
        let (last, parents) = segments.split_last().ok_or(0usize)?;
        let mut current = self;
        for (depth, segment) in parents.iter().enumerate() {
            current = match current.entries.get(*segment) {
                Some(Value::Node(node)) => node,
                Some(_) => return Err(depth + 1),
                None => return Err(depth),
            };
        }
        current.entries.get(*last).ok_or(parents.len())
    }

    fn descend_mut(&mut self, segments: &[&str]) -> Option<&mut Node> {
        let mut current = self;
        for segment in segments {
            current = current.entries.get_mut(*segment)?.as_node_mut()?;
        }
        Some(current)
    }

    fn collect_leaves<'a>(
        &'a self,
        prefix: &mut Vec<&'a str>,
        found: &mut Vec<(String, &'a Value)>,
    ) {
        for (key, value) in &self.entries {
            prefix.push(key);
            match value {
                Value::Node(node) => node.collect_leaves(prefix, found),
                leaf => found.push((join(prefix), leaf)),
            }
            prefix.pop();
        }
    }
}

impl IntoIterator for Node {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl TryFrom<JsonValue> for Node {
    type Error = StoreError;

    fn try_from(json: JsonValue) -> Result<Self, Self::Error> {
        Node::from_json(json)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = JsonValue::deserialize(deserializer)?;
        Node::from_json(json).map_err(de::Error::custom)
    }
}

fn json_type_name(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
