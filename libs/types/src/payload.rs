//! Path-addressable payload container
//!
//! A payload is a JSON object. Nested values are addressed with paths whose
//! segments are separated by [`SEPARATOR`]; a segment that lands on an array
//! is parsed as an index. `set` creates missing intermediate objects and may
//! append to an array by addressing index `len`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PathError;

pub const SEPARATOR: char = ':';

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value; non-object values are stored under `value`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            Value::Null => Self::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Self(map)
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split(SEPARATOR);
        let first = segments.next().filter(|s| !s.is_empty())?;
        let mut node = self.0.get(first)?;
        for segment in segments {
            node = match node {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(node)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Value> {
        let mut segments = path.split(SEPARATOR);
        let first = segments.next().filter(|s| !s.is_empty())?;
        let mut node = self.0.get_mut(first)?;
        for segment in segments {
            node = match node {
                Value::Object(map) => map.get_mut(segment)?,
                Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(node)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn get_i64(&self, path: &str) -> Option<i64> {
        self.get(path).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(Value::as_bool)
    }

    /// Store `value` at `path`, creating intermediate objects.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<(), PathError> {
        if path.is_empty() {
            return Err(PathError::Empty);
        }
        let segments: Vec<&str> = path.split(SEPARATOR).collect();
        let (last, parents) = segments.split_last().ok_or(PathError::Empty)?;
        let value = value.into();

        let Some((first, rest)) = parents.split_first() else {
            self.0.insert(last.to_string(), value);
            return Ok(());
        };
        let mut node = self
            .0
            .entry(first.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        for segment in rest {
            node = descend_or_create(node, path, segment)?;
        }
        assign(node, path, last, value)
    }

    /// Remove and return the value at `path`.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        match path.rsplit_once(SEPARATOR) {
            None => self.0.remove(path),
            Some((parent, last)) => match self.get_mut(parent)? {
                Value::Object(map) => map.remove(last),
                Value::Array(items) => {
                    let index = last.parse::<usize>().ok()?;
                    (index < items.len()).then(|| items.remove(index))
                }
                _ => None,
            },
        }
    }

    /// Merge `src` into `self`. Nested objects merge recursively; other
    /// collisions keep the existing value unless `overwrite` is set.
    pub fn merge(&mut self, src: &Payload, overwrite: bool) {
        merge_maps(&mut self.0, &src.0, overwrite);
    }

    /// Leaves keyed by their full path joined with `sep`.
    pub fn flatten(&self, sep: &str) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        for (key, value) in &self.0 {
            flatten_into(&mut out, key.clone(), value, sep);
        }
        out
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(text) => f.write_str(&text),
            Err(_) => f.write_str("{?}"),
        }
    }
}

fn descend_or_create<'a>(
    node: &'a mut Value,
    path: &str,
    segment: &str,
) -> Result<&'a mut Value, PathError> {
    match node {
        Value::Object(map) => Ok(map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()))),
        Value::Array(items) => {
            let index = parse_index(path, segment)?;
            let len = items.len();
            if index == len {
                items.push(Value::Object(Map::new()));
            } else if index > len {
                return Err(PathError::IndexOutOfRange { path: path.to_string(), index, len });
            }
            Ok(&mut items[index])
        }
        _ => Err(PathError::NotAContainer {
            path: path.to_string(),
            segment: segment.to_string(),
        }),
    }
}

fn assign(parent: &mut Value, path: &str, last: &str, value: Value) -> Result<(), PathError> {
    match parent {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = parse_index(path, last)?;
            let len = items.len();
            if index < len {
                items[index] = value;
            } else if index == len {
                items.push(value);
            } else {
                return Err(PathError::IndexOutOfRange { path: path.to_string(), index, len });
            }
            Ok(())
        }
        _ => Err(PathError::NotAContainer {
            path: path.to_string(),
            segment: last.to_string(),
        }),
    }
}

fn parse_index(path: &str, segment: &str) -> Result<usize, PathError> {
    segment.parse::<usize>().map_err(|_| PathError::BadIndex {
        path: path.to_string(),
        segment: segment.to_string(),
    })
}

fn merge_maps(dst: &mut Map<String, Value>, src: &Map<String, Value>, overwrite: bool) {
    for (key, incoming) in src {
        match dst.get_mut(key) {
            Some(Value::Object(existing)) if incoming.is_object() => {
                if let Value::Object(nested) = incoming {
                    merge_maps(existing, nested, overwrite);
                }
            }
            Some(existing) => {
                if overwrite {
                    *existing = incoming.clone();
                }
            }
            None => {
                dst.insert(key.clone(), incoming.clone());
            }
        }
    }
}

fn flatten_into(out: &mut BTreeMap<String, Value>, prefix: String, value: &Value, sep: &str) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, nested) in map {
                flatten_into(out, format!("{prefix}{sep}{key}"), nested, sep);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, nested) in items.iter().enumerate() {
                flatten_into(out, format!("{prefix}{sep}{index}"), nested, sep);
            }
        }
        leaf => {
            out.insert(prefix, leaf.clone());
        }
    }
}
