//! Structured response values
//!
//! The generic tree a decoded response materializes into.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// A decoded response value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    /// UTF-8 string
    String(String),

    /// Unsigned integer
    Int(u64),

    /// Boolean
    Bool(bool),

    /// Ordered list
    List(Vec<Value>),

    /// Mapping (keys are usually strings)
    Map(BTreeMap<Value, Value>),

    /// Raw-data marker: the number of payload bytes that follow the
    /// response on the channel and must be drained before reuse
    Data(u64),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<Value, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a string key in a map value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?.get(&Value::String(key.to_string()))
    }

    /// Declared payload length if this is a raw-data marker
    pub fn data_len(&self) -> Option<u64> {
        match self {
            Value::Data(len) => Some(*len),
            _ => None,
        }
    }

    /// The `result` status code of a service response (0 is success)
    pub fn result_code(&self) -> Option<u64> {
        self.get("result")?.as_u64()
    }

    /// All raw-data markers in this tree, depth first
    pub fn data_markers(&self) -> Vec<u64> {
        let mut found = Vec::new();
        let mut stack = vec![self];
        while let Some(value) = stack.pop() {
            match value {
                Value::Data(len) => found.push(*len),
                Value::List(items) => stack.extend(items.iter().rev()),
                Value::Map(map) => {
                    for (k, v) in map.iter().rev() {
                        stack.push(v);
                        stack.push(k);
                    }
                }
                _ => {}
            }
        }
        found
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

// Raw-data markers serialize as their declared length.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::String(s) => serializer.serialize_str(s),
            Value::Int(n) | Value::Data(n) => serializer.serialize_u64(*n),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                // Object keys must be strings; other keys use their compact text form.
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    match k {
                        Value::String(key) => out.serialize_entry(key.as_str(), v)?,
                        other => out.serialize_entry(&other.to_string(), v)?,
                    }
                }
                out.end()
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            other => write_compact(other, f),
        }
    }
}

/// Compact single-line form with quoted strings
fn write_compact(value: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value {
        Value::String(s) => write!(f, "{:?}", s),
        Value::Int(n) | Value::Data(n) => write!(f, "{}", n),
        Value::Bool(b) => write!(f, "{}", b),
        Value::List(items) => {
            f.write_str("[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write_compact(item, f)?;
            }
            f.write_str("]")
        }
        Value::Map(map) => {
            f.write_str("{")?;
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write_compact(k, f)?;
                f.write_str(":")?;
                write_compact(v, f)?;
            }
            f.write_str("}")
        }
    }
}
