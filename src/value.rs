//! The plain data tree that [`crate::convert`] lowers the AST into, and that
//! [`crate::merge`]/[`crate::resolve`] operate on. See spec §3 ("Data model").

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::span::SourceSpan;

/// Deterministic key order matters for the merge/provenance invariants, so
/// the data tree uses `BTreeMap` rather than a hash map throughout.
pub type Map = BTreeMap<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(n) => write!(f, "{n}"),
        }
    }
}

/// A reference placeholder: `@alias:seg1.seg2...` (spec §3, §6). Survives
/// AST→Data conversion verbatim and is rewritten in place by the resolver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Placeholder {
    pub alias: String,
    pub path: Vec<String>,
    #[serde(skip)]
    pub span: SourceSpan,
    /// Sibling map entries written alongside `@alias:path` in the same map
    /// literal (spec §4.11 step 8: "pool: @cfg:pool, pool: {max: 100}").
    /// `None` unless the placeholder sits in a map and has overrides.
    pub overrides: Option<Map>,
}

/// A value in the (pre- or post-resolution) data tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<Value>),
    Map(Map),
    Placeholder(Placeholder),
}

impl Value {
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut Map> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Self::Map(_))
    }

    /// `true` once no placeholder remains anywhere in the tree (spec
    /// invariant: "every reference placeholder has been replaced or has
    /// produced a warning/error").
    pub fn is_fully_resolved(&self) -> bool {
        match self {
            Self::Placeholder(_) => false,
            Self::List(items) => items.iter().all(Value::is_fully_resolved),
            Self::Map(map) => map.values().all(Value::is_fully_resolved),
            _ => true,
        }
    }

    /// Walks the tree, collecting every placeholder along with the key path
    /// that reaches it (used by the validator, spec §4.10).
    pub fn placeholders<'a>(&'a self, out: &mut Vec<(Vec<String>, &'a Placeholder)>) {
        fn walk<'a>(path: &mut Vec<String>, value: &'a Value, out: &mut Vec<(Vec<String>, &'a Placeholder)>) {
            match value {
                Value::Placeholder(p) => out.push((path.clone(), p)),
                Value::Map(map) => {
                    for (k, v) in map {
                        path.push(k.clone());
                        walk(path, v, out);
                        path.pop();
                    }
                }
                Value::List(items) => {
                    for (i, v) in items.iter().enumerate() {
                        path.push(i.to_string());
                        walk(path, v, out);
                        path.pop();
                    }
                }
                _ => {}
            }
        }
        let mut path = Vec::new();
        walk(&mut path, self, out);
    }
}

impl From<&serde_json::Value> for Value {
    fn from(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Number(Number::Int(i))
                } else {
                    Value::Number(Number::Float(n.as_f64().unwrap_or_default()))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Value::Map(map.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect())
            }
        }
    }
}
