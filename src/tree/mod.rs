//! A small hierarchical container of named children and typed arrays.
//!
//! Meshes move through this crate as trees: named children addressed by
//! `/`-separated paths, with leaves holding typed arrays. Bulk arrays live
//! behind `Arc`, so cloning a [`Node`] copies structure only — a clone is a
//! shallow view that shares the coordinate and connectivity buffers with
//! its source. Children keep insertion order, which makes tree iteration
//! (and everything serialized from it) deterministic.
//!
//! Scalars are stored as one-element arrays; the converting accessors
//! (`to_f64_vec`, `to_i64_vec`, `to_i64`) accept any numeric leaf kind.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::mesh_error::MeshLoomError;

/// A typed leaf value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// No value; interior nodes usually stay empty.
    #[default]
    Empty,
    /// A string value (shape names, type tags).
    Str(String),
    /// 32-bit integer array.
    Int32(Arc<Vec<i32>>),
    /// 64-bit integer array (the default index width).
    Int64(Arc<Vec<i64>>),
    /// Double-precision array.
    Float64(Arc<Vec<f64>>),
}

impl Value {
    /// Short kind name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Str(_) => "string",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Float64(_) => "float64",
        }
    }

    /// Number of elements held by this leaf.
    pub fn num_elements(&self) -> usize {
        match self {
            Value::Empty => 0,
            Value::Str(_) => 1,
            Value::Int32(v) => v.len(),
            Value::Int64(v) => v.len(),
            Value::Float64(v) => v.len(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}
impl From<Vec<i32>> for Value {
    fn from(v: Vec<i32>) -> Self {
        Value::Int32(Arc::new(v))
    }
}
impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::Int64(Arc::new(v))
    }
}
impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Float64(Arc::new(v))
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(Arc::new(vec![v]))
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(Arc::new(vec![v]))
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(Arc::new(vec![v]))
    }
}

/// A tree node: an optional leaf [`Value`] plus named, ordered children.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    value: Value,
    children: Vec<(String, Node)>,
}

impl Node {
    /// Create an empty node.
    pub fn new() -> Self {
        Self::default()
    }

    /// The leaf value of this node.
    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Set the leaf value, replacing whatever was there.
    pub fn set(&mut self, value: impl Into<Value>) {
        self.value = value.into();
    }

    /// True if this node has neither a value nor children.
    pub fn is_empty(&self) -> bool {
        matches!(self.value, Value::Empty) && self.children.is_empty()
    }

    /// Number of direct children.
    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    /// Iterate direct children in insertion order.
    pub fn children(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.children.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// Look up a direct child by name.
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    /// Look up or create a direct child by name.
    pub fn child_mut(&mut self, name: &str) -> &mut Node {
        if let Some(pos) = self.children.iter().position(|(n, _)| n == name) {
            return &mut self.children[pos].1;
        }
        self.children.push((name.to_owned(), Node::new()));
        &mut self.children.last_mut().expect("just pushed").1
    }

    /// Insert or replace a direct child.
    pub fn set_child(&mut self, name: &str, node: Node) {
        if let Some(pos) = self.children.iter().position(|(n, _)| n == name) {
            self.children[pos].1 = node;
        } else {
            self.children.push((name.to_owned(), node));
        }
    }

    /// Look up a descendant by `/`-separated path.
    pub fn fetch(&self, path: &str) -> Option<&Node> {
        let mut cur = self;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            cur = cur.child(part)?;
        }
        Some(cur)
    }

    /// Look up a descendant by path, failing if any component is missing.
    pub fn fetch_existing(&self, path: &str) -> Result<&Node, MeshLoomError> {
        self.fetch(path)
            .ok_or_else(|| MeshLoomError::MissingPath(path.to_owned()))
    }

    /// Look up a descendant by path, creating intermediate nodes.
    pub fn fetch_mut(&mut self, path: &str) -> &mut Node {
        let mut cur = self;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            cur = cur.child_mut(part);
        }
        cur
    }

    /// True if the path resolves to a node.
    pub fn has_path(&self, path: &str) -> bool {
        self.fetch(path).is_some()
    }

    /// Number of elements in the leaf value.
    pub fn num_elements(&self) -> usize {
        self.value.num_elements()
    }

    // --- strict accessors -------------------------------------------------

    /// The string value, if this leaf is a string.
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The f64 array, if this leaf is `Float64`.
    pub fn as_f64s(&self) -> Option<&[f64]> {
        match &self.value {
            Value::Float64(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// The i64 array, if this leaf is `Int64`.
    pub fn as_i64s(&self) -> Option<&[i64]> {
        match &self.value {
            Value::Int64(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// The i32 array, if this leaf is `Int32`.
    pub fn as_i32s(&self) -> Option<&[i32]> {
        match &self.value {
            Value::Int32(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    // --- converting accessors ---------------------------------------------

    /// Convert any numeric leaf to an `f64` vector.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match &self.value {
            Value::Float64(v) => Some(v.as_slice().to_vec()),
            Value::Int64(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Value::Int32(v) => Some(v.iter().map(|&x| x as f64).collect()),
            _ => None,
        }
    }

    /// Convert any numeric leaf to an `i64` vector. Floats truncate.
    pub fn to_i64_vec(&self) -> Option<Vec<i64>> {
        match &self.value {
            Value::Int64(v) => Some(v.as_slice().to_vec()),
            Value::Int32(v) => Some(v.iter().map(|&x| x as i64).collect()),
            Value::Float64(v) => Some(v.iter().map(|&x| x as i64).collect()),
            _ => None,
        }
    }

    /// The first element of a numeric leaf as `f64`.
    pub fn to_f64(&self) -> Option<f64> {
        match &self.value {
            Value::Float64(v) => v.first().copied(),
            Value::Int64(v) => v.first().map(|&x| x as f64),
            Value::Int32(v) => v.first().map(|&x| x as f64),
            _ => None,
        }
    }

    /// The first element of a numeric leaf as `i64`.
    pub fn to_i64(&self) -> Option<i64> {
        match &self.value {
            Value::Int64(v) => v.first().copied(),
            Value::Int32(v) => v.first().map(|&x| x as i64),
            Value::Float64(v) => v.first().map(|&x| x as i64),
            _ => None,
        }
    }

    // --- path + conversion helpers ----------------------------------------

    /// Fetch `path` and convert it to an `f64` vector.
    pub fn fetch_f64_vec(&self, path: &str) -> Result<Vec<f64>, MeshLoomError> {
        self.fetch_existing(path)?
            .to_f64_vec()
            .ok_or(MeshLoomError::TypeMismatch {
                path: path.to_owned(),
                expected: "a numeric array",
            })
    }

    /// Fetch `path` and convert it to an `i64` vector.
    pub fn fetch_i64_vec(&self, path: &str) -> Result<Vec<i64>, MeshLoomError> {
        self.fetch_existing(path)?
            .to_i64_vec()
            .ok_or(MeshLoomError::TypeMismatch {
                path: path.to_owned(),
                expected: "an integer array",
            })
    }

    /// Fetch `path` as an integer scalar.
    pub fn fetch_i64(&self, path: &str) -> Result<i64, MeshLoomError> {
        self.fetch_existing(path)?
            .to_i64()
            .ok_or(MeshLoomError::TypeMismatch {
                path: path.to_owned(),
                expected: "an integer scalar",
            })
    }

    /// Fetch `path` as a string.
    pub fn fetch_str(&self, path: &str) -> Result<&str, MeshLoomError> {
        self.fetch_existing(path)?
            .as_str()
            .ok_or(MeshLoomError::TypeMismatch {
                path: path.to_owned(),
                expected: "a string",
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_mut_creates_intermediates() {
        let mut n = Node::new();
        n.fetch_mut("topologies/mesh/type").set("unstructured");
        assert!(n.has_path("topologies/mesh"));
        assert_eq!(n.fetch_str("topologies/mesh/type").unwrap(), "unstructured");
        assert!(n.fetch("topologies/boundary").is_none());
    }

    #[test]
    fn children_keep_insertion_order() {
        let mut n = Node::new();
        n.fetch_mut("b").set(1i64);
        n.fetch_mut("a").set(2i64);
        n.fetch_mut("c").set(3i64);
        let names: Vec<_> = n.children().map(|(name, _)| name.to_owned()).collect();
        assert_eq!(names, ["b", "a", "c"]);
    }

    #[test]
    fn converting_accessors() {
        let mut n = Node::new();
        n.set(vec![1i32, 2, 3]);
        assert_eq!(n.to_i64_vec().unwrap(), vec![1, 2, 3]);
        assert_eq!(n.to_f64_vec().unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(n.to_i64().unwrap(), 1);
        assert!(n.as_f64s().is_none());
    }

    #[test]
    fn missing_path_errors() {
        let n = Node::new();
        assert_eq!(
            n.fetch_existing("nope").unwrap_err(),
            MeshLoomError::MissingPath("nope".into())
        );
    }

    #[test]
    fn clone_shares_bulk_arrays() {
        let mut n = Node::new();
        n.fetch_mut("coordsets/coords/values/x")
            .set(vec![0.0f64, 1.0, 2.0]);
        let view = n.clone();
        let a = match n.fetch("coordsets/coords/values/x").unwrap().value() {
            Value::Float64(v) => Arc::clone(v),
            _ => unreachable!(),
        };
        let b = match view.fetch("coordsets/coords/values/x").unwrap().value() {
            Value::Float64(v) => Arc::clone(v),
            _ => unreachable!(),
        };
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn bincode_roundtrip() {
        let mut n = Node::new();
        n.fetch_mut("state/cycle").set(100i64);
        n.fetch_mut("coordsets/coords/values/x").set(vec![0.5f64]);
        let bytes = bincode::serialize(&n).unwrap();
        let back: Node = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, n);
    }
}
