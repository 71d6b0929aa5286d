//! Array keys: zero-based index tuples into array-valued state variables.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::value::Value;

/// Address of one entry of an array variable.
///
/// Indices are zero-based internally. External names (`x1`, `point3_2`) are
/// one-based; see [`EntryNaming`](super::EntryNaming).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArrayKey(pub SmallVec<[usize; 2]>);

impl ArrayKey {
    pub fn new(indices: &[usize]) -> Self {
        Self(SmallVec::from_slice(indices))
    }

    pub fn single(index: usize) -> Self {
        Self(smallvec::smallvec![index])
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// Whether every index lies inside `size`.
    pub fn fits(&self, size: &[usize]) -> bool {
        self.0.len() == size.len() && self.0.iter().zip(size).all(|(i, n)| i < n)
    }

    /// Row-major position of this key within an array of `size`.
    pub fn flat_index(&self, size: &[usize]) -> Option<usize> {
        if !self.fits(size) {
            return None;
        }
        let mut flat = 0;
        for (i, n) in self.0.iter().zip(size) {
            flat = flat * n + i;
        }
        Some(flat)
    }
}

impl fmt::Display for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", parts.join(","))
    }
}

/// All keys of an array of the given size, in row-major order.
pub fn all_keys(size: &[usize]) -> Vec<ArrayKey> {
    keys_with_prefix(size, &[])
}

/// Keys whose leading indices equal `prefix`, in row-major order.
pub fn keys_with_prefix(size: &[usize], prefix: &[usize]) -> Vec<ArrayKey> {
    if prefix.len() > size.len() || prefix.iter().zip(size).any(|(i, n)| i >= n) {
        return Vec::new();
    }
    let mut keys = vec![SmallVec::<[usize; 2]>::from_slice(prefix)];
    for &extent in &size[prefix.len()..] {
        let mut next = Vec::with_capacity(keys.len() * extent);
        for key in &keys {
            for i in 0..extent {
                let mut extended = key.clone();
                extended.push(i);
                next.push(extended);
            }
        }
        keys = next;
    }
    keys.into_iter().map(ArrayKey).collect()
}

/// Encode an array size as a value (a list of integers).
pub fn size_to_value(size: &[usize]) -> Value {
    Value::List(size.iter().map(|&n| Value::from(n)).collect())
}

/// Decode a size written by [`size_to_value`].
pub fn size_from_value(value: &Value) -> Option<Vec<usize>> {
    value.as_list()?.iter().map(Value::as_usize).collect()
}

/// Assemble entry values into a nested list shaped like `size`.
///
/// `entries` must be in row-major order and have exactly `product(size)`
/// elements.
pub fn nest(size: &[usize], entries: Vec<Value>) -> Value {
    match size {
        [] => entries.into_iter().next().unwrap_or_default(),
        [_] => Value::List(entries),
        [_, rest @ ..] => {
            let stride: usize = rest.iter().product();
            if stride == 0 {
                return Value::List(vec![Value::List(Vec::new()); size[0]]);
            }
            let mut rows = Vec::with_capacity(size[0]);
            let mut iter = entries.into_iter();
            for _ in 0..size[0] {
                let chunk: Vec<Value> = iter.by_ref().take(stride).collect();
                rows.push(nest(rest, chunk));
            }
            Value::List(rows)
        }
    }
}

/// Flatten a nested list into `(key, value)` pairs, following its own shape.
///
/// Used for whole-array edits: ragged input is accepted and only the
/// supplied positions are returned.
pub fn flatten(value: &Value, dimensions: usize) -> Vec<(ArrayKey, Value)> {
    fn walk(value: &Value, depth: usize, prefix: &mut Vec<usize>, out: &mut Vec<(ArrayKey, Value)>) {
        if depth == 0 {
            out.push((ArrayKey::new(prefix), value.clone()));
            return;
        }
        if let Some(items) = value.as_list() {
            for (i, item) in items.iter().enumerate() {
                prefix.push(i);
                walk(item, depth - 1, prefix, out);
                prefix.pop();
            }
        }
    }
    let mut out = Vec::new();
    walk(value, dimensions, &mut Vec::new(), &mut out);
    out
}
