//! Mapping between external entry names and array keys.
//!
//! An array variable may expose its entries under one or more name prefixes.
//! A name carries one-based indices separated by `_`:
//!
//! - `x2` addresses entry `[1]` of a one-dimensional array;
//! - `point3_2` addresses entry `[2, 1]` of a two-dimensional array;
//! - `point3` addresses the whole third row `[2, *]` of that array.

use serde::{Deserialize, Serialize};

use super::key::ArrayKey;

/// What an entry name refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryRef {
    /// A single entry.
    Single(ArrayKey),
    /// Every entry whose leading indices match (zero-based).
    Group(Vec<usize>),
}

/// Entry naming convention of one array variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryNaming {
    prefixes: Vec<String>,
    dimensions: usize,
}

impl EntryNaming {
    pub fn new<I, S>(prefixes: I, dimensions: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Parse an external name. Returns `None` if it is not an entry name.
    pub fn parse(&self, name: &str) -> Option<EntryRef> {
        // Longest prefix first so "xx2" is not read as "x" + "x2".
        let mut candidates: Vec<&String> = self.prefixes.iter().collect();
        candidates.sort_by_key(|p| std::cmp::Reverse(p.len()));
        for prefix in candidates {
            let Some(rest) = name.strip_prefix(prefix.as_str()) else {
                continue;
            };
            if let Some(indices) = parse_indices(rest) {
                if indices.is_empty() || indices.len() > self.dimensions {
                    continue;
                }
                return Some(if indices.len() == self.dimensions {
                    EntryRef::Single(ArrayKey::new(&indices))
                } else {
                    EntryRef::Group(indices)
                });
            }
        }
        None
    }

    /// Canonical external name of a single entry.
    pub fn name_for_key(&self, key: &ArrayKey) -> Option<String> {
        if key.dimensions() != self.dimensions {
            return None;
        }
        self.name_for_indices(key.indices())
    }

    /// Canonical external name of a group (leading indices, zero-based).
    pub fn name_for_group(&self, leading: &[usize]) -> Option<String> {
        if leading.is_empty() || leading.len() >= self.dimensions {
            return None;
        }
        self.name_for_indices(leading)
    }

    fn name_for_indices(&self, indices: &[usize]) -> Option<String> {
        let prefix = self.prefixes.first()?;
        let parts: Vec<String> = indices.iter().map(|i| (i + 1).to_string()).collect();
        Some(format!("{prefix}{}", parts.join("_")))
    }
}

fn parse_indices(rest: &str) -> Option<Vec<usize>> {
    if rest.is_empty() {
        return None;
    }
    rest.split('_')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            match part.parse::<usize>() {
                Ok(n) if n >= 1 => Some(n - 1),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_and_group_names() {
        let naming = EntryNaming::new(["point"], 2);
        assert_eq!(
            naming.parse("point3_2"),
            Some(EntryRef::Single(ArrayKey::new(&[2, 1])))
        );
        assert_eq!(naming.parse("point3"), Some(EntryRef::Group(vec![2])));
        assert_eq!(naming.parse("point0"), None);
        assert_eq!(naming.parse("point1_2_3"), None);
        assert_eq!(naming.parse("points"), None);
        assert_eq!(naming.parse("point"), None);
    }

    #[test]
    fn names_round_trip() {
        let naming = EntryNaming::new(["point"], 2);
        let key = ArrayKey::new(&[4, 0]);
        let name = naming.name_for_key(&key).unwrap();
        assert_eq!(name, "point5_1");
        assert_eq!(naming.parse(&name), Some(EntryRef::Single(key)));
        assert_eq!(naming.name_for_group(&[1]).as_deref(), Some("point2"));
        assert_eq!(naming.name_for_group(&[1, 1]), None);
    }

    #[test]
    fn longest_prefix_wins_but_first_is_canonical() {
        let naming = EntryNaming::new(["x", "xx"], 1);
        assert_eq!(naming.parse("xx2"), Some(EntryRef::Single(ArrayKey::single(1))));
        assert_eq!(naming.parse("x2"), Some(EntryRef::Single(ArrayKey::single(1))));
        assert_eq!(naming.name_for_key(&ArrayKey::single(0)).as_deref(), Some("x1"));
    }
}
