//! Essential value store.
//!
//! Essential values are the persisted fallbacks behind state variables that
//! have no external source, and the terminal target of inverse edits. A
//! cell exists only once something was written; absence means "default".
//! Array variables keep one cell holding a sparse map of entries, so a
//! batch of entry writes lands on a single cell while staleness can still
//! be tracked per key.

use std::collections::{BTreeMap, HashMap};

use crate::array::ArrayKey;
use crate::component::ComponentIdx;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
enum EssentialCell {
    Scalar(Value),
    Entries(BTreeMap<ArrayKey, Value>),
}

/// Per-component essential values.
#[derive(Debug, Default)]
pub struct EssentialStore {
    cells: HashMap<(ComponentIdx, String), EssentialCell>,
}

impl EssentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scalar(&self, component: ComponentIdx, variable: &str) -> Option<&Value> {
        match self.cells.get(&(component, variable.to_string()))? {
            EssentialCell::Scalar(value) => Some(value),
            EssentialCell::Entries(_) => None,
        }
    }

    pub fn entry(&self, component: ComponentIdx, variable: &str, key: &ArrayKey) -> Option<&Value> {
        match self.cells.get(&(component, variable.to_string()))? {
            EssentialCell::Entries(entries) => entries.get(key),
            EssentialCell::Scalar(_) => None,
        }
    }

    /// Write a scalar cell. Returns whether the stored value changed.
    pub fn set_scalar(&mut self, component: ComponentIdx, variable: &str, value: Value) -> bool {
        let cell = EssentialCell::Scalar(value);
        let key = (component, variable.to_string());
        let changed = self.cells.get(&key) != Some(&cell);
        self.cells.insert(key, cell);
        changed
    }

    /// Write several entries of an array cell at once. Returns the keys
    /// whose stored value changed.
    pub fn set_entries<I>(&mut self, component: ComponentIdx, variable: &str, entries: I) -> Vec<ArrayKey>
    where
        I: IntoIterator<Item = (ArrayKey, Value)>,
    {
        let cell = self
            .cells
            .entry((component, variable.to_string()))
            .or_insert_with(|| EssentialCell::Entries(BTreeMap::new()));
        if let EssentialCell::Scalar(_) = cell {
            *cell = EssentialCell::Entries(BTreeMap::new());
        }
        let EssentialCell::Entries(stored) = cell else {
            return Vec::new();
        };
        let mut changed = Vec::new();
        for (key, value) in entries {
            if stored.get(&key) != Some(&value) {
                changed.push(key.clone());
            }
            stored.insert(key, value);
        }
        changed
    }

    pub fn has_cell(&self, component: ComponentIdx, variable: &str) -> bool {
        self.cells.contains_key(&(component, variable.to_string()))
    }

    /// Drop every cell of a removed component.
    pub fn remove_component(&mut self, component: ComponentIdx) {
        self.cells.retain(|(c, _), _| *c != component);
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_cell_reads_as_none() {
        let store = EssentialStore::new();
        assert!(store.scalar(ComponentIdx(0), "value").is_none());
        assert!(store.entry(ComponentIdx(0), "xs", &ArrayKey::single(0)).is_none());
    }

    #[test]
    fn scalar_write_reports_change() {
        let mut store = EssentialStore::new();
        let c = ComponentIdx(1);
        assert!(store.set_scalar(c, "value", Value::Number(2.0)));
        assert!(!store.set_scalar(c, "value", Value::Number(2.0)));
        assert_eq!(store.scalar(c, "value"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn entry_writes_are_sparse() {
        let mut store = EssentialStore::new();
        let c = ComponentIdx(2);
        let changed = store.set_entries(
            c,
            "xs",
            [
                (ArrayKey::single(0), Value::Number(1.0)),
                (ArrayKey::single(2), Value::Number(3.0)),
            ],
        );
        assert_eq!(changed.len(), 2);
        assert!(store.entry(c, "xs", &ArrayKey::single(1)).is_none());

        let changed = store.set_entries(
            c,
            "xs",
            [
                (ArrayKey::single(0), Value::Number(1.0)),
                (ArrayKey::single(1), Value::Number(9.0)),
            ],
        );
        assert_eq!(changed, vec![ArrayKey::single(1)]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn removing_component_drops_its_cells() {
        let mut store = EssentialStore::new();
        store.set_scalar(ComponentIdx(1), "a", Value::Bool(true));
        store.set_scalar(ComponentIdx(2), "a", Value::Bool(true));
        store.remove_component(ComponentIdx(1));
        assert!(!store.has_cell(ComponentIdx(1), "a"));
        assert!(store.has_cell(ComponentIdx(2), "a"));
    }
}
