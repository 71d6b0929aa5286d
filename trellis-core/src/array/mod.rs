//! Array-valued state variables.
//!
//! An array variable has a size that is itself resolved from dependencies,
//! and one graph node per entry. Each entry declares its own dependencies,
//! so a change to one entry's source invalidates that entry (and the
//! whole-array value) without touching its siblings.
//!
//! # Callbacks
//!
//! - `size_dependencies` / `size`: the current extent in every dimension.
//! - `dependencies_by_key` / `definition_by_key`: one entry. Returning
//!   [`Outcome::UseEssential`](crate::state::Outcome) reads the entry from
//!   the array's essential cell, falling back to `default_entry`.
//! - `inverse_by_key`: optional. Without it, entries that resolved from the
//!   essential cell are written there and entries with exactly one
//!   state-variable dependency forward the edit to it.

mod key;
mod naming;

use std::fmt;
use std::sync::Arc;

pub use key::{all_keys, flatten, keys_with_prefix, nest, size_from_value, size_to_value, ArrayKey};
pub use naming::{EntryNaming, EntryRef};

use crate::state::{
    Dependencies, DependenciesFn, Dependency, DependencyValues, InverseRequest, InverseResult,
    Resolution,
};
use crate::value::Value;

pub type SizeFn = Arc<dyn Fn(&DependencyValues) -> Result<Vec<usize>, String> + Send + Sync>;
pub type KeyDependenciesFn = Arc<dyn Fn(&ArrayKey, &DependencyValues) -> Dependencies + Send + Sync>;
pub type KeyDefinitionFn = Arc<dyn Fn(&ArrayKey, &DependencyValues) -> Resolution + Send + Sync>;
pub type KeyInverseFn = Arc<dyn Fn(&ArrayKey, &InverseRequest<'_>) -> InverseResult + Send + Sync>;

/// Array-mode callbacks of a state variable.
#[derive(Clone)]
pub struct ArraySpec {
    pub naming: EntryNaming,
    pub default_entry: Value,
    pub size_dependencies: DependenciesFn,
    pub size: SizeFn,
    pub dependencies_by_key: KeyDependenciesFn,
    pub definition_by_key: KeyDefinitionFn,
    pub inverse_by_key: Option<KeyInverseFn>,
}

impl ArraySpec {
    /// An array of essential entries with a fixed size.
    pub fn new(naming: EntryNaming, default_entry: impl Into<Value>, size: Vec<usize>) -> Self {
        Self {
            naming,
            default_entry: default_entry.into(),
            size_dependencies: Arc::new(|_| Dependencies::none()),
            size: Arc::new(move |_| Ok(size.clone())),
            dependencies_by_key: Arc::new(|_, _| Dependencies::none()),
            definition_by_key: Arc::new(|_, _| Resolution::use_essential()),
            inverse_by_key: None,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.naming.dimensions()
    }

    /// Size computed from a fixed set of dependencies.
    pub fn sized_by<I, K, F>(mut self, dependencies: I, size: F) -> Self
    where
        I: IntoIterator<Item = (K, Dependency)>,
        K: Into<String>,
        F: Fn(&DependencyValues) -> Result<Vec<usize>, String> + Send + Sync + 'static,
    {
        let dependencies: Dependencies = dependencies.into_iter().collect();
        self.size_dependencies = Arc::new(move |_| dependencies.clone());
        self.size = Arc::new(size);
        self
    }

    /// Size whose dependency set depends on the determining values.
    pub fn sized_dynamically<D, F>(mut self, dependencies: D, size: F) -> Self
    where
        D: Fn(&DependencyValues) -> Dependencies + Send + Sync + 'static,
        F: Fn(&DependencyValues) -> Result<Vec<usize>, String> + Send + Sync + 'static,
    {
        self.size_dependencies = Arc::new(dependencies);
        self.size = Arc::new(size);
        self
    }

    pub fn entries<D, F>(mut self, dependencies_by_key: D, definition_by_key: F) -> Self
    where
        D: Fn(&ArrayKey, &DependencyValues) -> Dependencies + Send + Sync + 'static,
        F: Fn(&ArrayKey, &DependencyValues) -> Resolution + Send + Sync + 'static,
    {
        self.dependencies_by_key = Arc::new(dependencies_by_key);
        self.definition_by_key = Arc::new(definition_by_key);
        self
    }

    pub fn with_inverse<F>(mut self, inverse: F) -> Self
    where
        F: Fn(&ArrayKey, &InverseRequest<'_>) -> InverseResult + Send + Sync + 'static,
    {
        self.inverse_by_key = Some(Arc::new(inverse));
        self
    }
}

impl fmt::Debug for ArraySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArraySpec")
            .field("naming", &self.naming)
            .field("default_entry", &self.default_entry)
            .field("has_inverse", &self.inverse_by_key.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Outcome;

    #[test]
    fn fixed_size_spec_uses_essential_entries() {
        let spec = ArraySpec::new(EntryNaming::new(["x"], 1), 0.0, vec![3]);
        let values = DependencyValues::new();
        assert_eq!((spec.size)(&values), Ok(vec![3]));
        assert_eq!(
            (spec.definition_by_key)(&ArrayKey::single(1), &values).outcome,
            Outcome::UseEssential
        );
        assert_eq!(spec.dimensions(), 1);
    }

    #[test]
    fn sized_by_reads_dependency() {
        let spec = ArraySpec::new(EntryNaming::new(["x"], 1), 0.0, vec![0]).sized_by(
            [("n", Dependency::state("numDimensions"))],
            |deps| deps.get("n").as_usize().map(|n| vec![n]).ok_or_else(|| "no size".to_string()),
        );
        let mut values = DependencyValues::new();
        values.insert("n", Value::Integer(4), false);
        assert_eq!((spec.size)(&values), Ok(vec![4]));
        assert!((spec.size)(&DependencyValues::new()).is_err());
    }
}
