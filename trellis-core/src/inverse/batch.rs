//! Pending essential writes of one change request.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::array::ArrayKey;
use crate::component::ComponentIdx;
use crate::value::Value;

/// Essential writes collected while planning. Nothing is applied until the
/// whole plan succeeded.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct ChangeBatch {
    scalars: IndexMap<(ComponentIdx, String), Value>,
    entries: IndexMap<(ComponentIdx, String), BTreeMap<ArrayKey, Value>>,
}

impl ChangeBatch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a scalar write. Two different values for one cell conflict.
    pub(crate) fn set_scalar(&mut self, component: ComponentIdx, variable: &str, value: Value) -> Result<(), String> {
        match self.scalars.get(&(component, variable.to_string())) {
            Some(existing) if *existing != value => Err(conflict(component, variable, existing, &value)),
            Some(_) => Ok(()),
            None => {
                self.scalars.insert((component, variable.to_string()), value);
                Ok(())
            }
        }
    }

    pub(crate) fn set_entry(
        &mut self,
        component: ComponentIdx,
        variable: &str,
        key: ArrayKey,
        value: Value,
    ) -> Result<(), String> {
        let cell = self.entries.entry((component, variable.to_string())).or_default();
        match cell.get(&key) {
            Some(existing) if *existing != value => {
                Err(conflict(component, &format!("{variable}{key}"), existing, &value))
            }
            Some(_) => Ok(()),
            None => {
                cell.insert(key, value);
                Ok(())
            }
        }
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        IndexMap<(ComponentIdx, String), Value>,
        IndexMap<(ComponentIdx, String), BTreeMap<ArrayKey, Value>>,
    ) {
        (self.scalars, self.entries)
    }

    pub(crate) fn len(&self) -> usize {
        self.scalars.len() + self.entries.values().map(BTreeMap::len).sum::<usize>()
    }
}

fn conflict(component: ComponentIdx, variable: &str, existing: &Value, value: &Value) -> String {
    format!("conflicting writes to {component}.{variable}: {existing} and {value}")
}
