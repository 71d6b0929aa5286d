//! Component arena.
//!
//! Every component lives in one arena and is addressed by a stable
//! [`ComponentIdx`]. Parent, shadow and composite links are indices, never
//! references. Slots of removed components stay empty; indices are not
//! reused, so a stale index can only miss, never alias.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::serialized::ShadowLink;
use crate::error::{CoreError, Result, SourcePosition};
use crate::value::Value;
use crate::variant::DesiredVariant;

/// Stable index of a component in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentIdx(pub u32);

impl fmt::Display for ComponentIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<ComponentIdx> for Value {
    fn from(idx: ComponentIdx) -> Self {
        Value::Integer(i64::from(idx.0))
    }
}

impl ComponentIdx {
    /// Read an index written by `Value::from(ComponentIdx)`.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().and_then(|i| u32::try_from(i).ok()).map(ComponentIdx)
    }
}

/// A live component.
#[derive(Debug, Clone)]
pub struct Component {
    pub idx: ComponentIdx,
    pub component_type: String,
    pub name: Option<String>,
    /// Literal attribute values after validation.
    pub attributes: IndexMap<String, Value>,
    pub children: Vec<ComponentIdx>,
    pub parent: Option<ComponentIdx>,
    /// Set on replacements: the composite that generated and owns them.
    pub owner: Option<ComponentIdx>,
    pub shadow: Option<ShadowLink>,
    pub position: Option<SourcePosition>,
    pub variant: Option<DesiredVariant>,
}

/// Owner of all components.
#[derive(Debug, Default)]
pub struct ComponentArena {
    slots: Vec<Option<Component>>,
    names: HashMap<String, ComponentIdx>,
}

impl ComponentArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the next inserted component will receive.
    pub fn next_idx(&self) -> ComponentIdx {
        ComponentIdx(self.slots.len() as u32)
    }

    pub fn insert(&mut self, component: Component) -> ComponentIdx {
        let idx = self.next_idx();
        debug_assert_eq!(component.idx, idx);
        if let Some(name) = &component.name {
            // First definition of a name wins; copies keep the source's name.
            self.names.entry(name.clone()).or_insert(idx);
        }
        self.slots.push(Some(component));
        idx
    }

    pub fn get(&self, idx: ComponentIdx) -> Option<&Component> {
        self.slots.get(idx.0 as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, idx: ComponentIdx) -> Option<&mut Component> {
        self.slots.get_mut(idx.0 as usize).and_then(Option::as_mut)
    }

    pub fn require(&self, idx: ComponentIdx) -> Result<&Component> {
        self.get(idx).ok_or(CoreError::UnknownComponent(idx))
    }

    pub fn require_mut(&mut self, idx: ComponentIdx) -> Result<&mut Component> {
        self.get_mut(idx).ok_or(CoreError::UnknownComponent(idx))
    }

    pub fn contains(&self, idx: ComponentIdx) -> bool {
        self.get(idx).is_some()
    }

    pub fn remove(&mut self, idx: ComponentIdx) -> Option<Component> {
        let component = self.slots.get_mut(idx.0 as usize)?.take()?;
        if let Some(name) = &component.name {
            if self.names.get(name) == Some(&idx) {
                self.names.remove(name);
            }
        }
        Some(component)
    }

    pub fn lookup_name(&self, name: &str) -> Option<ComponentIdx> {
        self.names.get(name).copied()
    }

    /// Nearest ancestor (excluding `idx`) of the given type.
    pub fn ancestor_of_type(&self, idx: ComponentIdx, component_type: &str) -> Option<ComponentIdx> {
        let mut current = self.get(idx)?.parent;
        while let Some(parent) = current {
            let component = self.get(parent)?;
            if component.component_type == component_type {
                return Some(parent);
            }
            current = component.parent;
        }
        None
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.slots.iter().filter_map(Option::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(arena: &ComponentArena, ty: &str, name: Option<&str>) -> Component {
        Component {
            idx: arena.next_idx(),
            component_type: ty.to_string(),
            name: name.map(str::to_string),
            attributes: IndexMap::new(),
            children: Vec::new(),
            parent: None,
            owner: None,
            shadow: None,
            position: None,
            variant: None,
        }
    }

    #[test]
    fn indices_are_not_reused() {
        let mut arena = ComponentArena::new();
        let a = arena.insert(component(&arena, "number", Some("a")));
        arena.remove(a);
        let b = arena.insert(component(&arena, "number", None));
        assert_ne!(a, b);
        assert!(arena.get(a).is_none());
        assert!(matches!(arena.require(a), Err(CoreError::UnknownComponent(_))));
        assert_eq!(arena.lookup_name("a"), None);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn first_name_wins() {
        let mut arena = ComponentArena::new();
        let a = arena.insert(component(&arena, "number", Some("n")));
        let _b = arena.insert(component(&arena, "number", Some("n")));
        assert_eq!(arena.lookup_name("n"), Some(a));
    }

    #[test]
    fn ancestor_lookup_walks_parents() {
        let mut arena = ComponentArena::new();
        let doc = arena.insert(component(&arena, "document", None));
        let mut group = component(&arena, "group", None);
        group.parent = Some(doc);
        let group = arena.insert(group);
        let mut leaf = component(&arena, "number", None);
        leaf.parent = Some(group);
        let leaf = arena.insert(leaf);

        assert_eq!(arena.ancestor_of_type(leaf, "document"), Some(doc));
        assert_eq!(arena.ancestor_of_type(leaf, "group"), Some(group));
        assert_eq!(arena.ancestor_of_type(doc, "document"), None);
    }
}
