//! Graph Nodes
//!
//! This module defines the nodes that live in the dependency graph. Every
//! resolvable quantity of a component (a state variable, one entry of an
//! array variable, an array size, the active-children list, the replacement
//! list, the variant descriptor) is a node addressed by a [`NodeKey`].

use std::collections::HashSet;
use std::fmt;

use crate::array::ArrayKey;
use crate::component::ComponentIdx;
use crate::value::Value;

/// Which quantity of a component a node holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    /// A scalar variable, or the whole value of an array variable.
    Variable(String),
    /// One entry of an array variable.
    Entry(String, ArrayKey),
    /// The size of an array variable.
    Size(String),
    /// Active children: children with composites replaced by their
    /// non-withheld replacements.
    Children,
    /// The component's variant descriptor.
    Variant,
    /// What the component stands for in the tree: its active replacements,
    /// flattened, for a composite, and the component itself otherwise.
    Replacements,
}

/// Address of a node in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub component: ComponentIdx,
    pub slot: Slot,
}

impl NodeKey {
    pub fn variable(component: ComponentIdx, name: impl Into<String>) -> Self {
        Self {
            component,
            slot: Slot::Variable(name.into()),
        }
    }

    pub fn entry(component: ComponentIdx, name: impl Into<String>, key: ArrayKey) -> Self {
        Self {
            component,
            slot: Slot::Entry(name.into(), key),
        }
    }

    pub fn size(component: ComponentIdx, name: impl Into<String>) -> Self {
        Self {
            component,
            slot: Slot::Size(name.into()),
        }
    }

    pub fn children(component: ComponentIdx) -> Self {
        Self {
            component,
            slot: Slot::Children,
        }
    }

    pub fn variant(component: ComponentIdx) -> Self {
        Self {
            component,
            slot: Slot::Variant,
        }
    }

    pub fn replacements(component: ComponentIdx) -> Self {
        Self {
            component,
            slot: Slot::Replacements,
        }
    }

    /// Name of the state variable this node belongs to, if any.
    pub fn variable_name(&self) -> Option<&str> {
        match &self.slot {
            Slot::Variable(name) | Slot::Entry(name, _) | Slot::Size(name) => Some(name),
            Slot::Children | Slot::Variant | Slot::Replacements => None,
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.component.0;
        match &self.slot {
            Slot::Variable(name) => write!(f, "c{c}.{name}"),
            Slot::Entry(name, key) => write!(f, "c{c}.{name}{key}"),
            Slot::Size(name) => write!(f, "c{c}.{name}#size"),
            Slot::Children => write!(f, "c{c}#children"),
            Slot::Variant => write!(f, "c{c}#variant"),
            Slot::Replacements => write!(f, "c{c}#replacements"),
        }
    }
}

/// Freshness of a node's cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Never resolved.
    Unresolved,
    /// The cached value matches the current inputs.
    Fresh,
    /// An input changed since the value was cached.
    Stale,
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct StateNode {
    freshness: Freshness,

    /// Last resolved value. Kept while stale so callers can compare.
    value: Value,

    /// The value came from an unset essential cell or a declared default.
    used_default: bool,

    /// The value came from the essential store (set or not).
    used_essential: bool,

    /// Nodes read by the last resolution.
    dependencies: HashSet<NodeKey>,

    /// Nodes whose last resolution read this node.
    dependents: HashSet<NodeKey>,

    /// Number of times the definition ran.
    evaluations: u64,
}

impl StateNode {
    pub fn new() -> Self {
        Self {
            freshness: Freshness::Unresolved,
            value: Value::Null,
            used_default: false,
            used_essential: false,
            dependencies: HashSet::new(),
            dependents: HashSet::new(),
            evaluations: 0,
        }
    }

    pub fn freshness(&self) -> Freshness {
        self.freshness
    }

    pub fn is_fresh(&self) -> bool {
        self.freshness == Freshness::Fresh
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn used_default(&self) -> bool {
        self.used_default
    }

    pub fn used_essential(&self) -> bool {
        self.used_essential
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Store a freshly computed value.
    pub fn resolve(&mut self, value: Value, used_default: bool, used_essential: bool) {
        self.value = value;
        self.used_default = used_default;
        self.used_essential = used_essential;
        self.freshness = Freshness::Fresh;
        self.evaluations += 1;
    }

    /// Mark the node stale. Returns false if it was not fresh.
    pub fn mark_stale(&mut self) -> bool {
        if self.freshness == Freshness::Fresh {
            self.freshness = Freshness::Stale;
            true
        } else {
            false
        }
    }

    pub fn add_dependency(&mut self, key: NodeKey) {
        self.dependencies.insert(key);
    }

    pub fn remove_dependency(&mut self, key: &NodeKey) {
        self.dependencies.remove(key);
    }

    pub fn dependencies(&self) -> &HashSet<NodeKey> {
        &self.dependencies
    }

    pub fn add_dependent(&mut self, key: NodeKey) {
        self.dependents.insert(key);
    }

    pub fn remove_dependent(&mut self, key: &NodeKey) {
        self.dependents.remove(key);
    }

    pub fn dependents(&self) -> &HashSet<NodeKey> {
        &self.dependents
    }

    /// Drop all dependency edges, returning them.
    pub fn take_dependencies(&mut self) -> HashSet<NodeKey> {
        std::mem::take(&mut self.dependencies)
    }
}

impl Default for StateNode {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_node_is_unresolved() {
        let node = StateNode::new();
        assert_eq!(node.freshness(), Freshness::Unresolved);
        assert!(node.value().is_null());
        assert_eq!(node.evaluations(), 0);
    }

    #[test]
    fn only_fresh_nodes_go_stale() {
        let mut node = StateNode::new();
        assert!(!node.mark_stale());

        node.resolve(Value::Integer(3), false, true);
        assert!(node.is_fresh());
        assert!(node.used_essential());
        assert!(node.mark_stale());
        assert_eq!(node.freshness(), Freshness::Stale);
        assert!(!node.mark_stale());
        assert_eq!(node.value(), &Value::Integer(3));
    }

    #[test]
    fn dependency_management() {
        let mut node = StateNode::new();
        let dep1 = NodeKey::variable(ComponentIdx(1), "a");
        let dep2 = NodeKey::entry(ComponentIdx(1), "xs", ArrayKey::single(0));

        node.add_dependency(dep1.clone());
        node.add_dependency(dep2.clone());
        assert_eq!(node.dependencies().len(), 2);

        node.remove_dependency(&dep1);
        assert!(!node.dependencies().contains(&dep1));

        let taken = node.take_dependencies();
        assert!(taken.contains(&dep2));
        assert!(node.dependencies().is_empty());
    }

    #[test]
    fn keys_display_their_slot() {
        let c = ComponentIdx(3);
        assert_eq!(NodeKey::variable(c, "value").to_string(), "c3.value");
        assert_eq!(
            NodeKey::entry(c, "xs", ArrayKey::new(&[0, 1])).to_string(),
            "c3.xs[0,1]"
        );
        assert_eq!(NodeKey::size(c, "xs").to_string(), "c3.xs#size");
        assert_eq!(NodeKey::children(c).to_string(), "c3#children");
        assert_eq!(NodeKey::replacements(c).to_string(), "c3#replacements");
        assert_eq!(NodeKey::variant(c).variable_name(), None);
    }
}
