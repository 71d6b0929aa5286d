//! Dependency descriptors.
//!
//! A definition does not read other values directly. It returns a map of
//! named descriptors, the resolver materializes them into
//! [`DependencyValues`](super::DependencyValues), and the definition then
//! computes from those. Because the map is produced per resolution, its shape
//! may depend on the values of determining variables.

use indexmap::IndexMap;

use crate::component::ComponentIdx;
use crate::value::Value;

/// Which component a state-variable dependency points at.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentRef {
    This,
    Parent,
    /// Nearest ancestor of the given type.
    Ancestor(String),
    Component(ComponentIdx),
    Named(String),
    /// The component this one shadows, if any.
    ShadowSource,
}

/// One dependency of a state variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Dependency {
    /// A state variable of some component. `variable` may also be an array
    /// entry name (`x2`) or entry-group name (`point3`).
    StateVariable {
        component: ComponentRef,
        variable: String,
    },
    /// Active children belonging to any of the named child groups, each
    /// reported as a map of `componentIdx`, `componentType` and the
    /// requested variables.
    ChildGroup {
        groups: Vec<String>,
        variables: Vec<String>,
    },
    /// Active descendants of the given types, depth first.
    Descendants {
        component_types: Vec<String>,
        variables: Vec<String>,
    },
    /// Literal attribute value of this component (the attribute default if
    /// absent, flagged as a default).
    Attribute(String),
    /// A fixed value.
    Value(Value),
    /// This component's variant descriptor.
    Variant,
    /// Current size of an array variable.
    ArraySize {
        component: ComponentRef,
        variable: String,
    },
    /// What a component stands for in the tree: the flattened active
    /// replacements of a composite, or the component itself.
    Replacements(ComponentRef),
}

impl Dependency {
    /// A variable of the same component.
    pub fn state(variable: impl Into<String>) -> Self {
        Dependency::StateVariable {
            component: ComponentRef::This,
            variable: variable.into(),
        }
    }

    pub fn of(component: ComponentRef, variable: impl Into<String>) -> Self {
        Dependency::StateVariable {
            component,
            variable: variable.into(),
        }
    }

    pub fn parent(variable: impl Into<String>) -> Self {
        Self::of(ComponentRef::Parent, variable)
    }

    pub fn children<G, V>(groups: G, variables: V) -> Self
    where
        G: IntoIterator,
        G::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        Dependency::ChildGroup {
            groups: groups.into_iter().map(Into::into).collect(),
            variables: variables.into_iter().map(Into::into).collect(),
        }
    }

    pub fn descendants<T, V>(component_types: T, variables: V) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        Dependency::Descendants {
            component_types: component_types.into_iter().map(Into::into).collect(),
            variables: variables.into_iter().map(Into::into).collect(),
        }
    }

    pub fn attribute(name: impl Into<String>) -> Self {
        Dependency::Attribute(name.into())
    }

    pub fn array_size(variable: impl Into<String>) -> Self {
        Dependency::ArraySize {
            component: ComponentRef::This,
            variable: variable.into(),
        }
    }
}

/// The dependency set a variable declares for one resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Dependencies {
    Map(IndexMap<String, Dependency>),
    /// The determining values admit no dependency set; resolve to the
    /// declared default and flag it as a default.
    UseDefault,
}

impl Dependencies {
    pub fn none() -> Self {
        Dependencies::Map(IndexMap::new())
    }

    pub fn with(self, name: impl Into<String>, dependency: Dependency) -> Self {
        match self {
            Dependencies::Map(mut map) => {
                map.insert(name.into(), dependency);
                Dependencies::Map(map)
            }
            Dependencies::UseDefault => Dependencies::UseDefault,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Dependency> {
        match self {
            Dependencies::Map(map) => map.get(name),
            Dependencies::UseDefault => None,
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Dependency)> for Dependencies {
    fn from_iter<I: IntoIterator<Item = (K, Dependency)>>(iter: I) -> Self {
        Dependencies::Map(iter.into_iter().map(|(k, d)| (k.into(), d)).collect())
    }
}
