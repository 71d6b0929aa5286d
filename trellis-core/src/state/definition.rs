//! State-variable definitions.
//!
//! A definition bundles everything the resolver needs to compute one named
//! variable of a component type: which variables determine the shape of its
//! dependencies, how to produce the dependency set, how to compute the value
//! from resolved dependencies, and optionally how to invert that computation.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::dependency::{Dependencies, Dependency};
use crate::array::ArraySpec;
use crate::error::Warning;
use crate::value::Value;

/// A resolved dependency and whether it came from a default.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyValue {
    pub value: Value,
    pub used_default: bool,
}

/// Resolved dependencies, keyed by the names the definition chose.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyValues {
    values: IndexMap<String, DependencyValue>,
}

static NULL: Value = Value::Null;

impl DependencyValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value, used_default: bool) {
        self.values.insert(
            name.into(),
            DependencyValue {
                value,
                used_default,
            },
        );
    }

    /// Value of a dependency, or `Null` if absent.
    pub fn get(&self, name: &str) -> &Value {
        self.values.get(name).map_or(&NULL, |d| &d.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Whether the dependency resolved through an unset essential value or
    /// an absent attribute.
    pub fn used_default(&self, name: &str) -> bool {
        self.values.get(name).is_some_and(|d| d.used_default)
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.get(name).as_f64()
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).as_bool()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DependencyValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// What a definition produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Value(Value),
    /// Use the essential value (or the declared default if none is stored).
    UseEssential,
    /// The inputs are malformed; resolve to an error sentinel.
    Failed(String),
}

/// Result of running a definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub outcome: Outcome,
    pub warnings: Vec<Warning>,
}

impl Resolution {
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            outcome: Outcome::Value(value.into()),
            warnings: Vec::new(),
        }
    }

    pub fn use_essential() -> Self {
        Self {
            outcome: Outcome::UseEssential,
            warnings: Vec::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Failed(message.into()),
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: Warning) -> Self {
        self.warnings.push(warning);
        self
    }
}

impl From<Value> for Resolution {
    fn from(value: Value) -> Self {
        Resolution::value(value)
    }
}

/// A primitive step produced by an inverse definition.
#[derive(Debug, Clone, PartialEq)]
pub enum InverseInstruction {
    /// Write this variable's (or this array entry's) essential value.
    SetEssential(Value),
    /// Request a change of the named dependency.
    SetDependency { dependency: String, desired: Value },
    /// Request a change of one child reported by a child-group dependency.
    SetChild {
        dependency: String,
        index: usize,
        variable: String,
        desired: Value,
    },
}

/// `Err` carries the reason the edit was refused.
pub type InverseResult = Result<Vec<InverseInstruction>, String>;

/// Input to an inverse definition.
#[derive(Debug)]
pub struct InverseRequest<'a> {
    pub desired: &'a Value,
    pub current: &'a Value,
    pub dependencies: &'a DependencyValues,
    /// The current value came from the essential store or the default.
    pub used_essential: bool,
}

/// Opaque invalidation tags raised when a variable goes stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StaleSignal {
    /// The owning composite must diff its replacements.
    UpdateReplacements,
    /// The renderer must refresh the owning component.
    UpdateRenderer,
    Custom(String),
}

pub type DependenciesFn = Arc<dyn Fn(&DependencyValues) -> Dependencies + Send + Sync>;
pub type DefinitionFn = Arc<dyn Fn(&DependencyValues) -> Resolution + Send + Sync>;
pub type InverseFn = Arc<dyn Fn(&InverseRequest<'_>) -> InverseResult + Send + Sync>;

/// Definition of one state variable.
#[derive(Clone)]
pub struct StateVariableDefinition {
    /// Variables whose values are passed to `dependencies`.
    pub determining: Vec<String>,
    pub dependencies: DependenciesFn,
    pub definition: DefinitionFn,
    pub inverse: Option<InverseFn>,
    pub default_value: Value,
    pub mark_stale: Vec<StaleSignal>,
    pub array: Option<ArraySpec>,
    /// Boolean variable of the same component that, when true, refuses edits.
    pub locked_by: Option<String>,
    /// Attribute whose literal seeds the essential value at construction.
    pub seed_attribute: Option<String>,
}

impl StateVariableDefinition {
    /// A general definition whose dependency set is computed from the
    /// determining values.
    pub fn new<D, F>(dependencies: D, definition: F) -> Self
    where
        D: Fn(&DependencyValues) -> Dependencies + Send + Sync + 'static,
        F: Fn(&DependencyValues) -> Resolution + Send + Sync + 'static,
    {
        Self {
            determining: Vec::new(),
            dependencies: Arc::new(dependencies),
            definition: Arc::new(definition),
            inverse: None,
            default_value: Value::Null,
            mark_stale: Vec::new(),
            array: None,
            locked_by: None,
            seed_attribute: None,
        }
    }

    /// A definition with a fixed dependency set.
    pub fn computed<I, K, F>(dependencies: I, definition: F) -> Self
    where
        I: IntoIterator<Item = (K, Dependency)>,
        K: Into<String>,
        F: Fn(&DependencyValues) -> Resolution + Send + Sync + 'static,
    {
        let dependencies: Dependencies = dependencies.into_iter().collect();
        Self::new(move |_| dependencies.clone(), definition)
    }

    /// A variable backed only by the essential store.
    pub fn essential(default_value: impl Into<Value>) -> Self {
        Self::new(|_| Dependencies::none(), |_| Resolution::use_essential())
            .with_default(default_value)
            .with_inverse(|req| Ok(vec![InverseInstruction::SetEssential(req.desired.clone())]))
    }

    /// An array-valued variable.
    pub fn array(spec: ArraySpec) -> Self {
        let mut definition = Self::new(|_| Dependencies::none(), |_| Resolution::use_essential());
        definition.default_value = Value::List(Vec::new());
        definition.array = Some(spec);
        definition
    }

    pub fn determined_by<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.determining = variables.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_inverse<F>(mut self, inverse: F) -> Self
    where
        F: Fn(&InverseRequest<'_>) -> InverseResult + Send + Sync + 'static,
    {
        self.inverse = Some(Arc::new(inverse));
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = value.into();
        self
    }

    pub fn marks_stale(mut self, signal: StaleSignal) -> Self {
        self.mark_stale.push(signal);
        self
    }

    pub fn locked_by(mut self, variable: impl Into<String>) -> Self {
        self.locked_by = Some(variable.into());
        self
    }

    pub fn seeded_from_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.seed_attribute = Some(attribute.into());
        self
    }

    pub fn is_array(&self) -> bool {
        self.array.is_some()
    }
}

impl fmt::Debug for StateVariableDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateVariableDefinition")
            .field("determining", &self.determining)
            .field("has_inverse", &self.inverse.is_some())
            .field("default_value", &self.default_value)
            .field("mark_stale", &self.mark_stale)
            .field("is_array", &self.is_array())
            .field("locked_by", &self.locked_by)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dependency_reads_as_null() {
        let mut values = DependencyValues::new();
        values.insert("x", Value::Number(2.0), true);
        assert_eq!(values.f64("x"), Some(2.0));
        assert!(values.used_default("x"));
        assert!(values.get("y").is_null());
        assert!(!values.used_default("y"));
    }

    #[test]
    fn essential_definition_inverts_to_essential_write() {
        let def = StateVariableDefinition::essential(3.0);
        let deps = DependencyValues::new();
        assert_eq!((def.definition)(&deps).outcome, Outcome::UseEssential);

        let desired = Value::Number(5.0);
        let request = InverseRequest {
            desired: &desired,
            current: &Value::Number(3.0),
            dependencies: &deps,
            used_essential: true,
        };
        let inverse = def.inverse.as_ref().unwrap();
        assert_eq!(
            inverse(&request),
            Ok(vec![InverseInstruction::SetEssential(Value::Number(5.0))])
        );
    }

    #[test]
    fn computed_definition_returns_fixed_dependencies() {
        let def = StateVariableDefinition::computed(
            [("base", Dependency::state("value"))],
            |deps| Resolution::value(deps.f64("base").unwrap_or(0.0) * 2.0),
        );
        let deps = (def.dependencies)(&DependencyValues::new());
        assert_eq!(deps.get("base"), Some(&Dependency::state("value")));

        let mut values = DependencyValues::new();
        values.insert("base", Value::Number(4.0), false);
        assert_eq!((def.definition)(&values).outcome, Outcome::Value(Value::Number(8.0)));
    }
}
