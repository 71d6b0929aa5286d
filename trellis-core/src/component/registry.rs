//! Component types as capability tables.
//!
//! A [`ComponentType`] is plain data: declared attributes, child groups,
//! state-variable definitions and, for composites, a [`CompositeBehavior`].
//! Shared behavior is packaged as a [`Capability`] and merged into a type
//! when it is built, so two types can share rounding or fixedness without a
//! common ancestor.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::array::EntryRef;
use crate::composite::CompositeBehavior;
use crate::error::{CoreError, Result};
use crate::state::StateVariableDefinition;
use crate::value::{Value, ValueKind};

/// Child-group member that accepts every component type.
pub const ANY_TYPE: &str = "*";

/// Declaration of one attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSpec {
    pub kind: ValueKind,
    pub default: Value,
    /// When set, values outside this list are replaced by the default.
    pub valid_values: Option<Vec<Value>>,
    /// Also define an essential state variable of the same name, seeded from
    /// the attribute.
    pub creates_variable: bool,
}

impl AttributeSpec {
    pub fn new(kind: ValueKind, default: impl Into<Value>) -> Self {
        Self {
            kind,
            default: default.into(),
            valid_values: None,
            creates_variable: false,
        }
    }

    pub fn valid_values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.valid_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn creating_variable(mut self) -> Self {
        self.creates_variable = true;
        self
    }

    /// Coerce and validate a literal. `None` means the literal is unusable.
    pub fn accept(&self, literal: &Value) -> Option<Value> {
        let value = literal.coerce(self.kind)?;
        match &self.valid_values {
            Some(valid) if !valid.iter().any(|v| text_eq(v, &value)) => None,
            _ => Some(value),
        }
    }
}

fn text_eq(a: &Value, b: &Value) -> bool {
    match (a.as_str(), b.as_str()) {
        (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
        _ => a == b,
    }
}

/// A named set of acceptable child types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildGroup {
    pub name: String,
    pub component_types: Vec<String>,
}

impl ChildGroup {
    pub fn accepts(&self, component_type: &str) -> bool {
        self.component_types
            .iter()
            .any(|t| t == ANY_TYPE || t == component_type)
    }
}

/// Capability table of one component type.
#[derive(Clone)]
pub struct ComponentType {
    name: String,
    attributes: IndexMap<String, AttributeSpec>,
    child_groups: Vec<ChildGroup>,
    state_variables: IndexMap<String, Arc<StateVariableDefinition>>,
    primary_variable: Option<String>,
    composite: Option<Arc<dyn CompositeBehavior>>,
}

impl ComponentType {
    pub fn builder(name: impl Into<String>) -> ComponentTypeBuilder {
        ComponentTypeBuilder {
            ty: ComponentType {
                name: name.into(),
                attributes: IndexMap::new(),
                child_groups: Vec::new(),
                state_variables: IndexMap::new(),
                primary_variable: None,
                composite: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> &IndexMap<String, AttributeSpec> {
        &self.attributes
    }

    pub fn child_groups(&self) -> &[ChildGroup] {
        &self.child_groups
    }

    /// Whether `group` is declared and accepts `component_type`.
    pub fn group_accepts(&self, group: &str, component_type: &str) -> bool {
        self.child_groups
            .iter()
            .any(|g| g.name == group && g.accepts(component_type))
    }

    /// Whether any declared group accepts `component_type`.
    pub fn accepts_child(&self, component_type: &str) -> bool {
        self.child_groups.iter().any(|g| g.accepts(component_type))
    }

    pub fn variable(&self, name: &str) -> Option<&Arc<StateVariableDefinition>> {
        self.state_variables.get(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, &Arc<StateVariableDefinition>)> {
        self.state_variables.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Find the array variable exposing `name` as an entry or entry group.
    pub fn entry_variable(&self, name: &str) -> Option<(&str, EntryRef)> {
        self.state_variables.iter().find_map(|(variable, definition)| {
            let entry = definition.array.as_ref()?.naming.parse(name)?;
            Some((variable.as_str(), entry))
        })
    }

    /// Whether `name` is a variable, entry or entry group of this type.
    pub fn has_name(&self, name: &str) -> bool {
        self.state_variables.contains_key(name) || self.entry_variable(name).is_some()
    }

    /// The variable a shadow copy mirrors.
    pub fn primary_variable(&self) -> Option<&str> {
        self.primary_variable.as_deref()
    }

    pub fn composite(&self) -> Option<&Arc<dyn CompositeBehavior>> {
        self.composite.as_ref()
    }

    pub fn is_composite(&self) -> bool {
        self.composite.is_some()
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.name)
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .field("child_groups", &self.child_groups)
            .field("state_variables", &self.state_variables.keys().collect::<Vec<_>>())
            .field("primary_variable", &self.primary_variable)
            .field("is_composite", &self.is_composite())
            .finish()
    }
}

/// Reusable attributes and state variables merged into types at build time.
#[derive(Debug, Clone, Default)]
pub struct Capability {
    attributes: IndexMap<String, AttributeSpec>,
    state_variables: IndexMap<String, StateVariableDefinition>,
}

impl Capability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, name: impl Into<String>, spec: AttributeSpec) -> Self {
        self.attributes.insert(name.into(), spec);
        self
    }

    pub fn state_variable(mut self, name: impl Into<String>, definition: StateVariableDefinition) -> Self {
        self.state_variables.insert(name.into(), definition);
        self
    }
}

/// Builder for [`ComponentType`].
pub struct ComponentTypeBuilder {
    ty: ComponentType,
}

impl ComponentTypeBuilder {
    pub fn attribute(mut self, name: impl Into<String>, spec: AttributeSpec) -> Self {
        self.ty.attributes.insert(name.into(), spec);
        self
    }

    pub fn child_group<I, S>(mut self, name: impl Into<String>, component_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ty.child_groups.push(ChildGroup {
            name: name.into(),
            component_types: component_types.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn state_variable(mut self, name: impl Into<String>, definition: StateVariableDefinition) -> Self {
        self.ty
            .state_variables
            .insert(name.into(), Arc::new(definition));
        self
    }

    pub fn primary(mut self, variable: impl Into<String>) -> Self {
        self.ty.primary_variable = Some(variable.into());
        self
    }

    pub fn composite<B: CompositeBehavior + 'static>(mut self, behavior: B) -> Self {
        self.ty.composite = Some(Arc::new(behavior));
        self
    }

    /// Merge a capability. Declarations already on the type win.
    pub fn with(mut self, capability: &Capability) -> Self {
        for (name, spec) in &capability.attributes {
            self.ty
                .attributes
                .entry(name.clone())
                .or_insert_with(|| spec.clone());
        }
        for (name, definition) in &capability.state_variables {
            self.ty
                .state_variables
                .entry(name.clone())
                .or_insert_with(|| Arc::new(definition.clone()));
        }
        self
    }

    pub fn build(mut self) -> ComponentType {
        let synthesized: Vec<(String, Value)> = self
            .ty
            .attributes
            .iter()
            .filter(|(name, spec)| spec.creates_variable && !self.ty.state_variables.contains_key(*name))
            .map(|(name, spec)| (name.clone(), spec.default.clone()))
            .collect();
        for (name, default) in synthesized {
            let definition = StateVariableDefinition::essential(default).seeded_from_attribute(name.clone());
            self.ty.state_variables.insert(name, Arc::new(definition));
        }
        self.ty
    }
}

/// All known component types, by name.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<ComponentType>>,
}

impl TypeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the builtin catalog.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::builtin::register_all(&mut registry);
        registry
    }

    /// Register a type, replacing any type of the same name.
    pub fn register(&mut self, ty: ComponentType) {
        self.types.insert(ty.name.clone(), Arc::new(ty));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ComponentType>> {
        self.types.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&Arc<ComponentType>> {
        self.get(name)
            .ok_or_else(|| CoreError::UnknownComponentType(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{ArraySpec, EntryNaming};
    use crate::state::Dependency;

    #[test]
    fn attribute_variables_are_synthesized() {
        let ty = ComponentType::builder("widget")
            .attribute("size", AttributeSpec::new(ValueKind::Number, 1.0).creating_variable())
            .attribute("label", AttributeSpec::new(ValueKind::Text, ""))
            .build();
        let size = ty.variable("size").unwrap();
        assert_eq!(size.seed_attribute.as_deref(), Some("size"));
        assert_eq!(size.default_value, Value::Number(1.0));
        assert!(ty.variable("label").is_none());
    }

    #[test]
    fn attribute_validation() {
        let spec = AttributeSpec::new(ValueKind::Text, "number").valid_values(["number", "letters"]);
        assert_eq!(spec.accept(&Value::text("Letters")), Some(Value::text("Letters")));
        assert_eq!(spec.accept(&Value::text("colors")), None);
        let spec = AttributeSpec::new(ValueKind::Integer, 0);
        assert_eq!(spec.accept(&Value::text("12")), Some(Value::Integer(12)));
        assert_eq!(spec.accept(&Value::text("twelve")), None);
    }

    #[test]
    fn capabilities_do_not_override_type_declarations() {
        let capability = Capability::new()
            .attribute("fixed", AttributeSpec::new(ValueKind::Boolean, false).creating_variable())
            .state_variable("value", StateVariableDefinition::essential(1.0));
        let ty = ComponentType::builder("thing")
            .state_variable("value", StateVariableDefinition::essential(7.0))
            .with(&capability)
            .build();
        assert_eq!(ty.variable("value").unwrap().default_value, Value::Number(7.0));
        assert!(ty.variable("fixed").is_some());
    }

    #[test]
    fn entry_names_resolve_to_array_variables() {
        let spec = ArraySpec::new(EntryNaming::new(["x"], 1), 0.0, vec![3]);
        let ty = ComponentType::builder("vector")
            .state_variable("xs", StateVariableDefinition::array(spec))
            .state_variable(
                "first",
                StateVariableDefinition::computed([("x", Dependency::state("x1"))], |d| {
                    d.get("x").clone().into()
                }),
            )
            .child_group("anything", [ANY_TYPE])
            .build();
        let (variable, entry) = ty.entry_variable("x2").unwrap();
        assert_eq!(variable, "xs");
        assert!(matches!(entry, EntryRef::Single(_)));
        assert!(ty.has_name("first"));
        assert!(!ty.has_name("y1"));
        assert!(ty.group_accepts("anything", "point"));
        assert!(!ty.group_accepts("options", "point"));
    }

    #[test]
    fn unknown_type_is_an_error() {
        let registry = TypeRegistry::new();
        assert!(matches!(
            registry.require("nope"),
            Err(CoreError::UnknownComponentType(_))
        ));
    }
}
