//! Dependency Resolver
//!
//! Resolution is pull-based and lazy. Reading a node that is not fresh runs
//! a small scheduler:
//!
//! 1. Try to evaluate the node on top of the stack.
//! 2. If the attempt reads an unresolved node it returns
//!    [`Pull::Pending`] with that node; the scheduler pushes it and loops.
//! 3. Once the attempt completes, the value is cached, the nodes it read are
//!    recorded as its dependencies, and it is popped.
//!
//! An attempt is a plain function of the engine state; suspending simply
//! abandons it and resuming re-runs it. Attempts never mutate components or
//! essential values, so re-running is always safe. Encountering a node that
//! is already on the stack is a dependency cycle.
//!
//! Variables with determining variables resolve in two phases: the
//! determining values are read first and handed to the definition's
//! dependency function, whose answer is then materialized.

pub(crate) mod task;

use indexmap::{IndexMap, IndexSet};

use task::{ready, Evaluated, Pull, Read};

use crate::array::{all_keys, keys_with_prefix, nest, size_from_value, size_to_value, ArrayKey, EntryRef};
use crate::component::ComponentIdx;
use crate::engine::Engine;
use crate::error::{CoreError, Result, Warning};
use crate::graph::{NodeKey, Slot};
use crate::state::{
    ComponentRef, Dependencies, Dependency, DependencyValues, Outcome, Resolution,
    StateVariableDefinition,
};
use crate::value::Value;

/// Where an external variable name points.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Address {
    Node(NodeKey),
    /// A group of entries of an array variable sharing leading indices.
    Group { variable: String, prefix: Vec<usize> },
}

impl Engine {
    /// Run the scheduler until `root` is fresh.
    pub(crate) fn drive(&mut self, root: &NodeKey) -> Result<()> {
        if self.graph.is_fresh(root) {
            return Ok(());
        }
        let mut stack: IndexSet<NodeKey> = IndexSet::new();
        stack.insert(root.clone());

        while let Some(top) = stack.last().cloned() {
            if self.graph.is_fresh(&top) {
                stack.pop();
                continue;
            }
            match self.evaluate(&top)? {
                Pull::Ready(()) => {
                    stack.pop();
                }
                Pull::Pending(dependency) => {
                    if let Some(start) = stack.get_index_of(&dependency) {
                        let mut path: Vec<NodeKey> = stack.iter().skip(start).cloned().collect();
                        path.push(dependency);
                        return Err(CoreError::CircularDependency { path });
                    }
                    tracing::debug!(node = %top, waiting_on = %dependency, "suspended");
                    stack.insert(dependency);
                }
            }
        }
        Ok(())
    }

    /// Retry `attempt` until it stops suspending, resolving whatever it
    /// waits on in between.
    pub(crate) fn settle<T, F>(&mut self, mut attempt: F) -> Result<T>
    where
        F: FnMut(&mut Self, &mut Vec<NodeKey>) -> Result<Pull<T>>,
    {
        loop {
            let mut reads = Vec::new();
            match attempt(self, &mut reads)? {
                Pull::Ready(value) => return Ok(value),
                Pull::Pending(key) => self.drive(&key)?,
            }
        }
    }

    /// Resolve a node and return its cached value.
    pub(crate) fn resolve_key(&mut self, key: &NodeKey) -> Result<Value> {
        self.drive(key)?;
        Ok(self
            .graph
            .get(key)
            .map(|node| node.value().clone())
            .unwrap_or_default())
    }

    /// Map an external name to a node or entry group.
    pub(crate) fn address(&self, component: ComponentIdx, name: &str) -> Result<Address> {
        let ty = self.component_type(component)?;
        if ty.variable(name).is_some() || self.overrides.contains_key(&(component, name.to_string())) {
            return Ok(Address::Node(NodeKey::variable(component, name)));
        }
        match ty.entry_variable(name) {
            Some((variable, EntryRef::Single(key))) => Ok(Address::Node(NodeKey::entry(component, variable, key))),
            Some((variable, EntryRef::Group(prefix))) => Ok(Address::Group {
                variable: variable.to_string(),
                prefix,
            }),
            None => Err(CoreError::UnknownStateVariable {
                component,
                component_type: ty.name().to_string(),
                variable: name.to_string(),
            }),
        }
    }

    fn evaluate(&mut self, key: &NodeKey) -> Result<Pull<()>> {
        let mut reads = Vec::new();
        let component = key.component;
        let attempt = match &key.slot {
            Slot::Variable(name) => self.evaluate_variable(component, name, &mut reads)?,
            Slot::Entry(name, entry) => self.evaluate_entry(component, name, entry, &mut reads)?,
            Slot::Size(name) => self.evaluate_size(component, name, &mut reads)?,
            Slot::Children => self
                .evaluate_children(component)?
                .map(|children| Evaluated::computed(Value::List(children.into_iter().map(Value::from).collect()))),
            Slot::Variant => Pull::Ready(Evaluated::computed(self.variant_descriptor(component)?)),
            Slot::Replacements => self
                .evaluate_replacements(component, &mut reads)?
                .map(|stand_ins| Evaluated::computed(Value::List(stand_ins.into_iter().map(Value::from).collect()))),
        };
        let evaluated = ready!(attempt);
        tracing::trace!(node = %key, value = %evaluated.value, "resolved");
        self.graph.record_dependencies(key, reads);
        self.graph
            .ensure_node(key)
            .resolve(evaluated.value, evaluated.used_default, evaluated.used_essential);
        Ok(Pull::Ready(()))
    }

    fn evaluate_variable(
        &mut self,
        component: ComponentIdx,
        name: &str,
        reads: &mut Vec<NodeKey>,
    ) -> Result<Pull<Evaluated>> {
        let definition = self.definition(component, name)?;
        if definition.is_array() {
            let size = ready!(self.pull_size(component, name, reads)?);
            let mut entries = Vec::new();
            for key in all_keys(&size) {
                let read = ready!(self.pull(NodeKey::entry(component, name, key), reads));
                entries.push(read.value);
            }
            return Ok(Pull::Ready(Evaluated::computed(nest(&size, entries))));
        }

        let determining = ready!(self.determining_values(component, &definition, reads)?);
        let dependencies = match (definition.dependencies)(&determining) {
            Dependencies::Map(map) => map,
            Dependencies::UseDefault => {
                return Ok(Pull::Ready(Evaluated::defaulted(definition.default_value.clone())));
            }
        };
        let values = ready!(self.gather_all(component, &dependencies, reads)?);
        let resolution = (definition.definition)(&values);
        let essential = self.essential.scalar(component, name).cloned();
        Ok(Pull::Ready(self.apply_resolution(
            component,
            resolution,
            essential,
            &definition.default_value,
        )))
    }

    fn evaluate_entry(
        &mut self,
        component: ComponentIdx,
        name: &str,
        key: &ArrayKey,
        reads: &mut Vec<NodeKey>,
    ) -> Result<Pull<Evaluated>> {
        let definition = self.definition(component, name)?;
        let Some(spec) = definition.array.clone() else {
            return Err(self.unknown_variable(component, name));
        };
        let size = ready!(self.pull_size(component, name, reads)?);
        if !key.fits(&size) {
            return Ok(Pull::Ready(Evaluated::defaulted(Value::Null)));
        }
        let determining = ready!(self.determining_values(component, &definition, reads)?);
        let dependencies = match (spec.dependencies_by_key)(key, &determining) {
            Dependencies::Map(map) => map,
            Dependencies::UseDefault => {
                return Ok(Pull::Ready(Evaluated::defaulted(spec.default_entry.clone())));
            }
        };
        let values = ready!(self.gather_all(component, &dependencies, reads)?);
        let resolution = (spec.definition_by_key)(key, &values);
        let essential = self.essential.entry(component, name, key).cloned();
        Ok(Pull::Ready(self.apply_resolution(
            component,
            resolution,
            essential,
            &spec.default_entry,
        )))
    }

    fn evaluate_size(
        &mut self,
        component: ComponentIdx,
        name: &str,
        reads: &mut Vec<NodeKey>,
    ) -> Result<Pull<Evaluated>> {
        let definition = self.definition(component, name)?;
        let Some(spec) = definition.array.clone() else {
            return Err(self.unknown_variable(component, name));
        };
        let empty = vec![0; spec.dimensions()];
        let determining = ready!(self.determining_values(component, &definition, reads)?);
        let dependencies = match (spec.size_dependencies)(&determining) {
            Dependencies::Map(map) => map,
            Dependencies::UseDefault => return Ok(Pull::Ready(Evaluated::defaulted(size_to_value(&empty)))),
        };
        let values = ready!(self.gather_all(component, &dependencies, reads)?);
        let size = match (spec.size)(&values) {
            Ok(size) if size.len() == spec.dimensions() => size,
            Ok(size) => {
                self.warn(
                    component,
                    Warning::new(format!(
                        "size of '{name}' has {} dimensions, expected {}",
                        size.len(),
                        spec.dimensions()
                    )),
                );
                empty
            }
            Err(message) => {
                self.warn(component, Warning::new(format!("cannot size '{name}': {message}")));
                empty
            }
        };
        Ok(Pull::Ready(Evaluated::computed(size_to_value(&size))))
    }

    /// Children with composites replaced by their active replacements,
    /// recursively. Uninitialized composites contribute nothing yet.
    fn evaluate_children(&self, component: ComponentIdx) -> Result<Pull<Vec<ComponentIdx>>> {
        let mut active = Vec::new();
        for &child in &self.arena.require(component)?.children {
            self.append_active(child, &mut active);
        }
        Ok(Pull::Ready(active))
    }

    /// Active replacements of a composite with nested composites flattened
    /// through their own replacement nodes, so a nested diff invalidates
    /// this one too.
    fn evaluate_replacements(
        &self,
        component: ComponentIdx,
        reads: &mut Vec<NodeKey>,
    ) -> Result<Pull<Vec<ComponentIdx>>> {
        let Some(state) = self.composites.get(&component) else {
            return Ok(Pull::Ready(vec![component]));
        };
        let mut stand_ins = Vec::new();
        for &replacement in state.active() {
            if self.composites.contains_key(&replacement) {
                let read = ready!(self.pull(NodeKey::replacements(replacement), reads));
                stand_ins.extend(
                    read.value
                        .as_list()
                        .unwrap_or_default()
                        .iter()
                        .filter_map(ComponentIdx::from_value),
                );
            } else {
                stand_ins.push(replacement);
            }
        }
        Ok(Pull::Ready(stand_ins))
    }

    fn append_active(&self, component: ComponentIdx, out: &mut Vec<ComponentIdx>) {
        match self.composites.get(&component) {
            Some(state) => {
                for &replacement in state.active() {
                    self.append_active(replacement, out);
                }
            }
            None => out.push(component),
        }
    }

    /// Turn a definition's answer into a node value.
    fn apply_resolution(
        &mut self,
        component: ComponentIdx,
        resolution: Resolution,
        essential: Option<Value>,
        default_value: &Value,
    ) -> Evaluated {
        for warning in resolution.warnings {
            self.warn(component, warning);
        }
        match resolution.outcome {
            Outcome::Value(value) => Evaluated::computed(value),
            Outcome::UseEssential => match essential {
                Some(value) => Evaluated {
                    value,
                    used_default: false,
                    used_essential: true,
                },
                None => Evaluated {
                    value: default_value.clone(),
                    used_default: true,
                    used_essential: true,
                },
            },
            Outcome::Failed(message) => {
                self.warn(component, Warning::new(message.clone()).with_level(1));
                Evaluated::computed(Value::error(message))
            }
        }
    }

    /// Read a node, recording the read.
    fn pull(&self, key: NodeKey, reads: &mut Vec<NodeKey>) -> Pull<Read> {
        let read = match self.graph.get(&key) {
            Some(node) if node.is_fresh() => Pull::Ready(Read {
                value: node.value().clone(),
                used_default: node.used_default(),
            }),
            _ => Pull::Pending(key.clone()),
        };
        reads.push(key);
        read
    }

    pub(crate) fn pull_size(
        &self,
        component: ComponentIdx,
        variable: &str,
        reads: &mut Vec<NodeKey>,
    ) -> Result<Pull<Vec<usize>>> {
        let read = ready!(self.pull(NodeKey::size(component, variable), reads));
        Ok(Pull::Ready(size_from_value(&read.value).unwrap_or_default()))
    }

    pub(crate) fn pull_children(
        &self,
        component: ComponentIdx,
        reads: &mut Vec<NodeKey>,
    ) -> Result<Pull<Vec<ComponentIdx>>> {
        let read = ready!(self.pull(NodeKey::children(component), reads));
        let children = read
            .value
            .as_list()
            .unwrap_or_default()
            .iter()
            .filter_map(ComponentIdx::from_value)
            .collect();
        Ok(Pull::Ready(children))
    }

    /// Read a variable, entry or entry group by external name.
    pub(crate) fn pull_named(
        &self,
        component: ComponentIdx,
        name: &str,
        reads: &mut Vec<NodeKey>,
    ) -> Result<Pull<Read>> {
        match self.address(component, name)? {
            Address::Node(key) => Ok(self.pull(key, reads)),
            Address::Group { variable, prefix } => {
                let size = ready!(self.pull_size(component, &variable, reads)?);
                let mut values = Vec::new();
                for key in keys_with_prefix(&size, &prefix) {
                    let read = ready!(self.pull(NodeKey::entry(component, &variable, key), reads));
                    values.push(read.value);
                }
                let remaining = size.get(prefix.len()..).unwrap_or_default();
                Ok(Pull::Ready(Read::computed(nest(remaining, values))))
            }
        }
    }

    pub(crate) fn determining_values(
        &self,
        component: ComponentIdx,
        definition: &StateVariableDefinition,
        reads: &mut Vec<NodeKey>,
    ) -> Result<Pull<DependencyValues>> {
        let mut values = DependencyValues::new();
        for name in &definition.determining {
            let read = ready!(self.pull_named(component, name, reads)?);
            values.insert(name.clone(), read.value, read.used_default);
        }
        Ok(Pull::Ready(values))
    }

    pub(crate) fn gather_all(
        &self,
        component: ComponentIdx,
        dependencies: &IndexMap<String, Dependency>,
        reads: &mut Vec<NodeKey>,
    ) -> Result<Pull<DependencyValues>> {
        let mut values = DependencyValues::new();
        for (name, dependency) in dependencies {
            let read = ready!(self.gather(component, dependency, reads)?);
            values.insert(name.clone(), read.value, read.used_default);
        }
        Ok(Pull::Ready(values))
    }

    /// Materialize one dependency descriptor.
    fn gather(
        &self,
        component: ComponentIdx,
        dependency: &Dependency,
        reads: &mut Vec<NodeKey>,
    ) -> Result<Pull<Read>> {
        match dependency {
            Dependency::StateVariable { component: target, variable } => {
                match self.target(component, target)? {
                    Some(target) => self.pull_named(target, variable, reads),
                    None => Ok(Pull::Ready(self.missing_target(component, target)?)),
                }
            }
            Dependency::ChildGroup { groups, variables } => {
                let ty = self.component_type(component)?;
                let children = ready!(self.pull_children(component, reads)?);
                let mut items = Vec::new();
                for child in children {
                    let child_type = self.arena.require(child)?.component_type.as_str();
                    if groups.iter().any(|group| ty.group_accepts(group, child_type)) {
                        items.push(ready!(self.describe(child, variables, reads)?));
                    }
                }
                Ok(Pull::Ready(Read::computed(Value::List(items))))
            }
            Dependency::Descendants {
                component_types,
                variables,
            } => {
                let mut items = Vec::new();
                ready!(self.collect_descendants(component, component_types, variables, &mut items, reads)?);
                Ok(Pull::Ready(Read::computed(Value::List(items))))
            }
            Dependency::Attribute(name) => {
                let literal = self.arena.require(component)?.attributes.get(name).cloned();
                Ok(Pull::Ready(match literal {
                    Some(value) => Read::computed(value),
                    None => {
                        let ty = self.component_type(component)?;
                        let default = ty.attribute(name).map(|spec| spec.default.clone()).unwrap_or_default();
                        Read::defaulted(default)
                    }
                }))
            }
            Dependency::Value(value) => Ok(Pull::Ready(Read::computed(value.clone()))),
            Dependency::Variant => Ok(self.pull(NodeKey::variant(component), reads)),
            Dependency::ArraySize { component: target, variable } => match self.target(component, target)? {
                Some(target) => {
                    let size = ready!(self.pull_size(target, variable, reads)?);
                    Ok(Pull::Ready(Read::computed(size_to_value(&size))))
                }
                None => Ok(Pull::Ready(self.missing_target(component, target)?)),
            },
            Dependency::Replacements(target) => match self.target(component, target)? {
                Some(target) => Ok(self.pull(NodeKey::replacements(target), reads)),
                None => Ok(Pull::Ready(Read::defaulted(Value::Null))),
            },
        }
    }

    /// Value read through a reference that points nowhere. A shadow whose
    /// source has been removed reads an error; any other missing target
    /// reads a defaulted null.
    fn missing_target(&self, component: ComponentIdx, reference: &ComponentRef) -> Result<Read> {
        if *reference == ComponentRef::ShadowSource {
            if let Some(link) = &self.arena.require(component)?.shadow {
                return Ok(Read::computed(Value::error(format!(
                    "shadow source {} no longer exists",
                    link.source
                ))));
            }
        }
        Ok(Read::defaulted(Value::Null))
    }

    fn collect_descendants(
        &self,
        component: ComponentIdx,
        component_types: &[String],
        variables: &[String],
        items: &mut Vec<Value>,
        reads: &mut Vec<NodeKey>,
    ) -> Result<Pull<()>> {
        let children = ready!(self.pull_children(component, reads)?);
        for child in children {
            let child_type = &self.arena.require(child)?.component_type;
            if component_types.iter().any(|t| t == child_type) {
                items.push(ready!(self.describe(child, variables, reads)?));
            }
            ready!(self.collect_descendants(child, component_types, variables, items, reads)?);
        }
        Ok(Pull::Ready(()))
    }

    /// A child as seen by child-group and descendant dependencies.
    fn describe(
        &self,
        component: ComponentIdx,
        variables: &[String],
        reads: &mut Vec<NodeKey>,
    ) -> Result<Pull<Value>> {
        let ty = self.component_type(component)?;
        let mut entries = IndexMap::new();
        entries.insert("componentIdx".to_string(), Value::from(component));
        entries.insert("componentType".to_string(), Value::text(ty.name()));
        for variable in variables {
            let value = if ty.has_name(variable) || self.overrides.contains_key(&(component, variable.clone())) {
                ready!(self.pull_named(component, variable, reads)?).value
            } else {
                Value::Null
            };
            entries.insert(variable.clone(), value);
        }
        Ok(Pull::Ready(Value::Map(entries)))
    }

    /// Which component a state-variable dependency points at.
    pub(crate) fn target(&self, component: ComponentIdx, reference: &ComponentRef) -> Result<Option<ComponentIdx>> {
        let this = self.arena.require(component)?;
        Ok(match reference {
            ComponentRef::This => Some(component),
            ComponentRef::Parent => this.parent,
            ComponentRef::Ancestor(component_type) => self.arena.ancestor_of_type(component, component_type),
            ComponentRef::Component(idx) => self.arena.contains(*idx).then_some(*idx),
            ComponentRef::Named(name) => self.arena.lookup_name(name),
            ComponentRef::ShadowSource => this
                .shadow
                .as_ref()
                .map(|link| link.source)
                .filter(|source| self.arena.contains(*source)),
        })
    }

    fn unknown_variable(&self, component: ComponentIdx, name: &str) -> CoreError {
        CoreError::UnknownStateVariable {
            component,
            component_type: self
                .arena
                .get(component)
                .map(|c| c.component_type.clone())
                .unwrap_or_default(),
            variable: name.to_string(),
        }
    }
}
