//! Document Engine
//!
//! The engine owns every piece of document state: the component arena, the
//! essential store, the dependency graph and the composite bookkeeping. All
//! other modules extend it with `impl Engine` blocks:
//!
//! - `resolver`: lazy resolution of nodes.
//! - `build`: instantiating serialized components and assigning variants.
//! - `composite::expand`: generating and diffing replacements.
//! - `inverse`: planning and committing requested changes.
//!
//! The engine is single-threaded. It is `Send`, so a host may move it to a
//! worker, but nothing inside it runs concurrently.
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::{Engine, SerializedComponent, VariantRequest};
//!
//! let mut engine = Engine::with_builtins();
//! let root = engine.build(
//!     SerializedComponent::new("document")
//!         .child(SerializedComponent::new("number").named("n").attribute("value", 3.0)),
//!     VariantRequest::seeded(7),
//! )?;
//! let n = engine.lookup("n")?;
//! engine.request_change(n, "value", 5.0.into())?;
//! assert_eq!(engine.resolve(n, "value")?, 5.0.into());
//! ```

mod build;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use indexmap::IndexSet;

use crate::array::{flatten, ArrayKey};
use crate::component::{Component, ComponentArena, ComponentIdx, ComponentType, SerializedComponent, TypeRegistry};
use crate::composite::{CompositeState, ReplacementChange, ReplacementObservers, SubscriberId};
use crate::config::EngineConfig;
use crate::error::{CoreError, Diagnostics, Result, Warning};
use crate::graph::{DependencyGraph, NodeKey, Slot};
use crate::resolver::Address;
use crate::state::{EssentialStore, StaleSignal, StateVariableDefinition};
use crate::value::Value;
use crate::variant;

/// A live document.
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) registry: Arc<TypeRegistry>,
    pub(crate) arena: ComponentArena,
    pub(crate) essential: EssentialStore,
    pub(crate) graph: DependencyGraph,
    pub(crate) composites: HashMap<ComponentIdx, CompositeState>,
    /// Composites whose ready variable went stale, in the order they did.
    pub(crate) pending: VecDeque<ComponentIdx>,
    /// Per-component definitions that replace the type's (shadow links).
    pub(crate) overrides: HashMap<(ComponentIdx, String), Arc<StateVariableDefinition>>,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) observers: ReplacementObservers,
    pub(crate) renderer_updates: IndexSet<ComponentIdx>,
    pub(crate) signals: Vec<(ComponentIdx, String)>,
    pub(crate) seed: u64,
    pub(crate) number_of_variants: Option<u64>,
    pub(crate) root: Option<ComponentIdx>,
}

impl Engine {
    pub fn new(registry: Arc<TypeRegistry>, config: EngineConfig) -> Self {
        Self {
            config,
            registry,
            arena: ComponentArena::new(),
            essential: EssentialStore::new(),
            graph: DependencyGraph::new(),
            composites: HashMap::new(),
            pending: VecDeque::new(),
            overrides: HashMap::new(),
            diagnostics: Diagnostics::default(),
            observers: ReplacementObservers::default(),
            renderer_updates: IndexSet::new(),
            signals: Vec::new(),
            seed: 0,
            number_of_variants: None,
            root: None,
        }
    }

    /// An engine over the builtin component catalog with default settings.
    pub fn with_builtins() -> Self {
        Self::new(Arc::new(TypeRegistry::with_builtins()), EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Root component of the built document.
    pub fn root(&self) -> Option<ComponentIdx> {
        self.root
    }

    pub fn component(&self, idx: ComponentIdx) -> Option<&Component> {
        self.arena.get(idx)
    }

    /// Find a component by its `name` attribute.
    pub fn lookup(&self, name: &str) -> Result<ComponentIdx> {
        self.arena
            .lookup_name(name)
            .ok_or_else(|| CoreError::UnknownName(name.to_string()))
    }

    pub fn is_composite(&self, component: ComponentIdx) -> bool {
        self.composites.contains_key(&component)
    }

    /// Current value of a state variable, array entry or entry group.
    ///
    /// Resolution is lazy: nothing is computed until read, and a fresh value
    /// is returned from cache.
    pub fn resolve(&mut self, component: ComponentIdx, variable: &str) -> Result<Value> {
        match self.address(component, variable)? {
            Address::Node(key) => self.resolve_key(&key),
            Address::Group { .. } => {
                self.settle(|engine, reads| engine.pull_named(component, variable, reads))
                    .map(|read| read.value)
            }
        }
    }

    /// Current value of one entry of an array variable.
    pub fn resolve_entry(&mut self, component: ComponentIdx, variable: &str, key: &ArrayKey) -> Result<Value> {
        let definition = self.definition(component, variable)?;
        if !definition.is_array() {
            return Err(CoreError::UnknownStateVariable {
                component,
                component_type: self.arena.require(component)?.component_type.clone(),
                variable: variable.to_string(),
            });
        }
        let size = self.array_size(component, variable)?;
        if !key.fits(&size) {
            return Err(CoreError::InvalidArrayKey {
                variable: variable.to_string(),
                key: key.clone(),
                size,
            });
        }
        self.resolve_key(&NodeKey::entry(component, variable, key.clone()))
    }

    /// Current size of an array variable.
    pub fn array_size(&mut self, component: ComponentIdx, variable: &str) -> Result<Vec<usize>> {
        self.settle(|engine, reads| engine.pull_size(component, variable, reads))
    }

    /// Active children: composites are replaced by their active
    /// replacements, recursively.
    pub fn active_children(&mut self, component: ComponentIdx) -> Result<Vec<ComponentIdx>> {
        self.settle(|engine, reads| engine.pull_children(component, reads))
    }

    /// Active replacements of a composite.
    pub fn replacements(&self, composite: ComponentIdx) -> &[ComponentIdx] {
        self.composites
            .get(&composite)
            .map(CompositeState::active)
            .unwrap_or_default()
    }

    /// Replacements a composite has withheld.
    pub fn withheld_replacements(&self, composite: ComponentIdx) -> &[ComponentIdx] {
        self.composites
            .get(&composite)
            .map(CompositeState::withheld_replacements)
            .unwrap_or_default()
    }

    /// Number of distinct document variants, when the variant space is
    /// small enough to index.
    pub fn number_of_variants(&self) -> Option<u64> {
        self.number_of_variants
    }

    /// Number of times a variable's definition has run.
    pub fn evaluations(&self, component: ComponentIdx, variable: &str) -> u64 {
        self.graph.evaluations(&NodeKey::variable(component, variable))
    }

    /// Number of times one entry of an array variable has been evaluated.
    pub fn entry_evaluations(&self, component: ComponentIdx, variable: &str, key: &ArrayKey) -> u64 {
        self.graph.evaluations(&NodeKey::entry(component, variable, key.clone()))
    }

    pub fn warnings(&self) -> &[Warning] {
        self.diagnostics.warnings()
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        self.diagnostics.take()
    }

    /// Components the renderer should refresh, drained.
    pub fn take_renderer_updates(&mut self) -> Vec<ComponentIdx> {
        std::mem::take(&mut self.renderer_updates)
            .into_iter()
            .filter(|&c| self.arena.contains(c))
            .collect()
    }

    /// Custom stale signals raised since the last call, drained.
    pub fn take_signals(&mut self) -> Vec<(ComponentIdx, String)> {
        std::mem::take(&mut self.signals)
    }

    /// Register a callback for replacement changes of any composite.
    pub fn subscribe_replacements<F>(&mut self, notify: F) -> SubscriberId
    where
        F: Fn(ComponentIdx, &[ReplacementChange]) + Send + Sync + 'static,
    {
        self.observers.subscribe(notify)
    }

    pub fn unsubscribe_replacements(&mut self, id: SubscriberId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub(crate) fn component_type(&self, component: ComponentIdx) -> Result<Arc<ComponentType>> {
        let name = &self.arena.require(component)?.component_type;
        self.registry.require(name).cloned()
    }

    /// Definition of a variable, honoring per-component overrides.
    pub(crate) fn definition(&self, component: ComponentIdx, name: &str) -> Result<Arc<StateVariableDefinition>> {
        if let Some(definition) = self.overrides.get(&(component, name.to_string())) {
            return Ok(definition.clone());
        }
        let ty = self.component_type(component)?;
        ty.variable(name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownStateVariable {
                component,
                component_type: ty.name().to_string(),
                variable: name.to_string(),
            })
    }

    pub(crate) fn warn(&mut self, component: ComponentIdx, warning: Warning) {
        let position = self.arena.get(component).and_then(|c| c.position);
        self.diagnostics.push(warning.at(component, position));
    }

    /// Mark a node and its dependents stale and dispatch their signals.
    pub(crate) fn invalidate(&mut self, key: &NodeKey) {
        let stale = self.graph.invalidate(key);
        self.route_stale(&stale);
    }

    /// Dispatch the stale signals of newly stale nodes.
    pub(crate) fn route_stale(&mut self, keys: &[NodeKey]) {
        for key in keys {
            let component = key.component;
            let name = match &key.slot {
                Slot::Children => {
                    self.renderer_updates.insert(component);
                    continue;
                }
                Slot::Variable(name) => name,
                Slot::Entry(..) | Slot::Size(_) | Slot::Variant | Slot::Replacements => continue,
            };
            if let Ok(definition) = self.definition(component, name) {
                for signal in &definition.mark_stale {
                    match signal {
                        StaleSignal::UpdateReplacements => self.queue_composite(component),
                        StaleSignal::UpdateRenderer => {
                            self.renderer_updates.insert(component);
                        }
                        StaleSignal::Custom(tag) => self.signals.push((component, tag.clone())),
                    }
                }
            }
            let ready = self
                .component_type(component)
                .ok()
                .and_then(|ty| ty.composite().map(|b| b.ready_variable() == name.as_str()));
            if ready == Some(true) {
                self.queue_composite(component);
            }
        }
    }

    /// Overwrite an essential value by external name (variable, entry or
    /// entry group) and invalidate what changed. Returns whether anything
    /// changed.
    pub(crate) fn write_essential(&mut self, component: ComponentIdx, name: &str, value: Value) -> Result<bool> {
        let (variable, entries) = match self.address(component, name)? {
            Address::Node(key) => match key.slot {
                Slot::Variable(variable) => {
                    let definition = self.definition(component, &variable)?;
                    match &definition.array {
                        None => {
                            let changed = self.essential.set_scalar(component, &variable, value);
                            if changed {
                                self.invalidate(&NodeKey::variable(component, variable));
                            }
                            return Ok(changed);
                        }
                        Some(spec) => {
                            let entries = flatten(&value, spec.dimensions());
                            (variable, entries)
                        }
                    }
                }
                Slot::Entry(variable, key) => (variable, vec![(key, value)]),
                _ => return Ok(false),
            },
            Address::Group { variable, prefix } => {
                let dimensions = self
                    .definition(component, &variable)?
                    .array
                    .as_ref()
                    .map_or(0, |spec| spec.dimensions());
                let entries = flatten(&value, dimensions.saturating_sub(prefix.len()))
                    .into_iter()
                    .map(|(rest, v)| {
                        let mut key = prefix.clone();
                        key.extend_from_slice(rest.indices());
                        (ArrayKey::new(&key), v)
                    })
                    .collect();
                (variable, entries)
            }
        };
        let changed = self.essential.set_entries(component, &variable, entries);
        for key in &changed {
            self.invalidate(&NodeKey::entry(component, variable.clone(), key.clone()));
        }
        Ok(!changed.is_empty())
    }

    pub(crate) fn queue_composite(&mut self, component: ComponentIdx) {
        if self.composites.contains_key(&component) && !self.pending.contains(&component) {
            tracing::debug!(composite = %component, "queued for update");
            self.pending.push_back(component);
        }
    }

    /// Variant descriptor of a component: its seed stream, any assigned
    /// variant and the sampler tuning.
    pub(crate) fn variant_descriptor(&self, component: ComponentIdx) -> Result<Value> {
        let desired = self.arena.require(component)?.variant.as_ref();
        Ok(variant::descriptor(
            variant::derive_seed(self.seed, u64::from(component.0)),
            desired,
            &self.config.sampling,
        ))
    }

    /// A shadow copy of `component`: its active subtree, with every
    /// component that has a primary variable linked back to its source.
    /// A composite is copied as its active replacements.
    pub(crate) fn serialize_shadow(&self, component: ComponentIdx) -> Result<Vec<SerializedComponent>> {
        if self.is_composite(component) {
            let replacements = self.replacements(component).to_vec();
            let mut copies = Vec::new();
            for replacement in replacements {
                copies.extend(self.serialize_shadow(replacement)?);
            }
            return Ok(copies);
        }
        let ty = self.component_type(component)?;
        let source = self.arena.require(component)?;
        let mut copy = SerializedComponent::new(source.component_type.clone());
        copy.attributes = source.attributes.clone();
        copy.attributes.shift_remove("name");
        copy.position = source.position;
        if let Some(prop) = ty.primary_variable() {
            copy = copy.shadowing(component, prop);
        }
        let children = source.children.clone();
        for child in children {
            copy.children.extend(self.serialize_shadow(child)?);
        }
        Ok(vec![copy])
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("components", &self.arena.len())
            .field("nodes", &self.graph.node_count())
            .field("composites", &self.composites.len())
            .field("root", &self.root)
            .finish()
    }
}
