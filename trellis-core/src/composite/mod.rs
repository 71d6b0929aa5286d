//! Composite components.
//!
//! A composite generates other components ("replacements") instead of
//! rendering itself. Each composite moves through
//!
//! ```text
//! Uninitialized --generate--> Expanded --input stale--> Diffing --> Expanded ...
//! ```
//!
//! Generation runs once the composite's ready variable (by default
//! `readyToExpand`) resolves to `true`. Afterwards, whenever that variable
//! goes stale, the composite is asked for a list of
//! [`ReplacementInstruction`]s describing the smallest change that brings
//! its replacements up to date. Replacements that survive a diff keep their
//! component index and all their state.
//!
//! Withheld replacements are hidden from the active tree but kept alive, so
//! a later regrow can restore them unchanged.

mod expand;
mod observer;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use observer::{ReplacementObservers, SubscriberId};

use crate::component::{Component, ComponentIdx, SerializedComponent};
use crate::engine::Engine;
use crate::error::{Result, Warning};
use crate::value::Value;
use crate::variant::DesiredVariant;

/// Default name of the variable gating expansion.
pub const READY_TO_EXPAND: &str = "readyToExpand";

/// Behavior table of a composite component type.
pub trait CompositeBehavior: Send + Sync {
    /// Variable that must resolve to `true` before generating, and whose
    /// staleness triggers a diff.
    fn ready_variable(&self) -> &str {
        READY_TO_EXPAND
    }

    /// Produce the replacements from current values. A fatal
    /// misconfiguration should return a single
    /// [`SerializedComponent::error_marker`].
    fn create_serialized_replacements(
        &self,
        ctx: &mut CompositeContext<'_>,
        workspace: &mut Workspace,
    ) -> Result<Vec<SerializedComponent>>;

    /// Bring existing replacements up to date.
    ///
    /// The default regenerates and replaces everything unless the
    /// regenerated list equals the previous one.
    fn calculate_replacement_changes(
        &self,
        ctx: &mut CompositeContext<'_>,
        workspace: &mut Workspace,
    ) -> Result<Vec<ReplacementInstruction>> {
        let components = self.create_serialized_replacements(ctx, workspace)?;
        let previous = ctx.previous();
        if components.len() == previous.len() && components.iter().zip(previous).all(|(a, b)| a.describes_same(b)) {
            return Ok(Vec::new());
        }
        Ok(vec![ReplacementInstruction::ReplaceAll { components }])
    }

    /// Whether this composite makes a random selection and takes part in
    /// document variant numbering.
    fn produces_variants(&self) -> bool {
        false
    }

    /// Number of distinct selections, if this composite makes one and the
    /// count is known.
    fn determine_number_of_unique_variants(&self, _ctx: &mut CompositeContext<'_>) -> Result<Option<u64>> {
        Ok(None)
    }

    /// The selection numbered `index` (one-based).
    fn get_unique_variant(&self, _ctx: &mut CompositeContext<'_>, _index: u64) -> Result<Option<DesiredVariant>> {
        Ok(None)
    }
}

/// One step of a replacement diff.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplacementInstruction {
    /// Insert new replacements before position `at` (at most the number of
    /// active replacements).
    Add {
        at: usize,
        components: Vec<SerializedComponent>,
    },
    /// Destroy `count` replacements starting at `from`.
    Delete { from: usize, count: usize },
    /// Hide the last `count` replacements. Lowering the count restores
    /// previously withheld ones.
    Withhold { count: usize },
    /// Overwrite essential values of an existing replacement in place.
    UpdateStateVariables {
        replacement: usize,
        values: IndexMap<String, Value>,
    },
    /// Destroy every replacement and generate anew.
    ReplaceAll { components: Vec<SerializedComponent> },
    Warn(Warning),
}

/// What observers are told after an expansion or diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReplacementChange {
    Added { components: Vec<ComponentIdx> },
    Removed { components: Vec<ComponentIdx> },
    Withheld { components: Vec<ComponentIdx> },
    Restored { components: Vec<ComponentIdx> },
    #[serde(rename_all = "camelCase")]
    StateUpdated {
        component: ComponentIdx,
        variables: Vec<String>,
    },
    Error {
        component: ComponentIdx,
        message: String,
    },
}

/// Lifecycle position of a composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeStatus {
    Uninitialized,
    Expanded,
    Diffing,
}

/// Composite-private memo used to decide between incremental and full
/// regeneration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workspace {
    memo: IndexMap<String, Value>,
}

impl Workspace {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.memo.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.memo.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.memo.shift_remove(key)
    }

    pub fn clear(&mut self) {
        self.memo.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }
}

/// Engine-side bookkeeping for one composite.
#[derive(Debug, Clone)]
pub struct CompositeState {
    pub status: CompositeStatus,
    /// Every replacement, active ones first, withheld ones last.
    pub replacements: Vec<ComponentIdx>,
    /// Descriptors the replacements were built from, kept index-aligned.
    pub serialized: Vec<SerializedComponent>,
    pub withheld: usize,
    pub workspace: Workspace,
}

impl CompositeState {
    pub fn new() -> Self {
        Self {
            status: CompositeStatus::Uninitialized,
            replacements: Vec::new(),
            serialized: Vec::new(),
            withheld: 0,
            workspace: Workspace::default(),
        }
    }

    pub fn active(&self) -> &[ComponentIdx] {
        &self.replacements[..self.replacements.len() - self.withheld]
    }

    pub fn withheld_replacements(&self) -> &[ComponentIdx] {
        &self.replacements[self.replacements.len() - self.withheld..]
    }
}

impl Default for CompositeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine access handed to composite behaviors.
pub struct CompositeContext<'a> {
    engine: &'a mut Engine,
    composite: ComponentIdx,
    replacements: Vec<ComponentIdx>,
    withheld: usize,
    previous: Vec<SerializedComponent>,
}

impl<'a> CompositeContext<'a> {
    pub(crate) fn new(engine: &'a mut Engine, composite: ComponentIdx) -> Self {
        let (replacements, withheld, previous) = engine
            .composites
            .get(&composite)
            .map(|s| (s.replacements.clone(), s.withheld, s.serialized.clone()))
            .unwrap_or_default();
        Self {
            engine,
            composite,
            replacements,
            withheld,
            previous,
        }
    }

    /// Index of the composite being expanded.
    pub fn composite(&self) -> ComponentIdx {
        self.composite
    }

    /// Resolve a variable of the composite.
    pub fn resolve(&mut self, variable: &str) -> Result<Value> {
        self.engine.resolve(self.composite, variable)
    }

    /// Resolve a variable of any component.
    pub fn resolve_of(&mut self, component: ComponentIdx, variable: &str) -> Result<Value> {
        self.engine.resolve(component, variable)
    }

    pub fn component(&self, idx: ComponentIdx) -> Option<&Component> {
        self.engine.arena.get(idx)
    }

    /// Literal attribute of the composite, if given.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.engine
            .arena
            .get(self.composite)
            .and_then(|c| c.attributes.get(name))
    }

    /// The composite's own children as authored.
    pub fn children(&self) -> Vec<ComponentIdx> {
        self.engine
            .arena
            .get(self.composite)
            .map(|c| c.children.clone())
            .unwrap_or_default()
    }

    pub fn active_children(&mut self, component: ComponentIdx) -> Result<Vec<ComponentIdx>> {
        self.engine.active_children(component)
    }

    pub fn lookup_name(&self, name: &str) -> Option<ComponentIdx> {
        self.engine.arena.lookup_name(name)
    }

    pub fn is_composite(&self, component: ComponentIdx) -> bool {
        self.engine.is_composite(component)
    }

    /// Whether `component`'s type exposes `name` as a variable or entry.
    pub fn has_variable(&self, component: ComponentIdx, name: &str) -> bool {
        self.engine
            .component_type(component)
            .is_ok_and(|ty| ty.has_name(name))
    }

    /// The variable a shadow copy of `component` would mirror.
    pub fn primary_variable(&self, component: ComponentIdx) -> Option<String> {
        self.engine
            .component_type(component)
            .ok()
            .and_then(|ty| ty.primary_variable().map(str::to_string))
    }

    /// A shadow copy of `component`: its active subtree with every
    /// component that has a primary variable linked back to its source.
    ///
    /// An unexpanded composite is expanded first so its copy is not empty.
    pub fn serialize_shadow(&mut self, component: ComponentIdx) -> Result<Vec<SerializedComponent>> {
        if component != self.composite && self.engine.is_composite(component) {
            self.engine.expand_composite(component)?;
        }
        self.engine.serialize_shadow(component)
    }

    /// Current replacements, withheld ones included.
    pub fn replacements(&self) -> &[ComponentIdx] {
        &self.replacements
    }

    pub fn withheld(&self) -> usize {
        self.withheld
    }

    /// Descriptors of the current replacements, with `component_idx`
    /// filled in. Compare with [`SerializedComponent::describes_same`].
    pub fn previous(&self) -> &[SerializedComponent] {
        &self.previous
    }

    /// Record a warning against the composite.
    pub fn warn(&mut self, warning: Warning) {
        self.engine.warn(self.composite, warning);
    }
}
