//! Generating and diffing replacements.
//!
//! Replacements are instantiated with the composite's parent as their parent
//! and the composite as their owner, so they appear in the parent's active
//! children in place of the composite. Every change to a replacement list
//! invalidates that parent's children node and is reported to observers.

use std::mem;

use super::{CompositeContext, CompositeStatus, ReplacementChange, ReplacementInstruction, Workspace};
use crate::component::{ComponentIdx, SerializedComponent, ERROR_COMPONENT_TYPE};
use crate::engine::Engine;
use crate::error::{CoreError, Result, Warning};
use crate::graph::NodeKey;

impl Engine {
    /// Generate the replacements of an uninitialized composite, if its ready
    /// variable is true. Otherwise it stays uninitialized until that
    /// variable changes.
    pub(crate) fn expand_composite(&mut self, composite: ComponentIdx) -> Result<()> {
        if self.composites.get(&composite).map(|s| s.status) != Some(CompositeStatus::Uninitialized) {
            return Ok(());
        }
        let Some(behavior) = self.component_type(composite)?.composite().cloned() else {
            return Ok(());
        };
        if !self.resolve(composite, behavior.ready_variable())?.is_true() {
            tracing::debug!(composite = %composite, "not ready to expand");
            return Ok(());
        }

        // Diffing status keeps a copy cycle from re-entering this expansion.
        self.set_status(composite, CompositeStatus::Diffing);
        let mut workspace = self.take_workspace(composite);
        let generated = {
            let mut ctx = CompositeContext::new(self, composite);
            behavior.create_serialized_replacements(&mut ctx, &mut workspace)
        };
        self.restore_workspace(composite, workspace);
        let components = match generated {
            Ok(components) => components,
            Err(err) => {
                self.set_status(composite, CompositeStatus::Uninitialized);
                return Err(err);
            }
        };

        tracing::debug!(composite = %composite, count = components.len(), "expanding");
        let mut changes = Vec::new();
        self.set_status(composite, CompositeStatus::Expanded);
        self.add_replacements(composite, 0, components, &mut changes)?;
        self.finish_changes(composite, changes)
    }

    /// Expand or diff every queued composite. A composite that fails keeps
    /// its current replacements and the failure becomes a warning; the
    /// remaining composites still run.
    pub(crate) fn process_pending(&mut self) {
        while let Some(composite) = self.pending.pop_front() {
            let outcome = match self.composites.get(&composite).map(|s| s.status) {
                Some(CompositeStatus::Uninitialized) => self.expand_composite(composite),
                Some(CompositeStatus::Expanded) => self.update_composite(composite),
                Some(CompositeStatus::Diffing) | None => Ok(()),
            };
            if let Err(err) = outcome {
                self.warn(composite, Warning::new(format!("cannot update replacements: {err}")));
            }
        }
    }

    fn update_composite(&mut self, composite: ComponentIdx) -> Result<()> {
        let Some(behavior) = self.component_type(composite)?.composite().cloned() else {
            return Ok(());
        };
        // Re-resolving the ready variable also re-arms its stale signal.
        if !self.resolve(composite, behavior.ready_variable())?.is_true() {
            return Ok(());
        }

        self.set_status(composite, CompositeStatus::Diffing);
        let mut workspace = self.take_workspace(composite);
        let instructions = {
            let mut ctx = CompositeContext::new(self, composite);
            behavior.calculate_replacement_changes(&mut ctx, &mut workspace)
        };
        self.restore_workspace(composite, workspace);
        let applied = instructions.and_then(|instructions| self.apply_instructions(composite, instructions));
        self.set_status(composite, CompositeStatus::Expanded);
        applied
    }

    /// Validate and apply a diff. An invalid diff replaces everything with an
    /// error marker.
    pub(crate) fn apply_instructions(
        &mut self,
        composite: ComponentIdx,
        instructions: Vec<ReplacementInstruction>,
    ) -> Result<()> {
        if instructions.is_empty() {
            return Ok(());
        }
        let instructions = match self.validate_instructions(composite, &instructions) {
            Ok(()) => instructions,
            Err(reason) => {
                let error = CoreError::InvalidReplacementInstruction { composite, reason };
                self.warn(composite, Warning::new(error.to_string()));
                vec![ReplacementInstruction::ReplaceAll {
                    components: vec![SerializedComponent::error_marker(error.to_string())],
                }]
            }
        };

        let mut changes = Vec::new();
        for instruction in instructions {
            match instruction {
                ReplacementInstruction::Add { at, components } => {
                    self.add_replacements(composite, at, components, &mut changes)?;
                }
                ReplacementInstruction::Delete { from, count } => {
                    let Some(state) = self.composites.get_mut(&composite) else {
                        continue;
                    };
                    let end = from + count;
                    let active = state.replacements.len() - state.withheld;
                    let overlap = end.saturating_sub(active.max(from));
                    state.withheld -= overlap.min(state.withheld);
                    let removed: Vec<ComponentIdx> = state.replacements.drain(from..end).collect();
                    state.serialized.drain(from..end.min(state.serialized.len()));
                    for &replacement in &removed {
                        self.remove_subtree(replacement);
                    }
                    if !removed.is_empty() {
                        changes.push(ReplacementChange::Removed { components: removed });
                    }
                }
                ReplacementInstruction::Withhold { count } => {
                    let Some(state) = self.composites.get_mut(&composite) else {
                        continue;
                    };
                    let len = state.replacements.len();
                    let previous = state.withheld;
                    state.withheld = count;
                    if count > previous {
                        changes.push(ReplacementChange::Withheld {
                            components: state.replacements[len - count..len - previous].to_vec(),
                        });
                    } else if count < previous {
                        changes.push(ReplacementChange::Restored {
                            components: state.replacements[len - previous..len - count].to_vec(),
                        });
                    }
                }
                ReplacementInstruction::UpdateStateVariables { replacement, values } => {
                    let Some(state) = self.composites.get_mut(&composite) else {
                        continue;
                    };
                    let target = state.replacements[replacement];
                    if let Some(serialized) = state.serialized.get_mut(replacement) {
                        serialized.state.extend(values.clone());
                    }
                    let mut variables = Vec::new();
                    for (variable, value) in values {
                        if self.write_essential(target, &variable, value)? {
                            variables.push(variable);
                        }
                    }
                    if !variables.is_empty() {
                        changes.push(ReplacementChange::StateUpdated {
                            component: target,
                            variables,
                        });
                    }
                }
                ReplacementInstruction::ReplaceAll { components } => {
                    let old = match self.composites.get_mut(&composite) {
                        Some(state) => {
                            state.serialized.clear();
                            state.withheld = 0;
                            mem::take(&mut state.replacements)
                        }
                        None => continue,
                    };
                    for &replacement in &old {
                        self.remove_subtree(replacement);
                    }
                    if !old.is_empty() {
                        changes.push(ReplacementChange::Removed { components: old });
                    }
                    self.add_replacements(composite, 0, components, &mut changes)?;
                }
                ReplacementInstruction::Warn(warning) => self.warn(composite, warning),
            }
        }
        self.finish_changes(composite, changes)
    }

    /// Replay the instructions against the replacement count without
    /// touching anything.
    fn validate_instructions(
        &self,
        composite: ComponentIdx,
        instructions: &[ReplacementInstruction],
    ) -> std::result::Result<(), String> {
        let Some(state) = self.composites.get(&composite) else {
            return Err("component is not a composite".to_string());
        };
        let mut len = state.replacements.len();
        let mut withheld = state.withheld;
        for (i, instruction) in instructions.iter().enumerate() {
            match instruction {
                ReplacementInstruction::Add { at, components } => {
                    if *at > len - withheld {
                        return Err(format!(
                            "instruction {i} adds at {at} but only {} replacements are active",
                            len - withheld
                        ));
                    }
                    len += components.len();
                }
                ReplacementInstruction::Delete { from, count } => {
                    let end = from + count;
                    if end > len {
                        return Err(format!("instruction {i} deletes {from}..{end} of {len} replacements"));
                    }
                    let overlap = end.saturating_sub((len - withheld).max(*from));
                    withheld -= overlap.min(withheld);
                    len -= count;
                }
                ReplacementInstruction::Withhold { count } => {
                    if *count > len {
                        return Err(format!("instruction {i} withholds {count} of {len} replacements"));
                    }
                    withheld = *count;
                }
                ReplacementInstruction::UpdateStateVariables { replacement, .. } => {
                    if *replacement >= len {
                        return Err(format!("instruction {i} updates replacement {replacement} of {len}"));
                    }
                }
                ReplacementInstruction::ReplaceAll { components } => {
                    len = components.len();
                    withheld = 0;
                }
                ReplacementInstruction::Warn(_) => {}
            }
        }
        Ok(())
    }

    /// Instantiate replacements and splice them in before `at`, then expand
    /// any composites among them.
    fn add_replacements(
        &mut self,
        composite: ComponentIdx,
        at: usize,
        components: Vec<SerializedComponent>,
        changes: &mut Vec<ReplacementChange>,
    ) -> Result<()> {
        if components.is_empty() {
            return Ok(());
        }
        let parent = self.arena.require(composite)?.parent;
        let mut created = Vec::new();
        let mut added = Vec::with_capacity(components.len());
        let mut descriptors = Vec::with_capacity(components.len());
        for mut component in components {
            let idx = self.instantiate(&component, parent, Some(composite), &mut created)?;
            component.component_idx = Some(idx);
            if component.component_type == ERROR_COMPONENT_TYPE {
                let message = component
                    .state
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("replacement failed")
                    .to_string();
                self.warn(composite, Warning::new(message.clone()));
                changes.push(ReplacementChange::Error {
                    component: idx,
                    message,
                });
            }
            added.push(idx);
            descriptors.push(component);
        }

        if let Some(state) = self.composites.get_mut(&composite) {
            let at = at.min(state.replacements.len());
            state.replacements.splice(at..at, added.iter().copied());
            let at = at.min(state.serialized.len());
            state.serialized.splice(at..at, descriptors);
        }
        changes.push(ReplacementChange::Added { components: added });

        for nested in created {
            self.expand_composite(nested)?;
        }
        Ok(())
    }

    /// Destroy a component, its children and its replacements.
    pub(crate) fn remove_subtree(&mut self, component: ComponentIdx) {
        let Some(children) = self.arena.get(component).map(|c| c.children.clone()) else {
            return;
        };
        for child in children {
            self.remove_subtree(child);
        }
        if let Some(state) = self.composites.remove(&component) {
            for replacement in state.replacements {
                self.remove_subtree(replacement);
            }
        }
        let stale = self.graph.remove_component(component);
        self.route_stale(&stale);
        self.essential.remove_component(component);
        self.overrides.retain(|(c, _), _| *c != component);
        self.pending.retain(|&p| p != component);
        self.arena.remove(component);
    }

    fn finish_changes(&mut self, composite: ComponentIdx, changes: Vec<ReplacementChange>) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let structural = changes
            .iter()
            .any(|c| !matches!(c, ReplacementChange::StateUpdated { .. }));
        if structural {
            self.invalidate(&NodeKey::replacements(composite));
            if let Some(parent) = self.arena.require(composite)?.parent {
                self.invalidate(&NodeKey::children(parent));
                self.renderer_updates.insert(parent);
            }
        }
        tracing::debug!(composite = %composite, changes = changes.len(), "replacements changed");
        self.observers.notify(composite, &changes);
        Ok(())
    }

    fn take_workspace(&mut self, composite: ComponentIdx) -> Workspace {
        self.composites
            .get_mut(&composite)
            .map(|s| mem::take(&mut s.workspace))
            .unwrap_or_default()
    }

    fn restore_workspace(&mut self, composite: ComponentIdx, workspace: Workspace) {
        if let Some(state) = self.composites.get_mut(&composite) {
            state.workspace = workspace;
        }
    }

    fn set_status(&mut self, composite: ComponentIdx, status: CompositeStatus) {
        if let Some(state) = self.composites.get_mut(&composite) {
            state.status = status;
        }
    }
}
