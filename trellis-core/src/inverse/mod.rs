//! Inverse Updates
//!
//! A change request asks for a variable to take a new value. The engine
//! walks inverse definitions backwards from that variable until every edit
//! lands on an essential value:
//!
//! 1. Plan. Each visited variable's inverse turns the desired value into
//!    instructions: write my essential value, change one of my
//!    dependencies, or change one of my children. Planning reads current
//!    values but writes nothing; all essential writes go into a change
//!    batch.
//! 2. Commit. If every step succeeded, the batch is written, changed nodes
//!    are invalidated and queued composites are brought up to date.
//!
//! Any refusal (a missing inverse, a fixed variable, conflicting writes, a
//! chain deeper than `max_inverse_depth`) rejects the whole request and
//! leaves the document untouched.
//!
//! Variables without an inverse definition fall back to a default: if the
//! current value came from the essential store it is written there, and if
//! the variable has exactly one state-variable dependency the edit is
//! forwarded to it.

mod batch;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use batch::ChangeBatch;

use crate::array::{flatten, ArrayKey};
use crate::component::ComponentIdx;
use crate::engine::Engine;
use crate::error::{CoreError, Result};
use crate::graph::{NodeKey, Slot};
use crate::resolver::task::{ready, Pull};
use crate::resolver::Address;
use crate::state::{
    Dependencies, Dependency, DependencyValues, InverseInstruction, InverseRequest, InverseResult,
    StateVariableDefinition,
};
use crate::value::Value;

/// Result of a change request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ChangeOutcome {
    Applied,
    Rejected { reason: String },
}

impl ChangeOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ChangeOutcome::Applied)
    }
}

/// A planning step either succeeds or names why it refused.
type Plan = std::result::Result<(), String>;

/// What a `SetEssential` instruction writes to.
#[derive(Clone, Copy)]
enum Cell<'a> {
    Scalar(&'a str),
    Entry(&'a str, &'a ArrayKey),
}

impl Engine {
    /// Ask for `variable` of `component` to become `desired`.
    ///
    /// `variable` may also name an array entry (`x2`) or entry group
    /// (`point3`). The change is applied atomically or not at all.
    pub fn request_change(&mut self, component: ComponentIdx, variable: &str, desired: Value) -> Result<ChangeOutcome> {
        let mut batch = ChangeBatch::new();
        let plan = self.plan_named(component, variable, desired, 0, &mut batch)?;
        self.finish_request(component, variable, plan, batch)
    }

    /// Ask for one entry of an array variable to become `desired`.
    pub fn request_array_change(
        &mut self,
        component: ComponentIdx,
        variable: &str,
        key: &ArrayKey,
        desired: Value,
    ) -> Result<ChangeOutcome> {
        let size = self.array_size(component, variable)?;
        if !key.fits(&size) {
            return Err(CoreError::InvalidArrayKey {
                variable: variable.to_string(),
                key: key.clone(),
                size,
            });
        }
        let mut batch = ChangeBatch::new();
        let plan = self.plan_entry(component, variable, key, desired, 0, &mut batch)?;
        self.finish_request(component, variable, plan, batch)
    }

    fn finish_request(
        &mut self,
        component: ComponentIdx,
        variable: &str,
        plan: Plan,
        batch: ChangeBatch,
    ) -> Result<ChangeOutcome> {
        match plan {
            Ok(()) => {
                tracing::debug!(component = %component, variable, writes = batch.len(), "change applied");
                self.commit(batch);
                Ok(ChangeOutcome::Applied)
            }
            Err(reason) => {
                tracing::debug!(component = %component, variable, %reason, "change rejected");
                Ok(ChangeOutcome::Rejected { reason })
            }
        }
    }

    /// Write the batch, then bring composites up to date. Composite failures
    /// past this point are warnings: the writes are already visible.
    fn commit(&mut self, batch: ChangeBatch) {
        let (scalars, entries) = batch.into_parts();
        for ((component, variable), value) in scalars {
            if self.essential.set_scalar(component, &variable, value) {
                self.invalidate(&NodeKey::variable(component, variable));
            }
        }
        for ((component, variable), values) in entries {
            let changed = self.essential.set_entries(component, &variable, values);
            for key in changed {
                self.invalidate(&NodeKey::entry(component, variable.clone(), key));
            }
        }
        self.process_pending();
    }

    fn plan_named(
        &mut self,
        component: ComponentIdx,
        name: &str,
        desired: Value,
        depth: usize,
        batch: &mut ChangeBatch,
    ) -> Result<Plan> {
        if depth > self.config.max_inverse_depth {
            return Ok(Err(format!(
                "change chain exceeds the maximum depth of {}",
                self.config.max_inverse_depth
            )));
        }
        match self.address(component, name)? {
            Address::Node(key) => match key.slot {
                Slot::Variable(variable) => {
                    let definition = self.definition(component, &variable)?;
                    if definition.is_array() {
                        self.plan_array(component, &variable, &definition, desired, depth, batch)
                    } else {
                        self.plan_scalar(component, &variable, &definition, desired, depth, batch)
                    }
                }
                Slot::Entry(variable, key) => self.plan_entry(component, &variable, &key, desired, depth, batch),
                _ => Ok(Err(format!("'{name}' cannot be changed"))),
            },
            Address::Group { variable, prefix } => {
                let definition = self.definition(component, &variable)?;
                if let Some(reason) = self.locked(component, &definition)? {
                    return Ok(Err(reason));
                }
                let dimensions = definition.array.as_ref().map_or(0, |spec| spec.dimensions());
                let entries = flatten(&desired, dimensions.saturating_sub(prefix.len()));
                if entries.is_empty() {
                    return Ok(Err(format!("'{name}' expects a list")));
                }
                for (rest, value) in entries {
                    let mut indices = prefix.clone();
                    indices.extend_from_slice(rest.indices());
                    let plan = self.plan_entry(component, &variable, &ArrayKey::new(&indices), value, depth, batch)?;
                    if plan.is_err() {
                        return Ok(plan);
                    }
                }
                Ok(Ok(()))
            }
        }
    }

    fn plan_scalar(
        &mut self,
        component: ComponentIdx,
        variable: &str,
        definition: &StateVariableDefinition,
        desired: Value,
        depth: usize,
        batch: &mut ChangeBatch,
    ) -> Result<Plan> {
        if let Some(reason) = self.locked(component, definition)? {
            return Ok(Err(reason));
        }
        let key = NodeKey::variable(component, variable);
        let (current, used_essential) = self.current(&key)?;
        let (dependencies, values) = self.settle(|engine, reads| {
            let determining = ready!(engine.determining_values(component, definition, reads)?);
            engine.settled_dependencies(component, (definition.dependencies)(&determining), reads)
        })?;

        let instructions: InverseResult = match &definition.inverse {
            Some(inverse) => inverse(&InverseRequest {
                desired: &desired,
                current: &current,
                dependencies: &values,
                used_essential,
            }),
            None => default_inverse(variable, &dependencies, used_essential, &desired),
        };
        match instructions {
            Ok(instructions) => self.plan_instructions(
                component,
                Cell::Scalar(variable),
                instructions,
                &dependencies,
                &values,
                depth,
                batch,
            ),
            Err(reason) => Ok(Err(reason)),
        }
    }

    fn plan_array(
        &mut self,
        component: ComponentIdx,
        variable: &str,
        definition: &StateVariableDefinition,
        desired: Value,
        depth: usize,
        batch: &mut ChangeBatch,
    ) -> Result<Plan> {
        if let Some(reason) = self.locked(component, definition)? {
            return Ok(Err(reason));
        }
        let dimensions = definition.array.as_ref().map_or(0, |spec| spec.dimensions());
        let entries = flatten(&desired, dimensions);
        if entries.is_empty() {
            return Ok(Err(format!("'{variable}' expects a list")));
        }
        for (key, value) in entries {
            let plan = self.plan_entry(component, variable, &key, value, depth, batch)?;
            if plan.is_err() {
                return Ok(plan);
            }
        }
        Ok(Ok(()))
    }

    fn plan_entry(
        &mut self,
        component: ComponentIdx,
        variable: &str,
        key: &ArrayKey,
        desired: Value,
        depth: usize,
        batch: &mut ChangeBatch,
    ) -> Result<Plan> {
        let definition = self.definition(component, variable)?;
        let Some(spec) = definition.array.clone() else {
            return Ok(Err(format!("'{variable}' is not an array")));
        };
        if let Some(reason) = self.locked(component, &definition)? {
            return Ok(Err(reason));
        }
        let size = self.array_size(component, variable)?;
        if !key.fits(&size) {
            return Ok(Err(format!("entry {key} is outside '{variable}' (size {size:?})")));
        }

        let node = NodeKey::entry(component, variable, key.clone());
        let (current, used_essential) = self.current(&node)?;
        let (dependencies, values) = self.settle(|engine, reads| {
            let determining = ready!(engine.determining_values(component, &definition, reads)?);
            engine.settled_dependencies(component, (spec.dependencies_by_key)(key, &determining), reads)
        })?;

        let request = InverseRequest {
            desired: &desired,
            current: &current,
            dependencies: &values,
            used_essential,
        };
        let instructions = match &spec.inverse_by_key {
            Some(inverse) => inverse(key, &request),
            None => default_inverse(variable, &dependencies, used_essential, &desired),
        };
        match instructions {
            Ok(instructions) => self.plan_instructions(
                component,
                Cell::Entry(variable, key),
                instructions,
                &dependencies,
                &values,
                depth,
                batch,
            ),
            Err(reason) => Ok(Err(reason)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_instructions(
        &mut self,
        component: ComponentIdx,
        cell: Cell<'_>,
        instructions: Vec<InverseInstruction>,
        dependencies: &IndexMap<String, Dependency>,
        values: &DependencyValues,
        depth: usize,
        batch: &mut ChangeBatch,
    ) -> Result<Plan> {
        for instruction in instructions {
            let plan = match instruction {
                InverseInstruction::SetEssential(value) => match cell {
                    Cell::Scalar(variable) => batch.set_scalar(component, variable, value),
                    Cell::Entry(variable, key) => batch.set_entry(component, variable, key.clone(), value),
                },
                InverseInstruction::SetDependency { dependency, desired } => match dependencies.get(&dependency) {
                    Some(Dependency::StateVariable {
                        component: reference,
                        variable,
                    }) => match self.target(component, reference)? {
                        Some(target) => self.plan_named(target, variable, desired, depth + 1, batch)?,
                        None => Err(format!("dependency '{dependency}' points at no component")),
                    },
                    Some(_) => Err(format!("dependency '{dependency}' cannot be changed")),
                    None => Err(format!("no dependency named '{dependency}'")),
                },
                InverseInstruction::SetChild {
                    dependency,
                    index,
                    variable,
                    desired,
                } => {
                    let child = values
                        .get(&dependency)
                        .as_list()
                        .and_then(|children| children.get(index))
                        .and_then(|child| child.get("componentIdx"))
                        .and_then(ComponentIdx::from_value);
                    match child {
                        Some(child) => self.plan_named(child, &variable, desired, depth + 1, batch)?,
                        None => Err(format!("dependency '{dependency}' has no child {index}")),
                    }
                }
            };
            if plan.is_err() {
                return Ok(plan);
            }
        }
        Ok(Ok(()))
    }

    /// Reason the variable refuses edits, if its lock is set.
    fn locked(&mut self, component: ComponentIdx, definition: &StateVariableDefinition) -> Result<Option<String>> {
        let Some(lock) = &definition.locked_by else {
            return Ok(None);
        };
        Ok(self
            .resolve(component, lock)?
            .is_true()
            .then(|| format!("component {component} is fixed")))
    }

    /// Current value of a node and whether it came from the essential store.
    fn current(&mut self, key: &NodeKey) -> Result<(Value, bool)> {
        self.drive(key)?;
        Ok(self
            .graph
            .get(key)
            .map(|node| (node.value().clone(), node.used_essential()))
            .unwrap_or_default())
    }

    /// Materialize a dependency set for planning.
    fn settled_dependencies(
        &self,
        component: ComponentIdx,
        dependencies: Dependencies,
        reads: &mut Vec<NodeKey>,
    ) -> Result<Pull<(IndexMap<String, Dependency>, DependencyValues)>> {
        let Dependencies::Map(dependencies) = dependencies else {
            return Ok(Pull::Ready((IndexMap::new(), DependencyValues::new())));
        };
        let values = ready!(self.gather_all(component, &dependencies, reads)?);
        Ok(Pull::Ready((dependencies, values)))
    }
}

fn default_inverse(
    variable: &str,
    dependencies: &IndexMap<String, Dependency>,
    used_essential: bool,
    desired: &Value,
) -> InverseResult {
    if used_essential {
        return Ok(vec![InverseInstruction::SetEssential(desired.clone())]);
    }
    let mut state_dependencies = dependencies
        .iter()
        .filter(|(_, d)| matches!(d, Dependency::StateVariable { .. }));
    match (state_dependencies.next(), state_dependencies.next(), dependencies.len()) {
        (Some((name, _)), None, 1) => Ok(vec![InverseInstruction::SetDependency {
            dependency: name.clone(),
            desired: desired.clone(),
        }]),
        _ => Err(format!("'{variable}' cannot be changed directly")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ComponentRef;

    #[test]
    fn default_inverse_prefers_essential() {
        let deps = IndexMap::new();
        let desired = Value::Integer(3);
        assert_eq!(
            default_inverse("v", &deps, true, &desired),
            Ok(vec![InverseInstruction::SetEssential(Value::Integer(3))])
        );
        assert!(default_inverse("v", &deps, false, &desired).is_err());
    }

    #[test]
    fn default_inverse_forwards_single_dependency() {
        let mut deps = IndexMap::new();
        deps.insert("src".to_string(), Dependency::of(ComponentRef::Parent, "value"));
        let desired = Value::Bool(true);
        assert_eq!(
            default_inverse("v", &deps, false, &desired),
            Ok(vec![InverseInstruction::SetDependency {
                dependency: "src".into(),
                desired: Value::Bool(true),
            }])
        );

        deps.insert("other".to_string(), Dependency::attribute("x"));
        assert!(default_inverse("v", &deps, false, &desired).is_err());
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(ChangeOutcome::Rejected { reason: "fixed".into() }).unwrap();
        assert_eq!(json["outcome"], "rejected");
        assert_eq!(json["reason"], "fixed");
        assert!(ChangeOutcome::Applied.is_applied());
    }
}
