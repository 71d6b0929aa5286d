//! Tree construction.
//!
//! Serialized descriptors become live components here, both for the
//! authored document and for composite replacements. Construction runs in
//! three passes:
//!
//! 1. Instantiate the tree, validating attributes and seeding essential
//!    values from attribute literals and `state` entries.
//! 2. Assign variants to variant-producing composites.
//! 3. Expand composites, children before parents, so a composite reading
//!    its children sees them already expanded.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::array::{flatten, size_from_value, ArrayKey, EntryRef};
use crate::component::{Component, ComponentIdx, ComponentType, SerializedComponent, ShadowLink};
use crate::composite::{CompositeContext, CompositeState};
use crate::engine::Engine;
use crate::error::{CoreError, Result, Warning};
use crate::graph::NodeKey;
use crate::state::{
    ComponentRef, Dependencies, Dependency, InverseInstruction, InverseResult, Resolution,
    StateVariableDefinition,
};
use crate::value::Value;
use crate::variant::{derive_seed, VariantPlan, VariantRequest};

impl Engine {
    /// Build the document from its root descriptor.
    ///
    /// Can only be called once per engine.
    pub fn build(&mut self, root: SerializedComponent, request: VariantRequest) -> Result<ComponentIdx> {
        if self.root.is_some() {
            return Err(CoreError::MalformedDescriptor("document is already built".to_string()));
        }
        self.seed = request.seed;

        let mut created = Vec::new();
        let root_idx = self.instantiate(&root, None, None, &mut created)?;
        self.root = Some(root_idx);
        tracing::debug!(components = self.arena.len(), composites = created.len(), "document instantiated");

        self.assign_variants(root_idx, request)?;

        for composite in created {
            self.expand_composite(composite)?;
        }
        self.process_pending();
        Ok(root_idx)
    }

    /// Create a component (and its subtree) from a descriptor.
    ///
    /// The caller links the result into its parent; composites found in the
    /// subtree are appended to `created` after their children.
    pub(crate) fn instantiate(
        &mut self,
        serialized: &SerializedComponent,
        parent: Option<ComponentIdx>,
        owner: Option<ComponentIdx>,
        created: &mut Vec<ComponentIdx>,
    ) -> Result<ComponentIdx> {
        let ty = self.registry.require(&serialized.component_type)?.clone();
        let idx = self.arena.next_idx();

        let mut name = None;
        let mut attributes = IndexMap::new();
        let mut warnings = Vec::new();
        for (attribute, literal) in &serialized.attributes {
            if attribute == "name" {
                name = literal.as_str().map(str::to_string);
                continue;
            }
            match ty.attribute(attribute) {
                None => {
                    if self.config.warn_unknown_attributes {
                        let message = format!("unknown attribute '{attribute}' on <{}>", ty.name());
                        warnings.push(Warning::new(message).with_level(2));
                    }
                }
                Some(spec) => match spec.accept(literal) {
                    Some(value) => {
                        attributes.insert(attribute.clone(), value);
                    }
                    None => warnings.push(Warning::new(format!(
                        "invalid value {literal} for attribute '{attribute}' of <{}>, using {}",
                        ty.name(),
                        spec.default
                    ))),
                },
            }
        }

        self.arena.insert(Component {
            idx,
            component_type: ty.name().to_string(),
            name,
            attributes,
            children: Vec::new(),
            parent,
            owner,
            shadow: serialized.downstream_dependencies.clone(),
            position: serialized.position,
            variant: None,
        });
        for warning in warnings {
            self.warn(idx, warning);
        }

        if let Some(link) = &serialized.downstream_dependencies {
            self.wire_shadow(idx, &ty, link);
        }
        self.seed_essentials(idx, &ty, serialized);

        let mut children = Vec::with_capacity(serialized.children.len());
        for child in &serialized.children {
            if !ty.accepts_child(&child.component_type) {
                self.warn(
                    idx,
                    Warning::new(format!(
                        "<{}> is not a valid child of <{}>",
                        child.component_type,
                        ty.name()
                    ))
                    .with_level(2),
                );
            }
            children.push(self.instantiate(child, Some(idx), owner, created)?);
        }
        self.arena.require_mut(idx)?.children = children;

        if ty.is_composite() {
            self.composites.insert(idx, CompositeState::new());
            created.push(idx);
        }
        Ok(idx)
    }

    fn seed_essentials(&mut self, idx: ComponentIdx, ty: &ComponentType, serialized: &SerializedComponent) {
        let mut seeds: Vec<(String, Value)> = Vec::new();
        for (variable, definition) in ty.variables() {
            let Some(attribute) = &definition.seed_attribute else {
                continue;
            };
            if let Some(literal) = self.arena.get(idx).and_then(|c| c.attributes.get(attribute)) {
                seeds.push((variable.to_string(), literal.clone()));
            }
        }
        seeds.extend(serialized.state.iter().map(|(k, v)| (k.clone(), v.clone())));

        for (variable, value) in seeds {
            if let Some(definition) = ty.variable(&variable) {
                match &definition.array {
                    Some(spec) => {
                        self.essential
                            .set_entries(idx, &variable, flatten(&value, spec.dimensions()));
                    }
                    None => {
                        self.essential.set_scalar(idx, &variable, value);
                    }
                }
                continue;
            }
            match ty.entry_variable(&variable) {
                Some((array, EntryRef::Single(key))) => {
                    let array = array.to_string();
                    self.essential.set_entries(idx, &array, [(key, value)]);
                }
                Some((array, EntryRef::Group(prefix))) => {
                    let array = array.to_string();
                    let dimensions = ty
                        .variable(&array)
                        .and_then(|d| d.array.as_ref())
                        .map_or(0, |spec| spec.dimensions());
                    let entries = flatten(&value, dimensions.saturating_sub(prefix.len()))
                        .into_iter()
                        .map(|(rest, v)| {
                            let mut key = prefix.clone();
                            key.extend_from_slice(rest.indices());
                            (ArrayKey::new(&key), v)
                        });
                    self.essential.set_entries(idx, &array, entries);
                }
                None => self.warn(
                    idx,
                    Warning::new(format!("<{}> has no state variable '{variable}'", ty.name())).with_level(2),
                ),
            }
        }
    }

    /// Replace the primary variable of a shadow copy with one that mirrors
    /// the source and forwards edits back to it.
    fn wire_shadow(&mut self, idx: ComponentIdx, ty: &ComponentType, link: &ShadowLink) {
        let Some((primary, base)) = ty
            .primary_variable()
            .and_then(|p| ty.variable(p).map(|d| (p.to_string(), d.clone())))
        else {
            self.warn(
                idx,
                Warning::new(format!("<{}> cannot shadow another component", ty.name())).with_level(2),
            );
            return;
        };

        let forward = |desired: &Value| -> InverseResult {
            Ok(vec![InverseInstruction::SetDependency {
                dependency: "source".to_string(),
                desired: desired.clone(),
            }])
        };

        let mut definition = match &base.array {
            None => StateVariableDefinition::computed(
                [("source", Dependency::of(ComponentRef::ShadowSource, link.prop.clone()))],
                |deps| Resolution::value(deps.get("source").clone()),
            )
            .with_inverse(move |req| forward(req.desired))
            .with_default(base.default_value.clone()),
            Some(spec) => {
                let naming = spec.naming.clone();
                let spec = spec
                    .clone()
                    .sized_by(
                        [(
                            "size",
                            Dependency::ArraySize {
                                component: ComponentRef::ShadowSource,
                                variable: link.prop.clone(),
                            },
                        )],
                        |deps| size_from_value(deps.get("size")).ok_or_else(|| "shadow source has no size".to_string()),
                    )
                    .entries(
                        move |key, _| match naming.name_for_key(key) {
                            Some(name) => {
                                Dependencies::none().with("source", Dependency::of(ComponentRef::ShadowSource, name))
                            }
                            None => Dependencies::UseDefault,
                        },
                        |_, deps| Resolution::value(deps.get("source").clone()),
                    )
                    .with_inverse(move |_, req| forward(req.desired));
                StateVariableDefinition::array(spec)
            }
        };
        definition.mark_stale = base.mark_stale.clone();
        definition.locked_by = base.locked_by.clone();
        self.overrides.insert((idx, primary), Arc::new(definition));
    }

    /// Count the document's variants and, for an indexed request, hand each
    /// variant composite its share of the index.
    fn assign_variants(&mut self, root: ComponentIdx, request: VariantRequest) -> Result<()> {
        let mut candidates = Vec::new();
        self.collect_variant_composites(root, &mut candidates);

        let mut counts = Vec::with_capacity(candidates.len());
        for &composite in &candidates {
            let Some(behavior) = self.component_type(composite)?.composite().cloned() else {
                continue;
            };
            let mut ctx = CompositeContext::new(self, composite);
            match behavior.determine_number_of_unique_variants(&mut ctx)? {
                Some(count) => counts.push(count),
                None => {
                    counts.clear();
                    break;
                }
            }
        }
        let plan = (counts.len() == candidates.len()).then(|| VariantPlan::new(counts));
        let total = plan.as_ref().and_then(VariantPlan::total);
        self.number_of_variants = total.filter(|&t| t <= self.config.sampling.max_unique_variants);
        tracing::debug!(variants = ?self.number_of_variants, composites = candidates.len(), "variant space");

        let Some(index) = request.index else {
            return Ok(());
        };
        let digits = match (&plan, self.number_of_variants) {
            (Some(plan), Some(_)) => plan.decode(index),
            _ => None,
        };
        let Some(digits) = digits else {
            self.seed = derive_seed(request.seed, index);
            return Ok(());
        };
        for (composite, digit) in candidates.into_iter().zip(digits) {
            let Some(behavior) = self.component_type(composite)?.composite().cloned() else {
                continue;
            };
            let mut ctx = CompositeContext::new(self, composite);
            let desired = behavior.get_unique_variant(&mut ctx, digit)?;
            if let Some(desired) = desired {
                self.arena.require_mut(composite)?.variant = Some(desired);
                self.invalidate(&NodeKey::variant(composite));
            }
        }
        Ok(())
    }

    fn collect_variant_composites(&self, component: ComponentIdx, out: &mut Vec<ComponentIdx>) {
        let Some(node) = self.arena.get(component) else {
            return;
        };
        let produces = self
            .registry
            .get(&node.component_type)
            .and_then(|ty| ty.composite())
            .is_some_and(|behavior| behavior.produces_variants());
        if produces {
            out.push(component);
        }
        for &child in &node.children {
            self.collect_variant_composites(child, out);
        }
    }
}
