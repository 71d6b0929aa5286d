//! Variant-capable composites.
//!
//! Both types resolve a `selectionSpace` describing what may be chosen and
//! a `selectedIndices` list drawn from the component's variant descriptor.
//! When the document variant is indexed, the engine hands each of them a
//! desired selection decoded from the index instead.

use std::collections::BTreeSet;

use super::sequence::{domain_from_value, domain_variable, ready_after, value_component, with_sequence_attributes};
use crate::component::{AttributeSpec, ComponentIdx, ComponentType, ComponentTypeBuilder, SerializedComponent, TypeRegistry};
use crate::composite::{CompositeBehavior, CompositeContext, Workspace};
use crate::error::{Result, Warning};
use crate::state::{Dependency, DependencyValues, Resolution, StateVariableDefinition};
use crate::value::{Value, ValueKind};
use crate::variant::{
    select_indices, DesiredVariant, SelectionSpec, SequenceDomain, SequenceKind, VariantContext, VariantSpace,
};

pub(super) fn register(registry: &mut TypeRegistry) {
    registry.register(select_from_sequence());
    registry.register(select());
}

fn with_selection_attributes(builder: ComponentTypeBuilder) -> ComponentTypeBuilder {
    builder
        .attribute("numToSelect", AttributeSpec::new(ValueKind::Integer, 1))
        .attribute("withReplacement", AttributeSpec::new(ValueKind::Boolean, false))
}

fn select_from_sequence() -> ComponentType {
    let selection = || {
        [
            ("domain", Dependency::state("domain")),
            ("exclude", Dependency::state("exclude")),
            ("numToSelect", Dependency::attribute("numToSelect")),
            ("withReplacement", Dependency::attribute("withReplacement")),
            ("coprime", Dependency::attribute("coprime")),
        ]
    };

    with_selection_attributes(with_sequence_attributes(ComponentType::builder("selectFromSequence")))
        .attribute("sortResults", AttributeSpec::new(ValueKind::Boolean, false))
        .attribute("coprime", AttributeSpec::new(ValueKind::Boolean, false))
        .state_variable("domain", domain_variable())
        .state_variable(
            "selectionSpace",
            StateVariableDefinition::computed(selection(), |deps| match sequence_selection(deps) {
                Ok(spec) => Resolution::value(space_to_value(&spec)),
                Err(message) => Resolution::failed(message),
            }),
        )
        .state_variable(
            "selectedIndices",
            StateVariableDefinition::computed(
                selection().into_iter().chain([("variant", Dependency::Variant)]),
                |deps| match sequence_selection(deps) {
                    Ok(spec) => draw(&spec, deps.get("variant")),
                    Err(message) => Resolution::failed(message),
                },
            ),
        )
        .state_variable(
            "selectedValues",
            StateVariableDefinition::computed(
                [
                    ("domain", Dependency::state("domain")),
                    ("indices", Dependency::state("selectedIndices")),
                    ("sortResults", Dependency::attribute("sortResults")),
                ],
                |deps| {
                    let Some(domain) = domain_from_value(deps.get("domain")) else {
                        return Resolution::value(deps.get("domain").clone());
                    };
                    let indices = deps.get("indices");
                    let Some(positions) = positions(indices) else {
                        return Resolution::value(indices.clone());
                    };
                    let mut positions: Vec<usize> = positions.into_iter().filter(|&p| p < domain.length).collect();
                    if deps.bool("sortResults") == Some(true) {
                        positions.sort_by(|a, b| domain.number_at(*a).total_cmp(&domain.number_at(*b)));
                    }
                    Resolution::value(positions.into_iter().map(|p| domain.value_at(p)).collect::<Vec<_>>())
                },
            ),
        )
        .state_variable("readyToExpand", ready_after("selectedValues"))
        .composite(SelectFromSequence)
        .build()
}

fn sequence_selection(deps: &DependencyValues) -> std::result::Result<SelectionSpec, String> {
    let domain = deps.get("domain");
    if let Some(message) = domain.error_message() {
        return Err(message.to_string());
    }
    let domain = domain_from_value(domain).ok_or_else(|| format!("invalid domain {domain}"))?;
    let count = deps
        .get("numToSelect")
        .as_usize()
        .ok_or_else(|| format!("invalid numToSelect {}", deps.get("numToSelect")))?;
    Ok(SelectionSpec::new(domain, count)
        .excluding(deps.get("exclude").as_list().unwrap_or_default())
        .with_replacement(deps.bool("withReplacement") == Some(true))
        .coprime(deps.bool("coprime") == Some(true)))
}

/// Choose among the `option` children. Each chosen option contributes
/// shadow copies of its content.
fn select() -> ComponentType {
    let selection = || {
        [
            ("options", Dependency::state("optionChildren")),
            ("numToSelect", Dependency::attribute("numToSelect")),
            ("withReplacement", Dependency::attribute("withReplacement")),
        ]
    };

    with_selection_attributes(ComponentType::builder("select"))
        .child_group("options", ["option"])
        .state_variable(
            "optionChildren",
            StateVariableDefinition::computed(
                [("options", Dependency::children(["options"], Vec::<String>::new()))],
                |deps| {
                    let options = deps.get("options").as_list().unwrap_or_default();
                    Resolution::value(
                        options
                            .iter()
                            .filter_map(|o| o.get("componentIdx").cloned())
                            .collect::<Vec<_>>(),
                    )
                },
            ),
        )
        .state_variable(
            "selectionSpace",
            StateVariableDefinition::computed(selection(), |deps| match option_selection(deps) {
                Ok(spec) => Resolution::value(space_to_value(&spec)),
                Err(message) => Resolution::failed(message),
            }),
        )
        .state_variable(
            "selectedIndices",
            StateVariableDefinition::computed(
                selection().into_iter().chain([("variant", Dependency::Variant)]),
                |deps| match option_selection(deps) {
                    Ok(spec) => draw(&spec, deps.get("variant")),
                    Err(message) => Resolution::failed(message),
                },
            ),
        )
        .state_variable("readyToExpand", ready_after("selectedIndices"))
        .composite(Select)
        .build()
}

fn option_selection(deps: &DependencyValues) -> std::result::Result<SelectionSpec, String> {
    let options = deps.get("options").as_list().map_or(0, <[Value]>::len);
    let count = deps
        .get("numToSelect")
        .as_usize()
        .ok_or_else(|| format!("invalid numToSelect {}", deps.get("numToSelect")))?;
    let domain = SequenceDomain {
        kind: SequenceKind::Number,
        from: 1.0,
        step: 1.0,
        length: options,
    };
    Ok(SelectionSpec::new(domain, count).with_replacement(deps.bool("withReplacement") == Some(true)))
}

fn draw(spec: &SelectionSpec, descriptor: &Value) -> Resolution {
    let mut ctx = VariantContext::from_value(descriptor);
    match select_indices(spec, &mut ctx.rng, &ctx.sampling, ctx.desired.as_ref()) {
        Ok(positions) => Resolution::value(positions.into_iter().map(Value::from).collect::<Vec<_>>()),
        Err(err) => Resolution::failed(err.to_string()),
    }
}

fn positions(value: &Value) -> Option<Vec<usize>> {
    value.as_list()?.iter().map(Value::as_usize).collect()
}

fn space_to_value(spec: &SelectionSpec) -> Value {
    Value::map([
        ("length", Value::from(spec.domain.length)),
        ("excluded", Value::List(spec.excluded.iter().map(|&p| Value::from(p)).collect())),
        ("count", Value::from(spec.count)),
        ("withReplacement", Value::Bool(spec.with_replacement)),
        (
            "coprime",
            Value::Bool(spec.coprime && spec.count >= 2 && spec.domain.kind == SequenceKind::Number),
        ),
    ])
}

/// The enumerable space behind `selectionSpace`, unless the selection is
/// filtered by a coprimality test and so cannot be numbered.
fn space_from_value(value: &Value) -> Option<VariantSpace> {
    if value.get("coprime")?.is_true() {
        return None;
    }
    let excluded: BTreeSet<usize> = positions(value.get("excluded")?)?.into_iter().collect();
    Some(VariantSpace::new(
        value.get("length")?.as_usize()?,
        &excluded,
        value.get("count")?.as_usize()?,
        value.get("withReplacement")?.is_true(),
    ))
}

fn count_variants(ctx: &mut CompositeContext<'_>) -> Result<Option<u64>> {
    let space = ctx.resolve("selectionSpace")?;
    Ok(space_from_value(&space).and_then(|space| space.size()))
}

fn variant_at(ctx: &mut CompositeContext<'_>, index: u64) -> Result<Option<DesiredVariant>> {
    let space = ctx.resolve("selectionSpace")?;
    let Some(space) = space_from_value(&space) else {
        return Ok(None);
    };
    match space.decode(index) {
        Ok(positions) => Ok(Some(DesiredVariant::from_positions(&positions))),
        Err(err) => {
            ctx.warn(Warning::new(err.to_string()));
            Ok(None)
        }
    }
}

struct SelectFromSequence;

impl CompositeBehavior for SelectFromSequence {
    fn create_serialized_replacements(
        &self,
        ctx: &mut CompositeContext<'_>,
        _workspace: &mut Workspace,
    ) -> Result<Vec<SerializedComponent>> {
        let values = ctx.resolve("selectedValues")?;
        if let Some(message) = values.error_message() {
            return Ok(vec![SerializedComponent::error_marker(message)]);
        }
        Ok(values
            .as_list()
            .unwrap_or_default()
            .iter()
            .map(value_component)
            .collect())
    }

    fn produces_variants(&self) -> bool {
        true
    }

    fn determine_number_of_unique_variants(&self, ctx: &mut CompositeContext<'_>) -> Result<Option<u64>> {
        count_variants(ctx)
    }

    fn get_unique_variant(&self, ctx: &mut CompositeContext<'_>, index: u64) -> Result<Option<DesiredVariant>> {
        variant_at(ctx, index)
    }
}

struct Select;

impl CompositeBehavior for Select {
    fn create_serialized_replacements(
        &self,
        ctx: &mut CompositeContext<'_>,
        _workspace: &mut Workspace,
    ) -> Result<Vec<SerializedComponent>> {
        let indices = ctx.resolve("selectedIndices")?;
        if let Some(message) = indices.error_message() {
            return Ok(vec![SerializedComponent::error_marker(message)]);
        }
        let options = ctx.resolve("optionChildren")?;
        let options: Vec<ComponentIdx> = options
            .as_list()
            .unwrap_or_default()
            .iter()
            .filter_map(ComponentIdx::from_value)
            .collect();

        let mut components = Vec::new();
        for position in positions(&indices).unwrap_or_default() {
            let Some(&option) = options.get(position) else {
                continue;
            };
            for child in ctx.active_children(option)? {
                components.extend(ctx.serialize_shadow(child)?);
            }
        }
        Ok(components)
    }

    fn produces_variants(&self) -> bool {
        true
    }

    fn determine_number_of_unique_variants(&self, ctx: &mut CompositeContext<'_>) -> Result<Option<u64>> {
        count_variants(ctx)
    }

    fn get_unique_variant(&self, ctx: &mut CompositeContext<'_>, index: u64) -> Result<Option<DesiredVariant>> {
        variant_at(ctx, index)
    }
}
