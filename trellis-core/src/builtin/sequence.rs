//! The `sequence` composite.
//!
//! A sequence expands into one `number` (or `text`, for letters) per value.
//! Its diff is incremental: values that changed are updated in place,
//! growing adds or restores replacements at the end, shrinking withholds
//! them. Changing the kind or the exclusions regenerates everything.
//!
//! The bounds are attributes that also create essential variables, so they
//! can be edited after the document is built.

use crate::component::{AttributeSpec, ComponentType, ComponentTypeBuilder, SerializedComponent, TypeRegistry};
use crate::composite::{CompositeBehavior, CompositeContext, ReplacementInstruction, Workspace};
use crate::error::{Result, Warning};
use crate::state::{Dependency, DependencyValues, Resolution, StaleSignal, StateVariableDefinition};
use crate::value::{Value, ValueKind};
use crate::variant::{calculate_sequence_parameters, SequenceDomain, SequenceInputs, SequenceKind};

const BOUNDS: [&str; 4] = ["from", "to", "step", "length"];

pub(super) fn register(registry: &mut TypeRegistry) {
    registry.register(
        with_sequence_attributes(ComponentType::builder("sequence"))
            .state_variable("domain", domain_variable())
            .state_variable(
                "values",
                StateVariableDefinition::computed(
                    [
                        ("domain", Dependency::state("domain")),
                        ("exclude", Dependency::state("exclude")),
                    ],
                    |deps| {
                        let domain = deps.get("domain");
                        let Some(domain) = domain_from_value(domain) else {
                            return Resolution::value(domain.clone());
                        };
                        let excluded = domain.excluded_indices(deps.get("exclude").as_list().unwrap_or_default());
                        let values: Vec<Value> = (0..domain.length)
                            .filter(|i| !excluded.contains(i))
                            .map(|i| domain.value_at(i))
                            .collect();
                        Resolution::value(values)
                    },
                ),
            )
            .state_variable(
                "numValues",
                StateVariableDefinition::computed([("values", Dependency::state("values"))], |deps| {
                    Resolution::value(deps.get("values").as_list().map_or(0, <[Value]>::len))
                }),
            )
            .state_variable("readyToExpand", ready_after("values"))
            .composite(Sequence)
            .build(),
    );
}

/// Attributes (and variables) describing a sequence domain.
pub(super) fn with_sequence_attributes(builder: ComponentTypeBuilder) -> ComponentTypeBuilder {
    BOUNDS
        .into_iter()
        .fold(builder, |builder, bound| {
            let kind = if bound == "length" {
                ValueKind::Integer
            } else {
                ValueKind::Any
            };
            builder.attribute(bound, AttributeSpec::new(kind, Value::Null).creating_variable())
        })
        .attribute(
            "type",
            AttributeSpec::new(ValueKind::Text, "number")
                .valid_values(["number", "math", "letters"])
                .creating_variable(),
        )
        .attribute("exclude", AttributeSpec::new(ValueKind::List, Value::Null).creating_variable())
}

/// The completed domain, or an error sentinel for malformed bounds.
pub(super) fn domain_variable() -> StateVariableDefinition {
    let dependencies: Vec<(&str, Dependency)> = BOUNDS
        .into_iter()
        .chain(["type"])
        .map(|name| (name, Dependency::state(name)))
        .collect();
    StateVariableDefinition::computed(dependencies, |deps| match complete_domain(deps) {
        Ok((domain, warnings)) => warnings
            .into_iter()
            .fold(Resolution::value(domain_to_value(&domain)), Resolution::with_warning),
        Err(message) => Resolution::failed(message),
    })
}

/// A ready flag that re-arms whenever `variable` changes.
pub(super) fn ready_after(variable: &str) -> StateVariableDefinition {
    StateVariableDefinition::computed([("input", Dependency::state(variable))], |_| Resolution::value(true))
        .marks_stale(StaleSignal::UpdateReplacements)
}

fn complete_domain(deps: &DependencyValues) -> std::result::Result<(SequenceDomain, Vec<Warning>), String> {
    let kind = deps
        .get("type")
        .as_str()
        .and_then(SequenceKind::parse)
        .unwrap_or_default();
    let given = |name: &str| Some(deps.get(name).clone()).filter(|v| !v.is_null());
    let inputs = SequenceInputs {
        kind,
        from: given("from"),
        to: given("to"),
        step: given("step"),
        length: given("length"),
    };
    let parameters = calculate_sequence_parameters(&inputs)?;
    Ok((parameters.domain, parameters.warnings))
}

pub(super) fn domain_to_value(domain: &SequenceDomain) -> Value {
    let kind = match domain.kind {
        SequenceKind::Number => "number",
        SequenceKind::Letters => "letters",
    };
    Value::map([
        ("kind", Value::text(kind)),
        ("from", Value::Number(domain.from)),
        ("step", Value::Number(domain.step)),
        ("length", Value::from(domain.length)),
    ])
}

pub(super) fn domain_from_value(value: &Value) -> Option<SequenceDomain> {
    Some(SequenceDomain {
        kind: SequenceKind::parse(value.get("kind")?.as_str()?)?,
        from: value.get("from")?.as_f64()?,
        step: value.get("step")?.as_f64()?,
        length: value.get("length")?.as_usize()?,
    })
}

/// Replacement for one sequence value.
pub(super) fn value_component(value: &Value) -> SerializedComponent {
    let component_type = match value {
        Value::Text(_) => "text",
        Value::Bool(_) => "boolean",
        _ => "number",
    };
    SerializedComponent::new(component_type).state("value", value.clone())
}

struct Sequence;

impl Sequence {
    /// Inputs that force a full regeneration when they change.
    fn shape(ctx: &mut CompositeContext<'_>) -> Result<(Value, Value)> {
        Ok((ctx.resolve("type")?, ctx.resolve("exclude")?))
    }

    fn remember(workspace: &mut Workspace, (kind, exclude): (Value, Value), values: Value) {
        workspace.set("kind", kind);
        workspace.set("exclude", exclude);
        workspace.set("values", values);
    }
}

impl CompositeBehavior for Sequence {
    fn create_serialized_replacements(
        &self,
        ctx: &mut CompositeContext<'_>,
        workspace: &mut Workspace,
    ) -> Result<Vec<SerializedComponent>> {
        let values = ctx.resolve("values")?;
        Self::remember(workspace, Self::shape(ctx)?, values.clone());
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

    fn calculate_replacement_changes(
        &self,
        ctx: &mut CompositeContext<'_>,
        workspace: &mut Workspace,
    ) -> Result<Vec<ReplacementInstruction>> {
        let values = ctx.resolve("values")?;
        let shape = Self::shape(ctx)?;
        let previous = workspace.get("values").cloned().unwrap_or_default();

        let regenerate = values.is_error()
            || previous.is_error()
            || workspace.get("kind") != Some(&shape.0)
            || workspace.get("exclude") != Some(&shape.1);
        let (Some(current), Some(previous), false) = (values.as_list(), previous.as_list(), regenerate) else {
            let components = self.create_serialized_replacements(ctx, workspace)?;
            return Ok(vec![ReplacementInstruction::ReplaceAll { components }]);
        };

        // `previous` holds one value per replacement, withheld ones included.
        let total = ctx.replacements().len();
        let mut instructions = Vec::new();
        for (i, (new, old)) in current.iter().zip(previous).enumerate() {
            if new != old {
                instructions.push(ReplacementInstruction::UpdateStateVariables {
                    replacement: i,
                    values: [("value".to_string(), new.clone())].into_iter().collect(),
                });
            }
        }

        let mut remembered: Vec<Value> = current.to_vec();
        if current.len() > total {
            if ctx.withheld() > 0 {
                instructions.push(ReplacementInstruction::Withhold { count: 0 });
            }
            instructions.push(ReplacementInstruction::Add {
                at: total,
                components: current[total..].iter().map(value_component).collect(),
            });
        } else {
            remembered.extend(previous.iter().skip(current.len()).cloned());
            let withheld = total - current.len();
            if withheld != ctx.withheld() {
                instructions.push(ReplacementInstruction::Withhold { count: withheld });
            }
        }

        tracing::trace!(
            composite = %ctx.composite(),
            instructions = instructions.len(),
            "sequence diff"
        );
        Self::remember(workspace, shape, Value::List(remembered));
        Ok(instructions)
    }
}
