//! The `copy` composite.
//!
//! `<copy target="p"/>` expands into a shadow of the component named `p`;
//! with `prop="x1"` it expands into a single scalar component mirroring that
//! variable. Edits to the copy flow back to the source.
//!
//! Values stay live through the shadow links. Structure is followed through
//! the target's replacements node: when the target's replacements change,
//! the copy re-diffs, keeping shadows whose description is unchanged and
//! replacing the run in between.

use crate::component::{AttributeSpec, ComponentType, SerializedComponent, TypeRegistry};
use crate::composite::{CompositeBehavior, CompositeContext, ReplacementInstruction, Workspace};
use crate::error::Result;
use crate::state::{ComponentRef, Dependencies, Dependency, Resolution, StateVariableDefinition};
use crate::value::{Value, ValueKind};

pub(super) fn register(registry: &mut TypeRegistry) {
    registry.register(
        ComponentType::builder("copy")
            .attribute("target", AttributeSpec::new(ValueKind::Text, Value::Null))
            .attribute("prop", AttributeSpec::new(ValueKind::Text, Value::Null))
            .state_variable(
                "targetName",
                StateVariableDefinition::computed([("target", Dependency::attribute("target"))], |deps| {
                    Resolution::value(deps.get("target").clone())
                }),
            )
            .state_variable(
                "readyToExpand",
                StateVariableDefinition::new(
                    |deps| match deps.get("targetName").as_str() {
                        Some(name) => Dependencies::none().with(
                            "structure",
                            Dependency::Replacements(ComponentRef::Named(name.to_string())),
                        ),
                        None => Dependencies::none(),
                    },
                    |_| Resolution::value(true),
                )
                .determined_by(["targetName"]),
            )
            .composite(Shadow)
            .build(),
    );
}

struct Shadow;

impl CompositeBehavior for Shadow {
    fn create_serialized_replacements(
        &self,
        ctx: &mut CompositeContext<'_>,
        _workspace: &mut Workspace,
    ) -> Result<Vec<SerializedComponent>> {
        let Some(target) = ctx.attribute("target").and_then(Value::as_str).map(str::to_string) else {
            return Ok(vec![SerializedComponent::error_marker("copy has no target")]);
        };
        let Some(source) = ctx.lookup_name(&target) else {
            return Ok(vec![SerializedComponent::error_marker(format!(
                "no component named '{target}'"
            ))]);
        };
        let Some(prop) = ctx.attribute("prop").and_then(Value::as_str).map(str::to_string) else {
            return ctx.serialize_shadow(source);
        };
        if !ctx.has_variable(source, &prop) {
            return Ok(vec![SerializedComponent::error_marker(format!(
                "'{target}' has no variable '{prop}'"
            ))]);
        }

        let component_type = match ctx.resolve_of(source, &prop)? {
            Value::Number(_) | Value::Integer(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Text(_) | Value::Null => "text",
            Value::List(_) if ctx.primary_variable(source).as_deref() == Some(prop.as_str()) => {
                return ctx.serialize_shadow(source);
            }
            Value::Error { error } => return Ok(vec![SerializedComponent::error_marker(error)]),
            other => {
                return Ok(vec![SerializedComponent::error_marker(format!(
                    "cannot copy '{prop}' of '{target}': {other}"
                ))])
            }
        };
        Ok(vec![SerializedComponent::new(component_type).shadowing(source, prop)])
    }

    fn calculate_replacement_changes(
        &self,
        ctx: &mut CompositeContext<'_>,
        workspace: &mut Workspace,
    ) -> Result<Vec<ReplacementInstruction>> {
        let components = self.create_serialized_replacements(ctx, workspace)?;
        Ok(splice(ctx.previous(), components))
    }
}

/// Instructions turning `previous` into `next` while keeping the longest
/// unchanged prefix and suffix.
fn splice(previous: &[SerializedComponent], mut next: Vec<SerializedComponent>) -> Vec<ReplacementInstruction> {
    let front = previous
        .iter()
        .zip(&next)
        .take_while(|(old, new)| old.describes_same(new))
        .count();
    let back = previous[front..]
        .iter()
        .rev()
        .zip(next[front..].iter().rev())
        .take_while(|(old, new)| old.describes_same(new))
        .count();

    let mut instructions = Vec::new();
    let removed = previous.len() - front - back;
    if removed > 0 {
        instructions.push(ReplacementInstruction::Delete {
            from: front,
            count: removed,
        });
    }
    next.truncate(next.len() - back);
    let added: Vec<SerializedComponent> = next.drain(front..).collect();
    if !added.is_empty() {
        instructions.push(ReplacementInstruction::Add {
            at: front,
            components: added,
        });
    }
    instructions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentIdx;
    use crate::engine::Engine;
    use crate::variant::VariantRequest;

    fn shadow_of(source: u32) -> SerializedComponent {
        SerializedComponent::new("number").shadowing(ComponentIdx(source), "value")
    }

    #[test]
    fn splice_keeps_prefix_and_suffix() {
        let previous = vec![shadow_of(1), shadow_of(2), shadow_of(3)];
        let next = vec![shadow_of(1), shadow_of(7), shadow_of(8), shadow_of(3)];
        assert_eq!(
            splice(&previous, next),
            vec![
                ReplacementInstruction::Delete { from: 1, count: 1 },
                ReplacementInstruction::Add {
                    at: 1,
                    components: vec![shadow_of(7), shadow_of(8)],
                },
            ]
        );
    }

    #[test]
    fn splice_of_identical_lists_is_empty() {
        let previous = vec![shadow_of(1), shadow_of(2)];
        assert!(splice(&previous, previous.clone()).is_empty());
    }

    #[test]
    fn splice_appends_growth() {
        let previous = vec![shadow_of(1)];
        let next = vec![shadow_of(1), shadow_of(2)];
        assert_eq!(
            splice(&previous, next),
            vec![ReplacementInstruction::Add {
                at: 1,
                components: vec![shadow_of(2)],
            }]
        );
    }

    #[test]
    fn shadow_of_removed_source_reads_an_error() {
        let mut engine = Engine::with_builtins();
        engine
            .build(
                SerializedComponent::new("document")
                    .child(SerializedComponent::new("number").named("n").attribute("value", 2.0))
                    .child(SerializedComponent::new("copy").named("c").attribute("target", "n")),
                VariantRequest::seeded(0),
            )
            .unwrap();
        let n = engine.lookup("n").unwrap();
        let c = engine.lookup("c").unwrap();
        let shadow = engine.replacements(c)[0];
        assert_eq!(engine.resolve(shadow, "value").unwrap(), Value::Number(2.0));

        engine.remove_subtree(n);
        assert!(engine.resolve(shadow, "value").unwrap().is_error());
    }
}
