//! Containers and scalar leaf types.

use std::f64::consts::PI;

use super::capabilities::{fixed, rounding};
use crate::component::{AttributeSpec, ComponentType, TypeRegistry, ANY_TYPE, ERROR_COMPONENT_TYPE};
use crate::state::{Dependency, InverseInstruction, Resolution, StaleSignal, StateVariableDefinition};
use crate::value::{Value, ValueKind};

pub(super) fn register(registry: &mut TypeRegistry) {
    registry.register(ComponentType::builder("document").child_group("anything", [ANY_TYPE]).build());
    registry.register(group());
    registry.register(ComponentType::builder("option").child_group("anything", [ANY_TYPE]).build());
    registry.register(
        ComponentType::builder("text")
            .attribute("value", AttributeSpec::new(ValueKind::Text, "").creating_variable())
            .primary("value")
            .build(),
    );
    registry.register(
        ComponentType::builder("boolean")
            .attribute("value", AttributeSpec::new(ValueKind::Boolean, false).creating_variable())
            .primary("value")
            .build(),
    );
    registry.register(number());
    registry.register(angle());
    registry.register(
        ComponentType::builder(ERROR_COMPONENT_TYPE)
            .state_variable("message", StateVariableDefinition::essential(""))
            .build(),
    );
}

fn group() -> ComponentType {
    ComponentType::builder("group")
        .child_group("anything", [ANY_TYPE])
        .state_variable(
            "numChildren",
            StateVariableDefinition::computed(
                [("children", Dependency::children(["anything"], Vec::<String>::new()))],
                |deps| {
                    let count = deps.get("children").as_list().map_or(0, <[Value]>::len);
                    Resolution::value(count)
                },
            )
            .marks_stale(StaleSignal::UpdateRenderer),
        )
        .build()
}

/// An editable number. Refuses edits while `fixed`.
fn number() -> ComponentType {
    ComponentType::builder("number")
        .attribute("value", AttributeSpec::new(ValueKind::Number, 0.0))
        .state_variable(
            "value",
            StateVariableDefinition::essential(0.0)
                .seeded_from_attribute("value")
                .locked_by("fixed")
                .marks_stale(StaleSignal::UpdateRenderer),
        )
        .primary("value")
        .with(&rounding())
        .with(&fixed())
        .build()
}

fn angle() -> ComponentType {
    ComponentType::builder("angle")
        .attribute("radians", AttributeSpec::new(ValueKind::Number, 0.0).creating_variable())
        .state_variable(
            "degrees",
            StateVariableDefinition::computed([("radians", Dependency::state("radians"))], |deps| {
                match deps.f64("radians") {
                    Some(radians) => Resolution::value(radians.to_degrees()),
                    None => Resolution::failed(format!("{} is not an angle", deps.get("radians"))),
                }
            })
            .with_inverse(|req| {
                let degrees = req
                    .desired
                    .as_f64()
                    .ok_or_else(|| format!("{} is not an angle", req.desired))?;
                Ok(vec![InverseInstruction::SetDependency {
                    dependency: "radians".to_string(),
                    desired: Value::Number(degrees * PI / 180.0),
                }])
            }),
        )
        .primary("radians")
        .build()
}
