//! Array-valued builtin types.

use crate::array::{ArraySpec, EntryNaming};
use crate::component::{AttributeSpec, ComponentIdx, ComponentType, TypeRegistry};
use crate::state::{
    ComponentRef, Dependencies, Dependency, InverseInstruction, Resolution, StaleSignal,
    StateVariableDefinition,
};
use crate::value::{Value, ValueKind};

const DEFAULT_DIMENSIONS: usize = 2;

pub(super) fn register(registry: &mut TypeRegistry) {
    registry.register(point());
    registry.register(point_list());
}

/// A point with coordinates `x1..xN` stored in the array `xs`.
fn point() -> ComponentType {
    let xs = ArraySpec::new(EntryNaming::new(["x"], 1), 0.0, vec![DEFAULT_DIMENSIONS]).sized_by(
        [("n", Dependency::attribute("numDimensions"))],
        |deps| {
            deps.get("n")
                .as_usize()
                .map(|n| vec![n])
                .ok_or_else(|| format!("invalid numDimensions {}", deps.get("n")))
        },
    );

    ComponentType::builder("point")
        .attribute("numDimensions", AttributeSpec::new(ValueKind::Integer, DEFAULT_DIMENSIONS))
        .attribute("coords", AttributeSpec::new(ValueKind::List, Value::Null))
        .state_variable(
            "xs",
            StateVariableDefinition::array(xs)
                .seeded_from_attribute("coords")
                .marks_stale(StaleSignal::UpdateRenderer),
        )
        .state_variable(
            "numDimensions",
            StateVariableDefinition::computed([("size", Dependency::array_size("xs"))], |deps| {
                let n = deps.get("size").as_list().and_then(|s| s.first()).cloned();
                Resolution::value(n.unwrap_or(Value::Integer(0)))
            }),
        )
        .state_variable(
            "norm",
            StateVariableDefinition::computed([("xs", Dependency::state("xs"))], |deps| match coordinates(deps.get("xs")) {
                Some(xs) => Resolution::value(xs.iter().map(|x| x * x).sum::<f64>().sqrt()),
                None => Resolution::failed(format!("non-numeric coordinates {}", deps.get("xs"))),
            })
            .with_inverse(|req| {
                let desired = req
                    .desired
                    .as_f64()
                    .filter(|d| *d >= 0.0)
                    .ok_or_else(|| format!("{} is not a length", req.desired))?;
                let current = req.current.as_f64().unwrap_or(0.0);
                if current == 0.0 {
                    return Err("cannot scale a zero vector".to_string());
                }
                let xs = coordinates(req.dependencies.get("xs")).ok_or("non-numeric coordinates")?;
                let factor = desired / current;
                Ok(vec![InverseInstruction::SetDependency {
                    dependency: "xs".to_string(),
                    desired: Value::List(xs.into_iter().map(|x| Value::Number(x * factor)).collect()),
                }])
            }),
        )
        .primary("xs")
        .build()
}

fn coordinates(value: &Value) -> Option<Vec<f64>> {
    value.as_list()?.iter().map(Value::as_f64).collect()
}

/// The coordinates of the child points as a two-dimensional array
/// `pointN_k`. Rows follow the active children, so the shape follows
/// composites expanding among them.
fn point_list() -> ComponentType {
    let points = ArraySpec::new(EntryNaming::new(["point"], 2), Value::Null, vec![0, 0])
        .sized_dynamically(
            |determining| {
                Dependencies::none().with("children", Dependency::Value(determining.get("pointChildren").clone()))
            },
            |deps| {
                let children = deps.get("children").as_list().unwrap_or_default();
                let dimensions = children
                    .iter()
                    .filter_map(|child| child.get("numDimensions").and_then(Value::as_usize))
                    .max()
                    .unwrap_or(0);
                Ok(vec![children.len(), dimensions])
            },
        )
        .entries(
            |key, determining| {
                let &[row, column] = key.indices() else {
                    return Dependencies::UseDefault;
                };
                let child = determining
                    .get("pointChildren")
                    .as_list()
                    .and_then(|children| children.get(row));
                let Some(child) = child else {
                    return Dependencies::UseDefault;
                };
                let dimensions = child.get("numDimensions").and_then(Value::as_usize).unwrap_or(0);
                match child.get("componentIdx").and_then(ComponentIdx::from_value) {
                    Some(idx) if column < dimensions => Dependencies::none().with(
                        "x",
                        Dependency::of(ComponentRef::Component(idx), format!("x{}", column + 1)),
                    ),
                    _ => Dependencies::UseDefault,
                }
            },
            |_, deps| Resolution::value(deps.get("x").clone()),
        );

    ComponentType::builder("pointList")
        .child_group("points", ["point"])
        .state_variable(
            "pointChildren",
            StateVariableDefinition::computed(
                [("points", Dependency::children(["points"], ["numDimensions"]))],
                |deps| Resolution::value(deps.get("points").clone()),
            ),
        )
        .state_variable(
            "points",
            StateVariableDefinition::array(points)
                .determined_by(["pointChildren"])
                .marks_stale(StaleSignal::UpdateRenderer),
        )
        .state_variable(
            "numPoints",
            StateVariableDefinition::computed([("points", Dependency::state("pointChildren"))], |deps| {
                Resolution::value(deps.get("points").as_list().map_or(0, <[Value]>::len))
            }),
        )
        .primary("points")
        .build()
}
