//! Integration Tests for Resolution and Staleness
//!
//! These tests verify that state variables resolve lazily, cache their
//! values, and go stale exactly when something they read changes.

mod common;

use std::sync::Arc;

use trellis_core::component::{AttributeSpec, ComponentType, TypeRegistry};
use trellis_core::state::{Dependencies, Dependency, Resolution, StaleSignal, StateVariableDefinition};
use trellis_core::{
    ComponentIdx, CoreError, Engine, EngineConfig, SerializedComponent, Value, ValueKind, VariantRequest,
};

use common::{build, build_custom, chain_type, float, number, sequence};

/// Test that nothing is computed until read, and reads hit the cache.
#[test]
fn derived_variables_resolve_lazily_and_cache() {
    let mut engine = build([SerializedComponent::new("angle").named("a").attribute("radians", 1.0)]);
    let a = engine.lookup("a").unwrap();

    // Building does not touch plain variables
    assert_eq!(engine.evaluations(a, "degrees"), 0);

    let degrees = float(&mut engine, a, "degrees");
    assert!((degrees - 1f64.to_degrees()).abs() < 1e-9);
    assert_eq!(engine.evaluations(a, "degrees"), 1);

    // Repeated reads use the cached value
    float(&mut engine, a, "degrees");
    float(&mut engine, a, "degrees");
    assert_eq!(engine.evaluations(a, "degrees"), 1);
}

/// Test that changing an essential value recomputes every dependent once.
#[test]
fn essential_change_restales_the_whole_chain() {
    let mut engine = build_custom(
        vec![chain_type()],
        EngineConfig::default(),
        [SerializedComponent::new("chain").named("c").state("base", 3.0)],
    );
    let c = engine.lookup("c").unwrap();

    assert_eq!(float(&mut engine, c, "quad"), 12.0);
    assert_eq!(engine.evaluations(c, "double"), 1);

    engine.request_change(c, "base", Value::Number(5.0)).unwrap();

    // Nothing recomputes until read
    assert_eq!(engine.evaluations(c, "quad"), 1);
    assert_eq!(float(&mut engine, c, "quad"), 20.0);
    assert_eq!(engine.evaluations(c, "double"), 2);
    assert_eq!(engine.evaluations(c, "quad"), 2);
}

/// Test that an unchanged write does not invalidate anything.
#[test]
fn writing_the_same_value_keeps_dependents_fresh() {
    let mut engine = build_custom(
        vec![chain_type()],
        EngineConfig::default(),
        [SerializedComponent::new("chain").named("c").state("base", 3.0)],
    );
    let c = engine.lookup("c").unwrap();
    float(&mut engine, c, "quad");

    engine.request_change(c, "base", Value::Number(3.0)).unwrap();
    float(&mut engine, c, "quad");
    assert_eq!(engine.evaluations(c, "quad"), 1);
}

fn cycle_type() -> ComponentType {
    let plus_one = |other: &'static str| {
        StateVariableDefinition::computed([("other", Dependency::state(other))], |deps| {
            Resolution::value(deps.f64("other").unwrap_or_default() + 1.0)
        })
    };
    ComponentType::builder("loop")
        .state_variable("a", plus_one("b"))
        .state_variable("b", plus_one("a"))
        .build()
}

/// Test that a dependency cycle is reported instead of looping.
#[test]
fn dependency_cycle_is_an_error() {
    let mut engine = build_custom(
        vec![cycle_type()],
        EngineConfig::default(),
        [SerializedComponent::new("loop").named("l")],
    );
    let l = engine.lookup("l").unwrap();

    match engine.resolve(l, "a") {
        Err(CoreError::CircularDependency { path }) => {
            assert_eq!(path.len(), 3);
            assert_eq!(path.first(), path.last());
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
}

/// The dependency of `chosen` is picked by the determining `useFirst`.
fn switch_type() -> ComponentType {
    ComponentType::builder("switch")
        .state_variable("useFirst", StateVariableDefinition::essential(true))
        .state_variable("first", StateVariableDefinition::essential(1.0))
        .state_variable("second", StateVariableDefinition::essential(2.0))
        .state_variable(
            "chosen",
            StateVariableDefinition::new(
                |determining| {
                    let source = if determining.get("useFirst").is_true() {
                        "first"
                    } else {
                        "second"
                    };
                    Dependencies::none().with("source", Dependency::state(source))
                },
                |deps| Resolution::value(deps.get("source").clone()),
            )
            .determined_by(["useFirst"]),
        )
        .build()
}

/// Test that determining variables reshape the dependency set.
#[test]
fn determining_variable_switches_dependencies() {
    let mut engine = build_custom(
        vec![switch_type()],
        EngineConfig::default(),
        [SerializedComponent::new("switch").named("s")],
    );
    let s = engine.lookup("s").unwrap();
    assert_eq!(float(&mut engine, s, "chosen"), 1.0);

    // `second` is not read while `useFirst` holds
    engine.request_change(s, "second", Value::Number(5.0)).unwrap();
    assert_eq!(float(&mut engine, s, "chosen"), 1.0);
    assert_eq!(engine.evaluations(s, "chosen"), 1);

    engine.request_change(s, "useFirst", Value::Bool(false)).unwrap();
    assert_eq!(float(&mut engine, s, "chosen"), 5.0);

    // Now `first` is no longer a dependency
    engine.request_change(s, "first", Value::Number(9.0)).unwrap();
    assert_eq!(float(&mut engine, s, "chosen"), 5.0);
    assert_eq!(engine.evaluations(s, "chosen"), 2);
}

/// Test lookups of unknown names and variables.
#[test]
fn unknown_names_are_errors() {
    let mut engine = build([number("n", 1.0)]);
    let n = engine.lookup("n").unwrap();

    assert!(matches!(engine.lookup("missing"), Err(CoreError::UnknownName(_))));
    assert!(matches!(
        engine.resolve(n, "colour"),
        Err(CoreError::UnknownStateVariable { .. })
    ));
    assert!(matches!(
        engine.resolve(ComponentIdx(9999), "value"),
        Err(CoreError::UnknownComponent(_))
    ));
}

/// Test that building twice is refused.
#[test]
fn document_builds_once() {
    let mut engine = build([number("n", 1.0)]);
    let again = engine.build(SerializedComponent::new("document"), VariantRequest::seeded(0));
    assert!(matches!(again, Err(CoreError::MalformedDescriptor(_))));
}

/// Test that an unknown component type fails the build.
#[test]
fn unknown_component_type_fails_build() {
    let mut engine = Engine::with_builtins();
    let result = engine.build(
        SerializedComponent::new("document").child(SerializedComponent::new("blink")),
        VariantRequest::seeded(0),
    );
    assert!(matches!(result, Err(CoreError::UnknownComponentType(name)) if name == "blink"));
}

/// Test that malformed authoring is reported as warnings, not errors.
#[test]
fn authoring_mistakes_become_warnings() {
    let engine = build([
        SerializedComponent::new("number")
            .attribute("colour", "red")
            .at(3, 5),
        SerializedComponent::new("number").attribute("value", "abc"),
        SerializedComponent::new("pointList").child(SerializedComponent::new("text")),
    ]);
    let messages: Vec<&str> = engine.warnings().iter().map(|w| w.message.as_str()).collect();

    assert!(messages.iter().any(|m| m.contains("unknown attribute 'colour'")));
    assert!(messages.iter().any(|m| m.contains("invalid value abc")));
    assert!(messages.iter().any(|m| m.contains("not a valid child")));

    let unknown = engine
        .warnings()
        .iter()
        .find(|w| w.message.contains("colour"))
        .unwrap();
    assert_eq!(unknown.level, 2);
    assert_eq!(unknown.position.map(|p| (p.line, p.column)), Some((3, 5)));
}

/// Test that unknown attributes can be tolerated silently.
#[test]
fn unknown_attribute_warnings_can_be_disabled() {
    let config = EngineConfig {
        warn_unknown_attributes: false,
        ..EngineConfig::default()
    };
    let engine = build_custom(vec![], config, [SerializedComponent::new("text").attribute("colour", "red")]);
    assert!(engine.warnings().is_empty());
}

/// Test that malformed inputs resolve to an error value with a warning.
#[test]
fn failed_definition_yields_error_value() {
    let mut engine = build([SerializedComponent::new("sequence")
        .named("s")
        .attribute("from", 1)
        .attribute("step", 0)]);
    let s = engine.lookup("s").unwrap();

    let domain = engine.resolve(s, "domain").unwrap();
    assert_eq!(domain.error_message(), Some("sequence step cannot be zero"));
    assert!(engine.warnings().iter().any(|w| w.level == 1 && w.message.contains("step")));
}

/// Test renderer refresh requests raised by stale variables.
#[test]
fn stale_renderer_variables_request_refresh() {
    let mut engine = build([number("n", 2.0), number("m", 3.0)]);
    let n = engine.lookup("n").unwrap();
    engine.resolve(n, "value").unwrap();
    engine.take_renderer_updates();

    engine.request_change(n, "value", Value::Number(4.0)).unwrap();
    assert_eq!(engine.take_renderer_updates(), vec![n]);
    assert!(engine.take_renderer_updates().is_empty());
}

fn beacon_type() -> ComponentType {
    ComponentType::builder("beacon")
        .attribute("level", AttributeSpec::new(ValueKind::Number, 0.0).creating_variable())
        .state_variable(
            "signal",
            StateVariableDefinition::computed([("level", Dependency::state("level"))], |deps| {
                Resolution::value(deps.get("level").clone())
            })
            .marks_stale(StaleSignal::Custom("redraw".to_string())),
        )
        .build()
}

/// Test that custom stale tags are collected for the host.
#[test]
fn custom_stale_signals_are_collected() {
    let mut engine = build_custom(
        vec![beacon_type()],
        EngineConfig::default(),
        [SerializedComponent::new("beacon").named("b").attribute("level", 1.0)],
    );
    let b = engine.lookup("b").unwrap();

    // Nothing is signalled for a variable that was never read
    engine.request_change(b, "level", Value::Number(2.0)).unwrap();
    assert!(engine.take_signals().is_empty());

    engine.resolve(b, "signal").unwrap();
    engine.request_change(b, "level", Value::Number(3.0)).unwrap();
    assert_eq!(engine.take_signals(), vec![(b, "redraw".to_string())]);
}

/// Test that a group counts its active children, replacements included.
#[test]
fn group_counts_active_children() {
    let mut engine = build([SerializedComponent::new("group")
        .named("g")
        .child(SerializedComponent::new("text").attribute("value", "hi"))
        .child(sequence("s", 1, 3))]);
    let g = engine.lookup("g").unwrap();
    let s = engine.lookup("s").unwrap();

    assert_eq!(engine.resolve(g, "numChildren").unwrap(), Value::Integer(4));

    engine.request_change(s, "to", Value::Integer(5)).unwrap();
    assert_eq!(engine.resolve(g, "numChildren").unwrap(), Value::Integer(6));
}

/// Test that a custom registry can be shared between engines.
#[test]
fn registry_is_shared() {
    let registry = Arc::new(TypeRegistry::with_builtins());
    let mut first = Engine::new(registry.clone(), EngineConfig::default());
    let mut second = Engine::new(registry, EngineConfig::default());
    for engine in [&mut first, &mut second] {
        engine
            .build(
                SerializedComponent::new("document").child(number("n", 1.0)),
                VariantRequest::seeded(0),
            )
            .unwrap();
    }
    let n = first.lookup("n").unwrap();
    first.request_change(n, "value", Value::Number(8.0)).unwrap();

    let m = second.lookup("n").unwrap();
    assert_eq!(float(&mut first, n, "value"), 8.0);
    assert_eq!(float(&mut second, m, "value"), 1.0);
}
