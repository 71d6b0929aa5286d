//! Helpers shared by the integration tests.

#![allow(dead_code)]

use trellis_core::{ComponentIdx, Engine, SerializedComponent, Value, VariantRequest};

/// Route engine logs to the test harness. Set `RUST_LOG=trellis_core=debug`
/// to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a document holding `children` with the builtin catalog.
pub fn build<I>(children: I) -> Engine
where
    I: IntoIterator<Item = SerializedComponent>,
{
    build_with(children, VariantRequest::seeded(1))
}

pub fn build_with<I>(children: I, request: VariantRequest) -> Engine
where
    I: IntoIterator<Item = SerializedComponent>,
{
    init_tracing();
    let mut engine = Engine::with_builtins();
    engine
        .build(SerializedComponent::new("document").children(children), request)
        .expect("document builds");
    engine
}

pub fn number(name: &str, value: f64) -> SerializedComponent {
    SerializedComponent::new("number").named(name).attribute("value", value)
}

pub fn sequence(name: &str, from: i64, to: i64) -> SerializedComponent {
    SerializedComponent::new("sequence")
        .named(name)
        .attribute("from", from)
        .attribute("to", to)
}

/// Resolve a variable that must be numeric.
pub fn float(engine: &mut Engine, component: ComponentIdx, variable: &str) -> f64 {
    engine
        .resolve(component, variable)
        .expect("variable resolves")
        .as_f64()
        .unwrap_or_else(|| panic!("{variable} of {component} is not a number"))
}

/// Values of the `value` variable of each component.
pub fn values(engine: &mut Engine, components: &[ComponentIdx]) -> Vec<Value> {
    components
        .iter()
        .map(|&c| engine.resolve(c, "value").expect("value resolves"))
        .collect()
}

pub fn numbers(values: &[f64]) -> Vec<Value> {
    values.iter().map(|&v| Value::Number(v)).collect()
}

/// Build a document over the builtin catalog plus `types`.
pub fn build_custom<I>(types: Vec<trellis_core::ComponentType>, config: trellis_core::EngineConfig, children: I) -> Engine
where
    I: IntoIterator<Item = SerializedComponent>,
{
    init_tracing();
    let mut registry = trellis_core::TypeRegistry::with_builtins();
    for ty in types {
        registry.register(ty);
    }
    let mut engine = Engine::new(std::sync::Arc::new(registry), config);
    engine
        .build(SerializedComponent::new("document").children(children), VariantRequest::seeded(0))
        .expect("document builds");
    engine
}

/// `base` (essential) feeds `double`, which feeds `quad`. Both derived
/// variables invert by halving.
pub fn chain_type() -> trellis_core::ComponentType {
    use trellis_core::state::{Dependency, InverseInstruction, Resolution, StateVariableDefinition};

    let doubled = |input: &'static str| {
        StateVariableDefinition::computed([("input", Dependency::state(input))], |deps| {
            Resolution::value(deps.f64("input").unwrap_or_default() * 2.0)
        })
        .with_inverse(|req| {
            let desired = req.desired.as_f64().ok_or("not a number")?;
            Ok(vec![InverseInstruction::SetDependency {
                dependency: "input".to_string(),
                desired: Value::Number(desired / 2.0),
            }])
        })
    };
    trellis_core::ComponentType::builder("chain")
        .state_variable("base", StateVariableDefinition::essential(1.0))
        .state_variable("double", doubled("base"))
        .state_variable("quad", doubled("double"))
        .build()
}
