//! State variables: dependency descriptors, definitions and the essential
//! value store.

mod definition;
mod dependency;
mod essential;

pub use definition::{
    DefinitionFn, DependenciesFn, DependencyValue, DependencyValues, InverseFn,
    InverseInstruction, InverseRequest, InverseResult, Outcome, Resolution, StaleSignal,
    StateVariableDefinition,
};
pub use dependency::{ComponentRef, Dependencies, Dependency};
pub use essential::EssentialStore;
