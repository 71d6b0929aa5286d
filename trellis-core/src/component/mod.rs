//! Components: the arena that owns them, the serialized form they are built
//! from, and the registry of component types.

mod arena;
mod registry;
mod serialized;

pub use arena::{Component, ComponentArena, ComponentIdx};
pub use registry::{
    AttributeSpec, Capability, ChildGroup, ComponentType, ComponentTypeBuilder, TypeRegistry,
    ANY_TYPE,
};
pub use serialized::{SerializedComponent, SerializedTag, ShadowLink, ERROR_COMPONENT_TYPE};
