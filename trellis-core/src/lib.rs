//! Trellis Core
//!
//! This crate provides the state engine behind interactive documents. A
//! document is a tree of components; every component exposes named state
//! variables whose values are derived lazily from other variables, from
//! authored attributes, or from essential (author- or user-set) values.
//!
//! It implements:
//!
//! - A dependency graph recording which resolved values read which others
//! - A lazy resolver that evaluates variables on demand and detects cycles
//! - Staleness propagation that marks dependents stale on every change
//! - Array-valued variables with per-entry dependencies and entry names
//! - Atomic inverse updates that turn edits of derived values into
//!   essential writes
//! - Composites that expand into replacement components and diff them
//!   incrementally when their inputs change
//! - Reproducible random selections numbered as document variants
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `component`: the component arena, serialized descriptors and the type
//!   registry
//! - `state`: state-variable definitions, dependency descriptors and the
//!   essential store
//! - `graph`: the dependency graph and staleness propagation
//! - `array`: array keys, shapes and entry naming
//! - `engine`: the document, tree construction and the public API
//! - `composite`: composite behaviors, expansion and replacement diffs
//! - `inverse`: change requests
//! - `variant`: sequences, sampling and variant numbering
//! - `builtin`: the builtin component catalog
//!
//! # Example
//!
//! ```rust
//! use trellis_core::{Engine, SerializedComponent, Value, VariantRequest};
//!
//! let mut engine = Engine::with_builtins();
//! let document = SerializedComponent::new("document")
//!     .child(SerializedComponent::new("angle").named("a").attribute("radians", 1.0));
//! engine.build(document, VariantRequest::seeded(7))?;
//!
//! let a = engine.lookup("a")?;
//! let degrees = engine.resolve(a, "degrees")?.as_f64().unwrap_or_default();
//! assert!((degrees - 1f64.to_degrees()).abs() < 1e-9);
//!
//! // Editing the derived value writes the essential one.
//! engine.request_change(a, "degrees", Value::Number(90.0))?;
//! let radians = engine.resolve(a, "radians")?.as_f64().unwrap_or_default();
//! assert!((radians - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
//! # Ok::<(), trellis_core::CoreError>(())
//! ```

pub mod array;
pub mod builtin;
pub mod component;
pub mod composite;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod inverse;
mod resolver;
pub mod state;
pub mod value;
pub mod variant;

pub use array::ArrayKey;
pub use component::{ComponentIdx, ComponentType, SerializedComponent, TypeRegistry};
pub use composite::{ReplacementChange, SubscriberId};
pub use config::{ConfigError, EngineConfig, SamplingConfig};
pub use engine::Engine;
pub use error::{CombinatoricsError, CoreError, Result, SourcePosition, Warning};
pub use inverse::ChangeOutcome;
pub use value::{Value, ValueKind};
pub use variant::{DesiredVariant, VariantRequest};
