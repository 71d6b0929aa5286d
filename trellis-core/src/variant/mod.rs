//! Variants and combinatorics.
//!
//! A document variant is a reproducible assignment of random choices. The
//! engine receives a [`VariantRequest`] at build time; each variant-capable
//! composite either samples from its own seeded stream or, when the document
//! variant space is small enough to index, receives an explicit
//! [`DesiredVariant`] decoded from the document index.

mod plan;
mod rng;
mod sampling;
mod sequence;
mod unique;

use serde::{Deserialize, Serialize};

pub use plan::VariantPlan;
pub use rng::{derive_seed, VariantRng};
pub use sampling::{select_indices, SelectionSpec};
pub use sequence::{
    calculate_sequence_parameters, letters_to_number, number_to_letters, SequenceDomain,
    SequenceInputs, SequenceKind, SequenceParameters,
};
pub use unique::VariantSpace;

use crate::config::SamplingConfig;
use crate::value::Value;

/// Which document variant to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRequest {
    pub seed: u64,
    /// One-based document variant index. Without one, selections are
    /// sampled from the seed.
    #[serde(default)]
    pub index: Option<u64>,
}

impl VariantRequest {
    pub fn seeded(seed: u64) -> Self {
        Self { seed, index: None }
    }

    pub fn indexed(seed: u64, index: u64) -> Self {
        Self {
            seed,
            index: Some(index),
        }
    }
}

/// Explicit choice for one variant-capable component: one-based positions
/// into its domain, in selection order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DesiredVariant {
    pub indices: Vec<usize>,
}

impl DesiredVariant {
    pub fn new(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    /// From zero-based positions.
    pub fn from_positions(positions: &[usize]) -> Self {
        Self {
            indices: positions.iter().map(|p| p + 1).collect(),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::List(self.indices.iter().map(|&i| Value::from(i)).collect())
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let indices = value
            .as_list()?
            .iter()
            .map(Value::as_usize)
            .collect::<Option<Vec<_>>>()?;
        Some(Self { indices })
    }
}

/// What a variant-capable definition needs to make its selection: its own
/// seeded stream, the desired variant if one was assigned, and the sampler
/// tuning.
#[derive(Debug, Clone)]
pub struct VariantContext {
    pub rng: VariantRng,
    pub desired: Option<DesiredVariant>,
    pub sampling: SamplingConfig,
}

impl VariantContext {
    /// Read a descriptor produced by [`descriptor`].
    pub fn from_value(descriptor: &Value) -> Self {
        let seed = descriptor
            .get("seed")
            .and_then(Value::as_i64)
            .map_or(0, |s| s as u64);
        let desired = descriptor.get("indices").and_then(DesiredVariant::from_value);
        let sampling = descriptor
            .get("sampling")
            .and_then(|v| serde_json::to_value(v).ok())
            .and_then(|json| serde_json::from_value(json).ok())
            .unwrap_or_default();
        Self {
            rng: VariantRng::from_seed(seed),
            desired,
            sampling,
        }
    }
}

/// Variant descriptor of one component.
pub fn descriptor(seed: u64, desired: Option<&DesiredVariant>, sampling: &SamplingConfig) -> Value {
    let sampling = serde_json::to_value(sampling)
        .ok()
        .and_then(|json| serde_json::from_value(json).ok())
        .unwrap_or_default();
    Value::map([
        ("seed", Value::Integer(seed as i64)),
        ("indices", desired.map_or(Value::Null, DesiredVariant::to_value)),
        ("sampling", sampling),
    ])
}
