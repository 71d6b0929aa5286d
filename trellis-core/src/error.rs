//! Error and diagnostic types.
//!
//! Three channels exist and they are deliberately kept apart:
//!
//! - [`CoreError`] is returned for programmer errors (unknown components,
//!   unknown variables, cycles). These abort the current operation.
//! - Resolution failures never surface here. A definition that cannot
//!   produce a value resolves to [`Value::Error`](crate::Value) instead.
//! - [`Warning`]s are non-fatal notes about the document and are collected
//!   into [`Diagnostics`] without interrupting resolution.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::array::ArrayKey;
use crate::component::ComponentIdx;
use crate::graph::NodeKey;

/// Errors raised by engine operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The component index does not refer to a live component.
    #[error("component {0} does not exist")]
    UnknownComponent(ComponentIdx),

    /// No component type with this name has been registered.
    #[error("unknown component type '{0}'")]
    UnknownComponentType(String),

    /// The component's type does not declare the requested variable.
    #[error("component {component} ({component_type}) has no state variable '{variable}'")]
    UnknownStateVariable {
        component: ComponentIdx,
        component_type: String,
        variable: String,
    },

    /// A `Named` component reference did not match any component.
    #[error("no component is named '{0}'")]
    UnknownName(String),

    /// An array key fell outside the current array size.
    #[error("array key {key} is out of bounds for '{variable}' (size {size:?})")]
    InvalidArrayKey {
        variable: String,
        key: ArrayKey,
        size: Vec<usize>,
    },

    /// Resolution re-entered a node that was still being resolved.
    #[error("circular dependency: {}", format_cycle(.path))]
    CircularDependency { path: Vec<NodeKey> },

    /// A serialized component could not be instantiated.
    #[error("malformed serialized component: {0}")]
    MalformedDescriptor(String),

    /// A composite produced an instruction that does not fit its replacements.
    #[error("invalid replacement instruction for composite {composite}: {reason}")]
    InvalidReplacementInstruction {
        composite: ComponentIdx,
        reason: String,
    },

    /// JSON input could not be parsed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn format_cycle(path: &[NodeKey]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Crate-wide result alias.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// Failures of the variant/combinatorics subsystem.
///
/// These are converted into error sentinels by the resolver, so a document
/// with an over-constrained selection still renders.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CombinatoricsError {
    #[error("cannot select {requested} values from {available} eligible values")]
    OverExcluded { requested: usize, available: usize },

    #[error("no coprime selection exists: every value is divisible by {divisor}")]
    CoprimeImpossible { divisor: i64 },

    #[error("coprime selection requires integer values")]
    CoprimeNonInteger,

    #[error("gave up after {attempts} attempts to satisfy the selection constraints")]
    Exhausted { attempts: usize },

    #[error("invalid desired variant: {0}")]
    InvalidDesiredVariant(String),
}

/// Position of a component in its source markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
}

/// A non-fatal note about the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub message: String,
    /// 1 is the most severe.
    pub level: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<SourcePosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<ComponentIdx>,
}

impl Warning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: 1,
            position: None,
            component: None,
        }
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    pub fn at(mut self, component: ComponentIdx, position: Option<SourcePosition>) -> Self {
        self.component = Some(component);
        if self.position.is_none() {
            self.position = position;
        }
        self
    }
}

/// Collected warnings for a document.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn push(&mut self, warning: Warning) {
        tracing::warn!(
            level = warning.level,
            component = ?warning.component,
            "{}",
            warning.message
        );
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn take(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_keeps_explicit_position() {
        let pos = SourcePosition { line: 3, column: 7 };
        let other = SourcePosition { line: 1, column: 1 };
        let mut w = Warning::new("ignored");
        w.position = Some(pos);
        let w = w.at(ComponentIdx(4), Some(other));
        assert_eq!(w.position, Some(pos));
        assert_eq!(w.component, Some(ComponentIdx(4)));
    }

    #[test]
    fn diagnostics_take_drains() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.push(Warning::new("a").with_level(2));
        diagnostics.push(Warning::new("b"));
        assert_eq!(diagnostics.warnings().len(), 2);

        let taken = diagnostics.take();
        assert_eq!(taken[0].level, 2);
        assert!(diagnostics.warnings().is_empty());
    }
}
