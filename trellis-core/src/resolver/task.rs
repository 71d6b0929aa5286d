//! Suspension points of the resolver.

use crate::graph::NodeKey;
use crate::value::Value;

/// Outcome of one attempt to make progress on a node.
///
/// `Pending` names the unresolved node the attempt stopped at. The
/// scheduler resolves that node first and then retries the attempt from the
/// top; attempts hold no state across suspensions.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Pull<T> {
    Ready(T),
    Pending(NodeKey),
}

impl<T> Pull<T> {
    pub(crate) fn map<U>(self, f: impl FnOnce(T) -> U) -> Pull<U> {
        match self {
            Pull::Ready(value) => Pull::Ready(f(value)),
            Pull::Pending(key) => Pull::Pending(key),
        }
    }
}

/// Unwrap a `Pull`, returning `Ok(Pull::Pending(_))` from the enclosing
/// function if the dependency is not resolved yet.
macro_rules! ready {
    ($e:expr) => {
        match $e {
            $crate::resolver::task::Pull::Ready(value) => value,
            $crate::resolver::task::Pull::Pending(key) => {
                return Ok($crate::resolver::task::Pull::Pending(key))
            }
        }
    };
}
pub(crate) use ready;

/// A value read from the graph or an attribute.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Read {
    pub value: Value,
    pub used_default: bool,
}

impl Read {
    pub(crate) fn computed(value: Value) -> Self {
        Self {
            value,
            used_default: false,
        }
    }

    pub(crate) fn defaulted(value: Value) -> Self {
        Self {
            value,
            used_default: true,
        }
    }
}

/// A node's freshly computed value and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Evaluated {
    pub value: Value,
    pub used_default: bool,
    pub used_essential: bool,
}

impl Evaluated {
    pub(crate) fn computed(value: Value) -> Self {
        Self {
            value,
            used_default: false,
            used_essential: false,
        }
    }

    pub(crate) fn defaulted(value: Value) -> Self {
        Self {
            value,
            used_default: true,
            used_essential: false,
        }
    }
}
