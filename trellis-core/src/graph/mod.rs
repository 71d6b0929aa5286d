//! Dependency Graph
//!
//! This module implements the graph that tracks which resolved nodes read
//! which other nodes.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes are resolvable quantities of components (state variables, array
//!   entries and sizes, active-children lists, variant descriptors)
//! - Edges represent reads: if A read B during its last resolution, there is
//!   an edge from B to A
//!
//! When an essential value changes, we traverse the graph to find all
//! affected nodes and mark them stale. Values are re-derived lazily on the
//! next read.
//!
//! # Design Decisions
//!
//! 1. The graph is centralized and keyed by [`NodeKey`], so cross-component
//!    edges need no pointers into component storage.
//!
//! 2. Edges are recorded per resolution rather than declared up front,
//!    because a variable's dependency set may depend on other values.
//!
//! 3. We maintain both forward (dependencies) and reverse (dependents) edges
//!    to enable efficient traversal in both directions.

mod node;
mod propagator;

pub use node::{Freshness, NodeKey, Slot, StateNode};
pub use propagator::DependencyGraph;
