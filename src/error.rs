//! Layered error type for this crate, following the same `#[error(transparent)]` +
//! `#[from]` shape used elsewhere in this codebase's own domain error type: a
//! top-level enum that either names a usage violation directly or wraps a
//! category-specific sub-error.

use thiserror::Error;

use crate::itree::NodeId;

#[derive(Debug, Error)]
pub enum EngineError {
    /// `split` was called on a node that already has both children.
    #[error("node {0} was already split")]
    AlreadySplit(NodeId),

    /// `remove` was called on a node that still has at least one child.
    #[error("cannot remove node {0}: it still has children")]
    NodeHasChildren(NodeId),

    /// An operation that requires the observer tree was invoked while it is disabled.
    #[error("the search tree observer is not enabled for this engine")]
    ObserverDisabled,

    #[error(transparent)]
    Solver(#[from] SolverError),

    /// Catch-all for invariant breaches that arise from caller-supplied data rather
    /// than a bug internal to this crate's own tree-walking code (those remain
    /// `debug_assert!`s instead of `Err`s).
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Failures reported by the solver gateway itself, as distinct from a query that
/// merely returns "not subsumed" (which is a successful, meaningful answer and is
/// never an `Err`, see SPEC_FULL.md §7).
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("solver query exceeded its timeout")]
    Timeout,
    #[error("solver backend failure: {0}")]
    Backend(String),
}
