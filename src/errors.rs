//! Error types for graph construction and sensitivity propagation.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
/// Error variants for node construction and evaluation.
pub enum GraphError {
    #[error("Invalid mode: forward order {forward} with adjoint order {adjoint}")]
    /// Forward and adjoint propagation requested together, or an order above one.
    InvalidMode { forward: u8, adjoint: u8 },
    #[error("Shape mismatch in {context}: expected {expected}, found {found}")]
    /// A buffer or declared shape disagrees with the shape it must match.
    ShapeMismatch {
        context: &'static str,
        expected: String,
        found: String,
    },
    #[error("{what} index {index} out of range (len {len})")]
    /// An index or a count exceeds what was declared.
    OutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },
    #[error("Node {0} not found in graph")]
    /// The node id does not belong to this graph.
    NodeNotFound(usize),
    #[error("Wrapped function is already in use")]
    /// The shared function handle is already borrowed by a running evaluation.
    FunctionBusy,
    #[error("Propagation failure: {0}")]
    /// The wrapped function failed internally.
    PropagationFailure(String),
}

impl GraphError {
    pub(crate) fn shape(
        context: &'static str,
        expected: impl ToString,
        found: impl ToString,
    ) -> Self {
        GraphError::ShapeMismatch {
            context,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub(crate) fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        GraphError::OutOfRange { what, index, len }
    }
}

/// Convenience alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, GraphError>;
