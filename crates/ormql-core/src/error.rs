//! Core error types.

use thiserror::Error;

/// Plan construction and evaluation errors.
///
/// These are deterministic: the same plan always fails the same way, so
/// callers should treat them as defects rather than transient faults.
#[derive(Debug, Error)]
pub enum Error {
    /// A projection removes a column that a downstream consumer still
    /// needs for ordering.
    #[error("{provider} removes column {column} which is still required for ordering")]
    OrderLost {
        /// Kind of the provider that dropped the column.
        provider: &'static str,
        /// Position of the dropped column in the provider's source header.
        column: usize,
    },

    /// A column reference is outside the row width.
    #[error("column {index} is out of range for a row of width {width}")]
    InvalidColumn { index: usize, width: usize },

    /// A parameter was referenced but not bound.
    #[error("parameter '{0}' is not bound")]
    MissingParameter(String),

    /// The plan is structurally invalid.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// Runtime evaluation failure.
    #[error("evaluation error: {0}")]
    Evaluation(String),
}
