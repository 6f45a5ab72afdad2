//! Error types for the conjugate gradient solver.

use crate::Real;

/// Errors raised while building or running a [`CgSolver`](crate::CgSolver).
///
/// Dimension and configuration problems are caught eagerly at construction, before any
/// history is allocated. Numerical problems are caught per iteration, before the values of
/// the failing iteration are stored.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CgError {
    /// The shapes of `A`, `b` or `x0` are inconsistent.
    #[error("dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Which input is malformed.
        what: &'static str,
        /// Expected shape.
        expected: String,
        /// Actual shape.
        found: String,
    },

    /// A NaN or infinite value appeared, or `A` turned out not to be positive-definite along
    /// a search direction.
    #[error("numerical instability at iteration {iteration}: {detail}")]
    NumericalInstability {
        /// Iteration at which the instability was detected.
        iteration: usize,
        /// Human-readable explanation.
        detail: String,
    },

    /// A solver option is outside of its valid range.
    #[error("invalid configuration: {name} = {value} (expected {expected})")]
    InvalidConfig {
        /// Name of the option.
        name: &'static str,
        /// The rejected value.
        value: Real,
        /// Description of the valid range.
        expected: &'static str,
    },
}

impl CgError {
    pub(crate) fn dimension_mismatch(
        what: &'static str,
        expected: impl ToString,
        found: impl ToString,
    ) -> Self {
        CgError::DimensionMismatch {
            what,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub(crate) fn instability(iteration: usize, detail: impl Into<String>) -> Self {
        CgError::NumericalInstability {
            iteration,
            detail: detail.into(),
        }
    }
}
