//! Error type shared by accumulation and fitting.

use thiserror::Error;

/// Failures reported by the accumulator and the fitter.
///
/// None of these are recoverable inside the crate; the computation is
/// deterministic, so retrying with the same inputs gives the same result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Grid has no pixels")]
    EmptyGrid,

    /// NaN or infinity reached the normal equations.
    #[error("Normal equations contain non-finite moments")]
    NonFiniteMoments,

    /// The 4x4 normal-equations matrix cannot be inverted, usually because
    /// the weight map is empty or covers too few frequencies.
    #[error("Normal equations are singular")]
    SingularSystem,

    #[error("Fit produced a non-finite solution")]
    NonFiniteSolution,

    #[error("Total weight is zero")]
    ZeroTotalWeight,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_message() {
        let err = Error::ShapeMismatch {
            what: "observation",
            expected: (5, 8),
            actual: (8, 8),
        };
        assert_eq!(
            err.to_string(),
            "Shape mismatch for observation: expected (5, 8), got (8, 8)"
        );
    }

    #[test]
    fn test_singular_message() {
        assert_eq!(
            Error::SingularSystem.to_string(),
            "Normal equations are singular"
        );
    }
}
