//! ## Custom Errors for Hypertree
//!
//! This module defines the error conditions surfaced by the index structures.

use std::error::Error;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Represents errors specific to invalid operations or parameters in Hypertree.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug)]
pub enum IndexError {
    /// Occurs when a coordinate vector does not match the dimensionality of the index.
    InvalidDimension {
        /// The number of coordinates that were supplied.
        requested: usize,
        /// The dimensionality the index was created with.
        available: usize,
    },
    /// Occurs when a box key has `lower > upper` on some axis.
    InvalidBox {
        /// The axis on which the ordering is violated.
        axis: usize,
        /// The lower bound on that axis.
        lower: f64,
        /// The upper bound on that axis.
        upper: f64,
    },
    /// Occurs when a key contains a NaN or infinite coordinate.
    InvalidKey,
    /// Occurs when an invalid capacity or configuration value is provided.
    InvalidCapacity {
        /// The capacity value that was provided.
        capacity: usize,
    },
    /// Occurs when an operation is not supported by the chosen index structure.
    Unsupported {
        /// The name of the unsupported operation.
        operation: &'static str,
    },
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexError::InvalidDimension {
                requested,
                available,
            } => {
                write!(
                    f,
                    "Invalid dimension: got {requested} coordinates, but the index has {available} dimensions"
                )
            }
            IndexError::InvalidBox { axis, lower, upper } => {
                write!(
                    f,
                    "Invalid box: lower bound {lower} exceeds upper bound {upper} on axis {axis}"
                )
            }
            IndexError::InvalidKey => {
                write!(f, "Invalid key: coordinates must be finite")
            }
            IndexError::InvalidCapacity { capacity } => {
                write!(
                    f,
                    "Invalid capacity: {capacity}. Capacity must be large enough for the structure."
                )
            }
            IndexError::Unsupported { operation } => {
                write!(f, "Operation not supported by this index: {operation}")
            }
        }
    }
}

impl Error for IndexError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_dimension_display() {
        let err = IndexError::InvalidDimension {
            requested: 3,
            available: 2,
        };
        assert_eq!(
            format!("{}", err),
            "Invalid dimension: got 3 coordinates, but the index has 2 dimensions"
        );
    }

    #[test]
    fn test_invalid_box_display() {
        let err = IndexError::InvalidBox {
            axis: 1,
            lower: 4.0,
            upper: 2.0,
        };
        assert_eq!(
            format!("{}", err),
            "Invalid box: lower bound 4 exceeds upper bound 2 on axis 1"
        );
    }

    #[test]
    fn test_unsupported_display() {
        let err = IndexError::Unsupported { operation: "knn" };
        assert_eq!(
            format!("{}", err),
            "Operation not supported by this index: knn"
        );
    }
}
