// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/// Error type for constructing Holowatch data structures.
///
/// # Examples
/// ```
/// use holowatch_structures::{IntensityVector, StructureError};
///
/// let err = IntensityVector::new(vec![0.5, 1.5]).unwrap_err();
/// assert!(matches!(err, StructureError::OutOfRange(_)));
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StructureError {
    /// Invalid parameters provided to a constructor
    #[error("Bad Parameters: {0}")]
    BadParameters(String),

    /// A value fell outside its permitted range
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Two arrays that must agree in shape do not
    #[error("Dimension mismatch for {what}: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },
}
