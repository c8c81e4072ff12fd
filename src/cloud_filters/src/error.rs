//! Error types for filter construction and application.
//!
//! Configuration problems are reported when a filter is built and never while
//! it runs. Numerical degeneracies (too few neighbors, singular scatter) are
//! not errors at all; see [`crate::geometry`].

use thiserror::Error;

/// Invalid filter configuration, detected at construction time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown filter `{0}`")]
    UnknownFilter(String),

    #[error("unknown parameter `{name}` for {filter}")]
    UnknownParameter { filter: &'static str, name: String },

    #[error("invalid value `{value}` for parameter `{name}`")]
    InvalidValue { name: String, value: String },

    #[error("value {value} for parameter `{name}` is outside [{min}, {max}]")]
    OutOfRange {
        name: String,
        value: String,
        min: String,
        max: String,
    },
}

/// Failure of a single `filter()` call.
///
/// Raised when the input does not satisfy the filter's contract. The output
/// is never partially produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("required descriptor `{0}` is missing")]
    MissingDescriptor(String),

    #[error("descriptor `{name}` has {actual} rows, expected {expected}")]
    DescriptorDimension {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("descriptor `{name}` has {actual} columns but the cloud has {expected} points")]
    DescriptorLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("axis {axis} is out of range for {dim}-dimensional points")]
    AxisOutOfRange { axis: usize, dim: usize },

    #[error("feature matrix needs at least one coordinate row plus the homogeneous row, got {0} rows")]
    InvalidFeatures(usize),
}

/// Result alias used by the filters.
pub type Result<T, E = FilterError> = std::result::Result<T, E>;
