use thiserror::Error;

use crate::filter::{Operator, PropertyType};

/// Error taxonomy for the index layer.
///
/// `UnsupportedFilter` and `InvalidProperty` are programming errors surfaced
/// at compile time of the request, before any statement executes. `Usage`
/// rejects dangerous calls (e.g. a filterless `delete_where`). Database and
/// serialization failures propagate from the underlying engines unchanged.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("operator {operator:?} is not defined for property '{property}' of type {property_type:?}")]
    UnsupportedFilter {
        property: String,
        property_type: PropertyType,
        operator: Operator,
    },

    #[error("invalid property name '{0}': expected ASCII letters, digits or underscores")]
    InvalidProperty(String),

    #[error("{0}")]
    Usage(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
