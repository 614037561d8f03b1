//! Typed failures for caller-supplied configuration.
//!
//! Messy source data never produces one of these: unresolved columns and
//! malformed cells degrade to defaults inside the resolver and the cost
//! engine. An [`EngineError`] means a filter, grouping or metric request names
//! something the engine cannot honour.

use thiserror::Error;

use crate::fields::{MetricField, SemanticField};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Unknown field '{0}'")]
    UnknownField(String),
    #[error("Unknown reduce operation '{0}' (expected sum, mean, min, max or count)")]
    UnknownReduceOp(String),
    #[error("Field '{0}' is not categorical and cannot be filtered by value")]
    NotCategorical(SemanticField),
    #[error("Range for '{metric}' has min {min} greater than max {max}")]
    InvalidRange {
        metric: MetricField,
        min: f64,
        max: f64,
    },
    #[error("Date range starts on {start} after it ends on {end}")]
    InvalidDateRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },
    #[error("Failed to parse clause '{0}'")]
    InvalidClause(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
