use crate::quality::Violation;
use chrono::NaiveDate;
use thiserror::Error;

/// Fatal problems with the shape of the input or the configuration. A run that hits one of these
/// aborts before anything is written.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StructuralError {
    #[error("price table `{0}` does not exist")]
    MissingTable(String),

    #[error("required column `{column}` is missing from `{table}`")]
    MissingColumn { table: String, column: String },

    #[error("column `{column}` has type `{found}`, expected one of: {expected}")]
    WrongColumnType {
        column: String,
        found: String,
        expected: String,
    },

    #[error("price table is unreadable: {0}")]
    Unreadable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Raised by the pipeline when the quality gate fails. Gold outputs from earlier runs stay as they are.
#[derive(Debug, Error, Clone)]
#[error("quality gate failed for reference_date={reference_date} with {} violation(s)", violations.len())]
pub struct QualityGateError {
    pub reference_date: NaiveDate,
    pub violations: Vec<Violation>,
}
