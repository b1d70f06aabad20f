//! Error types for building and decoding query expressions

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),
}

pub type QueryResult<T> = Result<T, QueryError>;
