use thiserror::Error;

use crate::expressions::ExpressionError;
use crate::parser::Rule;

#[derive(Debug, Error)]
pub enum ClosureError {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Pest error: {0}")]
    Pest(#[from] pest::error::Error<Rule>),

    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),

    #[error("Missing operand: {0}")]
    MissingOperand(String),

    #[error("Invalid operator: {0}")]
    InvalidOperator(String),

    #[error("Resolve error: {0}")]
    Resolve(String),

    #[error(transparent)]
    Expression(#[from] ExpressionError),
}

pub type ClosureResult<T> = Result<T, ClosureError>;
