use thiserror::Error;

use crate::parser::ParseError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("Type error in {operation}: expected {expected}, got {actual}")]
    TypeError {
        expected: String,
        actual: String,
        operation: String,
    },

    #[error("Undefined symbol: {0}")]
    UndefinedSymbol(String),

    #[error("Arity mismatch in {function}: expected {expected} arguments, got {actual}")]
    ArityMismatch {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Index out of bounds: {index} (length {length})")]
    IndexOutOfBounds { index: i64, length: usize },

    #[error("Not a procedure: {0}")]
    NotCallable(String),

    #[error("Bad syntax in {form}: {message}")]
    BadSyntax { form: String, message: String },

    #[error("{0}")]
    UserError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Recursion depth limit of {0} exceeded")]
    RecursionLimit(usize),

    #[error("Evaluation timed out after {0}ms")]
    Timeout(u64),

    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

impl RuntimeError {
    pub fn type_error(expected: &str, actual: &crate::runtime::Value, operation: &str) -> Self {
        RuntimeError::TypeError {
            expected: expected.to_string(),
            actual: actual.type_name().to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn bad_syntax(form: &str, message: impl Into<String>) -> Self {
        RuntimeError::BadSyntax {
            form: form.to_string(),
            message: message.into(),
        }
    }
}
