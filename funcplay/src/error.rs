use thiserror::Error;

use crate::config::ConfigError;

/// Failures of the plumbing around the executors.
///
/// `execute` and `run_tests` never return these: everything that goes wrong
/// while running a submission ends up as output lines instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{collaborator} failed: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    #[error("problem not found: {0}")]
    ProblemNotFound(String),

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("invalid critique: {0}")]
    InvalidCritique(String),
}

impl EngineError {
    pub fn collaborator(collaborator: &'static str, message: impl Into<String>) -> Self {
        EngineError::Collaborator {
            collaborator,
            message: message.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
