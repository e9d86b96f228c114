//! Building the interpreter a session owns.

use async_trait::async_trait;
use playscheme::{Interpreter, RuntimeError};
use thiserror::Error;

use crate::config::LispConfig;

#[derive(Debug, Clone, Error)]
pub enum SessionInitError {
    #[error("Lisp interpreter could not be initialized: {0}")]
    Engine(#[from] RuntimeError),

    #[error("Lisp interpreter could not be initialized: {0}")]
    Unavailable(String),
}

/// Produces the interpreter a session evaluates against.
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self, config: &LispConfig) -> Result<Interpreter, SessionInitError>;
}

/// The standard library, plus the shared prelude when configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct PreludeLoader;

#[async_trait]
impl EngineLoader for PreludeLoader {
    async fn load(&self, config: &LispConfig) -> Result<Interpreter, SessionInitError> {
        let mut interpreter = if config.load_prelude {
            Interpreter::with_prelude()?
        } else {
            Interpreter::new()?
        };
        interpreter.set_max_recursion_depth(config.max_recursion_depth);
        Ok(interpreter)
    }
}
