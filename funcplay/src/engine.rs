use std::sync::Arc;

use crate::config::EngineConfig;
use crate::javascript::JavaScriptExecutor;
use crate::lisp::{LispExecutor, LispSession};
use crate::output::ExecutionResult;
use crate::platform::{Language, TestCase};

/// Dispatches runs to the executor for the submission's language.
pub struct Engine {
    javascript: JavaScriptExecutor,
    lisp: LispExecutor,
}

impl Engine {
    /// An engine whose Lisp runs go to the process-wide session.
    pub fn new(config: EngineConfig) -> Self {
        let lisp = LispExecutor::shared(&config.lisp);
        Self {
            javascript: JavaScriptExecutor::new(config.javascript),
            lisp,
        }
    }

    /// An engine with a Lisp session of its own.
    pub fn isolated(config: EngineConfig) -> Self {
        Self {
            lisp: LispExecutor::new(Arc::new(LispSession::new(config.lisp))),
            javascript: JavaScriptExecutor::new(config.javascript),
        }
    }

    pub fn javascript(&self) -> &JavaScriptExecutor {
        &self.javascript
    }

    pub fn lisp(&self) -> &LispExecutor {
        &self.lisp
    }

    pub async fn execute(&self, language: Language, code: &str) -> ExecutionResult {
        match language {
            Language::JavaScript => self.javascript.execute(code).await,
            Language::Lisp => self.lisp.execute(code).await,
        }
    }

    /// Lisp cases name their operator in the input, so `entry_point` only
    /// applies to JavaScript.
    pub async fn run_tests(
        &self,
        language: Language,
        code: &str,
        cases: &[TestCase],
        entry_point: Option<&str>,
    ) -> ExecutionResult {
        match language {
            Language::JavaScript => {
                self.javascript
                    .run_tests_with_entry_point(code, cases, entry_point)
                    .await
            }
            Language::Lisp => self.lisp.run_tests(code, cases).await,
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
