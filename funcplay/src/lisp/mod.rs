//! Lisp path: the execution session and the test runner.

mod loader;
mod runner;
mod session;

use std::sync::Arc;
use std::time::Instant;

use crate::config::LispConfig;
use crate::output::{ExecutionResult, OutputCollector};
use crate::platform::TestCase;
pub use loader::{EngineLoader, PreludeLoader, SessionInitError};
use runner::JobOutput;
pub use runner::call_expression;
pub use session::{LispSession, SessionError, SessionStatus};

#[derive(Debug, Clone)]
pub struct LispExecutor {
    session: Arc<LispSession>,
}

impl LispExecutor {
    pub fn new(session: Arc<LispSession>) -> Self {
        Self { session }
    }

    /// An executor over the process-wide session.
    pub fn shared(config: &LispConfig) -> Self {
        Self::new(LispSession::shared(config))
    }

    pub fn session(&self) -> &Arc<LispSession> {
        &self.session
    }

    pub async fn execute(&self, code: &str) -> ExecutionResult {
        let started = Instant::now();
        tracing::info!(language = "lisp", code_len = code.len(), "execute: starting");
        let code = code.to_string();
        let job = self
            .session
            .run(move |interpreter| runner::execute_job(interpreter, &code))
            .await;
        let result = finish(job, started);
        tracing::info!(
            language = "lisp",
            success = result.success,
            elapsed_ms = result.elapsed_time_ms,
            "execute: complete"
        );
        result
    }

    pub async fn run_tests(&self, code: &str, cases: &[TestCase]) -> ExecutionResult {
        let started = Instant::now();
        tracing::info!(
            language = "lisp",
            code_len = code.len(),
            cases = cases.len(),
            "run_tests: starting"
        );
        let code = code.to_string();
        let cases = cases.to_vec();
        let job = self
            .session
            .run(move |interpreter| runner::test_job(interpreter, &code, &cases))
            .await;
        let result = finish(job, started);
        tracing::info!(
            language = "lisp",
            success = result.success,
            elapsed_ms = result.elapsed_time_ms,
            "run_tests: complete"
        );
        result
    }
}

fn finish(job: Result<JobOutput, SessionError>, started: Instant) -> ExecutionResult {
    match job {
        Ok(output) => {
            let mut collector = OutputCollector::starting_at(started);
            for (kind, line) in output.lines {
                collector.push(kind, line);
            }
            collector.finish(output.success)
        }
        Err(e) => {
            tracing::warn!(error = %e, "lisp session unavailable");
            ExecutionResult::failure(e.to_string(), started)
        }
    }
}
