//! JavaScript path: sandboxed evaluation and the test runner.
//!
//! Every run gets a brand new V8 isolate. A semaphore bounds how many exist
//! at once; callers beyond the limit queue for a slot.

mod runner;
mod runtime;
pub mod validator;

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::Semaphore;

use crate::config::{is_identifier, JavaScriptConfig};
use crate::output::{ExecutionResult, OutputCollector};
use crate::platform::TestCase;
use runner::{harness_script, report_cases, HarnessReport};
use runtime::{run_isolated, Completion, IsolateRun, Script};
pub use validator::validate_code;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Execution refused: code is {size} bytes, the limit is {max}")]
    CodeTooLarge { size: usize, max: usize },

    #[error("Execution refused: code uses {construct}, which is not allowed")]
    Rejected { construct: &'static str },

    #[error("Execution timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Execution stopped: heap limit of {limit_mb} MB exceeded")]
    HeapLimitExceeded { limit_mb: usize },

    #[error("Execution error: {message}")]
    Script { message: String },

    #[error("Sandbox failure: {0}")]
    Worker(String),
}

pub struct JavaScriptExecutor {
    config: JavaScriptConfig,
    semaphore: Arc<Semaphore>,
}

impl JavaScriptExecutor {
    pub fn new(config: JavaScriptConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self { config, semaphore }
    }

    pub fn config(&self) -> &JavaScriptConfig {
        &self.config
    }

    /// Run `code` and report its console output and completion value.
    pub async fn execute(&self, code: &str) -> ExecutionResult {
        let started = Instant::now();
        tracing::info!(language = "javascript", code_len = code.len(), "execute: starting");

        if let Err(e) = validate_code(code, self.config.max_code_size) {
            tracing::warn!(error = %e, "execute: rejected");
            return ExecutionResult::failure(e.to_string(), started);
        }

        let run = match self
            .run(vec![Script::submission(code)], Completion::Display)
            .await
        {
            Ok(run) => run,
            Err(e) => {
                tracing::warn!(error = %e, "execute: sandbox failed");
                return ExecutionResult::failure(e.to_string(), started);
            }
        };

        let mut collector = OutputCollector::starting_at(started);
        for (kind, line) in run.console {
            collector.push(kind, line);
        }
        let success = match run.outcome {
            Ok(rendered) => {
                if let Some(rendered) = rendered {
                    collector.result_value(rendered);
                }
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "execute: failed");
                collector.error(e.to_string());
                false
            }
        };

        let result = collector.finish(success);
        tracing::info!(
            language = "javascript",
            success,
            elapsed_ms = result.elapsed_time_ms,
            "execute: complete"
        );
        result
    }

    /// Run `cases` against the first configured candidate function the
    /// submission defines.
    pub async fn run_tests(&self, code: &str, cases: &[TestCase]) -> ExecutionResult {
        self.run_tests_with_entry_point(code, cases, None).await
    }

    /// Run `cases` against `entry_point`, or against the first configured
    /// candidate when none is given.
    pub async fn run_tests_with_entry_point(
        &self,
        code: &str,
        cases: &[TestCase],
        entry_point: Option<&str>,
    ) -> ExecutionResult {
        let started = Instant::now();
        tracing::info!(
            language = "javascript",
            code_len = code.len(),
            cases = cases.len(),
            entry_point = entry_point.unwrap_or("<search>"),
            "run_tests: starting"
        );

        if let Err(e) = validate_code(code, self.config.max_code_size) {
            tracing::warn!(error = %e, "run_tests: rejected");
            return ExecutionResult::failure(e.to_string(), started);
        }

        let candidates = match entry_point {
            Some(name) if !is_identifier(name) => {
                return ExecutionResult::failure(
                    format!("Invalid entry point `{}`: not a JavaScript identifier", name),
                    started,
                );
            }
            Some(name) => vec![name.to_string()],
            None => self.config.entry_point_candidates.clone(),
        };
        let harness = match harness_script(&candidates, cases) {
            Ok(harness) => harness,
            Err(e) => {
                return ExecutionResult::failure(format!("Test harness error: {}", e), started)
            }
        };

        let run = self
            .run(
                vec![Script::submission(code), Script::harness(harness)],
                Completion::Raw,
            )
            .await;
        let result = self.grade(run, cases, &candidates, started);
        tracing::info!(
            language = "javascript",
            success = result.success,
            elapsed_ms = result.elapsed_time_ms,
            "run_tests: complete"
        );
        result
    }

    fn grade(
        &self,
        run: Result<IsolateRun, SandboxError>,
        cases: &[TestCase],
        candidates: &[String],
        started: Instant,
    ) -> ExecutionResult {
        let run = match run {
            Ok(run) => run,
            Err(e) => {
                tracing::warn!(error = %e, "run_tests: sandbox failed");
                return ExecutionResult::failure(e.to_string(), started);
            }
        };
        tracing::debug!(lines = run.console.len(), "run_tests: console output discarded");

        let report = match run.outcome {
            Ok(Some(text)) => serde_json::from_str::<HarnessReport>(&text)
                .map_err(|e| format!("Test harness error: {}", e)),
            Ok(None) => Err("Test harness error: no report was produced".to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "run_tests: failed");
                Err(e.to_string())
            }
        };
        let report = match report {
            Ok(report) => report,
            Err(message) => return ExecutionResult::failure(message, started),
        };

        let Some(entry_point) = report.entry_point else {
            tracing::warn!(?candidates, "run_tests: no testable function");
            return ExecutionResult::failure(
                format!(
                    "no testable function found (looked for {})",
                    candidates.join(", ")
                ),
                started,
            );
        };
        tracing::debug!(entry_point = %entry_point, "run_tests: testing function");

        let mut collector = OutputCollector::starting_at(started);
        let success = report_cases(cases, &report.results, &mut collector);
        collector.finish(success)
    }

    async fn run(
        &self,
        scripts: Vec<Script>,
        completion: Completion,
    ) -> Result<IsolateRun, SandboxError> {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SandboxError::Worker("sandbox slots closed".to_string()))?;
        run_isolated(&self.config, scripts, completion).await
    }
}

impl Default for JavaScriptExecutor {
    fn default() -> Self {
        Self::new(JavaScriptConfig::default())
    }
}
