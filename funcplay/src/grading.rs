//! Run-and-grade: what happens when a learner presses "run" on a problem.

use std::sync::Arc;

use serde::Serialize;

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::output::{ExecutionResult, OutputKind, OutputLine};
use crate::platform::{
    CodeCritique, FeedbackGenerator, FeedbackRequest, Language, Problem, ProblemRepository,
    Submission, SubmissionReceipt, SubmissionSink,
};

/// Separates execution output from test output in a combined report.
pub const TEST_RESULTS_SEPARATOR: &str = "--- test results ---";

const PASS_MARKER: char = '✅';

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeReport {
    pub problem_id: String,
    pub language: Language,
    pub execution: ExecutionResult,
    pub tests: Option<ExecutionResult>,
    /// Execution output, then the separator and test output when there is any.
    pub output: Vec<OutputLine>,
    pub success: bool,
    pub receipt: Option<SubmissionReceipt>,
}

pub struct Grader {
    engine: Arc<Engine>,
    problems: Arc<dyn ProblemRepository>,
    submissions: Arc<dyn SubmissionSink>,
    feedback: Option<Arc<dyn FeedbackGenerator>>,
}

impl Grader {
    pub fn new(
        engine: Arc<Engine>,
        problems: Arc<dyn ProblemRepository>,
        submissions: Arc<dyn SubmissionSink>,
    ) -> Self {
        Self {
            engine,
            problems,
            submissions,
            feedback: None,
        }
    }

    pub fn with_feedback(mut self, feedback: Arc<dyn FeedbackGenerator>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    async fn problem(&self, problem_id: &str) -> EngineResult<Problem> {
        self.problems
            .problem(problem_id)
            .await?
            .ok_or_else(|| EngineError::ProblemNotFound(problem_id.to_string()))
    }

    pub async fn run_and_grade(
        &self,
        problem_id: &str,
        source_code: &str,
    ) -> EngineResult<GradeReport> {
        let problem = self.problem(problem_id).await?;
        tracing::info!(problem = %problem.id, language = %problem.language, "grading submission");

        let execution = self.engine.execute(problem.language, source_code).await;
        let tests = if problem.test_cases.is_empty() {
            None
        } else {
            Some(
                self.engine
                    .run_tests(
                        problem.language,
                        source_code,
                        &problem.test_cases,
                        problem.entry_point.as_deref(),
                    )
                    .await,
            )
        };

        let mut output = execution.output.clone();
        if let Some(tests) = tests.as_ref().filter(|tests| !tests.output.is_empty()) {
            output.push(OutputLine::new(OutputKind::ResultValue, TEST_RESULTS_SEPARATOR));
            output.extend(tests.output.iter().cloned());
        }

        let tests_passed = tests.as_ref().is_some_and(|tests| {
            tests.success && tests.output.iter().any(|line| line.content.contains(PASS_MARKER))
        });
        let receipt = if tests_passed {
            let receipt = self
                .submissions
                .record(Submission {
                    problem_id: problem.id.clone(),
                    source_code: source_code.to_string(),
                    language: problem.language,
                    test_passed: true,
                })
                .await?;
            tracing::info!(problem = %problem.id, "submission recorded");
            Some(receipt)
        } else {
            None
        };

        let success = execution.success && tests.as_ref().map_or(true, |tests| tests.success);
        Ok(GradeReport {
            problem_id: problem.id,
            language: problem.language,
            execution,
            tests,
            output,
            success,
            receipt,
        })
    }

    /// Ask the feedback collaborator to critique a submission.
    pub async fn critique(&self, problem_id: &str, source_code: &str) -> EngineResult<CodeCritique> {
        let feedback = self
            .feedback
            .as_ref()
            .ok_or_else(|| EngineError::collaborator("feedback", "no feedback generator configured"))?;
        let problem = self.problem(problem_id).await?;
        feedback
            .critique(FeedbackRequest::for_problem(&problem, source_code))
            .await
    }
}
