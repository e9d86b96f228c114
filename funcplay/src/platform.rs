//! Interfaces to the collaborators around the engine: where problems come
//! from, where graded submissions go, and who writes the critique.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
    JavaScript,
    Lisp,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::JavaScript => write!(f, "JAVASCRIPT"),
            Language::Lisp => write!(f, "LISP"),
        }
    }
}

impl FromStr for Language {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "javascript" | "js" => Ok(Language::JavaScript),
            "lisp" | "scheme" => Ok(Language::Lisp),
            _ => Err(EngineError::UnsupportedLanguage(s.to_string())),
        }
    }
}

/// One declarative check: call with `input`, expect `expected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default)]
    pub input: Vec<serde_json::Value>,
    pub expected: serde_json::Value,
    #[serde(default)]
    pub description: String,
}

impl TestCase {
    pub fn new(
        input: Vec<serde_json::Value>,
        expected: serde_json::Value,
        description: impl Into<String>,
    ) -> Self {
        Self {
            input,
            expected,
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub language: Language,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub initial_code: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub solution: Option<String>,
    /// Function the tests call; the configured candidates are tried when absent.
    #[serde(default)]
    pub entry_point: Option<String>,
}

impl Problem {
    pub fn from_json_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&source)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub problem_id: String,
    pub source_code: String,
    pub language: Language,
    pub test_passed: bool,
}

/// Whatever bookkeeping the sink hands back (experience earned, level...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionReceipt(pub serde_json::Value);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub source_code: String,
    pub problem_title: String,
    pub problem_description: String,
    pub reference_solution: Option<String>,
}

impl FeedbackRequest {
    pub fn for_problem(problem: &Problem, source_code: impl Into<String>) -> Self {
        Self {
            source_code: source_code.into(),
            problem_title: problem.title.clone(),
            problem_description: problem.description.clone(),
            reference_solution: problem.solution.clone(),
        }
    }
}

/// A 0-100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Score(u8);

impl Score {
    pub const MAX: u32 = 100;

    pub fn new(value: u32) -> EngineResult<Self> {
        if value > Self::MAX {
            return Err(EngineError::InvalidCritique(format!(
                "score {} is outside 0..={}",
                value,
                Self::MAX
            )));
        }
        Ok(Score(value as u8))
    }

    pub fn value(self) -> u32 {
        self.0 as u32
    }
}

impl TryFrom<u32> for Score {
    type Error = EngineError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Score::new(value)
    }
}

impl From<Score> for u32 {
    fn from(score: Score) -> Self {
        score.value()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFeedback {
    pub score: Score,
    pub feedback: String,
}

/// Structured critique produced by the text-generation collaborator. The
/// engine passes it through without interpreting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeCritique {
    pub overall_assessment: String,
    pub functional_correctness: ScoredFeedback,
    pub code_quality: ScoredFeedback,
    pub functional_programming: ScoredFeedback,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub encouragement: String,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

#[async_trait]
pub trait ProblemRepository: Send + Sync {
    async fn problem(&self, id: &str) -> EngineResult<Option<Problem>>;
}

#[async_trait]
pub trait SubmissionSink: Send + Sync {
    async fn record(&self, submission: Submission) -> EngineResult<SubmissionReceipt>;
}

#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
    async fn critique(&self, request: FeedbackRequest) -> EngineResult<CodeCritique>;
}

#[derive(Debug, Default)]
pub struct InMemoryProblemRepository {
    problems: HashMap<String, Problem>,
}

impl InMemoryProblemRepository {
    pub fn new(problems: impl IntoIterator<Item = Problem>) -> Self {
        Self {
            problems: problems
                .into_iter()
                .map(|problem| (problem.id.clone(), problem))
                .collect(),
        }
    }

    /// Load every `*.json` file in `dir`, one problem per file.
    pub fn from_dir(dir: impl AsRef<Path>) -> EngineResult<Self> {
        let dir = dir.as_ref();
        let io_error = |source| EngineError::Io {
            path: dir.display().to_string(),
            source,
        };
        let mut problems = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                problems.push(Problem::from_json_file(&path)?);
            }
        }
        tracing::debug!(dir = %dir.display(), count = problems.len(), "loaded problems");
        Ok(Self::new(problems))
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

#[async_trait]
impl ProblemRepository for InMemoryProblemRepository {
    async fn problem(&self, id: &str) -> EngineResult<Option<Problem>> {
        Ok(self.problems.get(id).cloned())
    }
}

/// Keeps submissions in memory and answers with a fresh submission id.
#[derive(Debug, Default)]
pub struct MemorySubmissionSink {
    submissions: Mutex<Vec<Submission>>,
}

impl MemorySubmissionSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().await.clone()
    }
}

#[async_trait]
impl SubmissionSink for MemorySubmissionSink {
    async fn record(&self, submission: Submission) -> EngineResult<SubmissionReceipt> {
        let receipt = SubmissionReceipt(serde_json::json!({
            "submissionId": Uuid::new_v4().to_string(),
            "problemId": submission.problem_id,
            "testPassed": submission.test_passed,
        }));
        self.submissions.lock().await.push(submission);
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn problem_json() -> serde_json::Value {
        json!({
            "id": "sum-of-squares",
            "title": "Sum of squares",
            "description": "Return a*a + b*b",
            "language": "JAVASCRIPT",
            "testCases": [
                {"input": [3, 4], "expected": 25, "description": "3²+4²"}
            ]
        })
    }

    #[test]
    fn problems_deserialize_with_defaults() {
        let problem: Problem = serde_json::from_value(problem_json()).unwrap();
        assert_eq!(problem.language, Language::JavaScript);
        assert_eq!(problem.test_cases.len(), 1);
        assert_eq!(problem.test_cases[0].input, vec![json!(3), json!(4)]);
        assert!(problem.hints.is_empty());
        assert_eq!(problem.entry_point, None);
    }

    #[test]
    fn language_parses_loosely_and_prints_its_tag() {
        assert_eq!("lisp".parse::<Language>().unwrap(), Language::Lisp);
        assert_eq!("JavaScript".parse::<Language>().unwrap(), Language::JavaScript);
        assert!("cobol".parse::<Language>().is_err());
        assert_eq!(Language::Lisp.to_string(), "LISP");
        assert_eq!(serde_json::to_value(Language::JavaScript).unwrap(), json!("JAVASCRIPT"));
    }

    #[test]
    fn critique_scores_are_bounded() {
        let critique = json!({
            "overallAssessment": "fine",
            "functionalCorrectness": {"score": 90, "feedback": "correct"},
            "codeQuality": {"score": 70, "feedback": "ok"},
            "functionalProgramming": {"score": 101, "feedback": "too good"},
        });
        assert!(serde_json::from_value::<CodeCritique>(critique).is_err());
        assert!(Score::new(100).is_ok());
        assert!(Score::new(101).is_err());
    }

    #[test]
    fn loads_problems_from_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), problem_json().to_string()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let repository = InMemoryProblemRepository::from_dir(dir.path()).unwrap();
        assert_eq!(repository.len(), 1);
    }

    #[tokio::test]
    async fn sink_records_and_issues_receipts() {
        let sink = MemorySubmissionSink::new();
        let receipt = sink
            .record(Submission {
                problem_id: "p".into(),
                source_code: "(+ 1 1)".into(),
                language: Language::Lisp,
                test_passed: true,
            })
            .await
            .unwrap();
        assert!(receipt.0["submissionId"].is_string());
        assert_eq!(sink.submissions().await.len(), 1);
    }
}
