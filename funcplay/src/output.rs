//! The structured result every executor returns.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputKind {
    Trace,
    Error,
    ResultValue,
    TestResult,
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            OutputKind::Trace => "trace",
            OutputKind::Error => "error",
            OutputKind::ResultValue => "result",
            OutputKind::TestResult => "test",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputLine {
    pub kind: OutputKind,
    pub content: String,
    pub produced_at: DateTime<Utc>,
}

impl OutputLine {
    pub fn new(kind: OutputKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            produced_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub output: Vec<OutputLine>,
    pub success: bool,
    pub elapsed_time_ms: u64,
}

impl ExecutionResult {
    /// A failed result carrying a single error line.
    pub fn failure(message: impl Into<String>, started: Instant) -> Self {
        let mut collector = OutputCollector::starting_at(started);
        collector.error(message);
        collector.finish(false)
    }

    pub fn lines_of(&self, kind: OutputKind) -> impl Iterator<Item = &OutputLine> {
        self.output.iter().filter(move |line| line.kind == kind)
    }

    pub fn contents(&self) -> Vec<&str> {
        self.output.iter().map(|line| line.content.as_str()).collect()
    }

    pub fn result_value(&self) -> Option<&str> {
        self.lines_of(OutputKind::ResultValue)
            .last()
            .map(|line| line.content.as_str())
    }
}

/// Accumulates lines in production order and times the run.
#[derive(Debug)]
pub struct OutputCollector {
    lines: Vec<OutputLine>,
    started: Instant,
}

impl Default for OutputCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputCollector {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(started: Instant) -> Self {
        Self {
            lines: Vec::new(),
            started,
        }
    }

    pub fn push(&mut self, kind: OutputKind, content: impl Into<String>) {
        self.lines.push(OutputLine::new(kind, content));
    }

    pub fn trace(&mut self, content: impl Into<String>) {
        self.push(OutputKind::Trace, content);
    }

    pub fn error(&mut self, content: impl Into<String>) {
        self.push(OutputKind::Error, content);
    }

    pub fn result_value(&mut self, content: impl Into<String>) {
        self.push(OutputKind::ResultValue, content);
    }

    pub fn test_result(&mut self, content: impl Into<String>) {
        self.push(OutputKind::TestResult, content);
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn finish(self, success: bool) -> ExecutionResult {
        let elapsed_time_ms = self.elapsed_ms();
        ExecutionResult {
            output: self.lines,
            success,
            elapsed_time_ms,
        }
    }
}
