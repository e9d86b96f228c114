//! FuncPlay: runs learner submissions in JavaScript or PlayScheme, checks
//! them against declarative test cases and grades them.
//!
//! Executors never fail: whatever goes wrong while running a submission is
//! reported as lines of the returned [`ExecutionResult`].

pub mod config;
pub mod engine;
pub mod error;
pub mod grading;
pub mod javascript;
pub mod lisp;
pub mod output;
pub mod platform;
pub mod structural;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use grading::{GradeReport, Grader};
pub use javascript::JavaScriptExecutor;
pub use lisp::{LispExecutor, LispSession};
pub use output::{ExecutionResult, OutputKind, OutputLine};
pub use platform::{Language, Problem, TestCase};
