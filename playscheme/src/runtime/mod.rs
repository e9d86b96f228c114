//! PlayScheme runtime
//!
//! [`Interpreter`] is the entry point: one global environment with the
//! standard library installed, an output buffer that `display` writes into,
//! and the evaluation limits.

pub mod environment;
pub mod error;
pub mod evaluator;
pub mod stdlib;
pub mod values;

#[cfg(test)]
mod stdlib_tests;

use std::time::Duration;

pub use environment::{Env, Environment};
pub use error::{RuntimeError, RuntimeResult};
pub use evaluator::{Evaluator, DEFAULT_MAX_RECURSION_DEPTH};
pub use values::{Arity, BuiltinFn, Procedure, Symbol, Value};

use crate::parser;

/// Shared SICP-style definitions exercises may rely on.
pub const PRELUDE: &str = include_str!("prelude.scm");

pub struct Interpreter {
    evaluator: Evaluator,
}

impl Interpreter {
    /// A fresh interpreter with the standard library and no prelude.
    pub fn new() -> RuntimeResult<Self> {
        let global = Environment::new();
        stdlib::load_standard_library(&global)?;
        Ok(Interpreter {
            evaluator: Evaluator::new(global),
        })
    }

    pub fn with_prelude() -> RuntimeResult<Self> {
        let mut interpreter = Interpreter::new()?;
        interpreter.load_prelude()?;
        Ok(interpreter)
    }

    pub fn load_prelude(&mut self) -> RuntimeResult<()> {
        self.eval_str(PRELUDE).map(|_| ())
    }

    /// Evaluate every datum in `source` and return the last value
    /// (`Unspecified` when there is none).
    pub fn eval_str(&mut self, source: &str) -> RuntimeResult<Value> {
        let program = parser::parse_program(source)?;
        let mut last = Value::Unspecified;
        for datum in &program {
            last = self.evaluator.eval_global(datum)?;
        }
        Ok(last)
    }

    /// Call a procedure bound in the global environment.
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        let procedure = self.evaluator.global().lookup(&Symbol::new(name))?;
        self.evaluator.apply(&procedure, args)
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.evaluator.global().lookup(&Symbol::new(name)).ok()
    }

    pub fn set_time_budget(&mut self, budget: Option<Duration>) {
        self.evaluator.set_time_budget(budget);
    }

    pub fn set_max_recursion_depth(&mut self, depth: usize) {
        self.evaluator.set_max_recursion_depth(depth);
    }

    /// Drain everything written by `display`, `write` and `newline`.
    pub fn take_output(&mut self) -> String {
        self.evaluator.take_output()
    }

    /// See [`Evaluator::collect_cycles`].
    pub fn collect_cycles(&mut self, roots: &[&Value]) -> usize {
        self.evaluator.collect_cycles(roots)
    }
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("max_recursion_depth", &self.evaluator.max_recursion_depth())
            .finish_non_exhaustive()
    }
}
