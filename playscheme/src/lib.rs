//! PlayScheme: a small Scheme dialect for FuncPlay's Lisp exercises.
//!
//! - [`parser`] reads source text into data with a pest grammar.
//! - [`segmenter`] splits a source blob into top-level expressions.
//! - [`runtime`] evaluates data against a persistent global environment.

pub mod parser;
pub mod runtime;
pub mod segmenter;

pub use parser::{parse_datum, parse_program, ParseError};
pub use runtime::{Interpreter, RuntimeError, RuntimeResult, Value};
pub use segmenter::segment;
