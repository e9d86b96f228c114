//! Evaluation and test jobs run inside the session thread. They produce
//! plain lines so nothing interpreter-bound has to leave the thread.

use playscheme::{segment, Interpreter, RuntimeError, Value};
use serde_json::Value as Json;

use crate::output::OutputKind;
use crate::platform::TestCase;
use crate::structural::scheme_matches_json;

#[derive(Debug, Default)]
pub(crate) struct JobOutput {
    pub lines: Vec<(OutputKind, String)>,
    pub success: bool,
}

impl JobOutput {
    fn push(&mut self, kind: OutputKind, content: impl Into<String>) {
        self.lines.push((kind, content.into()));
    }
}

struct Evaluation {
    display: String,
    last: Option<Value>,
    error: Option<RuntimeError>,
}

/// Evaluate every top-level expression of `code` in order, stopping at the
/// first error.
fn evaluate_source(interpreter: &mut Interpreter, code: &str) -> Evaluation {
    interpreter.take_output();
    let mut last = None;
    let mut error = None;
    for expression in segment(code) {
        match interpreter.eval_str(&expression) {
            Ok(value) if value.is_unspecified() => {}
            Ok(value) => last = Some(value),
            Err(e) => {
                error = Some(e);
                break;
            }
        }
    }
    Evaluation {
        display: interpreter.take_output(),
        last,
        error,
    }
}

pub(crate) fn execute_job(interpreter: &mut Interpreter, code: &str) -> JobOutput {
    let evaluation = evaluate_source(interpreter, code);
    let mut output = JobOutput::default();
    if !evaluation.display.is_empty() {
        output.push(OutputKind::Trace, evaluation.display);
    }
    match evaluation.error {
        Some(e) => output.push(OutputKind::Error, format!("Execution error: {}", e)),
        None => {
            if let Some(value) = evaluation.last {
                output.push(OutputKind::ResultValue, value.to_string());
            }
            output.success = true;
        }
    }
    collect_frames(interpreter);
    output
}

/// Evaluate the submission, then every case against the definitions it
/// left behind. A failing submission is reported but the cases still run,
/// since the definitions before the failure are in place.
pub(crate) fn test_job(interpreter: &mut Interpreter, code: &str, cases: &[TestCase]) -> JobOutput {
    let mut output = JobOutput::default();
    let mut all_passed = true;
    if let Some(e) = evaluate_source(interpreter, code).error {
        all_passed = false;
        output.push(OutputKind::Error, format!("Test run error: {}", e));
    }

    for case in cases {
        let expression = call_expression(case);
        let line = match interpreter.eval_str(&expression) {
            Ok(actual) => {
                let passed = scheme_matches_json(&actual, &case.expected);
                tracing::debug!(expression = %expression, passed, "lisp test case finished");
                all_passed &= passed;
                format!(
                    "{} {}: {} {} {}",
                    if passed { "✅" } else { "❌" },
                    case.description,
                    actual,
                    if passed { "==" } else { "!=" },
                    Value::from_json(&case.expected)
                )
            }
            Err(e) => {
                tracing::debug!(expression = %expression, error = %e, "lisp test case threw");
                all_passed = false;
                format!("❌ {}: evaluation error - {}", case.description, e)
            }
        };
        output.push(OutputKind::TestResult, line);
    }
    interpreter.take_output();
    collect_frames(interpreter);
    output.success = all_passed;
    output
}

/// Release the frames left behind by self-referencing local procedures.
/// Nothing from the job may still be held here.
fn collect_frames(interpreter: &mut Interpreter) {
    let released = interpreter.collect_cycles(&[]);
    if released > 0 {
        tracing::debug!(released, "lisp session: released unreachable frames");
    }
}

/// The expression a case evaluates. With inputs, they form an application
/// whose first element is the operator, so `["square", 5]` becomes
/// `(square 5)`. Without inputs the description is the expression.
pub fn call_expression(case: &TestCase) -> String {
    if case.input.is_empty() {
        if case.description.contains('(') {
            case.description.clone()
        } else {
            format!("({})", case.description)
        }
    } else {
        let parts: Vec<String> = case.input.iter().map(render_argument).collect();
        format!("({})", parts.join(" "))
    }
}

/// Strings are spliced in as source text so they can name procedures;
/// compound data is quoted.
fn render_argument(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        Json::Array(_) | Json::Object(_) | Json::Null => format!("'{}", render_datum(value)),
        _ => render_datum(value),
    }
}

fn render_datum(value: &Json) -> String {
    match value {
        Json::Null => "()".to_string(),
        Json::Bool(true) => "#t".to_string(),
        Json::Bool(false) => "#f".to_string(),
        Json::Number(n) => n.to_string(),
        Json::String(s) => string_literal(s),
        Json::Array(items) => {
            let items: Vec<String> = items.iter().map(render_datum).collect();
            format!("({})", items.join(" "))
        }
        Json::Object(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(key, value)| format!("({} . {})", key, render_datum(value)))
                .collect();
            format!("({})", entries.join(" "))
        }
    }
}

fn string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn case(input: Vec<Json>, expected: Json, description: &str) -> TestCase {
        TestCase::new(input, expected, description)
    }

    #[test]
    fn inputs_become_an_application() {
        assert_eq!(call_expression(&case(vec![json!("square"), json!(5)], json!(25), "x")), "(square 5)");
        assert_eq!(
            call_expression(&case(
                vec![json!("sum-list"), json!([1, 2, [3]])],
                json!(6),
                "x"
            )),
            "(sum-list '(1 2 (3)))"
        );
        assert_eq!(
            call_expression(&case(vec![json!("f"), json!(true), json!(null), json!(["a b"])], json!(1), "x")),
            "(f #t '() '(\"a b\"))"
        );
    }

    #[test]
    fn descriptions_stand_in_for_missing_inputs() {
        assert_eq!(call_expression(&case(vec![], json!(25), "(square 5)")), "(square 5)");
        assert_eq!(call_expression(&case(vec![], json!(25), "square 5")), "(square 5)");
    }

    #[test]
    fn execute_job_reports_display_output_then_the_value() {
        let mut interpreter = Interpreter::new().unwrap();
        let output = execute_job(
            &mut interpreter,
            "(display \"hi\") (newline) (define x 2) (* x 21)",
        );
        assert!(output.success);
        assert_eq!(
            output.lines,
            vec![
                (OutputKind::Trace, "hi\n".to_string()),
                (OutputKind::ResultValue, "42".to_string())
            ]
        );
    }

    #[test]
    fn execute_job_keeps_output_produced_before_an_error() {
        let mut interpreter = Interpreter::new().unwrap();
        let output = execute_job(&mut interpreter, "(display 1) (car '()) (display 2)");
        assert!(!output.success);
        assert_eq!(output.lines[0], (OutputKind::Trace, "1".to_string()));
        assert_eq!(output.lines[1].0, OutputKind::Error);
        assert_eq!(output.lines.len(), 2);
    }

    #[test]
    fn test_job_marks_each_case() {
        let mut interpreter = Interpreter::new().unwrap();
        let output = test_job(
            &mut interpreter,
            "(define (square x) (* x x))",
            &[
                case(vec![json!("square"), json!(5)], json!(25), "square 5"),
                case(vec![json!("square"), json!(2)], json!(5), "square 2"),
                case(vec![json!("cube"), json!(2)], json!(8), "cube 2"),
            ],
        );
        assert!(!output.success);
        let contents: Vec<&str> = output.lines.iter().map(|(_, line)| line.as_str()).collect();
        assert_eq!(contents[0], "✅ square 5: 25 == 25");
        assert_eq!(contents[1], "❌ square 2: 4 != 5");
        assert_eq!(contents[2], "❌ cube 2: evaluation error - Undefined symbol: cube");
        assert!(output.lines.iter().all(|(kind, _)| *kind == OutputKind::TestResult));
    }

    #[test]
    fn lists_compare_structurally() {
        let mut interpreter = Interpreter::new().unwrap();
        let output = test_job(
            &mut interpreter,
            "(define (pair-up a b) (list a b))",
            &[case(vec![json!("pair-up"), json!(1), json!(2)], json!([1, 2]), "pair")],
        );
        assert!(output.success);
        assert_eq!(output.lines[0].1, "✅ pair: (1 2) == (1 2)");
    }
}
