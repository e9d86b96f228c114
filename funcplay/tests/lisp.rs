use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use funcplay::config::LispConfig;
use funcplay::lisp::{EngineLoader, PreludeLoader, SessionInitError, SessionStatus};
use funcplay::{LispExecutor, LispSession, OutputKind, TestCase};
use playscheme::Interpreter;
use pretty_assertions::assert_eq;
use serde_json::json;

fn executor() -> LispExecutor {
    let config = LispConfig {
        timeout_ms: 1000,
        stack_size_mb: 64,
        ..LispConfig::default()
    };
    LispExecutor::new(Arc::new(LispSession::new(config)))
}

#[tokio::test]
async fn definitions_persist_across_calls() {
    let executor = executor();
    let first = executor.execute("(define (square x) (* x x))").await;
    assert!(first.success);
    assert!(first.output.is_empty());

    let second = executor.execute("(square 5)").await;
    assert!(second.success);
    assert_eq!(second.result_value(), Some("25"));
    assert_eq!(executor.session().status(), SessionStatus::Ready);
}

#[tokio::test]
async fn display_output_is_one_trace_line_before_the_value() {
    let result = executor()
        .execute("(display \"sum: \") (display (+ 1 2)) (newline) 'done")
        .await;
    assert!(result.success);
    assert_eq!(result.output[0].kind, OutputKind::Trace);
    assert_eq!(result.output[0].content, "sum: 3\n");
    assert_eq!(result.output[1].kind, OutputKind::ResultValue);
    assert_eq!(result.output[1].content, "done");
}

#[tokio::test]
async fn string_literals_with_parentheses_stay_whole() {
    let result = executor().execute("(display \"(not-a-call)\")").await;
    assert!(result.success);
    assert_eq!(result.contents(), vec!["(not-a-call)"]);
}

#[tokio::test]
async fn errors_are_reported_not_raised() {
    let result = executor().execute("(define x 1) (undefined-thing x)").await;
    assert!(!result.success);
    assert_eq!(result.output.len(), 1);
    assert_eq!(result.output[0].kind, OutputKind::Error);
    assert!(result.output[0].content.contains("Undefined symbol: undefined-thing"));
}

#[tokio::test]
async fn runaway_evaluation_times_out_and_the_session_survives() {
    let executor = executor();
    let result = executor.execute("(define (spin) (spin)) (spin)").await;
    assert!(!result.success);
    assert!(result.output[0].content.contains("timed out"));

    let after = executor.execute("(+ 1 1)").await;
    assert_eq!(after.result_value(), Some("2"));
}

#[tokio::test]
async fn deep_recursion_is_reported() {
    let config = LispConfig {
        max_recursion_depth: 500,
        stack_size_mb: 64,
        ..LispConfig::default()
    };
    let executor = LispExecutor::new(Arc::new(LispSession::new(config)));
    let result = executor
        .execute("(define (count n) (if (= n 0) 0 (+ 1 (count (- n 1))))) (count 100000)")
        .await;
    assert!(!result.success);
    assert!(result.output[0].content.contains("Recursion depth limit of 500"));
}

#[tokio::test]
async fn prelude_is_loaded_by_default() {
    let result = executor().execute("(accumulate + 0 (enumerate-interval 1 4))").await;
    assert_eq!(result.result_value(), Some("10"));
}

#[tokio::test]
async fn test_cases_call_the_first_input_as_operator() {
    let result = executor()
        .run_tests(
            "(define (square x) (* x x))",
            &[
                TestCase::new(vec![json!("square"), json!(5)], json!(25), "square of 5"),
                TestCase::new(vec![], json!(9), "square 3"),
                TestCase::new(vec![], json!(16), "(square 4)"),
            ],
        )
        .await;
    assert!(result.success);
    assert_eq!(
        result.contents(),
        vec![
            "✅ square of 5: 25 == 25",
            "✅ square 3: 9 == 9",
            "✅ (square 4): 16 == 16"
        ]
    );
    assert!(result
        .output
        .iter()
        .all(|line| line.kind == OutputKind::TestResult));
}

#[tokio::test]
async fn failing_and_throwing_cases_are_isolated() {
    let result = executor()
        .run_tests(
            "(define (safe-div a b) (/ a b))",
            &[
                TestCase::new(vec![json!("safe-div"), json!(1), json!(0)], json!(0), "by zero"),
                TestCase::new(vec![json!("safe-div"), json!(6), json!(3)], json!(2), "six by three"),
                TestCase::new(vec![json!("safe-div"), json!(6), json!(4)], json!(2), "rounding"),
            ],
        )
        .await;
    assert!(!result.success);
    let contents = result.contents();
    assert_eq!(contents[0], "❌ by zero: evaluation error - Division by zero");
    assert_eq!(contents[1], "✅ six by three: 2 == 2");
    assert_eq!(contents[2], "❌ rounding: 1.5 != 2");
}

#[tokio::test]
async fn list_results_match_array_expectations() {
    let result = executor()
        .run_tests(
            "(define (evens xs) (filter even? xs))",
            &[
                TestCase::new(vec![json!("evens"), json!([1, 2, 3, 4])], json!([2, 4]), "evens"),
                TestCase::new(vec![json!("evens"), json!([1, 3])], json!([]), "none"),
            ],
        )
        .await;
    assert!(result.success);
    assert_eq!(result.contents(), vec!["✅ evens: (2 4) == (2 4)", "✅ none: () == ()"]);
}

/// Fails the first load, then loads normally.
#[derive(Default)]
struct FailsOnce {
    attempts: AtomicUsize,
}

#[async_trait]
impl EngineLoader for FailsOnce {
    async fn load(&self, config: &LispConfig) -> Result<Interpreter, SessionInitError> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(SessionInitError::Unavailable("engine assets missing".into()));
        }
        PreludeLoader.load(config).await
    }
}

#[tokio::test]
async fn failed_initialization_is_reported_and_retried() {
    let config = LispConfig {
        stack_size_mb: 16,
        ..LispConfig::default()
    };
    let session = LispSession::with_loader(config, Arc::new(FailsOnce::default()));
    let executor = LispExecutor::new(Arc::new(session));

    let failed = executor.execute("(+ 1 2)").await;
    assert!(!failed.success);
    assert_eq!(failed.output.len(), 1);
    assert_eq!(failed.output[0].kind, OutputKind::Error);
    assert_eq!(
        failed.output[0].content,
        "Lisp interpreter could not be initialized: engine assets missing"
    );
    assert_eq!(executor.session().status(), SessionStatus::Uninitialized);

    let retried = executor.execute("(+ 1 2)").await;
    assert!(retried.success);
    assert_eq!(retried.result_value(), Some("3"));
    assert_eq!(executor.session().status(), SessionStatus::Ready);
}

#[tokio::test]
async fn deeply_nested_results_render_on_a_small_stack() {
    let config = LispConfig {
        stack_size_mb: 2,
        timeout_ms: 30_000,
        ..LispConfig::default()
    };
    let executor = LispExecutor::new(Arc::new(LispSession::new(config)));
    let result = executor
        .execute("(do ((i 0 (+ i 1)) (x '() (list x))) ((= i 100000) x))")
        .await;
    assert!(result.success);
    let rendered = result.result_value().unwrap_or_default();
    assert_eq!(rendered.len(), 2 * 100_000 + 2);
    assert!(rendered.starts_with("(((") && rendered.ends_with(")))"));
}
