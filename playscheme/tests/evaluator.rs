use std::sync::{Arc, Weak};
use std::time::Duration;

use playscheme::runtime::{Environment, Procedure, Value, DEFAULT_MAX_RECURSION_DEPTH};
use playscheme::{Interpreter, RuntimeError};
use pretty_assertions::assert_eq;

fn run(interpreter: &mut Interpreter, source: &str) -> String {
    match interpreter.eval_str(source) {
        Ok(value) => value.to_string(),
        Err(e) => format!("error: {}", e),
    }
}

fn eval(source: &str) -> String {
    let mut interpreter = Interpreter::new().expect("interpreter");
    run(&mut interpreter, source)
}

#[test]
fn defines_and_calls_procedures() {
    assert_eq!(
        eval("(define (factorial n) (if (= n 0) 1 (* n (factorial (- n 1))))) (factorial 10)"),
        "3628800"
    );
}

#[test]
fn definitions_persist_across_calls() {
    let mut interpreter = Interpreter::new().unwrap();
    run(&mut interpreter, "(define (square x) (* x x))");
    assert_eq!(run(&mut interpreter, "(square 12)"), "144");
}

#[test]
fn closures_capture_their_environment() {
    assert_eq!(
        eval(
            "(define (make-counter)
               (let ((n 0))
                 (lambda () (set! n (+ n 1)) n)))
             (define c (make-counter))
             (c) (c) (c)"
        ),
        "3"
    );
}

#[test]
fn rest_parameters_collect_extra_arguments() {
    assert_eq!(eval("(define (f a . rest) rest) (f 1 2 3)"), "(2 3)");
    assert_eq!(eval("((lambda args args) 1 2)"), "(1 2)");
}

#[test]
fn let_family() {
    assert_eq!(eval("(let ((x 2) (y 3)) (* x y))"), "6");
    assert_eq!(eval("(let* ((x 2) (y (* x 10))) y)"), "20");
    assert_eq!(
        eval("(letrec ((even? (lambda (n) (if (= n 0) #t (odd? (- n 1))))) (odd? (lambda (n) (if (= n 0) #f (even? (- n 1)))))) (even? 100))"),
        "#t"
    );
    assert_eq!(
        eval("(let loop ((i 0) (acc '())) (if (= i 3) (reverse acc) (loop (+ i 1) (cons i acc))))"),
        "(0 1 2)"
    );
}

#[test]
fn conditionals() {
    assert_eq!(eval("(cond ((> 1 2) 'a) ((> 2 1) 'b) (else 'c))"), "b");
    assert_eq!(eval("(cond ((assv 2 '((1 . one) (2 . two))) => cdr) (else 'none))"), "two");
    assert_eq!(eval("(case (* 2 3) ((2 3 5 7) 'prime) ((1 4 6 8 9) 'composite))"), "composite");
    assert_eq!(eval("(and 1 2 #f 3)"), "#f");
    assert_eq!(eval("(or #f '() 3)"), "()");
    assert_eq!(eval("(when (> 2 1) 'yes)"), "yes");
    assert_eq!(eval("(unless (> 2 1) 'yes)"), "");
}

#[test]
fn do_loops() {
    assert_eq!(
        eval("(do ((i 0 (+ i 1)) (sum 0 (+ sum i))) ((= i 5) sum))"),
        "10"
    );
}

#[test]
fn quasiquote_splices() {
    assert_eq!(eval("(define xs '(2 3)) `(1 ,@xs ,(+ 2 2))"), "(1 2 3 4)");
    assert_eq!(eval("`(a . ,(+ 1 1))"), "(a . 2)");
}

#[test]
fn tail_calls_run_in_constant_depth() {
    let mut interpreter = Interpreter::new().unwrap();
    interpreter.set_max_recursion_depth(64);
    assert_eq!(
        run(
            &mut interpreter,
            "(define (count-down n) (if (= n 0) 'done (count-down (- n 1)))) (count-down 100000)"
        ),
        "done"
    );
}

#[test]
fn deep_recursion_hits_the_depth_limit() {
    let mut interpreter = Interpreter::new().unwrap();
    interpreter.set_max_recursion_depth(100);
    let err = interpreter
        .eval_str("(define (sum-to n) (if (= n 0) 0 (+ n (sum-to (- n 1))))) (sum-to 100000)")
        .unwrap_err();
    assert_eq!(err, RuntimeError::RecursionLimit(100));
    // the interpreter stays usable afterwards
    assert_eq!(run(&mut interpreter, "(sum-to 10)"), "55");
}

#[test]
fn default_depth_limit_holds_on_a_small_thread() {
    let (shallow, deep) = std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(|| {
            let mut interpreter = Interpreter::new().unwrap();
            run(&mut interpreter, "(define (count n) (if (= n 0) 0 (+ 1 (count (- n 1)))))");
            let shallow = run(&mut interpreter, "(count 9000)");
            let deep = interpreter.eval_str("(count 20000)").unwrap_err();
            (shallow, deep)
        })
        .unwrap()
        .join()
        .unwrap();
    assert_eq!(shallow, "9000");
    assert_eq!(deep, RuntimeError::RecursionLimit(DEFAULT_MAX_RECURSION_DEPTH));
}

fn closure_frame(value: &Value) -> Weak<Environment> {
    match value {
        Value::Procedure(Procedure::Lambda(lambda)) => Arc::downgrade(&lambda.env),
        other => panic!("expected a lambda, got {}", other),
    }
}

#[test]
fn self_referencing_local_procedures_are_released() {
    let mut interpreter = Interpreter::new().unwrap();
    run(
        &mut interpreter,
        "(define (named-loop) (let loop ((i 0)) loop))
         (define (internal) (define (helper x) x) helper)
         (define (mutual) (letrec ((even? (lambda (n) (if (= n 0) #t (odd? (- n 1)))))
                                   (odd? (lambda (n) (if (= n 0) #f (even? (- n 1))))))
                            even?))",
    );
    for source in ["(named-loop)", "(internal)", "(mutual)"] {
        let procedure = interpreter.eval_str(source).unwrap();
        let frame = closure_frame(&procedure);
        drop(procedure);
        assert!(interpreter.collect_cycles(&[]) >= 1, "{}", source);
        assert!(frame.upgrade().is_none(), "{} kept its frame alive", source);
    }
}

#[test]
fn reachable_closures_survive_collection() {
    let mut interpreter = Interpreter::new().unwrap();
    run(
        &mut interpreter,
        "(define (make-counter)
           (define n 0)
           (define (next) (set! n (+ n 1)) n)
           next)
         (define counter (make-counter))",
    );
    assert_eq!(run(&mut interpreter, "(counter)"), "1");

    let held = interpreter.eval_str("(make-counter)").unwrap();
    let frame = closure_frame(&held);
    assert_eq!(interpreter.collect_cycles(&[&held]), 0);
    assert!(frame.upgrade().is_some());
    assert_eq!(run(&mut interpreter, "(counter)"), "2");

    drop(held);
    assert_eq!(interpreter.collect_cycles(&[]), 1);
    assert!(frame.upgrade().is_none());
    assert_eq!(run(&mut interpreter, "(counter)"), "3");
}

#[test]
fn runaway_loops_time_out() {
    let mut interpreter = Interpreter::new().unwrap();
    interpreter.set_time_budget(Some(Duration::from_millis(50)));
    let err = interpreter
        .eval_str("(define (spin) (spin)) (spin)")
        .unwrap_err();
    assert_eq!(err, RuntimeError::Timeout(50));
    interpreter.set_time_budget(None);
    assert_eq!(run(&mut interpreter, "(+ 1 1)"), "2");
}

#[test]
fn prelude_definitions_are_available() {
    let mut interpreter = Interpreter::with_prelude().unwrap();
    assert_eq!(run(&mut interpreter, "(enumerate-interval 1 5)"), "(1 2 3 4 5)");
    assert_eq!(run(&mut interpreter, "(accumulate + 0 '(1 2 3))"), "6");
    assert_eq!(
        run(&mut interpreter, "(flatmap (lambda (x) (list x x)) '(1 2))"),
        "(1 1 2 2)"
    );
    assert_eq!(run(&mut interpreter, "((compose inc inc) 1)"), "3");
    assert_eq!(run(&mut interpreter, "nil"), "()");
}

#[test]
fn undefined_symbols_and_bad_calls_are_errors() {
    assert_eq!(eval("(undefined-fn 1)"), "error: Undefined symbol: undefined-fn");
    assert_eq!(eval("(1 2)"), "error: Not a procedure: 1");
    assert_eq!(
        eval("(define (f x) x) (f 1 2)"),
        "error: Arity mismatch in f: expected 1 arguments, got 2"
    );
}

#[test]
fn syntax_errors_surface_as_runtime_errors() {
    let err = Interpreter::new().unwrap().eval_str("(+ 1").unwrap_err();
    assert!(matches!(err, RuntimeError::Parse(_)));
}

#[test]
fn procedures_render_with_their_name() {
    assert_eq!(eval("(define (f) 1) f"), "#<procedure f>");
    assert_eq!(eval("car"), "#<procedure car>");
}

#[test]
fn host_code_can_call_definitions() {
    let mut interpreter = Interpreter::new().unwrap();
    run(&mut interpreter, "(define (add a b) (+ a b))");
    let value = interpreter
        .call("add", vec![Value::Integer(2), Value::Integer(3)])
        .unwrap();
    assert_eq!(value, Value::Integer(5));
}
