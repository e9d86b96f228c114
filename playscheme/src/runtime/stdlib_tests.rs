use super::*;
use pretty_assertions::assert_eq;

fn eval(source: &str) -> String {
    let mut interpreter = Interpreter::new().expect("stdlib loads");
    interpreter
        .eval_str(source)
        .map(|v| v.to_string())
        .unwrap_or_else(|e| format!("error: {}", e))
}

#[test]
fn arithmetic_keeps_exactness() {
    assert_eq!(eval("(+ 1 2 3)"), "6");
    assert_eq!(eval("(- 10)"), "-10");
    assert_eq!(eval("(* 2 2.5)"), "5.0");
    assert_eq!(eval("(/ 10 2)"), "5");
    assert_eq!(eval("(/ 1 4)"), "0.25");
    assert_eq!(eval("(/ 1 0)"), "error: Division by zero");
}

#[test]
fn integer_division_family() {
    assert_eq!(eval("(quotient 17 5)"), "3");
    assert_eq!(eval("(remainder -7 2)"), "-1");
    assert_eq!(eval("(modulo -7 2)"), "1");
    assert_eq!(eval("(gcd 12 18)"), "6");
    assert_eq!(eval("(lcm 4 6)"), "12");
}

#[test]
fn overflow_promotes_to_real() {
    assert_eq!(eval("(exact? (* 9223372036854775807 2))"), "#f");
    assert_eq!(eval("(> (+ 9223372036854775807 1) 0)"), "#t");
}

#[test]
fn numeric_helpers() {
    assert_eq!(eval("(expt 2 10)"), "1024");
    assert_eq!(eval("(sqrt 16)"), "4");
    assert_eq!(eval("(sqrt 2.25)"), "1.5");
    assert_eq!(eval("(round 2.5)"), "2.0");
    assert_eq!(eval("(max 1 7 3)"), "7");
    assert_eq!(eval("(min 1 2.0)"), "1.0");
    assert_eq!(eval("(exact->inexact 3)"), "3.0");
    assert_eq!(eval("(< 1 2 3)"), "#t");
    assert_eq!(eval("(>= 3 3 4)"), "#f");
}

#[test]
fn list_operations() {
    assert_eq!(eval("(append '(1 2) '(3) '())"), "(1 2 3)");
    assert_eq!(eval("(reverse '(1 2 3))"), "(3 2 1)");
    assert_eq!(eval("(length '(a b c))"), "3");
    assert_eq!(eval("(list-ref '(a b c) 1)"), "b");
    assert_eq!(eval("(list-tail '(a b c) 2)"), "(c)");
    assert_eq!(eval("(member 2 '(1 2 3))"), "(2 3)");
    assert_eq!(eval("(assoc \"b\" '((\"a\" . 1) (\"b\" . 2)))"), "(b . 2)");
    assert_eq!(eval("(caddr '(1 2 3))"), "3");
    assert_eq!(eval("(last '(1 2 3))"), "3");
    assert_eq!(eval("(iota 4 1)"), "(1 2 3 4)");
}

#[test]
fn list_index_errors_name_the_bounds() {
    assert_eq!(
        eval("(list-ref '(a) 3)"),
        "error: Index out of bounds: 3 (length 1)"
    );
}

#[test]
fn higher_order_procedures() {
    assert_eq!(eval("(map + '(1 2) '(10 20 30))"), "(11 22)");
    assert_eq!(eval("(filter odd? '(1 2 3 4 5))"), "(1 3 5)");
    assert_eq!(eval("(reduce + 0 '(1 2 3 4))"), "10");
    assert_eq!(eval("(reduce + 0 '())"), "0");
    assert_eq!(eval("(fold-left cons '() '(1 2))"), "((() . 1) . 2)");
    assert_eq!(eval("(fold-right cons '() '(1 2))"), "(1 2)");
    assert_eq!(eval("(apply + 1 '(2 3))"), "6");
}

#[test]
fn strings_and_symbols() {
    assert_eq!(eval("(string-append \"foo\" \"bar\")"), "foobar");
    assert_eq!(eval("(substring \"hello\" 1 3)"), "el");
    assert_eq!(eval("(string->number \"42\")"), "42");
    assert_eq!(eval("(string->number \"nan\")"), "#f");
    assert_eq!(eval("(symbol->string 'abc)"), "abc");
    assert_eq!(eval("(list->string (reverse (string->list \"abc\")))"), "cba");
    assert_eq!(eval("(string-upcase \"hi\")"), "HI");
}

#[test]
fn equivalence_predicates() {
    assert_eq!(eval("(equal? '(1 (2)) '(1 (2)))"), "#t");
    assert_eq!(eval("(eqv? '(1) '(1))"), "#f");
    assert_eq!(eval("(eq? 'a 'a)"), "#t");
    assert_eq!(eval("(not '())"), "#f");
}

#[test]
fn display_writes_to_the_buffer() {
    let mut interpreter = Interpreter::new().unwrap();
    interpreter
        .eval_str("(display \"a\") (write \"b\") (newline) (display '(1 \"c\"))")
        .unwrap();
    assert_eq!(interpreter.take_output(), "a\"b\"\n(1 c)");
    assert_eq!(interpreter.take_output(), "");
}

#[test]
fn error_joins_message_and_irritants() {
    assert_eq!(eval("(error \"bad input:\" 42 'x)"), "error: bad input: 42 x");
}

#[test]
fn arity_is_checked_for_builtins() {
    assert_eq!(
        eval("(car '(1) '(2))"),
        "error: Arity mismatch in car: expected 1 arguments, got 2"
    );
}

#[test]
fn type_errors_name_the_operation() {
    assert_eq!(
        eval("(+ 1 \"two\")"),
        "error: Type error in +: expected number, got string"
    );
}
