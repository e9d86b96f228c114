// PlayScheme standard library: the builtin procedures installed in every
// global environment.

use std::sync::Arc;

use itertools::Itertools;

use crate::runtime::environment::Environment;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::evaluator::Evaluator;
use crate::runtime::values::{Arity, Builtin, BuiltinFn, Procedure, Symbol, Value};

pub fn builtin(name: &str, arity: Arity, func: BuiltinFn) -> Value {
    Value::Procedure(Procedure::Builtin(Arc::new(Builtin {
        name: name.to_string(),
        arity,
        func,
    })))
}

pub fn load_standard_library(env: &Environment) -> RuntimeResult<()> {
    for (name, arity, func) in BUILTINS {
        env.define(Symbol::new(*name), builtin(name, *arity, *func))?;
    }
    Ok(())
}

const BUILTINS: &[(&str, Arity, BuiltinFn)] = &[
    // numbers
    ("+", Arity::Variadic(0), add),
    ("-", Arity::Variadic(1), subtract),
    ("*", Arity::Variadic(0), multiply),
    ("/", Arity::Variadic(1), divide),
    ("quotient", Arity::Fixed(2), quotient),
    ("remainder", Arity::Fixed(2), remainder),
    ("modulo", Arity::Fixed(2), modulo),
    ("abs", Arity::Fixed(1), abs),
    ("min", Arity::Variadic(1), min),
    ("max", Arity::Variadic(1), max),
    ("expt", Arity::Fixed(2), expt),
    ("sqrt", Arity::Fixed(1), sqrt),
    ("square", Arity::Fixed(1), square),
    ("exact->inexact", Arity::Fixed(1), exact_to_inexact),
    ("inexact", Arity::Fixed(1), exact_to_inexact),
    ("inexact->exact", Arity::Fixed(1), inexact_to_exact),
    ("exact", Arity::Fixed(1), inexact_to_exact),
    ("floor", Arity::Fixed(1), floor),
    ("ceiling", Arity::Fixed(1), ceiling),
    ("round", Arity::Fixed(1), round),
    ("truncate", Arity::Fixed(1), truncate),
    ("gcd", Arity::Variadic(0), gcd),
    ("lcm", Arity::Variadic(0), lcm),
    ("number?", Arity::Fixed(1), is_number),
    ("integer?", Arity::Fixed(1), is_integer),
    ("real?", Arity::Fixed(1), is_number),
    ("exact?", Arity::Fixed(1), is_exact),
    ("inexact?", Arity::Fixed(1), is_inexact),
    ("zero?", Arity::Fixed(1), is_zero),
    ("positive?", Arity::Fixed(1), is_positive),
    ("negative?", Arity::Fixed(1), is_negative),
    ("even?", Arity::Fixed(1), is_even),
    ("odd?", Arity::Fixed(1), is_odd),
    ("=", Arity::Variadic(1), num_eq),
    ("<", Arity::Variadic(1), num_lt),
    (">", Arity::Variadic(1), num_gt),
    ("<=", Arity::Variadic(1), num_le),
    (">=", Arity::Variadic(1), num_ge),
    // booleans and equivalence
    ("not", Arity::Fixed(1), not),
    ("boolean?", Arity::Fixed(1), is_boolean),
    ("eq?", Arity::Fixed(2), is_eqv),
    ("eqv?", Arity::Fixed(2), is_eqv),
    ("equal?", Arity::Fixed(2), is_equal),
    // pairs and lists
    ("cons", Arity::Fixed(2), cons),
    ("car", Arity::Fixed(1), car),
    ("cdr", Arity::Fixed(1), cdr),
    ("caar", Arity::Fixed(1), caar),
    ("cadr", Arity::Fixed(1), cadr),
    ("cdar", Arity::Fixed(1), cdar),
    ("cddr", Arity::Fixed(1), cddr),
    ("caddr", Arity::Fixed(1), caddr),
    ("list", Arity::Variadic(0), list),
    ("list?", Arity::Fixed(1), is_list),
    ("pair?", Arity::Fixed(1), is_pair),
    ("null?", Arity::Fixed(1), is_null),
    ("length", Arity::Fixed(1), length),
    ("append", Arity::Variadic(0), append),
    ("reverse", Arity::Fixed(1), reverse),
    ("list-ref", Arity::Fixed(2), list_ref),
    ("list-tail", Arity::Fixed(2), list_tail),
    ("memq", Arity::Fixed(2), memv),
    ("memv", Arity::Fixed(2), memv),
    ("member", Arity::Fixed(2), member),
    ("assq", Arity::Fixed(2), assv),
    ("assv", Arity::Fixed(2), assv),
    ("assoc", Arity::Fixed(2), assoc),
    ("last", Arity::Fixed(1), last),
    ("iota", Arity::Range(1, 3), iota),
    // higher-order
    ("map", Arity::Variadic(2), map),
    ("for-each", Arity::Variadic(2), for_each),
    ("filter", Arity::Fixed(2), filter),
    ("reduce", Arity::Fixed(3), reduce),
    ("fold", Arity::Fixed(3), fold),
    ("fold-left", Arity::Fixed(3), fold_left),
    ("fold-right", Arity::Fixed(3), fold_right),
    ("apply", Arity::Variadic(2), apply),
    // symbols, strings and characters
    ("symbol?", Arity::Fixed(1), is_symbol),
    ("symbol->string", Arity::Fixed(1), symbol_to_string),
    ("string->symbol", Arity::Fixed(1), string_to_symbol),
    ("string?", Arity::Fixed(1), is_string),
    ("string-length", Arity::Fixed(1), string_length),
    ("string-append", Arity::Variadic(0), string_append),
    ("substring", Arity::Range(2, 3), substring),
    ("string-ref", Arity::Fixed(2), string_ref),
    ("string=?", Arity::Variadic(1), string_eq),
    ("string<?", Arity::Variadic(1), string_lt),
    ("string>?", Arity::Variadic(1), string_gt),
    ("string->number", Arity::Fixed(1), string_to_number),
    ("number->string", Arity::Fixed(1), number_to_string),
    ("string-upcase", Arity::Fixed(1), string_upcase),
    ("string-downcase", Arity::Fixed(1), string_downcase),
    ("string->list", Arity::Fixed(1), string_to_list),
    ("list->string", Arity::Fixed(1), list_to_string),
    ("char?", Arity::Fixed(1), is_char),
    ("char->integer", Arity::Fixed(1), char_to_integer),
    ("integer->char", Arity::Fixed(1), integer_to_char),
    // procedures, errors and output
    ("procedure?", Arity::Fixed(1), is_procedure),
    ("error", Arity::Variadic(1), error),
    ("display", Arity::Range(1, 2), display),
    ("write", Arity::Range(1, 2), write),
    ("newline", Arity::Range(0, 1), newline),
];

// --- numbers ---

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Real(f64),
}

impl Num {
    fn from_value(value: &Value, op: &str) -> RuntimeResult<Num> {
        match value {
            Value::Integer(i) => Ok(Num::Int(*i)),
            Value::Real(r) => Ok(Num::Real(*r)),
            other => Err(RuntimeError::type_error("number", other, op)),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Real(r) => r,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Num::Int(i) => Value::Integer(i),
            Num::Real(r) => Value::Real(r),
        }
    }
}

// Exact arithmetic falls back to reals on overflow.
fn combine(a: Num, b: Num, exact: fn(i64, i64) -> Option<i64>, inexact: fn(f64, f64) -> f64) -> Num {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => exact(x, y)
            .map(Num::Int)
            .unwrap_or_else(|| Num::Real(inexact(x as f64, y as f64))),
        _ => Num::Real(inexact(a.as_f64(), b.as_f64())),
    }
}

fn numbers(args: &[Value], op: &str) -> RuntimeResult<Vec<Num>> {
    args.iter().map(|v| Num::from_value(v, op)).collect()
}

fn int_arg(value: &Value, op: &str) -> RuntimeResult<i64> {
    match value {
        Value::Integer(i) => Ok(*i),
        Value::Real(r) if r.fract() == 0.0 && r.is_finite() => Ok(*r as i64),
        other => Err(RuntimeError::type_error("integer", other, op)),
    }
}

fn index_arg(value: &Value, op: &str) -> RuntimeResult<usize> {
    let index = int_arg(value, op)?;
    usize::try_from(index).map_err(|_| RuntimeError::InvalidArgument(format!("{}: negative index {}", op, index)))
}

fn add(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let sum = numbers(&args, "+")?
        .into_iter()
        .fold(Num::Int(0), |acc, n| combine(acc, n, i64::checked_add, |a, b| a + b));
    Ok(sum.into_value())
}

fn multiply(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let product = numbers(&args, "*")?
        .into_iter()
        .fold(Num::Int(1), |acc, n| combine(acc, n, i64::checked_mul, |a, b| a * b));
    Ok(product.into_value())
}

fn subtract(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let nums = numbers(&args, "-")?;
    let result = match nums.as_slice() {
        [only] => combine(Num::Int(0), *only, i64::checked_sub, |a, b| a - b),
        [first, rest @ ..] => rest
            .iter()
            .fold(*first, |acc, n| combine(acc, *n, i64::checked_sub, |a, b| a - b)),
        [] => Num::Int(0),
    };
    Ok(result.into_value())
}

fn divide_two(a: Num, b: Num) -> RuntimeResult<Num> {
    match (a, b) {
        (_, Num::Int(0)) => Err(RuntimeError::DivisionByZero),
        (Num::Int(x), Num::Int(y)) => match (x.checked_rem(y), x.checked_div(y)) {
            (Some(0), Some(q)) => Ok(Num::Int(q)),
            _ => Ok(Num::Real(x as f64 / y as f64)),
        },
        _ => Ok(Num::Real(a.as_f64() / b.as_f64())),
    }
}

/// Exact when the division is exact, a real otherwise.
fn divide(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let nums = numbers(&args, "/")?;
    let result = match nums.as_slice() {
        [only] => divide_two(Num::Int(1), *only)?,
        [first, rest @ ..] => {
            let mut acc = *first;
            for n in rest {
                acc = divide_two(acc, *n)?;
            }
            acc
        }
        [] => Num::Int(1),
    };
    Ok(result.into_value())
}

fn integer_division(args: &[Value], op: &str) -> RuntimeResult<(i64, i64)> {
    let a = int_arg(&args[0], op)?;
    let b = int_arg(&args[1], op)?;
    if b == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    Ok((a, b))
}

fn quotient(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let (a, b) = integer_division(&args, "quotient")?;
    Ok(Value::Integer(a.checked_div(b).unwrap_or(i64::MAX)))
}

fn remainder(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let (a, b) = integer_division(&args, "remainder")?;
    Ok(Value::Integer(a.checked_rem(b).unwrap_or(0)))
}

/// Result takes the sign of the divisor.
fn modulo(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let (a, b) = integer_division(&args, "modulo")?;
    let r = a.checked_rem(b).unwrap_or(0);
    let m = if r != 0 && (r < 0) != (b < 0) { r + b } else { r };
    Ok(Value::Integer(m))
}

fn abs(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(match Num::from_value(&args[0], "abs")? {
        Num::Int(i) => i
            .checked_abs()
            .map(Value::Integer)
            .unwrap_or(Value::Real((i as f64).abs())),
        Num::Real(r) => Value::Real(r.abs()),
    })
}

fn extremum(args: &[Value], op: &str, pick_left: fn(f64, f64) -> bool) -> RuntimeResult<Value> {
    let nums = numbers(args, op)?;
    let inexact = nums.iter().any(|n| matches!(n, Num::Real(_)));
    let mut best = nums[0];
    for n in &nums[1..] {
        if !pick_left(best.as_f64(), n.as_f64()) {
            best = *n;
        }
    }
    Ok(if inexact {
        Value::Real(best.as_f64())
    } else {
        best.into_value()
    })
}

fn min(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    extremum(&args, "min", |a, b| a <= b)
}

fn max(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    extremum(&args, "max", |a, b| a >= b)
}

fn expt(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let base = Num::from_value(&args[0], "expt")?;
    let exponent = Num::from_value(&args[1], "expt")?;
    if let (Num::Int(b), Num::Int(e)) = (base, exponent) {
        if let Ok(e) = u32::try_from(e) {
            if let Some(result) = b.checked_pow(e) {
                return Ok(Value::Integer(result));
            }
        }
    }
    Ok(Value::Real(base.as_f64().powf(exponent.as_f64())))
}

fn sqrt(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let n = Num::from_value(&args[0], "sqrt")?;
    if n.as_f64() < 0.0 {
        return Err(RuntimeError::InvalidArgument(format!(
            "sqrt of negative number {}",
            args[0]
        )));
    }
    let root = n.as_f64().sqrt();
    if let Num::Int(i) = n {
        let exact = root.round() as i64;
        if exact.checked_mul(exact) == Some(i) {
            return Ok(Value::Integer(exact));
        }
    }
    Ok(Value::Real(root))
}

fn square(ev: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    multiply(ev, vec![args[0].clone(), args[0].clone()])
}

fn exact_to_inexact(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::Real(Num::from_value(&args[0], "exact->inexact")?.as_f64()))
}

fn inexact_to_exact(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    match Num::from_value(&args[0], "inexact->exact")? {
        Num::Int(i) => Ok(Value::Integer(i)),
        Num::Real(r) if r.is_finite() && r.fract() == 0.0 => Ok(Value::Integer(r as i64)),
        Num::Real(r) => Err(RuntimeError::InvalidArgument(format!(
            "inexact->exact: {} has no exact integer form",
            r
        ))),
    }
}

fn rounding(args: &[Value], op: &str, f: fn(f64) -> f64) -> RuntimeResult<Value> {
    Ok(match Num::from_value(&args[0], op)? {
        Num::Int(i) => Value::Integer(i),
        Num::Real(r) => Value::Real(f(r)),
    })
}

fn floor(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    rounding(&args, "floor", f64::floor)
}

fn ceiling(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    rounding(&args, "ceiling", f64::ceil)
}

/// Rounds half to even.
fn round(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    rounding(&args, "round", f64::round_ties_even)
}

fn truncate(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    rounding(&args, "truncate", f64::trunc)
}

fn gcd_pair(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        (a, b) = (b, a.wrapping_rem(b));
    }
    a.abs()
}

fn gcd(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let mut acc = 0;
    for arg in &args {
        acc = gcd_pair(acc, int_arg(arg, "gcd")?);
    }
    Ok(Value::Integer(acc))
}

fn lcm(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let mut acc: i64 = 1;
    for arg in &args {
        let n = int_arg(arg, "lcm")?;
        if n == 0 {
            return Ok(Value::Integer(0));
        }
        acc = (acc / gcd_pair(acc, n))
            .checked_mul(n.abs())
            .ok_or_else(|| RuntimeError::InvalidArgument("lcm: result overflows".to_string()))?;
    }
    Ok(Value::Integer(acc))
}

fn is_number(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::Boolean(matches!(args[0], Value::Integer(_) | Value::Real(_))))
}

fn is_integer(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::Boolean(match args[0] {
        Value::Integer(_) => true,
        Value::Real(r) => r.is_finite() && r.fract() == 0.0,
        _ => false,
    }))
}

fn is_exact(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Num::from_value(&args[0], "exact?")?;
    Ok(Value::Boolean(matches!(args[0], Value::Integer(_))))
}

fn is_inexact(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Num::from_value(&args[0], "inexact?")?;
    Ok(Value::Boolean(matches!(args[0], Value::Real(_))))
}

fn sign_test(args: &[Value], op: &str, test: fn(f64) -> bool) -> RuntimeResult<Value> {
    Ok(Value::Boolean(test(Num::from_value(&args[0], op)?.as_f64())))
}

fn is_zero(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    sign_test(&args, "zero?", |n| n == 0.0)
}

fn is_positive(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    sign_test(&args, "positive?", |n| n > 0.0)
}

fn is_negative(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    sign_test(&args, "negative?", |n| n < 0.0)
}

fn is_even(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::Boolean(int_arg(&args[0], "even?")? % 2 == 0))
}

fn is_odd(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::Boolean(int_arg(&args[0], "odd?")? % 2 != 0))
}

fn compare_chain(args: &[Value], op: &str, holds: fn(std::cmp::Ordering) -> bool) -> RuntimeResult<Value> {
    let nums = numbers(args, op)?;
    let ordered = nums.iter().tuple_windows().all(|(a, b)| {
        let ordering = match (a, b) {
            (Num::Int(x), Num::Int(y)) => Some(x.cmp(y)),
            _ => a.as_f64().partial_cmp(&b.as_f64()),
        };
        ordering.map(holds).unwrap_or(false)
    });
    Ok(Value::Boolean(ordered))
}

fn num_eq(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    compare_chain(&args, "=", |o| o.is_eq())
}

fn num_lt(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    compare_chain(&args, "<", |o| o.is_lt())
}

fn num_gt(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    compare_chain(&args, ">", |o| o.is_gt())
}

fn num_le(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    compare_chain(&args, "<=", |o| o.is_le())
}

fn num_ge(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    compare_chain(&args, ">=", |o| o.is_ge())
}

// --- booleans and equivalence ---

fn not(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::Boolean(!args[0].is_truthy()))
}

fn is_boolean(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::Boolean(matches!(args[0], Value::Boolean(_))))
}

fn is_eqv(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::Boolean(args[0].eqv(&args[1])))
}

fn is_equal(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::Boolean(args[0] == args[1]))
}

// --- pairs and lists ---

fn list_arg(value: &Value, op: &str) -> RuntimeResult<Vec<Value>> {
    value
        .list_to_vec()
        .ok_or_else(|| RuntimeError::type_error("list", value, op))
}

fn cons(_: &mut Evaluator, mut args: Vec<Value>) -> RuntimeResult<Value> {
    let cdr = args.pop().unwrap_or(Value::Nil);
    let car = args.pop().unwrap_or(Value::Nil);
    Ok(Value::cons(car, cdr))
}

// Apply a c[ad]+r path, innermost operation last in `path`.
fn cxr(value: &Value, path: &str, op: &str) -> RuntimeResult<Value> {
    let mut current = value.clone();
    for step in path.chars().rev() {
        let pair = current
            .as_pair()
            .ok_or_else(|| RuntimeError::type_error("pair", &current, op))?;
        let next = if step == 'a' {
            pair.car.clone()
        } else {
            pair.cdr.clone()
        };
        current = next;
    }
    Ok(current)
}

fn car(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    cxr(&args[0], "a", "car")
}

fn cdr(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    cxr(&args[0], "d", "cdr")
}

fn caar(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    cxr(&args[0], "aa", "caar")
}

fn cadr(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    cxr(&args[0], "ad", "cadr")
}

fn cdar(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    cxr(&args[0], "da", "cdar")
}

fn cddr(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    cxr(&args[0], "dd", "cddr")
}

fn caddr(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    cxr(&args[0], "add", "caddr")
}

fn list(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::list(args))
}

fn is_list(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::Boolean(args[0].is_list()))
}

fn is_pair(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::Boolean(matches!(args[0], Value::Pair(_))))
}

fn is_null(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::Boolean(args[0].is_nil()))
}

fn length(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::Integer(list_arg(&args[0], "length")?.len() as i64))
}

/// Every argument but the last must be a proper list; the last becomes the tail.
fn append(_: &mut Evaluator, mut args: Vec<Value>) -> RuntimeResult<Value> {
    let Some(tail) = args.pop() else {
        return Ok(Value::Nil);
    };
    let mut items = Vec::new();
    for arg in &args {
        items.extend(list_arg(arg, "append")?);
    }
    Ok(Value::list_with_tail(items, tail))
}

fn reverse(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let mut items = list_arg(&args[0], "reverse")?;
    items.reverse();
    Ok(Value::list(items))
}

fn list_ref(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let items = list_arg(&args[0], "list-ref")?;
    let index = int_arg(&args[1], "list-ref")?;
    usize::try_from(index)
        .ok()
        .and_then(|i| items.get(i).cloned())
        .ok_or(RuntimeError::IndexOutOfBounds {
            index,
            length: items.len(),
        })
}

fn list_tail(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let k = index_arg(&args[1], "list-tail")?;
    let mut current = args[0].clone();
    for taken in 0..k {
        let next = match &current {
            Value::Pair(p) => p.cdr.clone(),
            _ => {
                return Err(RuntimeError::IndexOutOfBounds {
                    index: k as i64,
                    length: taken,
                })
            }
        };
        current = next;
    }
    Ok(current)
}

fn find_tail(list: &Value, matches: impl Fn(&Value) -> bool) -> Value {
    let mut cursor = list;
    while let Value::Pair(p) = cursor {
        if matches(&p.car) {
            return cursor.clone();
        }
        cursor = &p.cdr;
    }
    Value::Boolean(false)
}

fn memv(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(find_tail(&args[1], |item| item.eqv(&args[0])))
}

fn member(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(find_tail(&args[1], |item| *item == args[0]))
}

fn find_entry(alist: &Value, op: &str, matches: impl Fn(&Value) -> bool) -> RuntimeResult<Value> {
    for entry in list_arg(alist, op)? {
        let key = entry
            .as_pair()
            .map(|p| p.car.clone())
            .ok_or_else(|| RuntimeError::type_error("pair", &entry, op))?;
        if matches(&key) {
            return Ok(entry);
        }
    }
    Ok(Value::Boolean(false))
}

fn assv(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    find_entry(&args[1], "assv", |key| key.eqv(&args[0]))
}

fn assoc(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    find_entry(&args[1], "assoc", |key| *key == args[0])
}

fn last(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    list_arg(&args[0], "last")?
        .pop()
        .ok_or_else(|| RuntimeError::InvalidArgument("last: empty list".to_string()))
}

fn iota(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let count = index_arg(&args[0], "iota")?;
    let start = args.get(1).map(|v| Num::from_value(v, "iota")).transpose()?.unwrap_or(Num::Int(0));
    let step = args.get(2).map(|v| Num::from_value(v, "iota")).transpose()?.unwrap_or(Num::Int(1));
    let mut items = Vec::with_capacity(count);
    let mut current = start;
    for _ in 0..count {
        items.push(current.into_value());
        current = combine(current, step, i64::checked_add, |a, b| a + b);
    }
    Ok(Value::list(items))
}

// --- higher-order ---

// Zip the list arguments, stopping at the shortest.
fn zipped(lists: &[Value], op: &str) -> RuntimeResult<Vec<Vec<Value>>> {
    let columns = lists
        .iter()
        .map(|l| list_arg(l, op))
        .collect::<RuntimeResult<Vec<_>>>()?;
    let shortest = columns.iter().map(Vec::len).min().unwrap_or(0);
    Ok((0..shortest)
        .map(|i| columns.iter().map(|c| c[i].clone()).collect())
        .collect())
}

fn map(ev: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let mut results = Vec::new();
    for row in zipped(&args[1..], "map")? {
        results.push(ev.apply(&args[0], row)?);
    }
    Ok(Value::list(results))
}

fn for_each(ev: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    for row in zipped(&args[1..], "for-each")? {
        ev.apply(&args[0], row)?;
    }
    Ok(Value::Unspecified)
}

fn filter(ev: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let mut kept = Vec::new();
    for item in list_arg(&args[1], "filter")? {
        if ev.apply(&args[0], vec![item.clone()])?.is_truthy() {
            kept.push(item);
        }
    }
    Ok(Value::list(kept))
}

/// `(reduce f initial list)`: `initial` only for the empty list, otherwise
/// `(f elem acc)` seeded with the first element.
fn reduce(ev: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let mut items = list_arg(&args[2], "reduce")?.into_iter();
    let Some(mut acc) = items.next() else {
        return Ok(args[1].clone());
    };
    for item in items {
        acc = ev.apply(&args[0], vec![item, acc])?;
    }
    Ok(acc)
}

/// `(fold f init list)` calls `(f elem acc)`.
fn fold(ev: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let mut acc = args[1].clone();
    for item in list_arg(&args[2], "fold")? {
        acc = ev.apply(&args[0], vec![item, acc])?;
    }
    Ok(acc)
}

/// `(fold-left f init list)` calls `(f acc elem)`.
fn fold_left(ev: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let mut acc = args[1].clone();
    for item in list_arg(&args[2], "fold-left")? {
        acc = ev.apply(&args[0], vec![acc, item])?;
    }
    Ok(acc)
}

/// `(fold-right f init list)` calls `(f elem acc)` from the right.
fn fold_right(ev: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let mut acc = args[1].clone();
    for item in list_arg(&args[2], "fold-right")?.into_iter().rev() {
        acc = ev.apply(&args[0], vec![item, acc])?;
    }
    Ok(acc)
}

fn apply(ev: &mut Evaluator, mut args: Vec<Value>) -> RuntimeResult<Value> {
    let spread = args.pop().unwrap_or(Value::Nil);
    let procedure = args.remove(0);
    args.extend(list_arg(&spread, "apply")?);
    ev.apply(&procedure, args)
}

// --- symbols, strings and characters ---

fn string_arg<'a>(value: &'a Value, op: &str) -> RuntimeResult<&'a str> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(RuntimeError::type_error("string", other, op)),
    }
}

fn is_symbol(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::Boolean(matches!(args[0], Value::Symbol(_))))
}

fn symbol_to_string(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    match &args[0] {
        Value::Symbol(s) => Ok(Value::string(s.0.clone())),
        other => Err(RuntimeError::type_error("symbol", other, "symbol->string")),
    }
}

fn string_to_symbol(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::symbol(string_arg(&args[0], "string->symbol")?))
}

fn is_string(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::Boolean(matches!(args[0], Value::String(_))))
}

fn string_length(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::Integer(
        string_arg(&args[0], "string-length")?.chars().count() as i64,
    ))
}

fn string_append(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let mut out = String::new();
    for arg in &args {
        out.push_str(string_arg(arg, "string-append")?);
    }
    Ok(Value::String(out))
}

fn substring(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let chars: Vec<char> = string_arg(&args[0], "substring")?.chars().collect();
    let start = index_arg(&args[1], "substring")?;
    let end = match args.get(2) {
        Some(end) => index_arg(end, "substring")?,
        None => chars.len(),
    };
    if start > end || end > chars.len() {
        return Err(RuntimeError::IndexOutOfBounds {
            index: end.max(start) as i64,
            length: chars.len(),
        });
    }
    Ok(Value::String(chars[start..end].iter().collect()))
}

fn string_ref(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let s = string_arg(&args[0], "string-ref")?;
    let index = index_arg(&args[1], "string-ref")?;
    s.chars()
        .nth(index)
        .map(Value::Char)
        .ok_or(RuntimeError::IndexOutOfBounds {
            index: index as i64,
            length: s.chars().count(),
        })
}

fn string_compare(args: &[Value], op: &str, holds: fn(std::cmp::Ordering) -> bool) -> RuntimeResult<Value> {
    let strings = args
        .iter()
        .map(|a| string_arg(a, op))
        .collect::<RuntimeResult<Vec<_>>>()?;
    Ok(Value::Boolean(
        strings.iter().tuple_windows().all(|(a, b)| holds(a.cmp(b))),
    ))
}

fn string_eq(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    string_compare(&args, "string=?", |o| o.is_eq())
}

fn string_lt(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    string_compare(&args, "string<?", |o| o.is_lt())
}

fn string_gt(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    string_compare(&args, "string>?", |o| o.is_gt())
}

fn string_to_number(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let text = string_arg(&args[0], "string->number")?.trim();
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Value::Integer(i));
    }
    // f64 parsing also accepts "inf" and "NaN", which are not Scheme numbers
    let numeric = text
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
    Ok(match text.parse::<f64>() {
        Ok(r) if numeric => Value::Real(r),
        _ => Value::Boolean(false),
    })
}

fn number_to_string(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Num::from_value(&args[0], "number->string")?;
    Ok(Value::String(args[0].to_string()))
}

fn string_upcase(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::String(string_arg(&args[0], "string-upcase")?.to_uppercase()))
}

fn string_downcase(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::String(string_arg(&args[0], "string-downcase")?.to_lowercase()))
}

fn string_to_list(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::list(
        string_arg(&args[0], "string->list")?.chars().map(Value::Char).collect(),
    ))
}

fn list_to_string(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    list_arg(&args[0], "list->string")?
        .iter()
        .map(|item| match item {
            Value::Char(c) => Ok(*c),
            other => Err(RuntimeError::type_error("character", other, "list->string")),
        })
        .collect::<RuntimeResult<String>>()
        .map(Value::String)
}

fn is_char(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::Boolean(matches!(args[0], Value::Char(_))))
}

fn char_to_integer(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    match &args[0] {
        Value::Char(c) => Ok(Value::Integer(*c as i64)),
        other => Err(RuntimeError::type_error("character", other, "char->integer")),
    }
}

fn integer_to_char(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let code = int_arg(&args[0], "integer->char")?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(Value::Char)
        .ok_or_else(|| RuntimeError::InvalidArgument(format!("integer->char: {} is not a character", code)))
}

// --- procedures, errors and output ---

fn is_procedure(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::Boolean(matches!(args[0], Value::Procedure(_))))
}

/// `(error message irritant ...)`
fn error(_: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    let message = args.iter().map(Value::to_string).join(" ");
    Err(RuntimeError::UserError(message))
}

fn display(ev: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    ev.write_output(&args[0].to_string());
    Ok(Value::Unspecified)
}

fn write(ev: &mut Evaluator, args: Vec<Value>) -> RuntimeResult<Value> {
    ev.write_output(&args[0].repr());
    Ok(Value::Unspecified)
}

fn newline(ev: &mut Evaluator, _: Vec<Value>) -> RuntimeResult<Value> {
    ev.write_output("\n");
    Ok(Value::Unspecified)
}
