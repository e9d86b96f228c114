//! Deep, value-based comparison of actual results against expected test data.

use playscheme::Value;
use serde_json::Value as Json;

/// Deep equality over JSON data. Numbers compare by numeric value, so `25`
/// and `25.0` are equal; arrays are order sensitive.
pub fn json_equal(actual: &Json, expected: &Json) -> bool {
    match (actual, expected) {
        (Json::Number(a), Json::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        },
        (Json::Array(a), Json::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| json_equal(x, y))
        }
        (Json::Object(a), Json::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| json_equal(x, y)))
        }
        _ => actual == expected,
    }
}

/// Whether a Scheme result matches JSON test data.
///
/// Lists match arrays element by element, the empty list matches both `[]`
/// and `null`, and a string matches either a Scheme string or a symbol of
/// the same name. Objects compare as association lists.
pub fn scheme_matches_json(actual: &Value, expected: &Json) -> bool {
    let mut pending = vec![(actual, expected)];
    while let Some((actual, expected)) = pending.pop() {
        let matched = match expected {
            Json::Array(items) => {
                let mut rest = actual;
                for item in items {
                    match rest.as_pair() {
                        Some(pair) => {
                            pending.push((&pair.car, item));
                            rest = &pair.cdr;
                        }
                        None => return false,
                    }
                }
                rest.is_nil()
            }
            Json::Object(_) => *actual == Value::from_json(expected),
            _ => atom_matches(actual, expected),
        };
        if !matched {
            return false;
        }
    }
    true
}

fn atom_matches(actual: &Value, expected: &Json) -> bool {
    match expected {
        Json::Null => actual.is_nil(),
        Json::Bool(b) => matches!(actual, Value::Boolean(a) if a == b),
        Json::Number(n) => match actual {
            Value::Integer(a) => match n.as_i64() {
                Some(b) => *a == b,
                None => n.as_f64() == Some(*a as f64),
            },
            Value::Real(a) => n.as_f64() == Some(*a),
            _ => false,
        },
        Json::String(s) => match actual {
            Value::String(a) => a == s,
            Value::Symbol(sym) => sym.as_str() == s,
            _ => false,
        },
        Json::Array(_) | Json::Object(_) => false,
    }
}
