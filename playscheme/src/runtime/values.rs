// Runtime value system for PlayScheme
// Programs are read into these values and evaluated as data.

use std::fmt;
use std::sync::Arc;

use crate::runtime::environment::Env;
use crate::runtime::error::RuntimeResult;
use crate::runtime::evaluator::Evaluator;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Symbol(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    /// The empty list.
    Nil,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(String),
    Char(char),
    Symbol(Symbol),
    Pair(Arc<Pair>),
    Procedure(Procedure),
    Unspecified,
}

#[derive(Debug)]
pub struct Pair {
    pub car: Value,
    pub cdr: Value,
}

// Nesting along either the car or the cdr would otherwise be dropped
// recursively.
impl Drop for Pair {
    fn drop(&mut self) {
        if !matches!(self.car, Value::Pair(_)) && !matches!(self.cdr, Value::Pair(_)) {
            return;
        }
        let mut pending = vec![
            std::mem::replace(&mut self.car, Value::Nil),
            std::mem::replace(&mut self.cdr, Value::Nil),
        ];
        while let Some(value) = pending.pop() {
            if let Value::Pair(pair) = value {
                if let Ok(mut owned) = Arc::try_unwrap(pair) {
                    pending.push(std::mem::replace(&mut owned.car, Value::Nil));
                    pending.push(std::mem::replace(&mut owned.cdr, Value::Nil));
                }
            }
        }
    }
}

pub type BuiltinFn = fn(&mut Evaluator, Vec<Value>) -> RuntimeResult<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    Variadic(usize),
    Range(usize, usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Fixed(n) => count == n,
            Arity::Variadic(min) => count >= min,
            Arity::Range(min, max) => count >= min && count <= max,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Arity::Fixed(n) => write!(f, "{}", n),
            Arity::Variadic(min) => write!(f, "at least {}", min),
            Arity::Range(min, max) => write!(f, "{} to {}", min, max),
        }
    }
}

pub struct Builtin {
    pub name: String,
    pub arity: Arity,
    pub func: BuiltinFn,
}

pub struct Lambda {
    pub name: Option<String>,
    pub params: Vec<Symbol>,
    pub rest: Option<Symbol>,
    pub body: Vec<Value>,
    pub env: Env,
}

impl Lambda {
    pub fn arity(&self) -> Arity {
        match self.rest {
            Some(_) => Arity::Variadic(self.params.len()),
            None => Arity::Fixed(self.params.len()),
        }
    }
}

#[derive(Clone)]
pub enum Procedure {
    Builtin(Arc<Builtin>),
    Lambda(Arc<Lambda>),
}

impl Procedure {
    pub fn name(&self) -> Option<&str> {
        match self {
            Procedure::Builtin(b) => Some(&b.name),
            Procedure::Lambda(l) => l.name.as_deref(),
        }
    }

    pub fn ptr_eq(&self, other: &Procedure) -> bool {
        match (self, other) {
            (Procedure::Builtin(a), Procedure::Builtin(b)) => Arc::ptr_eq(a, b),
            (Procedure::Lambda(a), Procedure::Lambda(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Builtin(b) => write!(f, "Builtin({})", b.name),
            Procedure::Lambda(l) => write!(
                f,
                "Lambda({}, params: {:?})",
                l.name.as_deref().unwrap_or("anonymous"),
                l.params
            ),
        }
    }
}

/// Structural equality (`equal?`); exact and inexact numbers never compare equal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self, other)];
        while let Some((a, b)) = pending.pop() {
            match (a, b) {
                (Value::Pair(x), Value::Pair(y)) => {
                    if !Arc::ptr_eq(x, y) {
                        pending.push((&x.cdr, &y.cdr));
                        pending.push((&x.car, &y.car));
                    }
                }
                _ => {
                    if !a.eqv(b) {
                        return false;
                    }
                }
            }
        }
        true
    }
}

impl Value {
    pub fn symbol(name: &str) -> Value {
        Value::Symbol(Symbol::new(name))
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    pub fn cons(car: Value, cdr: Value) -> Value {
        Value::Pair(Arc::new(Pair { car, cdr }))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::list_with_tail(items, Value::Nil)
    }

    pub fn list_with_tail(items: Vec<Value>, tail: Value) -> Value {
        items
            .into_iter()
            .rev()
            .fold(tail, |acc, item| Value::cons(item, acc))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Only `#f` is false.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false))
    }

    pub fn is_unspecified(&self) -> bool {
        matches!(self, Value::Unspecified)
    }

    pub fn as_pair(&self) -> Option<&Pair> {
        match self {
            Value::Pair(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_symbol(&self, name: &str) -> bool {
        matches!(self, Value::Symbol(s) if s.0 == name)
    }

    /// Items of a proper list, or `None` for anything else.
    pub fn list_to_vec(&self) -> Option<Vec<Value>> {
        let mut items = Vec::new();
        let mut cursor = self;
        loop {
            match cursor {
                Value::Nil => return Some(items),
                Value::Pair(p) => {
                    items.push(p.car.clone());
                    cursor = &p.cdr;
                }
                _ => return None,
            }
        }
    }

    pub fn is_list(&self) -> bool {
        let mut cursor = self;
        loop {
            match cursor {
                Value::Nil => return true,
                Value::Pair(p) => cursor = &p.cdr,
                _ => return false,
            }
        }
    }

    /// `eqv?`: identity for pairs and procedures, value equality for atoms.
    pub fn eqv(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Unspecified, Value::Unspecified) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Pair(a), Value::Pair(b)) => Arc::ptr_eq(a, b),
            (Value::Procedure(a), Value::Procedure(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "empty list",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::String(_) => "string",
            Value::Char(_) => "character",
            Value::Symbol(_) => "symbol",
            Value::Pair(_) => "pair",
            Value::Procedure(_) => "procedure",
            Value::Unspecified => "unspecified",
        }
    }

    /// `write`-style rendering: strings quoted, characters as `#\c`.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        render(self, &mut out, true);
        out
    }

    /// Convert JSON test data into Scheme data: arrays become lists, objects
    /// become association lists and `null` becomes the empty list.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::list(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::list(
                map.iter()
                    .map(|(k, v)| Value::cons(Value::symbol(k), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

fn render_real(r: f64, out: &mut String) {
    if r.is_nan() {
        out.push_str("+nan.0");
    } else if r.is_infinite() {
        out.push_str(if r > 0.0 { "+inf.0" } else { "-inf.0" });
    } else {
        out.push_str(&format!("{:?}", r));
    }
}

fn render_char(c: char, out: &mut String) {
    out.push_str("#\\");
    match c {
        ' ' => out.push_str("space"),
        '\n' => out.push_str("newline"),
        '\t' => out.push_str("tab"),
        '\r' => out.push_str("return"),
        '\0' => out.push_str("nul"),
        _ => out.push(c),
    }
}

fn render_atom(value: &Value, out: &mut String, quoted: bool) {
    match value {
        Value::Nil => out.push_str("()"),
        Value::Boolean(true) => out.push_str("#t"),
        Value::Boolean(false) => out.push_str("#f"),
        Value::Integer(i) => out.push_str(&i.to_string()),
        Value::Real(r) => render_real(*r, out),
        Value::String(s) if quoted => out.push_str(&format!("{:?}", s)),
        Value::String(s) => out.push_str(s),
        Value::Char(c) if quoted => render_char(*c, out),
        Value::Char(c) => out.push(*c),
        Value::Symbol(s) => out.push_str(&s.0),
        Value::Procedure(p) => match p.name() {
            Some(name) => out.push_str(&format!("#<procedure {}>", name)),
            None => out.push_str("#<procedure>"),
        },
        Value::Unspecified | Value::Pair(_) => {}
    }
}

enum Piece<'a> {
    Value(&'a Value),
    /// What follows a list element: more elements, a dotted tail or `)`.
    Rest(&'a Value),
    Close,
}

// Walks an explicit stack so nesting depth is bounded by memory only.
fn render(value: &Value, out: &mut String, quoted: bool) {
    let mut pending = vec![Piece::Value(value)];
    while let Some(piece) = pending.pop() {
        match piece {
            Piece::Value(Value::Pair(p)) => {
                out.push('(');
                pending.push(Piece::Rest(&p.cdr));
                pending.push(Piece::Value(&p.car));
            }
            Piece::Value(atom) => render_atom(atom, out, quoted),
            Piece::Rest(Value::Nil) | Piece::Close => out.push(')'),
            Piece::Rest(Value::Pair(p)) => {
                out.push(' ');
                pending.push(Piece::Rest(&p.cdr));
                pending.push(Piece::Value(&p.car));
            }
            Piece::Rest(tail) => {
                out.push_str(" . ");
                pending.push(Piece::Close);
                pending.push(Piece::Value(tail));
            }
        }
    }
}

/// Display-style rendering.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        render(self, &mut out, false);
        f.write_str(&out)
    }
}
