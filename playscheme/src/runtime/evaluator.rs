// PlayScheme Evaluator - evaluates data directly, with proper tail calls

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crate::runtime::environment::{Env, Environment};
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::values::{Lambda, Pair, Procedure, Symbol, Value};

pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 10_000;

// Evaluation steps between clock reads.
const DEADLINE_CHECK_INTERVAL: u32 = 1024;

// Remaining stack that triggers growth, and the size of each new segment.
const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

// Tracked frames are pruned of dead entries whenever the list doubles.
const MIN_PRUNE_AT: usize = 1024;

const SPECIAL_FORMS: &[&str] = &[
    "quote",
    "quasiquote",
    "if",
    "define",
    "set!",
    "lambda",
    "let",
    "let*",
    "letrec",
    "letrec*",
    "begin",
    "cond",
    "case",
    "and",
    "or",
    "when",
    "unless",
    "do",
];

pub fn is_special_form(name: &str) -> bool {
    SPECIAL_FORMS.contains(&name)
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    budget_ms: u64,
}

/// Result of one evaluation step: either a finished value or an expression
/// to continue with in tail position.
enum Step {
    Done(Value),
    Tail(Value, Env),
}

pub struct Evaluator {
    global: Env,
    output: String,
    recursion_depth: usize,
    max_recursion_depth: usize,
    deadline: Option<Deadline>,
    countdown: u32,
    /// Every frame created below the global one, for cycle collection.
    frames: Vec<Weak<Environment>>,
    prune_at: usize,
}

impl Evaluator {
    pub fn new(global: Env) -> Self {
        Evaluator {
            global,
            output: String::new(),
            recursion_depth: 0,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            deadline: None,
            countdown: DEADLINE_CHECK_INTERVAL,
            frames: Vec::new(),
            prune_at: MIN_PRUNE_AT,
        }
    }

    pub fn global(&self) -> &Env {
        &self.global
    }

    pub fn set_max_recursion_depth(&mut self, depth: usize) {
        self.max_recursion_depth = depth;
    }

    pub fn max_recursion_depth(&self) -> usize {
        self.max_recursion_depth
    }

    /// Start (or clear) the wall-clock budget for the evaluations that follow.
    pub fn set_time_budget(&mut self, budget: Option<Duration>) {
        self.deadline = budget.map(|budget| Deadline {
            at: Instant::now() + budget,
            budget_ms: budget.as_millis() as u64,
        });
        self.countdown = 0;
    }

    pub fn write_output(&mut self, text: &str) {
        self.output.push_str(text);
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Release frames kept alive only by reference cycles, such as a named
    /// `let` whose loop procedure is bound in the frame it closes over.
    ///
    /// A frame survives when it is reachable from the global environment or
    /// from `roots`; any other value the host still holds from an earlier
    /// evaluation must be passed in `roots`. Returns how many frames were
    /// released.
    pub fn collect_cycles(&mut self, roots: &[&Value]) -> usize {
        self.frames.retain(|frame| frame.strong_count() > 0);
        if self.frames.is_empty() {
            return 0;
        }
        let reachable = reachable_frames(&self.global, roots);
        let mut released = Vec::new();
        for frame in self.frames.iter().filter_map(Weak::upgrade) {
            if !reachable.contains(&Arc::as_ptr(&frame)) {
                released.push(frame.clear());
            }
        }
        let count = released.len();
        drop(released);
        self.frames.retain(|frame| frame.strong_count() > 0);
        self.prune_at = (self.frames.len() * 2).max(MIN_PRUNE_AT);
        count
    }

    fn frame(&mut self, parent: &Env) -> Env {
        if self.frames.len() >= self.prune_at {
            self.frames.retain(|frame| frame.strong_count() > 0);
            self.prune_at = (self.frames.len() * 2).max(MIN_PRUNE_AT);
        }
        let frame = Environment::with_parent(parent.clone());
        self.frames.push(Arc::downgrade(&frame));
        frame
    }

    fn bind_arguments(&mut self, lambda: &Lambda, mut args: Vec<Value>) -> RuntimeResult<Env> {
        let arity = lambda.arity();
        if !arity.accepts(args.len()) {
            return Err(RuntimeError::ArityMismatch {
                function: lambda.name.clone().unwrap_or_else(|| "lambda".to_string()),
                expected: arity.to_string(),
                actual: args.len(),
            });
        }
        let frame = self.frame(&lambda.env);
        let rest = args.split_off(lambda.params.len());
        for (param, value) in lambda.params.iter().zip(args) {
            frame.define(param.clone(), value)?;
        }
        if let Some(rest_param) = &lambda.rest {
            frame.define(rest_param.clone(), Value::list(rest))?;
        }
        Ok(frame)
    }

    pub fn eval_global(&mut self, expr: &Value) -> RuntimeResult<Value> {
        let env = self.global.clone();
        self.eval(expr, &env)
    }

    pub fn eval(&mut self, expr: &Value, env: &Env) -> RuntimeResult<Value> {
        match expr {
            Value::Symbol(s) => return env.lookup(s),
            Value::Pair(_) => {}
            Value::Nil => return Err(RuntimeError::bad_syntax("()", "empty combination")),
            other => return Ok(other.clone()),
        }
        self.enter()?;
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.eval_loop(expr.clone(), env.clone())
        });
        self.recursion_depth -= 1;
        result
    }

    /// Call a procedure value with already evaluated arguments.
    pub fn apply(&mut self, procedure: &Value, args: Vec<Value>) -> RuntimeResult<Value> {
        self.enter()?;
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            match self.call(procedure.clone(), args) {
                Ok(Step::Done(value)) => Ok(value),
                Ok(Step::Tail(expr, env)) => self.eval_loop(expr, env),
                Err(e) => Err(e),
            }
        });
        self.recursion_depth -= 1;
        result
    }

    fn enter(&mut self) -> RuntimeResult<()> {
        if self.recursion_depth >= self.max_recursion_depth {
            return Err(RuntimeError::RecursionLimit(self.max_recursion_depth));
        }
        self.recursion_depth += 1;
        Ok(())
    }

    fn tick(&mut self) -> RuntimeResult<()> {
        let Some(deadline) = self.deadline else {
            return Ok(());
        };
        if self.countdown > 0 {
            self.countdown -= 1;
            return Ok(());
        }
        self.countdown = DEADLINE_CHECK_INTERVAL;
        if Instant::now() >= deadline.at {
            return Err(RuntimeError::Timeout(deadline.budget_ms));
        }
        Ok(())
    }

    fn eval_loop(&mut self, mut expr: Value, mut env: Env) -> RuntimeResult<Value> {
        loop {
            self.tick()?;
            let pair = match &expr {
                Value::Symbol(s) => return env.lookup(s),
                Value::Pair(pair) => pair.clone(),
                Value::Nil => return Err(RuntimeError::bad_syntax("()", "empty combination")),
                other => return Ok(other.clone()),
            };
            let step = match &pair.car {
                Value::Symbol(s) if is_special_form(s.as_str()) => {
                    self.eval_special(s.as_str(), &pair.cdr, &env)?
                }
                _ => self.eval_application(&pair, &env)?,
            };
            match step {
                Step::Done(value) => return Ok(value),
                Step::Tail(next, next_env) => {
                    expr = next;
                    env = next_env;
                }
            }
        }
    }

    fn eval_application(&mut self, pair: &Pair, env: &Env) -> RuntimeResult<Step> {
        let callee = self.eval(&pair.car, env)?;
        let mut args = Vec::new();
        let mut cursor = &pair.cdr;
        loop {
            match cursor {
                Value::Nil => break,
                Value::Pair(p) => {
                    args.push(self.eval(&p.car, env)?);
                    cursor = &p.cdr;
                }
                _ => {
                    return Err(RuntimeError::bad_syntax(
                        "application",
                        "improper argument list",
                    ))
                }
            }
        }
        self.call(callee, args)
    }

    fn call(&mut self, callee: Value, args: Vec<Value>) -> RuntimeResult<Step> {
        match callee {
            Value::Procedure(Procedure::Lambda(lambda)) => {
                let frame = self.bind_arguments(&lambda, args)?;
                self.eval_body(&lambda.body, frame)
            }
            Value::Procedure(Procedure::Builtin(builtin)) => {
                if !builtin.arity.accepts(args.len()) {
                    return Err(RuntimeError::ArityMismatch {
                        function: builtin.name.clone(),
                        expected: builtin.arity.to_string(),
                        actual: args.len(),
                    });
                }
                Ok(Step::Done((builtin.func)(self, args)?))
            }
            other => Err(RuntimeError::NotCallable(other.repr())),
        }
    }

    fn eval_body(&mut self, body: &[Value], env: Env) -> RuntimeResult<Step> {
        match body.split_last() {
            None => Ok(Step::Done(Value::Unspecified)),
            Some((last, init)) => {
                for expr in init {
                    self.eval(expr, &env)?;
                }
                Ok(Step::Tail(last.clone(), env))
            }
        }
    }

    fn eval_special(&mut self, form: &str, operands: &Value, env: &Env) -> RuntimeResult<Step> {
        let args = operands
            .list_to_vec()
            .ok_or_else(|| RuntimeError::bad_syntax(form, "improper form"))?;
        match form {
            "quote" => {
                expect_count(form, &args, 1)?;
                Ok(Step::Done(args[0].clone()))
            }
            "quasiquote" => {
                expect_count(form, &args, 1)?;
                Ok(Step::Done(self.quasi(&args[0], env, 1)?))
            }
            "if" => self.eval_if(&args, env),
            "define" => self.eval_define(&args, env),
            "set!" => self.eval_set(&args, env),
            "lambda" => {
                let (params, body) = args
                    .split_first()
                    .ok_or_else(|| RuntimeError::bad_syntax(form, "missing parameters"))?;
                Ok(Step::Done(make_lambda(None, params, body, env)?))
            }
            "begin" => self.eval_body(&args, env.clone()),
            "let" => self.eval_let(&args, env),
            "let*" => self.eval_let_star(&args, env),
            "letrec" | "letrec*" => self.eval_letrec(form, &args, env),
            "cond" => self.eval_cond(&args, env),
            "case" => self.eval_case(&args, env),
            "and" => self.eval_and_or(&args, env, true),
            "or" => self.eval_and_or(&args, env, false),
            "when" | "unless" => {
                let (test, body) = args
                    .split_first()
                    .ok_or_else(|| RuntimeError::bad_syntax(form, "missing test"))?;
                let truthy = self.eval(test, env)?.is_truthy();
                if truthy == (form == "when") {
                    self.eval_body(body, env.clone())
                } else {
                    Ok(Step::Done(Value::Unspecified))
                }
            }
            "do" => self.eval_do(&args, env),
            other => Err(RuntimeError::bad_syntax(other, "unknown special form")),
        }
    }

    fn eval_if(&mut self, args: &[Value], env: &Env) -> RuntimeResult<Step> {
        if args.len() != 2 && args.len() != 3 {
            return Err(RuntimeError::bad_syntax("if", "expected (if test then [else])"));
        }
        if self.eval(&args[0], env)?.is_truthy() {
            Ok(Step::Tail(args[1].clone(), env.clone()))
        } else if let Some(alternative) = args.get(2) {
            Ok(Step::Tail(alternative.clone(), env.clone()))
        } else {
            Ok(Step::Done(Value::Unspecified))
        }
    }

    fn eval_define(&mut self, args: &[Value], env: &Env) -> RuntimeResult<Step> {
        let (target, rest) = args
            .split_first()
            .ok_or_else(|| RuntimeError::bad_syntax("define", "missing name"))?;
        match target {
            Value::Symbol(name) => {
                let value = match rest {
                    [] => Value::Unspecified,
                    [expr] => self.eval_named(name, expr, env)?,
                    _ => return Err(RuntimeError::bad_syntax("define", "too many operands")),
                };
                env.define(name.clone(), value)?;
            }
            Value::Pair(signature) => {
                let name = signature
                    .car
                    .as_symbol()
                    .ok_or_else(|| RuntimeError::bad_syntax("define", "procedure name must be a symbol"))?;
                let lambda = make_lambda(Some(name.0.clone()), &signature.cdr, rest, env)?;
                env.define(name.clone(), lambda)?;
            }
            other => {
                return Err(RuntimeError::bad_syntax(
                    "define",
                    format!("cannot define {}", other.type_name()),
                ))
            }
        }
        Ok(Step::Done(Value::Unspecified))
    }

    // Evaluate an initializer, naming it when it is a literal lambda form.
    fn eval_named(&mut self, name: &Symbol, expr: &Value, env: &Env) -> RuntimeResult<Value> {
        if let Value::Pair(form) = expr {
            if form.car.is_symbol("lambda") {
                let parts = form
                    .cdr
                    .list_to_vec()
                    .ok_or_else(|| RuntimeError::bad_syntax("lambda", "improper form"))?;
                if let Some((params, body)) = parts.split_first() {
                    return make_lambda(Some(name.0.clone()), params, body, env);
                }
            }
        }
        self.eval(expr, env)
    }

    fn eval_set(&mut self, args: &[Value], env: &Env) -> RuntimeResult<Step> {
        expect_count("set!", args, 2)?;
        let name = args[0]
            .as_symbol()
            .ok_or_else(|| RuntimeError::bad_syntax("set!", "target must be a symbol"))?;
        let value = self.eval(&args[1], env)?;
        env.set(name, value)?;
        Ok(Step::Done(Value::Unspecified))
    }

    fn eval_let(&mut self, args: &[Value], env: &Env) -> RuntimeResult<Step> {
        if let Some(Value::Symbol(name)) = args.first() {
            return self.eval_named_let(name, &args[1..], env);
        }
        let (bindings, body) = split_let("let", args)?;
        let frame = self.frame(env);
        for (name, init) in bindings {
            let value = self.eval_named(&name, &init, env)?;
            frame.define(name, value)?;
        }
        self.eval_body(body, frame)
    }

    fn eval_named_let(&mut self, name: &Symbol, args: &[Value], env: &Env) -> RuntimeResult<Step> {
        let (bindings, body) = split_let("let", args)?;
        let loop_env = self.frame(env);
        let mut params = Vec::with_capacity(bindings.len());
        let mut values = Vec::with_capacity(bindings.len());
        for (param, init) in bindings {
            values.push(self.eval(&init, env)?);
            params.push(param);
        }
        let lambda = Arc::new(Lambda {
            name: Some(name.0.clone()),
            params,
            rest: None,
            body: body.to_vec(),
            env: loop_env.clone(),
        });
        loop_env.define(name.clone(), Value::Procedure(Procedure::Lambda(lambda.clone())))?;
        let frame = self.bind_arguments(&lambda, values)?;
        self.eval_body(&lambda.body, frame)
    }

    fn eval_let_star(&mut self, args: &[Value], env: &Env) -> RuntimeResult<Step> {
        let (bindings, body) = split_let("let*", args)?;
        let mut current = self.frame(env);
        for (name, init) in bindings {
            let value = self.eval_named(&name, &init, &current)?;
            let next = self.frame(&current);
            next.define(name, value)?;
            current = next;
        }
        self.eval_body(body, current)
    }

    fn eval_letrec(&mut self, form: &str, args: &[Value], env: &Env) -> RuntimeResult<Step> {
        let (bindings, body) = split_let(form, args)?;
        let frame = self.frame(env);
        for (name, _) in &bindings {
            frame.define(name.clone(), Value::Unspecified)?;
        }
        for (name, init) in bindings {
            let value = self.eval_named(&name, &init, &frame)?;
            frame.define(name, value)?;
        }
        self.eval_body(body, frame)
    }

    fn eval_cond(&mut self, clauses: &[Value], env: &Env) -> RuntimeResult<Step> {
        for clause in clauses {
            let items = clause
                .list_to_vec()
                .filter(|items| !items.is_empty())
                .ok_or_else(|| RuntimeError::bad_syntax("cond", "clause must be a non-empty list"))?;
            if items[0].is_symbol("else") {
                return self.eval_body(&items[1..], env.clone());
            }
            let test = self.eval(&items[0], env)?;
            if !test.is_truthy() {
                continue;
            }
            return match &items[1..] {
                [] => Ok(Step::Done(test)),
                [arrow, receiver] if arrow.is_symbol("=>") => {
                    let receiver = self.eval(receiver, env)?;
                    self.call(receiver, vec![test])
                }
                body => self.eval_body(body, env.clone()),
            };
        }
        Ok(Step::Done(Value::Unspecified))
    }

    fn eval_case(&mut self, args: &[Value], env: &Env) -> RuntimeResult<Step> {
        let (key, clauses) = args
            .split_first()
            .ok_or_else(|| RuntimeError::bad_syntax("case", "missing key"))?;
        let key = self.eval(key, env)?;
        for clause in clauses {
            let items = clause
                .list_to_vec()
                .filter(|items| !items.is_empty())
                .ok_or_else(|| RuntimeError::bad_syntax("case", "clause must be a non-empty list"))?;
            let matched = if items[0].is_symbol("else") {
                true
            } else {
                items[0]
                    .list_to_vec()
                    .ok_or_else(|| RuntimeError::bad_syntax("case", "clause data must be a list"))?
                    .iter()
                    .any(|datum| datum.eqv(&key))
            };
            if matched {
                return self.eval_body(&items[1..], env.clone());
            }
        }
        Ok(Step::Done(Value::Unspecified))
    }

    fn eval_and_or(&mut self, args: &[Value], env: &Env, is_and: bool) -> RuntimeResult<Step> {
        let Some((last, init)) = args.split_last() else {
            return Ok(Step::Done(Value::Boolean(is_and)));
        };
        for expr in init {
            let value = self.eval(expr, env)?;
            if value.is_truthy() != is_and {
                return Ok(Step::Done(value));
            }
        }
        Ok(Step::Tail(last.clone(), env.clone()))
    }

    fn eval_do(&mut self, args: &[Value], env: &Env) -> RuntimeResult<Step> {
        if args.len() < 2 {
            return Err(RuntimeError::bad_syntax("do", "expected (do (specs) (test result) body)"));
        }
        let specs = args[0]
            .list_to_vec()
            .ok_or_else(|| RuntimeError::bad_syntax("do", "variable specs must be a list"))?;
        let exit = args[1]
            .list_to_vec()
            .filter(|items| !items.is_empty())
            .ok_or_else(|| RuntimeError::bad_syntax("do", "exit clause must be a non-empty list"))?;
        let body = &args[2..];

        let mut vars = Vec::with_capacity(specs.len());
        let mut frame = self.frame(env);
        for spec in specs {
            let parts = spec.list_to_vec().unwrap_or_default();
            let name = match parts.first() {
                Some(Value::Symbol(name)) if (2..=3).contains(&parts.len()) => name.clone(),
                _ => return Err(RuntimeError::bad_syntax("do", "bad variable spec")),
            };
            frame.define(name.clone(), self.eval(&parts[1], env)?)?;
            vars.push((name, parts.get(2).cloned()));
        }

        loop {
            self.tick()?;
            if self.eval(&exit[0], &frame)?.is_truthy() {
                return self.eval_body(&exit[1..], frame);
            }
            for expr in body {
                self.eval(expr, &frame)?;
            }
            let next = self.frame(env);
            for (name, step) in &vars {
                let value = match step {
                    Some(step) => self.eval(step, &frame)?,
                    None => frame.lookup(name)?,
                };
                next.define(name.clone(), value)?;
            }
            frame = next;
        }
    }

    fn quasi(&mut self, template: &Value, env: &Env, depth: usize) -> RuntimeResult<Value> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.quasi_inner(template, env, depth)
        })
    }

    fn quasi_inner(&mut self, template: &Value, env: &Env, depth: usize) -> RuntimeResult<Value> {
        let Value::Pair(pair) = template else {
            return Ok(template.clone());
        };
        if pair.car.is_symbol("unquote") {
            let operand = single_operand("unquote", &pair.cdr)?;
            if depth == 1 {
                return self.eval(&operand, env);
            }
            let inner = self.quasi(&operand, env, depth - 1)?;
            return Ok(Value::list(vec![Value::symbol("unquote"), inner]));
        }
        if pair.car.is_symbol("quasiquote") {
            let operand = single_operand("quasiquote", &pair.cdr)?;
            let inner = self.quasi(&operand, env, depth + 1)?;
            return Ok(Value::list(vec![Value::symbol("quasiquote"), inner]));
        }

        let mut items = Vec::new();
        let mut cursor = template.clone();
        let tail = loop {
            let Value::Pair(p) = &cursor else {
                break self.quasi(&cursor, env, depth)?;
            };
            if !items.is_empty() && (p.car.is_symbol("unquote") || p.car.is_symbol("quasiquote")) {
                // `(a . ,b)` reads as `(a unquote b)`
                break self.quasi(&cursor, env, depth)?;
            }
            if let Value::Pair(inner) = &p.car {
                if depth == 1 && inner.car.is_symbol("unquote-splicing") {
                    let operand = single_operand("unquote-splicing", &inner.cdr)?;
                    let spliced = self.eval(&operand, env)?;
                    let parts = spliced
                        .list_to_vec()
                        .ok_or_else(|| RuntimeError::type_error("list", &spliced, "unquote-splicing"))?;
                    items.extend(parts);
                    let next = p.cdr.clone();
                    cursor = next;
                    continue;
                }
            }
            items.push(self.quasi(&p.car, env, depth)?);
            let next = p.cdr.clone();
            cursor = next;
        };
        Ok(Value::list_with_tail(items, tail))
    }
}

fn expect_count(form: &str, args: &[Value], count: usize) -> RuntimeResult<()> {
    if args.len() != count {
        return Err(RuntimeError::bad_syntax(
            form,
            format!("expected {} operand(s), got {}", count, args.len()),
        ));
    }
    Ok(())
}

fn single_operand(form: &str, operands: &Value) -> RuntimeResult<Value> {
    let items = operands
        .list_to_vec()
        .ok_or_else(|| RuntimeError::bad_syntax(form, "improper form"))?;
    expect_count(form, &items, 1)?;
    Ok(items[0].clone())
}

type Bindings = Vec<(Symbol, Value)>;

fn split_let<'a>(form: &str, args: &'a [Value]) -> RuntimeResult<(Bindings, &'a [Value])> {
    let (bindings, body) = args
        .split_first()
        .ok_or_else(|| RuntimeError::bad_syntax(form, "missing bindings"))?;
    if body.is_empty() {
        return Err(RuntimeError::bad_syntax(form, "empty body"));
    }
    let specs = bindings
        .list_to_vec()
        .ok_or_else(|| RuntimeError::bad_syntax(form, "bindings must be a list"))?;
    let mut parsed = Vec::with_capacity(specs.len());
    for spec in specs {
        let parts = spec.list_to_vec().unwrap_or_default();
        match parts.as_slice() {
            [Value::Symbol(name), init] => parsed.push((name.clone(), init.clone())),
            [Value::Symbol(name)] => parsed.push((name.clone(), Value::Unspecified)),
            _ => return Err(RuntimeError::bad_syntax(form, format!("bad binding {}", spec.repr()))),
        }
    }
    Ok((parsed, body))
}

fn make_lambda(name: Option<String>, params: &Value, body: &[Value], env: &Env) -> RuntimeResult<Value> {
    if body.is_empty() {
        return Err(RuntimeError::bad_syntax("lambda", "empty body"));
    }
    let mut fixed = Vec::new();
    let mut rest = None;
    let mut cursor = params;
    loop {
        match cursor {
            Value::Nil => break,
            Value::Symbol(s) => {
                rest = Some(s.clone());
                break;
            }
            Value::Pair(p) => {
                let param = p
                    .car
                    .as_symbol()
                    .ok_or_else(|| RuntimeError::bad_syntax("lambda", "parameters must be symbols"))?;
                fixed.push(param.clone());
                cursor = &p.cdr;
            }
            other => {
                return Err(RuntimeError::bad_syntax(
                    "lambda",
                    format!("bad parameter list {}", other.repr()),
                ))
            }
        }
    }
    Ok(Value::Procedure(Procedure::Lambda(Arc::new(Lambda {
        name,
        params: fixed,
        rest,
        body: body.to_vec(),
        env: env.clone(),
    }))))
}

/// Frames reachable from `global` or `roots` through bindings, closures and
/// list structure.
fn reachable_frames(global: &Env, roots: &[&Value]) -> HashSet<*const Environment> {
    let mut frames = HashSet::new();
    let mut pairs: HashSet<*const Pair> = HashSet::new();
    let mut pending_frames = vec![global.clone()];
    let mut pending_values: Vec<Value> = roots.iter().map(|value| (*value).clone()).collect();
    loop {
        if let Some(value) = pending_values.pop() {
            match value {
                Value::Pair(pair) => {
                    if pairs.insert(Arc::as_ptr(&pair)) {
                        pending_values.push(pair.car.clone());
                        pending_values.push(pair.cdr.clone());
                    }
                }
                Value::Procedure(Procedure::Lambda(lambda)) => {
                    pending_frames.push(lambda.env.clone());
                }
                _ => {}
            }
        } else if let Some(frame) = pending_frames.pop() {
            if frames.insert(Arc::as_ptr(&frame)) {
                pending_values.extend(frame.values());
                if let Some(parent) = frame.parent() {
                    pending_frames.push(parent.clone());
                }
            }
        } else {
            return frames;
        }
    }
}
