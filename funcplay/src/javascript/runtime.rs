//! One V8 isolate per run.
//!
//! Isolates are `!Send`, so every run happens on its own thread with a
//! single-threaded tokio runtime; the caller awaits the outcome over a
//! oneshot channel. Nothing survives the run, so console capture cannot leak
//! between concurrent submissions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use deno_core::{op2, v8, JsRuntime, OpState, PollEventLoopOptions, RuntimeOptions};

use super::SandboxError;
use crate::config::JavaScriptConfig;
use crate::output::OutputKind;

/// Console lines a run produced, in call order.
#[derive(Debug, Default)]
struct ConsoleCapture(Vec<(OutputKind, String)>);

#[op2(fast)]
fn op_funcplay_console(state: &mut OpState, #[string] kind: String, #[string] line: String) {
    let kind = match kind.as_str() {
        "error" => OutputKind::Error,
        _ => OutputKind::Trace,
    };
    if let Some(capture) = state.try_borrow_mut::<ConsoleCapture>() {
        capture.0.push((kind, line));
    }
}

deno_core::extension!(funcplay_console, ops = [op_funcplay_console]);

/// Installs `console` and the array helpers, locks down code generation and
/// prunes every global that is not on the allow-list. Everything it needs
/// is captured up front because pruning may remove `Object`, `String` or
/// `JSON`. Evaluates to the function that renders the completion value.
const BOOTSTRAP: &str = r#"
((ops, allowed) => {
    const global = globalThis;
    const emit = ops.op_funcplay_console;
    const toText = String;
    const stringify = JSON.stringify;
    const { defineProperty, getOwnPropertyNames, freeze } = Object;
    const arrayMap = Array.prototype.map;
    const arrayFilter = Array.prototype.filter;
    const arrayReduce = Array.prototype.reduce;
    const FunctionPrototype = Function.prototype;
    const AsyncFunction = (async function () {}).constructor;
    const GeneratorFunction = (function* () {}).constructor;

    const render = (args) => arrayMap.call(args, (arg) => toText(arg)).join(' ');
    const provided = {
        console: freeze({
            log: (...args) => emit('trace', render(args)),
            info: (...args) => emit('trace', render(args)),
            debug: (...args) => emit('trace', render(args)),
            error: (...args) => emit('error', 'ERROR: ' + render(args)),
            warn: (...args) => emit('error', 'WARNING: ' + render(args)),
        }),
        map: (list, fn) => arrayMap.call(list, fn),
        filter: (list, fn) => arrayFilter.call(list, fn),
        reduce: (list, fn, ...initial) => arrayReduce.call(list, fn, ...initial),
    };

    const locked = { value: undefined, configurable: false, writable: false };
    defineProperty(FunctionPrototype, 'constructor', locked);
    defineProperty(AsyncFunction.prototype, 'constructor', locked);
    defineProperty(GeneratorFunction.prototype, 'constructor', locked);

    for (const name of getOwnPropertyNames(global)) {
        if (!allowed.includes(name)) {
            try {
                delete global[name];
            } catch (_) {}
        }
    }
    for (const name of getOwnPropertyNames(provided)) {
        if (allowed.includes(name)) {
            defineProperty(global, name, {
                value: provided[name],
                writable: true,
                configurable: true,
                enumerable: false,
            });
        }
    }

    return (value, raw) => {
        if (raw) {
            return typeof value === 'string' ? value : undefined;
        }
        if (value === undefined) {
            return undefined;
        }
        if (typeof value === 'function' || typeof value === 'symbol') {
            return toText(value);
        }
        const json = stringify(value, null, 2);
        return json === undefined ? toText(value) : json;
    };
})"#;

/// A classic script to run in the isolate.
#[derive(Debug, Clone)]
pub(crate) struct Script {
    pub name: &'static str,
    pub source: String,
}

impl Script {
    pub fn submission(code: &str) -> Self {
        Script {
            name: "[funcplay:submission]",
            source: code.to_string(),
        }
    }

    pub fn harness(source: String) -> Self {
        Script {
            name: "[funcplay:harness]",
            source,
        }
    }
}

/// How the completion value of the last script is handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    /// `JSON.stringify(value, null, 2)`, or `String(value)` for values
    /// without a JSON form such as functions.
    Display,
    /// The value itself when it is a string; anything else is dropped.
    Raw,
}

#[derive(Debug)]
pub(crate) struct IsolateRun {
    pub console: Vec<(OutputKind, String)>,
    /// The rendered completion value, `None` for `undefined`.
    pub outcome: Result<Option<String>, SandboxError>,
}

/// Run `scripts` in order in a fresh isolate on a dedicated thread. The
/// outer error covers failures of the thread itself; script failures are
/// reported in [`IsolateRun::outcome`] next to the console lines produced
/// before them.
pub(crate) async fn run_isolated(
    config: &JavaScriptConfig,
    scripts: Vec<Script>,
    completion: Completion,
) -> Result<IsolateRun, SandboxError> {
    let config = config.clone();
    let (tx, rx) = tokio::sync::oneshot::channel();
    std::thread::Builder::new()
        .name("funcplay-js".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    if tx.send(Err(SandboxError::Worker(e.to_string()))).is_err() {
                        tracing::warn!("sandbox result receiver dropped");
                    }
                    return;
                }
            };
            let result = rt.block_on(run_scripts(&config, scripts, completion));
            if tx.send(result).is_err() {
                tracing::warn!("sandbox result receiver dropped before result was sent");
            }
        })
        .map_err(|e| SandboxError::Worker(e.to_string()))?;

    rx.await
        .map_err(|_| SandboxError::Worker("sandbox thread panicked".to_string()))?
}

fn create_runtime(config: &JavaScriptConfig) -> JsRuntime {
    let create_params = v8::CreateParams::default().heap_limits(0, config.max_heap_size_bytes());
    let runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![funcplay_console::init()],
        create_params: Some(create_params),
        ..Default::default()
    });
    runtime.op_state().borrow_mut().put(ConsoleCapture::default());
    runtime
}

/// Prune the global scope and return the completion renderer.
fn bootstrap(
    runtime: &mut JsRuntime,
    allowed_globals: &[String],
) -> Result<v8::Global<v8::Function>, SandboxError> {
    let allowed = serde_json::to_string(allowed_globals)
        .map_err(|e| SandboxError::Worker(e.to_string()))?;
    let renderer = runtime
        .execute_script(
            "[funcplay:bootstrap]",
            format!("{}(Deno.core.ops, {});", BOOTSTRAP, allowed),
        )
        .map_err(|e| SandboxError::Worker(format!("bootstrap failed: {}", e)))?;

    let scope = &mut runtime.handle_scope();
    let local = v8::Local::new(scope, renderer);
    let function = v8::Local::<v8::Function>::try_from(local)
        .map_err(|_| SandboxError::Worker("bootstrap returned no renderer".to_string()))?;
    Ok(v8::Global::new(scope, function))
}

/// Which limit stopped a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Breach {
    Heap,
    Time,
}

struct HeapCeiling {
    handle: v8::IsolateHandle,
    reached: AtomicBool,
}

/// Terminates the isolate as it nears its heap ceiling and grants 1MB so
/// the termination can unwind.
extern "C" fn near_heap_limit_callback(
    data: *mut std::ffi::c_void,
    current_heap_limit: usize,
    _initial_heap_limit: usize,
) -> usize {
    // SAFETY: `data` is the `HeapCeiling` boxed inside `RunLimits`, and
    // `run_scripts` drops the runtime before the limits. Only an atomic and
    // the thread-safe handle are used.
    let ceiling = unsafe { &*(data as *const HeapCeiling) };
    if !ceiling.reached.swap(true, Ordering::SeqCst) {
        ceiling.handle.terminate_execution();
    }
    current_heap_limit + 1024 * 1024
}

/// The heap ceiling and the wall-clock watchdog armed around one run.
///
/// Must be dropped after the runtime it was armed on.
struct RunLimits {
    heap: Box<HeapCeiling>,
    timed_out: Arc<AtomicBool>,
    cancel: Option<mpsc::Sender<()>>,
    watchdog: Option<std::thread::JoinHandle<()>>,
}

impl RunLimits {
    fn arm(runtime: &mut JsRuntime, timeout: Duration) -> Result<Self, SandboxError> {
        // A synchronous loop never yields to the async timeout, so the
        // watchdog terminates the isolate from outside.
        let handle = runtime.v8_isolate().thread_safe_handle();
        let timed_out = Arc::new(AtomicBool::new(false));
        let flag = timed_out.clone();
        let (cancel, cancelled) = mpsc::channel::<()>();
        let watchdog = std::thread::Builder::new()
            .name("funcplay-js-watchdog".to_string())
            .spawn(move || {
                if let Err(mpsc::RecvTimeoutError::Timeout) = cancelled.recv_timeout(timeout) {
                    flag.store(true, Ordering::SeqCst);
                    handle.terminate_execution();
                }
            })
            .map_err(|e| SandboxError::Worker(e.to_string()))?;

        let heap = Box::new(HeapCeiling {
            handle: runtime.v8_isolate().thread_safe_handle(),
            reached: AtomicBool::new(false),
        });
        runtime.v8_isolate().add_near_heap_limit_callback(
            near_heap_limit_callback,
            &*heap as *const HeapCeiling as *mut std::ffi::c_void,
        );

        Ok(RunLimits {
            heap,
            timed_out,
            cancel: Some(cancel),
            watchdog: Some(watchdog),
        })
    }

    fn time_exceeded(&self) {
        self.timed_out.store(true, Ordering::SeqCst);
    }

    /// Stop the watchdog and report which limit, if any, was hit.
    fn disarm(&mut self) -> Option<Breach> {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(watchdog) = self.watchdog.take() {
            let _ = watchdog.join();
        }
        if self.heap.reached.load(Ordering::SeqCst) {
            Some(Breach::Heap)
        } else if self.timed_out.load(Ordering::SeqCst) {
            Some(Breach::Time)
        } else {
            None
        }
    }
}

async fn run_scripts(
    config: &JavaScriptConfig,
    scripts: Vec<Script>,
    completion: Completion,
) -> Result<IsolateRun, SandboxError> {
    let mut runtime = create_runtime(config);
    let renderer = bootstrap(&mut runtime, &config.allowed_globals)?;
    let mut limits = RunLimits::arm(&mut runtime, config.timeout())?;

    let mut last = None;
    let mut failure = None;
    for script in scripts {
        match runtime.execute_script(script.name, script.source) {
            Ok(value) => last = Some(value),
            Err(e) => {
                failure = Some(exception_message(&e.to_string()));
                break;
            }
        }
    }
    if failure.is_none() {
        match tokio::time::timeout(
            config.timeout(),
            runtime.run_event_loop(PollEventLoopOptions::default()),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => failure = Some(exception_message(&e.to_string())),
            Err(_) => limits.time_exceeded(),
        }
    }

    // Rendering runs user `toJSON` code, so it stays under the limits.
    let mut rendered = None;
    if failure.is_none() {
        if let Some(value) = last {
            match render_completion(&mut runtime, &renderer, value, completion) {
                Ok(text) => rendered = text,
                Err(message) => failure = Some(message),
            }
        }
    }

    let breach = limits.disarm();
    let console = runtime
        .op_state()
        .borrow_mut()
        .try_take::<ConsoleCapture>()
        .map(|capture| capture.0)
        .unwrap_or_default();

    let outcome = match (breach, failure) {
        (Some(Breach::Heap), _) => Err(SandboxError::HeapLimitExceeded {
            limit_mb: config.max_heap_size_mb,
        }),
        (Some(Breach::Time), _) => Err(SandboxError::Timeout {
            timeout_ms: config.timeout_ms,
        }),
        (None, Some(message)) => Err(SandboxError::Script { message }),
        (None, None) => Ok(rendered),
    };

    drop(renderer);
    drop(runtime);
    drop(limits);
    Ok(IsolateRun { console, outcome })
}

fn render_completion(
    runtime: &mut JsRuntime,
    renderer: &v8::Global<v8::Function>,
    value: v8::Global<v8::Value>,
    completion: Completion,
) -> Result<Option<String>, String> {
    let scope = &mut runtime.handle_scope();
    let scope = &mut v8::TryCatch::new(scope);
    let function = v8::Local::new(scope, renderer);
    let value = v8::Local::new(scope, value);
    let raw: v8::Local<v8::Value> = v8::Boolean::new(scope, completion == Completion::Raw).into();
    let receiver: v8::Local<v8::Value> = v8::undefined(scope).into();

    match function.call(scope, receiver, &[value, raw]) {
        Some(text) if text.is_string() => Ok(Some(text.to_rust_string_lossy(scope))),
        Some(_) => Ok(None),
        None => {
            let message = match scope.exception() {
                Some(exception) => exception.to_rust_string_lossy(scope),
                None => "result could not be rendered".to_string(),
            };
            Err(exception_message(&message))
        }
    }
}

/// First line of a V8 error report, without the `Uncaught` prefix or the
/// generic `Error:` label.
fn exception_message(report: &str) -> String {
    let line = report.lines().next().unwrap_or_default().trim();
    let line = line.strip_prefix("Uncaught ").unwrap_or(line);
    let line = line.strip_prefix("Error: ").unwrap_or(line);
    line.to_string()
}
