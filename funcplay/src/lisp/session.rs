//! The long-lived interpreter Lisp runs evaluate against.
//!
//! One session owns one interpreter. Definitions persist from call to call,
//! so two unrelated runs against the same session are not isolated from
//! each other. Access is serialized: a run holds the session for its whole
//! duration, and runs queue behind it.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use playscheme::Interpreter;
use thiserror::Error;
use tokio::sync::{oneshot, watch, Mutex};

use super::loader::{EngineLoader, PreludeLoader, SessionInitError};
use crate::config::LispConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Uninitialized,
    Initializing,
    Ready,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Init(#[from] SessionInitError),

    #[error("Lisp evaluation thread failed: {0}")]
    Worker(String),
}

static SHARED: OnceCell<Arc<LispSession>> = OnceCell::new();

pub struct LispSession {
    config: LispConfig,
    loader: Arc<dyn EngineLoader>,
    /// `None` until the first run, and again after a run lost the interpreter.
    interpreter: Mutex<Option<Interpreter>>,
    status: watch::Sender<SessionStatus>,
}

impl LispSession {
    pub fn new(config: LispConfig) -> Self {
        Self::with_loader(config, Arc::new(PreludeLoader))
    }

    pub fn with_loader(config: LispConfig, loader: Arc<dyn EngineLoader>) -> Self {
        let (status, _) = watch::channel(SessionStatus::Uninitialized);
        Self {
            config,
            loader,
            interpreter: Mutex::new(None),
            status,
        }
    }

    /// The process-wide session. The configuration of the first caller wins.
    pub fn shared(config: &LispConfig) -> Arc<LispSession> {
        SHARED
            .get_or_init(|| Arc::new(LispSession::new(config.clone())))
            .clone()
    }

    pub fn config(&self) -> &LispConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Run `job` against the session's interpreter, initializing it first
    /// if needed. The job runs on a dedicated thread with the configured
    /// stack and time budget; a job that panics costs the session its
    /// interpreter, and the next run starts from a fresh one.
    pub async fn run<F, R>(&self, job: F) -> Result<R, SessionError>
    where
        F: FnOnce(&mut Interpreter) -> R + Send + 'static,
        R: Send + 'static,
    {
        let mut slot = self.interpreter.lock().await;
        let interpreter = match slot.take() {
            Some(interpreter) => interpreter,
            None => self.initialize().await?,
        };

        let budget = self.config.timeout();
        let (tx, rx) = oneshot::channel();
        let spawned = std::thread::Builder::new()
            .name("funcplay-lisp".to_string())
            .stack_size(self.config.stack_size_bytes())
            .spawn(move || {
                let mut interpreter = interpreter;
                interpreter.set_time_budget(Some(budget));
                let result = job(&mut interpreter);
                interpreter.set_time_budget(None);
                if tx.send((interpreter, result)).is_err() {
                    tracing::warn!("lisp session receiver dropped before result was sent");
                }
            });
        if let Err(e) = spawned {
            self.status.send_replace(SessionStatus::Uninitialized);
            return Err(SessionError::Worker(e.to_string()));
        }

        match rx.await {
            Ok((interpreter, result)) => {
                *slot = Some(interpreter);
                Ok(result)
            }
            Err(_) => {
                tracing::warn!("lisp evaluation thread panicked; session will re-initialize");
                self.status.send_replace(SessionStatus::Uninitialized);
                Err(SessionError::Worker("evaluation thread panicked".to_string()))
            }
        }
    }

    async fn initialize(&self) -> Result<Interpreter, SessionInitError> {
        self.status.send_replace(SessionStatus::Initializing);
        tracing::debug!(prelude = self.config.load_prelude, "lisp session: initializing");
        match self.loader.load(&self.config).await {
            Ok(interpreter) => {
                self.status.send_replace(SessionStatus::Ready);
                tracing::debug!("lisp session: ready");
                Ok(interpreter)
            }
            Err(e) => {
                self.status.send_replace(SessionStatus::Uninitialized);
                tracing::warn!(error = %e, "lisp session: initialization failed");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for LispSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LispSession")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyLoader {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl EngineLoader for FlakyLoader {
        async fn load(&self, config: &LispConfig) -> Result<Interpreter, SessionInitError> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(SessionInitError::Unavailable("engine not loaded".into()));
            }
            PreludeLoader.load(config).await
        }
    }

    fn small_stack() -> LispConfig {
        LispConfig {
            stack_size_mb: 16,
            ..LispConfig::default()
        }
    }

    #[tokio::test]
    async fn initializes_lazily() {
        let session = LispSession::new(small_stack());
        assert_eq!(session.status(), SessionStatus::Uninitialized);
        let value = session
            .run(|interpreter| interpreter.eval_str("(+ 1 2)").map(|v| v.to_string()))
            .await
            .unwrap();
        assert_eq!(value.unwrap(), "3");
        assert_eq!(session.status(), SessionStatus::Ready);
    }

    #[tokio::test]
    async fn failed_initialization_is_retried_on_the_next_run() {
        let session = LispSession::with_loader(
            small_stack(),
            Arc::new(FlakyLoader {
                attempts: AtomicUsize::new(0),
            }),
        );
        let first = session.run(|_| ()).await;
        assert!(matches!(first, Err(SessionError::Init(_))));
        assert_eq!(session.status(), SessionStatus::Uninitialized);

        assert!(session.run(|_| ()).await.is_ok());
        assert_eq!(session.status(), SessionStatus::Ready);
    }

    #[tokio::test]
    async fn a_panicking_job_resets_the_session() {
        let session = LispSession::new(small_stack());
        session
            .run(|interpreter| interpreter.eval_str("(define kept 1)").map(|_| ()))
            .await
            .unwrap()
            .unwrap();

        let lost = session.run(|_| -> () { panic!("job failed") }).await;
        assert!(matches!(lost, Err(SessionError::Worker(_))));
        assert_eq!(session.status(), SessionStatus::Uninitialized);

        let rebound = session
            .run(|interpreter| interpreter.lookup("kept").is_some())
            .await
            .unwrap();
        assert!(!rebound);
    }

    #[tokio::test]
    async fn definitions_persist_between_runs() {
        let session = LispSession::new(small_stack());
        session
            .run(|interpreter| interpreter.eval_str("(define (square x) (* x x))").map(|_| ()))
            .await
            .unwrap()
            .unwrap();
        let value = session
            .run(|interpreter| interpreter.eval_str("(square 5)").map(|v| v.to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value, "25");
    }
}
