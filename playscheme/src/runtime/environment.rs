use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::values::{Symbol, Value};

pub type Env = Arc<Environment>;

/// One lexical frame. Frames are shared by closures, so bindings sit behind a
/// lock and mutation goes through `&self`.
#[derive(Debug, Default)]
pub struct Environment {
    parent: Option<Env>,
    bindings: RwLock<HashMap<Symbol, Value>>,
}

fn poisoned() -> RuntimeError {
    RuntimeError::Internal("environment lock poisoned".to_string())
}

impl Environment {
    pub fn new() -> Env {
        Arc::new(Environment::default())
    }

    pub fn with_parent(parent: Env) -> Env {
        Arc::new(Environment {
            parent: Some(parent),
            bindings: RwLock::new(HashMap::new()),
        })
    }

    pub fn lookup(&self, name: &Symbol) -> RuntimeResult<Value> {
        let mut frame = self;
        loop {
            if let Some(value) = frame.bindings.read().map_err(|_| poisoned())?.get(name) {
                return Ok(value.clone());
            }
            match &frame.parent {
                Some(parent) => frame = parent,
                None => return Err(RuntimeError::UndefinedSymbol(name.0.clone())),
            }
        }
    }

    pub fn define(&self, name: Symbol, value: Value) -> RuntimeResult<()> {
        self.bindings
            .write()
            .map_err(|_| poisoned())?
            .insert(name, value);
        Ok(())
    }

    /// Rebind an existing variable in the nearest frame that has it.
    pub fn set(&self, name: &Symbol, value: Value) -> RuntimeResult<()> {
        let mut frame = self;
        loop {
            {
                let mut bindings = frame.bindings.write().map_err(|_| poisoned())?;
                if let Some(slot) = bindings.get_mut(name) {
                    *slot = value;
                    return Ok(());
                }
            }
            match &frame.parent {
                Some(parent) => frame = parent,
                None => return Err(RuntimeError::UndefinedSymbol(name.0.clone())),
            }
        }
    }

    pub(crate) fn parent(&self) -> Option<&Env> {
        self.parent.as_ref()
    }

    /// Snapshot of the values bound in this frame.
    pub(crate) fn values(&self) -> Vec<Value> {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Remove every binding of this frame and hand them back, so the caller
    /// decides when they are dropped.
    pub(crate) fn clear(&self) -> HashMap<Symbol, Value> {
        std::mem::take(&mut *self.bindings.write().unwrap_or_else(PoisonError::into_inner))
    }
}
