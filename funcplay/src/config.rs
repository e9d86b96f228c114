use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap());

/// Whether `name` can be referenced as a plain JavaScript identifier.
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub javascript: JavaScriptConfig,
    pub lisp: LispConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JavaScriptConfig {
    pub timeout_ms: u64,
    /// Bytes; larger sources are rejected before execution.
    pub max_code_size: usize,
    pub max_heap_size_mb: usize,
    /// Simultaneous isolates; further runs wait for a slot.
    pub max_concurrent: usize,
    pub allowed_globals: Vec<String>,
    /// Tried in order when a test run names no entry point.
    pub entry_point_candidates: Vec<String>,
}

impl Default for JavaScriptConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            max_code_size: 64 * 1024,
            max_heap_size_mb: 64,
            max_concurrent: 4,
            allowed_globals: DEFAULT_ALLOWED_GLOBALS.iter().map(|s| s.to_string()).collect(),
            entry_point_candidates: DEFAULT_ENTRY_POINTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub const DEFAULT_ALLOWED_GLOBALS: &[&str] = &[
    "Math",
    "Date",
    "Array",
    "Object",
    "Map",
    "Set",
    "String",
    "Number",
    "Boolean",
    "JSON",
    "Error",
    "TypeError",
    "RangeError",
    "SyntaxError",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "Infinity",
    "NaN",
    "undefined",
    "globalThis",
    "console",
    "map",
    "filter",
    "reduce",
];

pub const DEFAULT_ENTRY_POINTS: &[&str] = &["factorial", "fibonacci", "sum", "sumOfSquares"];

impl JavaScriptConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn max_heap_size_bytes(&self) -> usize {
        self.max_heap_size_mb * 1024 * 1024
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LispConfig {
    pub timeout_ms: u64,
    pub max_recursion_depth: usize,
    pub load_prelude: bool,
    /// Initial stack of the evaluation thread. Deep evaluation grows onto
    /// the heap past it, so this only sets how soon that happens.
    pub stack_size_mb: usize,
}

impl Default for LispConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            max_recursion_depth: 10_000,
            load_prelude: true,
            stack_size_mb: 256,
        }
    }
}

impl LispConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn stack_size_bytes(&self) -> usize {
        self.stack_size_mb * 1024 * 1024
    }
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: EngineConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let js = &self.javascript;
        let positive = [
            ("javascript.timeout_ms", js.timeout_ms as usize),
            ("javascript.max_code_size", js.max_code_size),
            ("javascript.max_heap_size_mb", js.max_heap_size_mb),
            ("javascript.max_concurrent", js.max_concurrent),
            ("lisp.timeout_ms", self.lisp.timeout_ms as usize),
            ("lisp.max_recursion_depth", self.lisp.max_recursion_depth),
            ("lisp.stack_size_mb", self.lisp.stack_size_mb),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", field)));
            }
        }
        if js.allowed_globals.is_empty() {
            return Err(ConfigError::Invalid(
                "javascript.allowed_globals must not be empty".to_string(),
            ));
        }
        for name in js.allowed_globals.iter().chain(&js.entry_point_candidates) {
            if !is_identifier(name) {
                return Err(ConfigError::Invalid(format!(
                    "`{}` is not a JavaScript identifier",
                    name
                )));
            }
        }
        Ok(())
    }
}
