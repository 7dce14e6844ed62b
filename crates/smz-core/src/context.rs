//! Runtime context.
//!
//! Environment variables, the home directory and wall-clock time are
//! consulted through this handle; the orchestrator refuses to read process
//! globals directly, which keeps tests hermetic.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Shared runtime context threaded through the orchestrator.
#[derive(Clone)]
pub struct RuntimeContext {
    env: Arc<dyn Fn(&str) -> Option<String> + Send + Sync>,
    pub home_dir: PathBuf,
}

impl RuntimeContext {
    /// Context backed by the real process environment.
    pub fn from_process() -> Self {
        Self {
            env: Arc::new(|name: &str| std::env::var(name).ok()),
            home_dir: dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    /// Context with a fixed environment map, for tests.
    pub fn fixed(vars: HashMap<String, String>, home_dir: PathBuf) -> Self {
        Self {
            env: Arc::new(move |name: &str| vars.get(name).cloned()),
            home_dir,
        }
    }

    /// Read an environment variable; empty values count as unset.
    pub fn env(&self, name: &str) -> Option<String> {
        (self.env)(name).filter(|v| !v.trim().is_empty())
    }

    /// Read a boolean-ish environment flag.
    pub fn env_flag(&self, name: &str) -> bool {
        self.env(name)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// The env lookup as a shareable closure (for the model registry).
    pub fn env_fn(&self) -> Arc<dyn Fn(&str) -> Option<String> + Send + Sync> {
        Arc::clone(&self.env)
    }

    /// Current wall-clock time in unix milliseconds.
    pub fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}
