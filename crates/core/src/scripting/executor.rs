//! Script execution interface and shared types.
//!
//! Defines [`ScriptExecutor`], implemented by the hook script runner, along
//! with [`ScriptInput`], [`ScriptOutput`] and [`ScriptError`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Input passed to a script executor.
#[derive(Debug, Clone)]
pub struct ScriptInput {
    /// JSON payload piped to stdin. `None` leaves stdin closed.
    pub data: Option<Value>,
    pub env_vars: Vec<(String, String)>,
    pub working_directory: Option<String>,
    /// Wall-clock limit before the process is killed.
    pub timeout: Duration,
}

impl ScriptInput {
    pub fn with_payload(data: Value, timeout: Duration) -> Self {
        Self {
            data: Some(data),
            env_vars: Vec::new(),
            working_directory: None,
            timeout,
        }
    }
}

/// Captured output of a finished process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl ScriptOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("Script not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Script timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Script failed with exit code {exit_code}: {stderr}")]
    ExecutionFailed { exit_code: i32, stderr: String },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Runs a script file with structured input.
pub trait ScriptExecutor: Send + Sync {
    fn execute(
        &self,
        script_path: &str,
        input: ScriptInput,
    ) -> impl std::future::Future<Output = Result<ScriptOutput, ScriptError>> + Send;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
