//! Script delivery.
//!
//! Runs an executable from the hooks directory with the event message on
//! stdin. A non-zero exit is a delivery failure.

use std::path::PathBuf;
use std::time::Duration;

use helmsman_core::scripting::binary::BinaryExecutor;
use helmsman_core::scripting::executor::{ScriptError, ScriptExecutor, ScriptInput};

use crate::bus::LifecycleEvent;

/// Wall-clock limit for one hook script.
const SCRIPT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ScriptDelivery {
    hooks_dir: PathBuf,
    timeout: Duration,
}

impl ScriptDelivery {
    pub fn new(hooks_dir: impl Into<PathBuf>) -> Self {
        Self {
            hooks_dir: hooks_dir.into(),
            timeout: SCRIPT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `script` (a file name inside the hooks directory) for `event`.
    pub async fn deliver(&self, script: &str, event: &LifecycleEvent) -> Result<(), ScriptError> {
        if script.contains('/') || script == ".." || script == "." {
            return Err(ScriptError::NotFound(script.to_string()));
        }
        let path = self.hooks_dir.join(script);
        let path = path.to_string_lossy();
        let mut input = ScriptInput::with_payload(event.to_message(), self.timeout);
        input.env_vars.push(("HOOK_EVENT".to_string(), event.when.to_string()));
        input.working_directory = Some(self.hooks_dir.to_string_lossy().into_owned());

        let output = BinaryExecutor.execute(&path, input).await?;
        if !output.success() {
            return Err(ScriptError::ExecutionFailed {
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }
        tracing::debug!(script, duration_ms = output.duration_ms, "Hook script finished");
        Ok(())
    }
}
