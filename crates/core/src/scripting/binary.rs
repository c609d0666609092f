//! Executable file runner.
//!
//! Runs a file directly (not through a shell) after checking that it exists
//! and has execute permission. Used for SCRIPT hook recipients.

use std::os::unix::fs::PermissionsExt;

use super::executor::{ScriptError, ScriptExecutor, ScriptInput, ScriptOutput};
use super::subprocess;

pub struct BinaryExecutor;

impl ScriptExecutor for BinaryExecutor {
    async fn execute(
        &self,
        binary_path: &str,
        input: ScriptInput,
    ) -> Result<ScriptOutput, ScriptError> {
        let metadata = tokio::fs::metadata(binary_path)
            .await
            .map_err(|_| ScriptError::NotFound(binary_path.to_string()))?;

        let mode = metadata.permissions().mode();
        if mode & 0o111 == 0 {
            return Err(ScriptError::PermissionDenied(format!(
                "{binary_path} is not executable (mode {mode:#o})"
            )));
        }

        let mut cmd = tokio::process::Command::new(binary_path);
        subprocess::run_command(&mut cmd, input).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::scripting::test_helpers::default_input;

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let result = BinaryExecutor
            .execute("/nonexistent/hook.sh", default_input())
            .await;
        assert!(matches!(result, Err(ScriptError::NotFound(_))));
    }

    #[tokio::test]
    async fn non_executable_file_is_rejected() {
        let f = tempfile::NamedTempFile::new().expect("create temp file");
        let path = f.path().to_str().expect("path");

        let result = BinaryExecutor.execute(path, default_input()).await;
        assert!(matches!(result, Err(ScriptError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn executable_receives_payload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hook.sh");
        let mut file = std::fs::File::create(&path).expect("create script");
        writeln!(file, "#!/bin/sh\ncat").expect("write script");
        drop(file);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod");

        let output = BinaryExecutor
            .execute(path.to_str().expect("path"), default_input())
            .await
            .expect("script runs");
        assert!(output.success());
        assert!(output.stdout.contains("\"key\":\"value\""));
    }
}
