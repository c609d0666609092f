//! Execution backends.
//!
//! [`ExecutionBackend`] is the seam between the pipeline and the process
//! that does the work. [`AnsibleBackend`] runs the invocation as a
//! supervised child process.

use async_trait::async_trait;
use helmsman_core::scripting::subprocess::{self, SupervisedExit};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::invocation::Invocation;

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Run `invocation` to completion, sending output lines to `output` as
    /// they are produced.
    ///
    /// Must return [`SupervisedExit::Cancelled`] once `cancel` fires.
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
        output: mpsc::UnboundedSender<String>,
    ) -> Result<SupervisedExit, PipelineError>;
}

pub struct AnsibleBackend;

#[async_trait]
impl ExecutionBackend for AnsibleBackend {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
        output: mpsc::UnboundedSender<String>,
    ) -> Result<SupervisedExit, PipelineError> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.cwd)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        tracing::debug!(program = %invocation.program, "Starting ansible");
        subprocess::run_supervised(&mut cmd, invocation.timeout, cancel, output)
            .await
            .map_err(|e| PipelineError::Execution(format!("{}: {e}", invocation.program)))
    }
}
