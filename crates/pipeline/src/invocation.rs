//! ansible command line construction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use helmsman_core::arguments;
use helmsman_core::execution::{ExecutionKind, ExecutionRequest};
use helmsman_core::paths;
use helmsman_core::variables::Variables;

use crate::config::PipelineConfig;
use crate::error::PipelineError;

const PLAYBOOK_OUTSIDE_PROJECT_MSG: &str = "Playbook should be in project dir.";

/// Environment every run gets.
const RUN_ENV: &[(&str, &str)] = &[
    ("ANSIBLE_FORCE_COLOR", "true"),
    ("ANSIBLE_HOST_KEY_CHECKING", "False"),
    ("PYTHONUNBUFFERED", "1"),
];

/// A process to start for one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl Invocation {
    /// Build the command for `request`.
    ///
    /// `inventory` is the `-i` argument; `vars` are the merged run options,
    /// already validated against the option table of the run kind.
    pub fn build(
        config: &PipelineConfig,
        request: &ExecutionRequest,
        inventory: &str,
        vars: &Variables,
        project_dir: &Path,
    ) -> Result<Self, PipelineError> {
        let options = arguments::to_cli_args(request.kind, vars)?;
        let target = request.target.trim();
        let (program, mut args) = match request.kind {
            ExecutionKind::Playbook => {
                paths::resolve_within(project_dir, target).map_err(|_| {
                    PipelineError::Validation(PLAYBOOK_OUTSIDE_PROJECT_MSG.to_string())
                })?;
                (
                    config.ansible_playbook_bin.clone(),
                    vec![target.to_string(), "-i".to_string(), inventory.to_string()],
                )
            }
            ExecutionKind::Module => {
                let mut args = vec![
                    request.group.clone(),
                    "-i".to_string(),
                    inventory.to_string(),
                    "-m".to_string(),
                    target.to_string(),
                ];
                if !request.args.trim().is_empty() {
                    args.push("-a".to_string());
                    args.push(request.args.clone());
                }
                (config.ansible_bin.clone(), args)
            }
        };
        args.extend(options);

        Ok(Self {
            program,
            args,
            cwd: project_dir.to_path_buf(),
            env: RUN_ENV
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            timeout: config.execution_timeout,
        })
    }

    /// Shell-like rendering of the command line.
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|a| quote(a))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote(arg: &str) -> String {
    if !arg.is_empty() && !arg.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}
