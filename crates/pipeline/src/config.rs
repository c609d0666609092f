use std::path::PathBuf;
use std::time::Duration;

use helmsman_core::types::DbId;

/// Execution pipeline configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root of the per-project working directories.
    pub projects_dir: PathBuf,
    /// Directory SCRIPT hook recipients are looked up in.
    pub hooks_dir: PathBuf,
    /// Maximum number of concurrently running executions.
    pub worker_concurrency: usize,
    pub ansible_bin: String,
    pub ansible_playbook_bin: String,
    /// Wall-clock limit for one execution.
    pub execution_timeout: Duration,
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default            |
    /// |--------------------------|--------------------|
    /// | `PROJECTS_DIR`           | `./projects`       |
    /// | `HOOKS_DIR`              | `./hooks`          |
    /// | `WORKER_CONCURRENCY`     | `4`                |
    /// | `ANSIBLE_BIN`            | `ansible`          |
    /// | `ANSIBLE_PLAYBOOK_BIN`   | `ansible-playbook` |
    /// | `EXECUTION_TIMEOUT_SECS` | `3600`             |
    ///
    /// Unparseable numbers fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::new("./projects");
        Self {
            projects_dir: env_or("PROJECTS_DIR", defaults.projects_dir),
            hooks_dir: env_or("HOOKS_DIR", defaults.hooks_dir),
            worker_concurrency: env_or("WORKER_CONCURRENCY", defaults.worker_concurrency).max(1),
            ansible_bin: env_or("ANSIBLE_BIN", defaults.ansible_bin),
            ansible_playbook_bin: env_or("ANSIBLE_PLAYBOOK_BIN", defaults.ansible_playbook_bin),
            execution_timeout: Duration::from_secs(env_or(
                "EXECUTION_TIMEOUT_SECS",
                defaults.execution_timeout.as_secs(),
            )),
        }
    }

    /// Defaults rooted at `projects_dir`.
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
            hooks_dir: PathBuf::from("./hooks"),
            worker_concurrency: 4,
            ansible_bin: "ansible".to_string(),
            ansible_playbook_bin: "ansible-playbook".to_string(),
            execution_timeout: Duration::from_secs(3600),
        }
    }

    /// Resolve the directory roots against the current directory.
    ///
    /// ansible runs inside the project directory, so paths handed to it
    /// must not be relative to the daemon's working directory.
    pub fn absolutized(mut self) -> std::io::Result<Self> {
        self.projects_dir = std::path::absolute(&self.projects_dir)?;
        self.hooks_dir = std::path::absolute(&self.hooks_dir)?;
        Ok(self)
    }

    /// Working directory of a project.
    pub fn project_dir(&self, project_id: DbId) -> PathBuf {
        self.projects_dir.join(project_id.to_string())
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
