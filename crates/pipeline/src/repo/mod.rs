//! Project repository manager.
//!
//! Brings a project's working directory up to date from its repository.
//! Backends are selected by the `repo_type` project variable through
//! [`RepoType`]. Syncs of one project are serialized through a per-project
//! mutex; different projects sync in parallel.

pub mod catalog;
mod git;
mod manual;
mod tar;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use helmsman_core::project::{self, ProjectStatus};
use helmsman_core::types::DbId;
use helmsman_db::models::project::Project;
use helmsman_db::repositories::{PlaybookRepo, ProjectRepo};
use helmsman_db::DbPool;
use tokio::sync::Mutex;

use crate::config::PipelineConfig;
use crate::error::PipelineError;

/// Timeout for archive downloads.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("Unknown repository type: '{0}'. Must be one of: MANUAL, GIT, TAR")]
    UnknownType(String),

    #[error("Project {0} has no repository URL")]
    MissingUrl(DbId),

    #[error("{command} failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("Download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("Download returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Archive is too large: {0} bytes")]
    TooLarge(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// RepoType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoType {
    /// Files are managed by hand inside the working directory.
    Manual,
    Git,
    /// A gzip tarball fetched over HTTP(S) or from a local path.
    Tar,
}

impl RepoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "MANUAL",
            Self::Git => "GIT",
            Self::Tar => "TAR",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, RepoError> {
        match s {
            "MANUAL" => Ok(Self::Manual),
            "GIT" => Ok(Self::Git),
            "TAR" => Ok(Self::Tar),
            _ => Err(RepoError::UnknownType(s.to_string())),
        }
    }

    /// Whether the working directory content comes from the repository.
    fn is_remote(&self) -> bool {
        !matches!(self, Self::Manual)
    }
}

impl std::fmt::Display for RepoType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub revision: String,
    pub branch: Option<String>,
}

// ---------------------------------------------------------------------------
// RepoManager
// ---------------------------------------------------------------------------

pub struct RepoManager {
    config: Arc<PipelineConfig>,
    http: reqwest::Client,
    locks: std::sync::Mutex<HashMap<DbId, Arc<Mutex<()>>>>,
}

impl RepoManager {
    pub fn new(config: Arc<PipelineConfig>) -> Result<Self, RepoError> {
        let http = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()?;
        Ok(Self {
            config,
            http,
            locks: std::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Create the working directory and fetch the repository into it.
    ///
    /// For GIT and TAR projects any existing working directory is replaced
    /// once the new checkout succeeds. MANUAL projects keep their files.
    pub async fn clone_project(&self, pool: &DbPool, project_id: DbId) -> Result<Project, PipelineError> {
        self.run_sync(pool, project_id, true).await
    }

    /// Bring the working directory up to date.
    ///
    /// Moves the project NEW/OK/ERROR -> WAIT_SYNC -> OK or ERROR. On
    /// failure the previous working directory is left in place. A
    /// successful sync rebuilds the project's playbook catalog.
    pub async fn sync(&self, pool: &DbPool, project_id: DbId) -> Result<Project, PipelineError> {
        self.run_sync(pool, project_id, false).await
    }

    async fn run_sync(
        &self,
        pool: &DbPool,
        project_id: DbId,
        fresh: bool,
    ) -> Result<Project, PipelineError> {
        let lock = self.lock_for(project_id);
        let _guard = lock.lock().await;

        let project = ProjectRepo::find_by_id(pool, project_id)
            .await?
            .ok_or(PipelineError::NotFound {
                entity: "project",
                id: project_id,
            })?;
        let repo_type = RepoType::from_str(project::repo_type(&project.vars))?;

        if project.status != ProjectStatus::WaitSync {
            ProjectRepo::set_status(pool, project_id, ProjectStatus::WaitSync).await?;
        }
        tracing::info!(project_id, %repo_type, fresh, "Project sync started");

        let dir = self.config.project_dir(project_id);
        let fetched = match self.fetch(&project, repo_type, &dir, fresh).await {
            Ok(outcome) => catalog::discover_playbooks(&dir)
                .await
                .map(|playbooks| (outcome, playbooks))
                .map_err(RepoError::Io),
            Err(e) => Err(e),
        };
        match fetched {
            Ok((outcome, playbooks)) => {
                PlaybookRepo::replace_for_project(pool, project_id, &playbooks).await?;
                ProjectRepo::set_revision(
                    pool,
                    project_id,
                    &outcome.revision,
                    outcome.branch.as_deref(),
                )
                .await?;
                let project = ProjectRepo::set_status(pool, project_id, ProjectStatus::Ok).await?;
                tracing::info!(
                    project_id,
                    revision = %outcome.revision,
                    playbooks = playbooks.len(),
                    "Project sync finished"
                );
                Ok(project)
            }
            Err(e) => {
                tracing::error!(project_id, error = %e, "Project sync failed");
                ProjectRepo::set_status(pool, project_id, ProjectStatus::Error).await?;
                Err(e.into())
            }
        }
    }

    async fn fetch(
        &self,
        project: &Project,
        repo_type: RepoType,
        dir: &Path,
        fresh: bool,
    ) -> Result<SyncOutcome, RepoError> {
        if repo_type.is_remote() && project.repository.trim().is_empty() {
            return Err(RepoError::MissingUrl(project.id));
        }
        match repo_type {
            RepoType::Manual => manual::sync(dir).await,
            RepoType::Git => git::sync(dir, project.repository.trim(), &project.vars, fresh).await,
            RepoType::Tar => tar::sync(dir, project.repository.trim(), &self.http, tar::MAX_ARCHIVE_BYTES).await,
        }
    }

    fn lock_for(&self, project_id: DbId) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(project_id).or_default())
    }
}

// ---------------------------------------------------------------------------
// Working directory helpers
// ---------------------------------------------------------------------------

/// Sibling directory a new checkout is staged in before it replaces `dir`.
fn staging_dir(dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.with_file_name(format!(".{name}.staging-{}", uuid::Uuid::new_v4()))
}

/// Replace `dir` with `staged`.
async fn swap_in(staged: &Path, dir: &Path) -> Result<(), RepoError> {
    if tokio::fs::try_exists(dir).await? {
        tokio::fs::remove_dir_all(dir).await?;
    }
    tokio::fs::rename(staged, dir).await?;
    Ok(())
}

/// Remove a staging directory left behind by a failed fetch.
async fn discard(staged: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(staged).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %staged.display(), error = %e, "Failed to remove staging dir");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
