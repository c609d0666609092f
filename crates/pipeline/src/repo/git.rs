//! GIT projects.
//!
//! First sync clones into a staging directory that then replaces the working
//! directory. Later syncs fetch and hard-reset the checked out branch to
//! `origin/<branch>`.

use std::path::{Path, PathBuf};

use helmsman_core::project::{VAR_REPO_BRANCH, VAR_REPO_KEY, VAR_REPO_PASSWORD};
use helmsman_core::variables::{Variables, REDACTED_MARKER};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{discard, staging_dir, swap_in, RepoError, SyncOutcome};

pub(super) async fn sync(
    dir: &Path,
    url: &str,
    vars: &Variables,
    fresh: bool,
) -> Result<SyncOutcome, RepoError> {
    let branch = vars
        .get(VAR_REPO_BRANCH)
        .map(|b| b.trim())
        .filter(|b| !b.is_empty());
    let password = vars
        .get(VAR_REPO_PASSWORD)
        .map(String::as_str)
        .filter(|p| !p.is_empty());

    let auth = match vars.get(VAR_REPO_KEY).filter(|k| !k.trim().is_empty()) {
        Some(key) => Some(SshKey::write(key).await?),
        None => None,
    };
    let git = Git {
        url,
        credentials: credentials(url, password),
        secret: password,
        ssh_key: auth.as_ref().map(|k| k.path.as_path()),
    };

    let result = git.checkout(dir, branch, fresh).await;
    if let Some(key) = auth {
        key.remove().await;
    }
    result
}

/// Answers git's credential queries from the environment of one command.
/// Passed with `-c`, so nothing lands in `.git/config`.
const CREDENTIAL_HELPER: &str = "credential.helper=!f() { \
    echo \"username=${HELMSMAN_GIT_USER}\"; echo \"password=${HELMSMAN_GIT_PASSWORD}\"; }; f";

/// HTTP(S) login for a password-protected repository.
#[derive(Debug, PartialEq, Eq)]
struct Credentials<'a> {
    user: String,
    password: &'a str,
}

/// Credentials for `url`, if it is an HTTP(S) URL and a password is set.
///
/// Without a user in the URL the password doubles as the user name, the
/// usual form for access tokens.
fn credentials<'a>(url: &str, password: Option<&'a str>) -> Option<Credentials<'a>> {
    let password = password?;
    let parsed = reqwest::Url::parse(url).ok()?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }
    let user = match parsed.username() {
        "" => password.to_string(),
        user => user.to_string(),
    };
    Some(Credentials { user, password })
}

struct Git<'a> {
    /// Remote URL as configured, never carrying the password.
    url: &'a str,
    credentials: Option<Credentials<'a>>,
    /// Masked out of error output.
    secret: Option<&'a str>,
    ssh_key: Option<&'a Path>,
}

impl Git<'_> {
    async fn checkout(
        &self,
        dir: &Path,
        branch: Option<&str>,
        fresh: bool,
    ) -> Result<SyncOutcome, RepoError> {
        if fresh || !dir.join(".git").is_dir() {
            self.clone_into(dir, branch).await?;
        } else {
            self.update(dir, branch).await?;
        }
        let revision = self.run(Some(dir), &["rev-parse", "HEAD"]).await?;
        let branch = self
            .run(Some(dir), &["rev-parse", "--abbrev-ref", "HEAD"])
            .await?;
        Ok(SyncOutcome {
            revision,
            branch: Some(branch),
        })
    }

    async fn clone_into(&self, dir: &Path, branch: Option<&str>) -> Result<(), RepoError> {
        let staged = staging_dir(dir);
        if let Some(parent) = staged.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staged_arg = staged.to_string_lossy().into_owned();
        let mut args = vec!["clone", "--quiet"];
        if let Some(branch) = branch {
            args.extend(["--branch", branch]);
        }
        args.extend(["--", self.url, staged_arg.as_str()]);

        match self.run(None, &args).await {
            Ok(_) => swap_in(&staged, dir).await,
            Err(e) => {
                discard(&staged).await;
                Err(e)
            }
        }
    }

    async fn update(&self, dir: &Path, branch: Option<&str>) -> Result<(), RepoError> {
        self.run(Some(dir), &["remote", "set-url", "origin", self.url])
            .await?;
        self.run(Some(dir), &["fetch", "--quiet", "--prune", "origin"])
            .await?;
        let branch = match branch {
            Some(b) => b.to_string(),
            None => self.run(Some(dir), &["rev-parse", "--abbrev-ref", "HEAD"]).await?,
        };
        let upstream = format!("origin/{branch}");
        self.run(Some(dir), &["checkout", "--quiet", "--force", "-B", branch.as_str(), upstream.as_str()])
            .await?;
        self.run(Some(dir), &["reset", "--quiet", "--hard", upstream.as_str()])
            .await?;
        Ok(())
    }

    /// Run git and return trimmed stdout.
    async fn run(&self, dir: Option<&Path>, args: &[&str]) -> Result<String, RepoError> {
        let mut cmd = Command::new("git");
        if let Some(dir) = dir {
            cmd.arg("-C").arg(dir);
        }
        if let Some(creds) = &self.credentials {
            cmd.args(["-c", "credential.helper=", "-c", CREDENTIAL_HELPER])
                .env("HELMSMAN_GIT_USER", &creds.user)
                .env("HELMSMAN_GIT_PASSWORD", creds.password);
        }
        cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
        if let Some(key) = self.ssh_key {
            cmd.env(
                "GIT_SSH_COMMAND",
                format!(
                    "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=no",
                    key.display()
                ),
            );
        }

        let output = cmd.output().await?;
        if !output.status.success() {
            let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if let Some(secret) = self.secret {
                stderr = stderr.replace(secret, REDACTED_MARKER);
            }
            return Err(RepoError::Command {
                command: format!("git {}", args.first().copied().unwrap_or_default()),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Private key written to a 0600 temp file for the duration of a sync.
struct SshKey {
    path: PathBuf,
}

impl SshKey {
    async fn write(key: &str) -> Result<Self, RepoError> {
        let path = std::env::temp_dir().join(format!("helmsman-repo-key-{}", uuid::Uuid::new_v4()));
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)
            .await?;
        file.write_all(key.trim_end().as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(Self { path })
    }

    async fn remove(self) {
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            tracing::warn!(error = %e, "Failed to remove repository key file");
        }
    }
}
