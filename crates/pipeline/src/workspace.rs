//! Private scratch directory for one execution.
//!
//! Holds the rendered inventory and any key material extracted from
//! variables. Files are created 0600 inside a 0700 directory, and the
//! directory is removed when the [`RunWorkspace`] is dropped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use helmsman_core::variables::{self, KEY_FILE_KEYS};
use tokio::io::AsyncWriteExt;

pub struct RunWorkspace {
    dir: PathBuf,
}

impl RunWorkspace {
    pub async fn create() -> std::io::Result<Self> {
        let dir = std::env::temp_dir().join(format!("helmsman-run-{}", uuid::Uuid::new_v4()));
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true).mode(0o700);
        builder.create(&dir).await?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Write `content` to `name` inside the workspace with mode 0600.
    pub async fn write_private(&self, name: &str, content: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.join(name);
        write_private(&path, content).await?;
        Ok(path)
    }

    /// Collector that swaps key material for file paths inside this
    /// workspace.
    pub fn key_files(&self) -> KeyFiles {
        KeyFiles {
            dir: self.dir.clone(),
            files: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Drop for RunWorkspace {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.dir.display(), error = %e, "Failed to remove run workspace");
            }
        }
    }
}

async fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    if !content.ends_with('\n') {
        file.write_all(b"\n").await?;
    }
    file.flush().await
}

// ---------------------------------------------------------------------------
// KeyFiles
// ---------------------------------------------------------------------------

/// Key material found in variable values, keyed by content.
///
/// [`substitute`](KeyFiles::substitute) is usable from `Fn` closures; the
/// files are only written by [`write`](KeyFiles::write).
pub struct KeyFiles {
    dir: PathBuf,
    files: Mutex<BTreeMap<String, PathBuf>>,
}

impl KeyFiles {
    /// Value to hand to ansible for `key`. Key material under a key-file
    /// variable is replaced by the path it will be written to.
    pub fn substitute(&self, key: &str, value: &str) -> String {
        if !KEY_FILE_KEYS.contains(&key) || !variables::is_key_material(value) {
            return value.to_string();
        }
        let mut files = self.files.lock().unwrap_or_else(|p| p.into_inner());
        let next = files.len();
        files
            .entry(value.to_string())
            .or_insert_with(|| self.dir.join(format!("key-{next}")))
            .display()
            .to_string()
    }

    pub async fn write(self) -> std::io::Result<()> {
        let files = self.files.into_inner().unwrap_or_else(|p| p.into_inner());
        for (material, path) in files {
            write_private(&path, &material).await?;
        }
        Ok(())
    }
}
