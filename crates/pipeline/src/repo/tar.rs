//! TAR projects: a gzip tarball unpacked over the working directory.

use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use helmsman_core::project::NO_VCS;
use tokio::io::AsyncWriteExt;

use super::{discard, staging_dir, swap_in, RepoError, SyncOutcome};

/// Largest archive a sync downloads.
pub(super) const MAX_ARCHIVE_BYTES: u64 = 512 * 1024 * 1024;

/// Where the archive of a sync lives while it is unpacked.
enum ArchiveFile {
    Local(PathBuf),
    /// Downloaded next to the working directory; removed after unpacking.
    Downloaded(PathBuf),
}

impl ArchiveFile {
    fn path(&self) -> &Path {
        match self {
            Self::Local(path) | Self::Downloaded(path) => path,
        }
    }

    async fn release(self) {
        if let Self::Downloaded(path) = self {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove downloaded archive");
            }
        }
    }
}

pub(super) async fn sync(
    dir: &Path,
    url: &str,
    http: &reqwest::Client,
    max_bytes: u64,
) -> Result<SyncOutcome, RepoError> {
    let archive = fetch(dir, url, http, max_bytes).await?;

    let staged = staging_dir(dir);
    let source = archive.path().to_path_buf();
    let target = staged.clone();
    let unpacked = tokio::task::spawn_blocking(move || unpack(&source, &target))
        .await
        .map_err(|e| RepoError::Io(std::io::Error::other(e)));
    archive.release().await;

    match unpacked.and_then(|r| r) {
        Ok(()) => swap_in(&staged, dir).await?,
        Err(e) => {
            discard(&staged).await;
            return Err(e);
        }
    }
    Ok(SyncOutcome {
        revision: NO_VCS.to_string(),
        branch: None,
    })
}

async fn fetch(
    dir: &Path,
    url: &str,
    http: &reqwest::Client,
    max_bytes: u64,
) -> Result<ArchiveFile, RepoError> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        let path = PathBuf::from(url.strip_prefix("file://").unwrap_or(url));
        tokio::fs::metadata(&path).await?;
        return Ok(ArchiveFile::Local(path));
    }

    let mut response = http.get(url).send().await?;
    if !response.status().is_success() {
        return Err(RepoError::HttpStatus(response.status().as_u16()));
    }
    if let Some(len) = response.content_length().filter(|len| *len > max_bytes) {
        return Err(RepoError::TooLarge(len));
    }

    let mut name = staging_dir(dir).into_os_string();
    name.push(".tar.gz");
    let path = PathBuf::from(name);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let archive = ArchiveFile::Downloaded(path);
    match stream_to(&mut response, archive.path(), max_bytes).await {
        Ok(()) => Ok(archive),
        Err(e) => {
            archive.release().await;
            Err(e)
        }
    }
}

async fn stream_to(
    response: &mut reqwest::Response,
    path: &Path,
    max_bytes: u64,
) -> Result<(), RepoError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        written += chunk.len() as u64;
        if written > max_bytes {
            return Err(RepoError::TooLarge(written));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

/// Entries escaping `target` (absolute paths, `..`) are skipped by
/// `tar::Archive::unpack`.
fn unpack(source: &Path, target: &Path) -> Result<(), RepoError> {
    let file = std::fs::File::open(source)?;
    std::fs::create_dir_all(target)?;
    let mut archive = tar::Archive::new(GzDecoder::new(std::io::BufReader::new(file)));
    archive.set_preserve_permissions(true);
    archive.unpack(target)?;
    Ok(())
}
