//! MANUAL projects: the working directory is all there is.

use std::path::Path;

use helmsman_core::project::NO_VCS;

use super::{RepoError, SyncOutcome};

pub(super) async fn sync(dir: &Path) -> Result<SyncOutcome, RepoError> {
    tokio::fs::create_dir_all(dir).await?;
    Ok(SyncOutcome {
        revision: NO_VCS.to_string(),
        branch: None,
    })
}
