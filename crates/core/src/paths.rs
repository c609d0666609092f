//! Lexical path confinement for project working directories.

use std::path::{Component, Path, PathBuf};

use crate::error::CoreError;

pub const OUTSIDE_PROJECT_MSG: &str = "Inventory should be in project dir.";

/// Normalize `path` without touching the filesystem.
///
/// `.` components are dropped and `..` pops the previous component. A `..`
/// at the root stays at the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve `candidate` against `root`, rejecting anything that escapes it.
pub fn resolve_within(root: &Path, candidate: &str) -> Result<PathBuf, CoreError> {
    if candidate.starts_with('~') {
        return Err(CoreError::Validation(OUTSIDE_PROJECT_MSG.to_string()));
    }
    let root = normalize(root);
    let resolved = normalize(&root.join(candidate));
    if resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(CoreError::Validation(OUTSIDE_PROJECT_MSG.to_string()))
    }
}
