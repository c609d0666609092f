//! What a synced working directory offers: its playbooks and README.

use std::path::Path;

/// Top-level `*.yml` / `*.yaml` files of `dir`, sorted. Hidden files are
/// skipped.
pub async fn discover_playbooks(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.starts_with('.') && (name.ends_with(".yml") || name.ends_with(".yaml")) {
            found.push(name);
        }
    }
    found.sort();
    Ok(found)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadmeFormat {
    Markdown,
    ReStructuredText,
}

impl ReadmeFormat {
    /// File extension, dot included.
    pub fn ext(&self) -> &'static str {
        match self {
            Self::Markdown => ".md",
            Self::ReStructuredText => ".rst",
        }
    }
}

/// README of a working directory, as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readme {
    pub format: ReadmeFormat,
    pub content: String,
}

/// Find `README.rst` or `README.md` (any case) at the top of `dir`.
///
/// reStructuredText wins when both exist. A missing directory has no
/// README.
pub async fn read_readme(dir: &Path) -> std::io::Result<Option<Readme>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut chosen: Option<(ReadmeFormat, std::path::PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_lowercase();
        let format = match name.as_str() {
            "readme.rst" => ReadmeFormat::ReStructuredText,
            "readme.md" => ReadmeFormat::Markdown,
            _ => continue,
        };
        if chosen.as_ref().map_or(true, |(f, _)| *f == ReadmeFormat::Markdown) {
            chosen = Some((format, entry.path()));
        }
    }
    let Some((format, path)) = chosen else {
        return Ok(None);
    };
    let content = tokio::fs::read_to_string(&path).await?;
    Ok(Some(Readme { format, content }))
}
