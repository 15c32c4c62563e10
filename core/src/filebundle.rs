//! File bundle descriptor and download-path resolution (§3.4, §6.4).

use std::path::{Path, PathBuf};

/// A file being transferred, sender or receiver side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBundle {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

impl FileBundle {
    pub fn from_local(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let meta = std::fs::metadata(&path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());
        Ok(FileBundle {
            path,
            name,
            size: meta.len(),
        })
    }

    /// Reconstruct a receiver-side bundle from the incoming NAME + LENGTH
    /// headers and the resolved on-disk destination path.
    pub fn from_incoming(name: String, size: u64, dest: PathBuf) -> Self {
        FileBundle {
            path: dest,
            name,
            size,
        }
    }
}

/// Strip path separators and control characters from a basename so it can't
/// escape the downloads directory or inject anything unexpected on disk.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\') && !c.is_control())
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "download".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Resolve the on-disk destination for `basename` inside `downloads_dir`,
/// mangling the name with an incrementing `N_` prefix until an unused path
/// is found (§6.4, §8 property 8).
pub fn resolve_download_path(downloads_dir: &Path, basename: &str) -> PathBuf {
    let safe = sanitize_filename(basename);
    let candidate = downloads_dir.join(&safe);
    if !candidate.exists() {
        return candidate;
    }
    let mut n: u64 = 1;
    loop {
        let mangled = format!("{}_{}", n, safe);
        let candidate = downloads_dir.join(&mangled);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}
