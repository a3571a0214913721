//! Directory scanning: find the scripts in a folder and, for exports, the
//! longest one.
//!
//! Only the top level of the folder is scanned, and the extension match is
//! case-sensitive (`.pdf`, not `.PDF`). Job validation later accepts any
//! case; the two checks are kept as they are rather than unified.

use crate::engine::{call_engine, Engines};
use crate::error::{GradexError, Stage};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Create a directory the whole batch depends on.
pub async fn ensure_dir(path: &Path) -> Result<(), GradexError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| GradexError::DirectoryUnavailable {
            path: path.to_path_buf(),
            source: e,
        })
}

/// File names in `dir` whose extension is exactly `extension`, sorted.
pub async fn find_documents(dir: &Path, extension: &str) -> Result<Vec<String>, GradexError> {
    let unavailable = |e| GradexError::DirectoryUnavailable {
        path: dir.to_path_buf(),
        source: e,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(unavailable)?;
    let mut names = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(unavailable)? {
        let file_type = entry.file_type().await.map_err(unavailable)?;
        if file_type.is_dir() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().into_owned());
    }

    names.sort();
    info!("Found {} input files in {}", names.len(), dir.display());
    Ok(names)
}

/// Largest page count among `names`.
///
/// A document that cannot be probed counts as 0 here; its own job reports
/// the failure.
pub async fn probe_max_pages(
    dir: &Path,
    names: &[String],
    engines: &Engines,
    timeout: Duration,
) -> usize {
    let mut max_pages = 0;
    for name in names {
        let counter = engines.counter.clone();
        let path = dir.join(name);
        match call_engine(Stage::Probe, timeout, move || counter.page_count(&path)).await {
            Ok(n) => {
                debug!("{}: {} pages", name, n);
                max_pages = max_pages.max(n);
            }
            Err(e) => warn!("{}: {}; not counted towards the maximum", name, e),
        }
    }
    info!("Maximum page length: {}", max_pages);
    max_pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finds_only_top_level_lowercase_pdfs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.pdf", "c.PDF", "notes.txt", "noext"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.pdf")).unwrap();
        std::fs::write(dir.path().join("nested.pdf").join("d.pdf"), b"x").unwrap();

        let names = find_documents(dir.path(), "pdf").await.unwrap();
        assert_eq!(names, vec!["a.pdf".to_string(), "b.pdf".to_string()]);
    }

    #[tokio::test]
    async fn missing_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_documents(&dir.path().join("gone"), "pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, GradexError::DirectoryUnavailable { .. }));
    }

    #[tokio::test]
    async fn ensure_dir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out").join("jpg_pages");
        ensure_dir(&target).await.unwrap();
        ensure_dir(&target).await.unwrap();
        assert!(target.is_dir());
    }

    #[tokio::test]
    async fn ensure_dir_fails_under_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, b"x").unwrap();
        assert!(ensure_dir(&file.join("sub")).await.is_err());
    }
}
