use super::RelayError;
use crate::config::DEFAULT_VIDEO_EXTENSION;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sequential file name for the `index`-th video of a run.
///
/// Keeps the source's extension and falls back to `.mp4` when it has none.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use vidrelay::relay::sequential_name;
///
/// assert_eq!(sequential_name("My vlog", 3, Path::new("a/b.mov")), "My vlog 3.mov");
/// assert_eq!(sequential_name("My vlog", 1, Path::new("a/b")), "My vlog 1.mp4");
/// ```
#[must_use]
pub fn sequential_name(base_name: &str, index: usize, source: &Path) -> String {
    let ext = source
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map_or_else(|| DEFAULT_VIDEO_EXTENSION.to_string(), |ext| format!(".{ext}"));
    format!("{base_name} {index}{ext}")
}

/// Move `source` to its sequential name in the same directory.
///
/// # Errors
///
/// Returns `RelayError::Rename` if the source is missing, the move fails, or
/// the target name is already taken. Existing files are never overwritten.
pub async fn rename_one(
    source: &Path,
    base_name: &str,
    index: usize,
) -> Result<PathBuf, RelayError> {
    let dir = source.parent().unwrap_or_else(|| Path::new(""));
    let target = dir.join(sequential_name(base_name, index, source));

    let rename_error = |source_err: io::Error| RelayError::Rename {
        from: source.to_path_buf(),
        to: target.clone(),
        source: source_err,
    };

    // rename(2) replaces an existing target silently
    if tokio::fs::try_exists(&target).await.map_err(rename_error)? {
        return Err(rename_error(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "target file already exists",
        )));
    }

    tokio::fs::rename(source, &target)
        .await
        .map_err(rename_error)?;

    debug!(from = %source.display(), to = %target.display(), "Renamed staged file");
    Ok(target)
}

/// Rename a batch of downloaded files, in download order, to
/// `"<base> 1.<ext>"` … `"<base> N.<ext>"`.
///
/// Stops at the first failure; files renamed before it keep their new names.
///
/// # Errors
///
/// Returns the first `RelayError::Rename` encountered.
pub async fn rename_batch(
    sources: &[PathBuf],
    base_name: &str,
) -> Result<Vec<PathBuf>, RelayError> {
    let mut renamed = Vec::with_capacity(sources.len());
    for (i, source) in sources.iter().enumerate() {
        renamed.push(rename_one(source, base_name, i + 1).await?);
    }
    Ok(renamed)
}
