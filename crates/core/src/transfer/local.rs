//! Local filesystem side of uploads and downloads

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use jiff::Timestamp;

use crate::error::{Error, Result};

/// Suffix of a download that has not been renamed into place yet
const PARTIAL_SUFFIX: &str = ".partial";

/// Every regular file under `root` with its path relative to `root`,
/// segments joined by `delimiter`
pub(crate) fn walk_files(root: &Path, delimiter: &str) -> std::io::Result<Vec<(PathBuf, String)>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join(delimiter);
                files.push((path, relative));
            }
        }
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

/// Local path for a key relative to the download directory
///
/// Keys may contain segments that would escape the directory; those items
/// are refused instead of written.
pub(crate) fn local_target(dir: &Path, relative: &str, delimiter: &str) -> Result<PathBuf> {
    let mut path = dir.to_path_buf();
    for segment in relative.split(delimiter).filter(|s| !s.is_empty()) {
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => path.push(part),
            _ => {
                return Err(Error::InvalidPath(format!(
                    "Refusing to write key segment '{segment}' outside {}",
                    dir.display()
                )))
            }
        }
    }
    Ok(path)
}

/// Whether a destination is present, with its last-modified time if known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Existing {
    Absent,
    Present(Option<Timestamp>),
}

/// Existence and modification time of a local file
pub(crate) async fn existing(path: &Path) -> Result<Existing> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(Existing::Present(
            meta.modified().ok().and_then(|t| Timestamp::try_from(t).ok()),
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Existing::Absent),
        Err(e) => Err(e.into()),
    }
}

/// Write `data` next to `path` and rename it into place
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut partial: OsString = path.as_os_str().to_owned();
    partial.push(PARTIAL_SUFFIX);
    let partial = PathBuf::from(partial);

    let written = match tokio::fs::write(&partial, data).await {
        Ok(()) => tokio::fs::rename(&partial, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e.into());
    }
    Ok(())
}

/// Content type guessed from the file extension
pub(crate) fn content_type(path: &Path) -> Option<String> {
    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
}
