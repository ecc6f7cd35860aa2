//! The node's two data directories.
//!
//! `Files/` holds blobs exposed for one-shot download; `SyncFiles/` holds
//! subscribed documents. Both live under a single data root. Names ending
//! in `~` are editor backups and are never listed. Lookups reject names
//! with path separators so a wire-supplied name cannot escape its
//! directory.

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{Result, StoreError};

/// Which of the two data directories an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    /// `Files/` — one-shot downloadable blobs.
    Share,
    /// `SyncFiles/` — subscribed documents.
    Sync,
}

impl Area {
    fn dir_name(&self) -> &'static str {
        match self {
            Area::Share => "Files",
            Area::Sync => "SyncFiles",
        }
    }
}

/// Abstraction over the node's on-disk layout.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `root`, creating both directories if absent.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for area in [Area::Share, Area::Sync] {
            fs::create_dir_all(root.join(area.dir_name())).await?;
        }
        tracing::debug!(root = %root.display(), "file store opened");
        Ok(FileStore { root })
    }

    /// The directory backing the given area.
    pub fn dir(&self, area: Area) -> PathBuf {
        self.root.join(area.dir_name())
    }

    /// Full path of a named file inside an area.
    ///
    /// Rejects names containing path separators or `..`.
    pub fn path_of(&self, area: Area, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(StoreError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(self.dir(area).join(name))
    }

    /// List the regular files in an area, skipping `~` backups.
    pub async fn list(&self, area: Area) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(self.dir(area)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with('~') {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    /// Whether a named file exists in an area.
    pub async fn contains(&self, area: Area, name: &str) -> bool {
        match self.path_of(area, name) {
            Ok(path) => fs::metadata(&path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Size in bytes of a named file.
    pub async fn size(&self, area: Area, name: &str) -> Result<u64> {
        let path = self.path_of(area, name)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            _ => Err(StoreError::NotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Open a named file for streamed reading.
    pub async fn open_read(&self, area: Area, name: &str) -> Result<fs::File> {
        let path = self.path_of(area, name)?;
        fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound {
                    name: name.to_string(),
                }
            } else {
                StoreError::Io(e)
            }
        })
    }

    /// Create (or truncate) a named file for streamed writing.
    pub async fn open_write(&self, area: Area, name: &str) -> Result<fs::File> {
        let path = self.path_of(area, name)?;
        Ok(fs::File::create(&path).await?)
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}
