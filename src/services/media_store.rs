use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Failed to write media file {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to read media file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Media file not found: {0}")]
    NotFound(String),
    #[error("Invalid media path: {0}")]
    InvalidPath(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Uploads,
    Crops,
}

impl MediaKind {
    fn dir(self) -> &'static str {
        match self {
            MediaKind::Uploads => "uploads",
            MediaKind::Crops => "crops",
        }
    }
}

/// Local image storage, partitioned as `<kind>/YYYY/MM/DD/<file>`.
///
/// Paths handed out and accepted are relative to the store root; they are
/// what capture rows keep in `local_image`.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn relative_path(kind: MediaKind, prefix: &str, extension: &str, at: DateTime<Utc>) -> String {
        let unique = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "{}/{}/{}_{}_{}.{}",
            kind.dir(),
            at.format("%Y/%m/%d"),
            prefix,
            at.format("%Y%m%d_%H%M%S"),
            &unique[..8],
            extension.trim_start_matches('.').to_ascii_lowercase()
        )
    }

    /// Writes `data` and returns its path relative to the store root.
    pub async fn save(
        &self,
        kind: MediaKind,
        prefix: &str,
        extension: &str,
        data: &[u8],
    ) -> Result<String, MediaError> {
        let relative = Self::relative_path(kind, prefix, extension, Utc::now());
        let full = self.root.join(&relative);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| MediaError::Write {
                    path: parent.display().to_string(),
                    source,
                })?;
        }
        tokio::fs::write(&full, data)
            .await
            .map_err(|source| MediaError::Write {
                path: full.display().to_string(),
                source,
            })?;
        debug!(path = %relative, bytes = data.len(), "Stored media file.");
        Ok(relative)
    }

    /// Maps a stored relative path back onto the filesystem, refusing
    /// anything that would escape the store root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, MediaError> {
        let path = Path::new(relative);
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if relative.is_empty() || escapes {
            return Err(MediaError::InvalidPath(relative.to_string()));
        }
        Ok(self.root.join(path))
    }

    pub async fn read(&self, relative: &str) -> Result<Vec<u8>, MediaError> {
        let full = self.resolve(relative)?;
        tokio::fs::read(&full).await.map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => MediaError::NotFound(relative.to_string()),
            _ => MediaError::Read {
                path: relative.to_string(),
                source,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_paths_are_date_partitioned() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap();
        let path = MediaStore::relative_path(MediaKind::Crops, "crop", ".JPG", at);
        assert!(path.starts_with("crops/2024/03/07/crop_20240307_140509_"));
        assert!(path.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn test_save_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let relative = store
            .save(MediaKind::Uploads, "upload", "png", b"\x89PNG")
            .await
            .unwrap();
        assert!(relative.starts_with("uploads/"));
        assert_eq!(store.read(&relative).await.unwrap(), b"\x89PNG");
        assert!(matches!(
            store.read("uploads/missing.png").await,
            Err(MediaError::NotFound(_))
        ));
    }

    #[test]
    fn test_traversal_is_rejected() {
        let store = MediaStore::new("/srv/media");
        assert!(store.resolve("../etc/passwd").is_err());
        assert!(store.resolve("/etc/passwd").is_err());
        assert!(store.resolve("").is_err());
        assert_eq!(
            store.resolve("uploads/a.jpg").unwrap(),
            PathBuf::from("/srv/media/uploads/a.jpg")
        );
    }
}
