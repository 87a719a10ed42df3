//! Image blob storage.
//!
//! Slides reference stored images as `local://<id>`. Ids are derived from the
//! image bytes, so storing the same image twice yields the same id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::project::ProjectError;

/// URL scheme for images held in an [`ImageStore`].
pub const LOCAL_IMAGE_SCHEME: &str = "local://";

/// Blob store for slide images.
pub trait ImageStore: Send + Sync {
    /// Store `bytes`, returning their id.
    fn put(&self, bytes: &[u8]) -> Result<String, ProjectError>;

    /// Fetch a blob by id.
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, ProjectError>;
}

/// Content id for a blob.
pub fn image_id(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let hex: String = digest.iter().take(12).map(|b| format!("{b:02x}")).collect();
    format!("img_{hex}")
}

/// Extract the blob id from a `local://` image source.
pub fn local_image_id(src: &str) -> Option<&str> {
    src.strip_prefix(LOCAL_IMAGE_SCHEME).filter(|id| is_valid_id(id))
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// One file per blob under a root directory.
#[derive(Debug, Clone)]
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ImageStore for FsImageStore {
    fn put(&self, bytes: &[u8]) -> Result<String, ProjectError> {
        let id = image_id(bytes);
        let path = self.root.join(&id);
        if path.exists() {
            return Ok(id);
        }

        std::fs::create_dir_all(&self.root).map_err(|e| ProjectError::IoError {
            path: self.root.clone(),
            source: e,
        })?;
        let tmp = self.root.join(format!("{id}.tmp"));
        std::fs::write(&tmp, bytes).map_err(|e| ProjectError::IoError {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| ProjectError::IoError {
            path: path.clone(),
            source: e,
        })?;

        tracing::debug!(id = %id, bytes = bytes.len(), "Stored image");
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, ProjectError> {
        if !is_valid_id(id) {
            return Ok(None);
        }
        let path = self.root.join(id);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ProjectError::IoError { path, source: e }),
        }
    }
}

/// In-memory image store.
#[derive(Debug, Default)]
pub struct MemoryImageStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ImageStore for MemoryImageStore {
    fn put(&self, bytes: &[u8]) -> Result<String, ProjectError> {
        let id = image_id(bytes);
        self.blobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(id.clone())
            .or_insert_with(|| bytes.to_vec());
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, ProjectError> {
        Ok(self
            .blobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_id_is_content_addressed() {
        let a = image_id(b"hello");
        assert_eq!(a, image_id(b"hello"));
        assert_ne!(a, image_id(b"hello!"));
        assert!(a.starts_with("img_"));
        assert_eq!(a.len(), 4 + 24);
    }

    #[test]
    fn test_local_image_id() {
        assert_eq!(local_image_id("local://img_abc"), Some("img_abc"));
        assert_eq!(local_image_id("local://../etc/passwd"), None);
        assert_eq!(local_image_id("https://example.com/a.png"), None);
        assert_eq!(local_image_id("local://"), None);
    }

    #[test]
    fn test_fs_store_roundtrip() {
        let dir = std::env::temp_dir().join(format!("tokslides_test_images_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let store = FsImageStore::new(&dir);

        let id = store.put(b"\x89PNG fake").unwrap();
        assert_eq!(store.put(b"\x89PNG fake").unwrap(), id);
        assert_eq!(store.get(&id).unwrap().as_deref(), Some(&b"\x89PNG fake"[..]));
        assert_eq!(store.get("img_missing").unwrap(), None);
        assert_eq!(store.get("../escape").unwrap(), None);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryImageStore::new();
        let id = store.put(&[1, 2, 3]).unwrap();
        assert_eq!(store.get(&id).unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.get("nope").unwrap(), None);
    }
}
