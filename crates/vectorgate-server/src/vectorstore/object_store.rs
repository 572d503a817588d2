//! Object-store contract (§4.2 "Refresh by change detection", §6
//! "low-level object-storage... drivers are treated as interfaces only").
//!
//! spec.md scopes the cloud object-store driver itself out of the core;
//! what's specified is the shape of what refresh needs: `{name, size,
//! etag, time_modified, md5}` per object, filtered to supported
//! extensions, plus a download-into-scratch-directory operation. This
//! crate ships one concrete implementation — a local-directory "bucket" —
//! grounded on the teacher's `connector_fs.rs` (`walkdir` + `globset`,
//! already a workspace dependency), which is enough to exercise and test
//! the refresh flow end to end; a real OCI/S3 object-store client would
//! implement the same trait.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// One object as currently listed from a bucket.
#[derive(Debug, Clone)]
pub struct ObjectListing {
    pub name: String,
    pub size: u64,
    pub etag: String,
    pub time_modified: DateTime<Utc>,
    pub md5: String,
}

/// Abstract bucket the change-detection refresh (§4.2) lists and
/// downloads from.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_objects(&self, bucket_name: &str) -> Result<Vec<ObjectListing>>;
    async fn download(&self, bucket_name: &str, object_name: &str, dest: &Path) -> Result<()>;
}

/// Treats a local filesystem directory as a "bucket": `bucket_name` is a
/// path relative to `root`. ETags are a content hash (there is no S3-style
/// multipart ETag semantics to emulate locally); `time_modified` is the
/// file's mtime.
pub struct LocalDirectoryObjectStore {
    root: PathBuf,
}

impl LocalDirectoryObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for LocalDirectoryObjectStore {
    async fn list_objects(&self, bucket_name: &str) -> Result<Vec<ObjectListing>> {
        let bucket_root = self.root.join(bucket_name);
        let mut out = Vec::new();
        if !bucket_root.exists() {
            return Ok(out);
        }
        for entry in WalkDir::new(&bucket_root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            let etag = hex::encode(&hasher.finalize()[..8]);
            let metadata = entry.metadata().with_context(|| format!("stat {}", path.display()))?;
            let time_modified: DateTime<Utc> = metadata.modified().ok().map(DateTime::<Utc>::from).unwrap_or_else(Utc::now);
            let name = path
                .strip_prefix(&bucket_root)
                .unwrap_or(path)
                .to_string_lossy()
                .to_string();
            out.push(ObjectListing { name, size: bytes.len() as u64, etag: etag.clone(), time_modified, md5: etag });
        }
        Ok(out)
    }

    async fn download(&self, bucket_name: &str, object_name: &str, dest: &Path) -> Result<()> {
        let src = self.root.join(bucket_name).join(object_name);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&src, dest).with_context(|| format!("copying {} to {}", src.display(), dest.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_files_in_bucket_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("my-bucket")).unwrap();
        std::fs::write(dir.path().join("my-bucket/a.txt"), b"hello").unwrap();
        let store = LocalDirectoryObjectStore::new(dir.path());
        let objects = store.list_objects("my-bucket").await.unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].name, "a.txt");
        assert_eq!(objects[0].size, 5);
    }

    #[tokio::test]
    async fn missing_bucket_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirectoryObjectStore::new(dir.path());
        assert!(store.list_objects("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn download_copies_into_scratch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("b/f.txt"), b"data").unwrap();
        let store = LocalDirectoryObjectStore::new(dir.path());
        let scratch = tempfile::tempdir().unwrap();
        let dest = scratch.path().join("f.txt");
        store.download("b", "f.txt", &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"data");
    }
}
