//! Refresh by change detection (§4.2 "Refresh by change detection", 5
//! steps).
//!
//! **Redesign flag applied** (spec.md §9 open questions / DESIGN.md): the
//! original behaviour forced `updated_files = 0` and counted every
//! downloaded object as `new_files`. This implementation emits the
//! correct `new` / `modified` partition in [`RefreshReport`] instead.

use std::path::PathBuf;

use anyhow::Result;
use tracing::info;
use vectorgate_core::store::VectorStoreBackend;

use super::ingest::{ingest_files, IngestParams};
use super::object_store::ObjectStore;

const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "html", "htm", "md", "txt", "csv", "png", "jpg", "jpeg", "gif"];

pub struct RefreshReport {
    pub processed_files: usize,
    pub new_files: usize,
    pub updated_files: usize,
    pub total_chunks: usize,
}

/// Partition of current bucket objects against what the live table
/// already has on record (§4.2 refresh step 3).
struct Partition {
    new: Vec<String>,
    modified: Vec<String>,
}

fn partition_objects(
    current: &[super::object_store::ObjectListing],
    stored: &[vectorgate_core::store::StoredFileMeta],
) -> Partition {
    let mut new = Vec::new();
    let mut modified = Vec::new();

    for obj in current {
        let ext_ok = std::path::Path::new(&obj.name)
            .extension()
            .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_string_lossy().to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if !ext_ok {
            continue;
        }

        match stored.iter().find(|s| s.filename == obj.name) {
            None => new.push(obj.name.clone()),
            Some(existing) => {
                // Files lacking both etag and time_modified in the live
                // store are "old-format" and skipped to avoid false
                // duplicates (§4.2 refresh step 3).
                if existing.etag.is_none() && existing.time_modified.is_none() {
                    continue;
                }
                let etag_changed = existing.etag.as_deref() != Some(obj.etag.as_str());
                let time_changed = existing
                    .time_modified
                    .map(|t| t != obj.time_modified)
                    .unwrap_or(true);
                if etag_changed || time_changed {
                    modified.push(obj.name.clone());
                }
            }
        }
    }

    Partition { new, modified }
}

/// Run the change-detection refresh for `bucket_name` against the
/// existing VectorStore `table_name`, using its original ingest
/// parameters.
pub async fn refresh(
    backend: &dyn VectorStoreBackend,
    object_store: &dyn ObjectStore,
    embedder: &dyn vectorgate_core::embedding::EmbeddingProvider,
    table_name: &str,
    bucket_name: &str,
    client_id: &str,
    params: &IngestParams,
) -> Result<RefreshReport> {
    let current = object_store.list_objects(bucket_name).await?;
    let stored = backend.distinct_file_metadata(table_name).await?;
    let partition = partition_objects(&current, &stored);

    let to_download: Vec<&String> = partition.new.iter().chain(partition.modified.iter()).collect();

    // Scratch directory rooted by client-id + "refresh" (§4.2 step 4, §5
    // "Scratch directories... rooted by client-id and functional area").
    let scratch_dir = std::env::temp_dir().join(client_id).join("refresh");
    std::fs::create_dir_all(&scratch_dir)?;

    let cleanup = |dir: &std::path::Path| {
        let _ = std::fs::remove_dir_all(dir);
    };

    let result: Result<RefreshReport> = async {
        let mut downloaded_paths: Vec<PathBuf> = Vec::new();
        for name in &to_download {
            let dest = scratch_dir.join(name);
            object_store.download(bucket_name, name, &dest).await?;
            downloaded_paths.push(dest);
        }

        let report = ingest_files(backend, embedder, &downloaded_paths, params).await?;

        info!(
            bucket = %bucket_name,
            new_files = partition.new.len(),
            updated_files = partition.modified.len(),
            "refresh ingest complete"
        );

        Ok(RefreshReport {
            processed_files: downloaded_paths.len(),
            new_files: partition.new.len(),
            updated_files: partition.modified.len(),
            total_chunks: report.chunks_embedded,
        })
    }
    .await;

    // Enforce cleanup of the scratch directory on all exit paths (§4.2
    // refresh step 5, §5 "Engine is responsible for full cleanup on every
    // exit path including error").
    cleanup(&scratch_dir);

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectorstore::object_store::{LocalDirectoryObjectStore, ObjectStore as _};
    use crate::vectorstore::sqlite_backend::SqliteVectorBackend;
    use async_trait::async_trait;
    use vectorgate_core::models::{DistanceMetric, IndexType};

    struct FakeEmbedder;
    #[async_trait]
    impl vectorgate_core::embedding::EmbeddingProvider for FakeEmbedder {
        fn model_name(&self) -> &str {
            "fake"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 0.0]).collect())
        }
    }

    fn params() -> IngestParams {
        IngestParams {
            alias: "Docs".into(),
            description: None,
            embedding_model_id: "fake".into(),
            chunk_size: 500,
            chunk_overlap: 50,
            distance_metric: DistanceMetric::Euclidean,
            index_type: IndexType::Flat,
            rate_limit_per_minute: 0,
            bucket_name: Some("bucket".into()),
        }
    }

    #[tokio::test]
    async fn new_and_modified_files_are_downloaded_then_scratch_is_cleaned() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        let backend = SqliteVectorBackend::new(pool);
        backend.ensure_side_tables().await.unwrap();

        let bucket_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(bucket_dir.path().join("bucket")).unwrap();
        std::fs::write(bucket_dir.path().join("bucket/a.txt"), "first file content").unwrap();
        std::fs::write(bucket_dir.path().join("bucket/b.txt"), "second file content").unwrap();
        let object_store = LocalDirectoryObjectStore::new(bucket_dir.path());
        let embedder = FakeEmbedder;

        let table_name =
            vectorgate_core::models::VectorStoreDescriptor::derive_table_name(
                "Docs", "fake", 500, 50, DistanceMetric::Euclidean, IndexType::Flat,
            );
        backend.create_or_truncate(&table_name, 2).await.unwrap();

        let report = refresh(&backend, &object_store, &embedder, &table_name, "bucket", "client1", &params())
            .await
            .unwrap();

        assert_eq!(report.new_files, 2);
        assert_eq!(report.updated_files, 0);
        assert_eq!(report.processed_files, 2);

        let scratch = std::env::temp_dir().join("client1").join("refresh");
        assert!(!scratch.exists());
    }

    #[test]
    fn old_format_rows_without_etag_or_mtime_are_skipped() {
        let current = vec![super::super::object_store::ObjectListing {
            name: "a.txt".into(),
            size: 10,
            etag: "E2".into(),
            time_modified: chrono::Utc::now(),
            md5: "x".into(),
        }];
        let stored = vec![vectorgate_core::store::StoredFileMeta {
            filename: "a.txt".into(),
            etag: None,
            time_modified: None,
        }];
        let partition = partition_objects(&current, &stored);
        assert!(partition.new.is_empty());
        assert!(partition.modified.is_empty());
    }
}
