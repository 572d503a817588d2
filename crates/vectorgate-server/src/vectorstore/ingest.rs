//! Vector Store Engine: two-phase merge (§4.2 "Two-phase merge", 8 steps).
//!
//! Generalizes the teacher's `ingest.rs` sync orchestration (connector →
//! chunk → embed → store) to the spec's table-per-store, stage-then-merge
//! design: embed into a sibling `T_TMP` table in batches, then
//! `INSERT ... SELECT ... WHERE NOT EXISTS` into the live table so repeat
//! ingests are idempotent (§8 invariant 2).

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use vectorgate_core::embedding::EmbeddingProvider;
use vectorgate_core::models::{ChunkMetadata, DistanceMetric, IndexType, VectorRow, VectorStoreDescriptor};
use vectorgate_core::store::VectorStoreBackend;

use super::loaders::load_and_split;

const EMBED_BATCH_SIZE: usize = 500;

/// Parameters needed to ingest a set of source files into a VectorStore.
pub struct IngestParams {
    pub alias: String,
    pub description: Option<String>,
    pub embedding_model_id: String,
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    pub distance_metric: DistanceMetric,
    pub index_type: IndexType,
    pub rate_limit_per_minute: u32,
    pub bucket_name: Option<String>,
}

/// Per-file ingest error, recoverable: the bad file is skipped and
/// recorded, the overall call still returns partial success (§7
/// "Integrity errors in ingest are recoverable").
pub struct IngestFileError {
    pub filename: String,
    pub detail: String,
}

pub struct IngestReport {
    pub table_name: String,
    pub files_processed: usize,
    pub chunks_embedded: usize,
    pub rows_inserted: u64,
    pub errors: Vec<IngestFileError>,
}

/// Run the full ingest pipeline over `files` into the VectorStore derived
/// from `params`, via `backend`.
pub async fn ingest_files(
    backend: &dyn VectorStoreBackend,
    embedder: &dyn EmbeddingProvider,
    files: &[std::path::PathBuf],
    params: &IngestParams,
) -> Result<IngestReport> {
    let table_name = VectorStoreDescriptor::derive_table_name(
        &params.alias,
        &params.embedding_model_id,
        params.chunk_size,
        params.chunk_overlap,
        params.distance_metric,
        params.index_type,
    );
    let staging_table = format!("{table_name}_TMP");

    let mut errors = Vec::new();
    let mut all_chunks: Vec<(String, vectorgate_core::chunk::TextChunk, ChunkMetadata)> = Vec::new();

    for path in files {
        match load_one_file(path, params) {
            Ok((basename, chunks, meta)) => {
                for chunk in chunks {
                    all_chunks.push((basename.clone(), chunk, meta.clone()));
                }
            }
            Err(e) => errors.push(IngestFileError {
                filename: path.display().to_string(),
                detail: e.to_string(),
            }),
        }
    }

    // Step 3 dedup: by exact page-content equality.
    let mut seen_text = std::collections::HashSet::new();
    all_chunks.retain(|(_, chunk, _)| seen_text.insert(chunk.text.clone()));

    // Step 2: create/truncate the sibling staging table.
    backend.create_or_truncate(&staging_table, embedder.dims()).await?;

    let mut embedded_count = 0usize;
    for (batch_idx, batch) in all_chunks.chunks(EMBED_BATCH_SIZE).enumerate() {
        if batch_idx > 0 && params.rate_limit_per_minute > 0 {
            let sleep_secs = 60.0 / params.rate_limit_per_minute as f64;
            tokio::time::sleep(Duration::from_secs_f64(sleep_secs)).await;
        }

        let texts: Vec<String> = batch.iter().map(|(_, c, _)| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;

        let rows: Vec<VectorRow> = batch
            .iter()
            .zip(vectors.into_iter())
            .map(|((basename, chunk, meta), embedding)| VectorRow {
                id: format!("{basename}_{}", chunk.ordinal),
                text: chunk.text.clone(),
                embedding,
                metadata: meta.clone(),
            })
            .collect();

        backend.insert_rows(&staging_table, &rows).await?;
        embedded_count += rows.len();
    }

    // Step 4: drop the index on T if HNSW.
    backend.drop_index_if_hnsw(&table_name, params.index_type).await?;

    // Step 5: anti-join merge into the live table. `create_or_truncate`
    // truncates an existing table, which would defeat idempotent repeat
    // ingests — only call it the first time this table is created.
    let is_new = backend.read_comment(&table_name).await?.is_none();
    if is_new {
        backend.create_or_truncate(&table_name, embedder.dims()).await?;
    }
    let rows_inserted = backend.merge_anti_join(&table_name, &staging_table).await?;

    // Step 6: drop the staging table.
    backend.drop_table(&staging_table).await?;

    // Step 7: (re)build the configured index.
    backend.create_index(&table_name, params.index_type).await?;

    // Step 8: write the metadata comment.
    let descriptor = VectorStoreDescriptor {
        table_name: table_name.clone(),
        alias: params.alias.clone(),
        description: params.description.clone(),
        embedding_model_id: params.embedding_model_id.clone(),
        chunk_size: params.chunk_size,
        chunk_overlap: params.chunk_overlap,
        distance_metric: params.distance_metric,
        index_type: params.index_type,
    };
    backend.write_comment(&table_name, &descriptor.to_comment_payload()).await?;

    info!(table = %table_name, rows_inserted, chunks_embedded = embedded_count, "ingest complete");

    Ok(IngestReport {
        table_name,
        files_processed: files.len() - errors.len(),
        chunks_embedded: embedded_count,
        rows_inserted,
        errors,
    })
}

fn load_one_file(
    path: &Path,
    params: &IngestParams,
) -> Result<(String, Vec<vectorgate_core::chunk::TextChunk>, ChunkMetadata)> {
    let loaded = load_and_split(path, params.chunk_size, params.chunk_overlap)?;
    let fs_meta = std::fs::metadata(path).ok();
    let size = fs_meta.as_ref().map(|m| m.len());
    let time_modified = fs_meta
        .as_ref()
        .and_then(|m| m.modified().ok())
        .map(chrono::DateTime::<chrono::Utc>::from);

    let meta = ChunkMetadata {
        filename: loaded.basename.clone(),
        source: loaded.basename.clone(),
        etag: None,
        time_modified,
        size,
        bucket_name: params.bucket_name.clone(),
        extra: Default::default(),
    };
    Ok((loaded.basename, loaded.chunks, meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectorstore::sqlite_backend::SqliteVectorBackend;
    use async_trait::async_trait;

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        fn model_name(&self) -> &str {
            "fake"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 0.0]).collect())
        }
    }

    async fn backend() -> SqliteVectorBackend {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        let backend = SqliteVectorBackend::new(pool);
        backend.ensure_side_tables().await.unwrap();
        backend
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
            bucket_name: None,
        }
    }

    #[tokio::test]
    async fn repeat_ingest_of_same_file_is_idempotent() {
        let backend = backend().await;
        let embedder = FakeEmbedder;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "hello world, this is a test document.").unwrap();
        let files = vec![path];

        let report1 = ingest_files(&backend, &embedder, &files, &params()).await.unwrap();
        let count1 = backend.row_count(&report1.table_name).await.unwrap();

        let report2 = ingest_files(&backend, &embedder, &files, &params()).await.unwrap();
        let count2 = backend.row_count(&report2.table_name).await.unwrap();

        assert_eq!(count1, count2);
        assert_eq!(report1.table_name, report2.table_name);
    }

    #[tokio::test]
    async fn bad_file_is_recorded_and_skipped() {
        let backend = backend().await;
        let embedder = FakeEmbedder;
        let files = vec![std::path::PathBuf::from("/nonexistent/ghost.txt")];
        let report = ingest_files(&backend, &embedder, &files, &params()).await.unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.files_processed, 0);
    }
}
