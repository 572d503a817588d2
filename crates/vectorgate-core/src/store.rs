//! Abstract storage backend for the Vector Store Engine.
//!
//! Generalizes the teacher's `Store` trait (originally scoped to one
//! SQLite-backed document/chunk store) to the per-[`VectorStoreDescriptor`]
//! table operations the two-phase merge, refresh, and discovery flows need
//! (§4.2). A concrete SQLite implementation lives in
//! `vectorgate-server::vectorstore::sqlite_backend`.

use async_trait::async_trait;
use anyhow::Result;

use crate::models::{ChunkMetadata, DistanceMetric, IndexType, VectorRow};

/// A candidate row returned from a similarity search against one table.
#[derive(Debug, Clone)]
pub struct CandidateRow {
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub raw_distance: f64,
}

/// Per-file metadata recovered from a live table, used by the
/// change-detection refresh (§4.2 "Refresh by change detection" step 2).
#[derive(Debug, Clone)]
pub struct StoredFileMeta {
    pub filename: String,
    pub etag: Option<String>,
    pub time_modified: Option<chrono::DateTime<chrono::Utc>>,
}

/// Abstract backend for one relational database's vector-capable tables.
#[async_trait]
pub trait VectorStoreBackend: Send + Sync {
    /// Create table `name` (if absent) or truncate it (if present) with the
    /// schema needed to hold [`VectorRow`]s — used both for a brand new
    /// live table and for the `T_TMP` staging table (§4.2 step 2).
    async fn create_or_truncate(&self, table: &str, dims: usize) -> Result<()>;

    /// Insert rows into `table`, used for staging-table population during
    /// batched embedding (§4.2 step 3).
    async fn insert_rows(&self, table: &str, rows: &[VectorRow]) -> Result<()>;

    /// Drop the index on `table` if one exists and is of type
    /// [`IndexType::Hnsw`] (§4.2 step 4 — only HNSW indexes are dropped
    /// around a merge).
    async fn drop_index_if_hnsw(&self, table: &str, index_type: IndexType) -> Result<()>;

    /// `INSERT ... SELECT` from `staging` into `live`, skipping any row
    /// whose `id` already exists in `live` (anti-join). Returns the number
    /// of rows actually inserted (§4.2 step 5).
    async fn merge_anti_join(&self, live: &str, staging: &str) -> Result<u64>;

    /// Drop `table` entirely (§4.2 step 6, and the explicit VectorStore
    /// drop operation from §3's lifecycle).
    async fn drop_table(&self, table: &str) -> Result<()>;

    /// (Re)build the configured index on `table` (§4.2 step 7).
    async fn create_index(&self, table: &str, index_type: IndexType) -> Result<()>;

    /// Write the structured `GENAI: <payload>` metadata comment on `table`
    /// (§4.2 step 8).
    async fn write_comment(&self, table: &str, comment: &str) -> Result<()>;

    /// Read back a table's comment, if any.
    async fn read_comment(&self, table: &str) -> Result<Option<String>>;

    /// List every table whose comment begins with the vector-store
    /// sentinel and is non-empty (§4.2 "Discovery").
    async fn list_vector_tables(&self) -> Result<Vec<String>>;

    /// Distinct per-file metadata currently stored in `table`, keyed by
    /// filename (§4.2 refresh step 2).
    async fn distinct_file_metadata(&self, table: &str) -> Result<Vec<StoredFileMeta>>;

    /// Row-level metadata for every chunk belonging to `filename` in
    /// `table` — backs the `/v1/embed/{vs}/files` listing.
    async fn chunk_metadata_for_file(&self, table: &str, filename: &str) -> Result<Vec<ChunkMetadata>>;

    /// Run the table's similarity search using `metric`'s native distance
    /// (cosine distance, dot product, or L2), returning up to `limit`
    /// candidates best-first (ascending distance for cosine/euclidean,
    /// descending dot product for dot — the caller converts to similarity
    /// via `DistanceMetric::similarity`).
    async fn similarity_search(&self, table: &str, query: &[f32], limit: u32, metric: DistanceMetric) -> Result<Vec<CandidateRow>>;

    /// Row count, used by idempotence tests and the files listing.
    async fn row_count(&self, table: &str) -> Result<u64>;
}
