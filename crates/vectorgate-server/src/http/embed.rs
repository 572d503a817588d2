//! Vector Store Engine endpoints (§6, §4.2): stage files into a per-client
//! scratch directory via three "store" routes, then ingest/refresh/drop/list
//! against the staged or already-live table.
//!
//! Local uploads travel as JSON + base64 rather than `multipart/form-data` —
//! this keeps the route bodies uniform with the rest of the surface and
//! avoids a second request-parsing path for what is, functionally, just a
//! write into the scratch directory.

use std::path::{Path, PathBuf};

use axum::extract::{Path as AxumPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sqlx::{Column, Row, TypeInfo};
use vectorgate_core::models::{ChunkMetadata, DistanceMetric, IndexType};
use vectorgate_core::store::VectorStoreBackend;
use vectorgate_core::GatewayError;

use super::auth::client_id;
use super::error::AppError;
use super::state::AppState;
use crate::providers;
use crate::vectorstore::object_store::{LocalDirectoryObjectStore, ObjectStore};
use crate::vectorstore::{discovery, ingest_files, refresh as run_refresh, IngestParams};

const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "html", "htm", "md", "txt", "csv", "png", "jpg", "jpeg", "gif"];

fn scratch_dir(client: &str) -> PathBuf {
    std::env::temp_dir().join(client).join("embed")
}

fn has_supported_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_string_lossy().to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// local/web/sql store
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct LocalFileUpload {
    pub filename: String,
    /// Base64-encoded file bytes.
    pub content_base64: String,
}

#[derive(Deserialize)]
pub struct LocalStoreRequest {
    pub files: Vec<LocalFileUpload>,
}

#[derive(Serialize)]
pub struct StoreResponse {
    pub stored_files: Vec<String>,
}

pub async fn local_store(
    headers: HeaderMap,
    Json(req): Json<LocalStoreRequest>,
) -> Result<Json<StoreResponse>, AppError> {
    let client = client_id(&headers);
    let dir = scratch_dir(&client);
    std::fs::create_dir_all(&dir).map_err(|e| GatewayError::integrity(e.to_string()))?;

    let mut stored = Vec::with_capacity(req.files.len());
    for file in req.files {
        if !has_supported_extension(&file.filename) {
            return Err(GatewayError::validation(format!("unsupported file extension: {}", file.filename)).into());
        }
        let bytes = BASE64
            .decode(file.content_base64.as_bytes())
            .map_err(|e| GatewayError::validation(format!("invalid base64 for {}: {e}", file.filename)))?;
        std::fs::write(dir.join(&file.filename), bytes).map_err(|e| GatewayError::integrity(e.to_string()))?;
        stored.push(file.filename);
    }
    Ok(Json(StoreResponse { stored_files: stored }))
}

#[derive(Deserialize)]
pub struct WebStoreRequest {
    pub url: String,
    pub filename: Option<String>,
}

pub async fn web_store(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<WebStoreRequest>,
) -> Result<Json<StoreResponse>, AppError> {
    let client = client_id(&headers);
    let filename = req.filename.unwrap_or_else(|| {
        req.url.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or("fetched.html").to_string()
    });
    if !has_supported_extension(&filename) {
        return Err(GatewayError::validation(format!("unsupported file type for web fetch: {filename}")).into());
    }

    let response = state
        .http_client
        .get(&req.url)
        .send()
        .await
        .map_err(|e| GatewayError::availability(format!("fetching {}: {e}", req.url)))?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| GatewayError::availability(format!("reading body of {}: {e}", req.url)))?;

    let dir = scratch_dir(&client);
    std::fs::create_dir_all(&dir).map_err(|e| GatewayError::integrity(e.to_string()))?;
    std::fs::write(dir.join(&filename), &bytes).map_err(|e| GatewayError::integrity(e.to_string()))?;

    Ok(Json(StoreResponse { stored_files: vec![filename] }))
}

#[derive(Deserialize)]
pub struct SqlStoreRequest {
    pub database: String,
    pub sql: String,
    #[serde(default = "default_sql_filename")]
    pub filename: String,
}

fn default_sql_filename() -> String {
    "query_result.csv".to_string()
}

fn is_select_only(sql: &str) -> bool {
    let trimmed = sql.trim().trim_end_matches(';');
    trimmed.to_ascii_lowercase().starts_with("select") && !trimmed.contains(';')
}

pub async fn sql_store(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SqlStoreRequest>,
) -> Result<Json<StoreResponse>, AppError> {
    if !is_select_only(&req.sql) {
        return Err(GatewayError::validation("sql_store only accepts a single SELECT statement").into());
    }
    if !has_supported_extension(&req.filename) {
        return Err(GatewayError::validation(format!("unsupported file extension: {}", req.filename)).into());
    }

    let client = client_id(&headers);
    let pool = state.registries.databases.acquire(&req.database, false).await?;
    let rows = sqlx::query(&req.sql)
        .fetch_all(&pool)
        .await
        .map_err(|e| GatewayError::integrity(format!("query failed: {e}")))?;

    let csv = rows_to_csv(&rows);
    let dir = scratch_dir(&client);
    std::fs::create_dir_all(&dir).map_err(|e| GatewayError::integrity(e.to_string()))?;
    std::fs::write(dir.join(&req.filename), csv).map_err(|e| GatewayError::integrity(e.to_string()))?;

    Ok(Json(StoreResponse { stored_files: vec![req.filename] }))
}

fn csv_field(raw: &str) -> String {
    if raw.contains(',') || raw.contains('"') || raw.contains('\n') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn rows_to_csv(rows: &[sqlx::sqlite::SqliteRow]) -> String {
    let mut out = String::new();
    let Some(first) = rows.first() else { return out };
    let columns: Vec<String> = first.columns().iter().map(|c| c.name().to_string()).collect();
    out.push_str(&columns.iter().map(|c| csv_field(c)).collect::<Vec<_>>().join(","));
    out.push('\n');

    for row in rows {
        let mut fields = Vec::with_capacity(columns.len());
        for col in row.columns() {
            let name = col.name();
            let value: String = match col.type_info().name() {
                "INTEGER" | "BOOLEAN" => row.try_get::<Option<i64>, _>(name).ok().flatten().map(|v| v.to_string()).unwrap_or_default(),
                "REAL" => row.try_get::<Option<f64>, _>(name).ok().flatten().map(|v| v.to_string()).unwrap_or_default(),
                _ => row.try_get::<Option<String>, _>(name).ok().flatten().unwrap_or_default(),
            };
            fields.push(csv_field(&value));
        }
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

// ---------------------------------------------------------------------------
// ingest / refresh / drop / list
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct IngestRequest {
    pub alias: String,
    pub description: Option<String>,
    pub embedding_model_id: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: u32,
    #[serde(default = "default_distance_metric")]
    pub distance_metric: DistanceMetric,
    #[serde(default = "default_index_type")]
    pub index_type: IndexType,
    #[serde(default)]
    pub rate_limit_per_minute: u32,
    pub database: String,
    pub bucket_name: Option<String>,
}

fn default_chunk_size() -> u32 {
    512
}
fn default_chunk_overlap() -> u32 {
    51
}
fn default_distance_metric() -> DistanceMetric {
    DistanceMetric::Cosine
}
fn default_index_type() -> IndexType {
    IndexType::Flat
}

#[derive(Serialize)]
pub struct IngestResponse {
    pub table_name: String,
    pub files_processed: usize,
    pub chunks_embedded: usize,
    pub rows_inserted: u64,
    pub errors: Vec<String>,
}

/// Split/embed everything currently staged in this client's scratch
/// directory into a VectorStore, then remove the scratch directory
/// regardless of outcome (§4.2 step 5, §5 cleanup-on-every-exit-path).
pub async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    let client = client_id(&headers);
    let dir = scratch_dir(&client);

    let result: Result<IngestResponse, AppError> = async {
        let files: Vec<PathBuf> = std::fs::read_dir(&dir)
            .map_err(|e| GatewayError::validation(format!("no staged files to ingest: {e}")))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        if files.is_empty() {
            return Err(GatewayError::validation("no staged files to ingest").into());
        }

        let embedder = providers::resolve_embedding_model(&state.registries, &req.embedding_model_id)?;
        let pool = state.registries.databases.acquire(&req.database, false).await?;
        let backend = crate::vectorstore::sqlite_backend::SqliteVectorBackend::new(pool);
        backend.ensure_side_tables().await.map_err(|e| GatewayError::integrity(e.to_string()))?;

        let params = IngestParams {
            alias: req.alias,
            description: req.description,
            embedding_model_id: req.embedding_model_id,
            chunk_size: req.chunk_size,
            chunk_overlap: req.chunk_overlap,
            distance_metric: req.distance_metric,
            index_type: req.index_type,
            rate_limit_per_minute: req.rate_limit_per_minute,
            bucket_name: req.bucket_name,
        };
        let report = ingest_files(&backend, embedder.as_ref(), &files, &params)
            .await
            .map_err(|e| GatewayError::integrity(e.to_string()))?;

        Ok(IngestResponse {
            table_name: report.table_name,
            files_processed: report.files_processed,
            chunks_embedded: report.chunks_embedded,
            rows_inserted: report.rows_inserted,
            errors: report.errors.into_iter().map(|e| format!("{}: {}", e.filename, e.detail)).collect(),
        })
    }
    .await;

    let _ = std::fs::remove_dir_all(&dir);
    Ok(Json(result?))
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub alias: String,
    pub database: String,
    pub bucket_name: String,
    pub bucket_root: String,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub processed_files: usize,
    pub new_files: usize,
    pub updated_files: usize,
    pub total_chunks: usize,
}

pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AppError> {
    let client = client_id(&headers);
    let pool = state.registries.databases.acquire(&req.database, false).await?;
    let backend = crate::vectorstore::sqlite_backend::SqliteVectorBackend::new(pool);
    backend.ensure_side_tables().await.map_err(|e| GatewayError::integrity(e.to_string()))?;

    let stores = discovery::list_vector_stores(&backend).await.map_err(|e| GatewayError::integrity(e.to_string()))?;
    let descriptor = stores
        .into_iter()
        .find(|d| d.alias == req.alias)
        .ok_or_else(|| GatewayError::identity(format!("unknown vector store: {}", req.alias)))?;

    let embedder = providers::resolve_embedding_model(&state.registries, &descriptor.embedding_model_id)?;
    let object_store = LocalDirectoryObjectStore::new(&req.bucket_root);
    let params = IngestParams {
        alias: descriptor.alias.clone(),
        description: descriptor.description.clone(),
        embedding_model_id: descriptor.embedding_model_id.clone(),
        chunk_size: descriptor.chunk_size,
        chunk_overlap: descriptor.chunk_overlap,
        distance_metric: descriptor.distance_metric,
        index_type: descriptor.index_type,
        rate_limit_per_minute: 0,
        bucket_name: Some(req.bucket_name.clone()),
    };

    let report = run_refresh(&backend, &object_store, embedder.as_ref(), &descriptor.table_name, &req.bucket_name, &client, &params)
        .await
        .map_err(|e| GatewayError::integrity(e.to_string()))?;

    Ok(Json(RefreshResponse {
        processed_files: report.processed_files,
        new_files: report.new_files,
        updated_files: report.updated_files,
        total_chunks: report.total_chunks,
    }))
}

#[derive(Deserialize)]
pub struct DropQuery {
    pub database: String,
}

pub async fn drop_store(
    State(state): State<AppState>,
    AxumPath(alias): AxumPath<String>,
    axum::extract::Query(query): axum::extract::Query<DropQuery>,
) -> Result<StatusCode, AppError> {
    let pool = state.registries.databases.acquire(&query.database, false).await?;
    let backend = crate::vectorstore::sqlite_backend::SqliteVectorBackend::new(pool);
    let stores = discovery::list_vector_stores(&backend).await.map_err(|e| GatewayError::integrity(e.to_string()))?;
    let descriptor = stores
        .into_iter()
        .find(|d| d.alias == alias)
        .ok_or_else(|| GatewayError::identity(format!("unknown vector store: {alias}")))?;
    backend.drop_table(&descriptor.table_name).await.map_err(|e| GatewayError::integrity(e.to_string()))?;
    Ok(StatusCode::OK)
}

#[derive(Serialize)]
pub struct FileEntry {
    pub filename: String,
    pub chunk_count: usize,
}

pub async fn list_files(
    State(state): State<AppState>,
    AxumPath(alias): AxumPath<String>,
    axum::extract::Query(query): axum::extract::Query<DropQuery>,
) -> Result<Json<Vec<FileEntry>>, AppError> {
    let pool = state.registries.databases.acquire(&query.database, false).await?;
    let backend = crate::vectorstore::sqlite_backend::SqliteVectorBackend::new(pool);
    let stores = discovery::list_vector_stores(&backend).await.map_err(|e| GatewayError::integrity(e.to_string()))?;
    let descriptor = stores
        .into_iter()
        .find(|d| d.alias == alias)
        .ok_or_else(|| GatewayError::identity(format!("unknown vector store: {alias}")))?;

    let files = backend.distinct_file_metadata(&descriptor.table_name).await.map_err(|e| GatewayError::integrity(e.to_string()))?;
    let mut entries = Vec::with_capacity(files.len());
    for file in files {
        let chunks: Vec<ChunkMetadata> = backend
            .chunk_metadata_for_file(&descriptor.table_name, &file.filename)
            .await
            .map_err(|e| GatewayError::integrity(e.to_string()))?;
        entries.push(FileEntry { filename: file.filename, chunk_count: chunks.len() });
    }
    Ok(Json(entries))
}
