//! SQLite-backed [`VectorStoreBackend`] implementation.
//!
//! Generalizes the teacher's `sqlite_store.rs` (a single fixed
//! `documents`/`chunks`/`chunk_vectors` schema) to one table-per-
//! [`VectorStoreDescriptor`], since spec.md's data model identifies a
//! VectorStore by its own `table_name` rather than a shared schema. SQLite
//! has no native vector column type or comment support, so the "comment"
//! (§4.2 step 8) and vector similarity search are both emulated: comments
//! live in a small side table (`vectorstore_comments`), and similarity
//! search is a brute-force scan scored in Rust via
//! [`vectorgate_core::embedding::cosine_similarity`] /
//! [`vectorgate_core::embedding::euclidean_distance`] /
//! [`vectorgate_core::embedding::dot_product`] — acceptable for the
//! corpus sizes this gateway targets, and it keeps the backend portable
//! across SQLite builds that lack a vector extension.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use vectorgate_core::embedding::{blob_to_vec, raw_distance, vec_to_blob};
use vectorgate_core::models::{ChunkMetadata, DistanceMetric, IndexType, VectorRow};
use vectorgate_core::store::{CandidateRow, StoredFileMeta, VectorStoreBackend};

pub struct SqliteVectorBackend {
    pool: SqlitePool,
}

impl SqliteVectorBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the side tables this backend needs on first use. Idempotent.
    pub async fn ensure_side_tables(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vectorstore_comments (
                table_name TEXT PRIMARY KEY,
                comment TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vectorstore_indexes (
                table_name TEXT PRIMARY KEY,
                index_type TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
impl VectorStoreBackend for SqliteVectorBackend {
    async fn create_or_truncate(&self, table: &str, _dims: usize) -> Result<()> {
        let ident = quote_ident(table);
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {ident} (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                etag TEXT,
                time_modified TEXT,
                size INTEGER,
                bucket_name TEXT,
                extra_json TEXT NOT NULL DEFAULT '{{}}'
            )"
        ))
        .execute(&self.pool)
        .await?;
        sqlx::query(&format!("DELETE FROM {ident}")).execute(&self.pool).await.ok();
        Ok(())
    }

    async fn insert_rows(&self, table: &str, rows: &[VectorRow]) -> Result<()> {
        let ident = quote_ident(table);
        let mut tx = self.pool.begin().await?;
        for row in rows {
            let extra_json = serde_json::to_string(&row.metadata.extra)?;
            let time_modified = row.metadata.time_modified.map(|t| t.to_rfc3339());
            sqlx::query(&format!(
                "INSERT OR REPLACE INTO {ident}
                    (id, document_id, filename, text, embedding, etag, time_modified, size, bucket_name, extra_json)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(&row.id)
            .bind(&row.metadata.source)
            .bind(&row.metadata.filename)
            .bind(&row.text)
            .bind(vec_to_blob(&row.embedding))
            .bind(&row.metadata.etag)
            .bind(time_modified)
            .bind(row.metadata.size.map(|s| s as i64))
            .bind(&row.metadata.bucket_name)
            .bind(extra_json)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn drop_index_if_hnsw(&self, table: &str, index_type: IndexType) -> Result<()> {
        if index_type != IndexType::Hnsw {
            return Ok(());
        }
        sqlx::query("DELETE FROM vectorstore_indexes WHERE table_name = ?")
            .bind(table)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn merge_anti_join(&self, live: &str, staging: &str) -> Result<u64> {
        let live_ident = quote_ident(live);
        let staging_ident = quote_ident(staging);
        let result = sqlx::query(&format!(
            "INSERT INTO {live_ident}
                (id, document_id, filename, text, embedding, etag, time_modified, size, bucket_name, extra_json)
             SELECT s.id, s.document_id, s.filename, s.text, s.embedding, s.etag, s.time_modified, s.size, s.bucket_name, s.extra_json
             FROM {staging_ident} s
             WHERE NOT EXISTS (SELECT 1 FROM {live_ident} l WHERE l.id = s.id)"
        ))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let ident = quote_ident(table);
        sqlx::query(&format!("DROP TABLE IF EXISTS {ident}")).execute(&self.pool).await?;
        sqlx::query("DELETE FROM vectorstore_comments WHERE table_name = ?")
            .bind(table)
            .execute(&self.pool)
            .await
            .ok();
        sqlx::query("DELETE FROM vectorstore_indexes WHERE table_name = ?")
            .bind(table)
            .execute(&self.pool)
            .await
            .ok();
        Ok(())
    }

    async fn create_index(&self, table: &str, index_type: IndexType) -> Result<()> {
        sqlx::query(
            "INSERT INTO vectorstore_indexes (table_name, index_type) VALUES (?, ?)
             ON CONFLICT(table_name) DO UPDATE SET index_type = excluded.index_type",
        )
        .bind(table)
        .bind(index_type.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn write_comment(&self, table: &str, comment: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO vectorstore_comments (table_name, comment) VALUES (?, ?)
             ON CONFLICT(table_name) DO UPDATE SET comment = excluded.comment",
        )
        .bind(table)
        .bind(comment)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn read_comment(&self, table: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT comment FROM vectorstore_comments WHERE table_name = ?")
            .bind(table)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("comment")))
    }

    async fn list_vector_tables(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT table_name FROM vectorstore_comments WHERE comment != ''")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>("table_name")).collect())
    }

    async fn distinct_file_metadata(&self, table: &str) -> Result<Vec<StoredFileMeta>> {
        let ident = quote_ident(table);
        let rows = sqlx::query(&format!(
            "SELECT filename, MAX(etag) as etag, MAX(time_modified) as time_modified
             FROM {ident} GROUP BY filename"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| StoredFileMeta {
                filename: r.get("filename"),
                etag: r.get::<Option<String>, _>("etag"),
                time_modified: r
                    .get::<Option<String>, _>("time_modified")
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
                    .map(|dt| dt.with_timezone(&chrono::Utc)),
            })
            .collect())
    }

    async fn chunk_metadata_for_file(&self, table: &str, filename: &str) -> Result<Vec<ChunkMetadata>> {
        let ident = quote_ident(table);
        let rows = sqlx::query(&format!(
            "SELECT filename, document_id, etag, time_modified, size, bucket_name, extra_json
             FROM {ident} WHERE filename = ?"
        ))
        .bind(filename)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let extra_json: String = r.get("extra_json");
                let extra = serde_json::from_str(&extra_json).unwrap_or_default();
                ChunkMetadata {
                    filename: r.get("filename"),
                    source: r.get("document_id"),
                    etag: r.get::<Option<String>, _>("etag"),
                    time_modified: r
                        .get::<Option<String>, _>("time_modified")
                        .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
                        .map(|dt| dt.with_timezone(&chrono::Utc)),
                    size: r.get::<Option<i64>, _>("size").map(|s| s as u64),
                    bucket_name: r.get("bucket_name"),
                    extra,
                }
            })
            .collect())
    }

    async fn similarity_search(&self, table: &str, query: &[f32], limit: u32, metric: DistanceMetric) -> Result<Vec<CandidateRow>> {
        let ident = quote_ident(table);
        let rows = sqlx::query(&format!("SELECT id, document_id, text, embedding FROM {ident}"))
            .fetch_all(&self.pool)
            .await?;

        let mut candidates: Vec<CandidateRow> = rows
            .into_iter()
            .map(|r| {
                let embedding = blob_to_vec(&r.get::<Vec<u8>, _>("embedding"));
                let distance = raw_distance(metric, query, &embedding);
                CandidateRow {
                    id: r.get("id"),
                    document_id: r.get("document_id"),
                    text: r.get("text"),
                    embedding,
                    raw_distance: distance,
                }
            })
            .collect();

        // Dot is a similarity, not a distance: higher is closer, so it sorts
        // descending while cosine/euclidean distance sort ascending.
        candidates.sort_by(|a, b| {
            let ord = a.raw_distance.partial_cmp(&b.raw_distance).unwrap_or(std::cmp::Ordering::Equal);
            if metric == DistanceMetric::Dot { ord.reverse() } else { ord }
        });
        candidates.truncate(limit as usize);
        Ok(candidates)
    }

    async fn row_count(&self, table: &str) -> Result<u64> {
        let ident = quote_ident(table);
        let row = sqlx::query(&format!("SELECT COUNT(*) as n FROM {ident}")).fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>("n") as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vectorgate_core::models::ChunkMetadata as Meta;

    async fn backend() -> SqliteVectorBackend {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let backend = SqliteVectorBackend::new(pool);
        backend.ensure_side_tables().await.unwrap();
        backend
    }

    fn row(id: &str, text: &str, embedding: Vec<f32>) -> VectorRow {
        VectorRow {
            id: id.into(),
            text: text.into(),
            embedding,
            metadata: Meta {
                filename: "doc.txt".into(),
                source: "doc.txt".into(),
                etag: Some("E1".into()),
                time_modified: None,
                size: Some(10),
                bucket_name: None,
                extra: Default::default(),
            },
        }
    }

    #[tokio::test]
    async fn merge_is_idempotent_on_repeat_ingest() {
        let backend = backend().await;
        backend.create_or_truncate("vs_docs", 2).await.unwrap();

        backend.create_or_truncate("vs_docs_tmp", 2).await.unwrap();
        backend.insert_rows("vs_docs_tmp", &[row("doc_0", "hello", vec![1.0, 0.0])]).await.unwrap();
        backend.merge_anti_join("vs_docs", "vs_docs_tmp").await.unwrap();
        assert_eq!(backend.row_count("vs_docs").await.unwrap(), 1);

        backend.create_or_truncate("vs_docs_tmp", 2).await.unwrap();
        backend.insert_rows("vs_docs_tmp", &[row("doc_0", "hello", vec![1.0, 0.0])]).await.unwrap();
        backend.merge_anti_join("vs_docs", "vs_docs_tmp").await.unwrap();
        assert_eq!(backend.row_count("vs_docs").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn comment_round_trips_through_side_table() {
        let backend = backend().await;
        backend.write_comment("vs_docs", "GENAI: {\"alias\":\"Docs\"}").await.unwrap();
        assert_eq!(backend.read_comment("vs_docs").await.unwrap().unwrap(), "GENAI: {\"alias\":\"Docs\"}");
        assert_eq!(backend.list_vector_tables().await.unwrap(), vec!["vs_docs".to_string()]);
    }

    #[tokio::test]
    async fn similarity_search_orders_by_distance() {
        let backend = backend().await;
        backend.create_or_truncate("vs_docs", 2).await.unwrap();
        backend
            .insert_rows(
                "vs_docs",
                &[row("a", "far", vec![0.0, 1.0]), row("b", "near", vec![1.0, 0.0])],
            )
            .await
            .unwrap();
        let results = backend.similarity_search("vs_docs", &[1.0, 0.0], 10, DistanceMetric::Euclidean).await.unwrap();
        assert_eq!(results[0].id, "b");
    }

    #[tokio::test]
    async fn similarity_search_ranks_dot_product_descending() {
        let backend = backend().await;
        backend.create_or_truncate("vs_docs", 2).await.unwrap();
        backend
            .insert_rows(
                "vs_docs",
                &[row("small", "small", vec![0.1, 0.0]), row("large", "large", vec![2.0, 0.0])],
            )
            .await
            .unwrap();
        let results = backend.similarity_search("vs_docs", &[1.0, 0.0], 10, DistanceMetric::Dot).await.unwrap();
        assert_eq!(results[0].id, "large");
    }
}
