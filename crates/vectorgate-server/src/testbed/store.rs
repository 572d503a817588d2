//! Testbed relational store: `testsets`, `testset_qa`, `evaluations` tables,
//! created on first use if absent (§6). Reports are persisted as opaque
//! binary blobs the store never interprets.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use vectorgate_core::models::{EvaluationReport, QaItem, TestSet};
use vectorgate_core::GatewayError;

pub struct TestbedStore {
    pool: SqlitePool,
}

impl TestbedStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the tables this store needs on first use. Idempotent.
    pub async fn ensure_tables(&self) -> Result<(), GatewayError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS testsets (
                tid TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::integrity(e.to_string()))?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS testset_qa (
                tid TEXT NOT NULL,
                ordinal INTEGER NOT NULL,
                question TEXT NOT NULL,
                reference_answer TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                PRIMARY KEY (tid, ordinal)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::integrity(e.to_string()))?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS evaluations (
                eid TEXT PRIMARY KEY,
                tid TEXT NOT NULL,
                evaluated_at TEXT NOT NULL,
                correctness REAL NOT NULL,
                client_settings_snapshot TEXT NOT NULL,
                report_blob BLOB NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::integrity(e.to_string()))?;
        Ok(())
    }

    /// Persist `items` under `name`, creating a new testset unless `tid`
    /// names an existing one, in which case the items are appended to it
    /// (§4.4: "upsert_qa(name, created, payload, tid?) which returns the
    /// (new or existing) tid").
    pub async fn upsert_qa(&self, name: &str, tid: Option<&str>, items: &[QaItem]) -> Result<String, GatewayError> {
        let tid = match tid {
            Some(existing) => {
                let row = sqlx::query("SELECT tid FROM testsets WHERE tid = ?")
                    .bind(existing)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| GatewayError::integrity(e.to_string()))?;
                row.ok_or_else(|| GatewayError::identity(format!("unknown testset: {existing}")))?;
                existing.to_string()
            }
            None => {
                let new_tid = uuid::Uuid::new_v4().to_string();
                sqlx::query("INSERT INTO testsets (tid, name, created) VALUES (?, ?, ?)")
                    .bind(&new_tid)
                    .bind(name)
                    .bind(Utc::now().to_rfc3339())
                    .execute(&self.pool)
                    .await
                    .map_err(|e| GatewayError::integrity(e.to_string()))?;
                new_tid
            }
        };

        let next_row = sqlx::query("SELECT COALESCE(MAX(ordinal), -1) + 1 as next FROM testset_qa WHERE tid = ?")
            .bind(&tid)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| GatewayError::integrity(e.to_string()))?;
        let next_ordinal: i64 = next_row.get("next");

        for (i, item) in items.iter().enumerate() {
            let metadata_json = serde_json::to_string(&item.metadata).map_err(|e| GatewayError::integrity(e.to_string()))?;
            sqlx::query(
                "INSERT INTO testset_qa (tid, ordinal, question, reference_answer, metadata_json) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&tid)
            .bind(next_ordinal + i as i64)
            .bind(&item.question)
            .bind(&item.reference_answer)
            .bind(metadata_json)
            .execute(&self.pool)
            .await
            .map_err(|e| GatewayError::integrity(e.to_string()))?;
        }

        Ok(tid)
    }

    pub async fn get_testset(&self, tid: &str) -> Result<Option<TestSet>, GatewayError> {
        let header = sqlx::query("SELECT name, created FROM testsets WHERE tid = ?")
            .bind(tid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| GatewayError::integrity(e.to_string()))?;
        let Some(header) = header else { return Ok(None) };
        let name: String = header.get("name");
        let created: String = header.get("created");

        let rows = sqlx::query("SELECT question, reference_answer, metadata_json FROM testset_qa WHERE tid = ? ORDER BY ordinal")
            .bind(tid)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| GatewayError::integrity(e.to_string()))?;

        let qa_items = rows
            .into_iter()
            .map(|row| {
                let metadata_json: String = row.get("metadata_json");
                QaItem {
                    question: row.get("question"),
                    reference_answer: row.get("reference_answer"),
                    metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
                }
            })
            .collect();

        Ok(Some(TestSet {
            tid: tid.to_string(),
            name,
            created: parse_timestamp(&created),
            qa_items,
        }))
    }

    pub async fn list_testsets(&self) -> Result<Vec<(String, String)>, GatewayError> {
        let rows = sqlx::query("SELECT tid, name FROM testsets ORDER BY created DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| GatewayError::integrity(e.to_string()))?;
        Ok(rows.into_iter().map(|r| (r.get("tid"), r.get("name"))).collect())
    }

    pub async fn delete_testset(&self, tid: &str) -> Result<(), GatewayError> {
        let result = sqlx::query("DELETE FROM testsets WHERE tid = ?")
            .bind(tid)
            .execute(&self.pool)
            .await
            .map_err(|e| GatewayError::integrity(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(GatewayError::identity(format!("unknown testset: {tid}")));
        }
        sqlx::query("DELETE FROM testset_qa WHERE tid = ?").bind(tid).execute(&self.pool).await.ok();
        sqlx::query("DELETE FROM evaluations WHERE tid = ?").bind(tid).execute(&self.pool).await.ok();
        Ok(())
    }

    pub async fn save_evaluation(&self, report: &EvaluationReport) -> Result<(), GatewayError> {
        let snapshot = serde_json::to_string(&report.client_settings_snapshot).map_err(|e| GatewayError::integrity(e.to_string()))?;
        sqlx::query(
            "INSERT INTO evaluations (eid, tid, evaluated_at, correctness, client_settings_snapshot, report_blob)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&report.eid)
        .bind(&report.tid)
        .bind(report.evaluated_at.to_rfc3339())
        .bind(report.correctness)
        .bind(snapshot)
        .bind(&report.report_blob)
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::integrity(e.to_string()))?;
        Ok(())
    }

    pub async fn get_evaluation(&self, eid: &str) -> Result<Option<EvaluationReport>, GatewayError> {
        let row = sqlx::query(
            "SELECT eid, tid, evaluated_at, correctness, client_settings_snapshot, report_blob FROM evaluations WHERE eid = ?",
        )
        .bind(eid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| GatewayError::integrity(e.to_string()))?;
        let Some(row) = row else { return Ok(None) };
        let evaluated_at: String = row.get("evaluated_at");
        let snapshot: String = row.get("client_settings_snapshot");
        Ok(Some(EvaluationReport {
            eid: row.get("eid"),
            tid: row.get("tid"),
            evaluated_at: parse_timestamp(&evaluated_at),
            correctness: row.get("correctness"),
            client_settings_snapshot: serde_json::from_str(&snapshot).unwrap_or(serde_json::Value::Null),
            report_blob: row.get("report_blob"),
        }))
    }

    pub async fn list_evaluations(&self, tid: &str) -> Result<Vec<(String, DateTime<Utc>, f64)>, GatewayError> {
        let rows = sqlx::query("SELECT eid, evaluated_at, correctness FROM evaluations WHERE tid = ? ORDER BY evaluated_at DESC")
            .bind(tid)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| GatewayError::integrity(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let evaluated_at: String = r.get("evaluated_at");
                (r.get("eid"), parse_timestamp(&evaluated_at), r.get("correctness"))
            })
            .collect())
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vectorgate_core::models::QaItem;

    async fn store() -> TestbedStore {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        let store = TestbedStore::new(pool);
        store.ensure_tables().await.unwrap();
        store
    }

    fn item(q: &str, a: &str) -> QaItem {
        QaItem { question: q.into(), reference_answer: a.into(), metadata: Default::default() }
    }

    #[tokio::test]
    async fn upsert_without_tid_creates_a_new_testset() {
        let store = store().await;
        let tid = store.upsert_qa("docs", None, &[item("Q1", "A1")]).await.unwrap();
        let testset = store.get_testset(&tid).await.unwrap().unwrap();
        assert_eq!(testset.name, "docs");
        assert_eq!(testset.qa_items.len(), 1);
    }

    #[tokio::test]
    async fn upsert_with_tid_appends_to_existing_testset() {
        let store = store().await;
        let tid = store.upsert_qa("docs", None, &[item("Q1", "A1")]).await.unwrap();
        store.upsert_qa("docs", Some(&tid), &[item("Q2", "A2")]).await.unwrap();
        let testset = store.get_testset(&tid).await.unwrap().unwrap();
        assert_eq!(testset.qa_items.len(), 2);
        assert_eq!(testset.qa_items[1].question, "Q2");
    }

    #[tokio::test]
    async fn upsert_with_unknown_tid_is_identity_error() {
        let store = store().await;
        let err = store.upsert_qa("docs", Some("ghost"), &[item("Q1", "A1")]).await.unwrap_err();
        assert_eq!(err.kind(), "identity");
    }

    #[tokio::test]
    async fn delete_testset_cascades_to_qa_and_evaluations() {
        let store = store().await;
        let tid = store.upsert_qa("docs", None, &[item("Q1", "A1")]).await.unwrap();
        store.delete_testset(&tid).await.unwrap();
        assert!(store.get_testset(&tid).await.unwrap().is_none());
        assert!(store.delete_testset(&tid).await.is_err());
    }
}
