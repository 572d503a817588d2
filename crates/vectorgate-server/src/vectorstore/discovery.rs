//! Discovery (§4.2 "Discovery"): list every table whose comment is a
//! parseable vector-store sentinel, optionally filtered to tables whose
//! embedding model is currently enabled.

use anyhow::Result;
use vectorgate_core::models::VectorStoreDescriptor;
use vectorgate_core::store::VectorStoreBackend;

/// List all [`VectorStoreDescriptor`]s recoverable from the backend's
/// tables. Tables with an unparseable comment are silently skipped (they
/// are not vector-store tables in our sense, even if listed).
pub async fn list_vector_stores(backend: &dyn VectorStoreBackend) -> Result<Vec<VectorStoreDescriptor>> {
    let tables = backend.list_vector_tables().await?;
    let mut out = Vec::new();
    for table in tables {
        let Some(comment) = backend.read_comment(&table).await? else { continue };
        if let Ok(descriptor) = VectorStoreDescriptor::from_comment(&table, &comment) {
            out.push(descriptor);
        }
    }
    Ok(out)
}

/// Filter discovered stores to those whose embedding model id is in
/// `enabled_model_ids` — used when `filter_enabled_models=true`.
pub fn filter_enabled_models(
    stores: Vec<VectorStoreDescriptor>,
    enabled_model_ids: &[String],
) -> Vec<VectorStoreDescriptor> {
    stores
        .into_iter()
        .filter(|s| enabled_model_ids.iter().any(|id| id == &s.embedding_model_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectorstore::sqlite_backend::SqliteVectorBackend;
    use vectorgate_core::models::{DistanceMetric, IndexType};

    async fn backend() -> SqliteVectorBackend {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        let backend = SqliteVectorBackend::new(pool);
        backend.ensure_side_tables().await.unwrap();
        backend
    }

    #[tokio::test]
    async fn discovery_parses_comments_back_into_descriptors() {
        let backend = backend().await;
        let vs = VectorStoreDescriptor {
            table_name: "vs_docs".into(),
            alias: "Docs".into(),
            description: None,
            embedding_model_id: "bge-small".into(),
            chunk_size: 512,
            chunk_overlap: 50,
            distance_metric: DistanceMetric::Cosine,
            index_type: IndexType::Hnsw,
        };
        backend.write_comment(&vs.table_name, &vs.to_comment_payload()).await.unwrap();

        let discovered = list_vector_stores(&backend).await.unwrap();
        assert_eq!(discovered.len(), 1);
        assert_eq!(discovered[0].alias, "Docs");

        let filtered = filter_enabled_models(discovered, &["other-model".to_string()]);
        assert!(filtered.is_empty());
    }
}
