//! Model Registry: model descriptors plus URL-reachability probing at boot
//! (§2 "Model Registry").

use std::sync::RwLock;

use anyhow::Result;
use tracing::{info, warn};
use vectorgate_core::models::ModelDescriptor;
use vectorgate_core::GatewayError;

use crate::config::Config;

pub struct ModelRegistry {
    inner: RwLock<Vec<ModelDescriptor>>,
}

impl ModelRegistry {
    pub fn from_config(config: &Config) -> Self {
        Self {
            inner: RwLock::new(config.model_configs.clone()),
        }
    }

    pub fn list(&self) -> Vec<ModelDescriptor> {
        self.inner.read().expect("model registry lock poisoned").clone()
    }

    pub fn find(&self, provider: &str, id: &str) -> Option<ModelDescriptor> {
        self.inner
            .read()
            .expect("model registry lock poisoned")
            .iter()
            .find(|m| m.provider == provider && m.id == id)
            .cloned()
    }

    /// Find a descriptor by id alone, irrespective of provider — used by
    /// the chat graph and testbed runner, which reference models by id
    /// only (`ClientSettings.language_model.model`, `.vector_search.model`).
    pub fn find_by_id(&self, id: &str) -> Option<ModelDescriptor> {
        self.inner
            .read()
            .expect("model registry lock poisoned")
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    /// Insert or replace a descriptor by identity `(provider, id)`.
    /// Registry CRUD is atomic with respect to a single request: on any
    /// validation error nothing changes.
    pub fn upsert(&self, descriptor: ModelDescriptor) -> Result<(), GatewayError> {
        let mut guard = self.inner.write().expect("model registry lock poisoned");
        if let Some(existing) = guard.iter_mut().find(|m| m.identity() == descriptor.identity()) {
            *existing = descriptor;
        } else {
            guard.push(descriptor);
        }
        Ok(())
    }

    /// As [`Self::upsert`], but probes the descriptor's endpoint first and
    /// rejects with [`GatewayError::ModelUnreachable`] (422) if it is
    /// enabled, self-hosted (not `provider == "cloud"`), and unreachable —
    /// the same reachability contract [`Self::probe_all`] enforces at boot,
    /// applied to registration/patch requests (§3 ModelDescriptor invariant).
    pub async fn upsert_checked(&self, client: &reqwest::Client, descriptor: ModelDescriptor) -> Result<(), GatewayError> {
        if descriptor.enabled && !descriptor.endpoint.is_empty() && descriptor.provider != "cloud" {
            let reachable = probe_endpoint(client, &descriptor.endpoint).await;
            if !reachable {
                return Err(GatewayError::model_unreachable(format!(
                    "model '{}' endpoint unreachable: {}",
                    descriptor.id, descriptor.endpoint
                )));
            }
        }
        self.upsert(descriptor)
    }

    pub fn remove(&self, provider: &str, id: &str) -> Result<(), GatewayError> {
        let mut guard = self.inner.write().expect("model registry lock poisoned");
        let before = guard.len();
        guard.retain(|m| !(m.provider == provider && m.id == id));
        if guard.len() == before {
            return Err(GatewayError::identity(format!("unknown model: {provider}/{id}")));
        }
        Ok(())
    }

    /// Probe every enabled descriptor's endpoint for reachability
    /// (§3 ModelDescriptor invariant: "if enabled then endpoint was
    /// reachable at last probe or the descriptor is marked for
    /// unconditional trust"). Cloud providers (`provider == "cloud"` by
    /// convention) are trusted unconditionally and skipped.
    pub async fn probe_all(&self, client: &reqwest::Client) {
        let snapshot = self.list();
        for descriptor in snapshot {
            if !descriptor.enabled || descriptor.endpoint.is_empty() || descriptor.provider == "cloud" {
                continue;
            }
            let reachable = probe_endpoint(client, &descriptor.endpoint).await;
            if reachable {
                info!(model = %descriptor.id, "probe succeeded");
            } else {
                warn!(model = %descriptor.id, "probe failed; disabling");
                let mut guard = self.inner.write().expect("model registry lock poisoned");
                if let Some(entry) = guard.iter_mut().find(|m| m.identity() == descriptor.identity()) {
                    entry.enabled = false;
                }
            }
        }
    }
}

async fn probe_endpoint(client: &reqwest::Client, endpoint: &str) -> bool {
    client.get(endpoint).timeout(std::time::Duration::from_secs(5)).send().await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vectorgate_core::models::ModelKind;

    fn descriptor(id: &str) -> ModelDescriptor {
        ModelDescriptor {
            id: id.into(),
            provider: "openai".into(),
            kind: ModelKind::Language,
            endpoint: String::new(),
            credential: None,
            enabled: true,
            max_input_tokens: None,
            max_chunk_size: None,
            temperature: None,
            max_completion_tokens: None,
        }
    }

    #[test]
    fn upsert_replaces_same_identity() {
        let registry = ModelRegistry {
            inner: RwLock::new(vec![descriptor("gpt-4o-mini")]),
        };
        let mut updated = descriptor("gpt-4o-mini");
        updated.enabled = false;
        registry.upsert(updated).unwrap();
        assert_eq!(registry.list().len(), 1);
        assert!(!registry.list()[0].enabled);
    }

    #[test]
    fn remove_unknown_is_identity_error() {
        let registry = ModelRegistry { inner: RwLock::new(vec![]) };
        let err = registry.remove("openai", "nope").unwrap_err();
        assert_eq!(err.kind(), "identity");
    }

    #[tokio::test]
    async fn upsert_checked_skips_probe_for_cloud_and_empty_endpoint() {
        let registry = ModelRegistry { inner: RwLock::new(vec![]) };
        let client = reqwest::Client::new();

        let mut cloud = descriptor("claude-cloud");
        cloud.provider = "cloud".into();
        cloud.endpoint = "http://does-not-matter.invalid".into();
        registry.upsert_checked(&client, cloud).await.unwrap();

        let local = descriptor("local-no-endpoint");
        registry.upsert_checked(&client, local).await.unwrap();

        assert_eq!(registry.list().len(), 2);
    }

    #[tokio::test]
    async fn upsert_checked_rejects_unreachable_self_hosted_endpoint() {
        let registry = ModelRegistry { inner: RwLock::new(vec![]) };
        let client = reqwest::Client::new();

        let mut unreachable = descriptor("local-llama");
        unreachable.endpoint = "http://127.0.0.1:1/v1".into();
        let err = registry.upsert_checked(&client, unreachable).await.unwrap_err();
        assert_eq!(err.kind(), "model_unreachable");
        assert_eq!(registry.list().len(), 0);
    }
}
