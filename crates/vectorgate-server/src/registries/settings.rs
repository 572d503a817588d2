//! Per-Client Settings registry (§2, §3 "ClientSettings").
//!
//! `"default"` and `"server"` always exist; any other client id is created
//! on demand as a deep copy of `"default"` by the first authenticated PATCH
//! bearing a new client id (§3 lifecycle).

use std::collections::HashMap;
use std::sync::RwLock;

use vectorgate_core::models::ClientSettings;
use vectorgate_core::GatewayError;

use crate::config::Config;

pub struct ClientSettingsRegistry {
    inner: RwLock<HashMap<String, ClientSettings>>,
}

impl ClientSettingsRegistry {
    pub fn from_config(config: &Config) -> Self {
        let default = config.client_settings_template.fork("default");
        let server = config.client_settings_template.fork("server");
        let mut map = HashMap::new();
        map.insert("default".to_string(), default);
        map.insert("server".to_string(), server);
        Self { inner: RwLock::new(map) }
    }

    /// Fetch a client's settings, creating it as a deep copy of `"default"`
    /// if it doesn't exist yet.
    pub fn get_or_create(&self, client_id: &str) -> ClientSettings {
        {
            let guard = self.inner.read().expect("settings registry lock poisoned");
            if let Some(existing) = guard.get(client_id) {
                return existing.clone();
            }
        }
        let mut guard = self.inner.write().expect("settings registry lock poisoned");
        // Re-check under the write lock in case of a race.
        if let Some(existing) = guard.get(client_id) {
            return existing.clone();
        }
        let fresh = guard
            .get("default")
            .expect("'default' always exists")
            .fork(client_id);
        guard.insert(client_id.to_string(), fresh.clone());
        fresh
    }

    pub fn get(&self, client_id: &str) -> Option<ClientSettings> {
        self.inner.read().expect("settings registry lock poisoned").get(client_id).cloned()
    }

    /// Replace a client's settings wholesale (authenticated PATCH).
    pub fn put(&self, settings: ClientSettings) {
        let mut guard = self.inner.write().expect("settings registry lock poisoned");
        guard.insert(settings.client_id.clone(), settings);
    }

    pub fn remove(&self, client_id: &str) -> Result<(), GatewayError> {
        if client_id == "default" || client_id == "server" {
            return Err(GatewayError::validation("cannot remove the 'default' or 'server' client"));
        }
        let mut guard = self.inner.write().expect("settings registry lock poisoned");
        if guard.remove(client_id).is_none() {
            return Err(GatewayError::identity(format!("unknown client: {client_id}")));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("settings registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;

    #[test]
    fn default_and_server_always_exist() {
        let config = load_config(None).unwrap();
        let registry = ClientSettingsRegistry::from_config(&config);
        assert!(registry.get("default").is_some());
        assert!(registry.get("server").is_some());
    }

    #[test]
    fn unknown_client_is_created_as_deep_copy_of_default() {
        let config = load_config(None).unwrap();
        let registry = ClientSettingsRegistry::from_config(&config);
        let alice = registry.get_or_create("alice");
        let default = registry.get("default").unwrap();
        assert_eq!(alice.language_model.model, default.language_model.model);
        assert_eq!(alice.client_id, "alice");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn at_most_one_record_per_client_id() {
        let config = load_config(None).unwrap();
        let registry = ClientSettingsRegistry::from_config(&config);
        registry.get_or_create("alice");
        registry.get_or_create("alice");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn default_and_server_cannot_be_removed() {
        let config = load_config(None).unwrap();
        let registry = ClientSettingsRegistry::from_config(&config);
        assert!(registry.remove("default").is_err());
        assert!(registry.remove("server").is_err());
    }
}
