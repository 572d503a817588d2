//! Cloud Auth Profile Registry: credential bundles for external providers
//! (§2, §3 "CloudAuthProfile").

use std::sync::RwLock;

use vectorgate_core::models::CloudAuthProfile;
use vectorgate_core::GatewayError;

use crate::config::Config;

pub struct CloudAuthRegistry {
    inner: RwLock<Vec<CloudAuthProfile>>,
}

impl CloudAuthRegistry {
    pub fn from_config(config: &Config) -> Self {
        Self {
            inner: RwLock::new(config.cloud_auth_configs.clone()),
        }
    }

    pub fn list(&self) -> Vec<CloudAuthProfile> {
        self.inner.read().expect("auth registry lock poisoned").clone()
    }

    pub fn find(&self, profile_name: &str) -> Option<CloudAuthProfile> {
        self.inner
            .read()
            .expect("auth registry lock poisoned")
            .iter()
            .find(|p| p.profile_name == profile_name)
            .cloned()
    }

    /// Insert or replace a profile after validating its active mode has
    /// its required fields populated (§3 invariant). On validation
    /// failure, nothing changes (registry CRUD is atomic per request).
    pub fn upsert(&self, profile: CloudAuthProfile) -> Result<(), GatewayError> {
        profile.validate().map_err(GatewayError::validation)?;
        let mut guard = self.inner.write().expect("auth registry lock poisoned");
        if let Some(existing) = guard.iter_mut().find(|p| p.profile_name == profile.profile_name) {
            *existing = profile;
        } else {
            guard.push(profile);
        }
        Ok(())
    }

    pub fn remove(&self, profile_name: &str) -> Result<(), GatewayError> {
        let mut guard = self.inner.write().expect("auth registry lock poisoned");
        let before = guard.len();
        guard.retain(|p| p.profile_name != profile_name);
        if guard.len() == before {
            return Err(GatewayError::identity(format!("unknown cloud auth profile: {profile_name}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vectorgate_core::models::AuthMode;

    fn profile(name: &str) -> CloudAuthProfile {
        CloudAuthProfile {
            profile_name: name.into(),
            authentication: AuthMode::ApiKey,
            user: None,
            tenant: None,
            fingerprint: None,
            region: None,
            key_material_ref: Some("ref".into()),
            service_endpoint_override: None,
        }
    }

    #[test]
    fn rejects_incomplete_api_key_profile() {
        let registry = CloudAuthRegistry { inner: RwLock::new(vec![]) };
        let mut bad = profile("oci-default");
        bad.key_material_ref = None;
        let err = registry.upsert(bad).unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(registry.list().is_empty());
    }

    #[test]
    fn bad_patch_leaves_registry_state_unchanged() {
        let registry = CloudAuthRegistry {
            inner: RwLock::new(vec![profile("oci-default")]),
        };
        let mut bad = profile("oci-default");
        bad.key_material_ref = None;
        let before = registry.list();
        let _ = registry.upsert(bad);
        assert_eq!(registry.list().len(), before.len());
        assert_eq!(registry.find("oci-default").unwrap().key_material_ref, Some("ref".into()));
    }
}
