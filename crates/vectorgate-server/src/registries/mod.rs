//! Process-wide registries (§2, §5 "Shared-resource policy"): the Model
//! Registry, Cloud Auth Profile Registry, Database Connection Pool
//! Registry, Per-Client Settings, and Prompt Store. Writes come only from
//! admin PATCH endpoints; readers never hold locks longer than one field
//! access. Grounded on the teacher's `registry.rs` precedence/override
//! pattern, generalized from Git-extension entries to these five registry
//! kinds.

pub mod auth;
pub mod databases;
pub mod models;
pub mod prompts;
pub mod settings;

use std::sync::Arc;

use crate::config::Config;

/// Bundle of every process-wide registry, held once in `AppState` and
/// cloned (cheaply, via `Arc`) into every request.
#[derive(Clone)]
pub struct Registries {
    pub models: Arc<models::ModelRegistry>,
    pub auth: Arc<auth::CloudAuthRegistry>,
    pub databases: Arc<databases::DatabaseHandleRegistry>,
    pub settings: Arc<settings::ClientSettingsRegistry>,
    pub prompts: Arc<prompts::PromptRegistry>,
}

impl Registries {
    pub fn from_config(config: &Config) -> Self {
        Self {
            models: Arc::new(models::ModelRegistry::from_config(config)),
            auth: Arc::new(auth::CloudAuthRegistry::from_config(config)),
            databases: Arc::new(databases::DatabaseHandleRegistry::from_config(config)),
            settings: Arc::new(settings::ClientSettingsRegistry::from_config(config)),
            prompts: Arc::new(prompts::PromptRegistry::with_builtin_defaults(&config.prompt_overrides)),
        }
    }
}
