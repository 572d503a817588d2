//! Layered configuration loading (§4.3): compiled defaults → configuration
//! file → environment variables → runtime patch, with list-valued fields
//! merged by identity key. Generalizes the teacher's single-file TOML
//! loader (`context-harness::config`) into the full precedence chain.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use vectorgate_core::config::{merge_by_identity, ProtectedFields};
use vectorgate_core::models::{
    CloudAuthProfile, ClientSettings, DatabaseHandleConfig, LanguageModelSettings, ModelDescriptor, ModelKind,
    PromptRefs, SelectAiSettings, VectorSearchSettings,
};

/// Server-wide settings not tied to any one client or registry list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub api_server_key: String,
    pub api_server_url: String,
    pub api_server_port: u16,
    pub log_level: String,
    pub mcp_api_key: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_server_key: String::new(),
            api_server_url: "0.0.0.0".into(),
            api_server_port: 8000,
            log_level: "INFO".into(),
            mcp_api_key: String::new(),
        }
    }
}

/// The merged schema persisted to / read from the configuration file
/// (§6 "Persisted state layout"): `{client_settings, database_configs[],
/// model_configs[], cloud_auth_configs[], prompt_configs[]|prompt_overrides{}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFileSchema {
    #[serde(default)]
    pub client_settings: Option<ClientSettings>,
    #[serde(default)]
    pub database_configs: Vec<DatabaseHandleConfig>,
    #[serde(default)]
    pub model_configs: Vec<ModelDescriptor>,
    #[serde(default)]
    pub cloud_auth_configs: Vec<CloudAuthProfile>,
    #[serde(default)]
    pub prompt_overrides: HashMap<String, String>,
    #[serde(default)]
    pub server: Option<ServerConfig>,
}

/// The fully-resolved, boot-time configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub model_configs: Vec<ModelDescriptor>,
    pub database_configs: Vec<DatabaseHandleConfig>,
    pub cloud_auth_configs: Vec<CloudAuthProfile>,
    pub client_settings_template: ClientSettings,
    pub prompt_overrides: HashMap<String, String>,
    pub protected: ProtectedFields,
}

fn default_client_settings_template() -> ClientSettings {
    ClientSettings {
        client_id: "default".into(),
        language_model: LanguageModelSettings {
            model: "gpt-4o-mini".into(),
            temperature: 0.1,
            max_completion_tokens: 1024,
            chat_history: true,
        },
        vector_search: VectorSearchSettings {
            enabled: false,
            discovery: false,
            rephrase: true,
            grade: true,
            top_k: 4,
            score_threshold: 0.0,
            mmr_fetch_k: 20,
            mmr_lambda: 0.5,
            alias: None,
            model: "text-embedding-3-small".into(),
            chunk_size: 512,
            chunk_overlap: 50,
        },
        selectai: SelectAiSettings {
            enabled: false,
            profile: None,
            params: Default::default(),
        },
        auth_profile_name: None,
        prompt_refs: PromptRefs {
            sys: "sys-basic-example".into(),
            ctx: "ctx-basic-example".into(),
            grading: "grading-basic-example".into(),
            rephrase: "ctx-basic-example".into(),
            discovery: "discovery-basic-example".into(),
        },
        tools_enabled: vec![],
    }
}

/// Compiled defaults for every list (§4.3 loading step 1).
fn compiled_defaults() -> (Vec<ModelDescriptor>, Vec<DatabaseHandleConfig>, Vec<CloudAuthProfile>) {
    let models = vec![ModelDescriptor {
        id: "gpt-4o-mini".into(),
        provider: "openai".into(),
        kind: ModelKind::Language,
        endpoint: "https://api.openai.com/v1".into(),
        credential: None,
        enabled: false,
        max_input_tokens: Some(128_000),
        max_chunk_size: None,
        temperature: Some(0.1),
        max_completion_tokens: Some(1024),
    }];
    let databases = vec![DatabaseHandleConfig {
        name: "DEFAULT".into(),
        user: None,
        secret: None,
        dsn: "./data/vectorgate.db".into(),
        wallet_ref: None,
        timeout_secs: 5,
    }];
    let auth = Vec::new();
    (models, databases, auth)
}

/// Load configuration following the §4.3 precedence chain: compiled
/// defaults → file (if present and valid) → environment variables (marked
/// protected) → seeded `"default"`/`"server"` ClientSettings.
///
/// `config_file` comes from the `CONFIG_FILE` env var or CLI flag; if it
/// doesn't exist or fails to parse, it is ignored and logged (never fatal).
pub fn load_config(config_file: Option<PathBuf>) -> Result<Config> {
    let (mut models, mut databases, mut auth) = compiled_defaults();
    let mut client_template = default_client_settings_template();
    let mut prompt_overrides = HashMap::new();
    let mut server = ServerConfig::default();
    let mut protected = ProtectedFields::new();

    if let Some(path) = config_file {
        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<ConfigFileSchema>(&raw) {
                Ok(file_cfg) => {
                    // File entries sit above compiled defaults but below
                    // environment/runtime; identity-merge means file wins
                    // over compiled defaults for shared identities.
                    models = merge_by_identity(file_cfg.model_configs, models, |m| m.identity());
                    databases = merge_by_identity(file_cfg.database_configs, databases, |d| {
                        d.identity().to_string()
                    });
                    auth = merge_by_identity(file_cfg.cloud_auth_configs, auth, |a| {
                        a.identity().to_string()
                    });
                    if let Some(cs) = file_cfg.client_settings {
                        client_template = cs;
                    }
                    if let Some(s) = file_cfg.server {
                        server = s;
                    }
                    prompt_overrides = file_cfg.prompt_overrides;
                }
                Err(e) => warn!(error = %e, path = %path.display(), "config file is not valid JSON; ignoring"),
            },
            Err(e) => warn!(error = %e, path = %path.display(), "config file not found; ignoring"),
        }
    }

    apply_env_overrides(&mut server, &mut databases, &mut protected);

    let config = Config {
        server,
        model_configs: models,
        database_configs: databases,
        cloud_auth_configs: auth,
        client_settings_template: client_template,
        prompt_overrides,
        protected,
    };

    Ok(config)
}

/// Apply environment overrides, marking each touched field as protected
/// (§4.3 step 3). `DB_USERNAME`/`DB_PASSWORD`/`DB_DSN` patch the `"DEFAULT"`
/// database handle specifically, matching S5's `CORE.user=env_user`
/// example generalized to this crate's default handle name.
fn apply_env_overrides(
    server: &mut ServerConfig,
    databases: &mut [DatabaseHandleConfig],
    protected: &mut ProtectedFields,
) {
    if let Ok(key) = std::env::var("API_SERVER_KEY") {
        server.api_server_key = key;
        protected.mark("server.api_server_key");
    }
    if let Ok(url) = std::env::var("API_SERVER_URL") {
        server.api_server_url = url;
        protected.mark("server.api_server_url");
    }
    if let Ok(port) = std::env::var("API_SERVER_PORT") {
        if let Ok(p) = port.parse() {
            server.api_server_port = p;
            protected.mark("server.api_server_port");
        }
    }
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        server.log_level = level;
        protected.mark("server.log_level");
    }

    if let Some(default_db) = databases.iter_mut().find(|d| d.name == "DEFAULT") {
        if let Ok(user) = std::env::var("DB_USERNAME") {
            default_db.user = Some(user);
            protected.mark("database.DEFAULT.user");
        }
        if let Ok(secret) = std::env::var("DB_PASSWORD") {
            default_db.secret = Some(secret);
            protected.mark("database.DEFAULT.secret");
        }
        if let Ok(dsn) = std::env::var("DB_DSN") {
            default_db.dsn = dsn;
            protected.mark("database.DEFAULT.dsn");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_seed_one_model_and_database() {
        let cfg = load_config(None).unwrap();
        assert_eq!(cfg.model_configs.len(), 1);
        assert_eq!(cfg.database_configs.len(), 1);
        assert_eq!(cfg.database_configs[0].name, "DEFAULT");
    }

    #[test]
    fn missing_config_file_is_ignored_not_fatal() {
        let cfg = load_config(Some(PathBuf::from("/nonexistent/path/ctx.json")));
        assert!(cfg.is_ok());
    }
}
