//! Database Connection Pool Registry: named database handles with
//! connection validation and per-request acquisition (§2, §3
//! "DatabaseHandle").
//!
//! **Resolved open question** (§9): `get_client_database` always validates
//! (pings) on acquisition unless the handle is already marked `connected`,
//! in which case the cached pool is returned without a fresh ping — an
//! explicit `force_validate` parameter opts into pinging a handle that is
//! already marked connected. This picks one default behaviour for the
//! `get_client_database(client)` vs `get_client_database(client, False)`
//! inconsistency the design notes flag, and documents it here rather than
//! leaving it open.

use std::collections::HashMap;
use std::sync::RwLock;

use sqlx::SqlitePool;
use tracing::info;
use vectorgate_core::models::DatabaseHandleConfig;
use vectorgate_core::GatewayError;

use crate::config::Config;
use crate::db;

struct HandleEntry {
    config: DatabaseHandleConfig,
    connected: bool,
    pool: Option<SqlitePool>,
}

pub struct DatabaseHandleRegistry {
    inner: RwLock<HashMap<String, HandleEntry>>,
}

impl DatabaseHandleRegistry {
    pub fn from_config(config: &Config) -> Self {
        let mut map = HashMap::new();
        for cfg in &config.database_configs {
            map.insert(
                cfg.name.clone(),
                HandleEntry {
                    config: cfg.clone(),
                    connected: false,
                    pool: None,
                },
            );
        }
        Self { inner: RwLock::new(map) }
    }

    pub fn list_names(&self) -> Vec<String> {
        self.inner.read().expect("db registry lock poisoned").keys().cloned().collect()
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.inner
            .read()
            .expect("db registry lock poisoned")
            .get(name)
            .map(|e| e.connected)
            .unwrap_or(false)
    }

    /// Declare (or replace) a handle's configuration. Registry CRUD is
    /// atomic per request.
    pub fn upsert_config(&self, cfg: DatabaseHandleConfig) -> Result<(), GatewayError> {
        let mut guard = self.inner.write().expect("db registry lock poisoned");
        guard
            .entry(cfg.name.clone())
            .and_modify(|e| e.config = cfg.clone())
            .or_insert(HandleEntry { config: cfg, connected: false, pool: None });
        Ok(())
    }

    /// Connect (or reconnect) to the named handle, pinging it. A successful
    /// reconnect relinquishes this name's previous live connection — at
    /// most one active live connection per name at a time, independent of
    /// other names.
    pub async fn connect(&self, name: &str) -> Result<(), GatewayError> {
        let cfg = {
            let guard = self.inner.read().expect("db registry lock poisoned");
            guard
                .get(name)
                .map(|e| e.config.clone())
                .ok_or_else(|| GatewayError::identity(format!("unknown database: {name}")))?
        };

        let pool = db::connect(&cfg.dsn, cfg.timeout_secs)
            .await
            .map_err(|e| GatewayError::availability(format!("Database cannot connect to database: {e}")))?;
        db::ping(&pool, cfg.timeout_secs.max(1))
            .await
            .map_err(|e| GatewayError::availability(format!("Database cannot connect to database: {e}")))?;

        info!(database = %name, "connected");
        let mut guard = self.inner.write().expect("db registry lock poisoned");
        if let Some(entry) = guard.get_mut(name) {
            entry.pool = Some(pool);
            entry.connected = true;
        }
        Ok(())
    }

    /// Acquire the named handle's connection, connecting first if needed,
    /// or (when `force_validate` is set) re-pinging an already-connected
    /// handle before handing it back.
    pub async fn acquire(&self, name: &str, force_validate: bool) -> Result<SqlitePool, GatewayError> {
        let already_connected_pool = {
            let guard = self.inner.read().expect("db registry lock poisoned");
            guard.get(name).and_then(|e| if e.connected { e.pool.clone() } else { None })
        };

        match already_connected_pool {
            Some(pool) if !force_validate => Ok(pool),
            Some(pool) => {
                let timeout = {
                    let guard = self.inner.read().expect("db registry lock poisoned");
                    guard.get(name).map(|e| e.config.timeout_secs).unwrap_or(5)
                };
                db::ping(&pool, timeout.max(1))
                    .await
                    .map_err(|e| GatewayError::availability(format!("Database cannot connect to database: {e}")))?;
                Ok(pool)
            }
            None => {
                self.connect(name).await?;
                let guard = self.inner.read().expect("db registry lock poisoned");
                guard
                    .get(name)
                    .and_then(|e| e.pool.clone())
                    .ok_or_else(|| GatewayError::availability("Database cannot connect to database"))
            }
        }
    }
}
