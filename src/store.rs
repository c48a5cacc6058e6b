//! Guild configuration store
//!
//! A plain key/value store with individually atomic `get`/`put`. The only
//! keys the gateway writes are the per-guild daily bindings
//! (`DAILY_EVENT_ID:<guild_id>`).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

const DAILY_EVENT_PREFIX: &str = "DAILY_EVENT_ID:";

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn put(&self, key: &str, value: &str) -> Result<()>;
}

pub fn daily_event_key(guild_id: &str) -> String {
    format!("{}{}", DAILY_EVENT_PREFIX, guild_id)
}

/// Event type bound to a guild's /daily, or `default_event` when unbound
pub async fn resolve_daily_event(
    store: &dyn ConfigStore,
    guild_id: Option<&str>,
    default_event: &str,
) -> Result<String> {
    let Some(guild_id) = guild_id else {
        return Ok(default_event.to_string());
    };

    let bound = store.get(&daily_event_key(guild_id)).await?;
    Ok(bound
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default_event.to_string()))
}

/// Bind (or rebind) a guild's /daily event. Last write wins.
pub async fn bind_daily_event(
    store: &dyn ConfigStore,
    guild_id: &str,
    event_type: &str,
) -> Result<()> {
    store.put(&daily_event_key(guild_id), event_type).await?;
    info!("Guild {} daily event set to {}", guild_id, event_type);
    Ok(())
}

// ============================================================================
// IN-MEMORY
// ============================================================================

/// Process-local store, lost on restart
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ============================================================================
// SQLITE
// ============================================================================

/// Durable store backed by a single SQLite table
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open store at {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<String>> {
            let conn = conn.lock();
            let value = conn
                .query_row("SELECT value FROM kv_store WHERE key = ?1", [&key], |row| {
                    row.get::<_, String>(0)
                })
                .optional()?;
            debug!("Store get {} -> {:?}", key, value);
            Ok(value)
        })
        .await
        .context("Store task panicked")?
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.clone();
        let key = key.to_string();
        let value = value.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = conn.lock();
            conn.execute(
                "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![key, value, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
        .context("Store task panicked")?
    }
}
