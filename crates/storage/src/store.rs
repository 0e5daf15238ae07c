//! SQLite capability store implementation.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use tracing::debug;
use zcap::{BoxError, Capability, CapabilityResolver};

/// SQLite-backed capability store.
pub struct CapabilityStore {
    conn: Connection,
}

/// Summary row for a stored capability.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCapability {
    pub id: String,
    pub target: String,
    pub expires: Option<DateTime<Utc>>,
    pub imported_at: DateTime<Utc>,
}

impl CapabilityStore {
    /// Open or create a capability store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory capability store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS capabilities (
                id TEXT PRIMARY KEY,
                target TEXT NOT NULL,
                expires TEXT,
                imported_at TEXT NOT NULL,
                document TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Insert a capability, replacing any stored under the same id.
    pub fn insert(&self, capability: &Capability) -> Result<()> {
        capability
            .validate_capability_chain()
            .map_err(|source| Error::Invalid {
                id: capability.id.clone(),
                source,
            })?;

        self.conn.execute(
            "INSERT OR REPLACE INTO capabilities (id, target, expires, imported_at, document)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                capability.id,
                capability.invocation_target.id,
                capability.expires.map(|e| e.to_rfc3339()),
                Utc::now().to_rfc3339(),
                serde_json::to_string(capability)?,
            ],
        )?;
        debug!(capability = %capability.id, "stored capability");
        Ok(())
    }

    /// Load a capability by id.
    pub fn get(&self, id: &str) -> Result<Option<Capability>> {
        let document: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM capabilities WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;

        match document {
            Some(document) => Ok(Some(serde_json::from_str(&document)?)),
            None => Ok(None),
        }
    }

    /// List stored capabilities ordered by id.
    pub fn list(&self) -> Result<Vec<StoredCapability>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, target, expires, imported_at FROM capabilities ORDER BY id",
        )?;

        let capabilities = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let target: String = row.get(1)?;
                let expires: Option<String> = row.get(2)?;
                let imported_at: String = row.get(3)?;
                Ok((id, target, expires, imported_at))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(id, target, expires, imported_at)| {
                Some(StoredCapability {
                    id,
                    target,
                    expires: match expires {
                        Some(e) => Some(e.parse().ok()?),
                        None => None,
                    },
                    imported_at: imported_at.parse().ok()?,
                })
            })
            .collect();

        Ok(capabilities)
    }

    /// Remove a capability. Returns whether it existed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM capabilities WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }
}

impl CapabilityResolver for CapabilityStore {
    fn resolve(&self, uri: &str) -> std::result::Result<Capability, BoxError> {
        match self.get(uri)? {
            Some(capability) => Ok(capability),
            None => Err(Error::NotFound(uri.to_string()).into()),
        }
    }
}
