//! SQLite-based catalog cache.
//!
//! Introspection runs one profiling query and one sampling query per column,
//! which adds up on wide billing tables. The resulting catalog document is
//! cached under a hash of the raw table descriptors, so a schema that has not
//! changed skips straight to the saved document.
//!
//! # Design
//!
//! - Key-value store with JSON values
//! - No TTL: an entry stays valid until the schema hash changes or the cache
//!   is cleared
//! - Versioned: auto-clears on version mismatch
//!
//! # Key Format
//!
//! ```text
//! catalog:{schema_hash}   -> CatalogDocument
//! ```
//!
//! The cache lives in `<cache_dir>/costlens/cache.db`.

mod hash;
pub use hash::{compute_hash, schema_key};

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};

use crate::catalog::{Catalog, CatalogDocument};
use crate::storage::TableDescriptor;

/// Current cache schema version. Bump this when the document format changes.
const CACHE_VERSION: i32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to determine cache directory")]
    NoCacheDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Persistent store for introspected catalog documents.
pub struct CatalogCache {
    conn: Connection,
}

impl CatalogCache {
    /// Open or create the cache at the default location.
    pub fn open() -> CacheResult<Self> {
        Self::open_at(Self::cache_path()?)
    }

    /// Open or create the cache at `path`.
    ///
    /// If the stored version doesn't match, the cache is cleared.
    pub fn open_at(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let cache = Self {
            conn: Connection::open(path)?,
        };
        cache.init()?;
        Ok(cache)
    }

    /// Open an in-memory cache (for testing).
    pub fn open_in_memory() -> CacheResult<Self> {
        let cache = Self {
            conn: Connection::open_in_memory()?,
        };
        cache.init()?;
        Ok(cache)
    }

    pub fn cache_path() -> CacheResult<PathBuf> {
        let base = dirs::cache_dir().ok_or(CacheError::NoCacheDir)?;
        Ok(base.join("costlens").join("cache.db"))
    }

    fn init(&self) -> CacheResult<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;

        let stored_version: Option<i32> = self
            .conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                let s: String = row.get(0)?;
                Ok(s.parse().unwrap_or(0))
            })
            .optional()?;

        match stored_version {
            Some(v) if v == CACHE_VERSION => {}
            Some(v) => {
                tracing::info!(stored = v, current = CACHE_VERSION, "cache version changed, clearing");
                self.clear()?;
                self.set_version()?;
            }
            None => self.set_version()?,
        }
        Ok(())
    }

    fn set_version(&self) -> CacheResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('version', ?)",
            params![CACHE_VERSION.to_string()],
        )?;
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM cache WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(CacheError::from)
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> CacheResult<()> {
        let json = serde_json::to_string(value)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO cache (key, value) VALUES (?, ?)",
            params![key, json],
        )?;
        Ok(())
    }

    /// Returns true if an entry was removed.
    pub fn delete(&self, key: &str) -> CacheResult<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM cache WHERE key = ?", params![key])?;
        Ok(rows > 0)
    }

    /// Remove every entry, keeping the version row.
    pub fn clear(&self) -> CacheResult<()> {
        self.conn.execute("DELETE FROM cache", [])?;
        Ok(())
    }

    pub fn len(&self) -> CacheResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    // ===== Catalog documents =====

    /// The cached catalog for this exact schema, if any.
    ///
    /// A document that no longer loads is treated as a miss.
    pub fn catalog(&self, descriptors: &[TableDescriptor]) -> CacheResult<Option<Catalog>> {
        let key = schema_key(descriptors)?;
        let Some(document) = self.get::<CatalogDocument>(&key)? else {
            return Ok(None);
        };
        match document.into_catalog() {
            Ok(catalog) => Ok(Some(catalog)),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "discarding unreadable cached catalog");
                self.delete(&key)?;
                Ok(None)
            }
        }
    }

    pub fn store_catalog(&self, descriptors: &[TableDescriptor], catalog: &Catalog) -> CacheResult<()> {
        let key = schema_key(descriptors)?;
        self.set(&key, &catalog.to_document())
    }
}
