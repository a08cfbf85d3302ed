//! SQLite-backed content store
//!
//! Backs files tagged [`StorageBackend::Database`](crate::model::StorageBackend):
//! small blobs kept in a single WAL-mode table.

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{verify_content, ByteRange, ContentKey, ContentStore, PutResult};
use crate::error::{Result, StoreError};

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS content (
            key TEXT PRIMARY KEY,
            data BLOB NOT NULL
        ) WITHOUT ROWID;",
    )?;
    Ok(())
}

pub struct SqliteContentStore {
    conn: Mutex<Connection>,
}

impl SqliteContentStore {
    /// Open (creating if needed) a content database file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Private database living only as long as the store
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("content connection poisoned".to_string()))
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn put(&self, key: &ContentKey, data: Bytes, declared_md5: Option<&str>) -> Result<PutResult> {
        let result = verify_content(&data, declared_md5)?;
        self.conn()?.execute(
            "INSERT INTO content (key, data) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET data=excluded.data",
            params![key.to_storage_key(), data.as_ref()],
        )?;
        Ok(result)
    }

    async fn get(&self, key: &ContentKey, range: ByteRange) -> Result<Bytes> {
        let data: Option<Vec<u8>> = self
            .conn()?
            .query_row(
                "SELECT data FROM content WHERE key=?1",
                params![key.to_storage_key()],
                |row| row.get(0),
            )
            .optional()?;
        let data = data.ok_or_else(|| StoreError::FileNotFound(key.to_string()))?;
        range.slice(&Bytes::from(data))
    }

    async fn exists(&self, key: &ContentKey) -> Result<bool> {
        let found: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT 1 FROM content WHERE key=?1",
                params![key.to_storage_key()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn copy(&self, src: &ContentKey, dst: &ContentKey) -> Result<()> {
        let changed = self.conn()?.execute(
            "INSERT OR REPLACE INTO content (key, data) SELECT ?2, data FROM content WHERE key=?1",
            params![src.to_storage_key(), dst.to_storage_key()],
        )?;
        if changed == 0 {
            return Err(StoreError::FileNotFound(src.to_string()));
        }
        Ok(())
    }

    async fn rename(&self, src: &ContentKey, dst: &ContentKey) -> Result<()> {
        if src == dst {
            return match self.exists(src).await? {
                true => Ok(()),
                false => Err(StoreError::FileNotFound(src.to_string())),
            };
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM content WHERE key=?1", params![dst.to_storage_key()])?;
        let moved = tx.execute(
            "UPDATE content SET key=?2 WHERE key=?1",
            params![src.to_storage_key(), dst.to_storage_key()],
        )?;
        if moved == 0 {
            // dropping the transaction rolls back the delete
            return Err(StoreError::FileNotFound(src.to_string()));
        }
        tx.commit()?;
        Ok(())
    }

    async fn delete(&self, key: &ContentKey) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM content WHERE key=?1", params![key.to_storage_key()])?;
        Ok(())
    }
}
