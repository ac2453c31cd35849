use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use crate::error::Result;

/// Key/value store with per-entry expiry, used to memoize report queries.
pub trait ReportCache {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<()>;
    fn delete_many(&self, keys: &[&str]) -> Result<()>;
}

/// Cache entries kept in the `report_cache` table, so they survive between
/// invocations of the CLI.
pub struct SqliteCache<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteCache<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl ReportCache for SqliteCache<'_> {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let row: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT value, expires_at FROM report_cache WHERE key = ?1",
                [key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((raw, expires_at)) = row else {
            tracing::debug!(key, "cache miss");
            return Ok(None);
        };
        if expires_at <= now_millis() {
            tracing::debug!(key, "cache entry expired");
            self.conn.execute("DELETE FROM report_cache WHERE key = ?1", [key])?;
            return Ok(None);
        }
        match serde_json::from_str(&raw) {
            Ok(value) => {
                tracing::debug!(key, "cache hit");
                Ok(Some(value))
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<()> {
        let expires_at = now_millis().saturating_add(ttl.as_millis().min(i64::MAX as u128) as i64);
        self.conn.execute(
            "INSERT INTO report_cache (key, value, expires_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            rusqlite::params![key, serde_json::to_string(value)?, expires_at],
        )?;
        Ok(())
    }

    fn delete_many(&self, keys: &[&str]) -> Result<()> {
        let mut stmt = self.conn.prepare_cached("DELETE FROM report_cache WHERE key = ?1")?;
        for key in keys {
            stmt.execute([key])?;
        }
        tracing::debug!(?keys, "cache invalidated");
        Ok(())
    }
}

/// Disabled cache: every read misses and writes are dropped.
pub struct NoCache;

impl ReportCache for NoCache {
    fn get(&self, _key: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &Value, _ttl: Duration) -> Result<()> {
        Ok(())
    }

    fn delete_many(&self, _keys: &[&str]) -> Result<()> {
        Ok(())
    }
}
