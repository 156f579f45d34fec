// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! A small key/value store backed by the `cache` table: paging cursors and
//! the two in-flight flags live here so that any worker sees the same
//! state.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};

#[derive(Clone)]
pub struct Cache {
    pool: SqlitePool,
}

impl Cache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let row = sqlx::query("SELECT value, expires_at FROM cache WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };

        let expires_at: Option<DateTime<Utc>> = row.try_get("expires_at")?;
        if let Some(expires_at) = expires_at {
            if expires_at <= Utc::now() {
                self.delete(key).await?;
                return Ok(None);
            }
        }
        Ok(Some(row.try_get("value")?))
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> anyhow::Result<()> {
        let expires_at = ttl.map(|ttl| Utc::now() + ttl);
        sqlx::query(
            "INSERT INTO cache (key, value, expires_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT (key) DO UPDATE SET value = ?2, expires_at = ?3",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM cache WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Boolean flags never expire; they are flipped explicitly.
    pub async fn set_flag(&self, key: &str, value: bool) -> anyhow::Result<()> {
        self.set(key, if value { "1" } else { "0" }, None).await
    }

    pub async fn flag(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.get(key).await?.as_deref() == Some("1"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory;

    #[tokio::test]
    async fn set_get_overwrite() {
        let cache = Cache::new(open_memory().await.unwrap());
        assert_eq!(cache.get("cursor").await.unwrap(), None);
        cache.set("cursor", "123", None).await.unwrap();
        assert_eq!(cache.get("cursor").await.unwrap().as_deref(), Some("123"));
        cache.set("cursor", "456", None).await.unwrap();
        assert_eq!(cache.get("cursor").await.unwrap().as_deref(), Some("456"));
    }

    #[tokio::test]
    async fn expired_entries_vanish() {
        let cache = Cache::new(open_memory().await.unwrap());
        cache
            .set("stale", "x", Some(Duration::seconds(-1)))
            .await
            .unwrap();
        assert_eq!(cache.get("stale").await.unwrap(), None);
    }

    #[tokio::test]
    async fn flags_toggle() {
        let cache = Cache::new(open_memory().await.unwrap());
        assert!(!cache.flag("votes_in_flight").await.unwrap());
        cache.set_flag("votes_in_flight", true).await.unwrap();
        assert!(cache.flag("votes_in_flight").await.unwrap());
        cache.set_flag("votes_in_flight", false).await.unwrap();
        assert!(!cache.flag("votes_in_flight").await.unwrap());
    }
}
