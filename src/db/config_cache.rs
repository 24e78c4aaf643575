//! Versioned, TTL-keyed configuration cache.
//!
//! Storage failures on the read side are logged and reported as "absent" or
//! "stale"; a broken cache must never take a resolution query down with it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::errors::{ConfigError, StoreError};
use crate::models::{CacheKey, CachePayload, ConfigCacheEntry};

/// Configuration blob cache backed by the `config_cache` table.
#[derive(Clone)]
pub struct ConfigCache {
    pool: SqlitePool,
    expected_version: i64,
}

impl ConfigCache {
    pub fn new(pool: SqlitePool, expected_version: i64) -> Self {
        Self {
            pool,
            expected_version,
        }
    }

    /// Schema version this build writes and accepts.
    pub fn expected_version(&self) -> i64 {
        self.expected_version
    }

    /// Schema version recorded by whichever build last populated the cache.
    ///
    /// Returns 0 when the cache was never populated or cannot be read.
    pub async fn schema_version(&self) -> i64 {
        match sqlx::query("SELECT config_schema_version FROM meta WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
        {
            Ok(Some(row)) => row.get("config_schema_version"),
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!("Failed to read cache schema version: {}", e);
                0
            }
        }
    }

    /// Fails with [`ConfigError::SchemaMismatch`] when the stored schema
    /// version is not this build's.
    pub async fn check_schema(&self) -> Result<(), ConfigError> {
        let found = self.schema_version().await;
        if found == self.expected_version {
            return Ok(());
        }
        Err(ConfigError::SchemaMismatch {
            expected: self.expected_version,
            found,
        })
    }

    /// Invalidate the whole namespace if the stored schema version differs
    /// from this build's. Returns whether an invalidation happened.
    pub async fn ensure_schema(&self) -> Result<bool, StoreError> {
        let Err(mismatch) = self.check_schema().await else {
            return Ok(false);
        };

        tracing::info!(code = mismatch.code(), "{}, invalidating all entries", mismatch);

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM config_cache")
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE meta SET config_schema_version = ? WHERE id = 1")
            .bind(self.expected_version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(true)
    }

    /// Read an entry. Entries written under another schema version, or whose
    /// payload does not match the key, read as absent.
    pub async fn get(&self, key: CacheKey) -> Option<ConfigCacheEntry> {
        let row = match sqlx::query(
            "SELECT payload, fetched_at, schema_version FROM config_cache WHERE cache_key = ?",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        {
            Ok(row) => row?,
            Err(e) => {
                tracing::warn!("Failed to read cache entry {}: {}", key, e);
                return None;
            }
        };

        let schema_version: i64 = row.get("schema_version");
        if schema_version != self.expected_version {
            tracing::debug!(
                "Ignoring cache entry {} with schema version {}",
                key,
                schema_version
            );
            return None;
        }

        let payload_json: String = row.get("payload");
        let payload: CachePayload = match serde_json::from_str(&payload_json) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Unreadable cache entry {}: {}", key, e);
                return None;
            }
        };
        if payload.key() != key {
            tracing::warn!(
                "Cache entry {} holds a {} payload, ignoring",
                key,
                payload.key()
            );
            return None;
        }

        let fetched_at: String = row.get("fetched_at");
        let fetched_at = DateTime::parse_from_rfc3339(&fetched_at)
            .ok()?
            .with_timezone(&Utc);

        Some(ConfigCacheEntry {
            key,
            payload,
            fetched_at,
            schema_version,
        })
    }

    /// Store a payload under its own key, stamped now.
    pub async fn put(&self, payload: &CachePayload) -> Result<(), StoreError> {
        self.put_at(payload, Utc::now()).await
    }

    /// Store a payload with an explicit fetch time.
    pub async fn put_at(
        &self,
        payload: &CachePayload,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(payload)?;

        sqlx::query(
            "INSERT OR REPLACE INTO config_cache (cache_key, payload, fetched_at, schema_version) VALUES (?, ?, ?, ?)",
        )
        .bind(payload.key().as_str())
        .bind(&json)
        .bind(fetched_at.to_rfc3339())
        .bind(self.expected_version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn invalidate(&self, keys: &[CacheKey]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for key in keys {
            sqlx::query("DELETE FROM config_cache WHERE cache_key = ?")
                .bind(key.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::debug!("Invalidated cache keys: {:?}", keys);
        Ok(())
    }

    pub async fn invalidate_all(&self) -> Result<(), StoreError> {
        self.invalidate(&CacheKey::ALL).await
    }

    /// Whether `key` must be refreshed. See [`is_stale_at`](Self::is_stale_at).
    pub async fn is_stale(&self, key: CacheKey, ttl: Duration) -> bool {
        self.is_stale_at(key, ttl, Utc::now()).await
    }

    /// True when `key` is absent, at least `ttl` old at `now`, or when any
    /// mandatory key is absent.
    pub async fn is_stale_at(&self, key: CacheKey, ttl: Duration, now: DateTime<Utc>) -> bool {
        let Some(entry) = self.get(key).await else {
            return true;
        };

        let age = now.signed_duration_since(entry.fetched_at);
        let ttl = chrono::Duration::from_std(ttl)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        if age >= ttl {
            return true;
        }

        for mandatory in CacheKey::MANDATORY {
            if mandatory != key && self.get(mandatory).await.is_none() {
                tracing::debug!("Mandatory cache key {} missing", mandatory);
                return true;
            }
        }

        false
    }

    /// Age of the oldest mandatory entry, if all are present.
    pub async fn age(&self) -> Option<chrono::Duration> {
        let mut oldest: Option<DateTime<Utc>> = None;
        for key in CacheKey::MANDATORY {
            let entry = self.get(key).await?;
            oldest = Some(match oldest {
                Some(t) if t <= entry.fetched_at => t,
                _ => entry.fetched_at,
            });
        }
        oldest.map(|t| Utc::now().signed_duration_since(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    async fn open_cache(version: i64) -> (ConfigCache, SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .unwrap();
        (ConfigCache::new(pool.clone(), version), pool, temp_dir)
    }

    async fn fill_mandatory(cache: &ConfigCache, at: DateTime<Utc>) {
        let payloads = [
            CachePayload::Districts(vec!["Udupi".into()]),
            CachePayload::Ranks(vec!["PSI".into()]),
            CachePayload::StationsByDistrict(BTreeMap::new()),
            CachePayload::UnitMappings(BTreeMap::new()),
            CachePayload::Units(vec!["CID".into()]),
        ];
        for payload in &payloads {
            cache.put_at(payload, at).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (cache, _pool, _dir) = open_cache(4).await;
        cache.ensure_schema().await.unwrap();

        let payload = CachePayload::Districts(vec!["Udupi".into(), "Kodagu".into()]);
        cache.put(&payload).await.unwrap();

        let entry = cache.get(CacheKey::Districts).await.unwrap();
        assert_eq!(entry.payload, payload);
        assert_eq!(entry.schema_version, 4);
        assert!(cache.get(CacheKey::Ranks).await.is_none());
    }

    #[tokio::test]
    async fn test_staleness_rules() {
        let (cache, _pool, _dir) = open_cache(4).await;
        let ttl = Duration::from_secs(3600);
        let now = Utc::now();

        assert!(cache.is_stale_at(CacheKey::Districts, ttl, now).await);

        fill_mandatory(&cache, now).await;
        assert!(!cache.is_stale_at(CacheKey::Districts, ttl, now).await);

        // Exactly one TTL later counts as stale
        let later = now + chrono::Duration::seconds(3600);
        assert!(cache.is_stale_at(CacheKey::Districts, ttl, later).await);

        // An install that never stored stations must refresh
        cache
            .invalidate(&[CacheKey::StationsByDistrict])
            .await
            .unwrap();
        assert!(cache.is_stale_at(CacheKey::Districts, ttl, now).await);
    }

    #[tokio::test]
    async fn test_schema_mismatch_invalidates_namespace() {
        let (old_cache, pool, _dir) = open_cache(3).await;
        old_cache.ensure_schema().await.unwrap();
        fill_mandatory(&old_cache, Utc::now()).await;
        assert_eq!(old_cache.schema_version().await, 3);

        let new_cache = ConfigCache::new(pool.clone(), 4);
        // Entries from the old schema are invisible before any cleanup
        assert!(new_cache.get(CacheKey::Districts).await.is_none());
        let mismatch = new_cache.check_schema().await.unwrap_err();
        assert!(matches!(
            mismatch,
            ConfigError::SchemaMismatch {
                expected: 4,
                found: 3
            }
        ));
        assert_eq!(mismatch.code(), crate::errors::codes::SCHEMA_MISMATCH);

        assert!(new_cache.ensure_schema().await.unwrap());
        new_cache.check_schema().await.unwrap();
        assert_eq!(new_cache.schema_version().await, 4);
        assert!(!new_cache.ensure_schema().await.unwrap());

        let row = sqlx::query("SELECT COUNT(*) AS n FROM config_cache")
            .fetch_one(&pool)
            .await
            .unwrap();
        let n: i64 = row.get("n");
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_mismatched_payload_reads_as_absent() {
        let (cache, pool, _dir) = open_cache(4).await;
        let json = serde_json::to_string(&CachePayload::Units(vec!["CID".into()])).unwrap();
        sqlx::query(
            "INSERT INTO config_cache (cache_key, payload, fetched_at, schema_version) VALUES ('districts', ?, ?, 4)",
        )
        .bind(json)
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .unwrap();

        assert!(cache.get(CacheKey::Districts).await.is_none());
    }

    #[tokio::test]
    async fn test_age_reports_oldest_mandatory_entry() {
        let (cache, _pool, _dir) = open_cache(4).await;
        assert!(cache.age().await.is_none());

        let two_hours_ago = Utc::now() - chrono::Duration::hours(2);
        fill_mandatory(&cache, two_hours_ago).await;
        cache
            .put(&CachePayload::Districts(vec!["Udupi".into()]))
            .await
            .unwrap();

        let age = cache.age().await.unwrap();
        assert!(age >= chrono::Duration::hours(2));
    }
}
