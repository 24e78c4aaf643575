//! Local directory table.
//!
//! All writes are last-write-wins at row level. The search blob is rebuilt
//! from the record's fields on every write, so a stale blob can never be
//! persisted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::errors::StoreError;
use crate::models::{normalize_email, DirectoryRecord};

/// Persistence contract for directory records.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Insert or replace records in one transaction. Returns rows written.
    async fn upsert_many(&self, records: &[DirectoryRecord]) -> Result<usize, StoreError>;

    async fn upsert_one(&self, record: &DirectoryRecord) -> Result<(), StoreError>;

    /// Returns whether a row was removed.
    async fn delete_by_key(&self, key: &str) -> Result<bool, StoreError>;

    /// Remove several rows in one transaction. Returns rows removed.
    async fn delete_many(&self, keys: &[String]) -> Result<usize, StoreError>;

    async fn get_by_key(&self, key: &str) -> Result<Option<DirectoryRecord>, StoreError>;

    /// Lowercase match first; with `fallback_raw_case`, retry with the email
    /// exactly as given to reach rows written before normalization.
    async fn get_by_email(
        &self,
        email: &str,
        fallback_raw_case: bool,
    ) -> Result<Option<DirectoryRecord>, StoreError>;

    /// All records ordered by name.
    async fn get_all(&self) -> Result<Vec<DirectoryRecord>, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;
}

const SELECT_COLUMNS: &str = "SELECT record_id, name, email, pin_hash, rank, metal_number, unit, district, station, blood_group, mobile_numbers, photo_ref, is_admin, is_approved, is_hidden, auth_subject_id, search_blob, created_at, updated_at FROM directory_records";

const UPSERT_SQL: &str = "INSERT OR REPLACE INTO directory_records (record_id, name, email, pin_hash, rank, metal_number, unit, district, station, blood_group, mobile_numbers, photo_ref, is_admin, is_approved, is_hidden, auth_subject_id, search_blob, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

/// SQLite-backed [`DirectoryStore`].
#[derive(Clone)]
pub struct SqliteDirectoryStore {
    pool: SqlitePool,
}

impl SqliteDirectoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn write_record<'e, E>(executor: E, record: &DirectoryRecord) -> Result<(), StoreError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let record = record.clone().with_fresh_search_blob();
        let mobile_json = serde_json::to_string(&record.mobile_numbers)?;

        sqlx::query(UPSERT_SQL)
            .bind(&record.record_id)
            .bind(&record.name)
            .bind(&record.email)
            .bind(&record.pin_hash)
            .bind(&record.rank)
            .bind(&record.metal_number)
            .bind(&record.unit)
            .bind(&record.district)
            .bind(&record.station)
            .bind(&record.blood_group)
            .bind(&mobile_json)
            .bind(&record.photo_ref)
            .bind(record.is_admin as i32)
            .bind(record.is_approved as i32)
            .bind(record.is_hidden as i32)
            .bind(&record.auth_subject_id)
            .bind(&record.search_blob)
            .bind(record.created_at.map(|t| t.to_rfc3339()))
            .bind(record.updated_at.map(|t| t.to_rfc3339()))
            .execute(executor)
            .await?;

        Ok(())
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        value: &str,
    ) -> Result<Option<DirectoryRecord>, StoreError> {
        let sql = format!("{} WHERE {} LIMIT 1", SELECT_COLUMNS, clause);
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(record_from_row))
    }
}

#[async_trait]
impl DirectoryStore for SqliteDirectoryStore {
    async fn upsert_many(&self, records: &[DirectoryRecord]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            Self::write_record(&mut *tx, record).await?;
        }
        tx.commit().await?;

        Ok(records.len())
    }

    async fn upsert_one(&self, record: &DirectoryRecord) -> Result<(), StoreError> {
        Self::write_record(&self.pool, record).await
    }

    async fn delete_by_key(&self, key: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM directory_records WHERE record_id = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<usize, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut removed = 0;
        let mut tx = self.pool.begin().await?;
        for key in keys {
            let result = sqlx::query("DELETE FROM directory_records WHERE record_id = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?;
            removed += result.rows_affected() as usize;
        }
        tx.commit().await?;

        Ok(removed)
    }

    async fn get_by_key(&self, key: &str) -> Result<Option<DirectoryRecord>, StoreError> {
        self.fetch_one_where("record_id = ?", key).await
    }

    async fn get_by_email(
        &self,
        email: &str,
        fallback_raw_case: bool,
    ) -> Result<Option<DirectoryRecord>, StoreError> {
        let normalized = normalize_email(email);
        if let Some(record) = self.fetch_one_where("email = ?", &normalized).await? {
            return Ok(Some(record));
        }

        let raw = email.trim();
        if fallback_raw_case && raw != normalized {
            return self.fetch_one_where("email = ?", raw).await;
        }

        Ok(None)
    }

    async fn get_all(&self) -> Result<Vec<DirectoryRecord>, StoreError> {
        let sql = format!("{} ORDER BY name COLLATE NOCASE, record_id", SELECT_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM directory_records")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.get("n");
        Ok(n as usize)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM directory_records")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// Helper functions for row conversion

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> DirectoryRecord {
    let is_admin: i32 = row.get("is_admin");
    let is_approved: i32 = row.get("is_approved");
    let is_hidden: i32 = row.get("is_hidden");
    let mobile_json: String = row.get("mobile_numbers");
    let created_at: Option<String> = row.get("created_at");
    let updated_at: Option<String> = row.get("updated_at");

    DirectoryRecord {
        record_id: row.get("record_id"),
        name: row.get("name"),
        email: row.get("email"),
        pin_hash: row.get("pin_hash"),
        rank: row.get("rank"),
        metal_number: row.get("metal_number"),
        unit: row.get("unit"),
        district: row.get("district"),
        station: row.get("station"),
        blood_group: row.get("blood_group"),
        mobile_numbers: serde_json::from_str(&mobile_json).unwrap_or_default(),
        photo_ref: row.get("photo_ref"),
        is_admin: is_admin != 0,
        is_approved: is_approved != 0,
        is_hidden: is_hidden != 0,
        auth_subject_id: row.get("auth_subject_id"),
        search_blob: row.get("search_blob"),
        created_at: created_at.as_deref().and_then(parse_timestamp),
        updated_at: updated_at.as_deref().and_then(parse_timestamp),
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use tempfile::TempDir;

    async fn open_store() -> (SqliteDirectoryStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .unwrap();
        (SqliteDirectoryStore::new(pool), temp_dir)
    }

    fn record(id: &str, name: &str, email: &str) -> DirectoryRecord {
        DirectoryRecord::new(id, name, email)
    }

    #[tokio::test]
    async fn test_upsert_and_get_round_trip() {
        let (store, _dir) = open_store().await;

        let mut rec = record("K1", "Ravi Kumar", "ravi@example.com");
        rec.mobile_numbers = vec!["9845000000".into(), "+91 9900000000".into()];
        rec.district = Some("Mysuru City".into());
        rec.created_at = Some(Utc::now());
        store.upsert_one(&rec).await.unwrap();

        let loaded = store.get_by_key("K1").await.unwrap().unwrap();
        assert_eq!(loaded.mobile_numbers, rec.mobile_numbers);
        assert_eq!(loaded.district.as_deref(), Some("Mysuru City"));
        assert!(loaded.search_blob.contains("mysuru city"));
        assert_eq!(
            loaded.created_at.map(|t| t.timestamp()),
            rec.created_at.map(|t| t.timestamp())
        );
    }

    #[tokio::test]
    async fn test_stale_search_blob_is_rebuilt_on_write() {
        let (store, _dir) = open_store().await;

        let mut rec = record("K2", "Meena", "meena@example.com");
        rec.station = Some("Kaup PS".into());
        rec.search_blob = "stale".into();
        store.upsert_one(&rec).await.unwrap();

        let loaded = store.get_by_key("K2").await.unwrap().unwrap();
        assert!(loaded.search_blob.contains("kaup ps"));
        assert!(!loaded.search_blob.starts_with("stale"));
    }

    #[tokio::test]
    async fn test_get_by_email_falls_back_to_raw_case() {
        let (store, _dir) = open_store().await;

        // Legacy row written before normalization
        let mut legacy = record("K3", "Old Timer", "x@example.com");
        legacy.email = "Old.Timer@Example.com".into();
        store.upsert_one(&legacy).await.unwrap();

        assert!(store
            .get_by_email("Old.Timer@Example.com", false)
            .await
            .unwrap()
            .is_none());
        let found = store
            .get_by_email("Old.Timer@Example.com", true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.record_id, "K3");
    }

    #[tokio::test]
    async fn test_get_by_email_prefers_normalized_match() {
        let (store, _dir) = open_store().await;
        store
            .upsert_one(&record("K4", "Asha", "asha@example.com"))
            .await
            .unwrap();

        let found = store
            .get_by_email("  ASHA@example.com ", true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.record_id, "K4");
    }

    #[tokio::test]
    async fn test_bulk_operations() {
        let (store, _dir) = open_store().await;

        let records = vec![
            record("A", "Zara", "zara@example.com"),
            record("B", "arun", "arun@example.com"),
            record("C", "Mohan", "mohan@example.com"),
        ];
        assert_eq!(store.upsert_many(&records).await.unwrap(), 3);
        assert_eq!(store.count().await.unwrap(), 3);

        let names: Vec<String> = store
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["arun", "Mohan", "Zara"]);

        let removed = store
            .delete_many(&["A".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.delete_by_key("B").await.unwrap());
        assert!(!store.delete_by_key("B").await.unwrap());

        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
