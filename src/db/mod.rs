//! Database module for SQLite persistence.
//!
//! SQLite holds the local directory table and the configuration cache. The
//! remote document store remains the source of truth for both.

mod config_cache;
mod directory;

pub use config_cache::*;
pub use directory::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run embedded migrations
    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // config_schema_version 0 means "never populated"
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            config_schema_version INTEGER NOT NULL DEFAULT 0
        );

        INSERT OR IGNORE INTO meta (id, config_schema_version) VALUES (1, 0);
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS directory_records (
            record_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            pin_hash TEXT,
            rank TEXT,
            metal_number TEXT,
            unit TEXT,
            district TEXT,
            station TEXT,
            blood_group TEXT,
            mobile_numbers TEXT NOT NULL DEFAULT '[]',
            photo_ref TEXT,
            is_admin INTEGER NOT NULL DEFAULT 0,
            is_approved INTEGER NOT NULL DEFAULT 1,
            is_hidden INTEGER NOT NULL DEFAULT 0,
            auth_subject_id TEXT,
            search_blob TEXT NOT NULL DEFAULT '',
            created_at TEXT,
            updated_at TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS config_cache (
            cache_key TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            fetched_at TEXT NOT NULL,
            schema_version INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_directory_email ON directory_records(email);
        CREATE INDEX IF NOT EXISTS idx_directory_name ON directory_records(name);
        CREATE INDEX IF NOT EXISTS idx_directory_district ON directory_records(district);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
