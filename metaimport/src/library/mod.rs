//! Library store
//!
//! SQLite-backed items (tracks) and albums. Fixed columns are typed; anything
//! else a source produces lives in the per-kind attribute tables as JSON.

pub mod fields;
pub mod query;
pub mod records;
pub mod store;

pub use fields::{FieldDef, FieldKind, ALBUM_FIELDS, ITEM_FIELDS};
pub use query::{LibraryQuery, QueryTerm};
pub use records::{LibraryRecord, RecordKind};
pub use store::{insert_record, load_album, load_album_items, load_records, store_record};

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Open (or create) the library database
pub async fn init_library_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to library: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// In-memory library with a single connection, so every query sees the same
/// database
pub async fn open_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create library tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS albums (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            album TEXT,
            albumartist TEXT,
            year INTEGER,
            genre TEXT,
            label TEXT,
            language TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            album_id INTEGER REFERENCES albums(id) ON DELETE SET NULL,
            path TEXT,
            title TEXT,
            artist TEXT,
            albumartist TEXT,
            album TEXT,
            year INTEGER,
            track INTEGER,
            disc INTEGER,
            genre TEXT,
            label TEXT,
            language TEXT,
            length REAL
        )
        "#,
    )
    .execute(pool)
    .await?;

    for (table, parent) in [("item_attributes", "items"), ("album_attributes", "albums")] {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                entity_id INTEGER NOT NULL REFERENCES {parent}(id) ON DELETE CASCADE,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (entity_id, key)
            )
            "#
        );
        sqlx::query(&sql).execute(pool).await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_album_id ON items(album_id)")
        .execute(pool)
        .await?;

    tracing::debug!("Library tables initialized (albums, items, attributes)");

    Ok(())
}
