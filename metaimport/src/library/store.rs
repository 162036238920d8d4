//! Library record persistence
//!
//! `store_record` is the commit step: it writes only dirty fields, inside one
//! transaction, and is a no-op for a clean record. Running it twice is
//! harmless.

use super::fields::{FieldDef, FieldKind};
use super::query::LibraryQuery;
use super::records::{LibraryRecord, RecordKind};
use anyhow::{Context, Result};
use metaimport_common::{FieldValue, Metadata};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};
use std::path::PathBuf;

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Bind a fixed-column value
fn bind_value<'q>(query: SqliteQuery<'q>, value: Option<&FieldValue>) -> SqliteQuery<'q> {
    match value {
        None | Some(FieldValue::Null) => query.bind(None::<String>),
        Some(FieldValue::Bool(b)) => query.bind(*b),
        Some(FieldValue::Int(i)) => query.bind(*i),
        Some(FieldValue::Float(f)) => query.bind(*f),
        Some(FieldValue::Text(s)) => query.bind(s.clone()),
        Some(list @ FieldValue::List(_)) => query.bind(list.to_string()),
    }
}

/// Read one fixed column from a row
fn read_value(row: &SqliteRow, def: &FieldDef) -> Result<FieldValue> {
    let value = match def.kind {
        FieldKind::Text => row.try_get::<Option<String>, _>(def.name)?.into(),
        FieldKind::Integer => row.try_get::<Option<i64>, _>(def.name)?.into(),
        FieldKind::Real => row.try_get::<Option<f64>, _>(def.name)?.into(),
    };
    Ok(value)
}

fn record_from_row(kind: RecordKind, row: &SqliteRow) -> Result<LibraryRecord> {
    let mut record = LibraryRecord::new(kind);
    record.id = row.try_get("id")?;

    if kind == RecordKind::Item {
        record.album_id = row.try_get("album_id")?;
        record.path = row.try_get::<Option<String>, _>("path")?.map(PathBuf::from);
    }

    for def in kind.fields() {
        let value = read_value(row, def)?;
        if value != FieldValue::Null {
            record.fields.insert(def.name.to_string(), value);
        }
    }

    Ok(record)
}

async fn load_attributes(pool: &SqlitePool, kind: RecordKind, id: i64) -> Result<Metadata> {
    let sql = format!(
        "SELECT key, value FROM {} WHERE entity_id = ? ORDER BY key",
        kind.attribute_table()
    );
    let rows = sqlx::query(&sql).bind(id).fetch_all(pool).await?;

    let mut attributes = Metadata::new();
    for row in rows {
        let key: String = row.try_get("key")?;
        let raw: String = row.try_get("value")?;
        match serde_json::from_str::<FieldValue>(&raw) {
            Ok(value) => {
                attributes.insert(key, value);
            }
            Err(e) => {
                tracing::warn!(
                    table = kind.attribute_table(),
                    entity_id = id,
                    key = %key,
                    error = %e,
                    "Unreadable attribute value, treating as text"
                );
                attributes.insert(key, FieldValue::Text(raw));
            }
        }
    }

    Ok(attributes)
}

async fn hydrate(pool: &SqlitePool, kind: RecordKind, rows: Vec<SqliteRow>) -> Result<Vec<LibraryRecord>> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let mut record = record_from_row(kind, &row)?;
        record.attributes = load_attributes(pool, kind, record.id).await?;
        records.push(record);
    }
    Ok(records)
}

/// Load records matching a query, ordered by id
pub async fn load_records(
    pool: &SqlitePool,
    kind: RecordKind,
    query: &LibraryQuery,
) -> Result<Vec<LibraryRecord>> {
    let (where_clause, params) = query.to_sql(kind)?;
    let sql = format!("SELECT * FROM {}{} ORDER BY id", kind.table(), where_clause);

    let mut select = sqlx::query(&sql);
    for param in params {
        select = select.bind(param);
    }
    let rows = select.fetch_all(pool).await?;

    hydrate(pool, kind, rows).await
}

/// Load one album by id
pub async fn load_album(pool: &SqlitePool, album_id: i64) -> Result<Option<LibraryRecord>> {
    let row = sqlx::query("SELECT * FROM albums WHERE id = ?")
        .bind(album_id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Ok(hydrate(pool, RecordKind::Album, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Load the items belonging to an album, ordered by disc and track
pub async fn load_album_items(pool: &SqlitePool, album_id: i64) -> Result<Vec<LibraryRecord>> {
    let rows = sqlx::query("SELECT * FROM items WHERE album_id = ? ORDER BY disc, track, id")
        .bind(album_id)
        .fetch_all(pool)
        .await?;

    hydrate(pool, RecordKind::Item, rows).await
}

async fn upsert_attributes(
    conn: &mut SqliteConnection,
    record: &LibraryRecord,
    keys: impl Iterator<Item = &String>,
) -> Result<()> {
    let sql = format!(
        r#"
        INSERT INTO {} (entity_id, key, value)
        VALUES (?, ?, ?)
        ON CONFLICT(entity_id, key) DO UPDATE SET value = excluded.value
        "#,
        record.kind.attribute_table()
    );

    for key in keys {
        let Some(value) = record.attributes.get(key) else {
            continue;
        };
        let encoded = serde_json::to_string(value)?;
        sqlx::query(&sql)
            .bind(record.id)
            .bind(key)
            .bind(encoded)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Insert a new record with all its fields, returning the new row id
pub async fn insert_record(pool: &SqlitePool, record: &mut LibraryRecord) -> Result<i64> {
    let kind = record.kind;
    let mut columns: Vec<&str> = Vec::new();
    if kind == RecordKind::Item {
        columns.extend(["album_id", "path"]);
    }
    columns.extend(kind.fields().iter().map(|d| d.name));

    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        kind.table(),
        columns.join(", "),
        placeholders
    );

    let mut tx = pool.begin().await?;

    let mut insert = sqlx::query(&sql);
    if kind == RecordKind::Item {
        insert = insert
            .bind(record.album_id)
            .bind(record.path.as_ref().map(|p| p.to_string_lossy().into_owned()));
    }
    for def in kind.fields() {
        insert = bind_value(insert, record.fields.get(def.name));
    }

    let id = insert
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Insert into {} failed", kind.table()))?
        .last_insert_rowid();
    record.id = id;

    let keys: Vec<String> = record.attributes.keys().cloned().collect();
    upsert_attributes(&mut tx, record, keys.iter()).await?;

    tx.commit().await?;
    record.dirty.clear();

    Ok(id)
}

/// Persist a record's dirty fields
pub async fn store_record(pool: &SqlitePool, record: &mut LibraryRecord) -> Result<()> {
    if !record.is_dirty() {
        return Ok(());
    }

    let kind = record.kind;
    let dirty_columns: Vec<&FieldDef> = kind
        .fields()
        .iter()
        .filter(|d| record.dirty.contains(d.name))
        .collect();

    let mut tx = pool.begin().await?;

    if !dirty_columns.is_empty() {
        let assignments = dirty_columns
            .iter()
            .map(|d| format!("{} = ?", d.name))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE {} SET {} WHERE id = ?", kind.table(), assignments);

        let mut update = sqlx::query(&sql);
        for def in &dirty_columns {
            update = bind_value(update, record.fields.get(def.name));
        }
        update
            .bind(record.id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Update of {} {} failed", kind.table(), record.id))?;
    }

    let dirty_attributes: Vec<String> = record
        .dirty
        .iter()
        .filter(|f| kind.field(f).is_none())
        .cloned()
        .collect();
    upsert_attributes(&mut tx, record, dirty_attributes.iter()).await?;

    tx.commit().await?;

    tracing::debug!(
        table = kind.table(),
        id = record.id,
        fields = record.dirty.len(),
        "Record stored"
    );
    record.dirty.clear();

    Ok(())
}
