use chrono::Utc;
use pageland_core::{AdsError, AdsResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;

use crate::types::{AdHistoryItem, AdHistoryRow};

/// Database schema version for migrations
const SCHEMA_VERSION: i32 = 1;

/// Column order of `ad_history` is fixed for compatibility
const AD_HISTORY_COLUMNS: &str = "created_at, type, confirmation_type, placement_id, \
     creative_instance_id, creative_set_id, campaign_id, advertiser_id, segment, \
     title, description, target_url";

const AD_HISTORY_COLUMN_COUNT: usize = 12;

/// Initialize or open the ads database
pub fn init_database(path: &Path) -> AdsResult<Connection> {
    let conn = Connection::open(path)
        .map_err(|e| AdsError::database(format!("Failed to open ads database: {}", e)))?;
    prepare(conn)
}

/// Open a private in-memory ads database
pub fn init_in_memory() -> AdsResult<Connection> {
    let conn = Connection::open_in_memory()
        .map_err(|e| AdsError::database(format!("Failed to open in-memory database: {}", e)))?;
    prepare(conn)
}

fn prepare(conn: Connection) -> AdsResult<Connection> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|e| AdsError::database(e.to_string()))?;

    // Check if schema_version table exists
    let table_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get::<_, i32>(0).map(|count| count > 0),
        )
        .unwrap_or(false);

    let version: i32 = if table_exists {
        conn.query_row(
            "SELECT version FROM schema_version ORDER BY id DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| AdsError::database(e.to_string()))?
        .unwrap_or(0)
    } else {
        0
    };

    if version < SCHEMA_VERSION {
        create_schema_v1(&conn)?;
    }

    Ok(conn)
}

/// Create initial schema (version 1)
fn create_schema_v1(conn: &Connection) -> AdsResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            version INTEGER NOT NULL,
            applied_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ad_history (
            created_at TIMESTAMP NOT NULL,
            type TEXT NOT NULL,
            confirmation_type TEXT NOT NULL,
            placement_id TEXT NOT NULL,
            creative_instance_id TEXT NOT NULL,
            creative_set_id TEXT NOT NULL,
            campaign_id TEXT NOT NULL,
            advertiser_id TEXT NOT NULL,
            segment TEXT NOT NULL,
            title TEXT,
            description TEXT,
            target_url TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_ad_history_created ON ad_history(created_at);
        CREATE INDEX IF NOT EXISTS idx_ad_history_confirmation ON ad_history(confirmation_type);
        CREATE INDEX IF NOT EXISTS idx_ad_history_placement ON ad_history(placement_id);
        CREATE INDEX IF NOT EXISTS idx_ad_history_creative ON ad_history(creative_instance_id);

        CREATE TABLE IF NOT EXISTS ad_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            placement_id TEXT NOT NULL,
            type TEXT NOT NULL,
            confirmation_type TEXT NOT NULL,
            creative_instance_id TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_ad_events_placement
            ON ad_events(placement_id, confirmation_type);
        CREATE INDEX IF NOT EXISTS idx_ad_events_created ON ad_events(created_at);

        CREATE TABLE IF NOT EXISTS reactions (
            kind TEXT NOT NULL,
            key TEXT NOT NULL,
            value INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (kind, key)
        );
        "#,
    )
    .map_err(|e| AdsError::database(format!("Failed to create schema: {}", e)))?;

    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?, ?)",
        params![SCHEMA_VERSION, Utc::now().timestamp()],
    )
    .map_err(|e| AdsError::database(e.to_string()))?;

    Ok(())
}

/// Append history rows, `batch_size` rows per statement, all in one transaction
pub fn insert_ad_history(
    conn: &mut Connection,
    items: &[AdHistoryItem],
    batch_size: usize,
) -> AdsResult<()> {
    if items.is_empty() {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .map_err(|e| AdsError::database(format!("Failed to begin transaction: {}", e)))?;
    insert_ad_history_rows(&tx, items, batch_size)?;
    tx.commit()
        .map_err(|e| AdsError::database(format!("Failed to commit ad history: {}", e)))?;

    Ok(())
}

/// Record the event behind a history item and append the item in one
/// transaction. Neither row is kept if either insert fails.
pub fn insert_ad_event_with_history(conn: &mut Connection, item: &AdHistoryItem) -> AdsResult<()> {
    let tx = conn
        .transaction()
        .map_err(|e| AdsError::database(format!("Failed to begin transaction: {}", e)))?;

    insert_ad_event(
        &tx,
        &item.placement_id,
        item.ad_type.as_str(),
        item.confirmation_type.as_str(),
        &item.creative_instance_id,
        item.created_at.timestamp_micros(),
    )?;
    insert_ad_history_rows(&tx, std::slice::from_ref(item), 1)?;

    tx.commit()
        .map_err(|e| AdsError::database(format!("Failed to commit ad event: {}", e)))?;

    Ok(())
}

fn insert_ad_history_rows(
    conn: &Connection,
    items: &[AdHistoryItem],
    batch_size: usize,
) -> AdsResult<()> {
    let row_placeholders = format!("({})", vec!["?"; AD_HISTORY_COLUMN_COUNT].join(", "));

    for chunk in items.chunks(batch_size.max(1)) {
        let placeholders = vec![row_placeholders.as_str(); chunk.len()].join(", ");
        let query = format!(
            "INSERT INTO ad_history ({}) VALUES {}",
            AD_HISTORY_COLUMNS, placeholders
        );

        let values: Vec<Value> = chunk.iter().flat_map(bind_ad_history_item).collect();
        conn.execute(&query, params_from_iter(values.iter()))
            .map_err(|e| AdsError::database(format!("Failed to insert ad history: {}", e)))?;
    }

    Ok(())
}

fn bind_ad_history_item(item: &AdHistoryItem) -> [Value; AD_HISTORY_COLUMN_COUNT] {
    [
        Value::Integer(item.created_at.timestamp_micros()),
        Value::Text(item.ad_type.as_str().to_string()),
        Value::Text(item.confirmation_type.as_str().to_string()),
        Value::Text(item.placement_id.clone()),
        Value::Text(item.creative_instance_id.clone()),
        Value::Text(item.creative_set_id.clone()),
        Value::Text(item.campaign_id.clone()),
        Value::Text(item.advertiser_id.clone()),
        Value::Text(item.segment.clone()),
        Value::Text(item.title.clone()),
        Value::Text(item.description.clone()),
        Value::Text(item.target_url.to_string()),
    ]
}

fn read_ad_history_row(row: &Row<'_>) -> rusqlite::Result<AdHistoryRow> {
    Ok(AdHistoryRow {
        created_at: row.get(0)?,
        ad_type: row.get(1)?,
        confirmation_type: row.get(2)?,
        placement_id: row.get(3)?,
        creative_instance_id: row.get(4)?,
        creative_set_id: row.get(5)?,
        campaign_id: row.get(6)?,
        advertiser_id: row.get(7)?,
        segment: row.get(8)?,
        title: row.get(9)?,
        description: row.get(10)?,
        target_url: row.get(11)?,
    })
}

/// Get history rows created within `[from, to]` (microseconds), newest first
pub fn get_ad_history_for_date_range(
    conn: &Connection,
    from_micros: i64,
    to_micros: i64,
) -> AdsResult<Vec<AdHistoryRow>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM ad_history
             WHERE created_at >= ? AND created_at <= ?
             ORDER BY created_at DESC",
            AD_HISTORY_COLUMNS
        ))
        .map_err(|e| AdsError::database(e.to_string()))?;

    let rows = stmt
        .query_map([from_micros, to_micros], read_ad_history_row)
        .map_err(|e| AdsError::database(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AdsError::database(e.to_string()))?;

    Ok(rows)
}

/// Get history rows for one creative instance in storage order
pub fn get_ad_history_for_creative_instance_id(
    conn: &Connection,
    creative_instance_id: &str,
) -> AdsResult<Vec<AdHistoryRow>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM ad_history
             WHERE creative_instance_id = ?
             ORDER BY rowid ASC",
            AD_HISTORY_COLUMNS
        ))
        .map_err(|e| AdsError::database(e.to_string()))?;

    let rows = stmt
        .query_map([creative_instance_id], read_ad_history_row)
        .map_err(|e| AdsError::database(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AdsError::database(e.to_string()))?;

    Ok(rows)
}

/// Delete history rows strictly older than the cutoff
pub fn purge_expired_ad_history(conn: &Connection, cutoff_micros: i64) -> AdsResult<usize> {
    conn.execute(
        "DELETE FROM ad_history WHERE created_at < ?",
        [cutoff_micros],
    )
    .map_err(|e| AdsError::database(e.to_string()))
}

pub fn delete_all_ad_history(conn: &Connection) -> AdsResult<usize> {
    conn.execute("DELETE FROM ad_history", [])
        .map_err(|e| AdsError::database(e.to_string()))
}

/// Record that an event fired for a placement
pub fn insert_ad_event(
    conn: &Connection,
    placement_id: &str,
    ad_type: &str,
    confirmation_type: &str,
    creative_instance_id: &str,
    created_at_micros: i64,
) -> AdsResult<()> {
    conn.execute(
        "INSERT INTO ad_events (placement_id, type, confirmation_type, creative_instance_id, created_at)
         VALUES (?, ?, ?, ?, ?)",
        params![
            placement_id,
            ad_type,
            confirmation_type,
            creative_instance_id,
            created_at_micros
        ],
    )
    .map_err(|e| AdsError::database(format!("Failed to insert ad event: {}", e)))?;

    Ok(())
}

pub fn has_ad_event(
    conn: &Connection,
    placement_id: &str,
    confirmation_type: &str,
) -> AdsResult<bool> {
    conn.query_row(
        "SELECT COUNT(*) FROM ad_events WHERE placement_id = ? AND confirmation_type = ?",
        [placement_id, confirmation_type],
        |row| row.get::<_, i64>(0).map(|count| count > 0),
    )
    .map_err(|e| AdsError::database(e.to_string()))
}

pub fn purge_expired_ad_events(conn: &Connection, cutoff_micros: i64) -> AdsResult<usize> {
    conn.execute("DELETE FROM ad_events WHERE created_at < ?", [cutoff_micros])
        .map_err(|e| AdsError::database(e.to_string()))
}

pub fn delete_all_ad_events(conn: &Connection) -> AdsResult<usize> {
    conn.execute("DELETE FROM ad_events", [])
        .map_err(|e| AdsError::database(e.to_string()))
}

/// Get a stored reaction value, if any
pub fn get_reaction(conn: &Connection, kind: &str, key: &str) -> AdsResult<Option<i64>> {
    conn.query_row(
        "SELECT value FROM reactions WHERE kind = ? AND key = ?",
        [kind, key],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| AdsError::database(e.to_string()))
}

/// Insert or replace a reaction value
pub fn set_reaction(
    conn: &Connection,
    kind: &str,
    key: &str,
    value: i64,
    updated_at_micros: i64,
) -> AdsResult<()> {
    conn.execute(
        "INSERT INTO reactions (kind, key, value, updated_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(kind, key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at",
        params![kind, key, value, updated_at_micros],
    )
    .map_err(|e| AdsError::database(e.to_string()))?;
    Ok(())
}

pub fn delete_reaction(conn: &Connection, kind: &str, key: &str) -> AdsResult<()> {
    conn.execute(
        "DELETE FROM reactions WHERE kind = ? AND key = ?",
        [kind, key],
    )
    .map_err(|e| AdsError::database(e.to_string()))?;
    Ok(())
}

pub fn delete_all_reactions(conn: &Connection) -> AdsResult<usize> {
    conn.execute("DELETE FROM reactions", [])
        .map_err(|e| AdsError::database(e.to_string()))
}
