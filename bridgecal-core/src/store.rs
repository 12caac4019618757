//! Durable mapping store.
//!
//! One SQLite database (`state.db`) holds the pair table (which source id
//! on one side is mirrored by which id on the other) and a small cursor
//! key-value table. This is the only long-lived state of the process; it is
//! opened with an idempotent, versioned migration and mutated through
//! explicit transactions so a tick commits either a whole checkpoint or
//! nothing.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;

use crate::error::{BridgeCalError, BridgeCalResult};
use crate::event::Origin;

/// Cursor name for Google incremental listing.
pub const CURSOR_GOOGLE_SYNC_TOKEN: &str = "google_sync_token";
/// Cursor name recording when Outlook was last scanned (diagnostics only).
pub const CURSOR_LAST_OUTLOOK_SCAN_AT: &str = "last_outlook_scan_at";

/// One intended mirror pair.
///
/// `origin` names the side that was authoritative at creation; the ids are
/// unique across rows on both columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairRow {
    pub outlook_id: String,
    pub google_id: String,
    pub origin: Origin,
    pub last_outlook_modified: Option<DateTime<Utc>>,
    pub last_google_modified: Option<DateTime<Utc>>,
    pub last_outlook_fingerprint: Option<String>,
    pub last_google_fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PairRow {
    /// A fresh row for a pair whose source lives on `origin`.
    pub fn new(outlook_id: String, google_id: String, origin: Origin) -> Self {
        let now = Utc::now();
        PairRow {
            outlook_id,
            google_id,
            origin,
            last_outlook_modified: None,
            last_google_modified: None,
            last_outlook_fingerprint: None,
            last_google_fingerprint: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Native id of the source side.
    pub fn source_id(&self) -> &str {
        match self.origin {
            Origin::Outlook => &self.outlook_id,
            Origin::Google => &self.google_id,
        }
    }

    /// Native id of the mirror side.
    pub fn mirror_id(&self) -> &str {
        match self.origin {
            Origin::Outlook => &self.google_id,
            Origin::Google => &self.outlook_id,
        }
    }

    pub fn fingerprint_for(&self, side: Origin) -> Option<&str> {
        match side {
            Origin::Outlook => self.last_outlook_fingerprint.as_deref(),
            Origin::Google => self.last_google_fingerprint.as_deref(),
        }
    }

    pub fn modified_for(&self, side: Origin) -> Option<DateTime<Utc>> {
        match side {
            Origin::Outlook => self.last_outlook_modified,
            Origin::Google => self.last_google_modified,
        }
    }

    pub fn set_side(
        &mut self,
        side: Origin,
        fingerprint: Option<String>,
        modified: Option<DateTime<Utc>>,
    ) {
        match side {
            Origin::Outlook => {
                self.last_outlook_fingerprint = fingerprint;
                self.last_outlook_modified = modified;
            }
            Origin::Google => {
                self.last_google_fingerprint = fingerprint;
                self.last_google_modified = modified;
            }
        }
    }
}

pub struct MappingStore {
    conn: Connection,
}

impl MappingStore {
    /// Open or create the store at `path`, migrating the schema if needed.
    pub fn open(path: &Path) -> BridgeCalResult<MappingStore> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BridgeCalError::Config(format!(
                    "cannot create data directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let conn = Connection::open(path)?;
        let store = MappingStore { conn };
        store.migrate()?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> BridgeCalResult<MappingStore> {
        let conn = Connection::open_in_memory()?;
        let store = MappingStore { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> BridgeCalResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );",
        )?;

        let version: i64 = self
            .conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap_or(0);

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS pair (
                    outlook_id TEXT PRIMARY KEY,
                    google_id  TEXT NOT NULL UNIQUE,
                    origin     TEXT NOT NULL,
                    last_outlook_modified    TEXT,
                    last_google_modified     TEXT,
                    last_outlook_fingerprint TEXT,
                    last_google_fingerprint  TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS cursor (
                    name  TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                DELETE FROM schema_version;
                INSERT INTO schema_version (version) VALUES (1);",
            )?;
        }

        Ok(())
    }

    pub fn get_by_outlook(&self, outlook_id: &str) -> BridgeCalResult<Option<PairRow>> {
        get_one(&self.conn, "outlook_id", outlook_id)
    }

    pub fn get_by_google(&self, google_id: &str) -> BridgeCalResult<Option<PairRow>> {
        get_one(&self.conn, "google_id", google_id)
    }

    pub fn list_all(&self) -> BridgeCalResult<Vec<PairRow>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_PAIR} ORDER BY outlook_id"))?;
        let rows = stmt.query_map([], row_to_pair)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn list_where_outlook_in(&self, outlook_ids: &[String]) -> BridgeCalResult<Vec<PairRow>> {
        if outlook_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; outlook_ids.len()].join(",");
        let sql =
            format!("{SELECT_PAIR} WHERE outlook_id IN ({placeholders}) ORDER BY outlook_id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(outlook_ids.iter()), row_to_pair)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn upsert(&self, row: &PairRow) -> BridgeCalResult<()> {
        upsert_pair(&self.conn, row)
    }

    pub fn delete(&self, row: &PairRow) -> BridgeCalResult<()> {
        delete_pair(&self.conn, &row.outlook_id)
    }

    pub fn get_cursor(&self, name: &str) -> BridgeCalResult<Option<String>> {
        let result = self.conn.query_row(
            "SELECT value FROM cursor WHERE name = ?1",
            params![name],
            |row| row.get(0),
        );
        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_cursor(&self, name: &str, value: &str) -> BridgeCalResult<()> {
        set_cursor(&self.conn, name, value)
    }

    /// Run `f` inside one transaction; it either commits fully or fails with
    /// no side effects.
    pub fn transaction<T>(
        &mut self,
        f: impl FnOnce(&StoreTx<'_>) -> BridgeCalResult<T>,
    ) -> BridgeCalResult<T> {
        let tx = self.conn.transaction()?;
        let wrapper = StoreTx { tx };
        let out = f(&wrapper)?;
        wrapper.tx.commit()?;
        Ok(out)
    }
}

/// Mutation handle passed to [`MappingStore::transaction`] closures.
pub struct StoreTx<'a> {
    tx: rusqlite::Transaction<'a>,
}

impl StoreTx<'_> {
    pub fn upsert(&self, row: &PairRow) -> BridgeCalResult<()> {
        upsert_pair(&self.tx, row)
    }

    pub fn delete_by_outlook(&self, outlook_id: &str) -> BridgeCalResult<()> {
        delete_pair(&self.tx, outlook_id)
    }

    pub fn set_cursor(&self, name: &str, value: &str) -> BridgeCalResult<()> {
        set_cursor(&self.tx, name, value)
    }
}

const SELECT_PAIR: &str = "SELECT outlook_id, google_id, origin, \
     last_outlook_modified, last_google_modified, \
     last_outlook_fingerprint, last_google_fingerprint, \
     created_at, updated_at FROM pair";

fn get_one(conn: &Connection, column: &str, id: &str) -> BridgeCalResult<Option<PairRow>> {
    let sql = format!("{SELECT_PAIR} WHERE {column} = ?1");
    let result = conn.query_row(&sql, params![id], row_to_pair);
    match result {
        Ok(row) => Ok(Some(row)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn upsert_pair(conn: &Connection, row: &PairRow) -> BridgeCalResult<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO pair (outlook_id, google_id, origin,
             last_outlook_modified, last_google_modified,
             last_outlook_fingerprint, last_google_fingerprint,
             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
         ON CONFLICT(outlook_id) DO UPDATE SET
             google_id = excluded.google_id,
             origin = excluded.origin,
             last_outlook_modified = excluded.last_outlook_modified,
             last_google_modified = excluded.last_google_modified,
             last_outlook_fingerprint = excluded.last_outlook_fingerprint,
             last_google_fingerprint = excluded.last_google_fingerprint,
             updated_at = excluded.updated_at",
        params![
            row.outlook_id,
            row.google_id,
            row.origin.as_str(),
            row.last_outlook_modified.map(|t| t.to_rfc3339()),
            row.last_google_modified.map(|t| t.to_rfc3339()),
            row.last_outlook_fingerprint,
            row.last_google_fingerprint,
            now,
        ],
    )?;
    Ok(())
}

fn delete_pair(conn: &Connection, outlook_id: &str) -> BridgeCalResult<()> {
    conn.execute("DELETE FROM pair WHERE outlook_id = ?1", params![outlook_id])?;
    Ok(())
}

fn set_cursor(conn: &Connection, name: &str, value: &str) -> BridgeCalResult<()> {
    conn.execute(
        "INSERT INTO cursor (name, value) VALUES (?1, ?2)
         ON CONFLICT(name) DO UPDATE SET value = excluded.value",
        params![name, value],
    )?;
    Ok(())
}

fn row_to_pair(row: &rusqlite::Row<'_>) -> rusqlite::Result<PairRow> {
    Ok(PairRow {
        outlook_id: row.get(0)?,
        google_id: row.get(1)?,
        origin: parse_origin(row.get::<_, String>(2)?)?,
        last_outlook_modified: parse_optional_ts(row.get(3)?)?,
        last_google_modified: parse_optional_ts(row.get(4)?)?,
        last_outlook_fingerprint: row.get(5)?,
        last_google_fingerprint: row.get(6)?,
        created_at: parse_ts(row.get(7)?)?,
        updated_at: parse_ts(row.get(8)?)?,
    })
}

fn parse_origin(raw: String) -> rusqlite::Result<Origin> {
    match raw.as_str() {
        "outlook" => Ok(Origin::Outlook),
        "google" => Ok(Origin::Google),
        _ => Err(conversion_error(format!("unknown origin '{raw}'"))),
    }
}

fn parse_optional_ts(raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(parse_ts).transpose()
}

fn parse_ts(raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(e.to_string()))
}

fn conversion_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        message.into(),
    )
}
