use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const DB_FILE: &str = "roster.sqlite3";

pub fn open_db(workspace: &Path, busy_timeout: Duration) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    init_schema(&conn, busy_timeout)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection, busy_timeout: Duration) -> anyhow::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS uploads(
            id TEXT PRIMARY KEY,
            spreadsheet_path TEXT NOT NULL,
            spreadsheet_name TEXT NOT NULL,
            spreadsheet_sha256 TEXT NOT NULL,
            photos_zip_path TEXT NOT NULL,
            photos_zip_name TEXT NOT NULL,
            photos_zip_sha256 TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_uploads_created ON uploads(created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendees(
            id TEXT PRIMARY KEY,
            upload_id TEXT NOT NULL,
            email TEXT NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            tag TEXT NOT NULL DEFAULT 'PRODUCT',
            selected INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(upload_id) REFERENCES uploads(id) ON DELETE CASCADE,
            UNIQUE(upload_id, email)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendees_upload ON attendees(upload_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendees_upload_name ON attendees(upload_id, name, email)",
        [],
    )?;

    Ok(())
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    pub id: String,
    pub spreadsheet_path: String,
    pub spreadsheet_name: String,
    pub spreadsheet_sha256: String,
    pub photos_zip_path: String,
    pub photos_zip_name: String,
    pub photos_zip_sha256: String,
    pub created_at: String,
}

const UPLOAD_COLUMNS: &str = "id, spreadsheet_path, spreadsheet_name, spreadsheet_sha256,
     photos_zip_path, photos_zip_name, photos_zip_sha256, created_at";

fn upload_from_row(row: &Row<'_>) -> rusqlite::Result<Upload> {
    Ok(Upload {
        id: row.get(0)?,
        spreadsheet_path: row.get(1)?,
        spreadsheet_name: row.get(2)?,
        spreadsheet_sha256: row.get(3)?,
        photos_zip_path: row.get(4)?,
        photos_zip_name: row.get(5)?,
        photos_zip_sha256: row.get(6)?,
        created_at: row.get(7)?,
    })
}

pub fn upload_insert(conn: &Connection, u: &Upload) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO uploads(id, spreadsheet_path, spreadsheet_name, spreadsheet_sha256,
             photos_zip_path, photos_zip_name, photos_zip_sha256, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &u.id,
            &u.spreadsheet_path,
            &u.spreadsheet_name,
            &u.spreadsheet_sha256,
            &u.photos_zip_path,
            &u.photos_zip_name,
            &u.photos_zip_sha256,
            &u.created_at,
        ),
    )?;
    Ok(())
}

/// The active upload: most recent by creation time, later inserts winning ties.
pub fn upload_latest(conn: &Connection) -> rusqlite::Result<Option<Upload>> {
    conn.query_row(
        &format!(
            "SELECT {UPLOAD_COLUMNS} FROM uploads ORDER BY created_at DESC, rowid DESC LIMIT 1"
        ),
        [],
        upload_from_row,
    )
    .optional()
}

pub fn upload_get(conn: &Connection, upload_id: &str) -> rusqlite::Result<Option<Upload>> {
    conn.query_row(
        &format!("SELECT {UPLOAD_COLUMNS} FROM uploads WHERE id = ?"),
        [upload_id],
        upload_from_row,
    )
    .optional()
}

pub fn uploads_list(conn: &Connection) -> rusqlite::Result<Vec<Upload>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {UPLOAD_COLUMNS} FROM uploads ORDER BY created_at DESC, rowid DESC"
    ))?;
    let rows = stmt
        .query_map([], upload_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Deletes the upload row; attendees go with it through the cascade.
pub fn upload_delete(conn: &Connection, upload_id: &str) -> rusqlite::Result<bool> {
    let n = conn.execute("DELETE FROM uploads WHERE id = ?", [upload_id])?;
    Ok(n > 0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeRow {
    pub id: String,
    pub upload_id: String,
    pub email: String,
    pub name: String,
    pub tag: String,
    pub selected: bool,
    pub created_at: String,
    pub updated_at: String,
}

pub const ATTENDEE_COLUMNS: &str =
    "id, upload_id, email, name, tag, selected, created_at, updated_at";

pub fn attendee_from_row(row: &Row<'_>) -> rusqlite::Result<AttendeeRow> {
    Ok(AttendeeRow {
        id: row.get(0)?,
        upload_id: row.get(1)?,
        email: row.get(2)?,
        name: row.get(3)?,
        tag: row.get(4)?,
        selected: row.get::<_, i64>(5)? != 0,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Snapshot of every attendee of an upload, keyed by lowercase email.
pub fn attendees_by_email(
    conn: &Connection,
    upload_id: &str,
) -> rusqlite::Result<HashMap<String, AttendeeRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ATTENDEE_COLUMNS} FROM attendees WHERE upload_id = ?"
    ))?;
    let rows = stmt
        .query_map([upload_id], attendee_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .map(|a| (a.email.to_lowercase(), a))
        .collect())
}

pub fn attendee_get(
    conn: &Connection,
    upload_id: &str,
    email: &str,
) -> rusqlite::Result<Option<AttendeeRow>> {
    conn.query_row(
        &format!("SELECT {ATTENDEE_COLUMNS} FROM attendees WHERE upload_id = ? AND email = ?"),
        [upload_id, email],
        attendee_from_row,
    )
    .optional()
}
