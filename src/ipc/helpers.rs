use crate::config::RosterConfig;
use crate::db::{self, Upload};
use crate::error::{RosterError, SelectionError};
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::normalize::{parse_flag, to_jalali_str};
use crate::roster::MediaLayout;
use chrono::{DateTime, FixedOffset};
use rusqlite::Connection;
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<RosterError> for HandlerErr {
    fn from(e: RosterError) -> Self {
        HandlerErr::new(e.code(), format!("{e:#}"))
    }
}

impl From<SelectionError> for HandlerErr {
    fn from(e: SelectionError) -> Self {
        HandlerErr::new(e.code(), e.to_string())
    }
}

impl From<rusqlite::Error> for HandlerErr {
    fn from(e: rusqlite::Error) -> Self {
        HandlerErr::new("db_query_failed", e.to_string())
    }
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn media_layout(state: &AppState) -> Result<MediaLayout, HandlerErr> {
    state
        .workspace
        .as_deref()
        .map(MediaLayout::for_workspace)
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn param_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

/// Accepts JSON booleans, 0/1 and the usual on/off words.
pub fn param_flag(req: &Request, key: &str) -> Result<Option<bool>, HandlerErr> {
    let Some(v) = req.params.get(key) else {
        return Ok(None);
    };
    let parsed = match v {
        serde_json::Value::Null => return Ok(None),
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        serde_json::Value::String(s) => parse_flag(s),
        _ => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| HandlerErr::new("bad_params", format!("{key} must be a boolean")))
}

/// The upload named by `params.uploadId`, or the most recent one.
pub fn resolve_upload(conn: &Connection, req: &Request) -> Result<Option<Upload>, HandlerErr> {
    match param_str(req, "uploadId") {
        Some(id) => match db::upload_get(conn, id)? {
            Some(u) => Ok(Some(u)),
            None => Err(HandlerErr::new("not_found", "upload not found")),
        },
        None => Ok(db::upload_latest(conn)?),
    }
}

pub fn require_upload(conn: &Connection, req: &Request) -> Result<Upload, HandlerErr> {
    resolve_upload(conn, req)?.ok_or_else(|| HandlerErr::new("no_upload", "no upload yet"))
}

pub fn upload_created_jalali(upload: &Upload, cfg: &RosterConfig) -> Option<String> {
    let created = DateTime::parse_from_rfc3339(&upload.created_at).ok()?;
    let offset = FixedOffset::east_opt(cfg.display_offset_minutes * 60)?;
    Some(to_jalali_str(&created.with_timezone(&offset).naive_local()))
}

pub fn upload_json(upload: &Upload, cfg: &RosterConfig) -> serde_json::Value {
    json!({
        "id": upload.id,
        "spreadsheetName": upload.spreadsheet_name,
        "spreadsheetSha256": upload.spreadsheet_sha256,
        "photosZipName": upload.photos_zip_name,
        "photosZipSha256": upload.photos_zip_sha256,
        "createdAt": upload.created_at,
        "createdAtJalali": upload_created_jalali(upload, cfg),
    })
}
