use crate::db;
use crate::ipc::error::ok;
use crate::ipc::helpers::{media_layout, param_str, require_db, upload_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::uploads;
use serde_json::json;
use std::path::PathBuf;

fn uploads_create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let media = media_layout(state)?;
    let Some(spreadsheet) = param_str(req, "spreadsheetPath").map(PathBuf::from) else {
        return Err(HandlerErr::new("bad_params", "missing spreadsheetPath"));
    };
    let Some(photos_zip) = param_str(req, "photosZipPath").map(PathBuf::from) else {
        return Err(HandlerErr::new("bad_params", "missing photosZipPath"));
    };

    let upload = uploads::create_upload(conn, &media, &spreadsheet, &photos_zip)?;
    Ok(json!({ "upload": upload_json(&upload, &state.config) }))
}

fn uploads_list(state: &AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "uploads": [] }));
    };
    let list: Vec<serde_json::Value> = db::uploads_list(conn)?
        .iter()
        .map(|u| upload_json(u, &state.config))
        .collect();
    Ok(json!({ "uploads": list }))
}

fn uploads_delete(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let media = media_layout(state)?;
    let Some(upload_id) = param_str(req, "uploadId") else {
        return Err(HandlerErr::new("bad_params", "missing uploadId"));
    };
    if !uploads::delete_upload(conn, &media, upload_id)? {
        return Err(HandlerErr::new("not_found", "upload not found"));
    }
    Ok(json!({ "deleted": true, "uploadId": upload_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "uploads.create" => uploads_create(state, req),
        "uploads.list" => uploads_list(state, req),
        "uploads.delete" => uploads_delete(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
