use crate::ipc::error::ok;
use crate::ipc::helpers::{media_layout, require_db, resolve_upload, upload_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::roster;
use serde_json::json;

fn roster_get(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let media = media_layout(state)?;

    let Some(upload) = resolve_upload(conn, req)? else {
        return Ok(json!({
            "noUpload": true,
            "upload": null,
            "attendees": [],
        }));
    };

    let load = roster::load_roster(conn, &media, &upload, &state.layout, &state.config)?;
    Ok(json!({
        "noUpload": false,
        "upload": upload_json(&upload, &state.config),
        "attendees": load.records,
        "stats": load.stats,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "roster.get" => roster_get(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
