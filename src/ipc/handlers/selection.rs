use crate::ipc::error::ok;
use crate::ipc::helpers::{param_flag, param_str, require_db, require_upload, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::selection::{self, AttendeeFilter};
use serde_json::json;

fn selection_set(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let upload = require_upload(conn, req)?;

    let email = param_str(req, "email").unwrap_or("").trim().to_lowercase();
    if email.is_empty() {
        return Err(HandlerErr::new("bad_params", "missing email"));
    }
    let Some(desired) = param_flag(req, "selected")? else {
        return Err(HandlerErr::new("bad_params", "missing selected"));
    };
    let privileged = param_flag(req, "privileged")?.unwrap_or(false);

    let outcome = selection::set_selected(conn, &upload.id, &email, desired, privileged)?;
    Ok(json!({
        "uploadId": upload.id,
        "email": outcome.email,
        "selected": outcome.selected,
    }))
}

fn attendees_list(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let upload = require_upload(conn, req)?;
    let filter = AttendeeFilter {
        selected: param_flag(req, "selected")?,
        tag: param_str(req, "tag").map(str::to_string),
        query: param_str(req, "q").map(str::to_string),
    };
    let rows = selection::list_attendees(conn, &upload.id, &filter)?;
    Ok(json!({ "uploadId": upload.id, "attendees": rows }))
}

fn attendees_bulk_set(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let upload = require_upload(conn, req)?;
    let Some(selected) = param_flag(req, "selected")? else {
        return Err(HandlerErr::new("bad_params", "missing selected"));
    };
    let privileged = param_flag(req, "privileged")?.unwrap_or(false);

    let emails: Option<Vec<String>> = match req.params.get("emails") {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        Some(_) => return Err(HandlerErr::new("bad_params", "emails must be an array")),
    };

    let updated =
        selection::bulk_set_selected(conn, &upload.id, emails.as_deref(), selected, privileged)?;
    Ok(json!({ "uploadId": upload.id, "updated": updated, "selected": selected }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "selection.set" => selection_set(state, req),
        "attendees.list" => attendees_list(state, req),
        "attendees.bulkSetSelected" => attendees_bulk_set(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
