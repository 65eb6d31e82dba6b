use crate::db::{self, AttendeeRow, ATTENDEE_COLUMNS};
use crate::error::SelectionError;
use crate::normalize::DEFAULT_TAG;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionState {
    pub email: String,
    pub selected: bool,
}

fn clean_email(email: &str) -> Result<String, SelectionError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(SelectionError::MissingEmail);
    }
    Ok(email)
}

/// Returns the attendee row for `(upload_id, email)`, inserting a default row
/// first when none exists. A concurrent insert of the same key resolves to the
/// row that won.
pub fn get_or_create(
    conn: &Connection,
    upload_id: &str,
    email: &str,
) -> Result<AttendeeRow, SelectionError> {
    let email = clean_email(email)?;
    let now = db::now_rfc3339();
    conn.execute(
        "INSERT INTO attendees(id, upload_id, email, name, tag, selected, created_at, updated_at)
         VALUES(?, ?, ?, '', ?, 0, ?, ?)
         ON CONFLICT(upload_id, email) DO NOTHING",
        (
            Uuid::new_v4().to_string(),
            upload_id,
            &email,
            DEFAULT_TAG,
            &now,
            &now,
        ),
    )?;
    db::attendee_get(conn, upload_id, &email)?.ok_or(SelectionError::Storage(
        rusqlite::Error::QueryReturnedNoRows,
    ))
}

/// Sets the `selected` flag.
///
/// Unprivileged callers may only select: asking to unselect fails with
/// `PermissionDenied`, and selecting an already-selected attendee reports the
/// current state without writing.
pub fn set_selected(
    conn: &Connection,
    upload_id: &str,
    email: &str,
    desired: bool,
    privileged: bool,
) -> Result<SelectionState, SelectionError> {
    let email = clean_email(email)?;
    if !privileged && !desired {
        return Err(SelectionError::PermissionDenied);
    }

    let row = get_or_create(conn, upload_id, &email)?;
    if !privileged && row.selected {
        return Ok(SelectionState {
            email,
            selected: true,
        });
    }

    conn.execute(
        "UPDATE attendees SET selected = ?, updated_at = ? WHERE upload_id = ? AND email = ?",
        (desired as i64, db::now_rfc3339(), upload_id, &email),
    )?;
    tracing::info!(upload_id, email = %email, selected = desired, privileged, "selection updated");

    Ok(SelectionState {
        email,
        selected: desired,
    })
}

#[derive(Debug, Clone, Default)]
pub struct AttendeeFilter {
    pub selected: Option<bool>,
    pub tag: Option<String>,
    /// Case-insensitive substring of name or email.
    pub query: Option<String>,
}

/// Makes `%`, `_` and `\` match literally under `ESCAPE '\'`.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn list_attendees(
    conn: &Connection,
    upload_id: &str,
    filter: &AttendeeFilter,
) -> Result<Vec<AttendeeRow>, SelectionError> {
    let mut sql = format!("SELECT {ATTENDEE_COLUMNS} FROM attendees WHERE upload_id = ?");
    let mut bind: Vec<Value> = vec![Value::Text(upload_id.to_string())];

    if let Some(sel) = filter.selected {
        sql.push_str(" AND selected = ?");
        bind.push(Value::Integer(sel as i64));
    }
    if let Some(tag) = filter.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        sql.push_str(" AND tag = ?");
        bind.push(Value::Text(tag.to_uppercase()));
    }
    if let Some(q) = filter.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        sql.push_str(" AND (lower(name) LIKE ? ESCAPE '\\' OR email LIKE ? ESCAPE '\\')");
        let pattern = format!("%{}%", escape_like(&q.to_lowercase()));
        bind.push(Value::Text(pattern.clone()));
        bind.push(Value::Text(pattern));
    }
    sql.push_str(" ORDER BY name, email");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), db::attendee_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Staff bulk action. With no emails the whole upload is updated.
pub fn bulk_set_selected(
    conn: &Connection,
    upload_id: &str,
    emails: Option<&[String]>,
    selected: bool,
    privileged: bool,
) -> Result<usize, SelectionError> {
    if !privileged {
        return Err(SelectionError::PermissionDenied);
    }
    let now = db::now_rfc3339();

    let updated = match emails {
        None => conn.execute(
            "UPDATE attendees SET selected = ?, updated_at = ? WHERE upload_id = ?",
            (selected as i64, &now, upload_id),
        )?,
        Some(list) => {
            let tx = conn.unchecked_transaction()?;
            let mut n = 0usize;
            for email in list {
                let email = email.trim().to_lowercase();
                if email.is_empty() {
                    continue;
                }
                n += tx.execute(
                    "UPDATE attendees SET selected = ?, updated_at = ?
                     WHERE upload_id = ? AND email = ?",
                    (selected as i64, &now, upload_id, &email),
                )?;
            }
            tx.commit()?;
            n
        }
    };
    tracing::info!(upload_id, updated, selected, "bulk selection applied");
    Ok(updated)
}
