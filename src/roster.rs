use crate::archive;
use crate::config::RosterConfig;
use crate::db::{self, AttendeeRow, Upload};
use crate::error::RosterError;
use crate::normalize::{
    format_mobile, normalize_interest_term, normalize_tag, normalize_value, parse_list,
    status_is_present, value_text, DEFAULT_TAG,
};
use crate::photos::{self, PhotoIndex};
use crate::sheet::{self, Sheet, SheetLayout, SheetSchema};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const UNNAMED_PLACEHOLDER: &str = "(بدون نام)";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryEntry {
    pub label: String,
    pub value: String,
}

/// Per-read view of one attendee. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayRecord {
    pub name: String,
    pub email: String,
    pub photo_url: String,
    pub interests: Vec<String>,
    pub summary: Vec<SummaryEntry>,
    pub search_blob: String,
    pub raw_json: String,
    pub tag: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAttendee {
    pub email: String,
    pub name: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendeeUpdate {
    pub id: String,
    pub name: String,
    pub tag: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub creates: Vec<NewAttendee>,
    pub updates: Vec<AttendeeUpdate>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub rows: usize,
    pub shown: usize,
    pub created: usize,
    pub updated: usize,
}

pub struct RosterLoad {
    pub records: Vec<DisplayRecord>,
    pub stats: ReconcileStats,
}

/// Where an upload's files live inside a workspace.
#[derive(Debug, Clone)]
pub struct MediaLayout {
    pub media_root: PathBuf,
}

impl MediaLayout {
    pub fn for_workspace(workspace: &Path) -> Self {
        MediaLayout {
            media_root: workspace.join("media"),
        }
    }

    pub fn extract_subdir(upload_id: &str) -> String {
        format!("extracted/upload_{upload_id}")
    }

    pub fn extract_dir(&self, upload_id: &str) -> PathBuf {
        self.media_root.join(Self::extract_subdir(upload_id))
    }

    pub fn blob_path(&self, rel: &str) -> PathBuf {
        self.media_root.join(rel)
    }
}

pub fn photo_url(media_url: &str, upload_id: &str, rel: &str) -> String {
    format!(
        "{}{}/{}",
        media_url,
        MediaLayout::extract_subdir(upload_id),
        rel
    )
}

/// Reads the upload's spreadsheet and photos, reconciles the attendee
/// snapshot, and returns display records sorted by name.
pub fn load_roster(
    conn: &Connection,
    media: &MediaLayout,
    upload: &Upload,
    layout: &SheetLayout,
    config: &RosterConfig,
) -> Result<RosterLoad, RosterError> {
    let zip_path = media.blob_path(&upload.photos_zip_path);
    let extract_dir = media.extract_dir(&upload.id);
    archive::extract_once(&zip_path, &extract_dir)
        .map_err(|e| RosterError::ArchiveUnreadable(format!("{e:#}")))?;
    let index = photos::build_photo_index(&extract_dir);

    let sheet = sheet::read_sheet(&media.blob_path(&upload.spreadsheet_path))?;
    let schema = layout.resolve(&sheet.columns);

    let existing = db::attendees_by_email(conn, &upload.id)?;
    let (mut records, plan) =
        plan_reconciliation(&upload.id, &sheet, &schema, &index, &existing, &config.media_url);

    let (created, updated) = apply_plan(conn, &upload.id, &plan)?;
    let stats = ReconcileStats {
        rows: sheet.rows.len(),
        shown: records.len(),
        created,
        updated,
    };
    tracing::info!(
        upload_id = %upload.id,
        rows = stats.rows,
        shown = stats.shown,
        created,
        updated,
        photos = index.len(),
        "roster reconciled"
    );

    sort_records(&mut records);
    Ok(RosterLoad { records, stats })
}

/// Stable sort by display name, so equal names keep sheet order.
pub fn sort_records(records: &mut [DisplayRecord]) {
    records.sort_by(|a, b| a.name.cmp(&b.name));
}

fn cell_text(item: &Map<String, Value>, key: &str) -> String {
    item.get(key).map(value_text).unwrap_or_default()
}

/// Builds display records for every present row and the mutations that bring
/// the persisted snapshot in line with the sheet. Never touches `selected`.
pub fn plan_reconciliation(
    upload_id: &str,
    sheet: &Sheet,
    schema: &SheetSchema,
    index: &PhotoIndex,
    existing: &HashMap<String, AttendeeRow>,
    media_url: &str,
) -> (Vec<DisplayRecord>, ReconcilePlan) {
    let mut records = Vec::new();
    let mut plan = ReconcilePlan::default();
    let mut seen: HashSet<String> = HashSet::new();

    for row in &sheet.rows {
        let mut item: Map<String, Value> = sheet
            .columns
            .iter()
            .zip(row.iter())
            .map(|(col, cell)| (col.clone(), normalize_value(cell)))
            .collect();

        let status = item.get(&schema.status).cloned().unwrap_or(Value::Null);
        if !status_is_present(&status) {
            continue;
        }

        if item.contains_key(&schema.phone) {
            let phone = format_mobile(&cell_text(&item, &schema.phone), false);
            if !phone.is_empty() {
                item.insert(schema.phone.clone(), Value::String(phone));
            }
        }

        let email_raw = cell_text(&item, &schema.email).trim().to_string();
        let email = email_raw.to_lowercase();
        if !email.is_empty() && !seen.insert(email.clone()) {
            tracing::debug!(email = %email, "skipping repeated email in spreadsheet");
            continue;
        }

        let mut name = cell_text(&item, &schema.name).trim().to_string();
        if name.is_empty() {
            name = cell_text(&item, &schema.fallback_name).trim().to_string();
        }

        let tag = normalize_tag(cell_text(&item, &schema.tag).trim());
        item.insert(schema.tag.clone(), Value::String(tag.clone()));

        let mut interests = Vec::new();
        if let Some(key) = &schema.interests {
            let raw = item.get(key).cloned().unwrap_or(Value::Null);
            interests = parse_list(&raw)
                .iter()
                .map(|s| normalize_interest_term(s))
                .filter(|s| !s.is_empty())
                .collect();
            item.insert(key.clone(), Value::String(interests.join(", ")));
        }

        let photo = index
            .get(&email)
            .map(|rel| photo_url(media_url, upload_id, rel))
            .unwrap_or_default();

        let summary = schema
            .summary
            .iter()
            .filter_map(|k| {
                let value = cell_text(&item, k).trim().to_string();
                (!value.is_empty()).then(|| SummaryEntry {
                    label: k.clone(),
                    value,
                })
            })
            .collect();

        let mut blob_parts = vec![name.clone(), email_raw.clone()];
        blob_parts.extend(
            schema
                .search
                .iter()
                .map(|k| cell_text(&item, k).trim().to_string()),
        );
        blob_parts.push(cell_text(&item, &schema.phone).trim().to_string());
        blob_parts.push(tag.clone());
        blob_parts.push(interests.join(" "));
        let search_blob = blob_parts.join(" ").to_lowercase();

        let raw_json = serde_json::to_string(&item).unwrap_or_default();

        let mut selected = false;
        if !email.is_empty() {
            match existing.get(&email) {
                None => plan.creates.push(NewAttendee {
                    email: email.clone(),
                    name: name.clone(),
                    tag: tag.clone(),
                }),
                Some(row) => {
                    selected = row.selected;
                    if row.name != name || row.tag != tag {
                        plan.updates.push(AttendeeUpdate {
                            id: row.id.clone(),
                            name: name.clone(),
                            tag: tag.clone(),
                        });
                    }
                }
            }
        }

        records.push(DisplayRecord {
            name: if name.is_empty() {
                UNNAMED_PLACEHOLDER.to_string()
            } else {
                name
            },
            email: email_raw,
            photo_url: photo,
            interests,
            summary,
            search_blob,
            raw_json,
            tag,
            selected,
        });
    }

    (records, plan)
}

/// Applies a plan in one transaction. Creates that hit an existing
/// `(upload, email)` pair are ignored. Returns `(created, updated)`.
pub fn apply_plan(
    conn: &Connection,
    upload_id: &str,
    plan: &ReconcilePlan,
) -> rusqlite::Result<(usize, usize)> {
    if plan.is_empty() {
        return Ok((0, 0));
    }
    let now = db::now_rfc3339();
    let tx = conn.unchecked_transaction()?;
    let mut created = 0usize;
    let mut updated = 0usize;
    {
        let mut insert = tx.prepare(
            "INSERT INTO attendees(id, upload_id, email, name, tag, selected, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, 0, ?, ?)
             ON CONFLICT(upload_id, email) DO NOTHING",
        )?;
        for a in &plan.creates {
            let tag = if a.tag.is_empty() { DEFAULT_TAG } else { &a.tag };
            created += insert.execute((
                Uuid::new_v4().to_string(),
                upload_id,
                &a.email,
                &a.name,
                tag,
                &now,
                &now,
            ))?;
        }

        let mut update =
            tx.prepare("UPDATE attendees SET name = ?, tag = ?, updated_at = ? WHERE id = ?")?;
        for u in &plan.updates {
            updated += update.execute((&u.name, &u.tag, &now, &u.id))?;
        }
    }
    tx.commit()?;
    Ok((created, updated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Cell;
    use crate::selection;
    use crate::sheet::{CITY_COLUMN, PHONE_COLUMN};
    use std::time::Duration;

    fn t(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn opt(s: &str) -> Cell {
        if s.is_empty() {
            Cell::Empty
        } else {
            t(s)
        }
    }

    /// A row with only the status, email, name and tag cells filled.
    fn row(status: Cell, email: &str, name: &str, tag: &str) -> Vec<Cell> {
        vec![
            status,
            opt(email),
            opt(name),
            Cell::Empty,
            opt(tag),
            Cell::Empty,
            Cell::Empty,
            Cell::Empty,
        ]
    }

    fn sample_sheet(rows: Vec<Vec<Cell>>) -> Sheet {
        Sheet {
            columns: vec![
                "Status".to_string(),
                "User Email".to_string(),
                "نام و نام\u{200c}خانوادگی".to_string(),
                "User Name".to_string(),
                "Tag".to_string(),
                PHONE_COLUMN.to_string(),
                CITY_COLUMN.to_string(),
                "حوزه های مورد علاقه".to_string(),
            ],
            rows,
        }
    }

    fn plan(
        sheet: &Sheet,
        existing: &HashMap<String, AttendeeRow>,
    ) -> (Vec<DisplayRecord>, ReconcilePlan) {
        let schema = SheetLayout::default().resolve(&sheet.columns);
        plan_reconciliation("u1", sheet, &schema, &PhotoIndex::new(), existing, "/media/")
    }

    fn existing_row(email: &str, name: &str, tag: &str, selected: bool) -> AttendeeRow {
        AttendeeRow {
            id: format!("id-{email}"),
            upload_id: "u1".into(),
            email: email.into(),
            name: name.into(),
            tag: tag.into(),
            selected,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory db");
        db::init_schema(&conn, Duration::from_millis(100)).expect("schema");
        let upload = Upload {
            id: "u1".to_string(),
            spreadsheet_path: "uploads/excel/u1_a.csv".to_string(),
            spreadsheet_name: "a.csv".to_string(),
            spreadsheet_sha256: String::new(),
            photos_zip_path: "uploads/photos_zip/u1_a.zip".to_string(),
            photos_zip_name: "a.zip".to_string(),
            photos_zip_sha256: String::new(),
            created_at: db::now_rfc3339(),
        };
        db::upload_insert(&conn, &upload).expect("insert upload");
        conn
    }

    #[test]
    fn absent_rows_are_filtered() {
        let sheet = sample_sheet(vec![
            row(Cell::Int(1), "a@x.io", "Ali", "sw"),
            row(Cell::Int(0), "b@x.io", "Bita", ""),
            row(Cell::Empty, "c@x.io", "Cyrus", ""),
            row(t("no"), "d@x.io", "Dara", ""),
            row(t("Present"), "e@x.io", "Elham", ""),
        ]);
        let (records, plan) = plan(&sheet, &HashMap::new());
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Ali", "Elham"]);
        assert_eq!(plan.creates.len(), 2);
        assert_eq!(records[0].tag, "SOFTWARE");
    }

    #[test]
    fn normalizes_row_fields_and_builds_views() {
        let sheet = sample_sheet(vec![vec![
            t("yes"),
            t(" Sara@Example.com "),
            Cell::Empty,
            t("sara_k"),
            t("a i"),
            t("+98 912 345 6789"),
            t("تهران"),
            t("['فین تک', 'AI ']"),
        ]]);
        let mut index = PhotoIndex::new();
        index.insert(
            "sara@example.com".to_string(),
            "photos/sara@example.com/p.jpg".to_string(),
        );
        let schema = SheetLayout::default().resolve(&sheet.columns);
        let (records, _) =
            plan_reconciliation("u1", &sheet, &schema, &index, &HashMap::new(), "/media/");
        let r = &records[0];
        assert_eq!(r.name, "sara_k");
        assert_eq!(r.email, "Sara@Example.com");
        assert_eq!(r.tag, "AI");
        assert_eq!(r.interests, vec!["فین\u{200c}تک", "AI"]);
        assert_eq!(
            r.photo_url,
            "/media/extracted/upload_u1/photos/sara@example.com/p.jpg"
        );
        assert_eq!(
            r.summary,
            vec![
                SummaryEntry {
                    label: CITY_COLUMN.to_string(),
                    value: "تهران".to_string()
                },
                SummaryEntry {
                    label: PHONE_COLUMN.to_string(),
                    value: "09123456789".to_string()
                },
            ]
        );
        assert!(r.search_blob.contains("sara@example.com"));
        assert!(r.search_blob.contains("09123456789"));
        assert!(r.search_blob.contains(" ai "));

        let raw: Value = serde_json::from_str(&r.raw_json).expect("raw json");
        assert_eq!(raw["Tag"], "AI");
        assert_eq!(raw[PHONE_COLUMN], "09123456789");
        assert_eq!(raw["حوزه های مورد علاقه"], "فین\u{200c}تک, AI");
    }

    #[test]
    fn unparseable_phone_is_kept_verbatim() {
        let mut cells = row(Cell::Int(1), "p@x.io", "P", "");
        cells[5] = t("021-555");
        let sheet = sample_sheet(vec![cells]);
        let (records, _) = plan(&sheet, &HashMap::new());
        let raw: Value = serde_json::from_str(&records[0].raw_json).expect("raw json");
        assert_eq!(raw[PHONE_COLUMN], "021-555");
    }

    #[test]
    fn existing_rows_keep_selection_and_only_changed_rows_update() {
        let sheet = sample_sheet(vec![
            row(Cell::Int(1), "a@x.io", "Ali", "AI"),
            row(Cell::Int(1), "b@x.io", "Bita New", ""),
        ]);
        let mut existing = HashMap::new();
        existing.insert(
            "a@x.io".to_string(),
            existing_row("a@x.io", "Ali", "AI", true),
        );
        existing.insert(
            "b@x.io".to_string(),
            existing_row("b@x.io", "Bita", "PRODUCT", false),
        );

        let (records, plan) = plan(&sheet, &existing);
        assert!(plan.creates.is_empty());
        assert_eq!(
            plan.updates,
            vec![AttendeeUpdate {
                id: "id-b@x.io".into(),
                name: "Bita New".into(),
                tag: "PRODUCT".into()
            }]
        );
        assert!(records[0].selected);
        assert!(!records[1].selected);
    }

    #[test]
    fn applied_updates_refresh_name_and_tag_but_keep_selection() {
        let conn = test_conn();

        let v1 = sample_sheet(vec![
            row(Cell::Int(1), "a@x.io", "Ali", "AI"),
            row(Cell::Int(1), "b@x.io", "Bita", ""),
        ]);
        let existing = db::attendees_by_email(&conn, "u1").expect("load");
        let (_, first) = plan(&v1, &existing);
        assert_eq!(apply_plan(&conn, "u1", &first).expect("apply"), (2, 0));

        selection::set_selected(&conn, "u1", "a@x.io", true, false).expect("select");

        let v2 = sample_sheet(vec![
            row(Cell::Int(1), "a@x.io", "Ali Karimi", "software"),
            row(Cell::Int(1), "b@x.io", "Bita", ""),
        ]);
        let existing = db::attendees_by_email(&conn, "u1").expect("load");
        let (records, second) = plan(&v2, &existing);
        assert!(records[0].selected);
        assert_eq!(apply_plan(&conn, "u1", &second).expect("apply"), (0, 1));

        let a = db::attendee_get(&conn, "u1", "a@x.io")
            .expect("query")
            .expect("row");
        assert_eq!(a.name, "Ali Karimi");
        assert_eq!(a.tag, "SOFTWARE");
        assert!(a.selected);

        let existing = db::attendees_by_email(&conn, "u1").expect("load");
        let (_, third) = plan(&v2, &existing);
        assert!(third.is_empty());
        assert_eq!(apply_plan(&conn, "u1", &third).expect("apply"), (0, 0));
    }

    #[test]
    fn repeated_email_yields_one_record() {
        let sheet = sample_sheet(vec![
            row(Cell::Int(1), "Dup@X.io", "First", ""),
            row(Cell::Int(1), "dup@x.io", "Second", ""),
        ]);
        let (records, plan) = plan(&sheet, &HashMap::new());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "First");
        assert_eq!(records[0].photo_url, "");
        assert!(!records[0].selected);
        assert_eq!(plan.creates.len(), 1);
    }

    #[test]
    fn rows_without_email_are_shown_but_not_planned() {
        let sheet = sample_sheet(vec![
            row(Cell::Int(1), "", "", ""),
            row(Cell::Int(1), "", "Nameless Not", ""),
        ]);
        let (records, plan) = plan(&sheet, &HashMap::new());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, UNNAMED_PLACEHOLDER);
        assert!(plan.is_empty());
    }

    #[test]
    fn sort_is_stable_by_name() {
        let mk = |name: &str, email: &str| DisplayRecord {
            name: name.into(),
            email: email.into(),
            photo_url: String::new(),
            interests: vec![],
            summary: vec![],
            search_blob: String::new(),
            raw_json: String::new(),
            tag: "PRODUCT".into(),
            selected: false,
        };
        let mut v = vec![mk("b", "1"), mk("a", "2"), mk("B", "3"), mk("a", "4")];
        sort_records(&mut v);
        let order: Vec<&str> = v.iter().map(|r| r.email.as_str()).collect();
        assert_eq!(order, vec!["3", "2", "4", "1"]);
    }
}
