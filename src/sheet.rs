use crate::error::RosterError;
use crate::normalize::Cell;
use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDateTime;
use std::collections::{HashMap, HashSet};
use std::path::Path;

pub struct Sheet {
    pub columns: Vec<String>,
    /// Each row has exactly `columns.len()` cells.
    pub rows: Vec<Vec<Cell>>,
}

pub fn read_sheet(path: &Path) -> Result<Sheet, RosterError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let (header, body) = if ext == "csv" {
        read_csv_grid(path)?
    } else {
        read_workbook_grid(path)?
    };
    build_sheet(header, body)
}

fn read_csv_grid(path: &Path) -> Result<(Vec<Cell>, Vec<Vec<Cell>>), RosterError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| RosterError::SpreadsheetUnreadable(e.to_string()))?;

    let mut grid: Vec<Vec<Cell>> = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| RosterError::SpreadsheetUnreadable(e.to_string()))?;
        grid.push(
            record
                .iter()
                .map(|s| {
                    if s.is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(s.to_string())
                    }
                })
                .collect(),
        );
    }
    split_header(grid)
}

fn read_workbook_grid(path: &Path) -> Result<(Vec<Cell>, Vec<Vec<Cell>>), RosterError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| RosterError::SpreadsheetUnreadable(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(RosterError::EmptySpreadsheet)?
        .map_err(|e| RosterError::SpreadsheetUnreadable(e.to_string()))?;

    let grid: Vec<Vec<Cell>> = range
        .rows()
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect();
    split_header(grid)
}

fn split_header(mut grid: Vec<Vec<Cell>>) -> Result<(Vec<Cell>, Vec<Vec<Cell>>), RosterError> {
    // Leading blank lines are not a header.
    while grid
        .first()
        .is_some_and(|row| row.iter().all(|c| *c == Cell::Empty))
    {
        grid.remove(0);
    }
    if grid.is_empty() {
        return Err(RosterError::EmptySpreadsheet);
    }
    let header = grid.remove(0);
    Ok((header, grid))
}

fn cell_from_data(d: &Data) -> Cell {
    match d {
        Data::Empty => Cell::Empty,
        Data::String(s) => {
            if s.is_empty() {
                Cell::Empty
            } else {
                Cell::Text(s.clone())
            }
        }
        Data::Int(n) => Cell::Int(*n),
        Data::Float(f) => Cell::Float(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(v) => Cell::DateTime(v),
            None => Cell::Float(dt.as_f64()),
        },
        Data::DateTimeIso(s) => parse_iso_datetime(s)
            .map(Cell::DateTime)
            .unwrap_or_else(|| Cell::Text(s.clone())),
        Data::DurationIso(s) => Cell::Text(s.clone()),
        // Formula errors such as #N/A read as missing.
        Data::Error(_) => Cell::Empty,
    }
}

fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn header_text(c: &Cell) -> String {
    match c {
        Cell::Empty => String::new(),
        Cell::Text(s) => s.trim_start_matches('\u{feff}').trim().to_string(),
        Cell::Int(n) => n.to_string(),
        Cell::Float(f) => f.to_string(),
        Cell::Bool(b) => b.to_string(),
        Cell::DateTime(d) => d.to_string(),
    }
}

/// Names blank headers `Unnamed: N` and suffixes duplicates with `.1`, `.2`…
/// so every column has a distinct key.
fn build_sheet(header: Vec<Cell>, body: Vec<Vec<Cell>>) -> Result<Sheet, RosterError> {
    let width = body
        .iter()
        .map(|r| r.len())
        .max()
        .unwrap_or(0)
        .max(header.len());

    let mut taken: HashSet<String> = HashSet::new();
    let mut next_suffix: HashMap<String, usize> = HashMap::new();
    let mut columns = Vec::with_capacity(width);
    for i in 0..width {
        let mut name = header.get(i).map(header_text).unwrap_or_default();
        if name.is_empty() {
            name = format!("Unnamed: {i}");
        }
        if taken.contains(&name) {
            // A suffixed name may already be a literal header, e.g. `A,A.1,A`.
            let n = next_suffix.entry(name.clone()).or_insert(1);
            loop {
                let candidate = format!("{name}.{n}");
                *n += 1;
                if !taken.contains(&candidate) {
                    name = candidate;
                    break;
                }
            }
        }
        taken.insert(name.clone());
        columns.push(name);
    }

    let rows = body
        .into_iter()
        .filter(|r| r.iter().any(|c| *c != Cell::Empty))
        .map(|mut r| {
            r.resize(width, Cell::Empty);
            r
        })
        .collect();

    Ok(Sheet { columns, rows })
}

/// Decides whether a header names a given logical column.
pub trait HeaderMatcher {
    fn matches(&self, header: &str) -> bool;
}

/// Matches headers containing any of the given markers.
#[derive(Debug, Clone)]
pub struct ContainsAny(pub Vec<String>);

impl HeaderMatcher for ContainsAny {
    fn matches(&self, header: &str) -> bool {
        self.0.iter().any(|m| header.contains(m.as_str()))
    }
}

pub const CITY_COLUMN: &str = "📍 شهر محل سکونت";
pub const PHONE_COLUMN: &str = "شماره همراه";
pub const EDUCATION_COLUMN: &str = "آخرین مقطع و رشته تحصیلی شما چیست؟";
pub const POSITION_COLUMN: &str = "در حال حاضر در چه موقعیت شغلی فعالیت می\u{200c}کنید؟";

/// The registration form's column conventions.
pub struct SheetLayout {
    pub email_column: String,
    pub name_column: String,
    pub fallback_name_column: String,
    pub status_column: String,
    pub tag_column: String,
    pub phone_column: String,
    pub summary_columns: Vec<String>,
    pub search_columns: Vec<String>,
    pub interests: Box<dyn HeaderMatcher>,
}

impl Default for SheetLayout {
    fn default() -> Self {
        SheetLayout {
            email_column: "User Email".to_string(),
            name_column: "نام و نام\u{200c}خانوادگی".to_string(),
            fallback_name_column: "User Name".to_string(),
            status_column: "Status".to_string(),
            tag_column: "Tag".to_string(),
            phone_column: PHONE_COLUMN.to_string(),
            summary_columns: vec![
                CITY_COLUMN.to_string(),
                PHONE_COLUMN.to_string(),
                EDUCATION_COLUMN.to_string(),
                POSITION_COLUMN.to_string(),
            ],
            search_columns: vec![
                CITY_COLUMN.to_string(),
                EDUCATION_COLUMN.to_string(),
                POSITION_COLUMN.to_string(),
            ],
            interests: Box::new(ContainsAny(vec![
                "NovaTech".to_string(),
                "علاقه".to_string(),
            ])),
        }
    }
}

/// Column identities resolved once per sheet.
#[derive(Debug, Clone)]
pub struct SheetSchema {
    pub email: String,
    pub name: String,
    pub fallback_name: String,
    pub status: String,
    pub tag: String,
    pub phone: String,
    pub interests: Option<String>,
    pub summary: Vec<String>,
    pub search: Vec<String>,
}

impl SheetLayout {
    pub fn resolve(&self, columns: &[String]) -> SheetSchema {
        let interests = columns
            .iter()
            .find(|c| self.interests.matches(c))
            .cloned();
        if interests.is_none() {
            tracing::debug!("no interests column found in spreadsheet header");
        }
        SheetSchema {
            email: self.email_column.clone(),
            name: self.name_column.clone(),
            fallback_name: self.fallback_name_column.clone(),
            status: self.status_column.clone(),
            tag: self.tag_column.clone(),
            phone: self.phone_column.clone(),
            interests,
            summary: self.summary_columns.clone(),
            search: self.search_columns.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interests_column_resolved_by_marker() {
        let layout = SheetLayout::default();
        let cols = vec![
            "User Email".to_string(),
            "به چه حوزه\u{200c}هایی علاقه دارید؟".to_string(),
            "NovaTech topics".to_string(),
        ];
        let schema = layout.resolve(&cols);
        assert_eq!(schema.interests.as_deref(), Some(cols[1].as_str()));

        let schema = layout.resolve(&["Status".to_string()]);
        assert!(schema.interests.is_none());
    }

    #[test]
    fn header_names_are_unique_and_rows_padded() {
        let header = vec![
            Cell::Text("A".into()),
            Cell::Empty,
            Cell::Text("A".into()),
        ];
        let body = vec![
            vec![Cell::Int(1)],
            vec![Cell::Empty, Cell::Empty],
            vec![Cell::Int(2), Cell::Empty, Cell::Empty, Cell::Text("x".into())],
        ];
        let sheet = build_sheet(header, body).expect("sheet");
        assert_eq!(sheet.columns, vec!["A", "Unnamed: 1", "A.1", "Unnamed: 3"]);
        assert_eq!(sheet.rows.len(), 2);
        assert!(sheet.rows.iter().all(|r| r.len() == 4));

        let header = vec![
            Cell::Text("A".into()),
            Cell::Text("A.1".into()),
            Cell::Text("A".into()),
            Cell::Text("A".into()),
        ];
        let body = vec![vec![Cell::Int(1), Cell::Int(2), Cell::Int(3), Cell::Int(4)]];
        let sheet = build_sheet(header, body).expect("sheet");
        assert_eq!(sheet.columns, vec!["A", "A.1", "A.2", "A.3"]);
    }

    #[test]
    fn blank_grid_is_empty_spreadsheet() {
        let res = split_header(vec![vec![Cell::Empty, Cell::Empty]]);
        assert!(matches!(res, Err(RosterError::EmptySpreadsheet)));
    }
}
