use thiserror::Error;

/// Failures of the roster pipeline that callers need to tell apart.
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("spreadsheet unreadable: {0}")]
    SpreadsheetUnreadable(String),

    #[error("spreadsheet has no header row")]
    EmptySpreadsheet,

    #[error("photo archive unreadable: {0}")]
    ArchiveUnreadable(String),

    #[error("input invalid: {0}")]
    InputInvalid(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl RosterError {
    pub fn code(&self) -> &'static str {
        match self {
            RosterError::SpreadsheetUnreadable(_) | RosterError::EmptySpreadsheet => {
                "spreadsheet_unreadable"
            }
            RosterError::ArchiveUnreadable(_) => "archive_unreadable",
            RosterError::InputInvalid(_) => "input_invalid",
            RosterError::Storage(_) => "db_query_failed",
        }
    }
}

impl From<rusqlite::Error> for RosterError {
    fn from(e: rusqlite::Error) -> Self {
        RosterError::Storage(e.into())
    }
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("missing email")]
    MissingEmail,

    /// Ordinary callers may select but never unselect.
    #[error("only staff may unselect an attendee")]
    PermissionDenied,

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

impl SelectionError {
    pub fn code(&self) -> &'static str {
        match self {
            SelectionError::MissingEmail => "bad_params",
            SelectionError::PermissionDenied => "forbidden",
            SelectionError::Storage(_) => "db_query_failed",
        }
    }
}
