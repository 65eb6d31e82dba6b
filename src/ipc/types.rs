use std::path::PathBuf;

use crate::config::RosterConfig;
use crate::sheet::SheetLayout;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: RosterConfig,
    pub layout: SheetLayout,
}

impl AppState {
    pub fn new(config: RosterConfig) -> Self {
        AppState {
            workspace: None,
            db: None,
            config,
            layout: SheetLayout::default(),
        }
    }
}
