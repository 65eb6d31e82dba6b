use crate::archive;
use crate::db::{self, Upload};
use crate::error::RosterError;
use crate::roster::MediaLayout;
use anyhow::Context;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use zip::ZipArchive;

const SPREADSHEET_EXTS: [&str; 6] = ["csv", "xlsx", "xlsm", "xlsb", "xls", "ods"];
const SPREADSHEET_DIR: &str = "uploads/excel";
const PHOTOS_ZIP_DIR: &str = "uploads/photos_zip";

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload".to_string())
}

/// Keeps the stored name to a plain single path segment.
fn storage_name(upload_id: &str, original: &str) -> String {
    let cleaned: String = original
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    format!("{upload_id}_{cleaned}")
}

/// Copies `src` to `dst`, returning the hex SHA-256 of the bytes written.
fn copy_with_digest(src: &Path, dst: &Path) -> anyhow::Result<String> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let mut input =
        File::open(src).with_context(|| format!("failed to open {}", src.to_string_lossy()))?;
    let mut output =
        File::create(dst).with_context(|| format!("failed to create {}", dst.to_string_lossy()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = input
            .read(&mut buf)
            .with_context(|| format!("failed to read {}", src.to_string_lossy()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        output
            .write_all(&buf[..n])
            .with_context(|| format!("failed to write {}", dst.to_string_lossy()))?;
    }
    output.flush().context("failed to flush stored upload")?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn validate_inputs(spreadsheet: &Path, photos_zip: &Path) -> Result<(), RosterError> {
    if !spreadsheet.is_file() {
        return Err(RosterError::InputInvalid(format!(
            "spreadsheet not found: {}",
            spreadsheet.to_string_lossy()
        )));
    }
    if !photos_zip.is_file() {
        return Err(RosterError::InputInvalid(format!(
            "photo archive not found: {}",
            photos_zip.to_string_lossy()
        )));
    }

    let ext = spreadsheet
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !SPREADSHEET_EXTS.contains(&ext.as_str()) {
        return Err(RosterError::InputInvalid(format!(
            "unsupported spreadsheet type: {}",
            file_name_of(spreadsheet)
        )));
    }

    let looks_like_zip = archive::is_zip_file(photos_zip)
        .map_err(|e| RosterError::ArchiveUnreadable(format!("{e:#}")))?;
    if !looks_like_zip {
        return Err(RosterError::ArchiveUnreadable(
            "photo archive is not a zip file".to_string(),
        ));
    }
    let f = File::open(photos_zip).map_err(|e| RosterError::ArchiveUnreadable(e.to_string()))?;
    ZipArchive::new(f).map_err(|e| RosterError::ArchiveUnreadable(e.to_string()))?;
    Ok(())
}

fn remove_quietly(paths: &[PathBuf]) {
    for p in paths {
        if p.exists() {
            if let Err(e) = std::fs::remove_file(p) {
                tracing::warn!(
                    path = %p.display(),
                    error = %e,
                    "failed to remove stored upload file"
                );
            }
        }
    }
}

/// Stores both files under the media root and records a new upload. Nothing
/// is kept when any step fails. Reconciliation waits for the first read.
pub fn create_upload(
    conn: &rusqlite::Connection,
    media: &MediaLayout,
    spreadsheet: &Path,
    photos_zip: &Path,
) -> Result<Upload, RosterError> {
    validate_inputs(spreadsheet, photos_zip)?;

    let id = Uuid::new_v4().to_string();
    let spreadsheet_name = file_name_of(spreadsheet);
    let photos_zip_name = file_name_of(photos_zip);
    let spreadsheet_rel = format!("{SPREADSHEET_DIR}/{}", storage_name(&id, &spreadsheet_name));
    let photos_zip_rel = format!("{PHOTOS_ZIP_DIR}/{}", storage_name(&id, &photos_zip_name));
    let stored = [
        media.blob_path(&spreadsheet_rel),
        media.blob_path(&photos_zip_rel),
    ];

    let digests = copy_with_digest(spreadsheet, &stored[0])
        .and_then(|a| copy_with_digest(photos_zip, &stored[1]).map(|b| (a, b)));
    let (spreadsheet_sha256, photos_zip_sha256) = match digests {
        Ok(v) => v,
        Err(e) => {
            remove_quietly(&stored);
            return Err(RosterError::Storage(e));
        }
    };

    let upload = Upload {
        id,
        spreadsheet_path: spreadsheet_rel,
        spreadsheet_name,
        spreadsheet_sha256,
        photos_zip_path: photos_zip_rel,
        photos_zip_name,
        photos_zip_sha256,
        created_at: db::now_rfc3339(),
    };
    if let Err(e) = db::upload_insert(conn, &upload) {
        remove_quietly(&stored);
        return Err(e.into());
    }

    tracing::info!(
        upload_id = %upload.id,
        spreadsheet = %upload.spreadsheet_name,
        "upload created"
    );
    Ok(upload)
}

/// Admin cleanup: drops the upload with its attendees, stored files and
/// extracted photos. Returns false when the upload does not exist.
pub fn delete_upload(
    conn: &rusqlite::Connection,
    media: &MediaLayout,
    upload_id: &str,
) -> Result<bool, RosterError> {
    let Some(upload) = db::upload_get(conn, upload_id)? else {
        return Ok(false);
    };
    db::upload_delete(conn, upload_id)?;

    remove_quietly(&[
        media.blob_path(&upload.spreadsheet_path),
        media.blob_path(&upload.photos_zip_path),
    ]);
    let extract_dir = media.extract_dir(upload_id);
    if extract_dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(&extract_dir) {
            tracing::warn!(
                path = %extract_dir.display(),
                error = %e,
                "failed to remove extracted photos"
            );
        }
    }
    tracing::info!(upload_id, "upload deleted");
    Ok(true)
}
