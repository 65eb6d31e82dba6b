use anyhow::Context;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use zip::ZipArchive;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractSummary {
    pub written: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    AlreadyExtracted,
    Extracted(ExtractSummary),
}

/// Extracts `zip_path` into `dest_dir` unless a previous run already left
/// files there.
///
/// Entries are written to a `.partial` sibling that is renamed into place
/// only once every entry succeeded, so a failed run leaves `dest_dir` absent
/// and the next call tries again.
pub fn extract_once(zip_path: &Path, dest_dir: &Path) -> anyhow::Result<ExtractOutcome> {
    if dir_has_entries(dest_dir)? {
        tracing::debug!(dest = %dest_dir.display(), "archive already extracted");
        return Ok(ExtractOutcome::AlreadyExtracted);
    }

    let staging = staging_dir(dest_dir);
    if staging.exists() {
        std::fs::remove_dir_all(&staging).with_context(|| {
            format!("failed to clear directory {}", staging.to_string_lossy())
        })?;
    }
    let summary = match safe_extract_zip(zip_path, &staging) {
        Ok(v) => v,
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
                tracing::warn!(
                    path = %staging.display(),
                    error = %cleanup,
                    "failed to remove partial extraction"
                );
            }
            return Err(e);
        }
    };

    if dest_dir.exists() {
        std::fs::remove_dir(dest_dir).with_context(|| {
            format!("failed to replace directory {}", dest_dir.to_string_lossy())
        })?;
    }
    std::fs::rename(&staging, dest_dir).with_context(|| {
        format!("failed to move extraction into {}", dest_dir.to_string_lossy())
    })?;
    Ok(ExtractOutcome::Extracted(summary))
}

fn staging_dir(dest_dir: &Path) -> PathBuf {
    let mut name = dest_dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    dest_dir.with_file_name(name)
}

fn dir_has_entries(dir: &Path) -> anyhow::Result<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory {}", dir.to_string_lossy()))?;
    Ok(entries.next().is_some())
}

/// Writes every regular-file entry of the archive below `dest_dir`.
///
/// Entries that would land outside `dest_dir` (absolute names, drive
/// prefixes, `..` segments that climb above the root) are skipped and
/// counted, never written.
pub fn safe_extract_zip(zip_path: &Path, dest_dir: &Path) -> anyhow::Result<ExtractSummary> {
    std::fs::create_dir_all(dest_dir)
        .with_context(|| format!("failed to create directory {}", dest_dir.to_string_lossy()))?;

    let in_file = File::open(zip_path)
        .with_context(|| format!("failed to open archive {}", zip_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut summary = ExtractSummary {
        written: 0,
        skipped: 0,
    };

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("failed to read archive entry #{i}"))?;
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().replace('\\', "/");
        let Some(target) = resolve_entry_path(dest_dir, &name) else {
            tracing::warn!(entry = %name, "skipping archive entry outside extraction root");
            summary.skipped += 1;
            continue;
        };

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create directory {}", parent.to_string_lossy())
            })?;
        }
        let mut out = File::create(&target)
            .with_context(|| format!("failed to create file {}", target.to_string_lossy()))?;
        std::io::copy(&mut entry, &mut out)
            .with_context(|| format!("failed to extract entry {name}"))?;
        summary.written += 1;
    }

    tracing::info!(
        dest = %dest_dir.display(),
        written = summary.written,
        skipped = summary.skipped,
        "archive extracted"
    );
    Ok(summary)
}

/// Joins an archive entry name onto `root` lexically. Returns `None` when the
/// result would not be a strict descendant of `root`.
pub fn resolve_entry_path(root: &Path, name: &str) -> Option<PathBuf> {
    if name.starts_with('/') || name.starts_with("../") || name.contains("/../") {
        return None;
    }
    // Drive-letter names such as `C:/x` are absolute on Windows.
    if name.len() >= 2 && name.as_bytes()[1] == b':' {
        return None;
    }

    let mut rel = PathBuf::new();
    for comp in Path::new(name).components() {
        match comp {
            Component::Normal(part) => rel.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !rel.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if rel.as_os_str().is_empty() {
        return None;
    }
    Some(root.join(rel))
}

pub fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    // Local file header, or the end-of-central-directory record of an empty zip.
    Ok(sig == [0x50, 0x4B, 0x03, 0x04] || sig == [0x50, 0x4B, 0x05, 0x06])
}
