use regex::Regex;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use walkdir::WalkDir;

pub const ALLOWED_IMAGE_EXTS: [&str; 5] = [".jpg", ".jpeg", ".png", ".webp", ".gif"];

const EMAIL_PATTERN: &str = r"[A-Za-z0-9.+\-_]+@[A-Za-z0-9.\-_]+\.[A-Za-z]{2,}";

/// Lowercase email -> path relative to the extraction root, `/`-separated.
pub type PhotoIndex = BTreeMap<String, String>;

fn safe_chars_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9@.+\-_]+$").expect("valid safe-chars regex"))
}

fn email_full_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!("^{EMAIL_PATTERN}$")).expect("valid email regex"))
}

fn email_search_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("valid email regex"))
}

pub fn is_email_segment(seg: &str) -> bool {
    let seg = seg.trim();
    !seg.is_empty() && safe_chars_re().is_match(seg) && email_full_re().is_match(seg)
}

pub fn is_allowed_image(file_name: &str) -> bool {
    let low = file_name.to_lowercase();
    ALLOWED_IMAGE_EXTS.iter().any(|ext| low.ends_with(ext))
}

fn strip_extension(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(pos) if pos > 0 => &file_name[..pos],
        _ => file_name,
    }
}

/// Finds the email a photo belongs to: first a path segment that is an email
/// (the file name is tested without its extension), then any email-looking
/// substring of the whole path.
pub fn email_for_path(rel_path: &str) -> Option<String> {
    let parts: Vec<&str> = rel_path.split('/').filter(|p| !p.is_empty()).collect();
    let last = parts.len().saturating_sub(1);
    for (i, part) in parts.iter().enumerate() {
        let seg = if i == last { strip_extension(part) } else { *part };
        if seg.contains('@') && is_email_segment(&seg.to_lowercase()) {
            return Some(seg.trim().to_lowercase());
        }
    }

    let found = email_search_re().find(rel_path)?;
    let em = found.as_str().to_lowercase();
    is_email_segment(&em).then_some(em)
}

/// Walks `extract_root` and picks one image per email: shallowest path first,
/// then the largest file, then the smallest path.
pub fn build_photo_index(extract_root: &Path) -> PhotoIndex {
    let mut candidates: BTreeMap<String, Vec<(usize, Reverse<u64>, String)>> = BTreeMap::new();

    for entry in WalkDir::new(extract_root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable path while indexing photos");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str() else {
            continue;
        };
        if !is_allowed_image(file_name) {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(extract_root) else {
            continue;
        };
        let rel_path = rel.to_string_lossy().replace('\\', "/");

        let Some(email) = email_for_path(&rel_path) else {
            continue;
        };

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let depth = rel_path.matches('/').count();
        candidates
            .entry(email)
            .or_default()
            .push((depth, Reverse(size), rel_path));
    }

    let index: PhotoIndex = candidates
        .into_iter()
        .filter_map(|(email, items)| items.into_iter().min().map(|(_, _, p)| (email, p)))
        .collect();
    tracing::debug!(root = %extract_root.display(), photos = index.len(), "photo index built");
    index
}
