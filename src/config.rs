use std::time::Duration;

const DEFAULT_MEDIA_URL: &str = "/media/";
// Asia/Tehran has observed a fixed +03:30 offset since 2022.
const DEFAULT_DISPLAY_OFFSET_MINUTES: i32 = 210;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct RosterConfig {
    /// Public base path that photo URLs are built from. Always ends with `/`.
    pub media_url: String,
    pub display_offset_minutes: i32,
    pub busy_timeout: Duration,
}

impl Default for RosterConfig {
    fn default() -> Self {
        RosterConfig {
            media_url: DEFAULT_MEDIA_URL.to_string(),
            display_offset_minutes: DEFAULT_DISPLAY_OFFSET_MINUTES,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

impl RosterConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = RosterConfig::default();
        if let Some(url) = get("ROSTER_MEDIA_URL") {
            cfg.set_media_url(&url);
        }
        if let Some(v) = get("ROSTER_DISPLAY_UTC_OFFSET_MINUTES") {
            match v.trim().parse::<i32>() {
                Ok(n) if n.abs() < 24 * 60 => cfg.display_offset_minutes = n,
                _ => {
                    tracing::warn!(value = %v, "ignoring invalid ROSTER_DISPLAY_UTC_OFFSET_MINUTES")
                }
            }
        }
        if let Some(v) = get("ROSTER_DB_BUSY_TIMEOUT_MS") {
            match v.trim().parse::<u64>() {
                Ok(ms) => cfg.busy_timeout = Duration::from_millis(ms),
                Err(_) => tracing::warn!(value = %v, "ignoring invalid ROSTER_DB_BUSY_TIMEOUT_MS"),
            }
        }
        cfg
    }

    pub fn set_media_url(&mut self, url: &str) {
        let url = url.trim();
        if url.is_empty() {
            return;
        }
        self.media_url = if url.ends_with('/') {
            url.to_string()
        } else {
            format!("{url}/")
        };
    }
}
