use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_WS_URL: &str = "wss://yooma.su/api";
pub const DEFAULT_WS_ORIGIN: &str = "https://yooma.su";
pub const DEFAULT_LOOKUP_URL: &str = "https://api.fearproject.ru/punishments/search";
pub const DEFAULT_BAN_URL: &str = "https://api.fearproject.ru/admin/punishments/ban";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Operator settings loaded from `settings.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub access_token: String,
    pub use_custom_reason: bool,
    pub custom_ban_reason: String,
    pub default_ban_reason: String,
    /// Lower-cased substrings that mark a punishment reason as cheating.
    #[serde(default = "default_reason_keywords")]
    pub reason_keywords: Vec<String>,
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_lookup_url")]
    pub lookup_url: String,
    #[serde(default = "default_ban_url")]
    pub ban_url: String,
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

fn default_reason_keywords() -> Vec<String> {
    ["читы", "читерство", "чит"].map(String::from).to_vec()
}

fn default_ws_url() -> String {
    DEFAULT_WS_URL.to_string()
}

fn default_lookup_url() -> String {
    DEFAULT_LOOKUP_URL.to_string()
}

fn default_ban_url() -> String {
    DEFAULT_BAN_URL.to_string()
}

impl Settings {
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Error::Config(format!("malformed settings: {e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&content)
    }

    /// Reason attached to follow-up bans.
    pub fn ban_reason(&self) -> &str {
        if self.use_custom_reason {
            &self.custom_ban_reason
        } else {
            &self.default_ban_reason
        }
    }

    /// Fail unless the credential needed by the lookup and action channels is set.
    pub fn require_token(&self) -> Result<&str> {
        let token = self.access_token.trim();
        if token.is_empty() {
            return Err(Error::Config("access_token is empty".into()));
        }
        Ok(token)
    }
}

/// Discovery scanner tunables.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub page_timeout: Duration,
    pub max_retries_per_page: u32,
    /// Pause before retrying a timed out page.
    pub retry_pause: Duration,
    /// Pause after giving up on a page.
    pub skip_cooldown: Duration,
    /// Pause after every page that returned entries.
    pub page_pause: Duration,
    /// Entries must be strictly older than this.
    pub age_threshold: Duration,
    pub category: u8,
    pub reason_keywords: Vec<String>,
    /// Stop once this many pages in a row came back empty. `None` scans forever.
    pub max_consecutive_empty_pages: Option<u32>,
    /// Log a progress line every this many pages.
    pub progress_log_every: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_secs(45),
            max_retries_per_page: 3,
            retry_pause: Duration::from_secs(3),
            skip_cooldown: Duration::from_secs(2),
            page_pause: Duration::from_secs(1),
            age_threshold: Duration::from_secs(3 * 24 * 60 * 60),
            category: 0,
            reason_keywords: default_reason_keywords(),
            max_consecutive_empty_pages: Some(25),
            progress_log_every: 50,
        }
    }
}

/// Action executor tunables.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub reason: String,
    pub pause: Duration,
}

impl ExecutorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            reason: settings.ban_reason().to_string(),
            pause: Duration::from_secs(1),
        }
    }
}
