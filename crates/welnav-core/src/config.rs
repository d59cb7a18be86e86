//! Runtime configuration, loaded from `welnav.toml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::WelnavError;

/// Default config file name.
pub const CONFIG_FILE: &str = "welnav.toml";

/// welnav configuration. Every field has a default, so an empty file (or no
/// file at all) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WelnavConfig {
    /// Directory holding the case store and the notification outbox.
    pub data_dir: PathBuf,
    /// Knowledge-base JSON file (array of service records).
    pub knowledge_base: PathBuf,
    /// Maximum number of referral-chain entries rendered into a notification.
    pub max_chain_len: usize,
    /// Attempts per notification dispatch (rate-limited failures only).
    pub dispatch_attempts: u32,
    /// Delay before the first retry; doubled for every further attempt.
    pub dispatch_backoff_ms: u64,
    /// Trailing window for the duplicate-application advisory.
    pub duplicate_window_minutes: i64,
    pub admin_recipient: String,
    pub referral_recipient: String,
    /// Department id → coordinator address.
    pub department_recipients: BTreeMap<String, String>,
}

impl Default for WelnavConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".welnav"),
            knowledge_base: PathBuf::from("knowledge_base.json"),
            max_chain_len: 10,
            dispatch_attempts: 2,
            dispatch_backoff_ms: 500,
            duplicate_window_minutes: 60,
            admin_recipient: "admin@welnav.local".to_string(),
            referral_recipient: "referral@welnav.local".to_string(),
            department_recipients: BTreeMap::new(),
        }
    }
}

impl WelnavConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`WelnavError::Config`] if the file exists but is not valid TOML
    /// for this shape, or [`WelnavError::Io`] if it cannot be read.
    pub fn load(path: &Path) -> Result<Self, WelnavError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| WelnavError::Config(format!("{}: {e}", path.display())))
    }

    /// Render as TOML (used by `welnav init`).
    ///
    /// # Errors
    ///
    /// Returns [`WelnavError::Serialization`] if rendering fails.
    pub fn to_toml(&self) -> Result<String, WelnavError> {
        toml::to_string_pretty(self).map_err(|e| WelnavError::Serialization(e.to_string()))
    }

    /// Resolve `data_dir` and `knowledge_base` against the config file's directory.
    #[must_use]
    pub fn resolved_against(mut self, base: &Path) -> Self {
        if self.data_dir.is_relative() {
            self.data_dir = base.join(&self.data_dir);
        }
        if self.knowledge_base.is_relative() {
            self.knowledge_base = base.join(&self.knowledge_base);
        }
        self
    }

    /// Address of the coordinator for a department, or the admin address.
    #[must_use]
    pub fn department_recipient(&self, dept_id: &str) -> &str {
        self.department_recipients
            .get(dept_id)
            .map_or(self.admin_recipient.as_str(), String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = WelnavConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(cfg, WelnavConfig::default());
        assert_eq!(cfg.dispatch_attempts, 2);
    }

    #[test]
    fn partial_file_overrides_only_given_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            "max_chain_len = 3\n\n[department_recipients]\ncare = \"care@example.org\"\n",
        )
        .unwrap();

        let cfg = WelnavConfig::load(&path).unwrap();
        assert_eq!(cfg.max_chain_len, 3);
        assert_eq!(cfg.duplicate_window_minutes, 60);
        assert_eq!(cfg.department_recipient("care"), "care@example.org");
        assert_eq!(cfg.department_recipient("housing"), cfg.admin_recipient);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "max_chain_len = \"ten\"").unwrap();
        assert!(matches!(
            WelnavConfig::load(&path),
            Err(WelnavError::Config(_))
        ));
    }

    #[test]
    fn default_config_roundtrips_through_toml() {
        let cfg = WelnavConfig::default();
        let back: WelnavConfig = toml::from_str(&cfg.to_toml().unwrap()).unwrap();
        assert_eq!(cfg, back);
    }
}
