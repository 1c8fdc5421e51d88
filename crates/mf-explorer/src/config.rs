//! Connection definitions and explorer tunables.

use serde::{Deserialize, Serialize};
use std::env;

/// A configured mainframe connection. Read-only input to the explorer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub is_allow_self_signed: bool,
    #[serde(default)]
    pub username: Option<String>,
}

impl ConnectionConfig {
    pub fn new(name: &str, url: &str, is_allow_self_signed: bool) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            is_allow_self_signed,
            username: None,
        }
    }

    /// Directory name used for this connection in the virtual file tree: the URL without its
    /// scheme and trailing slashes.
    pub fn host_dir_name(&self) -> String {
        url_to_dir_name(&self.url)
    }
}

pub(crate) fn url_to_dir_name(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    without_scheme.trim_end_matches('/').replace('/', "_")
}

/// Default number of sources above which a transfer containing directories needs an extra
/// confirmation.
pub const DEFAULT_BULK_TRANSFER_THRESHOLD: usize = 5;

/// Default number of rows requested per listing batch.
pub const DEFAULT_FETCH_BATCH_SIZE: usize = 100;

/// User-editable explorer settings. Every field is optional; missing ones fall back to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerSettings {
    #[serde(default)]
    pub bulk_transfer_threshold: Option<usize>,
    #[serde(default)]
    pub fetch_batch_size: Option<usize>,
    #[serde(default)]
    pub confirm_downloads: Option<bool>,
}

impl ExplorerSettings {
    /// Parses settings from the JSON the host persists.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Tunables for the explorer.
/// Priority: environment variables > user settings > defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorerConfig {
    /// Paste of more sources than this, with at least one directory, asks for confirmation first.
    pub bulk_transfer_threshold: usize,
    /// Rows per listing batch.
    pub fetch_batch_size: usize,
    /// Whether pasting into a local destination asks before downloading.
    pub confirm_downloads: bool,
}

impl ExplorerConfig {
    /// Load configuration from environment variables only (fallback).
    pub fn from_env() -> Self {
        Self::from_settings_and_env(None)
    }

    /// Load configuration with priority: env vars > user settings > defaults.
    pub fn from_settings_and_env(settings: Option<&ExplorerSettings>) -> Self {
        let bulk_transfer_threshold = env::var("MF_EXPLORER_BULK_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(settings.and_then(|s| s.bulk_transfer_threshold))
            .unwrap_or(DEFAULT_BULK_TRANSFER_THRESHOLD);

        // A zero batch size would never make progress.
        let fetch_batch_size = env::var("MF_EXPLORER_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(settings.and_then(|s| s.fetch_batch_size))
            .filter(|size: &usize| *size > 0)
            .unwrap_or(DEFAULT_FETCH_BATCH_SIZE);

        // Unrecognized values fall through rather than turning the confirmation off.
        let confirm_downloads = env::var("MF_EXPLORER_CONFIRM_DOWNLOADS")
            .ok()
            .and_then(|v| parse_flag(&v))
            .or(settings.and_then(|s| s.confirm_downloads))
            .unwrap_or(true);

        Self {
            bulk_transfer_threshold,
            fetch_batch_size,
            confirm_downloads,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        other => {
            log::warn!("Ignoring unrecognized flag value {other:?}");
            None
        }
    }
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            bulk_transfer_threshold: DEFAULT_BULK_TRANSFER_THRESHOLD,
            fetch_batch_size: DEFAULT_FETCH_BATCH_SIZE,
            confirm_downloads: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExplorerConfig::default();
        assert_eq!(config.bulk_transfer_threshold, 5);
        assert_eq!(config.fetch_batch_size, 100);
        assert!(config.confirm_downloads);
    }

    #[test]
    fn test_settings_override_defaults() {
        // These env vars are not set in the test environment
        let settings = ExplorerSettings::from_json(r#"{"bulkTransferThreshold": 10, "confirmDownloads": false}"#).unwrap();
        let config = ExplorerConfig::from_settings_and_env(Some(&settings));
        assert_eq!(config.bulk_transfer_threshold, 10);
        assert_eq!(config.fetch_batch_size, 100);
        assert!(!config.confirm_downloads);
    }

    #[test]
    fn test_parse_flag_is_strict() {
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag(" On "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("FALSE"), Some(false));
        assert_eq!(parse_flag("ture"), None);
        assert_eq!(parse_flag(""), None);
    }

    #[test]
    fn test_zero_batch_size_falls_back() {
        let settings = ExplorerSettings {
            fetch_batch_size: Some(0),
            ..Default::default()
        };
        assert_eq!(ExplorerConfig::from_settings_and_env(Some(&settings)).fetch_batch_size, 100);
    }

    #[test]
    fn test_host_dir_name_strips_scheme() {
        let conn = ConnectionConfig::new("a", "https://test1:10443/", false);
        assert_eq!(conn.host_dir_name(), "test1:10443");
        assert_eq!(url_to_dir_name("zosmf.example.com/api"), "zosmf.example.com_api");
    }

    #[test]
    fn test_connection_config_deserializes_with_defaults() {
        let conn: ConnectionConfig = serde_json::from_str(r#"{"name": "dev", "url": "https://dev:443"}"#).unwrap();
        assert!(!conn.is_allow_self_signed);
        assert_eq!(conn.username, None);
    }
}
