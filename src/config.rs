use std::env;

use crate::model::ConfigError;

const ENTRIES_SUFFIX: &str = "/entries.json";

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Full URL of the Nightscout entries endpoint.
    pub entries_url: String,
    /// API root, used for `status.json`.
    pub api_root: String,
    /// Path of the local readings cache.
    pub db_path: String,
}

impl AppConfig {
    pub fn from_env() -> Result<AppConfig, ConfigError> {
        let raw_url = env::var("NIGHTSCOUT_URL").map_err(|_| ConfigError::MissingUrl)?;
        let entries_url = normalize_nightscout_url(&raw_url);
        let api_root = entries_url
            .strip_suffix(ENTRIES_SUFFIX)
            .unwrap_or(&entries_url)
            .to_string();
        let db_path = env::var("CGM_DB_PATH").unwrap_or_else(|_| "cgm_data.db".to_string());
        Ok(AppConfig {
            entries_url,
            api_root,
            db_path,
        })
    }
}

/// Accepts anything from a bare site URL to the full entries endpoint and
/// returns the entries URL. Users routinely set NIGHTSCOUT_URL to just their
/// domain.
pub fn normalize_nightscout_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.ends_with("/api/v1/entries.json") {
        trimmed.to_string()
    } else if trimmed.ends_with("/api/v1/entries") {
        format!("{trimmed}.json")
    } else if trimmed.ends_with("/api/v1") {
        format!("{trimmed}/entries.json")
    } else if trimmed.ends_with("/api") {
        format!("{trimmed}/v1/entries.json")
    } else {
        format!("{trimmed}/api/v1/entries.json")
    }
}
