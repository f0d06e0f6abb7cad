use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const SETTINGS_FILE_NAME: &str = "settings.json";

/// Environment override for the server URL (also honored from a `.env` file
/// in development).
const SERVER_URL_ENV: &str = "VOICEBOOTH_SERVER_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Base URL of the upload/submit server.
    pub server_url: String,

    /// Timeout applied to every HTTP round-trip.
    pub request_timeout_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl AppSettings {
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

fn settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("voicebooth").join(SETTINGS_FILE_NAME))
}

fn load_from(path: &Path) -> AppSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Settings: failed to parse {:?}: {}", path, e);
                AppSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppSettings::default(),
        Err(e) => {
            tracing::warn!("Settings: failed to read {:?}: {}", path, e);
            AppSettings::default()
        }
    }
}

fn apply_env_overrides(mut settings: AppSettings) -> AppSettings {
    if let Ok(url) = std::env::var(SERVER_URL_ENV) {
        if !url.is_empty() {
            settings.server_url = url;
        }
    }
    settings
}

/// Load settings from the config directory. Never fails: a missing or
/// unreadable file yields the defaults.
pub fn load_settings() -> AppSettings {
    let settings = match settings_path() {
        Some(path) => load_from(&path),
        None => {
            tracing::warn!("Settings: could not determine config directory");
            AppSettings::default()
        }
    };
    apply_env_overrides(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_point_at_the_local_server() {
        let settings = AppSettings::default();
        assert_eq!(settings.server_url, "http://127.0.0.1:5000");
        assert_eq!(settings.request_timeout_secs, 60);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_from(&dir.path().join("settings.json"));
        assert_eq!(settings.server_url, AppSettings::default().server_url);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"server_url": "http://records.example:8080"}}"#).unwrap();

        let settings = load_from(&path);
        assert_eq!(settings.server_url, "http://records.example:8080");
        assert_eq!(settings.request_timeout_secs, 60);
    }

    #[test]
    fn malformed_file_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        let settings = load_from(&path);
        assert_eq!(settings.server_url, AppSettings::default().server_url);
    }

    #[test]
    fn env_override_wins_over_the_file() {
        let settings = AppSettings {
            server_url: "http://from-file".to_string(),
            ..AppSettings::default()
        };
        std::env::set_var(SERVER_URL_ENV, "http://from-env");
        let settings = apply_env_overrides(settings);
        std::env::remove_var(SERVER_URL_ENV);
        assert_eq!(settings.server_url, "http://from-env");
    }
}
