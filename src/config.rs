//! Application settings
//!
//! Settings live in `<config dir>/contact-gallery/settings.json`. A missing
//! file means defaults; a broken file is logged and replaced by defaults
//! in memory (the file itself is left alone).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::error;
use serde::{Deserialize, Serialize};

/// Directory name used under the platform config/data directories
pub const APP_DIR_NAME: &str = "contact-gallery";

/// Environment variable overriding the contact endpoint
pub const ENDPOINT_ENV: &str = "CONTACT_GALLERY_ENDPOINT";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// URL answering GET with the JSON contact array
    pub endpoint: String,
    /// Whole-request timeout for both the contact list and photo downloads
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Album folder name under `Pictures/`
    pub album: String,
    /// Root the `Pictures/<album>/` folder is created under (home dir when unset)
    pub media_root: Option<PathBuf>,
    /// SQLite media index file (data dir when unset)
    pub index_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/sample_contacts_list.json".to_string(),
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            album: crate::state::gallery::DEFAULT_ALBUM.to_string(),
            media_root: None,
            index_path: None,
        }
    }
}

impl Settings {
    /// Load settings from the default location, then apply environment
    /// overrides
    pub fn load() -> Self {
        let mut settings = match default_settings_path() {
            Some(path) => Self::load_from(&path),
            None => Settings::default(),
        };
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            if !endpoint.trim().is_empty() {
                settings.endpoint = endpoint.trim().to_string();
            }
        }
        log::trace!("{:?}", settings);
        settings
    }

    /// Load settings from `path`, falling back to defaults on any problem
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    error!("failed to read {}: {:?}", path.display(), err);
                }
                Settings::default()
            }
            Ok(str) => match serde_json::from_str::<Settings>(&str) {
                Err(err) => {
                    error!("settings file {} is broken, using defaults: {:?}", path.display(), err);
                    Settings::default()
                }
                Ok(settings) => settings,
            },
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn media_root(&self) -> PathBuf {
        self.media_root
            .clone()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn index_path(&self) -> PathBuf {
        self.index_path.clone().unwrap_or_else(|| {
            let mut path = dirs::data_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."));
            path.push(APP_DIR_NAME);
            path.push("media_index.db");
            path
        })
    }
}

fn default_settings_path() -> Option<PathBuf> {
    let mut path = dirs::config_dir()?;
    path.push(APP_DIR_NAME);
    path.push("settings.json");
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("settings.json"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.album, "MyAppImages");
        assert_eq!(settings.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{ "endpoint": "http://example.test/contacts.json", "requestTimeoutSecs": 5 }"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.endpoint, "http://example.test/contacts.json");
        assert_eq!(settings.request_timeout_secs, 5);
        assert_eq!(settings.connect_timeout_secs, 10);
        assert_eq!(settings.album, "MyAppImages");
    }

    #[test]
    fn test_broken_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn test_explicit_paths_win() {
        let settings = Settings {
            media_root: Some(PathBuf::from("/srv/media")),
            index_path: Some(PathBuf::from("/srv/index.db")),
            ..Settings::default()
        };
        assert_eq!(settings.media_root(), PathBuf::from("/srv/media"));
        assert_eq!(settings.index_path(), PathBuf::from("/srv/index.db"));
    }
}
