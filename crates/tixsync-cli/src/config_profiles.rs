//! Persistent CLI profile configuration.
//!
//! Profiles hold connection settings only. The API token is read from the
//! environment and never written to disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tixsync_core::config::parse_list;
use tixsync_core::util::normalize_text_option;

use crate::error::CliError;

const CONFIG_FILE_NAME: &str = "cli-config.json";

const DEFAULT_PROFILE: &str = "default";

/// Environment variable that selects a profile
pub const PROFILE_ENV: &str = "TIXSYNC_PROFILE";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfilesConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, CliProfile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfile {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub organizer: Option<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tixsync")
        .join(CONFIG_FILE_NAME)
}

pub fn normalize_profile_name(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
}

fn config_error(action: &str, path: &Path, error: impl std::fmt::Display) -> CliError {
    CliError::Config(format!("{action} {}: {error}", path.display()))
}

impl CliProfilesConfig {
    pub fn load() -> Result<Self, CliError> {
        Self::load_from_path(&default_config_path())
    }

    /// Read profiles from `path`; a missing file yields an empty config.
    pub fn load_from_path(path: &Path) -> Result<Self, CliError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default())
            }
            Err(error) => return Err(config_error("Cannot read profiles from", path, error)),
        };
        let mut config: Self = serde_json::from_str(&raw)
            .map_err(|error| config_error("Invalid profiles file", path, error))?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, CliError> {
        let path = default_config_path();
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), CliError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|error| config_error("Cannot create directory", dir, error))?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let body = serde_json::to_string_pretty(&normalized)?;
        std::fs::write(path, body).map_err(|error| config_error("Cannot write profiles to", path, error))
    }

    /// Explicit name, then `TIXSYNC_PROFILE`, then the active profile.
    pub fn resolve_profile_name(&self, explicit: Option<&str>) -> String {
        normalize_profile_name(explicit)
            .or_else(|| normalize_profile_name(std::env::var(PROFILE_ENV).ok().as_deref()))
            .or_else(|| normalize_profile_name(self.active_profile.as_deref()))
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
    }

    pub fn profile(&self, name: &str) -> Option<&CliProfile> {
        self.profiles.get(name)
    }

    pub fn profile_mut_or_default(&mut self, name: &str) -> &mut CliProfile {
        self.profiles.entry(name.to_string()).or_default()
    }

    fn normalize(&mut self) {
        self.active_profile = normalize_profile_name(self.active_profile.as_deref());
        self.profiles.values_mut().for_each(CliProfile::normalize);
    }
}

impl CliProfile {
    /// Value of a `TIXSYNC_*` setting this profile provides
    pub fn lookup(&self, name: &str) -> Option<String> {
        match name {
            "TIXSYNC_API_URL" => self.api_url.clone(),
            "TIXSYNC_ORGANIZER" => self.organizer.clone(),
            "TIXSYNC_EVENTS" if !self.events.is_empty() => Some(self.events.join(",")),
            _ => None,
        }
    }

    fn normalize(&mut self) {
        self.api_url = normalize_text_option(self.api_url.clone());
        self.organizer = normalize_text_option(self.organizer.clone());
        self.events = parse_list(&self.events.join(","));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_profile_name_rejects_empty() {
        assert_eq!(normalize_profile_name(None), None);
        assert_eq!(normalize_profile_name(Some(" ")), None);
    }

    #[test]
    fn config_roundtrip_preserves_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = CliProfilesConfig {
            version: 1,
            active_profile: Some(" default ".to_string()),
            profiles: BTreeMap::new(),
        };
        config.profiles.insert(
            "default".to_string(),
            CliProfile {
                api_url: Some(" https://tix.example ".to_string()),
                organizer: Some("demo".to_string()),
                events: vec![" democon ".to_string(), "democon".to_string(), String::new()],
            },
        );

        config.save_to_path(&path).unwrap();
        let loaded = CliProfilesConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.active_profile.as_deref(), Some("default"));
        let profile = loaded.profile("default").unwrap();
        assert_eq!(profile.api_url.as_deref(), Some("https://tix.example"));
        assert_eq!(profile.events, vec!["democon".to_string()]);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = CliProfilesConfig::load_from_path(&dir.path().join("none.json")).unwrap();
        assert_eq!(loaded, CliProfilesConfig::default());
    }

    #[test]
    fn resolve_profile_name_prefers_explicit_then_active() {
        let config = CliProfilesConfig {
            version: 1,
            active_profile: Some("venue".to_string()),
            profiles: BTreeMap::new(),
        };
        assert_eq!(config.resolve_profile_name(Some("gate-2")), "gate-2");
        if std::env::var(PROFILE_ENV).is_err() {
            assert_eq!(config.resolve_profile_name(None), "venue");
        }
    }

    #[test]
    fn profile_provides_connection_settings_only() {
        let profile = CliProfile {
            api_url: Some("https://tix.example".to_string()),
            organizer: Some("demo".to_string()),
            events: vec!["democon".to_string(), "expo".to_string()],
        };
        assert_eq!(profile.lookup("TIXSYNC_EVENTS").as_deref(), Some("democon,expo"));
        assert_eq!(profile.lookup("TIXSYNC_API_TOKEN"), None);
        assert_eq!(CliProfile::default().lookup("TIXSYNC_EVENTS"), None);
    }
}
