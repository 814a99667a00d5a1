use std::path::{Path, PathBuf};
use std::time::Duration;

use common::ClusterConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backoff::Backoff;
use crate::engine::EngineSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub marathon_url: String,
    pub leader_url: Option<String>,
    pub framework_id: Option<String>,
    pub scheme: String,
    pub state_ttl_secs: u64,
    pub files_ttl_secs: u64,
    pub backoff_base_ms: u64,
    /// Zero disables the cap.
    pub backoff_max_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            marathon_url: "http://localhost:8080".into(),
            leader_url: None,
            framework_id: None,
            scheme: "http:".into(),
            state_ttl_secs: 60,
            files_ttl_secs: 60,
            backoff_base_ms: 100,
            backoff_max_ms: 30_000,
            request_timeout_secs: 10,
        }
    }
}

pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("taskfiles")
        .join("config.toml")
}

impl Settings {
    /// Load from `path`, or from [`default_path`] when none is given. Only
    /// the default location may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_path(), false),
        };
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        Self::from_toml_str(&text).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Known cluster configuration, when both halves are set.
    pub fn static_config(&self) -> Option<ClusterConfig> {
        match (&self.leader_url, &self.framework_id) {
            (Some(leader_url), Some(framework_id)) if !leader_url.is_empty() && !framework_id.is_empty() => {
                Some(ClusterConfig {
                    leader_url: leader_url.clone(),
                    framework_id: framework_id.clone(),
                })
            }
            _ => None,
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            state_ttl: Duration::from_secs(self.state_ttl_secs),
            files_ttl: Duration::from_secs(self.files_ttl_secs),
        }
    }

    pub fn backoff(&self) -> Backoff {
        let max = (self.backoff_max_ms > 0).then(|| Duration::from_millis(self.backoff_max_ms));
        Backoff::new(Duration::from_millis(self.backoff_base_ms), max)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let settings = Settings::from_toml_str("marathon_url = \"http://m:8080\"\nfiles_ttl_secs = 5\n").unwrap();
        assert_eq!(settings.marathon_url, "http://m:8080");
        assert_eq!(settings.files_ttl_secs, 5);
        assert_eq!(settings.state_ttl_secs, 60);
        assert_eq!(settings.scheme, "http:");
        assert!(settings.static_config().is_none());
    }

    #[test]
    fn static_config_needs_both_fields() {
        let mut settings = Settings {
            leader_url: Some("http://leader:5050".into()),
            ..Settings::default()
        };
        assert!(settings.static_config().is_none());
        settings.framework_id = Some("f1".into());
        let config = settings.static_config().unwrap();
        assert_eq!(config.framework_id, "f1");
    }

    #[test]
    fn zero_cap_means_unbounded() {
        let settings = Settings { backoff_max_ms: 0, ..Settings::default() };
        let mut backoff = settings.backoff();
        for _ in 0..50 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_millis(100 * 51 * 51));

        let mut capped = Settings::default().backoff();
        for _ in 0..50 {
            capped.next_delay();
        }
        assert_eq!(capped.next_delay(), Duration::from_secs(30));
    }

    #[test]
    fn explicit_file_is_read_and_must_exist() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "leader_url = \"http://leader:5050\"").unwrap();
        writeln!(file, "framework_id = \"f1\"").unwrap();
        let settings = Settings::load(Some(file.path())).unwrap();
        assert!(settings.static_config().is_some());

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(Settings::load(Some(&missing)), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "state_ttl_secs = \"soon\"").unwrap();
        assert!(matches!(Settings::load(Some(file.path())), Err(ConfigError::Parse { .. })));
    }
}
