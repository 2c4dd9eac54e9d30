//! Configuration file
//!
//! Lives at `<config dir>/shepherd/config.toml` unless a path is given.
//! Every key is optional.

use crate::error::{Error, Result};
use crate::monitor::MAX_REVIEW_CYCLES;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default merge queue tick
pub const DEFAULT_QUEUE_INTERVAL_SECS: u64 = 30;
/// Default review monitor tick
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 60;

const APP_DIR: &str = "shepherd";
const CONFIG_FILE: &str = "config.toml";
const STATE_FILE: &str = "state.toml";

/// Runtime settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Persisted task store and queue table
    pub state_file: Option<PathBuf>,
    /// Seconds between merge queue ticks
    pub queue_interval_secs: u64,
    /// Seconds between review monitor ticks
    pub monitor_interval_secs: u64,
    /// Review round trips allowed per PR
    pub max_review_cycles: u32,
    /// Repository host settings
    pub github: GitHubConfig,
    /// Outbound notifications
    pub notify: NotifyConfig,
}

/// `[github]` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GitHubConfig {
    /// GitHub Enterprise host, e.g. `github.example.com`
    pub host: Option<String>,
}

/// `[notify]` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    /// Endpoint receiving every event as a JSON POST
    pub webhook_url: Option<Url>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_file: None,
            queue_interval_secs: DEFAULT_QUEUE_INTERVAL_SECS,
            monitor_interval_secs: DEFAULT_MONITOR_INTERVAL_SECS,
            max_review_cycles: MAX_REVIEW_CYCLES,
            github: GitHubConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `None`
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::parse(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.queue_interval_secs == 0 {
            return Err(Error::Config("queue_interval_secs must be positive".into()));
        }
        if self.monitor_interval_secs == 0 {
            return Err(Error::Config("monitor_interval_secs must be positive".into()));
        }
        if self.max_review_cycles == 0 {
            return Err(Error::Config("max_review_cycles must be positive".into()));
        }
        if let Some(url) = &self.notify.webhook_url
            && !matches!(url.scheme(), "http" | "https")
        {
            return Err(Error::Config(format!(
                "webhook_url must be http or https, got {}",
                url.scheme()
            )));
        }
        Ok(())
    }

    /// Merge queue tick
    pub const fn queue_interval(&self) -> Duration {
        Duration::from_secs(self.queue_interval_secs)
    }

    /// Review monitor tick
    pub const fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    /// State file path, falling back to the platform data directory
    pub fn state_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.state_file {
            return Ok(path.clone());
        }
        dirs::data_dir()
            .map(|d| d.join(APP_DIR).join(STATE_FILE))
            .ok_or_else(|| Error::Config("no data directory; set state_file".into()))
    }
}

/// `<config dir>/shepherd/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.queue_interval(), Duration::from_secs(30));
        assert_eq!(config.monitor_interval(), Duration::from_secs(60));
        assert_eq!(config.max_review_cycles, 3);
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"
state_file = "/var/lib/shepherd/state.toml"
queue_interval_secs = 10
monitor_interval_secs = 45
max_review_cycles = 5

[github]
host = "github.example.com"

[notify]
webhook_url = "https://hooks.example.com/shepherd"
"#,
        )
        .unwrap();

        assert_eq!(
            config.state_path().unwrap(),
            PathBuf::from("/var/lib/shepherd/state.toml")
        );
        assert_eq!(config.queue_interval_secs, 10);
        assert_eq!(config.max_review_cycles, 5);
        assert_eq!(config.github.host.as_deref(), Some("github.example.com"));
        assert_eq!(
            config.notify.webhook_url.unwrap().as_str(),
            "https://hooks.example.com/shepherd"
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            Config::parse("queue_interval_secs = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::parse("[notify]\nwebhook_url = \"ftp://example.com\""),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::parse("[notify]\nwebhook_url = \"not a url\""),
            Err(Error::Config(_))
        ));
        assert!(matches!(Config::parse("unknown = 1"), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_reports_path_on_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_review_cycles = \"three\"").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }
}
