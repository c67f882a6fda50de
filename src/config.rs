use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::grid::GridLayout;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the stream server (serves /video_feed and /api/predefined_cameras)
    #[serde(default = "default_server_url")]
    pub url: String,
}

fn default_server_url() -> String {
    "http://127.0.0.1:5000/".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GridConfig {
    /// Initial number of grid slots: 1, 4, 6 or 9
    #[serde(default = "default_layout")]
    pub layout: u32,
}

fn default_layout() -> u32 {
    4
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            layout: default_layout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the saved camera list
    #[serde(default = "default_storage_dir")]
    pub directory: String,
}

fn default_storage_dir() -> String {
    ".".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: default_storage_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    /// Play the alert tone on the default audio device
    #[serde(default = "default_true", deserialize_with = "deserialize_bool")]
    pub sound: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self { sound: true }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LogConfig {
    /// Directory to write alert logs to (optional, alert logging disabled if not set)
    #[serde(default)]
    pub directory: Option<String>,
}

/// Deserialize a boolean from string (for INI file compatibility)
fn deserialize_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let s = String::deserialize(deserializer)?;
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(D::Error::custom(format!(
            "invalid boolean value '{}', expected true/false/yes/no/on/off/1/0",
            s
        ))),
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from an INI file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&contents, path)
    }

    /// Like `load`, but a missing file means all defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = serde_ini::from_str(contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.server_url()?;
        config.layout()?;
        Ok(config)
    }

    /// Server base URL. A missing trailing slash is added so joins keep the full path.
    pub fn server_url(&self) -> Result<Url, ConfigError> {
        let mut raw = self.server.url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).map_err(|e| ConfigError::Invalid {
            field: "server.url",
            reason: format!("'{}': {}", self.server.url, e),
        })
    }

    pub fn layout(&self) -> Result<GridLayout, ConfigError> {
        GridLayout::try_from(self.grid.layout).map_err(|e| ConfigError::Invalid {
            field: "grid.layout",
            reason: e.to_string(),
        })
    }

    pub fn storage_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.directory)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_ini::de::Error,
    },
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
