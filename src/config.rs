// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Name of the configuration file in the user's home directory
pub const DEFAULT_CONFIG_FILENAME: &str = ".podfox.json";

const DEFAULT_PODCAST_DIRECTORY: &str = "~/Podcasts";
const DEFAULT_MAXNUM: usize = 5000;

const DEFAULT_MIMETYPES: &[&str] = &[
    "audio/aac",
    "audio/ogg",
    "audio/mpeg",
    "audio/x-mpeg",
    "audio/mp3",
    "audio/mp4",
    "video/mp4",
];

/// Runtime configuration, passed explicitly into every operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Root under which every feed directory lives
    pub podcast_directory: PathBuf,
    /// Default number of episodes to download per invocation
    pub maxnum: usize,
    /// Default prune threshold in days (None or 0 disables pruning)
    pub maxage_days: Option<u64>,
    /// Allow-list of enclosure MIME types
    pub mimetypes: Vec<String>,
    /// Maximum simultaneous transfers (defaults to the download cap)
    pub maxthreads: Option<usize>,
    /// Persist the feed after every successful download instead of once per batch
    pub persist_each_download: bool,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Upper bound for a single episode transfer
    pub transfer_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            podcast_directory: PathBuf::from(DEFAULT_PODCAST_DIRECTORY),
            maxnum: DEFAULT_MAXNUM,
            maxage_days: None,
            mimetypes: DEFAULT_MIMETYPES.iter().map(|m| m.to_string()).collect(),
            maxthreads: None,
            persist_each_download: true,
            connect_timeout_secs: 30,
            read_timeout_secs: 60,
            transfer_timeout_secs: 3600,
        }
    }
}

impl Config {
    /// Default configuration file path: `~/.podfox.json`
    pub fn default_path() -> PathBuf {
        expand_home(Path::new("~").join(DEFAULT_CONFIG_FILENAME).as_path())
    }

    /// Load the configuration from a JSON file
    ///
    /// A missing file yields the defaults. Keys absent from the file keep
    /// their default values. The podcast directory has a leading `~` expanded.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
            Self::from_json(&content).map_err(|e| ConfigError::ParseFailed {
                path: path.to_path_buf(),
                source: e,
            })?
        } else {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            Self::default()
        };

        let config = Self {
            podcast_directory: expand_home(&config.podcast_directory),
            ..config
        };
        config.validate()?;
        Ok(config)
    }

    fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Check the values that would otherwise fail deep inside an operation
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mimetypes.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "mimetypes",
                reason: "at least one MIME type is required".to_string(),
            });
        }
        if self.maxthreads == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "maxthreads",
                reason: "must be greater than zero".to_string(),
            });
        }
        for (key, value) in [
            ("connect-timeout-secs", self.connect_timeout_secs),
            ("read-timeout-secs", self.read_timeout_secs),
            ("transfer-timeout-secs", self.transfer_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Effective prune threshold; `None` when pruning is disabled
    pub fn retention_days(&self) -> Option<u64> {
        self.maxage_days.filter(|days| *days > 0)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }
}

/// Replace a leading `~` with the user's home directory
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
