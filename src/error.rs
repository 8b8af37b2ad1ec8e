// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading or validating the configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in configuration file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Errors that can occur when fetching or parsing upstream feed documents
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed from {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read feed file {path}: {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse feed document: {0}")]
    ParseFailed(#[from] rss::Error),
}

/// Errors raised by the feed store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Feed '{0}' not found")]
    NotFound(String),

    #[error("Invalid shortname '{shortname}': {reason}")]
    InvalidShortname { shortname: String, reason: String },

    #[error("{} already exists", path.display())]
    Conflict { path: PathBuf },

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read directory {path}: {source}")]
    ReadDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read metadata file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write metadata file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to rename {} to {}: {source}", from.display(), to.display())]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed metadata in {path}: {source}")]
    MalformedMetadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize metadata: {0}")]
    SerializeFailed(#[from] serde_json::Error),
}

/// Errors that can occur while transferring a single episode
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Could not derive a filename for {url}")]
    NoFilename { url: String },

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {} into place: {source}", path.display())]
    FinalizeFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Transfer of {url} timed out after {secs}s")]
    TimedOut { url: String, secs: u64 },
}

/// Errors that can occur while pruning a single episode's media
#[derive(Error, Debug)]
pub enum PruneError {
    #[error("No filename known for {url}")]
    NoFilename { url: String },

    #[error("Refusing to remove '{filename}', it belongs to the feed store")]
    ReservedFilename { filename: String },

    #[error("Failed to remove {path}: {source}")]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Broad classification of fatal errors, used by callers to pick exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Fetch,
    Io,
    Format,
}

/// Top-level errors for core operations
#[derive(Error, Debug)]
pub enum PodfoxError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::ReadFailed { .. } => ErrorKind::Io,
            _ => ErrorKind::Validation,
        }
    }
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::InvalidShortname { .. } => ErrorKind::Validation,
            StoreError::Conflict { .. } => ErrorKind::Conflict,
            StoreError::MalformedMetadata { .. } => ErrorKind::Format,
            _ => ErrorKind::Io,
        }
    }
}

impl PodfoxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PodfoxError::Config(e) => e.kind(),
            PodfoxError::Feed(_) => ErrorKind::Fetch,
            PodfoxError::Store(e) => e.kind(),
        }
    }
}
