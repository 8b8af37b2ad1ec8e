// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::StoreError;
use crate::metadata::Feed;

/// Name of the metadata file inside every feed directory
pub const FEED_METADATA_FILENAME: &str = "feed.json";

const FEED_METADATA_TMP_FILENAME: &str = ".feed.json.tmp";

/// Suffix of in-flight downloads; never a valid final filename
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Directory-per-feed storage rooted at the configured podcast directory
///
/// No locking is done: two processes writing the same feed race, and the
/// last write wins.
#[derive(Debug, Clone)]
pub struct FeedStore {
    root: PathBuf,
}

impl FeedStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.podcast_directory.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a feed's metadata and media
    pub fn feed_dir(&self, shortname: &str) -> Result<PathBuf, StoreError> {
        validate_shortname(shortname)?;
        Ok(self.root.join(shortname))
    }

    fn metadata_path(&self, shortname: &str) -> Result<PathBuf, StoreError> {
        Ok(self.feed_dir(shortname)?.join(FEED_METADATA_FILENAME))
    }

    /// Create the directory for a new feed and write its first snapshot
    ///
    /// Fails with `Conflict` if the directory already exists. If the snapshot
    /// cannot be written the fresh directory is removed again.
    pub fn create(&self, feed: &Feed) -> Result<(), StoreError> {
        let dir = self.feed_dir(&feed.shortname)?;

        fs::create_dir_all(&self.root).map_err(|e| StoreError::CreateDirectoryFailed {
            path: self.root.clone(),
            source: e,
        })?;

        fs::create_dir(&dir).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => StoreError::Conflict { path: dir.clone() },
            _ => StoreError::CreateDirectoryFailed {
                path: dir.clone(),
                source: e,
            },
        })?;

        if let Err(e) = self.write(feed) {
            let _ = fs::remove_dir_all(&dir);
            return Err(e);
        }

        tracing::info!(shortname = %feed.shortname, path = %dir.display(), "created feed");
        Ok(())
    }

    /// Load a feed's metadata
    pub fn read(&self, shortname: &str) -> Result<Feed, StoreError> {
        let path = self.metadata_path(shortname)?;

        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound(shortname.to_string()),
            _ => StoreError::ReadFailed {
                path: path.clone(),
                source: e,
            },
        })?;

        serde_json::from_str(&content)
            .map_err(|e| StoreError::MalformedMetadata { path, source: e })
    }

    /// Persist a full feed snapshot, replacing the previous one atomically
    pub fn write(&self, feed: &Feed) -> Result<(), StoreError> {
        let dir = self.feed_dir(&feed.shortname)?;
        if !dir.is_dir() {
            return Err(StoreError::NotFound(feed.shortname.clone()));
        }

        let json = serde_json::to_string_pretty(feed)?;
        let tmp_path = dir.join(FEED_METADATA_TMP_FILENAME);
        let path = dir.join(FEED_METADATA_FILENAME);

        let write_tmp = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()
        };
        write_tmp().map_err(|e| StoreError::WriteFailed {
            path: tmp_path.clone(),
            source: e,
        })?;

        fs::rename(&tmp_path, &path).map_err(|e| StoreError::WriteFailed {
            path: path.clone(),
            source: e,
        })?;

        tracing::debug!(shortname = %feed.shortname, episodes = feed.episodes.len(), "wrote feed metadata");
        Ok(())
    }

    /// All feeds with a readable metadata file, sorted by title
    ///
    /// Directories without a metadata file are skipped silently; directories
    /// whose metadata cannot be parsed are skipped with a warning.
    pub fn list(&self) -> Result<Vec<Feed>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.root).map_err(|e| StoreError::ReadDirectoryFailed {
            path: self.root.clone(),
            source: e,
        })?;

        let mut feeds = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::ReadDirectoryFailed {
                path: self.root.clone(),
                source: e,
            })?;

            let path = entry.path();
            if !path.is_dir() || !path.join(FEED_METADATA_FILENAME).is_file() {
                continue;
            }
            let Some(shortname) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            match self.read(shortname) {
                Ok(feed) => feeds.push(feed),
                Err(e) => tracing::warn!(shortname, error = %e, "skipping unreadable feed"),
            }
        }

        feeds.sort_by_key(|feed| feed.title.clone());
        Ok(feeds)
    }

    /// Move a feed to a new shortname, updating its metadata
    pub fn rename(&self, old: &str, new: &str) -> Result<Feed, StoreError> {
        let old_dir = self.feed_dir(old)?;
        let new_dir = self.feed_dir(new)?;

        if !old_dir.is_dir() {
            return Err(StoreError::NotFound(old.to_string()));
        }
        if new_dir.exists() {
            return Err(StoreError::Conflict { path: new_dir });
        }

        let feed = self.read(old)?;

        fs::rename(&old_dir, &new_dir).map_err(|e| StoreError::RenameFailed {
            from: old_dir.clone(),
            to: new_dir.clone(),
            source: e,
        })?;

        let renamed = Feed {
            shortname: new.to_string(),
            ..feed
        };
        if let Err(e) = self.write(&renamed) {
            let _ = fs::rename(&new_dir, &old_dir);
            return Err(e);
        }

        tracing::info!(old, new, "renamed feed");
        Ok(renamed)
    }

    /// Clear the download state of every episode in a feed
    ///
    /// Media files on disk are left alone.
    pub fn reset(&self, shortname: &str) -> Result<Feed, StoreError> {
        let reset = self.read(shortname)?.reset();
        self.write(&reset)?;
        tracing::info!(shortname, "reset download state");
        Ok(reset)
    }

    /// Remove temp files left behind by interrupted downloads
    pub fn remove_partial_files(&self, shortname: &str) -> Result<usize, StoreError> {
        let dir = self.feed_dir(shortname)?;
        let entries = fs::read_dir(&dir).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound(shortname.to_string()),
            _ => StoreError::ReadDirectoryFailed {
                path: dir.clone(),
                source: e,
            },
        })?;

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_partial = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(PARTIAL_SUFFIX));

            if is_partial && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!(shortname, removed, "cleaned up partial downloads");
        }
        Ok(removed)
    }
}

/// Whether `name` collides with a file the store manages itself
///
/// Media stored under such a name would overwrite the feed metadata or be
/// swept up as an unfinished download.
pub fn is_reserved_filename(name: &str) -> bool {
    name.eq_ignore_ascii_case(FEED_METADATA_FILENAME)
        || name == FEED_METADATA_TMP_FILENAME
        || name.ends_with(PARTIAL_SUFFIX)
}

/// A shortname doubles as a directory name, so it must be a single plain path component
pub fn validate_shortname(shortname: &str) -> Result<(), StoreError> {
    let reason = if shortname.is_empty() {
        Some("must not be empty")
    } else if shortname == "." || shortname == ".." {
        Some("must not be a relative directory reference")
    } else if shortname.contains(['/', '\\']) {
        Some("must not contain path separators")
    } else if shortname.starts_with('.') {
        Some("must not start with a dot")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StoreError::InvalidShortname {
            shortname: shortname.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
