// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use crate::error::PodfoxError;
use crate::metadata::Feed;

/// Which kind of batch a summary belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Download,
    Prune,
}

/// Outcome of an operation on one feed, keyed by shortname
pub type FeedOutcome<T> = (String, Result<T, PodfoxError>);

/// One outcome per feed for operations run across every stored feed
pub type FeedResults<T> = Vec<FeedOutcome<T>>;

/// Summary of a download or prune batch over one feed
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub kind: BatchKind,
    /// Feed state after the batch, as persisted
    pub feed: Feed,
    /// Number of episodes processed successfully
    pub succeeded: usize,
    /// Episodes that failed (title, error message); their state is unchanged
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    pub(crate) fn new(kind: BatchKind, feed: Feed) -> Self {
        Self {
            kind,
            feed,
            succeeded: 0,
            failed: Vec::new(),
        }
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub(crate) fn completed_event(&self) -> ProgressEvent {
        ProgressEvent::BatchCompleted {
            shortname: self.feed.shortname.clone(),
            kind: self.kind,
            succeeded: self.succeeded,
            failed: self.failed.len(),
        }
    }
}

/// Events emitted by core operations for progress reporting
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Upstream feed is being fetched
    FetchingFeed { shortname: String, url: String },

    /// Upstream episodes have been merged into a feed
    FeedSynchronized {
        shortname: String,
        title: String,
        new_episodes: usize,
        total_episodes: usize,
    },

    /// Leftover temp files from interrupted downloads were removed
    PartialFilesCleanedUp { shortname: String, count: usize },

    /// A download is starting
    DownloadStarting {
        /// Identifies the worker slot (0 to max_concurrent-1)
        download_id: usize,
        episode_title: String,
        /// Index of this episode in the download queue
        episode_index: usize,
        /// Total number of episodes selected for this batch
        total_to_download: usize,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// Download progress update
    DownloadProgress {
        download_id: usize,
        episode_title: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// A download completed and was moved into place
    DownloadCompleted {
        download_id: usize,
        episode_title: String,
        filename: String,
        bytes_downloaded: u64,
    },

    /// A download failed; the episode is left unchanged
    DownloadFailed {
        download_id: usize,
        episode_title: String,
        error: String,
    },

    /// A stale episode's media was deleted
    EpisodePruned {
        episode_title: String,
        filename: String,
    },

    /// A stale episode's media could not be deleted
    PruneFailed {
        episode_title: String,
        error: String,
    },

    /// A download or prune batch finished
    BatchCompleted {
        shortname: String,
        kind: BatchKind,
        succeeded: usize,
        failed: usize,
    },
}

/// Trait for reporting progress events from core operations.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
