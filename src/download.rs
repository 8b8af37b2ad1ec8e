// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc};

use crate::config::Config;
use crate::episode::{DownloadContext, DownloadResult, download_episode};
use crate::error::{DownloadError, PodfoxError};
use crate::http::HttpClient;
use crate::metadata::{Episode, Feed};
use crate::progress::{
    BatchKind, BatchReport, FeedResults, ProgressEvent, SharedProgressReporter,
};
use crate::store::FeedStore;

/// Options for one download batch
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Maximum number of episodes to download in this batch
    pub cap: usize,
    /// Maximum simultaneous transfers (None = `cap`)
    pub max_concurrent: Option<usize>,
    /// Episodes older than this are not worth fetching (None = no limit)
    pub max_age_days: Option<u64>,
    /// Persist after every successful download rather than once at the end
    pub persist_each_download: bool,
    pub transfer_timeout: Duration,
}

impl DownloadOptions {
    /// Options derived from the configuration, with an optional cap override
    pub fn from_config(config: &Config, cap: Option<usize>) -> Self {
        Self {
            cap: cap.unwrap_or(config.maxnum),
            max_concurrent: config.maxthreads,
            max_age_days: config.retention_days(),
            persist_each_download: config.persist_each_download,
            transfer_timeout: config.transfer_timeout(),
        }
    }

    fn worker_count(&self, selected: usize) -> usize {
        self.max_concurrent.unwrap_or(self.cap).max(1).min(selected)
    }
}

/// Pick the episodes a batch should fetch, as indices into `feed.episodes`
///
/// Walks the episodes in stored (newest first) order and takes those not yet
/// downloaded and not older than the retention threshold, up to `cap`.
pub fn select_for_download(
    feed: &Feed,
    cap: usize,
    max_age_days: Option<u64>,
    now: i64,
) -> Vec<usize> {
    feed.episodes
        .iter()
        .enumerate()
        .filter(|(_, episode)| !episode.downloaded)
        .filter(|(_, episode)| max_age_days.is_none_or(|days| !episode.is_older_than(days, now)))
        .map(|(index, _)| index)
        .take(cap)
        .collect()
}

struct DownloadTask {
    /// Position of the episode in the feed
    feed_index: usize,
    /// Position in this batch's queue
    queue_index: usize,
    episode: Episode,
}

struct TaskOutcome {
    feed_index: usize,
    title: String,
    result: Result<DownloadResult, DownloadError>,
}

/// Download outstanding episodes of one feed with bounded concurrency
///
/// A fixed pool of workers takes tasks from a queue in selection order and
/// reports each outcome over a channel. Only this function's own task touches
/// the feed: it applies every outcome in arrival order and persists. A failed
/// transfer leaves its episode unchanged and is listed in the report.
pub async fn download_feed<C: HttpClient + Clone + 'static>(
    client: &C,
    store: &FeedStore,
    feed: &Feed,
    options: &DownloadOptions,
    reporter: &SharedProgressReporter,
) -> Result<BatchReport, PodfoxError> {
    let feed_dir = store.feed_dir(&feed.shortname)?;

    let cleaned = store.remove_partial_files(&feed.shortname)?;
    if cleaned > 0 {
        reporter.report(ProgressEvent::PartialFilesCleanedUp {
            shortname: feed.shortname.clone(),
            count: cleaned,
        });
    }

    let selected = select_for_download(feed, options.cap, options.max_age_days, Utc::now().timestamp());
    let mut report = BatchReport::new(BatchKind::Download, feed.clone());

    if selected.is_empty() {
        tracing::debug!(shortname = %feed.shortname, "nothing to download");
        reporter.report(report.completed_event());
        return Ok(report);
    }

    let total_to_download = selected.len();
    let worker_count = options.worker_count(total_to_download);
    tracing::info!(
        shortname = %feed.shortname,
        episodes = total_to_download,
        workers = worker_count,
        "starting download batch"
    );

    let (task_tx, task_rx) = mpsc::channel(total_to_download);
    for (queue_index, feed_index) in selected.into_iter().enumerate() {
        let task = DownloadTask {
            feed_index,
            queue_index,
            episode: feed.episodes[feed_index].clone(),
        };
        // Capacity equals the number of tasks, so this never waits
        if task_tx.send(task).await.is_err() {
            break;
        }
    }
    drop(task_tx);
    let task_rx = Arc::new(Mutex::new(task_rx));

    let (outcome_tx, mut outcome_rx) = mpsc::channel(worker_count);
    let mut handles = Vec::with_capacity(worker_count);

    for download_id in 0..worker_count {
        let client = client.clone();
        let task_rx = task_rx.clone();
        let outcome_tx = outcome_tx.clone();
        let feed_dir = feed_dir.clone();
        let reporter = reporter.clone();
        let transfer_timeout = options.transfer_timeout;

        handles.push(tokio::spawn(async move {
            run_worker(
                client,
                download_id,
                total_to_download,
                transfer_timeout,
                feed_dir,
                task_rx,
                outcome_tx,
                reporter,
            )
            .await;
        }));
    }
    drop(outcome_tx);

    let mut unsaved_changes = false;
    while let Some(outcome) = outcome_rx.recv().await {
        match outcome.result {
            Ok(done) => {
                tracing::info!(title = %outcome.title, filename = %done.filename, "downloaded episode");
                report.feed.episodes[outcome.feed_index].mark_downloaded(done.filename);
                report.succeeded += 1;
                unsaved_changes = true;

                if options.persist_each_download {
                    match store.write(&report.feed) {
                        Ok(()) => unsaved_changes = false,
                        Err(e) => tracing::warn!(error = %e, "failed to persist progress, retrying at end of batch"),
                    }
                }
            }
            Err(e) => {
                tracing::warn!(title = %outcome.title, error = %e, "download failed");
                report.failed.push((outcome.title, e.to_string()));
            }
        }
    }

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "download worker panicked");
        }
    }

    if unsaved_changes {
        store.write(&report.feed)?;
    }

    reporter.report(report.completed_event());
    Ok(report)
}

#[allow(clippy::too_many_arguments)]
async fn run_worker<C: HttpClient>(
    client: C,
    download_id: usize,
    total_to_download: usize,
    transfer_timeout: Duration,
    feed_dir: PathBuf,
    tasks: Arc<Mutex<mpsc::Receiver<DownloadTask>>>,
    outcomes: mpsc::Sender<TaskOutcome>,
    reporter: SharedProgressReporter,
) {
    loop {
        // Hold the lock only while taking the next task
        let next = tasks.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };

        let context = DownloadContext {
            download_id,
            episode_index: task.queue_index,
            total_to_download,
            transfer_timeout,
        };

        let result = download_episode(&client, &task.episode, &feed_dir, &context, &reporter).await;

        if let Err(e) = &result {
            reporter.report(ProgressEvent::DownloadFailed {
                download_id,
                episode_title: task.episode.title.clone(),
                error: e.to_string(),
            });
        }

        let outcome = TaskOutcome {
            feed_index: task.feed_index,
            title: task.episode.title,
            result,
        };
        if outcomes.send(outcome).await.is_err() {
            break;
        }
    }
}

/// Run a download batch for every stored feed
pub async fn download_all<C: HttpClient + Clone + 'static>(
    client: &C,
    store: &FeedStore,
    options: &DownloadOptions,
    reporter: &SharedProgressReporter,
) -> Result<FeedResults<BatchReport>, PodfoxError> {
    let mut results = Vec::new();

    for feed in store.list()? {
        let result = download_feed(client, store, &feed, options, reporter).await;
        if let Err(e) = &result {
            tracing::warn!(shortname = %feed.shortname, error = %e, "download batch failed");
        }
        results.push((feed.shortname, result));
    }

    Ok(results)
}
