// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fs;
use std::path::Path;

use chrono::Utc;

use crate::episode::resolve_filename;
use crate::error::{PodfoxError, PruneError};
use crate::metadata::{Episode, Feed};
use crate::progress::{
    BatchKind, BatchReport, FeedResults, ProgressEvent, SharedProgressReporter,
};
use crate::store::{FeedStore, is_reserved_filename};

/// Indices of downloaded episodes older than `max_age_days`
pub fn select_for_pruning(feed: &Feed, max_age_days: u64, now: i64) -> Vec<usize> {
    feed.episodes
        .iter()
        .enumerate()
        .filter(|(_, episode)| episode.downloaded && episode.is_older_than(max_age_days, now))
        .map(|(index, _)| index)
        .collect()
}

/// Delete the media of stale downloaded episodes and clear their state
///
/// `None` or `Some(0)` disables pruning: nothing is deleted or written.
/// An episode whose file cannot be removed keeps its flags and is listed as
/// a failure. The feed is persisted once, after the whole batch.
pub fn prune_feed(
    store: &FeedStore,
    feed: &Feed,
    max_age_days: Option<u64>,
    reporter: &SharedProgressReporter,
) -> Result<BatchReport, PodfoxError> {
    prune_feed_at(store, feed, max_age_days, Utc::now().timestamp(), reporter)
}

pub(crate) fn prune_feed_at(
    store: &FeedStore,
    feed: &Feed,
    max_age_days: Option<u64>,
    now: i64,
    reporter: &SharedProgressReporter,
) -> Result<BatchReport, PodfoxError> {
    let mut report = BatchReport::new(BatchKind::Prune, feed.clone());

    let Some(max_age_days) = max_age_days.filter(|days| *days > 0) else {
        tracing::debug!(shortname = %feed.shortname, "pruning disabled");
        return Ok(report);
    };

    let feed_dir = store.feed_dir(&feed.shortname)?;

    for index in select_for_pruning(feed, max_age_days, now) {
        let episode = &mut report.feed.episodes[index];

        match remove_media(episode, &feed_dir) {
            Ok(filename) => {
                tracing::info!(title = %episode.title, %filename, "pruned episode");
                reporter.report(ProgressEvent::EpisodePruned {
                    episode_title: episode.title.clone(),
                    filename,
                });
                episode.clear_download();
                report.succeeded += 1;
            }
            Err(e) => {
                tracing::warn!(title = %episode.title, error = %e, "failed to prune episode");
                reporter.report(ProgressEvent::PruneFailed {
                    episode_title: episode.title.clone(),
                    error: e.to_string(),
                });
                report.failed.push((episode.title.clone(), e.to_string()));
            }
        }
    }

    if report.succeeded > 0 {
        store.write(&report.feed)?;
    }

    reporter.report(report.completed_event());
    Ok(report)
}

fn remove_media(episode: &Episode, feed_dir: &Path) -> Result<String, PruneError> {
    let filename = episode
        .filename
        .clone()
        .or_else(|| resolve_filename(None, &episode.url))
        .ok_or_else(|| PruneError::NoFilename {
            url: episode.url.clone(),
        })?;
    if is_reserved_filename(&filename) {
        return Err(PruneError::ReservedFilename { filename });
    }

    let path = feed_dir.join(&filename);
    fs::remove_file(&path).map_err(|e| PruneError::RemoveFailed { path, source: e })?;

    Ok(filename)
}

/// Prune every stored feed
pub fn prune_all(
    store: &FeedStore,
    max_age_days: Option<u64>,
    reporter: &SharedProgressReporter,
) -> Result<FeedResults<BatchReport>, PodfoxError> {
    let mut results = Vec::new();

    for feed in store.list()? {
        let result = prune_feed(store, &feed, max_age_days, reporter);
        if let Err(e) = &result {
            tracing::warn!(shortname = %feed.shortname, error = %e, "prune batch failed");
        }
        results.push((feed.shortname, result));
    }

    Ok(results)
}
