// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::DownloadError;
use crate::http::{HttpClient, HttpResponse};
use crate::metadata::Episode;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::store::PARTIAL_SUFFIX;

use super::filename::resolve_filename;

/// Context for tracking a download in concurrent scenarios
#[derive(Debug, Clone)]
pub struct DownloadContext {
    /// Slot ID (0 to max_concurrent-1) for progress bar management
    pub download_id: usize,
    /// Index of this episode in the download queue
    pub episode_index: usize,
    /// Total number of episodes to download
    pub total_to_download: usize,
    /// Upper bound for the whole transfer, connect included
    pub transfer_timeout: Duration,
}

/// Outcome of a successful download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    /// Name of the file inside the feed directory
    pub filename: String,
    pub bytes_downloaded: u64,
}

/// Download an episode's enclosure into `feed_dir`
///
/// The body is streamed into a temp file which is renamed to its final name
/// only after the whole body arrived, so a failed or interrupted transfer
/// never leaves a truncated file under the final name.
pub async fn download_episode<C: HttpClient + ?Sized>(
    client: &C,
    episode: &Episode,
    feed_dir: &Path,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
) -> Result<DownloadResult, DownloadError> {
    let url = episode.url.trim();
    let partial_path = feed_dir.join(format!(".podfox-{}{PARTIAL_SUFFIX}", context.episode_index));

    let transfer = fetch_to_partial(client, episode, &partial_path, context, reporter);
    let outcome = match tokio::time::timeout(context.transfer_timeout, transfer).await {
        Ok(outcome) => outcome,
        Err(_) => Err(DownloadError::TimedOut {
            url: url.to_string(),
            secs: context.transfer_timeout.as_secs(),
        }),
    };

    let (filename, bytes_downloaded) = match outcome {
        Ok(done) => done,
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial_path).await;
            return Err(e);
        }
    };

    let final_path = feed_dir.join(&filename);
    if let Err(e) = tokio::fs::rename(&partial_path, &final_path).await {
        let _ = tokio::fs::remove_file(&partial_path).await;
        return Err(DownloadError::FinalizeFailed {
            path: final_path,
            source: e,
        });
    }

    reporter.report(ProgressEvent::DownloadCompleted {
        download_id: context.download_id,
        episode_title: episode.title.clone(),
        filename: filename.clone(),
        bytes_downloaded,
    });

    Ok(DownloadResult {
        filename,
        bytes_downloaded,
    })
}

/// Request the enclosure and stream it into `partial_path`
///
/// Returns the resolved final filename and the number of bytes written.
async fn fetch_to_partial<C: HttpClient + ?Sized>(
    client: &C,
    episode: &Episode,
    partial_path: &Path,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
) -> Result<(String, u64), DownloadError> {
    let url = episode.url.trim();

    let response = client
        .get_stream(url)
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if response.status >= 400 {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    let filename = resolve_filename(response.content_disposition.as_deref(), url).ok_or_else(
        || DownloadError::NoFilename {
            url: url.to_string(),
        },
    )?;

    reporter.report(ProgressEvent::DownloadStarting {
        download_id: context.download_id,
        episode_title: episode.title.clone(),
        episode_index: context.episode_index,
        total_to_download: context.total_to_download,
        content_length: response.content_length,
    });

    let bytes_downloaded =
        stream_to_file(response, url, partial_path.to_path_buf(), episode, context, reporter)
            .await?;

    Ok((filename, bytes_downloaded))
}

async fn stream_to_file(
    response: HttpResponse,
    url: &str,
    path: PathBuf,
    episode: &Episode,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
) -> Result<u64, DownloadError> {
    let mut file = File::create(&path)
        .await
        .map_err(|e| DownloadError::FileCreateFailed {
            path: path.clone(),
            source: e,
        })?;

    let mut bytes_downloaded: u64 = 0;
    let mut stream = response.body;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: path.clone(),
                source: e,
            })?;

        bytes_downloaded += chunk.len() as u64;

        reporter.report(ProgressEvent::DownloadProgress {
            download_id: context.download_id,
            episode_title: episode.title.clone(),
            bytes_downloaded,
            total_bytes: response.content_length,
        });
    }

    // Ensure all data is on disk before the rename makes it visible
    file.flush()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: path.clone(),
            source: e,
        })?;
    file.sync_all()
        .await
        .map_err(|e| DownloadError::FileWriteFailed { path, source: e })?;

    Ok(bytes_downloaded)
}
