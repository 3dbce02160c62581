//! Downloader stage
//!
//! Saves every image of a collection into a folder named after the
//! collection. Images already on disk are skipped, so an interrupted
//! collection resumes where it stopped. A collection is only marked
//! downloaded when fewer than `failure_threshold` images failed.

use crate::config::DownloadConfig;
use crate::crawler::discovery::StageContext;
use crate::crawler::fetcher::{pause, random_delay};
use crate::crawler::queue::WorkQueue;
use crate::state::{Stage, StageState, StageTracker};
use crate::storage::DownloadTask;
use crate::url::image_file_name;
use crate::{FetchError, HarvestError};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Characters that are not allowed in collection folder names
const INVALID_PATH_CHARS: &[char] = &['*', '|', ':', '：', '?', '/', '<', '>', '"', '\\'];

/// Folder used when a collection name cannot be used as a folder
pub const FALLBACK_FOLDER: &str = "unknown";

/// Downloader policy
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub root: PathBuf,
    pub delay_min: Duration,
    pub delay_max: Duration,
    pub failure_threshold: usize,
}

impl DownloadSettings {
    pub fn from_config(config: &DownloadConfig) -> Self {
        Self {
            root: config.root.clone(),
            delay_min: Duration::from_millis(config.image_delay_min_ms),
            delay_max: Duration::from_millis(config.image_delay_max_ms),
            failure_threshold: config.failure_threshold,
        }
    }
}

/// Per-collection download counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Removes characters that are invalid in folder names
pub fn sanitize_folder_name(name: &str) -> String {
    name.chars()
        .filter(|c| !INVALID_PATH_CHARS.contains(c) && !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Picks the folder for a collection below `root`
pub fn collection_folder(root: &Path, name: &str) -> PathBuf {
    let sanitized = sanitize_folder_name(name);
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        root.join(FALLBACK_FOLDER)
    } else {
        root.join(sanitized)
    }
}

/// Creates the collection folder, falling back to the shared folder
async fn prepare_folder(root: &Path, name: &str) -> Result<PathBuf, HarvestError> {
    let folder = collection_folder(root, name);
    match tokio::fs::create_dir_all(&folder).await {
        Ok(()) => Ok(folder),
        Err(e) => {
            tracing::warn!(
                folder = %folder.display(),
                error = %e,
                "Cannot create collection folder, using fallback"
            );
            let fallback = root.join(FALLBACK_FOLDER);
            tokio::fs::create_dir_all(&fallback).await?;
            Ok(fallback)
        }
    }
}

/// Downloads every image of one collection
///
/// # Errors
///
/// - `ExcessiveFailure` when at least `failure_threshold` images failed
/// - `Fetch(Cancelled)` when cancellation interrupted the collection
/// - `Io` when no folder could be created
pub async fn download_collection(
    ctx: &StageContext,
    settings: &DownloadSettings,
    task: &DownloadTask,
) -> Result<DownloadReport, HarvestError> {
    let folder = prepare_folder(&settings.root, &task.name).await?;
    let mut report = DownloadReport::default();

    for url in &task.image_urls {
        let Some(file_name) = image_file_name(url) else {
            tracing::warn!(identifier = %task.identifier, url = %url, "Image URL has no file name");
            report.failed += 1;
            continue;
        };

        let path = folder.join(file_name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            report.skipped += 1;
            continue;
        }

        if report.downloaded + report.failed > 0 {
            let delay = random_delay(settings.delay_min, settings.delay_max);
            if !pause(delay, &ctx.cancel).await {
                return Err(FetchError::Cancelled { url: url.clone() }.into());
            }
        }

        match ctx.fetcher.fetch_to_file(url, &path, &ctx.cancel).await {
            Ok(bytes) => {
                tracing::debug!(url = %url, bytes, "Image saved");
                report.downloaded += 1;
            }
            Err(e) if e.is_cancelled() => return Err(e.into()),
            Err(e) => {
                tracing::warn!(identifier = %task.identifier, url = %url, error = %e, "Image download failed");
                report.failed += 1;
            }
        }
    }

    if report.failed >= settings.failure_threshold {
        return Err(HarvestError::ExcessiveFailure {
            identifier: task.identifier.clone(),
            failures: report.failed,
        });
    }

    Ok(report)
}

/// Downloader worker loop
///
/// Completed collections are marked downloaded and acknowledged.
/// Abandoned collections are released without acknowledgement and stay
/// pending in the store for the next run.
pub async fn run_download_worker(
    ctx: StageContext,
    settings: std::sync::Arc<DownloadSettings>,
    index: usize,
    input: WorkQueue<DownloadTask>,
) -> Result<(), HarvestError> {
    let mut tracker = StageTracker::new(Stage::Downloader, index);
    tracing::debug!(worker = tracker.worker(), "Worker started");

    while let Some(task) = input.get(&ctx.cancel).await {
        tracker.enter(StageState::Fetching);
        match download_collection(&ctx, &settings, &task).await {
            Ok(report) => {
                tracker.enter(StageState::Persisting);
                let marked = ctx.storage.mark_downloaded(&task.identifier);
                input.task_done();
                marked?;

                tracing::info!(
                    worker = tracker.worker(),
                    identifier = %task.identifier,
                    name = %task.name,
                    downloaded = report.downloaded,
                    skipped = report.skipped,
                    failed = report.failed,
                    "Collection downloaded"
                );
            }
            Err(HarvestError::Fetch(e)) if e.is_cancelled() => {
                // Left outstanding: nobody joins the queue after cancellation
                tracing::debug!(
                    worker = tracker.worker(),
                    identifier = %task.identifier,
                    "Download interrupted"
                );
                break;
            }
            Err(e @ HarvestError::ExcessiveFailure { .. }) | Err(e @ HarvestError::Io(_)) => {
                input.release();
                tracing::warn!(
                    worker = tracker.worker(),
                    identifier = %task.identifier,
                    error = %e,
                    "Collection abandoned"
                );
            }
            Err(e) => {
                input.release();
                return Err(e);
            }
        }
        tracker.enter(StageState::Idle);
    }

    tracker.enter(StageState::Stopped);
    Ok(())
}
