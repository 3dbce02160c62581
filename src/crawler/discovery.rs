//! Discovery stages of the pipeline
//!
//! - Tag discovery walks the tag index and emits one work item per tag
//!   listing page
//! - Number discovery turns listing pages into new collection identifiers
//! - Info discovery turns identifiers into stored metadata and download tasks
//!
//! Every stage persists its result before handing work to the next stage.
//! Fetch and parse failures only skip the item at hand; storage failures
//! end the worker with an error.

use crate::crawler::fetcher::Fetcher;
use crate::crawler::parser;
use crate::crawler::queue::WorkQueue;
use crate::state::{Stage, StageState, StageTracker};
use crate::storage::{DownloadTask, Storage};
use crate::url::SiteUrls;
use crate::HarvestError;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a stage worker needs besides its queues
#[derive(Clone)]
pub struct StageContext {
    pub fetcher: Fetcher,
    pub storage: Arc<dyn Storage>,
    pub site: Arc<SiteUrls>,
    pub cancel: CancellationToken,
}

/// One listing page of a tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPage {
    pub tag: String,
    pub page: u32,
    pub url: String,
}

/// Enqueues every listing page of every tag
///
/// Tags are processed in index order. A tag whose page count cannot be
/// read is skipped. Processing stops after `terminal_tag`, which is itself
/// processed. A failed tag index fetch ends the stage with no output.
///
/// # Returns
///
/// The number of listing pages enqueued
pub async fn discover_tag_pages(
    ctx: &StageContext,
    terminal_tag: Option<&str>,
    output: &WorkQueue<TagPage>,
) -> usize {
    let mut tracker = StageTracker::new(Stage::TagDiscovery, 0);

    tracker.enter(StageState::Fetching);
    let index_url = match ctx.site.tag_index() {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(error = %e, "Cannot build tag index URL");
            tracker.enter(StageState::Stopped);
            return 0;
        }
    };

    let body = match ctx.fetcher.fetch_text(index_url.as_str(), &ctx.cancel).await {
        Ok(body) => body,
        Err(e) => {
            if !e.is_cancelled() {
                tracing::error!(url = %index_url, error = %e, "Failed to fetch tag index");
            }
            tracker.enter(StageState::Stopped);
            return 0;
        }
    };

    tracker.enter(StageState::Extracting);
    let tags = parser::list_tags(&body);
    tracing::info!(count = tags.len(), "Found tags");
    tracker.enter(StageState::Idle);

    let mut enqueued = 0;
    for tag in &tags {
        if ctx.cancel.is_cancelled() {
            break;
        }

        tracker.enter(StageState::Fetching);
        match tag_page_count(ctx, tag).await {
            Some(count) => {
                tracker.enter(StageState::Enqueuing);
                for page in 1..=count {
                    match ctx.site.tag_page(tag, page) {
                        Ok(url) => {
                            output.put(TagPage {
                                tag: tag.clone(),
                                page,
                                url: url.to_string(),
                            });
                            enqueued += 1;
                        }
                        Err(e) => tracing::warn!(tag = %tag, page, error = %e, "Cannot build tag page URL"),
                    }
                }
                tracing::debug!(tag = %tag, pages = count, "Queued tag pages");
            }
            None => tracing::debug!(tag = %tag, "Tag skipped"),
        }

        if terminal_tag == Some(tag.as_str()) {
            tracing::info!(tag = %tag, "Reached terminal tag, stopping tag discovery");
            break;
        }
        tracker.enter(StageState::Idle);
    }

    tracker.enter(StageState::Stopped);
    tracing::info!(pages = enqueued, "Tag discovery finished");
    enqueued
}

/// Fetches a tag's first page and reads its page count; None on any failure
async fn tag_page_count(ctx: &StageContext, tag: &str) -> Option<u32> {
    let url = match ctx.site.tag(tag) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(tag, error = %e, "Cannot build tag URL");
            return None;
        }
    };

    let body = match ctx.fetcher.fetch_text(url.as_str(), &ctx.cancel).await {
        Ok(body) => body,
        Err(e) => {
            if !e.is_cancelled() {
                tracing::warn!(tag, error = %e, "Failed to fetch tag page");
            }
            return None;
        }
    };

    match parser::page_count(&body, tag) {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!(tag, error = %e, "Cannot read tag page count");
            None
        }
    }
}

/// Number discovery worker loop
///
/// Takes listing pages until cancelled. Only identifiers this worker
/// actually inserted into the store are forwarded, so no identifier is
/// enqueued twice even with several workers.
pub async fn run_number_worker(
    ctx: StageContext,
    index: usize,
    input: WorkQueue<TagPage>,
    output: WorkQueue<String>,
) -> Result<(), HarvestError> {
    let mut tracker = StageTracker::new(Stage::NumberDiscovery, index);
    tracing::debug!(worker = tracker.worker(), "Worker started");

    while let Some(page) = input.get(&ctx.cancel).await {
        let result = collect_identifiers(&ctx, &mut tracker, &page, &output).await;
        input.task_done();
        result?;
        tracker.enter(StageState::Idle);
    }

    tracker.enter(StageState::Stopped);
    Ok(())
}

async fn collect_identifiers(
    ctx: &StageContext,
    tracker: &mut StageTracker,
    page: &TagPage,
    output: &WorkQueue<String>,
) -> Result<usize, HarvestError> {
    tracker.enter(StageState::Fetching);
    let body = match ctx.fetcher.fetch_text(&page.url, &ctx.cancel).await {
        Ok(body) => body,
        Err(e) => {
            if !e.is_cancelled() {
                tracing::warn!(
                    worker = tracker.worker(),
                    url = %page.url,
                    error = %e,
                    "Failed to fetch tag page"
                );
            }
            return Ok(0);
        }
    };

    tracker.enter(StageState::Extracting);
    let mut candidates = BTreeSet::new();
    for identifier in parser::list_identifiers(&body) {
        if !ctx.storage.exists(&identifier)? {
            candidates.insert(identifier);
        }
    }

    if candidates.is_empty() {
        tracing::debug!(tag = %page.tag, page = page.page, "No new collections");
        return Ok(0);
    }

    tracker.enter(StageState::Persisting);
    let inserted = ctx.storage.insert_new(&candidates)?;

    tracker.enter(StageState::Enqueuing);
    for identifier in &inserted {
        output.put(identifier.clone());
    }

    tracing::info!(
        worker = tracker.worker(),
        tag = %page.tag,
        page = page.page,
        count = inserted.len(),
        "Queued new collections"
    );
    Ok(inserted.len())
}

/// Info discovery worker loop
pub async fn run_info_worker(
    ctx: StageContext,
    index: usize,
    input: WorkQueue<String>,
    output: WorkQueue<DownloadTask>,
) -> Result<(), HarvestError> {
    let mut tracker = StageTracker::new(Stage::InfoDiscovery, index);
    tracing::debug!(worker = tracker.worker(), "Worker started");

    while let Some(identifier) = input.get(&ctx.cancel).await {
        let result = collect_metadata(&ctx, &mut tracker, &identifier, &output).await;
        input.task_done();
        result?;
        tracker.enter(StageState::Idle);
    }

    tracker.enter(StageState::Stopped);
    Ok(())
}

/// Fetches, stores and forwards the metadata of one collection
///
/// # Returns
///
/// True if the collection was stored and queued for download
async fn collect_metadata(
    ctx: &StageContext,
    tracker: &mut StageTracker,
    identifier: &str,
    output: &WorkQueue<DownloadTask>,
) -> Result<bool, HarvestError> {
    tracker.enter(StageState::Fetching);
    let url = ctx.site.collection(identifier)?;
    let body = match ctx.fetcher.fetch_text(url.as_str(), &ctx.cancel).await {
        Ok(body) => body,
        Err(e) => {
            if !e.is_cancelled() {
                tracing::warn!(
                    worker = tracker.worker(),
                    identifier,
                    error = %e,
                    "Failed to fetch collection page"
                );
            }
            return Ok(false);
        }
    };

    tracker.enter(StageState::Extracting);
    let record = match parser::collection_metadata(&body, identifier) {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(
                worker = tracker.worker(),
                identifier,
                error = %e,
                "Malformed collection page"
            );
            return Ok(false);
        }
    };

    tracker.enter(StageState::Persisting);
    ctx.storage.save_metadata(&record)?;

    tracker.enter(StageState::Enqueuing);
    output.put(record.download_task());

    tracing::info!(
        worker = tracker.worker(),
        identifier,
        name = %record.name,
        images = record.image_count,
        "Collection metadata stored"
    );
    Ok(true)
}
