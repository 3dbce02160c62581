//! Crawler module for the discovery and download pipeline
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with jitter, retries and a connection cap
//! - HTML extraction of tags, identifiers and collection metadata
//! - Work queues with join semantics between stages
//! - The discovery and download stage workers
//! - Overall run coordination

mod coordinator;
mod discovery;
mod downloader;
mod fetcher;
mod parser;
mod queue;

pub use coordinator::{run_crawl, should_bootstrap, Coordinator, RunOutcome, RunSummary};
pub use discovery::{
    discover_tag_pages, run_info_worker, run_number_worker, StageContext, TagPage,
};
pub use downloader::{
    collection_folder, download_collection, run_download_worker, sanitize_folder_name,
    DownloadReport, DownloadSettings, FALLBACK_FOLDER,
};
pub use fetcher::{build_http_client, random_delay, FetchSettings, Fetcher, HeaderProfile};
pub use parser::{collection_metadata, list_identifiers, list_tags, page_count};
pub use queue::WorkQueue;

use crate::config::Config;
use crate::HarvestError;
use tokio_util::sync::CancellationToken;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the store and queue the work left by earlier runs
/// 2. Discover tags and their listing pages
/// 3. Record new collection identifiers
/// 4. Fetch collection metadata
/// 5. Download collection images
///
/// Returns once every queue has drained or `cancel` fires.
pub async fn crawl(config: Config, cancel: CancellationToken) -> Result<RunSummary, HarvestError> {
    run_crawl(config, cancel).await
}
