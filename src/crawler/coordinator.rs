//! Crawler coordinator - pipeline orchestration
//!
//! This module wires the four stages together and owns the run lifecycle:
//! - Opening the store and rebuilding the backlog of an earlier run
//! - Deciding whether the catalog must be bootstrapped before workers start
//! - Spawning the worker pools
//! - Waiting for the queues to drain in pipeline order
//! - Cancelling and collecting the workers on shutdown

use crate::config::{BootstrapConfig, Config};
use crate::crawler::discovery::{
    discover_tag_pages, run_info_worker, run_number_worker, StageContext, TagPage,
};
use crate::crawler::downloader::{run_download_worker, DownloadSettings};
use crate::crawler::fetcher::{FetchSettings, Fetcher, HeaderProfile};
use crate::crawler::queue::WorkQueue;
use crate::storage::{open_storage, DownloadTask, Storage};
use crate::url::SiteUrls;
use crate::HarvestError;
use std::path::Path;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

type WorkerResult = Result<(), HarvestError>;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every queue drained
    Completed,
    /// Cancelled from outside before the queues drained
    Interrupted,
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,

    /// Tag discovery finished before the other workers started
    pub bootstrapped: bool,

    pub tag_pages_processed: usize,
    pub identifiers_processed: usize,
    pub collections_downloaded: usize,

    /// Collections given up on after too many failed images
    pub collections_abandoned: usize,
}

/// Returns true if the catalog is small enough that tag discovery should
/// finish before any other worker starts
pub fn should_bootstrap(config: &BootstrapConfig, known: usize, pending_downloads: usize) -> bool {
    known < config.known_identifier_threshold
        && pending_downloads < config.pending_download_threshold
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    storage: Arc<dyn Storage>,
    site: Arc<SiteUrls>,
    fetcher: Fetcher,
}

impl Coordinator {
    /// Creates a coordinator backed by the configured SQLite database
    pub fn new(config: Config) -> Result<Self, HarvestError> {
        let storage = open_storage(Path::new(&config.storage.database_path))?;
        Self::with_storage(config, Arc::new(storage))
    }

    /// Creates a coordinator on top of an already opened store
    pub fn with_storage(config: Config, storage: Arc<dyn Storage>) -> Result<Self, HarvestError> {
        let site = SiteUrls::from_config(&config.site)?;
        let fetcher = Fetcher::new(FetchSettings::from_config(&config.fetch, &site))?;

        Ok(Self {
            config: Arc::new(config),
            storage,
            site: Arc::new(site),
            fetcher,
        })
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        Arc::clone(&self.storage)
    }

    /// Runs the pipeline until every queue drains or `cancel` fires
    ///
    /// # Run Flow
    ///
    /// 1. Queue pending metadata fetches and downloads left by earlier runs
    /// 2. Bootstrap: if the store is nearly empty, run tag discovery to
    ///    completion first; otherwise run it alongside the other workers
    /// 3. Wait for tag discovery, then join the tag page, identifier and
    ///    download queues in that order
    /// 4. Cancel the workers and wait for them to exit
    ///
    /// # Errors
    ///
    /// A worker failing with a storage error (or panicking) cancels every
    /// other worker and is returned.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunSummary, HarvestError> {
        tokio::fs::create_dir_all(&self.config.download.root).await?;

        let tag_pages: WorkQueue<TagPage> = WorkQueue::new("tag-pages");
        let identifiers: WorkQueue<String> = WorkQueue::new("identifiers");
        let downloads: WorkQueue<DownloadTask> = WorkQueue::new("downloads");

        for identifier in self.storage.pending_metadata()? {
            identifiers.put(identifier);
        }
        for task in self.storage.pending_downloads()? {
            downloads.put(task);
        }
        let known = self.storage.all_known_identifiers()?.len();
        tracing::info!(
            known,
            pending_metadata = identifiers.len(),
            pending_downloads = downloads.len(),
            "Loaded backlog from store"
        );

        // Cancelled at shutdown without touching the caller's token
        let workers_cancel = cancel.child_token();
        let ctx = StageContext {
            fetcher: self.fetcher.clone(),
            storage: Arc::clone(&self.storage),
            site: Arc::clone(&self.site),
            cancel: workers_cancel.clone(),
        };
        let terminal_tag = Some(self.config.site.terminal_tag.clone()).filter(|t| !t.is_empty());

        let tag_done = CancellationToken::new();
        let mut workers: JoinSet<WorkerResult> = JoinSet::new();

        let bootstrapped = should_bootstrap(&self.config.bootstrap, known, downloads.len());
        if bootstrapped {
            tracing::info!("Catalog is small, running tag discovery before other workers");
            discover_tag_pages(&ctx, terminal_tag.as_deref(), &tag_pages).await;
            tag_done.cancel();
        } else {
            let ctx = ctx.clone();
            let output = tag_pages.clone();
            let done = tag_done.clone();
            workers.spawn(async move {
                let _done = done.drop_guard();
                discover_tag_pages(&ctx, terminal_tag.as_deref(), &output).await;
                Ok(())
            });
        }

        self.spawn_workers(&mut workers, &ctx, &tag_pages, &identifiers, &downloads);
        tracing::info!(workers = workers.len(), "Pipeline started");

        let drained = drain_in_order(&tag_done, &tag_pages, &identifiers, &downloads, &cancel);
        tokio::pin!(drained);

        let outcome = loop {
            tokio::select! {
                biased;
                outcome = &mut drained => break outcome,
                Some(joined) = workers.join_next() => {
                    if let Err(e) = flatten(joined) {
                        tracing::error!(error = %e, "Worker failed, stopping pipeline");
                        workers_cancel.cancel();
                        collect_workers(&mut workers).await.ok();
                        return Err(e);
                    }
                }
            }
        };

        match outcome {
            RunOutcome::Completed => tracing::info!("All queues drained, shutting down workers"),
            RunOutcome::Interrupted => tracing::info!("Interrupted, shutting down workers"),
        }
        workers_cancel.cancel();
        collect_workers(&mut workers).await?;

        let summary = RunSummary {
            outcome,
            bootstrapped,
            tag_pages_processed: tag_pages.completed(),
            identifiers_processed: identifiers.completed(),
            collections_downloaded: downloads.completed(),
            collections_abandoned: downloads.released(),
        };
        tracing::info!(?summary, "Run finished");
        Ok(summary)
    }

    fn spawn_workers(
        &self,
        workers: &mut JoinSet<WorkerResult>,
        ctx: &StageContext,
        tag_pages: &WorkQueue<TagPage>,
        identifiers: &WorkQueue<String>,
        downloads: &WorkQueue<DownloadTask>,
    ) {
        let counts = &self.config.workers;

        for index in 0..counts.number {
            workers.spawn(run_number_worker(
                ctx.clone(),
                index,
                tag_pages.clone(),
                identifiers.clone(),
            ));
        }

        for index in 0..counts.info {
            workers.spawn(run_info_worker(
                ctx.clone(),
                index,
                identifiers.clone(),
                downloads.clone(),
            ));
        }

        let download_ctx = StageContext {
            fetcher: ctx.fetcher.with_profile(HeaderProfile::Image),
            ..ctx.clone()
        };
        let settings = Arc::new(DownloadSettings::from_config(&self.config.download));
        for index in 0..counts.download {
            workers.spawn(run_download_worker(
                download_ctx.clone(),
                Arc::clone(&settings),
                index,
                downloads.clone(),
            ));
        }
    }
}

/// Waits for tag discovery, then for each queue in pipeline order
///
/// A queue is only joined once every upstream producer has finished, so
/// its outstanding count can no longer grow when the join returns.
async fn drain_in_order(
    tag_done: &CancellationToken,
    tag_pages: &WorkQueue<TagPage>,
    identifiers: &WorkQueue<String>,
    downloads: &WorkQueue<DownloadTask>,
    cancel: &CancellationToken,
) -> RunOutcome {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => return RunOutcome::Interrupted,
        _ = tag_done.cancelled() => tracing::debug!("Tag discovery done"),
    }

    if !tag_pages.join(cancel).await {
        return RunOutcome::Interrupted;
    }
    tracing::info!(processed = tag_pages.completed(), "Tag page queue drained");

    if !identifiers.join(cancel).await {
        return RunOutcome::Interrupted;
    }
    tracing::info!(processed = identifiers.completed(), "Identifier queue drained");

    if !downloads.join(cancel).await {
        return RunOutcome::Interrupted;
    }
    tracing::info!(
        downloaded = downloads.completed(),
        abandoned = downloads.released(),
        "Download queue drained"
    );
    RunOutcome::Completed
}

fn flatten(joined: Result<WorkerResult, JoinError>) -> WorkerResult {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(HarvestError::WorkerPanic(e.to_string())),
    }
}

/// Waits for every worker to exit; returns the first failure
async fn collect_workers(workers: &mut JoinSet<WorkerResult>) -> WorkerResult {
    let mut first_error = None;
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = flatten(joined) {
            tracing::error!(error = %e, "Worker failed during shutdown");
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Opens the configured store and runs the pipeline once
///
/// # Example
///
/// ```no_run
/// use gallery_harvest::config::load_config;
/// use gallery_harvest::crawler::run_crawl;
/// use std::path::Path;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("harvest.toml"))?;
/// let summary = run_crawl(config, CancellationToken::new()).await?;
/// println!("{} collections downloaded", summary.collections_downloaded);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config, cancel: CancellationToken) -> Result<RunSummary, HarvestError> {
    let coordinator = Coordinator::new(config)?;
    coordinator.run(cancel).await
}
