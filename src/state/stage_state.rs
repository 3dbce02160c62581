/// Stage lifecycle definitions for tracking pipeline progress
///
/// Every pipeline worker moves through the same small set of states for each
/// item it handles. Transitions are emitted as debug events so a log shows
/// exactly where a worker is waiting.
use std::fmt;

/// The pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Tag index -> tag listing page URLs
    TagDiscovery,

    /// Tag listing page -> new collection identifiers
    NumberDiscovery,

    /// Collection identifier -> metadata and download task
    InfoDiscovery,

    /// Download task -> image files on disk
    Downloader,
}

impl Stage {
    /// Short name used in worker names and log fields
    pub fn name(&self) -> &'static str {
        match self {
            Self::TagDiscovery => "tag",
            Self::NumberDiscovery => "number",
            Self::InfoDiscovery => "info",
            Self::Downloader => "dl",
        }
    }

    /// Name of the n-th worker of this stage (e.g. "number-0")
    pub fn worker_name(&self, index: usize) -> String {
        format!("{}-{}", self.name(), index)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Represents what a stage worker is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageState {
    /// Waiting on the input queue
    Idle,

    /// Waiting on the network
    Fetching,

    /// Turning a page body into structured results
    Extracting,

    /// Writing to the dedup store
    Persisting,

    /// Handing results to the next stage's queue
    Enqueuing,

    /// Worker loop has exited after cancellation
    Stopped,
}

impl StageState {
    /// Returns true if this is the terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Returns true if the worker is suspended on I/O or a queue
    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::Idle | Self::Fetching)
    }

    /// Returns true if the transition from `self` to `next` is part of the
    /// worker lifecycle
    ///
    /// Any state may move to `Stopped` or back to `Idle` (item finished or
    /// skipped); otherwise work flows forward only.
    pub fn can_transition_to(&self, next: StageState) -> bool {
        if self.is_terminal() {
            return false;
        }

        match next {
            Self::Stopped | Self::Idle => true,
            Self::Fetching => matches!(self, Self::Idle | Self::Fetching | Self::Enqueuing),
            Self::Extracting => matches!(self, Self::Fetching),
            Self::Persisting => matches!(self, Self::Extracting | Self::Fetching),
            Self::Enqueuing => {
                matches!(self, Self::Extracting | Self::Persisting | Self::Fetching)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Persisting => "persisting",
            Self::Enqueuing => "enqueuing",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks and logs the state of one worker
#[derive(Debug)]
pub struct StageTracker {
    worker: String,
    state: StageState,
}

impl StageTracker {
    pub fn new(stage: Stage, index: usize) -> Self {
        Self {
            worker: stage.worker_name(index),
            state: StageState::Idle,
        }
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    /// Moves to `next`, logging the transition
    pub fn enter(&mut self, next: StageState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                worker = %self.worker,
                from = %self.state,
                to = %next,
                "Unexpected stage transition"
            );
        }
        tracing::trace!(
            worker = %self.worker,
            from = %self.state,
            to = %next,
            waiting = next.is_waiting(),
            "Stage transition"
        );
        self.state = next;
    }
}
