//! State module for tracking pipeline progress
//!
//! # Components
//!
//! - `Stage`: The four pipeline stages (tag, number, info, download)
//! - `StageState`: What a worker is doing (idle, fetching, extracting, ...)
//! - `StageTracker`: Per-worker state holder that logs transitions

mod stage_state;

pub use stage_state::{Stage, StageState, StageTracker};
