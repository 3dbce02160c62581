//! Output module for run reports and catalog statistics
//!
//! This module handles:
//! - Loading aggregate counts from the store
//! - Rendering the statistics report
//! - Rendering the summary of a finished run

pub mod stats;

pub use stats::{
    format_run_summary, format_statistics, load_statistics, print_statistics,
};

use crate::crawler::RunSummary;

/// Prints the summary of a finished run to stdout
pub fn print_run_summary(summary: &RunSummary) {
    print!("{}", format_run_summary(summary));
}
