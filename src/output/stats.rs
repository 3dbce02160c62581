//! Statistics generation from the collection store
//!
//! This module provides functionality for extracting and displaying
//! catalog statistics from the storage layer.

use crate::crawler::{RunOutcome, RunSummary};
use crate::storage::{CollectionStatistics, Storage};
use crate::HarvestError;
use std::fmt::Write;

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn Storage) -> Result<CollectionStatistics, HarvestError> {
    Ok(storage.statistics()?)
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

/// Renders catalog statistics as a plain-text report
pub fn format_statistics(stats: &CollectionStatistics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Collection Statistics ===\n");
    let _ = writeln!(out, "  Collections discovered: {}", stats.total);
    let _ = writeln!(
        out,
        "  With metadata: {} ({:.1}%)",
        stats.with_metadata,
        percentage(stats.with_metadata, stats.total)
    );
    let _ = writeln!(
        out,
        "  Downloaded: {} ({:.1}%)",
        stats.downloaded,
        percentage(stats.downloaded, stats.total)
    );
    let _ = writeln!(out, "  Images catalogued: {}", stats.total_images);
    let _ = writeln!(
        out,
        "  Pending metadata: {}",
        stats.total.saturating_sub(stats.with_metadata)
    );
    let _ = writeln!(
        out,
        "  Pending downloads: {}",
        stats.with_metadata.saturating_sub(stats.downloaded)
    );
    out
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CollectionStatistics) {
    print!("{}", format_statistics(stats));
}

/// Renders the counters of one run
pub fn format_run_summary(summary: &RunSummary) -> String {
    let outcome = match summary.outcome {
        RunOutcome::Completed => "completed",
        RunOutcome::Interrupted => "interrupted",
    };

    let mut out = String::new();
    let _ = writeln!(out, "=== Run {} ===\n", outcome);
    if summary.bootstrapped {
        let _ = writeln!(out, "  Catalog bootstrapped before workers started");
    }
    let _ = writeln!(out, "  Tag pages processed: {}", summary.tag_pages_processed);
    let _ = writeln!(
        out,
        "  Collections inspected: {}",
        summary.identifiers_processed
    );
    let _ = writeln!(
        out,
        "  Collections downloaded: {}",
        summary.collections_downloaded
    );
    if summary.collections_abandoned > 0 {
        let _ = writeln!(
            out,
            "  Collections abandoned: {} (retried next run)",
            summary.collections_abandoned
        );
    }
    out
}
