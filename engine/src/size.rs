//! Size estimation and human-readable size formatting.
//!
//! `estimate` walks a selection independently of the planner and never fails:
//! files that vanish or cannot be inspected count as zero bytes. The backup
//! entry points do not use it for the progress denominator (they sum the
//! planned entries instead), but collaborators use it for quick previews.

use std::fs;
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use crate::model::{InclusionPolicy, SelectionItem, SelectionKind};

const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

/// Format a byte count with two decimals, e.g. `1536 -> "1.50 KB"`.
///
/// Divides by 1024 until the value drops below 1024; values that never do
/// before TB are reported in PB.
pub fn human_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{:.2} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.2} PB", size)
}

/// Total byte size of a selection under an inclusion policy.
pub fn estimate(selection: &[SelectionItem], policy: InclusionPolicy) -> u64 {
    selection
        .iter()
        .map(|item| match item.kind {
            SelectionKind::File => file_len(&item.path),
            SelectionKind::Directory => directory_size(&item.path, policy),
        })
        .sum()
}

fn directory_size(root: &Path, policy: InclusionPolicy) -> u64 {
    let mut walker = WalkDir::new(root).min_depth(1);
    if !policy.recurse_subdirectories {
        walker = walker.max_depth(1);
    }

    walker
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!(error = %err, "skipping unreadable path during size estimation");
                None
            }
        })
        .filter(|entry| !entry.file_type().is_dir())
        .map(|entry| file_len(entry.path()))
        .sum()
}

/// Length of a regular file (following symlinks), or 0 when it cannot be read.
fn file_len(path: &Path) -> u64 {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata.len(),
        _ => 0,
    }
}
