//! Core data model for backup and restore runs.
//!
//! This module defines the main data structures:
//! - SelectionItem / SelectionKind: what the caller asked to back up
//! - InclusionPolicy: whether nested subdirectories are walked
//! - ArchiveEntry: one planned source file and its archive-relative name
//! - ContainerFormat: TextConcat or Zip
//! - ProgressEvent: byte-level progress after each entry
//! - BackupJob / RestoreJob: per-run records with state and counters

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, Result};

/// Whether a selection item is a single file or a directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionKind {
    File,
    Directory,
}

/// A user-specified path, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionItem {
    pub path: PathBuf,
    pub kind: SelectionKind,
}

impl SelectionItem {
    /// Create a file selection without touching the filesystem.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        SelectionItem {
            path: path.into(),
            kind: SelectionKind::File,
        }
    }

    /// Create a directory selection without touching the filesystem.
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        SelectionItem {
            path: path.into(),
            kind: SelectionKind::Directory,
        }
    }

    /// Tag a raw path by probing the filesystem.
    ///
    /// # Errors
    /// `NotFound` if the path does not exist, `InvalidSelection` if it is
    /// neither a regular file nor a directory.
    pub fn probe(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let metadata = fs::metadata(&path).map_err(|e| EngineError::io(&path, e))?;
        if metadata.is_file() {
            Ok(SelectionItem::file(path))
        } else if metadata.is_dir() {
            Ok(SelectionItem::directory(path))
        } else {
            Err(EngineError::InvalidSelection {
                path,
                reason: "not a regular file or directory".to_string(),
            })
        }
    }
}

/// Controls which files inside a selected directory are included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InclusionPolicy {
    /// When false, only files directly inside a selected directory are used
    pub recurse_subdirectories: bool,
}

impl InclusionPolicy {
    pub fn recursive() -> Self {
        InclusionPolicy {
            recurse_subdirectories: true,
        }
    }

    pub fn top_level_only() -> Self {
        InclusionPolicy {
            recurse_subdirectories: false,
        }
    }
}

/// One source file scheduled for the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Absolute (or caller-relative) path of the source file
    pub source_path: PathBuf,

    /// `/`-separated path under which the entry is stored
    pub archive_name: String,

    /// File size in bytes at plan time
    pub size_bytes: u64,
}

/// The on-disk container kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerFormat {
    /// Framed concatenated text, optionally encrypted unit by unit
    TextConcat,
    /// Standard deflate-compressed ZIP
    Zip,
}

impl ContainerFormat {
    /// Infer the format from a path: `.zip` (any case) is Zip, everything else is TextConcat.
    pub fn from_path(path: &Path) -> Self {
        let is_zip = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("zip"))
            .unwrap_or(false);
        if is_zip {
            ContainerFormat::Zip
        } else {
            ContainerFormat::TextConcat
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerFormat::TextConcat => write!(f, "text"),
            ContainerFormat::Zip => write!(f, "zip"),
        }
    }
}

/// Progress snapshot emitted at the start of a run and after each entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub processed_bytes: u64,
    pub total_bytes: u64,
    /// `"<path> (<size>)"` for the last completed entry; empty for the start event
    pub description: String,
}

impl ProgressEvent {
    /// Integer percentage in 0..=100.
    ///
    /// A zero total reports 100 so empty runs never divide by zero.
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 100;
        }
        let processed = self.processed_bytes.min(self.total_bytes) as u128;
        (processed * 100 / self.total_bytes as u128) as u8
    }
}

/// Terminal result of a run, reported to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Backup finished; carries the archive path (or restore directory)
    Completed(PathBuf),
    /// Run aborted; carries the human-readable reason
    Failed(String),
}

/// Lifecycle of a backup or restore run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    /// Created, not yet started
    Idle,
    /// Currently writing or extracting
    Running,
    /// Reached the end of the entry list
    Completed,
    /// Aborted by an error or cancellation
    Failed,
}

impl OperationState {
    /// Returns true if this state is terminal (no further changes expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Completed | OperationState::Failed)
    }
}

/// Record of a single backup run.
#[derive(Debug)]
pub struct BackupJob {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Archive file being produced
    pub destination: PathBuf,

    pub format: ContainerFormat,

    pub encrypted: bool,

    /// Planned entries, in processing order
    pub entries: Vec<ArchiveEntry>,

    pub state: OperationState,

    /// Sum of planned entry sizes
    pub total_bytes: u64,

    pub processed_bytes: u64,

    /// Entries replaced by a synthetic error record
    pub failed_entries: usize,

    /// Reason recorded when the run fails
    pub error_message: Option<String>,

    pub created_at: DateTime<Local>,
    pub start_time: Option<DateTime<Local>>,
    pub end_time: Option<DateTime<Local>>,
}

impl BackupJob {
    pub fn new(
        destination: impl Into<PathBuf>,
        format: ContainerFormat,
        encrypted: bool,
        entries: Vec<ArchiveEntry>,
    ) -> Self {
        let total_bytes = entries.iter().map(|e| e.size_bytes).sum();
        BackupJob {
            id: Uuid::new_v4(),
            destination: destination.into(),
            format,
            encrypted,
            entries,
            state: OperationState::Idle,
            total_bytes,
            processed_bytes: 0,
            failed_entries: 0,
            error_message: None,
            created_at: Local::now(),
            start_time: None,
            end_time: None,
        }
    }
}

/// Record of a single restore run.
#[derive(Debug)]
pub struct RestoreJob {
    pub id: Uuid,

    /// Archive being restored
    pub source: PathBuf,

    /// Directory receiving the extracted entries
    pub destination_dir: PathBuf,

    pub format: ContainerFormat,

    pub state: OperationState,

    pub total_bytes: u64,

    pub processed_bytes: u64,

    /// Paths written so far, in extraction order
    pub restored: Vec<PathBuf>,

    /// Synthetic error records found in the archive and skipped
    pub skipped_records: usize,

    pub error_message: Option<String>,

    pub created_at: DateTime<Local>,
    pub start_time: Option<DateTime<Local>>,
    pub end_time: Option<DateTime<Local>>,
}

impl RestoreJob {
    pub fn new(source: impl Into<PathBuf>, destination_dir: impl Into<PathBuf>) -> Self {
        let source = source.into();
        let format = ContainerFormat::from_path(&source);
        RestoreJob {
            id: Uuid::new_v4(),
            source,
            destination_dir: destination_dir.into(),
            format,
            state: OperationState::Idle,
            total_bytes: 0,
            processed_bytes: 0,
            restored: Vec::new(),
            skipped_records: 0,
            error_message: None,
            created_at: Local::now(),
            start_time: None,
            end_time: None,
        }
    }
}
