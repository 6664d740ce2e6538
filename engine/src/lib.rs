//! # Satchel Engine - Backup Archive Library
//!
//! A headless archive engine that writes a selection of files and folders into
//! a backup container and restores it later. Designed as the foundation for
//! multiple front ends (CLI, GUI, automation).
//!
//! ## Overview
//!
//! - Two container formats: framed concatenated text, or deflate ZIP
//! - Optional authenticated encryption of text archives, unit by unit
//! - Inclusion policy for nested subdirectories
//! - Byte-level progress via callbacks (decoupled from UI technology)
//! - Best-effort backups (unreadable files are recorded, not fatal) and
//!   all-or-nothing restores
//!
//! ## Basic Usage
//!
//! ```no_run
//! use satchel_engine::{run_backup, run_restore, BackupRequest, RestoreRequest};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Back up a folder, including subdirectories
//! let request = BackupRequest::new(vec!["/home/me/notes".into()], "/backups/notes.txt")
//!     .recursive(true);
//! let job = run_backup(&request, None, None)?;
//! println!("Wrote {} entries", job.entries.len());
//!
//! // Restore it somewhere else
//! run_restore(&RestoreRequest::new("/backups/notes.txt", "/tmp/restored"), None, None)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (SelectionItem, ArchiveEntry, jobs, enums)
//! - **error**: Error types and handling
//! - **size**: Size estimation and human-readable sizes
//! - **planner**: Selection to archive-entry planning
//! - **crypto**: Authenticated encryption of archive units
//! - **textconcat**: TextConcat framing and parsing
//! - **writer** / **reader**: Container writing and restoring
//! - **job**: Backup/restore entry points
//! - **progress**: Progress callback trait and cancellation
//! - **worker**: Background thread runner with channel-based progress

pub mod model;
pub mod error;
pub mod fs_ops;
pub mod size;
pub mod planner;
pub mod crypto;
pub mod textconcat;
pub mod writer;
pub mod reader;
pub mod job;
pub mod progress;
pub mod worker;

// Re-export main types and functions
pub use model::{
    ArchiveEntry, BackupJob, ContainerFormat, InclusionPolicy, OperationState, Outcome,
    ProgressEvent, RestoreJob, SelectionItem, SelectionKind,
};
pub use error::{EngineError, Result};
pub use size::{estimate, human_size};
pub use planner::PathPlanner;
pub use crypto::{generate_key, CryptoCodec, EncryptionKey};
pub use job::{plan_backup, run_backup, run_restore, BackupRequest, RestoreRequest};
pub use progress::{CancelToken, ProgressCallback};
pub use worker::{spawn_backup, spawn_restore, ChannelProgress, JobMessage, WorkerHandle};
