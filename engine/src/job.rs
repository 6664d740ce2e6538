//! Job orchestration module.
//!
//! This module provides the backup and restore entry points:
//! - Validating a request and building the codec
//! - Planning a backup (single walk; the plan's sizes are the progress total)
//! - Running a backup or restore and reporting the terminal outcome

use std::path::PathBuf;

use tracing::error;

use crate::crypto::CryptoCodec;
use crate::error::{EngineError, Result};
use crate::model::{
    BackupJob, ContainerFormat, InclusionPolicy, Outcome, RestoreJob, SelectionItem,
};
use crate::planner::PathPlanner;
use crate::progress::{self, CancelToken, ProgressCallback};
use crate::reader;
use crate::writer;

/// Everything needed to run one backup.
#[derive(Debug, Clone)]
pub struct BackupRequest {
    /// Raw selection paths; each is probed as file or directory
    pub selection: Vec<PathBuf>,

    /// Archive file to create (overwritten if present)
    pub destination: PathBuf,

    pub format: ContainerFormat,

    pub recurse_subdirectories: bool,

    /// Key material; only valid with `ContainerFormat::TextConcat`
    pub encryption_key: Option<Vec<u8>>,
}

impl BackupRequest {
    /// Request with the format inferred from the destination extension.
    pub fn new(selection: Vec<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        let destination = destination.into();
        BackupRequest {
            format: ContainerFormat::from_path(&destination),
            selection,
            destination,
            recurse_subdirectories: false,
            encryption_key: None,
        }
    }

    pub fn with_format(mut self, format: ContainerFormat) -> Self {
        self.format = format;
        self
    }

    pub fn recursive(mut self, recurse: bool) -> Self {
        self.recurse_subdirectories = recurse;
        self
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    pub fn policy(&self) -> InclusionPolicy {
        InclusionPolicy {
            recurse_subdirectories: self.recurse_subdirectories,
        }
    }
}

/// Everything needed to run one restore.
#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub source: PathBuf,
    pub destination_dir: PathBuf,
    pub encryption_key: Option<Vec<u8>>,
}

impl RestoreRequest {
    pub fn new(source: impl Into<PathBuf>, destination_dir: impl Into<PathBuf>) -> Self {
        RestoreRequest {
            source: source.into(),
            destination_dir: destination_dir.into(),
            encryption_key: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }
}

/// Probe every selection path and build a planner for them.
///
/// # Errors
/// `NotFound` or `InvalidSelection` for the first unusable path.
pub fn build_planner(selection: &[PathBuf], policy: InclusionPolicy) -> Result<PathPlanner> {
    let items = selection
        .iter()
        .map(SelectionItem::probe)
        .collect::<Result<Vec<_>>>()?;
    Ok(PathPlanner::new(items, policy))
}

/// Validate a backup request and plan its entries without writing anything.
///
/// # Errors
/// `UnsupportedOption` for encrypted Zip requests, `InvalidKey` for unusable
/// key material, and planning errors for missing or invalid selections.
pub fn plan_backup(request: &BackupRequest) -> Result<(BackupJob, Option<CryptoCodec>)> {
    if request.format == ContainerFormat::Zip && request.encryption_key.is_some() {
        return Err(EngineError::UnsupportedOption {
            reason: "encryption is only available for text archives".to_string(),
        });
    }

    let codec = request
        .encryption_key
        .as_deref()
        .map(CryptoCodec::from_key_bytes)
        .transpose()?;

    let planner = build_planner(&request.selection, request.policy())?;
    let (entries, _total) = planner.plan_all()?;

    let job = BackupJob::new(
        request.destination.clone(),
        request.format,
        codec.is_some(),
        entries,
    );
    Ok((job, codec))
}

/// Run a complete backup.
///
/// The observer receives a start event, one event per entry, and exactly one
/// terminal outcome, including when the request fails before writing begins.
///
/// # Errors
/// Any planning error, destination I/O error, or cancellation. Unreadable
/// source files are recorded in the archive and do not fail the run.
pub fn run_backup(
    request: &BackupRequest,
    progress_callback: Option<&dyn ProgressCallback>,
    cancel: Option<&CancelToken>,
) -> Result<BackupJob> {
    let (mut job, codec) = match plan_backup(request) {
        Ok(planned) => planned,
        Err(err) => {
            error!(error = %err, "backup request rejected");
            progress::finish(progress_callback, Outcome::Failed(err.to_string()));
            return Err(err);
        }
    };

    writer::write_archive(&mut job, codec.as_ref(), progress_callback, cancel)?;
    Ok(job)
}

/// Run a complete restore.
///
/// # Errors
/// `InvalidKey` for unusable key material, otherwise see
/// [`reader::restore_archive`].
pub fn run_restore(
    request: &RestoreRequest,
    progress_callback: Option<&dyn ProgressCallback>,
    cancel: Option<&CancelToken>,
) -> Result<RestoreJob> {
    let codec = match request
        .encryption_key
        .as_deref()
        .map(CryptoCodec::from_key_bytes)
        .transpose()
    {
        Ok(codec) => codec,
        Err(err) => {
            error!(error = %err, "restore request rejected");
            progress::finish(progress_callback, Outcome::Failed(err.to_string()));
            return Err(err);
        }
    };

    let mut job = RestoreJob::new(request.source.clone(), request.destination_dir.clone());
    reader::restore_archive(&mut job, codec.as_ref(), progress_callback, cancel)?;
    Ok(job)
}
