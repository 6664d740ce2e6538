//! Archive restore: detects the container kind and extracts entries.
//!
//! Restore is all-or-nothing per run: the first entry that cannot be decoded
//! or written aborts the operation. Entries already written stay on disk.

use std::fs::{self, File};
use std::io::{self, BufReader};

use chrono::Local;
use tracing::{debug, error, info, info_span, warn};
use zip::ZipArchive;

use crate::crypto::CryptoCodec;
use crate::error::{EngineError, Result};
use crate::fs_ops;
use crate::model::{ContainerFormat, OperationState, Outcome, RestoreJob};
use crate::progress::{self, CancelToken, ProgressCallback, ProgressTracker};
use crate::size::human_size;
use crate::textconcat::{self, Record};

/// Restore an archive into `job.destination_dir`.
///
/// Transitions the job from Idle to Running to Completed or Failed and
/// reports the terminal outcome to the observer.
///
/// # Errors
/// `NotFound` if the archive is missing, `Decryption` for a wrong key or
/// tampered unit, `Format` for malformed framing or a corrupt ZIP, `Io` for
/// write failures, `Cancelled` if the token is set between entries.
pub fn restore_archive(
    job: &mut RestoreJob,
    codec: Option<&CryptoCodec>,
    progress_callback: Option<&dyn ProgressCallback>,
    cancel: Option<&CancelToken>,
) -> Result<()> {
    if job.state != OperationState::Idle {
        return Err(EngineError::UnsupportedOption {
            reason: format!(
                "restore job must be idle to run; current state: {:?}",
                job.state
            ),
        });
    }

    let span = info_span!("restore", job_id = %job.id, format = %job.format);
    let _enter = span.enter();

    job.state = OperationState::Running;
    job.start_time = Some(Local::now());
    info!(
        source = %job.source.display(),
        destination = %job.destination_dir.display(),
        "restore started"
    );

    let result = match job.format {
        ContainerFormat::Zip => {
            if codec.is_some() {
                warn!("zip archives are never encrypted; ignoring the supplied key");
            }
            restore_zip(job, progress_callback, cancel)
        }
        ContainerFormat::TextConcat => restore_text(job, codec, progress_callback, cancel),
    };
    job.end_time = Some(Local::now());

    match result {
        Ok(()) => {
            job.state = OperationState::Completed;
            info!(
                entries = job.restored.len(),
                skipped = job.skipped_records,
                processed = %human_size(job.processed_bytes),
                "restore completed"
            );
            progress::finish(
                progress_callback,
                Outcome::Completed(job.destination_dir.clone()),
            );
            Ok(())
        }
        Err(err) => {
            job.state = OperationState::Failed;
            job.error_message = Some(err.to_string());
            error!(error = %err, "restore failed");
            progress::finish(progress_callback, Outcome::Failed(err.to_string()));
            Err(err)
        }
    }
}

fn check_cancelled(cancel: Option<&CancelToken>) -> Result<()> {
    if cancel.map(CancelToken::is_cancelled).unwrap_or(false) {
        warn!("restore cancelled between entries");
        return Err(EngineError::Cancelled);
    }
    Ok(())
}

fn restore_zip(
    job: &mut RestoreJob,
    progress_callback: Option<&dyn ProgressCallback>,
    cancel: Option<&CancelToken>,
) -> Result<()> {
    let file = File::open(&job.source).map_err(|e| EngineError::io(&job.source, e))?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| {
        EngineError::format(format!("{}: {}", job.source.display(), e))
    })?;

    let mut total = 0u64;
    for index in 0..archive.len() {
        let entry = archive
            .by_index_raw(index)
            .map_err(|e| EngineError::format(e.to_string()))?;
        total += entry.size();
    }
    job.total_bytes = total;

    let mut tracker = ProgressTracker::new(progress_callback, total);
    tracker.start();

    for index in 0..archive.len() {
        check_cancelled(cancel)?;

        let mut entry = archive
            .by_index(index)
            .map_err(|e| EngineError::format(e.to_string()))?;
        let target = fs_ops::resolve_under(&job.destination_dir, entry.name())?;

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| EngineError::io(&target, e))?;
            continue;
        }

        fs_ops::ensure_parent_dir_exists(&target)?;
        let mut out = File::create(&target).map_err(|e| EngineError::io(&target, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| EngineError::Io {
            path: target.clone(),
            source: e,
        })?;

        let size = entry.size();
        debug!(entry = entry.name(), bytes = size, "extracted entry");
        let description = format!("{} ({})", target.display(), human_size(size));
        job.processed_bytes = tracker.advance(size, description);
        job.restored.push(target);
    }

    Ok(())
}

fn restore_text(
    job: &mut RestoreJob,
    codec: Option<&CryptoCodec>,
    progress_callback: Option<&dyn ProgressCallback>,
    cancel: Option<&CancelToken>,
) -> Result<()> {
    let raw = fs::read(&job.source).map_err(|e| EngineError::io(&job.source, e))?;
    let text = String::from_utf8(raw)
        .map_err(|_| EngineError::format("text archive is not valid UTF-8"))?;

    let records = match codec {
        Some(codec) => textconcat::parse_encrypted(&text, codec)?,
        None => textconcat::parse_plain(&text)?,
    };

    let total = records
        .iter()
        .map(|record| match record {
            Record::File { content, .. } => content.len() as u64,
            Record::Error { .. } => 0,
        })
        .sum();
    job.total_bytes = total;

    let mut tracker = ProgressTracker::new(progress_callback, total);
    tracker.start();

    for record in records {
        check_cancelled(cancel)?;

        match record {
            Record::Error { message } => {
                warn!(record = %message, "skipping entry that failed during backup");
                job.skipped_records += 1;
            }
            Record::File { name, content } => {
                let target = fs_ops::resolve_under(&job.destination_dir, &name)?;
                fs_ops::write_entry(&target, content.as_bytes())?;

                let size = content.len() as u64;
                debug!(entry = %name, bytes = size, "restored entry");
                let description = format!("{} ({})", target.display(), human_size(size));
                job.processed_bytes = tracker.advance(size, description);
                job.restored.push(target);
            }
        }
    }

    Ok(())
}
