//! Archive writing: streams planned entries into a TextConcat or Zip container.
//!
//! Per-entry read failures are best-effort: TextConcat archives get a synthetic
//! `Error reading file ...` record, Zip archives list the failure in the archive
//! comment. Failures on the destination itself abort the run.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local, Timelike};
use tracing::{debug, error, info, info_span, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::crypto::CryptoCodec;
use crate::error::{EngineError, Result};
use crate::model::{ArchiveEntry, BackupJob, ContainerFormat, OperationState, Outcome};
use crate::progress::{self, CancelToken, ProgressCallback, ProgressTracker};
use crate::size::human_size;
use crate::textconcat;

/// Destination-side container being filled entry by entry.
trait ContainerSink {
    /// Store a successfully read entry.
    fn add_entry(&mut self, entry: &ArchiveEntry, contents: &[u8]) -> Result<()>;

    /// Record an entry whose source could not be read.
    fn add_read_failure(&mut self, entry: &ArchiveEntry, err: &io::Error) -> Result<()>;

    /// Flush and close the container.
    fn finish(self: Box<Self>) -> Result<()>;
}

struct TextSink<'a> {
    out: BufWriter<File>,
    path: PathBuf,
    codec: Option<&'a CryptoCodec>,
}

impl<'a> TextSink<'a> {
    fn create(path: &Path, codec: Option<&'a CryptoCodec>) -> Result<Self> {
        let file = File::create(path).map_err(|e| EngineError::io(path, e))?;
        let mut sink = TextSink {
            out: BufWriter::new(file),
            path: path.to_path_buf(),
            codec,
        };
        sink.write_unit(&textconcat::preamble(&Local::now()))?;
        Ok(sink)
    }

    /// Append one unit, sealing it first when encryption is active.
    fn write_unit(&mut self, unit: &str) -> Result<()> {
        let result = match self.codec {
            Some(codec) => {
                let token = codec.encrypt_token(unit.as_bytes())?;
                self.out.write_all(token.as_bytes())
            }
            None => self.out.write_all(unit.as_bytes()),
        };
        result.map_err(|e| EngineError::Io {
            path: self.path.clone(),
            source: e,
        })
    }
}

impl ContainerSink for TextSink<'_> {
    fn add_entry(&mut self, entry: &ArchiveEntry, contents: &[u8]) -> Result<()> {
        self.write_unit(&textconcat::header(&entry.archive_name))?;
        self.write_unit(&textconcat::content(contents))
    }

    fn add_read_failure(&mut self, entry: &ArchiveEntry, err: &io::Error) -> Result<()> {
        let path = entry.source_path.display().to_string();
        self.write_unit(&textconcat::error_record(&path, &err.to_string()))
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.out.flush().map_err(|e| EngineError::Io {
            path: self.path.clone(),
            source: e,
        })
    }
}

struct ZipSink {
    zip: ZipWriter<BufWriter<File>>,
    path: PathBuf,
    options: SimpleFileOptions,
    failures: Vec<String>,
}

impl ZipSink {
    fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| EngineError::io(path, e))?;
        Ok(ZipSink {
            zip: ZipWriter::new(BufWriter::new(file)),
            path: path.to_path_buf(),
            options: SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(0o644),
            failures: Vec::new(),
        })
    }
}

/// Local-time ZIP timestamp; `None` outside the DOS range (1980-2107).
fn zip_timestamp(time: SystemTime) -> Option<zip::DateTime> {
    let local: DateTime<Local> = time.into();
    zip::DateTime::from_date_and_time(
        u16::try_from(local.year()).ok()?,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .ok()
}

fn zip_error(path: &Path, err: zip::result::ZipError) -> EngineError {
    match err {
        zip::result::ZipError::Io(source) => EngineError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => EngineError::format(format!("{}: {}", path.display(), other)),
    }
}

impl ContainerSink for ZipSink {
    fn add_entry(&mut self, entry: &ArchiveEntry, contents: &[u8]) -> Result<()> {
        let mut options = self
            .options
            .large_file(contents.len() as u64 >= u64::from(u32::MAX));
        let modified = fs::metadata(&entry.source_path).and_then(|m| m.modified());
        if let Some(stamp) = modified.ok().and_then(zip_timestamp) {
            options = options.last_modified_time(stamp);
        }

        self.zip
            .start_file(entry.archive_name.as_str(), options)
            .map_err(|e| zip_error(&self.path, e))?;
        self.zip.write_all(contents).map_err(|e| EngineError::Io {
            path: self.path.clone(),
            source: e,
        })
    }

    fn add_read_failure(&mut self, entry: &ArchiveEntry, err: &io::Error) -> Result<()> {
        self.failures.push(format!(
            "{}{}: {}",
            textconcat::ERROR_PREFIX,
            entry.source_path.display(),
            err
        ));
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let ZipSink {
            mut zip,
            path,
            failures,
            ..
        } = *self;
        if !failures.is_empty() {
            zip.set_comment(failures.join("\n"));
        }
        let mut out = zip.finish().map_err(|e| zip_error(&path, e))?;
        out.flush().map_err(|e| EngineError::Io { path, source: e })
    }
}

/// Write a planned backup job to its destination.
///
/// Transitions the job from Idle to Running to Completed or Failed and
/// reports the terminal outcome to the observer.
///
/// # Errors
/// Returns `UnsupportedOption` for encrypted Zip requests, `Cancelled` when
/// the token is set between entries, and `Io` for destination failures.
/// Unreadable source files do NOT fail the run.
pub fn write_archive(
    job: &mut BackupJob,
    codec: Option<&CryptoCodec>,
    progress_callback: Option<&dyn ProgressCallback>,
    cancel: Option<&CancelToken>,
) -> Result<()> {
    if job.state != OperationState::Idle {
        return Err(EngineError::UnsupportedOption {
            reason: format!(
                "backup job must be idle to run; current state: {:?}",
                job.state
            ),
        });
    }

    let span = info_span!("backup", job_id = %job.id, format = %job.format);
    let _enter = span.enter();

    job.state = OperationState::Running;
    job.start_time = Some(Local::now());
    info!(
        destination = %job.destination.display(),
        entries = job.entries.len(),
        total = %human_size(job.total_bytes),
        encrypted = codec.is_some(),
        "backup started"
    );

    let result = write_entries(job, codec, progress_callback, cancel);
    job.end_time = Some(Local::now());

    match result {
        Ok(()) => {
            job.state = OperationState::Completed;
            info!(
                processed = %human_size(job.processed_bytes),
                failed_entries = job.failed_entries,
                "backup completed"
            );
            progress::finish(progress_callback, Outcome::Completed(job.destination.clone()));
            Ok(())
        }
        Err(err) => {
            job.state = OperationState::Failed;
            job.error_message = Some(err.to_string());
            error!(error = %err, "backup failed");
            progress::finish(progress_callback, Outcome::Failed(err.to_string()));
            Err(err)
        }
    }
}

fn write_entries(
    job: &mut BackupJob,
    codec: Option<&CryptoCodec>,
    progress_callback: Option<&dyn ProgressCallback>,
    cancel: Option<&CancelToken>,
) -> Result<()> {
    let mut sink: Box<dyn ContainerSink + '_> = match (job.format, codec) {
        (ContainerFormat::Zip, Some(_)) => {
            return Err(EngineError::UnsupportedOption {
                reason: "encryption is only available for text archives".to_string(),
            })
        }
        (ContainerFormat::Zip, None) => Box::new(ZipSink::create(&job.destination)?),
        (ContainerFormat::TextConcat, codec) => {
            Box::new(TextSink::create(&job.destination, codec)?)
        }
    };

    let mut tracker = ProgressTracker::new(progress_callback, job.total_bytes);
    tracker.start();

    for entry in &job.entries {
        if cancel.map(CancelToken::is_cancelled).unwrap_or(false) {
            warn!(processed = job.processed_bytes, "backup cancelled between entries");
            return Err(EngineError::Cancelled);
        }

        match fs::read(&entry.source_path) {
            Ok(contents) => {
                debug!(entry = %entry.archive_name, bytes = contents.len(), "writing entry");
                sink.add_entry(entry, &contents)?;
            }
            Err(err) => {
                warn!(
                    path = %entry.source_path.display(),
                    error = %err,
                    "source unreadable; recording error entry"
                );
                sink.add_read_failure(entry, &err)?;
                job.failed_entries += 1;
            }
        }

        let description = format!("{} ({})", entry.archive_name, human_size(entry.size_bytes));
        job.processed_bytes = tracker.advance(entry.size_bytes, description);
    }

    sink.finish()
}
