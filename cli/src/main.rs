//! Satchel - Command-line interface for the archive engine.
//!
//! A thin driver for manual use and scripting. It maps arguments onto the
//! engine's request types and reports progress to stderr.

use std::cell::Cell;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use satchel_engine::{
    generate_key, human_size,
    job::build_planner,
    run_backup, run_restore, BackupRequest, ContainerFormat, InclusionPolicy, Outcome,
    ProgressCallback, ProgressEvent, RestoreRequest,
};
use tracing_subscriber::EnvFilter;

/// Satchel - back up files and folders into a single archive
#[derive(Parser, Debug)]
#[command(name = "satchel")]
#[command(version = "0.1.0")]
#[command(about = "Back up files into text or ZIP archives and restore them")]
struct Cli {
    /// Enable verbose output (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the given files and folders into an archive
    Backup {
        /// Files or directories to include
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        /// Archive to create (overwritten if present)
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Write a ZIP archive (also implied by a .zip output)
        #[arg(long)]
        zip: bool,

        /// Include nested subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Encryption key as printed by `satchel keygen`
        #[arg(long, value_name = "KEY", env = "SATCHEL_KEY", hide_env_values = true)]
        key: Option<String>,
    },

    /// Extract an archive into a directory
    Restore {
        /// Archive to read
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// Directory to restore into
        #[arg(long, value_name = "DIR")]
        into: PathBuf,

        /// Encryption key used when the archive was written
        #[arg(long, value_name = "KEY", env = "SATCHEL_KEY", hide_env_values = true)]
        key: Option<String>,
    },

    /// List what a backup would contain without writing anything
    Plan {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        #[arg(short, long)]
        recursive: bool,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a freshly generated encryption key
    Keygen,
}

/// CLI implementation of ProgressCallback for displaying archive progress
struct CliProgress {
    verbose: bool,
    start_time: Instant,
    last_progress_update: Cell<Instant>,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        let now = Instant::now();
        CliProgress {
            verbose,
            start_time: now,
            last_progress_update: Cell::new(now),
        }
    }

    fn format_duration(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn progress_bar(percent: u8) -> String {
        let filled = (percent.min(100) / 5) as usize;
        let empty = 20 - filled;
        format!("[{}{}] {}%", "=".repeat(filled), " ".repeat(empty), percent)
    }

    fn print_progress(event: &ProgressEvent) {
        eprint!(
            "\rProgress: {} | {}/{}",
            Self::progress_bar(event.percent()),
            human_size(event.processed_bytes),
            human_size(event.total_bytes)
        );
        let _ = std::io::stderr().flush();
    }
}

impl ProgressCallback for CliProgress {
    fn on_started(&self, event: &ProgressEvent) {
        eprintln!("Total: {}", human_size(event.total_bytes));
        Self::print_progress(event);
    }

    fn on_entry_completed(&self, event: &ProgressEvent) {
        if self.verbose {
            eprintln!("\r  {}", event.description);
        }

        // Throttle redraws (max once per 200ms) but always show the last one
        let finished = event.processed_bytes >= event.total_bytes;
        if !finished && self.last_progress_update.get().elapsed() < Duration::from_millis(200) {
            return;
        }
        self.last_progress_update.set(Instant::now());
        Self::print_progress(event);
    }

    fn on_finished(&self, outcome: &Outcome) {
        eprintln!();
        match outcome {
            Outcome::Completed(path) => eprintln!("Done: {}", path.display()),
            Outcome::Failed(reason) => eprintln!("Failed: {}", reason),
        }
        eprintln!("Elapsed: {}", Self::format_duration(self.start_time.elapsed()));
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Parse arguments, run the chosen command, and map the result to an exit code
fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match run_cli(&cli) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
fn run_cli(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Backup {
            paths,
            output,
            zip,
            recursive,
            key,
        } => {
            let mut request = BackupRequest::new(paths.clone(), output).recursive(*recursive);
            if *zip {
                request = request.with_format(ContainerFormat::Zip);
            }
            if let Some(key) = key {
                request = request.with_key(key.trim().as_bytes());
            }

            let progress = CliProgress::new(cli.verbose);
            let job = run_backup(&request, Some(&progress), None)
                .with_context(|| format!("Backup to {} failed", output.display()))?;

            eprintln!(
                "Summary: {} entries, {} written, {} unreadable",
                job.entries.len(),
                human_size(job.processed_bytes),
                job.failed_entries
            );
            Ok(())
        }

        Command::Restore { archive, into, key } => {
            let mut request = RestoreRequest::new(archive, into);
            if let Some(key) = key {
                request = request.with_key(key.trim().as_bytes());
            }

            let progress = CliProgress::new(cli.verbose);
            let job = run_restore(&request, Some(&progress), None)
                .with_context(|| format!("Restore of {} failed", archive.display()))?;

            eprintln!(
                "Summary: {} files restored, {} skipped",
                job.restored.len(),
                job.skipped_records
            );
            Ok(())
        }

        Command::Plan {
            paths,
            recursive,
            json,
        } => {
            let policy = InclusionPolicy {
                recurse_subdirectories: *recursive,
            };
            let planner = build_planner(paths, policy).context("Invalid selection")?;
            let (entries, total) = planner.plan_all().context("Planning failed")?;

            if *json {
                let report = serde_json::json!({
                    "entries": entries,
                    "total_bytes": total,
                    "total": human_size(total),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for entry in &entries {
                    println!("{:>12}  {}", human_size(entry.size_bytes), entry.archive_name);
                }
                println!("{} files, {}", entries.len(), human_size(total));
            }
            Ok(())
        }

        Command::Keygen => {
            println!("{}", generate_key());
            Ok(())
        }
    }
}
