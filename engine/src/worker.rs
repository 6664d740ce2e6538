//! Background execution of backup and restore runs.
//!
//! Each run gets one dedicated thread. Progress and the terminal outcome are
//! streamed back as `JobMessage`s over a channel; the caller can request a
//! stop through the returned `CancelToken`.

use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::job::{run_backup, run_restore, BackupRequest, RestoreRequest};
use crate::model::{Outcome, ProgressEvent};
use crate::progress::{CancelToken, ProgressCallback};

/// Messages sent from a worker thread to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobMessage {
    Started(ProgressEvent),
    Progress(ProgressEvent),
    Completed(PathBuf),
    Failed(String),
}

impl JobMessage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobMessage::Completed(_) | JobMessage::Failed(_))
    }
}

/// A ProgressCallback implementation that forwards updates over a channel.
pub struct ChannelProgress {
    sender: Sender<JobMessage>,
}

impl ChannelProgress {
    pub fn new(sender: Sender<JobMessage>) -> Self {
        ChannelProgress { sender }
    }
}

impl ProgressCallback for ChannelProgress {
    fn on_started(&self, event: &ProgressEvent) {
        let _ = self.sender.send(JobMessage::Started(event.clone()));
    }

    fn on_entry_completed(&self, event: &ProgressEvent) {
        let _ = self.sender.send(JobMessage::Progress(event.clone()));
    }

    fn on_finished(&self, outcome: &Outcome) {
        let message = match outcome {
            Outcome::Completed(path) => JobMessage::Completed(path.clone()),
            Outcome::Failed(reason) => JobMessage::Failed(reason.clone()),
        };
        let _ = self.sender.send(message);
    }
}

/// Handle to a run executing on a background thread.
pub struct WorkerHandle {
    pub messages: Receiver<JobMessage>,
    pub cancel: CancelToken,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    /// Block until the run ends and return its terminal message.
    pub fn wait(self) -> JobMessage {
        let mut last = JobMessage::Failed("worker exited without a result".to_string());
        for message in self.messages.iter() {
            let terminal = message.is_terminal();
            last = message;
            if terminal {
                break;
            }
        }
        let _ = self.thread.join();
        last
    }
}

/// Spawn a background thread running one backup.
pub fn spawn_backup(request: BackupRequest) -> WorkerHandle {
    spawn(move |progress, cancel| {
        let _ = run_backup(&request, Some(progress), Some(cancel));
    })
}

/// Spawn a background thread running one restore.
pub fn spawn_restore(request: RestoreRequest) -> WorkerHandle {
    spawn(move |progress, cancel| {
        let _ = run_restore(&request, Some(progress), Some(cancel));
    })
}

fn spawn<F>(run: F) -> WorkerHandle
where
    F: FnOnce(&dyn ProgressCallback, &CancelToken) + Send + 'static,
{
    let (tx, rx) = unbounded::<JobMessage>();
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();

    let thread = thread::spawn(move || {
        let progress = ChannelProgress::new(tx);
        run(&progress, &worker_cancel);
    });

    WorkerHandle {
        messages: rx,
        cancel,
        thread,
    }
}
