//! Backup Worker
//!
//! Runs backup cycles on a dedicated thread so callers never block on the
//! directory copy.

use std::io::{self, ErrorKind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::dataset::Dataset;
use crate::error::{Result, TallyError};
use crate::sync::Version;

use super::BackupManager;

/// Outcome of one cycle, as reported back to the requester
pub type CycleResult = Result<Option<Version>>;

enum Request {
    RunCycle { reply: Sender<CycleResult> },
    Shutdown,
}

/// Handle to the background backup thread
pub struct BackupWorker {
    requests: Sender<Request>,
    handle: Option<JoinHandle<()>>,
}

impl BackupWorker {
    /// Start the worker thread
    pub fn spawn(manager: Arc<BackupManager>, dataset: Arc<Mutex<Dataset>>) -> Result<Self> {
        let (requests, inbox) = channel::unbounded();
        let handle = thread::Builder::new()
            .name("tally-backup".to_string())
            .spawn(move || Self::run(manager, dataset, inbox))?;

        Ok(Self {
            requests,
            handle: Some(handle),
        })
    }

    /// Queue a backup cycle; the receiver yields its result
    pub fn request_cycle(&self) -> Result<Receiver<CycleResult>> {
        let (reply, result) = channel::bounded(1);
        self.requests
            .send(Request::RunCycle { reply })
            .map_err(|_| Self::stopped())?;
        Ok(result)
    }

    /// Queue a backup cycle and wait for it
    pub fn run_cycle_blocking(&self) -> CycleResult {
        self.request_cycle()?.recv().map_err(|_| Self::stopped())?
    }

    /// Stop the thread after the queued cycles finish
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let _ = self.requests.send(Request::Shutdown);
        handle.join().map_err(|_| {
            TallyError::Io(io::Error::new(ErrorKind::Other, "backup worker panicked"))
        })
    }

    fn run(manager: Arc<BackupManager>, dataset: Arc<Mutex<Dataset>>, inbox: Receiver<Request>) {
        debug!("backup worker started");
        for request in inbox {
            match request {
                Request::RunCycle { reply } => {
                    let result = manager.run_cycle(&mut dataset.lock());
                    if let Err(e) = &result {
                        error!("backup cycle failed: {}", e);
                    }
                    let _ = reply.send(result);
                }
                Request::Shutdown => break,
            }
        }
        debug!("backup worker stopped");
    }

    fn stopped() -> TallyError {
        TallyError::Io(io::Error::new(
            ErrorKind::BrokenPipe,
            "backup worker is not running",
        ))
    }
}

impl Drop for BackupWorker {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("backup worker shutdown failed: {}", e);
        }
    }
}
