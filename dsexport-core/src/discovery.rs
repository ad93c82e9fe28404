//! Waiting for the conversation container to show up.
//!
//! The page renders progressively, so the container may be missing from the
//! first snapshot. Callers feed later snapshots through a channel and pick
//! how long to wait with a [`WaitPolicy`].

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use crate::dom::{Document, Locator};
use crate::error::{ExportError, Result};
use crate::service::read_page;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Only the initial snapshot is checked.
    Immediate,
    /// Snapshots are consumed until the deadline passes.
    Bounded(Duration),
    /// Snapshots are consumed until the feed closes.
    Unbounded,
}

/// Returns the first snapshot, starting with `initial`, that contains a
/// node matching `locator`.
pub fn await_container(
    initial: Document,
    updates: &Receiver<Document>,
    locator: &Locator,
    policy: WaitPolicy,
) -> Result<Document> {
    if initial.select_first(locator).is_some() {
        return Ok(initial);
    }

    let not_found = || ExportError::ContainerNotFound {
        selector: locator.to_string(),
    };

    match policy {
        WaitPolicy::Immediate => Err(not_found()),
        WaitPolicy::Bounded(limit) => {
            let deadline = Instant::now() + limit;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match updates.recv_timeout(remaining) {
                    Ok(snapshot) if snapshot.select_first(locator).is_some() => {
                        return Ok(snapshot);
                    }
                    Ok(_) => tracing::debug!(%locator, "snapshot without container"),
                    Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                        return Err(not_found());
                    }
                }
            }
        }
        WaitPolicy::Unbounded => {
            for snapshot in updates.iter() {
                if snapshot.select_first(locator).is_some() {
                    return Ok(snapshot);
                }
                tracing::debug!(%locator, "snapshot without container");
            }
            Err(not_found())
        }
    }
}

/// Background poller that re-parses a page file whenever it changes on disk.
/// Dropping it stops the poller.
#[derive(Debug)]
pub struct FileWatch {
    pub updates: Receiver<Document>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for FileWatch {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub fn watch_file(path: &Path, interval: Duration) -> FileWatch {
    let (tx, rx) = channel();
    let stop = Arc::new(AtomicBool::new(false));
    let path = path.to_path_buf();
    let flag = Arc::clone(&stop);
    let handle = thread::spawn(move || poll_file(&path, interval, &tx, &flag));

    FileWatch {
        updates: rx,
        stop,
        handle: Some(handle),
    }
}

fn poll_file(path: &Path, interval: Duration, tx: &Sender<Document>, stop: &AtomicBool) {
    let mut last_seen = file_stamp(path);
    while !stop.load(Ordering::Acquire) {
        thread::sleep(interval);

        let stamp = file_stamp(path);
        if stamp.is_none() || stamp == last_seen {
            continue;
        }
        last_seen = stamp;

        match read_page(path) {
            Ok(document) => {
                if tx.send(document).is_err() {
                    return;
                }
            }
            Err(err) => tracing::warn!(path = %path.display(), %err, "cannot re-read page"),
        }
    }
}

fn file_stamp(path: &Path) -> Option<(SystemTime, u64)> {
    let meta = fs::metadata(path).ok()?;
    Some((meta.modified().ok()?, meta.len()))
}
