//! Per-File Watching
//!
//! Watches individual files by watching their parent directories
//! non-recursively and filtering events down to registered paths. Watching
//! the directory instead of the file itself keeps the watch alive across
//! atomic saves (write temp file, rename over target), which editors use
//! almost universally. Raw events are coalesced per path: one event is
//! forwarded into the tracker's tokio channel after the path has been quiet
//! for the debounce window, so a burst of writes yields a single delivery
//! and a change landing mid-window is never dropped.

use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A change to a watched file, already coalesced and filtered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
}

struct PendingChange {
    last_event: Instant,
    flush_scheduled: bool,
}

pub struct FileWatcher {
    watcher: RecommendedWatcher,
    watched_files: Arc<Mutex<HashSet<PathBuf>>>,
    watched_dirs: HashMap<PathBuf, usize>,
}

impl FileWatcher {
    /// Create a watcher that forwards events into `tx`.
    pub fn new(
        tx: mpsc::UnboundedSender<FileEvent>,
        debounce_window: Duration,
    ) -> anyhow::Result<Self> {
        let watched_files: Arc<Mutex<HashSet<PathBuf>>> = Arc::new(Mutex::new(HashSet::new()));
        let pending: Arc<Mutex<HashMap<PathBuf, PendingChange>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let files = watched_files.clone();
        let handler = move |result: notify::Result<Event>| {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "file watcher error");
                    return;
                }
            };
            // Access events carry no content change; everything else
            // (create, modify, rename, remove) can mean a replaced file.
            if matches!(event.kind, EventKind::Access(_)) {
                return;
            }
            for path in event.paths {
                if !files.lock().contains(&path) {
                    continue;
                }
                let mut guard = pending.lock();
                let entry = guard.entry(path.clone()).or_insert(PendingChange {
                    last_event: Instant::now(),
                    flush_scheduled: false,
                });
                entry.last_event = Instant::now();
                if entry.flush_scheduled {
                    continue;
                }
                entry.flush_scheduled = true;
                drop(guard);

                // One flusher per path at a time. It waits for the path to
                // go quiet for a full window, then sends a single coalesced
                // event for the whole write burst.
                let tx = tx.clone();
                let pending = pending.clone();
                std::thread::spawn(move || loop {
                    std::thread::sleep(debounce_window);
                    let mut guard = pending.lock();
                    let Some(entry) = guard.get_mut(&path) else {
                        return;
                    };
                    if entry.last_event.elapsed() < debounce_window {
                        continue;
                    }
                    entry.flush_scheduled = false;
                    drop(guard);
                    // Send failure means the receiver dropped; the tracker
                    // is shutting down.
                    let _ = tx.send(FileEvent { path });
                    return;
                });
            }
        };

        let watcher = RecommendedWatcher::new(handler, NotifyConfig::default())?;
        Ok(Self {
            watcher,
            watched_files,
            watched_dirs: HashMap::new(),
        })
    }

    /// Start watching a file. Idempotent per path.
    pub fn watch_file(&mut self, path: &Path) -> anyhow::Result<bool> {
        let path = path.to_path_buf();
        if !self.watched_files.lock().insert(path.clone()) {
            return Ok(false);
        }
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let count = self.watched_dirs.entry(dir.clone()).or_insert(0);
        if *count == 0 {
            self.watcher.watch(&dir, RecursiveMode::NonRecursive)?;
            debug!(dir = %dir.display(), "watching directory");
        }
        *count += 1;
        Ok(true)
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched_files.lock().contains(path)
    }

    /// Stop watching a file, releasing the directory watch when it was the
    /// last registered file there.
    pub fn unwatch_file(&mut self, path: &Path) {
        if !self.watched_files.lock().remove(path) {
            return;
        }
        let Some(dir) = path.parent().map(Path::to_path_buf) else {
            return;
        };
        if let Some(count) = self.watched_dirs.get_mut(&dir) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.watched_dirs.remove(&dir);
                if let Err(e) = self.watcher.unwatch(&dir) {
                    warn!(dir = %dir.display(), error = %e, "failed to unwatch directory");
                }
            }
        }
    }

    pub fn watched_count(&self) -> usize {
        self.watched_files.lock().len()
    }
}
