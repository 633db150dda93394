//! Filesystem event ingestion: normalizes raw OS notifications into a
//! uniform `FileEvent` stream.
//!
//! DOES:
//! - Watch one or more paths recursively, emitting `FileEvent` to a single
//!   callback on a dedicated worker thread.
//! - Filter out directory-only events.
//! - Isolate a failing callback (caught, logged, source keeps running).
//!
//! DOES NOT:
//! - Resolve PIDs (the previous implementation iterated the whole process
//!   table per event and was unacceptably slow; PID is always `None` here).
//! - Compute features or score anything (see `features.rs`, `model.rs`).
//!
//! `EventSource::start` returns an owned `EventSourceHandle` rather than
//! stashing a module-level observer: teardown is dropping the handle (or
//! calling `stop()` explicitly), not hitting a global.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use notify::{
    CreateKind, Event, EventKind as NotifyEventKind, ModifyKind, RecommendedWatcher,
    RecursiveMode, RemoveKind, Watcher,
};
use tracing::{error, info, warn};

use crate::error::MonitorError;

/// Kind of filesystem change observed for a single path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Create,
    Modify,
    Rename,
    Delete,
}

/// A single normalized filesystem observation.
///
/// `path` is the destination path for `Rename` events. `pid` is best-effort
/// and frequently `None` — callers must not rely on it being populated on
/// the hot path (see module docs).
#[derive(Debug, Clone, PartialEq)]
pub struct FileEvent {
    pub timestamp: f64,
    pub kind: EventKind,
    pub path: PathBuf,
    pub pid: Option<u32>,
}

impl FileEvent {
    pub fn new(timestamp: f64, kind: EventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            timestamp,
            kind,
            path: path.into(),
            pid: None,
        }
    }

    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn map_kind(kind: &NotifyEventKind) -> Option<EventKind> {
    match kind {
        NotifyEventKind::Create(CreateKind::Folder) => None,
        NotifyEventKind::Create(_) => Some(EventKind::Create),
        NotifyEventKind::Modify(ModifyKind::Name(_)) => Some(EventKind::Rename),
        NotifyEventKind::Modify(_) => Some(EventKind::Modify),
        NotifyEventKind::Remove(RemoveKind::Folder) => None,
        NotifyEventKind::Remove(_) => Some(EventKind::Delete),
        _ => None,
    }
}

/// Callback invoked for every normalized event. Must not block for long —
/// the consumer thread processes events serially.
pub type EventCallback = Arc<dyn Fn(FileEvent) + Send + Sync + 'static>;

/// Capacity of the bounded channel between the `notify` callback thread and
/// the dispatch thread that invokes `EventCallback`. Overflow drops the
/// newest raw event (never blocks the OS notification thread).
const RAW_QUEUE_CAPACITY: usize = 4096;

/// An asynchronous, callback-driven filesystem watcher.
pub struct EventSource;

impl EventSource {
    /// Begins asynchronous emission of `FileEvent`s to `callback` for the
    /// given `paths`. Does not block. Invalid paths are warned and skipped;
    /// if none of `paths` are valid, returns an error.
    pub fn start(
        callback: EventCallback,
        paths: Vec<PathBuf>,
        recursive: bool,
    ) -> Result<EventSourceHandle, MonitorError> {
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        let (raw_tx, raw_rx) = sync_channel::<Event>(RAW_QUEUE_CAPACITY);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(std::sync::atomic::AtomicU64::new(0));

        let watcher_stop = Arc::clone(&stop_flag);
        let watcher_dropped = Arc::clone(&dropped);
        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
                if watcher_stop.load(Ordering::Acquire) {
                    return;
                }
                match res {
                    Ok(event) => {
                        if raw_tx.try_send(event).is_err() {
                            watcher_dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(err) => warn!("filesystem watcher error: {err}"),
                }
            })
            .map_err(MonitorError::WatcherCreation)?;

        let mut watched_any = false;
        let mut rejected = Vec::new();
        for path in &paths {
            if !path.exists() {
                warn!("watch path does not exist, skipping: {}", path.display());
                rejected.push(path.clone());
                continue;
            }
            match watcher.watch(path, mode) {
                Ok(()) => {
                    info!("watching {} (recursive={recursive})", path.display());
                    watched_any = true;
                }
                Err(source) => {
                    warn!("failed to watch {}: {source}", path.display());
                    rejected.push(path.clone());
                }
            }
        }

        if !watched_any {
            return Err(MonitorError::NoValidPaths(rejected));
        }

        let dispatch_stop = Arc::clone(&stop_flag);
        let worker = std::thread::Builder::new()
            .name("kavach-event-dispatch".into())
            .spawn(move || dispatch_loop(raw_rx, callback, dispatch_stop))
            .expect("failed to spawn event dispatch thread");

        Ok(EventSourceHandle {
            stop_flag,
            watcher: Some(watcher),
            worker: Some(worker),
        })
    }
}

fn dispatch_loop(
    raw_rx: std::sync::mpsc::Receiver<Event>,
    callback: EventCallback,
    stop_flag: Arc<AtomicBool>,
) {
    loop {
        if stop_flag.load(Ordering::Acquire) {
            break;
        }
        match raw_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => emit(&event, &callback),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn emit(event: &Event, callback: &EventCallback) {
    let Some(kind) = map_kind(&event.kind) else {
        return;
    };
    let Some(path) = event.paths.last().cloned() else {
        return;
    };

    let fe = FileEvent::new(now_secs(), kind, path);
    let result = catch_unwind(AssertUnwindSafe(|| callback(fe.clone())));
    if result.is_err() {
        error!("event callback panicked for event: {:?}", fe);
    }
}

/// Owned handle to a running `EventSource`. Dropping it (or calling
/// `stop()`) guarantees no further callback invocations once it returns.
pub struct EventSourceHandle {
    stop_flag: Arc<AtomicBool>,
    watcher: Option<RecommendedWatcher>,
    worker: Option<JoinHandle<()>>,
}

impl EventSourceHandle {
    /// Stops the source. Joins the dispatch thread with a bounded wait; on
    /// timeout, logs and returns rather than blocking process exit.
    pub fn stop(mut self) {
        self.stop_inner();
    }

    fn stop_inner(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        self.watcher.take();
        if let Some(worker) = self.worker.take() {
            let (done_tx, done_rx) = std::sync::mpsc::channel();
            let handle_name = "kavach-event-dispatch";
            std::thread::spawn(move || {
                let _ = worker.join();
                let _ = done_tx.send(());
            });
            if done_rx.recv_timeout(Duration::from_secs(5)).is_err() {
                warn!("{handle_name} did not stop within 5s; abandoning join");
            }
        }
    }
}

impl Drop for EventSourceHandle {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop_inner();
        }
    }
}

/// Default watch path when none are supplied: the user's home directory.
pub fn default_watch_paths() -> Vec<PathBuf> {
    dirs::home_dir()
        .map(|p| vec![p])
        .unwrap_or_else(|| vec![PathBuf::from(".")])
}
