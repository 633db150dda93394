//! Error taxonomy for the detection pipeline.
//!
//! DOES:
//! - Define the lifecycle-operation errors (`start`/`stop`, `train`, `load`).
//!
//! DOES NOT:
//! - Surface on the event hot path. `EventSource` callbacks and
//!   `Detector::process` never return `Result`; transient failures there are
//!   absorbed and logged (see spec section 7).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("no valid watch paths (all of {0:?} were rejected)")]
    NoValidPaths(Vec<PathBuf>),

    #[error("failed to create filesystem watcher: {0}")]
    WatcherCreation(#[source] notify::Error),

    #[error("failed to start watching {path}: {source}")]
    WatchStart {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model file not found: {0}")]
    NotFound(PathBuf),

    #[error("model file is corrupt or unreadable: {0}")]
    Corrupt(#[source] serde_json::Error),

    #[error("io error reading/writing model file: {0}")]
    Io(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("no samples were collected; cannot train a baseline model")]
    NoSamples,

    #[error(transparent)]
    Model(#[from] ModelError),
}
