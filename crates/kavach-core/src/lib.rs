//! Core detection pipeline for Kavach-R: behavioral ransomware early-warning.
//!
//! An `EventSource` feeds a `WindowBuffer`; `FeatureEngine` turns the window
//! into a fixed feature vector; `Detector` scores it against a trained
//! `IsolationForestModel`; `RiskIntegrator` smooths alerts into a stable
//! risk signal and gates process response through `ProcessController`.
//! `Trainer` produces the model file `Detector` loads at startup.

pub mod backend;
pub mod config;
pub mod detector;
pub mod entropy;
pub mod error;
pub mod event;
pub mod features;
pub mod model;
pub mod process;
pub mod risk;
pub mod trainer;
pub mod window;

pub use backend::{Backend, RealBackend};
pub use detector::{Alert, Detector, DetectorConfig};
pub use error::{ModelError, MonitorError, TrainError};
pub use event::{EventKind, EventSource, EventSourceHandle, FileEvent};
pub use features::{FeatureEngine, FeatureVector};
pub use model::IsolationForestModel;
pub use process::{ProcessController, ProcessInfo, SystemProcessController};
pub use risk::{ResponseRecord, ResponseStatus, RiskIntegrator, RiskIntegratorConfig, RiskMetrics, Scenario};
pub use trainer::{Trainer, TrainerConfig};
pub use window::WindowBuffer;
