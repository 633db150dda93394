//! Capture-backend abstraction.
//!
//! Generalizes the event-capture/response lifecycle behind one trait so
//! callers (the CLI, or any future UI) don't need to know whether they are
//! driving a real filesystem watch or a test fixture. The core ships only
//! `RealBackend`; `MockBackend` is a test-only fixture, never compiled into
//! the shipped binary.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use crate::detector::{Detector, DetectorConfig};
use crate::error::MonitorError;
use crate::event::{EventSource, EventSourceHandle};
use crate::model::IsolationForestModel;
use crate::process::ProcessController;
use crate::risk::{RiskIntegrator, RiskIntegratorConfig, RiskMetrics, ResponseRecord};

/// Lifecycle and query surface shared by every capture backend.
pub trait Backend: Send + Sync {
    fn start(&self, paths: Vec<PathBuf>, recursive: bool) -> Result<(), MonitorError>;
    fn stop(&self);
    /// Current smoothed risk score plus the supporting metrics snapshot.
    fn poll(&self) -> (f64, RiskMetrics);
    fn logs(&self) -> Vec<String>;
    fn flagged(&self) -> Vec<ResponseRecord>;
}

/// Production backend: a live `EventSource` feeding a `RiskIntegrator`.
pub struct RealBackend {
    integrator: Arc<RiskIntegrator>,
    handle: std::sync::Mutex<Option<EventSourceHandle>>,
}

impl RealBackend {
    pub fn new(
        model: IsolationForestModel,
        detector_config: DetectorConfig,
        controller: Arc<dyn ProcessController>,
        risk_config: RiskIntegratorConfig,
    ) -> Self {
        let threshold = detector_config.threshold;
        let detector = Detector::new(model, detector_config);
        let integrator = Arc::new(RiskIntegrator::new(detector, controller, threshold, risk_config));
        Self {
            integrator,
            handle: std::sync::Mutex::new(None),
        }
    }
}

impl Backend for RealBackend {
    fn start(&self, paths: Vec<PathBuf>, recursive: bool) -> Result<(), MonitorError> {
        let mut guard = self.handle.lock().unwrap();
        if guard.is_some() {
            return Ok(());
        }

        self.integrator.start();
        let integrator = Arc::clone(&self.integrator);
        let callback = Arc::new(move |event| integrator.on_event(event));

        match EventSource::start(callback, paths, recursive) {
            Ok(handle) => {
                info!("real backend started");
                *guard = Some(handle);
                Ok(())
            }
            Err(err) => {
                error!("failed to start real backend: {err}");
                self.integrator.stop();
                Err(err)
            }
        }
    }

    fn stop(&self) {
        let mut guard = self.handle.lock().unwrap();
        if let Some(handle) = guard.take() {
            handle.stop();
        }
        self.integrator.stop();
    }

    fn poll(&self) -> (f64, RiskMetrics) {
        self.integrator.risk_and_metrics()
    }

    fn logs(&self) -> Vec<String> {
        self.integrator.recent_logs()
    }

    fn flagged(&self) -> Vec<ResponseRecord> {
        self.integrator.flagged_processes()
    }
}
