//! Stateful real-time anomaly detector: combines the feature engine and the
//! baseline model into a single `process()` entry point.
//!
//! Does not perform any response action (killing processes, alert
//! dispatch). Response policy belongs to `risk.rs`.

use crate::event::FileEvent;
use crate::features::{FeatureEngine, FeatureVector};
use crate::model::IsolationForestModel;
use crate::window::WindowBuffer;
use tracing::warn;

/// Emitted when a processed event pushes the current window into anomaly
/// territory.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub score: f64,
    pub features: FeatureVector,
    pub pid: Option<u32>,
    pub timestamp: f64,
}

pub struct DetectorConfig {
    pub window_size_secs: f64,
    pub threshold: f64,
    pub min_events: usize,
    pub entropy_sample_size: usize,
    pub max_entropy_files: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_size_secs: 15.0,
            threshold: -0.5,
            min_events: 5,
            entropy_sample_size: 4096,
            max_entropy_files: 10,
        }
    }
}

/// Stateful detector: owns a `WindowBuffer`, a `FeatureEngine`, and a loaded
/// `IsolationForestModel`.
pub struct Detector {
    window: WindowBuffer,
    engine: FeatureEngine,
    model: IsolationForestModel,
    threshold: f64,
    min_events: usize,
}

impl Detector {
    pub fn new(model: IsolationForestModel, config: DetectorConfig) -> Self {
        tracing::info!(
            window_secs = config.window_size_secs,
            threshold = config.threshold,
            min_events = config.min_events,
            "detector initialised"
        );
        Self {
            window: WindowBuffer::new(config.window_size_secs),
            engine: FeatureEngine::new(config.entropy_sample_size, config.max_entropy_files),
            model,
            threshold: config.threshold,
            min_events: config.min_events,
        }
    }

    /// Ingests a single `FileEvent` and returns an `Alert` if the resulting
    /// window scores as anomalous. Returns `None` silently when the window
    /// has fewer than `min_events` events — not enough data to judge.
    pub fn process(&mut self, event: FileEvent) -> Option<Alert> {
        let pid = event.pid;
        let timestamp = event.timestamp;
        self.window.push(event);

        if self.window.len() < self.min_events {
            return None;
        }

        let features = self.engine.extract(&self.window);
        let score = self.model.score(&features);
        let is_anomaly = score < self.threshold;

        if is_anomaly {
            warn!(pid = ?pid, score, ?features, "anomaly detected");
            Some(Alert {
                score,
                features,
                pid,
                timestamp,
            })
        } else {
            None
        }
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::features::FeatureVector;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::path::PathBuf;

    fn benign_samples(n: usize) -> Vec<FeatureVector> {
        let mut rng = StdRng::seed_from_u64(11);
        (0..n)
            .map(|_| FeatureVector {
                files_modified_per_sec: rng.gen_range(0.0..2.0),
                rename_rate: rng.gen_range(0.0..0.3),
                unique_files_touched: rng.gen_range(0.0..5.0),
                extension_change_rate: rng.gen_range(0.0..0.1),
                entropy_change: rng.gen_range(4.0..5.5),
            })
            .collect()
    }

    fn detector() -> Detector {
        let samples = benign_samples(200);
        let model = IsolationForestModel::train(&samples, 50, 128, 0.05, 1).unwrap();
        Detector::new(model, DetectorConfig::default())
    }

    #[test]
    fn returns_none_below_min_events() {
        let mut d = detector();
        for i in 0..4 {
            let result = d.process(FileEvent::new(
                i as f64,
                EventKind::Modify,
                PathBuf::from(format!("/tmp/f{i}")),
            ));
            assert_eq!(result, None);
        }
    }

    #[test]
    fn benign_stream_does_not_alert() {
        let mut d = detector();
        let mut last = None;
        for i in 0..20 {
            last = d.process(FileEvent::new(
                i as f64 * 1.5,
                EventKind::Modify,
                PathBuf::from(format!("/tmp/benign{i}")),
            ));
        }
        assert_eq!(last, None);
    }

    #[test]
    fn ransomware_burst_triggers_alert() {
        let mut d = detector();
        let mut saw_alert = false;
        for i in 0..60 {
            let t = i as f64 * 0.05;
            let path = format!("/tmp/file{i}.docx.locked");
            if let Some(_alert) = d.process(FileEvent::new(t, EventKind::Rename, PathBuf::from(path))) {
                saw_alert = true;
                break;
            }
        }
        assert!(saw_alert, "expected a burst of renames with extension changes to trigger an alert");
    }
}
