//! Offline baseline training: collects benign feature vectors (live, or
//! synthetic as a fallback) and fits a `IsolationForestModel`.
//!
//! Mirrors `kavach_main.py::cmd_train`'s try-live-then-fall-back-to-synthetic
//! structure, narrated through `tracing` instead of `print`.

use std::path::PathBuf;
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::error::TrainError;
use crate::event::{default_watch_paths, EventSource};
use crate::features::{FeatureEngine, FeatureVector};
use crate::model::IsolationForestModel;
use crate::window::WindowBuffer;

pub struct TrainerConfig {
    pub model_path: PathBuf,
    pub duration_secs: f64,
    pub window_size_secs: f64,
    pub contamination: f64,
    pub watch_paths: Option<Vec<PathBuf>>,
    pub seed: u64,
    pub num_trees: usize,
    pub subsample_size: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model.joblib"),
            duration_secs: 60.0,
            window_size_secs: 10.0,
            contamination: 0.05,
            watch_paths: None,
            seed: 42,
            num_trees: crate::model::DEFAULT_NUM_TREES,
            subsample_size: crate::model::DEFAULT_SUBSAMPLE_SIZE,
        }
    }
}

/// 30% of synthetic samples are idle-biased (tighter ranges near zero).
const IDLE_BIAS_FRACTION: f64 = 0.3;

pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// Runs the full collect-then-fit-then-persist pipeline.
    pub fn run(&self) -> Result<IsolationForestModel, TrainError> {
        let samples = self.collect_samples();
        if samples.is_empty() {
            return Err(TrainError::NoSamples);
        }

        info!(count = samples.len(), "fitting baseline model");
        let model = IsolationForestModel::train(
            &samples,
            self.config.num_trees,
            self.config.subsample_size,
            self.config.contamination,
            self.config.seed,
        )
        .map_err(TrainError::Model)?;

        model.save(&self.config.model_path).map_err(TrainError::Model)?;
        info!(path = ?self.config.model_path, "model saved");
        Ok(model)
    }

    fn collect_samples(&self) -> Vec<FeatureVector> {
        let paths = self
            .config
            .watch_paths
            .clone()
            .unwrap_or_else(default_watch_paths);

        match self.collect_live_samples(paths) {
            Ok(samples) if !samples.is_empty() => samples,
            Ok(_) => {
                warn!("no live events observed during training window; generating synthetic normal data for training");
                self.generate_synthetic_normal()
            }
            Err(err) => {
                warn!("monitor unavailable ({err}); generating synthetic normal data for training");
                self.generate_synthetic_normal()
            }
        }
    }

    fn collect_live_samples(
        &self,
        paths: Vec<PathBuf>,
    ) -> Result<Vec<FeatureVector>, crate::error::MonitorError> {
        info!("monitor module found — collecting live events...");
        let window = Arc::new(std::sync::Mutex::new(WindowBuffer::new(self.config.window_size_secs)));
        let (tx, rx) = channel::<()>();

        let window_for_callback = Arc::clone(&window);
        let callback = Arc::new(move |event| {
            let mut w = window_for_callback.lock().unwrap();
            w.push(event);
            let _ = tx.send(());
        });

        let handle = EventSource::start(callback, paths, true)?;

        let engine = FeatureEngine::new(4096, 10);
        let mut samples = Vec::new();
        let deadline = Instant::now() + Duration::from_secs_f64(self.config.duration_secs);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match rx.recv_timeout(remaining.min(Duration::from_millis(500))) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => {
                    let w = window.lock().unwrap();
                    if !w.is_empty() {
                        samples.push(engine.extract(&w));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        handle.stop();
        Ok(samples)
    }

    fn generate_synthetic_normal(&self) -> Vec<FeatureVector> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let count = 500;
        (0..count)
            .map(|_| {
                if rng.gen::<f64>() < IDLE_BIAS_FRACTION {
                    FeatureVector {
                        files_modified_per_sec: rng.gen_range(0.0..0.5),
                        rename_rate: rng.gen_range(0.0..0.05),
                        unique_files_touched: rng.gen_range(1.0..3.0),
                        extension_change_rate: rng.gen_range(0.0..0.01),
                        entropy_change: rng.gen_range(0.0..1.0),
                    }
                } else {
                    FeatureVector {
                        files_modified_per_sec: rng.gen_range(0.0..5.0),
                        rename_rate: rng.gen_range(0.0..0.5),
                        unique_files_touched: rng.gen_range(1.0..15.0),
                        extension_change_rate: rng.gen_range(0.0..0.05),
                        entropy_change: rng.gen_range(0.0..6.0),
                    }
                }
            })
            .collect()
    }
}

/// Exposed for the round-trip scenario test: 500 synthetic benign vectors
/// with a fixed seed, independent of any `Trainer` instance.
pub fn synthetic_benign_samples(seed: u64, count: usize) -> Vec<FeatureVector> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| FeatureVector {
            files_modified_per_sec: rng.gen_range(0.0..5.0),
            rename_rate: rng.gen_range(0.0..0.5),
            unique_files_touched: rng.gen_range(1.0..15.0),
            extension_change_rate: rng.gen_range(0.0..0.05),
            entropy_change: rng.gen_range(0.0..6.0),
        })
        .collect()
}
