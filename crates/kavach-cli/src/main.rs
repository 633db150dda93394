use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kavach_core::backend::{Backend, RealBackend};
use kavach_core::detector::DetectorConfig;
use kavach_core::error::{ModelError, TrainError};
use kavach_core::model::IsolationForestModel;
use kavach_core::process::SystemProcessController;
use kavach_core::risk::RiskIntegratorConfig;
use kavach_core::trainer::{Trainer, TrainerConfig};

#[derive(Parser, Debug)]
#[command(
    name = "kavach",
    about = "Behavioral ransomware early-warning: train a baseline, then watch for anomalies",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fit a baseline model from observed (or synthetic) benign behavior.
    Train {
        #[arg(long, default_value = "kavach_model.json")]
        model_path: PathBuf,
        #[arg(long, default_value_t = 60.0)]
        duration: f64,
        #[arg(long, default_value_t = 10.0)]
        window_size: f64,
        #[arg(long, default_value_t = 0.05)]
        contamination: f64,
        #[arg(long)]
        watch_paths: Vec<PathBuf>,
    },
    /// Watch the filesystem and flag/kill anomalous processes in real time.
    Detect {
        #[arg(long, default_value = "kavach_model.json")]
        model_path: PathBuf,
        #[arg(long, default_value_t = 15.0)]
        window_size: f64,
        #[arg(long, default_value_t = -0.5)]
        threshold: f64,
        #[arg(long)]
        watch_paths: Vec<PathBuf>,
    },
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kavach=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Train {
            model_path,
            duration,
            window_size,
            contamination,
            watch_paths,
        } => run_train(model_path, duration, window_size, contamination, watch_paths),
        Commands::Detect {
            model_path,
            window_size,
            threshold,
            watch_paths,
        } => run_detect(model_path, window_size, threshold, watch_paths),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            ExitCode::from(1)
        }
    }
}

fn run_train(
    model_path: PathBuf,
    duration: f64,
    window_size: f64,
    contamination: f64,
    watch_paths: Vec<PathBuf>,
) -> anyhow::Result<ExitCode> {
    let config = TrainerConfig {
        model_path,
        duration_secs: duration,
        window_size_secs: window_size,
        contamination,
        watch_paths: if watch_paths.is_empty() {
            None
        } else {
            Some(watch_paths)
        },
        ..TrainerConfig::default()
    };

    let trainer = Trainer::new(config);
    match trainer.run() {
        Ok(_) => {
            info!("training complete");
            Ok(ExitCode::SUCCESS)
        }
        Err(TrainError::NoSamples) => {
            error!("no samples were collected; cannot train a baseline model");
            Ok(ExitCode::from(1))
        }
        Err(err) => {
            error!("training failed: {err}");
            Ok(ExitCode::from(1))
        }
    }
}

fn run_detect(
    model_path: PathBuf,
    window_size: f64,
    threshold: f64,
    watch_paths: Vec<PathBuf>,
) -> anyhow::Result<ExitCode> {
    let model = match IsolationForestModel::load(&model_path) {
        Ok(model) => model,
        Err(ModelError::NotFound(path)) => {
            error!("model file not found: {}", path.display());
            return Ok(ExitCode::from(1));
        }
        Err(err) => {
            error!("failed to load model: {err}");
            return Ok(ExitCode::from(1));
        }
    };

    let detector_config = DetectorConfig {
        window_size_secs: window_size,
        threshold,
        ..DetectorConfig::default()
    };

    let controller = Arc::new(SystemProcessController::new());
    let backend = Arc::new(RealBackend::new(
        model,
        detector_config,
        controller,
        RiskIntegratorConfig::default(),
    ));

    let paths = if watch_paths.is_empty() {
        kavach_core::event::default_watch_paths()
    } else {
        watch_paths
    };

    backend.start(paths, true)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_handler = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        interrupted_handler.store(true, Ordering::SeqCst);
    })?;

    info!("detector running, press Ctrl+C to stop");
    while !interrupted.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(500));
        let (risk, metrics) = backend.poll();
        info!(risk, scenario = ?metrics.scenario, "status");
    }

    backend.stop();
    info!("detector stopped");
    Ok(ExitCode::from(130))
}
