//! Configuration loading: defaults layered with an optional TOML file and
//! `KAVACH_*` environment variables.

use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct DetectSettings {
    pub model_path: String,
    pub window_size_secs: f64,
    pub threshold: f64,
    pub watch_paths: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrainSettings {
    pub model_path: String,
    pub duration_secs: f64,
    pub window_size_secs: f64,
    pub contamination: f64,
    pub watch_paths: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KavachSettings {
    pub detect: DetectSettings,
    pub train: TrainSettings,
}

impl Default for DetectSettings {
    fn default() -> Self {
        Self {
            model_path: "kavach_model.json".to_string(),
            window_size_secs: 15.0,
            threshold: -0.5,
            watch_paths: Vec::new(),
        }
    }
}

impl Default for TrainSettings {
    fn default() -> Self {
        Self {
            model_path: "kavach_model.json".to_string(),
            duration_secs: 60.0,
            window_size_secs: 10.0,
            contamination: 0.05,
            watch_paths: Vec::new(),
        }
    }
}

impl KavachSettings {
    /// Loads settings from (in increasing precedence): built-in defaults,
    /// `./kavach.toml`, `~/.config/kavach/config.toml`, then `KAVACH_*`
    /// environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let global_config_path = dirs::config_dir()
            .map(|mut p| {
                p.push("kavach");
                p.push("config");
                p.to_string_lossy().into_owned()
            })
            .unwrap_or_else(|| ".kavach_config".to_string());

        let builder = Config::builder()
            .set_default("detect.model_path", "kavach_model.json")?
            .set_default("detect.window_size_secs", 15.0)?
            .set_default("detect.threshold", -0.5)?
            .set_default("detect.watch_paths", Vec::<String>::new())?
            .set_default("train.model_path", "kavach_model.json")?
            .set_default("train.duration_secs", 60.0)?
            .set_default("train.window_size_secs", 10.0)?
            .set_default("train.contamination", 0.05)?
            .set_default("train.watch_paths", Vec::<String>::new())?
            .add_source(File::with_name("kavach").required(false))
            .add_source(File::with_name(&global_config_path).required(false))
            .add_source(Environment::with_prefix("KAVACH").separator("__"));

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let detect = DetectSettings::default();
        assert_eq!(detect.threshold, -0.5);
        let train = TrainSettings::default();
        assert_eq!(train.contamination, 0.05);
    }
}
