//! Behavioral feature extraction: turns a `WindowBuffer` of recent
//! `FileEvent`s into the fixed five-element feature vector the baseline
//! model was trained on.
//!
//! Feature order is load-bearing: training and scoring both walk
//! `FeatureVector::as_row()` in declaration order.

use std::collections::HashSet;

use crate::entropy::sample_entropy;
use crate::event::{EventKind, FileEvent};
use crate::window::WindowBuffer;

/// Five-element behavioral feature vector for a single window snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub files_modified_per_sec: f64,
    pub rename_rate: f64,
    pub unique_files_touched: f64,
    pub extension_change_rate: f64,
    pub entropy_change: f64,
}

impl FeatureVector {
    pub const NAMES: [&'static str; 5] = [
        "files_modified_per_sec",
        "rename_rate",
        "unique_files_touched",
        "extension_change_rate",
        "entropy_change",
    ];

    pub fn zero() -> Self {
        Self {
            files_modified_per_sec: 0.0,
            rename_rate: 0.0,
            unique_files_touched: 0.0,
            extension_change_rate: 0.0,
            entropy_change: 0.0,
        }
    }

    /// Row order matching `NAMES`, for model consumption.
    pub fn as_row(&self) -> [f64; 5] {
        [
            self.files_modified_per_sec,
            self.rename_rate,
            self.unique_files_touched,
            self.extension_change_rate,
            self.entropy_change,
        ]
    }
}

pub struct FeatureEngine {
    entropy_sample_size: usize,
    max_entropy_files: usize,
}

impl FeatureEngine {
    pub fn new(entropy_sample_size: usize, max_entropy_files: usize) -> Self {
        Self {
            entropy_sample_size,
            max_entropy_files,
        }
    }

    /// Extracts a `FeatureVector` from the current contents of `window`.
    /// An empty window yields the zero vector. Elapsed time is floored at
    /// 1.0s so a single event in a fraction of a second never produces an
    /// implausible per-second rate spike.
    pub fn extract(&self, window: &WindowBuffer) -> FeatureVector {
        if window.is_empty() {
            return FeatureVector::zero();
        }

        let events: Vec<&FileEvent> = window.iter().collect();
        let elapsed = (events.last().unwrap().timestamp - events.first().unwrap().timestamp).max(1.0);

        let modify_count = events.iter().filter(|e| e.kind == EventKind::Modify).count() as f64;
        let rename_events: Vec<&&FileEvent> =
            events.iter().filter(|e| e.kind == EventKind::Rename).collect();
        let rename_count = rename_events.len();

        let unique_files: HashSet<_> = events.iter().map(|e| &e.path).collect();

        let ext_change_count = Self::count_extension_changes(&rename_events);
        let extension_change_rate = if rename_count > 0 {
            ext_change_count as f64 / rename_count as f64
        } else {
            0.0
        };

        let entropy_change = self.mean_entropy_of_recent_files(&events);

        FeatureVector {
            files_modified_per_sec: modify_count / elapsed,
            rename_rate: rename_count as f64 / elapsed,
            unique_files_touched: unique_files.len() as f64,
            extension_change_rate,
            entropy_change,
        }
    }

    /// A rename event whose new basename has two or more interior dots
    /// (e.g. `report.docx.locked`) is treated as an extension change. We
    /// only have the destination path, not the original, so this is a
    /// heuristic rather than an exact diff.
    fn count_extension_changes(rename_events: &[&&FileEvent]) -> usize {
        rename_events
            .iter()
            .filter(|e| {
                let base = e.path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                base.split('.').count() >= 3
            })
            .count()
    }

    fn mean_entropy_of_recent_files(&self, events: &[&FileEvent]) -> f64 {
        let mut seen = HashSet::new();
        let mut paths = Vec::new();
        for event in events.iter().rev() {
            if event.kind == EventKind::Modify && seen.insert(&event.path) {
                paths.push(event.path.clone());
                if paths.len() >= self.max_entropy_files {
                    break;
                }
            }
        }

        if paths.is_empty() {
            return 0.0;
        }

        let samples: Vec<f64> = paths
            .iter()
            .filter_map(|p| sample_entropy(p, self.entropy_sample_size))
            .filter(|e| *e > 0.0)
            .collect();

        if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<f64>() / samples.len() as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn ev(t: f64, kind: EventKind, path: &str) -> FileEvent {
        FileEvent::new(t, kind, PathBuf::from(path))
    }

    #[test]
    fn empty_window_yields_zero_vector() {
        let window = WindowBuffer::new(10.0);
        let engine = FeatureEngine::new(4096, 10);
        assert_eq!(engine.extract(&window), FeatureVector::zero());
    }

    #[test]
    fn rates_never_nan_with_single_event() {
        let mut window = WindowBuffer::new(10.0);
        window.push(ev(0.0, EventKind::Modify, "/tmp/a"));
        let engine = FeatureEngine::new(4096, 10);
        let f = engine.extract(&window);
        assert!(!f.files_modified_per_sec.is_nan());
        assert!(!f.rename_rate.is_nan());
        assert!(!f.extension_change_rate.is_nan());
        assert_eq!(f.files_modified_per_sec, 1.0); // elapsed floored to 1.0
    }

    #[test]
    fn extension_change_rate_zero_with_no_renames() {
        let mut window = WindowBuffer::new(10.0);
        window.push(ev(0.0, EventKind::Modify, "/tmp/a"));
        window.push(ev(1.0, EventKind::Modify, "/tmp/b"));
        let engine = FeatureEngine::new(4096, 10);
        let f = engine.extract(&window);
        assert_eq!(f.extension_change_rate, 0.0);
    }

    #[test]
    fn extension_change_rate_counts_dotted_renames() {
        let mut window = WindowBuffer::new(10.0);
        window.push(ev(0.0, EventKind::Rename, "/tmp/report.docx.locked"));
        window.push(ev(1.0, EventKind::Rename, "/tmp/plain_rename"));
        let engine = FeatureEngine::new(4096, 10);
        let f = engine.extract(&window);
        assert_eq!(f.extension_change_rate, 0.5);
    }

    #[test]
    fn unique_files_touched_deduplicates_paths() {
        let mut window = WindowBuffer::new(10.0);
        window.push(ev(0.0, EventKind::Modify, "/tmp/a"));
        window.push(ev(1.0, EventKind::Modify, "/tmp/a"));
        window.push(ev(2.0, EventKind::Modify, "/tmp/b"));
        let engine = FeatureEngine::new(4096, 10);
        let f = engine.extract(&window);
        assert_eq!(f.unique_files_touched, 2.0);
    }

    #[test]
    fn entropy_mean_over_real_files() {
        let mut dir = std::env::temp_dir();
        dir.push(format!("kavach-features-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("random.bin");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            let data: Vec<u8> = (0..=255u8).cycle().take(8192).collect();
            f.write_all(&data).unwrap();
        }

        let mut window = WindowBuffer::new(10.0);
        window.push(ev(0.0, EventKind::Modify, path.to_str().unwrap()));
        let engine = FeatureEngine::new(4096, 10);
        let f = engine.extract(&window);
        assert!(f.entropy_change > 7.0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn extraction_does_not_mutate_window() {
        let mut window = WindowBuffer::new(10.0);
        window.push(ev(0.0, EventKind::Modify, "/tmp/a"));
        let engine = FeatureEngine::new(4096, 10);
        let before = window.len();
        engine.extract(&window);
        engine.extract(&window);
        assert_eq!(window.len(), before);
    }
}
