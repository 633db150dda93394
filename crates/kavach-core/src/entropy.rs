//! Entropy primitives — statistical properties of byte sequences.
//!
//! RESPONSIBILITIES:
//! - Compute Shannon entropy over byte distributions.
//! - Provide normalized variants for downstream composition.
//! - Bound disk reads when sampling a file's entropy on the event path.
//!
//! NON-RESPONSIBILITIES:
//! - No classification or thresholds — see `detector.rs`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Compute Shannon entropy (in bits) of a byte slice.
///
/// Range:
/// - 0.0 → perfectly uniform (all bytes identical)
/// - 8.0 → maximum entropy (uniform distribution)
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut frequency = [0u64; 256];

    for &byte in data {
        frequency[byte as usize] += 1;
    }

    let len = data.len() as f64;
    let mut entropy = 0.0;

    for &count in &frequency {
        if count > 0 {
            let p = count as f64 / len;
            entropy -= p * p.log2();
        }
    }

    entropy
}

/// Compute normalized Shannon entropy in range [0.0, 1.0].
pub fn normalized_entropy(data: &[u8]) -> f64 {
    shannon_entropy(data) / 8.0
}

/// Reads at most `sample_size` bytes from `path` and returns their Shannon
/// entropy. Returns `None` if the file cannot be opened or read at all
/// (deleted between event and read, permission denied, etc.) — callers
/// treat a missing sample as "exclude from the mean", not as zero entropy.
pub fn sample_entropy(path: &Path, sample_size: usize) -> Option<f64> {
    let mut file = File::open(path).ok()?;
    let mut buf = vec![0u8; sample_size];
    let mut total_read = 0;
    loop {
        match file.read(&mut buf[total_read..]) {
            Ok(0) => break,
            Ok(n) => {
                total_read += n;
                if total_read >= buf.len() {
                    break;
                }
            }
            Err(_) => return None,
        }
    }
    if total_read == 0 {
        return None;
    }
    buf.truncate(total_read);
    Some(shannon_entropy(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn zero_entropy_for_uniform_data() {
        let data = vec![42u8; 1024];
        assert_eq!(shannon_entropy(&data), 0.0);
    }

    #[test]
    fn high_entropy_for_random_like_data() {
        let data: Vec<u8> = (0..=255).collect();
        let e = shannon_entropy(&data);
        assert!(e > 7.0);
    }

    #[test]
    fn normalized_entropy_in_unit_range() {
        let data = b"some test data";
        let e = normalized_entropy(data);
        assert!((0.0..=1.0).contains(&e));
    }

    #[test]
    fn sample_entropy_caps_at_sample_size() {
        let mut path = std::env::temp_dir();
        path.push(format!("kavach-entropy-test-{}.bin", std::process::id()));
        let data: Vec<u8> = (0..=255u8).cycle().take(100_000).collect();
        {
            let mut f = File::create(&path).unwrap();
            f.write_all(&data).unwrap();
        }
        let e = sample_entropy(&path, 4096).expect("entropy sample");
        assert!(e > 7.0);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn sample_entropy_missing_file_is_none() {
        let path = Path::new("/no/such/kavach-entropy-file");
        assert_eq!(sample_entropy(path, 4096), None);
    }
}
