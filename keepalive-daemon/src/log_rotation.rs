//! Size-based rotation for the daemon log files.
//!
//! `daemon.log` → `daemon.log.1` → … → `daemon.log.<max_files>`; the oldest
//! generation is dropped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// When and how far to rotate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_bytes: u64,
    pub max_files: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_files: 5,
        }
    }
}

impl RotationPolicy {
    /// Rotate `log_path` if it has reached `max_bytes`.
    ///
    /// Returns `true` if a rotation happened. A missing file is not an error.
    pub fn rotate_if_needed(&self, log_path: &Path) -> io::Result<bool> {
        let size = match fs::metadata(log_path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        if size < self.max_bytes {
            return Ok(false);
        }

        let oldest = generation(log_path, self.max_files);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.max_files).rev() {
            let src = generation(log_path, n);
            if src.exists() {
                fs::rename(&src, generation(log_path, n + 1))?;
            }
        }
        fs::rename(log_path, generation(log_path, 1))?;
        fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(log_path)?;
        Ok(true)
    }
}

/// Rotate both daemon logs under `home`. Failures are logged, never raised.
pub fn rotate_logs(home: &Path) {
    let policy = RotationPolicy::default();
    for log_path in [
        crate::paths::stdout_log_path(home),
        crate::paths::stderr_log_path(home),
    ] {
        match policy.rotate_if_needed(&log_path) {
            Ok(true) => tracing::info!(path = %log_path.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(path = %log_path.display(), error = %err, "log rotation failed")
            }
        }
    }
}

fn generation(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(crate::paths::DAEMON_STDOUT_LOG);
    base.with_file_name(format!("{name}.{n}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SMALL: RotationPolicy = RotationPolicy {
        max_bytes: 64,
        max_files: 3,
    };

    fn write_bytes(path: &Path, len: usize, fill: u8) {
        fs::write(path, vec![fill; len]).expect("write log");
    }

    #[test]
    fn file_under_threshold_is_left_alone() {
        let dir = TempDir::new().expect("dir");
        let log = dir.path().join("daemon.log");
        write_bytes(&log, 10, b'a');
        assert!(!SMALL.rotate_if_needed(&log).expect("rotate"));
        assert!(!generation(&log, 1).exists());
    }

    #[test]
    fn oversized_file_moves_to_first_generation() {
        let dir = TempDir::new().expect("dir");
        let log = dir.path().join("daemon.log");
        write_bytes(&log, 64, b'a');

        assert!(SMALL.rotate_if_needed(&log).expect("rotate"));
        assert_eq!(fs::metadata(&log).expect("live").len(), 0);
        assert_eq!(fs::read(generation(&log, 1)).expect("gen 1").len(), 64);
    }

    #[test]
    fn generations_are_capped_and_shifted() {
        let dir = TempDir::new().expect("dir");
        let log = dir.path().join("daemon-err.log");
        for round in 0..5u8 {
            write_bytes(&log, 64, b'0' + round);
            SMALL.rotate_if_needed(&log).expect("rotate");
        }

        assert!(!generation(&log, 4).exists());
        // Newest rotated content sits in .1, oldest surviving in .3.
        assert_eq!(fs::read(generation(&log, 1)).expect("gen 1")[0], b'4');
        assert_eq!(fs::read(generation(&log, 3)).expect("gen 3")[0], b'2');
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = TempDir::new().expect("dir");
        assert!(!SMALL
            .rotate_if_needed(&dir.path().join("absent.log"))
            .expect("rotate"));
    }
}
