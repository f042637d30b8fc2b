//! Retention sweeper
//!
//! Deletes chunk files whose modification time has fallen behind the
//! retention horizon, then prunes stream directories left empty. Runs on an
//! hourly wall-clock ticker and shares no locks with the writers: chunks are
//! sealed under fresh names and never reopened, and the reader tolerates a
//! file disappearing mid-query.

use crate::lifecycle::ShutdownToken;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Outcome of a single sweep
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub removed_files: usize,
    pub removed_bytes: u64,
}

/// Run the sweeper until shutdown. `retention_days` sets the horizon.
pub async fn run_sweeper(base: PathBuf, retention_days: u32, mut token: ShutdownToken) {
    let mut ticker = tokio::time::interval(Duration::from_secs(3600));
    // interval fires immediately; skip the startup tick
    ticker.tick().await;

    tracing::info!(retention_days, "Retention sweeper started");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                tracing::info!("Retention sweeper shutting down");
                return;
            }
            _ = ticker.tick() => {
                let cutoff = SystemTime::now()
                    - Duration::from_secs(u64::from(retention_days) * 24 * 3600);
                let stats = sweep_once(&base, cutoff);
                if stats.removed_files > 0 {
                    tracing::info!(
                        files = stats.removed_files,
                        bytes = stats.removed_bytes,
                        "Retention sweep complete"
                    );
                } else {
                    tracing::debug!("Retention sweep complete, nothing to delete");
                }
            }
        }
    }
}

/// Delete every regular file under `base` older than `cutoff`, then prune
/// empty directories. Deletions are independent; an interrupted sweep simply
/// resumes at the next tick.
pub fn sweep_once(base: &Path, cutoff: SystemTime) -> SweepStats {
    let mut stats = SweepStats::default();
    sweep_dir(base, cutoff, &mut stats);
    prune_empty_dirs(base);
    stats
}

fn sweep_dir(dir: &Path, cutoff: SystemTime, stats: &mut SweepStats) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            sweep_dir(&path, cutoff, stats);
            continue;
        }

        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(_) => continue,
        };
        let modified = match meta.modified() {
            Ok(modified) => modified,
            Err(_) => continue,
        };

        if modified < cutoff {
            match fs::remove_file(&path) {
                Ok(()) => {
                    stats.removed_files += 1;
                    stats.removed_bytes += meta.len();
                    tracing::debug!(path = ?path, "Deleted expired chunk file");
                }
                Err(e) => {
                    tracing::warn!(path = ?path, error = %e, "Failed to delete expired file");
                }
            }
        }
    }
}

/// Remove directories that are now empty, bottom-up. The storage root itself
/// is kept.
fn prune_empty_dirs(base: &Path) {
    fn prune(dir: &Path, is_root: bool) -> bool {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return false,
        };

        let mut empty = true;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if !prune(&path, false) {
                    empty = false;
                }
            } else {
                empty = false;
            }
        }

        if empty && !is_root {
            if fs::remove_dir(dir).is_ok() {
                tracing::debug!(path = ?dir, "Removed empty stream directory");
                return true;
            }
            return false;
        }
        empty && is_root
    }

    prune(base, true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sweep_removes_files_past_horizon() {
        let dir = tempdir().unwrap();
        let stream = dir.path().join("service=api");
        fs::create_dir_all(&stream).unwrap();
        fs::write(stream.join("chunk_1_1.log"), b"data\n").unwrap();
        fs::write(stream.join("chunk_1_1.meta"), b"{}").unwrap();

        // Cutoff in the future: everything on disk is older and must go,
        // including the directory left behind.
        let cutoff = SystemTime::now() + Duration::from_secs(60);
        let stats = sweep_once(dir.path(), cutoff);

        assert_eq!(stats.removed_files, 2);
        assert!(stats.removed_bytes > 0);
        assert!(!stream.exists());
        assert!(dir.path().exists());
    }

    #[test]
    fn test_sweep_keeps_files_within_horizon() {
        let dir = tempdir().unwrap();
        let stream = dir.path().join("service=api");
        fs::create_dir_all(&stream).unwrap();
        fs::write(stream.join("chunk_1_1.log"), b"data\n").unwrap();

        // Cutoff in the past: nothing qualifies.
        let cutoff = SystemTime::now() - Duration::from_secs(3600);
        let stats = sweep_once(dir.path(), cutoff);

        assert_eq!(stats, SweepStats::default());
        assert!(stream.join("chunk_1_1.log").exists());
    }

    #[test]
    fn test_nested_empty_dirs_pruned() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        sweep_once(dir.path(), SystemTime::now() - Duration::from_secs(1));

        assert!(!dir.path().join("a").exists());
        assert!(dir.path().exists());
    }

    #[test]
    fn test_sweep_missing_root_is_noop() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("gone");
        let stats = sweep_once(&missing, SystemTime::now());
        assert_eq!(stats, SweepStats::default());
    }
}
