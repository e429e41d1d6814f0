//! Retention-based cleanup of managed artifact directories.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, instrument, warn};

/// Summary of one sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub removed: usize,
    /// Files that matched but could not be deleted (path, error).
    pub failures: Vec<(PathBuf, String)>,
}

/// Deletes files older than `retention` whose name ends in one of `suffixes`.
#[derive(Debug, Clone)]
pub struct ArtifactSweeper {
    dirs: Vec<PathBuf>,
    suffixes: Vec<String>,
    retention: Duration,
}

impl ArtifactSweeper {
    pub fn new(dirs: Vec<PathBuf>, suffixes: Vec<String>, retention: Duration) -> Self {
        Self {
            dirs,
            suffixes,
            retention,
        }
    }

    /// Sweep every directory. Missing directories are ignored; subdirectories
    /// are not descended into.
    #[instrument(skip_all, fields(dirs = self.dirs.len(), retention_secs = self.retention.as_secs()))]
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let now = SystemTime::now();

        for dir in &self.dirs {
            self.sweep_dir(dir, now, &mut report).await;
        }

        if report.removed > 0 || !report.failures.is_empty() {
            info!(
                removed = report.removed,
                failures = report.failures.len(),
                "artifact sweep completed"
            );
        }
        report
    }

    async fn sweep_dir(&self, dir: &Path, now: SystemTime, report: &mut SweepReport) {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(_) => return,
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "failed to read directory entry");
                    break;
                }
            };

            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !self.suffixes.iter().any(|s| name.ends_with(s.as_str())) {
                continue;
            }

            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }

            let age = meta
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < self.retention {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "removed old artifact");
                    report.removed += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove old artifact");
                    report.failures.push((path, e.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn suffixes() -> Vec<String> {
        vec![".png".into(), ".pdf".into()]
    }

    #[tokio::test]
    async fn removes_matching_files_past_retention() {
        let dir = std::env::temp_dir().join(format!("rb-sweep-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a_1.png"), b"x").unwrap();
        std::fs::write(dir.join("cdph_a.pdf"), b"x").unwrap();
        std::fs::write(dir.join("notes.txt"), b"x").unwrap();

        let sweeper = ArtifactSweeper::new(vec![dir.clone()], suffixes(), Duration::ZERO);
        let report = sweeper.sweep().await;

        assert_eq!(report.removed, 2);
        assert!(dir.join("notes.txt").exists());
        assert!(!dir.join("a_1.png").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn keeps_recent_files() {
        let dir = std::env::temp_dir().join(format!("rb-sweep-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a_1.png"), b"x").unwrap();

        let sweeper =
            ArtifactSweeper::new(vec![dir.clone()], suffixes(), Duration::from_secs(3600));
        let report = sweeper.sweep().await;

        assert_eq!(report.removed, 0);
        assert!(dir.join("a_1.png").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_directory_is_ignored() {
        let dir = std::env::temp_dir().join(format!("rb-sweep-missing-{}", Uuid::now_v7()));
        let sweeper = ArtifactSweeper::new(vec![dir], suffixes(), Duration::ZERO);
        let report = sweeper.sweep().await;
        assert_eq!(report.removed, 0);
        assert!(report.failures.is_empty());
    }
}
