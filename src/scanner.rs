use crate::config::ScanConfig;
use crate::error::{Result, ScanError};
use crate::ranking::{top_n, FolderSize};
use crate::sizer::{measure_folder, MeasureLimits};
use crate::volumes::{detect_volumes, top_level_folders};
use dashmap::DashMap;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const PROGRESS_EMIT_INTERVAL_MS: u64 = 100;

pub type ProgressReporter = Arc<dyn Fn(ScanProgress) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Enumerating,
    Measuring,
}

#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub phase: ScanPhase,
    pub volumes_total: usize,
    pub folders_total: Option<u64>,
    pub folders_done: u64,
    pub bytes_measured: u64,
    /// Folder whose measurement finished most recently.
    pub current: Option<PathBuf>,
    /// Ranking so far.
    pub leaders: Vec<FolderSize>,
}

impl ScanProgress {
    pub fn starting() -> Self {
        Self {
            phase: ScanPhase::Enumerating,
            volumes_total: 0,
            folders_total: None,
            folders_done: 0,
            bytes_measured: 0,
            current: None,
            leaders: Vec::new(),
        }
    }

    pub fn fraction(&self) -> Option<f32> {
        match self.phase {
            ScanPhase::Enumerating => None,
            ScanPhase::Measuring => {
                let total = self.folders_total?;
                if total == 0 {
                    Some(1.0)
                } else {
                    Some((self.folders_done as f32 / total as f32).clamp(0.0, 1.0))
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub volumes: Vec<PathBuf>,
    /// Volumes whose listing failed.
    pub unreadable: Vec<PathBuf>,
    /// Largest folders, biggest first.
    pub folders: Vec<FolderSize>,
    pub measured_folders: u64,
    pub total_bytes: u64,
    pub duration_ms: u64,
    /// Folders cut short by a time budget.
    pub timed_out: u64,
    /// Folders whose size was extrapolated.
    pub estimated: u64,
    pub errors: u64,
    pub cancelled: bool,
}

/// Shared flag that stops a running scan.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Measures every top-level folder of every volume in parallel and ranks them.
pub struct FolderScanner {
    config: ScanConfig,
    cancel: CancelHandle,
}

impl FolderScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            cancel: CancelHandle::default(),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn emit_progress(reporter: &Option<ProgressReporter>, progress: ScanProgress) {
        if let Some(cb) = reporter {
            cb(progress);
        }
    }

    fn should_emit_progress(last_emit_ms: &AtomicU64, elapsed_ms: u64) -> bool {
        let previous = last_emit_ms.load(Ordering::Relaxed);
        if elapsed_ms.saturating_sub(previous) < PROGRESS_EMIT_INTERVAL_MS {
            return false;
        }

        last_emit_ms
            .compare_exchange(previous, elapsed_ms, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    fn processing_parallelism(&self) -> usize {
        if let Some(threads) = self.config.threads {
            return threads.max(1);
        }
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        (cores * 2).clamp(4, 64)
    }

    fn limits_for_folder(&self, scan_deadline: Option<Instant>) -> MeasureLimits {
        let folder_deadline = self.config.folder_budget.map(|budget| Instant::now() + budget);
        let deadline = match (folder_deadline, scan_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        MeasureLimits {
            mode: self.config.mode,
            sample_limit: self.config.sample_limit,
            deadline,
        }
    }

    /// Run a full scan, reporting progress through `reporter` when given.
    pub fn scan(&self, reporter: Option<ProgressReporter>) -> Result<ScanReport> {
        self.config.validate()?;
        let start = Instant::now();
        let scan_deadline = self.config.scan_budget.map(|budget| start + budget);

        let volumes = if self.config.roots.is_empty() {
            detect_volumes()
        } else {
            self.config.roots.clone()
        };
        if volumes.is_empty() {
            return Err(ScanError::NoVolumes);
        }
        info!(volumes = volumes.len(), mode = ?self.config.mode, "starting folder scan");

        Self::emit_progress(
            &reporter,
            ScanProgress {
                volumes_total: volumes.len(),
                ..ScanProgress::starting()
            },
        );

        let mut unreadable = Vec::new();
        let mut folders = Vec::new();
        for volume in &volumes {
            match top_level_folders(volume, &self.config.skip) {
                Ok(found) => {
                    debug!(volume = %volume.display(), folders = found.len(), "listed volume");
                    folders.extend(found);
                }
                Err(err) => {
                    warn!(error = %err, "skipping unreadable volume");
                    unreadable.push(volume.clone());
                }
            }
        }

        let folders_total = folders.len() as u64;
        let sizes: DashMap<PathBuf, FolderSize> = DashMap::new();
        let folders_done = AtomicU64::new(0);
        let bytes_measured = AtomicU64::new(0);
        let timed_out = AtomicU64::new(0);
        let estimated = AtomicU64::new(0);
        let errors = AtomicU64::new(0);
        let last_emit_ms = AtomicU64::new(0);
        let cancel_flag = &*self.cancel.0;

        Self::emit_progress(
            &reporter,
            ScanProgress {
                phase: ScanPhase::Measuring,
                volumes_total: volumes.len(),
                folders_total: Some(folders_total),
                folders_done: 0,
                bytes_measured: 0,
                current: None,
                leaders: Vec::new(),
            },
        );

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.processing_parallelism())
            .build()?;

        pool.install(|| {
            folders.par_iter().for_each(|folder| {
                if cancel_flag.load(Ordering::Relaxed) {
                    return;
                }

                let limits = self.limits_for_folder(scan_deadline);
                let measure = measure_folder(folder, &limits, cancel_flag);
                let done_now = folders_done.fetch_add(1, Ordering::Relaxed) + 1;

                errors.fetch_add(measure.errors, Ordering::Relaxed);
                if measure.estimated {
                    estimated.fetch_add(1, Ordering::Relaxed);
                }
                if !measure.complete && !cancel_flag.load(Ordering::Relaxed) {
                    timed_out.fetch_add(1, Ordering::Relaxed);
                    debug!(folder = %folder.display(), "time budget exhausted");
                }
                bytes_measured.fetch_add(measure.bytes, Ordering::Relaxed);

                if measure.bytes > 0 || self.config.include_empty {
                    sizes.insert(
                        folder.clone(),
                        FolderSize {
                            path: folder.clone(),
                            bytes: measure.bytes,
                            estimated: measure.estimated,
                            complete: measure.complete,
                        },
                    );
                }

                if reporter.is_some() {
                    let elapsed_ms = start.elapsed().as_millis() as u64;
                    if done_now == folders_total
                        || Self::should_emit_progress(&last_emit_ms, elapsed_ms)
                    {
                        Self::emit_progress(
                            &reporter,
                            ScanProgress {
                                phase: ScanPhase::Measuring,
                                volumes_total: volumes.len(),
                                folders_total: Some(folders_total),
                                folders_done: done_now,
                                bytes_measured: bytes_measured.load(Ordering::Relaxed),
                                current: Some(folder.clone()),
                                leaders: top_n(&sizes, self.config.top),
                            },
                        );
                    }
                }
            });
        });

        let ranked = top_n(&sizes, self.config.top);
        let cancelled = self.cancel.is_cancelled();

        Self::emit_progress(
            &reporter,
            ScanProgress {
                phase: ScanPhase::Measuring,
                volumes_total: volumes.len(),
                folders_total: Some(folders_total),
                folders_done: folders_done.load(Ordering::Relaxed),
                bytes_measured: bytes_measured.load(Ordering::Relaxed),
                current: None,
                leaders: ranked.clone(),
            },
        );

        let report = ScanReport {
            volumes,
            unreadable,
            folders: ranked,
            measured_folders: folders_done.load(Ordering::Relaxed),
            total_bytes: bytes_measured.load(Ordering::Relaxed),
            duration_ms: start.elapsed().as_millis() as u64,
            timed_out: timed_out.load(Ordering::Relaxed),
            estimated: estimated.load(Ordering::Relaxed),
            errors: errors.load(Ordering::Relaxed),
            cancelled,
        };

        info!(
            measured = report.measured_folders,
            timed_out = report.timed_out,
            estimated = report.estimated,
            cancelled = report.cancelled,
            duration_ms = report.duration_ms,
            "folder scan finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sizer::SizeMode;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn write_bytes(path: &Path, len: usize) {
        fs::write(path, vec![b'x'; len]).unwrap();
    }

    fn fixture() -> TempDir {
        let dir = tempdir().unwrap();
        for (name, len) in [("alpha", 300), ("beta", 1_200), ("gamma", 50), ("delta", 700)] {
            fs::create_dir_all(dir.path().join(name).join("nested")).unwrap();
            write_bytes(&dir.path().join(name).join("nested/data.bin"), len);
        }
        fs::create_dir(dir.path().join("empty")).unwrap();
        write_bytes(&dir.path().join("loose.bin"), 10_000);
        dir
    }

    fn config_for(root: &Path) -> ScanConfig {
        ScanConfig {
            roots: vec![root.to_path_buf()],
            threads: Some(2),
            ..ScanConfig::default()
        }
    }

    #[test]
    fn test_scan_ranks_top_level_folders() {
        let dir = fixture();
        let config = ScanConfig {
            top: 3,
            ..config_for(dir.path())
        };

        let report = FolderScanner::new(config).scan(None).unwrap();

        let names: Vec<_> = report
            .folders
            .iter()
            .map(|f| f.path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["beta", "delta", "alpha"]);
        assert_eq!(report.folders[0].bytes, 1_200);
        assert_eq!(report.measured_folders, 5);
        assert_eq!(report.total_bytes, 2_250);
        assert!(!report.cancelled);
        assert!(report.unreadable.is_empty());
    }

    #[test]
    fn test_scan_omits_empty_folders_by_default() {
        let dir = fixture();
        let config = ScanConfig {
            top: 10,
            ..config_for(dir.path())
        };
        let report = FolderScanner::new(config.clone()).scan(None).unwrap();
        assert_eq!(report.folders.len(), 4);

        let config = ScanConfig {
            include_empty: true,
            ..config
        };
        let report = FolderScanner::new(config).scan(None).unwrap();
        assert_eq!(report.folders.len(), 5);
        assert_eq!(report.folders[4].bytes, 0);
    }

    #[test]
    fn test_scan_honors_skip_list() {
        let dir = fixture();
        let config = ScanConfig {
            skip: vec![dir.path().join("beta")],
            ..config_for(dir.path())
        };
        let report = FolderScanner::new(config).scan(None).unwrap();
        assert!(report.folders.iter().all(|f| !f.path.ends_with("beta")));
        assert_eq!(report.measured_folders, 4);
    }

    #[test]
    fn test_scan_sampled_mode_flags_estimates() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("many")).unwrap();
        for i in 0..6 {
            write_bytes(&dir.path().join("many").join(format!("{i}.bin")), 20);
        }
        let config = ScanConfig {
            mode: SizeMode::Sampled,
            sample_limit: 2,
            ..config_for(dir.path())
        };

        let report = FolderScanner::new(config).scan(None).unwrap();
        assert_eq!(report.estimated, 1);
        assert!(report.folders[0].estimated);
        assert_eq!(report.folders[0].bytes, 120);
    }

    #[test]
    fn test_scan_records_unreadable_volume() {
        let dir = fixture();
        let missing = dir.path().join("missing");
        let config = ScanConfig {
            roots: vec![missing.clone(), dir.path().to_path_buf()],
            ..config_for(dir.path())
        };

        let report = FolderScanner::new(config).scan(None).unwrap();
        assert_eq!(report.unreadable, vec![missing]);
        assert_eq!(report.folders.len(), 4);
    }

    #[test]
    fn test_scan_with_zero_budget_times_out() {
        let dir = fixture();
        let config = ScanConfig {
            scan_budget: Some(Duration::ZERO),
            ..config_for(dir.path())
        };

        let report = FolderScanner::new(config).scan(None).unwrap();
        assert_eq!(report.timed_out, 5);
        assert!(report.folders.is_empty());
    }

    #[test]
    fn test_cancelled_scan_reports_cancelled() {
        let dir = fixture();
        let scanner = FolderScanner::new(config_for(dir.path()));
        scanner.cancel_handle().cancel();

        let report = scanner.scan(None).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.measured_folders, 0);
        assert_eq!(report.timed_out, 0);
    }

    #[test]
    fn test_scan_reports_progress() {
        let dir = fixture();
        let seen: Arc<Mutex<Vec<ScanProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let reporter: ProgressReporter = Arc::new(move |progress| {
            sink.lock().unwrap().push(progress);
        });

        FolderScanner::new(config_for(dir.path()))
            .scan(Some(reporter))
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.first().unwrap().phase, ScanPhase::Enumerating);
        assert_eq!(seen.first().unwrap().fraction(), None);

        let last = seen.last().unwrap();
        assert_eq!(last.phase, ScanPhase::Measuring);
        assert_eq!(last.folders_done, 5);
        assert_eq!(last.fraction(), Some(1.0));
        assert_eq!(last.leaders.len(), 4);
        assert!(last.leaders[0].path.ends_with("beta"));
    }

    #[test]
    fn test_scan_rejects_invalid_config() {
        let config = ScanConfig {
            top: 0,
            ..ScanConfig::default()
        };
        let err = FolderScanner::new(config).scan(None).unwrap_err();
        assert!(matches!(err, ScanError::InvalidConfig(_)));
    }

    #[test]
    fn test_fraction_with_no_folders() {
        let progress = ScanProgress {
            phase: ScanPhase::Measuring,
            folders_total: Some(0),
            ..ScanProgress::starting()
        };
        assert_eq!(progress.fraction(), Some(1.0));
    }

    #[test]
    fn test_progress_throttle_advances_last_emit() {
        let last_emit = AtomicU64::new(0);

        assert!(!FolderScanner::should_emit_progress(&last_emit, 50));
        assert_eq!(last_emit.load(Ordering::Relaxed), 0);

        assert!(FolderScanner::should_emit_progress(&last_emit, 100));
        assert_eq!(last_emit.load(Ordering::Relaxed), 100);

        assert!(!FolderScanner::should_emit_progress(&last_emit, 150));
        assert!(FolderScanner::should_emit_progress(&last_emit, 200));
        assert_eq!(last_emit.load(Ordering::Relaxed), 200);
    }

    #[test]
    fn test_folder_deadline_is_earlier_of_budgets() {
        let dir = tempdir().unwrap();
        let scan_deadline = Instant::now() + Duration::from_secs(60);

        let tight_scan = FolderScanner::new(ScanConfig {
            folder_budget: Some(Duration::from_secs(3_600)),
            ..config_for(dir.path())
        });
        let limits = tight_scan.limits_for_folder(Some(scan_deadline));
        assert_eq!(limits.deadline, Some(scan_deadline));

        let tight_folder = FolderScanner::new(ScanConfig {
            folder_budget: Some(Duration::from_secs(1)),
            ..config_for(dir.path())
        });
        let before = Instant::now();
        let deadline = tight_folder
            .limits_for_folder(Some(scan_deadline))
            .deadline
            .unwrap();
        assert!(deadline >= before + Duration::from_secs(1));
        assert!(deadline < scan_deadline);
    }

    #[test]
    fn test_folder_deadline_without_folder_budget() {
        let dir = tempdir().unwrap();
        let scanner = FolderScanner::new(ScanConfig {
            folder_budget: None,
            ..config_for(dir.path())
        });
        let scan_deadline = Instant::now() + Duration::from_secs(5);

        assert_eq!(scanner.limits_for_folder(Some(scan_deadline)).deadline, Some(scan_deadline));
        assert_eq!(scanner.limits_for_folder(None).deadline, None);
    }
}
