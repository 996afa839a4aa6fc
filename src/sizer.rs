use crate::volumes::is_abnormal_path;
use jwalk::{Parallelism, WalkDir};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::trace;

/// How file sizes under a folder are gathered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeMode {
    /// Stat every file.
    #[default]
    Exact,
    /// Stat the first `sample_limit` files, count the rest, extrapolate.
    Sampled,
}

#[derive(Debug, Clone, Copy)]
pub struct MeasureLimits {
    pub mode: SizeMode,
    pub sample_limit: u64,
    pub deadline: Option<Instant>,
}

impl MeasureLimits {
    pub fn exact() -> Self {
        Self {
            mode: SizeMode::Exact,
            sample_limit: u64::MAX,
            deadline: None,
        }
    }

    pub fn sampled(sample_limit: u64) -> Self {
        Self {
            mode: SizeMode::Sampled,
            sample_limit,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    fn sizes_next_file(&self, files_sized: u64) -> bool {
        match self.mode {
            SizeMode::Exact => true,
            SizeMode::Sampled => files_sized < self.sample_limit,
        }
    }
}

/// Outcome of measuring one folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderMeasure {
    /// Reported size; extrapolated when `estimated` is set.
    pub bytes: u64,
    pub files_seen: u64,
    pub files_sized: u64,
    /// Unreadable entries and failed stats.
    pub errors: u64,
    /// False when the walk stopped at the deadline or on cancellation.
    pub complete: bool,
    pub estimated: bool,
}

/// Sum file sizes under `path`.
///
/// Never fails: filesystem errors are counted and skipped, and a stopped
/// walk returns what it had gathered so far.
pub fn measure_folder(path: &Path, limits: &MeasureLimits, cancel: &AtomicBool) -> FolderMeasure {
    walk_folder(path, limits, || {
        cancel.load(Ordering::Relaxed) || limits.deadline.is_some_and(|d| Instant::now() >= d)
    })
}

/// The walk behind [`measure_folder`]; `should_stop` is checked before each entry.
fn walk_folder(
    path: &Path,
    limits: &MeasureLimits,
    mut should_stop: impl FnMut() -> bool,
) -> FolderMeasure {
    let walker = WalkDir::new(path)
        .skip_hidden(false)
        .follow_links(false)
        .parallelism(Parallelism::Serial)
        .process_read_dir(|_, _, _, children| {
            children.retain(|entry| {
                entry
                    .as_ref()
                    .map(|dir_entry| !is_abnormal_path(&dir_entry.path()))
                    .unwrap_or(true)
            });
        });

    let mut measure = FolderMeasure {
        complete: true,
        ..FolderMeasure::default()
    };
    let mut sampled_bytes = 0u64;

    for entry in walker {
        if should_stop() {
            measure.complete = false;
            break;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                trace!(folder = %path.display(), error = %err, "unreadable entry");
                measure.errors += 1;
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        measure.files_seen += 1;

        if !limits.sizes_next_file(measure.files_sized) {
            continue;
        }
        match entry.metadata() {
            Ok(metadata) => {
                sampled_bytes = sampled_bytes.saturating_add(metadata.len());
                measure.files_sized += 1;
            }
            Err(err) => {
                trace!(file = %entry.path().display(), error = %err, "stat failed");
                measure.errors += 1;
            }
        }
    }

    measure.estimated =
        limits.mode == SizeMode::Sampled && measure.files_sized < measure.files_seen;
    measure.bytes = if measure.estimated {
        extrapolate(sampled_bytes, measure.files_sized, measure.files_seen)
    } else {
        sampled_bytes
    };
    measure
}

/// Scale the bytes of `sized` files up to `seen` files by mean file size.
fn extrapolate(sampled_bytes: u64, sized: u64, seen: u64) -> u64 {
    if sized == 0 {
        return 0;
    }
    let scaled = sampled_bytes as u128 * seen as u128 / sized as u128;
    u64::try_from(scaled).unwrap_or(u64::MAX)
}
