use crate::error::{Result, ScanError};
use crate::sizer::SizeMode;
use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TOP: usize = 5;
pub const DEFAULT_SAMPLE_LIMIT: u64 = 2_000;
pub const DEFAULT_FOLDER_BUDGET_SECS: u64 = 30;

/// Everything a scan needs to know up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directories to treat as volumes. Empty means detect the machine's volumes.
    pub roots: Vec<PathBuf>,
    /// Length of the final ranking.
    pub top: usize,
    pub mode: SizeMode,
    /// Files stat-ed per folder in sampled mode before extrapolating.
    pub sample_limit: u64,
    /// Wall-clock limit for measuring one folder.
    pub folder_budget: Option<Duration>,
    /// Wall-clock limit for the whole scan.
    pub scan_budget: Option<Duration>,
    pub threads: Option<usize>,
    pub include_empty: bool,
    /// Top-level folders never measured.
    pub skip: Vec<PathBuf>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            top: DEFAULT_TOP,
            mode: SizeMode::Exact,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            folder_budget: Some(Duration::from_secs(DEFAULT_FOLDER_BUDGET_SECS)),
            scan_budget: None,
            threads: None,
            include_empty: false,
            skip: default_skip(),
        }
    }
}

/// Pseudo-filesystems whose reported sizes are not disk usage.
pub fn default_skip() -> Vec<PathBuf> {
    if cfg!(windows) {
        Vec::new()
    } else {
        ["/proc", "/sys", "/dev", "/run"]
            .iter()
            .map(PathBuf::from)
            .collect()
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top == 0 {
            return Err(ScanError::InvalidConfig("top must be at least 1".into()));
        }
        if self.sample_limit == 0 {
            return Err(ScanError::InvalidConfig(
                "sample limit must be at least 1".into(),
            ));
        }
        if self.threads == Some(0) {
            return Err(ScanError::InvalidConfig("threads must be at least 1".into()));
        }
        Ok(())
    }
}

/// Scan flags shared by the GUI and terminal front ends.
#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Scan these directories instead of the detected volumes (repeatable)
    #[arg(long = "root", value_name = "PATH")]
    pub roots: Vec<PathBuf>,

    /// Number of folders to report
    #[arg(long, short = 'n', default_value_t = DEFAULT_TOP)]
    pub top: usize,

    /// Estimate folder sizes by sampling instead of stat-ing every file
    #[arg(long)]
    pub sampled: bool,

    /// Files sized per folder before extrapolating (with --sampled)
    #[arg(long, default_value_t = DEFAULT_SAMPLE_LIMIT)]
    pub sample_limit: u64,

    /// Seconds allowed per folder; 0 disables the limit
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_FOLDER_BUDGET_SECS)]
    pub folder_budget: u64,

    /// Seconds allowed for the whole scan (0 = unlimited)
    #[arg(long, value_name = "SECS")]
    pub scan_budget: Option<u64>,

    /// Worker threads used to measure folders
    #[arg(long)]
    pub threads: Option<usize>,

    /// Report folders that measured zero bytes
    #[arg(long)]
    pub include_empty: bool,

    /// Additional top-level folders to leave out (repeatable)
    #[arg(long, value_name = "PATH")]
    pub skip: Vec<PathBuf>,
}

impl ScanArgs {
    pub fn into_config(self) -> Result<ScanConfig> {
        let mut skip = default_skip();
        skip.extend(self.skip);

        let config = ScanConfig {
            roots: self.roots,
            top: self.top,
            mode: if self.sampled {
                SizeMode::Sampled
            } else {
                SizeMode::Exact
            },
            sample_limit: self.sample_limit,
            folder_budget: (self.folder_budget > 0)
                .then(|| Duration::from_secs(self.folder_budget)),
            scan_budget: self
                .scan_budget
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            threads: self.threads,
            include_empty: self.include_empty,
            skip,
        };
        config.validate()?;
        Ok(config)
    }
}
