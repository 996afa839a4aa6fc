//! Find the largest top-level folders on the machine's storage volumes.
//!
//! Folders are measured concurrently, each under a time budget, either
//! exactly or by sampling a bounded number of files, and ranked by size.

pub mod config;
pub mod error;
pub mod format;
pub mod opener;
pub mod ranking;
pub mod scanner;
pub mod sizer;
pub mod volumes;

pub use config::{ScanArgs, ScanConfig};
pub use error::ScanError;
pub use format::format_size;
pub use opener::open_folder;
pub use ranking::FolderSize;
pub use scanner::{
    CancelHandle, FolderScanner, ProgressReporter, ScanPhase, ScanProgress, ScanReport,
};
pub use sizer::SizeMode;

/// Install a stderr `tracing` subscriber; `RUST_LOG` overrides `default_level`.
pub fn init_logging(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
