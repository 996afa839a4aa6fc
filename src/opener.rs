use crate::error::{Result, ScanError};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::info;

/// The platform's "show this folder" command for `path`.
pub fn open_command(path: &Path) -> Command {
    let program = if cfg!(windows) {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    let mut command = Command::new(program);
    command.arg(path);
    command
}

/// Open `path` in the OS file browser without waiting for it to exit.
pub fn open_folder(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(ScanError::NotFound(path.to_path_buf()));
    }

    open_command(path)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| ScanError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    info!(path = %path.display(), "opened folder");
    Ok(())
}
