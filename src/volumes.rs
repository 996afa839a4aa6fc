use crate::error::{Result, ScanError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const DOCKER_VM_PATH: [&str; 5] = ["Library", "Containers", "com.docker.docker", "Data", "vms"];

/// Root path of a Windows drive letter, e.g. `C:\`.
pub fn drive_root(letter: char) -> PathBuf {
    PathBuf::from(format!("{}:\\", letter.to_ascii_uppercase()))
}

/// Storage volumes present on this machine.
///
/// Windows exposes one root per mounted drive letter; every other OS is
/// scanned from `/`.
pub fn detect_volumes() -> Vec<PathBuf> {
    if cfg!(windows) {
        ('A'..='Z')
            .map(drive_root)
            .filter(|root| root.exists())
            .collect()
    } else {
        vec![PathBuf::from("/")]
    }
}

/// Immediate child directories of `volume`, sorted by path.
///
/// Symlinked directories are left out so a folder reachable under two names
/// is not counted twice.
pub fn top_level_folders(volume: &Path, skip: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(volume).map_err(|source| ScanError::Io {
        path: volume.to_path_buf(),
        source,
    })?;

    let mut folders = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                trace!(volume = %volume.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };

        let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }

        let path = entry.path();
        if skip.iter().any(|skipped| skipped == &path) || is_abnormal_path(&path) {
            debug!(path = %path.display(), "skipping excluded folder");
            continue;
        }
        folders.push(path);
    }

    folders.sort();
    Ok(folders)
}

/// Paths whose apparent size is meaningless for a disk usage report, such as
/// the Docker Desktop VM disk image tree on macOS.
pub(crate) fn is_abnormal_path(path: &Path) -> bool {
    let mut matched = 0usize;

    for component in path.components() {
        let Some(part) = component.as_os_str().to_str() else {
            continue;
        };

        if part == DOCKER_VM_PATH[matched] {
            matched += 1;
            if matched == DOCKER_VM_PATH.len() {
                return true;
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_drive_root_format() {
        assert_eq!(drive_root('c'), PathBuf::from("C:\\"));
        assert_eq!(drive_root('D'), PathBuf::from("D:\\"));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_detect_volumes_unix_root() {
        assert_eq!(detect_volumes(), vec![PathBuf::from("/")]);
    }

    #[test]
    fn test_top_level_folders_lists_dirs_only() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("loose.txt"), "x").unwrap();

        let folders = top_level_folders(dir.path(), &[]).unwrap();
        assert_eq!(folders, vec![dir.path().join("a"), dir.path().join("b")]);
    }

    #[test]
    fn test_top_level_folders_honors_skip_list() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("keep")).unwrap();
        fs::create_dir(dir.path().join("proc")).unwrap();

        let folders = top_level_folders(dir.path(), &[dir.path().join("proc")]).unwrap();
        assert_eq!(folders, vec![dir.path().join("keep")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_top_level_folders_ignores_symlinked_dirs() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("alias")).unwrap();

        let folders = top_level_folders(dir.path(), &[]).unwrap();
        assert_eq!(folders, vec![dir.path().join("real")]);
    }

    #[test]
    fn test_top_level_folders_missing_volume() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = top_level_folders(&missing, &[]).unwrap_err();
        assert!(matches!(err, ScanError::Io { .. }));
    }

    #[test]
    fn test_skip_abnormal_docker_vm_path() {
        let docker_vm_file = Path::new(
            "/Users/demo/Library/Containers/com.docker.docker/Data/vms/0/data/Docker.raw",
        );
        let normal_file = Path::new("/Users/demo/Documents/test.txt");

        assert!(is_abnormal_path(docker_vm_file));
        assert!(!is_abnormal_path(normal_file));
    }
}
