use crate::format::format_size;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One measured top-level folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSize {
    pub path: PathBuf,
    pub bytes: u64,
    pub estimated: bool,
    pub complete: bool,
}

impl FolderSize {
    /// Human-readable size; `~` marks an extrapolated size and `>=` a walk
    /// that was cut short.
    pub fn size_label(&self) -> String {
        let size = format_size(self.bytes);
        if !self.complete {
            format!(">= {}", size)
        } else if self.estimated {
            format!("~ {}", size)
        } else {
            size
        }
    }
}

/// The `n` largest folders, biggest first. Equal sizes are ordered by path.
pub fn top_n(sizes: &DashMap<PathBuf, FolderSize>, n: usize) -> Vec<FolderSize> {
    if n == 0 {
        return Vec::new();
    }
    let mut items: Vec<FolderSize> = sizes.iter().map(|entry| entry.value().clone()).collect();
    items.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.path.cmp(&b.path)));
    items.truncate(n);
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(path: &str, bytes: u64) -> FolderSize {
        FolderSize {
            path: PathBuf::from(path),
            bytes,
            estimated: false,
            complete: true,
        }
    }

    fn map_of(items: &[FolderSize]) -> DashMap<PathBuf, FolderSize> {
        let map = DashMap::new();
        for item in items {
            map.insert(item.path.clone(), item.clone());
        }
        map
    }

    #[test]
    fn test_top_n_orders_and_truncates() {
        let map = map_of(&[
            folder("/small", 10),
            folder("/huge", 9_000),
            folder("/mid", 500),
            folder("/big", 4_000),
        ]);

        let top = top_n(&map, 3);
        let paths: Vec<_> = top.iter().map(|f| f.path.to_str().unwrap()).collect();
        assert_eq!(paths, vec!["/huge", "/big", "/mid"]);
    }

    #[test]
    fn test_top_n_breaks_ties_by_path() {
        let map = map_of(&[folder("/b", 100), folder("/a", 100), folder("/c", 100)]);

        let top = top_n(&map, 2);
        assert_eq!(top[0].path, PathBuf::from("/a"));
        assert_eq!(top[1].path, PathBuf::from("/b"));
    }

    #[test]
    fn test_top_n_fewer_than_requested() {
        let map = map_of(&[folder("/only", 1)]);
        assert_eq!(top_n(&map, 5).len(), 1);
        assert!(top_n(&DashMap::new(), 5).is_empty());
    }

    #[test]
    fn test_size_label_marks_partial_results() {
        let mut item = folder("/x", 1536);
        assert_eq!(item.size_label(), "1.50 KB");
        item.estimated = true;
        assert_eq!(item.size_label(), "~ 1.50 KB");
        item.complete = false;
        assert_eq!(item.size_label(), ">= 1.50 KB");
    }

    #[test]
    fn test_top_n_zero() {
        let map = map_of(&[folder("/only", 1)]);
        assert!(top_n(&map, 0).is_empty());
    }
}
