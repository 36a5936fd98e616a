// Which retained files to delete to get back under the cap.

use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateFile {
    pub name: String,
    pub modified: SystemTime,
}

/// Oldest files past `capacity`, ordered by modification time with ties
/// broken by file name. Returns nothing when at or under the cap.
pub fn select_evictions(mut files: Vec<StateFile>, capacity: usize) -> Vec<StateFile> {
    if files.len() <= capacity {
        return Vec::new();
    }
    files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)));
    let excess = files.len() - capacity;
    files.truncate(excess);
    files
}
