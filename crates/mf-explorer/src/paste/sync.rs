//! Tracking of files with content synchronization in flight.

use std::collections::HashSet;
use std::sync::RwLock;

use crate::ignore_poison::IgnorePoisonRw;
use crate::vfs::VirtualFile;

/// Files currently being uploaded or downloaded by the content synchronizer.
///
/// A paste leaves such files alone; they stay in the buffer for a later attempt.
#[derive(Default)]
pub struct SyncRegistry {
    syncing: RwLock<HashSet<VirtualFile>>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_sync(&self, file: &VirtualFile) {
        self.syncing.write_ignore_poison().insert(file.clone());
    }

    pub fn end_sync(&self, file: &VirtualFile) {
        self.syncing.write_ignore_poison().remove(file);
    }

    /// Whether `file` is synchronizing. With `check_dependents`, a directory counts as
    /// synchronizing while anything below it is.
    pub fn is_synchronizing(&self, file: &VirtualFile, check_dependents: bool) -> bool {
        let syncing = self.syncing.read_ignore_poison();
        if syncing.contains(file) {
            return true;
        }
        check_dependents && syncing.iter().any(|s| file.is_ancestor_of(s, true))
    }
}
