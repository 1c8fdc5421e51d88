//! Explorer copy/cut buffer.

use std::sync::Mutex;

use crate::attributes::AttributesStore;
use crate::ignore_poison::IgnorePoison;
use crate::vfs::VirtualFile;

#[derive(Default)]
struct BufferState {
    entries: Vec<VirtualFile>,
    drag_and_drop: Vec<VirtualFile>,
    is_cut: bool,
}

/// Files put aside by copy, cut or an in-progress drag.
///
/// Owned by whoever owns the explorer view and shared with the paste orchestrator. Every access
/// goes through one lock, so removals from a finished paste can't race a new copy.
#[derive(Default)]
pub struct CopyPasteBuffer {
    buffer_lock: Mutex<BufferState>,
}

impl CopyPasteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the buffer with the copyable subset of `files`. Returns how many were kept.
    pub fn copy(&self, files: &[VirtualFile], attributes: &AttributesStore) -> usize {
        self.fill(files, attributes, false)
    }

    /// Like [`CopyPasteBuffer::copy`], but a paste moves the files.
    pub fn cut(&self, files: &[VirtualFile], attributes: &AttributesStore) -> usize {
        self.fill(files, attributes, true)
    }

    fn fill(&self, files: &[VirtualFile], attributes: &AttributesStore, is_cut: bool) -> usize {
        let entries: Vec<VirtualFile> = files
            .iter()
            .filter(|file| {
                attributes
                    .try_get_attributes(file)
                    .is_none_or(|a| a.is_copy_possible())
            })
            .cloned()
            .collect();
        let kept = entries.len();
        if kept < files.len() {
            log::debug!("Left {} non-copyable file(s) out of the buffer", files.len() - kept);
        }
        let mut state = self.buffer_lock.lock_ignore_poison();
        state.entries = entries;
        state.is_cut = is_cut;
        kept
    }

    /// Records files being dragged from the explorer.
    pub fn start_drag(&self, files: &[VirtualFile]) {
        self.buffer_lock.lock_ignore_poison().drag_and_drop = files.to_vec();
    }

    pub fn end_drag(&self) {
        self.buffer_lock.lock_ignore_poison().drag_and_drop.clear();
    }

    pub fn is_cut(&self) -> bool {
        self.buffer_lock.lock_ignore_poison().is_cut
    }

    pub fn files(&self) -> Vec<VirtualFile> {
        self.buffer_lock.lock_ignore_poison().entries.clone()
    }

    /// Sources for a paste: the drag buffer during a drag, the copy/cut buffer otherwise.
    pub fn paste_sources(&self, is_drag_and_drop: bool) -> Vec<VirtualFile> {
        let state = self.buffer_lock.lock_ignore_poison();
        if is_drag_and_drop && !state.drag_and_drop.is_empty() {
            state.drag_and_drop.clone()
        } else {
            state.entries.clone()
        }
    }

    /// Whichever buffer holds more files, as the candidates for "can paste here?".
    pub(crate) fn largest_buffer(&self) -> Vec<VirtualFile> {
        let state = self.buffer_lock.lock_ignore_poison();
        if state.drag_and_drop.len() > state.entries.len() {
            state.drag_and_drop.clone()
        } else {
            state.entries.clone()
        }
    }

    /// Removes every buffered file matching `predicate`. Returns how many were removed.
    pub fn remove_if(&self, predicate: impl Fn(&VirtualFile) -> bool) -> usize {
        let mut state = self.buffer_lock.lock_ignore_poison();
        let before = state.entries.len() + state.drag_and_drop.len();
        state.entries.retain(|f| !predicate(f));
        state.drag_and_drop.retain(|f| !predicate(f));
        before - state.entries.len() - state.drag_and_drop.len()
    }

    pub fn clear(&self) {
        let mut state = self.buffer_lock.lock_ignore_poison();
        state.entries.clear();
        state.drag_and_drop.clear();
        state.is_cut = false;
    }

    pub fn is_empty(&self) -> bool {
        let state = self.buffer_lock.lock_ignore_poison();
        state.entries.is_empty() && state.drag_and_drop.is_empty()
    }
}
