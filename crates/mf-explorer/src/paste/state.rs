//! Orchestrator phases.

use std::sync::Mutex;

use serde::Serialize;

use crate::ignore_poison::IgnorePoison;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PasteState {
    Idle,
    CollectingSources,
    ClassifyingPairs,
    ResolvingConflicts,
    Dispatching,
    Invalidating,
}

/// Moves the shared state through the phases of one paste and puts it back to idle when
/// dropped, whichever way the paste ends.
pub(super) struct StateGuard<'a> {
    state: &'a Mutex<PasteState>,
}

impl<'a> StateGuard<'a> {
    pub(super) fn start(state: &'a Mutex<PasteState>) -> Self {
        let guard = Self { state };
        guard.enter(PasteState::CollectingSources);
        guard
    }

    pub(super) fn enter(&self, next: PasteState) {
        let mut state = self.state.lock_ignore_poison();
        log::debug!("Paste state: {:?} -> {:?}", *state, next);
        *state = next;
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.enter(PasteState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_returns_to_idle() {
        let state = Mutex::new(PasteState::Idle);
        {
            let guard = StateGuard::start(&state);
            assert_eq!(*state.lock_ignore_poison(), PasteState::CollectingSources);
            guard.enter(PasteState::Dispatching);
            assert_eq!(*state.lock_ignore_poison(), PasteState::Dispatching);
        }
        assert_eq!(*state.lock_ignore_poison(), PasteState::Idle);
    }
}
