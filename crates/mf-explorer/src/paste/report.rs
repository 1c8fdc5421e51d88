//! What happened to each (source, destination) pair of a paste.

use crate::remote::RemoteError;
use crate::resolver::NotResolvableReason;
use crate::vfs::VirtualFile;

/// Outcome of one pair. Every pair that passed the legality check ends up with exactly one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    /// Dispatched and completed.
    Performed { target_name: String, overwritten: bool },
    /// Skipped by the user, or by declining a per-pair warning.
    Skipped,
    /// Type clash; shown to the user and skipped.
    NotResolvable(NotResolvableReason),
    /// Source or destination was synchronizing; left for a later attempt.
    DeferredSync,
    Failed(RemoteError),
}

#[derive(Debug, Clone)]
pub struct PairReport {
    pub source: VirtualFile,
    pub destination: VirtualFile,
    pub outcome: PairOutcome,
}

/// Result of one paste.
#[derive(Debug, Clone, Default)]
pub struct PasteReport {
    /// Set once operations were dispatched.
    pub operation_id: Option<String>,
    pub pairs: Vec<PairReport>,
    /// The user declined a top-level confirmation or cancelled a conflict dialog.
    pub aborted: bool,
}

impl PasteReport {
    pub(crate) fn aborted() -> Self {
        Self {
            aborted: true,
            ..Self::default()
        }
    }

    pub(crate) fn push(&mut self, source: &VirtualFile, destination: &VirtualFile, outcome: PairOutcome) {
        self.pairs.push(PairReport {
            source: source.clone(),
            destination: destination.clone(),
            outcome,
        });
    }

    pub fn outcome_for(&self, source: &VirtualFile, destination: &VirtualFile) -> Option<&PairOutcome> {
        self.pairs
            .iter()
            .find(|p| p.source == *source && p.destination == *destination)
            .map(|p| &p.outcome)
    }

    pub fn performed_count(&self) -> usize {
        self.count(|o| matches!(o, PairOutcome::Performed { .. }))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, PairOutcome::Failed(_)))
    }

    /// Pairs not dispatched for any reason other than failure.
    pub fn skipped_count(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                PairOutcome::Skipped | PairOutcome::NotResolvable(_) | PairOutcome::DeferredSync
            )
        })
    }

    fn count(&self, predicate: impl Fn(&PairOutcome) -> bool) -> usize {
        self.pairs.iter().filter(|p| predicate(&p.outcome)).count()
    }
}
