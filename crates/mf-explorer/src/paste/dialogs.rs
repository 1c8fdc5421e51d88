//! Questions the paste asks the user.
//!
//! The orchestrator decides which question is needed and which answers are allowed; how it is
//! shown is up to the host. Every call blocks until the user answers.

use serde::Serialize;

use crate::resolver::{DecisionStyle, PendingDecision};

/// Longest item list shown in a confirmation before it is cut off.
pub const ITEMS_LIST_LIMIT: usize = 130;

/// Direction of a cut, as named in its confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferDirection {
    Moving,
    Uploading,
    Downloading,
}

impl TransferDirection {
    /// Remote files into remote destinations move; anything local uploads; the rest downloads.
    pub fn classify(has_local_sources: bool, has_remote_destinations: bool) -> Self {
        match (has_local_sources, has_remote_destinations) {
            (false, true) => Self::Moving,
            (true, true) => Self::Uploading,
            _ => Self::Downloading,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Self::Moving => "move",
            Self::Uploading => "upload",
            Self::Downloading => "download",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Moving => "Moving",
            Self::Uploading => "Uploading",
            Self::Downloading => "Downloading",
        }
    }
}

/// Top-level confirmation of a cut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferPrompt {
    pub direction: TransferDirection,
    pub file_count: usize,
}

impl TransferPrompt {
    pub fn title(&self) -> String {
        format!("{} of {} file(s)", self.direction.label(), self.file_count)
    }

    pub fn message(&self) -> String {
        let warning = match self.direction {
            TransferDirection::Moving => String::new(),
            other => format!(
                "{} files can violate security rules of customer who owns this system.\n\n",
                other.label()
            ),
        };
        format!("{warning}Do you want to {} these files?", self.direction.verb())
    }

    /// Uploads and downloads are shown with a warning icon.
    pub fn is_warning(&self) -> bool {
        self.direction != TransferDirection::Moving
    }
}

/// Warning shown before USS or local files land in a partitioned dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TruncationPrompt {
    pub has_local_sources: bool,
    pub has_pds: bool,
    pub has_pdse: bool,
}

impl TruncationPrompt {
    fn source_pattern(&self) -> &'static str {
        if self.has_local_sources { "Local Files" } else { "USS Files" }
    }

    fn destination_pattern(&self) -> &'static str {
        match (self.has_pds, self.has_pdse) {
            (true, true) => "PDS and PDS/E",
            (false, true) => "PDS/E",
            _ => "PDS",
        }
    }

    pub fn title(&self) -> String {
        format!("{} to {} Placing", self.source_pattern(), self.destination_pattern())
    }

    pub fn message(&self) -> String {
        format!(
            "You are about to place {} to {}. All lines exceeding the record length will be truncated.",
            self.source_pattern(),
            self.destination_pattern()
        )
    }
}

/// One conflict put in front of the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictPrompt {
    pub source_name: String,
    pub destination_name: String,
    pub decision: PendingDecision,
}

impl ConflictPrompt {
    pub fn title(&self) -> &'static str {
        match self.decision.style {
            DecisionStyle::Choice => "Name Conflict",
            DecisionStyle::OkCancel => "Member Name Conflict",
        }
    }

    pub fn message(&self) -> String {
        let reason = if self.decision.replaces_itself {
            self.decision.message()
        } else {
            format!("Cannot move '{}' to {}", self.source_name, self.destination_name)
        };
        format!(
            "{reason}\n\nIf you select option \"Use new name\", the following name will be selected: {}",
            self.decision.proposed_name
        )
    }
}

/// Answer to the "name conflicts in N file(s)" question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchChoice {
    SkipAll,
    OverwriteAll,
    DecideForEach,
    /// Dialog closed: nothing is pasted.
    Cancel,
}

/// Answer for one conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SingleChoice {
    Skip,
    /// Only honored when the conflict allows overwriting.
    Overwrite,
    UseNewName,
    /// Dialog closed: nothing is pasted.
    Cancel,
}

/// Host-provided dialogs.
///
/// Called synchronously from [`PasteOrchestrator::paste`](super::PasteOrchestrator::paste),
/// which runs on a tokio worker thread. An implementation that waits for the user must not
/// park that thread: hand the question to the UI thread and wait through
/// `tokio::task::block_in_place`, or answer from state the UI collected up front.
pub trait PasteDialogs: Send + Sync {
    /// Confirms a cut. Declining aborts the paste.
    fn confirm_transfer(&self, prompt: &TransferPrompt) -> bool;

    /// Confirms pasting many files when directories are among them.
    fn confirm_bulk_transfer(&self, file_count: usize) -> bool;

    /// Confirms placing remote files on the local disk. `message` lists them.
    fn confirm_download(&self, message: &str) -> bool;

    /// Declining skips the affected pairs only.
    fn confirm_record_truncation(&self, prompt: &TruncationPrompt) -> bool;

    fn choose_batch_resolution(&self, conflict_count: usize) -> BatchChoice;

    fn choose_resolution(&self, conflict: &ConflictPrompt) -> SingleChoice;

    /// Ok takes the proposed member name, cancel skips this pair only.
    fn confirm_member_name(&self, conflict: &ConflictPrompt) -> bool;

    /// Lists conflicts that were skipped because nothing can resolve them.
    fn show_not_resolvable(&self, messages: &[String]);
}

/// Builds a confirmation text around a list of item names, cutting the list at `limit`
/// characters.
pub fn items_list_message(start: &str, items: &[String], finish: &str, limit: usize) -> String {
    let merged = items.join(", ");
    let list = if merged.chars().count() > limit {
        let head: String = merged.chars().take(limit.saturating_sub(3)).collect();
        format!("{head}...\nand more...")
    } else {
        merged
    };
    format!("{start}\n{list}\n{finish}")
}
