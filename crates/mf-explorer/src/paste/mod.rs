//! Copy/move orchestration.
//!
//! A paste walks through [`PasteState`]s: sources are collected and pruned, paired with every
//! destination they can legally go to, all conflicts are settled with the user up front, and
//! the resulting operations run as one batch on a blocking thread. Afterwards the tree nodes
//! around sources and destinations are cleaned so the next expansion shows the new state.
//!
//! Every legal pair ends up in the [`PasteReport`] with one [`PairOutcome`], whether it was
//! performed, skipped by the user, not resolvable, deferred by a running sync or failed.

mod buffer;
mod dialogs;
mod events;
#[cfg(test)]
mod paste_test;
mod plan;
mod report;
mod state;
mod sync;

pub use buffer::CopyPasteBuffer;
pub use dialogs::{
    BatchChoice, ConflictPrompt, ITEMS_LIST_LIMIT, PasteDialogs, SingleChoice, TransferDirection, TransferPrompt,
    TruncationPrompt, items_list_message,
};
pub use events::{LogNotifier, PasteCompleteEvent, PasteErrorEvent, PasteNotifier, PasteProgressEvent};
pub use plan::{classify_transfer, is_operation_supported, prune_descendants};
pub use report::{PairOutcome, PairReport, PasteReport};
pub use state::PasteState;
pub use sync::SyncRegistry;

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::attributes::{AttributesStore, DatasetOrganization, FileAttributes};
use crate::config::ExplorerConfig;
use crate::fetch::{FileFetchCache, RemoteQuery};
use crate::ignore_poison::IgnorePoison;
use crate::remote::{MoveCopyOperation, RemoteBackend, RemoteError, RemoteOperation};
use crate::resolver::Sibling;
use crate::tree::ExplorerTreeStructure;
use crate::vfs::{FileSystemKind, VirtualFile, VirtualFileSystem};
use plan::{PairDecision, PastePair, legal_pairs, resolve_conflicts};
use state::StateGuard;

const DOWNLOAD_START: &str = "You are going to DOWNLOAD files:";
const DOWNLOAD_FINISH: &str = "It may be against your company's security policy. Are you sure?";

/// Errors that end a paste without a report.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PasteError {
    /// The background task died before reporting back.
    TaskFailed { message: String },
}

impl PasteError {
    pub fn user_message(&self) -> String {
        match self {
            Self::TaskFailed { message } => format!("The paste stopped unexpectedly: {message}"),
        }
    }
}

impl fmt::Display for PasteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TaskFailed { message } => write!(f, "paste task failed: {message}"),
        }
    }
}

impl std::error::Error for PasteError {}

/// One paste gesture.
#[derive(Debug, Clone, Default)]
pub struct PasteRequest {
    /// Selected directories to paste into.
    pub destinations: Vec<VirtualFile>,
    /// Files dragged in from outside the explorer, pasted along with the buffer.
    pub dragged_files: Vec<VirtualFile>,
    /// Files on the system clipboard. When present they replace the explorer buffer.
    pub clipboard_files: Vec<VirtualFile>,
    pub is_drag_and_drop: bool,
}

impl PasteRequest {
    /// Keyboard paste of the explorer buffer into `destinations`.
    pub fn into_destinations(destinations: Vec<VirtualFile>) -> Self {
        Self {
            destinations,
            ..Self::default()
        }
    }
}

/// Runs pastes against one explorer view.
pub struct PasteOrchestrator {
    tree: Arc<ExplorerTreeStructure>,
    backend: Arc<dyn RemoteBackend>,
    buffer: Arc<CopyPasteBuffer>,
    dialogs: Arc<dyn PasteDialogs>,
    notifier: Arc<dyn PasteNotifier>,
    sync: Arc<SyncRegistry>,
    local: Option<Arc<VirtualFileSystem>>,
    config: ExplorerConfig,
    /// Serializes pastes; the buffer has its own lock for short accesses.
    running: tokio::sync::Mutex<()>,
    state: Mutex<PasteState>,
}

impl PasteOrchestrator {
    pub fn new(
        tree: Arc<ExplorerTreeStructure>,
        backend: Arc<dyn RemoteBackend>,
        buffer: Arc<CopyPasteBuffer>,
        dialogs: Arc<dyn PasteDialogs>,
        config: ExplorerConfig,
    ) -> Self {
        Self {
            tree,
            backend,
            buffer,
            dialogs,
            notifier: Arc::new(LogNotifier),
            sync: Arc::new(SyncRegistry::new()),
            local: None,
            config,
            running: tokio::sync::Mutex::new(()),
            state: Mutex::new(PasteState::Idle),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn PasteNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_sync_registry(mut self, sync: Arc<SyncRegistry>) -> Self {
        self.sync = sync;
        self
    }

    /// Local file system whose entries are replaced when a download overwrites them.
    pub fn with_local_file_system(mut self, local: Arc<VirtualFileSystem>) -> Self {
        self.local = Some(local);
        self
    }

    pub fn state(&self) -> PasteState {
        *self.state.lock_ignore_poison()
    }

    pub fn buffer(&self) -> &Arc<CopyPasteBuffer> {
        &self.buffer
    }

    fn attributes(&self) -> &Arc<AttributesStore> {
        self.tree.cache().attributes()
    }

    /// True if at least one buffered file can legally go into one of `destinations`.
    pub fn is_paste_possible(&self, destinations: &[VirtualFile]) -> bool {
        let sources = prune_descendants(&self.buffer.largest_buffer());
        !legal_pairs(self.attributes(), &sources, destinations).is_empty()
    }

    /// Runs one paste to the end. Remote I/O runs on blocking threads. Dialogs are called
    /// inline on the runtime thread, see [`PasteDialogs`] for what that asks of the host.
    pub async fn paste(&self, request: PasteRequest) -> Result<PasteReport, PasteError> {
        let _running = self.running.lock().await;
        let phase = StateGuard::start(&self.state);
        let is_cut = self.buffer.is_cut();

        let raw_sources = self.collect_sources(&request);
        let sources = prune_descendants(&raw_sources);

        phase.enter(PasteState::ClassifyingPairs);
        let pairs = legal_pairs(self.attributes(), &sources, &request.destinations);
        if pairs.is_empty() {
            log::debug!(
                "Nothing from {} source(s) can go into {} destination(s)",
                sources.len(),
                request.destinations.len()
            );
            return Ok(PasteReport::default());
        }
        let pair_sources = distinct(pairs.iter().map(|p| &p.source));

        if is_cut {
            let prompt = TransferPrompt {
                direction: TransferDirection::classify(
                    pair_sources.iter().any(|f| f.file_system_kind() == FileSystemKind::Local),
                    pairs
                        .iter()
                        .any(|p| p.destination.file_system_kind() == FileSystemKind::Remote),
                ),
                file_count: pair_sources.len(),
            };
            if !self.dialogs.confirm_transfer(&prompt) {
                log::info!("{} declined", prompt.title());
                self.buffer.remove_if(|f| raw_sources.contains(f));
                return Ok(PasteReport::aborted());
            }
        }
        if pair_sources.len() > self.config.bulk_transfer_threshold
            && pair_sources.iter().any(VirtualFile::is_directory)
            && !self.dialogs.confirm_bulk_transfer(pair_sources.len())
        {
            log::info!("Bulk transfer of {} file(s) declined", pair_sources.len());
            return Ok(PasteReport::aborted());
        }
        let siblings = self.list_destinations(&pairs).await?;

        phase.enter(PasteState::ResolvingConflicts);
        let Some(mut decisions) = resolve_conflicts(&pairs, &siblings, self.dialogs.as_ref()) else {
            log::info!("Paste cancelled while resolving conflicts");
            return Ok(PasteReport::aborted());
        };
        self.confirm_truncation(&pairs, &mut decisions);

        let mut outcomes: Vec<Option<PairOutcome>> = decisions
            .iter()
            .map(|d| match d {
                PairDecision::Proceed { .. } => None,
                PairDecision::Skip => Some(PairOutcome::Skipped),
                PairDecision::NotResolvable(reason) => Some(PairOutcome::NotResolvable(*reason)),
            })
            .collect();
        let operations = build_operations(&pairs, &decisions, is_cut);
        if self.config.confirm_downloads && !self.confirm_downloads(&operations) {
            log::info!("Download declined");
            return Ok(PasteReport::aborted());
        }

        let (ready, deferred): (Vec<_>, Vec<_>) = operations.into_iter().partition(|(_, op)| {
            !self.sync.is_synchronizing(&op.source, true) && !self.sync.is_synchronizing(&op.destination, true)
        });
        for (index, op) in &deferred {
            log::info!("Leaving {} out of the paste, it is being synchronized", op.source.path());
            outcomes[*index] = Some(PairOutcome::DeferredSync);
        }

        phase.enter(PasteState::Dispatching);
        self.remove_overwritten(&ready);
        let operation_id = Uuid::new_v4().to_string();
        let results = match self.dispatch(&operation_id, &ready, is_cut).await {
            Ok(results) => results,
            Err(e) => {
                log::error!("Paste {operation_id} failed: {e}");
                self.notifier.on_error(&PasteErrorEvent {
                    operation_id,
                    source: None,
                    message: e.user_message(),
                    error: None,
                });
                return Err(e);
            }
        };

        for ((index, op), result) in ready.iter().zip(results) {
            outcomes[*index] = Some(match result {
                Ok(()) => {
                    self.finish_performed(op, is_cut);
                    PairOutcome::Performed {
                        target_name: op.target_name(),
                        overwritten: op.force_overwriting,
                    }
                }
                Err(error) => {
                    self.finish_failed(&operation_id, op, &ready, &error, request.is_drag_and_drop);
                    PairOutcome::Failed(error)
                }
            });
        }
        if is_cut {
            self.drop_skipped_from_buffer(&pairs, &decisions);
        }

        phase.enter(PasteState::Invalidating);
        self.invalidate(&ready, is_cut);

        let mut report = PasteReport {
            operation_id: Some(operation_id),
            ..PasteReport::default()
        };
        for (pair, outcome) in pairs.iter().zip(outcomes) {
            report.push(&pair.source, &pair.destination, outcome.unwrap_or(PairOutcome::Skipped));
        }
        self.notifier.on_complete(&PasteCompleteEvent {
            operation_id: report.operation_id.clone().unwrap_or_default(),
            files_processed: report.performed_count(),
            files_failed: report.failed_count(),
            files_skipped: report.skipped_count(),
        });
        Ok(report)
    }

    fn collect_sources(&self, request: &PasteRequest) -> Vec<VirtualFile> {
        if !request.clipboard_files.is_empty() {
            return request.clipboard_files.clone();
        }
        let mut sources = self.buffer.paste_sources(request.is_drag_and_drop);
        sources.extend(request.dragged_files.iter().cloned());
        sources
    }

    /// Current children of every destination, fetched through the cache off the caller's thread.
    async fn list_destinations(&self, pairs: &[PastePair]) -> Result<HashMap<VirtualFile, Vec<Sibling>>, PasteError> {
        let mut destinations: Vec<(VirtualFile, Option<FileAttributes>)> = Vec::new();
        for pair in pairs {
            if !destinations.iter().any(|(d, _)| *d == pair.destination) {
                destinations.push((pair.destination.clone(), pair.destination_attributes.clone()));
            }
        }
        let cache = self.tree.cache().clone();
        tokio::task::spawn_blocking(move || {
            destinations
                .into_iter()
                .map(|(destination, attributes)| {
                    let siblings = list_children(&cache, &destination, attributes.as_ref());
                    (destination, siblings)
                })
                .collect()
        })
        .await
        .map_err(|e| PasteError::TaskFailed { message: e.to_string() })
    }

    /// Warns before USS or local files go into a PDS. Declining skips exactly those pairs.
    fn confirm_truncation(&self, pairs: &[PastePair], decisions: &mut [PairDecision]) {
        let affected: Vec<usize> = pairs
            .iter()
            .enumerate()
            .filter(|(index, pair)| matches!(decisions[*index], PairDecision::Proceed { .. }) && pair.truncates_records())
            .map(|(index, _)| index)
            .collect();
        if affected.is_empty() {
            return;
        }
        let organizations: Vec<DatasetOrganization> = affected
            .iter()
            .filter_map(|&i| pairs[i].destination_organization())
            .collect();
        let prompt = TruncationPrompt {
            has_local_sources: affected
                .iter()
                .any(|&i| pairs[i].source.file_system_kind() == FileSystemKind::Local),
            has_pds: organizations.contains(&DatasetOrganization::Po),
            has_pdse: organizations.contains(&DatasetOrganization::PoE),
        };
        if !self.dialogs.confirm_record_truncation(&prompt) {
            log::info!("Skipping {} pair(s) to avoid record truncation", affected.len());
            for index in affected {
                decisions[index] = PairDecision::Skip;
            }
        }
    }

    fn confirm_downloads(&self, operations: &[(usize, MoveCopyOperation)]) -> bool {
        let names: Vec<String> = operations
            .iter()
            .filter(|(_, op)| op.destination.file_system_kind() == FileSystemKind::Local)
            .map(|(_, op)| op.source.name())
            .collect();
        if names.is_empty() {
            return true;
        }
        let message = items_list_message(DOWNLOAD_START, &names, DOWNLOAD_FINISH, ITEMS_LIST_LIMIT);
        self.dialogs.confirm_download(&message)
    }

    /// Drops the entry an overwrite replaces from the virtual file system before dispatch. A
    /// replaced directory takes its whole subtree with it.
    fn remove_overwritten(&self, operations: &[(usize, MoveCopyOperation)]) {
        for (_, op) in operations.iter().filter(|(_, op)| op.force_overwriting) {
            let target = op.target_name();
            let into_pds = op.destination_attributes.as_ref().is_some_and(FileAttributes::is_pds);
            let conflicting = op.destination.children().into_iter().find(|child| {
                child.is_directory() == op.source.is_directory()
                    && if into_pds {
                        child.name().eq_ignore_ascii_case(&target)
                    } else {
                        child.name() == target
                    }
            });
            let Some(child) = conflicting else {
                continue;
            };
            let result = match child.file_system_kind() {
                FileSystemKind::Remote => {
                    let mut stack = vec![child.clone()];
                    while let Some(current) = stack.pop() {
                        stack.extend(current.children());
                        self.attributes().clear_attributes(&current);
                    }
                    self.attributes().vfs().delete(&child)
                }
                FileSystemKind::Local => match &self.local {
                    Some(local) => local.delete(&child),
                    None => continue,
                },
            };
            match result {
                Ok(()) => log::debug!("Removed {} ahead of overwrite", child.path()),
                Err(e) => log::warn!("Couldn't remove {} ahead of overwrite: {e}", child.path()),
            }
        }
    }

    /// Runs the batch on a blocking thread, one result per operation in order.
    async fn dispatch(
        &self,
        operation_id: &str,
        operations: &[(usize, MoveCopyOperation)],
        is_cut: bool,
    ) -> Result<Vec<Result<(), RemoteError>>, PasteError> {
        if operations.is_empty() {
            return Ok(Vec::new());
        }
        let batch: Vec<MoveCopyOperation> = operations.iter().map(|(_, op)| op.clone()).collect();
        let title = task_title(&batch, is_cut);
        log::info!("{title} ({operation_id})");
        let backend = self.backend.clone();
        let notifier = self.notifier.clone();
        let operation_id = operation_id.to_string();
        tokio::task::spawn_blocking(move || {
            let total = batch.len();
            batch
                .into_iter()
                .enumerate()
                .map(|(done, op)| {
                    notifier.on_progress(&PasteProgressEvent {
                        operation_id: operation_id.clone(),
                        title: title.clone(),
                        current_file: format!("{} to {}", op.source.name(), op.destination.name()),
                        files_done: done,
                        files_total: total,
                    });
                    backend.perform(&RemoteOperation::MoveCopy(op))
                })
                .collect()
        })
        .await
        .map_err(|e| PasteError::TaskFailed { message: e.to_string() })
    }

    /// Cleans the nodes showing the destinations and, for a cut, the parents of the nodes that
    /// showed the sources. Nodes without a cache are skipped.
    fn invalidate(&self, operations: &[(usize, MoveCopyOperation)], is_cut: bool) {
        if operations.is_empty() {
            return;
        }
        let destinations = prune_descendants(&distinct(operations.iter().map(|(_, op)| &op.destination)));
        let mut cleaned = self.tree.refresh_files(&destinations, true);
        if is_cut {
            let sources = prune_descendants(&distinct(operations.iter().map(|(_, op)| &op.source)));
            cleaned += self.tree.refresh_parents_of(&sources, true);
        }
        log::debug!("Cleaned {cleaned} node(s) after paste");
    }

    fn finish_performed(&self, op: &MoveCopyOperation, is_cut: bool) {
        if !is_cut {
            return;
        }
        self.buffer.remove_if(|f| *f == op.source);
        if op.is_move && op.source_attributes.is_some() {
            self.attributes().clear_attributes(&op.source);
            if let Err(e) = self.attributes().vfs().delete(&op.source) {
                log::debug!("Moved source {} already gone: {e}", op.source.path());
            }
        }
    }

    fn finish_failed(
        &self,
        operation_id: &str,
        op: &MoveCopyOperation,
        batch: &[(usize, MoveCopyOperation)],
        error: &RemoteError,
        is_drag_and_drop: bool,
    ) {
        let description = RemoteOperation::MoveCopy(op.clone()).describe();
        log::warn!("Failed to {description}: {error}");
        self.notifier.on_error(&PasteErrorEvent {
            operation_id: operation_id.to_string(),
            source: Some(op.source.path()),
            message: error.user_message(),
            error: Some(error.clone()),
        });
        if is_drag_and_drop && batch.iter().filter(|(_, other)| other.source == op.source).count() == 1 {
            self.buffer.remove_if(|f| *f == op.source);
        }
    }

    /// A cut doesn't keep skipped sources around: they and their ancestors leave the buffer.
    fn drop_skipped_from_buffer(&self, pairs: &[PastePair], decisions: &[PairDecision]) {
        for (pair, decision) in pairs.iter().zip(decisions) {
            if matches!(decision, PairDecision::Skip | PairDecision::NotResolvable(_)) {
                let mut lineage = pair.source.ancestors();
                lineage.push(pair.source.clone());
                self.buffer.remove_if(|f| lineage.contains(f));
            }
        }
    }
}

fn build_operations(pairs: &[PastePair], decisions: &[PairDecision], is_cut: bool) -> Vec<(usize, MoveCopyOperation)> {
    pairs
        .iter()
        .zip(decisions)
        .enumerate()
        .filter_map(|(index, (pair, decision))| match decision {
            PairDecision::Proceed { new_name, overwrite } => Some((
                index,
                MoveCopyOperation {
                    source: pair.source.clone(),
                    source_attributes: pair.source_attributes.clone(),
                    destination: pair.destination.clone(),
                    destination_attributes: pair.destination_attributes.clone(),
                    new_name: new_name.clone(),
                    is_move: is_cut,
                    force_overwriting: *overwrite,
                    transfer: pair.transfer,
                },
            )),
            PairDecision::Skip | PairDecision::NotResolvable(_) => None,
        })
        .collect()
}

fn list_children(cache: &FileFetchCache, destination: &VirtualFile, attributes: Option<&FileAttributes>) -> Vec<Sibling> {
    let files = match attributes.and_then(RemoteQuery::for_children_of) {
        Some(query) => match cache.fetch(&query) {
            Ok(files) => files,
            Err(e) => {
                log::warn!("Listing {query} for conflict checks failed, using known children: {e}");
                destination.children()
            }
        },
        None => destination.children(),
    };
    files.iter().map(|f| Sibling::new(&f.name(), f.is_directory())).collect()
}

fn task_title(operations: &[MoveCopyOperation], is_cut: bool) -> String {
    let has_local_sources = operations
        .iter()
        .any(|op| op.source.file_system_kind() == FileSystemKind::Local);
    let has_remote_destinations = operations
        .iter()
        .any(|op| op.destination.file_system_kind() == FileSystemKind::Remote);
    let prefix = match (is_cut, has_local_sources, has_remote_destinations) {
        (false, _, _) => "Copying",
        (true, false, true) => "Moving",
        (true, false, false) => "Downloading",
        (true, true, _) => "Uploading",
    };
    format!("{prefix} {} file(s)", operations.len())
}

fn distinct<'a>(files: impl Iterator<Item = &'a VirtualFile>) -> Vec<VirtualFile> {
    let mut result: Vec<VirtualFile> = Vec::new();
    for file in files {
        if !result.contains(file) {
            result.push(file.clone());
        }
    }
    result
}
