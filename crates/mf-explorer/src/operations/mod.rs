//! Rename, delete and allocation of remote entities.
//!
//! Each call runs the backend on a blocking thread, then brings the attributes store, the
//! virtual file system and the tree caches in line with what changed on the system.


use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::attributes::{AttributesError, AttributesKind, AttributesStore, FileAttributes};
use crate::config::ConnectionConfig;
use crate::paste::prune_descendants;
use crate::remote::{DatasetAllocation, RemoteBackend, RemoteError, RemoteOperation};
use crate::resolver::{is_valid_dataset_name, is_valid_member_name};
use crate::tree::ExplorerTreeStructure;
use crate::vfs::VirtualFile;

// ============================================================================
// Errors
// ============================================================================

/// Why a rename, delete or allocation didn't happen.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OperationError {
    /// The file has no remote attributes, so the explorer can't address it.
    NoAttributes { path: String },
    InvalidName { name: String },
    /// A sibling already uses the name.
    AlreadyExists { name: String },
    /// The parent can't hold the requested entry (not a PDS or USS directory).
    InvalidTarget { path: String },
    /// The system refused the operation.
    Remote { operation: String, error: RemoteError },
    /// The operation succeeded but the local model couldn't follow.
    Attributes { error: AttributesError },
    /// The background task died before reporting back.
    TaskFailed { message: String },
}

impl OperationError {
    pub fn user_message(&self) -> String {
        match self {
            Self::NoAttributes { path } => {
                format!("'{path}' isn't a remote file the explorer knows. Refresh the tree and try again.")
            }
            Self::InvalidName { name } => format!("'{name}' is not a valid name here."),
            Self::AlreadyExists { name } => format!("'{name}' already exists."),
            Self::InvalidTarget { path } => format!("Can't create entries in '{path}'."),
            Self::Remote { error, .. } => error.user_message(),
            Self::Attributes { error } => error.user_message(),
            Self::TaskFailed { message } => format!("The operation stopped unexpectedly: {message}"),
        }
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAttributes { path } => write!(f, "no attributes for {path}"),
            Self::InvalidName { name } => write!(f, "invalid name: {name}"),
            Self::AlreadyExists { name } => write!(f, "already exists: {name}"),
            Self::InvalidTarget { path } => write!(f, "not a container: {path}"),
            Self::Remote { operation, error } => write!(f, "{operation} failed: {error}"),
            Self::Attributes { error } => write!(f, "{error}"),
            Self::TaskFailed { message } => write!(f, "task failed: {message}"),
        }
    }
}

impl std::error::Error for OperationError {}

impl From<AttributesError> for OperationError {
    fn from(error: AttributesError) -> Self {
        Self::Attributes { error }
    }
}

// ============================================================================
// Operations
// ============================================================================

/// One file a delete couldn't remove.
#[derive(Debug, Clone)]
pub struct DeleteFailure {
    pub file: VirtualFile,
    pub error: OperationError,
}

/// Result of deleting a selection. Files nested in other selected files aren't listed.
#[derive(Debug, Clone, Default)]
pub struct DeleteReport {
    pub deleted: Vec<VirtualFile>,
    pub failed: Vec<DeleteFailure>,
}

/// Explorer mutations other than copy and move.
pub struct ExplorerOperations {
    tree: Arc<ExplorerTreeStructure>,
    backend: Arc<dyn RemoteBackend>,
}

impl ExplorerOperations {
    pub fn new(tree: Arc<ExplorerTreeStructure>, backend: Arc<dyn RemoteBackend>) -> Self {
        Self { tree, backend }
    }

    fn attributes(&self) -> &Arc<AttributesStore> {
        self.tree.cache().attributes()
    }

    fn attributes_of(&self, file: &VirtualFile) -> Result<FileAttributes, OperationError> {
        self.attributes()
            .try_get_attributes(file)
            .ok_or_else(|| OperationError::NoAttributes { path: file.path() })
    }

    /// Renames a dataset, member or USS entry. Dataset and member names are upper cased before
    /// validation. Renaming to the current name does nothing.
    pub async fn rename(&self, file: &VirtualFile, new_name: &str) -> Result<(), OperationError> {
        let attributes = self.attributes_of(file)?;
        let kind = attributes.kind();
        let new_name = normalized_name(kind, new_name)?;
        if new_name == attributes.name() {
            return Ok(());
        }
        if let Some(parent) = file.parent() {
            check_name_free(&parent, &new_name, kind != AttributesKind::Uss)?;
        }

        self.perform(RemoteOperation::Rename {
            attributes: attributes.clone(),
            new_name: new_name.clone(),
        })
        .await?;

        // Children are keyed by the old name; they come back on the next listing.
        if file.is_directory() {
            for child in file.children() {
                self.forget(&child);
            }
        }
        self.attributes().update_attributes(file, attributes.with_name(&new_name))?;
        self.tree.refresh_parents_of(std::slice::from_ref(file), true);
        if file.is_directory() {
            // Their queries still name the old path
            self.drop_nodes_showing(file);
        }
        log::info!("Renamed {} to {new_name}", attributes.name());
        Ok(())
    }

    /// Deletes every file in `files`. Failures don't stop the rest; they are collected in the
    /// report.
    pub async fn delete(&self, files: &[VirtualFile]) -> Result<DeleteReport, OperationError> {
        let mut report = DeleteReport::default();
        let mut operations = Vec::new();
        for file in prune_descendants(files) {
            match self.attributes_of(&file) {
                Ok(attributes) => operations.push((file, RemoteOperation::Delete { attributes })),
                Err(error) => report.failed.push(DeleteFailure { file, error }),
            }
        }
        if operations.is_empty() {
            return Ok(report);
        }

        log::info!("Deleting {} file(s)", operations.len());
        let backend = self.backend.clone();
        let batch: Vec<RemoteOperation> = operations.iter().map(|(_, op)| op.clone()).collect();
        let results: Vec<Result<(), RemoteError>> =
            tokio::task::spawn_blocking(move || batch.iter().map(|op| backend.perform(op)).collect())
                .await
                .map_err(|e| OperationError::TaskFailed { message: e.to_string() })?;

        for ((file, operation), result) in operations.into_iter().zip(results) {
            match result {
                Ok(()) => report.deleted.push(file),
                Err(error) => {
                    let operation = operation.describe();
                    log::warn!("Failed to {operation}: {error}");
                    report.failed.push(DeleteFailure {
                        file,
                        error: OperationError::Remote { operation, error },
                    });
                }
            }
        }

        let cleaned = self.tree.refresh_parents_of(&report.deleted, true);
        for file in &report.deleted {
            self.drop_nodes_showing(file);
            self.forget(file);
        }
        log::debug!(
            "Deleted {} file(s), {} failed, cleaned {cleaned} node(s)",
            report.deleted.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Allocates a dataset and refreshes every cached dataset listing on that connection whose
    /// mask matches the new name.
    pub async fn allocate_dataset(
        &self,
        connection: &ConnectionConfig,
        allocation: DatasetAllocation,
    ) -> Result<(), OperationError> {
        let name = normalized_name(AttributesKind::Dataset, &allocation.name)?;
        self.perform(RemoteOperation::AllocateDataset {
            connection: connection.clone(),
            allocation: DatasetAllocation {
                name: name.clone(),
                ..allocation
            },
        })
        .await?;

        let queries = self
            .tree
            .cache()
            .queries_matching(|q| q.connection.url == connection.url && q.request.matches_dataset(&name));
        let cleaned = self.tree.refresh_queries(&queries, true);
        log::debug!("Allocated {name}, cleaned {cleaned} node(s)");
        Ok(())
    }

    /// Creates an empty member in the PDS `library`.
    pub async fn allocate_member(&self, library: &VirtualFile, name: &str) -> Result<(), OperationError> {
        let attributes = self.attributes_of(library)?;
        if !attributes.is_pds() {
            return Err(OperationError::InvalidTarget { path: library.path() });
        }
        let name = normalized_name(AttributesKind::Member, name)?;
        check_name_free(library, &name, true)?;
        self.perform(RemoteOperation::AllocateMember {
            library: attributes,
            name,
        })
        .await?;
        self.tree.refresh_files(std::slice::from_ref(library), true);
        Ok(())
    }

    /// Creates a USS file or directory under the USS directory `parent`.
    pub async fn create_uss_entity(
        &self,
        parent: &VirtualFile,
        name: &str,
        is_directory: bool,
    ) -> Result<(), OperationError> {
        let attributes = self.attributes_of(parent)?;
        if !matches!(&attributes, FileAttributes::Uss(u) if u.is_directory) {
            return Err(OperationError::InvalidTarget { path: parent.path() });
        }
        let name = normalized_name(AttributesKind::Uss, name)?;
        check_name_free(parent, &name, false)?;
        self.perform(RemoteOperation::CreateUssEntity {
            parent: attributes,
            name,
            is_directory,
        })
        .await?;
        self.tree.refresh_files(std::slice::from_ref(parent), true);
        Ok(())
    }

    async fn perform(&self, operation: RemoteOperation) -> Result<(), OperationError> {
        let description = operation.describe();
        log::info!("Starting to {description}");
        let backend = self.backend.clone();
        let result = tokio::task::spawn_blocking(move || backend.perform(&operation))
            .await
            .map_err(|e| OperationError::TaskFailed { message: e.to_string() })?;
        result.map_err(|error| {
            log::warn!("Failed to {description}: {error}");
            OperationError::Remote {
                operation: description,
                error,
            }
        })
    }

    /// Clears the attributes of `file` and everything below it, then drops it from the model.
    fn forget(&self, file: &VirtualFile) {
        let mut stack = vec![file.clone()];
        while let Some(current) = stack.pop() {
            stack.extend(current.children());
            self.attributes().clear_attributes(&current);
        }
        if let Err(e) = self.attributes().vfs().delete(file) {
            log::debug!("{} already gone from the model: {e}", file.path());
        }
    }

    fn drop_nodes_showing(&self, file: &VirtualFile) {
        for node in self.tree.find_nodes_for_entity(file) {
            self.tree.unregister(node.id());
        }
    }
}

/// Upper cases mainframe names and checks the result is legal for `kind`.
fn normalized_name(kind: AttributesKind, name: &str) -> Result<String, OperationError> {
    let invalid = || OperationError::InvalidName { name: name.to_string() };
    match kind {
        AttributesKind::Dataset => {
            let name = name.trim().to_uppercase();
            if is_valid_dataset_name(&name) { Ok(name) } else { Err(invalid()) }
        }
        AttributesKind::Member => {
            let name = name.trim().to_uppercase();
            if is_valid_member_name(&name) { Ok(name) } else { Err(invalid()) }
        }
        AttributesKind::Uss => {
            if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
                Err(invalid())
            } else {
                Ok(name.to_string())
            }
        }
    }
}

fn check_name_free(parent: &VirtualFile, name: &str, ignore_case: bool) -> Result<(), OperationError> {
    let taken = parent.children().iter().any(|child| {
        if ignore_case {
            child.name().eq_ignore_ascii_case(name)
        } else {
            child.name() == name
        }
    });
    if taken {
        Err(OperationError::AlreadyExists { name: name.to_string() })
    } else {
        Ok(())
    }
}
