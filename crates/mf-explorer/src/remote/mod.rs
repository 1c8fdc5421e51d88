//! Remote I/O backend seam.
//!
//! The explorer never speaks a wire protocol itself. Every mutation is described as a
//! [`RemoteOperation`] and handed to a [`RemoteBackend`]; success carries no payload.

mod in_memory;

pub use in_memory::InMemoryMainframe;

use serde::Serialize;

use crate::attributes::{DatasetOrganization, FileAttributes};
use crate::config::ConnectionConfig;
use crate::resolver::member_name_for;
use crate::vfs::VirtualFile;

/// How bytes travel for a copy or move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    /// Both ends on one system: a cheap server-side copy or rename.
    SameSystem,
    /// Different systems: download from one, upload to the other.
    CrossSystem,
    /// Local disk to a remote system.
    Upload,
    /// Remote system to local disk.
    Download,
}

/// One copy or move, as dispatched to the backend.
#[derive(Debug, Clone)]
pub struct MoveCopyOperation {
    pub source: VirtualFile,
    pub source_attributes: Option<FileAttributes>,
    pub destination: VirtualFile,
    pub destination_attributes: Option<FileAttributes>,
    /// `None` keeps the name the source gets by default.
    pub new_name: Option<String>,
    pub is_move: bool,
    /// An existing entry with the target name is replaced.
    pub force_overwriting: bool,
    pub transfer: TransferKind,
}

impl MoveCopyOperation {
    /// Name the entity will have in the destination.
    pub fn target_name(&self) -> String {
        if let Some(name) = &self.new_name {
            return name.clone();
        }
        match &self.destination_attributes {
            Some(dest) if dest.is_pds() => member_name_for(&self.source.name(), self.source_attributes.as_ref()),
            _ => self.source.name(),
        }
    }
}

/// Parameters for a new dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetAllocation {
    pub name: String,
    pub organization: DatasetOrganization,
    pub record_format: Option<String>,
    pub volser: Option<String>,
}

/// Every mutation the explorer can ask of a system.
#[derive(Debug, Clone)]
pub enum RemoteOperation {
    MoveCopy(MoveCopyOperation),
    Rename {
        attributes: FileAttributes,
        new_name: String,
    },
    Delete {
        attributes: FileAttributes,
    },
    AllocateDataset {
        connection: ConnectionConfig,
        allocation: DatasetAllocation,
    },
    AllocateMember {
        library: FileAttributes,
        name: String,
    },
    CreateUssEntity {
        parent: FileAttributes,
        name: String,
        is_directory: bool,
    },
}

impl RemoteOperation {
    /// Short description for logs and error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::MoveCopy(op) => format!(
                "{} {} to {}",
                if op.is_move { "move" } else { "copy" },
                op.source.path(),
                op.destination.path()
            ),
            Self::Rename { attributes, new_name } => format!("rename {} to {}", attributes.name(), new_name),
            Self::Delete { attributes } => format!("delete {}", attributes.name()),
            Self::AllocateDataset { allocation, .. } => format!("allocate {}", allocation.name),
            Self::AllocateMember { library, name } => format!("allocate {}({})", library.name(), name),
            Self::CreateUssEntity { parent, name, .. } => format!("create {}/{}", parent.name(), name),
        }
    }
}

/// Performs remote operations. Calls block; run them off the UI thread.
pub trait RemoteBackend: Send + Sync {
    fn perform(&self, operation: &RemoteOperation) -> Result<(), RemoteError>;
}

// ============================================================================
// Errors
// ============================================================================

/// Failure reported by the remote backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RemoteError {
    /// The system can't do this kind of operation.
    Unsupported { operation: String },
    NotFound { path: String },
    AlreadyExists { path: String },
    InvalidName { name: String },
    /// The system rejected the call.
    Call { code: u16, message: String },
    Connection { url: String, message: String },
}

impl RemoteError {
    /// Returns a user-friendly message for this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unsupported { operation } => format!("Can't {}: not supported.", operation),
            Self::NotFound { path } => format!("'{}' was not found. It may have been deleted.", path),
            Self::AlreadyExists { path } => format!("'{}' already exists.", path),
            Self::InvalidName { name } => format!("'{}' is not a valid name here.", name),
            Self::Call { code, message } => format!("The system answered with error {}: {}", code, message),
            Self::Connection { url, .. } => format!("Couldn't reach {}. Check the connection.", url),
        }
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsupported { operation } => write!(f, "unsupported operation: {operation}"),
            Self::NotFound { path } => write!(f, "not found: {path}"),
            Self::AlreadyExists { path } => write!(f, "already exists: {path}"),
            Self::InvalidName { name } => write!(f, "invalid name: {name}"),
            Self::Call { code, message } => write!(f, "call failed with {code}: {message}"),
            Self::Connection { url, message } => write!(f, "connection to {url} failed: {message}"),
        }
    }
}

impl std::error::Error for RemoteError {}
