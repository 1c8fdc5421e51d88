//! Unified virtual file model.
//!
//! Every entity the explorer deals with (a local disk file, a remote dataset, a member inside a
//! partitioned dataset, a USS file or directory) is a [`VirtualFile`] handle living in some
//! [`VirtualFileSystem`]. Handles are cheap to clone and compare by identity. A handle becomes
//! stale when its entity is deleted from the model; operations on stale handles fail with
//! [`VfsError::Stale`] instead of panicking.

mod model;

pub use model::VirtualFileSystem;

use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use crate::ignore_poison::IgnorePoisonRw;

static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique id of a virtual file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FileId(u64);

impl FileId {
    fn next() -> Self {
        Self(NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Which namespace a file lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSystemKind {
    Local,
    Remote,
}

/// Identity of a file system instance. Two files belong to the same namespace iff their
/// identities are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileSystemIdentity {
    kind: FileSystemKind,
    token: Arc<str>,
}

impl FileSystemIdentity {
    pub fn new(kind: FileSystemKind, token: &str) -> Self {
        Self {
            kind,
            token: Arc::from(token),
        }
    }

    pub fn kind(&self) -> FileSystemKind {
        self.kind
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors from mutating the virtual file model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum VfsError {
    /// The handle refers to an entity that was deleted from the model.
    Stale { path: String },
    /// Tried to create or move something under a non-directory.
    NotADirectory { path: String },
    /// A sibling with this name already exists.
    AlreadyExists { path: String },
    /// Existing entry has a different kind (file vs directory) than requested.
    KindMismatch { path: String },
    /// Name is empty or contains a path separator.
    InvalidName { name: String },
    /// The handle belongs to a different file system.
    ForeignFile { path: String },
    /// The root can't be renamed, moved, or deleted.
    RootImmutable,
    /// Tried to move a directory into itself or one of its descendants.
    MoveIntoSelf { path: String },
}

impl VfsError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Stale { path } => format!("'{}' no longer exists. Refresh the tree and try again.", path),
            Self::NotADirectory { path } => format!("'{}' is not a directory.", path),
            Self::AlreadyExists { path } => format!("'{}' already exists.", path),
            Self::KindMismatch { path } => {
                format!("'{}' changed between file and directory. Refresh the tree.", path)
            }
            Self::InvalidName { name } => format!("'{}' is not a valid name.", name),
            Self::ForeignFile { path } => format!("'{}' belongs to another file system.", path),
            Self::RootImmutable => "The root can't be changed.".to_string(),
            Self::MoveIntoSelf { path } => format!("Can't move '{}' into itself.", path),
        }
    }
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stale { path } => write!(f, "stale file handle: {path}"),
            Self::NotADirectory { path } => write!(f, "not a directory: {path}"),
            Self::AlreadyExists { path } => write!(f, "already exists: {path}"),
            Self::KindMismatch { path } => write!(f, "file kind mismatch: {path}"),
            Self::InvalidName { name } => write!(f, "invalid name: {name:?}"),
            Self::ForeignFile { path } => write!(f, "file from another file system: {path}"),
            Self::RootImmutable => write!(f, "root is immutable"),
            Self::MoveIntoSelf { path } => write!(f, "can't move into itself: {path}"),
        }
    }
}

impl std::error::Error for VfsError {}

// ============================================================================
// Handles
// ============================================================================

struct FileNode {
    id: FileId,
    name: RwLock<String>,
    is_directory: bool,
    file_system: FileSystemIdentity,
    parent: RwLock<Weak<FileNode>>,
    children: RwLock<Vec<VirtualFile>>,
    valid: AtomicBool,
}

/// Handle to an entity in a [`VirtualFileSystem`].
#[derive(Clone)]
pub struct VirtualFile(Arc<FileNode>);

impl VirtualFile {
    fn new_node(name: &str, is_directory: bool, file_system: FileSystemIdentity, parent: Option<&VirtualFile>) -> Self {
        Self(Arc::new(FileNode {
            id: FileId::next(),
            name: RwLock::new(name.to_string()),
            is_directory,
            file_system,
            parent: RwLock::new(parent.map(|p| Arc::downgrade(&p.0)).unwrap_or_default()),
            children: RwLock::new(Vec::new()),
            valid: AtomicBool::new(true),
        }))
    }

    pub fn id(&self) -> FileId {
        self.0.id
    }

    pub fn name(&self) -> String {
        self.0.name.read_ignore_poison().clone()
    }

    pub fn is_directory(&self) -> bool {
        self.0.is_directory
    }

    pub fn file_system(&self) -> &FileSystemIdentity {
        &self.0.file_system
    }

    pub fn file_system_kind(&self) -> FileSystemKind {
        self.0.file_system.kind
    }

    /// Returns the parent, or `None` for a root or a detached (deleted) file.
    pub fn parent(&self) -> Option<VirtualFile> {
        self.0.parent.read_ignore_poison().upgrade().map(VirtualFile)
    }

    /// Snapshot of the current children, in insertion order.
    pub fn children(&self) -> Vec<VirtualFile> {
        self.0.children.read_ignore_poison().clone()
    }

    pub fn find_child(&self, name: &str) -> Option<VirtualFile> {
        self.0
            .children
            .read_ignore_poison()
            .iter()
            .find(|c| c.0.name.read_ignore_poison().as_str() == name)
            .cloned()
    }

    /// Whether the entity is still part of its file system.
    pub fn is_valid(&self) -> bool {
        self.0.valid.load(Ordering::Acquire)
    }

    /// Slash-separated path from the root, e.g. `/host/Data Sets/USER.DATA`.
    pub fn path(&self) -> String {
        let mut names = Vec::new();
        let mut current = Some(self.clone());
        while let Some(file) = current {
            let parent = file.parent();
            if parent.is_some() {
                names.push(file.name());
            }
            current = parent;
        }
        names.reverse();
        format!("/{}", names.join("/"))
    }

    /// Walks up the parent chain, nearest first.
    pub fn ancestors(&self) -> Vec<VirtualFile> {
        let mut result = Vec::new();
        let mut current = self.parent();
        while let Some(file) = current {
            current = file.parent();
            result.push(file);
        }
        result
    }

    /// True if `self` is `other` (when not `strict`) or one of `other`'s ancestors.
    pub fn is_ancestor_of(&self, other: &VirtualFile, strict: bool) -> bool {
        if self.file_system() != other.file_system() {
            return false;
        }
        if self == other {
            return !strict;
        }
        other.ancestors().iter().any(|a| a == self)
    }

    fn set_parent(&self, parent: Option<&VirtualFile>) {
        *self.0.parent.write_ignore_poison() = parent.map(|p| Arc::downgrade(&p.0)).unwrap_or_default();
    }

    fn invalidate_subtree(&self) {
        self.0.valid.store(false, Ordering::Release);
        for child in self.0.children.write_ignore_poison().drain(..) {
            child.invalidate_subtree();
        }
    }
}

impl PartialEq for VirtualFile {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for VirtualFile {}

impl Hash for VirtualFile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for VirtualFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualFile")
            .field("id", &self.0.id.0)
            .field("path", &self.path())
            .field("is_directory", &self.0.is_directory)
            .field("fs", &self.0.file_system.token)
            .finish()
    }
}
