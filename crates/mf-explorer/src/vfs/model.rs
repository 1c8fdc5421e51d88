//! Mutable, lazily populated tree of virtual files for one namespace.

use super::{FileSystemIdentity, FileSystemKind, VfsError, VirtualFile};
use crate::ignore_poison::IgnorePoisonRw;

/// Owns the root of one file system and performs all structural mutations on it.
pub struct VirtualFileSystem {
    identity: FileSystemIdentity,
    root: VirtualFile,
}

impl VirtualFileSystem {
    pub fn new(kind: FileSystemKind, token: &str) -> Self {
        let identity = FileSystemIdentity::new(kind, token);
        let root = VirtualFile::new_node("", true, identity.clone(), None);
        Self { identity, root }
    }

    /// The remote (mainframe) namespace.
    pub fn remote() -> Self {
        Self::new(FileSystemKind::Remote, "mf")
    }

    /// A local disk namespace.
    pub fn local() -> Self {
        Self::new(FileSystemKind::Local, "local")
    }

    pub fn identity(&self) -> &FileSystemIdentity {
        &self.identity
    }

    pub fn root(&self) -> VirtualFile {
        self.root.clone()
    }

    /// Returns the existing child called `name`, creating it if missing.
    pub fn find_or_create_child(
        &self,
        parent: &VirtualFile,
        name: &str,
        is_directory: bool,
    ) -> Result<VirtualFile, VfsError> {
        self.check_parent(parent)?;
        validate_name(name)?;

        let mut children = parent.0.children.write_ignore_poison();
        if let Some(existing) = children.iter().find(|c| c.0.name.read_ignore_poison().as_str() == name) {
            if existing.is_directory() != is_directory {
                return Err(VfsError::KindMismatch {
                    path: existing.path(),
                });
            }
            return Ok(existing.clone());
        }
        let child = VirtualFile::new_node(name, is_directory, self.identity.clone(), Some(parent));
        children.push(child.clone());
        Ok(child)
    }

    /// Creates a new child, failing if the name is taken.
    pub fn create_child(&self, parent: &VirtualFile, name: &str, is_directory: bool) -> Result<VirtualFile, VfsError> {
        if let Some(existing) = parent.find_child(name) {
            return Err(VfsError::AlreadyExists {
                path: existing.path(),
            });
        }
        self.find_or_create_child(parent, name, is_directory)
    }

    /// Follows `segments` from the root without creating anything.
    pub fn find_by_path(&self, segments: &[&str]) -> Option<VirtualFile> {
        segments
            .iter()
            .try_fold(self.root.clone(), |current, segment| current.find_child(segment))
    }

    /// Detaches `file` from its parent and marks it and all descendants stale.
    pub fn delete(&self, file: &VirtualFile) -> Result<(), VfsError> {
        self.check_own(file)?;
        let parent = file.parent().ok_or(VfsError::RootImmutable)?;
        parent.0.children.write_ignore_poison().retain(|c| c != file);
        file.set_parent(None);
        file.invalidate_subtree();
        Ok(())
    }

    pub fn rename(&self, file: &VirtualFile, new_name: &str) -> Result<(), VfsError> {
        self.check_own(file)?;
        validate_name(new_name)?;
        let parent = file.parent().ok_or(VfsError::RootImmutable)?;
        if let Some(existing) = parent.find_child(new_name)
            && existing != *file
        {
            return Err(VfsError::AlreadyExists {
                path: existing.path(),
            });
        }
        *file.0.name.write_ignore_poison() = new_name.to_string();
        Ok(())
    }

    /// Re-parents `file` under `new_parent`, keeping its name.
    pub fn move_file(&self, file: &VirtualFile, new_parent: &VirtualFile) -> Result<(), VfsError> {
        self.check_own(file)?;
        self.check_parent(new_parent)?;
        let old_parent = file.parent().ok_or(VfsError::RootImmutable)?;
        if file.is_ancestor_of(new_parent, false) {
            return Err(VfsError::MoveIntoSelf { path: file.path() });
        }
        if old_parent == *new_parent {
            return Ok(());
        }
        if let Some(existing) = new_parent.find_child(&file.name()) {
            return Err(VfsError::AlreadyExists {
                path: existing.path(),
            });
        }
        old_parent.0.children.write_ignore_poison().retain(|c| c != file);
        new_parent.0.children.write_ignore_poison().push(file.clone());
        file.set_parent(Some(new_parent));
        Ok(())
    }

    fn check_own(&self, file: &VirtualFile) -> Result<(), VfsError> {
        if file.file_system() != &self.identity {
            return Err(VfsError::ForeignFile { path: file.path() });
        }
        if !file.is_valid() {
            return Err(VfsError::Stale { path: file.name() });
        }
        Ok(())
    }

    fn check_parent(&self, parent: &VirtualFile) -> Result<(), VfsError> {
        self.check_own(parent)?;
        if !parent.is_directory() {
            return Err(VfsError::NotADirectory { path: parent.path() });
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), VfsError> {
    if name.is_empty() || name.contains('/') {
        return Err(VfsError::InvalidName { name: name.to_string() });
    }
    Ok(())
}
