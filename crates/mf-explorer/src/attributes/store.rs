//! Maps virtual files to their remote attributes and back.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{AttributesError, AttributesKey, AttributesKind, FileAttributes};
use crate::config::url_to_dir_name;
use crate::ignore_poison::IgnorePoisonRw;
use crate::vfs::{FileId, FileSystemKind, VfsError, VirtualFile, VirtualFileSystem};

/// Directory under a connection's host dir holding datasets and members.
pub const DATASETS_FOLDER: &str = "Data Sets";
/// Directory under a connection's host dir holding USS files.
pub const USS_FOLDER: &str = "USS";

/// What happened to a file's attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributesChange {
    Created(FileAttributes),
    Updated { old: FileAttributes, new: FileAttributes },
    Cleared(FileAttributes),
}

/// Observer for attribute changes.
pub trait AttributesListener: Send + Sync {
    fn on_attributes_changed(&self, file: &VirtualFile, change: &AttributesChange);
}

#[derive(Default)]
struct Index {
    by_file: HashMap<FileId, (VirtualFile, FileAttributes)>,
    by_key: HashMap<AttributesKey, VirtualFile>,
}

/// Holds the attributes of every remote file the explorer has seen.
pub struct AttributesStore {
    vfs: Arc<VirtualFileSystem>,
    index: RwLock<Index>,
    listeners: RwLock<Vec<Arc<dyn AttributesListener>>>,
}

impl AttributesStore {
    pub fn new(vfs: Arc<VirtualFileSystem>) -> Self {
        Self {
            vfs,
            index: RwLock::new(Index::default()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// The remote file system this store populates.
    pub fn vfs(&self) -> &Arc<VirtualFileSystem> {
        &self.vfs
    }

    pub fn add_listener(&self, listener: Arc<dyn AttributesListener>) {
        self.listeners.write_ignore_poison().push(listener);
    }

    /// Returns the attributes of `file`, or `None` for unknown or stale files.
    pub fn try_get_attributes(&self, file: &VirtualFile) -> Option<FileAttributes> {
        if !file.is_valid() {
            return None;
        }
        self.index
            .read_ignore_poison()
            .by_file
            .get(&file.id())
            .map(|(_, attrs)| attrs.clone())
    }

    /// Reverse lookup: the file registered for the entity `attributes` describe.
    pub fn try_get_file(&self, attributes: &FileAttributes) -> Option<VirtualFile> {
        self.index
            .read_ignore_poison()
            .by_key
            .get(&attributes.key())
            .filter(|f| f.is_valid())
            .cloned()
    }

    /// Returns the file for `attributes`, creating the `<host>/<folder>/...` chain if needed.
    /// Attributes of an already known file are replaced with the fresh ones.
    pub fn get_or_create_file(&self, attributes: FileAttributes) -> Result<VirtualFile, VfsError> {
        if let Some(existing) = self.try_get_file(&attributes) {
            let old = self.store(&existing, attributes.clone());
            if let Some(old) = old
                && old != attributes
            {
                self.notify(&existing, &AttributesChange::Updated { old, new: attributes });
            }
            return Ok(existing);
        }

        let file = self.create_chain(&attributes)?;
        // The chain may reuse a file that was registered under a different key (e.g. a
        // directory seeded as an intermediate segment before its own attributes arrived).
        let old = self.store(&file, attributes.clone());
        let change = match old {
            Some(old) => AttributesChange::Updated { old, new: attributes },
            None => AttributesChange::Created(attributes),
        };
        self.notify(&file, &change);
        Ok(file)
    }

    /// Replaces the attributes of a known file. A changed name renames the file too.
    pub fn update_attributes(&self, file: &VirtualFile, attributes: FileAttributes) -> Result<(), AttributesError> {
        let old = self
            .try_get_attributes(file)
            .ok_or_else(|| AttributesError::Unknown { path: file.path() })?;
        if old.kind() != attributes.kind() {
            return Err(AttributesError::KindMismatch {
                expected: old.kind(),
                actual: attributes.kind(),
            });
        }
        if old.name() != attributes.name() {
            self.vfs.rename(file, attributes.name())?;
        }
        self.store(file, attributes.clone());
        self.notify(file, &AttributesChange::Updated { old, new: attributes });
        Ok(())
    }

    /// Forgets the attributes of `file`. Returns what was stored.
    pub fn clear_attributes(&self, file: &VirtualFile) -> Option<FileAttributes> {
        let removed = {
            let mut index = self.index.write_ignore_poison();
            let removed = index.by_file.remove(&file.id()).map(|(_, attrs)| attrs);
            if let Some(attrs) = &removed {
                index.by_key.remove(&attrs.key());
            }
            removed
        };
        if let Some(attrs) = &removed {
            self.notify(file, &AttributesChange::Cleared(attrs.clone()));
        }
        removed
    }

    /// A typed view for one attributes kind. Local files carry no attributes, so there is no
    /// service for them.
    pub fn attributes_service(
        &self,
        kind: AttributesKind,
        file_system_kind: FileSystemKind,
    ) -> Option<AttributesService<'_>> {
        match file_system_kind {
            FileSystemKind::Remote => Some(AttributesService { store: self, kind }),
            FileSystemKind::Local => None,
        }
    }

    fn store(&self, file: &VirtualFile, attributes: FileAttributes) -> Option<FileAttributes> {
        let mut index = self.index.write_ignore_poison();
        let old = index
            .by_file
            .insert(file.id(), (file.clone(), attributes.clone()))
            .map(|(_, attrs)| attrs);
        if let Some(old) = &old {
            index.by_key.remove(&old.key());
        }
        index.by_key.insert(attributes.key(), file.clone());
        old
    }

    fn create_chain(&self, attributes: &FileAttributes) -> Result<VirtualFile, VfsError> {
        let host = url_to_dir_name(attributes.url().unwrap_or("unknown"));
        let host_dir = self.vfs.find_or_create_child(&self.vfs.root(), &host, true)?;
        match attributes {
            FileAttributes::Dataset(d) => {
                let folder = self.vfs.find_or_create_child(&host_dir, DATASETS_FOLDER, true)?;
                self.vfs.find_or_create_child(&folder, &d.name, attributes.is_directory())
            }
            FileAttributes::Member(m) => {
                let folder = self.vfs.find_or_create_child(&host_dir, DATASETS_FOLDER, true)?;
                let library = self.vfs.find_or_create_child(&folder, &m.library_name, true)?;
                self.vfs.find_or_create_child(&library, &m.name, false)
            }
            FileAttributes::Uss(u) => {
                let mut current = self.vfs.find_or_create_child(&host_dir, USS_FOLDER, true)?;
                let segments: Vec<&str> = u.path.split('/').filter(|s| !s.is_empty()).collect();
                for (i, segment) in segments.iter().enumerate() {
                    let is_last = i + 1 == segments.len();
                    let is_directory = !is_last || u.is_directory;
                    current = self.vfs.find_or_create_child(&current, segment, is_directory)?;
                }
                Ok(current)
            }
        }
    }

    fn notify(&self, file: &VirtualFile, change: &AttributesChange) {
        let listeners = self.listeners.read_ignore_poison().clone();
        for listener in listeners {
            listener.on_attributes_changed(file, change);
        }
    }
}

/// Attribute access restricted to one kind.
pub struct AttributesService<'a> {
    store: &'a AttributesStore,
    kind: AttributesKind,
}

impl AttributesService<'_> {
    pub fn kind(&self) -> AttributesKind {
        self.kind
    }

    /// Attributes of `file` if it is of this service's kind.
    pub fn get(&self, file: &VirtualFile) -> Option<FileAttributes> {
        self.store.try_get_attributes(file).filter(|a| a.kind() == self.kind)
    }

    pub fn get_or_create(&self, attributes: FileAttributes) -> Result<VirtualFile, AttributesError> {
        self.check_kind(&attributes)?;
        Ok(self.store.get_or_create_file(attributes)?)
    }

    pub fn update(&self, file: &VirtualFile, attributes: FileAttributes) -> Result<(), AttributesError> {
        self.check_kind(&attributes)?;
        self.store.update_attributes(file, attributes)
    }

    pub fn clear(&self, file: &VirtualFile) -> Option<FileAttributes> {
        self.get(file)?;
        self.store.clear_attributes(file)
    }

    fn check_kind(&self, attributes: &FileAttributes) -> Result<(), AttributesError> {
        if attributes.kind() != self.kind {
            return Err(AttributesError::KindMismatch {
                expected: self.kind,
                actual: attributes.kind(),
            });
        }
        Ok(())
    }
}
