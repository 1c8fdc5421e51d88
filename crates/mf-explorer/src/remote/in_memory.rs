//! In-memory mainframe for testing.
//!
//! Keeps datasets, members and USS paths per connection URL and serves both the listing and
//! the mutation side of the backend. Useful for unit tests and for running the explorer without
//! a real system.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use super::{MoveCopyOperation, RemoteBackend, RemoteError, RemoteOperation};
use crate::attributes::{
    DatasetAttributes, DatasetOrganization, FileAttributes, MemberAttributes, Requester, UssAttributes,
};
use crate::config::ConnectionConfig;
use crate::fetch::{FetchBackend, FetchError, FetchRequest, FetchedBatch, RemoteQuery};
use crate::ignore_poison::IgnorePoison;
use crate::resolver::is_valid_member_name;
use crate::vfs::{FileSystemKind, VirtualFile, VirtualFileSystem};

struct StoredDataset {
    organization: DatasetOrganization,
    members: BTreeSet<String>,
}

#[derive(Default)]
struct HostState {
    datasets: BTreeMap<String, StoredDataset>,
    /// USS path -> is directory. `/` is implied.
    uss: BTreeMap<String, bool>,
}

impl HostState {
    fn uss_kind(&self, path: &str) -> Option<bool> {
        if path == "/" {
            return Some(true);
        }
        self.uss.get(path).copied()
    }

    fn remove_uss_subtree(&mut self, path: &str) {
        let prefix = format!("{path}/");
        self.uss.retain(|p, _| p != path && !p.starts_with(&prefix));
    }
}

/// A file or directory tree in transit between two places.
struct Entry {
    name: String,
    is_directory: bool,
    children: Vec<Entry>,
}

/// Fake mainframe holding everything in memory.
#[derive(Default)]
pub struct InMemoryMainframe {
    hosts: Mutex<HashMap<String, HostState>>,
    local: Option<Arc<VirtualFileSystem>>,
    failures: Mutex<HashMap<String, RemoteError>>,
    performed: Mutex<Vec<RemoteOperation>>,
}

impl InMemoryMainframe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets downloads materialize in (and uploads be removed from) a local file system.
    pub fn with_local(local: Arc<VirtualFileSystem>) -> Self {
        Self {
            local: Some(local),
            ..Self::default()
        }
    }

    /// Registers a connection with no content.
    pub fn add_host(&self, connection: &ConnectionConfig) {
        self.hosts.lock_ignore_poison().entry(connection.url.clone()).or_default();
    }

    pub fn add_dataset(&self, connection: &ConnectionConfig, name: &str, organization: DatasetOrganization) {
        self.hosts
            .lock_ignore_poison()
            .entry(connection.url.clone())
            .or_default()
            .datasets
            .entry(name.to_string())
            .or_insert_with(|| StoredDataset {
                organization,
                members: BTreeSet::new(),
            });
    }

    /// Adds a member, creating the library as a PDS if needed.
    pub fn add_member(&self, connection: &ConnectionConfig, library: &str, member: &str) {
        self.add_dataset(connection, library, DatasetOrganization::Po);
        if let Some(dataset) = self
            .hosts
            .lock_ignore_poison()
            .get_mut(&connection.url)
            .and_then(|h| h.datasets.get_mut(library))
        {
            dataset.members.insert(member.to_string());
        }
    }

    /// Adds a USS entry and any missing parent directories.
    pub fn add_uss(&self, connection: &ConnectionConfig, path: &str, is_directory: bool) {
        let mut hosts = self.hosts.lock_ignore_poison();
        let host = hosts.entry(connection.url.clone()).or_default();
        let mut current = String::new();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for (i, segment) in segments.iter().enumerate() {
            current = join_path(if current.is_empty() { "/" } else { &current }, segment);
            let is_last = i + 1 == segments.len();
            host.uss.entry(current.clone()).or_insert(!is_last || is_directory);
        }
    }

    /// Makes every operation touching an entity called `name` fail with `error`.
    pub fn fail_on(&self, name: &str, error: RemoteError) {
        self.failures.lock_ignore_poison().insert(name.to_string(), error);
    }

    /// Operations that succeeded, in order.
    pub fn performed(&self) -> Vec<RemoteOperation> {
        self.performed.lock_ignore_poison().clone()
    }

    pub fn has_dataset(&self, connection: &ConnectionConfig, name: &str) -> bool {
        self.hosts
            .lock_ignore_poison()
            .get(&connection.url)
            .is_some_and(|h| h.datasets.contains_key(name))
    }

    pub fn member_names(&self, connection: &ConnectionConfig, library: &str) -> Vec<String> {
        self.hosts
            .lock_ignore_poison()
            .get(&connection.url)
            .and_then(|h| h.datasets.get(library))
            .map(|d| d.members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// `Some(is_directory)` if the USS path exists.
    pub fn uss_entry(&self, connection: &ConnectionConfig, path: &str) -> Option<bool> {
        self.hosts.lock_ignore_poison().get(&connection.url)?.uss_kind(path)
    }

    fn check_failures(&self, operation: &RemoteOperation) -> Result<(), RemoteError> {
        let names = match operation {
            RemoteOperation::MoveCopy(op) => vec![op.source.name(), op.target_name()],
            RemoteOperation::Rename { attributes, new_name } => {
                vec![attributes.name().to_string(), new_name.clone()]
            }
            RemoteOperation::Delete { attributes } => vec![attributes.name().to_string()],
            RemoteOperation::AllocateDataset { allocation, .. } => vec![allocation.name.clone()],
            RemoteOperation::AllocateMember { name, .. } | RemoteOperation::CreateUssEntity { name, .. } => {
                vec![name.clone()]
            }
        };
        let failures = self.failures.lock_ignore_poison();
        match names.iter().find_map(|n| failures.get(n)) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn move_copy(&self, hosts: &mut HashMap<String, HostState>, op: &MoveCopyOperation) -> Result<(), RemoteError> {
        let target = op.target_name();
        let entry = self.read_source(hosts, op)?;
        self.write_destination(hosts, op, &target, entry)?;
        if op.is_move {
            self.remove_source(hosts, op)?;
        }
        Ok(())
    }

    fn read_source(&self, hosts: &HashMap<String, HostState>, op: &MoveCopyOperation) -> Result<Entry, RemoteError> {
        let Some(attributes) = &op.source_attributes else {
            if op.source.file_system_kind() == FileSystemKind::Local && op.source.is_valid() {
                return Ok(local_entry(&op.source));
            }
            return Err(RemoteError::NotFound {
                path: op.source.path(),
            });
        };
        let host = host(hosts, attributes)?;
        match attributes {
            FileAttributes::Dataset(d) => {
                let dataset = host.datasets.get(&d.name).ok_or_else(|| not_found(&d.name))?;
                Ok(Entry {
                    name: d.name.clone(),
                    is_directory: dataset.organization.is_partitioned(),
                    children: dataset.members.iter().map(|m| file_entry(m)).collect(),
                })
            }
            FileAttributes::Member(m) => {
                let exists = host
                    .datasets
                    .get(&m.library_name)
                    .is_some_and(|d| d.members.contains(&m.name));
                if !exists {
                    return Err(not_found(&format!("{}({})", m.library_name, m.name)));
                }
                Ok(file_entry(&m.name))
            }
            FileAttributes::Uss(u) => {
                let is_directory = host.uss_kind(&u.path).ok_or_else(|| not_found(&u.path))?;
                Ok(uss_entry(host, &u.path, is_directory))
            }
        }
    }

    fn write_destination(
        &self,
        hosts: &mut HashMap<String, HostState>,
        op: &MoveCopyOperation,
        target: &str,
        entry: Entry,
    ) -> Result<(), RemoteError> {
        let destination_is_pds = op.destination_attributes.as_ref().is_some_and(FileAttributes::is_pds);
        match &op.destination_attributes {
            Some(FileAttributes::Dataset(d)) if destination_is_pds => {
                if entry.is_directory {
                    return Err(RemoteError::Unsupported {
                        operation: format!("copy directory {} into {}", entry.name, d.name),
                    });
                }
                if !is_valid_member_name(target) {
                    return Err(RemoteError::InvalidName {
                        name: target.to_string(),
                    });
                }
                let host = host_mut(hosts, op.destination_attributes.as_ref())?;
                let library = host.datasets.get_mut(&d.name).ok_or_else(|| not_found(&d.name))?;
                let existing = library.members.iter().find(|m| m.eq_ignore_ascii_case(target)).cloned();
                if let Some(existing) = existing {
                    if !op.force_overwriting {
                        return Err(already_exists(&format!("{}({})", d.name, existing)));
                    }
                    library.members.remove(&existing);
                }
                library.members.insert(target.to_string());
                Ok(())
            }
            Some(FileAttributes::Uss(u)) if u.is_directory => {
                let host = host_mut(hosts, op.destination_attributes.as_ref())?;
                if host.uss_kind(&u.path) != Some(true) {
                    return Err(not_found(&u.path));
                }
                let path = join_path(&u.path, target);
                if host.uss_kind(&path).is_some() {
                    if !op.force_overwriting {
                        return Err(already_exists(&path));
                    }
                    host.remove_uss_subtree(&path);
                }
                insert_uss(host, &path, &entry);
                Ok(())
            }
            Some(other) => Err(RemoteError::Unsupported {
                operation: format!("paste into {}", other.name()),
            }),
            None => {
                let local = self.local.as_ref().filter(|_| op.destination.file_system_kind() == FileSystemKind::Local);
                let Some(local) = local else {
                    return Err(RemoteError::Unsupported {
                        operation: format!("paste into {}", op.destination.path()),
                    });
                };
                if let Some(existing) = op.destination.find_child(target) {
                    if !op.force_overwriting {
                        return Err(already_exists(&existing.path()));
                    }
                    local.delete(&existing).map_err(|e| RemoteError::Call {
                        code: 500,
                        message: e.to_string(),
                    })?;
                }
                insert_local(local, &op.destination, target, &entry)
            }
        }
    }

    fn remove_source(&self, hosts: &mut HashMap<String, HostState>, op: &MoveCopyOperation) -> Result<(), RemoteError> {
        match &op.source_attributes {
            Some(attributes) => remove_remote(hosts, attributes),
            None => match &self.local {
                Some(local) => local.delete(&op.source).map_err(|e| RemoteError::Call {
                    code: 500,
                    message: e.to_string(),
                }),
                None => Ok(()),
            },
        }
    }

    fn apply(&self, operation: &RemoteOperation) -> Result<(), RemoteError> {
        let mut hosts = self.hosts.lock_ignore_poison();
        match operation {
            RemoteOperation::MoveCopy(op) => self.move_copy(&mut hosts, op),
            RemoteOperation::Rename { attributes, new_name } => rename_remote(&mut hosts, attributes, new_name),
            RemoteOperation::Delete { attributes } => remove_remote(&mut hosts, attributes),
            RemoteOperation::AllocateDataset { connection, allocation } => {
                let host = hosts.get_mut(&connection.url).ok_or_else(|| unknown_host(&connection.url))?;
                if host.datasets.contains_key(&allocation.name) {
                    return Err(already_exists(&allocation.name));
                }
                host.datasets.insert(
                    allocation.name.clone(),
                    StoredDataset {
                        organization: allocation.organization,
                        members: BTreeSet::new(),
                    },
                );
                Ok(())
            }
            RemoteOperation::AllocateMember { library, name } => {
                if !is_valid_member_name(name) {
                    return Err(RemoteError::InvalidName { name: name.clone() });
                }
                let host = host_mut(&mut hosts, Some(library))?;
                let dataset = host
                    .datasets
                    .get_mut(library.name())
                    .filter(|d| d.organization.is_partitioned())
                    .ok_or_else(|| not_found(library.name()))?;
                if !dataset.members.insert(name.clone()) {
                    return Err(already_exists(name));
                }
                Ok(())
            }
            RemoteOperation::CreateUssEntity {
                parent,
                name,
                is_directory,
            } => {
                let FileAttributes::Uss(dir) = parent else {
                    return Err(RemoteError::Unsupported {
                        operation: format!("create {name} in {}", parent.name()),
                    });
                };
                let host = host_mut(&mut hosts, Some(parent))?;
                if host.uss_kind(&dir.path) != Some(true) {
                    return Err(not_found(&dir.path));
                }
                let path = join_path(&dir.path, name);
                if host.uss_kind(&path).is_some() {
                    return Err(already_exists(&path));
                }
                host.uss.insert(path, *is_directory);
                Ok(())
            }
        }
    }
}

impl RemoteBackend for InMemoryMainframe {
    fn perform(&self, operation: &RemoteOperation) -> Result<(), RemoteError> {
        self.check_failures(operation)?;
        self.apply(operation)?;
        self.performed.lock_ignore_poison().push(operation.clone());
        Ok(())
    }
}

impl FetchBackend for InMemoryMainframe {
    fn list(&self, query: &RemoteQuery, start: Option<&str>, limit: usize) -> Result<FetchedBatch, FetchError> {
        let hosts = self.hosts.lock_ignore_poison();
        let host = hosts.get(&query.connection.url).ok_or_else(|| FetchError::Connection {
            url: query.connection.url.clone(),
            message: "unknown host".to_string(),
        })?;
        let requesters = vec![Requester::new(query.connection.clone())];

        let mut items: Vec<FileAttributes> = match &query.request {
            FetchRequest::DatasetMask { .. } => host
                .datasets
                .iter()
                .filter(|(name, _)| query.request.matches_dataset(name))
                .map(|(name, d)| {
                    FileAttributes::Dataset(DatasetAttributes::new(name, Some(d.organization), requesters.clone()))
                })
                .collect(),
            FetchRequest::Library { library_name } => host
                .datasets
                .get(library_name)
                .ok_or_else(|| FetchError::NotFound {
                    query: query.to_string(),
                })?
                .members
                .iter()
                .map(|m| FileAttributes::Member(MemberAttributes::new(library_name, m, requesters.clone())))
                .collect(),
            FetchRequest::UssPath { path } => {
                if host.uss_kind(path) != Some(true) {
                    return Err(FetchError::NotFound {
                        query: query.to_string(),
                    });
                }
                host.uss
                    .iter()
                    .filter(|(p, _)| parent_of(p) == Some(path.as_str()))
                    .map(|(p, is_dir)| FileAttributes::Uss(UssAttributes::new(p, *is_dir, requesters.clone())))
                    .collect()
            }
        };
        items.sort_by(|a, b| a.name().cmp(b.name()));

        let total_rows = items.len();
        let items = items
            .into_iter()
            .filter(|a| start.is_none_or(|s| a.name() >= s))
            .take(limit)
            .collect();
        Ok(FetchedBatch {
            items,
            total_rows: Some(total_rows),
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{}/{name}", parent.trim_end_matches('/'))
    }
}

fn parent_of(path: &str) -> Option<&str> {
    match path.rfind('/') {
        Some(0) if path.len() > 1 => Some("/"),
        Some(0) | None => None,
        Some(idx) => Some(&path[..idx]),
    }
}

fn not_found(path: &str) -> RemoteError {
    RemoteError::NotFound { path: path.to_string() }
}

fn already_exists(path: &str) -> RemoteError {
    RemoteError::AlreadyExists { path: path.to_string() }
}

fn unknown_host(url: &str) -> RemoteError {
    RemoteError::Connection {
        url: url.to_string(),
        message: "unknown host".to_string(),
    }
}

fn host<'a>(hosts: &'a HashMap<String, HostState>, attributes: &FileAttributes) -> Result<&'a HostState, RemoteError> {
    let url = attributes.url().unwrap_or_default();
    hosts.get(url).ok_or_else(|| unknown_host(url))
}

fn host_mut<'a>(
    hosts: &'a mut HashMap<String, HostState>,
    attributes: Option<&FileAttributes>,
) -> Result<&'a mut HostState, RemoteError> {
    let url = attributes.and_then(|a| a.url()).unwrap_or_default();
    hosts.get_mut(url).ok_or_else(|| unknown_host(url))
}

fn file_entry(name: &str) -> Entry {
    Entry {
        name: name.to_string(),
        is_directory: false,
        children: Vec::new(),
    }
}

fn uss_entry(host: &HostState, path: &str, is_directory: bool) -> Entry {
    let children = if is_directory {
        host.uss
            .iter()
            .filter(|(p, _)| parent_of(p) == Some(path))
            .map(|(p, is_dir)| uss_entry(host, p, *is_dir))
            .collect()
    } else {
        Vec::new()
    };
    Entry {
        name: path.rsplit('/').next().unwrap_or(path).to_string(),
        is_directory,
        children,
    }
}

fn local_entry(file: &VirtualFile) -> Entry {
    Entry {
        name: file.name(),
        is_directory: file.is_directory(),
        children: file.children().iter().map(local_entry).collect(),
    }
}

fn insert_uss(host: &mut HostState, path: &str, entry: &Entry) {
    host.uss.insert(path.to_string(), entry.is_directory);
    for child in &entry.children {
        insert_uss(host, &join_path(path, &child.name), child);
    }
}

fn insert_local(local: &VirtualFileSystem, parent: &VirtualFile, name: &str, entry: &Entry) -> Result<(), RemoteError> {
    let created = local
        .find_or_create_child(parent, name, entry.is_directory)
        .map_err(|e| RemoteError::Call {
            code: 500,
            message: e.to_string(),
        })?;
    for child in &entry.children {
        insert_local(local, &created, &child.name, child)?;
    }
    Ok(())
}

fn remove_remote(hosts: &mut HashMap<String, HostState>, attributes: &FileAttributes) -> Result<(), RemoteError> {
    let host = host_mut(hosts, Some(attributes))?;
    match attributes {
        FileAttributes::Dataset(d) => host.datasets.remove(&d.name).map(|_| ()).ok_or_else(|| not_found(&d.name)),
        FileAttributes::Member(m) => {
            let removed = host
                .datasets
                .get_mut(&m.library_name)
                .is_some_and(|d| d.members.remove(&m.name));
            if removed { Ok(()) } else { Err(not_found(&m.name)) }
        }
        FileAttributes::Uss(u) => {
            if host.uss_kind(&u.path).is_none() || u.path == "/" {
                return Err(not_found(&u.path));
            }
            host.remove_uss_subtree(&u.path);
            Ok(())
        }
    }
}

fn rename_remote(
    hosts: &mut HashMap<String, HostState>,
    attributes: &FileAttributes,
    new_name: &str,
) -> Result<(), RemoteError> {
    let host = host_mut(hosts, Some(attributes))?;
    match attributes {
        FileAttributes::Dataset(d) => {
            if host.datasets.contains_key(new_name) {
                return Err(already_exists(new_name));
            }
            let dataset = host.datasets.remove(&d.name).ok_or_else(|| not_found(&d.name))?;
            host.datasets.insert(new_name.to_string(), dataset);
            Ok(())
        }
        FileAttributes::Member(m) => {
            if !is_valid_member_name(new_name) {
                return Err(RemoteError::InvalidName {
                    name: new_name.to_string(),
                });
            }
            let library = host
                .datasets
                .get_mut(&m.library_name)
                .ok_or_else(|| not_found(&m.library_name))?;
            if library.members.contains(new_name) {
                return Err(already_exists(new_name));
            }
            if !library.members.remove(&m.name) {
                return Err(not_found(&m.name));
            }
            library.members.insert(new_name.to_string());
            Ok(())
        }
        FileAttributes::Uss(u) => {
            let parent = parent_of(&u.path).ok_or_else(|| not_found(&u.path))?;
            let new_path = join_path(parent, new_name);
            if host.uss_kind(&new_path).is_some() {
                return Err(already_exists(&new_path));
            }
            if host.uss_kind(&u.path).is_none() {
                return Err(not_found(&u.path));
            }
            let prefix = format!("{}/", u.path);
            let moved: Vec<(String, bool)> = host
                .uss
                .iter()
                .filter(|(p, _)| **p == u.path || p.starts_with(&prefix))
                .map(|(p, d)| (format!("{new_path}{}", &p[u.path.len()..]), *d))
                .collect();
            host.remove_uss_subtree(&u.path);
            host.uss.extend(moved);
            Ok(())
        }
    }
}
