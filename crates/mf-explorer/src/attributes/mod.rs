//! Remote metadata attached to virtual files.
//!
//! Attributes are a closed set of variants (dataset, member, USS entry). Everything the rest of
//! the explorer needs to know about an entity's remote semantics (is it directory-like, can it
//! be copied, can things be pasted into it, which connection owns it) is answered here by
//! matching on the variant.

mod store;

pub use store::{AttributesChange, AttributesListener, AttributesService, AttributesStore};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ConnectionConfig;
use crate::vfs::VfsError;

/// Identifies which connection produced an attributes record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requester {
    pub connection_config: ConnectionConfig,
}

impl Requester {
    pub fn new(connection_config: ConnectionConfig) -> Self {
        Self { connection_config }
    }

    /// Two requesters reach the same system iff URL and trust settings match.
    pub fn same_system(&self, other: &Requester) -> bool {
        self.connection_config.url == other.connection_config.url
            && self.connection_config.is_allow_self_signed == other.connection_config.is_allow_self_signed
    }
}

/// Dataset organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatasetOrganization {
    /// Sequential
    #[serde(rename = "PS")]
    Ps,
    /// Partitioned
    #[serde(rename = "PO")]
    Po,
    /// Partitioned extended (PDS/E)
    #[serde(rename = "PO-E")]
    PoE,
    /// VSAM
    #[serde(rename = "VS")]
    Vs,
    /// Direct access
    #[serde(rename = "DA")]
    Da,
}

impl DatasetOrganization {
    pub fn is_partitioned(self) -> bool {
        matches!(self, Self::Po | Self::PoE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetAttributes {
    pub name: String,
    pub organization: Option<DatasetOrganization>,
    pub volser: Option<String>,
    pub record_format: Option<String>,
    pub is_migrated: bool,
    pub requesters: Vec<Requester>,
}

impl DatasetAttributes {
    pub fn new(name: &str, organization: Option<DatasetOrganization>, requesters: Vec<Requester>) -> Self {
        Self {
            name: name.to_string(),
            organization,
            volser: None,
            record_format: None,
            is_migrated: false,
            requesters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberAttributes {
    pub name: String,
    /// Name of the partitioned dataset holding this member.
    pub library_name: String,
    pub requesters: Vec<Requester>,
}

impl MemberAttributes {
    pub fn new(library_name: &str, name: &str, requesters: Vec<Requester>) -> Self {
        Self {
            name: name.to_string(),
            library_name: library_name.to_string(),
            requesters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UssAttributes {
    /// Absolute path, e.g. `/u/user/file.txt`.
    pub path: String,
    pub is_directory: bool,
    pub requesters: Vec<Requester>,
}

impl UssAttributes {
    pub fn new(path: &str, is_directory: bool, requesters: Vec<Requester>) -> Self {
        Self {
            path: path.to_string(),
            is_directory,
            requesters,
        }
    }
}

/// Which variant an attributes record is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributesKind {
    Dataset,
    Member,
    Uss,
}

impl fmt::Display for AttributesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dataset => write!(f, "dataset"),
            Self::Member => write!(f, "member"),
            Self::Uss => write!(f, "USS file"),
        }
    }
}

/// Remote metadata for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileAttributes {
    Dataset(DatasetAttributes),
    Member(MemberAttributes),
    Uss(UssAttributes),
}

/// Stable lookup key: one key per remote entity per connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum AttributesKey {
    Dataset { url: String, name: String },
    Member { url: String, library: String, name: String },
    Uss { url: String, path: String },
}

impl FileAttributes {
    pub fn kind(&self) -> AttributesKind {
        match self {
            Self::Dataset(_) => AttributesKind::Dataset,
            Self::Member(_) => AttributesKind::Member,
            Self::Uss(_) => AttributesKind::Uss,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Dataset(d) => &d.name,
            Self::Member(m) => &m.name,
            Self::Uss(u) => uss_name(&u.path),
        }
    }

    pub fn is_directory(&self) -> bool {
        match self {
            Self::Dataset(d) => d.organization.is_some_and(DatasetOrganization::is_partitioned),
            Self::Member(_) => false,
            Self::Uss(u) => u.is_directory,
        }
    }

    /// Whether this entity can be a paste destination.
    pub fn is_paste_possible(&self) -> bool {
        match self {
            Self::Dataset(d) => self.is_directory() && !d.is_migrated,
            Self::Member(_) => false,
            Self::Uss(u) => u.is_directory,
        }
    }

    /// Whether this entity can be put on the copy/cut buffer.
    pub fn is_copy_possible(&self) -> bool {
        match self {
            Self::Dataset(d) => !d.is_migrated,
            Self::Member(_) | Self::Uss(_) => true,
        }
    }

    /// True for a partitioned (member-holding) dataset.
    pub fn is_pds(&self) -> bool {
        matches!(self, Self::Dataset(_)) && self.is_directory()
    }

    /// Path of the remote parent, if the entity has one.
    pub fn parent_path(&self) -> Option<String> {
        match self {
            Self::Dataset(_) => None,
            Self::Member(m) => Some(m.library_name.clone()),
            Self::Uss(u) => uss_parent(&u.path).map(str::to_string),
        }
    }

    pub fn requesters(&self) -> &[Requester] {
        match self {
            Self::Dataset(d) => &d.requesters,
            Self::Member(m) => &m.requesters,
            Self::Uss(u) => &u.requesters,
        }
    }

    /// URL of the first requester, used to place the entity in the file tree.
    pub fn url(&self) -> Option<&str> {
        self.requesters().first().map(|r| r.connection_config.url.as_str())
    }

    /// True if both records were produced by at least one common system.
    pub fn same_system(&self, other: &FileAttributes) -> bool {
        self.requesters()
            .iter()
            .any(|mine| other.requesters().iter().any(|theirs| mine.same_system(theirs)))
    }

    /// Returns a copy describing the same entity under `new_name`.
    pub fn with_name(&self, new_name: &str) -> FileAttributes {
        match self {
            Self::Dataset(d) => Self::Dataset(DatasetAttributes {
                name: new_name.to_string(),
                ..d.clone()
            }),
            Self::Member(m) => Self::Member(MemberAttributes {
                name: new_name.to_string(),
                ..m.clone()
            }),
            Self::Uss(u) => {
                let path = match uss_parent(&u.path) {
                    Some("/") => format!("/{new_name}"),
                    Some(parent) => format!("{parent}/{new_name}"),
                    None => new_name.to_string(),
                };
                Self::Uss(UssAttributes { path, ..u.clone() })
            }
        }
    }

    pub(crate) fn key(&self) -> AttributesKey {
        let url = self.url().unwrap_or_default().to_string();
        match self {
            Self::Dataset(d) => AttributesKey::Dataset {
                url,
                name: d.name.clone(),
            },
            Self::Member(m) => AttributesKey::Member {
                url,
                library: m.library_name.clone(),
                name: m.name.clone(),
            },
            Self::Uss(u) => AttributesKey::Uss {
                url,
                path: u.path.clone(),
            },
        }
    }
}

fn uss_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

fn uss_parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) if trimmed.len() > 1 => Some("/"),
        Some(0) | None => None,
        Some(idx) => Some(&trimmed[..idx]),
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors from the attributes write path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AttributesError {
    /// No attributes are registered for the file.
    Unknown { path: String },
    /// Tried to store attributes of one kind through a service of another.
    KindMismatch {
        expected: AttributesKind,
        actual: AttributesKind,
    },
    Vfs { error: VfsError },
}

impl AttributesError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Unknown { path } => format!("'{path}' isn't known to the explorer anymore. Refresh the tree."),
            Self::KindMismatch { .. } => "The file changed its type on the remote system. Refresh the tree.".to_string(),
            Self::Vfs { error } => error.user_message(),
        }
    }
}

impl fmt::Display for AttributesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown { path } => write!(f, "no attributes for {path}"),
            Self::KindMismatch { expected, actual } => {
                write!(f, "expected {expected} attributes, got {actual}")
            }
            Self::Vfs { error } => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for AttributesError {}

impl From<VfsError> for AttributesError {
    fn from(e: VfsError) -> Self {
        Self::Vfs { error: e }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requester(url: &str, self_signed: bool) -> Requester {
        Requester::new(ConnectionConfig::new("conn", url, self_signed))
    }

    #[test]
    fn test_uss_name_and_parent() {
        let attrs = FileAttributes::Uss(UssAttributes::new("/u/user/file.txt", false, vec![]));
        assert_eq!(attrs.name(), "file.txt");
        assert_eq!(attrs.parent_path().as_deref(), Some("/u/user"));

        let top = FileAttributes::Uss(UssAttributes::new("/u", true, vec![]));
        assert_eq!(top.parent_path().as_deref(), Some("/"));

        let root = FileAttributes::Uss(UssAttributes::new("/", true, vec![]));
        assert_eq!(root.name(), "/");
        assert_eq!(root.parent_path(), None);
    }

    #[test]
    fn test_dataset_flags_follow_organization() {
        let pds = FileAttributes::Dataset(DatasetAttributes::new("USER.LIB", Some(DatasetOrganization::PoE), vec![]));
        assert!(pds.is_directory());
        assert!(pds.is_pds());
        assert!(pds.is_paste_possible());

        let seq = FileAttributes::Dataset(DatasetAttributes::new("USER.SEQ", Some(DatasetOrganization::Ps), vec![]));
        assert!(!seq.is_directory());
        assert!(!seq.is_paste_possible());
        assert!(seq.is_copy_possible());
    }

    #[test]
    fn test_migrated_dataset_is_inert() {
        let mut attrs = DatasetAttributes::new("USER.OLD", Some(DatasetOrganization::Po), vec![]);
        attrs.is_migrated = true;
        let attrs = FileAttributes::Dataset(attrs);
        assert!(!attrs.is_copy_possible());
        assert!(!attrs.is_paste_possible());
    }

    #[test]
    fn test_same_system_compares_url_and_trust() {
        let a = FileAttributes::Uss(UssAttributes::new("/a", true, vec![requester("https://test1:10443", false)]));
        let b = FileAttributes::Uss(UssAttributes::new("/b", true, vec![requester("https://test2:10443", false)]));
        let c = FileAttributes::Uss(UssAttributes::new("/c", true, vec![requester("https://test1:10443", true)]));
        let d = FileAttributes::Uss(UssAttributes::new("/d", false, vec![requester("https://test1:10443", false)]));
        assert!(!a.same_system(&b));
        assert!(!a.same_system(&c));
        assert!(a.same_system(&d));
    }

    #[test]
    fn test_with_name_keeps_location() {
        let uss = FileAttributes::Uss(UssAttributes::new("/u/user/a.txt", false, vec![]));
        assert_eq!(uss.with_name("b.txt").name(), "b.txt");
        assert_eq!(uss.with_name("b.txt").parent_path().as_deref(), Some("/u/user"));

        let member = FileAttributes::Member(MemberAttributes::new("USER.LIB", "OLD", vec![]));
        assert_eq!(member.with_name("NEW").parent_path().as_deref(), Some("USER.LIB"));
    }

    #[test]
    fn test_attributes_serialize_tagged() {
        let attrs = FileAttributes::Dataset(DatasetAttributes::new("USER.LIB", Some(DatasetOrganization::PoE), vec![]));
        let json = serde_json::to_value(&attrs).unwrap();
        assert_eq!(json["kind"], "dataset");
        assert_eq!(json["organization"], "PO-E");
        assert_eq!(json["isMigrated"], false);
    }
}
