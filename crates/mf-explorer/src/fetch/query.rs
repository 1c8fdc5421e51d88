//! Query keys and batch cursors.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::attributes::FileAttributes;
use crate::config::ConnectionConfig;

/// What to list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FetchRequest {
    /// Datasets matching a mask like `USER.*` or `USER.**.JCL`.
    #[serde(rename_all = "camelCase")]
    DatasetMask { mask: String, volser: Option<String> },
    /// Members of a partitioned dataset.
    #[serde(rename_all = "camelCase")]
    Library { library_name: String },
    /// Children of a USS directory.
    UssPath { path: String },
}

impl FetchRequest {
    /// True if a dataset called `name` would show up in this listing.
    pub fn matches_dataset(&self, name: &str) -> bool {
        match self {
            Self::DatasetMask { mask, .. } => mask_to_regex(mask).is_some_and(|re| re.is_match(&name.to_uppercase())),
            Self::Library { .. } | Self::UssPath { .. } => false,
        }
    }
}

/// Translates a dataset mask into an anchored regex: `**` spans qualifiers, `*` stays inside
/// one qualifier, `%` is exactly one character.
fn mask_to_regex(mask: &str) -> Option<Regex> {
    let mut pattern = String::from("^");
    let upper = mask.trim().to_uppercase();
    let mut chars = upper.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                pattern.push_str(".*");
            }
            '*' => pattern.push_str("[^.]*"),
            '%' => pattern.push_str("[^.]"),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            log::warn!("Invalid dataset mask {mask:?}: {e}");
            None
        }
    }
}

/// A listing on one connection. Logical equality is what the cache keys on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteQuery {
    pub connection: ConnectionConfig,
    pub request: FetchRequest,
}

impl RemoteQuery {
    pub fn new(connection: ConnectionConfig, request: FetchRequest) -> Self {
        Self { connection, request }
    }

    /// Query listing the children of a PDS or USS directory, on the first system that
    /// reported it.
    pub fn for_children_of(attributes: &FileAttributes) -> Option<Self> {
        let connection = attributes.requesters().first()?.connection_config.clone();
        let request = match attributes {
            FileAttributes::Dataset(d) if attributes.is_pds() => FetchRequest::Library {
                library_name: d.name.clone(),
            },
            FileAttributes::Uss(u) if u.is_directory => FetchRequest::UssPath { path: u.path.clone() },
            _ => return None,
        };
        Some(Self::new(connection, request))
    }
}

impl fmt::Display for RemoteQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.request {
            FetchRequest::DatasetMask { mask, .. } => write!(f, "{} datasets {}", self.connection.name, mask),
            FetchRequest::Library { library_name } => write!(f, "{} members of {}", self.connection.name, library_name),
            FetchRequest::UssPath { path } => write!(f, "{} USS {}", self.connection.name, path),
        }
    }
}

/// Progress of a batched listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchCursor {
    /// Name of the last item fetched so far; the next batch starts there.
    pub start: Option<String>,
    pub already_fetched: usize,
    pub total_rows: Option<usize>,
    /// Whether more rows are available.
    pub fetch_needed: bool,
}

impl BatchCursor {
    pub(crate) fn advance(&mut self, last_name: Option<&str>, new_items: usize, total_rows: Option<usize>) {
        if let Some(name) = last_name {
            self.start = Some(name.to_string());
        }
        self.already_fetched += new_items;
        self.total_rows = total_rows.or(self.total_rows);
        self.fetch_needed = self.total_rows.is_some_and(|total| total > self.already_fetched);
    }

    /// Rows the system still has beyond what was fetched.
    pub fn items_left(&self) -> Option<usize> {
        self.total_rows.map(|total| total.saturating_sub(self.already_fetched))
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
