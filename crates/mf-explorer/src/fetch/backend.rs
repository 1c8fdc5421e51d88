//! The listing side of the remote I/O backend.

use super::{FetchError, RemoteQuery};
use crate::attributes::FileAttributes;

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct FetchedBatch {
    pub items: Vec<FileAttributes>,
    /// Total number of rows the listing has, when the system reports it.
    pub total_rows: Option<usize>,
}

/// Lists the children a query names. Calls block; run them off the UI thread.
pub trait FetchBackend: Send + Sync {
    /// Returns at most `limit` items, starting at the item named `start` (inclusive) when given.
    fn list(&self, query: &RemoteQuery, start: Option<&str>, limit: usize) -> Result<FetchedBatch, FetchError>;
}
