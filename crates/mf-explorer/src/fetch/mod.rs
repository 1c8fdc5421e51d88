//! Per-query listing cache.
//!
//! A [`RemoteQuery`] names one listing ("datasets matching `USER.*` on connection X",
//! "members of `USER.LIB`", "children of `/u/user`"). [`FileFetchCache`] keeps the last fetched
//! children of each query plus a refresh timestamp, fetches in batches, and is cleaned
//! explicitly after mutations.

mod backend;
mod cache;
mod errors;
mod query;

pub use backend::{FetchBackend, FetchedBatch};
pub use cache::{CacheListener, FileFetchCache};
pub use errors::FetchError;
pub use query::{BatchCursor, FetchRequest, RemoteQuery};
