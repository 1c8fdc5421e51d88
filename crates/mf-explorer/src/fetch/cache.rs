//! The listing cache itself.

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{BatchCursor, FetchBackend, FetchError, RemoteQuery};
use crate::attributes::{AttributesStore, FileAttributes};
use crate::config::ExplorerConfig;
use crate::ignore_poison::IgnorePoisonRw;
use crate::vfs::VirtualFile;

/// Observer for cache state changes.
pub trait CacheListener: Send + Sync {
    fn on_cache_updated(&self, _query: &RemoteQuery, _files: &[VirtualFile]) {}
    fn on_cache_cleaned(&self, _query: &RemoteQuery) {}
    fn on_fetch_failure(&self, _query: &RemoteQuery, _error: &FetchError) {}
}

#[derive(Debug, Clone)]
enum CacheState {
    Fetched,
    Failed(FetchError),
    /// Cleaned explicitly. The old files are kept only to diff against the next listing.
    Cleaned,
}

struct CacheEntry {
    files: Vec<VirtualFile>,
    state: CacheState,
    batch: BatchCursor,
}

/// Caches the children of each [`RemoteQuery`].
///
/// Reads are safe from any thread. Writes (fetch results, cleaning) are expected to come from
/// one thread at a time; backend calls run without holding any lock.
pub struct FileFetchCache {
    attributes: Arc<AttributesStore>,
    backend: Arc<dyn FetchBackend>,
    batch_size: usize,
    entries: RwLock<HashMap<RemoteQuery, CacheEntry>>,
    refresh_dates: RwLock<HashMap<RemoteQuery, DateTime<Local>>>,
    listeners: RwLock<Vec<Arc<dyn CacheListener>>>,
}

impl FileFetchCache {
    pub fn new(attributes: Arc<AttributesStore>, backend: Arc<dyn FetchBackend>, config: &ExplorerConfig) -> Self {
        Self {
            attributes,
            backend,
            batch_size: config.fetch_batch_size.max(1),
            entries: RwLock::new(HashMap::new()),
            refresh_dates: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn attributes(&self) -> &Arc<AttributesStore> {
        &self.attributes
    }

    pub fn add_listener(&self, listener: Arc<dyn CacheListener>) {
        self.listeners.write_ignore_poison().push(listener);
    }

    /// Returns the cached children, fetching the first batch if the query isn't cached.
    pub fn fetch(&self, query: &RemoteQuery) -> Result<Vec<VirtualFile>, FetchError> {
        if let Some(files) = self.get_cached(query) {
            return Ok(files);
        }
        self.reload(query)
    }

    /// Lists the query again, replacing whatever was cached. Rows brought in by earlier
    /// `load_more` calls are listed again too, unless the batch cursor was cleared.
    pub fn reload(&self, query: &RemoteQuery) -> Result<Vec<VirtualFile>, FetchError> {
        let already_fetched = self.batch_cursor(query).map_or(0, |c| c.already_fetched);
        let limit = already_fetched.max(self.batch_size);
        log::info!("Fetching {query} ({limit} rows)");
        let batch = match self.backend.list(query, None, limit) {
            Ok(batch) => batch,
            Err(e) => return Err(self.record_failure(query, e)),
        };

        let last_name = batch.items.last().map(|a| a.name().to_string());
        let files = self.materialize(query, batch.items);
        let mut cursor = BatchCursor::default();
        cursor.advance(last_name.as_deref(), files.len(), batch.total_rows);

        let old_files = {
            let mut entries = self.entries.write_ignore_poison();
            let old = entries.insert(
                query.clone(),
                CacheEntry {
                    files: files.clone(),
                    state: CacheState::Fetched,
                    batch: cursor.clone(),
                },
            );
            old.map(|e| e.files).unwrap_or_default()
        };
        self.refresh_dates.write_ignore_poison().insert(query.clone(), Local::now());
        // Rows sorting after the listed ones weren't looked at and may still exist
        let listed_up_to = last_name.filter(|_| cursor.fetch_needed);
        self.clean_up_unused(query, &old_files, &files, listed_up_to.as_deref());

        log::info!("Fetched {} items for {query}", files.len());
        self.notify(|l| l.on_cache_updated(query, &files));
        Ok(files)
    }

    /// Fetches the next batch and appends it. Returns the whole listing.
    pub fn load_more(&self, query: &RemoteQuery) -> Result<Vec<VirtualFile>, FetchError> {
        if !self.is_cache_valid(query) {
            return self.reload(query);
        }
        let Some(cursor) = self.batch_cursor(query).filter(|c| c.fetch_needed) else {
            return Ok(self.get_cached(query).unwrap_or_default());
        };

        log::info!("Fetching more for {query} after {:?}", cursor.start);
        let batch = match self.backend.list(query, cursor.start.as_deref(), self.batch_size) {
            Ok(batch) => batch,
            Err(e) => return Err(self.record_failure(query, e)),
        };

        // The continuation batch starts with the last item of the previous one
        let mut items = batch.items;
        if cursor.start.is_some() && items.first().map(|a| a.name()) == cursor.start.as_deref() {
            items.remove(0);
        }
        let last_name = items.last().map(|a| a.name().to_string());
        let new_files = self.materialize(query, items);

        let files = {
            let mut entries = self.entries.write_ignore_poison();
            let Some(entry) = entries.get_mut(query) else {
                return Ok(Vec::new());
            };
            for file in new_files.iter() {
                if !entry.files.contains(file) {
                    entry.files.push(file.clone());
                }
            }
            entry.batch.advance(last_name.as_deref(), new_files.len(), batch.total_rows);
            if new_files.is_empty() {
                // Nothing new came back, stop offering more
                entry.batch.fetch_needed = false;
            }
            entry.files.clone()
        };

        self.notify(|l| l.on_cache_updated(query, &files));
        Ok(files)
    }

    /// Cached children if the query was fetched successfully and not cleaned since.
    pub fn get_cached(&self, query: &RemoteQuery) -> Option<Vec<VirtualFile>> {
        let entries = self.entries.read_ignore_poison();
        let entry = entries.get(query)?;
        match entry.state {
            CacheState::Fetched => Some(entry.files.iter().filter(|f| f.is_valid()).cloned().collect()),
            CacheState::Failed(_) | CacheState::Cleaned => None,
        }
    }

    pub fn is_cache_valid(&self, query: &RemoteQuery) -> bool {
        matches!(
            self.entries.read_ignore_poison().get(query).map(|e| &e.state),
            Some(CacheState::Fetched)
        )
    }

    /// Message of the last failed fetch, if the query is in the failed state.
    pub fn fetched_error_message(&self, query: &RemoteQuery) -> Option<String> {
        match self.entries.read_ignore_poison().get(query).map(|e| &e.state) {
            Some(CacheState::Failed(e)) => Some(e.user_message()),
            _ => None,
        }
    }

    pub fn batch_cursor(&self, query: &RemoteQuery) -> Option<BatchCursor> {
        self.entries.read_ignore_poison().get(query).map(|e| e.batch.clone())
    }

    /// Drops the cached listing and refresh date so the next fetch goes to the system.
    /// Without `clean_batched_query` the next fetch lists as many rows as were loaded before;
    /// with it the batch cursor restarts and only the first batch comes back.
    pub fn clean_cache(&self, query: &RemoteQuery, clean_batched_query: bool) {
        let cleaned = {
            let mut entries = self.entries.write_ignore_poison();
            match entries.get_mut(query) {
                Some(entry) => {
                    entry.state = CacheState::Cleaned;
                    if clean_batched_query {
                        entry.batch.clear();
                    }
                    true
                }
                None => false,
            }
        };
        let had_date = self.refresh_dates.write_ignore_poison().remove(query).is_some();
        if cleaned || had_date {
            log::debug!("Cleaned cache for {query} (batched: {clean_batched_query})");
            self.notify(|l| l.on_cache_cleaned(query));
        }
    }

    /// When the query was last fetched successfully.
    pub fn find_cache_refresh_date_if_present(&self, query: &RemoteQuery) -> Option<DateTime<Local>> {
        self.refresh_dates.read_ignore_poison().get(query).copied()
    }

    /// The cache's own key for a logically equal query, or `None` if it isn't cached.
    pub fn real_query_instance(&self, query: &RemoteQuery) -> Option<RemoteQuery> {
        self.entries
            .read_ignore_poison()
            .get_key_value(query)
            .map(|(key, _)| key.clone())
    }

    /// Every cached query accepted by `predicate`.
    pub fn queries_matching(&self, predicate: impl Fn(&RemoteQuery) -> bool) -> Vec<RemoteQuery> {
        self.entries
            .read_ignore_poison()
            .keys()
            .filter(|q| predicate(q))
            .cloned()
            .collect()
    }

    /// Destroys the entry for a query whose owner went away.
    pub fn dispose(&self, query: &RemoteQuery) {
        self.entries.write_ignore_poison().remove(query);
        self.refresh_dates.write_ignore_poison().remove(query);
    }

    fn materialize(&self, query: &RemoteQuery, items: Vec<FileAttributes>) -> Vec<VirtualFile> {
        items
            .into_iter()
            .filter_map(|attrs| match self.attributes.get_or_create_file(attrs) {
                Ok(file) => Some(file),
                Err(e) => {
                    log::warn!("Skipping item of {query}: {e}");
                    None
                }
            })
            .collect()
    }

    fn record_failure(&self, query: &RemoteQuery, error: FetchError) -> FetchError {
        log::warn!("Fetching {query} failed: {error}");
        self.entries
            .write_ignore_poison()
            .entry(query.clone())
            .and_modify(|e| e.state = CacheState::Failed(error.clone()))
            .or_insert_with(|| CacheEntry {
                files: Vec::new(),
                state: CacheState::Failed(error.clone()),
                batch: BatchCursor::default(),
            });
        self.notify(|l| l.on_fetch_failure(query, &error));
        error
    }

    /// Forgets files that vanished from this listing and aren't shown by any other query.
    /// With `listed_up_to` the listing was partial, and only names up to it are checked.
    fn clean_up_unused(
        &self,
        query: &RemoteQuery,
        old_files: &[VirtualFile],
        new_files: &[VirtualFile],
        listed_up_to: Option<&str>,
    ) {
        let gone: Vec<&VirtualFile> = old_files
            .iter()
            .filter(|f| !new_files.contains(f))
            .filter(|f| listed_up_to.is_none_or(|last| f.name().as_str() <= last))
            .collect();
        if gone.is_empty() {
            return;
        }
        let still_listed = |file: &VirtualFile| {
            self.entries
                .read_ignore_poison()
                .iter()
                .filter(|(q, _)| *q != query)
                .any(|(_, e)| e.files.iter().any(|f| file.is_ancestor_of(f, false)))
        };
        for file in gone {
            if !file.is_valid() || still_listed(file) {
                continue;
            }
            self.attributes.clear_attributes(file);
            if let Err(e) = self.attributes.vfs().delete(file) {
                log::debug!("Couldn't drop vanished file {}: {e}", file.path());
            }
        }
    }

    fn notify(&self, f: impl Fn(&dyn CacheListener)) {
        let listeners = self.listeners.read_ignore_poison().clone();
        for listener in listeners.iter() {
            f(listener.as_ref());
        }
    }
}
