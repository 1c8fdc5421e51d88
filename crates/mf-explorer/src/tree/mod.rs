//! Explorer tree nodes and cache invalidation glue.
//!
//! [`ExplorerTreeStructure`] indexes every live node by id and by the virtual file it shows, so
//! mutations can find the nodes to refresh. Only cache-bearing nodes expose
//! [`CacheInvalidatable`]; everything else is skipped when invalidating.

mod fetch_node;

pub use fetch_node::{FetchNodeKind, FileFetchNode, LeafNode};

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::fetch::{FetchError, FileFetchCache, RemoteQuery};
use crate::ignore_poison::{IgnorePoison, IgnorePoisonRw};
use crate::vfs::{FileId, VirtualFile};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// What to clean when a node's cache is cleaned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanCacheOptions {
    /// Also clean every cache-bearing descendant.
    pub recursively: bool,
    /// Also drop the fetch cache entry of the node's query, not just the node's child list.
    pub clean_fetch_provider_cache: bool,
    /// Restart batched fetching from the first row.
    pub clean_batched_query: bool,
}

impl Default for CleanCacheOptions {
    fn default() -> Self {
        Self {
            recursively: true,
            clean_fetch_provider_cache: true,
            clean_batched_query: false,
        }
    }
}

/// Capability of nodes whose children come from the fetch cache.
pub trait CacheInvalidatable: Send + Sync {
    /// The query the node lists, `None` when its connection isn't configured.
    fn query(&self) -> Option<RemoteQuery>;

    /// Drops the node's child list and, per `options`, the fetch cache entry. Not recursive.
    fn clean_cache(&self, options: CleanCacheOptions);
}

/// "Load more" marker shown after a partial batched listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadMore {
    /// Rows not fetched yet, when the system reported a total.
    pub items_left: Option<usize>,
}

/// Children of a node as the tree should show them.
pub enum NodeChildren {
    /// The node can't have children.
    Leaf,
    Items {
        nodes: Vec<Arc<dyn TreeNode>>,
        load_more: Option<LoadMore>,
    },
    NoItemsFound,
    /// Not fetched yet; call [`TreeNode::fetch_children`] off the UI thread.
    Loading,
    Error(String),
}

impl fmt::Debug for NodeChildren {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf => write!(f, "Leaf"),
            Self::Items { nodes, load_more } => f
                .debug_struct("Items")
                .field("nodes", &nodes.iter().map(|n| n.label()).collect::<Vec<_>>())
                .field("load_more", load_more)
                .finish(),
            Self::NoItemsFound => write!(f, "NoItemsFound"),
            Self::Loading => write!(f, "Loading"),
            Self::Error(message) => write!(f, "Error({message:?})"),
        }
    }
}

/// Grayed text next to a fetch node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshLabel {
    LatestRefresh(DateTime<Local>),
    /// Has a query, never fetched.
    NotRefreshed,
    /// No connection, so no query.
    OutOfSync,
}

impl fmt::Display for RefreshLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LatestRefresh(at) => write!(
                f,
                "latest refresh: {}",
                at.format("%-d %B %H:%M:%S").to_string().to_uppercase()
            ),
            Self::NotRefreshed => Ok(()),
            Self::OutOfSync => write!(f, "Out of sync"),
        }
    }
}

/// A node of the explorer tree.
pub trait TreeNode: Send + Sync {
    fn id(&self) -> NodeId;

    fn parent(&self) -> Option<NodeId>;

    /// The file the node shows, if any (a dataset mask node shows none).
    fn virtual_file(&self) -> Option<VirtualFile>;

    fn label(&self) -> String;

    fn children(&self, _tree: &ExplorerTreeStructure) -> NodeChildren {
        NodeChildren::Leaf
    }

    /// Fetches what [`TreeNode::children`] reported as loading. Blocks on remote I/O.
    fn fetch_children(&self) -> Result<(), FetchError> {
        Ok(())
    }

    fn as_cache_invalidatable(&self) -> Option<&dyn CacheInvalidatable> {
        None
    }
}

// ============================================================================
// Tree structure
// ============================================================================

#[derive(Default)]
struct TreeIndex {
    nodes: HashMap<NodeId, Arc<dyn TreeNode>>,
    children: HashMap<NodeId, Vec<NodeId>>,
    by_file: HashMap<FileId, Vec<NodeId>>,
}

/// Registry of live tree nodes.
pub struct ExplorerTreeStructure {
    cache: Arc<FileFetchCache>,
    index: RwLock<TreeIndex>,
    /// Nodes whose presentation is out of date, drained by the host.
    invalidated: Mutex<HashSet<NodeId>>,
}

impl ExplorerTreeStructure {
    pub fn new(cache: Arc<FileFetchCache>) -> Self {
        Self {
            cache,
            index: RwLock::new(TreeIndex::default()),
            invalidated: Mutex::new(HashSet::new()),
        }
    }

    pub fn cache(&self) -> &Arc<FileFetchCache> {
        &self.cache
    }

    pub fn register(&self, node: Arc<dyn TreeNode>) {
        let mut guard = self.index.write_ignore_poison();
        let index = &mut *guard;
        let id = node.id();
        if let Some(parent) = node.parent() {
            let siblings = index.children.entry(parent).or_default();
            if !siblings.contains(&id) {
                siblings.push(id);
            }
        }
        if let Some(file) = node.virtual_file() {
            let ids = index.by_file.entry(file.id()).or_default();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        index.nodes.insert(id, node);
    }

    /// Removes a node and its subtree. Cache entries of removed fetch nodes are destroyed.
    pub fn unregister(&self, id: NodeId) {
        let removed = {
            let mut guard = self.index.write_ignore_poison();
            let index = &mut *guard;
            let subtree = subtree_ids(index, id);
            if let Some(parent) = index.nodes.get(&id).and_then(|n| n.parent())
                && let Some(siblings) = index.children.get_mut(&parent)
            {
                siblings.retain(|s| *s != id);
            }
            let mut removed = Vec::new();
            for node_id in subtree {
                index.children.remove(&node_id);
                if let Some(node) = index.nodes.remove(&node_id) {
                    if let Some(file) = node.virtual_file()
                        && let Some(ids) = index.by_file.get_mut(&file.id())
                    {
                        ids.retain(|n| *n != node_id);
                    }
                    removed.push(node);
                }
            }
            index.by_file.retain(|_, ids| !ids.is_empty());
            removed
        };
        for node in removed {
            if let Some(query) = node.as_cache_invalidatable().and_then(|c| c.query()) {
                self.cache.dispose(&query);
            }
        }
    }

    pub fn node(&self, id: NodeId) -> Option<Arc<dyn TreeNode>> {
        self.index.read_ignore_poison().nodes.get(&id).cloned()
    }

    pub fn children_of(&self, id: NodeId) -> Vec<Arc<dyn TreeNode>> {
        let index = self.index.read_ignore_poison();
        index
            .children
            .get(&id)
            .map(|ids| ids.iter().filter_map(|c| index.nodes.get(c).cloned()).collect())
            .unwrap_or_default()
    }

    /// Every node showing `file`. One file can be visible in several places.
    pub fn find_nodes_for_entity(&self, file: &VirtualFile) -> Vec<Arc<dyn TreeNode>> {
        let index = self.index.read_ignore_poison();
        index
            .by_file
            .get(&file.id())
            .map(|ids| ids.iter().filter_map(|id| index.nodes.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Marks the node and its descendants for re-rendering.
    pub fn invalidate_subtree(&self, id: NodeId) {
        let ids = subtree_ids(&self.index.read_ignore_poison(), id);
        self.invalidated.lock_ignore_poison().extend(ids);
    }

    /// Drains the set of nodes marked for re-rendering.
    pub fn take_invalidated(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.invalidated.lock_ignore_poison().drain().collect();
        ids.sort();
        ids
    }

    /// Cleans the cache of a cache-bearing node and everything below it, then invalidates the
    /// subtree. Returns false (and does nothing) for nodes without a cache.
    pub fn clean_cache(&self, id: NodeId, clean_batched_query: bool) -> bool {
        self.clean_cache_with(
            id,
            CleanCacheOptions {
                clean_batched_query,
                ..CleanCacheOptions::default()
            },
        )
    }

    pub fn clean_cache_with(&self, id: NodeId, options: CleanCacheOptions) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        let Some(invalidatable) = node.as_cache_invalidatable() else {
            return false;
        };
        invalidatable.clean_cache(options);
        if options.recursively {
            let descendants: Vec<Arc<dyn TreeNode>> = {
                let index = self.index.read_ignore_poison();
                subtree_ids(&index, id)
                    .into_iter()
                    .filter(|d| *d != id)
                    .filter_map(|d| index.nodes.get(&d).cloned())
                    .collect()
            };
            for descendant in descendants {
                if let Some(c) = descendant.as_cache_invalidatable() {
                    c.clean_cache(options);
                }
            }
        }
        self.invalidate_subtree(id);
        true
    }

    /// Cleans every cache-bearing node showing one of `files`. Returns how many were cleaned.
    pub fn refresh_files(&self, files: &[VirtualFile], clean_batched_query: bool) -> usize {
        let mut seen = HashSet::new();
        let mut cleaned = 0;
        for file in files {
            for node in self.find_nodes_for_entity(file) {
                if seen.insert(node.id()) && self.clean_cache(node.id(), clean_batched_query) {
                    cleaned += 1;
                }
            }
        }
        cleaned
    }

    /// Cleans the parents of every node showing one of `files`, i.e. the listings that contain
    /// them. Works on files that were already deleted from the model.
    pub fn refresh_parents_of(&self, files: &[VirtualFile], clean_batched_query: bool) -> usize {
        let mut seen = HashSet::new();
        let mut cleaned = 0;
        for node in files.iter().flat_map(|f| self.find_nodes_for_entity(f)) {
            if let Some(parent) = node.parent()
                && seen.insert(parent)
                && self.clean_cache(parent, clean_batched_query)
            {
                cleaned += 1;
            }
        }
        cleaned
    }

    /// Cleans every node listing one of `queries`.
    pub fn refresh_queries(&self, queries: &[RemoteQuery], clean_batched_query: bool) -> usize {
        let nodes: Vec<Arc<dyn TreeNode>> = self.index.read_ignore_poison().nodes.values().cloned().collect();
        let matching: Vec<NodeId> = nodes
            .iter()
            .filter(|n| {
                n.as_cache_invalidatable()
                    .and_then(|c| c.query())
                    .is_some_and(|q| queries.contains(&q))
            })
            .map(|n| n.id())
            .collect();
        // Queries without a live node still get their cache entry cleaned
        for query in queries {
            self.cache.clean_cache(query, clean_batched_query);
        }
        matching
            .into_iter()
            .filter(|id| self.clean_cache(*id, clean_batched_query))
            .count()
    }

    /// Fetches a node's children on a blocking thread if they are still loading.
    pub async fn expand(self: &Arc<Self>, id: NodeId) -> NodeChildren {
        let Some(node) = self.node(id) else {
            return NodeChildren::Error("Node no longer exists".to_string());
        };
        let children = node.children(self);
        if !matches!(children, NodeChildren::Loading) {
            return children;
        }
        let fetching = node.clone();
        match tokio::task::spawn_blocking(move || fetching.fetch_children()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("Fetching children of {} failed: {e}", node.label()),
            Err(e) => log::error!("Fetch task for {} panicked: {e}", node.label()),
        }
        self.invalidate_subtree(id);
        node.children(self)
    }

    pub(crate) fn child_with_file(&self, parent: NodeId, file: &VirtualFile) -> Option<Arc<dyn TreeNode>> {
        self.children_of(parent)
            .into_iter()
            .find(|c| c.virtual_file().as_ref() == Some(file))
    }
}

fn subtree_ids(index: &TreeIndex, root: NodeId) -> Vec<NodeId> {
    let mut result = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !index.nodes.contains_key(&id) {
            continue;
        }
        result.push(id);
        if let Some(children) = index.children.get(&id) {
            stack.extend(children.iter().copied());
        }
    }
    result
}
