//! Cache-bearing fetch nodes and plain leaf nodes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{
    CacheInvalidatable, CleanCacheOptions, ExplorerTreeStructure, LoadMore, NodeChildren, NodeId, RefreshLabel,
    TreeNode,
};
use crate::attributes::{FileAttributes, Requester, UssAttributes};
use crate::config::ConnectionConfig;
use crate::fetch::{FetchError, FetchRequest, FileFetchCache, RemoteQuery};
use crate::ignore_poison::IgnorePoison;
use crate::vfs::{VfsError, VirtualFile};

/// Text of the error child shown when a node has no connection.
pub const CONNECTION_ERROR: &str = "Error: Check connection";

/// What a fetch node lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchNodeKind {
    DatasetMask,
    Library,
    UssDirectory,
}

/// A node whose children come from the fetch cache.
pub struct FileFetchNode {
    id: NodeId,
    parent: Option<NodeId>,
    kind: FetchNodeKind,
    label: String,
    file: Option<VirtualFile>,
    query: Option<RemoteQuery>,
    cache: Arc<FileFetchCache>,
    cached_children: Mutex<Option<Vec<NodeId>>>,
    need_to_load_more: AtomicBool,
}

impl FileFetchNode {
    fn build(
        parent: Option<NodeId>,
        kind: FetchNodeKind,
        label: String,
        file: Option<VirtualFile>,
        query: Option<RemoteQuery>,
        cache: Arc<FileFetchCache>,
    ) -> Self {
        Self {
            id: NodeId::next(),
            parent,
            kind,
            label,
            file,
            query,
            cache,
            cached_children: Mutex::new(None),
            need_to_load_more: AtomicBool::new(false),
        }
    }

    /// Adds a top-level dataset mask node. Without a connection the node has no query.
    pub fn add_dataset_mask(tree: &ExplorerTreeStructure, connection: Option<ConnectionConfig>, mask: &str) -> Arc<Self> {
        let query = connection.map(|c| {
            RemoteQuery::new(
                c,
                FetchRequest::DatasetMask {
                    mask: mask.to_string(),
                    volser: None,
                },
            )
        });
        let node = Arc::new(Self::build(
            None,
            FetchNodeKind::DatasetMask,
            mask.to_string(),
            None,
            query,
            tree.cache().clone(),
        ));
        tree.register(node.clone());
        node
    }

    /// Adds a top-level USS path node showing the directory at `path`.
    pub fn add_uss_path(
        tree: &ExplorerTreeStructure,
        connection: Option<ConnectionConfig>,
        path: &str,
    ) -> Result<Arc<Self>, VfsError> {
        let (file, query) = match connection {
            Some(c) => {
                let attributes = FileAttributes::Uss(UssAttributes::new(path, true, vec![Requester::new(c.clone())]));
                let file = tree.cache().attributes().get_or_create_file(attributes)?;
                let query = RemoteQuery::new(c, FetchRequest::UssPath { path: path.to_string() });
                (Some(file), Some(query))
            }
            None => (None, None),
        };
        let node = Arc::new(Self::build(
            None,
            FetchNodeKind::UssDirectory,
            path.to_string(),
            file,
            query,
            tree.cache().clone(),
        ));
        tree.register(node.clone());
        Ok(node)
    }

    pub fn kind(&self) -> FetchNodeKind {
        self.kind
    }

    /// Text shown next to the node: last refresh time, or "Out of sync" without a connection.
    pub fn refresh_label(&self) -> RefreshLabel {
        let Some(query) = &self.query else {
            return RefreshLabel::OutOfSync;
        };
        let query = self.cache.real_query_instance(query).unwrap_or_else(|| query.clone());
        match self.cache.find_cache_refresh_date_if_present(&query) {
            Some(at) => RefreshLabel::LatestRefresh(at),
            None => RefreshLabel::NotRefreshed,
        }
    }

    /// Makes the next fetch append a batch instead of starting over.
    pub fn request_load_more(&self) {
        self.need_to_load_more.store(true, Ordering::Release);
        *self.cached_children.lock_ignore_poison() = None;
    }

    fn items(&self, tree: &ExplorerTreeStructure, ids: &[NodeId], query: &RemoteQuery) -> NodeChildren {
        let nodes: Vec<Arc<dyn TreeNode>> = ids.iter().filter_map(|id| tree.node(*id)).collect();
        if nodes.is_empty() {
            return NodeChildren::NoItemsFound;
        }
        let load_more = self
            .cache
            .batch_cursor(query)
            .filter(|c| c.fetch_needed)
            .map(|c| LoadMore {
                items_left: c.items_left(),
            });
        NodeChildren::Items { nodes, load_more }
    }

    /// Creates or reuses a child node per file and drops children whose file is gone.
    fn sync_child_nodes(&self, tree: &ExplorerTreeStructure, files: &[VirtualFile], query: &RemoteQuery) -> Vec<NodeId> {
        let mut ids = Vec::with_capacity(files.len());
        for file in files {
            let node = match tree.child_with_file(self.id, file) {
                Some(existing) => existing,
                None => {
                    let created = self.make_child(file, &query.connection);
                    tree.register(created.clone());
                    created
                }
            };
            ids.push(node.id());
        }
        for stale in tree.children_of(self.id) {
            if !ids.contains(&stale.id()) {
                tree.unregister(stale.id());
            }
        }
        ids
    }

    fn make_child(&self, file: &VirtualFile, connection: &ConnectionConfig) -> Arc<dyn TreeNode> {
        let fetch_child = |kind, request| -> Arc<dyn TreeNode> {
            Arc::new(Self::build(
                Some(self.id),
                kind,
                file.name(),
                Some(file.clone()),
                Some(RemoteQuery::new(connection.clone(), request)),
                self.cache.clone(),
            ))
        };
        match self.cache.attributes().try_get_attributes(file) {
            Some(attributes) if attributes.is_pds() => fetch_child(
                FetchNodeKind::Library,
                FetchRequest::Library {
                    library_name: attributes.name().to_string(),
                },
            ),
            Some(FileAttributes::Uss(u)) if u.is_directory => {
                fetch_child(FetchNodeKind::UssDirectory, FetchRequest::UssPath { path: u.path })
            }
            _ => Arc::new(LeafNode::new(Some(self.id), file.clone())),
        }
    }
}

impl TreeNode for FileFetchNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    fn virtual_file(&self) -> Option<VirtualFile> {
        self.file.clone()
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn children(&self, tree: &ExplorerTreeStructure) -> NodeChildren {
        let Some(query) = &self.query else {
            return NodeChildren::Error(CONNECTION_ERROR.to_string());
        };
        let mut cached = self.cached_children.lock_ignore_poison();
        if let Some(ids) = cached.as_ref() {
            return self.items(tree, ids, query);
        }
        if self.need_to_load_more.load(Ordering::Acquire) {
            return NodeChildren::Loading;
        }
        if let Some(files) = self.cache.get_cached(query) {
            let ids = self.sync_child_nodes(tree, &files, query);
            let children = self.items(tree, &ids, query);
            *cached = Some(ids);
            return children;
        }
        if let Some(message) = self.cache.fetched_error_message(query) {
            return NodeChildren::Error(message);
        }
        NodeChildren::Loading
    }

    fn fetch_children(&self) -> Result<(), FetchError> {
        let Some(query) = &self.query else {
            return Ok(());
        };
        let result = if self.need_to_load_more.swap(false, Ordering::AcqRel) {
            self.cache.load_more(query)
        } else {
            self.cache.reload(query)
        };
        *self.cached_children.lock_ignore_poison() = None;
        result.map(|_| ())
    }

    fn as_cache_invalidatable(&self) -> Option<&dyn CacheInvalidatable> {
        Some(self)
    }
}

impl CacheInvalidatable for FileFetchNode {
    fn query(&self) -> Option<RemoteQuery> {
        self.query.clone()
    }

    fn clean_cache(&self, options: CleanCacheOptions) {
        *self.cached_children.lock_ignore_poison() = None;
        if options.clean_fetch_provider_cache
            && let Some(query) = &self.query
        {
            self.cache.clean_cache(query, options.clean_batched_query);
        }
    }
}

/// A node without children: sequential dataset, member, or USS file.
pub struct LeafNode {
    id: NodeId,
    parent: Option<NodeId>,
    file: VirtualFile,
}

impl LeafNode {
    pub fn new(parent: Option<NodeId>, file: VirtualFile) -> Self {
        Self {
            id: NodeId::next(),
            parent,
            file,
        }
    }
}

impl TreeNode for LeafNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    fn virtual_file(&self) -> Option<VirtualFile> {
        Some(self.file.clone())
    }

    fn label(&self) -> String {
        self.file.name()
    }
}
