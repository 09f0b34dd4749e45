use super::*;
use crate::virtual_path::{clean_path, strip_prefix};
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    io::Cursor,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};
use tokio::io::AsyncReadExt;
use uuid::Uuid;

/// Removes a uuid-named scratch directory when dropped.
pub struct TempDirDropper {
    path: PathBuf,
}

impl TempDirDropper {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("__test_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&path).unwrap();
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDirDropper {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.path).ok();
    }
}

pub fn test_context() -> RequestContext {
    RequestContext::new(Identity {
        user: "einstein".to_owned(),
        groups: vec!["physics".to_owned()],
    })
}

#[derive(Debug, Clone)]
struct SpyNode {
    id: String,
    data: Vec<u8>,
    is_dir: bool,
}

/// An in-memory backend that counts every call it receives and records the
/// keys and ACLs handed to it, so tests can assert on what reached the backend.
pub struct SpyStorage {
    nodes: Mutex<BTreeMap<String, SpyNode>>,
    next_id: AtomicUsize,
    calls: AtomicUsize,
    recycle: Mutex<Vec<RecycleItem>>,
    restored_keys: Mutex<Vec<String>>,
    restored_revisions: Mutex<Vec<(String, String)>>,
    revision_data: Mutex<Vec<u8>>,
    acls: Mutex<Vec<(String, Acl)>>,
}

impl SpyStorage {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_owned(),
            SpyNode {
                id: "0".to_owned(),
                data: Vec::new(),
                is_dir: true,
            },
        );

        Self {
            nodes: Mutex::new(nodes),
            next_id: AtomicUsize::new(1),
            calls: AtomicUsize::new(0),
            recycle: Mutex::new(Vec::new()),
            restored_keys: Mutex::new(Vec::new()),
            restored_revisions: Mutex::new(Vec::new()),
            revision_data: Mutex::new(b"old".to_vec()),
            acls: Mutex::new(Vec::new()),
        }
    }

    /// Number of storage operations that reached this backend.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn file_content(&self, path: &str) -> Option<Vec<u8>> {
        self.nodes
            .lock()
            .get(path)
            .filter(|node| !node.is_dir)
            .map(|node| node.data.clone())
    }

    pub fn id_of(&self, path: &str) -> Option<String> {
        self.nodes.lock().get(path).map(|node| node.id.clone())
    }

    pub fn add_recycle_item(&self, item: RecycleItem) {
        self.recycle.lock().push(item);
    }

    pub fn restored_keys(&self) -> Vec<String> {
        self.restored_keys.lock().clone()
    }

    pub fn restored_revisions(&self) -> Vec<(String, String)> {
        self.restored_revisions.lock().clone()
    }

    pub fn acls(&self) -> Vec<(String, Acl)> {
        self.acls.lock().clone()
    }

    /// Inserts a file directly, without counting a call.
    pub fn seed_file(&self, path: &str, data: impl Into<Vec<u8>>) {
        let id = self.allocate_id();
        self.nodes.lock().insert(
            path.to_owned(),
            SpyNode {
                id,
                data: data.into(),
                is_dir: false,
            },
        );
    }

    /// Inserts a directory directly, without counting a call.
    /// Sets the content every revision reads back as.
    pub fn set_revision_data(&self, data: impl Into<Vec<u8>>) {
        *self.revision_data.lock() = data.into();
    }

    pub fn seed_dir(&self, path: &str) {
        let id = self.allocate_id();
        self.nodes.lock().insert(
            path.to_owned(),
            SpyNode {
                id,
                data: Vec::new(),
                is_dir: true,
            },
        );
    }

    fn allocate_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn parent_of(path: &str) -> String {
        match path.rfind('/') {
            Some(0) | None => "/".to_owned(),
            Some(index) => path[..index].to_owned(),
        }
    }

    fn check_parent_dir(nodes: &BTreeMap<String, SpyNode>, path: &str) -> Result<(), StorageError> {
        let parent = Self::parent_of(path);
        match nodes.get(&parent) {
            Some(node) if node.is_dir => Ok(()),
            Some(_) => Err(StorageError::InvalidArgument(format!(
                "`{}` is not a directory",
                parent
            ))),
            None => Err(StorageError::NotFound(parent)),
        }
    }

    fn make_md(path: &str, node: &SpyNode) -> MD {
        MD {
            id: node.id.clone(),
            path: path.to_owned(),
            size: node.data.len() as u64,
            mtime: 0,
            is_dir: node.is_dir,
            etag: format!("{}-{}", node.id, node.data.len()),
            checksum: None,
            mime: if node.is_dir {
                "httpd/unix-directory".to_owned()
            } else {
                "application/octet-stream".to_owned()
            },
            is_read_only: false,
            is_shareable: true,
            deref_path: None,
            tree_count: 0,
        }
    }
}

#[async_trait]
impl Storage for SpyStorage {
    async fn create_dir(&self, _ctx: &RequestContext, path: &str) -> Result<(), StorageError> {
        self.record_call();
        let id = self.allocate_id();
        let mut nodes = self.nodes.lock();

        if nodes.contains_key(path) {
            return Err(StorageError::InvalidArgument(format!(
                "`{}` already exists",
                path
            )));
        }

        Self::check_parent_dir(&nodes, path)?;
        nodes.insert(
            path.to_owned(),
            SpyNode {
                id,
                data: Vec::new(),
                is_dir: true,
            },
        );

        Ok(())
    }

    async fn delete(&self, _ctx: &RequestContext, path: &str) -> Result<(), StorageError> {
        self.record_call();
        let mut nodes = self.nodes.lock();

        if path == "/" || !nodes.contains_key(path) {
            return Err(StorageError::NotFound(path.to_owned()));
        }

        nodes.retain(|key, _| strip_prefix(key, path).is_none());

        Ok(())
    }

    async fn move_entry(
        &self,
        _ctx: &RequestContext,
        source: &str,
        target: &str,
    ) -> Result<(), StorageError> {
        self.record_call();
        let mut nodes = self.nodes.lock();

        if !nodes.contains_key(source) {
            return Err(StorageError::NotFound(source.to_owned()));
        }

        Self::check_parent_dir(&nodes, target)?;

        let moved = nodes
            .keys()
            .filter_map(|key| strip_prefix(key, source).map(|rest| (key.clone(), rest.to_owned())))
            .collect::<Vec<_>>();

        for (key, rest) in moved {
            if let Some(node) = nodes.remove(&key) {
                nodes.insert(clean_path(&format!("{}{}", target, rest)), node);
            }
        }

        Ok(())
    }

    async fn get_md(&self, _ctx: &RequestContext, path: &str) -> Result<MD, StorageError> {
        self.record_call();
        let nodes = self.nodes.lock();
        let node = nodes
            .get(path)
            .ok_or_else(|| StorageError::NotFound(path.to_owned()))?;

        Ok(Self::make_md(path, node))
    }

    async fn list_folder(
        &self,
        _ctx: &RequestContext,
        path: &str,
    ) -> Result<Vec<MD>, StorageError> {
        self.record_call();
        let nodes = self.nodes.lock();

        match nodes.get(path) {
            Some(node) if node.is_dir => {}
            Some(_) => {
                return Err(StorageError::InvalidArgument(format!(
                    "`{}` is not a directory",
                    path
                )))
            }
            None => return Err(StorageError::NotFound(path.to_owned())),
        }

        let mds = nodes
            .iter()
            .filter(|(key, _)| key.as_str() != "/" && Self::parent_of(key) == path)
            .map(|(key, node)| Self::make_md(key, node))
            .collect();

        Ok(mds)
    }

    async fn upload(
        &self,
        _ctx: &RequestContext,
        path: &str,
        mut reader: DataReader,
    ) -> Result<(), StorageError> {
        self.record_call();
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;

        let new_id = self.allocate_id();
        let mut nodes = self.nodes.lock();
        Self::check_parent_dir(&nodes, path)?;

        let id = match nodes.get(path) {
            Some(node) if node.is_dir => {
                return Err(StorageError::InvalidArgument(format!(
                    "`{}` is a directory",
                    path
                )))
            }
            Some(node) => node.id.clone(),
            None => new_id,
        };
        nodes.insert(
            path.to_owned(),
            SpyNode {
                id,
                data,
                is_dir: false,
            },
        );

        Ok(())
    }

    async fn download(
        &self,
        _ctx: &RequestContext,
        path: &str,
    ) -> Result<DataReader, StorageError> {
        self.record_call();
        let nodes = self.nodes.lock();

        match nodes.get(path) {
            Some(node) if !node.is_dir => Ok(Box::pin(Cursor::new(node.data.clone()))),
            Some(_) => Err(StorageError::InvalidArgument(format!(
                "`{}` is a directory",
                path
            ))),
            None => Err(StorageError::NotFound(path.to_owned())),
        }
    }

    async fn list_revisions(
        &self,
        _ctx: &RequestContext,
        path: &str,
    ) -> Result<Vec<Revision>, StorageError> {
        self.record_call();
        let nodes = self.nodes.lock();
        let node = nodes
            .get(path)
            .ok_or_else(|| StorageError::NotFound(path.to_owned()))?;

        Ok(vec![Revision {
            rev_key: format!("{}.rev1", node.id),
            size: 3,
            mtime: 1,
            is_dir: false,
        }])
    }

    async fn download_revision(
        &self,
        _ctx: &RequestContext,
        path: &str,
        rev_key: &str,
    ) -> Result<DataReader, StorageError> {
        self.record_call();
        let nodes = self.nodes.lock();
        let node = nodes
            .get(path)
            .ok_or_else(|| StorageError::NotFound(path.to_owned()))?;

        if rev_key != format!("{}.rev1", node.id) {
            return Err(StorageError::NotFound(rev_key.to_owned()));
        }

        Ok(Box::pin(Cursor::new(self.revision_data.lock().clone())))
    }

    async fn restore_revision(
        &self,
        _ctx: &RequestContext,
        path: &str,
        rev_key: &str,
    ) -> Result<(), StorageError> {
        self.record_call();
        self.restored_revisions
            .lock()
            .push((path.to_owned(), rev_key.to_owned()));
        Ok(())
    }

    async fn list_recycle(
        &self,
        _ctx: &RequestContext,
        _path: &str,
    ) -> Result<Vec<RecycleItem>, StorageError> {
        self.record_call();
        Ok(self.recycle.lock().clone())
    }

    async fn restore_recycle_item(
        &self,
        _ctx: &RequestContext,
        restore_key: &str,
    ) -> Result<(), StorageError> {
        self.record_call();
        let mut recycle = self.recycle.lock();
        let index = recycle
            .iter()
            .position(|item| item.restore_key == restore_key)
            .ok_or_else(|| StorageError::NotFound(restore_key.to_owned()))?;
        recycle.remove(index);
        self.restored_keys.lock().push(restore_key.to_owned());
        Ok(())
    }

    async fn empty_recycle(&self, _ctx: &RequestContext, _path: &str) -> Result<(), StorageError> {
        self.record_call();
        self.recycle.lock().clear();
        Ok(())
    }

    async fn get_path_by_id(
        &self,
        _ctx: &RequestContext,
        id: &str,
    ) -> Result<String, StorageError> {
        self.record_call();
        self.nodes
            .lock()
            .iter()
            .find(|(_, node)| node.id == id)
            .map(|(path, _)| path.clone())
            .ok_or_else(|| StorageError::NotFound(format!("id `{}`", id)))
    }

    async fn set_acl(
        &self,
        _ctx: &RequestContext,
        path: &str,
        acl: &Acl,
    ) -> Result<(), StorageError> {
        self.record_call();
        self.acls.lock().push((path.to_owned(), acl.clone()));
        Ok(())
    }

    async fn unset_acl(
        &self,
        _ctx: &RequestContext,
        path: &str,
        target: &AclTarget,
    ) -> Result<(), StorageError> {
        self.record_call();
        self.acls
            .lock()
            .retain(|(acl_path, acl)| acl_path != path || &acl.grantee() != target);
        Ok(())
    }

    async fn update_acl(
        &self,
        _ctx: &RequestContext,
        path: &str,
        acl: &Acl,
    ) -> Result<(), StorageError> {
        self.record_call();
        let mut acls = self.acls.lock();

        for (acl_path, existing) in acls.iter_mut() {
            if acl_path == path && existing.grantee() == acl.grantee() {
                existing.mode = acl.mode;
                return Ok(());
            }
        }

        Err(StorageError::NotFound(format!("acl for `{}`", acl.target)))
    }

    async fn get_quota(&self, _ctx: &RequestContext, _path: &str) -> Result<Quota, StorageError> {
        self.record_call();
        let used_bytes = self
            .nodes
            .lock()
            .values()
            .map(|node| node.data.len() as u64)
            .sum();

        Ok(Quota {
            total_bytes: 1000,
            used_bytes,
        })
    }
}
