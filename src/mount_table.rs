use crate::{
    mount::Mount,
    storage::{
        Acl, AclTarget, DataReader, Quota, RecycleItem, RequestContext, Revision, Storage,
        StorageError, StorageResultExt, MD,
    },
    virtual_path::{join_path, NamespacedId, VirtualPath},
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

/// The set of mounts making up the virtual namespace.
///
/// Every operation dereferences its path (tree, id or mixed syntax) into a
/// tree path, picks the mount with the longest matching prefix and delegates.
/// The mount list is an immutable snapshot; `add_mount` and `remove_mount`
/// build a new list and swap it in, so readers only hold the lock while
/// cloning an `Arc`.
pub struct MountTable {
    mounts: RwLock<Arc<Vec<Arc<Mount>>>>,
}

impl MountTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            mounts: RwLock::new(Arc::new(Vec::new())),
        })
    }

    pub fn list_mounts(&self) -> Arc<Vec<Arc<Mount>>> {
        self.mounts.read().clone()
    }

    pub fn add_mount(&self, mount: Mount) -> Result<Arc<Mount>, StorageError> {
        let mut mounts = self.mounts.write();

        if let Some(existing) = mounts
            .iter()
            .find(|existing| existing.prefix() == mount.prefix())
        {
            return Err(StorageError::InvalidArgument(format!(
                "prefix `{}` is already mounted with storage id `{}`",
                mount.prefix(),
                existing.storage_id()
            )));
        }

        if let Some(existing) = mounts
            .iter()
            .find(|existing| existing.storage_id() == mount.storage_id())
        {
            return Err(StorageError::InvalidArgument(format!(
                "storage id `{}` is already used by the mount at `{}`",
                mount.storage_id(),
                existing.prefix()
            )));
        }

        let mount = Arc::new(mount);
        let mut next = Vec::with_capacity(mounts.len() + 1);
        next.extend(mounts.iter().cloned());
        next.push(mount.clone());
        *mounts = Arc::new(next);

        log::info!(target: "mount_table", prefix = mount.prefix(), storage_id = mount.storage_id(); "Mount has been added.");

        Ok(mount)
    }

    pub fn remove_mount(&self, prefix: &str) -> Result<Arc<Mount>, StorageError> {
        let mut mounts = self.mounts.write();

        let index = mounts
            .iter()
            .position(|mount| mount.prefix() == prefix)
            .ok_or_else(|| StorageError::NotFound(format!("mount `{}`", prefix)))?;

        let mut next = mounts.as_ref().clone();
        let removed = next.remove(index);
        *mounts = Arc::new(next);

        log::info!(target: "mount_table", prefix = removed.prefix(), storage_id = removed.storage_id(); "Mount has been removed.");

        Ok(removed)
    }

    /// Finds the mount owning a cleaned tree path by longest prefix match.
    pub fn find_mount_by_path(&self, path: &str) -> Result<Arc<Mount>, StorageError> {
        self.list_mounts()
            .iter()
            .filter(|mount| mount.owns(path))
            .max_by_key(|mount| mount.prefix().len())
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("no mount owns `{}`", path)))
    }

    pub fn find_mount_by_id(&self, storage_id: &str) -> Result<Arc<Mount>, StorageError> {
        self.list_mounts()
            .iter()
            .find(|mount| mount.storage_id() == storage_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("no mount has storage id `{}`", storage_id)))
    }

    /// Turns any accepted path syntax into a virtual tree path.
    pub async fn dereference(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<String, StorageError> {
        match VirtualPath::parse(path)? {
            VirtualPath::Tree(tree_path) => Ok(tree_path),
            VirtualPath::Id(id) => self.path_of_id(ctx, &id).await,
            VirtualPath::Mixed(id, tail) => {
                let base = self.path_of_id(ctx, &id).await?;
                let deref_path = join_path(&base, &tail);

                log::debug!(target: "mount_table", trace_id:% = ctx.trace_id, path, deref_path; "Dereferenced mixed path.");

                Ok(deref_path)
            }
        }
    }

    /// Dereferences `path` and returns the mount owning it with the tree path.
    pub async fn resolve(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<(Arc<Mount>, String), StorageError> {
        let deref_path = self.dereference(ctx, path).await?;
        let mount = self.find_mount_by_path(&deref_path)?;
        Ok((mount, deref_path))
    }

    async fn path_of_id(
        &self,
        ctx: &RequestContext,
        id: &NamespacedId,
    ) -> Result<String, StorageError> {
        let mount = self.find_mount_by_id(&id.namespace)?;
        mount.get_path_by_id(ctx, &id.local_id).await
    }
}

#[async_trait]
impl Storage for MountTable {
    async fn create_dir(&self, ctx: &RequestContext, path: &str) -> Result<(), StorageError> {
        let (mount, deref_path) = self.resolve(ctx, path).await?;
        mount
            .create_dir(ctx, &deref_path)
            .await
            .with_context(|| format!("create dir `{}`", path))
    }

    async fn delete(&self, ctx: &RequestContext, path: &str) -> Result<(), StorageError> {
        let (mount, deref_path) = self.resolve(ctx, path).await?;
        mount
            .delete(ctx, &deref_path)
            .await
            .with_context(|| format!("delete `{}`", path))
    }

    async fn move_entry(
        &self,
        ctx: &RequestContext,
        source: &str,
        target: &str,
    ) -> Result<(), StorageError> {
        let (source_mount, deref_source) = self.resolve(ctx, source).await?;
        let (target_mount, deref_target) = self.resolve(ctx, target).await?;

        if !Arc::ptr_eq(&source_mount, &target_mount) {
            log::warn!(target: "mount_table", trace_id:% = ctx.trace_id, source, target, source_mount = source_mount.prefix(), target_mount = target_mount.prefix(); "Rejected move across mounts.");

            return Err(StorageError::NotSupported(format!(
                "move from mount `{}` to mount `{}`",
                source_mount.prefix(),
                target_mount.prefix()
            )));
        }

        source_mount
            .move_entry(ctx, &deref_source, &deref_target)
            .await
            .with_context(|| format!("move `{}` to `{}`", source, target))
    }

    async fn get_md(&self, ctx: &RequestContext, path: &str) -> Result<MD, StorageError> {
        let (mount, deref_path) = self.resolve(ctx, path).await?;
        mount
            .get_md(ctx, &deref_path)
            .await
            .with_context(|| format!("get md `{}`", path))
    }

    async fn list_folder(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<Vec<MD>, StorageError> {
        let (mount, deref_path) = self.resolve(ctx, path).await?;
        mount
            .list_folder(ctx, &deref_path)
            .await
            .with_context(|| format!("list folder `{}`", path))
    }

    async fn upload(
        &self,
        ctx: &RequestContext,
        path: &str,
        reader: DataReader,
    ) -> Result<(), StorageError> {
        let (mount, deref_path) = self.resolve(ctx, path).await?;
        mount
            .upload(ctx, &deref_path, reader)
            .await
            .with_context(|| format!("upload `{}`", path))
    }

    async fn download(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<DataReader, StorageError> {
        let (mount, deref_path) = self.resolve(ctx, path).await?;
        mount
            .download(ctx, &deref_path)
            .await
            .with_context(|| format!("download `{}`", path))
    }

    async fn list_revisions(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<Vec<Revision>, StorageError> {
        let (mount, deref_path) = self.resolve(ctx, path).await?;
        mount
            .list_revisions(ctx, &deref_path)
            .await
            .with_context(|| format!("list revisions `{}`", path))
    }

    async fn download_revision(
        &self,
        ctx: &RequestContext,
        path: &str,
        rev_key: &str,
    ) -> Result<DataReader, StorageError> {
        let (mount, deref_path) = self.resolve(ctx, path).await?;
        mount
            .download_revision(ctx, &deref_path, rev_key)
            .await
            .with_context(|| format!("download revision `{}` of `{}`", rev_key, path))
    }

    async fn restore_revision(
        &self,
        ctx: &RequestContext,
        path: &str,
        rev_key: &str,
    ) -> Result<(), StorageError> {
        let (mount, deref_path) = self.resolve(ctx, path).await?;
        mount
            .restore_revision(ctx, &deref_path, rev_key)
            .await
            .with_context(|| format!("restore revision `{}` of `{}`", rev_key, path))
    }

    async fn list_recycle(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<Vec<RecycleItem>, StorageError> {
        let (mount, deref_path) = self.resolve(ctx, path).await?;
        mount
            .list_recycle(ctx, &deref_path)
            .await
            .with_context(|| format!("list recycle `{}`", path))
    }

    /// Routes by the `<storage_id>:` prefix of the key. The mount strips it
    /// before its backend sees the key.
    async fn restore_recycle_item(
        &self,
        ctx: &RequestContext,
        restore_key: &str,
    ) -> Result<(), StorageError> {
        let (storage_id, _) = restore_key.split_once(':').ok_or_else(|| {
            StorageError::InvalidPath(format!(
                "restore key `{}` carries no storage id",
                restore_key
            ))
        })?;
        let mount = self.find_mount_by_id(storage_id)?;

        log::debug!(target: "mount_table", trace_id:% = ctx.trace_id, restore_key, prefix = mount.prefix(); "Routing restore key.");

        mount
            .restore_recycle_item(ctx, restore_key)
            .await
            .with_context(|| format!("restore recycle item `{}`", restore_key))
    }

    async fn empty_recycle(&self, ctx: &RequestContext, path: &str) -> Result<(), StorageError> {
        let (mount, deref_path) = self.resolve(ctx, path).await?;
        mount
            .empty_recycle(ctx, &deref_path)
            .await
            .with_context(|| format!("empty recycle `{}`", path))
    }

    /// `id` must be a full `<storage_id>:<id>` path.
    async fn get_path_by_id(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<String, StorageError> {
        match VirtualPath::parse(id)? {
            VirtualPath::Id(id) => self
                .path_of_id(ctx, &id)
                .await
                .with_context(|| format!("get path by id `{}`", id)),
            _ => Err(StorageError::InvalidPath(format!(
                "`{}` is not an id path",
                id
            ))),
        }
    }

    async fn set_acl(
        &self,
        ctx: &RequestContext,
        path: &str,
        acl: &Acl,
    ) -> Result<(), StorageError> {
        let (mount, deref_path) = self.resolve(ctx, path).await?;
        mount
            .set_acl(ctx, &deref_path, acl)
            .await
            .with_context(|| format!("set acl on `{}`", path))
    }

    async fn unset_acl(
        &self,
        ctx: &RequestContext,
        path: &str,
        target: &AclTarget,
    ) -> Result<(), StorageError> {
        let (mount, deref_path) = self.resolve(ctx, path).await?;
        mount
            .unset_acl(ctx, &deref_path, target)
            .await
            .with_context(|| format!("unset acl on `{}`", path))
    }

    async fn update_acl(
        &self,
        ctx: &RequestContext,
        path: &str,
        acl: &Acl,
    ) -> Result<(), StorageError> {
        let (mount, deref_path) = self.resolve(ctx, path).await?;
        mount
            .update_acl(ctx, &deref_path, acl)
            .await
            .with_context(|| format!("update acl on `{}`", path))
    }

    async fn get_quota(&self, ctx: &RequestContext, path: &str) -> Result<Quota, StorageError> {
        let (mount, deref_path) = self.resolve(ctx, path).await?;
        mount
            .get_quota(ctx, &deref_path)
            .await
            .with_context(|| format!("get quota of `{}`", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mount::MountOptions,
        storage::{
            test::{test_context, SpyStorage},
            ErrorKind,
        },
    };
    use std::io::Cursor;
    use tokio::io::AsyncReadExt;

    fn mount_spy(table: &MountTable, prefix: &str, id: &str) -> Arc<SpyStorage> {
        let spy = Arc::new(SpyStorage::new());
        table
            .add_mount(Mount::new(prefix, id, MountOptions::default(), spy.clone()).unwrap())
            .unwrap();
        spy
    }

    #[test]
    fn test_add_mount_rejects_duplicates() {
        let table = MountTable::new();
        mount_spy(&table, "/home", "home");

        let spy = Arc::new(SpyStorage::new());
        let err = table
            .add_mount(Mount::new("/home/", "other", MountOptions::default(), spy.clone()).unwrap())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = table
            .add_mount(Mount::new("/other", "home", MountOptions::default(), spy).unwrap())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        assert_eq!(table.list_mounts().len(), 1);
    }

    #[test]
    fn test_remove_mount() {
        let table = MountTable::new();
        mount_spy(&table, "/home", "home");
        mount_spy(&table, "/eos", "eos");

        let snapshot = table.list_mounts();
        let removed = table.remove_mount("/home").unwrap();

        assert_eq!(removed.storage_id(), "home");
        assert_eq!(table.list_mounts().len(), 1);
        // snapshots taken before the swap stay intact
        assert_eq!(snapshot.len(), 2);

        let err = table.find_mount_by_path("/home/a").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = table.remove_mount("/home").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_find_mount_by_longest_prefix() {
        let table = MountTable::new();
        mount_spy(&table, "/", "root");
        mount_spy(&table, "/docs", "docs");
        mount_spy(&table, "/docs/archive", "archive");

        let find = |path: &str| table.find_mount_by_path(path).unwrap().storage_id().to_owned();

        assert_eq!(find("/docs/report.pdf"), "docs");
        assert_eq!(find("/docs"), "docs");
        assert_eq!(find("/docs/archive/2019"), "archive");
        assert_eq!(find("/docsx/a"), "root");
        assert_eq!(find("/other"), "root");
    }

    #[tokio::test]
    async fn test_resolve_tree_path() {
        let table = MountTable::new();
        mount_spy(&table, "/docs", "docs");
        let ctx = test_context();

        let (mount, deref_path) = table.resolve(&ctx, "/docs/report.pdf").await.unwrap();

        assert_eq!(mount.storage_id(), "docs");
        assert_eq!(deref_path, "/docs/report.pdf");
    }

    #[tokio::test]
    async fn test_resolve_id_and_mixed_paths() {
        let table = MountTable::new();
        let spy = mount_spy(&table, "/home", "home");
        spy.seed_dir("/projects");
        spy.seed_dir("/projects/sub");
        spy.seed_file("/projects/sub/file", "x");
        let id = spy.id_of("/projects").unwrap();
        let ctx = test_context();

        let (mount, deref_path) = table.resolve(&ctx, &format!("home:{}", id)).await.unwrap();
        assert_eq!(mount.storage_id(), "home");
        assert_eq!(deref_path, "/home/projects");

        let (_, deref_path) = table
            .resolve(&ctx, &format!("home:{}/sub/file", id))
            .await
            .unwrap();
        assert_eq!(deref_path, "/home/projects/sub/file");

        let md = table
            .get_md(&ctx, &format!("home:{}/sub/file", id))
            .await
            .unwrap();
        assert_eq!(md.path, "/home/projects/sub/file");
    }

    #[tokio::test]
    async fn test_unknown_mount_is_not_found() {
        let table = MountTable::new();
        let spy = mount_spy(&table, "/home", "home");
        let ctx = test_context();

        let err = table.get_md(&ctx, "nosuchmount:1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = table.get_md(&ctx, "/nowhere/a").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        assert_eq!(spy.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_path_is_invalid() {
        let table = MountTable::new();
        mount_spy(&table, "/home", "home");
        let ctx = test_context();

        let err = table.get_md(&ctx, "relative/path").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidPath);
    }

    #[tokio::test]
    async fn test_ids_round_trip_through_get_path_by_id() {
        let table = MountTable::new();
        let spy = mount_spy(&table, "/home", "home");
        spy.seed_dir("/a");
        spy.seed_file("/a/b.txt", "b");
        spy.seed_file("/c.txt", "c");
        let ctx = test_context();

        for md in table.list_folder(&ctx, "/home").await.unwrap() {
            assert!(md.id.starts_with("home:"));
            assert_eq!(table.get_path_by_id(&ctx, &md.id).await.unwrap(), md.path);
        }

        let md = table.get_md(&ctx, "/home/a/b.txt").await.unwrap();
        assert!(md.id.starts_with("home:"));
        assert_eq!(table.get_path_by_id(&ctx, &md.id).await.unwrap(), md.path);
    }

    #[tokio::test]
    async fn test_get_path_by_id_rejects_tree_paths() {
        let table = MountTable::new();
        mount_spy(&table, "/home", "home");
        let ctx = test_context();

        let err = table.get_path_by_id(&ctx, "/home/a").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidPath);
    }

    #[tokio::test]
    async fn test_move_across_mounts_is_not_supported() {
        let table = MountTable::new();
        let home = mount_spy(&table, "/home", "home");
        let eos = mount_spy(&table, "/eos", "eos");
        home.seed_file("/a.txt", "a");
        let ctx = test_context();

        let err = table
            .move_entry(&ctx, "/home/a.txt", "/eos/a.txt")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotSupported);
        assert_eq!(home.calls(), 0);
        assert_eq!(eos.calls(), 0);
    }

    #[tokio::test]
    async fn test_move_within_mount() {
        let table = MountTable::new();
        let home = mount_spy(&table, "/home", "home");
        home.seed_file("/a.txt", "a");
        home.seed_dir("/dir");
        let ctx = test_context();

        table
            .move_entry(&ctx, "/home/a.txt", "/home/dir/b.txt")
            .await
            .unwrap();

        let md = table.get_md(&ctx, "/home/dir/b.txt").await.unwrap();
        assert_eq!(md.path, "/home/dir/b.txt");
        assert_eq!(home.file_content("/dir/b.txt").unwrap(), b"a");
        assert!(home.file_content("/a.txt").is_none());
    }

    #[tokio::test]
    async fn test_restore_key_routes_to_owning_mount() {
        let table = MountTable::new();
        let home = mount_spy(&table, "/home", "home");
        let eos = mount_spy(&table, "/eos", "eos");
        eos.add_recycle_item(RecycleItem {
            restore_path: "/old.txt".to_owned(),
            restore_key: "77".to_owned(),
            size: 3,
            del_mtime: 1,
            is_dir: false,
        });
        let ctx = test_context();

        table.restore_recycle_item(&ctx, "eos:77").await.unwrap();

        assert_eq!(eos.restored_keys(), vec!["77".to_owned()]);
        assert_eq!(home.calls(), 0);

        let err = table
            .restore_recycle_item(&ctx, "nosuchmount:77")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = table.restore_recycle_item(&ctx, "77").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPath);
    }

    #[tokio::test]
    async fn test_upload_and_download_through_table() {
        let table = MountTable::new();
        let home = mount_spy(&table, "/home", "home");
        let ctx = test_context();

        table
            .upload(&ctx, "/home/new.txt", Box::pin(Cursor::new(b"hello".to_vec())))
            .await
            .unwrap();
        assert_eq!(home.file_content("/new.txt").unwrap(), b"hello");

        let mut reader = table.download(&ctx, "/home/new.txt").await.unwrap();
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn test_quota_and_acl_are_dispatched() {
        let table = MountTable::new();
        let home = mount_spy(&table, "/home", "home");
        home.seed_file("/a", "abcd");
        let ctx = test_context();

        let quota = table.get_quota(&ctx, "/home").await.unwrap();
        assert_eq!(quota.used_bytes, 4);

        let acl = Acl {
            target: "physics".to_owned(),
            acl_type: crate::storage::AclType::Group,
            mode: crate::storage::AclMode::ReadOnly,
        };
        table.set_acl(&ctx, "/home/a", &acl).await.unwrap();
        assert_eq!(home.acls(), vec![("/a".to_owned(), acl)]);
    }
}
