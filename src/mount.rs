use crate::{
    storage::{
        Acl, AclTarget, DataReader, Quota, RecycleItem, RequestContext, Revision, Storage,
        StorageError, StorageResultExt, MD,
    },
    virtual_path::{clean_path, join_path, strip_prefix},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MountOptions {
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub sharing_disabled: bool,
}

/// A backend storage bound into the virtual namespace.
///
/// The mount owns every path below `prefix` and every id issued under
/// `storage_id`. It strips the prefix before calling the backend and adds it
/// back to whatever comes out, so callers only ever see virtual paths and
/// ids of the form `<storage_id>:<backend id>`.
pub struct Mount {
    prefix: String,
    storage_id: String,
    options: MountOptions,
    backend: Arc<dyn Storage>,
}

impl std::fmt::Debug for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mount")
            .field("prefix", &self.prefix)
            .field("storage_id", &self.storage_id)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Mount {
    pub fn new(
        prefix: &str,
        storage_id: &str,
        options: MountOptions,
        backend: Arc<dyn Storage>,
    ) -> Result<Self, StorageError> {
        if !prefix.starts_with('/') {
            return Err(StorageError::InvalidPath(format!(
                "mount prefix `{}` must be absolute",
                prefix
            )));
        }

        if storage_id.is_empty() || storage_id.contains(['/', ':']) {
            return Err(StorageError::InvalidArgument(format!(
                "storage id `{}` must be non-empty and free of `/` and `:`",
                storage_id
            )));
        }

        Ok(Self {
            prefix: clean_path(prefix),
            storage_id: storage_id.to_owned(),
            options,
            backend,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn storage_id(&self) -> &str {
        &self.storage_id
    }

    pub fn options(&self) -> MountOptions {
        self.options
    }

    pub fn is_read_only(&self) -> bool {
        self.options.read_only
    }

    pub fn is_sharing_enabled(&self) -> bool {
        !self.is_read_only() && !self.options.sharing_disabled
    }

    /// Whether this mount owns the given cleaned tree path.
    pub fn owns(&self, path: &str) -> bool {
        strip_prefix(path, &self.prefix).is_some()
    }

    /// Converts a virtual path into the backend's path. Fails with
    /// `InvalidPath` when the path lies outside of this mount.
    pub fn get_internal_path<'a>(&'a self, path: &str) -> Result<(String, &'a str), StorageError> {
        let path = clean_path(path);

        match strip_prefix(&path, &self.prefix) {
            Some(rest) => Ok((join_path("/", rest), &self.prefix)),
            None => Err(StorageError::InvalidPath(format!(
                "`{}` is outside of mount `{}`",
                path, self.prefix
            ))),
        }
    }

    /// Strips this mount's `<storage_id>:` prefix off a restore key.
    pub fn get_internal_restore_key<'a>(&self, restore_key: &'a str) -> Result<&'a str, StorageError> {
        restore_key
            .strip_prefix(&self.storage_id)
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or_else(|| {
                StorageError::InvalidPath(format!(
                    "restore key `{}` does not belong to mount `{}`",
                    restore_key, self.storage_id
                ))
            })
    }

    fn to_virtual_path(&self, internal_path: &str) -> String {
        join_path(&self.prefix, &clean_path(internal_path))
    }

    fn to_external_id(&self, backend_id: &str) -> String {
        format!("{}:{}", self.storage_id, backend_id)
    }

    fn project_md(&self, ctx: &RequestContext, mut md: MD) -> MD {
        let internal_path = md.path;
        md.path = self.to_virtual_path(&internal_path);

        log::debug!(target: "mount", trace_id:% = ctx.trace_id, internal_path, external_path = md.path; "Translated path.");

        md.id = self.to_external_id(&md.id);
        md.deref_path = md
            .deref_path
            .map(|deref_path| self.to_virtual_path(&deref_path));
        md.is_shareable = md.is_shareable && self.is_sharing_enabled();
        md.is_read_only = md.is_read_only || self.is_read_only();
        md
    }

    fn ensure_writable(&self, operation: &str, path: &str) -> Result<(), StorageError> {
        if self.is_read_only() {
            return Err(StorageError::PermissionDenied(format!(
                "{} on `{}` denied: mount `{}` is read-only",
                operation, path, self.prefix
            )));
        }

        Ok(())
    }

    fn ensure_sharing(&self, operation: &str, path: &str) -> Result<(), StorageError> {
        if !self.is_sharing_enabled() {
            return Err(StorageError::PermissionDenied(format!(
                "{} on `{}` denied: sharing is disabled on mount `{}`",
                operation, path, self.prefix
            )));
        }

        Ok(())
    }

    fn context(&self, operation: &str, path: &str) -> String {
        format!("mount `{}`: {} `{}`", self.storage_id, operation, path)
    }
}

#[async_trait]
impl Storage for Mount {
    async fn create_dir(&self, ctx: &RequestContext, path: &str) -> Result<(), StorageError> {
        self.ensure_writable("create dir", path)?;
        let (internal_path, _) = self.get_internal_path(path)?;
        self.backend
            .create_dir(ctx, &internal_path)
            .await
            .with_context(|| self.context("create dir", path))
    }

    async fn delete(&self, ctx: &RequestContext, path: &str) -> Result<(), StorageError> {
        self.ensure_writable("delete", path)?;
        let (internal_path, _) = self.get_internal_path(path)?;
        self.backend
            .delete(ctx, &internal_path)
            .await
            .with_context(|| self.context("delete", path))
    }

    async fn move_entry(
        &self,
        ctx: &RequestContext,
        source: &str,
        target: &str,
    ) -> Result<(), StorageError> {
        self.ensure_writable("move", source)?;
        let (internal_source, _) = self.get_internal_path(source)?;
        let (internal_target, _) = self.get_internal_path(target)?;
        self.backend
            .move_entry(ctx, &internal_source, &internal_target)
            .await
            .with_context(|| self.context("move", &format!("{} -> {}", source, target)))
    }

    async fn get_md(&self, ctx: &RequestContext, path: &str) -> Result<MD, StorageError> {
        let (internal_path, _) = self.get_internal_path(path)?;
        let md = self
            .backend
            .get_md(ctx, &internal_path)
            .await
            .with_context(|| self.context("get md", path))?;

        Ok(self.project_md(ctx, md))
    }

    async fn list_folder(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<Vec<MD>, StorageError> {
        let (internal_path, _) = self.get_internal_path(path)?;
        let mds = self
            .backend
            .list_folder(ctx, &internal_path)
            .await
            .with_context(|| self.context("list folder", path))?;

        Ok(mds
            .into_iter()
            .map(|md| self.project_md(ctx, md))
            .collect())
    }

    async fn upload(
        &self,
        ctx: &RequestContext,
        path: &str,
        reader: DataReader,
    ) -> Result<(), StorageError> {
        self.ensure_writable("upload", path)?;
        let (internal_path, _) = self.get_internal_path(path)?;
        self.backend
            .upload(ctx, &internal_path, reader)
            .await
            .with_context(|| self.context("upload", path))
    }

    async fn download(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<DataReader, StorageError> {
        let (internal_path, _) = self.get_internal_path(path)?;
        self.backend
            .download(ctx, &internal_path)
            .await
            .with_context(|| self.context("download", path))
    }

    async fn list_revisions(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<Vec<Revision>, StorageError> {
        let (internal_path, _) = self.get_internal_path(path)?;
        self.backend
            .list_revisions(ctx, &internal_path)
            .await
            .with_context(|| self.context("list revisions", path))
    }

    async fn download_revision(
        &self,
        ctx: &RequestContext,
        path: &str,
        rev_key: &str,
    ) -> Result<DataReader, StorageError> {
        let (internal_path, _) = self.get_internal_path(path)?;
        self.backend
            .download_revision(ctx, &internal_path, rev_key)
            .await
            .with_context(|| self.context("download revision", path))
    }

    async fn restore_revision(
        &self,
        ctx: &RequestContext,
        path: &str,
        rev_key: &str,
    ) -> Result<(), StorageError> {
        self.ensure_writable("restore revision", path)?;
        let (internal_path, _) = self.get_internal_path(path)?;
        self.backend
            .restore_revision(ctx, &internal_path, rev_key)
            .await
            .with_context(|| self.context("restore revision", path))
    }

    async fn list_recycle(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<Vec<RecycleItem>, StorageError> {
        let (internal_path, _) = self.get_internal_path(path)?;
        let items = self
            .backend
            .list_recycle(ctx, &internal_path)
            .await
            .with_context(|| self.context("list recycle", path))?;

        Ok(items
            .into_iter()
            .map(|mut item| {
                item.restore_key = self.to_external_id(&item.restore_key);
                item.restore_path = self.to_virtual_path(&item.restore_path);
                item
            })
            .collect())
    }

    /// `restore_key` must carry this mount's `<storage_id>:` prefix.
    async fn restore_recycle_item(
        &self,
        ctx: &RequestContext,
        restore_key: &str,
    ) -> Result<(), StorageError> {
        self.ensure_writable("restore recycle item", restore_key)?;
        let internal_restore_key = self.get_internal_restore_key(restore_key)?;
        self.backend
            .restore_recycle_item(ctx, internal_restore_key)
            .await
            .with_context(|| self.context("restore recycle item", restore_key))
    }

    async fn empty_recycle(&self, ctx: &RequestContext, path: &str) -> Result<(), StorageError> {
        self.ensure_writable("empty recycle", path)?;
        let (internal_path, _) = self.get_internal_path(path)?;
        self.backend
            .empty_recycle(ctx, &internal_path)
            .await
            .with_context(|| self.context("empty recycle", path))
    }

    /// `id` is the backend id, without the `<storage_id>:` prefix.
    async fn get_path_by_id(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<String, StorageError> {
        let internal_path = self
            .backend
            .get_path_by_id(ctx, id)
            .await
            .with_context(|| self.context("get path by id", id))?;

        Ok(self.to_virtual_path(&internal_path))
    }

    async fn set_acl(
        &self,
        ctx: &RequestContext,
        path: &str,
        acl: &Acl,
    ) -> Result<(), StorageError> {
        self.ensure_sharing("set acl", path)?;
        let (internal_path, _) = self.get_internal_path(path)?;
        self.backend
            .set_acl(ctx, &internal_path, acl)
            .await
            .with_context(|| self.context("set acl", path))
    }

    async fn unset_acl(
        &self,
        ctx: &RequestContext,
        path: &str,
        target: &AclTarget,
    ) -> Result<(), StorageError> {
        self.ensure_sharing("unset acl", path)?;
        let (internal_path, _) = self.get_internal_path(path)?;
        self.backend
            .unset_acl(ctx, &internal_path, target)
            .await
            .with_context(|| self.context("unset acl", path))
    }

    async fn update_acl(
        &self,
        ctx: &RequestContext,
        path: &str,
        acl: &Acl,
    ) -> Result<(), StorageError> {
        self.ensure_sharing("update acl", path)?;
        let (internal_path, _) = self.get_internal_path(path)?;
        self.backend
            .update_acl(ctx, &internal_path, acl)
            .await
            .with_context(|| self.context("update acl", path))
    }

    async fn get_quota(&self, ctx: &RequestContext, path: &str) -> Result<Quota, StorageError> {
        let (internal_path, _) = self.get_internal_path(path)?;
        self.backend
            .get_quota(ctx, &internal_path)
            .await
            .with_context(|| self.context("get quota", path))
    }
}
