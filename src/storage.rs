pub mod local_file_system;

mod context;
mod error;
mod types;

#[cfg(test)]
pub mod test;

pub use context::*;
pub use error::*;
pub use types::*;

use async_trait::async_trait;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// A readable byte stream handed across the storage boundary.
pub type DataReader = Pin<Box<dyn AsyncRead + Send>>;

/// The contract every storage backend implements.
///
/// Paths are absolute and relative to the namespace of whoever is being
/// called: a backend sees its own internal paths, a mount or the mount table
/// sees virtual ones. Errors are reported through [`StorageError`] so that
/// callers can branch on [`StorageError::kind`].
///
/// A backend that cannot support an operation must fail with
/// [`StorageError::NotSupported`] instead of a generic error.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_dir(&self, ctx: &RequestContext, path: &str) -> Result<(), StorageError>;

    /// Removes a file, or a directory with all of its content.
    async fn delete(&self, ctx: &RequestContext, path: &str) -> Result<(), StorageError>;

    async fn move_entry(
        &self,
        ctx: &RequestContext,
        source: &str,
        target: &str,
    ) -> Result<(), StorageError>;

    async fn get_md(&self, ctx: &RequestContext, path: &str) -> Result<MD, StorageError>;

    async fn list_folder(&self, ctx: &RequestContext, path: &str)
        -> Result<Vec<MD>, StorageError>;

    /// Writes the whole content of `reader` to `path`, replacing any existing file.
    /// The new content must become visible atomically.
    async fn upload(
        &self,
        ctx: &RequestContext,
        path: &str,
        reader: DataReader,
    ) -> Result<(), StorageError>;

    async fn download(&self, ctx: &RequestContext, path: &str)
        -> Result<DataReader, StorageError>;

    async fn list_revisions(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<Vec<Revision>, StorageError>;

    async fn download_revision(
        &self,
        ctx: &RequestContext,
        path: &str,
        rev_key: &str,
    ) -> Result<DataReader, StorageError>;

    async fn restore_revision(
        &self,
        ctx: &RequestContext,
        path: &str,
        rev_key: &str,
    ) -> Result<(), StorageError>;

    async fn list_recycle(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<Vec<RecycleItem>, StorageError>;

    async fn restore_recycle_item(
        &self,
        ctx: &RequestContext,
        restore_key: &str,
    ) -> Result<(), StorageError>;

    async fn empty_recycle(&self, ctx: &RequestContext, path: &str) -> Result<(), StorageError>;

    /// Resolves an opaque id into a path of the same namespace.
    async fn get_path_by_id(&self, ctx: &RequestContext, id: &str)
        -> Result<String, StorageError>;

    async fn set_acl(&self, ctx: &RequestContext, path: &str, acl: &Acl)
        -> Result<(), StorageError>;

    async fn unset_acl(
        &self,
        ctx: &RequestContext,
        path: &str,
        target: &AclTarget,
    ) -> Result<(), StorageError>;

    async fn update_acl(
        &self,
        ctx: &RequestContext,
        path: &str,
        acl: &Acl,
    ) -> Result<(), StorageError>;

    async fn get_quota(&self, ctx: &RequestContext, path: &str) -> Result<Quota, StorageError>;
}
