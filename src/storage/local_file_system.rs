mod compute_file_mime;

use super::{
    Acl, AclTarget, DataReader, Quota, RecycleItem, RequestContext, Revision, Storage,
    StorageError, MD,
};
use crate::virtual_path::clean_path;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use compute_file_mime::{compute_file_mime, DIRECTORY_MIME};
use std::{
    fs::Metadata,
    path::{Path, PathBuf},
};
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncWriteExt, BufReader},
};
use uuid::Uuid;

/// Upload temp files start with this and are hidden from listings.
const UPLOAD_TEMP_PREFIX: &str = ".upload-";

/// Serves a directory tree of the local filesystem.
///
/// Ids are the url-safe base64 encoding of the backend path, so resolving an
/// id needs no index. Uploads are written next to their destination and
/// renamed into place. Revisions, the recycle bin and ACLs are not available.
pub struct LocalFileSystem {
    root: PathBuf,
    quota_bytes: Option<u64>,
}

impl LocalFileSystem {
    pub async fn new(
        root: impl Into<PathBuf>,
        quota_bytes: Option<u64>,
    ) -> Result<Self, std::io::Error> {
        let root = root.into();

        let root_exists = tokio::fs::try_exists(&root).await;
        let root_exists = match root_exists {
            Ok(exists) => exists,
            Err(err) => {
                log::error!(target: "local_file_system", method="new", root:?, err:err; "Failed to check if root exists.");
                return Err(err);
            }
        };

        if !root_exists {
            if let Err(err) = tokio::fs::create_dir_all(&root).await {
                log::error!(target: "local_file_system", method="new", root:?, err:err; "Failed to create root.");
                return Err(err);
            }
        }

        let root_meta = match tokio::fs::metadata(&root).await {
            Ok(meta) => meta,
            Err(err) => {
                log::error!(target: "local_file_system", method="new", root:?, err:err; "Failed to get metadata of root.");
                return Err(err);
            }
        };

        if !root_meta.is_dir() {
            log::error!(target: "local_file_system", method="new", root:?; "Root is not a directory.");
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("`{}` is not a directory", root.display()),
            ));
        }

        Ok(Self { root, quota_bytes })
    }

    /// Cleans an absolute backend path and maps it below the root.
    fn to_os_path(&self, path: &str) -> Result<(String, PathBuf), StorageError> {
        if !path.starts_with('/') {
            return Err(StorageError::InvalidPath(format!(
                "`{}` is not an absolute path",
                path
            )));
        }

        let path = clean_path(path);
        let os_path = match path.trim_start_matches('/') {
            "" => self.root.clone(),
            relative => self.root.join(relative),
        };

        Ok((path, os_path))
    }

    fn reject_root(path: &str, operation: &str) -> Result<(), StorageError> {
        if path == "/" {
            return Err(StorageError::InvalidArgument(format!(
                "cannot {} the root directory",
                operation
            )));
        }

        Ok(())
    }

    fn encode_id(path: &str) -> String {
        URL_SAFE_NO_PAD.encode(path)
    }

    fn decode_id(id: &str) -> Result<String, StorageError> {
        let invalid = || StorageError::InvalidArgument(format!("`{}` is not a valid id", id));

        let bytes = URL_SAFE_NO_PAD.decode(id).map_err(|_| invalid())?;
        let path = String::from_utf8(bytes).map_err(|_| invalid())?;

        if !path.starts_with('/') || clean_path(&path) != path {
            return Err(invalid());
        }

        Ok(path)
    }

    async fn make_md(
        &self,
        path: String,
        os_path: &Path,
        meta: &Metadata,
    ) -> Result<MD, StorageError> {
        let mtime = meta
            .modified()
            .map(|modified| DateTime::<Utc>::from(modified).timestamp().max(0) as u64)
            .unwrap_or_default();

        let (size, tree_count, mime) = if meta.is_dir() {
            let usage = tree_usage(os_path.to_path_buf())
                .await
                .map_err(|err| StorageError::from_io(err, &path))?;
            (usage.bytes, usage.entries, DIRECTORY_MIME)
        } else {
            let mime = match compute_file_mime(os_path).await {
                Ok(mime) => mime,
                Err(err) => {
                    log::error!(target: "local_file_system", method="make_md", path, os_path:?, err:err; "Failed to compute mime.");
                    return Err(StorageError::Internal(format!(
                        "failed to compute mime of `{}`: {}",
                        path, err
                    )));
                }
            };
            (meta.len(), 0, mime)
        };

        Ok(MD {
            id: Self::encode_id(&path),
            etag: format!("{:x}-{:x}", mtime, size),
            path,
            size,
            mtime,
            is_dir: meta.is_dir(),
            checksum: None,
            mime: mime.to_owned(),
            is_read_only: meta.permissions().readonly(),
            is_shareable: true,
            deref_path: None,
            tree_count,
        })
    }

    fn not_supported(operation: &str) -> StorageError {
        StorageError::NotSupported(format!("{} on a local filesystem", operation))
    }
}

#[async_trait]
impl Storage for LocalFileSystem {
    async fn create_dir(&self, _ctx: &RequestContext, path: &str) -> Result<(), StorageError> {
        let (path, os_path) = self.to_os_path(path)?;
        Self::reject_root(&path, "create")?;

        if let Err(err) = tokio::fs::create_dir(&os_path).await {
            log::debug!(target: "local_file_system", method="create_dir", path, os_path:?, err:err; "Failed to create directory.");
            return Err(StorageError::from_io(err, &path));
        }

        Ok(())
    }

    async fn delete(&self, _ctx: &RequestContext, path: &str) -> Result<(), StorageError> {
        let (path, os_path) = self.to_os_path(path)?;
        Self::reject_root(&path, "delete")?;

        let meta = tokio::fs::symlink_metadata(&os_path)
            .await
            .map_err(|err| StorageError::from_io(err, &path))?;

        let result = if meta.is_dir() {
            tokio::fs::remove_dir_all(&os_path).await
        } else {
            tokio::fs::remove_file(&os_path).await
        };

        if let Err(err) = result {
            log::error!(target: "local_file_system", method="delete", path, os_path:?, err:err; "Failed to remove entry.");
            return Err(StorageError::from_io(err, &path));
        }

        Ok(())
    }

    async fn move_entry(
        &self,
        _ctx: &RequestContext,
        source: &str,
        target: &str,
    ) -> Result<(), StorageError> {
        let (source, os_source) = self.to_os_path(source)?;
        let (target, os_target) = self.to_os_path(target)?;
        Self::reject_root(&source, "move")?;
        Self::reject_root(&target, "replace")?;

        if crate::virtual_path::strip_prefix(&target, &source).is_some() {
            return Err(StorageError::InvalidArgument(format!(
                "cannot move `{}` into itself",
                source
            )));
        }

        if let Err(err) = tokio::fs::metadata(&os_source).await {
            return Err(StorageError::from_io(err, &source));
        }

        if let Err(err) = tokio::fs::rename(&os_source, &os_target).await {
            log::error!(target: "local_file_system", method="move_entry", source, target, err:err; "Failed to rename entry.");
            return Err(StorageError::from_io(err, &target));
        }

        Ok(())
    }

    async fn get_md(&self, _ctx: &RequestContext, path: &str) -> Result<MD, StorageError> {
        let (path, os_path) = self.to_os_path(path)?;

        let meta = tokio::fs::metadata(&os_path)
            .await
            .map_err(|err| StorageError::from_io(err, &path))?;

        self.make_md(path, &os_path, &meta).await
    }

    async fn list_folder(
        &self,
        _ctx: &RequestContext,
        path: &str,
    ) -> Result<Vec<MD>, StorageError> {
        let (path, os_path) = self.to_os_path(path)?;

        let meta = tokio::fs::metadata(&os_path)
            .await
            .map_err(|err| StorageError::from_io(err, &path))?;

        if !meta.is_dir() {
            return Err(StorageError::InvalidArgument(format!(
                "`{}` is not a directory",
                path
            )));
        }

        let mut entries = tokio::fs::read_dir(&os_path)
            .await
            .map_err(|err| StorageError::from_io(err, &path))?;
        let mut mds = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| StorageError::from_io(err, &path))?
        {
            let name = entry.file_name();
            let name = match name.to_str() {
                Some(name) if !name.starts_with(UPLOAD_TEMP_PREFIX) => name.to_owned(),
                Some(_) => continue,
                None => {
                    log::warn!(target: "local_file_system", method="list_folder", path, name:? = entry.file_name(); "Skipped entry with a non utf-8 name.");
                    continue;
                }
            };

            let child_path = crate::virtual_path::join_path(&path, &name);
            let child_meta = match entry.metadata().await {
                Ok(meta) => meta,
                // removed between listing and stat
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(StorageError::from_io(err, &child_path)),
            };

            mds.push(self.make_md(child_path, &entry.path(), &child_meta).await?);
        }

        mds.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(mds)
    }

    async fn upload(
        &self,
        _ctx: &RequestContext,
        path: &str,
        mut reader: DataReader,
    ) -> Result<(), StorageError> {
        let (path, os_path) = self.to_os_path(path)?;
        Self::reject_root(&path, "overwrite")?;

        if let Ok(meta) = tokio::fs::metadata(&os_path).await {
            if meta.is_dir() {
                return Err(StorageError::InvalidArgument(format!(
                    "`{}` is a directory",
                    path
                )));
            }
        }

        // the temp file lives next to the destination, so the rename never crosses devices
        let parent = os_path.parent().unwrap_or(&self.root);
        let temp_path = parent.join(format!("{}{}", UPLOAD_TEMP_PREFIX, Uuid::new_v4()));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await;
        let mut file = match file {
            Ok(file) => file,
            Err(err) => {
                log::debug!(target: "local_file_system", method="upload", path, temp_path:?, err:err; "Failed to create temp file.");
                return Err(StorageError::from_io(err, &path));
            }
        };

        let written = async {
            tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        if let Err(err) = written {
            log::error!(target: "local_file_system", method="upload", path, temp_path:?, err:err; "Failed to write temp file.");

            if let Err(err) = tokio::fs::remove_file(&temp_path).await {
                log::warn!(target: "local_file_system", method="upload", path, temp_path:?, err:err; "Failed to remove temp file.");
            }

            return Err(StorageError::Io(err));
        }

        if let Err(err) = tokio::fs::rename(&temp_path, &os_path).await {
            log::error!(target: "local_file_system", method="upload", path, temp_path:?, err:err; "Failed to rename temp file.");

            if let Err(err) = tokio::fs::remove_file(&temp_path).await {
                log::warn!(target: "local_file_system", method="upload", path, temp_path:?, err:err; "Failed to remove temp file.");
            }

            return Err(StorageError::from_io(err, &path));
        }

        Ok(())
    }

    async fn download(
        &self,
        _ctx: &RequestContext,
        path: &str,
    ) -> Result<DataReader, StorageError> {
        let (path, os_path) = self.to_os_path(path)?;

        let file = File::open(&os_path)
            .await
            .map_err(|err| StorageError::from_io(err, &path))?;
        let meta = file
            .metadata()
            .await
            .map_err(|err| StorageError::from_io(err, &path))?;

        if meta.is_dir() {
            return Err(StorageError::InvalidArgument(format!(
                "`{}` is a directory",
                path
            )));
        }

        Ok(Box::pin(BufReader::new(file)))
    }

    async fn list_revisions(
        &self,
        _ctx: &RequestContext,
        _path: &str,
    ) -> Result<Vec<Revision>, StorageError> {
        Err(Self::not_supported("list revisions"))
    }

    async fn download_revision(
        &self,
        _ctx: &RequestContext,
        _path: &str,
        _rev_key: &str,
    ) -> Result<DataReader, StorageError> {
        Err(Self::not_supported("download revision"))
    }

    async fn restore_revision(
        &self,
        _ctx: &RequestContext,
        _path: &str,
        _rev_key: &str,
    ) -> Result<(), StorageError> {
        Err(Self::not_supported("restore revision"))
    }

    async fn list_recycle(
        &self,
        _ctx: &RequestContext,
        _path: &str,
    ) -> Result<Vec<RecycleItem>, StorageError> {
        Err(Self::not_supported("list recycle"))
    }

    async fn restore_recycle_item(
        &self,
        _ctx: &RequestContext,
        _restore_key: &str,
    ) -> Result<(), StorageError> {
        Err(Self::not_supported("restore recycle item"))
    }

    async fn empty_recycle(&self, _ctx: &RequestContext, _path: &str) -> Result<(), StorageError> {
        Err(Self::not_supported("empty recycle"))
    }

    async fn get_path_by_id(
        &self,
        _ctx: &RequestContext,
        id: &str,
    ) -> Result<String, StorageError> {
        let path = Self::decode_id(id)?;
        let (path, os_path) = self.to_os_path(&path)?;

        match tokio::fs::try_exists(&os_path).await {
            Ok(true) => Ok(path),
            Ok(false) => Err(StorageError::NotFound(format!("id `{}`", id))),
            Err(err) => Err(StorageError::from_io(err, &path)),
        }
    }

    async fn set_acl(
        &self,
        _ctx: &RequestContext,
        _path: &str,
        _acl: &Acl,
    ) -> Result<(), StorageError> {
        Err(Self::not_supported("set acl"))
    }

    async fn unset_acl(
        &self,
        _ctx: &RequestContext,
        _path: &str,
        _target: &AclTarget,
    ) -> Result<(), StorageError> {
        Err(Self::not_supported("unset acl"))
    }

    async fn update_acl(
        &self,
        _ctx: &RequestContext,
        _path: &str,
        _acl: &Acl,
    ) -> Result<(), StorageError> {
        Err(Self::not_supported("update acl"))
    }

    /// `total_bytes` is 0 when no quota is configured.
    async fn get_quota(&self, _ctx: &RequestContext, path: &str) -> Result<Quota, StorageError> {
        let (path, os_path) = self.to_os_path(path)?;

        if let Err(err) = tokio::fs::metadata(&os_path).await {
            return Err(StorageError::from_io(err, &path));
        }

        let usage = tree_usage(self.root.clone())
            .await
            .map_err(|err| StorageError::from_io(err, "/"))?;

        Ok(Quota {
            total_bytes: self.quota_bytes.unwrap_or(0),
            used_bytes: usage.bytes,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TreeUsage {
    entries: u64,
    bytes: u64,
}

/// Counts the entries and file bytes below a directory, recursively.
async fn tree_usage(dir: PathBuf) -> Result<TreeUsage, std::io::Error> {
    fn walk(dir: &Path, usage: &mut TreeUsage) -> Result<(), std::io::Error> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err),
            };

            usage.entries += 1;

            if meta.is_dir() {
                walk(&entry.path(), usage)?;
            } else {
                usage.bytes += meta.len();
            }
        }

        Ok(())
    }

    tokio::task::spawn_blocking(move || {
        let mut usage = TreeUsage::default();
        walk(&dir, &mut usage)?;
        Ok::<_, std::io::Error>(usage)
    })
    .await
    .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?
}
