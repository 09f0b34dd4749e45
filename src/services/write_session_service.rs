mod chunk_frame;
mod types;

pub use chunk_frame::*;
pub use types::*;

use crate::{
    mount_table::MountTable,
    storage::{ErrorKind, RequestContext, Storage, StorageError},
};
use chrono::{DateTime, Duration, Utc};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader},
};
use tokio_util::io::InspectReader;
use uuid::Uuid;

/// Name of the file chunks are concatenated into during finish.
const ASSEMBLED_FILE_NAME: &str = "assembled";

/// Chunks are written under a name starting with this and renamed into place.
const PARTIAL_CHUNK_PREFIX: &str = ".partial-";

/// A session directory is renamed to `<id><suffix>` once finish claims it.
const FINISHING_SUFFIX: &str = ".finishing";

#[derive(Error, Debug)]
pub enum WriteSessionError {
    #[error("write session `{0}` does not exist")]
    SessionNotFound(WriteSessionId),
    #[error("chunk `{range}` is incomplete: {received} of {} bytes", .range.length)]
    IncompleteChunk { range: ChunkRange, received: u64 },
    #[error("chunks are not contiguous: expected offset {expected_offset}, found chunk `{found}`")]
    NonContiguous {
        expected_offset: u64,
        found: ChunkRange,
    },
    #[error("checksum mismatch: client sent `{expected}`, assembled content has `{actual}`")]
    ChecksumMismatch { expected: Checksum, actual: Checksum },
    #[error("unexpected entry `{0}` in the staging directory")]
    UnexpectedEntry(String),
    #[error("malformed write stream: {0}")]
    Frame(#[from] ChunkFrameError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl WriteSessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WriteSessionError::SessionNotFound(_) => ErrorKind::NotFound,
            WriteSessionError::NonContiguous { .. } | WriteSessionError::ChecksumMismatch { .. } => {
                ErrorKind::InvalidArgument
            }
            WriteSessionError::Frame(ChunkFrameError::Io(_)) => ErrorKind::Internal,
            WriteSessionError::Frame(_) => ErrorKind::InvalidArgument,
            WriteSessionError::IncompleteChunk { .. }
            | WriteSessionError::UnexpectedEntry(_)
            | WriteSessionError::Io(_) => ErrorKind::Internal,
            WriteSessionError::Storage(err) => err.kind(),
        }
    }
}

/// Stages chunked uploads on disk and commits them to the storage.
///
/// Every session owns one directory named by its id under the staging root.
/// Chunks land there as files named `<offset>-<length>`, in whatever order
/// they arrive. Finishing sorts them by offset, concatenates them and hands
/// the result to a single `upload` call.
///
/// Every chunk write renames a file into the session directory, so the
/// directory's mtime tracks the last activity the reaper looks at. Finish
/// claims the directory by renaming it, after which further writes to the
/// session fail with `SessionNotFound`.
pub struct WriteSessionService {
    staging_path: PathBuf,
    verify_checksums: bool,
    mount_table: Arc<MountTable>,
}

impl WriteSessionService {
    pub async fn new(
        staging_path: impl Into<PathBuf>,
        verify_checksums: bool,
        mount_table: Arc<MountTable>,
    ) -> Result<Arc<Self>, std::io::Error> {
        let staging_path = staging_path.into();

        if let Err(err) = tokio::fs::create_dir_all(&staging_path).await {
            log::error!(target: "write_session_service", method="new", staging_path:?, err:err; "Failed to create staging path.");
            return Err(err);
        }

        Ok(Arc::new(Self {
            staging_path,
            verify_checksums,
            mount_table,
        }))
    }

    fn session_path(&self, session_id: WriteSessionId) -> PathBuf {
        self.staging_path.join(session_id.to_string())
    }

    async fn ensure_session(&self, session_id: WriteSessionId) -> Result<PathBuf, WriteSessionError> {
        let session_path = self.session_path(session_id);

        match tokio::fs::metadata(&session_path).await {
            Ok(meta) if meta.is_dir() => Ok(session_path),
            Ok(_) => Err(WriteSessionError::SessionNotFound(session_id)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(WriteSessionError::SessionNotFound(session_id))
            }
            Err(err) => Err(WriteSessionError::Io(err)),
        }
    }

    /// Opens a new session with an empty staging directory.
    pub async fn start(&self, ctx: &RequestContext) -> Result<WriteSessionId, WriteSessionError> {
        let session_id = WriteSessionId::generate();
        let session_path = self.session_path(session_id);

        if let Err(err) = tokio::fs::create_dir(&session_path).await {
            log::error!(target: "write_session_service", method="start", trace_id:% = ctx.trace_id, session_id:%, session_path:?, err:err; "Failed to create session directory.");
            return Err(WriteSessionError::Io(err));
        }

        log::debug!(target: "write_session_service", method="start", trace_id:% = ctx.trace_id, user = ctx.user(), session_id:%; "Write session started.");

        Ok(session_id)
    }

    /// Persists exactly `range.length` bytes of `data` as one chunk, replacing
    /// an earlier chunk with the same range. Returns the number of bytes written.
    pub async fn write_chunk<R>(
        &self,
        ctx: &RequestContext,
        session_id: WriteSessionId,
        range: ChunkRange,
        data: R,
    ) -> Result<u64, WriteSessionError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let session_path = self.ensure_session(session_id).await?;
        let chunk_path = session_path.join(range.to_string());
        let partial_path = session_path.join(format!("{}{}", PARTIAL_CHUNK_PREFIX, Uuid::new_v4()));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&partial_path)
            .await;
        let mut file = match file {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                // finished or reaped in the meantime
                return Err(WriteSessionError::SessionNotFound(session_id));
            }
            Err(err) => {
                log::error!(target: "write_session_service", method="write_chunk", trace_id:% = ctx.trace_id, session_id:%, range:%, err:err; "Failed to open chunk file.");
                return Err(WriteSessionError::Io(err));
            }
        };

        let mut data = data.take(range.length);
        let copied = async {
            let copied = tokio::io::copy(&mut data, &mut file).await?;
            file.flush().await?;
            Ok::<_, std::io::Error>(copied)
        }
        .await;
        drop(file);

        let error = match copied {
            Ok(copied) if copied == range.length => {
                // the rename also bumps the session directory's mtime
                match tokio::fs::rename(&partial_path, &chunk_path).await {
                    Ok(()) => return Ok(copied),
                    Err(err) => {
                        log::error!(target: "write_session_service", method="write_chunk", trace_id:% = ctx.trace_id, session_id:%, range:%, err:err; "Failed to move chunk file into place.");
                        WriteSessionError::Io(err)
                    }
                }
            }
            Ok(received) => {
                log::warn!(target: "write_session_service", method="write_chunk", trace_id:% = ctx.trace_id, session_id:%, range:%, received; "Chunk is shorter than declared.");
                WriteSessionError::IncompleteChunk { range, received }
            }
            Err(err) => {
                log::error!(target: "write_session_service", method="write_chunk", trace_id:% = ctx.trace_id, session_id:%, range:%, err:err; "Failed to write chunk file.");
                WriteSessionError::Io(err)
            }
        };

        if let Err(err) = tokio::fs::remove_file(&partial_path).await {
            log::warn!(target: "write_session_service", method="write_chunk", trace_id:% = ctx.trace_id, session_id:%, range:%, err:err; "Failed to remove partial chunk file.");
        }

        Err(error)
    }

    /// Consumes a framed write stream until it ends, persisting every chunk.
    /// The first failing chunk aborts the stream.
    pub async fn write<R>(
        &self,
        ctx: &RequestContext,
        mut stream: R,
    ) -> Result<WriteAck, WriteSessionError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut ack = WriteAck::default();

        while let Some(header) = ChunkFrameHeader::read_from(&mut stream).await? {
            let written = self
                .write_chunk(ctx, header.session_id, header.range, &mut stream)
                .await?;

            ack.written_bytes += written;
            ack.num_chunks += 1;
        }

        log::debug!(target: "write_session_service", method="write", trace_id:% = ctx.trace_id, written_bytes = ack.written_bytes, num_chunks = ack.num_chunks; "Write stream closed.");

        Ok(ack)
    }

    /// Assembles the session's chunks in offset order and uploads the result
    /// to `path`, which may use any path syntax. The session is gone
    /// afterwards, whether this succeeds or not.
    pub async fn finish(
        &self,
        ctx: &RequestContext,
        session_id: WriteSessionId,
        path: &str,
        checksum: Option<&Checksum>,
    ) -> Result<FinishedUpload, WriteSessionError> {
        let session_path = self.claim_session(session_id).await?;

        let result = self
            .assemble_and_commit(ctx, session_id, &session_path, path, checksum)
            .await;

        if let Err(err) = tokio::fs::remove_dir_all(&session_path).await {
            log::warn!(target: "write_session_service", method="finish", trace_id:% = ctx.trace_id, session_id:%, session_path:?, err:err; "Failed to remove session directory.");
        }

        match &result {
            Ok(finished) => {
                log::info!(target: "write_session_service", method="finish", trace_id:% = ctx.trace_id, session_id:%, path = finished.path, size = finished.size, checksum = finished.checksum; "Write session committed.");
            }
            Err(err) if err.kind() == ErrorKind::Internal => {
                log::error!(target: "write_session_service", method="finish", trace_id:% = ctx.trace_id, session_id:%, path, err:err = *err; "Write session failed.");
            }
            Err(err) => {
                log::info!(target: "write_session_service", method="finish", trace_id:% = ctx.trace_id, session_id:%, path, err:err = *err; "Write session rejected.");
            }
        }

        result
    }

    /// Renames the session directory out of reach of writers and returns its new path.
    async fn claim_session(&self, session_id: WriteSessionId) -> Result<PathBuf, WriteSessionError> {
        let session_path = self.ensure_session(session_id).await?;
        let claimed_path = self
            .staging_path
            .join(format!("{}{}", session_id, FINISHING_SUFFIX));

        match tokio::fs::rename(&session_path, &claimed_path).await {
            Ok(()) => Ok(claimed_path),
            // a concurrent finish or sweep got there first
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(WriteSessionError::SessionNotFound(session_id))
            }
            Err(err) => Err(WriteSessionError::Io(err)),
        }
    }

    async fn assemble_and_commit(
        &self,
        ctx: &RequestContext,
        session_id: WriteSessionId,
        session_path: &Path,
        path: &str,
        checksum: Option<&Checksum>,
    ) -> Result<FinishedUpload, WriteSessionError> {
        let tree_path = self.mount_table.dereference(ctx, path).await?;

        let assembled_path = session_path.join(ASSEMBLED_FILE_NAME);
        let mut assembled = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&assembled_path)
            .await?;

        let mut ranges = Vec::new();
        let mut entries = tokio::fs::read_dir(session_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();

            if name == ASSEMBLED_FILE_NAME || name.starts_with(PARTIAL_CHUNK_PREFIX) {
                continue;
            }

            let range = name
                .parse::<ChunkRange>()
                .map_err(|_| WriteSessionError::UnexpectedEntry(name))?;
            ranges.push(range);
        }

        ranges.sort();

        let mut expected_offset = 0u64;
        for range in &ranges {
            if range.offset != expected_offset {
                return Err(WriteSessionError::NonContiguous {
                    expected_offset,
                    found: *range,
                });
            }

            // ranges are validated on parse, so this never overflows
            expected_offset = range.end().unwrap_or(u64::MAX);
        }

        let mut hasher = crc32fast::Hasher::new();

        for range in &ranges {
            let chunk = File::open(session_path.join(range.to_string())).await?;
            let mut chunk = InspectReader::new(chunk.take(range.length), |bytes: &[u8]| {
                hasher.update(bytes)
            });
            let received = tokio::io::copy(&mut chunk, &mut assembled).await?;

            if received != range.length {
                return Err(WriteSessionError::IncompleteChunk {
                    range: *range,
                    received,
                });
            }
        }

        assembled.flush().await?;
        drop(assembled);

        let size = expected_offset;
        let actual = Checksum::crc32(hasher.finalize());

        match checksum {
            Some(expected) if expected.is_crc32() && self.verify_checksums => {
                if expected != &actual {
                    return Err(WriteSessionError::ChecksumMismatch {
                        expected: expected.clone(),
                        actual,
                    });
                }
            }
            Some(expected) => {
                log::debug!(target: "write_session_service", method="finish", trace_id:% = ctx.trace_id, session_id:%, expected:%, actual:%; "Client checksum not verified.");
            }
            None => {}
        }

        let assembled = File::open(&assembled_path).await?;
        self.mount_table
            .upload(ctx, &tree_path, Box::pin(BufReader::new(assembled)))
            .await?;

        Ok(FinishedUpload {
            path: tree_path,
            size,
            checksum: actual.to_string(),
        })
    }

    /// Removes session directories untouched for longer than `expiration`,
    /// including ones a finish claimed but never cleaned up.
    /// Returns how many were found expired, and the errors hit while removing them.
    pub async fn remove_expired_sessions(
        &self,
        expiration: Duration,
    ) -> Result<(usize, Vec<std::io::Error>), WriteSessionError> {
        let expiration_time = Utc::now() - expiration;
        let mut entries = tokio::fs::read_dir(&self.staging_path).await?;
        let mut total_count = 0;
        let mut io_errs = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let is_session = entry
                .file_name()
                .to_str()
                .map(|name| name.strip_suffix(FINISHING_SUFFIX).unwrap_or(name))
                .and_then(|name| name.parse::<WriteSessionId>().ok())
                .is_some();

            if !is_session {
                continue;
            }

            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(err) => {
                    io_errs.push(err);
                    continue;
                }
            };
            let modified = match meta.modified() {
                Ok(modified) => DateTime::<Utc>::from(modified),
                Err(err) => {
                    io_errs.push(err);
                    continue;
                }
            };

            if !meta.is_dir() || expiration_time <= modified {
                continue;
            }

            total_count += 1;

            if let Err(err) = tokio::fs::remove_dir_all(entry.path()).await {
                io_errs.push(err);
            }
        }

        Ok((total_count, io_errs))
    }
}
