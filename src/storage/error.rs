use serde::Serialize;
use thiserror::Error;

/// The closed set of failure kinds a caller can branch on.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    NotFound,
    InvalidPath,
    InvalidArgument,
    PermissionDenied,
    NotSupported,
    Internal,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The backend does not implement the operation at all.
    #[error("operation not supported: {0}")]
    NotSupported(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wraps another error with the operation and path that produced it.
    /// The kind of the wrapped error is preserved.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::InvalidPath(_) => ErrorKind::InvalidPath,
            StorageError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            StorageError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            StorageError::NotSupported(_) => ErrorKind::NotSupported,
            StorageError::Internal(_) | StorageError::Io(_) => ErrorKind::Internal,
            StorageError::Context { source, .. } => source.kind(),
        }
    }

    pub fn context(self, context: impl Into<String>) -> Self {
        StorageError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Translates an I/O error from a driver into the taxonomy, keeping the
    /// kinds that callers care about instead of collapsing them into `Io`.
    pub fn from_io(err: std::io::Error, path: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(path.to_owned()),
            std::io::ErrorKind::PermissionDenied => {
                StorageError::PermissionDenied(path.to_owned())
            }
            std::io::ErrorKind::AlreadyExists => {
                StorageError::InvalidArgument(format!("`{}` already exists", path))
            }
            _ => StorageError::Io(err),
        }
    }
}

pub trait StorageResultExt<T> {
    /// Adds context to the error, evaluated lazily.
    fn with_context<F, C>(self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T> StorageResultExt<T> for Result<T, StorageError> {
    fn with_context<F, C>(self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|err| err.context(f()))
    }
}
