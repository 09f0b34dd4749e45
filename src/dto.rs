use crate::storage::{ErrorKind, RequestContext, StorageError};
use rocket::{http::Status, serde::json::Json, Responder};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// The closed set of result codes every response carries.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Code {
    Ok,
    NotFound,
    InvalidArgument,
    PermissionDenied,
    Internal,
    Unauthenticated,
}

impl Code {
    pub fn from_status(status: Status) -> Self {
        match status.code {
            200..=399 => Code::Ok,
            401 => Code::Unauthenticated,
            403 => Code::PermissionDenied,
            404 => Code::NotFound,
            400..=499 => Code::InvalidArgument,
            // an operation the backend cannot perform is the caller's problem
            501 => Code::InvalidArgument,
            _ => Code::Internal,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatusBody {
    pub code: Code,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Cow<'static, str>>,
}

impl StatusBody {
    pub fn ok() -> Self {
        Self {
            code: Code::Ok,
            message: None,
        }
    }
}

#[derive(Responder, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Error((Status, Json<StatusBody>));

impl Error {
    pub fn new_dynamic(status: Status, message: impl Into<String>) -> Self {
        Error((
            status,
            Json(StatusBody {
                code: Code::from_status(status),
                message: Some(Cow::Owned(message.into())),
            }),
        ))
    }

    pub fn status(&self) -> Status {
        self.0 .0
    }

    pub fn code(&self) -> Code {
        self.0 .1.code
    }

    /// Server-class kinds get a generic message, the details go to the log.
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        match kind {
            ErrorKind::NotFound => Self::new_dynamic(Status::NotFound, message),
            ErrorKind::InvalidPath | ErrorKind::InvalidArgument => {
                Self::new_dynamic(Status::BadRequest, message)
            }
            ErrorKind::PermissionDenied => Self::new_dynamic(Status::Forbidden, message),
            ErrorKind::NotSupported => Self::new_dynamic(Status::NotImplemented, message),
            ErrorKind::Internal => Status::InternalServerError.into(),
        }
    }
}

impl From<Status> for Error {
    fn from(value: Status) -> Self {
        Self::new_dynamic(value, value.reason_lossy().to_ascii_lowercase())
    }
}

impl From<&StorageError> for Error {
    fn from(err: &StorageError) -> Self {
        Self::from_kind(err.kind(), err.to_string())
    }
}

/// Maps an error the mount table returned to a controller. Only server-class
/// errors are logged, the rest are the client's business.
pub fn map_storage_err(
    controller: &'static str,
    ctx: &RequestContext,
    path: &str,
    err: &StorageError,
) -> Error {
    let error = Error::from(err);

    if error.code() == Code::Internal {
        log::error!(target: "routes::controllers", controller, service = "MountTable", trace_id:% = ctx.trace_id, path, err:err = *err; "Error returned from service.");
    }

    error
}

pub type JsonRes<T> = Result<(Status, Json<T>), Error>;
