use crate::storage::DataReader;
use rocket::{
    futures::{Stream, StreamExt},
    http::{ContentType, Status},
    response::{self, stream::ByteStream, Responder},
    Request,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

/// Upper bound of a single body chunk sent while streaming file content.
pub const MAX_STREAM_CHUNK_SIZE: usize = 3 * 1024 * 1024;

#[derive(Serialize, Deserialize)]
pub struct CreatingDirectory<'a> {
    pub path: &'a str,
}

#[derive(Serialize, Deserialize)]
pub struct MovingEntry<'a> {
    pub source: &'a str,
    pub target: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub path: String,
}

/// Streams backend content to the client without buffering it.
pub struct FileData {
    pub mime: String,
    pub data: DataReader,
}

/// Splits `data` into chunks of at most [`MAX_STREAM_CHUNK_SIZE`] bytes.
/// A read error ends the stream early and is logged.
fn stream_chunks(
    data: DataReader,
) -> impl Stream<Item = impl AsRef<[u8]> + Send + Unpin> + Send {
    ReaderStream::with_capacity(data, MAX_STREAM_CHUNK_SIZE).filter_map(|chunk| async move {
        match chunk {
            Ok(chunk) => Some(chunk),
            Err(err) => {
                log::error!(target: "routes::files::dto", err:err; "Failed to read file data while streaming.");
                None
            }
        }
    })
}

impl<'r> Responder<'r, 'r> for FileData {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'r> {
        let content_type =
            ContentType::parse_flexible(&self.mime).unwrap_or(ContentType::Binary);

        let mut response = ByteStream(stream_chunks(self.data)).respond_to(request)?;
        response.set_status(Status::Ok);
        response.set_header(content_type);

        Ok(response)
    }
}
