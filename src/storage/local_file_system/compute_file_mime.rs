use std::path::PathBuf;
use thiserror::Error;

pub const DIRECTORY_MIME: &str = "httpd/unix-directory";
pub const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Error, Debug)]
pub enum ComputeFileMimeError {
    #[error("failed to sniff file content: {0}")]
    Sniff(std::io::Error),
    #[error("failed to join task: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Sniffs the leading bytes of the file, then falls back to the extension.
pub async fn compute_file_mime(
    path: impl Into<PathBuf>,
) -> Result<&'static str, ComputeFileMimeError> {
    let path = path.into();

    tokio::task::spawn_blocking(move || {
        let sniffed = infer::get_from_path(&path).map_err(ComputeFileMimeError::Sniff)?;

        Ok(sniffed
            .map(|kind| kind.mime_type())
            .or_else(|| mime_guess::from_path(&path).first_raw())
            .unwrap_or(FALLBACK_MIME))
    })
    .await?
}
