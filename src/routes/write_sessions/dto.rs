use crate::services::WriteSessionId;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartedWriteSession {
    pub session_id: WriteSessionId,
}

#[derive(Serialize, Deserialize)]
pub struct FinishingWriteSession<'a> {
    pub path: &'a str,
    /// `<kind>:<hex>`, for example `crc32:0a1b2c3d`.
    pub checksum: Option<&'a str>,
}
