use crate::mount::{Mount, MountOptions};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MountInfo {
    pub prefix: String,
    pub storage_id: String,
    pub options: MountOptions,
}

impl From<&Mount> for MountInfo {
    fn from(mount: &Mount) -> Self {
        Self {
            prefix: mount.prefix().to_owned(),
            storage_id: mount.storage_id().to_owned(),
            options: mount.options(),
        }
    }
}
