use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoringRecycleItem<'a> {
    pub restore_key: &'a str,
}
