use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct RestoringRevision<'a> {
    pub path: &'a str,
    pub key: &'a str,
}
