use crate::storage::{Acl, AclMode, AclTarget, AclType, ParseAclError};
use rocket::FromForm;
use serde::{Deserialize, Serialize};

/// Body of set and update. Type and mode stay strings here so that an
/// unknown value is reported as a bad request instead of a body error.
#[derive(Serialize, Deserialize)]
pub struct SettingAcl<'a> {
    pub path: &'a str,
    pub target: &'a str,
    #[serde(rename = "type")]
    pub acl_type: &'a str,
    pub mode: &'a str,
}

impl SettingAcl<'_> {
    pub fn to_acl(&self) -> Result<Acl, ParseAclError> {
        Ok(Acl {
            target: self.target.to_owned(),
            acl_type: self.acl_type.parse::<AclType>()?,
            mode: self.mode.parse::<AclMode>()?,
        })
    }
}

#[derive(FromForm)]
pub struct UnsettingAcl<'r> {
    pub path: &'r str,
    pub target: &'r str,
    #[field(name = "type")]
    pub acl_type: &'r str,
}

impl UnsettingAcl<'_> {
    pub fn to_target(&self) -> Result<AclTarget, ParseAclError> {
        Ok(AclTarget {
            target: self.target.to_owned(),
            acl_type: self.acl_type.parse::<AclType>()?,
        })
    }
}
