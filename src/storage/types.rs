use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Metadata of a single file or directory.
///
/// A backend produces it on every call; the gateway never persists it.
/// Once it leaves a mount, `id` carries the mount's storage id prefix and
/// `path` lives in the virtual namespace.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MD {
    pub id: String,
    pub path: String,
    pub size: u64,
    /// Modification time, in seconds since the unix epoch.
    pub mtime: u64,
    pub is_dir: bool,
    pub etag: String,
    pub checksum: Option<String>,
    pub mime: String,
    pub is_read_only: bool,
    pub is_shareable: bool,
    pub deref_path: Option<String>,
    pub tree_count: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AclType {
    User,
    Group,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AclMode {
    ReadOnly,
    ReadWrite,
}

/// The user or group an ACL entry applies to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct AclTarget {
    pub target: String,
    #[serde(rename = "type")]
    pub acl_type: AclType,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Acl {
    pub target: String,
    #[serde(rename = "type")]
    pub acl_type: AclType,
    pub mode: AclMode,
}

impl Acl {
    pub fn grantee(&self) -> AclTarget {
        AclTarget {
            target: self.target.clone(),
            acl_type: self.acl_type,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecycleItem {
    pub restore_path: String,
    /// Prefixed with the owning mount's storage id once it leaves the mount.
    pub restore_key: String,
    pub size: u64,
    pub del_mtime: u64,
    pub is_dir: bool,
}

/// One historical version of a file. `rev_key` is local to the backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub rev_key: String,
    pub size: u64,
    pub mtime: u64,
    pub is_dir: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Quota {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ParseAclError(String);

impl FromStr for AclType {
    type Err = ParseAclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(AclType::User),
            "group" => Ok(AclType::Group),
            _ => Err(ParseAclError(format!("acl type `{}` is invalid", s))),
        }
    }
}

impl FromStr for AclMode {
    type Err = ParseAclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read-only" => Ok(AclMode::ReadOnly),
            "read-write" => Ok(AclMode::ReadWrite),
            _ => Err(ParseAclError(format!("acl mode `{}` is invalid", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_acl_type() {
        assert_eq!("user".parse::<AclType>(), Ok(AclType::User));
        assert_eq!("group".parse::<AclType>(), Ok(AclType::Group));
        assert!("everyone".parse::<AclType>().is_err());
        assert!("User".parse::<AclType>().is_err());
    }

    #[test]
    fn test_parse_acl_mode() {
        assert_eq!("read-only".parse::<AclMode>(), Ok(AclMode::ReadOnly));
        assert_eq!("read-write".parse::<AclMode>(), Ok(AclMode::ReadWrite));

        let err = "write-only".parse::<AclMode>().unwrap_err();
        assert_eq!(err.to_string(), "acl mode `write-only` is invalid");
    }

    #[test]
    fn test_md_serializes_camel_case() {
        let md = MD {
            id: "home:abc".to_owned(),
            path: "/home/a".to_owned(),
            is_dir: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&md).unwrap();

        assert_eq!(json["id"], "home:abc");
        assert_eq!(json["isDir"], true);
        assert_eq!(json["isShareable"], false);
        assert_eq!(json["treeCount"], 0);
    }
}
