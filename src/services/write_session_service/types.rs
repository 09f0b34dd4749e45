use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use thiserror::Error;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct WriteSessionId(pub Uuid);

impl WriteSessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<Uuid> for WriteSessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Display for WriteSessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for WriteSessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The byte range a chunk covers. Persisted as a file named `<offset>-<length>`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkRange {
    pub offset: u64,
    pub length: u64,
}

impl ChunkRange {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// One past the last byte, or `None` on overflow.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.length)
    }
}

impl Display for ChunkRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.offset, self.length)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("`{0}` is not a chunk range")]
pub struct ParseChunkRangeError(String);

impl FromStr for ChunkRange {
    type Err = ParseChunkRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        fn parse_number(s: &str) -> Option<u64> {
            if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }

            s.parse().ok()
        }

        let err = || ParseChunkRangeError(s.to_owned());
        let (offset, length) = s.split_once('-').ok_or_else(err)?;
        let offset = parse_number(offset).ok_or_else(err)?;
        let length = parse_number(length).ok_or_else(err)?;
        let range = Self { offset, length };

        range.end().ok_or_else(err)?;

        Ok(range)
    }
}

/// A checksum in the `<kind>:<hex>` wire form, for example `crc32:0a1b2c3d`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub kind: String,
    pub value: String,
}

impl Checksum {
    pub const CRC32: &'static str = "crc32";

    pub fn crc32(value: u32) -> Self {
        Self {
            kind: Self::CRC32.to_owned(),
            value: format!("{:08x}", value),
        }
    }

    pub fn is_crc32(&self) -> bool {
        self.kind == Self::CRC32
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("`{0}` is not a `<kind>:<hex>` checksum")]
pub struct ParseChecksumError(String);

impl FromStr for Checksum {
    type Err = ParseChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseChecksumError(s.to_owned());
        let (kind, value) = s.split_once(':').ok_or_else(err)?;

        if kind.is_empty() || value.is_empty() || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(err());
        }

        Ok(Self {
            kind: kind.to_ascii_lowercase(),
            value: value.to_ascii_lowercase(),
        })
    }
}

/// Returned once the client closes a write stream.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WriteAck {
    pub written_bytes: u64,
    pub num_chunks: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FinishedUpload {
    pub path: String,
    pub size: u64,
    pub checksum: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_range_file_name() {
        let range = ChunkRange::new(8, 4);
        assert_eq!(range.to_string(), "8-4");
        assert_eq!("8-4".parse::<ChunkRange>().unwrap(), range);
        assert_eq!("0-0".parse::<ChunkRange>().unwrap(), ChunkRange::new(0, 0));
    }

    #[test]
    fn test_chunk_range_rejects_garbage() {
        for name in ["", "8", "8-", "-4", "+8-4", "8--4", "a-b", "assembled", "1-2-3"] {
            assert!(name.parse::<ChunkRange>().is_err(), "`{}` must be rejected", name);
        }

        let overflowing = format!("{}-1", u64::MAX);
        assert!(overflowing.parse::<ChunkRange>().is_err());
    }

    #[test]
    fn test_chunk_ranges_sort_by_offset() {
        let mut ranges = vec![
            ChunkRange::new(8, 4),
            ChunkRange::new(0, 4),
            ChunkRange::new(4, 4),
        ];
        ranges.sort();

        assert_eq!(
            ranges,
            vec![
                ChunkRange::new(0, 4),
                ChunkRange::new(4, 4),
                ChunkRange::new(8, 4),
            ]
        );
    }

    #[test]
    fn test_checksum() {
        let checksum = "MD5:D41D8CD98F00B204E9800998ECF8427E"
            .parse::<Checksum>()
            .unwrap();
        assert_eq!(checksum.kind, "md5");
        assert_eq!(checksum.to_string(), "md5:d41d8cd98f00b204e9800998ecf8427e");
        assert!(!checksum.is_crc32());

        assert_eq!(Checksum::crc32(0xab).to_string(), "crc32:000000ab");

        for s in ["", "md5", "md5:", ":abc", "md5:xyz"] {
            assert!(s.parse::<Checksum>().is_err(), "`{}` must be rejected", s);
        }
    }

    #[test]
    fn test_write_session_id() {
        let id = WriteSessionId::generate();
        assert_eq!(id.to_string().parse::<WriteSessionId>().unwrap(), id);
        assert!("nope".parse::<WriteSessionId>().is_err());
    }
}
