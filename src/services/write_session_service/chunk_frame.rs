//! Framing of the streaming write body.
//!
//! Each frame is a fixed 32 byte header followed by the chunk payload:
//!
//! ```text
//! +----------------+----------------+----------------+---------------+
//! | session (16 B) | offset (u64 BE)| length (u64 BE)| length bytes  |
//! +----------------+----------------+----------------+---------------+
//! ```
//!
//! The body ends cleanly when it runs out between two frames.

use super::{ChunkRange, WriteSessionId};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

pub const CHUNK_FRAME_HEADER_SIZE: usize = 32;

#[derive(Error, Debug)]
pub enum ChunkFrameError {
    #[error("frame header truncated after {received} of 32 bytes")]
    TruncatedHeader { received: usize },
    #[error("frame range {offset}+{length} overflows")]
    RangeOverflow { offset: u64, length: u64 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkFrameHeader {
    pub session_id: WriteSessionId,
    pub range: ChunkRange,
}

impl ChunkFrameHeader {
    #[cfg(test)]
    pub fn encode(&self) -> [u8; CHUNK_FRAME_HEADER_SIZE] {
        let mut bytes = [0u8; CHUNK_FRAME_HEADER_SIZE];
        bytes[..16].copy_from_slice(self.session_id.0.as_bytes());
        bytes[16..24].copy_from_slice(&self.range.offset.to_be_bytes());
        bytes[24..].copy_from_slice(&self.range.length.to_be_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8; CHUNK_FRAME_HEADER_SIZE]) -> Result<Self, ChunkFrameError> {
        let mut uuid = [0u8; 16];
        let mut offset = [0u8; 8];
        let mut length = [0u8; 8];
        uuid.copy_from_slice(&bytes[..16]);
        offset.copy_from_slice(&bytes[16..24]);
        length.copy_from_slice(&bytes[24..]);

        let range = ChunkRange::new(u64::from_be_bytes(offset), u64::from_be_bytes(length));

        if range.end().is_none() {
            return Err(ChunkFrameError::RangeOverflow {
                offset: range.offset,
                length: range.length,
            });
        }

        Ok(Self {
            session_id: WriteSessionId(Uuid::from_bytes(uuid)),
            range,
        })
    }

    /// Reads the next header, or `None` if the stream ended before it.
    pub async fn read_from<R>(reader: &mut R) -> Result<Option<Self>, ChunkFrameError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut bytes = [0u8; CHUNK_FRAME_HEADER_SIZE];
        let mut received = 0;

        while received < CHUNK_FRAME_HEADER_SIZE {
            let read = reader.read(&mut bytes[received..]).await?;

            if read == 0 {
                return match received {
                    0 => Ok(None),
                    received => Err(ChunkFrameError::TruncatedHeader { received }),
                };
            }

            received += read;
        }

        Self::decode(&bytes).map(Some)
    }
}

/// Encodes one complete frame the way a client sends it.
#[cfg(test)]
pub fn encode_frame(session_id: WriteSessionId, offset: u64, data: &[u8]) -> Vec<u8> {
    let header = ChunkFrameHeader {
        session_id,
        range: ChunkRange::new(offset, data.len() as u64),
    };

    let mut frame = Vec::with_capacity(CHUNK_FRAME_HEADER_SIZE + data.len());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(data);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_layout() {
        let session_id = WriteSessionId(Uuid::from_bytes([7u8; 16]));
        let header = ChunkFrameHeader {
            session_id,
            range: ChunkRange::new(0x0102, 4),
        };

        let bytes = header.encode();

        assert_eq!(&bytes[..16], &[7u8; 16]);
        assert_eq!(&bytes[16..24], &[0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(&bytes[24..], &[0, 0, 0, 0, 0, 0, 0, 4]);
        assert_eq!(ChunkFrameHeader::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn test_decode_rejects_overflowing_range() {
        let mut bytes = [0u8; CHUNK_FRAME_HEADER_SIZE];
        bytes[16..24].copy_from_slice(&u64::MAX.to_be_bytes());
        bytes[24..].copy_from_slice(&1u64.to_be_bytes());

        assert!(matches!(
            ChunkFrameHeader::decode(&bytes),
            Err(ChunkFrameError::RangeOverflow { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_from_stream() {
        let session_id = WriteSessionId::generate();
        let mut body = encode_frame(session_id, 0, b"abcd");
        body.extend(encode_frame(session_id, 4, b"ef"));
        let mut reader = Cursor::new(body);

        let header = ChunkFrameHeader::read_from(&mut reader).await.unwrap().unwrap();
        assert_eq!(header.session_id, session_id);
        assert_eq!(header.range, ChunkRange::new(0, 4));

        let mut data = [0u8; 4];
        reader.read_exact(&mut data).await.unwrap();
        assert_eq!(&data, b"abcd");

        let header = ChunkFrameHeader::read_from(&mut reader).await.unwrap().unwrap();
        assert_eq!(header.range, ChunkRange::new(4, 2));

        let mut data = [0u8; 2];
        reader.read_exact(&mut data).await.unwrap();

        assert!(ChunkFrameHeader::read_from(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_from_truncated_header() {
        let mut reader = Cursor::new(vec![1u8; 10]);

        let err = ChunkFrameHeader::read_from(&mut reader).await.unwrap_err();

        assert!(matches!(err, ChunkFrameError::TruncatedHeader { received: 10 }));
    }
}
