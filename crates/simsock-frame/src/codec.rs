use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: payload length as a big-endian `u32`.
pub const HEADER_SIZE: usize = 4;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Encode one frame into `dst`.
///
/// Wire format:
/// ```text
/// ┌──────────────────┬──────────────────┐
/// │ Length (4B BE)   │ Payload          │
/// │                  │ (Length bytes)   │
/// └──────────────────┴──────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let length = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32(length);
    dst.put_slice(payload);
    Ok(())
}

/// Decode the payload length from a complete header.
///
/// Fails with [`FrameError::PayloadTooLarge`] if the declared length exceeds
/// `max_payload`.
pub fn decode_header(header: &[u8; HEADER_SIZE], max_payload: usize) -> Result<usize> {
    let length = u32::from_be_bytes(*header) as usize;
    if length > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: length,
            max: max_payload,
        });
    }
    Ok(length)
}

/// Configuration for message queues.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes, for both sending and receiving. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_big_endian_length() {
        let mut buf = BytesMut::new();
        encode_frame(&[7u8; 258], &mut buf).unwrap();

        assert_eq!(buf.len(), HEADER_SIZE + 258);
        assert_eq!(&buf[..HEADER_SIZE], &[0x00, 0x00, 0x01, 0x02]);
        assert!(buf[HEADER_SIZE..].iter().all(|b| *b == 7));
    }

    #[test]
    fn empty_payload_is_header_only() {
        let mut buf = BytesMut::new();
        encode_frame(b"", &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[0, 0, 0, 0]);
        assert_eq!(decode_header(&[0, 0, 0, 0], DEFAULT_MAX_PAYLOAD).unwrap(), 0);
    }

    #[test]
    fn decode_header_reads_length() {
        let length = decode_header(&[0x00, 0x0F, 0x42, 0x40], DEFAULT_MAX_PAYLOAD).unwrap();
        assert_eq!(length, 1_000_000);
    }

    #[test]
    fn decode_header_rejects_oversized_length() {
        let header = (32u32 * 1024 * 1024).to_be_bytes();
        let result = decode_header(&header, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size, max })
                if size == 32 * 1024 * 1024 && max == DEFAULT_MAX_PAYLOAD
        ));
    }

    #[test]
    fn max_payload_is_inclusive() {
        let header = 16u32.to_be_bytes();
        assert_eq!(decode_header(&header, 16).unwrap(), 16);
        assert!(decode_header(&header, 15).is_err());
    }
}
