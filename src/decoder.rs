// Protobuf decoding for GTFS Realtime feeds

use crate::error::DecodeError;
use gtfs_rt::FeedMessage;
use prost::Message;

/// Decodes a protobuf-encoded GTFS-RT [`FeedMessage`] from raw bytes.
///
/// A message with no entities is valid and decodes normally.
pub fn decode(bytes: &[u8]) -> Result<FeedMessage, DecodeError> {
    let feed = FeedMessage::decode(bytes)?;
    tracing::debug!(bytes = bytes.len(), entities = feed.entity.len(), "Decoded protobuf feed");
    Ok(feed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtfs_rt::FeedHeader;

    #[test]
    fn test_decode_minimal_feed() {
        let feed = FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                timestamp: Some(1_700_000_000),
                ..Default::default()
            },
            entity: vec![],
        };
        let encoded = feed.encode_to_vec();

        let parsed = decode(&encoded).unwrap();
        assert_eq!(parsed.header.gtfs_realtime_version, "2.0");
        assert_eq!(parsed.header.timestamp, Some(1_700_000_000));
        assert!(parsed.entity.is_empty());
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let invalid_bytes = vec![0xFF, 0xFE, 0x00, 0x01];
        assert!(decode(&invalid_bytes).is_err());
    }

    #[test]
    fn test_decode_truncated_buffer() {
        let feed = FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                ..Default::default()
            },
            entity: vec![],
        };
        let encoded = feed.encode_to_vec();

        let err = decode(&encoded[..encoded.len() - 1]).unwrap_err();
        assert!(err.to_string().starts_with("Failed to decode GTFS-RT feed"));
    }
}
