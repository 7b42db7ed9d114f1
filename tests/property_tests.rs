//! Property-based tests using proptest
//!
//! These tests check codec invariants across randomly generated batches, frames
//! and payloads.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bedrock_client::core::binary::{PacketReader, WriteExt};
use bedrock_client::core::codec::{BatchDecoder, BatchEncoder, RawPacket};
use bedrock_client::core::packet::{Header, Packet, SetLastHurtBy};
use bedrock_client::core::registry::PacketRegistry;
use bedrock_client::error::ProtocolError;
use bedrock_client::utils::compression::{compress, decompress, CompressionKind};
use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use std::sync::Arc;

fn kind() -> impl Strategy<Value = CompressionKind> {
    prop_oneof![
        Just(CompressionKind::None),
        Just(CompressionKind::Flate),
        Just(CompressionKind::Lz4),
        Just(CompressionKind::Zstd),
    ]
}

fn raw_packet() -> impl Strategy<Value = RawPacket> {
    (0x100u32..0x3FF, 0u8..4, 0u8..4, prop::collection::vec(any::<u8>(), 0..512)).prop_map(
        |(packet_id, sender, target, payload)| RawPacket {
            header: Header {
                packet_id,
                sender_sub_client: sender,
                target_sub_client: target,
            },
            payload: Bytes::from(payload),
        },
    )
}

fn pair(kind: CompressionKind) -> (BatchEncoder, BatchDecoder) {
    (
        BatchEncoder::new(kind, 3),
        BatchDecoder::new(kind, Arc::new(PacketRegistry::default())),
    )
}

// Property: a batch decodes to the same packets in the same order
proptest! {
    #[test]
    fn prop_batch_preserves_packets(
        kind in kind(),
        packets in prop::collection::vec(raw_packet(), 1..32),
    ) {
        let (mut encoder, mut decoder) = pair(kind);
        let frame = encoder.encode_raw(&packets).expect("encoding should not fail");
        let decoded = decoder.decode_raw(&frame).expect("decoding should not fail");
        prop_assert_eq!(decoded, packets);
    }
}

// Property: encrypted sessions stay in step across many frames
proptest! {
    #[test]
    fn prop_encrypted_frames_in_sequence(
        key in any::<[u8; 32]>(),
        batches in prop::collection::vec(prop::collection::vec(raw_packet(), 1..4), 1..16),
    ) {
        let (mut encoder, mut decoder) = pair(CompressionKind::Flate);
        encoder.enable_encryption(&key).unwrap();
        decoder.enable_encryption(&key).unwrap();

        for batch in batches {
            let frame = encoder.encode_raw(&batch).unwrap();
            prop_assert_eq!(decoder.decode_raw(&frame).unwrap(), batch);
        }
    }
}

// Property: a frame replayed to an encrypted decoder is rejected
proptest! {
    #[test]
    fn prop_replayed_frame_rejected(
        key in any::<[u8; 32]>(),
        batch in prop::collection::vec(raw_packet(), 1..4),
    ) {
        let (mut encoder, mut decoder) = pair(CompressionKind::Flate);
        encoder.enable_encryption(&key).unwrap();
        decoder.enable_encryption(&key).unwrap();

        let frame = encoder.encode_raw(&batch).unwrap();
        decoder.decode_raw(&frame).unwrap();
        prop_assert!(decoder.decode_raw(&frame).is_err());
    }
}

// Property: arbitrary frames never panic the decoder
proptest! {
    #[test]
    fn prop_decoder_never_panics(kind in kind(), frame in prop::collection::vec(any::<u8>(), 0..2048)) {
        let (_, mut decoder) = pair(kind);
        let _ = decoder.decode(&frame);
    }
}

// Property: typed packets survive a batch and come back typed
proptest! {
    #[test]
    fn prop_typed_packets_decode(entity_types in prop::collection::vec(any::<i32>(), 1..16)) {
        let packets: Vec<Packet> = entity_types
            .iter()
            .map(|&entity_type| SetLastHurtBy { entity_type }.into())
            .collect();
        let (mut encoder, mut decoder) = pair(CompressionKind::Flate);
        let frame = encoder.encode(&packets).unwrap();
        prop_assert_eq!(decoder.decode(&frame).unwrap(), packets);
    }
}

// Property: varints read back what was written and consume exactly their bytes
proptest! {
    #[test]
    fn prop_varints(unsigned in any::<u32>(), signed in any::<i32>(), wide in any::<u64>()) {
        let mut buf = BytesMut::new();
        buf.put_varuint32(unsigned);
        buf.put_varint32(signed);
        buf.put_varuint64(wide);

        let mut reader = PacketReader::new(&buf);
        prop_assert_eq!(reader.varuint32().unwrap(), unsigned);
        prop_assert_eq!(reader.varint32().unwrap(), signed);
        prop_assert_eq!(reader.varuint64().unwrap(), wide);
        prop_assert!(reader.is_empty());
    }
}

// Property: truncating a string field is always an error, never a panic
proptest! {
    #[test]
    fn prop_truncated_strings_rejected(text in ".{1,64}", cut in 1usize..8) {
        let mut buf = BytesMut::new();
        buf.put_string(&text);
        let cut = cut.min(buf.len());
        let truncated = &buf[..buf.len() - cut];

        let mut reader = PacketReader::new(truncated);
        prop_assert!(matches!(reader.string(), Err(ProtocolError::DecodeError(_))));
    }
}

// Property: compression stages round trip
proptest! {
    #[test]
    fn prop_compression_roundtrip(kind in kind(), data in prop::collection::vec(any::<u8>(), 0..50000)) {
        let compressed = compress(&data, &kind, 3).expect("Compression should not fail");
        let decompressed = decompress(&compressed, &kind, data.len()).expect("Decompression should not fail");
        prop_assert_eq!(decompressed, data);
    }
}

// Property: decompression output never exceeds the limit
proptest! {
    #[test]
    fn prop_decompression_respects_limit(kind in kind(), len in 1usize..20000) {
        let data = vec![0u8; len];
        let compressed = compress(&data, &kind, 3).unwrap();
        prop_assert!(decompress(&compressed, &kind, len - 1).is_err());
    }
}

// Property: decompression of invalid data returns an error instead of panicking
proptest! {
    #[test]
    fn prop_decompression_invalid_data(data in prop::collection::vec(any::<u8>(), 0..1000)) {
        for kind in [CompressionKind::Flate, CompressionKind::Lz4, CompressionKind::Zstd] {
            let _ = decompress(&data, &kind, 1 << 20);
        }
    }
}
