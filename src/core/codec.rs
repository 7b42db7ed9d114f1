//! Batch and stream framing.
//!
//! A batch frame is `0xFE ‖ stage(compress(entries))`, where every entry is a
//! varuint32 length followed by a packet header and payload, and `stage` is the
//! optional encryption stage. [`BatchEncoder`] and [`BatchDecoder`] hold the
//! per-direction state. [`FrameCodec`] delimits batch frames on byte streams.

use crate::config::{BATCH_HEADER, MAX_BATCH_PACKETS, MAX_PAYLOAD_SIZE};
use crate::core::binary::{varuint32_len, PacketReader, WriteExt};
use crate::core::encryption::FrameEncryption;
use crate::core::packet::{Header, Packet};
use crate::core::registry::PacketRegistry;
use crate::error::{constants, ProtocolError, Result};
use crate::utils::compression::{compress, decompress, CompressionKind};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::sync::Arc;
use tokio_util::codec::{Decoder, Encoder};

/// A packet as it appears on the wire, before typed decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub header: Header,
    pub payload: Bytes,
}

impl RawPacket {
    pub fn from_packet(packet: &Packet) -> Self {
        Self {
            header: packet.header(),
            payload: packet.to_payload(),
        }
    }
}

#[derive(Debug)]
pub struct BatchEncoder {
    compression: CompressionKind,
    level: i32,
    encryption: Option<FrameEncryption>,
}

impl BatchEncoder {
    pub fn new(compression: CompressionKind, level: i32) -> Self {
        Self {
            compression,
            level,
            encryption: None,
        }
    }

    /// Encrypt every frame produced from now on
    pub fn enable_encryption(&mut self, key: &[u8; 32]) -> Result<()> {
        if self.encryption.is_some() {
            return Err(ProtocolError::CryptoError(
                constants::ERR_KEY_ALREADY_SET.into(),
            ));
        }
        self.encryption = Some(FrameEncryption::new(key)?);
        Ok(())
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }

    pub fn encode(&mut self, packets: &[Packet]) -> Result<Bytes> {
        let raw: Vec<RawPacket> = packets.iter().map(RawPacket::from_packet).collect();
        self.encode_raw(&raw)
    }

    pub fn encode_raw(&mut self, packets: &[RawPacket]) -> Result<Bytes> {
        let mut entries = BytesMut::new();
        let mut header_buf = Vec::with_capacity(5);
        for packet in packets {
            header_buf.clear();
            packet.header.write(&mut header_buf);
            let len = header_buf.len() + packet.payload.len();
            if len > u32::MAX as usize {
                return Err(ProtocolError::OversizedPacket(len));
            }
            entries.reserve(varuint32_len(len as u32) + len);
            entries.put_varuint32(len as u32);
            entries.put_slice(&header_buf);
            entries.put_slice(&packet.payload);
        }

        let mut body = compress(&entries, &self.compression, self.level)?;
        if let Some(encryption) = self.encryption.as_mut() {
            encryption.encrypt(&mut body);
        }

        let mut frame = BytesMut::with_capacity(body.len() + 1);
        frame.put_u8(BATCH_HEADER);
        frame.put_slice(&body);
        Ok(frame.freeze())
    }
}

#[derive(Debug)]
pub struct BatchDecoder {
    compression: CompressionKind,
    max_payload_size: usize,
    max_batch_packets: usize,
    encryption: Option<FrameEncryption>,
    registry: Arc<PacketRegistry>,
}

impl BatchDecoder {
    pub fn new(compression: CompressionKind, registry: Arc<PacketRegistry>) -> Self {
        Self {
            compression,
            max_payload_size: MAX_PAYLOAD_SIZE,
            max_batch_packets: MAX_BATCH_PACKETS,
            encryption: None,
            registry,
        }
    }

    pub fn with_limits(mut self, max_payload_size: usize, max_batch_packets: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self.max_batch_packets = max_batch_packets;
        self
    }

    /// Decrypt every frame received from now on
    pub fn enable_encryption(&mut self, key: &[u8; 32]) -> Result<()> {
        if self.encryption.is_some() {
            return Err(ProtocolError::CryptoError(
                constants::ERR_KEY_ALREADY_SET.into(),
            ));
        }
        self.encryption = Some(FrameEncryption::new(key)?);
        Ok(())
    }

    pub fn registry(&self) -> &Arc<PacketRegistry> {
        &self.registry
    }

    /// Split a frame into headers and raw payloads
    pub fn decode_raw(&mut self, frame: &[u8]) -> Result<Vec<RawPacket>> {
        let (&first, rest) = frame
            .split_first()
            .ok_or_else(|| ProtocolError::DecodeError(constants::ERR_EMPTY_FRAME.into()))?;
        if first != BATCH_HEADER {
            return Err(ProtocolError::InvalidHeader);
        }
        if rest.len() > self.max_payload_size {
            return Err(ProtocolError::OversizedPacket(rest.len()));
        }

        let mut body = rest.to_vec();
        if let Some(encryption) = self.encryption.as_mut() {
            encryption.decrypt(&mut body)?;
        }
        let entries = decompress(&body, &self.compression, self.max_payload_size)?;

        let mut reader = PacketReader::new(&entries);
        let mut packets = Vec::new();
        while !reader.is_empty() {
            if packets.len() >= self.max_batch_packets {
                return Err(ProtocolError::DecodeError(format!(
                    "Batch holds more than {} packets",
                    self.max_batch_packets
                )));
            }
            let entry = reader.byte_slice()?;
            let mut entry_reader = PacketReader::new(entry);
            let header = Header::read(&mut entry_reader)?;
            packets.push(RawPacket {
                header,
                payload: Bytes::copy_from_slice(entry_reader.rest()),
            });
        }
        Ok(packets)
    }

    /// Split a frame and decode every packet through the registry
    pub fn decode(&mut self, frame: &[u8]) -> Result<Vec<Packet>> {
        self.decode_raw(frame)?
            .iter()
            .map(|raw| self.registry.decode(&raw.header, &raw.payload))
            .collect()
    }
}

/// varuint32 length-delimited frames for stream transports
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let mut len: u64 = 0;
        let mut prefix_len = None;
        for (i, byte) in src.iter().take(5).enumerate() {
            len |= u64::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                prefix_len = Some(i + 1);
                break;
            }
        }

        let prefix_len = match prefix_len {
            Some(n) => n,
            None if src.len() >= 5 => {
                return Err(ProtocolError::DecodeError(
                    constants::ERR_VARINT_TOO_LONG.into(),
                ))
            }
            None => return Ok(None),
        };

        let len = len as usize;
        if len > self.max_frame_size {
            return Err(ProtocolError::OversizedPacket(len));
        }
        if src.len() < prefix_len + len {
            src.reserve(prefix_len + len - src.len());
            return Ok(None);
        }

        src.advance(prefix_len);
        Ok(Some(src.split_to(len).freeze()))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Bytes, dst: &mut BytesMut) -> Result<()> {
        if frame.len() > self.max_frame_size {
            return Err(ProtocolError::OversizedPacket(frame.len()));
        }
        dst.reserve(varuint32_len(frame.len() as u32) + frame.len());
        dst.put_varuint32(frame.len() as u32);
        dst.put_slice(&frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::{PlayStatus, SetLastHurtBy};

    fn codec_pair(kind: CompressionKind) -> (BatchEncoder, BatchDecoder) {
        (
            BatchEncoder::new(kind, 6),
            BatchDecoder::new(kind, Arc::new(PacketRegistry::with_defaults())),
        )
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_batch_preserves_order() {
        let (mut encoder, mut decoder) = codec_pair(CompressionKind::Flate);
        let packets = vec![
            Packet::from(PlayStatus { status: 0 }),
            Packet::from(SetLastHurtBy { entity_type: 12 }),
            Packet::Unknown {
                id: 0x0B,
                payload: Bytes::from_static(b"raw start game"),
            },
        ];
        let frame = encoder.encode(&packets).unwrap();
        assert_eq!(frame[0], BATCH_HEADER);
        assert_eq!(decoder.decode(&frame).unwrap(), packets);
    }

    #[test]
    fn test_wrong_header_byte() {
        let (_, mut decoder) = codec_pair(CompressionKind::None);
        let result = decoder.decode_raw(&[0xFF, 0x00]);
        assert!(matches!(result, Err(ProtocolError::InvalidHeader)));
    }

    #[test]
    fn test_empty_frame() {
        let (_, mut decoder) = codec_pair(CompressionKind::None);
        assert!(matches!(
            decoder.decode_raw(&[]),
            Err(ProtocolError::DecodeError(_))
        ));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_packet_count_limit() {
        let (mut encoder, decoder) = codec_pair(CompressionKind::None);
        let mut decoder = decoder.with_limits(MAX_PAYLOAD_SIZE, 2);
        let packets = vec![Packet::from(PlayStatus { status: 0 }); 3];
        let frame = encoder.encode(&packets).unwrap();
        assert!(decoder.decode_raw(&frame).is_err());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_encrypted_batches() {
        let key = [0x42u8; 32];
        let (mut encoder, mut decoder) = codec_pair(CompressionKind::Flate);
        encoder.enable_encryption(&key).unwrap();
        decoder.enable_encryption(&key).unwrap();
        assert!(encoder.enable_encryption(&key).is_err());

        for status in 0..4 {
            let packets = vec![Packet::from(PlayStatus { status })];
            let frame = encoder.encode(&packets).unwrap();
            assert_eq!(decoder.decode(&frame).unwrap(), packets);
        }
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_frame_codec_partial_input() {
        let mut codec = FrameCodec::default();
        let mut out = BytesMut::new();
        codec
            .encode(Bytes::from(vec![9u8; 300]), &mut out)
            .unwrap();

        let mut partial = out.split_to(100);
        assert!(codec.decode(&mut partial).unwrap().is_none());
        partial.unsplit(out);
        let frame = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(frame.len(), 300);
        assert!(partial.is_empty());
    }

    #[test]
    fn test_frame_codec_rejects_oversized() {
        let mut codec = FrameCodec::new(16);
        let mut src = BytesMut::new();
        src.put_varuint32(17);
        assert!(matches!(
            codec.decode(&mut src),
            Err(ProtocolError::OversizedPacket(17))
        ));
    }
}
