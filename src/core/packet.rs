//! Typed packets.
//!
//! Only the packets the session core acts on are modelled. Every other ID is carried
//! as [`Packet::Unknown`] with its raw payload so callers can decode it themselves.

use crate::core::binary::{PacketReader, Vec3, WriteExt};
use crate::error::{ProtocolError, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Packet IDs
pub mod ids {
    pub const LOGIN: u32 = 0x01;
    pub const PLAY_STATUS: u32 = 0x02;
    pub const SERVER_TO_CLIENT_HANDSHAKE: u32 = 0x03;
    pub const CLIENT_TO_SERVER_HANDSHAKE: u32 = 0x04;
    pub const DISCONNECT: u32 = 0x05;
    pub const RESOURCE_PACKS_INFO: u32 = 0x06;
    pub const RESOURCE_PACK_STACK: u32 = 0x07;
    pub const RESOURCE_PACK_CLIENT_RESPONSE: u32 = 0x08;
    pub const START_GAME: u32 = 0x0B;
    pub const REQUEST_CHUNK_RADIUS: u32 = 0x45;
    pub const RESOURCE_PACK_DATA_INFO: u32 = 0x52;
    pub const RESOURCE_PACK_CHUNK_DATA: u32 = 0x53;
    pub const RESOURCE_PACK_CHUNK_REQUEST: u32 = 0x54;
    pub const SET_LAST_HURT_BY: u32 = 0x60;
    pub const CORRECT_PLAYER_MOVE_PREDICTION: u32 = 0xA1;
}

/// `PlayStatus` values
pub mod play_status {
    pub const LOGIN_SUCCESS: i32 = 0;
    pub const LOGIN_FAILED_CLIENT: i32 = 1;
    pub const LOGIN_FAILED_SERVER: i32 = 2;
    pub const PLAYER_SPAWN: i32 = 3;
    pub const LOGIN_FAILED_INVALID_TENANT: i32 = 4;
    pub const LOGIN_FAILED_VANILLA_EDU: i32 = 5;
    pub const LOGIN_FAILED_EDU_VANILLA: i32 = 6;
    pub const LOGIN_FAILED_SERVER_FULL: i32 = 7;
}

/// `ResourcePackClientResponse` values
pub mod pack_response {
    pub const REFUSED: u8 = 1;
    pub const SEND_PACKS: u8 = 2;
    pub const ALL_PACKS_DOWNLOADED: u8 = 3;
    pub const COMPLETED: u8 = 4;
}

const PACKET_ID_MASK: u32 = 0x3FF;
const SUB_CLIENT_MASK: u8 = 0x03;

/// The varuint32 that precedes every packet inside a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    pub packet_id: u32,
    pub sender_sub_client: u8,
    pub target_sub_client: u8,
}

impl Header {
    pub fn new(packet_id: u32) -> Self {
        Self {
            packet_id,
            ..Self::default()
        }
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        let value = (self.packet_id & PACKET_ID_MASK)
            | (u32::from(self.sender_sub_client & SUB_CLIENT_MASK) << 10)
            | (u32::from(self.target_sub_client & SUB_CLIENT_MASK) << 12);
        buf.put_varuint32(value);
    }

    pub fn read(reader: &mut PacketReader<'_>) -> Result<Self> {
        let value = reader.varuint32()?;
        Ok(Self {
            packet_id: value & PACKET_ID_MASK,
            sender_sub_client: ((value >> 10) as u8) & SUB_CLIENT_MASK,
            target_sub_client: ((value >> 12) as u8) & SUB_CLIENT_MASK,
        })
    }
}

/// Wire body of a single packet type.
pub trait PacketBody: Sized {
    const ID: u32;

    fn encode(&self, buf: &mut BytesMut);

    fn decode(reader: &mut PacketReader<'_>) -> Result<Self>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    pub client_protocol: i32,
    /// Chain JSON and client data JWT, each prefixed with a little-endian i32 length
    pub connection_request: Bytes,
}

impl PacketBody for Login {
    const ID: u32 = ids::LOGIN;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(self.client_protocol);
        buf.put_byte_slice(&self.connection_request);
    }

    fn decode(reader: &mut PacketReader<'_>) -> Result<Self> {
        Ok(Self {
            client_protocol: reader.i32_be()?,
            connection_request: Bytes::copy_from_slice(reader.byte_slice()?),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayStatus {
    pub status: i32,
}

impl PacketBody for PlayStatus {
    const ID: u32 = ids::PLAY_STATUS;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(self.status);
    }

    fn decode(reader: &mut PacketReader<'_>) -> Result<Self> {
        Ok(Self {
            status: reader.i32_be()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerToClientHandshake {
    /// Compact JWT carrying the server's public key and the salt
    pub jwt: Bytes,
}

impl PacketBody for ServerToClientHandshake {
    const ID: u32 = ids::SERVER_TO_CLIENT_HANDSHAKE;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_byte_slice(&self.jwt);
    }

    fn decode(reader: &mut PacketReader<'_>) -> Result<Self> {
        Ok(Self {
            jwt: Bytes::copy_from_slice(reader.byte_slice()?),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientToServerHandshake;

impl PacketBody for ClientToServerHandshake {
    const ID: u32 = ids::CLIENT_TO_SERVER_HANDSHAKE;

    fn encode(&self, _buf: &mut BytesMut) {}

    fn decode(_reader: &mut PacketReader<'_>) -> Result<Self> {
        Ok(Self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Disconnect {
    pub hide_disconnection_screen: bool,
    pub message: String,
}

impl PacketBody for Disconnect {
    const ID: u32 = ids::DISCONNECT;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_bool(self.hide_disconnection_screen);
        if !self.hide_disconnection_screen {
            buf.put_string(&self.message);
        }
    }

    fn decode(reader: &mut PacketReader<'_>) -> Result<Self> {
        let hide_disconnection_screen = reader.bool()?;
        let message = if hide_disconnection_screen {
            String::new()
        } else {
            reader.string()?
        };
        Ok(Self {
            hide_disconnection_screen,
            message,
        })
    }
}

/// One pack offered in `ResourcePacksInfo`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePackEntry {
    pub uuid: String,
    pub version: String,
    pub size: u64,
    pub content_key: String,
    pub sub_pack_name: String,
    pub content_identity: String,
    pub has_scripts: bool,
}

impl ResourcePackEntry {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_string(&self.uuid);
        buf.put_string(&self.version);
        buf.put_u64_le(self.size);
        buf.put_string(&self.content_key);
        buf.put_string(&self.sub_pack_name);
        buf.put_string(&self.content_identity);
        buf.put_bool(self.has_scripts);
    }

    fn decode(reader: &mut PacketReader<'_>) -> Result<Self> {
        Ok(Self {
            uuid: reader.string()?,
            version: reader.string()?,
            size: reader.u64_le()?,
            content_key: reader.string()?,
            sub_pack_name: reader.string()?,
            content_identity: reader.string()?,
            has_scripts: reader.bool()?,
        })
    }

    /// `"<uuid>_<version>"`
    pub fn identifier(&self) -> String {
        format!("{}_{}", self.uuid, self.version)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePacksInfo {
    pub texture_pack_required: bool,
    pub has_scripts: bool,
    pub behaviour_packs: Vec<ResourcePackEntry>,
    pub texture_packs: Vec<ResourcePackEntry>,
}

impl ResourcePacksInfo {
    /// Behaviour packs followed by texture packs
    pub fn all_packs(&self) -> impl Iterator<Item = &ResourcePackEntry> {
        self.behaviour_packs.iter().chain(self.texture_packs.iter())
    }
}

fn decode_entries(reader: &mut PacketReader<'_>) -> Result<Vec<ResourcePackEntry>> {
    let count = reader.u16_le()? as usize;
    let mut entries = Vec::with_capacity(count.min(reader.remaining()));
    for _ in 0..count {
        entries.push(ResourcePackEntry::decode(reader)?);
    }
    Ok(entries)
}

impl PacketBody for ResourcePacksInfo {
    const ID: u32 = ids::RESOURCE_PACKS_INFO;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_bool(self.texture_pack_required);
        buf.put_bool(self.has_scripts);
        for packs in [&self.behaviour_packs, &self.texture_packs] {
            buf.put_u16_le(packs.len() as u16);
            for pack in packs {
                pack.encode(buf);
            }
        }
    }

    fn decode(reader: &mut PacketReader<'_>) -> Result<Self> {
        Ok(Self {
            texture_pack_required: reader.bool()?,
            has_scripts: reader.bool()?,
            behaviour_packs: decode_entries(reader)?,
            texture_packs: decode_entries(reader)?,
        })
    }
}

/// One entry of `ResourcePackStack`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackEntry {
    pub uuid: String,
    pub version: String,
    pub sub_pack_name: String,
}

fn decode_stack(reader: &mut PacketReader<'_>) -> Result<Vec<StackEntry>> {
    let count = reader.varuint32()? as usize;
    let mut entries = Vec::with_capacity(count.min(reader.remaining()));
    for _ in 0..count {
        entries.push(StackEntry {
            uuid: reader.string()?,
            version: reader.string()?,
            sub_pack_name: reader.string()?,
        });
    }
    Ok(entries)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePackStack {
    pub texture_pack_required: bool,
    pub behaviour_packs: Vec<StackEntry>,
    pub texture_packs: Vec<StackEntry>,
    pub experimental: bool,
}

impl PacketBody for ResourcePackStack {
    const ID: u32 = ids::RESOURCE_PACK_STACK;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_bool(self.texture_pack_required);
        for stack in [&self.behaviour_packs, &self.texture_packs] {
            buf.put_varuint32(stack.len() as u32);
            for entry in stack {
                buf.put_string(&entry.uuid);
                buf.put_string(&entry.version);
                buf.put_string(&entry.sub_pack_name);
            }
        }
        buf.put_bool(self.experimental);
    }

    fn decode(reader: &mut PacketReader<'_>) -> Result<Self> {
        Ok(Self {
            texture_pack_required: reader.bool()?,
            behaviour_packs: decode_stack(reader)?,
            texture_packs: decode_stack(reader)?,
            experimental: reader.bool()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePackClientResponse {
    pub response: u8,
    pub packs_to_download: Vec<String>,
}

impl PacketBody for ResourcePackClientResponse {
    const ID: u32 = ids::RESOURCE_PACK_CLIENT_RESPONSE;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.response);
        buf.put_u16_le(self.packs_to_download.len() as u16);
        for id in &self.packs_to_download {
            buf.put_string(id);
        }
    }

    fn decode(reader: &mut PacketReader<'_>) -> Result<Self> {
        let response = reader.u8()?;
        let count = reader.u16_le()? as usize;
        let mut packs_to_download = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            packs_to_download.push(reader.string()?);
        }
        Ok(Self {
            response,
            packs_to_download,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestChunkRadius {
    pub chunk_radius: i32,
}

impl PacketBody for RequestChunkRadius {
    const ID: u32 = ids::REQUEST_CHUNK_RADIUS;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_varint32(self.chunk_radius);
    }

    fn decode(reader: &mut PacketReader<'_>) -> Result<Self> {
        Ok(Self {
            chunk_radius: reader.varint32()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePackDataInfo {
    /// `"<uuid>_<version>"`
    pub uuid: String,
    pub data_chunk_size: u32,
    pub chunk_count: u32,
    pub size: u64,
    /// SHA-256 of the full pack content
    pub hash: Vec<u8>,
}

impl PacketBody for ResourcePackDataInfo {
    const ID: u32 = ids::RESOURCE_PACK_DATA_INFO;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_string(&self.uuid);
        buf.put_u32_le(self.data_chunk_size);
        buf.put_u32_le(self.chunk_count);
        buf.put_u64_le(self.size);
        buf.put_byte_slice(&self.hash);
    }

    fn decode(reader: &mut PacketReader<'_>) -> Result<Self> {
        Ok(Self {
            uuid: reader.string()?,
            data_chunk_size: reader.u32_le()?,
            chunk_count: reader.u32_le()?,
            size: reader.u64_le()?,
            hash: reader.byte_slice()?.to_vec(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePackChunkData {
    pub uuid: String,
    pub chunk_index: u32,
    pub data_offset: u64,
    pub data: Bytes,
}

impl PacketBody for ResourcePackChunkData {
    const ID: u32 = ids::RESOURCE_PACK_CHUNK_DATA;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_string(&self.uuid);
        buf.put_u32_le(self.chunk_index);
        buf.put_u64_le(self.data_offset);
        buf.put_byte_slice(&self.data);
    }

    fn decode(reader: &mut PacketReader<'_>) -> Result<Self> {
        Ok(Self {
            uuid: reader.string()?,
            chunk_index: reader.u32_le()?,
            data_offset: reader.u64_le()?,
            data: Bytes::copy_from_slice(reader.byte_slice()?),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePackChunkRequest {
    pub uuid: String,
    pub chunk_index: u32,
}

impl PacketBody for ResourcePackChunkRequest {
    const ID: u32 = ids::RESOURCE_PACK_CHUNK_REQUEST;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_string(&self.uuid);
        buf.put_u32_le(self.chunk_index);
    }

    fn decode(reader: &mut PacketReader<'_>) -> Result<Self> {
        Ok(Self {
            uuid: reader.string()?,
            chunk_index: reader.u32_le()?,
        })
    }
}

/// Sent by the server to tell the client which entity type last hurt it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetLastHurtBy {
    pub entity_type: i32,
}

impl PacketBody for SetLastHurtBy {
    const ID: u32 = ids::SET_LAST_HURT_BY;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_varint32(self.entity_type);
    }

    fn decode(reader: &mut PacketReader<'_>) -> Result<Self> {
        Ok(Self {
            entity_type: reader.varint32()?,
        })
    }
}

pub const CORRECTION_TYPE_PLAYER: u8 = 0;
pub const CORRECTION_TYPE_VEHICLE: u8 = 1;

/// Server-authoritative movement correction for a past tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CorrectPlayerMovePrediction {
    pub position: Vec3,
    /// Difference from the position the client reported at `tick`
    pub delta: Vec3,
    pub on_ground: bool,
    pub tick: u64,
    pub correction_type: u8,
}

impl PacketBody for CorrectPlayerMovePrediction {
    const ID: u32 = ids::CORRECT_PLAYER_MOVE_PREDICTION;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_vec3(&self.position);
        buf.put_vec3(&self.delta);
        buf.put_bool(self.on_ground);
        buf.put_varuint64(self.tick);
        buf.put_u8(self.correction_type);
    }

    fn decode(reader: &mut PacketReader<'_>) -> Result<Self> {
        Ok(Self {
            position: reader.vec3()?,
            delta: reader.vec3()?,
            on_ground: reader.bool()?,
            tick: reader.varuint64()?,
            correction_type: reader.u8()?,
        })
    }
}

macro_rules! packets {
    ($($variant:ident),* $(,)?) => {
        /// A packet sent or received by the session.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Packet {
            $($variant($variant),)*
            /// Any packet without a typed decoder, payload kept verbatim
            Unknown { id: u32, payload: Bytes },
        }

        impl Packet {
            pub fn id(&self) -> u32 {
                match self {
                    $(Packet::$variant(_) => <$variant as PacketBody>::ID,)*
                    Packet::Unknown { id, .. } => *id,
                }
            }

            /// Append the payload (without header) to `buf`
            pub fn encode_payload(&self, buf: &mut BytesMut) {
                match self {
                    $(Packet::$variant(body) => body.encode(buf),)*
                    Packet::Unknown { payload, .. } => buf.extend_from_slice(payload),
                }
            }
        }

        $(
            impl From<$variant> for Packet {
                fn from(body: $variant) -> Self {
                    Packet::$variant(body)
                }
            }
        )*
    };
}

packets!(
    Login,
    PlayStatus,
    ServerToClientHandshake,
    ClientToServerHandshake,
    Disconnect,
    ResourcePacksInfo,
    ResourcePackStack,
    ResourcePackClientResponse,
    RequestChunkRadius,
    ResourcePackDataInfo,
    ResourcePackChunkData,
    ResourcePackChunkRequest,
    SetLastHurtBy,
    CorrectPlayerMovePrediction,
);

impl Packet {
    pub fn header(&self) -> Header {
        Header::new(self.id())
    }

    /// Encode the payload into a fresh buffer
    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_payload(&mut buf);
        buf.freeze()
    }
}

/// Decode `T` and require that the whole payload was consumed.
pub fn decode_exact<T: PacketBody>(payload: &[u8]) -> Result<T> {
    let mut reader = PacketReader::new(payload);
    let body = T::decode(&mut reader)?;
    if !reader.is_empty() {
        return Err(ProtocolError::DecodeError(format!(
            "{} trailing bytes after packet {:#04x}",
            reader.remaining(),
            T::ID
        )));
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_header_sub_clients() {
        let header = Header {
            packet_id: ids::CORRECT_PLAYER_MOVE_PREDICTION,
            sender_sub_client: 2,
            target_sub_client: 3,
        };
        let mut buf = Vec::new();
        header.write(&mut buf);
        let decoded = Header::read(&mut PacketReader::new(&buf)).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_disconnect_hidden_has_no_message() {
        let packet = Disconnect {
            hide_disconnection_screen: true,
            message: "ignored".into(),
        };
        let mut buf = BytesMut::new();
        packet.encode(&mut buf);
        assert_eq!(&buf[..], &[1]);
        let decoded: Disconnect = decode_exact(&buf).unwrap();
        assert!(decoded.message.is_empty());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_set_last_hurt_by_is_varint() {
        let mut buf = BytesMut::new();
        SetLastHurtBy { entity_type: -3 }.encode(&mut buf);
        assert_eq!(&buf[..], &[0x05]);
        let decoded: SetLastHurtBy = decode_exact(&buf).unwrap();
        assert_eq!(decoded.entity_type, -3);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_correct_player_move_prediction_layout() {
        let packet = CorrectPlayerMovePrediction {
            position: [1.0, 64.0, -3.5],
            delta: [0.0, -0.25, 0.0],
            on_ground: true,
            tick: 300,
            correction_type: CORRECTION_TYPE_VEHICLE,
        };
        let mut buf = BytesMut::new();
        packet.encode(&mut buf);
        // two vec3s, bool, 2-byte varuint64, u8
        assert_eq!(buf.len(), 12 + 12 + 1 + 2 + 1);
        let decoded: CorrectPlayerMovePrediction = decode_exact(&buf).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let payload = [0u8, 0, 0, 0, 0xAA];
        let result = decode_exact::<PlayStatus>(&payload);
        assert!(matches!(result, Err(ProtocolError::DecodeError(_))));
    }

    #[test]
    fn test_entry_identifier() {
        let entry = ResourcePackEntry {
            uuid: "A".into(),
            version: "1.0".into(),
            ..Default::default()
        };
        assert_eq!(entry.identifier(), "A_1.0");
    }
}
