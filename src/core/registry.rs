//! Packet ID to decoder mapping.
//!
//! The registry is built once and shared read-only (behind `Arc`) by every codec
//! that decodes packets. IDs without a decoder come out as [`Packet::Unknown`].

use crate::core::packet::{
    decode_exact, ClientToServerHandshake, CorrectPlayerMovePrediction, Disconnect, Header,
    Login, Packet, PacketBody, PlayStatus, RequestChunkRadius, ResourcePackChunkData,
    ResourcePackChunkRequest, ResourcePackClientResponse, ResourcePackDataInfo,
    ResourcePackStack, ResourcePacksInfo, ServerToClientHandshake, SetLastHurtBy,
};
use crate::error::Result;
use bytes::Bytes;
use std::collections::HashMap;

/// Decodes a full packet payload (header already stripped).
pub type DecodeFn = fn(&[u8]) -> Result<Packet>;

fn decode_into<T>(payload: &[u8]) -> Result<Packet>
where
    T: PacketBody + Into<Packet>,
{
    decode_exact::<T>(payload).map(Into::into)
}

#[derive(Debug, Clone)]
pub struct PacketRegistry {
    decoders: HashMap<u32, DecodeFn>,
}

impl Default for PacketRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PacketRegistry {
    /// A registry that decodes nothing; every packet comes out as `Packet::Unknown`
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// A registry with every packet type this crate models
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register::<Login>();
        registry.register::<PlayStatus>();
        registry.register::<ServerToClientHandshake>();
        registry.register::<ClientToServerHandshake>();
        registry.register::<Disconnect>();
        registry.register::<ResourcePacksInfo>();
        registry.register::<ResourcePackStack>();
        registry.register::<ResourcePackClientResponse>();
        registry.register::<RequestChunkRadius>();
        registry.register::<ResourcePackDataInfo>();
        registry.register::<ResourcePackChunkData>();
        registry.register::<ResourcePackChunkRequest>();
        registry.register::<SetLastHurtBy>();
        registry.register::<CorrectPlayerMovePrediction>();
        registry
    }

    pub fn register<T>(&mut self)
    where
        T: PacketBody + Into<Packet>,
    {
        self.decoders.insert(T::ID, decode_into::<T>);
    }

    /// Register a custom decoder, replacing any existing one for `id`
    pub fn register_fn(&mut self, id: u32, decoder: DecodeFn) {
        self.decoders.insert(id, decoder);
    }

    pub fn contains(&self, id: u32) -> bool {
        self.decoders.contains_key(&id)
    }

    pub fn decode(&self, header: &Header, payload: &Bytes) -> Result<Packet> {
        match self.decoders.get(&header.packet_id) {
            Some(decoder) => decoder(payload),
            None => Ok(Packet::Unknown {
                id: header.packet_id,
                payload: payload.clone(),
            }),
        }
    }
}
