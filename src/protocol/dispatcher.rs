use crate::core::packet::{ids, Header};
use crate::error::{constants, ProtocolError, Result};
use std::collections::HashSet;
use std::sync::RwLock;

/// Which packet IDs the session currently accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectations {
    Only(HashSet<u32>),
    Any,
}

impl Expectations {
    pub fn only(ids: &[u32]) -> Self {
        Expectations::Only(ids.iter().copied().collect())
    }

    pub fn permits(&self, id: u32) -> bool {
        match self {
            Expectations::Only(ids) => ids.contains(&id),
            Expectations::Any => true,
        }
    }
}

/// Where the ingestion task sends a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `ServerToClientHandshake`
    Handshake,
    /// `PlayStatus`
    PlayStatus,
    /// Resource pack negotiation and transfer
    ResourcePack,
    /// `StartGame`; answered with the chunk radius request, then forwarded
    StartGame,
    /// Forwarded, then the session closes
    Disconnect,
    /// Straight to the caller queue
    Forward,
}

/// Packet router with an allow-list of expected IDs.
///
/// The allow-list starts out empty and is narrowed or widened by the session as the
/// login progresses. Routing for a packet the list does not permit is a protocol
/// violation.
pub struct Dispatcher {
    expected: RwLock<Expectations>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            expected: RwLock::new(Expectations::only(&[])),
        }
    }

    /// Only accept `ids` from now on
    pub fn expect(&self, ids: &[u32]) -> Result<()> {
        self.set(Expectations::only(ids))
    }

    /// Accept every packet from now on
    pub fn expect_any(&self) -> Result<()> {
        self.set(Expectations::Any)
    }

    pub fn expectations(&self) -> Result<Expectations> {
        let expected = self
            .expected
            .read()
            .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.to_string()))?;
        Ok(expected.clone())
    }

    fn set(&self, expectations: Expectations) -> Result<()> {
        let mut expected = self
            .expected
            .write()
            .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.to_string()))?;
        *expected = expectations;
        Ok(())
    }

    pub fn dispatch(&self, header: &Header) -> Result<Route> {
        let expected = self
            .expected
            .read()
            .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.to_string()))?;

        if !expected.permits(header.packet_id) {
            return Err(ProtocolError::UnexpectedPacket(header.packet_id));
        }
        Ok(route_for(header.packet_id))
    }
}

#[inline]
fn route_for(id: u32) -> Route {
    match id {
        ids::SERVER_TO_CLIENT_HANDSHAKE => Route::Handshake,
        ids::PLAY_STATUS => Route::PlayStatus,
        ids::RESOURCE_PACKS_INFO
        | ids::RESOURCE_PACK_DATA_INFO
        | ids::RESOURCE_PACK_CHUNK_DATA
        | ids::RESOURCE_PACK_STACK => Route::ResourcePack,
        ids::START_GAME => Route::StartGame,
        ids::DISCONNECT => Route::Disconnect,
        _ => Route::Forward,
    }
}
