//! # Session Protocol
//!
//! Login, authentication, the encryption handshake, packet routing and the
//! resource pack sub-protocol.
//!
//! ## Login sequence (client side)
//! ```text
//! client                                server
//!   | Login(chain, client data JWT)  ->   |
//!   |   <- ServerToClientHandshake(JWT)   |   or PlayStatus(LoginSuccess) when unencrypted
//!   | ClientToServerHandshake        ->   |   first encrypted batch
//!   |   <- PlayStatus(LoginSuccess)       |
//!   |   <- ResourcePacksInfo              |
//!   | ResourcePackClientResponse     ->   |   SendPacks(ids) or HaveAllPacks
//!   |   <- ResourcePackDataInfo           |   per pack
//!   | ResourcePackChunkRequest       ->   |   per chunk, strictly in order
//!   |   <- ResourcePackChunkData          |
//!   |   <- ResourcePackStack              |
//!   | ResourcePackClientResponse     ->   |   Completed
//!   |   <- StartGame                      |
//!   | RequestChunkRadius             ->   |
//! ```

pub mod auth;
pub mod dispatcher;
pub mod handshake;
pub mod jwt;
pub mod login;
pub mod resource_pack;

pub use auth::{Authenticator, Credentials};
pub use dispatcher::{Dispatcher, Expectations, Route};
pub use login::{ClientData, IdentityData};
pub use resource_pack::{ChunkProgress, ResourcePack, ResourcePackQueue};
