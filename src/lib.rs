//! # bedrock-client
//!
//! Client side of the Minecraft Bedrock Edition session protocol: dialing and
//! login, the encryption handshake, batched packet I/O and resource pack download.
//!
//! ## Modules
//! - [`core`]: binary primitives, packets, batch codec and frame encryption
//! - [`protocol`]: login chain, JWTs, the handshake, packet routing, resource packs
//! - [`service`]: [`Dialer`] and [`Connection`]
//! - [`transport`]: frame transports (TCP, Unix sockets, in-memory) and connectors
//! - [`config`]: TOML/environment configuration
//! - [`utils`]: compression, logging, metrics and timeouts
//!
//! ## Example
//! ```rust,no_run
//! use bedrock_client::core::Packet;
//!
//! # async fn run() -> bedrock_client::error::Result<()> {
//! let conn = bedrock_client::dial("tcp", "127.0.0.1:19132").await?;
//! loop {
//!     match conn.read_packet().await? {
//!         Packet::Disconnect(d) => {
//!             println!("kicked: {}", d.message);
//!             break;
//!         }
//!         other => println!("packet {:#04x}", other.id()),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use error::{ProtocolError, Result};
pub use service::{Connection, Dialer};

/// Dial `address` over `network` with a default [`Dialer`]
pub async fn dial(network: &str, address: &str) -> Result<Connection> {
    Dialer::default().dial(network, address).await
}
