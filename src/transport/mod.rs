//! # Transport Layer
//!
//! Byte-frame transports the session runs on.
//!
//! A [`Transport`] moves whole batch frames; it knows nothing about packets. Stream
//! sockets (TCP, Unix) delimit frames with [`FrameCodec`](crate::core::codec::FrameCodec).
//! RakNet, the transport real Bedrock servers speak, is message-oriented and is
//! plugged in from outside through a [`Connector`].
//!
//! ## Transports
//! - **TCP**: `tcp`, `tcp4`, `tcp6`
//! - **Unix**: Unix domain stream sockets (Unix only)
//! - **Memory**: an in-process pair for tests and embedding

pub mod local;
pub mod memory;
pub mod stream;
pub mod tcp;

use crate::config::MAX_PAYLOAD_SIZE;
use crate::error::{ProtocolError, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

pub use memory::MemoryTransport;
pub use stream::StreamTransport;

/// Network a session is dialed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Raknet,
    Tcp,
    Unix,
}

impl FromStr for Network {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "raknet" => Ok(Network::Raknet),
            "tcp" | "tcp4" | "tcp6" => Ok(Network::Tcp),
            "unix" => Ok(Network::Unix),
            other => Err(ProtocolError::UnsupportedNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Network::Raknet => "raknet",
            Network::Tcp => "tcp",
            Network::Unix => "unix",
        })
    }
}

/// Address of either end of a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAddr {
    Inet(SocketAddr),
    Unix(String),
    Memory(String),
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerAddr::Inet(addr) => write!(f, "{addr}"),
            PeerAddr::Unix(path) => write!(f, "unix:{path}"),
            PeerAddr::Memory(name) => write!(f, "memory:{name}"),
        }
    }
}

impl From<SocketAddr> for PeerAddr {
    fn from(addr: SocketAddr) -> Self {
        PeerAddr::Inet(addr)
    }
}

/// A connection that carries whole frames in order.
///
/// `recv` is only ever called from the session's ingestion task; `send` may be called
/// from any task. `close` must be idempotent, and once it has run `recv` must return
/// `Ok(None)` instead of blocking.
pub trait Transport: Send + Sync {
    fn send(&self, frame: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Next frame, or `None` once the peer hung up or the transport was closed
    fn recv(&self) -> BoxFuture<'_, Result<Option<Bytes>>>;

    fn close(&self) -> BoxFuture<'_, Result<()>>;

    fn local_addr(&self) -> PeerAddr;

    fn remote_addr(&self) -> PeerAddr;
}

/// Opens transports for the dialer.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, network: Network, address: &'a str)
        -> BoxFuture<'a, Result<Box<dyn Transport>>>;
}

/// Connector for the stream networks the standard library can open.
///
/// RakNet is rejected with `UnsupportedNetwork`; supply a RakNet-capable connector to
/// the dialer instead.
#[derive(Debug, Clone, Copy)]
pub struct NetConnector {
    max_frame_size: usize,
}

impl Default for NetConnector {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl NetConnector {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Connector for NetConnector {
    fn connect<'a>(
        &'a self,
        network: Network,
        address: &'a str,
    ) -> BoxFuture<'a, Result<Box<dyn Transport>>> {
        async move {
            match network {
                Network::Tcp => {
                    let transport = tcp::connect(address, self.max_frame_size).await?;
                    Ok(Box::new(transport) as Box<dyn Transport>)
                }
                Network::Unix => local::connect(address, self.max_frame_size).await,
                Network::Raknet => Err(ProtocolError::UnsupportedNetwork(format!(
                    "{network}: no RakNet connector configured"
                ))),
            }
        }
        .boxed()
    }
}
