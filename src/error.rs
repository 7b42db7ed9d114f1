//! # Error Types
//!
//! Error handling for the Bedrock client session.
//!
//! Every failure a session can hit is a variant of [`ProtocolError`], from
//! transport I/O up to protocol violations detected by the ingestion task.
//!
//! ## Error Categories
//! - **Transport**: dial/read/write failures, surfaced verbatim and fatal to the session
//! - **Authentication**: one of the three token stages failed; aborts the dial
//! - **Protocol violations**: unexpected packets, out-of-order resource pack chunks,
//!   unknown packs, checksum mismatches, login rejections; fatal to the session
//! - **Connection timeout**: the session closed before the handshake completed; only
//!   ever returned from dial
//!
//! Nothing in this crate retries. Retry policy belongs to the caller.
//!
//! ## Example Usage
//! ```rust,no_run
//! use bedrock_client::error::{ProtocolError, Result};
//! use tracing::{error, info};
//!
//! async fn connect() -> Result<()> {
//!     let conn = bedrock_client::dial("tcp", "127.0.0.1:19132").await?;
//!     conn.close().await
//! }
//!
//! # async fn run() {
//! match connect().await {
//!     Ok(()) => info!("session finished"),
//!     Err(ProtocolError::ConnectionTimeout) => error!("server never acknowledged the login"),
//!     Err(e) => error!(error = %e, "session failed"),
//! }
//! # }
//! ```

use std::fmt;
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Handshake errors
    pub const ERR_MISSING_X5U: &str = "Handshake token header carries no x5u key";
    pub const ERR_MISSING_SALT: &str = "Handshake token claims carry no salt";
    pub const ERR_BAD_SIGNATURE: &str = "Handshake token signature does not verify";
    pub const ERR_MALFORMED_TOKEN: &str = "Malformed JWT";
    pub const ERR_KEY_ALREADY_SET: &str = "Session encryption key already negotiated";

    /// Frame errors
    pub const ERR_EMPTY_FRAME: &str = "Empty frame";
    pub const ERR_FRAME_CHECKSUM: &str = "Frame checksum mismatch";
    pub const ERR_TRUNCATED: &str = "Unexpected end of packet data";
    pub const ERR_VARINT_TOO_LONG: &str = "Variable-length integer is too long";

    /// Resource pack errors
    pub const ERR_PACK_IN_PROGRESS: &str = "Another resource pack download is in progress";
    pub const ERR_PACK_NO_CONTENT: &str = "Resource pack has no content to offer";
    pub const ERR_PACK_NOT_CURRENT: &str = "Resource pack is not the one being transferred";
    pub const ERR_PACK_OVERRUN: &str = "Resource pack chunk exceeds declared size";
    pub const ERR_PACK_TOO_LARGE: &str = "Resource pack exceeds maximum size";

    /// Lock errors
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";
}

/// The stage of the account token exchange that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    /// Requesting the Live token with the account email and password.
    LiveToken,
    /// Exchanging the Live token for an XSTS token.
    XstsToken,
    /// Requesting the signed Minecraft chain with the XSTS token.
    MinecraftChain,
}

impl fmt::Display for AuthStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthStage::LiveToken => "Live token",
            AuthStage::XstsToken => "XSTS token",
            AuthStage::MinecraftChain => "Minecraft auth chain",
        })
    }
}

// ProtocolError is the primary error type for all session operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Session terminated: {0}")]
    SessionTerminated(String),

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Error obtaining {stage}: {reason}")]
    Authentication { stage: AuthStage, reason: String },

    #[error("Handshake failed: {0}")]
    HandshakeError(String),

    #[error("Login rejected by server: play status {0}")]
    LoginRejected(i32),

    #[error("Unexpected packet {0:#04x}")]
    UnexpectedPacket(u32),

    #[error("Invalid batch header")]
    InvalidHeader,

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Encode error: {0}")]
    EncodeError(String),

    #[error("Compression failed")]
    CompressionFailure,

    #[error("Decompression failed")]
    DecompressionFailure,

    #[error("Could not find resource pack {0}")]
    UnknownResourcePack(String),

    #[error("Resource pack {pack}: expected chunk {expected}, got {got}")]
    ChunkOutOfOrder { pack: String, expected: u32, got: u32 },

    #[error("Resource pack {0} is corrupted: checksum mismatch")]
    ChecksumMismatch(String),

    #[error("Resource pack error: {0}")]
    ResourcePackError(String),

    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether the error is a protocol violation committed by the remote peer.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            ProtocolError::HandshakeError(_)
                | ProtocolError::LoginRejected(_)
                | ProtocolError::UnexpectedPacket(_)
                | ProtocolError::InvalidHeader
                | ProtocolError::OversizedPacket(_)
                | ProtocolError::DecodeError(_)
                | ProtocolError::DecompressionFailure
                | ProtocolError::UnknownResourcePack(_)
                | ProtocolError::ChunkOutOfOrder { .. }
                | ProtocolError::ChecksumMismatch(_)
                | ProtocolError::ResourcePackError(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Boxed error returned by pluggable collaborators such as authenticators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
