//! # Core Protocol Components
//!
//! Binary primitives, typed packets, the packet registry and batch framing.
//!
//! ## Wire Format
//! ```text
//! frame  = 0xFE ‖ stage(compress(entry*))
//! entry  = varuint32(len) ‖ header ‖ payload
//! header = varuint32(id & 0x3FF | sender_sub << 10 | target_sub << 12)
//! stage  = identity, or AES-256-CTR over (body ‖ checksum[8]) once the handshake ran
//! ```
//!
//! Stream transports add a varuint32 length prefix per frame ([`codec::FrameCodec`]).
//!
//! ## Limits
//! - Decompressed batches are bounded by `max_payload_size` (16MB by default)
//! - A batch may carry at most `max_batch_packets` entries
//! - Length prefixes are validated before allocation

pub mod binary;
pub mod codec;
pub mod encryption;
pub mod packet;
pub mod registry;

pub use codec::{BatchDecoder, BatchEncoder, FrameCodec, RawPacket};
pub use packet::{Header, Packet};
pub use registry::PacketRegistry;
