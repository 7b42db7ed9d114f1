//! # Client Service
//!
//! The public face of the crate: [`Dialer`] opens and logs in a session, and
//! [`Connection`] is the session handle callers read and write packets through.
//!
//! ## Session lifecycle
//! 1. `Dialer::dial` opens a transport, builds the login chain and spawns the
//!    ingestion task
//! 2. The ingestion task completes the handshake and fires the connected signal
//! 3. Resource packs, chunk radius and play status are handled in the background;
//!    every other packet waits in the connection's inbound queue
//! 4. The first error or `Connection::close` fires the closed signal and tears
//!    the transport down

pub mod connection;
pub mod dialer;
pub mod observer;

pub use connection::Connection;
pub use dialer::Dialer;
pub use observer::{ErrorSink, PacketObserver};
