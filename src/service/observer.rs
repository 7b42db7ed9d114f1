//! Diagnostic hooks.
//!
//! A [`PacketObserver`] sees every packet in both directions; an [`ErrorSink`] is told
//! about the error that ended a session. Neither can influence the session: a panic
//! inside either hook is caught and logged.

use crate::core::packet::Header;
use crate::error::ProtocolError;
use crate::transport::PeerAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Called with the header, raw payload, source and destination of every packet.
pub type PacketObserver = Arc<dyn Fn(&Header, &[u8], &PeerAddr, &PeerAddr) + Send + Sync>;

/// Called once with the error that terminated a session.
pub type ErrorSink = Arc<dyn Fn(&ProtocolError) + Send + Sync>;

pub(crate) fn observe(
    observer: Option<&PacketObserver>,
    header: &Header,
    payload: &[u8],
    source: &PeerAddr,
    destination: &PeerAddr,
) {
    let Some(observer) = observer else {
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| observer(header, payload, source, destination))).is_err() {
        warn!(packet_id = header.packet_id, "Packet observer panicked");
    }
}

pub(crate) fn report(sink: Option<&ErrorSink>, error: &ProtocolError) {
    let Some(sink) = sink else {
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| sink(error))).is_err() {
        warn!("Error sink panicked");
    }
}
