//! In-process transport pair.
//!
//! Both ends live in the same process and exchange frames over unbounded channels.
//! Used by the integration tests to script a server, and by embedders that run a
//! server in-process.

use crate::error::{ProtocolError, Result};
use crate::transport::{PeerAddr, Transport};
use crate::utils::Signal;
use bytes::Bytes;
use flume::{Receiver, Sender};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Mutex;

#[derive(Debug)]
pub struct MemoryTransport {
    sender: Mutex<Option<Sender<Bytes>>>,
    receiver: Receiver<Bytes>,
    closed: Signal,
    local: PeerAddr,
    remote: PeerAddr,
}

/// Creates a connected pair; frames sent on one end are received on the other.
pub fn pair(a: &str, b: &str) -> (MemoryTransport, MemoryTransport) {
    let (a_sender, b_receiver) = flume::unbounded();
    let (b_sender, a_receiver) = flume::unbounded();
    let a_addr = PeerAddr::Memory(a.to_string());
    let b_addr = PeerAddr::Memory(b.to_string());

    (
        MemoryTransport {
            sender: Mutex::new(Some(a_sender)),
            receiver: a_receiver,
            closed: Signal::new(),
            local: a_addr.clone(),
            remote: b_addr.clone(),
        },
        MemoryTransport {
            sender: Mutex::new(Some(b_sender)),
            receiver: b_receiver,
            closed: Signal::new(),
            local: b_addr,
            remote: a_addr,
        },
    )
}

impl MemoryTransport {
    fn sender(&self) -> Option<Sender<Bytes>> {
        self.sender.lock().ok().and_then(|sender| sender.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_fired()
    }
}

impl Transport for MemoryTransport {
    fn send(&self, frame: Bytes) -> BoxFuture<'_, Result<()>> {
        async move {
            let sender = self.sender().ok_or(ProtocolError::ConnectionClosed)?;
            sender
                .send_async(frame)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed)
        }
        .boxed()
    }

    fn recv(&self) -> BoxFuture<'_, Result<Option<Bytes>>> {
        async move {
            if self.closed.is_fired() {
                return Ok(None);
            }
            tokio::select! {
                _ = self.closed.wait() => Ok(None),
                frame = self.receiver.recv_async() => Ok(frame.ok()),
            }
        }
        .boxed()
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            self.closed.fire();
            if let Ok(mut sender) = self.sender.lock() {
                sender.take();
            }
            Ok(())
        }
        .boxed()
    }

    fn local_addr(&self) -> PeerAddr {
        self.local.clone()
    }

    fn remote_addr(&self) -> PeerAddr {
        self.remote.clone()
    }
}
