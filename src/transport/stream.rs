//! Frame transport over any split byte stream.

use crate::core::codec::FrameCodec;
use crate::error::{ProtocolError, Result};
use crate::transport::{PeerAddr, Transport};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

pub struct StreamTransport<R, W> {
    reader: Mutex<FramedRead<R, FrameCodec>>,
    writer: Mutex<FramedWrite<W, FrameCodec>>,
    closed: AtomicBool,
    local: PeerAddr,
    remote: PeerAddr,
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W, codec: FrameCodec, local: PeerAddr, remote: PeerAddr) -> Self {
        Self {
            reader: Mutex::new(FramedRead::new(reader, codec)),
            writer: Mutex::new(FramedWrite::new(writer, codec)),
            closed: AtomicBool::new(false),
            local,
            remote,
        }
    }
}

impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn send(&self, frame: Bytes) -> BoxFuture<'_, Result<()>> {
        async move {
            if self.closed.load(Ordering::Acquire) {
                return Err(ProtocolError::ConnectionClosed);
            }
            let mut writer = self.writer.lock().await;
            writer.send(frame).await
        }
        .boxed()
    }

    fn recv(&self) -> BoxFuture<'_, Result<Option<Bytes>>> {
        async move {
            if self.closed.load(Ordering::Acquire) {
                return Ok(None);
            }
            let mut reader = self.reader.lock().await;
            reader.next().await.transpose()
        }
        .boxed()
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            if self.closed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            debug!(remote = %self.remote, "Closing stream transport");
            let mut writer = self.writer.lock().await;
            match writer.close().await {
                Ok(()) => Ok(()),
                // The peer may already be gone
                Err(ProtocolError::Io(e)) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
                Err(e) => Err(e),
            }
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
