//! Unix domain socket transport.
//!
//! Frames are varuint32 length-delimited, exactly as on TCP. On platforms without
//! Unix sockets the `unix` network is reported as unsupported.

#[cfg(unix)]
use crate::core::codec::FrameCodec;
use crate::error::Result;
use crate::transport::Transport;
#[cfg(unix)]
use crate::transport::{PeerAddr, StreamTransport};
#[cfg(unix)]
use std::path::Path;
#[cfg(unix)]
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
#[cfg(unix)]
use tokio::net::UnixStream;
use tracing::instrument;
#[cfg(unix)]
use tracing::debug;

#[cfg(unix)]
pub type UnixTransport = StreamTransport<OwnedReadHalf, OwnedWriteHalf>;

/// Connect to the Unix socket at `path`
#[cfg(unix)]
#[instrument(skip(max_frame_size))]
pub async fn connect(path: &str, max_frame_size: usize) -> Result<Box<dyn Transport>> {
    let stream = UnixStream::connect(path).await?;
    Ok(Box::new(from_stream(stream, max_frame_size)?))
}

/// Wrap an already connected Unix stream
#[cfg(unix)]
pub fn from_stream(stream: UnixStream, max_frame_size: usize) -> Result<UnixTransport> {
    let local = describe(stream.local_addr()?.as_pathname());
    let remote = describe(stream.peer_addr()?.as_pathname());
    debug!(%local, %remote, "Unix transport connected");

    let (reader, writer) = stream.into_split();
    Ok(StreamTransport::new(
        reader,
        writer,
        FrameCodec::new(max_frame_size),
        local,
        remote,
    ))
}

#[cfg(unix)]
fn describe(path: Option<&Path>) -> PeerAddr {
    PeerAddr::Unix(
        path.map(|p| p.display().to_string())
            .unwrap_or_else(|| "unnamed".to_string()),
    )
}

#[cfg(not(unix))]
#[instrument(skip(_max_frame_size))]
pub async fn connect(path: &str, _max_frame_size: usize) -> Result<Box<dyn Transport>> {
    Err(crate::error::ProtocolError::UnsupportedNetwork(format!(
        "unix sockets are not available on this platform: {path}"
    )))
}
