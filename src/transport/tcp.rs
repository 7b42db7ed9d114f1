use crate::core::codec::FrameCodec;
use crate::error::Result;
use crate::transport::StreamTransport;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, instrument};

pub type TcpTransport = StreamTransport<OwnedReadHalf, OwnedWriteHalf>;

/// Connect to `address` over TCP
#[instrument(skip(max_frame_size))]
pub async fn connect(address: &str, max_frame_size: usize) -> Result<TcpTransport> {
    let stream = TcpStream::connect(address).await?;
    from_stream(stream, max_frame_size)
}

/// Wrap an already connected stream
pub fn from_stream(stream: TcpStream, max_frame_size: usize) -> Result<TcpTransport> {
    stream.set_nodelay(true)?;
    let local = stream.local_addr()?;
    let remote = stream.peer_addr()?;
    debug!(%local, %remote, "TCP transport connected");

    let (reader, writer) = stream.into_split();
    Ok(StreamTransport::new(
        reader,
        writer,
        FrameCodec::new(max_frame_size),
        local.into(),
        remote.into(),
    ))
}
