//! Client session.
//!
//! A [`Connection`] is produced by [`Dialer::dial`](crate::service::dialer::Dialer::dial).
//! Each one owns a background ingestion task that reads frames from the transport,
//! decodes them, and handles login, the encryption handshake and resource pack
//! transfer on its own. Everything else is queued for [`Connection::read_packet`].
//!
//! The task is the only writer of handshake and resource pack state. It stops on the
//! first transport error, decode error or protocol violation, on a remote disconnect,
//! or when the session is closed from the caller's side, and closes the session
//! on its way out.

use crate::config::TransportConfig;
use crate::core::codec::{BatchDecoder, BatchEncoder, RawPacket};
use crate::core::packet::{
    ids, pack_response, play_status, ClientToServerHandshake, Packet, RequestChunkRadius,
    ResourcePackChunkRequest, ResourcePackClientResponse, ResourcePackDataInfo,
};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::dispatcher::{Dispatcher, Route};
use crate::protocol::handshake::{client_handshake_verify, SessionKey};
use crate::protocol::login::{ClientData, IdentityData};
use crate::protocol::resource_pack::{ChunkProgress, ResourcePack, ResourcePackQueue};
use crate::service::observer::{observe, report, ErrorSink, PacketObserver};
use crate::transport::{PeerAddr, Transport};
use crate::utils::metrics::{Metrics, MetricsSnapshot};
use crate::utils::Signal;
use p384::ecdsa::SigningKey;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

/// Everything a session needs besides its transport
pub(crate) struct SessionParts {
    pub signing_key: SigningKey,
    pub client_data: ClientData,
    pub identity_data: IdentityData,
    pub chunk_radius: i32,
    pub transport_config: TransportConfig,
    pub observer: Option<PacketObserver>,
    pub error_sink: Option<ErrorSink>,
}

/// Resource pack state owned by the ingestion task
struct PackState {
    queue: ResourcePackQueue,
    /// Data infos that arrived while another pack was in transfer
    deferred: VecDeque<ResourcePackDataInfo>,
}

struct Shared {
    transport: Box<dyn Transport>,
    encoder: tokio::sync::Mutex<BatchEncoder>,
    session_key: OnceLock<SessionKey>,
    dispatcher: Dispatcher,
    packs: Mutex<Option<PackState>>,
    downloaded: Mutex<Vec<Arc<ResourcePack>>>,
    connected: Signal,
    closed: Signal,
    close_reason: OnceLock<String>,
    parts: SessionParts,
    metrics: Metrics,
    local: PeerAddr,
    remote: PeerAddr,
}

enum Flow {
    Continue,
    /// The server disconnected us; carries its message
    Disconnected(String),
}

/// An established session with a Bedrock server.
pub struct Connection {
    shared: Arc<Shared>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Packet>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("local", &self.shared.local)
            .field("remote", &self.shared.remote)
            .field("closed", &self.shared.closed.is_fired())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap `transport` and start the ingestion task.
    ///
    /// Only `ServerToClientHandshake` and `PlayStatus` are accepted until the
    /// handshake completes.
    pub(crate) fn start(
        transport: Box<dyn Transport>,
        parts: SessionParts,
        decoder: BatchDecoder,
        encoder: BatchEncoder,
    ) -> Result<Self> {
        let dispatcher = Dispatcher::new();
        dispatcher.expect(&[ids::SERVER_TO_CLIENT_HANDSHAKE, ids::PLAY_STATUS])?;

        let local = transport.local_addr();
        let remote = transport.remote_addr();
        let shared = Arc::new(Shared {
            transport,
            encoder: tokio::sync::Mutex::new(encoder),
            session_key: OnceLock::new(),
            dispatcher,
            packs: Mutex::new(None),
            downloaded: Mutex::new(Vec::new()),
            connected: Signal::new(),
            closed: Signal::new(),
            close_reason: OnceLock::new(),
            parts,
            metrics: Metrics::new(),
            local,
            remote,
        });

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(ingest(shared.clone(), decoder, tx));

        Ok(Self {
            shared,
            inbound: tokio::sync::Mutex::new(rx),
        })
    }

    /// Wait until the handshake completes or the session closes, whichever fires first.
    ///
    /// Returns true if the session is usable.
    pub(crate) async fn wait_connected(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.shared.connected.wait() => true,
            _ = self.shared.closed.wait() => false,
        }
    }

    /// Next packet the session did not consume itself, in wire order.
    ///
    /// Packets received before the session closed are still returned; after that
    /// the call fails with the reason the session ended.
    pub async fn read_packet(&self) -> Result<Packet> {
        let mut inbound = self.inbound.lock().await;
        if let Ok(packet) = inbound.try_recv() {
            return Ok(packet);
        }
        tokio::select! {
            biased;
            packet = inbound.recv() => packet.ok_or_else(|| self.shared.terminated()),
            _ = self.shared.closed.wait() => {
                inbound.try_recv().map_err(|_| self.shared.terminated())
            }
        }
    }

    pub async fn write_packet(&self, packet: Packet) -> Result<()> {
        self.shared.write(std::slice::from_ref(&packet)).await
    }

    /// Send several packets in one batch
    pub async fn write_packets(&self, packets: &[Packet]) -> Result<()> {
        self.shared.write(packets).await
    }

    /// Close the session. Calling it again has no further effect.
    pub async fn close(&self) -> Result<()> {
        self.shared.shutdown().await
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_fired()
    }

    /// Whether batches are encrypted
    pub fn is_encrypted(&self) -> bool {
        self.shared.session_key.get().is_some()
    }

    pub fn client_data(&self) -> &ClientData {
        &self.shared.parts.client_data
    }

    pub fn identity_data(&self) -> &IdentityData {
        &self.shared.parts.identity_data
    }

    pub fn local_addr(&self) -> &PeerAddr {
        &self.shared.local
    }

    pub fn remote_addr(&self) -> &PeerAddr {
        &self.shared.remote
    }

    /// Resource packs downloaded and verified during login
    pub fn resource_packs(&self) -> Vec<Arc<ResourcePack>> {
        self.shared
            .downloaded
            .lock()
            .map(|packs| packs.clone())
            .unwrap_or_default()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Why the session ended, if it ended on an error or a remote disconnect
    pub fn close_reason(&self) -> Option<&str> {
        self.shared.close_reason.get().map(String::as_str)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // The ingestion task notices and closes the transport
        self.shared.closed.fire();
    }
}

#[instrument(skip_all, fields(remote = %shared.remote))]
async fn ingest(
    shared: Arc<Shared>,
    mut decoder: BatchDecoder,
    inbound: mpsc::UnboundedSender<Packet>,
) {
    debug!("Ingestion task started");
    let result = loop {
        let frame = tokio::select! {
            biased;
            _ = shared.closed.wait() => break Ok(()),
            frame = shared.transport.recv() => frame,
        };
        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("Transport closed by peer");
                break Ok(());
            }
            Err(e) => break Err(e),
        };
        match shared.handle_frame(&mut decoder, &inbound, &frame).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Disconnected(message)) => {
                info!(%message, "Disconnected by server");
                let _ = shared
                    .close_reason
                    .set(format!("disconnected by server: {message}"));
                break Ok(());
            }
            Err(e) => break Err(e),
        }
    };

    if let Err(e) = result {
        shared.fail(e);
    }
    if let Err(e) = shared.shutdown().await {
        warn!(error = %e, "Failed to close transport");
    }
    debug!("Ingestion task stopped");
}

impl Shared {
    fn terminated(&self) -> ProtocolError {
        match self.close_reason.get() {
            Some(reason) => ProtocolError::SessionTerminated(reason.clone()),
            None => ProtocolError::ConnectionClosed,
        }
    }

    /// Record `error` as the reason the session ends and notify the error sink
    fn fail(&self, error: ProtocolError) {
        if error.is_protocol_violation() {
            self.metrics.protocol_error();
        } else {
            self.metrics.connection_error();
        }
        if self.close_reason.set(error.to_string()).is_ok() {
            error!(error = %error, "Session terminated");
            report(self.parts.error_sink.as_ref(), &error);
        }
        self.closed.fire();
    }

    async fn shutdown(&self) -> Result<()> {
        if self.closed.fire() {
            debug!("Session closed");
        }
        self.transport.close().await
    }

    async fn write(&self, packets: &[Packet]) -> Result<()> {
        if self.closed.is_fired() {
            return Err(self.terminated());
        }
        let mut encoder = self.encoder.lock().await;
        self.write_locked(&mut encoder, packets).await
    }

    async fn write_locked(&self, encoder: &mut BatchEncoder, packets: &[Packet]) -> Result<()> {
        let raw: Vec<RawPacket> = packets.iter().map(RawPacket::from_packet).collect();
        for packet in &raw {
            observe(
                self.parts.observer.as_ref(),
                &packet.header,
                &packet.payload,
                &self.local,
                &self.remote,
            );
        }
        let frame = encoder.encode_raw(&raw)?;
        let len = frame.len() as u64;
        if let Err(e) = self.transport.send(frame).await {
            self.metrics.connection_error();
            let _ = self.close_reason.set(e.to_string());
            self.closed.fire();
            return Err(e);
        }
        self.metrics.batch_sent(raw.len() as u64, len);
        Ok(())
    }

    async fn handle_frame(
        &self,
        decoder: &mut BatchDecoder,
        inbound: &mpsc::UnboundedSender<Packet>,
        frame: &[u8],
    ) -> Result<Flow> {
        let packets = decoder.decode_raw(frame)?;
        self.metrics
            .batch_received(packets.len() as u64, frame.len() as u64);

        for raw in packets {
            observe(
                self.parts.observer.as_ref(),
                &raw.header,
                &raw.payload,
                &self.remote,
                &self.local,
            );
            let route = self.dispatcher.dispatch(&raw.header)?;
            let packet = decoder.registry().decode(&raw.header, &raw.payload)?;

            match route {
                Route::Handshake => self.handle_handshake(decoder, packet).await?,
                Route::PlayStatus => self.handle_play_status(inbound, packet)?,
                Route::ResourcePack => self.handle_resource_pack(packet).await?,
                Route::StartGame => {
                    self.write(&[RequestChunkRadius {
                        chunk_radius: self.parts.chunk_radius,
                    }
                    .into()])
                        .await?;
                    forward(inbound, packet)?;
                }
                Route::Disconnect => {
                    let message = match &packet {
                        Packet::Disconnect(disconnect) => disconnect.message.clone(),
                        _ => String::new(),
                    };
                    forward(inbound, packet)?;
                    return Ok(Flow::Disconnected(message));
                }
                Route::Forward => forward(inbound, packet)?,
            }
        }
        Ok(Flow::Continue)
    }

    fn mark_connected(&self) -> Result<()> {
        self.dispatcher.expect_any()?;
        if !self.closed.is_fired() && self.connected.fire() {
            self.metrics.handshake_completed();
            info!(encrypted = self.session_key.get().is_some(), "Session connected");
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn handle_handshake(&self, decoder: &mut BatchDecoder, packet: Packet) -> Result<()> {
        let Packet::ServerToClientHandshake(handshake) = packet else {
            return Err(ProtocolError::UnexpectedPacket(packet.id()));
        };
        if self.session_key.get().is_some() {
            return Err(ProtocolError::HandshakeError(
                constants::ERR_KEY_ALREADY_SET.into(),
            ));
        }

        let key = client_handshake_verify(&self.parts.signing_key, &handshake.jwt)?;
        decoder.enable_encryption(key.as_bytes())?;

        let mut encoder = self.encoder.lock().await;
        encoder.enable_encryption(key.as_bytes())?;
        self.session_key
            .set(key)
            .map_err(|_| ProtocolError::HandshakeError(constants::ERR_KEY_ALREADY_SET.into()))?;
        self.write_locked(&mut encoder, &[ClientToServerHandshake.into()])
            .await?;
        drop(encoder);

        debug!("Encryption enabled");
        self.mark_connected()
    }

    fn handle_play_status(
        &self,
        inbound: &mpsc::UnboundedSender<Packet>,
        packet: Packet,
    ) -> Result<()> {
        let Packet::PlayStatus(status) = &packet else {
            return Err(ProtocolError::UnexpectedPacket(packet.id()));
        };
        match status.status {
            play_status::LOGIN_SUCCESS => {
                if !self.connected.is_fired() {
                    // Server skipped encryption
                    self.mark_connected()?;
                }
            }
            play_status::PLAYER_SPAWN => {}
            rejected => return Err(ProtocolError::LoginRejected(rejected)),
        }
        forward(inbound, packet)
    }

    async fn handle_resource_pack(&self, packet: Packet) -> Result<()> {
        let replies = {
            let mut packs = self
                .packs
                .lock()
                .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.to_string()))?;
            self.resource_pack_replies(&mut packs, packet)?
        };
        if replies.is_empty() {
            return Ok(());
        }
        self.write(&replies).await
    }

    /// Advance the pack state machine and return what to send back
    fn resource_pack_replies(
        &self,
        packs: &mut Option<PackState>,
        packet: Packet,
    ) -> Result<Vec<Packet>> {
        let id = packet.id();
        match packet {
            Packet::ResourcePacksInfo(info) => {
                let config = &self.parts.transport_config;
                let mut queue = ResourcePackQueue::from_info(&info)
                    .with_chunk_size(config.resource_pack_chunk_size)
                    .with_max_pack_size(config.max_resource_pack_size);
                let wanted: Vec<String> = info.all_packs().map(|pack| pack.identifier()).collect();
                queue.request(&wanted)?;
                *packs = Some(PackState {
                    queue,
                    deferred: VecDeque::new(),
                });

                debug!(count = wanted.len(), "Server offered resource packs");
                let response = if wanted.is_empty() {
                    pack_response::ALL_PACKS_DOWNLOADED
                } else {
                    pack_response::SEND_PACKS
                };
                Ok(vec![ResourcePackClientResponse {
                    response,
                    packs_to_download: wanted,
                }
                .into()])
            }
            Packet::ResourcePackDataInfo(info) => {
                let state = packs.as_mut().ok_or(ProtocolError::UnexpectedPacket(id))?;
                if state.queue.current().is_some() {
                    debug!(pack = %info.uuid, "Deferring resource pack until the current one completes");
                    state.deferred.push_back(info);
                    return Ok(Vec::new());
                }
                let progress = state.queue.begin_download(&info)?;
                self.after_progress(state, &info.uuid, progress)
            }
            Packet::ResourcePackChunkData(chunk) => {
                let state = packs.as_mut().ok_or(ProtocolError::UnexpectedPacket(id))?;
                let progress = state.queue.deliver_chunk(&chunk)?;
                self.metrics.resource_pack_chunk();
                self.after_progress(state, &chunk.uuid, progress)
            }
            Packet::ResourcePackStack(_) => Ok(vec![ResourcePackClientResponse {
                response: pack_response::COMPLETED,
                packs_to_download: Vec::new(),
            }
            .into()]),
            other => Err(ProtocolError::UnexpectedPacket(other.id())),
        }
    }

    fn after_progress(
        &self,
        state: &mut PackState,
        pack_id: &str,
        mut progress: ChunkProgress,
    ) -> Result<Vec<Packet>> {
        let mut current_id = pack_id.to_string();
        loop {
            match progress {
                ChunkProgress::Pending { next_index } => {
                    return Ok(vec![ResourcePackChunkRequest {
                        uuid: current_id,
                        chunk_index: next_index,
                    }
                    .into()]);
                }
                ChunkProgress::Complete(pack) => {
                    self.metrics.resource_pack_completed();
                    info!(pack = %pack.identifier(), size = pack.size(), "Resource pack downloaded");
                    if let Ok(mut downloaded) = self.downloaded.lock() {
                        downloaded.push(pack);
                    }
                }
            }

            match state.deferred.pop_front() {
                Some(info) => {
                    progress = state.queue.begin_download(&info)?;
                    current_id = info.uuid;
                }
                None if state.queue.all_downloaded() => {
                    return Ok(vec![ResourcePackClientResponse {
                        response: pack_response::ALL_PACKS_DOWNLOADED,
                        packs_to_download: Vec::new(),
                    }
                    .into()]);
                }
                None => return Ok(Vec::new()),
            }
        }
    }
}

fn forward(inbound: &mpsc::UnboundedSender<Packet>, packet: Packet) -> Result<()> {
    // A dropped receiver means the Connection is gone and `closed` has fired
    if inbound.send(packet).is_err() {
        debug!("Inbound queue dropped");
    }
    Ok(())
}
