//! Scripted server and helpers shared by the session tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use bedrock_client::config::PROTOCOL_VERSION;
use bedrock_client::core::codec::{BatchDecoder, BatchEncoder};
use bedrock_client::core::packet::{
    Packet, ResourcePackChunkData, ResourcePackClientResponse, ResourcePackDataInfo,
    ResourcePackEntry, ResourcePacksInfo,
};
use bedrock_client::core::registry::PacketRegistry;
use bedrock_client::error::{ProtocolError, Result};
use bedrock_client::protocol::handshake::server_handshake_init;
use bedrock_client::protocol::jwt;
use bedrock_client::protocol::login;
use bedrock_client::protocol::resource_pack::{ResourcePack, ResourcePackQueue};
use bedrock_client::service::Dialer;
use bedrock_client::transport::memory::{self, MemoryTransport};
use bedrock_client::transport::{Connector, Network, Transport};
use bedrock_client::utils::compression::CompressionKind;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use p384::ecdsa::SigningKey;
use p384::PublicKey;
use std::sync::{Arc, Mutex};

/// Hands out one pre-built memory transport regardless of network and address
pub struct MemoryConnector(pub Mutex<Option<MemoryTransport>>);

impl Connector for MemoryConnector {
    fn connect<'a>(
        &'a self,
        _network: Network,
        _address: &'a str,
    ) -> BoxFuture<'a, Result<Box<dyn Transport>>> {
        async move {
            let transport = self
                .0
                .lock()
                .unwrap()
                .take()
                .ok_or(ProtocolError::ConnectionClosed)?;
            Ok(Box::new(transport) as Box<dyn Transport>)
        }
        .boxed()
    }
}

pub struct FakeServer {
    pub transport: MemoryTransport,
    pub encoder: BatchEncoder,
    pub decoder: BatchDecoder,
    pub key: SigningKey,
}

impl FakeServer {
    pub fn new(transport: MemoryTransport) -> Self {
        Self {
            transport,
            encoder: BatchEncoder::new(CompressionKind::Flate, 6),
            decoder: BatchDecoder::new(CompressionKind::Flate, Arc::new(PacketRegistry::default())),
            key: SigningKey::random(&mut rand_core::OsRng),
        }
    }

    pub async fn recv(&mut self) -> Vec<Packet> {
        let frame = self
            .transport
            .recv()
            .await
            .unwrap()
            .expect("client hung up");
        self.decoder.decode(&frame).unwrap()
    }

    pub async fn recv_one(&mut self) -> Packet {
        let mut packets = self.recv().await;
        assert_eq!(packets.len(), 1, "expected a single packet, got {packets:?}");
        packets.remove(0)
    }

    pub async fn send(&mut self, packets: Vec<Packet>) {
        let frame = self.encoder.encode(&packets).unwrap();
        self.transport.send(frame).await.unwrap();
    }

    /// Receive the login and return the key the client signed it with
    pub async fn accept_login(&mut self) -> PublicKey {
        let Packet::Login(login) = self.recv_one().await else {
            panic!("first packet should be Login");
        };
        assert_eq!(login.client_protocol, PROTOCOL_VERSION);

        let (chain, client_jwt) = login::decode_request(&login.connection_request).unwrap();
        let (client_key, _): (PublicKey, serde_json::Value) = jwt::verify(&chain.chain[0]).unwrap();
        let _: serde_json::Value = jwt::verify_with(&client_jwt, &client_key).unwrap();
        client_key
    }

    /// Login followed by the encryption handshake
    pub async fn handshake(&mut self) {
        let client_key = self.accept_login().await;
        let (packet, session) =
            server_handshake_init(&self.key, &client_key, b"0123456789abcdef").unwrap();
        self.send(vec![packet.into()]).await;
        self.encoder.enable_encryption(session.as_bytes()).unwrap();
        self.decoder.enable_encryption(session.as_bytes()).unwrap();

        assert!(
            matches!(self.recv_one().await, Packet::ClientToServerHandshake(_)),
            "client should acknowledge the handshake"
        );
    }

    pub async fn offer(&mut self, packs: &[ResourcePack]) -> ResourcePackClientResponse {
        let info = ResourcePacksInfo {
            texture_packs: packs.iter().map(entry).collect(),
            ..Default::default()
        };
        self.send(vec![info.into()]).await;
        match self.recv_one().await {
            Packet::ResourcePackClientResponse(response) => response,
            other => panic!("expected a pack response, got {other:?}"),
        }
    }

    /// Serve every requested pack in turn until the client stops asking
    pub async fn serve_packs(&mut self, queue: &mut ResourcePackQueue) -> ResourcePackClientResponse {
        let info = queue.next_pack().unwrap().expect("a requested pack");
        self.send(vec![info.into()]).await;
        loop {
            match self.recv_one().await {
                Packet::ResourcePackChunkRequest(request) => {
                    let chunk = queue.next_chunk(&request.uuid, request.chunk_index).unwrap();
                    let mut batch = vec![chunk.into()];
                    if queue.current().is_none() {
                        if let Some(info) = queue.next_pack().unwrap() {
                            batch.push(info.into());
                        }
                    }
                    self.send(batch).await;
                }
                Packet::ResourcePackClientResponse(response) => return response,
                other => panic!("unexpected packet while serving packs: {other:?}"),
            }
        }
    }
}

pub fn setup() -> (Dialer, FakeServer) {
    let (client, server) = memory::pair("client", "server");
    let dialer = Dialer::new()
        .with_connector(Arc::new(MemoryConnector(Mutex::new(Some(client)))))
        .with_seed(7)
        .with_chunk_radius(6);
    (dialer, FakeServer::new(server))
}

pub fn capture_errors(dialer: Dialer) -> (Dialer, Arc<Mutex<Vec<String>>>) {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let dialer = dialer.with_error_sink(move |e: &ProtocolError| {
        sink.lock().unwrap().push(e.to_string());
    });
    (dialer, errors)
}

pub fn pack(uuid: &str, version: &str, len: usize) -> ResourcePack {
    let content: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
    ResourcePack::new(uuid, version, Bytes::from(content))
}

pub fn entry(pack: &ResourcePack) -> ResourcePackEntry {
    ResourcePackEntry {
        uuid: pack.uuid().to_string(),
        version: pack.version().to_string(),
        size: pack.size(),
        ..Default::default()
    }
}

pub fn data_info(pack: &ResourcePack, chunk_size: u32) -> ResourcePackDataInfo {
    ResourcePackDataInfo {
        uuid: pack.identifier(),
        data_chunk_size: chunk_size,
        chunk_count: pack.chunk_count(chunk_size).unwrap(),
        size: pack.size(),
        hash: pack.checksum().unwrap().to_vec(),
    }
}

pub fn chunk(pack: &ResourcePack, chunk_size: u32, index: u32) -> ResourcePackChunkData {
    let content = pack.content().unwrap();
    let start = (index * chunk_size) as usize;
    let end = (start + chunk_size as usize).min(content.len());
    ResourcePackChunkData {
        uuid: pack.identifier(),
        chunk_index: index,
        data_offset: start as u64,
        data: content.slice(start..end),
    }
}
