//! Dialing a Bedrock server.
//!
//! [`Dialer`] holds everything that shapes a session before it exists: the identity
//! to present, optional account credentials, hooks, and the transport factory.

use crate::config::{ClientConfig, NetworkConfig, TransportConfig, PROTOCOL_VERSION};
use crate::core::codec::{BatchDecoder, BatchEncoder};
use crate::core::packet::Login;
use crate::core::registry::PacketRegistry;
use crate::error::{ProtocolError, Result};
use crate::protocol::auth::{auth_chain, Authenticator, Credentials};
use crate::protocol::login::{
    authenticated_chain, encode_request, identity_from_chain, offline_identity,
    self_signed_chain, Chain, ClientData, IdentityData,
};
use crate::service::connection::{Connection, SessionParts};
use crate::service::observer::{ErrorSink, PacketObserver};
use crate::transport::{Connector, NetConnector, Network};
use crate::utils::metrics::Timer;
use crate::utils::timeout::with_timeout_error;
use p384::ecdsa::SigningKey;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Connects to servers and completes login.
///
/// The default dialer logs in offline with generated client data over the
/// standard-library networks.
///
/// ```rust,no_run
/// use bedrock_client::service::Dialer;
///
/// # async fn run() -> bedrock_client::error::Result<()> {
/// let conn = Dialer::default()
///     .with_chunk_radius(8)
///     .dial("tcp", "127.0.0.1:19132")
///     .await?;
/// let packet = conn.read_packet().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Dialer {
    /// Client data sent in the login request; generated when unset
    pub client_data: Option<ClientData>,
    /// Account to authenticate; offline login when unset
    pub credentials: Option<Credentials>,
    /// Runs the account token exchange; required with `credentials`
    pub authenticator: Option<Arc<dyn Authenticator>>,
    pub error_sink: Option<ErrorSink>,
    pub packet_observer: Option<PacketObserver>,
    pub connector: Arc<dyn Connector>,
    pub config: ClientConfig,
    pub transport: TransportConfig,
    /// Seed for generated client data and identity
    pub seed: Option<u64>,
    pub registry: Arc<PacketRegistry>,
}

impl Default for Dialer {
    fn default() -> Self {
        Self {
            client_data: None,
            credentials: None,
            authenticator: None,
            error_sink: None,
            packet_observer: None,
            connector: Arc::new(NetConnector::default()),
            config: ClientConfig::default(),
            transport: TransportConfig::default(),
            seed: None,
            registry: Arc::new(PacketRegistry::default()),
        }
    }
}

impl std::fmt::Debug for Dialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialer")
            .field("client_data", &self.client_data.is_some())
            .field("credentials", &self.credentials)
            .field("authenticator", &self.authenticator.is_some())
            .field("error_sink", &self.error_sink.is_some())
            .field("packet_observer", &self.packet_observer.is_some())
            .field("config", &self.config)
            .field("transport", &self.transport)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

impl Dialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dialer configured from a loaded [`NetworkConfig`]
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self {
            connector: Arc::new(NetConnector::new(config.transport.max_payload_size)),
            config: config.client.clone(),
            transport: config.transport.clone(),
            ..Self::default()
        }
    }

    pub fn with_client_data(mut self, client_data: ClientData) -> Self {
        self.client_data = Some(client_data);
        self
    }

    pub fn with_credentials(
        mut self,
        credentials: Credentials,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        self.credentials = Some(credentials);
        self.authenticator = Some(authenticator);
        self
    }

    pub fn with_error_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&ProtocolError) + Send + Sync + 'static,
    {
        self.error_sink = Some(Arc::new(sink));
        self
    }

    pub fn with_packet_observer(mut self, observer: PacketObserver) -> Self {
        self.packet_observer = Some(observer);
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_chunk_radius(mut self, chunk_radius: i32) -> Self {
        self.config.chunk_radius = chunk_radius;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_registry(mut self, registry: Arc<PacketRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Connect to `address` over `network` and log in.
    ///
    /// Returns once the server has completed the encryption handshake, or has
    /// acknowledged the login without one. If the session closes first, for any
    /// reason, the error is `ConnectionTimeout`; the error sink receives the cause.
    /// Transport and authentication failures before the login is sent are
    /// returned as they are.
    #[instrument(skip(self))]
    pub async fn dial(&self, network: &str, address: &str) -> Result<Connection> {
        let _timer = Timer::start("dial");
        let network: Network = network.parse()?;
        let compression = self.transport.compression_kind()?;
        let transport = self.connector.connect(network, address).await?;
        debug!(remote = %transport.remote_addr(), "Transport connected");

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let signing_key = SigningKey::random(&mut rand_core::OsRng);
        let client_data = self.client_data.clone().unwrap_or_else(|| {
            ClientData::generate(address, &self.config.language_code, &mut rng)
        });

        let login = async {
            let (chain, identity_data) =
                self.login_chain(&signing_key, &client_data, &mut rng).await?;
            let request = encode_request(&chain, &client_data, &signing_key)?;
            Ok::<_, ProtocolError>((request, identity_data))
        };
        let (request, identity_data) = match login.await {
            Ok(login) => login,
            Err(e) => {
                if let Err(close) = transport.close().await {
                    warn!(error = %close, "Failed to close transport");
                }
                return Err(e);
            }
        };

        let encoder = BatchEncoder::new(compression, self.transport.compression_level);
        let decoder = BatchDecoder::new(compression, self.registry.clone()).with_limits(
            self.transport.max_payload_size,
            self.transport.max_batch_packets,
        );

        let parts = SessionParts {
            signing_key,
            client_data,
            identity_data,
            chunk_radius: self.config.chunk_radius,
            transport_config: self.transport.clone(),
            observer: self.packet_observer.clone(),
            error_sink: self.error_sink.clone(),
        };
        let conn = Connection::start(transport, parts, decoder, encoder)?;

        conn.write_packet(
            Login {
                client_protocol: PROTOCOL_VERSION,
                connection_request: request,
            }
            .into(),
        )
        .await?;

        if conn.wait_connected().await {
            info!(remote = %conn.remote_addr(), "Logged in");
            Ok(conn)
        } else {
            warn!(
                reason = conn.close_reason().unwrap_or("connection closed"),
                "Session closed before login completed"
            );
            Err(ProtocolError::ConnectionTimeout)
        }
    }

    /// [`dial`](Self::dial) bounded by the configured connection timeout
    pub async fn dial_timeout(&self, network: &str, address: &str) -> Result<Connection> {
        with_timeout_error(self.dial(network, address), self.config.connection_timeout).await
    }

    /// The login chain and the identity it carries
    async fn login_chain(
        &self,
        key: &SigningKey,
        client_data: &ClientData,
        rng: &mut StdRng,
    ) -> Result<(Chain, IdentityData)> {
        let Some(credentials) = &self.credentials else {
            let identity = offline_identity(client_data, rng);
            let chain = self_signed_chain(&identity, key)?;
            return Ok((chain, identity));
        };
        let authenticator = self.authenticator.as_ref().ok_or_else(|| {
            ProtocolError::ConfigError("Credentials given without an authenticator".into())
        })?;

        let chain_data = auth_chain(authenticator.as_ref(), credentials, key.verifying_key()).await?;
        let chain = authenticated_chain(&chain_data, key)?;
        let identity = identity_from_chain(&chain)?;
        Ok((chain, identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_copies_settings() {
        let config = NetworkConfig::default_with_overrides(|c| {
            c.client.chunk_radius = 4;
            c.transport.compression = "zstd".into();
        });
        let dialer = Dialer::from_config(&config);
        assert_eq!(dialer.config.chunk_radius, 4);
        assert_eq!(dialer.transport.compression, "zstd");
        assert!(dialer.credentials.is_none());
    }

    #[test]
    fn test_debug_hides_password() {
        struct NoAuth;
        impl Authenticator for NoAuth {
            fn live_token<'a>(
                &'a self,
                _: &'a Credentials,
            ) -> futures::future::BoxFuture<'a, std::result::Result<String, crate::error::BoxError>>
            {
                Box::pin(async { Err("unused".into()) })
            }
            fn xsts_token<'a>(
                &'a self,
                _: &'a str,
            ) -> futures::future::BoxFuture<'a, std::result::Result<String, crate::error::BoxError>>
            {
                Box::pin(async { Err("unused".into()) })
            }
            fn minecraft_chain<'a>(
                &'a self,
                _: &'a str,
                _: &'a p384::ecdsa::VerifyingKey,
            ) -> futures::future::BoxFuture<'a, std::result::Result<String, crate::error::BoxError>>
            {
                Box::pin(async { Err("unused".into()) })
            }
        }

        let dialer = Dialer::new()
            .with_credentials(Credentials::new("a@b.c", "hunter2"), Arc::new(NoAuth));
        let debug = format!("{dialer:?}");
        assert!(!debug.contains("hunter2"), "password leaked: {debug}");
    }

    #[tokio::test]
    async fn test_unknown_network_rejected() {
        let result = Dialer::new().dial("udp", "127.0.0.1:19132").await;
        assert!(matches!(result, Err(ProtocolError::UnsupportedNetwork(_))));
    }

    #[tokio::test]
    async fn test_bad_compression_rejected_before_connecting() {
        use crate::transport::Transport;
        use std::sync::atomic::{AtomicUsize, Ordering};

        #[derive(Default)]
        struct CountingConnector(AtomicUsize);
        impl Connector for CountingConnector {
            fn connect<'a>(
                &'a self,
                _: Network,
                _: &'a str,
            ) -> futures::future::BoxFuture<'a, Result<Box<dyn Transport>>> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Err(ProtocolError::ConnectionClosed) })
            }
        }

        let connector = Arc::new(CountingConnector::default());
        let config = NetworkConfig::default_with_overrides(|c| {
            c.transport.compression = "brotli".into();
        });
        let result = Dialer::from_config(&config)
            .with_connector(connector.clone())
            .dial("tcp", "127.0.0.1:19132")
            .await;

        assert!(matches!(result, Err(ProtocolError::ConfigError(_))));
        assert_eq!(connector.0.load(Ordering::SeqCst), 0, "no transport was opened");
    }

    #[tokio::test]
    async fn test_raknet_needs_connector() {
        let result = Dialer::new().dial("raknet", "127.0.0.1:19132").await;
        assert!(matches!(result, Err(ProtocolError::UnsupportedNetwork(_))));
    }
}
