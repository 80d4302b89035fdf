//! `DrawbridgeServer` builder and the engine loop.
//!
//! Two tasks run for the life of the server. The accept loop registers
//! each new connection and starts its reader and writer. The engine loop
//! owns game time: it ticks the registry, sweeps it, and applies finished
//! identity lookups. It is the only place sessions are promoted to play.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

use drawbridge_identity::{IdentityService, SessionServerClient};
use drawbridge_protocol::DisconnectReason;
use drawbridge_session::{ServerContext, ServerKey, Session, reason};
use drawbridge_tick::{TickConfig, TickScheduler};
use drawbridge_transport::{Connection, TcpTransport, Transport, TransportError};

use crate::DrawbridgeError;
use crate::config::ServerConfig;
use crate::connection::SessionHandle;
use crate::gameplay::Gameplay;
use crate::handler::spawn_connection;
use crate::registry::Registry;
use crate::verifier::{VerificationOutcome, Verifier};

/// How long shutdown waits for writers to flush their final frames.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(2);

/// Pause after a failed accept, so a persistent error (out of file
/// descriptors, say) does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Builder for a [`DrawbridgeServer`].
///
/// # Example
///
/// ```rust,ignore
/// let server = DrawbridgeServerBuilder::new()
///     .config(ServerConfig::from_file("drawbridge.toml")?)
///     .build(MyGameplay::new())
///     .await?;
/// server.run().await
/// ```
pub struct DrawbridgeServerBuilder {
    config: ServerConfig,
    identity: Option<Arc<dyn IdentityService>>,
    key: Option<Arc<ServerKey>>,
}

impl DrawbridgeServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            identity: None,
            key: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the listen address. Apply after [`config`](Self::config).
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    /// Uses `service` for identity lookups instead of the HTTP session
    /// service named in the config.
    pub fn identity_service(mut self, service: impl IdentityService) -> Self {
        self.identity = Some(Arc::new(service));
        self
    }

    /// Uses an existing key instead of generating one at build time.
    pub fn server_key(mut self, key: Arc<ServerKey>) -> Self {
        self.key = Some(key);
        self
    }

    /// Validates the config, binds a TCP listener and builds the server.
    pub async fn build<G: Gameplay>(
        self,
        gameplay: G,
    ) -> Result<DrawbridgeServer<TcpTransport, G>, DrawbridgeError> {
        self.config.validate_strict()?;
        let transport = TcpTransport::bind(&self.config.bind).await?;
        let local_addr = transport.local_addr()?;
        let mut server = self.build_with_transport(transport, gameplay)?;
        server.local_addr = Some(local_addr);
        Ok(server)
    }

    /// Builds the server over any transport.
    ///
    /// Generates the RSA key unless one was supplied, which takes a
    /// noticeable moment at larger key sizes.
    pub fn build_with_transport<T, G>(
        self,
        transport: T,
        gameplay: G,
    ) -> Result<DrawbridgeServer<T, G>, DrawbridgeError>
    where
        T: Transport,
        T::Connection: Connection<Error = TransportError>,
        G: Gameplay,
    {
        self.config.validate_strict()?;

        let key = match self.key {
            Some(key) => key,
            None => Arc::new(ServerKey::generate(self.config.login.key_bits)?),
        };
        let identity = match self.identity {
            Some(identity) => identity,
            None => Arc::new(
                SessionServerClient::new(
                    self.config.session_server_url.clone(),
                    self.config.verification_timeout(),
                )
                .with_client_ip(self.config.prevent_proxy_connections),
            ),
        };

        let ctx = ServerContext::new(self.config.login.clone(), key);
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let verifier = Verifier::new(identity, self.config.verification_workers, completions_tx);
        let (shutdown, _) = watch::channel(false);

        Ok(DrawbridgeServer {
            transport,
            local_addr: None,
            registry: Arc::new(Registry::new(ctx.clone())),
            config: self.config,
            ctx,
            verifier,
            completions,
            gameplay,
            shutdown: Arc::new(shutdown),
        })
    }
}

impl Default for DrawbridgeServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Stops a running server from another task.
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: Arc<watch::Sender<bool>>,
    registry: Arc<Registry>,
}

impl ServerHandle {
    /// Stops accepting, closes every session with "Server closed", and
    /// lets [`DrawbridgeServer::run`] return once writers have flushed.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// A configured server. Call [`run`](Self::run) to start it.
pub struct DrawbridgeServer<T: Transport, G: Gameplay> {
    transport: T,
    local_addr: Option<SocketAddr>,
    config: ServerConfig,
    ctx: ServerContext,
    registry: Arc<Registry>,
    verifier: Verifier,
    completions: mpsc::UnboundedReceiver<VerificationOutcome>,
    gameplay: G,
    shutdown: Arc<watch::Sender<bool>>,
}

impl<T, G> DrawbridgeServer<T, G>
where
    T: Transport,
    T::Connection: Connection<Error = TransportError>,
    G: Gameplay,
{
    /// The bound address, when the server owns a TCP listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: Arc::clone(&self.shutdown),
            registry: Arc::clone(&self.registry),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn public_key_der(&self) -> &[u8] {
        self.ctx.key.public_der()
    }

    /// Runs until [`ServerHandle::shutdown`] is called.
    pub async fn run(self) -> Result<(), DrawbridgeError> {
        let Self {
            transport,
            local_addr,
            config,
            ctx,
            registry,
            verifier,
            mut completions,
            gameplay,
            shutdown,
        } = self;

        tracing::info!(
            addr = ?local_addr,
            online_mode = ctx.config.online_mode,
            protocol = ctx.config.protocol_version,
            "drawbridge server running"
        );

        let accept_task = tokio::spawn(accept_loop(
            transport,
            Arc::clone(&registry),
            ctx.clone(),
            verifier,
            shutdown.subscribe(),
        ));

        let mut stop = shutdown.subscribe();
        let mut scheduler = TickScheduler::new(TickConfig::with_rate(config.tick_rate_hz));
        let mut sweep = tokio::time::interval(config.sweep_interval());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = scheduler.wait_for_tick() => {
                    registry.tick(&gameplay);
                    scheduler.record_tick_end();
                }
                _ = sweep.tick() => registry.sweep(),
                Some(outcome) = completions.recv() => registry.deliver(outcome),
                _ = stop.wait_for(|stopped| *stopped) => break,
            }
        }

        tracing::info!(sessions = registry.len(), "shutting down");
        registry.close_all(&DisconnectReason::new(reason::SERVER_CLOSED));

        let deadline = Instant::now() + SHUTDOWN_DRAIN;
        while !registry.is_empty() && Instant::now() < deadline {
            sweep.tick().await;
            registry.sweep();
        }
        if !registry.is_empty() {
            tracing::warn!(remaining = registry.len(), "shutdown drain timed out");
        }

        if let Err(e) = accept_task.await {
            tracing::warn!(error = %e, "accept loop ended abnormally");
        }
        tracing::info!(ticks = scheduler.tick_count(), "drawbridge server stopped");
        Ok(())
    }
}

async fn accept_loop<T>(
    mut transport: T,
    registry: Arc<Registry>,
    ctx: ServerContext,
    verifier: Verifier,
    mut stop: watch::Receiver<bool>,
) where
    T: Transport,
    T::Connection: Connection<Error = TransportError>,
{
    loop {
        let accepted = tokio::select! {
            accepted = transport.accept() => accepted,
            _ = stop.wait_for(|stopped| *stopped) => break,
        };

        match accepted {
            Ok(conn) => {
                let session = Session::new(conn.id(), conn.peer_addr(), &ctx.config);
                let handle = SessionHandle::new(session);
                tracing::debug!(id = %handle.id(), peer = ?conn.peer_addr(), "connection registered");
                registry.insert(Arc::clone(&handle));
                spawn_connection(conn, handle, ctx.clone(), verifier.clone());
            }
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    if let Err(e) = transport.shutdown().await {
        tracing::debug!(error = %e, "transport shutdown failed");
    }
}
