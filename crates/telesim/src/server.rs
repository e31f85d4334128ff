//! `TelesimServer` builder and accept loop.
//!
//! Ties the layers together: WebSocket transport → JSON codec → engine
//! (lifecycle + scheduler) → broadcast hub.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use telesim_protocol::{Codec, JsonCodec};
use telesim_store::Storage;
use telesim_transport::{Transport, WebSocketTransport};
use tokio_util::sync::CancellationToken;

use crate::handler::handle_connection;
use crate::{Engine, EngineConfig, TelesimError};

/// Shared state passed to each connection handler task.
pub(crate) struct ServerState<S: Storage, C: Codec> {
    pub(crate) engine: Engine<S>,
    pub(crate) codec: C,
}

/// Builder for configuring and starting a Telesim server.
///
/// # Example
///
/// ```rust,ignore
/// use telesim::prelude::*;
///
/// let server = TelesimServerBuilder::new()
///     .bind("0.0.0.0:15233")
///     .build(MemoryStore::new())
///     .await?;
/// server.run(CancellationToken::new()).await
/// ```
pub struct TelesimServerBuilder {
    bind_addr: String,
    config: EngineConfig,
}

impl TelesimServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:15233".to_string(),
            config: EngineConfig::default(),
        }
    }

    /// Sets the address to listen on. Port 0 lets the OS choose.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick.interval = interval;
        self
    }

    /// Binds the listener and builds the engine over `storage`.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<S: Storage>(self, storage: S) -> Result<TelesimServer<S, JsonCodec>, TelesimError> {
        let Self { bind_addr, config } = self;
        let engine = Engine::builder(storage).config(config).build();
        serve(&bind_addr, engine).await
    }

    /// Like [`build`](Self::build) but serves an engine the caller
    /// already configured (custom clock, phase source, hub).
    pub async fn build_with_engine<S: Storage>(
        self,
        engine: Engine<S>,
    ) -> Result<TelesimServer<S, JsonCodec>, TelesimError> {
        serve(&self.bind_addr, engine).await
    }
}

async fn serve<S: Storage>(
    bind_addr: &str,
    engine: Engine<S>,
) -> Result<TelesimServer<S, JsonCodec>, TelesimError> {
    let transport = WebSocketTransport::bind(bind_addr).await?;
    Ok(TelesimServer {
        transport,
        state: Arc::new(ServerState {
            engine,
            codec: JsonCodec,
        }),
    })
}

impl Default for TelesimServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Telesim server.
///
/// Call [`run()`](Self::run) to start the scheduler and accept
/// subscribers.
pub struct TelesimServer<S: Storage, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<S, C>>,
}

impl<S, C> TelesimServer<S, C>
where
    S: Storage,
    C: Codec,
{
    pub fn local_addr(&self) -> Result<SocketAddr, TelesimError> {
        Ok(self.transport.local_addr()?)
    }

    pub fn engine(&self) -> &Engine<S> {
        &self.state.engine
    }

    /// Runs the scheduler and the accept loop until `cancel` fires.
    ///
    /// On cancellation, open connections are closed, the scheduler stops
    /// every running session, and the hub shuts down.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), TelesimError> {
        let scheduler = self.state.engine.spawn_scheduler(cancel.child_token());
        tracing::info!(addr = ?self.transport.local_addr().ok(), "Telesim server running");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        let conn_cancel = cancel.child_token();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state, conn_cancel).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        if let Err(e) = scheduler.await {
            tracing::error!(error = %e, "scheduler task failed");
        }
        if let Err(e) = self.state.engine.hub().shutdown().await {
            tracing::debug!(error = %e, "hub already stopped");
        }
        tracing::info!("Telesim server stopped");
        Ok(())
    }
}
