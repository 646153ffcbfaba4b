//! Server builder and accept loop.
//!
//! The [`ServerBuilder`] wires the ledger, connection registry and settlement
//! barrier together and binds the listener. The [`Server`] then:
//! 1. Accepts agency connections
//! 2. Spawns one [`ConnectionHandler`] task per connection
//! 3. Stops accepting on shutdown and waits for handlers to drain
//!
//! # Example
//!
//! ```ignore
//! use lottery_intake::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = Server::builder(ServerConfig::load(None)?).bind().await?;
//!     let trigger = server.shutdown_trigger();
//!
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         trigger.trigger();
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

mod handler;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::ServerConfig;
use crate::error::{LotteryError, Result};
use crate::ledger::{BetLedger, CsvLedger};
use crate::settlement::{ConnectionRegistry, SettlementBarrier};
use crate::shutdown::ShutdownTrigger;
use crate::transport::AgencyListener;

pub use handler::ConnectionHandler;

/// Default maximum concurrently served connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 256;

/// State shared by every connection handler.
pub struct ServerContext {
    pub ledger: Arc<dyn BetLedger>,
    pub registry: Arc<ConnectionRegistry>,
    pub barrier: Arc<SettlementBarrier>,
    /// Largest SUBMIT_BATCH payload accepted.
    pub max_batch_bytes: u32,
}

impl ServerContext {
    /// Build the registry and barrier for `config` around `ledger`.
    pub fn new(config: &ServerConfig, ledger: Arc<dyn BetLedger>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.agency_count));
        let barrier = Arc::new(SettlementBarrier::new(
            config.winning_number,
            ledger.clone(),
            registry.clone(),
        ));
        Self {
            ledger,
            registry,
            barrier,
            max_batch_bytes: config.max_batch_bytes,
        }
    }
}

/// Builder for configuring and binding a [`Server`].
pub struct ServerBuilder {
    config: ServerConfig,
    ledger: Option<Arc<dyn BetLedger>>,
    listen_addr: Option<SocketAddr>,
    max_connections: usize,
}

impl ServerBuilder {
    /// Create a builder from a loaded configuration.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            ledger: None,
            listen_addr: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Use `ledger` instead of opening the CSV file at `config.ledger_path`.
    pub fn ledger(mut self, ledger: Arc<dyn BetLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Bind to `addr` instead of `0.0.0.0:<port>`.
    pub fn listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = Some(addr);
        self
    }

    /// Set the maximum number of connections served at once.
    ///
    /// Further connections wait in the accept backlog until a slot frees.
    /// Must be at least `agency_count`: every agency holds its slot while it
    /// waits for the draw.
    /// Default: 256
    pub fn max_connections(mut self, limit: usize) -> Self {
        self.max_connections = limit.max(1);
        self
    }

    /// Validate the configuration, open the ledger and bind the listener.
    pub async fn bind(self) -> Result<Server> {
        self.config.validate()?;
        if self.max_connections < usize::from(self.config.agency_count) {
            return Err(LotteryError::Config(format!(
                "max_connections {} is below agency_count {}",
                self.max_connections, self.config.agency_count
            )));
        }

        let ledger: Arc<dyn BetLedger> = match self.ledger {
            Some(ledger) => ledger,
            None => {
                let csv = CsvLedger::open(&self.config.ledger_path).await?;
                tracing::info!(path = %csv.path().display(), "ledger opened");
                Arc::new(csv)
            }
        };

        let addr = self.listen_addr.unwrap_or_else(|| self.config.listen_addr());
        let listener = AgencyListener::bind(addr, self.config.listen_backlog).await?;
        let context = Arc::new(ServerContext::new(&self.config, ledger));

        tracing::info!(
            addr = %listener.local_addr()?,
            agencies = self.config.agency_count,
            winning_number = self.config.winning_number,
            "server listening"
        );

        Ok(Server {
            listener,
            context,
            shutdown: Arc::new(ShutdownTrigger::new()),
            connections: Arc::new(Semaphore::new(self.max_connections)),
        })
    }
}

/// A bound lottery intake server.
pub struct Server {
    listener: AgencyListener,
    context: Arc<ServerContext>,
    shutdown: Arc<ShutdownTrigger>,
    connections: Arc<Semaphore>,
}

impl Server {
    /// Create a new server builder.
    pub fn builder(config: ServerConfig) -> ServerBuilder {
        ServerBuilder::new(config)
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Trigger that stops the accept loop and releases blocked handlers.
    pub fn shutdown_trigger(&self) -> Arc<ShutdownTrigger> {
        self.shutdown.clone()
    }

    /// Shared handler state.
    pub fn context(&self) -> Arc<ServerContext> {
        self.context.clone()
    }

    /// Accept connections until shutdown, then wait for handlers to finish.
    pub async fn run(self) -> Result<()> {
        let Server {
            listener,
            context,
            shutdown: trigger,
            connections,
        } = self;
        let mut shutdown = trigger.subscribe();
        let mut handlers = JoinSet::new();

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = connections.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    log_join(joined);
                    continue;
                }
            };

            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                    continue;
                }
            };

            tracing::debug!(peer = %peer, "connection accepted");
            let handler = ConnectionHandler::new(
                stream,
                peer.to_string(),
                context.clone(),
                trigger.subscribe(),
            );
            handlers.spawn(async move {
                let _permit = permit;
                handler.run().await
            });
        }

        drop(listener);
        tracing::info!(active = handlers.len(), "shutting down, draining connections");
        while let Some(joined) = handlers.join_next().await {
            log_join(joined);
        }

        if let Some(reason) = context.barrier.failure().await {
            tracing::error!(reason = %reason, "round failed");
        } else if !context.barrier.is_computed().await {
            let arrived = context.barrier.arrived_count().await;
            tracing::warn!(
                arrived = arrived,
                required = context.registry.agency_count(),
                "stopped before every agency reported; no draw took place"
            );
        }
        tracing::info!("server stopped");
        Ok(())
    }
}

fn log_join(joined: std::result::Result<Result<()>, tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "connection task panicked");
    }
}
