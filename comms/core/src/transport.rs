//  Copyright 2024, The Tari Project
//
//  Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
//  following conditions are met:
//
//  1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
//  disclaimer.
//
//  2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
//  following disclaimer in the documentation and/or other materials provided with the distribution.
//
//  3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
//  products derived from this software without specific prior written permission.
//
//  THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
//  INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
//  DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
//  SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
//  SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
//  WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
//  USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::{fmt, net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use log::*;
use meridian_common::log_if_error;
use meridian_shutdown::{Shutdown, ShutdownSignal};
use tokio::time;

use crate::{
    config::TransportConfig,
    error::TransportError,
    outgoing::{OutgoingConnectionConfig, OutgoingConnectionPool},
    server::{ServerConfig, TransportServer},
    topology::TopologyProvider,
    types::{NodeAddress, RecipientMode, TransportData, TransportPeers},
};

const LOG_TARGET: &str = "comms::tcp::transport";

/// Where an inbound message came from. Socket transports only know the remote socket address, the node address of
/// the sender is part of the message itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrigin {
    Socket(SocketAddr),
    Memory(NodeAddress),
}

impl fmt::Display for MessageOrigin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MessageOrigin::Socket(addr) => write!(f, "{}", addr),
            MessageOrigin::Memory(addr) => write!(f, "memory:{}", addr.short_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageContext {
    pub origin: MessageOrigin,
}

/// Receives inbound payload sets. Called on the transport's reader task, so implementations must not block.
pub trait TransportListener: Send + Sync {
    fn on_transport_message_received(&self, context: MessageContext, payloads: Vec<Bytes>);
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Queues `data` for delivery. Delivery is best effort: a full or disconnected peer queue is not an error.
    async fn send(&self, data: TransportData) -> Result<(), TransportError>;

    fn register_listener(&self, listener: Option<Arc<dyn TransportListener>>);

    /// Re-reads the topology and reconnects accordingly.
    async fn update_topology(&self) -> Result<(), TransportError>;
}

/// Transport over one outgoing TCP connection per peer plus a server accepting the peers' connections.
pub struct DirectTransport {
    config: TransportConfig,
    server: TransportServer,
    pool: Arc<OutgoingConnectionPool>,
    topology_provider: Arc<dyn TopologyProvider>,
    shutdown: Shutdown,
}

impl DirectTransport {
    /// Binds the server, connects to the initial topology and starts the periodic topology updater.
    pub async fn start(
        config: TransportConfig,
        topology_provider: Arc<dyn TopologyProvider>,
    ) -> Result<Self, TransportError> {
        let server = TransportServer::bind(ServerConfig {
            listen_address: config.listen_address,
            network_timeout: config.network_timeout,
            frame_limits: config.frame_limits(),
        })
        .await?;
        let pool = Arc::new(OutgoingConnectionPool::new(
            config.node_address,
            OutgoingConnectionConfig::from(&config),
        ));

        topology_provider.update_topology().await?;
        pool.connect_all(topology_provider.topology(), config.network_timeout)
            .await;

        let shutdown = Shutdown::new();
        tokio::spawn(topology_updater(
            pool.clone(),
            topology_provider.clone(),
            config.topology_update_interval,
            config.network_timeout,
            shutdown.to_signal(),
        ));

        info!(
            target: LOG_TARGET,
            "Transport for node {} started on port {}",
            config.node_address.short_str(),
            server.local_address().port()
        );
        Ok(Self {
            config,
            server,
            pool,
            topology_provider,
            shutdown,
        })
    }

    pub fn node_address(&self) -> NodeAddress {
        self.config.node_address
    }

    pub fn local_port(&self) -> u16 {
        self.server.local_address().port()
    }

    pub fn is_server_listening(&self) -> bool {
        self.server.is_listening()
    }

    pub fn all_outgoing_queues_enabled(&self) -> bool {
        self.pool.all_queues_enabled()
    }

    pub fn topology(&self) -> TransportPeers {
        self.pool.topology()
    }

    /// Stops the topology updater and the server, then disconnects every peer. Each wait is bounded by `deadline`.
    pub async fn graceful_shutdown(&self, deadline: Duration) {
        info!(target: LOG_TARGET, "Shutting down transport");
        self.shutdown.trigger();
        self.server.shutdown();
        self.pool.graceful_shutdown(deadline).await;
        self.server.wait_until_shutdown(deadline).await;
    }
}

#[async_trait]
impl Transport for DirectTransport {
    async fn send(&self, data: TransportData) -> Result<(), TransportError> {
        data.check_size()?;
        self.config.frame_limits().check_payloads(&data.payloads)?;
        match data.recipient_mode {
            RecipientMode::Broadcast => {
                self.pool.broadcast(&data.payloads);
                Ok(())
            },
            RecipientMode::List => self.pool.send_to(&data.recipients, &data.payloads),
            RecipientMode::AllButList => Err(TransportError::Unimplemented("AllButList")),
        }
    }

    fn register_listener(&self, listener: Option<Arc<dyn TransportListener>>) {
        self.server.register_listener(listener);
    }

    async fn update_topology(&self) -> Result<(), TransportError> {
        self.topology_provider.update_topology().await?;
        self.pool
            .update_topology(self.topology_provider.topology(), self.config.network_timeout)
            .await;
        Ok(())
    }
}

async fn topology_updater(
    pool: Arc<OutgoingConnectionPool>,
    provider: Arc<dyn TopologyProvider>,
    interval: Duration,
    disconnect_deadline: Duration,
    mut shutdown_signal: ShutdownSignal,
) {
    // A zero period would make the ticker panic
    let interval = interval.max(Duration::from_millis(100));
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = shutdown_signal.wait() => break,
            _ = ticker.tick() => {
                if log_if_error!(
                    target: LOG_TARGET,
                    provider.update_topology().await,
                    "Failed to update topology: {}"
                )
                .is_some()
                {
                    pool.update_topology(provider.topology(), disconnect_deadline).await;
                }
            },
        }
    }
    debug!(target: LOG_TARGET, "Topology updater stopped");
}
