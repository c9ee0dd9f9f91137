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

use std::{
    collections::HashMap,
    sync::{Mutex, RwLock},
    time::Duration,
};

use bytes::Bytes;
use futures::future;
use log::*;
use tokio::time;

use super::connection::{ConnectionHandle, OutgoingConnection, OutgoingConnectionConfig};
use crate::{
    error::TransportError,
    metrics,
    topology::peer_diff,
    types::{NodeAddress, TransportPeers},
};

const LOG_TARGET: &str = "comms::tcp::pool";

/// Outgoing connections keyed by node address, kept in line with the topology.
pub struct OutgoingConnectionPool {
    node_address: NodeAddress,
    config: OutgoingConnectionConfig,
    connections: RwLock<HashMap<NodeAddress, OutgoingConnection>>,
    topology: Mutex<TransportPeers>,
}

impl OutgoingConnectionPool {
    pub fn new(node_address: NodeAddress, config: OutgoingConnectionConfig) -> Self {
        Self {
            node_address,
            config,
            connections: RwLock::new(HashMap::new()),
            topology: Mutex::new(TransportPeers::new()),
        }
    }

    /// Connects to every peer in `peers`. Equivalent to a topology update from an empty topology.
    pub async fn connect_all(&self, peers: TransportPeers, deadline: Duration) {
        self.update_topology(peers, deadline).await;
    }

    /// Applies a new topology. Removed and changed peers are disconnected (waiting at most `deadline`) before added
    /// and changed peers are connected. If this node is absent from `new_peers` every connection is dropped.
    pub async fn update_topology(&self, new_peers: TransportPeers, deadline: Duration) {
        if !new_peers.contains_key(&self.node_address) {
            warn!(
                target: LOG_TARGET,
                "This node ({}) is not in the new topology, disconnecting from all peers",
                self.node_address.short_str()
            );
            // Forget the old topology so that readmission reconnects everyone
            acquire_lock!(self.topology).clear();
            self.disconnect_all(deadline).await;
            return;
        }

        let old_peers = acquire_lock!(self.topology).clone();
        let (to_remove, to_add) = peer_diff(&old_peers, &new_peers);
        if to_remove.is_empty() && to_add.is_empty() {
            trace!(target: LOG_TARGET, "Topology unchanged");
            return;
        }
        debug!(
            target: LOG_TARGET,
            "Topology changed: disconnecting {} peer(s), connecting {} peer(s)",
            to_remove.len(),
            to_add.len()
        );

        let handles = {
            let mut connections = acquire_write_lock!(self.connections);
            to_remove
                .iter()
                .filter_map(|peer| connections.remove(&peer.node_address))
                .map(|conn| conn.disconnect())
                .collect::<Vec<_>>()
        };
        wait_for_disconnects(handles, deadline).await;

        {
            let mut connections = acquire_write_lock!(self.connections);
            for peer in to_add {
                if peer.node_address == self.node_address {
                    continue;
                }
                debug!(target: LOG_TARGET, "Connecting to {}", peer);
                let conn = OutgoingConnection::spawn(peer.clone(), self.config.clone());
                if let Some(old) = connections.insert(peer.node_address, conn) {
                    let _handle = old.disconnect();
                }
            }
        }
        *acquire_lock!(self.topology) = new_peers;
    }

    pub async fn disconnect_all(&self, deadline: Duration) {
        let handles = acquire_write_lock!(self.connections)
            .drain()
            .map(|(_, conn)| conn.disconnect())
            .collect::<Vec<_>>();
        wait_for_disconnects(handles, deadline).await;
    }

    pub async fn graceful_shutdown(&self, deadline: Duration) {
        acquire_lock!(self.topology).clear();
        self.disconnect_all(deadline).await;
    }

    /// Queues `payloads` for every connected peer except this node.
    pub fn broadcast(&self, payloads: &[Bytes]) {
        let connections = acquire_read_lock!(self.connections);
        for (address, conn) in connections.iter() {
            if *address == self.node_address {
                continue;
            }
            self.enqueue(conn, payloads);
        }
    }

    /// Queues `payloads` for each recipient. Fails without queueing anything if any recipient has no connection.
    pub fn send_to(&self, recipients: &[NodeAddress], payloads: &[Bytes]) -> Result<(), TransportError> {
        let connections = acquire_read_lock!(self.connections);
        let targets = recipients
            .iter()
            .map(|address| {
                connections
                    .get(address)
                    .ok_or(TransportError::UnknownRecipient(*address))
            })
            .collect::<Result<Vec<_>, _>>()?;
        for conn in targets {
            self.enqueue(conn, payloads);
        }
        Ok(())
    }

    fn enqueue(&self, conn: &OutgoingConnection, payloads: &[Bytes]) {
        if let Err(err) = conn.send(payloads.to_vec()) {
            metrics::enqueue_failures(&conn.peer().node_address).inc();
            debug!(target: LOG_TARGET, "Failed to queue message for {}: {}", conn.peer(), err);
        }
    }

    pub fn is_connected_to(&self, address: &NodeAddress) -> bool {
        acquire_read_lock!(self.connections).contains_key(address)
    }

    pub fn connected_peers(&self) -> Vec<NodeAddress> {
        acquire_read_lock!(self.connections).keys().copied().collect()
    }

    /// True once every connection has an established socket.
    pub fn all_queues_enabled(&self) -> bool {
        acquire_read_lock!(self.connections)
            .values()
            .all(|conn| conn.is_queue_enabled())
    }

    pub fn topology(&self) -> TransportPeers {
        acquire_lock!(self.topology).clone()
    }
}

async fn wait_for_disconnects(handles: Vec<ConnectionHandle>, deadline: Duration) {
    if handles.is_empty() {
        return;
    }
    let num_handles = handles.len();
    let all_exited = future::join_all(handles.into_iter().map(ConnectionHandle::wait));
    if time::timeout(deadline, all_exited).await.is_err() {
        warn!(
            target: LOG_TARGET,
            "{} connection(s) did not stop within {:.2?}, continuing",
            num_handles,
            deadline
        );
    }
}

#[cfg(test)]
mod test {
    use meridian_test_utils::net::bind_local;
    use tokio::net::TcpListener;

    use super::*;
    use crate::types::{peers_to_topology, Peer};

    const DEADLINE: Duration = Duration::from_secs(5);

    fn config() -> OutgoingConnectionConfig {
        OutgoingConnectionConfig {
            network_timeout: Duration::from_secs(5),
            reconnect_interval: Duration::from_millis(50),
            keepalive_interval: Duration::from_secs(10),
            send_queue_max_messages: 10,
            send_queue_max_bytes: 1024,
        }
    }

    fn address(byte: u8) -> NodeAddress {
        NodeAddress::from_bytes([byte; 20])
    }

    async fn listening_peer(byte: u8) -> (TcpListener, Peer) {
        let (listener, addr) = bind_local().await;
        (listener, Peer::new(address(byte), "127.0.0.1", addr.port()))
    }

    #[tokio::test]
    async fn never_connects_to_self() {
        let (_l1, me) = listening_peer(1).await;
        let (_l2, other) = listening_peer(2).await;
        let pool = OutgoingConnectionPool::new(address(1), config());
        pool.connect_all(peers_to_topology(vec![me, other]), DEADLINE).await;
        assert_eq!(pool.connected_peers(), vec![address(2)]);
        pool.graceful_shutdown(DEADLINE).await;
        assert!(pool.connected_peers().is_empty());
    }

    #[tokio::test]
    async fn applies_topology_diff() {
        let (_l1, me) = listening_peer(1).await;
        let (_l2, two) = listening_peer(2).await;
        let (_l3, three) = listening_peer(3).await;
        let (_l4, four) = listening_peer(4).await;
        let pool = OutgoingConnectionPool::new(address(1), config());
        pool.update_topology(peers_to_topology(vec![me.clone(), two.clone(), three]), DEADLINE)
            .await;

        let (_l3b, three_moved) = listening_peer(3).await;
        pool.update_topology(
            peers_to_topology(vec![me, three_moved.clone(), four]),
            DEADLINE,
        )
        .await;
        let mut connected = pool.connected_peers();
        connected.sort();
        assert_eq!(connected, vec![address(3), address(4)]);
        assert_eq!(pool.topology().get(&address(3)), Some(&three_moved));
        assert!(!pool.is_connected_to(&two.node_address));
        pool.graceful_shutdown(DEADLINE).await;
    }

    #[tokio::test]
    async fn self_eviction_disconnects_everything() {
        let (_l1, me) = listening_peer(1).await;
        let (_l2, two) = listening_peer(2).await;
        let pool = OutgoingConnectionPool::new(address(1), config());
        pool.update_topology(peers_to_topology(vec![me.clone(), two.clone()]), DEADLINE)
            .await;
        assert!(pool.is_connected_to(&address(2)));

        pool.update_topology(peers_to_topology(vec![two.clone()]), DEADLINE).await;
        assert!(pool.connected_peers().is_empty());

        // Readmission reconnects peers that did not change
        pool.update_topology(peers_to_topology(vec![me, two]), DEADLINE).await;
        assert!(pool.is_connected_to(&address(2)));
        pool.graceful_shutdown(DEADLINE).await;
    }

    #[tokio::test]
    async fn send_to_unknown_recipient_queues_nothing() {
        let (l1, me) = listening_peer(1).await;
        let (l2, two) = listening_peer(2).await;
        let pool = OutgoingConnectionPool::new(address(1), config());
        pool.connect_all(peers_to_topology(vec![me, two]), DEADLINE).await;
        let _socket = l2.accept().await.unwrap();
        meridian_test_utils::async_assert_eventually!(pool.all_queues_enabled(), expect = true);

        let err = pool
            .send_to(&[address(2), address(9)], &[Bytes::from_static(b"x")])
            .unwrap_err();
        assert!(matches!(err, TransportError::UnknownRecipient(a) if a == address(9)));
        let queued = acquire_read_lock!(pool.connections)
            .get(&address(2))
            .map(|conn| conn.queue().len())
            .unwrap();
        assert_eq!(queued, 0);
        drop(l1);
        pool.graceful_shutdown(DEADLINE).await;
    }
}
