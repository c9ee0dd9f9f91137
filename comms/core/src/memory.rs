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

//! In-process transport for simulated networks. Nodes share an explicitly constructed [MemoryNetwork].

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use bytes::Bytes;
use log::*;
use tokio::sync::mpsc;

use crate::{
    error::TransportError,
    frame::FrameLimits,
    queue::DEFAULT_MAX_MESSAGES,
    server::ListenerSlot,
    transport::{MessageContext, MessageOrigin, Transport, TransportListener},
    types::{NodeAddress, RecipientMode, TransportData},
};

const LOG_TARGET: &str = "comms::memory";

type Delivery = (MessageContext, Vec<Bytes>);

/// Registry of the nodes in one simulated network. Each node has an ordered inbox, so messages from one sender
/// arrive in the order they were sent.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    nodes: Arc<RwLock<HashMap<NodeAddress, mpsc::Sender<Delivery>>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_addresses(&self) -> Vec<NodeAddress> {
        acquire_read_lock!(self.nodes).keys().copied().collect()
    }

    fn register(&self, address: NodeAddress, inbox: mpsc::Sender<Delivery>) {
        if acquire_write_lock!(self.nodes).insert(address, inbox).is_some() {
            warn!(
                target: LOG_TARGET,
                "Node {} registered twice, the previous transport no longer receives messages",
                address.short_str()
            );
        }
    }

    fn unregister(&self, address: &NodeAddress, inbox: &mpsc::Sender<Delivery>) {
        let mut nodes = acquire_write_lock!(self.nodes);
        if nodes.get(address).map(|s| s.same_channel(inbox)).unwrap_or(false) {
            nodes.remove(address);
        }
    }

    fn resolve_targets(
        &self,
        sender: &NodeAddress,
        data: &TransportData,
    ) -> Result<Vec<(NodeAddress, mpsc::Sender<Delivery>)>, TransportError> {
        let nodes = acquire_read_lock!(self.nodes);
        match data.recipient_mode {
            RecipientMode::Broadcast => Ok(nodes
                .iter()
                .filter(|(address, _)| *address != sender)
                .map(|(address, inbox)| (*address, inbox.clone()))
                .collect()),
            RecipientMode::List => data
                .recipients
                .iter()
                .map(|address| {
                    nodes
                        .get(address)
                        .map(|inbox| (*address, inbox.clone()))
                        .ok_or(TransportError::UnknownRecipient(*address))
                })
                .collect(),
            RecipientMode::AllButList => Err(TransportError::Unimplemented("AllButList")),
        }
    }
}

/// A node's endpoint on a [MemoryNetwork]. The node leaves the network when this is dropped.
pub struct MemoryTransport {
    network: MemoryNetwork,
    node_address: NodeAddress,
    slot: Arc<ListenerSlot>,
    inbox: mpsc::Sender<Delivery>,
}

impl MemoryTransport {
    /// Joins `network` as `node_address`. Must be called from within a tokio runtime.
    pub fn new(network: MemoryNetwork, node_address: NodeAddress) -> Self {
        let slot: Arc<ListenerSlot> = Arc::new(RwLock::new(None));
        let (inbox, deliveries) = mpsc::channel(DEFAULT_MAX_MESSAGES);
        tokio::spawn(deliver(node_address, deliveries, slot.clone()));
        network.register(node_address, inbox.clone());
        Self {
            network,
            node_address,
            slot,
            inbox,
        }
    }

    pub fn node_address(&self) -> NodeAddress {
        self.node_address
    }
}

/// Hands a node's inbox to its listener, one message at a time. Ends once the node has left the network.
async fn deliver(node_address: NodeAddress, mut deliveries: mpsc::Receiver<Delivery>, slot: Arc<ListenerSlot>) {
    while let Some((context, payloads)) = deliveries.recv().await {
        let listener = acquire_read_lock!(slot).clone();
        match listener {
            Some(listener) => listener.on_transport_message_received(context, payloads),
            None => trace!(
                target: LOG_TARGET,
                "No listener on {}, dropping {} payload(s)",
                node_address.short_str(),
                payloads.len()
            ),
        }
    }
    trace!(target: LOG_TARGET, "Inbox of {} closed", node_address.short_str());
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, data: TransportData) -> Result<(), TransportError> {
        data.check_size()?;
        FrameLimits::default().check_payloads(&data.payloads)?;
        let targets = self.network.resolve_targets(&self.node_address, &data)?;
        let context = MessageContext {
            origin: MessageOrigin::Memory(self.node_address),
        };
        for (address, inbox) in targets {
            if let Err(err) = inbox.try_send((context, data.payloads.clone())) {
                warn!(
                    target: LOG_TARGET,
                    "Dropping message from {} to {}: {}",
                    self.node_address.short_str(),
                    address.short_str(),
                    err
                );
            }
        }
        Ok(())
    }

    fn register_listener(&self, listener: Option<Arc<dyn TransportListener>>) {
        *acquire_write_lock!(self.slot) = listener;
    }

    async fn update_topology(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.network.unregister(&self.node_address, &self.inbox);
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::test_utils::CollectingListener;

    fn address(byte: u8) -> NodeAddress {
        NodeAddress::from_bytes([byte; 20])
    }

    fn node(network: &MemoryNetwork, byte: u8) -> (MemoryTransport, Arc<CollectingListener>) {
        let transport = MemoryTransport::new(network.clone(), address(byte));
        let listener = Arc::new(CollectingListener::default());
        transport.register_listener(Some(listener.clone()));
        (transport, listener)
    }

    #[tokio::test]
    async fn broadcast_skips_sender() {
        let network = MemoryNetwork::new();
        let (a, a_rx) = node(&network, 1);
        let (_b, b_rx) = node(&network, 2);
        let (_c, c_rx) = node(&network, 3);

        a.send(TransportData::broadcast(address(1), vec![Bytes::from_static(b"hi")]).unwrap())
            .await
            .unwrap();
        for rx in [&b_rx, &c_rx] {
            let received = rx.wait_for(1, Duration::from_secs(5)).await;
            assert_eq!(received[0].0.origin, MessageOrigin::Memory(address(1)));
            assert_eq!(received[0].1, vec![Bytes::from_static(b"hi")]);
        }
        tokio::task::yield_now().await;
        assert!(a_rx.received().is_empty());
    }

    #[tokio::test]
    async fn list_requires_known_recipients() {
        let network = MemoryNetwork::new();
        let (a, _) = node(&network, 1);
        let (_b, b_rx) = node(&network, 2);

        let data = TransportData::to_list(address(1), vec![address(2), address(7)], vec![Bytes::new()]).unwrap();
        assert!(matches!(a.send(data).await, Err(TransportError::UnknownRecipient(_))));

        let data = TransportData::to_list(address(1), vec![address(2)], vec![Bytes::from_static(b"x")]).unwrap();
        a.send(data).await.unwrap();
        assert_eq!(b_rx.wait_for(1, Duration::from_secs(5)).await.len(), 1);

        let data = TransportData::new(address(1), RecipientMode::AllButList, vec![], vec![]).unwrap();
        assert!(matches!(a.send(data).await, Err(TransportError::Unimplemented(_))));
    }

    #[tokio::test]
    async fn messages_from_one_sender_arrive_in_order() {
        let network = MemoryNetwork::new();
        let (a, _) = node(&network, 1);
        let (_b, b_rx) = node(&network, 2);

        for i in 0..100u32 {
            let data = TransportData::to_list(address(1), vec![address(2)], vec![Bytes::from(i.to_le_bytes().to_vec())])
                .unwrap();
            a.send(data).await.unwrap();
        }
        let received = b_rx.wait_for(100, Duration::from_secs(5)).await;
        let order = received
            .iter()
            .map(|(_, payloads)| u32::from_le_bytes(payloads[0][..].try_into().unwrap()))
            .collect::<Vec<_>>();
        assert_eq!(order, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn rejects_more_payloads_than_a_frame_carries() {
        let network = MemoryNetwork::new();
        let (a, _) = node(&network, 1);
        let (_b, b_rx) = node(&network, 2);

        let payloads = vec![Bytes::new(); crate::frame::MAX_PAYLOADS_IN_MESSAGE + 1];
        let data = TransportData::to_list(address(1), vec![address(2)], payloads).unwrap();
        let err = a.send(data).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidFrame(_)));
        tokio::task::yield_now().await;
        assert!(b_rx.received().is_empty());
    }

    #[tokio::test]
    async fn dropped_transport_leaves_network() {
        let network = MemoryNetwork::new();
        let (a, _) = node(&network, 1);
        {
            let (_b, _) = node(&network, 2);
            assert_eq!(network.node_addresses().len(), 2);
        }
        assert_eq!(network.node_addresses(), vec![a.node_address()]);
    }
}
