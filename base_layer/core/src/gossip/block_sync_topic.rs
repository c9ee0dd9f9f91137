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

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use log::*;
use meridian_comms::{MessageContext, NodeAddress, RecipientMode, Transport, TransportData, TransportListener};
use meridian_shutdown::ShutdownSignal;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::{
    block_sync::{
        metrics,
        BlockAvailabilityRequest,
        BlockAvailabilityResponse,
        BlockSyncGossip,
        BlockSyncHandler,
        BlockSyncRequest,
        BlockSyncResponse,
        CodecError,
        GossipError,
    },
    gossip::header::{decode_header, decode_message, encode_message, BlockSyncKind, GossipHeader, Topic},
};

const LOG_TARGET: &str = "c::bs::gossip::topic";

type Handlers = Arc<RwLock<Vec<Arc<dyn BlockSyncHandler>>>>;

/// The block sync topic on top of a [Transport]. Outbound messages are encoded and sent directly, inbound messages
/// are queued by the transport listener and decoded and dispatched to the registered handlers on a separate task.
pub struct BlockSyncTopic {
    node_address: NodeAddress,
    transport: Arc<dyn Transport>,
    handlers: Handlers,
}

impl BlockSyncTopic {
    /// Registers the topic as `transport`'s listener and spawns the dispatcher, which runs until `shutdown_signal`
    /// resolves.
    pub fn start(
        node_address: NodeAddress,
        transport: Arc<dyn Transport>,
        channel_capacity: usize,
        shutdown_signal: ShutdownSignal,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(channel_capacity.max(1));
        let handlers = Handlers::default();
        transport.register_listener(Some(Arc::new(TopicListener { sender })));
        let dispatcher = Dispatcher {
            receiver,
            handlers: handlers.clone(),
            shutdown_signal,
        };
        tokio::spawn(dispatcher.run());

        Arc::new(Self {
            node_address,
            transport,
            handlers,
        })
    }

    pub fn register_handler(&self, handler: Arc<dyn BlockSyncHandler>) {
        acquire_write_lock!(self.handlers).push(handler);
    }

    fn encode<T: Serialize>(
        &self,
        kind: BlockSyncKind,
        recipient_mode: RecipientMode,
        recipients: Vec<NodeAddress>,
        message: &T,
    ) -> Result<TransportData, GossipError> {
        let header = GossipHeader::block_sync(kind, recipient_mode);
        let payloads = encode_message(&header, message)?;
        Ok(TransportData::new(
            self.node_address,
            recipient_mode,
            recipients,
            payloads,
        )?)
    }

    async fn send(&self, data: TransportData) -> Result<(), GossipError> {
        self.transport.send(data).await?;
        Ok(())
    }
}

#[async_trait]
impl BlockSyncGossip for BlockSyncTopic {
    async fn broadcast_block_availability_request(&self, message: BlockAvailabilityRequest) -> Result<(), GossipError> {
        let data = self.encode(
            BlockSyncKind::AvailabilityRequest,
            RecipientMode::Broadcast,
            Vec::new(),
            &message,
        )?;
        self.send(data).await
    }

    async fn send_block_availability_response(
        &self,
        recipient: NodeAddress,
        message: BlockAvailabilityResponse,
    ) -> Result<(), GossipError> {
        let data = self.encode(
            BlockSyncKind::AvailabilityResponse,
            RecipientMode::List,
            vec![recipient],
            &message,
        )?;
        self.send(data).await
    }

    async fn send_block_sync_request(&self, recipient: NodeAddress, message: BlockSyncRequest) -> Result<(), GossipError> {
        let data = self.encode(BlockSyncKind::SyncRequest, RecipientMode::List, vec![recipient], &message)?;
        self.send(data).await
    }

    async fn send_block_sync_response(
        &self,
        recipient: NodeAddress,
        message: BlockSyncResponse,
    ) -> Result<(), GossipError> {
        let data = self.encode(BlockSyncKind::SyncResponse, RecipientMode::List, vec![recipient], &message)?;
        self.send(data).await
    }
}

/// Runs on the transport's reader task, so it only checks the header and queues.
struct TopicListener {
    sender: mpsc::Sender<(BlockSyncKind, Vec<Bytes>)>,
}

impl TransportListener for TopicListener {
    fn on_transport_message_received(&self, context: MessageContext, payloads: Vec<Bytes>) {
        let header = match decode_header(&payloads) {
            Ok(header) => header,
            Err(err) => {
                metrics::topic_dropped_messages("corrupt-header").inc();
                debug!(
                    target: LOG_TARGET,
                    "Dropping gossip message with a corrupt header from {}: {}", context.origin, err
                );
                return;
            },
        };
        let kind = match header.topic {
            Topic::BlockSync(kind) => kind,
            topic => {
                metrics::topic_dropped_messages("unhandled-topic").inc();
                trace!(target: LOG_TARGET, "Dropping {} message from {}", topic, context.origin);
                return;
            },
        };

        match self.sender.try_send((kind, payloads)) {
            Ok(()) => {},
            Err(mpsc::error::TrySendError::Full(_)) => {
                metrics::topic_dropped_messages("channel-full").inc();
                warn!(
                    target: LOG_TARGET,
                    "Block sync topic channel is full, dropping {} from {}", kind, context.origin
                );
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                metrics::topic_dropped_messages("closed").inc();
                debug!(target: LOG_TARGET, "Block sync topic has stopped, dropping {}", kind);
            },
        }
    }
}

struct Dispatcher {
    receiver: mpsc::Receiver<(BlockSyncKind, Vec<Bytes>)>,
    handlers: Handlers,
    shutdown_signal: ShutdownSignal,
}

impl Dispatcher {
    async fn run(mut self) {
        loop {
            let (kind, payloads) = tokio::select! {
                biased;

                _ = self.shutdown_signal.wait() => break,
                message = self.receiver.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            if let Err(err) = self.dispatch(kind, &payloads).await {
                metrics::topic_dropped_messages("corrupt-body").inc();
                debug!(target: LOG_TARGET, "Dropping corrupt {} message: {}", kind, err);
            }
        }
        debug!(target: LOG_TARGET, "Block sync topic dispatcher stopped");
    }

    async fn dispatch(&self, kind: BlockSyncKind, payloads: &[Bytes]) -> Result<(), CodecError> {
        let handlers = acquire_read_lock!(self.handlers).clone();
        match kind {
            BlockSyncKind::AvailabilityRequest => {
                let message: BlockAvailabilityRequest = decode_message(kind, payloads)?;
                for handler in &handlers {
                    handler.handle_block_availability_request(message.clone()).await;
                }
            },
            BlockSyncKind::AvailabilityResponse => {
                let message: BlockAvailabilityResponse = decode_message(kind, payloads)?;
                for handler in &handlers {
                    handler.handle_block_availability_response(message.clone()).await;
                }
            },
            BlockSyncKind::SyncRequest => {
                let message: BlockSyncRequest = decode_message(kind, payloads)?;
                for handler in &handlers {
                    handler.handle_block_sync_request(message.clone()).await;
                }
            },
            BlockSyncKind::SyncResponse => {
                let message: BlockSyncResponse = decode_message(kind, payloads)?;
                for handler in &handlers {
                    handler.handle_block_sync_response(message.clone()).await;
                }
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Mutex, time::Duration};

    use meridian_comms::{MemoryNetwork, MemoryTransport};
    use meridian_shutdown::Shutdown;
    use meridian_test_utils::async_assert_eventually;

    use super::*;
    use crate::{
        block_sync::{BlockSyncRange, SenderSignature},
        test_utils::{chunk_response, create_blocks, node_address},
    };

    #[derive(Default)]
    struct RecordingHandler {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingHandler {
        fn calls(&self) -> Vec<String> {
            acquire_lock!(self.calls).clone()
        }
    }

    #[async_trait]
    impl BlockSyncHandler for RecordingHandler {
        async fn handle_block_availability_request(&self, message: BlockAvailabilityRequest) {
            acquire_lock!(self.calls).push(format!(
                "availability request from {} for {}",
                message.sender.sender_node_address.short_str(),
                message.signed_batch_range
            ));
        }

        async fn handle_block_sync_response(&self, message: BlockSyncResponse) {
            acquire_lock!(self.calls).push(format!(
                "sync response from {} with {} blocks",
                message.sender.sender_node_address.short_str(),
                message.block_pairs.len()
            ));
        }
    }

    fn node(network: &MemoryNetwork, n: u8, shutdown: &Shutdown) -> (Arc<BlockSyncTopic>, Arc<RecordingHandler>) {
        let transport = Arc::new(MemoryTransport::new(network.clone(), node_address(n)));
        let topic = BlockSyncTopic::start(node_address(n), transport, 10, shutdown.to_signal());
        let handler = Arc::new(RecordingHandler::default());
        topic.register_handler(handler.clone());
        (topic, handler)
    }

    #[tokio::test]
    async fn messages_reach_remote_handlers() {
        let network = MemoryNetwork::new();
        let shutdown = Shutdown::new();
        let (a, a_handler) = node(&network, 1, &shutdown);
        let (b, b_handler) = node(&network, 2, &shutdown);
        let (_c, c_handler) = node(&network, 3, &shutdown);

        a.broadcast_block_availability_request(BlockAvailabilityRequest {
            sender: SenderSignature::unsigned(node_address(1)),
            signed_batch_range: BlockSyncRange::new(5, 14, 4),
        })
        .await
        .unwrap();
        b.send_block_sync_response(node_address(1), chunk_response(node_address(2), create_blocks(5, 7)))
            .await
            .unwrap();

        let expected = "availability request from 010101 for [5..=14] (last committed #4)".to_string();
        async_assert_eventually!(b_handler.calls(), expect = vec![expected.clone()]);
        async_assert_eventually!(c_handler.calls(), expect = vec![expected.clone()]);
        async_assert_eventually!(
            a_handler.calls(),
            expect = vec!["sync response from 020202 with 3 blocks".to_string()]
        );
    }

    #[tokio::test]
    async fn corrupt_and_foreign_messages_are_dropped() {
        let network = MemoryNetwork::new();
        let shutdown = Shutdown::new();
        let (_a, a_handler) = node(&network, 1, &shutdown);
        let raw = MemoryTransport::new(network.clone(), node_address(9));

        let foreign = GossipHeader {
            topic: Topic::Consensus,
            recipient_mode: RecipientMode::List,
        };
        let payloads = vec![
            vec![Bytes::from_static(b"garbage")],
            encode_message(&foreign, &42u32).unwrap(),
            vec![Bytes::from(
                bincode::serialize(&GossipHeader::block_sync(BlockSyncKind::SyncResponse, RecipientMode::List))
                    .unwrap(),
            )],
        ];
        for payloads in payloads {
            let data = TransportData::to_list(node_address(9), vec![node_address(1)], payloads).unwrap();
            raw.send(data).await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(a_handler.calls().is_empty());
    }

    #[tokio::test]
    async fn dispatcher_stops_on_shutdown() {
        let network = MemoryNetwork::new();
        let shutdown = Shutdown::new();
        let (_a, a_handler) = node(&network, 1, &shutdown);
        let (b, _) = node(&network, 2, &shutdown);
        shutdown.trigger();
        tokio::time::sleep(Duration::from_millis(20)).await;

        b.send_block_sync_response(node_address(1), chunk_response(node_address(2), create_blocks(1, 1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(a_handler.calls().is_empty());
    }
}
