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

use std::fmt;

use async_trait::async_trait;
use log::*;
use tokio::sync::mpsc;

use crate::block_sync::{
    gossip::BlockSyncHandler,
    messages::{BlockAvailabilityResponse, BlockSyncResponse},
    metrics,
};

const LOG_TARGET: &str = "c::bs::conduit";

/// Everything the active sync state can be told from the outside.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A block was committed by consensus, so the node is not behind
    IdleReset,
    AvailabilityResponse(BlockAvailabilityResponse),
    ChunkResponse(BlockSyncResponse),
}

impl SyncEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::IdleReset => "idle-reset",
            SyncEvent::AvailabilityResponse(_) => "availability-response",
            SyncEvent::ChunkResponse(_) => "chunk-response",
        }
    }
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::IdleReset => write!(f, "idle-reset"),
            SyncEvent::AvailabilityResponse(r) => write!(
                f,
                "availability-response from {} for {}",
                r.sender.sender_node_address.short_str(),
                r.signed_batch_range
            ),
            SyncEvent::ChunkResponse(r) => write!(
                f,
                "chunk-response from {} with {} blocks",
                r.sender.sender_node_address.short_str(),
                r.block_pairs.len()
            ),
        }
    }
}

/// Creates the mailbox into the sync state machine.
pub fn conduit(capacity: usize) -> (BlockSyncHandle, Conduit) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (BlockSyncHandle { sender }, Conduit { receiver })
}

/// Receiving end of the sync mailbox. Owned by the state machine and lent to one state at a time.
#[derive(Debug)]
pub struct Conduit {
    receiver: mpsc::Receiver<SyncEvent>,
}

impl Conduit {
    /// Waits for the next event. Never resolves once every [BlockSyncHandle] is gone, so callers always race this
    /// against a timer or the shutdown signal.
    pub async fn next_event(&mut self) -> SyncEvent {
        match self.receiver.recv().await {
            Some(event) => event,
            None => futures::future::pending().await,
        }
    }

    /// Discards every buffered event, returning how many were dropped.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(event) = self.receiver.try_recv() {
            trace!(target: LOG_TARGET, "Discarding {}", event);
            drained += 1;
        }
        drained
    }
}

/// Feeds the sync state machine. Cheap to clone.
///
/// Commit notifications never block and are dropped when the mailbox is full. Responses from other nodes wait for
/// room, so a flood from one node cannot push out the chunk the active state is waiting for.
#[derive(Debug, Clone)]
pub struct BlockSyncHandle {
    sender: mpsc::Sender<SyncEvent>,
}

impl BlockSyncHandle {
    /// Called whenever a block is committed through consensus. Keeps the node in idle.
    pub fn handle_block_committed(&self) {
        if let Err(err) = self.sender.try_send(SyncEvent::IdleReset) {
            let (reason, event) = match err {
                mpsc::error::TrySendError::Full(event) => ("full", event),
                mpsc::error::TrySendError::Closed(event) => ("closed", event),
            };
            Self::dropped(reason, &event);
        }
    }

    pub async fn handle_availability_response(&self, response: BlockAvailabilityResponse) {
        self.send(SyncEvent::AvailabilityResponse(response)).await;
    }

    pub async fn handle_chunk_response(&self, response: BlockSyncResponse) {
        self.send(SyncEvent::ChunkResponse(response)).await;
    }

    async fn send(&self, event: SyncEvent) {
        if let Err(mpsc::error::SendError(event)) = self.sender.send(event).await {
            Self::dropped("closed", &event);
        }
    }

    fn dropped(reason: &str, event: &SyncEvent) {
        metrics::conduit_dropped_events(event.kind()).inc();
        debug!(target: LOG_TARGET, "Sync conduit is {}, dropping {}", reason, event);
    }
}

#[async_trait]
impl BlockSyncHandler for BlockSyncHandle {
    async fn handle_block_availability_response(&self, message: BlockAvailabilityResponse) {
        self.handle_availability_response(message).await;
    }

    async fn handle_block_sync_response(&self, message: BlockSyncResponse) {
        self.handle_chunk_response(message).await;
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use meridian_comms::NodeAddress;
    use meridian_test_utils::unpack_enum;
    use tokio::time;

    use super::*;
    use crate::block_sync::messages::{BlockSyncRange, SenderSignature};

    fn availability_response(sender: u8) -> BlockAvailabilityResponse {
        BlockAvailabilityResponse {
            sender: SenderSignature::unsigned(NodeAddress::from_bytes([sender; 20])),
            signed_batch_range: BlockSyncRange::new(1, 10, 10),
        }
    }

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (handle, mut conduit) = conduit(4);
        handle.handle_block_committed();
        handle.handle_availability_response(availability_response(1)).await;

        unpack_enum!(SyncEvent::IdleReset = conduit.next_event().await);
        unpack_enum!(SyncEvent::AvailabilityResponse(response) = conduit.next_event().await);
        assert_eq!(response.sender.sender_node_address, NodeAddress::from_bytes([1; 20]));
    }

    #[tokio::test]
    async fn full_mailbox_drops_without_blocking() {
        let (handle, mut conduit) = conduit(2);
        for _ in 0..5 {
            handle.handle_block_committed();
        }
        assert_eq!(conduit.drain(), 2);
        assert_eq!(conduit.drain(), 0);
    }

    #[tokio::test]
    async fn responses_wait_for_room_instead_of_dropping() {
        let (handle, mut conduit) = conduit(1);
        handle.handle_availability_response(availability_response(1)).await;
        let pending = tokio::spawn({
            let handle = handle.clone();
            async move { handle.handle_availability_response(availability_response(2)).await }
        });
        time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        unpack_enum!(SyncEvent::AvailabilityResponse(first) = conduit.next_event().await);
        assert_eq!(first.sender.sender_node_address, NodeAddress::from_bytes([1; 20]));
        pending.await.unwrap();
        unpack_enum!(SyncEvent::AvailabilityResponse(second) = conduit.next_event().await);
        assert_eq!(second.sender.sender_node_address, NodeAddress::from_bytes([2; 20]));
    }

    #[tokio::test]
    async fn closed_conduit_never_yields() {
        let (handle, mut conduit) = conduit(2);
        drop(handle);
        let result = time::timeout(Duration::from_millis(20), conduit.next_event()).await;
        assert!(result.is_err());
    }
}
