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

use std::sync::Arc;

use async_trait::async_trait;
use log::*;
use meridian_comms::NodeAddress;

use crate::{
    block_sync::{
        error::{BlockSyncError, GossipError},
        messages::{
            BlockAvailabilityRequest,
            BlockAvailabilityResponse,
            BlockSyncRange,
            BlockSyncRequest,
            BlockSyncResponse,
            SenderSignature,
        },
        storage::BlockSyncStorage,
    },
    blocks::BlockHeight,
};

const LOG_TARGET: &str = "c::bs::gossip";

/// Outbound half of the block sync gossip contract.
#[async_trait]
pub trait BlockSyncGossip: Send + Sync {
    async fn broadcast_block_availability_request(&self, message: BlockAvailabilityRequest) -> Result<(), GossipError>;

    async fn send_block_availability_response(
        &self,
        recipient: NodeAddress,
        message: BlockAvailabilityResponse,
    ) -> Result<(), GossipError>;

    async fn send_block_sync_request(&self, recipient: NodeAddress, message: BlockSyncRequest)
        -> Result<(), GossipError>;

    async fn send_block_sync_response(
        &self,
        recipient: NodeAddress,
        message: BlockSyncResponse,
    ) -> Result<(), GossipError>;
}

/// Inbound half of the block sync gossip contract. Every method defaults to ignoring the message so a handler only
/// implements the messages it cares about.
#[async_trait]
pub trait BlockSyncHandler: Send + Sync {
    async fn handle_block_availability_request(&self, _message: BlockAvailabilityRequest) {}

    async fn handle_block_availability_response(&self, _message: BlockAvailabilityResponse) {}

    async fn handle_block_sync_request(&self, _message: BlockSyncRequest) {}

    async fn handle_block_sync_response(&self, _message: BlockSyncResponse) {}
}

/// The requests a syncing node makes. Every request covers the next `batch_size` blocks after the last committed
/// one.
#[derive(Clone)]
pub struct BlockSyncClient {
    gossip: Arc<dyn BlockSyncGossip>,
    storage: Arc<dyn BlockSyncStorage>,
    node_address: NodeAddress,
    batch_size: u32,
}

impl BlockSyncClient {
    pub fn new(
        gossip: Arc<dyn BlockSyncGossip>,
        storage: Arc<dyn BlockSyncStorage>,
        node_address: NodeAddress,
        batch_size: u32,
    ) -> Self {
        Self {
            gossip,
            storage,
            node_address,
            batch_size,
        }
    }

    pub fn node_address(&self) -> &NodeAddress {
        &self.node_address
    }

    pub async fn update_consensus_about_last_committed_block(&self) {
        self.storage.update_consensus_about_last_committed_block().await;
    }

    pub async fn broadcast_block_availability_request(&self) -> Result<(), BlockSyncError> {
        let range = self.next_batch_range().await?;
        debug!(target: LOG_TARGET, "Broadcasting block availability request for {}", range);
        let request = BlockAvailabilityRequest {
            sender: SenderSignature::unsigned(self.node_address),
            signed_batch_range: range,
        };
        self.gossip.broadcast_block_availability_request(request).await?;
        Ok(())
    }

    pub async fn send_block_sync_request(&self, recipient: NodeAddress) -> Result<(), BlockSyncError> {
        let range = self.next_batch_range().await?;
        debug!(
            target: LOG_TARGET,
            "Requesting blocks {} from {}",
            range,
            recipient.short_str()
        );
        let request = BlockSyncRequest {
            sender: SenderSignature::unsigned(self.node_address),
            signed_chunk_range: range,
        };
        self.gossip.send_block_sync_request(recipient, request).await?;
        Ok(())
    }

    async fn next_batch_range(&self) -> Result<BlockSyncRange, BlockSyncError> {
        let last_committed = self.storage.last_committed_block_height().await?;
        batch_range(last_committed, self.batch_size)
    }
}

pub(crate) fn batch_range(last_committed: BlockHeight, batch_size: u32) -> Result<BlockSyncRange, BlockSyncError> {
    let first = last_committed.saturating_add(1);
    let last = last_committed.saturating_add(u64::from(batch_size));
    if first > last {
        return Err(BlockSyncError::InvalidBlockRequest { first, last });
    }
    Ok(BlockSyncRange::new(first, last, last_committed))
}

#[cfg(test)]
mod test {
    use meridian_test_utils::unpack_enum;

    use super::*;
    use crate::test_utils::{MockBlockSyncGossip, MockBlockSyncStorage};

    #[test]
    fn batch_ranges() {
        let range = batch_range(0, 10).unwrap();
        assert_eq!(range.first_block_height, 1);
        assert_eq!(range.last_block_height, 10);
        assert_eq!(range.last_committed_block_height, 0);

        let range = batch_range(41, 1).unwrap();
        assert_eq!((range.first_block_height, range.last_block_height), (42, 42));
    }

    #[test]
    fn zero_batch_size_is_an_invalid_request() {
        let err = batch_range(5, 0).unwrap_err();
        assert_eq!(err.to_string(), "invalid block request: from 6 to 5");
    }

    #[tokio::test]
    async fn requests_cover_the_next_batch() {
        let storage = MockBlockSyncStorage::with_committed_blocks(20);
        let gossip = MockBlockSyncGossip::new();
        let me = NodeAddress::from_bytes([1; 20]);
        let source = NodeAddress::from_bytes([2; 20]);
        let client = BlockSyncClient::new(Arc::new(gossip.clone()), Arc::new(storage), me, 5);

        client.broadcast_block_availability_request().await.unwrap();
        client.send_block_sync_request(source).await.unwrap();

        let availability = gossip.availability_requests();
        assert_eq!(availability.len(), 1);
        assert_eq!(availability[0].sender.sender_node_address, me);
        assert_eq!(availability[0].signed_batch_range, BlockSyncRange::new(21, 25, 20));

        let chunk_requests = gossip.sync_requests();
        assert_eq!(chunk_requests.len(), 1);
        assert_eq!(chunk_requests[0].0, source);
        assert_eq!(chunk_requests[0].1.signed_chunk_range, BlockSyncRange::new(21, 25, 20));
    }

    #[tokio::test]
    async fn send_failures_are_reported() {
        let gossip = MockBlockSyncGossip::new();
        gossip.set_fail_sends(true);
        let client = BlockSyncClient::new(
            Arc::new(gossip),
            Arc::new(MockBlockSyncStorage::new()),
            NodeAddress::default(),
            5,
        );
        let err = client.broadcast_block_availability_request().await.unwrap_err();
        unpack_enum!(BlockSyncError::Gossip(_err) = err);
    }
}
