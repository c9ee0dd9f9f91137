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
use meridian_common::log_if_error;
use meridian_comms::NodeAddress;

use crate::{
    block_sync::{
        error::{BlockSyncError, CodecError},
        gossip::{BlockSyncGossip, BlockSyncHandler},
        messages::{
            BlockAvailabilityRequest,
            BlockAvailabilityResponse,
            BlockSyncRange,
            BlockSyncRequest,
            BlockSyncResponse,
            SenderSignature,
        },
        metrics,
        storage::BlockSyncStorage,
    },
    blocks::BlockHeight,
    gossip::header::MAX_MESSAGE_BODY_SIZE,
};

const LOG_TARGET: &str = "c::bs::responder";

/// Serves availability and chunk requests from syncing nodes out of local storage.
pub struct BlockSyncResponder {
    node_address: NodeAddress,
    batch_size: u32,
    gossip: Arc<dyn BlockSyncGossip>,
    storage: Arc<dyn BlockSyncStorage>,
}

impl BlockSyncResponder {
    pub fn new(
        node_address: NodeAddress,
        batch_size: u32,
        gossip: Arc<dyn BlockSyncGossip>,
        storage: Arc<dyn BlockSyncStorage>,
    ) -> Self {
        Self {
            node_address,
            batch_size,
            gossip,
            storage,
        }
    }

    async fn respond_to_availability_request(&self, request: BlockAvailabilityRequest) -> Result<(), BlockSyncError> {
        let requester = request.sender.sender_node_address;
        let last_committed = self.storage.last_committed_block_height().await?;
        let range = match server_range(&request.signed_batch_range, last_committed, self.batch_size) {
            Some(range) => range,
            None => {
                trace!(
                    target: LOG_TARGET,
                    "Cannot serve {} to {} (last committed #{})",
                    request.signed_batch_range,
                    requester.short_str(),
                    last_committed
                );
                return Ok(());
            },
        };

        debug!(
            target: LOG_TARGET,
            "Offering {} to {}",
            range,
            requester.short_str()
        );
        let response = BlockAvailabilityResponse {
            sender: SenderSignature::unsigned(self.node_address),
            signed_batch_range: range,
        };
        self.gossip.send_block_availability_response(requester, response).await?;
        Ok(())
    }

    async fn respond_to_sync_request(&self, request: BlockSyncRequest) -> Result<(), BlockSyncError> {
        let requester = request.sender.sender_node_address;
        let last_committed = self.storage.last_committed_block_height().await?;
        let range = match server_range(&request.signed_chunk_range, last_committed, self.batch_size) {
            Some(range) => range,
            None => {
                trace!(
                    target: LOG_TARGET,
                    "Cannot serve chunk {} to {} (last committed #{})",
                    request.signed_chunk_range,
                    requester.short_str(),
                    last_committed
                );
                return Ok(());
            },
        };

        let block_pairs = self
            .storage
            .block_range(range.first_block_height, range.last_block_height)
            .await?;
        let mut response = BlockSyncResponse {
            sender: SenderSignature::unsigned(self.node_address),
            signed_chunk_range: range,
            block_pairs,
        };
        let dropped = truncate_to_size(&mut response, MAX_MESSAGE_BODY_SIZE as u64)?;
        if response.block_pairs.is_empty() {
            warn!(
                target: LOG_TARGET,
                "Block #{} is too large to send to {}",
                range.first_block_height,
                requester.short_str()
            );
            return Ok(());
        }
        if dropped > 0 {
            debug!(
                target: LOG_TARGET,
                "Dropped {} trailing block(s) from chunk {} to fit the message size limit", dropped, range
            );
        }

        debug!(
            target: LOG_TARGET,
            "Sending {} block(s) {} to {}",
            response.block_pairs.len(),
            response.signed_chunk_range,
            requester.short_str()
        );
        metrics::served_blocks().inc_by(response.block_pairs.len() as u64);
        self.gossip.send_block_sync_response(requester, response).await?;
        Ok(())
    }
}

#[async_trait]
impl BlockSyncHandler for BlockSyncResponder {
    async fn handle_block_availability_request(&self, message: BlockAvailabilityRequest) {
        log_if_error!(
            target: LOG_TARGET,
            self.respond_to_availability_request(message).await,
            "Failed to answer block availability request: {}",
        );
    }

    async fn handle_block_sync_request(&self, message: BlockSyncRequest) {
        log_if_error!(
            target: LOG_TARGET,
            self.respond_to_sync_request(message).await,
            "Failed to answer block sync request: {}",
        );
    }
}

/// Drops trailing blocks from `response` until its encoding fits in `max_size` bytes and shrinks the chunk range to
/// match. Returns the number of blocks dropped.
fn truncate_to_size(response: &mut BlockSyncResponse, max_size: u64) -> Result<usize, CodecError> {
    let mut size = bincode::serialized_size(&*response)?;
    let mut keep = response.block_pairs.len();
    while size > max_size && keep > 0 {
        keep -= 1;
        size = size.saturating_sub(bincode::serialized_size(&response.block_pairs[keep])?);
    }
    let dropped = response.block_pairs.len() - keep;
    response.block_pairs.truncate(keep);
    if let Some(last) = response.block_pairs.last() {
        response.signed_chunk_range.last_block_height = last.height();
    }
    Ok(dropped)
}

/// The part of `requested` this node can serve: starts at the requested first block and is capped by the batch size,
/// the requested last block and the local last committed block.
pub fn server_range(
    requested: &BlockSyncRange,
    last_committed: BlockHeight,
    batch_size: u32,
) -> Option<BlockSyncRange> {
    let from = requested.first_block_height;
    if batch_size == 0 || from > last_committed || from > requested.last_block_height {
        return None;
    }
    let to = from
        .saturating_add(u64::from(batch_size) - 1)
        .min(requested.last_block_height)
        .min(last_committed);
    Some(BlockSyncRange::new(from, to, last_committed))
}

#[cfg(test)]
mod test {
    use bytes::Bytes;
    use meridian_comms::{RecipientMode, TransportData};

    use super::*;
    use crate::{
        blocks::BlockPair,
        gossip::header::{encode_message, BlockSyncKind, GossipHeader},
        test_utils::{create_blocks, node_address, MockBlockSyncGossip, MockBlockSyncStorage},
    };

    fn requested(first: BlockHeight, last: BlockHeight) -> BlockSyncRange {
        BlockSyncRange::new(first, last, first.saturating_sub(1))
    }

    #[test]
    fn server_range_is_capped() {
        // By the batch size
        assert_eq!(server_range(&requested(1, 100), 50, 10), Some(BlockSyncRange::new(1, 10, 50)));
        // By the requested last block
        assert_eq!(server_range(&requested(5, 7), 50, 10), Some(BlockSyncRange::new(5, 7, 50)));
        // By the local last committed block
        assert_eq!(server_range(&requested(41, 60), 45, 100), Some(BlockSyncRange::new(41, 45, 45)));
        assert_eq!(server_range(&requested(45, 45), 45, 1), Some(BlockSyncRange::new(45, 45, 45)));
    }

    #[test]
    fn unservable_requests() {
        assert_eq!(server_range(&requested(51, 60), 50, 10), None);
        assert_eq!(server_range(&BlockSyncRange::new(10, 9, 9), 50, 10), None);
        assert_eq!(server_range(&requested(1, 10), 50, 0), None);
    }

    #[tokio::test]
    async fn answers_availability_requests() {
        let gossip = MockBlockSyncGossip::new();
        let responder = BlockSyncResponder::new(
            node_address(1),
            10,
            Arc::new(gossip.clone()),
            Arc::new(MockBlockSyncStorage::with_committed_blocks(15)),
        );
        responder
            .handle_block_availability_request(BlockAvailabilityRequest {
                sender: SenderSignature::unsigned(node_address(2)),
                signed_batch_range: BlockSyncRange::new(11, 30, 10),
            })
            .await;

        let responses = gossip.availability_responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].0, node_address(2));
        assert_eq!(responses[0].1.sender.sender_node_address, node_address(1));
        assert_eq!(responses[0].1.signed_batch_range, BlockSyncRange::new(11, 15, 15));
    }

    #[tokio::test]
    async fn ignores_requests_beyond_the_last_committed_block() {
        let gossip = MockBlockSyncGossip::new();
        let responder = BlockSyncResponder::new(
            node_address(1),
            10,
            Arc::new(gossip.clone()),
            Arc::new(MockBlockSyncStorage::with_committed_blocks(15)),
        );
        responder
            .handle_block_availability_request(BlockAvailabilityRequest {
                sender: SenderSignature::unsigned(node_address(2)),
                signed_batch_range: BlockSyncRange::new(16, 25, 15),
            })
            .await;
        responder
            .handle_block_sync_request(BlockSyncRequest {
                sender: SenderSignature::unsigned(node_address(2)),
                signed_chunk_range: BlockSyncRange::new(16, 25, 15),
            })
            .await;
        assert!(gossip.calls().is_empty());
    }

    #[tokio::test]
    async fn serves_chunks_from_storage() {
        let gossip = MockBlockSyncGossip::new();
        let responder = BlockSyncResponder::new(
            node_address(1),
            4,
            Arc::new(gossip.clone()),
            Arc::new(MockBlockSyncStorage::with_committed_blocks(20)),
        );
        responder
            .handle_block_sync_request(BlockSyncRequest {
                sender: SenderSignature::unsigned(node_address(3)),
                signed_chunk_range: BlockSyncRange::new(6, 15, 5),
            })
            .await;

        let responses = gossip.sync_responses();
        assert_eq!(responses.len(), 1);
        let (recipient, response) = &responses[0];
        assert_eq!(recipient, &node_address(3));
        assert_eq!(response.signed_chunk_range, BlockSyncRange::new(6, 9, 20));
        assert_eq!(response.block_pairs, create_blocks(6, 9));
    }

    fn large_block(height: BlockHeight) -> BlockPair {
        BlockPair::new(
            height,
            Bytes::from(vec![1u8; 3 * 1024 * 1024]),
            Bytes::from(vec![2u8; 1024]),
            Bytes::from(vec![3u8; 32]),
        )
    }

    #[tokio::test]
    async fn oversized_chunks_are_cut_to_fit_a_transport_message() {
        let gossip = MockBlockSyncGossip::new();
        let blocks = (1..=10).map(large_block).collect::<Vec<_>>();
        let responder = BlockSyncResponder::new(
            node_address(1),
            100,
            Arc::new(gossip.clone()),
            Arc::new(MockBlockSyncStorage::with_blocks(blocks.clone())),
        );
        responder
            .handle_block_sync_request(BlockSyncRequest {
                sender: SenderSignature::unsigned(node_address(3)),
                signed_chunk_range: BlockSyncRange::new(1, 10, 0),
            })
            .await;

        let responses = gossip.sync_responses();
        assert_eq!(responses.len(), 1);
        let response = &responses[0].1;
        // Six 3MiB blocks fit in 20MiB, seven do not
        assert_eq!(response.block_pairs, blocks[..6].to_vec());
        assert_eq!(response.signed_chunk_range, BlockSyncRange::new(1, 6, 10));

        let header = GossipHeader::block_sync(BlockSyncKind::SyncResponse, RecipientMode::List);
        let payloads = encode_message(&header, response).unwrap();
        let data = TransportData::new(node_address(1), RecipientMode::List, vec![node_address(3)], payloads);
        assert!(data.is_ok());
    }

    #[tokio::test]
    async fn a_block_larger_than_a_message_is_not_sent() {
        let gossip = MockBlockSyncGossip::new();
        let mut block = large_block(1);
        block.transactions_block = Bytes::from(vec![1u8; MAX_MESSAGE_BODY_SIZE]);
        let responder = BlockSyncResponder::new(
            node_address(1),
            100,
            Arc::new(gossip.clone()),
            Arc::new(MockBlockSyncStorage::with_blocks(vec![block])),
        );
        responder
            .handle_block_sync_request(BlockSyncRequest {
                sender: SenderSignature::unsigned(node_address(3)),
                signed_chunk_range: BlockSyncRange::new(1, 1, 0),
            })
            .await;
        assert!(gossip.sync_responses().is_empty());
    }
}
