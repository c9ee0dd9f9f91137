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

use std::{fmt, sync::Arc, time::Duration};

use log::*;
use tokio::time;

use crate::{
    block_sync::{conduit::Conduit, factory::StateFactory, messages::BlockSyncResponse, metrics, states::SyncState},
    blocks::{is_consecutive_after, BlockPair},
};

const LOG_TARGET: &str = "c::bs::states::processing_blocks";

const CONSENSUS_UPDATE_TIMEOUT: Duration = Duration::from_secs(1);

/// Validates and commits a received chunk, one block at a time.
pub struct ProcessingBlocksState {
    factory: Arc<StateFactory>,
    response: BlockSyncResponse,
}

impl ProcessingBlocksState {
    pub(crate) fn new(factory: Arc<StateFactory>, response: BlockSyncResponse) -> Self {
        Self { factory, response }
    }

    pub fn response(&self) -> &BlockSyncResponse {
        &self.response
    }

    pub async fn next_state(self, conduit: &mut Conduit) -> Option<SyncState> {
        let shutdown_signal = self.factory.shutdown_signal();
        if shutdown_signal.is_triggered() {
            return None;
        }

        let sender = *self.response.sender_address();
        let blocks = &self.response.block_pairs;
        let (first, last) = match (blocks.first(), blocks.last()) {
            (Some(first), Some(last)) => (first.height, last.height),
            _ => {
                warn!(
                    target: LOG_TARGET,
                    "Byzantine message detected: empty chunk from {}",
                    sender.short_str()
                );
                return Some(self.factory.create_idle_state());
            },
        };
        info!(
            target: LOG_TARGET,
            "Processing {} block(s) #{}..=#{} from {}",
            blocks.len(),
            first,
            last,
            sender.short_str()
        );

        let storage = self.factory.storage();
        let last_committed = match storage.last_committed_block_height().await {
            Ok(height) => height,
            Err(err) => {
                warn!(target: LOG_TARGET, "Could not read the last committed height: {}", err);
                return Some(self.factory.create_collecting_availability_responses_state());
            },
        };
        if !is_consecutive_after(last_committed, blocks) {
            metrics::rejected_blocks("range").inc_by(blocks.len() as u64);
            info!(
                target: LOG_TARGET,
                "Chunk from {} is not a consecutive range after last committed block #{} (#{}..=#{})",
                sender.short_str(),
                last_committed,
                first,
                last
            );
            return Some(self.factory.create_collecting_availability_responses_state());
        }

        for (index, block) in blocks.iter().enumerate() {
            conduit.drain();
            if shutdown_signal.is_triggered() {
                debug!(target: LOG_TARGET, "Shutdown while processing blocks");
                return None;
            }

            let stored_prev;
            let prev = match index.checked_sub(1) {
                Some(prev_index) => blocks.get(prev_index),
                None => {
                    stored_prev = self.previous_committed_block(block).await;
                    stored_prev.as_ref()
                },
            };

            if let Err(err) = storage.validate_block_for_commit(block, prev).await {
                if prev.is_none() && block.height > 1 {
                    info!(
                        target: LOG_TARGET,
                        "Dropping block #{}: the previous block is not available for validation",
                        block.height
                    );
                } else {
                    metrics::rejected_blocks("validation").inc();
                    info!(target: LOG_TARGET, "Block #{} from sync failed validation: {}", block.height, err);
                }
                break;
            }

            if let Err(err) = storage.commit_block(block).await {
                metrics::rejected_blocks("commit").inc();
                error!(target: LOG_TARGET, "Failed to commit block #{} from sync: {}", block.height, err);
                break;
            }
            metrics::committed_blocks().inc();
            metrics::last_committed_height().set(block.height as i64);
            debug!(target: LOG_TARGET, "Committed block #{} from sync", block.height);
        }

        if time::timeout(
            CONSENSUS_UPDATE_TIMEOUT,
            storage.update_consensus_about_last_committed_block(),
        )
        .await
        .is_err()
        {
            warn!(
                target: LOG_TARGET,
                "Updating consensus about the last committed block timed out after {:.2?}", CONSENSUS_UPDATE_TIMEOUT
            );
        }

        conduit.drain();
        if shutdown_signal.is_triggered() {
            return None;
        }
        Some(self.factory.create_collecting_availability_responses_state())
    }

    async fn previous_committed_block(&self, block: &BlockPair) -> Option<BlockPair> {
        let height = block.height.checked_sub(1).filter(|h| *h > 0)?;
        match self.factory.storage().block(height).await {
            Ok(block) => block,
            Err(err) => {
                debug!(target: LOG_TARGET, "Could not load block #{}: {}", height, err);
                None
            },
        }
    }
}

impl fmt::Display for ProcessingBlocksState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "processing-blocks-state-with-{}-blocks", self.response.block_pairs.len())
    }
}

#[cfg(test)]
mod test {
    use meridian_test_utils::unpack_enum;

    use super::*;
    use crate::test_utils::{chunk_response, create_blocks, node_address, MockBlockSyncStorage, SyncTestContext};

    #[tokio::test]
    async fn commits_until_the_first_invalid_block() {
        let storage = MockBlockSyncStorage::new();
        storage.fail_validation_at(6);
        let mut ctx = SyncTestContext::with_storage(storage);
        let state = ctx
            .factory
            .create_processing_blocks_state(chunk_response(node_address(2), create_blocks(1, 11)));
        assert_eq!(state.to_string(), "processing-blocks-state-with-11-blocks");

        let next = state.next_state(&mut ctx.conduit).await.unwrap();
        unpack_enum!(SyncState::CollectingAvailabilityResponses(_state) = next);
        assert_eq!(ctx.storage.committed_heights(), vec![1, 2, 3, 4, 5]);
        assert_eq!(ctx.storage.consensus_updates(), 1);
        let validations = ctx
            .storage
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("validate"))
            .count();
        assert_eq!(validations, 6);

        let exposed = meridian_metrics::encode_default_registry().unwrap();
        assert!(exposed.contains("c::bs::committed_blocks"));
        assert!(exposed.contains("c::bs::rejected_blocks{reason=\"validation\"}"));
    }

    #[tokio::test]
    async fn commit_failure_stops_the_chunk() {
        let storage = MockBlockSyncStorage::with_committed_blocks(4);
        storage.fail_commit_at(7);
        let mut ctx = SyncTestContext::with_storage(storage);
        let state = ctx
            .factory
            .create_processing_blocks_state(chunk_response(node_address(2), create_blocks(5, 9)));

        let next = state.next_state(&mut ctx.conduit).await.unwrap();
        unpack_enum!(SyncState::CollectingAvailabilityResponses(_state) = next);
        assert_eq!(ctx.storage.committed_heights(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn first_block_is_validated_against_the_stored_previous_block() {
        let storage = MockBlockSyncStorage::with_committed_blocks(3);
        let mut ctx = SyncTestContext::with_storage(storage);
        let state = ctx
            .factory
            .create_processing_blocks_state(chunk_response(node_address(2), create_blocks(4, 5)));
        state.next_state(&mut ctx.conduit).await.unwrap();

        let calls = ctx.storage.calls();
        assert!(calls.contains(&"validate #4 prev #3".to_string()));
        assert!(calls.contains(&"validate #5 prev #4".to_string()));
    }

    #[tokio::test]
    async fn empty_chunk_returns_to_idle() {
        let mut ctx = SyncTestContext::new();
        let state = ctx
            .factory
            .create_processing_blocks_state(chunk_response(node_address(2), Vec::new()));
        let next = state.next_state(&mut ctx.conduit).await.unwrap();
        unpack_enum!(SyncState::Idle(_state) = next);
        assert_eq!(ctx.storage.consensus_updates(), 0);
    }

    #[tokio::test]
    async fn non_consecutive_chunk_is_rejected() {
        let storage = MockBlockSyncStorage::with_committed_blocks(2);
        let mut ctx = SyncTestContext::with_storage(storage);
        let mut blocks = create_blocks(3, 6);
        blocks.remove(1);
        let state = ctx
            .factory
            .create_processing_blocks_state(chunk_response(node_address(2), blocks));

        let next = state.next_state(&mut ctx.conduit).await.unwrap();
        unpack_enum!(SyncState::CollectingAvailabilityResponses(_state) = next);
        assert_eq!(ctx.storage.committed_heights(), vec![1, 2]);
    }

    #[tokio::test]
    async fn chunk_not_following_last_committed_is_rejected() {
        let storage = MockBlockSyncStorage::with_committed_blocks(2);
        let mut ctx = SyncTestContext::with_storage(storage);
        let state = ctx
            .factory
            .create_processing_blocks_state(chunk_response(node_address(2), create_blocks(5, 8)));

        let next = state.next_state(&mut ctx.conduit).await.unwrap();
        unpack_enum!(SyncState::CollectingAvailabilityResponses(_state) = next);
        assert_eq!(ctx.storage.committed_heights(), vec![1, 2]);
    }

    #[tokio::test]
    async fn shutdown_stops_processing() {
        let mut ctx = SyncTestContext::new();
        let state = ctx
            .factory
            .create_processing_blocks_state(chunk_response(node_address(2), create_blocks(1, 3)));
        ctx.shutdown.trigger();
        assert!(state.next_state(&mut ctx.conduit).await.is_none());
        assert!(ctx.storage.committed_heights().is_empty());
    }
}
