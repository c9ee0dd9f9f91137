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

//! In-memory collaborators for exercising block sync without a chain or a network.

use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bytes::Bytes;
use meridian_comms::{NodeAddress, TransportError};
use meridian_shutdown::Shutdown;

use crate::{
    block_sync::{
        conduit,
        BlockAvailabilityRequest,
        BlockAvailabilityResponse,
        BlockSyncConfig,
        BlockSyncGossip,
        BlockSyncHandle,
        BlockSyncRange,
        BlockSyncRequest,
        BlockSyncResponse,
        BlockSyncStorage,
        Conduit,
        GossipError,
        ManualTimers,
        SenderSignature,
        StateFactory,
        StorageError,
    },
    blocks::{BlockHeight, BlockPair},
};

pub fn node_address(n: u8) -> NodeAddress {
    NodeAddress::from_bytes([n; 20])
}

pub fn create_block(height: BlockHeight) -> BlockPair {
    BlockPair::new(
        height,
        Bytes::from(format!("transactions-{}", height)),
        Bytes::from(format!("results-{}", height)),
        Bytes::from(format!("hash-{}", height.saturating_sub(1))),
    )
}

/// Blocks `from..=to`
pub fn create_blocks(from: BlockHeight, to: BlockHeight) -> Vec<BlockPair> {
    (from..=to).map(create_block).collect()
}

pub fn availability_response(
    sender: NodeAddress,
    first: BlockHeight,
    last: BlockHeight,
    last_committed: BlockHeight,
) -> BlockAvailabilityResponse {
    BlockAvailabilityResponse {
        sender: SenderSignature::unsigned(sender),
        signed_batch_range: BlockSyncRange::new(first, last, last_committed),
    }
}

pub fn chunk_response(sender: NodeAddress, block_pairs: Vec<BlockPair>) -> BlockSyncResponse {
    let first = block_pairs.first().map(|b| b.height).unwrap_or_default();
    let last = block_pairs.last().map(|b| b.height).unwrap_or_default();
    BlockSyncResponse {
        sender: SenderSignature::unsigned(sender),
        signed_chunk_range: BlockSyncRange::new(first, last, last),
        block_pairs,
    }
}

#[derive(Default)]
struct StorageState {
    blocks: BTreeMap<BlockHeight, BlockPair>,
    fail_validation_at: HashSet<BlockHeight>,
    fail_commit_at: HashSet<BlockHeight>,
    consensus_updates: usize,
    calls: Vec<String>,
}

/// Block storage backed by a map. Blocks can be made to fail validation or commit by height.
#[derive(Clone, Default)]
pub struct MockBlockSyncStorage {
    state: Arc<Mutex<StorageState>>,
}

impl MockBlockSyncStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage holding committed blocks `1..=height`
    pub fn with_committed_blocks(height: BlockHeight) -> Self {
        Self::with_blocks(create_blocks(1, height))
    }

    pub fn with_blocks(blocks: Vec<BlockPair>) -> Self {
        let storage = Self::new();
        acquire_lock!(storage.state).blocks = blocks.into_iter().map(|b| (b.height, b)).collect();
        storage
    }

    pub fn fail_validation_at(&self, height: BlockHeight) {
        acquire_lock!(self.state).fail_validation_at.insert(height);
    }

    pub fn fail_commit_at(&self, height: BlockHeight) {
        acquire_lock!(self.state).fail_commit_at.insert(height);
    }

    pub fn committed_heights(&self) -> Vec<BlockHeight> {
        acquire_lock!(self.state).blocks.keys().copied().collect()
    }

    pub fn consensus_updates(&self) -> usize {
        acquire_lock!(self.state).consensus_updates
    }

    pub fn calls(&self) -> Vec<String> {
        acquire_lock!(self.state).calls.clone()
    }
}

#[async_trait]
impl BlockSyncStorage for MockBlockSyncStorage {
    async fn last_committed_block_height(&self) -> Result<BlockHeight, StorageError> {
        Ok(acquire_lock!(self.state).blocks.keys().next_back().copied().unwrap_or(0))
    }

    async fn validate_block_for_commit(
        &self,
        block: &BlockPair,
        prev: Option<&BlockPair>,
    ) -> Result<(), StorageError> {
        let mut lock = acquire_lock!(self.state);
        let prev = prev.map(|p| format!("#{}", p.height)).unwrap_or_else(|| "none".to_string());
        lock.calls.push(format!("validate #{} prev {}", block.height, prev));
        if lock.fail_validation_at.contains(&block.height) {
            return Err(StorageError::ValidationFailed {
                height: block.height,
                reason: "rejected by mock".to_string(),
            });
        }
        Ok(())
    }

    async fn commit_block(&self, block: &BlockPair) -> Result<(), StorageError> {
        let mut lock = acquire_lock!(self.state);
        lock.calls.push(format!("commit #{}", block.height));
        if lock.fail_commit_at.contains(&block.height) {
            return Err(StorageError::CommitFailed {
                height: block.height,
                reason: "rejected by mock".to_string(),
            });
        }
        lock.blocks.insert(block.height, block.clone());
        Ok(())
    }

    async fn update_consensus_about_last_committed_block(&self) {
        let mut lock = acquire_lock!(self.state);
        lock.calls.push("update_consensus".to_string());
        lock.consensus_updates += 1;
    }

    async fn block(&self, height: BlockHeight) -> Result<Option<BlockPair>, StorageError> {
        Ok(acquire_lock!(self.state).blocks.get(&height).cloned())
    }

    async fn block_range(&self, from: BlockHeight, to: BlockHeight) -> Result<Vec<BlockPair>, StorageError> {
        if from > to {
            return Ok(Vec::new());
        }
        Ok(acquire_lock!(self.state)
            .blocks
            .range(from..=to)
            .map(|(_, b)| b.clone())
            .collect())
    }
}

#[derive(Default)]
struct GossipState {
    fail_sends: bool,
    availability_requests: Vec<BlockAvailabilityRequest>,
    availability_responses: Vec<(NodeAddress, BlockAvailabilityResponse)>,
    sync_requests: Vec<(NodeAddress, BlockSyncRequest)>,
    sync_responses: Vec<(NodeAddress, BlockSyncResponse)>,
    calls: Vec<String>,
}

/// Records every outbound sync message.
#[derive(Clone, Default)]
pub struct MockBlockSyncGossip {
    state: Arc<Mutex<GossipState>>,
}

impl MockBlockSyncGossip {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_sends(&self, fail: bool) {
        acquire_lock!(self.state).fail_sends = fail;
    }

    pub fn availability_requests(&self) -> Vec<BlockAvailabilityRequest> {
        acquire_lock!(self.state).availability_requests.clone()
    }

    pub fn availability_responses(&self) -> Vec<(NodeAddress, BlockAvailabilityResponse)> {
        acquire_lock!(self.state).availability_responses.clone()
    }

    pub fn sync_requests(&self) -> Vec<(NodeAddress, BlockSyncRequest)> {
        acquire_lock!(self.state).sync_requests.clone()
    }

    pub fn sync_responses(&self) -> Vec<(NodeAddress, BlockSyncResponse)> {
        acquire_lock!(self.state).sync_responses.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        acquire_lock!(self.state).calls.clone()
    }

    fn record(&self, call: String) -> Result<(), GossipError> {
        let mut lock = acquire_lock!(self.state);
        if lock.fail_sends {
            return Err(TransportError::Unimplemented("mock send failure").into());
        }
        lock.calls.push(call);
        Ok(())
    }
}

#[async_trait]
impl BlockSyncGossip for MockBlockSyncGossip {
    async fn broadcast_block_availability_request(&self, message: BlockAvailabilityRequest) -> Result<(), GossipError> {
        self.record(format!("broadcast availability request {}", message.signed_batch_range))?;
        acquire_lock!(self.state).availability_requests.push(message);
        Ok(())
    }

    async fn send_block_availability_response(
        &self,
        recipient: NodeAddress,
        message: BlockAvailabilityResponse,
    ) -> Result<(), GossipError> {
        self.record(format!("availability response to {}", recipient.short_str()))?;
        acquire_lock!(self.state).availability_responses.push((recipient, message));
        Ok(())
    }

    async fn send_block_sync_request(&self, recipient: NodeAddress, message: BlockSyncRequest) -> Result<(), GossipError> {
        self.record(format!("sync request to {}", recipient.short_str()))?;
        acquire_lock!(self.state).sync_requests.push((recipient, message));
        Ok(())
    }

    async fn send_block_sync_response(
        &self,
        recipient: NodeAddress,
        message: BlockSyncResponse,
    ) -> Result<(), GossipError> {
        self.record(format!("sync response to {}", recipient.short_str()))?;
        acquire_lock!(self.state).sync_responses.push((recipient, message));
        Ok(())
    }
}

/// A state factory on mocks and manual timers, plus the mailbox its states read from.
pub struct SyncTestContext {
    pub factory: Arc<StateFactory>,
    pub storage: MockBlockSyncStorage,
    pub gossip: MockBlockSyncGossip,
    pub timers: ManualTimers,
    pub shutdown: Shutdown,
    pub handle: BlockSyncHandle,
    pub conduit: Conduit,
}

impl SyncTestContext {
    pub fn new() -> Self {
        Self::build(Self::default_config(), MockBlockSyncStorage::new())
    }

    pub fn with_committed_blocks(height: BlockHeight) -> Self {
        Self::build(Self::default_config(), MockBlockSyncStorage::with_committed_blocks(height))
    }

    pub fn with_storage(storage: MockBlockSyncStorage) -> Self {
        Self::build(Self::default_config(), storage)
    }

    pub fn with_config(config: BlockSyncConfig) -> Self {
        Self::build(config, MockBlockSyncStorage::new())
    }

    pub fn default_config() -> BlockSyncConfig {
        BlockSyncConfig {
            node_address: node_address(1),
            batch_size: 10,
            ..Default::default()
        }
    }

    fn build(config: BlockSyncConfig, storage: MockBlockSyncStorage) -> Self {
        let gossip = MockBlockSyncGossip::new();
        let timers = ManualTimers::new();
        let shutdown = Shutdown::new();
        let (handle, conduit) = conduit::conduit(config.conduit_capacity);
        let factory = StateFactory::new(
            config,
            Arc::new(gossip.clone()),
            Arc::new(storage.clone()),
            shutdown.to_signal(),
        )
        .with_manual_timers(&timers);
        Self {
            factory: Arc::new(factory),
            storage,
            gossip,
            timers,
            shutdown,
            handle,
            conduit,
        }
    }
}

impl Default for SyncTestContext {
    fn default() -> Self {
        Self::new()
    }
}
