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

use meridian_comms::NodeAddress;
use meridian_shutdown::ShutdownSignal;

use crate::block_sync::{
    config::{BlockSyncConfig, ByzantineSourcePolicy},
    gossip::{BlockSyncClient, BlockSyncGossip},
    messages::{BlockAvailabilityResponse, BlockSyncResponse},
    states::{
        CollectingAvailabilityResponsesState,
        FinishedCarState,
        IdleState,
        ProcessingBlocksState,
        SyncState,
        WaitingForChunksState,
    },
    storage::BlockSyncStorage,
    timer::{tokio_timer_factory, ManualTimers, Timer, TimerFactory},
};

/// Builds every sync state and holds what they share: the gossip client, storage, timers and the shutdown signal.
pub struct StateFactory {
    config: BlockSyncConfig,
    client: BlockSyncClient,
    storage: Arc<dyn BlockSyncStorage>,
    shutdown_signal: ShutdownSignal,
    no_commit_timer: TimerFactory,
    collect_responses_timer: TimerFactory,
    collect_chunks_timer: TimerFactory,
}

impl StateFactory {
    pub fn new(
        config: BlockSyncConfig,
        gossip: Arc<dyn BlockSyncGossip>,
        storage: Arc<dyn BlockSyncStorage>,
        shutdown_signal: ShutdownSignal,
    ) -> Self {
        let client = BlockSyncClient::new(gossip, storage.clone(), config.node_address, config.batch_size);
        Self {
            config,
            client,
            storage,
            shutdown_signal,
            no_commit_timer: tokio_timer_factory(),
            collect_responses_timer: tokio_timer_factory(),
            collect_chunks_timer: tokio_timer_factory(),
        }
    }

    pub fn with_no_commit_timer(mut self, timer: TimerFactory) -> Self {
        self.no_commit_timer = timer;
        self
    }

    pub fn with_collect_responses_timer(mut self, timer: TimerFactory) -> Self {
        self.collect_responses_timer = timer;
        self
    }

    pub fn with_collect_chunks_timer(mut self, timer: TimerFactory) -> Self {
        self.collect_chunks_timer = timer;
        self
    }

    /// Every state timer only fires through `timers`.
    pub fn with_manual_timers(self, timers: &ManualTimers) -> Self {
        self.with_no_commit_timer(timers.factory())
            .with_collect_responses_timer(timers.factory())
            .with_collect_chunks_timer(timers.factory())
    }

    pub fn config(&self) -> &BlockSyncConfig {
        &self.config
    }

    pub fn create_idle_state(self: &Arc<Self>) -> SyncState {
        SyncState::Idle(IdleState::new(self.clone()))
    }

    pub fn create_collecting_availability_responses_state(self: &Arc<Self>) -> SyncState {
        SyncState::CollectingAvailabilityResponses(CollectingAvailabilityResponsesState::new(self.clone()))
    }

    pub fn create_finished_car_state(self: &Arc<Self>, responses: Vec<BlockAvailabilityResponse>) -> SyncState {
        SyncState::FinishedCar(FinishedCarState::new(self.clone(), responses))
    }

    pub fn create_waiting_for_chunks_state(self: &Arc<Self>, source: NodeAddress) -> SyncState {
        SyncState::WaitingForChunks(WaitingForChunksState::new(self.clone(), source))
    }

    pub fn create_processing_blocks_state(self: &Arc<Self>, response: BlockSyncResponse) -> SyncState {
        SyncState::ProcessingBlocks(ProcessingBlocksState::new(self.clone(), response))
    }

    pub(crate) fn client(&self) -> &BlockSyncClient {
        &self.client
    }

    pub(crate) fn storage(&self) -> &Arc<dyn BlockSyncStorage> {
        &self.storage
    }

    pub(crate) fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown_signal.clone()
    }

    pub(crate) fn byzantine_source_policy(&self) -> ByzantineSourcePolicy {
        self.config.byzantine_source_policy
    }

    pub(crate) fn no_commit_timer(&self) -> Timer {
        (self.no_commit_timer)(self.config.no_commit_interval)
    }

    pub(crate) fn collect_responses_timer(&self) -> Timer {
        (self.collect_responses_timer)(self.config.collect_responses_timeout)
    }

    pub(crate) fn collect_chunks_timer(&self) -> Timer {
        (self.collect_chunks_timer)(self.config.collect_chunks_timeout)
    }
}
