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

use log::*;
use meridian_shutdown::ShutdownSignal;

use crate::block_sync::{
    conduit::{conduit, BlockSyncHandle, Conduit},
    config::BlockSyncConfig,
    factory::StateFactory,
    gossip::BlockSyncGossip,
    states::SyncState,
    storage::BlockSyncStorage,
};

const LOG_TARGET: &str = "c::bs::state_machine";

/// Drives the sync states until shutdown. Exactly one state is active at a time and owns the conduit while it runs.
pub struct BlockSyncStateMachine {
    factory: Arc<StateFactory>,
    conduit: Conduit,
}

impl BlockSyncStateMachine {
    pub fn new(factory: Arc<StateFactory>, conduit: Conduit) -> Self {
        Self { factory, conduit }
    }

    pub async fn run(mut self) {
        let config = self.factory.config();
        info!(
            target: LOG_TARGET,
            "Block sync started (batch size: {}, no-commit interval: {:.2?}, byzantine source policy: {})",
            config.batch_size,
            config.no_commit_interval,
            config.byzantine_source_policy
        );

        let mut state = Some(self.factory.create_idle_state());
        while let Some(current) = state {
            debug!(target: LOG_TARGET, "Block sync entering {}", current);
            state = current.next_state(&mut self.conduit).await;
        }

        info!(target: LOG_TARGET, "Block sync stopped");
    }
}

/// Wires a state machine to its mailbox. Feed the returned handle from consensus and from gossip, then spawn
/// [BlockSyncStateMachine::run].
pub fn initialize_block_sync(
    config: BlockSyncConfig,
    gossip: Arc<dyn BlockSyncGossip>,
    storage: Arc<dyn BlockSyncStorage>,
    shutdown_signal: ShutdownSignal,
) -> (BlockSyncHandle, BlockSyncStateMachine) {
    let (handle, conduit) = conduit(config.conduit_capacity);
    let factory = Arc::new(StateFactory::new(config, gossip, storage, shutdown_signal));
    (handle, BlockSyncStateMachine::new(factory, conduit))
}
