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

use std::{fmt, sync::Arc};

use log::*;
use meridian_comms::NodeAddress;

use crate::block_sync::{
    config::ByzantineSourcePolicy,
    conduit::{Conduit, SyncEvent},
    factory::StateFactory,
    states::SyncState,
};

const LOG_TARGET: &str = "c::bs::states::waiting_for_chunks";

/// Requests the next batch from `source` and waits for its chunk.
pub struct WaitingForChunksState {
    factory: Arc<StateFactory>,
    source: NodeAddress,
}

impl WaitingForChunksState {
    pub(crate) fn new(factory: Arc<StateFactory>, source: NodeAddress) -> Self {
        Self { factory, source }
    }

    pub fn source(&self) -> &NodeAddress {
        &self.source
    }

    pub async fn next_state(self, conduit: &mut Conduit) -> Option<SyncState> {
        let mut shutdown_signal = self.factory.shutdown_signal();

        let result = tokio::select! {
            biased;

            _ = shutdown_signal.wait() => return None,
            result = self.factory.client().send_block_sync_request(self.source) => result,
        };
        if let Err(err) = result {
            warn!(
                target: LOG_TARGET,
                "Failed to request blocks from {}: {}",
                self.source.short_str(),
                err
            );
            return Some(self.factory.create_idle_state());
        }

        let mut collect_timer = self.factory.collect_chunks_timer();
        loop {
            tokio::select! {
                biased;

                _ = shutdown_signal.wait() => {
                    debug!(target: LOG_TARGET, "Shutdown while waiting for chunks");
                    return None;
                },
                _ = &mut collect_timer => {
                    info!(
                        target: LOG_TARGET,
                        "Timed out waiting for a chunk from {}",
                        self.source.short_str()
                    );
                    return Some(self.factory.create_idle_state());
                },
                event = conduit.next_event() => match event {
                    SyncEvent::ChunkResponse(response) => {
                        let sender = *response.sender_address();
                        if sender == self.source {
                            debug!(
                                target: LOG_TARGET,
                                "Received {} block(s) from {}",
                                response.block_pairs.len(),
                                sender.short_str()
                            );
                            return Some(self.factory.create_processing_blocks_state(response));
                        }
                        let policy = self.factory.byzantine_source_policy();
                        warn!(
                            target: LOG_TARGET,
                            "Byzantine message detected: chunk from {} while waiting for {} (policy: {})",
                            sender.short_str(),
                            self.source.short_str(),
                            policy
                        );
                        if policy == ByzantineSourcePolicy::AbortToIdle {
                            return Some(self.factory.create_idle_state());
                        }
                    },
                    event => trace!(target: LOG_TARGET, "Ignoring {} while waiting for chunks", event),
                },
            }
        }
    }
}

impl fmt::Display for WaitingForChunksState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "waiting-for-chunks-state-from-{}", self.source.short_str())
    }
}
