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

use crate::block_sync::{
    conduit::{Conduit, SyncEvent},
    factory::StateFactory,
    messages::BlockAvailabilityResponse,
    states::SyncState,
};

const LOG_TARGET: &str = "c::bs::states::collecting_availability_responses";

/// Asks the network who can serve the next batch and collects the answers until the collect timer fires.
pub struct CollectingAvailabilityResponsesState {
    factory: Arc<StateFactory>,
}

impl CollectingAvailabilityResponsesState {
    pub(crate) fn new(factory: Arc<StateFactory>) -> Self {
        Self { factory }
    }

    pub async fn next_state(self, conduit: &mut Conduit) -> Option<SyncState> {
        let mut shutdown_signal = self.factory.shutdown_signal();
        let client = self.factory.client();

        tokio::select! {
            biased;

            _ = shutdown_signal.wait() => return None,
            _ = client.update_consensus_about_last_committed_block() => {},
        }

        let result = tokio::select! {
            biased;

            _ = shutdown_signal.wait() => return None,
            result = client.broadcast_block_availability_request() => result,
        };
        if let Err(err) = result {
            warn!(target: LOG_TARGET, "Failed to broadcast block availability request: {}", err);
            return Some(self.factory.create_idle_state());
        }

        let mut collect_timer = self.factory.collect_responses_timer();
        let mut responses = Vec::<BlockAvailabilityResponse>::new();
        loop {
            tokio::select! {
                biased;

                _ = shutdown_signal.wait() => {
                    debug!(target: LOG_TARGET, "Shutdown while collecting availability responses");
                    return None;
                },
                _ = &mut collect_timer => {
                    debug!(target: LOG_TARGET, "Collected {} availability response(s)", responses.len());
                    return Some(self.factory.create_finished_car_state(responses));
                },
                event = conduit.next_event() => match event {
                    SyncEvent::AvailabilityResponse(response) => {
                        let sender = response.sender.sender_node_address;
                        if responses.iter().any(|r| r.sender.sender_node_address == sender) {
                            debug!(target: LOG_TARGET, "Duplicate availability response from {}", sender.short_str());
                        } else {
                            debug!(
                                target: LOG_TARGET,
                                "{} can serve {}",
                                sender.short_str(),
                                response.signed_batch_range
                            );
                            responses.push(response);
                        }
                    },
                    event => trace!(target: LOG_TARGET, "Ignoring {} while collecting availability responses", event),
                },
            }
        }
    }
}

impl fmt::Display for CollectingAvailabilityResponsesState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "collecting-availability-responses-state")
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use meridian_test_utils::{async_assert_eventually, unpack_enum};

    use super::*;
    use crate::{
        block_sync::{config::BlockSyncConfig, messages::BlockSyncRange},
        test_utils::{availability_response, chunk_response, create_blocks, node_address, SyncTestContext},
    };

    #[tokio::test]
    async fn broadcasts_and_collects_responses() {
        let mut ctx = SyncTestContext::with_committed_blocks(3);
        let state = ctx.factory.create_collecting_availability_responses_state();
        ctx.handle
            .handle_availability_response(availability_response(node_address(2), 4, 13, 20)).await;
        ctx.handle.handle_chunk_response(chunk_response(node_address(3), create_blocks(4, 5))).await;
        ctx.handle
            .handle_availability_response(availability_response(node_address(3), 4, 13, 30)).await;
        ctx.handle
            .handle_availability_response(availability_response(node_address(2), 4, 13, 20)).await;

        let (next, _) = tokio::join!(state.next_state(&mut ctx.conduit), ctx.timers.fire_once_created(1));
        let next = next.unwrap();
        assert_eq!(
            next.to_string(),
            "finished-collecting-availability-requests-with-2-responses"
        );

        let requests = ctx.gossip.availability_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].signed_batch_range, BlockSyncRange::new(4, 13, 3));
        assert_eq!(ctx.storage.consensus_updates(), 1);
    }

    #[tokio::test]
    async fn broadcast_failure_returns_to_idle() {
        let mut ctx = SyncTestContext::new();
        ctx.gossip.set_fail_sends(true);
        let state = ctx.factory.create_collecting_availability_responses_state();
        let next = state.next_state(&mut ctx.conduit).await.unwrap();
        unpack_enum!(SyncState::Idle(_state) = next);
    }

    #[tokio::test]
    async fn zero_batch_size_returns_to_idle() {
        let mut ctx = SyncTestContext::with_config(BlockSyncConfig {
            batch_size: 0,
            ..SyncTestContext::default_config()
        });
        let state = ctx.factory.create_collecting_availability_responses_state();
        let next = state.next_state(&mut ctx.conduit).await.unwrap();
        unpack_enum!(SyncState::Idle(_state) = next);
        assert!(ctx.gossip.availability_requests().is_empty());
    }

    #[tokio::test]
    async fn shutdown_stops_collecting() {
        let mut ctx = SyncTestContext::new();
        let state = ctx.factory.create_collecting_availability_responses_state();
        let gossip = ctx.gossip.clone();
        let shutdown = ctx.shutdown.clone();
        let (next, _) = tokio::join!(state.next_state(&mut ctx.conduit), async move {
            async_assert_eventually!(
                gossip.availability_requests().len(),
                expect = 1,
                max_attempts = 100,
                interval = Duration::from_millis(5)
            );
            shutdown.trigger();
        });
        assert!(next.is_none());
    }
}
