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
use rand::seq::SliceRandom;

use crate::block_sync::{factory::StateFactory, messages::BlockAvailabilityResponse, states::SyncState};

const LOG_TARGET: &str = "c::bs::states::finished_car";

pub struct FinishedCarState {
    factory: Arc<StateFactory>,
    responses: Vec<BlockAvailabilityResponse>,
}

impl FinishedCarState {
    pub(crate) fn new(factory: Arc<StateFactory>, responses: Vec<BlockAvailabilityResponse>) -> Self {
        Self { factory, responses }
    }

    pub fn responses(&self) -> &[BlockAvailabilityResponse] {
        &self.responses
    }

    /// Picks a random responder as the source of the next chunk.
    pub fn next_state(self) -> Option<SyncState> {
        if self.factory.shutdown_signal().is_triggered() {
            return None;
        }

        let source = self
            .responses
            .choose(&mut rand::thread_rng())
            .map(|response| response.sender.sender_node_address);
        match source {
            Some(source) => {
                debug!(
                    target: LOG_TARGET,
                    "Syncing from {} (chosen from {} responder(s))",
                    source.short_str(),
                    self.responses.len()
                );
                Some(self.factory.create_waiting_for_chunks_state(source))
            },
            None => {
                debug!(target: LOG_TARGET, "No node can serve the next batch");
                Some(self.factory.create_idle_state())
            },
        }
    }
}

impl fmt::Display for FinishedCarState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "finished-collecting-availability-requests-with-{}-responses",
            self.responses.len()
        )
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use meridian_test_utils::unpack_enum;

    use super::*;
    use crate::test_utils::{availability_response, node_address, SyncTestContext};

    #[tokio::test]
    async fn no_responses_returns_to_idle() {
        let mut ctx = SyncTestContext::new();
        let state = ctx.factory.create_finished_car_state(Vec::new());
        let next = state.next_state(&mut ctx.conduit).await.unwrap();
        unpack_enum!(SyncState::Idle(_state) = next);
    }

    #[tokio::test]
    async fn single_response_selects_its_sender() {
        let mut ctx = SyncTestContext::new();
        let responses = vec![availability_response(node_address(7), 1, 10, 10)];
        let state = ctx.factory.create_finished_car_state(responses);
        let next = state.next_state(&mut ctx.conduit).await.unwrap();
        unpack_enum!(SyncState::WaitingForChunks(waiting) = next);
        assert_eq!(waiting.source(), &node_address(7));
    }

    #[tokio::test]
    async fn source_is_one_of_the_responders() {
        let ctx = SyncTestContext::new();
        let responders = [node_address(2), node_address(3), node_address(4)];
        let mut chosen = HashSet::new();
        for _ in 0..64 {
            let responses = responders
                .iter()
                .map(|addr| availability_response(*addr, 1, 10, 10))
                .collect();
            let state = FinishedCarState::new(ctx.factory.clone(), responses);
            unpack_enum!(SyncState::WaitingForChunks(waiting) = state.next_state().unwrap());
            assert!(responders.contains(waiting.source()));
            chosen.insert(*waiting.source());
        }
        assert!(chosen.len() > 1);
    }

    #[tokio::test]
    async fn shutdown_stops_finished_car() {
        let ctx = SyncTestContext::new();
        ctx.shutdown.trigger();
        let state = FinishedCarState::new(ctx.factory.clone(), vec![availability_response(
            node_address(2),
            1,
            10,
            10,
        )]);
        assert!(state.next_state().is_none());
    }
}
