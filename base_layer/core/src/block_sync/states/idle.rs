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
    states::SyncState,
};

const LOG_TARGET: &str = "c::bs::states::idle";

/// Waits for the no-commit timer. Every committed block restarts it.
pub struct IdleState {
    factory: Arc<StateFactory>,
}

impl IdleState {
    pub(crate) fn new(factory: Arc<StateFactory>) -> Self {
        Self { factory }
    }

    pub async fn next_state(self, conduit: &mut Conduit) -> Option<SyncState> {
        let mut shutdown_signal = self.factory.shutdown_signal();
        let mut no_commit_timer = self.factory.no_commit_timer();
        loop {
            tokio::select! {
                biased;

                _ = shutdown_signal.wait() => {
                    debug!(target: LOG_TARGET, "Shutdown while idle");
                    return None;
                },
                _ = &mut no_commit_timer => {
                    info!(
                        target: LOG_TARGET,
                        "No block committed for {:.2?}, starting block sync",
                        self.factory.config().no_commit_interval
                    );
                    return Some(self.factory.create_collecting_availability_responses_state());
                },
                event = conduit.next_event() => match event {
                    SyncEvent::IdleReset => {
                        trace!(target: LOG_TARGET, "Block committed, restarting the no-commit timer");
                        return Some(self.factory.create_idle_state());
                    },
                    event => trace!(target: LOG_TARGET, "Ignoring {} while idle", event),
                },
            }
        }
    }
}

impl fmt::Display for IdleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "idle-state")
    }
}

#[cfg(test)]
mod test {
    use meridian_test_utils::unpack_enum;

    use super::*;
    use crate::test_utils::{availability_response, node_address, SyncTestContext};

    #[tokio::test]
    async fn committed_block_restarts_idle() {
        let mut ctx = SyncTestContext::new();
        let state = ctx.factory.create_idle_state();
        ctx.handle.handle_block_committed();

        let next = state.next_state(&mut ctx.conduit).await.unwrap();
        unpack_enum!(SyncState::Idle(_state) = next);
        assert_eq!(ctx.timers.created(), 1);
    }

    #[tokio::test]
    async fn repeated_commits_keep_the_node_idle() {
        let mut ctx = SyncTestContext::new();
        let mut state = ctx.factory.create_idle_state();
        for _ in 0..3 {
            ctx.handle.handle_block_committed();
            state = state.next_state(&mut ctx.conduit).await.unwrap();
            assert_eq!(state.to_string(), "idle-state");
        }
        // Each idle state armed its own timer and none of them fired
        assert_eq!(ctx.timers.created(), 3);
        assert!(ctx.gossip.availability_requests().is_empty());
    }

    #[tokio::test]
    async fn no_commit_timer_starts_sync() {
        let mut ctx = SyncTestContext::new();
        let state = ctx.factory.create_idle_state();
        ctx.handle
            .handle_availability_response(availability_response(node_address(2), 1, 10, 10)).await;

        let (next, _) = tokio::join!(state.next_state(&mut ctx.conduit), ctx.timers.fire_once_created(1));
        unpack_enum!(SyncState::CollectingAvailabilityResponses(_state) = next.unwrap());
    }

    #[tokio::test]
    async fn shutdown_stops_idle() {
        let mut ctx = SyncTestContext::new();
        let state = ctx.factory.create_idle_state();
        ctx.shutdown.trigger();
        assert!(state.next_state(&mut ctx.conduit).await.is_none());
    }
}
