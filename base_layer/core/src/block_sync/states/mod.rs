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

//! The block sync states.
//!
//! ## Idle
//! The node follows consensus and every committed block restarts the no-commit timer. When the timer fires the node
//! assumes it has fallen behind and starts collecting availability responses.
//!
//! ## CollectingAvailabilityResponses
//! Broadcasts "who has the blocks after my last committed one?" and collects answers until the collect timer fires.
//!
//! ## FinishedCar
//! Picks one responder at random, or goes back to idle if nobody answered.
//!
//! ## WaitingForChunks
//! Requests the next batch from the chosen source and waits for its chunk. Chunks from anyone else are byzantine
//! and handled according to [ByzantineSourcePolicy](crate::block_sync::ByzantineSourcePolicy).
//!
//! ## ProcessingBlocks
//! Validates and commits the chunk block by block, stopping at the first failure, then starts another availability
//! round.
//!
//! Every state returns `None` once the shutdown signal resolves, which stops the state machine.

use std::{fmt, time::Instant};

use crate::block_sync::{conduit::Conduit, metrics};

mod collecting_availability_responses;
pub use collecting_availability_responses::CollectingAvailabilityResponsesState;

mod finished_car;
pub use finished_car::FinishedCarState;

mod idle;
pub use idle::IdleState;

mod processing_blocks;
pub use processing_blocks::ProcessingBlocksState;

mod waiting_for_chunks;
pub use waiting_for_chunks::WaitingForChunksState;

pub enum SyncState {
    Idle(IdleState),
    CollectingAvailabilityResponses(CollectingAvailabilityResponsesState),
    FinishedCar(FinishedCarState),
    WaitingForChunks(WaitingForChunksState),
    ProcessingBlocks(ProcessingBlocksState),
}

impl SyncState {
    /// Runs this state to completion. `None` means the state machine must stop.
    pub async fn next_state(self, conduit: &mut Conduit) -> Option<SyncState> {
        let name = self.name();
        let timer = Instant::now();
        let next = match self {
            SyncState::Idle(state) => state.next_state(conduit).await,
            SyncState::CollectingAvailabilityResponses(state) => state.next_state(conduit).await,
            SyncState::FinishedCar(state) => state.next_state(),
            SyncState::WaitingForChunks(state) => state.next_state(conduit).await,
            SyncState::ProcessingBlocks(state) => state.next_state(conduit).await,
        };
        metrics::time_in_state(name).observe(timer.elapsed().as_secs_f64());
        metrics::state_outcomes(name, next.as_ref().map(SyncState::name).unwrap_or("stopped")).inc();
        next
    }

    /// Short name used for metric labels
    pub fn name(&self) -> &'static str {
        match self {
            SyncState::Idle(_) => "idle",
            SyncState::CollectingAvailabilityResponses(_) => "collecting-availability-responses",
            SyncState::FinishedCar(_) => "finished-car",
            SyncState::WaitingForChunks(_) => "waiting-for-chunks",
            SyncState::ProcessingBlocks(_) => "processing-blocks",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Idle(state) => fmt::Display::fmt(state, f),
            SyncState::CollectingAvailabilityResponses(state) => fmt::Display::fmt(state, f),
            SyncState::FinishedCar(state) => fmt::Display::fmt(state, f),
            SyncState::WaitingForChunks(state) => fmt::Display::fmt(state, f),
            SyncState::ProcessingBlocks(state) => fmt::Display::fmt(state, f),
        }
    }
}

impl fmt::Debug for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
