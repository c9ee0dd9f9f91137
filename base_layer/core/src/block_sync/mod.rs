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

//! # Block sync
//!
//! Catch-up synchronisation for a node that has fallen behind the network. It runs as a single state machine task
//! ([BlockSyncStateMachine]) fed through a bounded mailbox ([Conduit]). Consensus reports every committed block and
//! the gossip layer reports sync responses through a [BlockSyncHandle]; neither ever blocks on the state machine.
//!
//! ```text
//!             IdleReset
//!           +-----------+
//!           v           |
//!         Idle ---------+
//!           | no-commit timer
//!           v
//!   CollectingAvailabilityResponses <-------------+
//!           | collect timer                        |
//!           v                                      |
//!      FinishedCar ---(no responses)---> Idle      |
//!           | random responder                     |
//!           v                                      |
//!    WaitingForChunks --(timeout)--> Idle          |
//!           | chunk from the chosen source         |
//!           v                                      |
//!    ProcessingBlocks -----------------------------+
//! ```
//!
//! The serving side is [BlockSyncResponder], which answers other nodes' requests from local storage.

mod config;
pub use config::{BlockSyncConfig, ByzantineSourcePolicy};

pub mod conduit;
pub use conduit::{BlockSyncHandle, Conduit, SyncEvent};

mod error;
pub use error::{BlockSyncError, CodecError, GossipError, StorageError};

mod factory;
pub use factory::StateFactory;

mod gossip;
pub use gossip::{BlockSyncClient, BlockSyncGossip, BlockSyncHandler};

mod messages;
pub use messages::{
    BlockAvailabilityRequest,
    BlockAvailabilityResponse,
    BlockSyncRange,
    BlockSyncRequest,
    BlockSyncResponse,
    BlockType,
    SenderSignature,
};

pub(crate) mod metrics;

mod responder;
pub use responder::{server_range, BlockSyncResponder};

mod state_machine;
pub use state_machine::{initialize_block_sync, BlockSyncStateMachine};

pub mod states;
pub use states::SyncState;

mod storage;
pub use storage::BlockSyncStorage;

mod timer;
pub use timer::{tokio_timer_factory, ManualTimers, Timer, TimerFactory};
