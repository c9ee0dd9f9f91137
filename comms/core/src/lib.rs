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

//! # Meridian comms
//!
//! Point to point transport used by the gossip layer. Each node keeps one outgoing TCP connection per peer in the
//! topology and accepts the peers' connections on its own server socket. Messages are written as length prefixed
//! frames ([frame]) and every non-keepalive frame is acknowledged, which lets the sender measure round trip times.
//!
//! Sending never blocks: each outgoing connection has a bounded [queue::TransportQueue] and a message that does not
//! fit is dropped and counted. Inbound payloads are handed to a [TransportListener] on the socket's reader task.
//!
//! [MemoryTransport] implements the same [Transport] trait in-process for simulations and tests.

#[macro_use]
mod macros;

pub mod config;
pub use config::TransportConfig;

pub mod error;
pub use error::{ConnectionError, FrameError, QueueError, TopologyError, TransportError};

pub mod frame;

mod memory;
pub use memory::{MemoryNetwork, MemoryTransport};

mod metrics;

pub mod outgoing;

pub mod queue;

pub mod server;

pub mod test_utils;

pub mod topology;
pub use topology::{peer_diff, FileTopologyProvider, StaticTopologyProvider, TopologyProvider};

mod transport;
pub use transport::{DirectTransport, MessageContext, MessageOrigin, Transport, TransportListener};

pub mod types;
pub use types::{NodeAddress, Peer, RecipientMode, TransportData, TransportPeers};
