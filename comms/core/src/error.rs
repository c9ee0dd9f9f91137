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

use std::io;

use thiserror::Error;

use crate::types::NodeAddress;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Frame declares {count} payloads, the maximum is {max}")]
    TooManyPayloads { count: usize, max: usize },
    #[error("Frame payload of {size} bytes exceeds the maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },
    #[error("Timed out waiting for frame data")]
    Timeout,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Corrupt frames indicate a misbehaving peer rather than a network problem.
    pub fn is_corruption(&self) -> bool {
        matches!(self, FrameError::TooManyPayloads { .. } | FrameError::PayloadTooLarge { .. })
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("The queue is disabled")]
    Disabled,
    #[error("Queue byte capacity exceeded ({size} + {incoming} > {max})")]
    BytesExceeded { size: usize, incoming: usize, max: usize },
    #[error("Queue message capacity exceeded (max {max})")]
    MessagesExceeded { max: usize },
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Timed out connecting to {0}")]
    ConnectTimeout(String),
    #[error("Failed to connect to {address}: {source}")]
    ConnectFailed { address: String, source: io::Error },
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("The peer closed the connection")]
    ClosedByPeer,
    #[error("Unexpected acknowledgement token {0:02x?}")]
    UnexpectedAck([u8; 4]),
}

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("Failed to read topology file: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed topology file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport data of {size} bytes exceeds the maximum of {max} bytes")]
    DataExceedsCapacity { size: usize, max: usize },
    #[error("Recipient {0} is not connected")]
    UnknownRecipient(NodeAddress),
    #[error("Recipient mode '{0}' is not implemented")]
    Unimplemented(&'static str),
    #[error("Peers would reject this message: {0}")]
    InvalidFrame(#[from] FrameError),
    #[error("Failed to bind listener on {address}: {source}")]
    BindFailed { address: String, source: io::Error },
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
