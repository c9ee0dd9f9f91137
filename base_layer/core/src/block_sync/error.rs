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

use meridian_comms::TransportError;
use thiserror::Error;

use crate::blocks::BlockHeight;

/// Errors reported by a [BlockSyncStorage](crate::block_sync::BlockSyncStorage) implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Block #{0} not found")]
    BlockNotFound(BlockHeight),
    #[error("Block #{height} failed validation: {reason}")]
    ValidationFailed { height: BlockHeight, reason: String },
    #[error("Failed to commit block #{height}: {reason}")]
    CommitFailed { height: BlockHeight, reason: String },
    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Message has no gossip header")]
    MissingHeader,
    #[error("Expected {expected} payloads for a {kind} message but got {actual}")]
    PayloadCount {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),
}

#[derive(Debug, Error)]
pub enum GossipError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

#[derive(Debug, Error)]
pub enum BlockSyncError {
    #[error("invalid block request: from {first} to {last}")]
    InvalidBlockRequest { first: BlockHeight, last: BlockHeight },
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Gossip error: {0}")]
    Gossip(#[from] GossipError),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}
