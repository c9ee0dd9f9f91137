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

use std::fmt;

use bytes::Bytes;
use meridian_comms::NodeAddress;
use serde::{Deserialize, Serialize};

use crate::blocks::{BlockHeight, BlockPair};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BlockType {
    #[default]
    BlockPair,
}

/// Identity of the node that created a message. This is the identity sync trusts, never the connection a message
/// arrived on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderSignature {
    pub sender_node_address: NodeAddress,
    pub signature: Bytes,
}

impl SenderSignature {
    pub fn unsigned(sender_node_address: NodeAddress) -> Self {
        Self {
            sender_node_address,
            signature: Bytes::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSyncRange {
    pub block_type: BlockType,
    pub first_block_height: BlockHeight,
    pub last_block_height: BlockHeight,
    pub last_committed_block_height: BlockHeight,
}

impl BlockSyncRange {
    pub fn new(first: BlockHeight, last: BlockHeight, last_committed: BlockHeight) -> Self {
        Self {
            block_type: BlockType::BlockPair,
            first_block_height: first,
            last_block_height: last,
            last_committed_block_height: last_committed,
        }
    }
}

impl fmt::Display for BlockSyncRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}..={}] (last committed #{})",
            self.first_block_height, self.last_block_height, self.last_committed_block_height
        )
    }
}

/// "Who can give me these blocks?", broadcast to every peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAvailabilityRequest {
    pub sender: SenderSignature,
    pub signed_batch_range: BlockSyncRange,
}

/// The part of a requested range the responder is able to serve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAvailabilityResponse {
    pub sender: SenderSignature,
    pub signed_batch_range: BlockSyncRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSyncRequest {
    pub sender: SenderSignature,
    pub signed_chunk_range: BlockSyncRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSyncResponse {
    pub sender: SenderSignature,
    pub signed_chunk_range: BlockSyncRange,
    pub block_pairs: Vec<BlockPair>,
}

impl BlockSyncResponse {
    pub fn sender_address(&self) -> &NodeAddress {
        &self.sender.sender_node_address
    }
}
