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
use serde::{Deserialize, Serialize};

pub type BlockHeight = u64;

/// A committed unit of the chain: the transactions block and its execution results. Sync treats both as opaque and
/// only looks at the height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPair {
    pub height: BlockHeight,
    pub transactions_block: Bytes,
    pub results_block: Bytes,
    pub prev_hash: Bytes,
}

impl BlockPair {
    pub fn new(height: BlockHeight, transactions_block: Bytes, results_block: Bytes, prev_hash: Bytes) -> Self {
        Self {
            height,
            transactions_block,
            results_block,
            prev_hash,
        }
    }

    pub fn height(&self) -> BlockHeight {
        self.height
    }
}

impl fmt::Display for BlockPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block #{} ({} tx bytes, {} result bytes)",
            self.height,
            self.transactions_block.len(),
            self.results_block.len()
        )
    }
}

/// True if `blocks` are ordered by height without gaps and the first one directly follows `last_committed`.
pub fn is_consecutive_after(last_committed: BlockHeight, blocks: &[BlockPair]) -> bool {
    blocks
        .iter()
        .zip(last_committed.saturating_add(1)..)
        .all(|(block, expected)| block.height == expected)
}
