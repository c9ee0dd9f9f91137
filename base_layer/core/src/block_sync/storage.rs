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

use async_trait::async_trait;

use crate::{
    block_sync::error::StorageError,
    blocks::{BlockHeight, BlockPair},
};

/// The block store sync reads from and commits to.
#[async_trait]
pub trait BlockSyncStorage: Send + Sync {
    async fn last_committed_block_height(&self) -> Result<BlockHeight, StorageError>;

    /// Checks `block` before it is committed. `prev` is the block directly below it when the caller has it.
    async fn validate_block_for_commit(&self, block: &BlockPair, prev: Option<&BlockPair>)
        -> Result<(), StorageError>;

    async fn commit_block(&self, block: &BlockPair) -> Result<(), StorageError>;

    /// Lets consensus know the current last committed block. Called before each availability round and after every
    /// processed chunk.
    async fn update_consensus_about_last_committed_block(&self);

    async fn block(&self, height: BlockHeight) -> Result<Option<BlockPair>, StorageError>;

    /// Committed blocks in `from..=to`. Heights above the last committed block are not returned.
    async fn block_range(&self, from: BlockHeight, to: BlockHeight) -> Result<Vec<BlockPair>, StorageError>;
}
