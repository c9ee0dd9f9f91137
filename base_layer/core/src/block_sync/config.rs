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

use std::{fmt, time::Duration};

use meridian_common::{configuration::serializers, SubConfigPath};
use meridian_comms::NodeAddress;
use serde::{Deserialize, Serialize};

/// What a node waiting for a chunk does with a chunk from a node it did not ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ByzantineSourcePolicy {
    /// Log and keep waiting for the expected source
    #[default]
    Ignore,
    /// Log and give up on the current source
    AbortToIdle,
}

impl fmt::Display for ByzantineSourcePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByzantineSourcePolicy::Ignore => write!(f, "ignore"),
            ByzantineSourcePolicy::AbortToIdle => write!(f, "abort_to_idle"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockSyncConfig {
    /// This node's address, used as the sender of every sync message
    pub node_address: NodeAddress,
    /// Maximum number of blocks requested (and served) in one chunk
    pub batch_size: u32,
    /// Time without a committed block before the node starts catching up
    #[serde(with = "serializers::seconds")]
    pub no_commit_interval: Duration,
    #[serde(with = "serializers::millis")]
    pub collect_responses_timeout: Duration,
    #[serde(with = "serializers::millis")]
    pub collect_chunks_timeout: Duration,
    pub byzantine_source_policy: ByzantineSourcePolicy,
    /// Capacity of the mailbox feeding the active sync state
    pub conduit_capacity: usize,
    /// Capacity of the channel between the transport listener and the topic dispatcher
    pub topic_channel_capacity: usize,
}

impl Default for BlockSyncConfig {
    fn default() -> Self {
        Self {
            node_address: NodeAddress::default(),
            batch_size: 100,
            no_commit_interval: Duration::from_secs(8),
            collect_responses_timeout: Duration::from_secs(3),
            collect_chunks_timeout: Duration::from_secs(5),
            byzantine_source_policy: ByzantineSourcePolicy::default(),
            conduit_capacity: 10,
            topic_channel_capacity: 10,
        }
    }
}

impl SubConfigPath for BlockSyncConfig {
    fn main_key_prefix() -> &'static str {
        "block_sync"
    }
}

#[cfg(test)]
mod test {
    use config::{Config, File, FileFormat};
    use meridian_common::DefaultConfigLoader;

    use super::*;

    #[test]
    fn loads_with_defaults() {
        let toml = r#"
            [block_sync]
            node_address = "0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a"
            batch_size = 50
            collect_chunks_timeout = 750
            byzantine_source_policy = "abort_to_idle"
        "#;
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap();
        let sync = BlockSyncConfig::load_from(&config).unwrap();
        assert_eq!(sync.node_address, NodeAddress::from_bytes([10; 20]));
        assert_eq!(sync.batch_size, 50);
        assert_eq!(sync.collect_chunks_timeout, Duration::from_millis(750));
        assert_eq!(sync.byzantine_source_policy, ByzantineSourcePolicy::AbortToIdle);
        assert_eq!(sync.no_commit_interval, BlockSyncConfig::default().no_commit_interval);
        assert_eq!(sync.conduit_capacity, 10);
    }

    #[test]
    fn rejects_unknown_fields() {
        let toml = r#"
            [block_sync]
            batch_sise = 50
        "#;
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap();
        assert!(BlockSyncConfig::load_from(&config).is_err());
    }
}
