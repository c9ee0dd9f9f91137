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

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use meridian_common::{configuration::serializers, SubConfigPath};
use serde::{Deserialize, Serialize};

use crate::{
    frame::{FrameLimits, MAX_PAYLOADS_IN_MESSAGE, MAX_PAYLOAD_SIZE_BYTES},
    queue::{DEFAULT_MAX_BYTES, DEFAULT_MAX_MESSAGES},
    topology::{FileTopologyProvider, StaticTopologyProvider, TopologyProvider},
    types::{NodeAddress, Peer},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// This node's address. Peers with this address in the topology are never dialed.
    pub node_address: NodeAddress,
    pub listen_address: SocketAddr,
    /// Bound on dialing and on every individual socket read and write
    #[serde(with = "serializers::millis")]
    pub network_timeout: Duration,
    #[serde(with = "serializers::millis")]
    pub reconnect_interval: Duration,
    /// An idle outgoing connection writes a keepalive frame at this interval. Must be shorter than the remote's
    /// `network_timeout`.
    #[serde(with = "serializers::millis")]
    pub keepalive_interval: Duration,
    #[serde(with = "serializers::seconds")]
    pub topology_update_interval: Duration,
    pub max_payloads_in_message: usize,
    pub max_payload_size_bytes: usize,
    pub send_queue_max_messages: usize,
    pub send_queue_max_bytes: usize,
    /// Static topology, used when `topology_file` is not set
    pub peers: Vec<Peer>,
    /// JSON file of `{address, endpoint, port}` entries, re-read on every topology update
    pub topology_file: Option<PathBuf>,
}

impl TransportConfig {
    pub fn frame_limits(&self) -> FrameLimits {
        FrameLimits {
            max_payloads: self.max_payloads_in_message,
            max_payload_size: self.max_payload_size_bytes,
        }
    }

    pub fn topology_provider(&self) -> Arc<dyn TopologyProvider> {
        match self.topology_file.as_ref() {
            Some(path) => Arc::new(FileTopologyProvider::new(path.clone())),
            None => Arc::new(StaticTopologyProvider::new(self.peers.clone())),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            node_address: NodeAddress::default(),
            listen_address: ([0, 0, 0, 0], 18189).into(),
            network_timeout: Duration::from_secs(10),
            reconnect_interval: Duration::from_secs(1),
            keepalive_interval: Duration::from_secs(3),
            topology_update_interval: Duration::from_secs(60),
            max_payloads_in_message: MAX_PAYLOADS_IN_MESSAGE,
            max_payload_size_bytes: MAX_PAYLOAD_SIZE_BYTES,
            send_queue_max_messages: DEFAULT_MAX_MESSAGES,
            send_queue_max_bytes: DEFAULT_MAX_BYTES,
            peers: Vec::new(),
            topology_file: None,
        }
    }
}

impl SubConfigPath for TransportConfig {
    fn main_key_prefix() -> &'static str {
        "transport"
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
            [transport]
            node_address = "0101010101010101010101010101010101010101"
            listen_address = "127.0.0.1:9000"
            keepalive_interval = 250
            peers = [
                { address = "0202020202020202020202020202020202020202", endpoint = "10.0.0.2", port = 9000 },
            ]
        "#;
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap();
        let transport = TransportConfig::load_from(&config).unwrap();
        assert_eq!(transport.node_address, NodeAddress::from_bytes([1; 20]));
        assert_eq!(transport.listen_address.port(), 9000);
        assert_eq!(transport.keepalive_interval, Duration::from_millis(250));
        assert_eq!(transport.network_timeout, TransportConfig::default().network_timeout);
        assert_eq!(transport.peers, vec![Peer::new(NodeAddress::from_bytes([2; 20]), "10.0.0.2", 9000)]);
        assert_eq!(transport.frame_limits(), FrameLimits::default());
    }
}
