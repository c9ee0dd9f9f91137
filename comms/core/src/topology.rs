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

//! Sources of the peer set and the diff applied when it changes.

use std::{path::PathBuf, sync::RwLock};

use async_trait::async_trait;
use log::*;

use crate::{
    error::TopologyError,
    types::{peers_to_topology, Peer, TransportPeers},
};

const LOG_TARGET: &str = "comms::tcp::topology";

#[async_trait]
pub trait TopologyProvider: Send + Sync {
    /// Refresh the topology from its source.
    async fn update_topology(&self) -> Result<(), TopologyError>;

    /// The topology as of the last successful update.
    fn topology(&self) -> TransportPeers;
}

/// A fixed peer set, typically taken from configuration.
#[derive(Debug, Clone)]
pub struct StaticTopologyProvider {
    peers: TransportPeers,
}

impl StaticTopologyProvider {
    pub fn new<I: IntoIterator<Item = Peer>>(peers: I) -> Self {
        Self {
            peers: peers_to_topology(peers),
        }
    }
}

#[async_trait]
impl TopologyProvider for StaticTopologyProvider {
    async fn update_topology(&self) -> Result<(), TopologyError> {
        Ok(())
    }

    fn topology(&self) -> TransportPeers {
        self.peers.clone()
    }
}

/// Reads a JSON array of peers from a file on every update. A failed update keeps the previous topology.
#[derive(Debug)]
pub struct FileTopologyProvider {
    path: PathBuf,
    peers: RwLock<TransportPeers>,
}

impl FileTopologyProvider {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            peers: RwLock::new(TransportPeers::new()),
        }
    }
}

#[async_trait]
impl TopologyProvider for FileTopologyProvider {
    async fn update_topology(&self) -> Result<(), TopologyError> {
        let contents = tokio::fs::read(&self.path).await?;
        let peers: Vec<Peer> = serde_json::from_slice(&contents)?;
        debug!(
            target: LOG_TARGET,
            "Read {} peer(s) from '{}'",
            peers.len(),
            self.path.display()
        );
        *acquire_write_lock!(self.peers) = peers_to_topology(peers);
        Ok(())
    }

    fn topology(&self) -> TransportPeers {
        acquire_read_lock!(self.peers).clone()
    }
}

/// Compares two topologies. Returns `(to_remove, to_add)`: peers that left or changed endpoint must be disconnected,
/// peers that joined or changed endpoint must be connected. A changed peer appears in both, with its old value in
/// `to_remove` and its new value in `to_add`.
pub fn peer_diff(old: &TransportPeers, new: &TransportPeers) -> (Vec<Peer>, Vec<Peer>) {
    let mut to_remove = Vec::new();
    let mut to_add = Vec::new();
    for (address, old_peer) in old {
        match new.get(address) {
            None => to_remove.push(old_peer.clone()),
            Some(new_peer) if new_peer.endpoint_differs(old_peer) => {
                to_remove.push(old_peer.clone());
                to_add.push(new_peer.clone());
            },
            Some(_) => {},
        }
    }
    for (address, new_peer) in new {
        if !old.contains_key(address) {
            to_add.push(new_peer.clone());
        }
    }
    (to_remove, to_add)
}

#[cfg(test)]
mod test {
    use std::fs;

    use meridian_test_utils::paths::random_file_in;

    use super::*;
    use crate::types::NodeAddress;

    fn peer(byte: u8, port: u16) -> Peer {
        Peer::new(NodeAddress::from_bytes([byte; 20]), "127.0.0.1", port)
    }

    fn sorted(mut peers: Vec<Peer>) -> Vec<Peer> {
        peers.sort_by_key(|p| p.node_address);
        peers
    }

    #[test]
    fn diff_detects_added_removed_and_changed() {
        let old = peers_to_topology(vec![peer(1, 1), peer(2, 2), peer(3, 3)]);
        let new = peers_to_topology(vec![peer(1, 1), peer(3, 30), peer(4, 4)]);
        let (to_remove, to_add) = peer_diff(&old, &new);
        assert_eq!(sorted(to_remove), vec![peer(2, 2), peer(3, 3)]);
        assert_eq!(sorted(to_add), vec![peer(3, 30), peer(4, 4)]);
    }

    #[test]
    fn diff_of_identical_topologies_is_empty() {
        let topology = peers_to_topology(vec![peer(1, 1), peer(2, 2)]);
        let (to_remove, to_add) = peer_diff(&topology, &topology.clone());
        assert!(to_remove.is_empty());
        assert!(to_add.is_empty());
    }

    #[tokio::test]
    async fn static_provider() {
        let provider = StaticTopologyProvider::new(vec![peer(1, 1), peer(2, 2)]);
        provider.update_topology().await.unwrap();
        assert_eq!(provider.topology().len(), 2);
    }

    #[tokio::test]
    async fn file_provider_rereads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = random_file_in(dir.path(), "json");
        let provider = FileTopologyProvider::new(path.clone());

        fs::write(&path, serde_json::to_vec(&vec![peer(1, 1)]).unwrap()).unwrap();
        provider.update_topology().await.unwrap();
        assert_eq!(provider.topology().get(&NodeAddress::from_bytes([1; 20])), Some(&peer(1, 1)));

        fs::write(&path, serde_json::to_vec(&vec![peer(1, 1), peer(2, 5)]).unwrap()).unwrap();
        provider.update_topology().await.unwrap();
        assert_eq!(provider.topology().len(), 2);

        // A malformed file keeps the last good topology
        fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            provider.update_topology().await,
            Err(TopologyError::Json(_))
        ));
        assert_eq!(provider.topology().len(), 2);
    }

    #[tokio::test]
    async fn file_provider_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileTopologyProvider::new(dir.path().join("missing.json"));
        let result = provider.update_topology().await;
        assert!(matches!(result, Err(TopologyError::Io(_))));
        assert!(provider.topology().is_empty());
    }
}
