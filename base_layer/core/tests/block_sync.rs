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

use std::{sync::Arc, time::Duration};

use meridian_comms::{
    DirectTransport,
    MemoryNetwork,
    MemoryTransport,
    NodeAddress,
    Peer,
    StaticTopologyProvider,
    Transport,
    TransportConfig,
};
use meridian_core::{
    block_sync::{initialize_block_sync, BlockSyncConfig, BlockSyncResponder},
    gossip::BlockSyncTopic,
    test_utils::{node_address, MockBlockSyncStorage},
};
use meridian_shutdown::{Shutdown, ShutdownSignal};
use meridian_test_utils::{async_assert_eventually, net::unused_local_port};
use tokio::{task::JoinHandle, time};

fn sync_config(node: NodeAddress) -> BlockSyncConfig {
    BlockSyncConfig {
        node_address: node,
        batch_size: 10,
        no_commit_interval: Duration::from_millis(100),
        collect_responses_timeout: Duration::from_millis(200),
        collect_chunks_timeout: Duration::from_millis(500),
        ..Default::default()
    }
}

/// Starts a node that syncs into `storage` and serves from it.
fn start_node(
    transport: Arc<dyn Transport>,
    node: NodeAddress,
    storage: MockBlockSyncStorage,
    shutdown_signal: ShutdownSignal,
) -> (Arc<BlockSyncTopic>, JoinHandle<()>) {
    let config = sync_config(node);
    let topic = BlockSyncTopic::start(
        node,
        transport,
        config.topic_channel_capacity,
        shutdown_signal.clone(),
    );
    let storage = Arc::new(storage);
    let (handle, machine) = initialize_block_sync(config.clone(), topic.clone(), storage.clone(), shutdown_signal);
    topic.register_handler(Arc::new(handle));
    topic.register_handler(Arc::new(BlockSyncResponder::new(
        node,
        config.batch_size,
        topic.clone(),
        storage,
    )));
    (topic, tokio::spawn(machine.run()))
}

#[tokio::test]
async fn lagging_node_catches_up_over_memory_network() {
    let _ = env_logger::try_init();
    let network = MemoryNetwork::new();
    let shutdown = Shutdown::new();

    let lagging = MockBlockSyncStorage::with_committed_blocks(3);
    let mut tasks = Vec::new();
    let mut topics = Vec::new();
    for (n, storage) in [
        (1, lagging.clone()),
        (2, MockBlockSyncStorage::with_committed_blocks(25)),
        (3, MockBlockSyncStorage::with_committed_blocks(25)),
    ] {
        let transport = Arc::new(MemoryTransport::new(network.clone(), node_address(n)));
        let (topic, task) = start_node(transport, node_address(n), storage, shutdown.to_signal());
        topics.push(topic);
        tasks.push(task);
    }

    async_assert_eventually!(
        lagging.committed_heights().len(),
        expect = 25,
        max_attempts = 100,
        interval = Duration::from_millis(100)
    );
    assert_eq!(lagging.committed_heights(), (1..=25).collect::<Vec<_>>());

    shutdown.trigger();
    for task in tasks {
        time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn lagging_node_catches_up_over_tcp() {
    let _ = env_logger::try_init();
    let shutdown = Shutdown::new();
    let ports = [unused_local_port().await, unused_local_port().await];
    let peers = vec![
        Peer::new(node_address(1), "127.0.0.1", ports[0]),
        Peer::new(node_address(2), "127.0.0.1", ports[1]),
    ];

    let lagging = MockBlockSyncStorage::new();
    let mut transports = Vec::new();
    let mut tasks = Vec::new();
    let mut topics = Vec::new();
    for (i, storage) in [lagging.clone(), MockBlockSyncStorage::with_committed_blocks(12)]
        .into_iter()
        .enumerate()
    {
        let node = node_address(i as u8 + 1);
        let config = TransportConfig {
            node_address: node,
            listen_address: ([127, 0, 0, 1], ports[i]).into(),
            reconnect_interval: Duration::from_millis(50),
            peers: peers.clone(),
            ..Default::default()
        };
        let provider = Arc::new(StaticTopologyProvider::new(peers.clone()));
        let transport = Arc::new(DirectTransport::start(config, provider).await.unwrap());
        let (topic, task) = start_node(transport.clone(), node, storage, shutdown.to_signal());
        transports.push(transport);
        topics.push(topic);
        tasks.push(task);
    }

    async_assert_eventually!(
        lagging.committed_heights().len(),
        expect = 12,
        max_attempts = 100,
        interval = Duration::from_millis(100)
    );

    shutdown.trigger();
    for task in tasks {
        time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
    for transport in transports {
        transport.graceful_shutdown(Duration::from_secs(5)).await;
    }
}
