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

use bytes::Bytes;
use meridian_comms::{
    test_utils::CollectingListener,
    DirectTransport,
    FileTopologyProvider,
    MessageOrigin,
    NodeAddress,
    Peer,
    RecipientMode,
    StaticTopologyProvider,
    Transport,
    TransportConfig,
    TransportData,
    TransportError,
};
use meridian_test_utils::{async_assert_eventually, net::bind_local};
use tokio::{io::AsyncReadExt, net::TcpListener, time};

const DEADLINE: Duration = Duration::from_secs(5);

fn address(byte: u8) -> NodeAddress {
    NodeAddress::from_bytes([byte; 20])
}

fn config(node: u8, peers: Vec<Peer>) -> TransportConfig {
    TransportConfig {
        node_address: address(node),
        listen_address: ([127, 0, 0, 1], 0).into(),
        network_timeout: Duration::from_secs(5),
        reconnect_interval: Duration::from_millis(50),
        // Long enough that no keepalive is written during a test
        keepalive_interval: Duration::from_secs(60),
        peers,
        ..Default::default()
    }
}

async fn start(config: TransportConfig) -> DirectTransport {
    let provider = Arc::new(StaticTopologyProvider::new(config.peers.clone()));
    DirectTransport::start(config, provider).await.unwrap()
}

#[tokio::test]
async fn broadcast_to_three_peers_writes_exact_frame() {
    let _ = env_logger::try_init();
    let mut listeners = Vec::<TcpListener>::new();
    let mut peers = vec![Peer::new(address(0xa), "127.0.0.1", 0)];
    for i in 1..=3u8 {
        let (listener, addr) = bind_local().await;
        listeners.push(listener);
        peers.push(Peer::new(address(i), "127.0.0.1", addr.port()));
    }
    let node_a = start(config(0xa, peers)).await;

    let mut sockets = Vec::new();
    for listener in &listeners {
        let (socket, _) = time::timeout(DEADLINE, listener.accept()).await.unwrap().unwrap();
        sockets.push(socket);
    }
    async_assert_eventually!(node_a.all_outgoing_queues_enabled(), expect = true);

    let data = TransportData::broadcast(address(0xa), vec![
        Bytes::from_static(&[0x11]),
        Bytes::from_static(&[0x22, 0x33]),
    ])
    .unwrap();
    node_a.send(data).await.unwrap();

    let expected = [
        0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x11, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x22, 0x33, 0x00,
        0x00,
    ];
    for socket in &mut sockets {
        let mut buf = [0u8; 20];
        time::timeout(DEADLINE, socket.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(buf, expected);
    }

    node_a.graceful_shutdown(DEADLINE).await;
    assert!(!node_a.is_server_listening());
}

#[tokio::test]
async fn rejects_frames_the_peer_would_treat_as_corrupt() {
    let (_listener, addr) = bind_local().await;
    let node_a = start(TransportConfig {
        max_payloads_in_message: 2,
        ..config(1, vec![
            Peer::new(address(1), "127.0.0.1", 0),
            Peer::new(address(2), "127.0.0.1", addr.port()),
        ])
    })
    .await;

    let data = TransportData::broadcast(address(1), vec![Bytes::new(), Bytes::new(), Bytes::new()]).unwrap();
    let err = node_a.send(data).await.unwrap_err();
    assert!(matches!(err, TransportError::InvalidFrame(_)));

    node_a.graceful_shutdown(DEADLINE).await;
}

#[tokio::test]
async fn two_nodes_exchange_messages() {
    let _ = env_logger::try_init();
    // Node B must be listening before A can learn its port
    let node_b = start(config(2, vec![Peer::new(address(2), "127.0.0.1", 0)])).await;
    let b_rx = Arc::new(CollectingListener::default());
    node_b.register_listener(Some(b_rx.clone()));

    let node_a = start(config(1, vec![
        Peer::new(address(1), "127.0.0.1", 0),
        Peer::new(address(2), "127.0.0.1", node_b.local_port()),
    ]))
    .await;
    async_assert_eventually!(node_a.all_outgoing_queues_enabled(), expect = true);

    let data = TransportData::to_list(address(1), vec![address(2)], vec![Bytes::from_static(b"hello b")]).unwrap();
    node_a.send(data).await.unwrap();

    let received = b_rx.wait_for(1, DEADLINE).await;
    assert!(matches!(received[0].0.origin, MessageOrigin::Socket(_)));
    assert_eq!(received[0].1, vec![Bytes::from_static(b"hello b")]);

    node_a.graceful_shutdown(DEADLINE).await;
    node_b.graceful_shutdown(DEADLINE).await;
}

#[tokio::test]
async fn send_rejects_invalid_requests() {
    let node = start(config(1, vec![Peer::new(address(1), "127.0.0.1", 0)])).await;

    let unknown = TransportData::to_list(address(1), vec![address(5)], vec![Bytes::from_static(b"x")]).unwrap();
    assert!(matches!(
        node.send(unknown).await,
        Err(TransportError::UnknownRecipient(a)) if a == address(5)
    ));

    let all_but = TransportData::new(address(1), RecipientMode::AllButList, vec![], vec![]).unwrap();
    assert!(matches!(node.send(all_but).await, Err(TransportError::Unimplemented(_))));

    // Bypass the constructor check, send must still reject oversized data
    let oversized = TransportData {
        sender: address(1),
        recipient_mode: RecipientMode::Broadcast,
        recipients: vec![],
        payloads: vec![Bytes::from(vec![0u8; 20 * 1024 * 1024 + 1])],
    };
    assert!(matches!(
        node.send(oversized).await,
        Err(TransportError::DataExceedsCapacity { .. })
    ));

    // Broadcast with no peers is a no-op
    node.send(TransportData::broadcast(address(1), vec![Bytes::new()]).unwrap())
        .await
        .unwrap();
    node.graceful_shutdown(DEADLINE).await;
}

#[tokio::test]
async fn topology_file_updates_reconnect_peers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("topology.json");
    let me = Peer::new(address(1), "127.0.0.1", 0);
    std::fs::write(&path, serde_json::to_vec(&vec![me.clone()]).unwrap()).unwrap();

    let mut cfg = config(1, vec![]);
    cfg.topology_file = Some(path.clone());
    let node = DirectTransport::start(cfg, Arc::new(FileTopologyProvider::new(path.clone())))
        .await
        .unwrap();
    assert_eq!(node.topology().len(), 1);

    let (listener, addr) = bind_local().await;
    let peer = Peer::new(address(2), "127.0.0.1", addr.port());
    std::fs::write(&path, serde_json::to_vec(&vec![me, peer]).unwrap()).unwrap();
    node.update_topology().await.unwrap();
    let (_socket, _) = time::timeout(DEADLINE, listener.accept()).await.unwrap().unwrap();
    async_assert_eventually!(node.all_outgoing_queues_enabled(), expect = true);
    assert_eq!(node.topology().len(), 2);

    // Self-eviction disconnects everyone
    std::fs::write(&path, b"[]").unwrap();
    node.update_topology().await.unwrap();
    assert!(node.topology().is_empty());

    node.graceful_shutdown(DEADLINE).await;
}
