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

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use bytes::Bytes;
use log::*;
use meridian_metrics::{Histogram, IntCounter};
use meridian_shutdown::{Shutdown, ShutdownSignal};
use tokio::{
    io::AsyncReadExt,
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    time,
};

use crate::{
    config::TransportConfig,
    error::ConnectionError,
    frame::{write_all_timeout, write_frame, ACK_TOKEN, KEEPALIVE_FRAME},
    metrics,
    queue::TransportQueue,
    types::Peer,
};

const LOG_TARGET: &str = "comms::tcp::outgoing";

/// Maximum number of frames whose send time is remembered while waiting for an acknowledgement.
const ROUND_TRIP_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct OutgoingConnectionConfig {
    pub network_timeout: Duration,
    pub reconnect_interval: Duration,
    pub keepalive_interval: Duration,
    pub send_queue_max_messages: usize,
    pub send_queue_max_bytes: usize,
}

impl From<&TransportConfig> for OutgoingConnectionConfig {
    fn from(config: &TransportConfig) -> Self {
        Self {
            network_timeout: config.network_timeout,
            reconnect_interval: config.reconnect_interval,
            keepalive_interval: config.keepalive_interval,
            send_queue_max_messages: config.send_queue_max_messages,
            send_queue_max_bytes: config.send_queue_max_bytes,
        }
    }
}

/// Resolves once the connection task has fully exited.
#[derive(Debug, Clone)]
#[must_use = "the connection task may still be running, call `wait` to join it"]
pub struct ConnectionHandle {
    exited: ShutdownSignal,
}

impl ConnectionHandle {
    pub async fn wait(self) {
        self.exited.await;
    }

    pub fn is_finished(&self) -> bool {
        self.exited.is_triggered()
    }
}

/// A long lived outgoing connection to one peer. Frames pushed to the queue are written in order. The connection
/// redials until it is disconnected or dropped.
pub struct OutgoingConnection {
    peer: Peer,
    queue: Arc<TransportQueue>,
    shutdown: Shutdown,
    handle: ConnectionHandle,
}

impl OutgoingConnection {
    /// Spawns the connection task. Must be called from within a tokio runtime.
    pub fn spawn(peer: Peer, config: OutgoingConnectionConfig) -> Self {
        let queue = Arc::new(
            TransportQueue::new(config.send_queue_max_messages, config.send_queue_max_bytes)
                .with_usage_gauge(metrics::queue_usage_percent(&peer.node_address)),
        );
        let shutdown = Shutdown::new();
        let exited = Shutdown::new();
        let handle = ConnectionHandle {
            exited: exited.to_signal(),
        };

        let worker = ConnectionWorker {
            round_trip_time: metrics::round_trip_time(&peer.node_address),
            round_trip_dropped: metrics::round_trip_samples_dropped(&peer.node_address),
            reconnects: metrics::reconnects(&peer.node_address),
            peer: peer.clone(),
            queue: queue.clone(),
            config,
            shutdown_signal: shutdown.to_signal(),
        };
        tokio::spawn(async move {
            // Dropped when the task returns, which resolves every handle
            let _exited = exited;
            worker.run().await;
        });

        Self {
            peer,
            queue,
            shutdown,
            handle,
        }
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    pub fn send(&self, payloads: Vec<Bytes>) -> Result<(), crate::error::QueueError> {
        self.queue.push(payloads)
    }

    pub fn queue(&self) -> &Arc<TransportQueue> {
        &self.queue
    }

    pub fn is_queue_enabled(&self) -> bool {
        self.queue.is_enabled()
    }

    /// Stops the connection. The returned handle resolves once the socket is closed and the task has exited.
    pub fn disconnect(&self) -> ConnectionHandle {
        self.shutdown.trigger();
        self.handle.clone()
    }
}

struct ConnectionWorker {
    peer: Peer,
    queue: Arc<TransportQueue>,
    config: OutgoingConnectionConfig,
    shutdown_signal: ShutdownSignal,
    round_trip_time: Histogram,
    round_trip_dropped: IntCounter,
    reconnects: IntCounter,
}

impl ConnectionWorker {
    async fn run(self) {
        debug!(target: LOG_TARGET, "Outgoing connection to {} started", self.peer);
        let mut shutdown_signal = self.shutdown_signal.clone();
        loop {
            if shutdown_signal.is_triggered() {
                break;
            }
            let connect_result = tokio::select! {
                biased;
                _ = shutdown_signal.wait() => break,
                result = self.connect() => result,
            };

            match connect_result {
                Ok(socket) => {
                    debug!(target: LOG_TARGET, "Connected to {}", self.peer);
                    self.queue.on_new_connection();
                    let result = self.serve(socket).await;
                    self.queue.disable();
                    self.queue.clear();
                    match result {
                        Ok(()) => break,
                        Err(err) => {
                            warn!(target: LOG_TARGET, "Connection to {} lost: {}", self.peer, err);
                        },
                    }
                },
                Err(err) => {
                    debug!(target: LOG_TARGET, "Failed to connect to {}: {}", self.peer, err);
                },
            }
            self.reconnects.inc();

            tokio::select! {
                biased;
                _ = shutdown_signal.wait() => break,
                _ = time::sleep(self.config.reconnect_interval) => {},
            }
        }
        self.queue.disable();
        self.queue.clear();
        debug!(target: LOG_TARGET, "Outgoing connection to {} stopped", self.peer);
    }

    async fn connect(&self) -> Result<TcpStream, ConnectionError> {
        let address = self.peer.dial_address();
        let socket = time::timeout(self.config.network_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| ConnectionError::ConnectTimeout(address.clone()))?
            .map_err(|source| ConnectionError::ConnectFailed {
                address: address.clone(),
                source,
            })?;
        socket.set_nodelay(true)?;
        Ok(socket)
    }

    /// Runs the send and ack loops on one socket. `Ok` means the connection was shut down, `Err` means the socket
    /// failed and should be redialed.
    async fn serve(&self, socket: TcpStream) -> Result<(), ConnectionError> {
        let (reader, writer) = socket.into_split();
        let sent_at = Mutex::new(RoundTripTimes::new(ROUND_TRIP_CAPACITY));
        // Dropping both halves at the end of this scope closes the socket
        tokio::select! {
            biased;
            result = self.send_loop(writer, &sent_at) => result,
            result = self.ack_loop(reader, &sent_at) => result,
        }
    }

    async fn send_loop(&self, mut writer: OwnedWriteHalf, sent_at: &Mutex<RoundTripTimes>) -> Result<(), ConnectionError> {
        let mut shutdown_signal = self.shutdown_signal.clone();
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown_signal.wait() => return Ok(()),
                next = self.queue.pop(self.config.keepalive_interval) => next,
            };
            let write = async {
                match next {
                    Some(payloads) => {
                        if acquire_lock!(sent_at).push(Instant::now()) {
                            self.round_trip_dropped.inc();
                        }
                        write_frame(&mut writer, &payloads, self.config.network_timeout).await
                    },
                    None => {
                        trace!(target: LOG_TARGET, "Sending keepalive to {}", self.peer);
                        write_all_timeout(&mut writer, &KEEPALIVE_FRAME, self.config.network_timeout).await
                    },
                }
            };
            // A peer that stops reading must not hold up a disconnect
            tokio::select! {
                biased;
                _ = shutdown_signal.wait() => return Ok(()),
                result = write => result?,
            }
        }
    }

    async fn ack_loop(&self, mut reader: OwnedReadHalf, sent_at: &Mutex<RoundTripTimes>) -> Result<(), ConnectionError> {
        let mut token = [0u8; 4];
        let mut filled = 0;
        loop {
            let n = match time::timeout(self.config.network_timeout, reader.read(&mut token[filled..])).await {
                // No acks are expected while the connection is idle
                Err(_) => continue,
                Ok(result) => result?,
            };
            if n == 0 {
                return Err(ConnectionError::ClosedByPeer);
            }
            filled += n;
            if filled < token.len() {
                continue;
            }
            filled = 0;
            if token != ACK_TOKEN {
                return Err(ConnectionError::UnexpectedAck(token));
            }
            if let Some(sent) = acquire_lock!(sent_at).pop() {
                self.round_trip_time.observe(sent.elapsed().as_secs_f64());
            }
        }
    }
}

/// Bounded FIFO of send timestamps. When full, the oldest entry is discarded.
#[derive(Debug)]
struct RoundTripTimes {
    times: VecDeque<Instant>,
    capacity: usize,
}

impl RoundTripTimes {
    fn new(capacity: usize) -> Self {
        Self {
            times: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns true if an older sample had to be dropped.
    fn push(&mut self, instant: Instant) -> bool {
        let dropped = if self.times.len() >= self.capacity {
            self.times.pop_front();
            true
        } else {
            false
        };
        self.times.push_back(instant);
        dropped
    }

    fn pop(&mut self) -> Option<Instant> {
        self.times.pop_front()
    }
}

#[cfg(test)]
mod test {
    use meridian_test_utils::net::bind_local;
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::{
        frame::{read_frame, FrameLimits},
        types::NodeAddress,
    };

    fn test_config() -> OutgoingConnectionConfig {
        OutgoingConnectionConfig {
            network_timeout: Duration::from_secs(5),
            reconnect_interval: Duration::from_millis(50),
            keepalive_interval: Duration::from_millis(100),
            send_queue_max_messages: 10,
            send_queue_max_bytes: 1024,
        }
    }

    #[test]
    fn round_trip_times_drop_oldest() {
        let mut times = RoundTripTimes::new(2);
        let first = Instant::now();
        let second = first + Duration::from_millis(1);
        let third = first + Duration::from_millis(2);
        assert!(!times.push(first));
        assert!(!times.push(second));
        assert!(times.push(third));
        assert_eq!(times.pop(), Some(second));
        assert_eq!(times.pop(), Some(third));
        assert_eq!(times.pop(), None);
    }

    #[tokio::test]
    async fn sends_frames_and_keepalives() {
        let _ = env_logger::try_init();
        let (listener, addr) = bind_local().await;
        let peer = Peer::new(NodeAddress::from_bytes([9; 20]), "127.0.0.1", addr.port());
        let conn = OutgoingConnection::spawn(peer, test_config());

        let (mut socket, _) = listener.accept().await.unwrap();
        meridian_test_utils::async_assert_eventually!(conn.is_queue_enabled(), expect = true);
        conn.send(vec![Bytes::from_static(b"abc")]).unwrap();

        let limits = FrameLimits::default();
        let mut frame = read_frame(&mut socket, &limits, Duration::from_secs(5)).await.unwrap();
        // Keepalives may precede the frame
        while frame.is_empty() {
            frame = read_frame(&mut socket, &limits, Duration::from_secs(5)).await.unwrap();
        }
        assert_eq!(frame, vec![Bytes::from_static(b"abc")]);
        socket.write_all(&ACK_TOKEN).await.unwrap();

        // Idle connection writes keepalives
        let keepalive = read_frame(&mut socket, &limits, Duration::from_secs(5)).await.unwrap();
        assert!(keepalive.is_empty());

        let handle = conn.disconnect();
        time::timeout(Duration::from_secs(5), handle.wait()).await.unwrap();
        assert!(!conn.is_queue_enabled());
    }

    #[tokio::test]
    async fn reconnects_after_socket_closes() {
        let (listener, addr) = bind_local().await;
        let peer = Peer::new(NodeAddress::from_bytes([8; 20]), "127.0.0.1", addr.port());
        let conn = OutgoingConnection::spawn(peer, test_config());

        let (socket, _) = listener.accept().await.unwrap();
        drop(socket);
        let (_socket, _) = time::timeout(Duration::from_secs(5), listener.accept())
            .await
            .unwrap()
            .unwrap();
        meridian_test_utils::async_assert_eventually!(conn.is_queue_enabled(), expect = true);

        let handle = conn.disconnect();
        time::timeout(Duration::from_secs(5), handle.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_does_not_wait_for_a_stuck_write() {
        let _ = env_logger::try_init();
        let (listener, addr) = bind_local().await;
        let peer = Peer::new(NodeAddress::from_bytes([5; 20]), "127.0.0.1", addr.port());
        let conn = OutgoingConnection::spawn(peer, OutgoingConnectionConfig {
            send_queue_max_messages: 16,
            send_queue_max_bytes: 64 * 1024 * 1024,
            keepalive_interval: Duration::from_secs(5),
            ..test_config()
        });

        // Accept but never read, so the socket buffers fill up
        let (_socket, _) = listener.accept().await.unwrap();
        meridian_test_utils::async_assert_eventually!(conn.is_queue_enabled(), expect = true);
        for _ in 0..8 {
            conn.send(vec![Bytes::from(vec![0u8; 4 * 1024 * 1024])]).unwrap();
        }
        time::sleep(Duration::from_millis(200)).await;

        let started = Instant::now();
        let handle = conn.disconnect();
        time::timeout(Duration::from_secs(5), handle.wait()).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn disconnect_while_unreachable() {
        let port = meridian_test_utils::net::unused_local_port().await;
        let peer = Peer::new(NodeAddress::from_bytes([7; 20]), "127.0.0.1", port);
        let conn = OutgoingConnection::spawn(peer, test_config());
        assert!(matches!(
            conn.send(vec![Bytes::from_static(b"x")]),
            Err(crate::error::QueueError::Disabled)
        ));
        let handle = conn.disconnect();
        time::timeout(Duration::from_secs(5), handle.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn dropping_the_connection_stops_the_task() {
        let port = meridian_test_utils::net::unused_local_port().await;
        let peer = Peer::new(NodeAddress::from_bytes([6; 20]), "127.0.0.1", port);
        let conn = OutgoingConnection::spawn(peer, test_config());
        let handle = conn.handle.clone();
        drop(conn);
        time::timeout(Duration::from_secs(5), handle.wait()).await.unwrap();
    }
}
