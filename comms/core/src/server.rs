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

//! Accepts inbound sockets and hands received payloads to the registered [TransportListener].

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
        RwLock,
    },
    time::Duration,
};

use log::*;
use meridian_shutdown::{Shutdown, ShutdownSignal};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::Notify,
    time,
};

use crate::{
    error::{FrameError, TransportError},
    frame::{read_frame, write_all_timeout, FrameLimits, ACK_TOKEN},
    metrics,
    transport::{MessageContext, MessageOrigin, TransportListener},
};

const LOG_TARGET: &str = "comms::tcp::server";

pub(crate) type ListenerSlot = RwLock<Option<Arc<dyn TransportListener>>>;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_address: SocketAddr,
    pub network_timeout: Duration,
    pub frame_limits: FrameLimits,
}

pub struct TransportServer {
    local_address: SocketAddr,
    listener: Arc<ListenerSlot>,
    is_listening: Arc<AtomicBool>,
    tracker: Arc<ConnectionTracker>,
    shutdown: Shutdown,
}

impl TransportServer {
    /// Binds the listen address and spawns the accept loop.
    pub async fn bind(config: ServerConfig) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(config.listen_address)
            .await
            .map_err(|source| TransportError::BindFailed {
                address: config.listen_address.to_string(),
                source,
            })?;
        let local_address = listener.local_addr()?;
        info!(target: LOG_TARGET, "Transport server listening on {}", local_address);

        let shutdown = Shutdown::new();
        let server = Self {
            local_address,
            listener: Arc::new(RwLock::new(None)),
            is_listening: Arc::new(AtomicBool::new(true)),
            tracker: Arc::new(ConnectionTracker::default()),
            shutdown,
        };

        let accept_loop = AcceptLoop {
            listener,
            slot: server.listener.clone(),
            is_listening: server.is_listening.clone(),
            tracker: server.tracker.clone(),
            config,
            shutdown_signal: server.shutdown.to_signal(),
        };
        let guard = server.tracker.track();
        tokio::spawn(async move {
            let _guard = guard;
            accept_loop.run().await;
        });
        Ok(server)
    }

    pub fn local_address(&self) -> SocketAddr {
        self.local_address
    }

    /// Replaces the receiver of inbound payloads. With `None`, payloads are acknowledged and dropped.
    pub fn register_listener(&self, listener: Option<Arc<dyn TransportListener>>) {
        *acquire_write_lock!(self.listener) = listener;
    }

    pub fn is_listening(&self) -> bool {
        self.is_listening.load(Ordering::SeqCst)
    }

    pub fn live_connections(&self) -> usize {
        // The accept loop is tracked too
        self.tracker.count().saturating_sub(usize::from(self.is_listening()))
    }

    /// Stops accepting and closes every inbound socket.
    pub fn shutdown(&self) {
        self.is_listening.store(false, Ordering::SeqCst);
        self.shutdown.trigger();
    }

    /// Waits for the accept loop and every reader task to exit. Returns false if `deadline` passed first.
    pub async fn wait_until_shutdown(&self, deadline: Duration) -> bool {
        let result = time::timeout(deadline, self.tracker.wait_until_idle()).await.is_ok();
        if !result {
            warn!(
                target: LOG_TARGET,
                "{} server task(s) still running after {:.2?}",
                self.tracker.count(),
                deadline
            );
        }
        result
    }
}

struct AcceptLoop {
    listener: TcpListener,
    slot: Arc<ListenerSlot>,
    is_listening: Arc<AtomicBool>,
    tracker: Arc<ConnectionTracker>,
    config: ServerConfig,
    shutdown_signal: ShutdownSignal,
}

impl AcceptLoop {
    async fn run(mut self) {
        loop {
            let result = tokio::select! {
                biased;
                _ = self.shutdown_signal.wait() => break,
                result = self.listener.accept() => result,
            };
            match result {
                Ok((socket, peer_address)) => {
                    debug!(target: LOG_TARGET, "Accepted connection from {}", peer_address);
                    let reader = InboundReader {
                        peer_address,
                        slot: self.slot.clone(),
                        config: self.config.clone(),
                        shutdown_signal: self.shutdown_signal.clone(),
                    };
                    let guard = self.tracker.track();
                    tokio::spawn(async move {
                        let _guard = guard;
                        metrics::inbound_connections().inc();
                        reader.run(socket).await;
                        metrics::inbound_connections().dec();
                    });
                },
                Err(err) if self.is_listening.load(Ordering::SeqCst) => {
                    error!(target: LOG_TARGET, "Failed to accept connection: {}", err);
                    // Typically file descriptor exhaustion, back off before retrying
                    time::sleep(Duration::from_millis(100)).await;
                },
                Err(err) => {
                    debug!(target: LOG_TARGET, "Accept failed during shutdown: {}", err);
                    break;
                },
            }
        }
        self.is_listening.store(false, Ordering::SeqCst);
        info!(target: LOG_TARGET, "Transport server stopped accepting connections");
    }
}

struct InboundReader {
    peer_address: SocketAddr,
    slot: Arc<ListenerSlot>,
    config: ServerConfig,
    shutdown_signal: ShutdownSignal,
}

impl InboundReader {
    async fn run(mut self, mut socket: TcpStream) {
        loop {
            let result = tokio::select! {
                biased;
                _ = self.shutdown_signal.wait() => break,
                result = read_frame(&mut socket, &self.config.frame_limits, self.config.network_timeout) => result,
            };
            let payloads = match result {
                Ok(payloads) => payloads,
                Err(err) => {
                    self.log_read_error(&err);
                    break;
                },
            };
            if payloads.is_empty() {
                trace!(target: LOG_TARGET, "Keepalive from {}", self.peer_address);
                continue;
            }
            metrics::inbound_messages().inc();
            if let Err(err) = write_all_timeout(&mut socket, &ACK_TOKEN, self.config.network_timeout).await {
                debug!(target: LOG_TARGET, "Failed to acknowledge frame from {}: {}", self.peer_address, err);
                break;
            }

            let listener = acquire_read_lock!(self.slot).clone();
            match listener {
                Some(listener) => listener.on_transport_message_received(
                    MessageContext {
                        origin: MessageOrigin::Socket(self.peer_address),
                    },
                    payloads,
                ),
                None => trace!(
                    target: LOG_TARGET,
                    "No listener registered, dropping {} payload(s) from {}",
                    payloads.len(),
                    self.peer_address
                ),
            }
        }
        debug!(target: LOG_TARGET, "Inbound connection from {} closed", self.peer_address);
    }

    fn log_read_error(&self, err: &FrameError) {
        match err {
            FrameError::Timeout => {
                metrics::inbound_frame_errors("timeout").inc();
                debug!(target: LOG_TARGET, "Read from {} timed out", self.peer_address);
            },
            FrameError::Io(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!(target: LOG_TARGET, "{} disconnected", self.peer_address);
            },
            err if err.is_corruption() => {
                metrics::inbound_frame_errors("corrupt").inc();
                warn!(target: LOG_TARGET, "Corrupt frame from {}: {}", self.peer_address, err);
            },
            err => {
                metrics::inbound_frame_errors("io").inc();
                debug!(target: LOG_TARGET, "Read from {} failed: {}", self.peer_address, err);
            },
        }
    }
}

/// Counts live server tasks.
#[derive(Debug, Default)]
struct ConnectionTracker {
    count: AtomicUsize,
    notify: Notify,
}

impl ConnectionTracker {
    fn track(self: &Arc<Self>) -> TrackerGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        TrackerGuard { tracker: self.clone() }
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    async fn wait_until_idle(&self) {
        loop {
            let notified = self.notify.notified();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct TrackerGuard {
    tracker: Arc<ConnectionTracker>,
}

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        self.tracker.count.fetch_sub(1, Ordering::SeqCst);
        self.tracker.notify.notify_waiters();
    }
}
