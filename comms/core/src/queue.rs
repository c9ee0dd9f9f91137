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

use std::{collections::VecDeque, sync::Mutex, time::Duration};

use bytes::Bytes;
use log::*;
use meridian_metrics::IntGauge;
use tokio::{sync::Notify, time};

use crate::error::QueueError;

const LOG_TARGET: &str = "comms::tcp::queue";

pub const DEFAULT_MAX_MESSAGES: usize = 1000;
pub const DEFAULT_MAX_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Default)]
struct QueueState {
    enabled: bool,
    messages: VecDeque<Vec<Bytes>>,
    size_bytes: usize,
}

/// Bounded FIFO of frames waiting to be written to one peer.
///
/// `push` never waits: a message is either admitted whole or rejected. The queue starts disabled and is enabled
/// by the owning connection once a socket is up, so messages are not accumulated for unreachable peers.
pub struct TransportQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    max_messages: usize,
    max_bytes: usize,
    usage_gauge: Option<IntGauge>,
}

impl TransportQueue {
    pub fn new(max_messages: usize, max_bytes: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            max_messages,
            max_bytes,
            usage_gauge: None,
        }
    }

    pub fn with_usage_gauge(mut self, gauge: IntGauge) -> Self {
        gauge.set(0);
        self.usage_gauge = Some(gauge);
        self
    }

    pub fn push(&self, payloads: Vec<Bytes>) -> Result<(), QueueError> {
        let incoming = payloads.iter().map(Bytes::len).sum::<usize>();
        let mut state = acquire_lock!(self.state);
        if !state.enabled {
            return Err(QueueError::Disabled);
        }
        if state.size_bytes + incoming > self.max_bytes {
            return Err(QueueError::BytesExceeded {
                size: state.size_bytes,
                incoming,
                max: self.max_bytes,
            });
        }
        if state.messages.len() >= self.max_messages {
            return Err(QueueError::MessagesExceeded { max: self.max_messages });
        }
        state.size_bytes += incoming;
        state.messages.push_back(payloads);
        self.update_gauge(&state);
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    pub fn try_pop(&self) -> Option<Vec<Bytes>> {
        let mut state = acquire_lock!(self.state);
        let payloads = state.messages.pop_front()?;
        state.size_bytes -= payloads.iter().map(Bytes::len).sum::<usize>();
        self.update_gauge(&state);
        Some(payloads)
    }

    /// Waits up to `timeout` for a message. Returns `None` if nothing arrived in time.
    pub async fn pop(&self, timeout: Duration) -> Option<Vec<Bytes>> {
        let deadline = time::Instant::now() + timeout;
        loop {
            if let Some(payloads) = self.try_pop() {
                return Some(payloads);
            }
            if time::timeout_at(deadline, self.notify.notified()).await.is_err() {
                return None;
            }
        }
    }

    pub fn enable(&self) {
        acquire_lock!(self.state).enabled = true;
    }

    pub fn disable(&self) {
        acquire_lock!(self.state).enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        acquire_lock!(self.state).enabled
    }

    pub fn clear(&self) {
        let mut state = acquire_lock!(self.state);
        if !state.messages.is_empty() {
            debug!(
                target: LOG_TARGET,
                "Discarding {} queued message(s) ({} bytes)",
                state.messages.len(),
                state.size_bytes
            );
        }
        state.messages.clear();
        state.size_bytes = 0;
        self.update_gauge(&state);
    }

    /// Drops anything queued for a previous socket and starts accepting messages.
    pub fn on_new_connection(&self) {
        self.clear();
        self.enable();
    }

    pub fn len(&self) -> usize {
        acquire_lock!(self.state).messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size_bytes(&self) -> usize {
        acquire_lock!(self.state).size_bytes
    }

    fn update_gauge(&self, state: &QueueState) {
        if let Some(gauge) = self.usage_gauge.as_ref() {
            let by_messages = percent(state.messages.len(), self.max_messages);
            let by_bytes = percent(state.size_bytes, self.max_bytes);
            gauge.set(by_messages.max(by_bytes));
        }
    }
}

fn percent(used: usize, max: usize) -> i64 {
    if max == 0 {
        return 100;
    }
    (used.saturating_mul(100) / max) as i64
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;

    fn bytes(n: usize) -> Vec<Bytes> {
        vec![Bytes::from(vec![1u8; n])]
    }

    fn enabled_queue(max_messages: usize, max_bytes: usize) -> TransportQueue {
        let queue = TransportQueue::new(max_messages, max_bytes);
        queue.enable();
        queue
    }

    #[test]
    fn starts_disabled() {
        let queue = TransportQueue::new(10, 10);
        assert!(!queue.is_enabled());
        assert_eq!(queue.push(bytes(1)), Err(QueueError::Disabled));
        queue.on_new_connection();
        queue.push(bytes(1)).unwrap();
    }

    #[tokio::test]
    async fn byte_cap() {
        let queue = enabled_queue(100, 10);
        queue.push(bytes(7)).unwrap();
        assert!(matches!(queue.push(bytes(5)), Err(QueueError::BytesExceeded { .. })));
        assert_eq!(queue.size_bytes(), 7);
        assert_eq!(queue.pop(Duration::from_millis(10)).await.unwrap(), bytes(7));
        queue.push(bytes(5)).unwrap();
        assert_eq!(queue.size_bytes(), 5);
    }

    #[test]
    fn message_cap_admits_nothing_on_rejection() {
        let queue = enabled_queue(2, 100);
        queue.push(bytes(1)).unwrap();
        queue.push(bytes(1)).unwrap();
        assert_eq!(queue.push(bytes(1)), Err(QueueError::MessagesExceeded { max: 2 }));
        assert_eq!(queue.size_bytes(), 2);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn pop_times_out_when_empty() {
        let queue = enabled_queue(10, 10);
        assert!(queue.pop(Duration::from_millis(10)).await.is_none());
    }

    #[tokio::test]
    async fn pop_wakes_on_push() {
        let queue = Arc::new(enabled_queue(10, 10));
        let popper = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop(Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        queue.push(bytes(3)).unwrap();
        assert_eq!(popper.await.unwrap(), Some(bytes(3)));
    }

    #[tokio::test]
    async fn preserves_order() {
        let queue = enabled_queue(10, 100);
        for i in 1..=3 {
            queue.push(bytes(i)).unwrap();
        }
        for i in 1..=3 {
            assert_eq!(queue.pop(Duration::from_millis(10)).await.unwrap(), bytes(i));
        }
    }

    #[test]
    fn new_connection_clears() {
        let queue = enabled_queue(10, 100);
        queue.push(bytes(4)).unwrap();
        queue.disable();
        assert_eq!(queue.push(bytes(1)), Err(QueueError::Disabled));
        queue.on_new_connection();
        assert!(queue.is_empty());
        assert_eq!(queue.size_bytes(), 0);
    }

    #[test]
    fn usage_gauge() {
        let gauge = IntGauge::new("test_queue_usage", "test").unwrap();
        let queue = TransportQueue::new(4, 100).with_usage_gauge(gauge.clone());
        queue.enable();
        queue.push(bytes(10)).unwrap();
        assert_eq!(gauge.get(), 25);
        queue.push(bytes(60)).unwrap();
        assert_eq!(gauge.get(), 70);
        queue.clear();
        assert_eq!(gauge.get(), 0);
    }
}
