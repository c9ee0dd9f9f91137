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
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
        Mutex,
    },
    task::{Context, Poll},
};

use futures::{
    channel::oneshot,
    future::{FusedFuture, Shared},
    FutureExt,
};

pub fn channel<T: Clone>() -> OneshotTrigger<T> {
    OneshotTrigger::new()
}

#[derive(Debug)]
struct TriggerState<T> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
    resolved: Arc<AtomicBool>,
}

impl<T> Drop for TriggerState<T> {
    fn drop(&mut self) {
        // Dropping the sender cancels the channel, which resolves every signal
        self.resolved.store(true, Ordering::SeqCst);
    }
}

/// Sends a single value to any number of [OneshotSignal]s. The value is sent at most once.
#[derive(Clone, Debug)]
pub struct OneshotTrigger<T> {
    state: Arc<TriggerState<T>>,
    signal: OneshotSignal<T>,
}

impl<T: Clone> OneshotTrigger<T> {
    pub fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        let resolved = Arc::new(AtomicBool::new(false));
        Self {
            state: Arc::new(TriggerState {
                sender: Mutex::new(Some(tx)),
                resolved: resolved.clone(),
            }),
            signal: OneshotSignal {
                inner: rx.shared(),
                resolved,
            },
        }
    }

    pub fn to_signal(&self) -> OneshotSignal<T> {
        self.signal.clone()
    }

    pub fn broadcast(&self, item: T) {
        let mut lock = match self.state.sender.lock() {
            Ok(lock) => lock,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(tx) = lock.take() {
            self.state.resolved.store(true, Ordering::SeqCst);
            let _result = tx.send(item);
        }
    }

    pub fn is_used(&self) -> bool {
        self.state.resolved.load(Ordering::SeqCst)
    }
}

impl<T: Clone> Default for OneshotTrigger<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct OneshotSignal<T> {
    inner: Shared<oneshot::Receiver<T>>,
    resolved: Arc<AtomicBool>,
}

impl<T> OneshotSignal<T> {
    /// True if the trigger has broadcast or was dropped, whether or not this signal has been polled.
    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::SeqCst)
    }
}

impl<T: Clone> Future for OneshotSignal<T> {
    type Output = Option<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.inner.is_terminated() {
            return Poll::Ready(None);
        }

        match Pin::new(&mut self.inner).poll(cx) {
            Poll::Ready(Ok(v)) => Poll::Ready(Some(v)),
            // Trigger dropped
            Poll::Ready(Err(_)) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T: Clone> FusedFuture for OneshotSignal<T> {
    fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }
}
