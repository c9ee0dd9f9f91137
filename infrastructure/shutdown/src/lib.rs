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

//! Cancellation primitives shared by every long running task in the node.
//!
//! A [Shutdown] is held by the owner of a task tree. Every task holds a cloned [ShutdownSignal] and must return at
//! its next suspension point once the signal resolves. Dropping the last `Shutdown` clone resolves all signals, which
//! also makes the pair usable as an "exited" notification: a task that owns a `Shutdown` and drops it on return lets
//! anyone holding the signal join on the task.

pub mod oneshot_trigger;

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::future::FusedFuture;

use crate::oneshot_trigger::{OneshotSignal, OneshotTrigger};

/// Trigger for shutdowns.
///
/// Use `to_signal` to create a future which will resolve when `Shutdown` is triggered.
/// Use `trigger` to signal. All signals will resolve.
///
/// _Note_: This will trigger when the last clone is dropped, so the `Shutdown` instance should be held as long as
/// required by the application.
#[derive(Clone, Debug, Default)]
pub struct Shutdown(OneshotTrigger<()>);

impl Shutdown {
    pub fn new() -> Self {
        Self(OneshotTrigger::new())
    }

    /// Resolve every signal created from this instance (or any of its clones). Idempotent.
    pub fn trigger(&self) {
        self.0.broadcast(());
    }

    pub fn is_triggered(&self) -> bool {
        self.0.is_used()
    }

    pub fn to_signal(&self) -> ShutdownSignal {
        ShutdownSignal(self.0.to_signal())
    }
}

/// Receiver end of a shutdown signal. Once resolved the consumer should shut down.
#[derive(Debug, Clone)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct ShutdownSignal(OneshotSignal<()>);

impl ShutdownSignal {
    /// Returns true once the paired `Shutdown` has triggered or has been dropped.
    pub fn is_triggered(&self) -> bool {
        self.0.is_resolved()
    }

    /// Wait for the shutdown signal to trigger without consuming it.
    pub fn wait(&mut self) -> &mut Self {
        self
    }
}

impl Future for ShutdownSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Both an explicit trigger and a dropped trigger resolve the signal
        Pin::new(&mut self.0).poll(cx).map(|_| ())
    }
}

impl FusedFuture for ShutdownSignal {
    fn is_terminated(&self) -> bool {
        self.0.is_terminated()
    }
}
