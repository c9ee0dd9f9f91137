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
    sync::{Arc, Mutex},
    task::{Context, Poll},
    time::Duration,
};

use meridian_shutdown::Shutdown;

/// A one-shot timer owned by a single sync state.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Timer {
    inner: Pin<Box<dyn Future<Output = ()> + Send>>,
}

impl Timer {
    pub fn new<F>(fut: F) -> Self
    where F: Future<Output = ()> + Send + 'static {
        Self { inner: Box::pin(fut) }
    }
}

impl Future for Timer {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

/// Creates the timer a state arms on entry.
pub type TimerFactory = Arc<dyn Fn(Duration) -> Timer + Send + Sync>;

pub fn tokio_timer_factory() -> TimerFactory {
    Arc::new(|duration| Timer::new(tokio::time::sleep(duration)))
}

/// Timers that only fire when a test says so.
#[derive(Clone, Default)]
pub struct ManualTimers {
    state: Arc<Mutex<ManualTimersState>>,
}

#[derive(Default)]
struct ManualTimersState {
    pending: Vec<Shutdown>,
    created: usize,
}

impl ManualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self) -> TimerFactory {
        let state = self.state.clone();
        Arc::new(move |_| {
            let trigger = Shutdown::new();
            let timer = Timer::new(trigger.to_signal());
            let mut lock = acquire_lock!(state);
            lock.pending.push(trigger);
            lock.created += 1;
            timer
        })
    }

    /// Fires every timer created so far that has not fired yet.
    pub fn fire_all(&self) {
        let pending = {
            let mut lock = acquire_lock!(self.state);
            std::mem::take(&mut lock.pending)
        };
        for trigger in pending {
            trigger.trigger();
        }
    }

    /// Number of timers created since these timers were made.
    pub fn created(&self) -> usize {
        acquire_lock!(self.state).created
    }

    /// Waits until `count` timers have been created, then fires every pending timer.
    pub async fn fire_once_created(&self, count: usize) {
        while self.created() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        self.fire_all();
    }
}

#[cfg(test)]
mod test {
    use tokio::time;

    use super::*;

    #[tokio::test]
    async fn manual_timers_fire_on_demand() {
        let timers = ManualTimers::new();
        let factory = timers.factory();
        let timer = factory(Duration::from_millis(1));
        assert_eq!(timers.created(), 1);

        let mut timer = Box::pin(timer);
        assert!(time::timeout(Duration::from_millis(20), &mut timer).await.is_err());
        timers.fire_all();
        time::timeout(Duration::from_millis(20), timer).await.unwrap();
    }

    #[tokio::test]
    async fn tokio_timer_elapses() {
        let factory = tokio_timer_factory();
        time::timeout(Duration::from_secs(1), factory(Duration::from_millis(5)))
            .await
            .unwrap();
    }
}
