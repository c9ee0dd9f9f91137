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

use meridian_metrics::{Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge};
use once_cell::sync::Lazy;

pub fn time_in_state(state: &str) -> Histogram {
    static METER: Lazy<HistogramVec> = Lazy::new(|| {
        meridian_metrics::register_histogram_vec(
            "c::bs::time_in_state_seconds",
            "Time spent in each block sync state",
            &["state"],
            meridian_metrics::latency_buckets(),
        )
        .unwrap()
    });

    METER.with_label_values(&[state])
}

pub fn state_outcomes(state: &str, outcome: &str) -> IntCounter {
    static METER: Lazy<IntCounterVec> = Lazy::new(|| {
        meridian_metrics::register_int_counter_vec(
            "c::bs::state_outcomes",
            "How each block sync state was left",
            &["state", "outcome"],
        )
        .unwrap()
    });

    METER.with_label_values(&[state, outcome])
}

pub fn committed_blocks() -> IntCounter {
    static METER: Lazy<IntCounter> = Lazy::new(|| {
        meridian_metrics::register_int_counter("c::bs::committed_blocks", "Blocks committed by block sync").unwrap()
    });

    METER.clone()
}

pub fn rejected_blocks(reason: &str) -> IntCounter {
    static METER: Lazy<IntCounterVec> = Lazy::new(|| {
        meridian_metrics::register_int_counter_vec(
            "c::bs::rejected_blocks",
            "Blocks received through sync that failed validation or commit",
            &["reason"],
        )
        .unwrap()
    });

    METER.with_label_values(&[reason])
}

pub fn last_committed_height() -> IntGauge {
    static METER: Lazy<IntGauge> = Lazy::new(|| {
        meridian_metrics::register_int_gauge(
            "c::bs::last_committed_height",
            "Height of the last block committed by block sync",
        )
        .unwrap()
    });

    METER.clone()
}

pub fn conduit_dropped_events(kind: &str) -> IntCounter {
    static METER: Lazy<IntCounterVec> = Lazy::new(|| {
        meridian_metrics::register_int_counter_vec(
            "c::bs::conduit_dropped_events",
            "Events dropped because the sync state machine mailbox was full",
            &["kind"],
        )
        .unwrap()
    });

    METER.with_label_values(&[kind])
}

pub fn topic_dropped_messages(reason: &str) -> IntCounter {
    static METER: Lazy<IntCounterVec> = Lazy::new(|| {
        meridian_metrics::register_int_counter_vec(
            "c::bs::topic_dropped_messages",
            "Inbound gossip messages dropped before reaching a block sync handler",
            &["reason"],
        )
        .unwrap()
    });

    METER.with_label_values(&[reason])
}

pub fn served_blocks() -> IntCounter {
    static METER: Lazy<IntCounter> = Lazy::new(|| {
        meridian_metrics::register_int_counter("c::bs::served_blocks", "Blocks sent to other nodes in chunk responses")
            .unwrap()
    });

    METER.clone()
}
