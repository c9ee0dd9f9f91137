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

use meridian_metrics::{Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec};
use once_cell::sync::Lazy;

use crate::types::NodeAddress;

pub fn queue_usage_percent(peer: &NodeAddress) -> IntGauge {
    static METER: Lazy<IntGaugeVec> = Lazy::new(|| {
        meridian_metrics::register_int_gauge_vec(
            "comms::tcp::queue_usage_percent",
            "Send queue usage as a percentage of the tighter of the message and byte caps",
            &["peer"],
        )
        .unwrap()
    });

    METER.with_label_values(&[peer.short_str().as_str()])
}

pub fn enqueue_failures(peer: &NodeAddress) -> IntCounter {
    static METER: Lazy<IntCounterVec> = Lazy::new(|| {
        meridian_metrics::register_int_counter_vec(
            "comms::tcp::enqueue_failures",
            "The number of messages rejected by a peer's send queue",
            &["peer"],
        )
        .unwrap()
    });

    METER.with_label_values(&[peer.short_str().as_str()])
}

pub fn round_trip_time(peer: &NodeAddress) -> Histogram {
    static METER: Lazy<HistogramVec> = Lazy::new(|| {
        meridian_metrics::register_histogram_vec(
            "comms::tcp::round_trip_seconds",
            "Time from writing a frame to receiving its acknowledgement",
            &["peer"],
            meridian_metrics::latency_buckets(),
        )
        .unwrap()
    });

    METER.with_label_values(&[peer.short_str().as_str()])
}

pub fn round_trip_samples_dropped(peer: &NodeAddress) -> IntCounter {
    static METER: Lazy<IntCounterVec> = Lazy::new(|| {
        meridian_metrics::register_int_counter_vec(
            "comms::tcp::round_trip_samples_dropped",
            "Send timestamps discarded because too many frames were awaiting acknowledgement",
            &["peer"],
        )
        .unwrap()
    });

    METER.with_label_values(&[peer.short_str().as_str()])
}

pub fn reconnects(peer: &NodeAddress) -> IntCounter {
    static METER: Lazy<IntCounterVec> = Lazy::new(|| {
        meridian_metrics::register_int_counter_vec(
            "comms::tcp::reconnects",
            "The number of times an outgoing connection was lost or failed to connect",
            &["peer"],
        )
        .unwrap()
    });

    METER.with_label_values(&[peer.short_str().as_str()])
}

pub fn inbound_connections() -> IntGauge {
    static METER: Lazy<IntGauge> = Lazy::new(|| {
        meridian_metrics::register_int_gauge(
            "comms::tcp::inbound_connections",
            "The number of live inbound sockets",
        )
        .unwrap()
    });

    METER.clone()
}

pub fn inbound_frame_errors(reason: &str) -> IntCounter {
    static METER: Lazy<IntCounterVec> = Lazy::new(|| {
        meridian_metrics::register_int_counter_vec(
            "comms::tcp::inbound_frame_errors",
            "Inbound sockets closed because of a frame read error",
            &["reason"],
        )
        .unwrap()
    });

    METER.with_label_values(&[reason])
}

pub fn inbound_messages() -> IntCounter {
    static METER: Lazy<IntCounter> = Lazy::new(|| {
        meridian_metrics::register_int_counter(
            "comms::tcp::inbound_messages",
            "The number of non-keepalive frames received",
        )
        .unwrap()
    });

    METER.clone()
}
