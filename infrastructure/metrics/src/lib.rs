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

//! Thin registration layer over `prometheus`.
//!
//! Collectors are registered on a process wide default registry. Call sites keep their collectors in a
//! `once_cell::sync::Lazy` static and hand out the labelled children, e.g.
//!
//! ```
//! use meridian_metrics::IntCounter;
//! use once_cell::sync::Lazy;
//!
//! pub fn widgets_made() -> &'static IntCounter {
//!     static METER: Lazy<IntCounter> =
//!         Lazy::new(|| meridian_metrics::register_int_counter("docs::widgets_made", "Widgets made").unwrap());
//!     &METER
//! }
//! widgets_made().inc();
//! ```

use once_cell::sync::Lazy;
pub use prometheus::{
    Histogram,
    HistogramOpts,
    HistogramVec,
    IntCounter,
    IntCounterVec,
    IntGauge,
    IntGaugeVec,
    Opts,
    Registry,
};
use prometheus::{Encoder, TextEncoder};

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("Metric text is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

pub fn get_default_registry() -> &'static Registry {
    &REGISTRY
}

pub fn register_int_counter(name: &str, help: &str) -> Result<IntCounter, MetricsError> {
    let counter = IntCounter::new(name, help)?;
    get_default_registry().register(Box::new(counter.clone()))?;
    Ok(counter)
}

pub fn register_int_counter_vec(name: &str, help: &str, label_names: &[&str]) -> Result<IntCounterVec, MetricsError> {
    let counter = IntCounterVec::new(Opts::new(name, help), label_names)?;
    get_default_registry().register(Box::new(counter.clone()))?;
    Ok(counter)
}

pub fn register_int_gauge(name: &str, help: &str) -> Result<IntGauge, MetricsError> {
    let gauge = IntGauge::new(name, help)?;
    get_default_registry().register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

pub fn register_int_gauge_vec(name: &str, help: &str, label_names: &[&str]) -> Result<IntGaugeVec, MetricsError> {
    let gauge = IntGaugeVec::new(Opts::new(name, help), label_names)?;
    get_default_registry().register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

pub fn register_histogram_vec(
    name: &str,
    help: &str,
    label_names: &[&str],
    buckets: Vec<f64>,
) -> Result<HistogramVec, MetricsError> {
    let histogram = HistogramVec::new(HistogramOpts::new(name, help).buckets(buckets), label_names)?;
    get_default_registry().register(Box::new(histogram.clone()))?;
    Ok(histogram)
}

/// Buckets (seconds) suited to network round trips and short state durations.
pub fn latency_buckets() -> Vec<f64> {
    vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
}

/// Renders every metric in the default registry in the prometheus text exposition format.
pub fn encode_default_registry() -> Result<String, MetricsError> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&get_default_registry().gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registered_metrics_are_encoded() {
        let counter = register_int_counter_vec("test::encoded_counter", "A test counter", &["peer"]).unwrap();
        counter.with_label_values(&["abcdef"]).inc_by(3);
        let text = encode_default_registry().unwrap();
        assert!(text.contains("test::encoded_counter{peer=\"abcdef\"} 3"));
    }

    #[test]
    fn duplicate_registration_fails() {
        register_int_gauge("test::duplicate_gauge", "A test gauge").unwrap();
        let err = register_int_gauge("test::duplicate_gauge", "A test gauge").unwrap_err();
        assert!(matches!(err, MetricsError::Prometheus(_)));
    }
}
