//! Prometheus metrics for the relay pipeline
//!
//! Registered in the default registry; the binary can dump the text
//! exposition after a run.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};

use crate::types::RelayOutcome;

lazy_static! {
    pub static ref MESSAGES_EXTRACTED: Counter = register_counter!(
        "xchain_relay_messages_extracted_total",
        "Total number of cross-chain messages extracted from source receipts"
    ).unwrap();

    pub static ref OUTCOMES: CounterVec = register_counter_vec!(
        "xchain_relay_outcomes_total",
        "Terminal outcomes per message",
        &["outcome"]
    ).unwrap();

    pub static ref POLL_ATTEMPTS: Counter = register_counter!(
        "xchain_relay_poll_attempts_total",
        "Total number of finality queries issued"
    ).unwrap();

    pub static ref FINALITY_WAIT: Histogram = register_histogram!(
        "xchain_relay_finality_wait_seconds",
        "Time from the first finality query until finality was observed",
        vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
    ).unwrap();

    pub static ref RELAY_LATENCY: Histogram = register_histogram!(
        "xchain_relay_relay_latency_seconds",
        "Time to submit a relay transaction and obtain its receipt",
        vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]
    ).unwrap();
}

pub fn record_extracted(count: usize) {
    MESSAGES_EXTRACTED.inc_by(count as f64);
}

pub fn record_outcome(outcome: &RelayOutcome) {
    OUTCOMES.with_label_values(&[outcome.as_str()]).inc();
}

pub fn record_poll_attempt() {
    POLL_ATTEMPTS.inc();
}

pub fn record_finality_wait(seconds: f64) {
    FINALITY_WAIT.observe(seconds);
}

pub fn record_relay_latency(seconds: f64) {
    RELAY_LATENCY.observe(seconds);
}

/// Render every registered metric in the Prometheus text format
pub fn render() -> eyre::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
