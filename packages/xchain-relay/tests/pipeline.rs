//! End-to-end relay behaviour through the public API, against an in-memory
//! destination ledger.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use tokio::time::Instant;

use xchain_relay::codec;
use xchain_relay::retry::RetryConfig;
use xchain_relay::{
    extractor, CrossChainMessage, DestinationLedger, DestinationReceipt, FailurePolicy,
    FinalityPoller, FinalityStatus, LedgerError, PipelineConfig, RelayBatch, RelayOutcome,
    RelayPipeline, RelayReports, SourceReceipt,
};

fn message(sequence: u64) -> CrossChainMessage {
    CrossChainMessage {
        sender: Address::repeat_byte(0xAA),
        sequence,
        nonce: 7,
        topic: 2,
        payload: Bytes::from(vec![0xde, 0xad, sequence as u8]),
        consistency_level: 1,
    }
}

/// Destination that reports finality on a fixed 0-indexed attempt per sequence
#[derive(Default)]
struct Destination {
    finalize_on: HashMap<u64, u32>,
    relay_status: HashMap<u64, u64>,
    attempts: Mutex<HashMap<u64, u32>>,
    finalized_at: Mutex<HashMap<u64, Instant>>,
    submitted: Mutex<Vec<(u64, Instant)>>,
}

impl Destination {
    fn finalize_on(mut self, sequence: u64, attempt: u32) -> Self {
        self.finalize_on.insert(sequence, attempt);
        self
    }

    fn never_finalize(self, sequence: u64) -> Self {
        self.finalize_on(sequence, u32::MAX)
    }

    fn relay_status(mut self, sequence: u64, status: u64) -> Self {
        self.relay_status.insert(sequence, status);
        self
    }

    fn submitted(&self) -> Vec<u64> {
        self.submitted.lock().unwrap().iter().map(|(s, _)| *s).collect()
    }
}

#[async_trait]
impl DestinationLedger for Destination {
    async fn estimate_finality_check(&self, _: &CrossChainMessage) -> Result<u64, LedgerError> {
        Ok(50_000)
    }

    async fn check_finality(
        &self,
        message: &CrossChainMessage,
        _gas_limit: u64,
    ) -> Result<bool, LedgerError> {
        let mut attempts = self.attempts.lock().unwrap();
        let attempt = attempts.entry(message.sequence).or_insert(0);
        let finalized = *attempt >= self.finalize_on.get(&message.sequence).copied().unwrap_or(0);
        *attempt = attempt.saturating_add(1);
        if finalized {
            self.finalized_at
                .lock()
                .unwrap()
                .entry(message.sequence)
                .or_insert_with(Instant::now);
        }
        Ok(finalized)
    }

    async fn submit_relay(
        &self,
        message: &CrossChainMessage,
    ) -> Result<DestinationReceipt, LedgerError> {
        self.submitted
            .lock()
            .unwrap()
            .push((message.sequence, Instant::now()));
        Ok(DestinationReceipt {
            transaction_id: B256::with_last_byte(message.sequence as u8),
            status: self.relay_status.get(&message.sequence).copied().unwrap_or(1),
        })
    }
}

fn pipeline(destination: Arc<Destination>, policy: FailurePolicy) -> RelayPipeline<Destination> {
    RelayPipeline::new(
        destination,
        PipelineConfig {
            failure_policy: policy,
            retry: RetryConfig::disabled(),
            ..PipelineConfig::default()
        },
    )
}

#[test]
fn receipt_with_two_matching_logs_yields_two_messages_in_order() {
    let unrelated = xchain_relay::ReceiptLog {
        topics: vec![B256::repeat_byte(0x11)],
        data: Bytes::from(vec![0u8; 64]),
        ..Default::default()
    };
    let receipt = SourceReceipt {
        transaction_hash: B256::repeat_byte(0x01),
        status: 1,
        logs: vec![
            codec::encode(&message(1)),
            unrelated,
            codec::encode(&message(2)),
        ],
    };

    let messages = extractor::extract(&receipt).unwrap();
    assert_eq!(messages, vec![message(1), message(2)]);
    assert!(messages.iter().all(|m| m.sender == Address::repeat_byte(0xAA)));
}

#[tokio::test(start_paused = true)]
async fn finalized_on_sixth_attempt_at_five_seconds() {
    let destination = Arc::new(Destination::default().finalize_on(1, 5));
    let poller = FinalityPoller::new(destination);

    let started = Instant::now();
    let status = poller
        .await_finality(message(1), Duration::from_secs(10), Duration::from_secs(1))
        .await
        .unwrap();

    assert!(status.is_finalized());
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_millis(5_100));
}

#[tokio::test(start_paused = true)]
async fn never_finalized_times_out_at_three_seconds() {
    let destination = Arc::new(Destination::default().never_finalize(1));
    let poller = FinalityPoller::new(destination);

    let started = Instant::now();
    let status = poller
        .await_finality(message(1), Duration::from_secs(3), Duration::from_secs(1))
        .await
        .unwrap();

    assert!(matches!(status, FinalityStatus::TimedOut { .. }));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_millis(3_100));
}

#[tokio::test(start_paused = true)]
async fn finalized_only_when_attempt_starts_before_deadline() {
    let deadline = Duration::from_secs(3);
    let interval = Duration::from_secs(1);

    for n in 0..6u32 {
        let destination = Arc::new(Destination::default().finalize_on(1, n));
        let status = FinalityPoller::new(destination)
            .await_finality(message(1), deadline, interval)
            .await
            .unwrap();

        let expected = interval * n < deadline;
        assert_eq!(status.is_finalized(), expected, "attempt {}", n);
    }
}

#[tokio::test(start_paused = true)]
async fn second_message_finalizing_first_is_relayed_second() {
    let destination = Arc::new(Destination::default().finalize_on(1, 4).finalize_on(2, 0));
    let reports = pipeline(destination.clone(), FailurePolicy::AbortRemaining)
        .run(RelayBatch::new(vec![message(1), message(2)]).unwrap())
        .await;

    assert!(reports.all_relayed());
    assert_eq!(destination.submitted(), vec![1, 2]);

    let finalized_at = destination.finalized_at.lock().unwrap().clone();
    assert!(finalized_at[&2] < finalized_at[&1]);
    let submitted = destination.submitted.lock().unwrap().clone();
    assert!(submitted[0].1 >= finalized_at[&1]);
}

#[tokio::test(start_paused = true)]
async fn failed_relay_stops_later_submissions() {
    let destination = Arc::new(Destination::default().relay_status(1, 0));
    let reports = pipeline(destination.clone(), FailurePolicy::AbortRemaining)
        .run(RelayBatch::new(vec![message(1), message(2), message(3)]).unwrap())
        .await;

    assert!(matches!(reports[0].outcome, RelayOutcome::RelayFailed(_)));
    assert!(matches!(reports[1].outcome, RelayOutcome::Aborted { .. }));
    assert!(matches!(reports[2].outcome, RelayOutcome::Aborted { .. }));
    assert_eq!(destination.submitted(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn skip_policy_reports_every_message() {
    let destination = Arc::new(Destination::default().never_finalize(2).relay_status(3, 0));
    let reports = pipeline(destination.clone(), FailurePolicy::SkipAndContinue)
        .run(RelayBatch::new(vec![
            message(1),
            message(2),
            message(3),
            message(4),
        ]).unwrap())
        .await;

    let labels: Vec<&str> = reports.iter().map(|r| r.outcome.as_str()).collect();
    assert_eq!(
        labels,
        vec!["relayed", "finality_timeout", "relay_failed", "relayed"]
    );
    assert_eq!(destination.submitted(), vec![1, 3, 4]);
}
