//! Relay pipeline
//!
//! Drives one batch from extraction to relay:
//!
//! 1. One finality poll task per message, all running concurrently.
//! 2. Poll results pass through an [`OrderingGate`] so nothing is relayed
//!    before every earlier message has been settled.
//! 3. Released messages are relayed one at a time by this task, which makes
//!    it the only submission point for the destination signer.
//!
//! Under [`FailurePolicy::AbortRemaining`] the first failure reached in
//! source order stops relaying: every later message is reported as
//! [`RelayOutcome::Aborted`]. Polls already running are left to finish and
//! their results are only logged, unless
//! [`PipelineConfig::cancel_polls_on_abort`] is set.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::rpc::types::TransactionRequest;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::batch::RelayBatch;
use crate::executor::RelayExecutor;
use crate::extractor::{ExtractionError, MessageExtractor};
use crate::finality::{FinalityPoller, FinalityStatus};
use crate::gate::OrderingGate;
use crate::ledger::{DestinationLedger, LedgerError, SourceLedger};
use crate::metrics;
use crate::retry::RetryConfig;
use crate::types::{
    FinalizedMessage, MessageKey, MessageState, RelayOutcome, RelayReport, SourceReceipt,
};

/// What happens to later messages once one fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failure; later messages are never submitted
    #[default]
    AbortRemaining,
    /// Record the failure and keep relaying later messages in order
    SkipAndContinue,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown failure policy '{0}', expected 'abort' or 'skip'")]
pub struct ParsePolicyError(String);

impl FromStr for FailurePolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort" | "abort-remaining" => Ok(FailurePolicy::AbortRemaining),
            "skip" | "skip-and-continue" => Ok(FailurePolicy::SkipAndContinue),
            other => Err(ParsePolicyError(other.to_string())),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::AbortRemaining => f.write_str("abort"),
            FailurePolicy::SkipAndContinue => f.write_str("skip"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Time between finality queries for one message
    pub poll_interval: Duration,
    /// Per-message finality deadline, measured from its first query
    pub finality_deadline: Duration,
    /// Optional bound on all polling in a run, measured from run start
    pub pipeline_deadline: Option<Duration>,
    pub failure_policy: FailurePolicy,
    /// Cancel outstanding polls once the run aborts instead of letting them
    /// run to completion
    pub cancel_polls_on_abort: bool,
    /// Retry policy for relay submission
    pub retry: RetryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            finality_deadline: Duration::from_secs(30),
            pipeline_deadline: None,
            failure_policy: FailurePolicy::default(),
            cancel_polls_on_abort: false,
            retry: RetryConfig::default(),
        }
    }
}

/// Errors that prevent a run from starting
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source transaction failed: {0}")]
    Source(#[from] LedgerError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// A poll result waiting at the gate
#[derive(Debug)]
enum Polled {
    Finalized(FinalizedMessage),
    Failed(RelayOutcome),
}

impl From<Result<FinalityStatus, crate::finality::PollError>> for Polled {
    fn from(result: Result<FinalityStatus, crate::finality::PollError>) -> Self {
        match result {
            Ok(FinalityStatus::Finalized(finalized)) => Polled::Finalized(finalized),
            Ok(FinalityStatus::TimedOut { .. }) => Polled::Failed(RelayOutcome::FinalityTimeout),
            Err(e) => Polled::Failed(RelayOutcome::PollFailed(e.to_string())),
        }
    }
}

/// Bookkeeping for one run
struct Run {
    keys: Vec<MessageKey>,
    outcomes: Vec<Option<RelayOutcome>>,
    offered: Vec<bool>,
    gate: OrderingGate<Polled>,
    aborted: bool,
}

impl Run {
    fn new(keys: Vec<MessageKey>) -> Self {
        let len = keys.len();
        Self {
            keys,
            outcomes: vec![None; len],
            offered: vec![false; len],
            gate: OrderingGate::new(len),
            aborted: false,
        }
    }

    fn offer(&mut self, position: usize, polled: Polled) {
        match self.gate.offer(position, polled) {
            Ok(()) => self.offered[position] = true,
            Err(e) => warn!(error = %e, "Dropping poll result"),
        }
    }

    /// Mark everything behind `position` as blocked by it
    fn abort_after(&mut self, position: usize) {
        let blocked_by = self.keys[position];
        for remaining in self.gate.close() {
            debug!(key = %self.keys[remaining], state = %MessageState::Aborted, %blocked_by, "Message aborted");
            self.outcomes[remaining] = Some(RelayOutcome::Aborted { blocked_by });
        }
        self.aborted = true;
    }

    fn into_reports(self) -> Vec<RelayReport> {
        self.keys
            .into_iter()
            .zip(self.outcomes)
            .map(|(key, outcome)| RelayReport {
                key,
                outcome: outcome.unwrap_or_else(|| {
                    RelayOutcome::PollFailed("message was never settled".to_string())
                }),
            })
            .collect()
    }
}

/// Relays batches of cross-chain messages to one destination ledger
pub struct RelayPipeline<D: ?Sized> {
    ledger: Arc<D>,
    config: PipelineConfig,
    extractor: MessageExtractor,
}

impl<D: DestinationLedger + ?Sized + 'static> RelayPipeline<D> {
    pub fn new(ledger: Arc<D>, config: PipelineConfig) -> Self {
        Self {
            ledger,
            config,
            extractor: MessageExtractor::new(),
        }
    }

    /// Use `extractor` for [`run_receipts`](Self::run_receipts) and
    /// [`run_triggered`](Self::run_triggered)
    pub fn with_extractor(mut self, extractor: MessageExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Submit the triggering source transaction, then relay what it published.
    pub async fn run_triggered<S: SourceLedger + ?Sized>(
        &self,
        source: &S,
        request: TransactionRequest,
    ) -> Result<Vec<RelayReport>, PipelineError> {
        let receipt = source.submit(request).await?;
        info!(
            tx = %receipt.transaction_hash,
            status = receipt.status,
            "Source transaction mined"
        );
        Ok(self.run_receipts(std::slice::from_ref(&receipt)).await?)
    }

    /// Extract messages from `receipts` and relay them.
    ///
    /// Extraction is all-or-nothing: if any receipt fails, nothing is polled.
    pub async fn run_receipts(
        &self,
        receipts: &[SourceReceipt],
    ) -> Result<Vec<RelayReport>, ExtractionError> {
        let batch = RelayBatch::extract_with(&self.extractor, receipts).map_err(|e| {
            error!(error = %e, state = %MessageState::ExtractionFailed, "Extraction failed");
            e
        })?;
        Ok(self.run(batch).await)
    }

    /// Relay every message in `batch`, returning one report per message in
    /// batch order.
    pub async fn run(&self, batch: RelayBatch) -> Vec<RelayReport> {
        let started = Instant::now();
        let keys = batch.keys();
        metrics::record_extracted(keys.len());
        info!(
            messages = keys.len(),
            policy = %self.config.failure_policy,
            "Starting relay run"
        );

        let mut tasks = self.spawn_polls(batch, started);
        let executor = RelayExecutor::new(Arc::clone(&self.ledger), self.config.retry.clone());
        let mut run = Run::new(keys);

        while let Some(joined) = tasks.join_next().await {
            let (position, polled) = match joined {
                Ok(joined) => joined,
                Err(e) => {
                    error!(error = %e, "Poll task ended unexpectedly");
                    continue;
                }
            };
            if run.aborted {
                debug!(key = %run.keys[position], result = ?polled, "Poll finished after abort");
                continue;
            }
            run.offer(position, polled);
            self.release(&mut run, &executor).await;
            if run.aborted && self.config.cancel_polls_on_abort {
                debug!(outstanding = tasks.len(), "Cancelling outstanding polls");
                tasks.abort_all();
                break;
            }
        }
        tasks.shutdown().await;

        // Positions whose poll task died never reached the gate
        if !run.aborted && !run.gate.is_complete() {
            for position in run.gate.cursor()..run.keys.len() {
                if !run.offered[position] {
                    run.offer(
                        position,
                        Polled::Failed(RelayOutcome::PollFailed(
                            "poll task ended unexpectedly".to_string(),
                        )),
                    );
                }
            }
            self.release(&mut run, &executor).await;
        }

        let reports = run.into_reports();
        for report in &reports {
            metrics::record_outcome(&report.outcome);
        }
        info!(
            messages = reports.len(),
            relayed = reports.iter().filter(|r| r.outcome.is_relayed()).count(),
            elapsed = ?started.elapsed(),
            "Relay run finished"
        );
        reports
    }

    fn spawn_polls(&self, batch: RelayBatch, started: Instant) -> JoinSet<(usize, Polled)> {
        let poller = FinalityPoller::new(Arc::clone(&self.ledger));
        // Unrepresentable deadlines are no deadline
        let pipeline_deadline_at = self
            .config
            .pipeline_deadline
            .and_then(|d| started.checked_add(d));
        let mut tasks = JoinSet::new();

        for (position, message) in batch.into_messages().into_iter().enumerate() {
            let deadline = match pipeline_deadline_at {
                Some(at) => self
                    .config
                    .finality_deadline
                    .min(at.saturating_duration_since(Instant::now())),
                None => self.config.finality_deadline,
            };
            let interval = self.config.poll_interval;
            let poller = poller.clone();

            debug!(key = %message.key(), state = %MessageState::Polling, ?deadline, "Polling for finality");
            tasks.spawn(async move {
                let result = poller.await_finality(message, deadline, interval).await;
                (position, Polled::from(result))
            });
        }
        tasks
    }

    /// Relay everything the gate lets through, in order
    async fn release(&self, run: &mut Run, executor: &RelayExecutor<D>) {
        while let Some((position, polled)) = run.gate.next_ready() {
            let key = run.keys[position];
            let outcome = match polled {
                Polled::Finalized(finalized) => {
                    debug!(key = %key, state = %MessageState::Relaying, "Relaying message");
                    match executor.relay(&finalized).await {
                        Ok(tx_id) => RelayOutcome::Relayed(tx_id),
                        Err(e) => RelayOutcome::RelayFailed(e.to_string()),
                    }
                }
                Polled::Failed(outcome) => outcome,
            };

            let failed = !outcome.is_relayed();
            if failed {
                warn!(key = %key, state = %MessageState::from(&outcome), outcome = %outcome, "Message not relayed");
            }
            run.outcomes[position] = Some(outcome);

            if failed && self.config.failure_policy == FailurePolicy::AbortRemaining {
                run.abort_after(position);
                return;
            }
        }
    }
}
