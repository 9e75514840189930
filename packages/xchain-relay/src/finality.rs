//! Finality polling
//!
//! One poll loop per message. Each loop asks the destination MessageBus
//! whether the message is final, on a fixed schedule, until it says yes or
//! the deadline passes. Loops share nothing but the ledger client.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::ledger::{DestinationLedger, LedgerError};
use crate::metrics;
use crate::types::{CrossChainMessage, FinalizedMessage};

/// How a poll loop ended, when it ended without an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalityStatus {
    Finalized(FinalizedMessage),
    /// The deadline passed without the ledger reporting finality
    TimedOut { attempts: u32, elapsed: Duration },
}

impl FinalityStatus {
    pub fn is_finalized(&self) -> bool {
        matches!(self, FinalityStatus::Finalized(_))
    }
}

/// The finality query itself failed. Distinct from a timeout.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("finality check estimate failed: {0}")]
    Estimate(#[source] LedgerError),

    #[error("finality query {attempt} failed: {source}")]
    Query {
        attempt: u32,
        #[source]
        source: LedgerError,
    },

    #[error("poll interval must be greater than zero")]
    ZeroInterval,
}

/// Gas limit for the finality view call: estimate plus half again
pub fn padded_gas_limit(estimate: u64) -> u64 {
    estimate.saturating_add(estimate / 2)
}

/// Polls the destination ledger for message finality
pub struct FinalityPoller<D: ?Sized> {
    ledger: Arc<D>,
}

impl<D: ?Sized> Clone for FinalityPoller<D> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
        }
    }
}

impl<D: DestinationLedger + ?Sized> FinalityPoller<D> {
    pub fn new(ledger: Arc<D>) -> Self {
        Self { ledger }
    }

    /// Wait until `message` is final on the destination ledger.
    ///
    /// The clock starts here. The first query goes out immediately, later
    /// ones every `poll_interval` measured from the previous attempt's start.
    /// An attempt is only started before `deadline`; a query still in flight
    /// when it elapses is dropped and the loop reports
    /// [`FinalityStatus::TimedOut`]. A deadline too large to represent is
    /// treated as no deadline.
    pub async fn await_finality(
        &self,
        message: CrossChainMessage,
        deadline: Duration,
        poll_interval: Duration,
    ) -> Result<FinalityStatus, PollError> {
        if poll_interval.is_zero() {
            return Err(PollError::ZeroInterval);
        }

        let key = message.key();
        let started = Instant::now();
        let deadline_at = started.checked_add(deadline);
        let timed_out = |attempts: u32| {
            let elapsed = started.elapsed();
            warn!(key = %key, attempts, ?elapsed, "Finality not observed before deadline");
            Ok(FinalityStatus::TimedOut { attempts, elapsed })
        };

        if deadline.is_zero() {
            return timed_out(0);
        }

        let estimate = match within(deadline_at, self.ledger.estimate_finality_check(&message)).await {
            Some(result) => result.map_err(PollError::Estimate)?,
            None => return timed_out(0),
        };
        let gas_limit = padded_gas_limit(estimate);
        debug!(key = %key, estimate, gas_limit, "Estimated finality check");

        let mut attempts = 0u32;
        let mut attempt_at = started;
        let mut finality_time_checked = false;

        loop {
            attempts += 1;
            metrics::record_poll_attempt();

            match within(deadline_at, self.ledger.check_finality(&message, gas_limit)).await {
                None => return timed_out(attempts),
                Some(Err(source)) => {
                    warn!(key = %key, attempt = attempts, error = %source, "Finality query failed");
                    return Err(PollError::Query {
                        attempt: attempts,
                        source,
                    });
                }
                Some(Ok(true)) => {
                    let waited = started.elapsed();
                    info!(key = %key, attempts, ?waited, "Message finalized");
                    metrics::record_finality_wait(waited.as_secs_f64());
                    return Ok(FinalityStatus::Finalized(FinalizedMessage::new(
                        message, attempts, waited,
                    )));
                }
                Some(Ok(false)) => {
                    debug!(key = %key, attempt = attempts, "Not finalized yet");
                }
            }

            let next_at = match (attempt_at.checked_add(poll_interval), deadline_at) {
                (Some(next), Some(at)) if next < at => next,
                (Some(next), None) => next,
                (_, Some(at)) => {
                    sleep_until(at).await;
                    return timed_out(attempts);
                }
                (None, None) => std::future::pending::<Instant>().await,
            };

            // Informational only; bounded by the next slot so the schedule holds
            if !finality_time_checked {
                finality_time_checked = true;
                self.log_finality_time(&message, next_at).await;
            }

            sleep_until(next_at).await;
            attempt_at = next_at;
        }
    }

    async fn log_finality_time(&self, message: &CrossChainMessage, until: Instant) {
        let key = message.key();
        match timeout_at(until, self.ledger.finality_time(message)).await {
            Ok(Ok(Some(time))) => debug!(key = %key, finality_time = %time, "Finality time reported"),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => debug!(key = %key, error = %e, "Finality time lookup failed"),
            Err(_) => debug!(key = %key, "Finality time lookup outlasted the poll interval"),
        }
    }
}

/// Run `future` to completion, or until `deadline` when there is one
async fn within<F: Future>(deadline: Option<Instant>, future: F) -> Option<F::Output> {
    match deadline {
        Some(at) => timeout_at(at, future).await.ok(),
        None => Some(future.await),
    }
}
