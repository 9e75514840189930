//! Relay submission
//!
//! Submits `relayMessage` for a message the poller has seen finalized and
//! checks the receipt. Only [`FinalizedMessage`] is accepted.

use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::B256;
use thiserror::Error;
use tracing::{error, info};

use crate::ledger::{DestinationLedger, LedgerError};
use crate::metrics;
use crate::retry::{with_retry, RetryConfig};
use crate::types::{FinalizedMessage, SUCCESS_STATUS};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Mined, but the receipt does not report success
    #[error("relay transaction {tx_id} finished with status {status}")]
    Reverted { tx_id: B256, status: u64 },

    /// No receipt could be obtained
    #[error("relay submission failed after {attempts} attempt(s): {source}")]
    Submission {
        attempts: u32,
        #[source]
        source: LedgerError,
    },
}

pub struct RelayExecutor<D: ?Sized> {
    ledger: Arc<D>,
    retry: RetryConfig,
}

impl<D: DestinationLedger + ?Sized> RelayExecutor<D> {
    pub fn new(ledger: Arc<D>, retry: RetryConfig) -> Self {
        Self { ledger, retry }
    }

    /// Relay one finalized message, returning the destination transaction id.
    ///
    /// A reverted receipt is final. Only submission errors are retried.
    pub async fn relay(&self, finalized: &FinalizedMessage) -> Result<B256, RelayError> {
        let message = finalized.message();
        let key = finalized.key();
        let ledger = &self.ledger;
        let started = Instant::now();

        let receipt = with_retry(&self.retry, |_| async move { ledger.submit_relay(message).await })
            .await
            .map_err(|(source, attempts)| {
                error!(key = %key, attempts, error = %source, "Relay submission failed");
                RelayError::Submission { attempts, source }
            })?;
        metrics::record_relay_latency(started.elapsed().as_secs_f64());

        if receipt.status != SUCCESS_STATUS {
            error!(
                key = %key,
                tx_id = %receipt.transaction_id,
                status = receipt.status,
                "Relay transaction did not succeed"
            );
            return Err(RelayError::Reverted {
                tx_id: receipt.transaction_id,
                status: receipt.status,
            });
        }

        info!(key = %key, tx_id = %receipt.transaction_id, "Message relayed");
        Ok(receipt.transaction_id)
    }
}
