//! Ledger ports
//!
//! The pipeline talks to both chains only through these traits. The EVM
//! implementations live in [`crate::evm`]; tests use scripted doubles.

use alloy::primitives::{B256, U256};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use thiserror::Error;

use crate::types::{CrossChainMessage, DestinationReceipt, SourceReceipt};

/// Errors reported by a ledger client
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Could not reach the node (connection, timeout, HTTP status)
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC or execution error
    #[error("rpc error: {0}")]
    Rpc(String),

    /// The node answered with something we could not interpret
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("no receipt for transaction {0}")]
    MissingReceipt(B256),
}

/// Source-chain client: the chain messages are published on
#[async_trait]
pub trait SourceLedger: Send + Sync {
    /// Submit a transaction and wait for its receipt
    async fn submit(&self, request: TransactionRequest) -> Result<SourceReceipt, LedgerError>;

    /// Fetch the receipt of an already mined transaction
    async fn receipt(&self, transaction: B256) -> Result<Option<SourceReceipt>, LedgerError>;
}

/// Destination-chain client: finality checks and relay submission
#[async_trait]
pub trait DestinationLedger: Send + Sync {
    /// Cost estimate for the finality check, taken before the authoritative call
    async fn estimate_finality_check(&self, message: &CrossChainMessage)
        -> Result<u64, LedgerError>;

    /// Read-only finality check (`verifyMessageFinalized`)
    async fn check_finality(
        &self,
        message: &CrossChainMessage,
        gas_limit: u64,
    ) -> Result<bool, LedgerError>;

    /// Timestamp after which the message becomes final, when the ledger exposes it
    async fn finality_time(&self, _message: &CrossChainMessage) -> Result<Option<U256>, LedgerError> {
        Ok(None)
    }

    /// Submit `relayMessage` and wait for the receipt
    async fn submit_relay(&self, message: &CrossChainMessage)
        -> Result<DestinationReceipt, LedgerError>;
}

/// Fetch the receipts of already mined transactions, in the given order.
///
/// A transaction the node has no receipt for is an error.
pub async fn fetch_receipts<S: SourceLedger + ?Sized>(
    source: &S,
    transactions: &[B256],
) -> Result<Vec<SourceReceipt>, LedgerError> {
    let mut receipts = Vec::with_capacity(transactions.len());
    for &transaction in transactions {
        let receipt = source
            .receipt(transaction)
            .await?
            .ok_or(LedgerError::MissingReceipt(transaction))?;
        receipts.push(receipt);
    }
    Ok(receipts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{message, receipt_with, MockSource};

    #[tokio::test]
    async fn test_fetch_receipts_keeps_requested_order() {
        let (first, second) = (B256::repeat_byte(1), B256::repeat_byte(2));
        let source = MockSource::new()
            .with_receipt(receipt_with(first, &[message(1)]))
            .with_receipt(receipt_with(second, &[message(2)]));

        let receipts = fetch_receipts(&source, &[second, first]).await.unwrap();
        let hashes: Vec<B256> = receipts.iter().map(|r| r.transaction_hash).collect();
        assert_eq!(hashes, vec![second, first]);
    }

    #[tokio::test]
    async fn test_fetch_receipts_missing_receipt() {
        let known = B256::repeat_byte(1);
        let pending = B256::repeat_byte(7);
        let source = MockSource::new().with_receipt(receipt_with(known, &[message(1)]));

        let err = fetch_receipts(&source, &[known, pending]).await.unwrap_err();
        assert_eq!(err, LedgerError::MissingReceipt(pending));
    }
}
