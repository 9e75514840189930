//! Message extraction from source receipts
//!
//! Filters a receipt's logs down to `LogMessagePublished` entries and decodes
//! them in log order. Pure: no I/O.

use alloy::primitives::{Address, B256};
use thiserror::Error;
use tracing::debug;

use crate::codec::{self, DecodeError};
use crate::types::{CrossChainMessage, MessageKey, SourceReceipt};

/// Errors from extracting messages out of receipts
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// A matching log failed to decode; the whole extraction is void
    #[error("failed to decode log {position} of transaction {transaction}: {source}")]
    Decode {
        transaction: B256,
        /// Position of the log within the receipt
        position: usize,
        #[source]
        source: DecodeError,
    },

    /// The triggering source transaction did not succeed
    #[error("source transaction {transaction} failed with status {status}")]
    SourceReverted { transaction: B256, status: u64 },

    /// Two published messages share a `(sender, sequence)` key
    #[error("message {key} appears more than once")]
    DuplicateMessage { key: MessageKey },
}

/// Scans receipts for published cross-chain messages
#[derive(Debug, Clone)]
pub struct MessageExtractor {
    topic: B256,
    emitter: Option<Address>,
}

impl Default for MessageExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageExtractor {
    /// Accept matching logs from any emitter
    pub fn new() -> Self {
        Self {
            topic: codec::event_topic(),
            emitter: None,
        }
    }

    /// Only accept logs emitted by the source MessageBus at `address`
    pub fn with_emitter(address: Address) -> Self {
        Self {
            topic: codec::event_topic(),
            emitter: Some(address),
        }
    }

    /// Extract messages from one receipt, in log order.
    ///
    /// A receipt with no matching logs yields an empty vector. Any matching
    /// log that fails to decode fails the whole receipt.
    pub fn extract(&self, receipt: &SourceReceipt) -> Result<Vec<CrossChainMessage>, ExtractionError> {
        let mut messages = Vec::new();

        for (position, log) in receipt.logs.iter().enumerate() {
            if log.signature() != Some(&self.topic) {
                continue;
            }
            if let Some(emitter) = self.emitter {
                if log.address != emitter {
                    debug!(
                        tx = %receipt.transaction_hash,
                        position,
                        emitter = %log.address,
                        "Skipping message log from unexpected emitter"
                    );
                    continue;
                }
            }

            let message = codec::decode(log).map_err(|source| ExtractionError::Decode {
                transaction: receipt.transaction_hash,
                position,
                source,
            })?;
            messages.push(message);
        }

        debug!(
            tx = %receipt.transaction_hash,
            logs = receipt.logs.len(),
            messages = messages.len(),
            "Extracted cross-chain messages"
        );

        Ok(messages)
    }

    /// Extract from several receipts: receipt order, then log order.
    ///
    /// Receipts whose status is not successful are rejected.
    pub fn extract_all(
        &self,
        receipts: &[SourceReceipt],
    ) -> Result<Vec<CrossChainMessage>, ExtractionError> {
        let mut messages = Vec::new();
        for receipt in receipts {
            if !receipt.succeeded() {
                return Err(ExtractionError::SourceReverted {
                    transaction: receipt.transaction_hash,
                    status: receipt.status,
                });
            }
            messages.extend(self.extract(receipt)?);
        }
        Ok(messages)
    }
}

/// Extract with the default extractor
pub fn extract(receipt: &SourceReceipt) -> Result<Vec<CrossChainMessage>, ExtractionError> {
    MessageExtractor::new().extract(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReceiptLog;
    use alloy::primitives::Bytes;

    fn message(sequence: u64) -> CrossChainMessage {
        CrossChainMessage {
            sender: Address::repeat_byte(0xAA),
            sequence,
            nonce: sequence as u32,
            topic: 0,
            payload: Bytes::from(vec![sequence as u8; 3]),
            consistency_level: 1,
        }
    }

    fn unrelated_log() -> ReceiptLog {
        ReceiptLog {
            address: Address::repeat_byte(0x22),
            topics: vec![B256::repeat_byte(0x33), B256::repeat_byte(0x44)],
            data: Bytes::from(vec![0u8; 32]),
            log_index: None,
        }
    }

    fn receipt(logs: Vec<ReceiptLog>) -> SourceReceipt {
        SourceReceipt {
            transaction_hash: B256::repeat_byte(0x01),
            status: 1,
            logs,
        }
    }

    #[test]
    fn test_two_matching_logs_in_order() {
        let receipt = receipt(vec![
            codec::encode(&message(1)),
            unrelated_log(),
            codec::encode(&message(2)),
        ]);

        let messages = extract(&receipt).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sequence, 1);
        assert_eq!(messages[1].sequence, 2);
        assert_eq!(messages[0].sender, Address::repeat_byte(0xAA));
    }

    #[test]
    fn test_no_matching_logs_is_empty_not_error() {
        let receipt = receipt(vec![unrelated_log(), ReceiptLog::default()]);
        assert_eq!(extract(&receipt).unwrap(), vec![]);
    }

    #[test]
    fn test_topic_in_non_first_position_is_ignored() {
        let mut log = unrelated_log();
        log.topics.push(codec::event_topic());
        let receipt = receipt(vec![log]);
        assert!(extract(&receipt).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_matching_log_fails_extraction() {
        let mut bad = codec::encode(&message(2));
        bad.data = Bytes::from(vec![0u8; 10]);
        let receipt = receipt(vec![codec::encode(&message(1)), bad]);

        match extract(&receipt) {
            Err(ExtractionError::Decode { position, .. }) => assert_eq!(position, 1),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_emitter_filter() {
        let bus = Address::repeat_byte(0xB0);
        let mut ours = codec::encode(&message(1));
        ours.address = bus;
        let foreign = codec::encode(&message(2));

        let receipt = receipt(vec![foreign, ours]);
        let messages = MessageExtractor::with_emitter(bus).extract(&receipt).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sequence, 1);
    }

    #[test]
    fn test_extract_all_preserves_receipt_order() {
        let first = receipt(vec![codec::encode(&message(1))]);
        let second = receipt(vec![codec::encode(&message(2)), codec::encode(&message(3))]);

        let messages = MessageExtractor::new()
            .extract_all(&[first, second])
            .unwrap();
        let sequences: Vec<u64> = messages.iter().map(|m| m.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn test_extract_all_rejects_reverted_receipt() {
        let mut reverted = receipt(vec![codec::encode(&message(1))]);
        reverted.status = 0;

        assert!(matches!(
            MessageExtractor::new().extract_all(&[reverted]),
            Err(ExtractionError::SourceReverted { status: 0, .. })
        ));
    }
}
