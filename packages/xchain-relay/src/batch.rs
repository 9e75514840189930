use std::collections::HashSet;

use crate::extractor::{ExtractionError, MessageExtractor};
use crate::types::{CrossChainMessage, MessageKey, SourceReceipt};

/// Ordered, immutable set of messages consumed by one pipeline run.
///
/// Order is receipt order, then log order within each receipt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelayBatch {
    messages: Vec<CrossChainMessage>,
}

impl RelayBatch {
    /// Reject the batch if two messages share a key; the key identifies a
    /// message through polling, relay and reporting.
    pub fn new(messages: Vec<CrossChainMessage>) -> Result<Self, ExtractionError> {
        let mut seen = HashSet::with_capacity(messages.len());
        for message in &messages {
            let key = message.key();
            if !seen.insert(key) {
                return Err(ExtractionError::DuplicateMessage { key });
            }
        }
        Ok(Self { messages })
    }

    /// Extract every receipt with the default extractor
    pub fn from_receipts(receipts: &[SourceReceipt]) -> Result<Self, ExtractionError> {
        Self::extract_with(&MessageExtractor::new(), receipts)
    }

    pub fn extract_with(
        extractor: &MessageExtractor,
        receipts: &[SourceReceipt],
    ) -> Result<Self, ExtractionError> {
        extractor.extract_all(receipts).and_then(Self::new)
    }

    pub fn messages(&self) -> &[CrossChainMessage] {
        &self.messages
    }

    pub fn keys(&self) -> Vec<MessageKey> {
        self.messages.iter().map(CrossChainMessage::key).collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CrossChainMessage> {
        self.messages.iter()
    }

    pub fn into_messages(self) -> Vec<CrossChainMessage> {
        self.messages
    }
}

impl<'a> IntoIterator for &'a RelayBatch {
    type Item = &'a CrossChainMessage;
    type IntoIter = std::slice::Iter<'a, CrossChainMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
