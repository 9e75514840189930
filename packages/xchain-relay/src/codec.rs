//! LogMessagePublished codec
//!
//! Decodes raw receipt logs into [`CrossChainMessage`]s against the statically
//! declared event schema in [`crate::contracts`].
//!
//! Wire layout (no indexed fields):
//!
//! ```text
//! topics[0] = keccak256("LogMessagePublished(address,uint64,uint32,uint32,bytes,uint8)")
//! data      = abi.encode(sender, sequence, nonce, topic, payload, consistencyLevel)
//! ```

use alloy::primitives::{keccak256, B256};
use alloy::sol_types::SolEvent;
use thiserror::Error;

use crate::contracts::MessageBus::LogMessagePublished;
use crate::types::{CrossChainMessage, ReceiptLog};

/// Versioned signature of the published-message event
pub const EVENT_SIGNATURE: &str = "LogMessagePublished(address,uint64,uint32,uint32,bytes,uint8)";

/// The event declares no indexed parameters, so only the signature topic is present
const EXPECTED_TOPICS: usize = 1;

/// Errors from decoding a single log
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("log has no topics")]
    MissingTopic,

    #[error("log topic {found} does not match event topic {expected}")]
    TopicMismatch { expected: B256, found: B256 },

    #[error("expected {expected} topic(s), log has {found}")]
    UnexpectedTopicCount { expected: usize, found: usize },

    #[error("malformed event data: {0}")]
    Abi(String),
}

/// keccak256 of [`EVENT_SIGNATURE`], compared against each log's first topic
pub fn event_topic() -> B256 {
    keccak256(EVENT_SIGNATURE.as_bytes())
}

/// Decode a log whose first topic is the event topic.
pub fn decode(log: &ReceiptLog) -> Result<CrossChainMessage, DecodeError> {
    let first = *log.signature().ok_or(DecodeError::MissingTopic)?;
    let expected = event_topic();
    if first != expected {
        return Err(DecodeError::TopicMismatch {
            expected,
            found: first,
        });
    }

    if log.topics.len() != EXPECTED_TOPICS {
        return Err(DecodeError::UnexpectedTopicCount {
            expected: EXPECTED_TOPICS,
            found: log.topics.len(),
        });
    }

    // validate = true rejects trailing words and dirty padding
    let event = LogMessagePublished::decode_raw_log(log.topics.iter().copied(), &log.data, true)
        .map_err(|e| DecodeError::Abi(e.to_string()))?;

    Ok(CrossChainMessage::from(event))
}

/// Build the log a MessageBus would emit for `message`.
pub fn encode(message: &CrossChainMessage) -> ReceiptLog {
    let event = LogMessagePublished::from(message);
    ReceiptLog {
        address: Default::default(),
        topics: vec![event_topic()],
        data: event.encode_data().into(),
        log_index: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, Bytes};

    fn sample() -> CrossChainMessage {
        CrossChainMessage {
            sender: Address::repeat_byte(0xAA),
            sequence: 42,
            nonce: 7,
            topic: 3,
            payload: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef, 0x01]),
            consistency_level: 2,
        }
    }

    #[test]
    fn test_event_topic_matches_binding() {
        assert_eq!(event_topic(), LogMessagePublished::SIGNATURE_HASH);
        assert_eq!(LogMessagePublished::SIGNATURE, EVENT_SIGNATURE);
    }

    #[test]
    fn test_event_topic_matches_deployed_contract() {
        let expected: B256 = "0xb93c37389233beb85a3a726c3f15c2d15533ee74cb602f20f490dfffef775937"
            .parse()
            .unwrap();
        assert_eq!(event_topic(), expected);
    }

    #[test]
    fn test_decode_synthetic_log() {
        let message = sample();
        let decoded = decode(&encode(&message)).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_decode_empty_payload() {
        let mut message = sample();
        message.payload = Bytes::new();
        let decoded = decode(&encode(&message)).unwrap();
        assert!(decoded.payload.is_empty());
        assert_eq!(decoded.sequence, 42);
    }

    #[test]
    fn test_rejects_wrong_topic() {
        let mut log = encode(&sample());
        log.topics[0] = B256::repeat_byte(0x01);
        assert!(matches!(
            decode(&log),
            Err(DecodeError::TopicMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_missing_topic() {
        let mut log = encode(&sample());
        log.topics.clear();
        assert_eq!(decode(&log), Err(DecodeError::MissingTopic));
    }

    #[test]
    fn test_rejects_extra_topics() {
        let mut log = encode(&sample());
        log.topics.push(B256::ZERO);
        assert_eq!(
            decode(&log),
            Err(DecodeError::UnexpectedTopicCount {
                expected: 1,
                found: 2
            })
        );
    }

    #[test]
    fn test_rejects_truncated_data() {
        let mut log = encode(&sample());
        log.data = Bytes::from(log.data[..64].to_vec());
        assert!(matches!(decode(&log), Err(DecodeError::Abi(_))));
    }

    #[test]
    fn test_rejects_trailing_words() {
        let mut log = encode(&sample());
        let mut data = log.data.to_vec();
        data.extend_from_slice(&[0u8; 32]);
        log.data = data.into();
        assert!(matches!(decode(&log), Err(DecodeError::Abi(_))));
    }

    #[test]
    fn test_rejects_dirty_padding() {
        let mut log = encode(&sample());
        let mut data = log.data.to_vec();
        // Word 5 holds consistencyLevel (uint8); set a high-order byte
        data[5 * 32] = 0xff;
        log.data = data.into();
        assert!(matches!(decode(&log), Err(DecodeError::Abi(_))));
    }
}
