//! Core relay types
//!
//! Value types shared by the codec, poller, executor and pipeline.

use alloy::primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Receipt status value meaning the transaction executed successfully.
pub const SUCCESS_STATUS: u64 = 1;

/// A message published on the source chain's MessageBus.
///
/// Immutable once decoded. `(sender, sequence)` identifies it for its whole
/// lifecycle, see [`MessageKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrossChainMessage {
    /// Source-chain address of the publisher
    pub sender: Address,
    /// Per-sender sequence number, the ordering key
    pub sequence: u64,
    /// Source-assigned disambiguator (not unique per sender)
    pub nonce: u32,
    /// Application-level message category
    pub topic: u32,
    /// Opaque payload, interpreted by the destination executor only
    pub payload: Bytes,
    /// Finality requirement requested by the publisher
    pub consistency_level: u8,
}

impl CrossChainMessage {
    /// The lifecycle identity of this message
    pub fn key(&self) -> MessageKey {
        MessageKey {
            sender: self.sender,
            sequence: self.sequence,
        }
    }
}

/// `(sender, sequence)` pair identifying a message on both chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageKey {
    pub sender: Address,
    pub sequence: u64,
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.sender, self.sequence)
    }
}

/// A raw log entry as found in a transaction receipt
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReceiptLog {
    /// Emitting contract
    pub address: Address,
    /// Indexed topics, `topics[0]` is the event signature hash
    pub topics: Vec<B256>,
    /// ABI-encoded non-indexed fields
    pub data: Bytes,
    /// Position within the block, when the node reports it
    pub log_index: Option<u64>,
}

impl ReceiptLog {
    /// First topic (event signature hash), if any
    pub fn signature(&self) -> Option<&B256> {
        self.topics.first()
    }
}

/// The parts of a source-chain receipt the pipeline reads
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceReceipt {
    pub transaction_hash: B256,
    pub status: u64,
    pub logs: Vec<ReceiptLog>,
}

impl SourceReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == SUCCESS_STATUS
    }
}

/// Receipt of a destination-chain relay transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationReceipt {
    pub transaction_id: B256,
    pub status: u64,
}

/// A message the destination ledger has reported as finalized.
///
/// Only the finality poller can construct one, which makes relaying a
/// message before its finality was observed unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedMessage {
    message: CrossChainMessage,
    attempts: u32,
    waited: Duration,
}

impl FinalizedMessage {
    pub(crate) fn new(message: CrossChainMessage, attempts: u32, waited: Duration) -> Self {
        Self {
            message,
            attempts,
            waited,
        }
    }

    pub fn message(&self) -> &CrossChainMessage {
        &self.message
    }

    pub fn key(&self) -> MessageKey {
        self.message.key()
    }

    /// Number of finality queries issued before `true` was observed
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Time from the first finality query until it reported `true`
    pub fn waited(&self) -> Duration {
        self.waited
    }

    pub fn into_message(self) -> CrossChainMessage {
        self.message
    }
}

/// Terminal result for one message of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum RelayOutcome {
    /// Relayed; carries the destination transaction id
    Relayed(B256),
    /// Finality was not observed before the deadline
    FinalityTimeout,
    /// The finality query itself failed (destination unreachable, RPC error)
    PollFailed(String),
    /// The relay transaction failed or did not report success
    RelayFailed(String),
    /// Never submitted because an earlier message failed
    Aborted { blocked_by: MessageKey },
}

impl RelayOutcome {
    pub fn is_relayed(&self) -> bool {
        matches!(self, RelayOutcome::Relayed(_))
    }

    /// Short label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayOutcome::Relayed(_) => "relayed",
            RelayOutcome::FinalityTimeout => "finality_timeout",
            RelayOutcome::PollFailed(_) => "poll_failed",
            RelayOutcome::RelayFailed(_) => "relay_failed",
            RelayOutcome::Aborted { .. } => "aborted",
        }
    }
}

impl fmt::Display for RelayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayOutcome::Relayed(tx) => write!(f, "relayed in {}", tx),
            RelayOutcome::FinalityTimeout => f.write_str("finality timeout"),
            RelayOutcome::PollFailed(reason) => write!(f, "poll failed: {}", reason),
            RelayOutcome::RelayFailed(reason) => write!(f, "relay failed: {}", reason),
            RelayOutcome::Aborted { blocked_by } => {
                write!(f, "aborted, blocked by {}", blocked_by)
            }
        }
    }
}

/// Outcome of one message, tagged with its identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayReport {
    pub key: MessageKey,
    pub outcome: RelayOutcome,
}

/// Helpers over a run's reports
pub trait RelayReports {
    fn all_relayed(&self) -> bool;
    fn relayed_count(&self) -> usize;
    fn first_failure(&self) -> Option<&RelayReport>;
}

impl RelayReports for [RelayReport] {
    fn all_relayed(&self) -> bool {
        self.iter().all(|r| r.outcome.is_relayed())
    }

    fn relayed_count(&self) -> usize {
        self.iter().filter(|r| r.outcome.is_relayed()).count()
    }

    fn first_failure(&self) -> Option<&RelayReport> {
        self.iter().find(|r| !r.outcome.is_relayed())
    }
}

/// Lifecycle state of a message inside a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    Extracted,
    Polling,
    Finalized,
    Relaying,
    Relayed,
    ExtractionFailed,
    FinalityTimedOut,
    PollFailed,
    RelayFailed,
    Aborted,
}

impl MessageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageState::Extracted => "extracted",
            MessageState::Polling => "polling",
            MessageState::Finalized => "finalized",
            MessageState::Relaying => "relaying",
            MessageState::Relayed => "relayed",
            MessageState::ExtractionFailed => "extraction_failed",
            MessageState::FinalityTimedOut => "finality_timed_out",
            MessageState::PollFailed => "poll_failed",
            MessageState::RelayFailed => "relay_failed",
            MessageState::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            MessageState::Extracted
                | MessageState::Polling
                | MessageState::Finalized
                | MessageState::Relaying
        )
    }
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&RelayOutcome> for MessageState {
    fn from(outcome: &RelayOutcome) -> Self {
        match outcome {
            RelayOutcome::Relayed(_) => MessageState::Relayed,
            RelayOutcome::FinalityTimeout => MessageState::FinalityTimedOut,
            RelayOutcome::PollFailed(_) => MessageState::PollFailed,
            RelayOutcome::RelayFailed(_) => MessageState::RelayFailed,
            RelayOutcome::Aborted { .. } => MessageState::Aborted,
        }
    }
}
