//! Cross-chain message relay
//!
//! Extracts `LogMessagePublished` events from source-ledger receipts, waits
//! for each message to be finalized on the destination ledger, then relays
//! the messages to the destination executor in source order.
//!
//! Modules are public for the binary and integration tests.

pub mod batch;
pub mod codec;
pub mod config;
pub mod contracts;
pub mod evm;
pub mod executor;
pub mod extractor;
pub mod finality;
pub mod gate;
pub mod ledger;
pub mod metrics;
pub mod pipeline;
pub mod redact;
pub mod retry;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use batch::RelayBatch;
pub use executor::{RelayError, RelayExecutor};
pub use extractor::{ExtractionError, MessageExtractor};
pub use finality::{FinalityPoller, FinalityStatus, PollError};
pub use gate::{GateError, OrderingGate};
pub use ledger::{fetch_receipts, DestinationLedger, LedgerError, SourceLedger};
pub use pipeline::{FailurePolicy, PipelineConfig, PipelineError, RelayPipeline};
pub use types::{
    CrossChainMessage, DestinationReceipt, FinalizedMessage, MessageKey, MessageState,
    ReceiptLog, RelayOutcome, RelayReport, RelayReports, SourceReceipt,
};
