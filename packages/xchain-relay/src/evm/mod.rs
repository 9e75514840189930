//! EVM ledger clients
//!
//! alloy-backed implementations of [`SourceLedger`](crate::ledger::SourceLedger)
//! and [`DestinationLedger`](crate::ledger::DestinationLedger), plus the
//! receipt and error conversions they share.

mod destination;
mod network;
mod source;

pub use destination::EvmDestination;
pub use network::{discover_message_bus, fetch_network_config, NetworkConfig};
pub use source::EvmSource;

use alloy::rpc::types::{Log, TransactionReceipt};
use alloy::transports::{RpcError, TransportError};

use crate::ledger::LedgerError;
use crate::types::{ReceiptLog, SourceReceipt, SUCCESS_STATUS};

impl From<&Log> for ReceiptLog {
    fn from(log: &Log) -> Self {
        Self {
            address: log.address(),
            topics: log.topics().to_vec(),
            data: log.data().data.clone(),
            log_index: log.log_index,
        }
    }
}

impl From<&TransactionReceipt> for SourceReceipt {
    fn from(receipt: &TransactionReceipt) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash,
            status: receipt_status(receipt),
            logs: receipt.inner.logs().iter().map(ReceiptLog::from).collect(),
        }
    }
}

/// Receipt status as the numeric value the node reported
pub(crate) fn receipt_status(receipt: &TransactionReceipt) -> u64 {
    if receipt.status() {
        SUCCESS_STATUS
    } else {
        0
    }
}

pub(crate) fn map_transport_error(error: TransportError) -> LedgerError {
    match &error {
        RpcError::ErrorResp(payload) => LedgerError::Rpc(payload.to_string()),
        RpcError::Transport(_) => LedgerError::Transport(error.to_string()),
        RpcError::NullResp | RpcError::DeserError { .. } | RpcError::SerError(_) => {
            LedgerError::InvalidResponse(error.to_string())
        }
        _ => LedgerError::Rpc(error.to_string()),
    }
}

pub(crate) fn map_contract_error(error: alloy::contract::Error) -> LedgerError {
    match error {
        alloy::contract::Error::TransportError(e) => map_transport_error(e),
        other => LedgerError::InvalidResponse(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::testing::message;
    use alloy::primitives::{Address, B256};

    #[test]
    fn test_rpc_log_conversion_keeps_topics_and_data() {
        let encoded = codec::encode(&message(3));
        let log = Log {
            inner: alloy::primitives::Log::new_unchecked(
                Address::repeat_byte(0xB0),
                encoded.topics.clone(),
                encoded.data.clone(),
            ),
            log_index: Some(4),
            transaction_hash: Some(B256::repeat_byte(1)),
            ..Default::default()
        };

        let converted = ReceiptLog::from(&log);
        assert_eq!(converted.address, Address::repeat_byte(0xB0));
        assert_eq!(converted.log_index, Some(4));
        assert_eq!(codec::decode(&converted).unwrap(), message(3));
    }

    #[test]
    fn test_error_response_maps_to_rpc() {
        let error: TransportError = RpcError::local_usage_str("nonce too low");
        assert!(matches!(map_transport_error(error), LedgerError::Rpc(_)));
    }
}
