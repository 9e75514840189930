//! MessageBus and CrossChainMessenger ABI definitions
//!
//! Uses alloy's sol! macro to generate type-safe bindings. The struct layout
//! must match `Structs.CrossChainMessage` in the deployed contracts exactly,
//! field order included.

#![allow(clippy::too_many_arguments)]

use alloy::sol;

use crate::types::CrossChainMessage;

sol! {
    /// On-chain representation of a cross-chain message
    #[derive(Debug, PartialEq, Eq)]
    struct XChainMessage {
        address sender;
        uint64 sequence;
        uint32 nonce;
        uint32 topic;
        bytes payload;
        uint8 consistencyLevel;
    }

    /// MessageBus deployed on both ledgers
    #[sol(rpc)]
    contract MessageBus {
        /// Published on the source ledger for every outgoing message
        event LogMessagePublished(
            address sender,
            uint64 sequence,
            uint32 nonce,
            uint32 topic,
            bytes payload,
            uint8 consistencyLevel
        );

        /// True once the destination considers the message final
        function verifyMessageFinalized(XChainMessage calldata crossChainMessage) external view returns (bool);

        /// Timestamp after which the message becomes final (0 if unknown)
        function getMessageTimeOfFinality(XChainMessage calldata crossChainMessage) external view returns (uint256);
    }

    /// Destination executor that applies relayed messages
    #[sol(rpc)]
    contract CrossChainMessenger {
        function relayMessage(XChainMessage calldata message) external;
    }
}

impl From<&CrossChainMessage> for XChainMessage {
    fn from(message: &CrossChainMessage) -> Self {
        Self {
            sender: message.sender,
            sequence: message.sequence,
            nonce: message.nonce,
            topic: message.topic,
            payload: message.payload.clone(),
            consistencyLevel: message.consistency_level,
        }
    }
}

impl From<MessageBus::LogMessagePublished> for CrossChainMessage {
    fn from(event: MessageBus::LogMessagePublished) -> Self {
        Self {
            sender: event.sender,
            sequence: event.sequence,
            nonce: event.nonce,
            topic: event.topic,
            payload: event.payload,
            consistency_level: event.consistencyLevel,
        }
    }
}

impl From<&CrossChainMessage> for MessageBus::LogMessagePublished {
    fn from(message: &CrossChainMessage) -> Self {
        Self {
            sender: message.sender,
            sequence: message.sequence,
            nonce: message.nonce,
            topic: message.topic,
            payload: message.payload.clone(),
            consistencyLevel: message.consistency_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, Bytes};
    use alloy::sol_types::SolCall;

    #[test]
    fn test_struct_conversion_keeps_fields() {
        let message = CrossChainMessage {
            sender: Address::repeat_byte(0x11),
            sequence: 9,
            nonce: 3,
            topic: 2,
            payload: Bytes::from_static(&[1, 2, 3]),
            consistency_level: 5,
        };

        let onchain = XChainMessage::from(&message);
        assert_eq!(onchain.sender, message.sender);
        assert_eq!(onchain.sequence, 9);
        assert_eq!(onchain.consistencyLevel, 5);
    }

    #[test]
    fn test_call_signatures_use_tuple_layout() {
        assert_eq!(
            MessageBus::verifyMessageFinalizedCall::SIGNATURE,
            "verifyMessageFinalized((address,uint64,uint32,uint32,bytes,uint8))"
        );
        assert_eq!(
            CrossChainMessenger::relayMessageCall::SIGNATURE,
            "relayMessage((address,uint64,uint32,uint32,bytes,uint8))"
        );
    }
}
