//! `net_config` discovery
//!
//! Destination nodes expose their system contract addresses through the
//! non-standard `net_config` JSON-RPC method. Used to find the destination
//! MessageBus when it is not configured.

use std::time::Duration;

use alloy::primitives::Address;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use crate::ledger::LedgerError;
use crate::redact::redact_url;

/// JSON-RPC response envelope
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i32,
    message: String,
}

/// The subset of the `net_config` result the relay reads
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NetworkConfig {
    #[serde(rename = "ManagementContractAddress", default)]
    pub management_contract_address: Option<Address>,
    #[serde(rename = "MessageBusAddress", default)]
    pub message_bus_address: Option<Address>,
    #[serde(rename = "L2MessageBusAddress", default)]
    pub l2_message_bus_address: Option<Address>,
}

impl NetworkConfig {
    /// The MessageBus deployed on the node's own ledger
    pub fn l2_message_bus(&self) -> Result<Address, LedgerError> {
        match self.l2_message_bus_address {
            Some(address) if address != Address::ZERO => Ok(address),
            _ => Err(LedgerError::InvalidResponse(
                "net_config did not report an L2MessageBusAddress".to_string(),
            )),
        }
    }
}

/// Call `net_config` on `rpc_url`
pub async fn fetch_network_config(rpc_url: &str) -> Result<NetworkConfig, LedgerError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| LedgerError::Transport(e.to_string()))?;

    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "method": "net_config",
        "params": [],
        "id": 1
    });

    let response = client
        .post(rpc_url)
        .json(&body)
        .send()
        .await
        .map_err(|e| LedgerError::Transport(e.without_url().to_string()))?
        .json::<RpcResponse<NetworkConfig>>()
        .await
        .map_err(|e| LedgerError::InvalidResponse(e.without_url().to_string()))?;

    parse_response(response)
}

fn parse_response(response: RpcResponse<NetworkConfig>) -> Result<NetworkConfig, LedgerError> {
    if let Some(error) = response.error {
        return Err(LedgerError::Rpc(format!("{} - {}", error.code, error.message)));
    }
    response
        .result
        .ok_or_else(|| LedgerError::InvalidResponse("net_config returned no result".to_string()))
}

/// Look up the destination MessageBus through `net_config`
pub async fn discover_message_bus(rpc_url: &str) -> Result<Address, LedgerError> {
    let address = fetch_network_config(rpc_url).await?.l2_message_bus()?;
    info!(rpc_url = %redact_url(rpc_url), message_bus = %address, "Discovered MessageBus via net_config");
    Ok(address)
}
