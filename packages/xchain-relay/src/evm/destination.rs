use alloy::network::EthereumWallet;
use alloy::primitives::{Address, U256};
use alloy::providers::{ProviderBuilder, RootProvider};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use eyre::{Result, WrapErr};
use tracing::{debug, info};

use super::{map_contract_error, receipt_status};
use crate::config::DestinationConfig;
use crate::contracts::{CrossChainMessenger, MessageBus, XChainMessage};
use crate::ledger::{DestinationLedger, LedgerError};
use crate::redact::redact_url;
use crate::types::{CrossChainMessage, DestinationReceipt};

/// Destination chain client: MessageBus finality views and relay submission
pub struct EvmDestination {
    rpc_url: Url,
    provider: RootProvider<Http<Client>>,
    message_bus: Address,
    messenger: Address,
    signer: PrivateKeySigner,
    relay_gas_limit: u64,
    max_fee_per_gas: u128,
}

impl EvmDestination {
    /// `message_bus` is the configured address, or the one `net_config`
    /// reported when none was configured.
    pub fn new(config: &DestinationConfig, message_bus: Address) -> Result<Self> {
        let rpc_url: Url = config
            .rpc_url
            .parse()
            .wrap_err("Invalid destination RPC URL")?;
        let signer: PrivateKeySigner = config
            .private_key
            .expose()
            .parse()
            .wrap_err("Invalid relayer private key")?;

        info!(
            rpc_url = %redact_url(&config.rpc_url),
            relayer = %signer.address(),
            message_bus = %message_bus,
            messenger = %config.messenger_address,
            "Destination client created"
        );

        Ok(Self {
            provider: ProviderBuilder::new().on_http(rpc_url.clone()),
            rpc_url,
            message_bus,
            messenger: config.messenger_address,
            signer,
            relay_gas_limit: config.relay_gas_limit,
            max_fee_per_gas: config.max_fee_per_gas,
        })
    }

    /// Account that signs relay transactions
    pub fn relayer_address(&self) -> Address {
        self.signer.address()
    }

    pub fn message_bus(&self) -> Address {
        self.message_bus
    }
}

#[async_trait]
impl DestinationLedger for EvmDestination {
    async fn estimate_finality_check(
        &self,
        message: &CrossChainMessage,
    ) -> Result<u64, LedgerError> {
        let bus = MessageBus::new(self.message_bus, &self.provider);
        bus.verifyMessageFinalized(XChainMessage::from(message))
            .from(self.signer.address())
            .estimate_gas()
            .await
            .map_err(map_contract_error)
    }

    async fn check_finality(
        &self,
        message: &CrossChainMessage,
        gas_limit: u64,
    ) -> Result<bool, LedgerError> {
        let bus = MessageBus::new(self.message_bus, &self.provider);
        let finalized = bus
            .verifyMessageFinalized(XChainMessage::from(message))
            .from(self.signer.address())
            .gas(gas_limit)
            .max_fee_per_gas(self.max_fee_per_gas)
            .call()
            .await
            .map_err(map_contract_error)?
            ._0;
        Ok(finalized)
    }

    async fn finality_time(
        &self,
        message: &CrossChainMessage,
    ) -> Result<Option<U256>, LedgerError> {
        let bus = MessageBus::new(self.message_bus, &self.provider);
        let time = bus
            .getMessageTimeOfFinality(XChainMessage::from(message))
            .call()
            .await
            .map_err(map_contract_error)?
            ._0;
        Ok((!time.is_zero()).then_some(time))
    }

    async fn submit_relay(
        &self,
        message: &CrossChainMessage,
    ) -> Result<DestinationReceipt, LedgerError> {
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(self.signer.clone()))
            .on_http(self.rpc_url.clone());
        let messenger = CrossChainMessenger::new(self.messenger, &provider);

        let pending = messenger
            .relayMessage(XChainMessage::from(message))
            .gas(self.relay_gas_limit)
            .send()
            .await
            .map_err(map_contract_error)?;
        debug!(key = %message.key(), tx = %pending.tx_hash(), "Relay transaction sent, waiting for receipt");

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        Ok(DestinationReceipt {
            transaction_id: receipt.transaction_hash,
            status: receipt_status(&receipt),
        })
    }
}
