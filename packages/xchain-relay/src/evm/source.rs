use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use eyre::{Result, WrapErr};
use tracing::{debug, info};

use super::{map_transport_error, receipt_status};
use crate::ledger::{LedgerError, SourceLedger};
use crate::redact::redact_url;
use crate::types::SourceReceipt;

/// Source chain client: reads receipts, optionally sends the trigger transaction
pub struct EvmSource {
    rpc_url: Url,
    provider: RootProvider<Http<Client>>,
    signer: Option<PrivateKeySigner>,
}

impl EvmSource {
    /// Read-only client
    pub fn new(rpc_url: &str) -> Result<Self> {
        let url: Url = rpc_url.parse().wrap_err("Invalid source RPC URL")?;
        let provider = ProviderBuilder::new().on_http(url.clone());
        info!(rpc_url = %redact_url(rpc_url), "Source client created");
        Ok(Self {
            rpc_url: url,
            provider,
            signer: None,
        })
    }

    /// Client that can also submit the triggering transaction
    pub fn with_signer(rpc_url: &str, private_key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = private_key.parse().wrap_err("Invalid private key")?;
        let mut source = Self::new(rpc_url)?;
        info!(address = %signer.address(), "Source signer loaded");
        source.signer = Some(signer);
        Ok(source)
    }

    pub fn signer_address(&self) -> Option<Address> {
        self.signer.as_ref().map(PrivateKeySigner::address)
    }
}

#[async_trait]
impl SourceLedger for EvmSource {
    async fn submit(&self, request: TransactionRequest) -> Result<SourceReceipt, LedgerError> {
        let signer = self
            .signer
            .clone()
            .ok_or_else(|| LedgerError::Rpc("source client has no signer".to_string()))?;

        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(signer))
            .on_http(self.rpc_url.clone());

        let pending = provider
            .send_transaction(request)
            .await
            .map_err(map_transport_error)?;
        debug!(tx = %pending.tx_hash(), "Source transaction sent, waiting for receipt");

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        info!(
            tx = %receipt.transaction_hash,
            status = receipt_status(&receipt),
            "Source transaction mined"
        );
        Ok(SourceReceipt::from(&receipt))
    }

    async fn receipt(&self, transaction: B256) -> Result<Option<SourceReceipt>, LedgerError> {
        let receipt = self
            .provider
            .get_transaction_receipt(transaction)
            .await
            .map_err(map_transport_error)?;
        Ok(receipt.as_ref().map(SourceReceipt::from))
    }
}
