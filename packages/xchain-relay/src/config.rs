use alloy::primitives::Address;
use eyre::{eyre, Result, WrapErr};
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::pipeline::{FailurePolicy, PipelineConfig};
use crate::redact::{redact_url, Redacted};
use crate::retry::RetryConfig;

/// Main configuration for the relay binary
#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    pub relay: RelayConfig,
}

/// Source chain: where messages are published
#[derive(Clone)]
pub struct SourceConfig {
    pub rpc_url: String,
    /// Only accept messages emitted by this MessageBus, when set
    pub message_bus_address: Option<Address>,
    /// Signs the triggering transaction; only needed to trigger
    pub private_key: Option<Redacted<String>>,
}

/// Custom Debug that strips credentials from the RPC URL.
impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("rpc_url", &redact_url(&self.rpc_url))
            .field("message_bus_address", &self.message_bus_address)
            .field("private_key", &self.private_key)
            .finish()
    }
}

/// Destination chain: finality checks and relay submission
#[derive(Clone)]
pub struct DestinationConfig {
    pub rpc_url: String,
    /// Discovered through `net_config` when unset
    pub message_bus_address: Option<Address>,
    pub messenger_address: Address,
    pub private_key: Redacted<String>,
    /// Gas limit for every relayMessage transaction
    pub relay_gas_limit: u64,
    /// Fee cap sent with finality view calls (wei)
    pub max_fee_per_gas: u128,
}

impl fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationConfig")
            .field("rpc_url", &redact_url(&self.rpc_url))
            .field("message_bus_address", &self.message_bus_address)
            .field("messenger_address", &self.messenger_address)
            .field("private_key", &self.private_key)
            .field("relay_gas_limit", &self.relay_gas_limit)
            .field("max_fee_per_gas", &self.max_fee_per_gas)
            .finish()
    }
}

/// Pipeline timing and failure handling
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub poll_interval_ms: u64,
    pub finality_timeout_ms: u64,
    pub pipeline_timeout_ms: Option<u64>,
    pub failure_policy: FailurePolicy,
    pub cancel_polls_on_abort: bool,
    pub submit_retries: u32,
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_finality_timeout() -> u64 {
    30_000
}

fn default_relay_gas_limit() -> u64 {
    5_000_000
}

fn default_max_fee_per_gas() -> u128 {
    1_000_000_001
}

fn default_submit_retries() -> u32 {
    2
}

fn required(name: &str) -> Result<String> {
    env::var(name).map_err(|_| eyre!("{} environment variable is required", name))
}

fn optional<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .wrap_err_with(|| format!("{} has an invalid value: {}", name, raw)),
        _ => Ok(None),
    }
}

fn optional_address(name: &str) -> Result<Option<Address>> {
    env::var(name)
        .ok()
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| parse_address(name, &raw))
        .transpose()
}

fn parse_address(name: &str, raw: &str) -> Result<Address> {
    Address::from_str(raw.trim()).wrap_err_with(|| format!("{} must be a valid EVM address", name))
}

fn validate_private_key(name: &str, key: &str) -> Result<()> {
    if key.len() != 66 || !key.starts_with("0x") {
        return Err(eyre!("{} must be 66 chars (0x + 64 hex chars)", name));
    }
    Ok(())
}

/// Require an http(s) URL with a host
pub fn validate_rpc_url(raw: &str, name: &str) -> Result<()> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| eyre!("{} must be a valid URL: {}", name, e))?;

    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(eyre!(
            "{} must use http:// or https:// scheme, got {}",
            name,
            scheme
        ));
    }
    if parsed.host_str().is_none() {
        return Err(eyre!("{} must have a host component", name));
    }
    Ok(())
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env")
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Self> {
        let source = SourceConfig {
            rpc_url: required("SOURCE_RPC_URL")?,
            message_bus_address: optional_address("SOURCE_MESSAGE_BUS_ADDRESS")?,
            private_key: env::var("SOURCE_PRIVATE_KEY")
                .ok()
                .filter(|raw| !raw.trim().is_empty())
                .map(Redacted::new),
        };

        let destination = DestinationConfig {
            rpc_url: required("DEST_RPC_URL")?,
            message_bus_address: optional_address("MESSAGE_BUS_ADDRESS")?,
            messenger_address: parse_address("MESSENGER_ADDRESS", &required("MESSENGER_ADDRESS")?)?,
            private_key: Redacted::new(required("RELAYER_PRIVATE_KEY")?),
            relay_gas_limit: optional("RELAY_GAS_LIMIT")?.unwrap_or_else(default_relay_gas_limit),
            max_fee_per_gas: optional("RELAY_MAX_FEE_PER_GAS")?
                .unwrap_or_else(default_max_fee_per_gas),
        };

        let relay = RelayConfig {
            poll_interval_ms: optional("RELAY_POLL_INTERVAL_MS")?
                .unwrap_or_else(default_poll_interval),
            finality_timeout_ms: optional("RELAY_FINALITY_TIMEOUT_MS")?
                .unwrap_or_else(default_finality_timeout),
            pipeline_timeout_ms: optional("RELAY_PIPELINE_TIMEOUT_MS")?,
            failure_policy: optional("RELAY_FAILURE_POLICY")?.unwrap_or_default(),
            cancel_polls_on_abort: optional("RELAY_CANCEL_POLLS_ON_ABORT")?.unwrap_or(false),
            submit_retries: optional("RELAY_SUBMIT_RETRIES")?
                .unwrap_or_else(default_submit_retries),
        };

        let config = Config {
            source,
            destination,
            relay,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validate_rpc_url(&self.source.rpc_url, "SOURCE_RPC_URL")?;
        validate_rpc_url(&self.destination.rpc_url, "DEST_RPC_URL")?;

        validate_private_key("RELAYER_PRIVATE_KEY", self.destination.private_key.expose())?;
        if let Some(key) = &self.source.private_key {
            validate_private_key("SOURCE_PRIVATE_KEY", key.expose())?;
        }

        if self.destination.message_bus_address == Some(Address::ZERO) {
            return Err(eyre!("MESSAGE_BUS_ADDRESS cannot be the zero address"));
        }
        if self.destination.messenger_address == Address::ZERO {
            return Err(eyre!("MESSENGER_ADDRESS cannot be the zero address"));
        }
        if self.destination.relay_gas_limit == 0 {
            return Err(eyre!("RELAY_GAS_LIMIT must be greater than zero"));
        }

        if self.relay.poll_interval_ms == 0 {
            return Err(eyre!("RELAY_POLL_INTERVAL_MS must be greater than zero"));
        }
        if self.relay.finality_timeout_ms == 0 {
            return Err(eyre!("RELAY_FINALITY_TIMEOUT_MS must be greater than zero"));
        }
        if self.relay.pipeline_timeout_ms == Some(0) {
            return Err(eyre!("RELAY_PIPELINE_TIMEOUT_MS must be greater than zero when set"));
        }

        Ok(())
    }

    /// Pipeline settings derived from the relay section
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            poll_interval: Duration::from_millis(self.relay.poll_interval_ms),
            finality_deadline: Duration::from_millis(self.relay.finality_timeout_ms),
            pipeline_deadline: self.relay.pipeline_timeout_ms.map(Duration::from_millis),
            failure_policy: self.relay.failure_policy,
            cancel_polls_on_abort: self.relay.cancel_polls_on_abort,
            retry: RetryConfig {
                max_retries: self.relay.submit_retries,
                ..RetryConfig::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "SOURCE_RPC_URL",
        "DEST_RPC_URL",
        "MESSAGE_BUS_ADDRESS",
        "MESSENGER_ADDRESS",
        "SOURCE_MESSAGE_BUS_ADDRESS",
        "RELAYER_PRIVATE_KEY",
        "RELAY_POLL_INTERVAL_MS",
        "RELAY_FINALITY_TIMEOUT_MS",
        "RELAY_PIPELINE_TIMEOUT_MS",
        "RELAY_FAILURE_POLICY",
        "RELAY_CANCEL_POLLS_ON_ABORT",
        "SOURCE_PRIVATE_KEY",
        "RELAY_GAS_LIMIT",
        "RELAY_MAX_FEE_PER_GAS",
        "RELAY_SUBMIT_RETRIES",
    ];

    fn set_required() {
        for var in VARS {
            env::remove_var(var);
        }
        env::set_var("SOURCE_RPC_URL", "http://localhost:8545");
        env::set_var("DEST_RPC_URL", "http://localhost:9545");
        env::set_var(
            "MESSAGE_BUS_ADDRESS",
            "0x0000000000000000000000000000000000000001",
        );
        env::set_var(
            "MESSENGER_ADDRESS",
            "0x0000000000000000000000000000000000000002",
        );
        env::set_var(
            "RELAYER_PRIVATE_KEY",
            "0x0000000000000000000000000000000000000000000000000000000000000001",
        );
    }

    #[test]
    fn test_defaults() {
        assert_eq!(default_poll_interval(), 1000);
        assert_eq!(default_finality_timeout(), 30_000);
        assert_eq!(default_relay_gas_limit(), 5_000_000);
        assert_eq!(default_max_fee_per_gas(), 1_000_000_001);
        assert_eq!(default_submit_retries(), 2);
    }

    #[test]
    #[serial]
    fn test_load_with_defaults() {
        set_required();
        let config = Config::load_from_env().unwrap();

        assert_eq!(config.relay.poll_interval_ms, 1000);
        assert_eq!(config.relay.finality_timeout_ms, 30_000);
        assert_eq!(config.relay.pipeline_timeout_ms, None);
        assert_eq!(config.relay.failure_policy, FailurePolicy::AbortRemaining);
        assert_eq!(config.source.message_bus_address, None);
        assert_eq!(config.source.private_key, None);
        assert!(!config.relay.cancel_polls_on_abort);

        let pipeline = config.pipeline_config();
        assert!(!pipeline.cancel_polls_on_abort);
        assert_eq!(pipeline.poll_interval, Duration::from_secs(1));
        assert_eq!(pipeline.finality_deadline, Duration::from_secs(30));
        assert_eq!(pipeline.retry.max_retries, 2);
    }

    #[test]
    #[serial]
    fn test_load_overrides() {
        set_required();
        env::set_var("RELAY_FAILURE_POLICY", "skip");
        env::set_var("RELAY_PIPELINE_TIMEOUT_MS", "60000");
        env::set_var(
            "SOURCE_MESSAGE_BUS_ADDRESS",
            "0x00000000000000000000000000000000000000b0",
        );

        let config = Config::load_from_env().unwrap();
        assert_eq!(config.relay.failure_policy, FailurePolicy::SkipAndContinue);
        assert_eq!(config.relay.pipeline_timeout_ms, Some(60_000));
        assert!(config.source.message_bus_address.is_some());
    }

    #[test]
    #[serial]
    fn test_message_bus_address_is_optional() {
        set_required();
        env::remove_var("MESSAGE_BUS_ADDRESS");
        let config = Config::load_from_env().unwrap();
        assert_eq!(config.destination.message_bus_address, None);

        set_required();
        env::set_var(
            "MESSAGE_BUS_ADDRESS",
            "0x0000000000000000000000000000000000000000",
        );
        let err = Config::load_from_env().unwrap_err();
        assert!(err.to_string().contains("MESSAGE_BUS_ADDRESS"));
    }

    #[test]
    #[serial]
    fn test_cancel_polls_and_source_key() {
        set_required();
        env::set_var("RELAY_CANCEL_POLLS_ON_ABORT", "true");
        env::set_var(
            "SOURCE_PRIVATE_KEY",
            "0x0000000000000000000000000000000000000000000000000000000000000002",
        );

        let config = Config::load_from_env().unwrap();
        assert!(config.relay.cancel_polls_on_abort);
        assert!(config.pipeline_config().cancel_polls_on_abort);
        assert!(config.source.private_key.is_some());

        set_required();
        env::set_var("SOURCE_PRIVATE_KEY", "0x1234");
        let err = Config::load_from_env().unwrap_err();
        assert!(err.to_string().contains("SOURCE_PRIVATE_KEY"));
    }

    #[test]
    #[serial]
    fn test_rejects_non_http_rpc_url() {
        set_required();
        env::set_var("DEST_RPC_URL", "ws://localhost:9546");
        let err = Config::load_from_env().unwrap_err();
        assert!(err.to_string().contains("DEST_RPC_URL"));

        set_required();
        env::set_var("SOURCE_RPC_URL", "localhost:8545/v2/key");
        assert!(Config::load_from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_debug_hides_path_api_key() {
        set_required();
        env::set_var("DEST_RPC_URL", "https://eth-mainnet.g.alchemy.com/v2/SECRETKEY123");
        let config = Config::load_from_env().unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("eth-mainnet.g.alchemy.com"));
        assert!(!debug.contains("SECRETKEY123"));
    }

    #[test]
    #[serial]
    fn test_missing_required_var() {
        set_required();
        env::remove_var("MESSENGER_ADDRESS");
        let err = Config::load_from_env().unwrap_err();
        assert!(err.to_string().contains("MESSENGER_ADDRESS"));
    }

    #[test]
    #[serial]
    fn test_rejects_zero_poll_interval_and_bad_policy() {
        set_required();
        env::set_var("RELAY_POLL_INTERVAL_MS", "0");
        assert!(Config::load_from_env().is_err());

        set_required();
        env::set_var("RELAY_FAILURE_POLICY", "retry-forever");
        assert!(Config::load_from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_debug_redacts_private_key() {
        set_required();
        let config = Config::load_from_env().unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains(
            "0x0000000000000000000000000000000000000000000000000000000000000001"
        ));
    }
}
