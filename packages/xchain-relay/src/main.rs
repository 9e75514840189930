use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, B256};
use alloy::rpc::types::TransactionRequest;
use clap::Parser;
use eyre::{eyre, WrapErr};

use xchain_relay::config::Config;
use xchain_relay::evm::{discover_message_bus, EvmDestination, EvmSource};
use xchain_relay::{
    fetch_receipts, metrics, MessageExtractor, RelayPipeline, RelayReport, RelayReports,
};

/// Relay cross-chain messages published by source transactions
#[derive(Parser, Debug)]
#[command(name = "xchain-relay", version, about)]
struct Cli {
    /// Env file to load before reading configuration
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Print Prometheus metrics after the run
    #[arg(long)]
    print_metrics: bool,

    /// Source transaction hashes, relayed in the given order
    #[arg(
        value_name = "SOURCE_TX_HASH",
        required_unless_present = "trigger_to",
        conflicts_with = "trigger_to"
    )]
    transactions: Vec<B256>,

    /// Send a transaction to this source contract and relay what it publishes
    /// (signed with SOURCE_PRIVATE_KEY)
    #[arg(long, value_name = "ADDRESS")]
    trigger_to: Option<Address>,

    /// Calldata for the trigger transaction
    #[arg(long, value_name = "HEX", requires = "trigger_to")]
    trigger_data: Option<Bytes>,

    /// Emit JSON logs (also enabled by LOG_FORMAT=json)
    #[arg(long)]
    json_logs: bool,

    /// Print the per-message reports as a JSON array instead of text lines
    #[arg(long)]
    json: bool,
}

fn main() -> eyre::Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> eyre::Result<ExitCode> {
    let config = Config::load_from_file(&cli.env_file.to_string_lossy())?;
    init_logging(cli.json_logs);

    tracing::info!(
        transactions = cli.transactions.len(),
        policy = %config.relay.failure_policy,
        "Starting cross-chain relay"
    );
    tracing::debug!(?config, "Configuration loaded");

    let message_bus = match config.destination.message_bus_address {
        Some(address) => address,
        None => discover_message_bus(&config.destination.rpc_url)
            .await
            .wrap_err("MESSAGE_BUS_ADDRESS is not set and net_config discovery failed")?,
    };
    let destination = Arc::new(EvmDestination::new(&config.destination, message_bus)?);
    tracing::info!(
        relayer = %destination.relayer_address(),
        message_bus = %destination.message_bus(),
        "Destination ready"
    );

    let extractor = match config.source.message_bus_address {
        Some(address) => MessageExtractor::with_emitter(address),
        None => MessageExtractor::new(),
    };
    let pipeline =
        RelayPipeline::new(destination, config.pipeline_config()).with_extractor(extractor);

    let reports = tokio::select! {
        result = relay(&cli, &config, &pipeline) => result?,
        _ = wait_for_shutdown_signal() => {
            tracing::warn!("Relay run cancelled");
            return Ok(ExitCode::from(130));
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            println!("{}\t{}", report.key, report.outcome);
        }
    }

    if cli.print_metrics {
        print!("{}", metrics::render()?);
    }

    if reports.all_relayed() {
        tracing::info!(relayed = reports.len(), "All messages relayed");
        Ok(ExitCode::SUCCESS)
    } else {
        if let Some(failure) = reports.first_failure() {
            tracing::error!(
                key = %failure.key,
                outcome = %failure.outcome,
                relayed = reports.relayed_count(),
                total = reports.len(),
                "Relay run incomplete"
            );
        }
        Ok(ExitCode::FAILURE)
    }
}

/// Relay either the given transactions or a freshly sent trigger transaction
async fn relay(
    cli: &Cli,
    config: &Config,
    pipeline: &RelayPipeline<EvmDestination>,
) -> eyre::Result<Vec<RelayReport>> {
    let Some(to) = cli.trigger_to else {
        let source = EvmSource::new(&config.source.rpc_url)?;
        let receipts = fetch_receipts(&source, &cli.transactions)
            .await
            .wrap_err("Failed to fetch source receipts")?;
        return Ok(pipeline.run_receipts(&receipts).await?);
    };

    let key = config
        .source
        .private_key
        .as_ref()
        .ok_or_else(|| eyre!("SOURCE_PRIVATE_KEY is required to send a trigger transaction"))?;
    let source = EvmSource::with_signer(&config.source.rpc_url, key.expose())?;

    let mut request = TransactionRequest::default()
        .with_to(to)
        .with_input(cli.trigger_data.clone().unwrap_or_default());
    if let Some(from) = source.signer_address() {
        request = request.with_from(from);
    }
    tracing::info!(%to, "Sending trigger transaction");

    Ok(pipeline.run_triggered(&source, request).await?)
}

fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,xchain_relay=debug"));
    let json = json || std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .with(filter)
            .init();
    }
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, cancelling relay run");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, cancelling relay run");
        }
    }
}
