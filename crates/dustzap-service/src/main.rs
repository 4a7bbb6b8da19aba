//! Main entry point for the DustZap service.
//!
//! Runs the conversion engine either once from the command line, for a set
//! of balances read from a JSON file, or behind the HTTP API when it is
//! enabled in the configuration.

use clap::Parser;
use dustzap_config::Config;
use dustzap_core::{ConversionCoordinator, CoordinatorBuilder, DustZapFactories};
use dustzap_types::{Address, ConversionEvent, ConversionRequest, ImplementationRegistry, TokenBalance};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

mod apis;
mod server;

use dustzap_delivery::implementations::evm::wallet_rpc::create_wallet_rpc;

/// Command-line arguments for the DustZap service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	/// JSON file with the balances to convert. Runs a single conversion and exits.
	#[arg(long)]
	tokens: Option<PathBuf>,

	/// Account that owns the balances
	#[arg(long, env = "DUSTZAP_ACCOUNT")]
	account: Option<Address>,

	/// Chain the balances live on
	#[arg(long, default_value_t = 8453)]
	chain_id: u64,

	/// Slippage tolerance in percent
	#[arg(long)]
	slippage: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started dustzap");

	let config_path = args
		.config
		.to_str()
		.ok_or("Configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!(networks = config.networks.len(), mode = %config.execution.mode, "Loaded configuration");

	let coordinator = Arc::new(build_coordinator(config.clone())?);

	if let Some(tokens_path) = &args.tokens {
		let account = args.account.ok_or("--account is required with --tokens")?;
		let contents = tokio::fs::read_to_string(tokens_path).await?;
		let tokens: Vec<TokenBalance> = serde_json::from_str(&contents)?;
		let request = ConversionRequest {
			tokens,
			chain_id: args.chain_id,
			account,
			slippage: args.slippage,
		};
		run_once(coordinator, request).await?;
	} else if let Some(api_config) = config.api.clone().filter(|api| api.enabled) {
		server::start_server(api_config, coordinator).await?;
	} else {
		tracing::warn!("Nothing to do: pass --tokens or enable the [api] section");
	}

	tracing::info!("Stopped dustzap");
	Ok(())
}

/// How long a one-shot run keeps logging buffered events after the attempt returns.
const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
/// How long a one-shot run waits for audit deliveries before exiting.
const AUDIT_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs one conversion and prints its result as JSON.
async fn run_once(
	coordinator: Arc<ConversionCoordinator>,
	request: ConversionRequest,
) -> Result<(), Box<dyn std::error::Error>> {
	let events = tokio::spawn(log_events(coordinator.subscribe()));

	let outcome = coordinator.start(request).await;
	// Attempts rejected up front or with nothing to submit publish no terminal event.
	if tokio::time::timeout(EVENT_DRAIN_TIMEOUT, events).await.is_err() {
		tracing::debug!("Event log still open, no terminal event seen");
	}
	coordinator.flush_audits(AUDIT_FLUSH_TIMEOUT).await;

	match outcome {
		Ok(result) => {
			println!("{}", serde_json::to_string_pretty(&result)?);
			Ok(())
		},
		Err(e) => {
			if let Some(partial) = coordinator.snapshot().last_result {
				println!("{}", serde_json::to_string_pretty(&partial)?);
			}
			Err(e.into())
		},
	}
}

/// Logs conversion events until a terminal event arrives or the bus closes.
async fn log_events(mut events: broadcast::Receiver<ConversionEvent>) {
	loop {
		match events.recv().await {
			Ok(ConversionEvent::StatusUpdated { message, .. }) => {
				tracing::info!(
					from = %message.from_token,
					to = %message.to_token,
					aggregator = %message.dex_aggregator,
					"Route step"
				);
			},
			Ok(ConversionEvent::TransactionSigned { .. }) => tracing::info!("First batch signed"),
			Ok(ConversionEvent::BatchConfirmed { notification, .. })
			| Ok(ConversionEvent::BatchFailed { notification, .. }) => {
				tracing::info!(kind = ?notification.kind, "{}: {}", notification.title, notification.description);
			},
			Ok(ConversionEvent::ConversionCompleted { summary, .. }) => {
				tracing::info!(
					total_value_usd = summary.total_value_usd,
					tokens = summary.token_count,
					eth = summary.eth_amount,
					"Converted dust"
				);
				break;
			},
			Ok(ConversionEvent::ConversionFailed { message, .. }) => {
				tracing::warn!(error = %message, "Conversion failed");
				break;
			},
			Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Event log lagged"),
			Err(RecvError::Closed) => break,
		}
	}
}

/// Macro to create a factory HashMap with the appropriate type aliases
macro_rules! create_factory_map {
    // Variant for execution providers, which hand back both wallet primitives
    (execution, $( $name:expr => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<dustzap_delivery::ExecutionProvider, dustzap_delivery::DeliveryError>
            );
        )*
        factories
    }};

    ($interface:path, $error:path, $( $name:expr => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Builds the conversion coordinator with every available implementation.
fn build_coordinator(config: Config) -> Result<ConversionCoordinator, Box<dyn std::error::Error>> {
	use dustzap_price::implementations as price;
	use dustzap_routes::implementations as routes;

	let price_factories = create_factory_map!(
		dustzap_price::PriceFeedInterface,
		dustzap_price::PriceFeedError,
		price::http::Registry::NAME => price::http::Registry::factory(),
		price::mock::Registry::NAME => price::mock::Registry::factory(),
	);

	let route_factories = create_factory_map!(
		dustzap_routes::RouteServiceInterface,
		dustzap_routes::RouteError,
		routes::http::Registry::NAME => routes::http::Registry::factory(),
		routes::mock::Registry::NAME => routes::mock::Registry::factory(),
	);

	let execution_factories = create_factory_map!(
		execution,
		"wallet_rpc" => create_wallet_rpc,
		dustzap_delivery::implementations::mock::Registry::NAME
			=> dustzap_delivery::implementations::mock::Registry::factory(),
	);

	let factories = DustZapFactories {
		price_factories,
		route_factories,
		execution_factories,
	};

	Ok(CoordinatorBuilder::new(config).build(factories)?)
}
