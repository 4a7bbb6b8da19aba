//! Conversion coordinator.
//!
//! Sequences one conversion attempt: price fetch, fee computation, route
//! fetch, batch planning and execution. Progress is kept in a snapshot for
//! the presentation layer and every user-visible change is published on the
//! event bus.

mod notifications;
mod state;

pub use state::InFlightGuard;

use crate::event_bus::EventBus;
use crate::executor::{failure_message, BatchCallbacks, BatchExecutor, ExecutionError};
use crate::fees::FeeCalculator;
use crate::planner::BatchPlanner;
use crate::ConversionError;
use dustzap_config::Config;
use dustzap_delivery::{DeliveryError, ExecutionProvider};
use dustzap_price::PriceFeedService;
use dustzap_routes::{RouteRequest, RouteService};
use dustzap_sdk::{conversion_success_message, AuditSink};
use dustzap_types::{
	total_value_usd, Address, BatchProgress, ChainMetadata, ConversionEvent, ConversionPhase,
	ConversionRequest, ConversionResult, ConversionSnapshot, ExecutionMode, ShareSummary,
	StatusMessage, SubmissionReceipt,
};
use state::SharedState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::instrument;

/// Coordinator settings derived from configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
	pub default_slippage: f64,
	pub execution_mode: ExecutionMode,
	pub networks: HashMap<u64, ChainMetadata>,
}

impl CoordinatorSettings {
	pub fn from_config(config: &Config) -> Self {
		let networks = config
			.networks
			.iter()
			.map(|(chain_id, network)| (*chain_id, ChainMetadata::from_network(*chain_id, network)))
			.collect();
		Self {
			default_slippage: config.engine.default_slippage,
			execution_mode: config.execution.mode,
			networks,
		}
	}
}

/// Runs conversion attempts one at a time.
pub struct ConversionCoordinator {
	settings: CoordinatorSettings,
	price: PriceFeedService,
	routes: RouteService,
	fees: FeeCalculator,
	planner: BatchPlanner,
	execution: ExecutionProvider,
	audit: Arc<dyn AuditSink>,
	events: EventBus,
	state: Arc<SharedState>,
	/// Audit deliveries still in flight.
	audits: Mutex<JoinSet<()>>,
}

impl ConversionCoordinator {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		settings: CoordinatorSettings,
		price: PriceFeedService,
		routes: RouteService,
		fees: FeeCalculator,
		planner: BatchPlanner,
		execution: ExecutionProvider,
		audit: Arc<dyn AuditSink>,
		events: EventBus,
	) -> Self {
		Self {
			settings,
			price,
			routes,
			fees,
			planner,
			execution,
			audit,
			events,
			state: Arc::new(SharedState::default()),
			audits: Mutex::new(JoinSet::new()),
		}
	}

	/// Current state for display.
	pub fn snapshot(&self) -> ConversionSnapshot {
		self.state.snapshot()
	}

	pub fn subscribe(&self) -> broadcast::Receiver<ConversionEvent> {
		self.events.subscribe()
	}

	pub fn execution_mode(&self) -> ExecutionMode {
		self.settings.execution_mode
	}

	/// Validates the request and claims the in-flight slot.
	///
	/// Fails with [`ConversionError::AlreadyRunning`] while another attempt
	/// holds the slot. The returned guard releases it when dropped.
	pub fn begin(&self, request: &ConversionRequest) -> Result<InFlightGuard, ConversionError> {
		if request.tokens.is_empty() {
			return Err(ConversionError::InvalidRequest("No tokens selected".into()));
		}
		if let Some(slippage) = request.slippage {
			if !(0.0..=100.0).contains(&slippage) {
				return Err(ConversionError::InvalidRequest(format!(
					"Slippage must be within [0, 100], got {}",
					slippage
				)));
			}
		}
		self.chain(request.chain_id)?;

		let attempt = self.state.try_begin(request.tokens.len())?;
		tracing::info!(
			generation = attempt.generation(),
			chain_id = request.chain_id,
			account = %request.account,
			tokens = request.tokens.len(),
			"Conversion started"
		);
		Ok(attempt)
	}

	/// Runs an attempt claimed with [`begin`](Self::begin) to completion.
	#[instrument(skip_all, fields(generation = attempt.generation(), chain_id = request.chain_id))]
	pub async fn run(
		&self,
		attempt: InFlightGuard,
		request: ConversionRequest,
	) -> Result<ConversionResult, ConversionError> {
		let outcome = self.execute(&attempt, &request).await;

		if let Err(error) = &outcome {
			tracing::error!(error = %error, "Conversion failed");
			let message = error.to_string();
			let recorded = attempt.update(|s| {
				s.phase = ConversionPhase::Failed;
				s.last_error = Some(message.clone());
			});
			if recorded {
				self.events
					.publish(ConversionEvent::ConversionFailed {
						generation: attempt.generation(),
						message,
					})
					.ok();
			}
		}

		outcome
	}

	/// Claims the in-flight slot and runs the attempt.
	pub async fn start(&self, request: ConversionRequest) -> Result<ConversionResult, ConversionError> {
		let attempt = self.begin(&request)?;
		self.run(attempt, request).await
	}

	fn chain(&self, chain_id: u64) -> Result<ChainMetadata, ConversionError> {
		self.settings
			.networks
			.get(&chain_id)
			.cloned()
			.ok_or(ConversionError::UnsupportedChain(chain_id))
	}

	async fn execute(
		&self,
		attempt: &InFlightGuard,
		request: &ConversionRequest,
	) -> Result<ConversionResult, ConversionError> {
		let chain = self.chain(request.chain_id)?;

		let eth_price = self.price.get_eth_price().await?;

		attempt.update(|s| s.phase = ConversionPhase::ComputingFees);
		let total_value = total_value_usd(&request.tokens);
		let fee_plan = self
			.fees
			.compute_fees(total_value, &chain, request.account, eth_price)
			.await?;

		attempt.update(|s| s.phase = ConversionPhase::FetchingRoutes);
		let slippage = request.slippage.unwrap_or(self.settings.default_slippage);
		let route_request = RouteRequest::new(
			request.tokens.clone(),
			request.chain_id,
			request.account,
			eth_price,
			slippage,
		);
		let (status_tx, status_rx) = mpsc::unbounded_channel();
		let (routes, ()) = tokio::join!(
			self.routes.fetch_routes(&route_request, status_tx),
			self.collect_status(attempt, status_rx),
		);
		attempt.update(|s| s.fetching_routes = false);
		let bundle = routes?;

		let trading_loss = bundle.aggregate_trading_loss_usd;
		attempt.update(|s| s.aggregate_trading_loss = trading_loss);

		let plan = self.planner.plan(bundle.operations, fee_plan.fee_operations)?;
		if plan.is_empty() {
			tracing::info!("No operations to submit");
			let result = ConversionResult {
				aggregate_trading_loss: trading_loss,
				..Default::default()
			};
			attempt.update(|s| {
				s.phase = ConversionPhase::Succeeded;
				s.last_result = Some(result.clone());
			});
			return Ok(result);
		}

		attempt.update(|s| s.phase = ConversionPhase::Executing);
		let strategy = self.execution.strategy(self.settings.execution_mode);
		let callbacks = AttemptCallbacks {
			attempt,
			events: &self.events,
			chain: &chain,
			fee_batch_index: plan.fee_batch_index,
			total_value_usd: total_value,
			token_count: request.tokens.len(),
			eth_price,
			last_hash: Mutex::new(None),
		};
		let mut executor = BatchExecutor::new(request.chain_id, request.account);

		match executor.run(&plan, &strategy, &callbacks).await {
			Ok(report) => {
				let result = ConversionResult {
					succeeded_batches: report.receipts.len(),
					failed_at_batch: None,
					transaction_hash: callbacks.last_hash(),
					aggregate_trading_loss: trading_loss,
				};
				attempt.update(|s| {
					s.phase = ConversionPhase::Succeeded;
					s.last_result = Some(result.clone());
				});
				tracing::info!(
					batches = result.succeeded_batches,
					fee_usd = fee_plan.fee_usd,
					trading_loss,
					"Conversion complete"
				);
				self.spawn_audit(request.account);
				Ok(result)
			},
			Err(ExecutionError::BatchSubmission {
				batch_index,
				message,
			}) => {
				let result = ConversionResult {
					succeeded_batches: batch_index.saturating_sub(1),
					failed_at_batch: Some(batch_index),
					transaction_hash: callbacks.last_hash(),
					aggregate_trading_loss: trading_loss,
				};
				attempt.update(|s| s.last_result = Some(result));
				Err(ConversionError::BatchSubmission {
					batch_index,
					message,
				})
			},
		}
	}

	/// Appends route status messages to the log in arrival order.
	async fn collect_status(
		&self,
		attempt: &InFlightGuard,
		mut status: mpsc::UnboundedReceiver<StatusMessage>,
	) {
		while let Some(message) = status.recv().await {
			let applied = attempt.update(|s| {
				if s.status_messages.is_empty() {
					if let Some(total_steps) = message.total_steps {
						s.total_steps = total_steps;
					}
				}
				s.status_messages.push(message.clone());
			});
			if applied {
				self.events
					.publish(ConversionEvent::StatusUpdated {
						generation: attempt.generation(),
						message,
					})
					.ok();
			}
		}
	}

	fn spawn_audit(&self, account: Address) {
		let audit = Arc::clone(&self.audit);
		let mut audits = self.audits.lock().unwrap_or_else(PoisonError::into_inner);
		while audits.try_join_next().is_some() {}
		audits.spawn(async move {
			if let Err(e) = audit.record(conversion_success_message(account)).await {
				tracing::warn!(error = %e, "Failed to deliver audit webhook");
			}
		});
	}

	/// Waits up to `timeout` for pending audit deliveries, aborting the rest.
	///
	/// Call before dropping the runtime. Deliveries still pending at that
	/// point are cancelled.
	pub async fn flush_audits(&self, timeout: Duration) {
		let mut pending = std::mem::take(
			&mut *self.audits.lock().unwrap_or_else(PoisonError::into_inner),
		);
		if pending.is_empty() {
			return;
		}
		let drained = tokio::time::timeout(timeout, async {
			while pending.join_next().await.is_some() {}
		})
		.await;
		if drained.is_err() {
			tracing::warn!(
				pending = pending.len(),
				"Audit deliveries did not finish in time"
			);
			pending.shutdown().await;
		}
	}
}

/// Executor callbacks bound to one attempt.
struct AttemptCallbacks<'a> {
	attempt: &'a InFlightGuard,
	events: &'a EventBus,
	chain: &'a ChainMetadata,
	fee_batch_index: Option<usize>,
	total_value_usd: f64,
	token_count: usize,
	eth_price: f64,
	last_hash: Mutex<Option<String>>,
}

impl AttemptCallbacks<'_> {
	fn last_hash(&self) -> Option<String> {
		self.last_hash
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}

	fn publish(&self, event: ConversionEvent) {
		self.events.publish(event).ok();
	}
}

impl BatchCallbacks for AttemptCallbacks<'_> {
	fn on_started(&self, total_batches: usize) {
		self.attempt
			.update(|s| s.batch_progress = BatchProgress::new(total_batches));
	}

	fn on_success(&self, receipt: &SubmissionReceipt, is_last: bool, batch_index: usize) {
		let tx_hash = receipt
			.transaction_hash
			.clone()
			.unwrap_or_else(|| receipt.id.clone());
		*self.last_hash.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx_hash.clone());

		let mut first_signature = false;
		let applied = self.attempt.update(|s| {
			s.batch_progress.complete(batch_index);
			if !s.transaction_signed {
				s.transaction_signed = true;
				first_signature = true;
			}
		});
		if !applied {
			return;
		}

		let generation = self.attempt.generation();
		if first_signature {
			self.publish(ConversionEvent::TransactionSigned { generation });
		}

		let is_fee_batch = self.fee_batch_index == Some(batch_index);
		let notification = notifications::batch_success(
			batch_index,
			is_last,
			is_fee_batch,
			&self.chain.tx_url(&tx_hash),
		);
		self.publish(ConversionEvent::BatchConfirmed {
			generation,
			notification,
			receipt: receipt.clone(),
		});

		if is_last {
			let summary = ShareSummary {
				total_value_usd: self.total_value_usd,
				token_count: self.token_count,
				transaction_hash: Some(tx_hash),
				explorer_url: self.chain.explorer_url.clone(),
				eth_amount: self.total_value_usd / self.eth_price,
			};
			self.publish(ConversionEvent::ConversionCompleted {
				generation,
				summary,
			});
		}
	}

	fn on_error(&self, error: &DeliveryError, batch_index: usize) {
		let message = failure_message(error);
		let applied = self.attempt.update(|s| s.last_error = Some(message.clone()));
		if applied {
			self.publish(ConversionEvent::BatchFailed {
				generation: self.attempt.generation(),
				notification: notifications::batch_failure(batch_index, &message),
			});
		}
	}
}
