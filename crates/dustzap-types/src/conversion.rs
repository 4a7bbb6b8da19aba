//! Conversion request, progress and result types.
//!
//! These records describe one conversion attempt from the moment a user
//! selects dust balances until the last batch lands on chain (or fails).

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// A dust balance selected for conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
	/// Identifier assigned by the token discovery service.
	pub id: String,
	/// Token symbol (e.g. "USDC").
	pub symbol: String,
	/// Preferred display symbol when the raw symbol is ambiguous.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub optimized_symbol: Option<String>,
	/// Token contract address, absent for native balances.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub address: Option<Address>,
	/// Balance in whole-token units.
	pub amount: f64,
	/// USD price per whole token.
	pub price: f64,
}

impl TokenBalance {
	/// USD value of the balance.
	pub fn value_usd(&self) -> f64 {
		self.amount * self.price
	}

	/// Symbol used for display and route lookups.
	pub fn display_symbol(&self) -> &str {
		self.optimized_symbol.as_deref().unwrap_or(&self.symbol)
	}
}

/// Sum of the USD value of the given balances.
pub fn total_value_usd(tokens: &[TokenBalance]) -> f64 {
	tokens.iter().map(TokenBalance::value_usd).sum()
}

/// Request to convert a set of dust balances into ETH.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
	/// Balances to convert.
	pub tokens: Vec<TokenBalance>,
	/// Chain the balances live on.
	pub chain_id: u64,
	/// Wallet that owns the balances and signs the batches.
	pub account: Address,
	/// Slippage tolerance passed to the route service. Falls back to the configured default.
	#[serde(default)]
	pub slippage: Option<f64>,
}

/// One step reported by the route service while it builds swap routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
	pub from_token: String,
	pub to_token: String,
	pub amount: f64,
	pub output_amount: f64,
	/// USD gap between expected and realized output for this step.
	pub trading_loss: f64,
	pub dex_aggregator: String,
	/// Expected number of conversion steps, only meaningful on the first message.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub total_steps: Option<usize>,
}

/// Batch signing progress for the in-flight attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchProgress {
	pub completed: usize,
	pub total: usize,
}

impl BatchProgress {
	/// Fresh progress for an attempt with `total` batches.
	pub fn new(total: usize) -> Self {
		Self {
			completed: 0,
			total,
		}
	}

	/// Records a completed batch. `completed` never moves backwards.
	pub fn complete(&mut self, batch_index: usize) {
		self.completed = self.completed.max(batch_index);
	}

	/// Completion percentage clamped to 100, or 0 when no batches are planned.
	pub fn percent(&self) -> f64 {
		if self.total == 0 {
			return 0.0;
		}
		(self.completed as f64 / self.total as f64 * 100.0).min(100.0)
	}
}

/// Terminal record of a conversion attempt.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConversionResult {
	/// Batches that landed successfully.
	pub succeeded_batches: usize,
	/// 1-indexed batch that failed, if the attempt stopped early.
	pub failed_at_batch: Option<usize>,
	/// Hash of the last successful batch.
	pub transaction_hash: Option<String>,
	/// Aggregate USD trading loss reported by the route service.
	pub aggregate_trading_loss: f64,
}

impl ConversionResult {
	/// Returns true if every planned batch succeeded.
	pub fn is_success(&self) -> bool {
		self.failed_at_batch.is_none()
	}
}

/// Payload of the social-share trigger emitted after the last batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareSummary {
	pub total_value_usd: f64,
	pub token_count: usize,
	pub transaction_hash: Option<String>,
	pub explorer_url: String,
	/// ETH equivalent of the converted value.
	pub eth_amount: f64,
}

/// Lifecycle phase of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionPhase {
	#[default]
	Idle,
	FetchingPrice,
	ComputingFees,
	FetchingRoutes,
	Executing,
	Succeeded,
	Failed,
}

/// Read-only view of the coordinator state for the presentation layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionSnapshot {
	/// Attempt generation the snapshot belongs to.
	pub generation: u64,
	pub phase: ConversionPhase,
	pub in_flight: bool,
	pub batch_progress: BatchProgress,
	pub status_messages: Vec<StatusMessage>,
	pub total_steps: usize,
	pub aggregate_trading_loss: f64,
	/// Set once the first batch is signed. Never cleared within an attempt.
	pub transaction_signed: bool,
	pub fetching_routes: bool,
	pub last_result: Option<ConversionResult>,
	pub last_error: Option<String>,
}

impl ConversionSnapshot {
	/// Trading loss to display.
	///
	/// The route service aggregate is authoritative. Summing per-step losses is
	/// only an approximation used while no aggregate is known.
	pub fn display_trading_loss(&self) -> f64 {
		if self.aggregate_trading_loss != 0.0 {
			return self.aggregate_trading_loss;
		}
		self.status_messages.iter().map(|m| m.trading_loss).sum()
	}

	/// Route-building progress as a percentage of the expected steps.
	pub fn step_percent(&self) -> f64 {
		if self.total_steps == 0 {
			return 0.0;
		}
		(self.status_messages.len() as f64 / self.total_steps as f64 * 100.0).min(100.0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn message(loss: f64) -> StatusMessage {
		StatusMessage {
			from_token: "PEPE".to_string(),
			to_token: "eth".to_string(),
			amount: 10.0,
			output_amount: 0.001,
			trading_loss: loss,
			dex_aggregator: "1inch".to_string(),
			total_steps: None,
		}
	}

	#[test]
	fn test_total_value_usd() {
		let tokens = vec![
			TokenBalance {
				id: "a".to_string(),
				symbol: "AAA".to_string(),
				optimized_symbol: None,
				address: None,
				amount: 2.0,
				price: 1.5,
			},
			TokenBalance {
				id: "b".to_string(),
				symbol: "BBB".to_string(),
				optimized_symbol: Some("bBB".to_string()),
				address: None,
				amount: 4.0,
				price: 0.25,
			},
		];
		assert_eq!(total_value_usd(&tokens), 4.0);
		assert_eq!(tokens[1].display_symbol(), "bBB");
	}

	#[test]
	fn test_batch_progress_is_monotonic() {
		let mut progress = BatchProgress::new(3);
		progress.complete(2);
		progress.complete(1);
		assert_eq!(progress.completed, 2);
		assert!((progress.percent() - 66.666).abs() < 0.01);
		assert_eq!(BatchProgress::default().percent(), 0.0);
	}

	#[test]
	fn test_display_trading_loss_prefers_aggregate() {
		let mut snapshot = ConversionSnapshot {
			status_messages: vec![message(0.5), message(0.25)],
			..Default::default()
		};
		assert_eq!(snapshot.display_trading_loss(), 0.75);

		snapshot.aggregate_trading_loss = 2.0;
		assert_eq!(snapshot.display_trading_loss(), 2.0);
	}

	#[test]
	fn test_status_message_wire_format() {
		let json = r#"{"fromToken":"PEPE","toToken":"eth","amount":1.0,"outputAmount":0.1,"tradingLoss":0.01,"dexAggregator":"paraswap","totalSteps":4}"#;
		let parsed: StatusMessage = serde_json::from_str(json).unwrap();
		assert_eq!(parsed.total_steps, Some(4));
		assert_eq!(parsed.dex_aggregator, "paraswap");
	}
}
