//! Conversion API.
//!
//! `POST /api/conversions` claims the engine and runs the conversion in the
//! background; clients then poll `GET /api/conversions/progress`. Only one
//! conversion runs at a time, so a second submission while one is in flight
//! is answered with 409.

use crate::server::AppState;
use axum::{
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Json, Response},
};
use dustzap_core::ConversionError;
use dustzap_types::{ConversionRequest, ConversionSnapshot, ExecutionMode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Response to an accepted conversion.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartConversionResponse {
	/// Generation of the started attempt. Events and snapshots carry the same number.
	pub generation: u64,
	pub execution_mode: ExecutionMode,
}

/// Progress of the current or most recent attempt.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
	#[serde(flatten)]
	pub snapshot: ConversionSnapshot,
	pub batch_percent: f64,
	pub step_percent: f64,
	pub trading_loss_usd: f64,
}

impl From<ConversionSnapshot> for ProgressResponse {
	fn from(snapshot: ConversionSnapshot) -> Self {
		Self {
			batch_percent: snapshot.batch_progress.percent(),
			step_percent: snapshot.step_percent(),
			trading_loss_usd: snapshot.display_trading_loss(),
			snapshot,
		}
	}
}

/// API error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub error: String,
	pub message: String,
}

/// Errors returned by the conversion endpoints.
#[derive(Debug, Error)]
pub enum ConversionApiError {
	#[error("{0}")]
	Conflict(String),
	#[error("{0}")]
	BadRequest(String),
	#[error("{0}")]
	Internal(String),
}

impl ConversionApiError {
	pub fn status_code(&self) -> StatusCode {
		match self {
			ConversionApiError::Conflict(_) => StatusCode::CONFLICT,
			ConversionApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
			ConversionApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	fn error_code(&self) -> &'static str {
		match self {
			ConversionApiError::Conflict(_) => "CONVERSION_IN_PROGRESS",
			ConversionApiError::BadRequest(_) => "INVALID_REQUEST",
			ConversionApiError::Internal(_) => "INTERNAL_ERROR",
		}
	}
}

impl From<ConversionError> for ConversionApiError {
	fn from(error: ConversionError) -> Self {
		match error {
			ConversionError::AlreadyRunning => ConversionApiError::Conflict(error.to_string()),
			ConversionError::InvalidRequest(_) | ConversionError::UnsupportedChain(_) => {
				ConversionApiError::BadRequest(error.to_string())
			},
			other => ConversionApiError::Internal(other.to_string()),
		}
	}
}

impl IntoResponse for ConversionApiError {
	fn into_response(self) -> Response {
		let body = ErrorResponse {
			error: self.error_code().to_string(),
			message: self.to_string(),
		};
		(self.status_code(), Json(body)).into_response()
	}
}

/// Handles POST /api/conversions requests.
pub async fn handle_start_conversion(
	State(state): State<AppState>,
	Json(request): Json<ConversionRequest>,
) -> Result<(StatusCode, Json<StartConversionResponse>), ConversionApiError> {
	let coordinator = Arc::clone(&state.coordinator);
	let attempt = coordinator.begin(&request).map_err(|e| {
		tracing::warn!(error = %e, "Conversion request rejected");
		ConversionApiError::from(e)
	})?;
	let generation = attempt.generation();

	let execution_mode = coordinator.execution_mode();
	tokio::spawn(async move {
		if let Err(e) = coordinator.run(attempt, request).await {
			tracing::debug!(generation, error = %e, "Background conversion ended with error");
		}
	});

	Ok((
		StatusCode::ACCEPTED,
		Json(StartConversionResponse {
			generation,
			execution_mode,
		}),
	))
}

/// Handles GET /api/conversions/progress requests.
pub async fn handle_progress(State(state): State<AppState>) -> Json<ProgressResponse> {
	Json(state.coordinator.snapshot().into())
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use dustzap_config::Config;
	use dustzap_core::{CoordinatorBuilder, DustZapFactories};
	use dustzap_sdk::{AuditSink, ReferrerLookup, SdkError};
	use dustzap_types::{Address, ConversionPhase, TokenBalance};
	use std::str::FromStr;
	use std::time::Duration;

	struct NoReferrers;

	#[async_trait]
	impl ReferrerLookup for NoReferrers {
		async fn referrer_of(&self, _account: Address) -> Result<Option<Address>, SdkError> {
			Ok(None)
		}
	}

	struct NullAudit;

	#[async_trait]
	impl AuditSink for NullAudit {
		async fn record(&self, _message: String) -> Result<(), SdkError> {
			Ok(())
		}
	}

	const CONFIG: &str = r#"
[networks.8453]
name = "base"
wrapped_native_address = "0x4200000000000000000000000000000000000006"
explorer_url = "https://basescan.org"

[sdk]
base_url = "https://sdk.example.com"

[price]
primary = "mock"
[price.implementations.mock]

[routes]
primary = "mock"
[routes.implementations.mock]

[execution]
primary = "mock"
[execution.implementations.mock]
latency_ms = 100
"#;

	fn app_state() -> AppState {
		let config = Config::from_str(CONFIG).unwrap();
		let factories = DustZapFactories {
			price_factories: dustzap_price::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			route_factories: dustzap_routes::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			execution_factories: dustzap_delivery::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		};
		let coordinator = CoordinatorBuilder::new(config)
			.with_sdk(Arc::new(NoReferrers), Arc::new(NullAudit))
			.build(factories)
			.unwrap();
		AppState {
			coordinator: Arc::new(coordinator),
		}
	}

	fn request(count: usize) -> ConversionRequest {
		ConversionRequest {
			tokens: (0..count)
				.map(|i| TokenBalance {
					id: format!("token-{}", i),
					symbol: format!("T{}", i),
					optimized_symbol: None,
					address: Some(Address::repeat_byte(i as u8 + 1)),
					amount: 5.0,
					price: 0.2,
				})
				.collect(),
			chain_id: 8453,
			account: Address::repeat_byte(0xaa),
			slippage: None,
		}
	}

	async fn wait_until_idle(state: &AppState) -> ConversionSnapshot {
		for _ in 0..100 {
			let snapshot = state.coordinator.snapshot();
			if !snapshot.in_flight {
				return snapshot;
			}
			tokio::time::sleep(Duration::from_millis(20)).await;
		}
		panic!("Conversion did not finish in time");
	}

	#[tokio::test]
	async fn test_start_conversion_accepted_then_conflict() {
		let state = app_state();

		let (status, Json(response)) =
			handle_start_conversion(State(state.clone()), Json(request(3))).await.unwrap();
		assert_eq!(status, StatusCode::ACCEPTED);
		assert_eq!(response.generation, 1);
		assert_eq!(response.execution_mode, ExecutionMode::Sequential);

		let err = handle_start_conversion(State(state.clone()), Json(request(3)))
			.await
			.unwrap_err();
		assert_eq!(err.status_code(), StatusCode::CONFLICT);

		let snapshot = wait_until_idle(&state).await;
		assert_eq!(snapshot.phase, ConversionPhase::Succeeded);
		assert_eq!(snapshot.generation, 1);
	}

	#[tokio::test]
	async fn test_start_conversion_rejects_bad_request() {
		let state = app_state();

		let err = handle_start_conversion(State(state.clone()), Json(request(0)))
			.await
			.unwrap_err();
		assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

		let mut unknown_chain = request(2);
		unknown_chain.chain_id = 56;
		let err = handle_start_conversion(State(state), Json(unknown_chain))
			.await
			.unwrap_err();
		assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn test_progress_reports_completed_batches() {
		let state = app_state();
		let (status, Json(started)) = handle_start_conversion(State(state.clone()), Json(request(12)))
			.await
			.unwrap();
		assert_eq!(status, StatusCode::ACCEPTED);
		assert_eq!(started.generation, 1);
		wait_until_idle(&state).await;

		let Json(progress) = handle_progress(State(state)).await;

		assert_eq!(progress.snapshot.batch_progress.total, 2);
		assert_eq!(progress.batch_percent, 100.0);
		assert_eq!(progress.step_percent, 100.0);
		assert!(progress.trading_loss_usd > 0.0);
	}

	#[test]
	fn test_error_mapping() {
		let conflict = ConversionApiError::from(ConversionError::AlreadyRunning);
		assert_eq!(conflict.status_code(), StatusCode::CONFLICT);

		let internal = ConversionApiError::from(ConversionError::BatchSubmission {
			batch_index: 1,
			message: "User rejected the request".to_string(),
		});
		assert_eq!(internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
	}
}
