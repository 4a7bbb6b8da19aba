//! HTTP server for the DustZap API.
//!
//! Exposes conversion submission and progress polling under `/api`, plus a
//! `/health` check.

use crate::apis::conversion::{handle_progress, handle_start_conversion};
use axum::{
	http::StatusCode,
	response::{IntoResponse, Json},
	routing::{get, post},
	Router,
};
use dustzap_config::ApiConfig;
use dustzap_core::ConversionCoordinator;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub coordinator: Arc<ConversionCoordinator>,
}

/// Starts the HTTP server and serves until it fails.
pub async fn start_server(
	api_config: ApiConfig,
	coordinator: Arc<ConversionCoordinator>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(AppState { coordinator });

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("DustZap API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/conversions", post(handle_start_conversion))
				.route("/conversions/progress", get(handle_progress)),
		)
		.route("/health", get(handle_health))
		.layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
		.with_state(state)
}

async fn handle_health() -> impl IntoResponse {
	(StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}
