//! Client for the SDK API.
//!
//! Two best-effort side channels of a conversion go through this API: the
//! referrer lookup that decides whether part of the fee is shared, and the
//! audit webhook fired after a fully successful conversion. Callers log
//! failures from either and carry on.

use async_trait::async_trait;
use dustzap_types::Address;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when talking to the SDK API.
#[derive(Debug, Error)]
pub enum SdkError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("Unexpected response: {0}")]
	InvalidResponse(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Resolves the referrer of an account, if it has one.
#[async_trait]
pub trait ReferrerLookup: Send + Sync {
	async fn referrer_of(&self, account: Address) -> Result<Option<Address>, SdkError>;
}

/// Receives audit messages about completed conversions.
#[async_trait]
pub trait AuditSink: Send + Sync {
	async fn record(&self, message: String) -> Result<(), SdkError>;
}

/// Audit message for a fully successful conversion.
pub fn conversion_success_message(account: Address) -> String {
	format!("{}: Dust conversion success", account)
}

#[derive(Debug, Deserialize)]
struct ReferrerResponse {
	#[serde(default)]
	referrer: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload {
	error_msg: String,
}

/// HTTP client for the SDK API.
#[derive(Debug, Clone)]
pub struct HttpSdkClient {
	client: reqwest::Client,
	base_url: String,
}

impl HttpSdkClient {
	pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SdkError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| SdkError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
		Ok(Self {
			client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
		})
	}

	fn referees_url(&self, account: Address) -> String {
		format!(
			"{}/referral/{}/referees",
			self.base_url,
			account.to_string().to_lowercase()
		)
	}

	fn webhook_url(&self) -> String {
		format!("{}/discord/webhook", self.base_url)
	}
}

/// Interprets the referrer field. Empty, null and zero all mean "none".
fn parse_referrer(response: ReferrerResponse) -> Result<Option<Address>, SdkError> {
	match response.referrer.as_deref().map(str::trim) {
		None | Some("") => Ok(None),
		Some(raw) => {
			let address: Address = raw
				.parse()
				.map_err(|e| SdkError::InvalidResponse(format!("Invalid referrer '{}': {}", raw, e)))?;
			Ok((!address.is_zero()).then_some(address))
		},
	}
}

#[async_trait]
impl ReferrerLookup for HttpSdkClient {
	async fn referrer_of(&self, account: Address) -> Result<Option<Address>, SdkError> {
		let response = self
			.client
			.get(self.referees_url(account))
			.send()
			.await
			.map_err(|e| SdkError::Network(e.to_string()))?
			.error_for_status()
			.map_err(|e| SdkError::Network(e.to_string()))?;

		let body: ReferrerResponse = response
			.json()
			.await
			.map_err(|e| SdkError::InvalidResponse(e.to_string()))?;
		parse_referrer(body)
	}
}

#[async_trait]
impl AuditSink for HttpSdkClient {
	async fn record(&self, message: String) -> Result<(), SdkError> {
		self.client
			.post(self.webhook_url())
			.json(&WebhookPayload { error_msg: message })
			.send()
			.await
			.map_err(|e| SdkError::Network(e.to_string()))?
			.error_for_status()
			.map_err(|e| SdkError::Network(e.to_string()))?;
		tracing::debug!("Audit webhook delivered");
		Ok(())
	}
}
