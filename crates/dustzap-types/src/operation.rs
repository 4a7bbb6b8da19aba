//! Wallet call descriptors.

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// A single call executed by the wallet layer.
///
/// The engine never inspects the payload of an operation. It only counts,
/// slices and concatenates ordered sequences of them, so the type exposes
/// no mutators once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operation {
	/// Target contract or account.
	pub to: Address,
	/// Native value attached to the call, in wei.
	#[serde(default)]
	pub value: U256,
	/// ABI-encoded calldata.
	#[serde(default)]
	pub data: Bytes,
}

impl Operation {
	/// Creates a call with calldata and native value.
	pub fn new(to: Address, value: U256, data: impl Into<Bytes>) -> Self {
		Self {
			to,
			value,
			data: data.into(),
		}
	}

	/// Creates a call without native value.
	pub fn call(to: Address, data: impl Into<Bytes>) -> Self {
		Self::new(to, U256::ZERO, data)
	}
}
