//! Registry trait for self-registering implementations.
//!
//! Every pluggable implementation (price feeds, route services, execution
//! providers) exposes a `Registry` struct naming the configuration key it is
//! selected by and the factory that builds it.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation.
	///
	/// This matches the key under the `implementations` table, for example
	/// `"http"` for `price.implementations.http`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
