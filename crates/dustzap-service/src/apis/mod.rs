//! HTTP API handlers.

pub mod conversion;
