//! fxconv library
//!
//! Rate caching, connectivity-driven mode control and the conversion flow,
//! exposed for the `fxconv` binary and for integration tests.

pub mod cache;
pub mod cli;
pub mod connectivity;
pub mod converter;
pub mod data;
pub mod history;
