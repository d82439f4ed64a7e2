//! Shared test utilities for unit and integration tests.
//!
//! Enabled under `#[cfg(test)]` or with the `testkit` feature.
//!
//! - [`backend`]: in-memory [`Backend`](crate::api::Backend) with call
//!   counters and injectable latency, failures, rejections and hangs.
//! - [`fixtures`]: entity builders, sample data and a ready-made store harness.

pub mod backend;
pub mod fixtures;

pub use backend::{MockBackend, MockResource, MockRow};
pub use fixtures::{eventually, settle, Harness};
