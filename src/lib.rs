//! Housing Desk - client-side data layer for tracking properties and the
//! people connected to them.
//!
//! The crate keeps four entity collections (properties, persons, the
//! connections between them, and links attached to properties) in a
//! central [`store::Store`]. The store is populated cache-first from a
//! versioned [`cache::PersistentCache`], then synchronized with a REST
//! backend through [`api::Backend`]. Concurrent reads of the same resource
//! share one network request via the [`ledger`], and filtered views are
//! re-derived by the pure pipelines in [`filters`].
//!
//! # Modules
//!
//! - [`api`] - Resource client trait and its reqwest implementation
//! - [`cache`] - Versioned, time-stamped key/value cache over file or memory storage
//! - [`clock`] - Time source used for cache stamping
//! - [`config`] - TOML configuration and logging setup
//! - [`error`] - Error types for the crate
//! - [`filters`] - Filter criteria and the property/person pipelines
//! - [`ledger`] - Request deduplication
//! - [`models`] - Entities, detail bundles and location handling
//! - [`store`] - Canonical state, loaders and mutations
//!
//! # Features
//!
//! - `testkit` - Mock backend and fixtures for integration tests

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod filters;
pub mod ledger;
pub mod models;
pub mod store;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
