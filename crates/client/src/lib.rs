//! HTTP client code for glimmer.
//!
//! This crate provides the reqwest-backed [`glimmer_core::RemoteSource`]
//! used by the sync engine, together with locator canonicalization and the
//! collection service wire format.

pub mod locator;
pub mod remote;
pub mod wire;

pub use locator::canonicalize;
pub use remote::{HttpRemote, HttpRemoteConfig, classify_status};
pub use wire::ListingResponse;
