//! REST API client module for the DojoFinder directory service.
//!
//! This module provides the `ApiClient` for fetching school listings,
//! nearby-school results, and student profile data.
//!
//! Requests carry the stored bearer token; an expired token is recovered
//! once per request through the session manager's refresh operation.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
