//! `procd-client` -- REST client for the processing API.
//!
//! Provides [`ApiClient`], the HTTP implementation of
//! [`procd_core::JobSource`].

pub mod api;

pub use api::{ApiClient, ApiError};
