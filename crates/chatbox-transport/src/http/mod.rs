//! HTTP transport.
//!
//! This module provides the JSON client plugins use to reach web APIs.

mod client;
pub use client::{DEFAULT_TIMEOUT, JsonClient};
