//! WebSocket transport.
//!
//! This module provides the WebSocket client connection.

mod client;
pub use client::{WsConnection, WsConnector, redact};
