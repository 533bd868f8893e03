//! # Chatbox Transport
//!
//! Network transports for the chatbox client.
//!
//! This crate provides concrete implementations of the connection seams
//! defined in `chatbox-core`, plus the HTTP client plugins use for web APIs.
//! Each transport is behind a feature flag.
//!
//! ## Features
//!
//! - `ws-client` (default): WebSocket [`Connector`](chatbox_core::Connector)
//! - `http-client`: JSON-over-HTTP client
//! - `full`: all transports
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  chatbox-runtime    │  (supervisor, session loop)
//! ├─────────────────────┤
//! │  chatbox-core       │  (Connection / Connector seams)
//! ├─────────────────────┤
//! │  chatbox-transport  │  <- This crate (implementations)
//! ├─────────────────────┤
//! │  Network (TCP/TLS)  │
//! └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chatbox_core::{Connector, Received};
//! use chatbox_transport::WsConnector;
//!
//! let connector = WsConnector::new("wss://chat.sc3.io/v2/<token>");
//! let mut conn = connector.connect().await?;
//! match conn.recv(Duration::from_secs(1)).await? {
//!     Received::Frame(raw) => println!("{raw}"),
//!     Received::Idle => {}
//! }
//! ```

// Transport implementations (feature-gated)
#[cfg(feature = "http-client")]
pub mod http;

#[cfg(feature = "ws-client")]
pub mod websocket;

#[cfg(feature = "http-client")]
pub use http::JsonClient;

#[cfg(feature = "ws-client")]
pub use websocket::{WsConnection, WsConnector};
