//! Transport seams.
//!
//! Concrete transports live in `chatbox-transport`; this module only defines
//! what the engine needs from them.

pub mod connection;

pub use connection::{
    BoxedConnection, Connection, ConnectionHandle, Connector, OutboundReceiver, Received,
};
