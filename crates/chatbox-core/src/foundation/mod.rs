//! Foundation layer - the data model.
//!
//! - Identities and the per-session roster
//! - Inbound events, decoded once at the frame boundary
//! - Outbound frames written by handlers and jobs

pub mod event;
pub mod frame;
pub mod identity;

pub use event::{CommandInvocation, Event};
pub use frame::{OutboundFrame, TellMode};
pub use identity::{Identity, Roster};
