//! Krist, the server's currency ledger.

pub mod api;
pub mod kauth;
pub mod meta;

pub use api::{DEFAULT_KRIST_URL, KristApi, KristClient, Transaction};
pub use kauth::{KauthJob, Reconciliation, Refund, refund_target};
pub use meta::{CommonMeta, KristName};
