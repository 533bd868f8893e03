//! Krist node API.
//!
//! [`KristApi`] is the narrow surface the refund job needs; [`KristClient`]
//! implements it over HTTP.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use chatbox_transport::JsonClient;

use crate::error::{SwitchcraftError, SwitchcraftResult};

/// Default Krist node.
pub const DEFAULT_KRIST_URL: &str = "https://krist.dev";

/// How many recent transactions one lookup returns.
pub const LOOKUP_LIMIT: usize = 500;

/// One ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u64,
    /// `None` for mined coins.
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    pub value: u64,
    #[serde(default)]
    pub metadata: Option<String>,
}

/// Wallet operations against a Krist node.
#[async_trait]
pub trait KristApi: Send + Sync {
    /// The address owned by the configured private key.
    async fn address(&self) -> SwitchcraftResult<String>;

    /// The most recent transactions touching `address`, newest first.
    async fn recent_transactions(&self, address: &str) -> SwitchcraftResult<Vec<Transaction>>;

    /// Current balance of `address`.
    async fn balance(&self, address: &str) -> SwitchcraftResult<u64>;

    /// Sends `amount` to an address or `name.kst`.
    async fn send(&self, to: &str, amount: u64, metadata: &str) -> SwitchcraftResult<()>;
}

/// `{"ok": ..., "error": ..., "message": ...}` around every response.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(flatten)]
    body: Option<T>,
}

impl<T> Envelope<T> {
    fn into_body(self) -> SwitchcraftResult<T> {
        if !self.ok {
            return Err(SwitchcraftError::Krist {
                code: self.error.unwrap_or_else(|| "unknown_error".to_string()),
                message: self.message.unwrap_or_default(),
            });
        }
        self.body
            .ok_or_else(|| SwitchcraftError::unexpected("krist", "missing response body"))
    }
}

#[derive(Debug, Deserialize)]
struct AddressBody {
    address: String,
}

#[derive(Debug, Deserialize)]
struct AddressLookup {
    address: AddressInfo,
}

#[derive(Debug, Deserialize)]
struct AddressInfo {
    balance: u64,
}

#[derive(Debug, Deserialize)]
struct TransactionsBody {
    transactions: Vec<Transaction>,
}

#[derive(Debug, Deserialize)]
struct Empty {}

/// HTTP client for a Krist node, holding the wallet's private key.
#[derive(Clone)]
pub struct KristClient {
    http: JsonClient,
    base_url: String,
    private_key: String,
}

impl std::fmt::Debug for KristClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KristClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl KristClient {
    pub fn new(http: JsonClient, base_url: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            private_key: private_key.into(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> SwitchcraftResult<T> {
        let url = format!("{}{path}", self.base_url);
        let envelope: Envelope<T> = self.http.get_json(&url).await?;
        envelope.into_body()
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> SwitchcraftResult<T> {
        let url = format!("{}{path}", self.base_url);
        let envelope: Envelope<T> = self.http.post_json(&url, body).await?;
        envelope.into_body()
    }
}

#[async_trait]
impl KristApi for KristClient {
    async fn address(&self) -> SwitchcraftResult<String> {
        let body: AddressBody = self
            .post("/v2", &json!({ "privatekey": self.private_key }))
            .await?;
        Ok(body.address)
    }

    async fn recent_transactions(&self, address: &str) -> SwitchcraftResult<Vec<Transaction>> {
        let body: TransactionsBody = self
            .get(&format!(
                "/lookup/transactions/{address}?order=DESC&limit={LOOKUP_LIMIT}"
            ))
            .await?;
        debug!(address, count = body.transactions.len(), "Fetched transactions");
        Ok(body.transactions)
    }

    async fn balance(&self, address: &str) -> SwitchcraftResult<u64> {
        let body: AddressLookup = self.get(&format!("/addresses/{address}")).await?;
        Ok(body.address.balance)
    }

    async fn send(&self, to: &str, amount: u64, metadata: &str) -> SwitchcraftResult<()> {
        let _: Empty = self
            .post(
                "/transactions",
                &json!({
                    "privatekey": self.private_key,
                    "to": to,
                    "amount": amount,
                    "metadata": metadata,
                }),
            )
            .await?;
        Ok(())
    }
}
