//! JSON-over-HTTP client used by plugins to reach web APIs.

use std::time::Duration;

use reqwest::{Client, ClientBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use chatbox_core::{TransportError, TransportResult};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A thin JSON client over `reqwest`.
///
/// Cloning shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct JsonClient {
    client: Client,
}

impl JsonClient {
    /// Creates a client with the default timeout.
    pub fn new() -> TransportResult<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Creates a client with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> TransportResult<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("chatbox/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(Self { client })
    }

    /// GETs `url` and decodes the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> TransportResult<T> {
        self.get_json_opt(url).await?.ok_or_else(|| {
            TransportError::Io(format!("HTTP request to {url} returned no content"))
        })
    }

    /// GETs `url`; `404` and `204` yield `None`.
    pub async fn get_json_opt<T: DeserializeOwned>(&self, url: &str) -> TransportResult<Option<T>> {
        trace!(url = %url, "HTTP GET");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        match resp.status() {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => return Ok(None),
            status if !status.is_success() => {
                let text = resp.text().await.unwrap_or_default();
                return Err(TransportError::Io(format!(
                    "HTTP {} error: {}",
                    status.as_u16(),
                    text
                )));
            }
            _ => {}
        }
        resp.json()
            .await
            .map(Some)
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    /// POSTs a JSON body and decodes the JSON response.
    ///
    /// Error statuses with a JSON body are decoded too; APIs that report
    /// failures in-band (`{"ok": false, ...}`) rely on this.
    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> TransportResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        trace!(url = %url, "HTTP POST");
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| {
            TransportError::Io(format!("HTTP {} error: {e}: {text}", status.as_u16()))
        })
    }
}
