//! Web map and profile lookups.

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use chatbox_transport::JsonClient;

use crate::dynmap::model::{DynmapConfiguration, PlayerListing};
use crate::error::{SwitchcraftError, SwitchcraftResult};

pub const DEFAULT_DYNMAP_URL: &str = "https://dynmap.sc3.io";
pub const DEFAULT_PROFILE_URL: &str = "https://api.mojang.com";

/// The web map's update endpoints.
#[async_trait]
pub trait DynmapApi: Send + Sync {
    async fn configuration(&self) -> SwitchcraftResult<DynmapConfiguration>;

    /// Players as of now; `since` is the previous fetch in Unix seconds.
    async fn updates(&self, world: &str, since: u64) -> SwitchcraftResult<PlayerListing>;
}

/// Username to UUID lookups.
#[async_trait]
pub trait ProfileApi: Send + Sync {
    /// `Ok(None)` when no such user exists.
    async fn uuid_for(&self, username: &str) -> SwitchcraftResult<Option<String>>;
}

#[derive(Debug, Clone)]
pub struct DynmapClient {
    http: JsonClient,
    base_url: String,
}

impl DynmapClient {
    pub fn new(http: JsonClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl DynmapApi for DynmapClient {
    async fn configuration(&self) -> SwitchcraftResult<DynmapConfiguration> {
        let url = format!("{}/up/configuration", self.base_url);
        Ok(self.http.get_json(&url).await?)
    }

    async fn updates(&self, world: &str, since: u64) -> SwitchcraftResult<PlayerListing> {
        let url = format!("{}/up/world/{world}/{since}", self.base_url);
        Ok(self.http.get_json(&url).await?)
    }
}

#[derive(Debug, Deserialize)]
struct Profile {
    id: String,
}

/// Mojang profile API client.
#[derive(Debug, Clone)]
pub struct MojangClient {
    http: JsonClient,
    base_url: String,
}

impl MojangClient {
    pub fn new(http: JsonClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ProfileApi for MojangClient {
    async fn uuid_for(&self, username: &str) -> SwitchcraftResult<Option<String>> {
        let url = format!("{}/users/profiles/minecraft/{username}", self.base_url);
        let Some(profile) = self.http.get_json_opt::<Profile>(&url).await? else {
            return Ok(None);
        };
        hyphenate(&profile.id).map(Some)
    }
}

/// Normalises a profile id to the hyphenated form chat identities use.
pub fn hyphenate(id: &str) -> SwitchcraftResult<String> {
    Uuid::parse_str(id)
        .map(|uuid| uuid.hyphenated().to_string())
        .map_err(|e| SwitchcraftError::unexpected("profiles", format!("bad id {id:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hyphenate() {
        assert_eq!(
            hyphenate("069a79f444e94726a5befca90e38aaf5").unwrap(),
            "069a79f4-44e9-4726-a5be-fca90e38aaf5"
        );
        assert_eq!(
            hyphenate("069A79F4-44E9-4726-A5BE-FCA90E38AAF5").unwrap(),
            "069a79f4-44e9-4726-a5be-fca90e38aaf5"
        );
        assert!(hyphenate("notauuid").is_err());
    }
}
