//! Dynmap, the server's web map, as a source of player positions.

pub mod api;
pub mod model;
pub mod store;
pub mod tracker;

pub use api::{
    DEFAULT_DYNMAP_URL, DEFAULT_PROFILE_URL, DynmapApi, DynmapClient, MojangClient, ProfileApi,
};
pub use model::{DynmapConfiguration, DynmapPlayer, DynmapWorld, PlayerListing};
pub use store::{StoreGuard, StoreHealth, TrackingData, TrackingStore};
pub use tracker::Tracker;
