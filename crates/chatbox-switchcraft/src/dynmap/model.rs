//! Dynmap response shapes. Fields the tracker does not use are ignored.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynmapWorld {
    /// Internal name used in update URLs.
    pub name: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
}

/// `/up/configuration`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynmapConfiguration {
    #[serde(default)]
    pub worlds: Vec<DynmapWorld>,
}

impl DynmapConfiguration {
    /// Whether `world` is one of the configured worlds. Players in other
    /// worlds have no usable position.
    pub fn has_world(&self, world: &str) -> bool {
        self.worlds.iter().any(|w| w.name == world)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynmapPlayer {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Minecraft username; absent for hidden players.
    #[serde(default)]
    pub account: Option<String>,
}

/// `/up/world/{world}/{since}`. The listing covers every world.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerListing {
    #[serde(default)]
    pub players: Vec<DynmapPlayer>,
}
