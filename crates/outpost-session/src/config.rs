//! Session configuration.

use serde::{Deserialize, Serialize};

/// Where new players appear on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpawnPoint {
    /// The middle of the map, `(size / 2, size / 2)`.
    #[default]
    Center,
    /// The top-left corner, `(0, 0)`.
    Origin,
}

impl SpawnPoint {
    /// Returns the spawn coordinates on a map of side `map_size`.
    pub fn position(self, map_size: u32) -> (i64, i64) {
        match self {
            Self::Center => {
                let half = i64::from(map_size / 2);
                (half, half)
            }
            Self::Origin => (0, 0),
        }
    }
}

/// Configuration applied to every session when it is created.
///
/// A session keeps the values it was created with for its whole life.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Side length of the square map. Coordinates range over `0..=map_size`.
    pub map_size: u32,

    /// Number of resources scattered over the map at creation.
    pub resource_count: usize,

    /// Where players appear when they join.
    pub spawn: SpawnPoint,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            map_size: 1000,
            resource_count: 50,
            spawn: SpawnPoint::Center,
        }
    }
}
