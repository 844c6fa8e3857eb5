//! Per-player state.

use std::hash::{DefaultHasher, Hash, Hasher};

use outpost_protocol::PlayerId;
use serde::{Deserialize, Serialize};

/// Health a player joins with.
pub const DEFAULT_HEALTH: u32 = 100;

/// Hunger a player joins with.
pub const DEFAULT_HUNGER: u32 = 100;

/// The authoritative state of one player in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub x: i64,
    pub y: i64,
    pub health: u32,
    pub hunger: u32,
    /// Item ids, in the order they were picked up.
    pub inventory: Vec<String>,
    /// CSS color used to draw the player.
    pub color: String,
}

impl PlayerState {
    /// A fresh player at `(x, y)` with full health and hunger.
    pub fn spawn(player_id: &PlayerId, x: i64, y: i64) -> Self {
        Self {
            x,
            y,
            health: DEFAULT_HEALTH,
            hunger: DEFAULT_HUNGER,
            inventory: Vec::new(),
            color: color_for(player_id),
        }
    }
}

/// Derives a display color from a player id.
///
/// The same id always maps to the same hue within a process run.
pub fn color_for(player_id: &PlayerId) -> String {
    let mut hasher = DefaultHasher::new();
    player_id.as_str().hash(&mut hasher);
    let hue = hasher.finish() % 360;
    format!("hsl({hue}, 100%, 50%)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_is_stable_for_same_id() {
        let a = color_for(&PlayerId::from("p1"));
        let b = color_for(&PlayerId::from("p1"));
        assert_eq!(a, b);
        assert!(a.starts_with("hsl(") && a.ends_with(", 100%, 50%)"));
    }

    #[test]
    fn test_color_hue_in_range() {
        for name in ["a", "b", "alice", "bob", "p-999"] {
            let color = color_for(&PlayerId::from(name));
            let hue: u32 = color
                .trim_start_matches("hsl(")
                .split(',')
                .next()
                .unwrap()
                .parse()
                .unwrap();
            assert!(hue < 360, "{color}");
        }
    }

    #[test]
    fn test_spawn_has_full_stats_and_empty_inventory() {
        let p = PlayerState::spawn(&PlayerId::from("p1"), 5, 6);
        assert_eq!((p.x, p.y), (5, 6));
        assert_eq!(p.health, DEFAULT_HEALTH);
        assert_eq!(p.hunger, DEFAULT_HUNGER);
        assert!(p.inventory.is_empty());
    }
}
