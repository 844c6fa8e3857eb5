//! Collectible resources scattered over a session's map.

use std::collections::HashSet;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// The closed set of resource types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Wood,
    Stone,
    Food,
}

impl ResourceKind {
    /// Every kind, in a fixed order.
    pub const ALL: [ResourceKind; 3] = [Self::Wood, Self::Stone, Self::Food];
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wood => write!(f, "wood"),
            Self::Stone => write!(f, "stone"),
            Self::Food => write!(f, "food"),
        }
    }
}

/// A resource placed on the map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Unique within its session.
    pub id: String,
    pub x: i64,
    pub y: i64,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
}

/// Places `count` resources uniformly over a `map_size` square map.
///
/// Ids are 32-character hex strings (128 random bits). A duplicate draw is
/// discarded and redrawn, so ids are unique within the returned set.
pub fn generate_resources<R: Rng>(
    rng: &mut R,
    count: usize,
    map_size: u32,
) -> Vec<Resource> {
    let max = i64::from(map_size);
    let mut seen = HashSet::with_capacity(count);
    let mut resources = Vec::with_capacity(count);

    while resources.len() < count {
        let id = random_id(rng);
        if !seen.insert(id.clone()) {
            continue;
        }
        let kind = ResourceKind::ALL[rng.random_range(0..ResourceKind::ALL.len())];
        resources.push(Resource {
            id,
            x: rng.random_range(0..=max),
            y: rng.random_range(0..=max),
            kind,
        });
    }

    resources
}

fn random_id<R: Rng>(rng: &mut R) -> String {
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_generate_exact_count_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let resources = generate_resources(&mut rng, 50, 1000);

        assert_eq!(resources.len(), 50);
        for r in &resources {
            assert!((0..=1000).contains(&r.x), "x out of bounds: {r:?}");
            assert!((0..=1000).contains(&r.y), "y out of bounds: {r:?}");
            assert_eq!(r.id.len(), 32);
        }
    }

    #[test]
    fn test_generate_ids_are_unique() {
        let mut rng = StdRng::seed_from_u64(42);
        let resources = generate_resources(&mut rng, 500, 10);
        let ids: HashSet<_> = resources.iter().map(|r| &r.id).collect();
        assert_eq!(ids.len(), resources.len());
    }

    #[test]
    fn test_generate_on_zero_size_map_pins_to_origin() {
        let mut rng = StdRng::seed_from_u64(1);
        let resources = generate_resources(&mut rng, 5, 0);
        assert!(resources.iter().all(|r| r.x == 0 && r.y == 0));
    }

    #[test]
    fn test_resource_wire_format_uses_type_key() {
        let r = Resource {
            id: "r1".into(),
            x: 1,
            y: 2,
            kind: ResourceKind::Stone,
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": "r1", "x": 1, "y": 2, "type": "stone"})
        );
    }
}
