use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An administrative region (neighborhood or community). Communities may be
/// nested inside a neighborhood via `parent_id`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Area {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub is_active: bool,
}

impl Area {
    pub fn new(name: String, parent_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            parent_id,
            is_active: true,
        }
    }

    /// Same area, or one is the direct parent of the other. Nested membership
    /// counts as "inside" for fee and locality checks.
    pub fn is_nested_with(&self, other: &Area) -> bool {
        self.id == other.id
            || self.parent_id == Some(other.id)
            || other.parent_id == Some(self.id)
    }
}

#[test]
fn nesting_relation() {
    let neighborhood = Area::new("Vila Esperança".into(), None);
    let community = Area::new("Morro Azul".into(), Some(neighborhood.id));
    let elsewhere = Area::new("Centro".into(), None);

    assert!(community.is_nested_with(&neighborhood));
    assert!(neighborhood.is_nested_with(&community));
    assert!(community.is_nested_with(&community));
    assert!(!community.is_nested_with(&elsewhere));
}
