use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::GeoPoint;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FavoriteLocation {
    pub id: Uuid,
    pub passenger_id: Uuid,
    pub label: String,
    pub kind: FavoriteKind,
    pub location: GeoPoint,
}

// A passenger may keep several favorites of the same kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FavoriteKind {
    Home,
    Work,
    Other,
}

impl FavoriteLocation {
    pub fn new(passenger_id: Uuid, label: String, kind: FavoriteKind, location: GeoPoint) -> Self {
        Self {
            id: Uuid::new_v4(),
            passenger_id,
            label,
            kind,
            location,
        }
    }
}
