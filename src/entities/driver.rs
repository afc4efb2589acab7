use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::GeoPoint;

/// A driver's registered operating base. The optional secondary base only
/// participates when `secondary_enabled` is set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverBase {
    pub driver_id: Uuid,
    pub primary: GeoPoint,
    pub secondary: Option<GeoPoint>,
    pub secondary_enabled: bool,
}

impl DriverBase {
    pub fn new(driver_id: Uuid, primary: GeoPoint) -> Self {
        Self {
            driver_id,
            primary,
            secondary: None,
            secondary_enabled: false,
        }
    }

    pub fn with_secondary(mut self, secondary: GeoPoint, enabled: bool) -> Self {
        self.secondary = Some(secondary);
        self.secondary_enabled = enabled;
        self
    }

    /// The base used for scoring against `target`: the enabled secondary base
    /// when it is strictly closer, the primary base otherwise.
    pub fn effective_base(&self, target: &GeoPoint) -> GeoPoint {
        match self.secondary {
            Some(secondary) if self.secondary_enabled => {
                if secondary.distance_m(target) < self.primary.distance_m(target) {
                    secondary
                } else {
                    self.primary
                }
            }
            _ => self.primary,
        }
    }
}

#[test]
fn secondary_base_only_when_enabled_and_closer() {
    let target = GeoPoint::new(0.0, 0.0).unwrap();
    let far = GeoPoint::new(1.0, 1.0).unwrap();
    let near = GeoPoint::new(0.001, 0.001).unwrap();

    let base = DriverBase::new(Uuid::new_v4(), far).with_secondary(near, true);
    assert_eq!(base.effective_base(&target), near);

    let disabled = DriverBase::new(Uuid::new_v4(), far).with_secondary(near, false);
    assert_eq!(disabled.effective_base(&target), far);

    let secondary_farther = DriverBase::new(Uuid::new_v4(), near).with_secondary(far, true);
    assert_eq!(secondary_farther.effective_base(&target), near);
}
