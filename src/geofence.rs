use crate::entities::{Area, Geofence, GeoPoint};
use crate::error::Error;
use crate::store::DynGeofenceStore;

/// Resolves a point to the most specific administrative area governing it.
pub struct Resolver {
    store: DynGeofenceStore,
}

impl Resolver {
    pub fn new(store: DynGeofenceStore) -> Self {
        Self { store }
    }

    /// `Ok(None)` means no geofence covers the point. That is an expected
    /// outcome, not a failure; callers treat it as "no locality signal".
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, point: &GeoPoint) -> Result<Option<Area>, Error> {
        let candidates = self.store.find_containing(point).await?;

        for fence in containing_order(point, &candidates) {
            let area = self.store.get_area(fence.area_id).await?;

            if area.is_active {
                return Ok(Some(area));
            }

            tracing::warn!(area_id = %fence.area_id, "containing area is inactive, trying next");
        }

        Ok(None)
    }
}

/// Containing geofences in precedence order: smallest polygon first, so a
/// community nested inside a neighborhood wins over the neighborhood.
/// Equal coverage ties break by area id ascending to keep resolution
/// reproducible.
pub fn containing_order<'a>(point: &GeoPoint, candidates: &'a [Geofence]) -> Vec<&'a Geofence> {
    let mut hits: Vec<&Geofence> = candidates
        .iter()
        .filter(|fence| {
            if !fence.containment_eligible() {
                tracing::warn!(geofence_id = %fence.id, "skipping degraded geometry");
                return false;
            }

            fence.contains(point)
        })
        .collect();

    hits.sort_by(|a, b| {
        a.coverage()
            .total_cmp(&b.coverage())
            .then(a.area_id.cmp(&b.area_id))
    });

    hits
}

#[test]
fn nested_community_beats_neighborhood() {
    use crate::entities::{square, Confidence};
    use uuid::Uuid;

    let center = GeoPoint::new(-23.55, -46.63).unwrap();
    let neighborhood_id = Uuid::new_v4();
    let community_id = Uuid::new_v4();

    let neighborhood =
        Geofence::new(neighborhood_id, square(center, 0.05), Confidence::High).unwrap();
    let community = Geofence::new(community_id, square(center, 0.005), Confidence::High).unwrap();

    let fences = [neighborhood, community];
    let order = containing_order(&center, &fences);
    assert_eq!(order[0].area_id, community_id);
    assert_eq!(order[1].area_id, neighborhood_id);
}

#[test]
fn equal_coverage_breaks_ties_by_area_id() {
    use crate::entities::{square, Confidence};
    use uuid::Uuid;

    let center = GeoPoint::new(-23.55, -46.63).unwrap();
    let mut ids = [Uuid::new_v4(), Uuid::new_v4()];
    ids.sort();

    let a = Geofence::new(ids[1], square(center, 0.01), Confidence::High).unwrap();
    let b = Geofence::new(ids[0], square(center, 0.01), Confidence::Med).unwrap();

    let fences = [a, b];
    let order = containing_order(&center, &fences);
    assert_eq!(order[0].area_id, ids[0]);
}

#[test]
fn degraded_and_non_containing_candidates_are_skipped() {
    use crate::entities::{square, Confidence};
    use uuid::Uuid;

    let center = GeoPoint::new(-23.55, -46.63).unwrap();
    let far = GeoPoint::new(-23.95, -46.93).unwrap();

    let point_geom: geo_types::Geometry<f64> = geo_types::Point::new(center.lng, center.lat).into();
    let degraded = Geofence::new(Uuid::new_v4(), point_geom, Confidence::Low).unwrap();
    let elsewhere = Geofence::new(Uuid::new_v4(), square(far, 0.01), Confidence::High).unwrap();

    assert!(containing_order(&center, &[degraded, elsewhere]).is_empty());
}

#[test]
fn resolver_returns_none_without_coverage() {
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;
    use tokio_test::block_on;

    let store = Arc::new(MemoryStore::default());
    let resolver = Resolver::new(store);

    let resolved = block_on(resolver.resolve(&GeoPoint::new(-23.55, -46.63).unwrap())).unwrap();
    assert!(resolved.is_none());
}

#[test]
fn resolver_skips_inactive_areas() {
    use crate::entities::{square, Confidence};
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;
    use tokio_test::block_on;

    let center = GeoPoint::new(-23.55, -46.63).unwrap();
    let store = Arc::new(MemoryStore::default());

    let mut retired = Area::new("Comunidade Antiga".into(), None);
    retired.is_active = false;
    let active = Area::new("Vila Nova".into(), None);

    store.insert_geofence(
        Geofence::new(retired.id, square(center, 0.005), Confidence::High).unwrap(),
    );
    store.insert_geofence(
        Geofence::new(active.id, square(center, 0.05), Confidence::High).unwrap(),
    );
    let active_id = active.id;
    store.insert_area(retired);
    store.insert_area(active);

    let resolver = Resolver::new(store);
    let resolved = block_on(resolver.resolve(&center)).unwrap().unwrap();
    assert_eq!(resolved.id, active_id);
}
