use std::sync::Arc;

use uuid::Uuid;

use crate::entities::{DriverBase, FavoriteLocation, GeoPoint};
use crate::error::Error;
use crate::flags::RolloutGate;
use crate::store::DynProfileStore;

pub const FAVORITES_MATCHING_FLAG: &str = "favorites_matching";

/// A favorite qualifies as the ranking anchor when it sits within this many
/// meters of the pickup point.
pub const ANCHOR_RADIUS_M: f64 = 400.0;

/// Ranks candidate drivers for a pickup, biased toward the passenger's
/// nearby favorite location when the rollout gate allows it.
pub struct Ranker {
    gate: Arc<RolloutGate>,
    profiles: DynProfileStore,
}

impl Ranker {
    pub fn new(gate: Arc<RolloutGate>, profiles: DynProfileStore) -> Self {
        Self { gate, profiles }
    }

    /// With the flag off the input order is returned untouched. That is the
    /// regression-safety contract for the rollout.
    #[tracing::instrument(skip(self, drivers))]
    pub async fn rank(
        &self,
        drivers: Vec<DriverBase>,
        passenger_id: Uuid,
        pickup: &GeoPoint,
    ) -> Result<Vec<DriverBase>, Error> {
        let enabled = self
            .gate
            .is_enabled(FAVORITES_MATCHING_FLAG, &passenger_id.to_string())
            .await?;

        if !enabled {
            return Ok(drivers);
        }

        let favorites = self.profiles.favorites(passenger_id).await?;

        Ok(rank_with_favorites(drivers, &favorites, pickup))
    }
}

/// The nearest favorite within [`ANCHOR_RADIUS_M`] of the pickup, if any.
pub fn find_anchor<'a>(
    favorites: &'a [FavoriteLocation],
    pickup: &GeoPoint,
) -> Option<&'a FavoriteLocation> {
    favorites
        .iter()
        .map(|favorite| (favorite, favorite.location.distance_m(pickup)))
        .filter(|(_, distance)| *distance <= ANCHOR_RADIUS_M)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(favorite, _)| favorite)
}

/// Lower is better. The pickup term always applies; the anchor term only
/// when an anchor exists, so rides far from every favorite score exactly as
/// they would with no favorites at all.
pub fn score(base: &DriverBase, pickup: &GeoPoint, anchor: Option<&GeoPoint>) -> u32 {
    let target = anchor.unwrap_or(pickup);
    let effective = base.effective_base(target);

    let pickup_term = match effective.distance_m(pickup) {
        d if d <= 1000.0 => 0,
        d if d <= 3000.0 => 2,
        _ => 5,
    };

    let anchor_term = match anchor {
        None => 0,
        Some(anchor) => match effective.distance_m(anchor) {
            d if d <= 800.0 => 0,
            d if d <= 2000.0 => 5,
            _ => 15,
        },
    };

    pickup_term + anchor_term
}

/// Stable ascending sort by score: equally-scored drivers keep their
/// baseline order.
pub fn rank_with_favorites(
    mut drivers: Vec<DriverBase>,
    favorites: &[FavoriteLocation],
    pickup: &GeoPoint,
) -> Vec<DriverBase> {
    let anchor = find_anchor(favorites, pickup).map(|favorite| favorite.location);

    drivers.sort_by_key(|driver| score(driver, pickup, anchor.as_ref()));
    drivers
}

#[cfg(test)]
fn favorite_at(passenger_id: Uuid, point: GeoPoint) -> FavoriteLocation {
    use crate::entities::FavoriteKind;

    FavoriteLocation::new(passenger_id, "casa".into(), FavoriteKind::Home, point)
}

#[test]
fn anchor_is_nearest_favorite_within_radius() {
    let passenger = Uuid::new_v4();
    let pickup = GeoPoint::new(-23.5510, -46.6338).unwrap();

    let near = favorite_at(passenger, GeoPoint::new(-23.5505, -46.6333).unwrap());
    let nearer = favorite_at(passenger, GeoPoint::new(-23.5509, -46.6337).unwrap());
    let distant = favorite_at(passenger, GeoPoint::new(-23.5805, -46.6633).unwrap());

    let favorites = vec![near, distant.clone(), nearer.clone()];
    assert_eq!(find_anchor(&favorites, &pickup).unwrap().id, nearer.id);

    assert!(find_anchor(&[distant], &pickup).is_none());
}

#[test]
fn anchor_proximity_outranks_distance() {
    // literal case: driver A ~300m from the anchor, driver B ~3km away
    let pickup = GeoPoint::new(-23.5510, -46.6338).unwrap();
    let passenger = Uuid::new_v4();
    let anchor = favorite_at(passenger, GeoPoint::new(-23.5505, -46.6333).unwrap());

    let driver_a = DriverBase::new(Uuid::new_v4(), GeoPoint::new(-23.5515, -46.6343).unwrap());
    let driver_b = DriverBase::new(Uuid::new_v4(), GeoPoint::new(-23.5805, -46.6633).unwrap());
    let a_id = driver_a.driver_id;
    let b_id = driver_b.driver_id;

    let ranked = rank_with_favorites(vec![driver_b, driver_a], &[anchor], &pickup);
    assert_eq!(ranked[0].driver_id, a_id);
    assert_eq!(ranked[1].driver_id, b_id);
}

#[test]
fn no_anchor_falls_back_to_pickup_terms_only() {
    let pickup = GeoPoint::new(-23.5510, -46.6338).unwrap();

    let close = DriverBase::new(Uuid::new_v4(), GeoPoint::new(-23.5515, -46.6343).unwrap());
    let far = DriverBase::new(Uuid::new_v4(), GeoPoint::new(-23.5805, -46.6633).unwrap());

    assert_eq!(score(&close, &pickup, None), 0);
    assert_eq!(score(&far, &pickup, None), 5);

    // same scores as an empty-favorites ranking
    let close_id = close.driver_id;
    let ranked = rank_with_favorites(vec![far, close], &[], &pickup);
    assert_eq!(ranked[0].driver_id, close_id);
}

#[test]
fn equal_scores_keep_baseline_order() {
    let pickup = GeoPoint::new(-23.5510, -46.6338).unwrap();

    let first = DriverBase::new(Uuid::new_v4(), GeoPoint::new(-23.5512, -46.6340).unwrap());
    let second = DriverBase::new(Uuid::new_v4(), GeoPoint::new(-23.5508, -46.6336).unwrap());
    let (first_id, second_id) = (first.driver_id, second.driver_id);

    let ranked = rank_with_favorites(vec![first, second], &[], &pickup);
    assert_eq!(ranked[0].driver_id, first_id);
    assert_eq!(ranked[1].driver_id, second_id);
}

#[test]
fn enabled_secondary_base_improves_score() {
    let pickup = GeoPoint::new(-23.5510, -46.6338).unwrap();
    let passenger = Uuid::new_v4();
    let anchor = favorite_at(passenger, GeoPoint::new(-23.5505, -46.6333).unwrap());
    let anchor_point = anchor.location;

    let far_primary = GeoPoint::new(-23.5805, -46.6633).unwrap();
    let near_secondary = GeoPoint::new(-23.5512, -46.6340).unwrap();

    let with_secondary = DriverBase::new(Uuid::new_v4(), far_primary)
        .with_secondary(near_secondary, true);
    let without = DriverBase::new(Uuid::new_v4(), far_primary);

    assert_eq!(score(&with_secondary, &pickup, Some(&anchor_point)), 0);
    assert_eq!(score(&without, &pickup, Some(&anchor_point)), 20);
}

#[test]
fn flag_off_returns_input_order_unchanged() {
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;
    use tokio_test::block_on;

    let store = Arc::new(MemoryStore::default());
    let gate = Arc::new(RolloutGate::new(store.clone()));
    let ranker = Ranker::new(gate, store.clone());

    let pickup = GeoPoint::new(-23.5510, -46.6338).unwrap();
    let passenger = Uuid::new_v4();
    store.add_favorite(favorite_at(
        passenger,
        GeoPoint::new(-23.5505, -46.6333).unwrap(),
    ));

    // worst-ranked driver first on purpose
    let far = DriverBase::new(Uuid::new_v4(), GeoPoint::new(-23.5805, -46.6633).unwrap());
    let near = DriverBase::new(Uuid::new_v4(), GeoPoint::new(-23.5515, -46.6343).unwrap());
    let input_order: Vec<Uuid> = vec![far.driver_id, near.driver_id];

    let ranked = block_on(ranker.rank(vec![far, near], passenger, &pickup)).unwrap();
    let ranked_ids: Vec<Uuid> = ranked.iter().map(|d| d.driver_id).collect();
    assert_eq!(ranked_ids, input_order);
}

#[test]
fn flag_on_applies_anchor_scoring() {
    use crate::entities::FeatureFlag;
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;
    use tokio_test::block_on;

    let store = Arc::new(MemoryStore::default());
    store.upsert_flag(FeatureFlag::new(FAVORITES_MATCHING_FLAG.into(), true, 100));
    let gate = Arc::new(RolloutGate::new(store.clone()));
    let ranker = Ranker::new(gate, store.clone());

    let pickup = GeoPoint::new(-23.5510, -46.6338).unwrap();
    let passenger = Uuid::new_v4();
    store.add_favorite(favorite_at(
        passenger,
        GeoPoint::new(-23.5505, -46.6333).unwrap(),
    ));

    let far = DriverBase::new(Uuid::new_v4(), GeoPoint::new(-23.5805, -46.6633).unwrap());
    let near = DriverBase::new(Uuid::new_v4(), GeoPoint::new(-23.5515, -46.6343).unwrap());
    let near_id = near.driver_id;

    let ranked = block_on(ranker.rank(vec![far, near], passenger, &pickup)).unwrap();
    assert_eq!(ranked[0].driver_id, near_id);
}
