use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Area, GeoPoint};
use crate::error::Error;
use crate::geofence::Resolver;
use crate::store::DynProfileStore;

/// Discounted platform fee for rides picked up inside the driver's home area.
pub const SAME_AREA_FEE_PCT: f64 = 7.0;

/// Default fee. Also the fallback when geofence data cannot place either
/// side: absence of data never grants the discount.
pub const DEFAULT_FEE_PCT: f64 = 20.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    SameArea,
    CrossArea,
    NoGeofenceData,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub match_type: MatchType,
    pub fee_percentage: f64,
    pub fee_amount: f64,
    pub driver_earnings: f64,
    /// Which rule fired, for audit and debugging only.
    pub reason: String,
}

/// Computes the platform fee for a ride as a function of geofence locality.
pub struct FeeCalculator {
    resolver: Arc<Resolver>,
    profiles: DynProfileStore,
}

impl FeeCalculator {
    pub fn new(resolver: Arc<Resolver>, profiles: DynProfileStore) -> Self {
        Self { resolver, profiles }
    }

    #[tracing::instrument(skip(self))]
    pub async fn calculate(
        &self,
        driver_id: Uuid,
        pickup: &GeoPoint,
        destination: &GeoPoint,
        fare_amount: f64,
    ) -> Result<FeeBreakdown, Error> {
        let base = self.profiles.driver_base(driver_id).await?;

        let (pickup_area, driver_area) = match &base {
            Some(base) => {
                futures::try_join!(self.resolver.resolve(pickup), self.resolver.resolve(&base.primary))?
            }
            // a driver with no registered base gets the no-data fallback,
            // same as a base outside all geofences
            None => (self.resolver.resolve(pickup).await?, None),
        };

        Ok(breakdown(driver_area.as_ref(), pickup_area.as_ref(), fare_amount))
    }
}

pub fn breakdown(
    driver_area: Option<&Area>,
    pickup_area: Option<&Area>,
    fare_amount: f64,
) -> FeeBreakdown {
    let (match_type, fee_percentage, reason) = match (driver_area, pickup_area) {
        (Some(driver), Some(pickup)) if driver.is_nested_with(pickup) => (
            MatchType::SameArea,
            SAME_AREA_FEE_PCT,
            format!(
                "pickup area '{}' matches driver base area '{}'",
                pickup.name, driver.name
            ),
        ),
        (Some(driver), Some(pickup)) => (
            MatchType::CrossArea,
            DEFAULT_FEE_PCT,
            format!(
                "pickup area '{}' is outside driver base area '{}'",
                pickup.name, driver.name
            ),
        ),
        _ => (
            MatchType::NoGeofenceData,
            DEFAULT_FEE_PCT,
            "no geofence coverage for pickup or driver base, default fee applied".into(),
        ),
    };

    let fee_amount = fare_amount * fee_percentage / 100.0;
    let driver_earnings = fare_amount - fee_amount;

    FeeBreakdown {
        match_type,
        fee_percentage,
        fee_amount,
        driver_earnings,
        reason,
    }
}

#[test]
fn same_area_gets_discounted_fee() {
    let area = Area::new("Morro Azul".into(), None);

    let result = breakdown(Some(&area), Some(&area), 30.0);
    assert_eq!(result.match_type, MatchType::SameArea);
    assert_eq!(result.fee_percentage, SAME_AREA_FEE_PCT);
    assert_eq!(result.fee_amount, 2.1);
    assert_eq!(result.fee_amount + result.driver_earnings, 30.0);
}

#[test]
fn nested_area_counts_as_same() {
    let neighborhood = Area::new("Vila Esperança".into(), None);
    let community = Area::new("Morro Azul".into(), Some(neighborhood.id));

    let result = breakdown(Some(&community), Some(&neighborhood), 30.0);
    assert_eq!(result.match_type, MatchType::SameArea);

    let result = breakdown(Some(&neighborhood), Some(&community), 30.0);
    assert_eq!(result.match_type, MatchType::SameArea);
}

#[test]
fn cross_area_pays_default_fee() {
    let home = Area::new("Morro Azul".into(), None);
    let elsewhere = Area::new("Centro".into(), None);

    let result = breakdown(Some(&home), Some(&elsewhere), 30.0);
    assert_eq!(result.match_type, MatchType::CrossArea);
    assert_eq!(result.fee_percentage, DEFAULT_FEE_PCT);
    assert_eq!(result.fee_amount + result.driver_earnings, 30.0);
}

#[test]
fn missing_resolution_never_grants_the_discount() {
    let area = Area::new("Morro Azul".into(), None);

    for (driver, pickup) in [
        (None, Some(&area)),
        (Some(&area), None),
        (None, None),
    ] {
        let result = breakdown(driver, pickup, 30.0);
        assert_eq!(result.match_type, MatchType::NoGeofenceData);
        assert_eq!(result.fee_percentage, DEFAULT_FEE_PCT);
    }
}

#[test]
fn fee_symmetry_inside_vs_outside() {
    use crate::entities::{square, Confidence, DriverBase, Geofence};
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;
    use tokio_test::block_on;

    let inside = GeoPoint::new(-23.55, -46.63).unwrap();
    let outside = GeoPoint::new(-23.95, -46.93).unwrap();

    let store = Arc::new(MemoryStore::default());
    let area = Area::new("Morro Azul".into(), None);
    let other = Area::new("Centro".into(), None);
    store.insert_geofence(
        Geofence::new(area.id, square(inside, 0.02), Confidence::High).unwrap(),
    );
    store.insert_geofence(
        Geofence::new(other.id, square(outside, 0.02), Confidence::High).unwrap(),
    );
    store.insert_area(area);
    store.insert_area(other);

    let driver_id = Uuid::new_v4();
    store.upsert_driver_base(DriverBase::new(driver_id, inside));

    let resolver = Arc::new(Resolver::new(store.clone()));
    let calculator = FeeCalculator::new(resolver, store);

    let local = block_on(calculator.calculate(driver_id, &inside, &outside, 40.0)).unwrap();
    assert_eq!(local.fee_percentage, SAME_AREA_FEE_PCT);
    assert_eq!(local.fee_amount + local.driver_earnings, 40.0);

    let away = block_on(calculator.calculate(driver_id, &outside, &inside, 40.0)).unwrap();
    assert_eq!(away.match_type, MatchType::CrossArea);
    assert_eq!(away.fee_percentage, DEFAULT_FEE_PCT);
    assert_eq!(away.fee_amount + away.driver_earnings, 40.0);
}

#[test]
fn unregistered_driver_base_falls_back() {
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;
    use tokio_test::block_on;

    let store = Arc::new(MemoryStore::default());
    let resolver = Arc::new(Resolver::new(store.clone()));
    let calculator = FeeCalculator::new(resolver, store);

    let pickup = GeoPoint::new(-23.55, -46.63).unwrap();
    let destination = GeoPoint::new(-23.56, -46.64).unwrap();

    let result =
        block_on(calculator.calculate(Uuid::new_v4(), &pickup, &destination, 25.0)).unwrap();
    assert_eq!(result.match_type, MatchType::NoGeofenceData);
    assert_eq!(result.fee_percentage, DEFAULT_FEE_PCT);
}
