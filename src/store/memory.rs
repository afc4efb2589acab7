use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::{
    Area, DriverBase, FavoriteLocation, FeatureFlag, Geofence, GeoPoint, Ride, Status,
};
use crate::error::{cas_conflict_error, not_found_error, Error};
use crate::store::{FlagStore, GeofenceStore, ProfileStore, RideStore};

/// Mutex-guarded implementation of all four store contracts, for tests and
/// local runs without Postgres. CAS holds the ride map lock for the whole
/// check-and-swap, which gives it the same single-winner guarantee the
/// conditional UPDATE gives the Postgres store.
#[derive(Default)]
pub struct MemoryStore {
    rides: Mutex<HashMap<Uuid, Ride>>,
    declines: Mutex<HashMap<Uuid, HashSet<Uuid>>>,
    geofences: Mutex<Vec<Geofence>>,
    areas: Mutex<HashMap<Uuid, Area>>,
    flags: Mutex<HashMap<String, FeatureFlag>>,
    favorites: Mutex<Vec<FavoriteLocation>>,
    bases: Mutex<HashMap<Uuid, DriverBase>>,
}

impl MemoryStore {
    pub fn insert_area(&self, area: Area) {
        self.areas.lock().unwrap().insert(area.id, area);
    }

    pub fn insert_geofence(&self, geofence: Geofence) {
        self.geofences.lock().unwrap().push(geofence);
    }

    pub fn upsert_flag(&self, flag: FeatureFlag) {
        self.flags.lock().unwrap().insert(flag.key.clone(), flag);
    }

    pub fn add_favorite(&self, favorite: FavoriteLocation) {
        self.favorites.lock().unwrap().push(favorite);
    }

    pub fn upsert_driver_base(&self, base: DriverBase) {
        self.bases.lock().unwrap().insert(base.driver_id, base);
    }
}

#[async_trait]
impl RideStore for MemoryStore {
    async fn create(&self, ride: &Ride) -> Result<(), Error> {
        self.rides.lock().unwrap().insert(ride.id, ride.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Ride, Error> {
        self.rides
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(not_found_error)
    }

    async fn cas(&self, id: Uuid, expected: Status, next: &Ride) -> Result<Ride, Error> {
        let mut rides = self.rides.lock().unwrap();
        let current = rides.get_mut(&id).ok_or_else(not_found_error)?;

        if current.status != expected {
            return Err(cas_conflict_error());
        }

        *current = next.clone();
        Ok(next.clone())
    }

    async fn record_decline(
        &self,
        ride_id: Uuid,
        driver_id: Uuid,
        _reason: &str,
    ) -> Result<bool, Error> {
        Ok(self
            .declines
            .lock()
            .unwrap()
            .entry(ride_id)
            .or_default()
            .insert(driver_id))
    }

    async fn declined_drivers(&self, ride_id: Uuid) -> Result<HashSet<Uuid>, Error> {
        Ok(self
            .declines
            .lock()
            .unwrap()
            .get(&ride_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl GeofenceStore for MemoryStore {
    async fn find_containing(&self, point: &GeoPoint) -> Result<Vec<Geofence>, Error> {
        Ok(self
            .geofences
            .lock()
            .unwrap()
            .iter()
            .filter(|fence| fence.bbox_contains(point))
            .cloned()
            .collect())
    }

    async fn get_area(&self, id: Uuid) -> Result<Area, Error> {
        self.areas
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(not_found_error)
    }

    async fn get_area_geometry(&self, area_id: Uuid) -> Result<Geofence, Error> {
        self.geofences
            .lock()
            .unwrap()
            .iter()
            .find(|fence| fence.area_id == area_id)
            .cloned()
            .ok_or_else(not_found_error)
    }
}

#[async_trait]
impl FlagStore for MemoryStore {
    async fn get_flag(&self, key: &str) -> Result<Option<FeatureFlag>, Error> {
        Ok(self.flags.lock().unwrap().get(key).cloned())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn favorites(&self, passenger_id: Uuid) -> Result<Vec<FavoriteLocation>, Error> {
        Ok(self
            .favorites
            .lock()
            .unwrap()
            .iter()
            .filter(|favorite| favorite.passenger_id == passenger_id)
            .cloned()
            .collect())
    }

    async fn driver_base(&self, driver_id: Uuid) -> Result<Option<DriverBase>, Error> {
        Ok(self.bases.lock().unwrap().get(&driver_id).cloned())
    }
}

#[test]
fn cas_rejects_stale_expected_status() {
    use crate::entities::{CreateRide, ServiceType};
    use crate::error::CAS_CONFLICT_CODE;
    use tokio_test::block_on;

    let store = MemoryStore::default();
    let ride = Ride::new(CreateRide {
        passenger_id: Uuid::new_v4(),
        pickup: GeoPoint::new(-23.55, -46.63).unwrap(),
        destination: GeoPoint::new(-23.56, -46.64).unwrap(),
        service_type: ServiceType::MotoTaxi,
        base_amount: 10.0,
        allow_external_drivers: true,
    });
    block_on(store.create(&ride)).unwrap();

    let mut accepted = ride.clone();
    accepted.accept(Uuid::new_v4()).unwrap();

    block_on(store.cas(ride.id, Status::Pending, &accepted)).unwrap();

    let mut second = ride.clone();
    second.accept(Uuid::new_v4()).unwrap();
    let err = block_on(store.cas(ride.id, Status::Pending, &second)).unwrap_err();
    assert_eq!(err.code, CAS_CONFLICT_CODE);

    let stored = block_on(store.get(ride.id)).unwrap();
    assert_eq!(stored.driver_id, accepted.driver_id);
}

#[test]
fn decline_recording_is_idempotent() {
    use tokio_test::block_on;

    let store = MemoryStore::default();
    let (ride_id, driver_id) = (Uuid::new_v4(), Uuid::new_v4());

    assert!(block_on(store.record_decline(ride_id, driver_id, "too far")).unwrap());
    assert!(!block_on(store.record_decline(ride_id, driver_id, "too far")).unwrap());

    let declined = block_on(store.declined_drivers(ride_id)).unwrap();
    assert_eq!(declined.len(), 1);
}
