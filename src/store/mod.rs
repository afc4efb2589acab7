pub mod memory;
pub mod postgres;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::{Area, DriverBase, FavoriteLocation, FeatureFlag, Geofence, GeoPoint, Ride, Status};
use crate::error::Error;

/// Owner of all ride state. Transitions go through `cas`, a conditional
/// update that succeeds only when the ride is still in the expected status.
/// Atomicity lives here, never in process-level locks, because multiple
/// service instances race against the same store.
#[async_trait]
pub trait RideStore {
    async fn create(&self, ride: &Ride) -> Result<(), Error>;

    async fn get(&self, id: Uuid) -> Result<Ride, Error>;

    /// Atomically replaces the ride iff its current status equals `expected`.
    /// A mismatch yields a CAS-conflict error; callers decide whether that
    /// means a lost offer race or a plain stale request. No retry loop.
    async fn cas(&self, id: Uuid, expected: Status, next: &Ride) -> Result<Ride, Error>;

    /// Records a driver's decline. Returns false when it was already
    /// recorded, which callers treat as a benign no-op.
    async fn record_decline(&self, ride_id: Uuid, driver_id: Uuid, reason: &str)
        -> Result<bool, Error>;

    async fn declined_drivers(&self, ride_id: Uuid) -> Result<HashSet<Uuid>, Error>;
}

/// Read-only reference data maintained by out-of-scope import workflows.
#[async_trait]
pub trait GeofenceStore {
    /// Candidates whose bounding box contains the point. Exact containment
    /// is the resolver's job.
    async fn find_containing(&self, point: &GeoPoint) -> Result<Vec<Geofence>, Error>;

    async fn get_area(&self, id: Uuid) -> Result<Area, Error>;

    async fn get_area_geometry(&self, area_id: Uuid) -> Result<Geofence, Error>;
}

#[async_trait]
pub trait FlagStore {
    async fn get_flag(&self, key: &str) -> Result<Option<FeatureFlag>, Error>;
}

#[async_trait]
pub trait ProfileStore {
    async fn favorites(&self, passenger_id: Uuid) -> Result<Vec<FavoriteLocation>, Error>;

    async fn driver_base(&self, driver_id: Uuid) -> Result<Option<DriverBase>, Error>;
}

pub type DynRideStore = Arc<dyn RideStore + Send + Sync>;
pub type DynGeofenceStore = Arc<dyn GeofenceStore + Send + Sync>;
pub type DynFlagStore = Arc<dyn FlagStore + Send + Sync>;
pub type DynProfileStore = Arc<dyn ProfileStore + Send + Sync>;
