use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::{CreateRide, DriverBase, Geofence, Ride};
use crate::error::Error;

#[async_trait]
pub trait RideAPI {
    async fn create_ride(&self, params: CreateRide) -> Result<Ride, Error>;

    async fn find_ride(&self, id: Uuid) -> Result<Ride, Error>;

    /// Offer order for a pending ride: candidate drivers minus prior
    /// declines, ranked by the favorites matcher.
    async fn rank_candidates(&self, id: Uuid, drivers: Vec<Uuid>) -> Result<Vec<DriverBase>, Error>;

    async fn accept_ride(&self, id: Uuid, driver_id: Uuid) -> Result<Ride, Error>;

    /// Returns false when the decline had already been recorded.
    async fn decline_ride(&self, id: Uuid, driver_id: Uuid, reason: &str) -> Result<bool, Error>;

    async fn start_ride(&self, id: Uuid, driver_id: Uuid) -> Result<Ride, Error>;

    async fn complete_ride(
        &self,
        id: Uuid,
        driver_id: Uuid,
        final_amount: Option<f64>,
    ) -> Result<Ride, Error>;

    async fn cancel_ride(&self, id: Uuid, actor_id: Uuid, reason: &str) -> Result<Ride, Error>;
}

#[async_trait]
pub trait AdminAPI {
    /// Propagates a flag update into this process; see `flags::RolloutGate`.
    async fn invalidate_flag(&self, key: &str) -> Result<(), Error>;

    /// The stored boundary for an area, for the manual verification workflow.
    async fn area_geofence(&self, area_id: Uuid) -> Result<Geofence, Error>;
}

pub trait API: RideAPI + AdminAPI {}

pub type DynAPI = Arc<dyn API + Send + Sync>;
