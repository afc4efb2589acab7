use axum::extract::{Extension, Json, Path};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::DynAPI;
use crate::entities::{CreateRide, DriverBase, GeoPoint, Ride, ServiceType};
use crate::error::Error;

#[derive(Deserialize)]
pub struct CreateParams {
    passenger_id: Uuid,
    pickup_lat: f64,
    pickup_lng: f64,
    destination_lat: f64,
    destination_lng: f64,
    service_type: ServiceType,
    base_amount: f64,
    #[serde(default)]
    allow_external_drivers: bool,
}

// Update payloads reject unknown fields so ride settings like
// allow_external_drivers cannot be smuggled in after creation.

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverParams {
    driver_id: Uuid,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeclineParams {
    driver_id: Uuid,
    reason: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompleteParams {
    driver_id: Uuid,
    final_amount: Option<f64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelParams {
    actor_id: Uuid,
    reason: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CandidateParams {
    driver_ids: Vec<Uuid>,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    Json(params): Json<CreateParams>,
) -> Result<Json<Ride>, Error> {
    let ride = api
        .create_ride(CreateRide {
            passenger_id: params.passenger_id,
            pickup: GeoPoint::new(params.pickup_lat, params.pickup_lng)?,
            destination: GeoPoint::new(params.destination_lat, params.destination_lng)?,
            service_type: params.service_type,
            base_amount: params.base_amount,
            allow_external_drivers: params.allow_external_drivers,
        })
        .await?;

    Ok(ride.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, Error> {
    let ride = api.find_ride(id).await?;

    Ok(ride.into())
}

pub async fn rank_candidates(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<Uuid>,
    Json(params): Json<CandidateParams>,
) -> Result<Json<Vec<DriverBase>>, Error> {
    let ranked = api.rank_candidates(id, params.driver_ids).await?;

    Ok(ranked.into())
}

pub async fn accept(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<Uuid>,
    Json(params): Json<DriverParams>,
) -> Result<Json<Ride>, Error> {
    let ride = api.accept_ride(id, params.driver_id).await?;

    Ok(ride.into())
}

pub async fn decline(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<Uuid>,
    Json(params): Json<DeclineParams>,
) -> Result<Json<bool>, Error> {
    let recorded = api.decline_ride(id, params.driver_id, &params.reason).await?;

    Ok(recorded.into())
}

pub async fn start(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<Uuid>,
    Json(params): Json<DriverParams>,
) -> Result<Json<Ride>, Error> {
    let ride = api.start_ride(id, params.driver_id).await?;

    Ok(ride.into())
}

pub async fn complete(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<Uuid>,
    Json(params): Json<CompleteParams>,
) -> Result<Json<Ride>, Error> {
    let ride = api
        .complete_ride(id, params.driver_id, params.final_amount)
        .await?;

    Ok(ride.into())
}

pub async fn cancel(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<Uuid>,
    Json(params): Json<CancelParams>,
) -> Result<Json<Ride>, Error> {
    let ride = api.cancel_ride(id, params.actor_id, &params.reason).await?;

    Ok(ride.into())
}

#[test]
fn update_payloads_cannot_smuggle_ride_settings() {
    let value = serde_json::json!({
        "driver_id": Uuid::new_v4(),
        "allow_external_drivers": true,
    });
    assert!(serde_json::from_value::<DriverParams>(value).is_err());

    let value = serde_json::json!({
        "actor_id": Uuid::new_v4(),
        "reason": "changed plans",
        "allow_external_drivers": true,
    });
    assert!(serde_json::from_value::<CancelParams>(value).is_err());
}
