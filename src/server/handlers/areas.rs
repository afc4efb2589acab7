use axum::extract::{Extension, Json, Path};
use uuid::Uuid;

use crate::api::DynAPI;
use crate::entities::Geofence;
use crate::error::Error;

pub async fn geofence(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<Uuid>,
) -> Result<Json<Geofence>, Error> {
    let geofence = api.area_geofence(id).await?;

    Ok(geofence.into())
}
