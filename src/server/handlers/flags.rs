use axum::extract::{Extension, Path};

use crate::api::DynAPI;
use crate::error::Error;

pub async fn invalidate(
    Extension(api): Extension<DynAPI>,
    Path(key): Path<String>,
) -> Result<(), Error> {
    api.invalidate_flag(&key).await
}
