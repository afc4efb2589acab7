pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, patch, post},
    Router,
};

use crate::api::{DynAPI, API};
use crate::server::handlers::{areas, flags, rides};

pub async fn serve<T: API + Sync + Send + 'static>(api: T) {
    let api = Arc::new(api) as DynAPI;

    let app = Router::new()
        .route("/rides", post(rides::create))
        .route("/rides/:id", get(rides::find))
        .route("/rides/:id/candidates", post(rides::rank_candidates))
        .route("/rides/:id/accept", patch(rides::accept))
        .route("/rides/:id/decline", patch(rides::decline))
        .route("/rides/:id/start", patch(rides::start))
        .route("/rides/:id/complete", patch(rides::complete))
        .route("/rides/:id/cancel", patch(rides::cancel))
        .route("/areas/:id/geofence", get(areas::geofence))
        .route("/flags/:key/invalidate", post(flags::invalidate))
        .layer(Extension(api));

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));

    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
