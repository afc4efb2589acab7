use std::collections::HashSet;

use async_trait::async_trait;
use geo_types::Geometry;
use geozero::wkb;
use sqlx::{types::Json, Executor, Pool, Postgres, Row};
use uuid::Uuid;

use crate::entities::{
    Area, DriverBase, FavoriteLocation, FeatureFlag, Geofence, GeoPoint, Ride, Status,
};
use crate::error::{cas_conflict_error, not_found_error, Error};
use crate::store::{FlagStore, GeofenceStore, ProfileStore, RideStore};

type Database = Postgres;

/// Postgres-backed store. Entities live in JSONB `data` columns keyed by id,
/// with the ride status denormalized for the conditional update; geofence
/// bounding boxes are PostGIS geometries so candidate lookup stays an `&&`
/// index scan.
pub struct PgStore {
    pool: Pool<Database>,
}

impl PgStore {
    #[tracing::instrument(name = "PgStore::new", skip_all)]
    pub async fn new(pool: Pool<Database>) -> Result<Self, Error> {
        pool.execute(
            "CREATE TABLE IF NOT EXISTS rides (id UUID PRIMARY KEY, status VARCHAR NOT NULL, data JSONB NOT NULL)",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS ride_declines (ride_id UUID NOT NULL, driver_id UUID NOT NULL, reason VARCHAR NOT NULL, PRIMARY KEY (ride_id, driver_id))",
        )
        .await?;

        pool.execute("CREATE TABLE IF NOT EXISTS areas (id UUID PRIMARY KEY, data JSONB NOT NULL)")
            .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS geofences (id UUID PRIMARY KEY, area_id UUID NOT NULL, bbox geometry(Polygon) NOT NULL, data JSONB NOT NULL)",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS flags (key VARCHAR PRIMARY KEY, data JSONB NOT NULL)",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS favorites (id UUID PRIMARY KEY, passenger_id UUID NOT NULL, data JSONB NOT NULL)",
        )
        .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS driver_bases (driver_id UUID PRIMARY KEY, data JSONB NOT NULL)",
        )
        .await?;

        Ok(Self { pool })
    }

    // Write paths below back the out-of-scope import/admin workflows; the
    // dispatch core itself only reads this data.

    #[tracing::instrument(skip(self))]
    pub async fn insert_area(&self, area: &Area) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;

        conn.execute(
            sqlx::query("INSERT INTO areas (id, data) VALUES ($1, $2)")
                .bind(&area.id)
                .bind(Json(area)),
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self, geofence))]
    pub async fn insert_geofence(&self, geofence: &Geofence) -> Result<(), Error> {
        let bbox: Geometry<f64> = geofence.bbox.to_polygon().into();

        let mut conn = self.pool.acquire().await?;

        conn.execute(
            sqlx::query(
                "INSERT INTO geofences (id, area_id, bbox, data) VALUES ($1, $2, ST_SetSRID($3, 4326), $4)",
            )
            .bind(&geofence.id)
            .bind(&geofence.area_id)
            .bind(wkb::Encode(bbox))
            .bind(Json(geofence)),
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn upsert_flag(&self, flag: &FeatureFlag) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;

        conn.execute(
            sqlx::query(
                "INSERT INTO flags (key, data) VALUES ($1, $2) ON CONFLICT (key) DO UPDATE SET data = $2",
            )
            .bind(&flag.key)
            .bind(Json(flag)),
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn insert_favorite(&self, favorite: &FavoriteLocation) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;

        conn.execute(
            sqlx::query("INSERT INTO favorites (id, passenger_id, data) VALUES ($1, $2, $3)")
                .bind(&favorite.id)
                .bind(&favorite.passenger_id)
                .bind(Json(favorite)),
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn upsert_driver_base(&self, base: &DriverBase) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;

        conn.execute(
            sqlx::query(
                "INSERT INTO driver_bases (driver_id, data) VALUES ($1, $2) ON CONFLICT (driver_id) DO UPDATE SET data = $2",
            )
            .bind(&base.driver_id)
            .bind(Json(base)),
        )
        .await?;

        Ok(())
    }
}

#[async_trait]
impl RideStore for PgStore {
    #[tracing::instrument(skip(self, ride))]
    async fn create(&self, ride: &Ride) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;

        conn.execute(
            sqlx::query("INSERT INTO rides (id, status, data) VALUES ($1, $2, $3)")
                .bind(&ride.id)
                .bind(ride.status.name())
                .bind(Json(ride)),
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<Ride, Error> {
        let mut conn = self.pool.acquire().await?;

        let maybe_result = conn
            .fetch_optional(sqlx::query("SELECT data FROM rides WHERE id = $1").bind(&id))
            .await?;

        let result = maybe_result.ok_or_else(not_found_error)?;
        let Json(ride) = result.try_get("data")?;

        Ok(ride)
    }

    #[tracing::instrument(skip(self, next))]
    async fn cas(&self, id: Uuid, expected: Status, next: &Ride) -> Result<Ride, Error> {
        let mut conn = self.pool.acquire().await?;

        // single conditional UPDATE; when two callers race, exactly one
        // matches the expected status
        let result = conn
            .execute(
                sqlx::query("UPDATE rides SET status = $3, data = $4 WHERE id = $1 AND status = $2")
                    .bind(&id)
                    .bind(expected.name())
                    .bind(next.status.name())
                    .bind(Json(next)),
            )
            .await?;

        if result.rows_affected() == 0 {
            let exists = conn
                .fetch_optional(sqlx::query("SELECT id FROM rides WHERE id = $1").bind(&id))
                .await?;

            return match exists {
                None => Err(not_found_error()),
                Some(_) => Err(cas_conflict_error()),
            };
        }

        Ok(next.clone())
    }

    #[tracing::instrument(skip(self))]
    async fn record_decline(
        &self,
        ride_id: Uuid,
        driver_id: Uuid,
        reason: &str,
    ) -> Result<bool, Error> {
        let mut conn = self.pool.acquire().await?;

        let result = conn
            .execute(
                sqlx::query(
                    "INSERT INTO ride_declines (ride_id, driver_id, reason) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
                )
                .bind(&ride_id)
                .bind(&driver_id)
                .bind(reason),
            )
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self))]
    async fn declined_drivers(&self, ride_id: Uuid) -> Result<HashSet<Uuid>, Error> {
        let mut conn = self.pool.acquire().await?;

        let rows = conn
            .fetch_all(
                sqlx::query("SELECT driver_id FROM ride_declines WHERE ride_id = $1")
                    .bind(&ride_id),
            )
            .await?;

        let mut declined = HashSet::new();
        for row in rows {
            declined.insert(row.try_get("driver_id")?);
        }

        Ok(declined)
    }
}

#[async_trait]
impl GeofenceStore for PgStore {
    #[tracing::instrument(skip(self))]
    async fn find_containing(&self, point: &GeoPoint) -> Result<Vec<Geofence>, Error> {
        let geometry: Geometry<f64> = geo_types::Point::from(*point).into();

        let mut conn = self.pool.acquire().await?;

        let rows = conn
            .fetch_all(
                sqlx::query("SELECT data FROM geofences WHERE bbox && ST_SetSRID($1, 4326)")
                    .bind(wkb::Encode(geometry)),
            )
            .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            let Json(geofence) = row.try_get("data")?;
            candidates.push(geofence);
        }

        Ok(candidates)
    }

    #[tracing::instrument(skip(self))]
    async fn get_area(&self, id: Uuid) -> Result<Area, Error> {
        let mut conn = self.pool.acquire().await?;

        let maybe_result = conn
            .fetch_optional(sqlx::query("SELECT data FROM areas WHERE id = $1").bind(&id))
            .await?;

        let result = maybe_result.ok_or_else(not_found_error)?;
        let Json(area) = result.try_get("data")?;

        Ok(area)
    }

    #[tracing::instrument(skip(self))]
    async fn get_area_geometry(&self, area_id: Uuid) -> Result<Geofence, Error> {
        let mut conn = self.pool.acquire().await?;

        let maybe_result = conn
            .fetch_optional(
                sqlx::query("SELECT data FROM geofences WHERE area_id = $1").bind(&area_id),
            )
            .await?;

        let result = maybe_result.ok_or_else(not_found_error)?;
        let Json(geofence) = result.try_get("data")?;

        Ok(geofence)
    }
}

#[async_trait]
impl FlagStore for PgStore {
    #[tracing::instrument(skip(self))]
    async fn get_flag(&self, key: &str) -> Result<Option<FeatureFlag>, Error> {
        let mut conn = self.pool.acquire().await?;

        let maybe_result = conn
            .fetch_optional(sqlx::query("SELECT data FROM flags WHERE key = $1").bind(key))
            .await?;

        match maybe_result {
            None => Ok(None),
            Some(result) => {
                let Json(flag) = result.try_get("data")?;
                Ok(Some(flag))
            }
        }
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    #[tracing::instrument(skip(self))]
    async fn favorites(&self, passenger_id: Uuid) -> Result<Vec<FavoriteLocation>, Error> {
        let mut conn = self.pool.acquire().await?;

        let rows = conn
            .fetch_all(
                sqlx::query("SELECT data FROM favorites WHERE passenger_id = $1")
                    .bind(&passenger_id),
            )
            .await?;

        let mut favorites = Vec::with_capacity(rows.len());
        for row in rows {
            let Json(favorite) = row.try_get("data")?;
            favorites.push(favorite);
        }

        Ok(favorites)
    }

    #[tracing::instrument(skip(self))]
    async fn driver_base(&self, driver_id: Uuid) -> Result<Option<DriverBase>, Error> {
        let mut conn = self.pool.acquire().await?;

        let maybe_result = conn
            .fetch_optional(
                sqlx::query("SELECT data FROM driver_bases WHERE driver_id = $1").bind(&driver_id),
            )
            .await?;

        match maybe_result {
            None => Ok(None),
            Some(result) => {
                let Json(base) = result.try_get("data")?;
                Ok(Some(base))
            }
        }
    }
}
