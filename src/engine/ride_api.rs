use async_trait::async_trait;
use uuid::Uuid;

use super::Engine;

use crate::api::RideAPI;
use crate::entities::{CreateRide, DriverBase, Ride, Status};
use crate::error::{
    config_missing_error, invalid_input_error, invalid_transition_error, unauthorized_error,
    already_accepted_error, Error, CAS_CONFLICT_CODE,
};

#[async_trait]
impl RideAPI for Engine {
    #[tracing::instrument(skip(self, params))]
    async fn create_ride(&self, params: CreateRide) -> Result<Ride, Error> {
        let ride = Ride::new(params);

        self.rides.create(&ride).await?;

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn find_ride(&self, id: Uuid) -> Result<Ride, Error> {
        self.rides.get(id).await
    }

    #[tracing::instrument(skip(self, drivers))]
    async fn rank_candidates(&self, id: Uuid, drivers: Vec<Uuid>) -> Result<Vec<DriverBase>, Error> {
        let ride = self.rides.get(id).await?;

        if ride.status != Status::Pending {
            return Err(invalid_transition_error());
        }

        let declined = self.rides.declined_drivers(id).await?;

        let mut bases = Vec::new();
        for driver_id in drivers {
            if declined.contains(&driver_id) {
                continue;
            }

            match self.profiles.driver_base(driver_id).await? {
                Some(base) => bases.push(base),
                None => {
                    tracing::warn!(%driver_id, "candidate has no registered base, skipping");
                }
            }
        }

        self.ranker.rank(bases, ride.passenger_id, &ride.pickup).await
    }

    #[tracing::instrument(skip(self))]
    async fn accept_ride(&self, id: Uuid, driver_id: Uuid) -> Result<Ride, Error> {
        let ride = self.rides.get(id).await?;

        // a driver reading after the winner's CAS landed sees the taken
        // offer here; cancelled rides are a stale request, not a lost race
        match ride.status {
            Status::Pending => {}
            Status::Cancelled => return Err(invalid_transition_error()),
            _ => return Err(already_accepted_error()),
        }

        let declined = self.rides.declined_drivers(id).await?;
        if declined.contains(&driver_id) {
            return Err(invalid_input_error());
        }

        if !ride.allow_external_drivers {
            self.ensure_local_driver(&ride, driver_id).await?;
        }

        let mut next = ride.clone();
        next.accept(driver_id)?;

        // both racing drivers reach the store; exactly one conditional
        // update matches PENDING, the loser learns the offer is gone
        match self.rides.cas(id, Status::Pending, &next).await {
            Ok(ride) => Ok(ride),
            Err(err) if err.code == CAS_CONFLICT_CODE => Err(already_accepted_error()),
            Err(err) => Err(err),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn decline_ride(&self, id: Uuid, driver_id: Uuid, reason: &str) -> Result<bool, Error> {
        let ride = self.rides.get(id).await?;

        // a decline never moves the ride itself, it only removes this
        // driver from consideration while the ride stays pending
        if ride.status != Status::Pending {
            return Err(invalid_transition_error());
        }

        let recorded = self.rides.record_decline(id, driver_id, reason).await?;

        if !recorded {
            tracing::info!(%driver_id, "decline was already recorded");
        }

        Ok(recorded)
    }

    #[tracing::instrument(skip(self))]
    async fn start_ride(&self, id: Uuid, driver_id: Uuid) -> Result<Ride, Error> {
        let ride = self.rides.get(id).await?;

        let mut next = ride.clone();
        next.start(driver_id)?;

        self.rides.cas(id, Status::Accepted, &next).await
    }

    #[tracing::instrument(skip(self))]
    async fn complete_ride(
        &self,
        id: Uuid,
        driver_id: Uuid,
        final_amount: Option<f64>,
    ) -> Result<Ride, Error> {
        let ride = self.rides.get(id).await?;

        if ride.status != Status::Started {
            return Err(invalid_transition_error());
        }

        let fare = final_amount.unwrap_or(ride.base_amount);
        let fees = self
            .fees
            .calculate(driver_id, &ride.pickup, &ride.destination, fare)
            .await?;

        tracing::info!(match_type = ?fees.match_type, reason = %fees.reason, "settlement computed");

        let mut next = ride.clone();
        next.complete(driver_id, fare, fees.fee_percentage, fees.driver_earnings)?;

        self.rides.cas(id, Status::Started, &next).await
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_ride(&self, id: Uuid, actor_id: Uuid, reason: &str) -> Result<Ride, Error> {
        let ride = self.rides.get(id).await?;

        let mut next = ride.clone();
        next.cancel(actor_id, reason)?;

        self.rides.cas(id, ride.status, &next).await
    }
}

impl Engine {
    /// Community-only rides require the driver's base to resolve into the
    /// pickup's area (nesting counts). Without geofence data the driver
    /// cannot prove locality, so the conservative answer is no.
    async fn ensure_local_driver(&self, ride: &Ride, driver_id: Uuid) -> Result<(), Error> {
        let base = self
            .profiles
            .driver_base(driver_id)
            .await?
            .ok_or_else(config_missing_error)?;

        let pickup_area = self.resolver.resolve(&ride.pickup).await?;
        let base_area = self.resolver.resolve(&base.primary).await?;

        match (pickup_area, base_area) {
            (Some(pickup), Some(base)) if base.is_nested_with(&pickup) => Ok(()),
            _ => Err(unauthorized_error()),
        }
    }
}

#[cfg(test)]
use crate::store::memory::MemoryStore;

#[cfg(test)]
fn test_engine() -> (Engine, std::sync::Arc<MemoryStore>) {
    use std::sync::Arc;

    let store = Arc::new(MemoryStore::default());
    let engine = Engine::new(store.clone(), store.clone(), store.clone(), store.clone());

    (engine, store)
}

#[cfg(test)]
fn test_params(allow_external_drivers: bool) -> CreateRide {
    use crate::entities::{GeoPoint, ServiceType};

    CreateRide {
        passenger_id: Uuid::new_v4(),
        pickup: GeoPoint::new(-23.5510, -46.6338).unwrap(),
        destination: GeoPoint::new(-23.5610, -46.6438).unwrap(),
        service_type: ServiceType::MotoTaxi,
        base_amount: 12.0,
        allow_external_drivers,
    }
}

#[test]
fn full_lifecycle_with_settlement() {
    use crate::entities::{square, Area, Confidence, DriverBase, Geofence, GeoPoint};
    use crate::fees::SAME_AREA_FEE_PCT;
    use tokio_test::block_on;

    let (engine, store) = test_engine();

    let area = Area::new("Morro Azul".into(), None);
    let pickup = GeoPoint::new(-23.5510, -46.6338).unwrap();
    store.insert_geofence(Geofence::new(area.id, square(pickup, 0.02), Confidence::High).unwrap());
    store.insert_area(area);

    let driver_id = Uuid::new_v4();
    store.upsert_driver_base(DriverBase::new(driver_id, pickup));

    let ride = block_on(engine.create_ride(test_params(true))).unwrap();
    assert_eq!(ride.status, Status::Pending);

    let ride = block_on(engine.accept_ride(ride.id, driver_id)).unwrap();
    assert_eq!(ride.status, Status::Accepted);

    let ride = block_on(engine.start_ride(ride.id, driver_id)).unwrap();
    assert_eq!(ride.status, Status::Started);

    let ride = block_on(engine.complete_ride(ride.id, driver_id, Some(20.0))).unwrap();
    assert_eq!(ride.status, Status::Completed);
    assert_eq!(ride.final_amount, Some(20.0));
    assert_eq!(ride.fee_percentage, Some(SAME_AREA_FEE_PCT));
    assert_eq!(ride.driver_earnings, Some(20.0 - 20.0 * SAME_AREA_FEE_PCT / 100.0));

    let stored = block_on(engine.find_ride(ride.id)).unwrap();
    assert_eq!(stored.status, Status::Completed);
}

#[test]
fn concurrent_accept_has_a_single_winner() {
    use crate::error::ALREADY_ACCEPTED_CODE;
    use tokio_test::block_on;

    let (engine, _store) = test_engine();
    let ride = block_on(engine.create_ride(test_params(true))).unwrap();

    let driver_a = Uuid::new_v4();
    let driver_b = Uuid::new_v4();

    let (first, second) = block_on(async {
        tokio::join!(
            engine.accept_ride(ride.id, driver_a),
            engine.accept_ride(ride.id, driver_b),
        )
    });

    let (winner, loser) = match (first.is_ok(), second.is_ok()) {
        (true, false) => (driver_a, second.unwrap_err()),
        (false, true) => (driver_b, first.unwrap_err()),
        _ => panic!("expected exactly one accept to win"),
    };

    assert_eq!(loser.code, ALREADY_ACCEPTED_CODE);

    let stored = block_on(engine.find_ride(ride.id)).unwrap();
    assert_eq!(stored.status, Status::Accepted);
    assert_eq!(stored.driver_id, Some(winner));
}

#[test]
fn second_accept_after_win_is_already_accepted() {
    use crate::error::ALREADY_ACCEPTED_CODE;
    use tokio_test::block_on;

    let (engine, _store) = test_engine();
    let ride = block_on(engine.create_ride(test_params(true))).unwrap();

    block_on(engine.accept_ride(ride.id, Uuid::new_v4())).unwrap();

    let err = block_on(engine.accept_ride(ride.id, Uuid::new_v4())).unwrap_err();
    assert_eq!(err.code, ALREADY_ACCEPTED_CODE);
}

#[test]
fn late_accepts_see_the_offer_as_gone_not_as_a_bad_transition() {
    use crate::error::{ALREADY_ACCEPTED_CODE, INVALID_TRANSITION_CODE};
    use tokio_test::block_on;

    let (engine, _store) = test_engine();
    let ride = block_on(engine.create_ride(test_params(true))).unwrap();
    let driver_id = Uuid::new_v4();

    block_on(engine.accept_ride(ride.id, driver_id)).unwrap();
    block_on(engine.start_ride(ride.id, driver_id)).unwrap();

    // started rides still read as a taken offer to a late accept
    let err = block_on(engine.accept_ride(ride.id, Uuid::new_v4())).unwrap_err();
    assert_eq!(err.code, ALREADY_ACCEPTED_CODE);

    // a cancelled ride is a stale request, not a lost race
    let params = test_params(true);
    let passenger_id = params.passenger_id;
    let ride = block_on(engine.create_ride(params)).unwrap();
    block_on(engine.cancel_ride(ride.id, passenger_id, "no longer needed")).unwrap();

    let err = block_on(engine.accept_ride(ride.id, Uuid::new_v4())).unwrap_err();
    assert_eq!(err.code, INVALID_TRANSITION_CODE);
}

#[test]
fn decline_is_idempotent_and_keeps_the_ride_pending() {
    use tokio_test::block_on;

    let (engine, _store) = test_engine();
    let ride = block_on(engine.create_ride(test_params(true))).unwrap();
    let driver_id = Uuid::new_v4();

    assert!(block_on(engine.decline_ride(ride.id, driver_id, "too far")).unwrap());
    assert!(!block_on(engine.decline_ride(ride.id, driver_id, "too far")).unwrap());

    let stored = block_on(engine.find_ride(ride.id)).unwrap();
    assert_eq!(stored.status, Status::Pending);

    // other drivers can still take the ride, the decliner cannot
    let err = block_on(engine.accept_ride(ride.id, driver_id)).unwrap_err();
    assert_eq!(err.code, crate::error::INVALID_INPUT_CODE);
    block_on(engine.accept_ride(ride.id, Uuid::new_v4())).unwrap();
}

#[test]
fn declined_drivers_are_excluded_from_candidates() {
    use crate::entities::{DriverBase, GeoPoint};
    use tokio_test::block_on;

    let (engine, store) = test_engine();
    let ride = block_on(engine.create_ride(test_params(true))).unwrap();

    let keeper = Uuid::new_v4();
    let decliner = Uuid::new_v4();
    let base = GeoPoint::new(-23.5515, -46.6343).unwrap();
    store.upsert_driver_base(DriverBase::new(keeper, base));
    store.upsert_driver_base(DriverBase::new(decliner, base));

    block_on(engine.decline_ride(ride.id, decliner, "busy")).unwrap();

    let ranked = block_on(engine.rank_candidates(ride.id, vec![decliner, keeper])).unwrap();
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].driver_id, keeper);
}

#[test]
fn community_only_rides_reject_external_drivers() {
    use crate::entities::{square, Area, Confidence, DriverBase, Geofence, GeoPoint};
    use crate::error::{CONFIG_MISSING_CODE, UNAUTHORIZED_CODE};
    use tokio_test::block_on;

    let (engine, store) = test_engine();

    let pickup = GeoPoint::new(-23.5510, -46.6338).unwrap();
    let area = Area::new("Morro Azul".into(), None);
    store.insert_geofence(Geofence::new(area.id, square(pickup, 0.02), Confidence::High).unwrap());
    store.insert_area(area);

    let local = Uuid::new_v4();
    let external = Uuid::new_v4();
    let unregistered = Uuid::new_v4();
    store.upsert_driver_base(DriverBase::new(local, pickup));
    store.upsert_driver_base(DriverBase::new(
        external,
        GeoPoint::new(-23.9500, -46.9300).unwrap(),
    ));

    let ride = block_on(engine.create_ride(test_params(false))).unwrap();

    let err = block_on(engine.accept_ride(ride.id, external)).unwrap_err();
    assert_eq!(err.code, UNAUTHORIZED_CODE);

    let err = block_on(engine.accept_ride(ride.id, unregistered)).unwrap_err();
    assert_eq!(err.code, CONFIG_MISSING_CODE);

    let accepted = block_on(engine.accept_ride(ride.id, local)).unwrap();
    assert_eq!(accepted.driver_id, Some(local));
}

#[test]
fn started_rides_cannot_be_cancelled() {
    use crate::error::RIDE_IN_PROGRESS_CODE;
    use tokio_test::block_on;

    let (engine, _store) = test_engine();
    let params = test_params(true);
    let passenger_id = params.passenger_id;
    let ride = block_on(engine.create_ride(params)).unwrap();
    let driver_id = Uuid::new_v4();

    block_on(engine.accept_ride(ride.id, driver_id)).unwrap();
    block_on(engine.start_ride(ride.id, driver_id)).unwrap();

    let err = block_on(engine.cancel_ride(ride.id, passenger_id, "changed plans")).unwrap_err();
    assert_eq!(err.code, RIDE_IN_PROGRESS_CODE);

    let stored = block_on(engine.find_ride(ride.id)).unwrap();
    assert_eq!(stored.status, Status::Started);
}

#[test]
fn cancel_while_pending_and_while_accepted() {
    use tokio_test::block_on;

    let (engine, _store) = test_engine();

    let params = test_params(true);
    let passenger_id = params.passenger_id;
    let ride = block_on(engine.create_ride(params)).unwrap();
    let cancelled = block_on(engine.cancel_ride(ride.id, passenger_id, "no longer needed")).unwrap();
    assert_eq!(cancelled.status, Status::Cancelled);

    let params = test_params(true);
    let ride = block_on(engine.create_ride(params)).unwrap();
    let driver_id = Uuid::new_v4();
    block_on(engine.accept_ride(ride.id, driver_id)).unwrap();
    let cancelled = block_on(engine.cancel_ride(ride.id, driver_id, "flat tire")).unwrap();
    assert_eq!(cancelled.status, Status::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("flat tire"));
}

#[test]
fn completion_outside_home_area_pays_default_fee() {
    use crate::entities::{square, Area, Confidence, DriverBase, Geofence, GeoPoint};
    use crate::fees::DEFAULT_FEE_PCT;
    use tokio_test::block_on;

    let (engine, store) = test_engine();

    let pickup = GeoPoint::new(-23.5510, -46.6338).unwrap();
    let far_base = GeoPoint::new(-23.9500, -46.9300).unwrap();

    let pickup_area = Area::new("Centro".into(), None);
    let base_area = Area::new("Litoral".into(), None);
    store.insert_geofence(
        Geofence::new(pickup_area.id, square(pickup, 0.02), Confidence::High).unwrap(),
    );
    store.insert_geofence(
        Geofence::new(base_area.id, square(far_base, 0.02), Confidence::High).unwrap(),
    );
    store.insert_area(pickup_area);
    store.insert_area(base_area);

    let driver_id = Uuid::new_v4();
    store.upsert_driver_base(DriverBase::new(driver_id, far_base));

    let ride = block_on(engine.create_ride(test_params(true))).unwrap();
    block_on(engine.accept_ride(ride.id, driver_id)).unwrap();
    block_on(engine.start_ride(ride.id, driver_id)).unwrap();

    // no final amount given, settle on the base amount
    let ride = block_on(engine.complete_ride(ride.id, driver_id, None)).unwrap();
    assert_eq!(ride.final_amount, Some(12.0));
    assert_eq!(ride.fee_percentage, Some(DEFAULT_FEE_PCT));
    assert_eq!(ride.driver_earnings, Some(12.0 - 12.0 * DEFAULT_FEE_PCT / 100.0));
}
