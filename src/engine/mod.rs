mod ride_api;

use std::sync::Arc;

use uuid::Uuid;

use crate::api::{AdminAPI, API};
use crate::entities::Geofence;
use crate::error::Error;
use crate::fees::FeeCalculator;
use crate::flags::RolloutGate;
use crate::geofence::Resolver;
use crate::matching::Ranker;
use crate::store::{DynFlagStore, DynGeofenceStore, DynProfileStore, DynRideStore};

/// The dispatch engine: composes the resolver, rollout gate, ranker and fee
/// calculator over the injected stores. All ride state transitions are
/// delegated to the ride store's CAS contract.
pub struct Engine {
    rides: DynRideStore,
    geofences: DynGeofenceStore,
    profiles: DynProfileStore,
    resolver: Arc<Resolver>,
    gate: Arc<RolloutGate>,
    ranker: Ranker,
    fees: FeeCalculator,
}

impl Engine {
    pub fn new(
        rides: DynRideStore,
        geofences: DynGeofenceStore,
        flags: DynFlagStore,
        profiles: DynProfileStore,
    ) -> Self {
        let resolver = Arc::new(Resolver::new(geofences.clone()));
        let gate = Arc::new(RolloutGate::new(flags));
        let ranker = Ranker::new(gate.clone(), profiles.clone());
        let fees = FeeCalculator::new(resolver.clone(), profiles.clone());

        Self {
            rides,
            geofences,
            profiles,
            resolver,
            gate,
            ranker,
            fees,
        }
    }
}

#[async_trait::async_trait]
impl AdminAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn invalidate_flag(&self, key: &str) -> Result<(), Error> {
        self.gate.invalidate(key);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn area_geofence(&self, area_id: Uuid) -> Result<Geofence, Error> {
        self.geofences.get_area_geometry(area_id).await
    }
}

impl API for Engine {}

#[test]
fn area_geofence_returns_the_stored_boundary() {
    use crate::api::AdminAPI;
    use crate::entities::{square, Area, Confidence, Geofence, GeoPoint};
    use crate::error::NOT_FOUND_CODE;
    use crate::store::memory::MemoryStore;
    use tokio_test::block_on;

    let store = Arc::new(MemoryStore::default());
    let engine = Engine::new(store.clone(), store.clone(), store.clone(), store.clone());

    let area = Area::new("Morro Azul".into(), None);
    let center = GeoPoint::new(-23.55, -46.63).unwrap();
    let fence = Geofence::new(area.id, square(center, 0.01), Confidence::High).unwrap();
    store.insert_geofence(fence.clone());
    let area_id = area.id;
    store.insert_area(area);

    let found = block_on(engine.area_geofence(area_id)).unwrap();
    assert_eq!(found.id, fence.id);

    let err = block_on(engine.area_geofence(Uuid::new_v4())).unwrap_err();
    assert_eq!(err.code, NOT_FOUND_CODE);
}
