use std::collections::HashMap;
use std::env;
use std::sync::Mutex;

use crate::entities::FeatureFlag;
use crate::error::Error;
use crate::store::DynFlagStore;

/// Deterministic percentage-rollout gate over the flag store.
///
/// Flag configuration is cached in process memory; `invalidate` must be
/// called after admin updates for the same process to observe them. The
/// bucketing hash is fixed, so a subject enabled at 10% stays enabled as the
/// rollout climbs.
pub struct RolloutGate {
    store: DynFlagStore,
    cache: Mutex<HashMap<String, Option<FeatureFlag>>>,
}

impl RolloutGate {
    pub fn new(store: DynFlagStore) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn is_enabled(&self, feature_key: &str, subject_id: &str) -> Result<bool, Error> {
        // environment kill switch beats everything, allowlist included
        if kill_switch_engaged(feature_key) {
            tracing::warn!(feature_key, "kill switch engaged, feature forced off");
            return Ok(false);
        }

        let cached = self.cache.lock().unwrap().get(feature_key).cloned();

        let flag = match cached {
            Some(flag) => flag,
            None => {
                let flag = self.store.get_flag(feature_key).await?;
                self.cache
                    .lock()
                    .unwrap()
                    .insert(feature_key.into(), flag.clone());
                flag
            }
        };

        let flag = match flag {
            Some(flag) => flag,
            // a missing flag is off, not an error
            None => return Ok(false),
        };

        if !flag.enabled {
            return Ok(false);
        }

        if flag.allowlist.contains(subject_id) {
            return Ok(true);
        }

        Ok(bucket(subject_id) < flag.rollout_percentage)
    }

    /// Drops the cached configuration for `feature_key`. The next
    /// `is_enabled` call in this process refetches from the store.
    pub fn invalidate(&self, feature_key: &str) {
        self.cache.lock().unwrap().remove(feature_key);
    }
}

/// Stable 0-99 rollout bucket: FNV-1a over the subject id, reduced mod 100.
/// Must never change, or passengers flip cohorts between releases.
pub fn bucket(subject_id: &str) -> u8 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in subject_id.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }

    (hash % 100) as u8
}

fn kill_switch_engaged(feature_key: &str) -> bool {
    let var = format!("FEATURE_{}_KILLED", feature_key.to_uppercase());

    match env::var(var) {
        Ok(value) => matches!(value.to_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => false,
    }
}

#[cfg(test)]
fn gate_with(flag: FeatureFlag) -> RolloutGate {
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;

    let store = Arc::new(MemoryStore::default());
    store.upsert_flag(flag);
    RolloutGate::new(store)
}

#[test]
fn bucket_is_deterministic() {
    let subject = "6f2b9a0e-bd1d-4b21-a9ce-0e8f6cfb1d11";
    let first = bucket(subject);

    for _ in 0..1000 {
        assert_eq!(bucket(subject), first);
    }

    assert!(first < 100);
}

#[test]
fn enablement_is_monotonic_in_rollout_percentage() {
    use tokio_test::block_on;
    use uuid::Uuid;

    let subjects: Vec<String> = (0..50).map(|_| Uuid::new_v4().to_string()).collect();
    let mut enabled_so_far = vec![false; subjects.len()];

    for pct in 0..=100u8 {
        let gate = gate_with(FeatureFlag::new("favorites_matching".into(), true, pct));

        for (i, subject) in subjects.iter().enumerate() {
            let on = block_on(gate.is_enabled("favorites_matching", subject)).unwrap();
            assert!(
                on || !enabled_so_far[i],
                "subject {} flipped off between {}% and a lower rollout",
                subject,
                pct
            );
            enabled_so_far[i] = on;
        }
    }

    assert!(enabled_so_far.iter().all(|on| *on), "100% must enable everyone");
}

#[test]
fn master_switch_off_beats_allowlist() {
    use tokio_test::block_on;

    let mut flag = FeatureFlag::new("favorites_matching".into(), false, 100);
    flag.allowlist.insert("vip".into());
    let gate = gate_with(flag);

    assert!(!block_on(gate.is_enabled("favorites_matching", "vip")).unwrap());
}

#[test]
fn allowlist_wins_over_bucketing() {
    use tokio_test::block_on;

    // find a subject outside a 0% rollout, then allowlist it
    let mut flag = FeatureFlag::new("favorites_matching".into(), true, 0);
    flag.allowlist.insert("pilot-passenger".into());
    let gate = gate_with(flag);

    assert!(block_on(gate.is_enabled("favorites_matching", "pilot-passenger")).unwrap());
    assert!(!block_on(gate.is_enabled("favorites_matching", "someone-else")).unwrap());
}

#[test]
fn missing_flag_is_off() {
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;
    use tokio_test::block_on;

    let gate = RolloutGate::new(Arc::new(MemoryStore::default()));
    assert!(!block_on(gate.is_enabled("favorites_matching", "anyone")).unwrap());
}

#[test]
fn kill_switch_forces_off() {
    use tokio_test::block_on;

    // unique feature key so the env var cannot leak into parallel tests
    let key = "kill_switch_probe";
    let mut flag = FeatureFlag::new(key.into(), true, 100);
    flag.allowlist.insert("vip".into());
    let gate = gate_with(flag);

    assert!(block_on(gate.is_enabled(key, "vip")).unwrap());

    env::set_var("FEATURE_KILL_SWITCH_PROBE_KILLED", "true");
    assert!(!block_on(gate.is_enabled(key, "vip")).unwrap());
    env::remove_var("FEATURE_KILL_SWITCH_PROBE_KILLED");
}

#[test]
fn invalidate_picks_up_new_configuration() {
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;
    use tokio_test::block_on;

    let store = Arc::new(MemoryStore::default());
    store.upsert_flag(FeatureFlag::new("favorites_matching".into(), true, 100));
    let gate = RolloutGate::new(store.clone());

    assert!(block_on(gate.is_enabled("favorites_matching", "p1")).unwrap());

    // admin turns the flag off; the cached copy still answers until invalidated
    store.upsert_flag(FeatureFlag::new("favorites_matching".into(), false, 100));
    assert!(block_on(gate.is_enabled("favorites_matching", "p1")).unwrap());

    gate.invalidate("favorites_matching");
    assert!(!block_on(gate.is_enabled("favorites_matching", "p1")).unwrap());
}
