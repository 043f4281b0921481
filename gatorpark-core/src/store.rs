//! Authoritative occupancy counts.
//!
//! Each garage sits behind its own mutex, so check-ins on different garages
//! never contend. The lock is held across the invariant check, the update and
//! the publish call: events for one garage reach the sink in the order they
//! were applied.
//!
//! ```text
//!  check_in("Rawlings") ──▶ slot[0].lock() ──▶ count < capacity? ──▶ count += 1
//!                                                                      │
//!                                                           sink.publish(&garage)
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::StoreError;
use crate::model::{Action, Garage, Mutation, MutationTag};
use crate::registry::GarageRegistry;

/// Receiver of applied occupancy changes.
///
/// `publish` is called with the per-garage lock held and must not block.
pub trait OccupancySink: Send + Sync {
    fn publish(&self, garage: &Garage);
}

impl<F> OccupancySink for F
where
    F: Fn(&Garage) + Send + Sync,
{
    fn publish(&self, garage: &Garage) {
        self(garage)
    }
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

impl OccupancySink for Detached {
    fn publish(&self, _garage: &Garage) {}
}

/// Counters for monitoring the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub applied: u64,
    pub rejected: u64,
    pub not_found: u64,
}

struct AtomicStoreStats {
    applied: AtomicU64,
    rejected: AtomicU64,
    not_found: AtomicU64,
}

impl AtomicStoreStats {
    fn new() -> Self {
        Self {
            applied: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            not_found: AtomicU64::new(0),
        }
    }
}

/// The single owner of mutable garage state.
pub struct OccupancyStore {
    slots: Vec<Mutex<Garage>>,
    index: HashMap<String, usize>,
    sink: Arc<dyn OccupancySink>,
    stats: AtomicStoreStats,
}

// Garage values are replaced whole, so a panic elsewhere cannot leave one
// half-written; a poisoned slot is still consistent.
fn lock(slot: &Mutex<Garage>) -> MutexGuard<'_, Garage> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl OccupancyStore {
    /// Seed a store from the registry; applied changes go to `sink`.
    pub fn new(registry: &GarageRegistry, sink: Arc<dyn OccupancySink>) -> Self {
        let mut slots = Vec::with_capacity(registry.len());
        let mut index = HashMap::with_capacity(registry.len());
        for (i, seed) in registry.iter().enumerate() {
            slots.push(Mutex::new(seed.to_garage()));
            index.insert(seed.name.clone(), i);
        }
        Self {
            slots,
            index,
            sink,
            stats: AtomicStoreStats::new(),
        }
    }

    /// A store whose events go nowhere. Handy for isolated tests.
    pub fn detached(registry: &GarageRegistry) -> Self {
        Self::new(registry, Arc::new(Detached))
    }

    /// Consistent point-in-time copy of every garage, in catalog order.
    ///
    /// All slots are locked together (always in catalog order, and mutations
    /// only ever hold one) so no reader sees a half-applied set of changes.
    pub fn snapshot(&self) -> Vec<Garage> {
        let guards: Vec<MutexGuard<'_, Garage>> = self.slots.iter().map(lock).collect();
        guards.iter().map(|g| (**g).clone()).collect()
    }

    /// Current value of one garage.
    pub fn get(&self, name: &str) -> Result<Garage, StoreError> {
        let slot = self.slot(name)?;
        let garage = lock(slot).clone();
        Ok(garage)
    }

    pub fn check_in(&self, name: &str) -> Result<Mutation, StoreError> {
        self.apply(name, Action::CheckIn)
    }

    pub fn check_out(&self, name: &str) -> Result<Mutation, StoreError> {
        self.apply(name, Action::CheckOut)
    }

    /// Apply one action atomically with respect to other calls on the same garage.
    ///
    /// At the invariant boundary the call is a no-op returning the unchanged
    /// garage tagged [`MutationTag::AtCapacity`] or [`MutationTag::AlreadyEmpty`];
    /// nothing is published in that case.
    pub fn apply(&self, name: &str, action: Action) -> Result<Mutation, StoreError> {
        let slot = self.slot(name)?;
        let mut garage = lock(slot);

        let tag = match action {
            Action::CheckIn if garage.current_count >= garage.capacity => MutationTag::AtCapacity,
            Action::CheckOut if garage.current_count == 0 => MutationTag::AlreadyEmpty,
            Action::CheckIn => {
                garage.current_count += 1;
                MutationTag::Applied
            }
            Action::CheckOut => {
                garage.current_count -= 1;
                MutationTag::Applied
            }
        };

        if tag.is_applied() {
            garage.revision += 1;
            self.stats.applied.fetch_add(1, Ordering::Relaxed);
            self.sink.publish(&garage);
            log::debug!(
                "{} {}: {}/{}",
                action,
                garage.name,
                garage.current_count,
                garage.capacity
            );
        } else {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            log::debug!("{} {} rejected: {}", action, garage.name, tag.as_str());
        }

        Ok(Mutation {
            garage: garage.clone(),
            tag,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            applied: self.stats.applied.load(Ordering::Relaxed),
            rejected: self.stats.rejected.load(Ordering::Relaxed),
            not_found: self.stats.not_found.load(Ordering::Relaxed),
        }
    }

    fn slot(&self, name: &str) -> Result<&Mutex<Garage>, StoreError> {
        match self.index.get(name) {
            Some(&i) => Ok(&self.slots[i]),
            None => {
                self.stats.not_found.fetch_add(1, Ordering::Relaxed);
                log::info!("Unknown garage requested: {name}");
                Err(StoreError::NotFound(name.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::GarageSeed;

    fn recording_store(capacity: u32) -> (OccupancyStore, Arc<Mutex<Vec<Garage>>>) {
        let registry = GarageRegistry::new(vec![
            GarageSeed::new("Lot", 29.6, -82.3, capacity),
            GarageSeed::new("Other", 29.7, -82.4, capacity),
        ])
        .unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();
        let sink = move |g: &Garage| sink_events.lock().unwrap().push(g.clone());
        (OccupancyStore::new(&registry, Arc::new(sink)), events)
    }

    #[test]
    fn test_capacity_two_scenario() {
        let (store, events) = recording_store(2);

        let m = store.check_in("Lot").unwrap();
        assert_eq!((m.garage.current_count, m.tag), (1, MutationTag::Applied));
        let m = store.check_in("Lot").unwrap();
        assert_eq!((m.garage.current_count, m.tag), (2, MutationTag::Applied));
        let m = store.check_in("Lot").unwrap();
        assert_eq!((m.garage.current_count, m.tag), (2, MutationTag::AtCapacity));

        store.check_out("Lot").unwrap();
        let m = store.check_out("Lot").unwrap();
        assert_eq!((m.garage.current_count, m.tag), (0, MutationTag::Applied));
        let m = store.check_out("Lot").unwrap();
        assert_eq!((m.garage.current_count, m.tag), (0, MutationTag::AlreadyEmpty));

        // Only the four applied changes were published.
        let counts: Vec<u32> = events.lock().unwrap().iter().map(|g| g.current_count).collect();
        assert_eq!(counts, vec![1, 2, 1, 0]);
    }

    #[test]
    fn test_unknown_garage() {
        let (store, events) = recording_store(2);
        let before = store.snapshot();

        assert_eq!(
            store.check_in("Unknown"),
            Err(StoreError::NotFound("Unknown".to_string()))
        );
        assert_eq!(store.snapshot(), before);
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(store.stats().not_found, 1);
    }

    #[test]
    fn test_revision_counts_applied_changes_only() {
        let (store, events) = recording_store(1);
        assert_eq!(store.get("Lot").unwrap().revision, 0);

        assert_eq!(store.check_in("Lot").unwrap().garage.revision, 1);
        assert_eq!(store.check_in("Lot").unwrap().garage.revision, 1);
        assert_eq!(store.check_out("Lot").unwrap().garage.revision, 2);
        assert_eq!(store.check_out("Lot").unwrap().garage.revision, 2);
        assert_eq!(store.get("Other").unwrap().revision, 0);

        let revisions: Vec<u64> = events.lock().unwrap().iter().map(|g| g.revision).collect();
        assert_eq!(revisions, vec![1, 2]);
    }

    #[test]
    fn test_zero_capacity_is_always_full() {
        let (store, events) = recording_store(0);
        let m = store.check_in("Lot").unwrap();
        assert_eq!(m.tag, MutationTag::AtCapacity);
        let m = store.check_out("Lot").unwrap();
        assert_eq!(m.tag, MutationTag::AlreadyEmpty);
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_catalog_order() {
        let (store, _) = recording_store(3);
        store.check_in("Other").unwrap();
        let names: Vec<String> = store.snapshot().into_iter().map(|g| g.name).collect();
        assert_eq!(names, vec!["Lot", "Other"]);
        assert_eq!(store.get("Other").unwrap().current_count, 1);
    }

    #[test]
    fn test_stats() {
        let (store, _) = recording_store(1);
        store.check_in("Lot").unwrap();
        store.check_in("Lot").unwrap();
        let _ = store.check_out("Nope");
        assert_eq!(
            store.stats(),
            StoreStats {
                applied: 1,
                rejected: 1,
                not_found: 1
            }
        );
    }

    #[test]
    fn test_concurrent_writers_respect_bounds() {
        let (store, events) = recording_store(50);
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let res = if (i + t) % 3 == 0 {
                            store.check_out("Lot")
                        } else {
                            store.check_in("Lot")
                        };
                        let g = res.unwrap().garage;
                        assert!(g.current_count <= g.capacity);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // Every published value is one step away from the previous one.
        let events = events.lock().unwrap();
        let mut prev = 0i64;
        for g in events.iter() {
            let now = i64::from(g.current_count);
            assert_eq!((now - prev).abs(), 1);
            prev = now;
        }
        assert_eq!(prev, i64::from(store.get("Lot").unwrap().current_count));
        assert_eq!(store.stats().applied as usize, events.len());
    }
}
