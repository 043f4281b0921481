//! Fan-out of applied occupancy changes to every connected observer.
//!
//! Uses a tokio broadcast channel: one send reaches all subscribers, and each
//! subscriber buffers up to `capacity` events. A subscriber that falls further
//! behind loses its oldest events and carries on from the newest ones.
//! Publishing never waits for a slow observer.
//!
//! Events are encoded once at publish time and shared by every observer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use gatorpark_core::{Garage, OccupancySink};

use crate::protocol::encode_garage;

/// One applied change, as handed to observers.
#[derive(Debug, Clone)]
pub struct OccupancyEvent {
    /// Hub-wide publish sequence number.
    pub seq: u64,
    /// Post-mutation garage value.
    pub garage: Arc<Garage>,
    /// JSON encoding of `garage`, shared by all observers.
    pub payload: Arc<str>,
}

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub active_observers: usize,
}

/// Atomic broadcast stats, updated without taking a lock.
struct AtomicBroadcastStats {
    next_seq: AtomicU64,
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

impl AtomicBroadcastStats {
    fn new() -> Self {
        Self {
            next_seq: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }
}

/// Who is listening, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ObserverInfo {
    pub id: Uuid,
    pub label: String,
    pub subscribed_at: SystemTime,
}

type ObserverMap = Arc<RwLock<HashMap<Uuid, ObserverInfo>>>;

/// Broadcast hub shared by the occupancy store (publisher) and the push
/// server (subscribers).
pub struct BroadcastHub {
    sender: broadcast::Sender<OccupancyEvent>,
    observers: ObserverMap,
    capacity: usize,
    atomic_stats: Arc<AtomicBroadcastStats>,
}

impl BroadcastHub {
    /// Create a hub whose observers each buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            observers: Arc::new(RwLock::new(HashMap::new())),
            capacity,
            atomic_stats: Arc::new(AtomicBroadcastStats::new()),
        }
    }

    /// Register a new observer. It receives every event published from now on.
    pub fn subscribe(&self, label: impl Into<String>) -> Observer {
        let info = ObserverInfo {
            id: Uuid::new_v4(),
            label: label.into(),
            subscribed_at: SystemTime::now(),
        };
        let id = info.id;
        // Subscribe before registering so no event slips between the two.
        let rx = self.sender.subscribe();
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, info);
        Observer {
            id,
            rx,
            observers: self.observers.clone(),
            stats: self.atomic_stats.clone(),
        }
    }

    /// Remove an observer. Dropping the [`Observer`] has the same effect.
    pub fn unsubscribe(&self, observer: Observer) -> bool {
        let known = self.has_observer(&observer.id);
        drop(observer);
        known
    }

    /// Send one applied change to every observer.
    ///
    /// Returns the number of observers the event was queued for.
    pub fn publish(&self, garage: &Garage) -> usize {
        let payload: Arc<str> = match encode_garage(garage) {
            Ok(text) => text.into(),
            Err(e) => {
                log::error!("Dropping update for {}: {e}", garage.name);
                return 0;
            }
        };
        let event = OccupancyEvent {
            seq: self.atomic_stats.next_seq.fetch_add(1, Ordering::Relaxed),
            garage: Arc::new(garage.clone()),
            payload,
        };
        let count = self.sender.send(event).unwrap_or(0);
        self.atomic_stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        log::trace!("Published {} to {count} observers", garage.name);
        count
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn observers(&self) -> Vec<ObserverInfo> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn has_observer(&self, id: &Uuid) -> bool {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Lock-free stats snapshot (plus one read of the observer map).
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.atomic_stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.atomic_stats.messages_dropped.load(Ordering::Relaxed),
            active_observers: self.observer_count(),
        }
    }

    /// Per-observer buffer size.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl OccupancySink for BroadcastHub {
    fn publish(&self, garage: &Garage) {
        BroadcastHub::publish(self, garage);
    }
}

/// A subscription handle. Unregisters itself when dropped.
pub struct Observer {
    id: Uuid,
    rx: broadcast::Receiver<OccupancyEvent>,
    observers: ObserverMap,
    stats: Arc<AtomicBroadcastStats>,
}

impl Observer {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next event.
    ///
    /// Events lost to buffer overflow are counted and skipped. Returns `None`
    /// once the hub is gone. Cancel-safe.
    pub async fn recv(&mut self) -> Option<OccupancyEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(n)) => self.record_lag(n),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv); `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<OccupancyEvent> {
        use tokio::sync::broadcast::error::TryRecvError;
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(n)) => self.record_lag(n),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    fn record_lag(&self, n: u64) {
        self.stats.messages_dropped.fetch_add(n, Ordering::Relaxed);
        log::warn!("Observer {} lagged, dropped {n} oldest events", self.id);
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn garage(name: &str, count: u32) -> Garage {
        Garage {
            current_count: count,
            ..Garage::new(name, 29.6, -82.3, 12)
        }
    }

    #[tokio::test]
    async fn test_subscribe_unsubscribe() {
        let hub = BroadcastHub::new(16);
        let observer = hub.subscribe("Alice");
        let id = observer.id();
        assert_eq!(hub.observer_count(), 1);
        assert!(hub.has_observer(&id));

        assert!(hub.unsubscribe(observer));
        assert_eq!(hub.observer_count(), 0);
        assert!(!hub.has_observer(&id));
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let hub = BroadcastHub::new(16);
        {
            let _observer = hub.subscribe("short-lived");
            assert_eq!(hub.observer_count(), 1);
        }
        assert_eq!(hub.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_fan_out_exactly_once() {
        let hub = BroadcastHub::new(16);
        let mut observers: Vec<Observer> = (0..3).map(|i| hub.subscribe(format!("o{i}"))).collect();

        let count = hub.publish(&garage("Rawlings", 1));
        assert_eq!(count, 3);

        for observer in &mut observers {
            let event = observer.recv().await.unwrap();
            assert_eq!(event.garage.current_count, 1);
            assert!(event.payload.contains("\"currentCount\":1"));
            assert!(observer.try_recv().is_none());
        }
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_no_history() {
        let hub = BroadcastHub::new(16);
        hub.publish(&garage("Rawlings", 1));

        let mut late = hub.subscribe("late");
        assert!(late.try_recv().is_none());

        hub.publish(&garage("Rawlings", 2));
        assert_eq!(late.recv().await.unwrap().garage.current_count, 2);
    }

    #[tokio::test]
    async fn test_slow_observer_drops_oldest() {
        let hub = BroadcastHub::new(4);
        let mut slow = hub.subscribe("slow");

        for i in 1..=10 {
            hub.publish(&garage("Rawlings", i));
        }

        // Only the newest four survive, still in publish order.
        let mut seen = Vec::new();
        while let Some(event) = slow.try_recv() {
            seen.push(event.garage.current_count);
        }
        assert_eq!(seen, vec![7, 8, 9, 10]);
        assert_eq!(hub.stats().messages_dropped, 6);
    }

    #[tokio::test]
    async fn test_publish_without_observers() {
        let hub = BroadcastHub::new(4);
        assert_eq!(hub.publish(&garage("Rawlings", 1)), 0);
        assert_eq!(hub.stats().messages_sent, 1);
    }

    #[tokio::test]
    async fn test_sequence_numbers_increase() {
        let hub = BroadcastHub::new(16);
        let mut observer = hub.subscribe("o");
        hub.publish(&garage("A", 1));
        hub.publish(&garage("B", 1));
        let first = observer.recv().await.unwrap();
        let second = observer.recv().await.unwrap();
        assert!(first.seq < second.seq);
        assert_eq!(first.garage.name, "A");
    }

    #[tokio::test]
    async fn test_observers_list() {
        let hub = BroadcastHub::new(16);
        let _a = hub.subscribe("Alice");
        let _b = hub.subscribe("Bob");

        let labels: Vec<String> = hub.observers().into_iter().map(|o| o.label).collect();
        assert_eq!(labels.len(), 2);
        assert!(labels.contains(&"Alice".to_string()));
        assert!(labels.contains(&"Bob".to_string()));
    }

    #[test]
    fn test_capacity() {
        assert_eq!(BroadcastHub::new(32).capacity(), 32);
        assert_eq!(BroadcastHub::new(0).capacity(), 1);
    }
}
