use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::config::PlanningConfig;
use crate::engine::planner::Snapshot;
use crate::models::{Drone, DroneStatus, Order, OrderStatus, Trip, TripStatus};
use crate::observability::metrics::Metrics;

/// Change notifications pushed to websocket subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TripEvent {
    Planned { run_id: Uuid, trip: Trip },
    StopMoved { trip_id: u64, seq: u32, to_seq: u32 },
    StopDelivered { trip_id: u64, seq: u32, order_id: u64 },
    StopDeleted { trip_id: u64, seq: u32, order_id: u64 },
    Finished { trip_id: u64, drone_id: u64 },
    Cancelled { trip_id: u64, drone_id: u64 },
}

#[derive(Debug, Default)]
pub struct IdSequence(AtomicU64);

impl IdSequence {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

pub struct AppState {
    pub drones: DashMap<u64, Drone>,
    pub orders: DashMap<u64, Order>,
    pub trips: DashMap<u64, Trip>,
    pub drone_ids: IdSequence,
    pub order_ids: IdSequence,
    pub trip_ids: IdSequence,
    pub stop_ids: IdSequence,
    /// Guards the idle-drone / pending-order working set.
    pub planning_lock: Mutex<()>,
    trip_locks: DashMap<u64, Arc<Mutex<()>>>,
    pub trip_events_tx: broadcast::Sender<TripEvent>,
    pub planning: PlanningConfig,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(planning: PlanningConfig, event_buffer_size: usize) -> Self {
        let (trip_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            drones: DashMap::new(),
            orders: DashMap::new(),
            trips: DashMap::new(),
            drone_ids: IdSequence::default(),
            order_ids: IdSequence::default(),
            trip_ids: IdSequence::default(),
            stop_ids: IdSequence::default(),
            planning_lock: Mutex::new(()),
            trip_locks: DashMap::new(),
            trip_events_tx,
            planning,
            metrics: Metrics::new(),
        }
    }

    /// Writer lock for one trip's stops.
    pub fn trip_lock(&self, trip_id: u64) -> Arc<Mutex<()>> {
        self.trip_locks
            .entry(trip_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the writer lock of a trip that is finished or gone. Holders of
    /// the old lock only see a closed trip afterwards.
    pub fn forget_trip_lock(&self, trip_id: u64) {
        self.trip_locks.remove(&trip_id);
    }

    /// Whether `drone_id` owns an unfinished trip other than `except`.
    pub fn has_open_trip(&self, drone_id: u64, except: Option<u64>) -> bool {
        self.trips.iter().any(|entry| {
            entry.drone_id == drone_id
                && entry.status != TripStatus::Finished
                && Some(entry.id) != except
        })
    }

    /// Copies the idle drones and pending orders. Callers hold `planning_lock`.
    pub fn snapshot(&self) -> Snapshot {
        let drones = self
            .drones
            .iter()
            .filter(|entry| entry.status == DroneStatus::Idle)
            .map(|entry| entry.value().clone())
            .collect();
        let orders = self
            .orders
            .iter()
            .filter(|entry| entry.status == OrderStatus::Pending)
            .map(|entry| entry.value().clone())
            .collect();

        Snapshot { drones, orders }
    }

    pub fn refresh_pending_gauge(&self) {
        let pending = self
            .orders
            .iter()
            .filter(|entry| entry.status == OrderStatus::Pending)
            .count();
        self.metrics.orders_pending.set(pending as i64);
    }

    pub fn publish(&self, event: TripEvent) {
        let _ = self.trip_events_tx.send(event);
    }
}
