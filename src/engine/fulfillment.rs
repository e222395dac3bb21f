use chrono::Utc;
use tracing::{info, warn};

use crate::config::FinishPosition;
use crate::engine::stops::{self, Delivery, Removal, RouteContext};
use crate::error::AppError;
use crate::models::{Drone, DroneStatus, Order, OrderStatus, Point, Trip, TripStatus, TripStop};
use crate::state::{AppState, TripEvent};

fn load_trip(state: &AppState, trip_id: u64) -> Result<Trip, AppError> {
    state
        .trips
        .get(&trip_id)
        .map(|trip| trip.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))
}

fn load_drone(state: &AppState, drone_id: u64) -> Result<Drone, AppError> {
    state
        .drones
        .get(&drone_id)
        .map(|drone| drone.value().clone())
        .ok_or_else(|| AppError::Validation(format!("trip references unknown drone {drone_id}")))
}

fn load_order(state: &AppState, order_id: u64) -> Result<Order, AppError> {
    state
        .orders
        .get(&order_id)
        .map(|order| order.value().clone())
        .ok_or_else(|| AppError::Validation(format!("stop references unknown order {order_id}")))
}

fn route_context(state: &AppState, drone: &Drone) -> RouteContext {
    RouteContext {
        base: state.planning.base,
        speed_kmh: drone.speed_kmh,
        service_time: state.planning.service_time(),
    }
}

/// Where the drone of a finished trip ends up.
fn finish_point(state: &AppState, trip: &Trip) -> Point {
    match (trip.stops.last(), state.planning.finish_position) {
        (None, _) => trip.origin,
        (Some(_), FinishPosition::Base) => state.planning.base,
        (Some(last), FinishPosition::LastStop) => last.point(),
    }
}

/// Outcome for the drone of a trip that just closed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landing {
    pub drone_id: u64,
    /// False when the drone still owns another open trip and keeps flying.
    pub idle: bool,
}

/// Brings the drone of a closed trip back to IDLE at `at`, in place, unless
/// it still owns another open trip. Other drone fields are left as they are.
fn land(state: &AppState, trip: &Trip, at: Point) -> Result<Landing, AppError> {
    let still_busy = state.has_open_trip(trip.drone_id, Some(trip.id));

    let mut drone = state.drones.get_mut(&trip.drone_id).ok_or_else(|| {
        AppError::Validation(format!("trip references unknown drone {}", trip.drone_id))
    })?;

    if !still_busy {
        if drone.status != DroneStatus::Idle {
            drone.transition_to(DroneStatus::Idle)?;
        }
        drone.location = at;
        drone.updated_at = Utc::now();
    }

    Ok(Landing {
        drone_id: trip.drone_id,
        idle: !still_busy,
    })
}

// The apply_* helpers validate every cascaded change on clones before
// writing any of them back, so a failure leaves the store untouched. The
// drone is only touched in place by `land`, which fails before mutating.

fn apply_move(state: &AppState, trip_id: u64, seq: u32, to_seq: u32) -> Result<Trip, AppError> {
    let mut trip = load_trip(state, trip_id)?;
    let drone = load_drone(state, trip.drone_id)?;

    stops::move_stop(&mut trip, seq, to_seq, &route_context(state, &drone))?;

    let budget = drone.available_range_km();
    if trip.total_distance_km > budget {
        warn!(
            trip_id,
            total_distance_km = trip.total_distance_km,
            available_range_km = budget,
            "reordered route exceeds the drone's current range"
        );
    }

    state.trips.insert(trip.id, trip.clone());
    Ok(trip)
}

fn apply_delivery(
    state: &AppState,
    trip_id: u64,
    seq: u32,
) -> Result<(TripStop, Delivery, Option<Landing>), AppError> {
    let mut trip = load_trip(state, trip_id)?;
    let delivery = stops::mark_delivered(&mut trip, seq, Utc::now())?;
    let stop = trip
        .stop(seq)
        .cloned()
        .ok_or_else(|| AppError::Internal(format!("stop {seq} vanished from trip {trip_id}")))?;

    if !delivery.newly_delivered {
        return Ok((stop, delivery, None));
    }

    let mut order = load_order(state, delivery.order_id)?;
    order.transition_to(OrderStatus::Delivered)?;

    let landing = if delivery.trip_finished {
        Some(land(state, &trip, finish_point(state, &trip))?)
    } else {
        None
    };

    state.orders.insert(order.id, order);
    state.trips.insert(trip.id, trip);

    Ok((stop, delivery, landing))
}

fn apply_delete(
    state: &AppState,
    trip_id: u64,
    seq: u32,
) -> Result<(Trip, Removal, Option<Landing>), AppError> {
    let mut trip = load_trip(state, trip_id)?;
    let drone = load_drone(state, trip.drone_id)?;

    let removal = stops::delete_stop(&mut trip, seq, &route_context(state, &drone), Utc::now())?;

    let mut order = load_order(state, removal.stop.order_id)?;
    order.release()?;

    let landing = if removal.trip_finished {
        Some(land(state, &trip, finish_point(state, &trip))?)
    } else {
        None
    };

    state.orders.insert(order.id, order);
    state.trips.insert(trip.id, trip.clone());

    Ok((trip, removal, landing))
}

fn apply_cancel(state: &AppState, trip_id: u64) -> Result<(Trip, Landing), AppError> {
    let trip = load_trip(state, trip_id)?;
    if trip.status != TripStatus::Planned {
        return Err(AppError::Conflict(format!(
            "trip {trip_id} is {} and only PLANNED trips can be deleted",
            trip.status
        )));
    }

    let orders = trip
        .stops
        .iter()
        .map(|stop| {
            let mut order = load_order(state, stop.order_id)?;
            order.release()?;
            Ok(order)
        })
        .collect::<Result<Vec<Order>, AppError>>()?;

    let landing = land(state, &trip, trip.origin)?;

    for order in orders {
        state.orders.insert(order.id, order);
    }
    state.trips.remove(&trip_id);

    Ok((trip, landing))
}

pub fn list_stops(state: &AppState, trip_id: u64) -> Result<Vec<TripStop>, AppError> {
    Ok(load_trip(state, trip_id)?.stops)
}

pub fn get_stop(state: &AppState, trip_id: u64, seq: u32) -> Result<TripStop, AppError> {
    let trip = load_trip(state, trip_id)?;
    trip.stop(seq)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("stop {seq} not found in trip {trip_id}")))
}

pub async fn move_stop(state: &AppState, trip_id: u64, seq: u32, to_seq: u32) -> Result<Trip, AppError> {
    let lock = state.trip_lock(trip_id);
    let _guard = lock.lock().await;

    let result = apply_move(state, trip_id, seq, to_seq);

    state.metrics.record_stop_mutation("move", &result);
    if result.is_ok() {
        info!(trip_id, seq, to_seq, "stop moved");
        state.publish(TripEvent::StopMoved {
            trip_id,
            seq,
            to_seq,
        });
    }
    result
}

pub async fn mark_delivered(state: &AppState, trip_id: u64, seq: u32) -> Result<TripStop, AppError> {
    let lock = state.trip_lock(trip_id);
    let _guard = lock.lock().await;

    let result = apply_delivery(state, trip_id, seq);

    state.metrics.record_stop_mutation("deliver", &result);
    let (stop, delivery, landing) = result?;

    if delivery.newly_delivered {
        info!(trip_id, seq, order_id = delivery.order_id, "stop delivered");
        state.publish(TripEvent::StopDelivered {
            trip_id,
            seq,
            order_id: delivery.order_id,
        });
    }
    if let Some(landing) = landing {
        finished(state, trip_id, landing);
    }

    Ok(stop)
}

pub async fn delete_stop(state: &AppState, trip_id: u64, seq: u32) -> Result<Trip, AppError> {
    let lock = state.trip_lock(trip_id);
    let _guard = lock.lock().await;

    let result = apply_delete(state, trip_id, seq);

    state.metrics.record_stop_mutation("delete", &result);
    let (trip, removal, landing) = result?;

    state.refresh_pending_gauge();
    info!(trip_id, seq, order_id = removal.stop.order_id, "stop deleted, order pending again");
    state.publish(TripEvent::StopDeleted {
        trip_id,
        seq,
        order_id: removal.stop.order_id,
    });
    if let Some(landing) = landing {
        finished(state, trip_id, landing);
    }

    Ok(trip)
}

/// Deletes a trip that has not started, returning its orders to PENDING and
/// its drone to IDLE at the trip origin.
pub async fn cancel_trip(state: &AppState, trip_id: u64) -> Result<Trip, AppError> {
    let _planning = state.planning_lock.lock().await;
    let lock = state.trip_lock(trip_id);
    let _guard = lock.lock().await;

    let result = apply_cancel(state, trip_id);

    state.metrics.record_stop_mutation("cancel_trip", &result);
    let (trip, landing) = result?;

    state.forget_trip_lock(trip_id);
    state.refresh_pending_gauge();
    info!(
        trip_id,
        drone_id = landing.drone_id,
        released_orders = trip.stops.len(),
        "trip cancelled"
    );
    state.publish(TripEvent::Cancelled {
        trip_id,
        drone_id: landing.drone_id,
    });

    Ok(trip)
}

fn finished(state: &AppState, trip_id: u64, landing: Landing) {
    state.forget_trip_lock(trip_id);
    if landing.idle {
        info!(trip_id, drone_id = landing.drone_id, "trip finished, drone idle");
    } else {
        info!(
            trip_id,
            drone_id = landing.drone_id,
            "trip finished, drone still has an open trip"
        );
    }
    state.publish(TripEvent::Finished {
        trip_id,
        drone_id: landing.drone_id,
    });
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{cancel_trip, delete_stop, get_stop, mark_delivered, move_stop};
    use crate::config::{FinishPosition, PlanningConfig};
    use crate::engine::assignment::run_planning;
    use crate::error::AppError;
    use crate::models::{Drone, DroneStatus, Order, OrderStatus, Point, Priority, TripStatus};
    use crate::state::AppState;

    async fn planned_state(config: PlanningConfig, orders: &[(f64, f64)]) -> (AppState, u64) {
        let state = AppState::new(config, 16);
        state.drones.insert(
            1,
            Drone {
                id: 1,
                name: "d-1".to_string(),
                capacity_kg: 10.0,
                range_km: 50.0,
                speed_kmh: 40.0,
                battery_pct: 100,
                status: DroneStatus::Idle,
                location: Point::new(0.0, 0.0),
                updated_at: Utc::now(),
            },
        );
        for (idx, (x, y)) in orders.iter().enumerate() {
            let id = idx as u64 + 1;
            state.orders.insert(
                id,
                Order {
                    id,
                    customer: Point::new(*x, *y),
                    weight_kg: 1.0,
                    priority: Priority::High,
                    status: OrderStatus::Pending,
                    created_at: Utc::now(),
                },
            );
        }
        let report = run_planning(&state).await.unwrap();
        let trip_id = report.trips[0].id;
        (state, trip_id)
    }

    #[tokio::test]
    async fn delivering_every_stop_idles_the_drone_at_base() {
        let (state, trip_id) = planned_state(PlanningConfig::default(), &[(3.0, 4.0), (6.0, 8.0)]).await;

        mark_delivered(&state, trip_id, 1).await.unwrap();
        assert_eq!(state.drones.get(&1).unwrap().status, DroneStatus::Flying);
        assert_eq!(state.trips.get(&trip_id).unwrap().status, TripStatus::InProgress);

        let stop = mark_delivered(&state, trip_id, 2).await.unwrap();
        assert!(stop.delivered);

        let trip = state.trips.get(&trip_id).unwrap().clone();
        assert_eq!(trip.status, TripStatus::Finished);
        assert!(trip.finish_at.is_some());
        let drone = state.drones.get(&1).unwrap().clone();
        assert_eq!(drone.status, DroneStatus::Idle);
        assert_eq!(drone.location, Point::new(0.0, 0.0));
        assert_eq!(state.orders.get(&1).unwrap().status, OrderStatus::Delivered);
        assert_eq!(state.orders.get(&2).unwrap().status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn last_stop_mode_leaves_drone_at_final_delivery() {
        let config = PlanningConfig {
            finish_position: FinishPosition::LastStop,
            ..PlanningConfig::default()
        };
        let (state, trip_id) = planned_state(config, &[(3.0, 4.0), (6.0, 8.0)]).await;

        mark_delivered(&state, trip_id, 1).await.unwrap();
        mark_delivered(&state, trip_id, 2).await.unwrap();

        assert_eq!(state.drones.get(&1).unwrap().location, Point::new(6.0, 8.0));
    }

    #[tokio::test]
    async fn re_marking_does_not_touch_the_order_again() {
        let (state, trip_id) = planned_state(PlanningConfig::default(), &[(3.0, 4.0), (6.0, 8.0)]).await;

        mark_delivered(&state, trip_id, 1).await.unwrap();
        let again = mark_delivered(&state, trip_id, 1).await.unwrap();

        assert!(again.delivered);
        assert_eq!(state.orders.get(&1).unwrap().status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn deleting_the_only_stop_releases_order_and_drone() {
        let (state, trip_id) = planned_state(PlanningConfig::default(), &[(3.0, 4.0)]).await;

        let trip = delete_stop(&state, trip_id, 1).await.unwrap();

        assert!(trip.stops.is_empty());
        assert_eq!(trip.status, TripStatus::Finished);
        assert_eq!(state.orders.get(&1).unwrap().status, OrderStatus::Pending);
        assert_eq!(state.drones.get(&1).unwrap().status, DroneStatus::Idle);

        let replanned = run_planning(&state).await.unwrap();
        assert_eq!(replanned.trips.len(), 1);
        assert_eq!(replanned.trips[0].stops[0].order_id, 1);
    }

    #[tokio::test]
    async fn delivered_stop_delete_is_a_conflict() {
        let (state, trip_id) = planned_state(PlanningConfig::default(), &[(3.0, 4.0), (6.0, 8.0)]).await;
        mark_delivered(&state, trip_id, 1).await.unwrap();

        let err = delete_stop(&state, trip_id, 1).await.unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert!(get_stop(&state, trip_id, 1).unwrap().delivered);
    }

    #[tokio::test]
    async fn move_keeps_sequence_contiguous() {
        let (state, trip_id) =
            planned_state(PlanningConfig::default(), &[(1.0, 0.0), (2.0, 0.0), (3.0, 0.0)]).await;

        let trip = move_stop(&state, trip_id, 3, 1).await.unwrap();

        let order_ids: Vec<u64> = trip.stops.iter().map(|s| s.order_id).collect();
        let seqs: Vec<u32> = trip.stops.iter().map(|s| s.seq).collect();
        assert_eq!(order_ids, vec![3, 1, 2]);
        assert_eq!(seqs, vec![1, 2, 3]);

        let err = move_stop(&state, trip_id, 1, 4).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSequence(_)));
    }

    #[tokio::test]
    async fn unknown_trip_is_not_found() {
        let state = AppState::new(PlanningConfig::default(), 16);
        assert!(matches!(
            mark_delivered(&state, 42, 1).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn finishing_one_trip_keeps_a_drone_with_another_open_trip_busy() {
        let (state, trip_id) = planned_state(PlanningConfig::default(), &[(3.0, 4.0)]).await;
        let mut second = state.trips.get(&trip_id).unwrap().clone();
        second.id = trip_id + 100;
        state.trips.insert(second.id, second);

        mark_delivered(&state, trip_id, 1).await.unwrap();

        assert_eq!(state.trips.get(&trip_id).unwrap().status, TripStatus::Finished);
        assert_eq!(state.drones.get(&1).unwrap().status, DroneStatus::Flying);
        assert!(run_planning(&state).await.unwrap().trips.is_empty());
    }

    #[tokio::test]
    async fn landing_keeps_drone_fields_changed_during_the_trip() {
        let (state, trip_id) = planned_state(PlanningConfig::default(), &[(3.0, 4.0), (6.0, 8.0)]).await;
        mark_delivered(&state, trip_id, 1).await.unwrap();

        let battery = async {
            let _guard = state.planning_lock.lock().await;
            let mut drone = state.drones.get_mut(&1).unwrap();
            drone.battery_pct = 37;
            drone.name = "renamed".to_string();
        };
        let (_, delivered) = tokio::join!(battery, mark_delivered(&state, trip_id, 2));
        delivered.unwrap();

        let drone = state.drones.get(&1).unwrap().clone();
        assert_eq!(drone.status, DroneStatus::Idle);
        assert_eq!(drone.battery_pct, 37);
        assert_eq!(drone.name, "renamed");
    }

    #[tokio::test]
    async fn cancelling_a_planned_trip_releases_everything() {
        let (state, trip_id) = planned_state(PlanningConfig::default(), &[(3.0, 4.0), (6.0, 8.0)]).await;

        let trip = cancel_trip(&state, trip_id).await.unwrap();

        assert_eq!(trip.stops.len(), 2);
        assert!(state.trips.get(&trip_id).is_none());
        assert_eq!(state.orders.get(&1).unwrap().status, OrderStatus::Pending);
        assert_eq!(state.orders.get(&2).unwrap().status, OrderStatus::Pending);
        let drone = state.drones.get(&1).unwrap().clone();
        assert_eq!(drone.status, DroneStatus::Idle);
        assert_eq!(drone.location, trip.origin);

        assert_eq!(run_planning(&state).await.unwrap().trips.len(), 1);
    }

    #[tokio::test]
    async fn started_trip_cannot_be_cancelled() {
        let (state, trip_id) = planned_state(PlanningConfig::default(), &[(3.0, 4.0), (6.0, 8.0)]).await;
        mark_delivered(&state, trip_id, 1).await.unwrap();

        let err = cancel_trip(&state, trip_id).await.unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(state.trips.get(&trip_id).unwrap().status, TripStatus::InProgress);
        assert_eq!(state.orders.get(&2).unwrap().status, OrderStatus::Planned);
    }
}
