use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, info_span};
use uuid::Uuid;

use crate::engine::planner::{self, PlanOutcome, PlannedTrip};
use crate::error::AppError;
use crate::models::{DroneStatus, OrderStatus, Trip, TripStatus, TripStop};
use crate::state::{AppState, TripEvent};

/// Result of one planning run as returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub run_id: Uuid,
    pub trips: Vec<Trip>,
    pub pending_order_ids: Vec<u64>,
    pub rejected_order_ids: Vec<u64>,
}

/// Runs the planner over the current idle drones and pending orders and
/// commits the resulting trips. Runs are serialized by `planning_lock`.
pub async fn run_planning(state: &AppState) -> Result<PlanReport, AppError> {
    let run_id = Uuid::new_v4();
    let start = Instant::now();

    let result = {
        let _guard = state.planning_lock.lock().await;
        plan_and_commit(state, run_id)
    };

    let elapsed = start.elapsed().as_secs_f64();
    let outcome = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .plan_latency_seconds
        .with_label_values(&[outcome])
        .observe(elapsed);
    state
        .metrics
        .plan_runs_total
        .with_label_values(&[outcome])
        .inc();

    match &result {
        Ok(report) => {
            state
                .metrics
                .trips_created_total
                .inc_by(report.trips.len() as u64);
            state.refresh_pending_gauge();
            for trip in &report.trips {
                state.publish(TripEvent::Planned {
                    run_id,
                    trip: trip.clone(),
                });
            }
        }
        Err(err) => error!(%run_id, error = %err, "planning run failed"),
    }

    result
}

fn plan_and_commit(state: &AppState, run_id: Uuid) -> Result<PlanReport, AppError> {
    let _span = info_span!("plan", %run_id).entered();

    let snapshot = state.snapshot();
    let drones_considered = snapshot.drones.len();
    let orders_considered = snapshot.orders.len();

    let outcome = planner::plan(&snapshot, &state.planning, Utc::now())?;
    verify(state, &outcome)?;

    let trips: Vec<Trip> = outcome
        .trips
        .iter()
        .map(|planned| commit_trip(state, planned))
        .collect::<Result<_, _>>()?;

    for order_id in &outcome.rejected {
        if let Some(mut order) = state.orders.get_mut(order_id) {
            order.transition_to(OrderStatus::Rejected)?;
        }
    }

    info!(
        drones = drones_considered,
        orders = orders_considered,
        trips = trips.len(),
        pending = outcome.unassigned.len(),
        rejected = outcome.rejected.len(),
        "planning run committed"
    );

    Ok(PlanReport {
        run_id,
        trips,
        pending_order_ids: outcome.unassigned,
        rejected_order_ids: outcome.rejected,
    })
}

/// Confirms every entity the outcome touches is still in the state the
/// snapshot saw, so the commit below cannot stop halfway.
fn verify(state: &AppState, outcome: &PlanOutcome) -> Result<(), AppError> {
    for planned in &outcome.trips {
        let status = state
            .drones
            .get(&planned.drone_id)
            .map(|drone| drone.status)
            .ok_or_else(|| AppError::Validation(format!("unknown drone {}", planned.drone_id)))?;
        if status != DroneStatus::Idle {
            return Err(AppError::Validation(format!(
                "drone {} changed to {status} during planning",
                planned.drone_id
            )));
        }

        for stop in &planned.stops {
            ensure_pending(state, stop.order_id)?;
        }
    }

    for order_id in &outcome.rejected {
        ensure_pending(state, *order_id)?;
    }

    Ok(())
}

fn ensure_pending(state: &AppState, order_id: u64) -> Result<(), AppError> {
    let status = state
        .orders
        .get(&order_id)
        .map(|order| order.status)
        .ok_or_else(|| AppError::Validation(format!("unknown order {order_id}")))?;
    if status != OrderStatus::Pending {
        return Err(AppError::Validation(format!(
            "order {order_id} changed to {status} during planning"
        )));
    }
    Ok(())
}

fn commit_trip(state: &AppState, planned: &PlannedTrip) -> Result<Trip, AppError> {
    let trip_id = state.trip_ids.next();

    let stops = planned
        .stops
        .iter()
        .map(|stop| TripStop {
            id: state.stop_ids.next(),
            trip_id,
            order_id: stop.order_id,
            seq: stop.seq,
            x: stop.point.x,
            y: stop.point.y,
            weight_kg: stop.weight_kg,
            estimated_arrival_at: Some(stop.estimated_arrival_at),
            estimated_departure_at: Some(stop.estimated_departure_at),
            delivered: false,
        })
        .collect();

    let trip = Trip {
        id: trip_id,
        drone_id: planned.drone_id,
        origin: planned.origin,
        total_weight: planned.total_weight,
        total_distance_km: planned.total_distance_km,
        start_at: planned.start_at,
        estimated_finish_at: Some(planned.estimated_finish_at),
        finish_at: None,
        status: TripStatus::Planned,
        stops,
    };

    if let Some(mut drone) = state.drones.get_mut(&planned.drone_id) {
        drone.transition_to(DroneStatus::Flying)?;
    }
    for stop in &planned.stops {
        if let Some(mut order) = state.orders.get_mut(&stop.order_id) {
            order.transition_to(OrderStatus::Planned)?;
        }
    }

    state.trips.insert(trip.id, trip.clone());

    info!(
        trip_id = trip.id,
        drone_id = trip.drone_id,
        stops = trip.stops.len(),
        total_weight = trip.total_weight,
        total_distance_km = trip.total_distance_km,
        "trip planned"
    );

    Ok(trip)
}
