use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::PlanningConfig;
use crate::engine::feasibility;
use crate::engine::sequencer;
use crate::error::AppError;
use crate::models::{Drone, Order, OrderStatus, Point};

/// Working set of one planning run.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub drones: Vec<Drone>,
    pub orders: Vec<Order>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStop {
    pub order_id: u64,
    pub seq: u32,
    pub point: Point,
    pub weight_kg: f64,
    pub estimated_arrival_at: DateTime<Utc>,
    pub estimated_departure_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTrip {
    pub drone_id: u64,
    pub origin: Point,
    pub total_weight: f64,
    pub total_distance_km: f64,
    pub start_at: DateTime<Utc>,
    pub estimated_finish_at: DateTime<Utc>,
    pub stops: Vec<PlannedStop>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanOutcome {
    pub trips: Vec<PlannedTrip>,
    /// Left PENDING for a later run.
    pub unassigned: Vec<u64>,
    pub rejected: Vec<u64>,
}

/// Partitions the snapshot's pending orders among its idle drones.
///
/// Orders are considered HIGH first, then by ascending id; drones by
/// ascending id. Each drone greedily takes every order that keeps its
/// candidate set feasible, skipping the ones that do not.
pub fn plan(
    snapshot: &Snapshot,
    config: &PlanningConfig,
    now: DateTime<Utc>,
) -> Result<PlanOutcome, AppError> {
    validate(snapshot)?;

    let mut drones: Vec<&Drone> = snapshot.drones.iter().collect();
    drones.sort_by_key(|drone| drone.id);

    let mut queue: Vec<&Order> = snapshot.orders.iter().collect();
    queue.sort_by_key(|order| (order.priority.rank(), order.id));

    let mut assigned: HashSet<u64> = HashSet::new();
    let mut trips = Vec::new();

    for drone in drones {
        let mut candidate: Vec<&Order> = Vec::new();
        let mut accepted = None;

        for order in queue.iter().copied() {
            if assigned.contains(&order.id) {
                continue;
            }

            candidate.push(order);
            let result = feasibility::evaluate(drone, &candidate, config.base);
            if result.is_ok() {
                accepted = Some(result);
            } else {
                candidate.pop();
                if let Some(reason) = result.reason {
                    debug!(drone_id = drone.id, order_id = order.id, %reason, "order skipped for drone");
                }
            }
        }

        let Some(feasible) = accepted.filter(|_| !candidate.is_empty()) else {
            continue;
        };

        assigned.extend(candidate.iter().map(|order| order.id));

        let times = sequencer::schedule(
            &feasible.route,
            now,
            drone.speed_kmh,
            config.service_time(),
        )?;
        let stops = feasible
            .route
            .stops
            .iter()
            .zip(times.stops.iter())
            .enumerate()
            .map(|(idx, (stop, at))| {
                let weight_kg = candidate
                    .iter()
                    .find(|order| order.id == stop.order_id)
                    .map(|order| order.weight_kg)
                    .unwrap_or_default();
                PlannedStop {
                    order_id: stop.order_id,
                    seq: idx as u32 + 1,
                    point: stop.point,
                    weight_kg,
                    estimated_arrival_at: at.arrival,
                    estimated_departure_at: at.departure,
                }
            })
            .collect();

        trips.push(PlannedTrip {
            drone_id: drone.id,
            origin: drone.location,
            total_weight: feasible.total_weight,
            total_distance_km: feasible.total_distance_km,
            start_at: now,
            estimated_finish_at: times.finish_at,
            stops,
        });
    }

    let mut unassigned = Vec::new();
    let mut rejected = Vec::new();

    for order in queue.iter().filter(|order| !assigned.contains(&order.id)) {
        if config.reject_unservable && unservable(order, &snapshot.drones, config.base) {
            rejected.push(order.id);
        } else {
            unassigned.push(order.id);
        }
    }

    Ok(PlanOutcome {
        trips,
        unassigned,
        rejected,
    })
}

/// True when no idle drone could carry `order` even as its only stop.
fn unservable(order: &Order, drones: &[Drone], base: Point) -> bool {
    !drones.is_empty()
        && drones
            .iter()
            .all(|drone| !feasibility::evaluate(drone, &[order], base).is_ok())
}

fn validate(snapshot: &Snapshot) -> Result<(), AppError> {
    let mut drone_ids = HashSet::new();
    for drone in &snapshot.drones {
        if !drone_ids.insert(drone.id) {
            return Err(AppError::Validation(format!("duplicate drone id {}", drone.id)));
        }
        if !drone.is_idle() {
            return Err(AppError::Validation(format!(
                "drone {} is {}, only IDLE drones can be planned",
                drone.id, drone.status
            )));
        }
        drone.validate()?;
    }

    let mut order_ids = HashSet::new();
    for order in &snapshot.orders {
        if !order_ids.insert(order.id) {
            return Err(AppError::Validation(format!("duplicate order id {}", order.id)));
        }
        if order.status != OrderStatus::Pending {
            return Err(AppError::Validation(format!(
                "order {} is {}, only PENDING orders can be planned",
                order.id, order.status
            )));
        }
        order.validate()?;
    }

    Ok(())
}
