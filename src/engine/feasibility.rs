use std::fmt;

use crate::engine::sequencer::{self, Route};
use crate::models::{Drone, Order, Point};

const TOLERANCE: f64 = 1e-9;

/// Why a drone cannot fly a candidate order set. These are routing outcomes,
/// not errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Infeasible {
    OverCapacity { total_weight: f64, capacity_kg: f64 },
    InsufficientRange { total_distance_km: f64, available_range_km: f64 },
}

impl fmt::Display for Infeasible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Infeasible::OverCapacity {
                total_weight,
                capacity_kg,
            } => write!(f, "payload {total_weight:.3} kg exceeds capacity {capacity_kg:.3} kg"),
            Infeasible::InsufficientRange {
                total_distance_km,
                available_range_km,
            } => write!(
                f,
                "route {total_distance_km:.3} km exceeds available range {available_range_km:.3} km"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feasibility {
    pub total_weight: f64,
    pub total_distance_km: f64,
    pub route: Route,
    pub reason: Option<Infeasible>,
}

impl Feasibility {
    pub fn is_ok(&self) -> bool {
        self.reason.is_none()
    }
}

/// Checks payload and round-trip energy for `drone` carrying `orders`.
///
/// The route is the sequencer's nearest-neighbour tour from the drone's
/// position, so the return leg to `base` is part of the distance compared
/// against the battery budget.
pub fn evaluate(drone: &Drone, orders: &[&Order], base: Point) -> Feasibility {
    let total_weight: f64 = orders.iter().map(|order| order.weight_kg).sum();
    let route = sequencer::sequence(drone.location, base, orders);
    let total_distance_km = route.total_distance_km;

    let reason = if total_weight > drone.capacity_kg + TOLERANCE {
        Some(Infeasible::OverCapacity {
            total_weight,
            capacity_kg: drone.capacity_kg,
        })
    } else {
        let available_range_km = drone.available_range_km();
        if total_distance_km > available_range_km + TOLERANCE {
            Some(Infeasible::InsufficientRange {
                total_distance_km,
                available_range_km,
            })
        } else {
            None
        }
    };

    Feasibility {
        total_weight,
        total_distance_km,
        route,
        reason,
    }
}
