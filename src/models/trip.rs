use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::drone::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Planned,
    InProgress,
    Finished,
}

impl TripStatus {
    pub fn can_transition_to(self, next: TripStatus) -> bool {
        matches!(
            (self, next),
            (TripStatus::Planned, TripStatus::InProgress)
                | (TripStatus::Planned, TripStatus::Finished)
                | (TripStatus::InProgress, TripStatus::Finished)
        )
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TripStatus::Planned => "PLANNED",
            TripStatus::InProgress => "IN_PROGRESS",
            TripStatus::Finished => "FINISHED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripStop {
    pub id: u64,
    pub trip_id: u64,
    pub order_id: u64,
    pub seq: u32,
    pub x: f64,
    pub y: f64,
    pub weight_kg: f64,
    pub estimated_arrival_at: Option<DateTime<Utc>>,
    pub estimated_departure_at: Option<DateTime<Utc>>,
    pub delivered: bool,
}

impl TripStop {
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: u64,
    pub drone_id: u64,
    pub origin: Point,
    pub total_weight: f64,
    pub total_distance_km: f64,
    pub start_at: DateTime<Utc>,
    pub estimated_finish_at: Option<DateTime<Utc>>,
    pub finish_at: Option<DateTime<Utc>>,
    pub status: TripStatus,
    /// Kept sorted by `seq`, which always runs 1..=n.
    pub stops: Vec<TripStop>,
}

impl Trip {
    pub fn transition_to(&mut self, next: TripStatus) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                entity: "trip",
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }

        self.status = next;
        Ok(())
    }

    pub fn stop(&self, seq: u32) -> Option<&TripStop> {
        self.stops.iter().find(|stop| stop.seq == seq)
    }

    pub fn stop_index(&self, seq: u32) -> Result<usize, AppError> {
        self.stops
            .iter()
            .position(|stop| stop.seq == seq)
            .ok_or_else(|| AppError::NotFound(format!("stop {seq} not found in trip {}", self.id)))
    }

    pub fn all_delivered(&self) -> bool {
        self.stops.iter().all(|stop| stop.delivered)
    }

    /// Reassigns `seq` from the current vector order.
    pub fn renumber(&mut self) {
        for (idx, stop) in self.stops.iter_mut().enumerate() {
            stop.seq = idx as u32 + 1;
        }
    }

    pub fn has_contiguous_sequence(&self) -> bool {
        self.stops
            .iter()
            .enumerate()
            .all(|(idx, stop)| stop.seq == idx as u32 + 1)
    }
}
