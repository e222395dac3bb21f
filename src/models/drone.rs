use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Position on the planar delivery grid, in kilometres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DroneStatus {
    Idle,
    Charging,
    Flying,
    Delivering,
    Returning,
}

impl DroneStatus {
    pub fn can_transition_to(self, next: DroneStatus) -> bool {
        use DroneStatus::*;

        matches!(
            (self, next),
            (Idle, Charging)
                | (Idle, Flying)
                | (Charging, Idle)
                | (Flying, Delivering)
                | (Flying, Returning)
                | (Flying, Idle)
                | (Delivering, Flying)
                | (Delivering, Returning)
                | (Delivering, Idle)
                | (Returning, Idle)
                | (Returning, Charging)
        )
    }
}

impl fmt::Display for DroneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DroneStatus::Idle => "IDLE",
            DroneStatus::Charging => "CHARGING",
            DroneStatus::Flying => "FLYING",
            DroneStatus::Delivering => "DELIVERING",
            DroneStatus::Returning => "RETURNING",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drone {
    pub id: u64,
    pub name: String,
    pub capacity_kg: f64,
    pub range_km: f64,
    pub speed_kmh: f64,
    pub battery_pct: u8,
    pub status: DroneStatus,
    pub location: Point,
    pub updated_at: DateTime<Utc>,
}

impl Drone {
    /// Distance the drone can still cover on its current charge.
    pub fn available_range_km(&self) -> f64 {
        self.range_km * f64::from(self.battery_pct) / 100.0
    }

    pub fn is_idle(&self) -> bool {
        self.status == DroneStatus::Idle
    }

    pub fn transition_to(&mut self, next: DroneStatus) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                entity: "drone",
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }

        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation(format!("drone {}: name must not be blank", self.id)));
        }
        if !(self.capacity_kg.is_finite() && self.capacity_kg > 0.0) {
            return Err(AppError::Validation(format!("drone {}: capacity_kg must be > 0", self.id)));
        }
        if !(self.range_km.is_finite() && self.range_km > 0.0) {
            return Err(AppError::Validation(format!("drone {}: range_km must be > 0", self.id)));
        }
        if !(self.speed_kmh.is_finite() && self.speed_kmh > 0.0) {
            return Err(AppError::Validation(format!("drone {}: speed_kmh must be > 0", self.id)));
        }
        if self.battery_pct > 100 {
            return Err(AppError::Validation(format!(
                "drone {}: battery_pct must be between 0 and 100",
                self.id
            )));
        }
        if !self.location.is_finite() {
            return Err(AppError::Validation(format!("drone {}: location must be finite", self.id)));
        }
        Ok(())
    }
}
