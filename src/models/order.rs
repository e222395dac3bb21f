use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::drone::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Lower rank is served first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Planned,
    Delivered,
    Rejected,
}

impl OrderStatus {
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Planned)
                | (OrderStatus::Planned, OrderStatus::Delivered)
                | (OrderStatus::Pending, OrderStatus::Rejected)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Planned => "PLANNED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Rejected => "REJECTED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub customer: Point,
    pub weight_kg: f64,
    pub priority: Priority,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                entity: "order",
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }

        self.status = next;
        Ok(())
    }

    /// Hands a planned order back to the pending pool when its stop is removed.
    pub fn release(&mut self) -> Result<(), AppError> {
        if self.status != OrderStatus::Planned {
            return Err(AppError::InvalidTransition {
                entity: "order",
                from: self.status.to_string(),
                to: OrderStatus::Pending.to_string(),
            });
        }

        self.status = OrderStatus::Pending;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.weight_kg.is_finite() && self.weight_kg > 0.0) {
            return Err(AppError::Validation(format!("order {}: weight_kg must be > 0", self.id)));
        }
        if !self.customer.is_finite() {
            return Err(AppError::Validation(format!(
                "order {}: customer coordinates must be finite",
                self.id
            )));
        }
        Ok(())
    }
}
