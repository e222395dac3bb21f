pub mod drone;
pub mod order;
pub mod trip;

pub use drone::{Drone, DroneStatus, Point};
pub use order::{Order, OrderStatus, Priority};
pub use trip::{Trip, TripStatus, TripStop};
