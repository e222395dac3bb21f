pub mod assignment;
pub mod feasibility;
pub mod fulfillment;
pub mod planner;
pub mod sequencer;
pub mod stops;
