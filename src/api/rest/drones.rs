use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::models::{Drone, DroneStatus, Point};
use crate::state::AppState;

const DEFAULT_SPEED_KMH: f64 = 40.0;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drones", post(create_drone).get(list_drones))
        .route(
            "/drones/:id",
            get(get_drone).patch(update_drone).delete(delete_drone),
        )
        .route("/drones/:id/status", patch(update_drone_status))
        .route("/drones/:id/battery", patch(update_drone_battery))
        .route("/drones/:id/location", patch(update_drone_location))
}

#[derive(Deserialize)]
pub struct CreateDroneRequest {
    pub name: Option<String>,
    pub capacity_kg: f64,
    pub range_km: f64,
    pub speed_kmh: Option<f64>,
    pub battery_pct: Option<u8>,
    pub location: Option<Point>,
}

#[derive(Deserialize)]
pub struct UpdateDroneRequest {
    pub name: Option<String>,
    pub capacity_kg: Option<f64>,
    pub range_km: Option<f64>,
    pub speed_kmh: Option<f64>,
}

#[derive(Deserialize)]
pub struct DroneFilter {
    pub status: Option<DroneStatus>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DroneStatus,
}

#[derive(Deserialize)]
pub struct UpdateBatteryRequest {
    pub battery_pct: u8,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: Point,
}

async fn create_drone(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDroneRequest>,
) -> Result<Json<Drone>, AppError> {
    let _guard = state.planning_lock.lock().await;

    let id = state.drone_ids.next();
    let name = payload
        .name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| format!("Drone-{id}"));

    let drone = Drone {
        id,
        name,
        capacity_kg: payload.capacity_kg,
        range_km: payload.range_km,
        speed_kmh: payload.speed_kmh.unwrap_or(DEFAULT_SPEED_KMH),
        battery_pct: payload.battery_pct.unwrap_or(100),
        status: DroneStatus::Idle,
        location: payload.location.unwrap_or(state.planning.base),
        updated_at: Utc::now(),
    };
    drone.validate()?;

    state.drones.insert(drone.id, drone.clone());
    info!(drone_id = drone.id, capacity_kg = drone.capacity_kg, "drone registered");
    Ok(Json(drone))
}

async fn list_drones(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<DroneFilter>,
) -> Json<Vec<Drone>> {
    let mut drones: Vec<Drone> = state
        .drones
        .iter()
        .filter(|entry| filter.status.is_none_or(|status| entry.status == status))
        .map(|entry| entry.value().clone())
        .collect();
    drones.sort_by_key(|drone| drone.id);
    Json(drones)
}

async fn get_drone(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Drone>, AppError> {
    let drone = state
        .drones
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("drone {id} not found")))?;

    Ok(Json(drone.value().clone()))
}

async fn update_drone(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(payload): Json<UpdateDroneRequest>,
) -> Result<Json<Drone>, AppError> {
    let _guard = state.planning_lock.lock().await;

    let mut drone = state
        .drones
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("drone {id} not found")))?;

    let mut updated = drone.clone();
    if let Some(name) = payload.name {
        updated.name = name;
    }
    if let Some(capacity_kg) = payload.capacity_kg {
        updated.capacity_kg = capacity_kg;
    }
    if let Some(range_km) = payload.range_km {
        updated.range_km = range_km;
    }
    if let Some(speed_kmh) = payload.speed_kmh {
        updated.speed_kmh = speed_kmh;
    }
    updated.validate()?;
    updated.updated_at = Utc::now();

    *drone = updated;
    Ok(Json(drone.clone()))
}

async fn delete_drone(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    let _guard = state.planning_lock.lock().await;

    let status = state
        .drones
        .get(&id)
        .map(|drone| drone.status)
        .ok_or_else(|| AppError::NotFound(format!("drone {id} not found")))?;

    if status != DroneStatus::Idle || state.has_open_trip(id, None) {
        return Err(AppError::Conflict(format!(
            "cannot delete drone {id} with status {status}"
        )));
    }

    state.drones.remove(&id);
    info!(drone_id = id, "drone removed");
    Ok(StatusCode::NO_CONTENT)
}

async fn update_drone_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Drone>, AppError> {
    let _guard = state.planning_lock.lock().await;

    let grounded = matches!(payload.status, DroneStatus::Idle | DroneStatus::Charging);
    if grounded && state.has_open_trip(id, None) {
        return Err(AppError::Conflict(format!(
            "drone {id} still has an open trip and cannot become {}",
            payload.status
        )));
    }

    let mut drone = state
        .drones
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("drone {id} not found")))?;

    drone.transition_to(payload.status)?;

    Ok(Json(drone.clone()))
}

async fn update_drone_battery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(payload): Json<UpdateBatteryRequest>,
) -> Result<Json<Drone>, AppError> {
    if payload.battery_pct > 100 {
        return Err(AppError::Validation(
            "battery_pct must be between 0 and 100".to_string(),
        ));
    }

    let _guard = state.planning_lock.lock().await;

    let mut drone = state
        .drones
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("drone {id} not found")))?;

    drone.battery_pct = payload.battery_pct;
    drone.updated_at = Utc::now();

    Ok(Json(drone.clone()))
}

async fn update_drone_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Drone>, AppError> {
    if !payload.location.is_finite() {
        return Err(AppError::Validation("location must be finite".to_string()));
    }

    let _guard = state.planning_lock.lock().await;

    let mut drone = state
        .drones
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("drone {id} not found")))?;

    drone.location = payload.location;
    drone.updated_at = Utc::now();

    Ok(Json(drone.clone()))
}
