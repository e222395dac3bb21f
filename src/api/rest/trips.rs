use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::engine::assignment::{run_planning, PlanReport};
use crate::engine::fulfillment;
use crate::error::AppError;
use crate::models::{Trip, TripStatus, TripStop};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/plan", post(plan))
        .route("/trips", get(list_trips))
        .route("/trips/:id", get(get_trip).delete(delete_trip))
        .route("/trips/:id/stops", get(list_stops))
        .route("/trips/:id/stops/:seq", get(get_stop).delete(delete_stop))
        .route("/trips/:id/stops/:seq/move", patch(move_stop))
        .route("/trips/:id/stops/:seq/delivered", patch(mark_delivered))
}

#[derive(Deserialize)]
pub struct TripFilter {
    pub status: Option<TripStatus>,
    pub drone_id: Option<u64>,
}

#[derive(Deserialize)]
pub struct MoveStopRequest {
    pub to_seq: u32,
}

async fn plan(State(state): State<Arc<AppState>>) -> Result<Json<PlanReport>, AppError> {
    Ok(Json(run_planning(&state).await?))
}

async fn list_trips(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<TripFilter>,
) -> Json<Vec<Trip>> {
    let mut trips: Vec<Trip> = state
        .trips
        .iter()
        .filter(|entry| filter.status.is_none_or(|status| entry.status == status))
        .filter(|entry| filter.drone_id.is_none_or(|drone_id| entry.drone_id == drone_id))
        .map(|entry| entry.value().clone())
        .collect();
    trips.sort_by_key(|trip| trip.id);
    Json(trips)
}

async fn get_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Trip>, AppError> {
    let trip = state
        .trips
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("trip {id} not found")))?;

    Ok(Json(trip.value().clone()))
}

async fn delete_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    fulfillment::cancel_trip(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_stops(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<TripStop>>, AppError> {
    Ok(Json(fulfillment::list_stops(&state, id)?))
}

async fn get_stop(
    State(state): State<Arc<AppState>>,
    Path((id, seq)): Path<(u64, u32)>,
) -> Result<Json<TripStop>, AppError> {
    Ok(Json(fulfillment::get_stop(&state, id, seq)?))
}

async fn move_stop(
    State(state): State<Arc<AppState>>,
    Path((id, seq)): Path<(u64, u32)>,
    Json(payload): Json<MoveStopRequest>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(
        fulfillment::move_stop(&state, id, seq, payload.to_seq).await?,
    ))
}

async fn mark_delivered(
    State(state): State<Arc<AppState>>,
    Path((id, seq)): Path<(u64, u32)>,
) -> Result<Json<TripStop>, AppError> {
    Ok(Json(fulfillment::mark_delivered(&state, id, seq).await?))
}

async fn delete_stop(
    State(state): State<Arc<AppState>>,
    Path((id, seq)): Path<(u64, u32)>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(fulfillment::delete_stop(&state, id, seq).await?))
}
