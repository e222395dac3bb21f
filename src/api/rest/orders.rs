use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::models::{Order, OrderStatus, Point, Priority};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route(
            "/orders/:id",
            get(get_order).patch(update_order).delete(delete_order),
        )
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub customer: Point,
    pub weight_kg: f64,
    pub priority: Option<Priority>,
}

#[derive(Deserialize)]
pub struct UpdateOrderRequest {
    pub customer: Option<Point>,
    pub weight_kg: Option<f64>,
    pub priority: Option<Priority>,
}

#[derive(Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    let _guard = state.planning_lock.lock().await;

    let order = Order {
        id: state.order_ids.next(),
        customer: payload.customer,
        weight_kg: payload.weight_kg,
        priority: payload.priority.unwrap_or(Priority::Low),
        status: OrderStatus::Pending,
        created_at: Utc::now(),
    };
    order.validate()?;

    state.orders.insert(order.id, order.clone());
    state.metrics.orders_pending.inc();
    info!(order_id = order.id, priority = ?order.priority, "order received");

    Ok(Json(order))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<OrderFilter>,
) -> Json<Vec<Order>> {
    let mut orders: Vec<Order> = state
        .orders
        .iter()
        .filter(|entry| filter.status.is_none_or(|status| entry.status == status))
        .map(|entry| entry.value().clone())
        .collect();
    orders.sort_by_key(|order| order.id);
    Json(orders)
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

    Ok(Json(order.value().clone()))
}

async fn update_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(payload): Json<UpdateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    let _guard = state.planning_lock.lock().await;

    let mut order = state
        .orders
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

    if order.status != OrderStatus::Pending {
        return Err(AppError::Conflict(format!(
            "cannot edit order {id} with status {}",
            order.status
        )));
    }

    let mut updated = order.clone();
    if let Some(customer) = payload.customer {
        updated.customer = customer;
    }
    if let Some(weight_kg) = payload.weight_kg {
        updated.weight_kg = weight_kg;
    }
    if let Some(priority) = payload.priority {
        updated.priority = priority;
    }
    updated.validate()?;

    *order = updated;
    Ok(Json(order.clone()))
}

async fn delete_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    let _guard = state.planning_lock.lock().await;

    let status = state
        .orders
        .get(&id)
        .map(|order| order.status)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

    if status != OrderStatus::Pending {
        return Err(AppError::Conflict(format!(
            "cannot delete order {id} with status {status}"
        )));
    }

    state.orders.remove(&id);
    state.metrics.orders_pending.dec();
    Ok(StatusCode::NO_CONTENT)
}
