use crate::{errors::ServiceError, services::orders::CreateOrderRequest, AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order))
        .route("/:id", get(get_order))
        .route("/:id/status", put(update_status))
        .route("/:id/tracking", put(update_tracking))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/transitions", get(get_valid_transitions))
        .route("/:id/history", get(get_status_history))
        .route("/status/:status", get(get_by_status))
}

#[derive(Debug, Deserialize)]
struct UpdateOrderStatusRequest {
    status: String,
    changed_by: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateTrackingRequest {
    tracking_number: String,
    carrier: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CancelOrderRequest {
    changed_by: Option<String>,
    reason: Option<String>,
}

async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state.orders.create_order(payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.orders.get_order(id).await?;
    Ok(Json(order))
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state
        .orders
        .update_status(id, &payload.status, payload.changed_by, payload.reason)
        .await?;
    Ok(Json(updated))
}

async fn update_tracking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTrackingRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state
        .orders
        .update_tracking(id, payload.tracking_number, payload.carrier)
        .await?;
    Ok(Json(updated))
}

async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Option<Json<CancelOrderRequest>>,
) -> Result<impl IntoResponse, ServiceError> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let cancelled = state
        .orders
        .cancel_order(id, payload.changed_by, payload.reason)
        .await?;
    Ok(Json(cancelled))
}

async fn get_valid_transitions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let transitions = state.orders.get_valid_transitions(id).await?;
    let names: Vec<&str> = transitions.iter().map(|s| s.as_str()).collect();
    Ok(Json(json!({ "valid_transitions": names })))
}

async fn get_status_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let history = state.orders.get_status_history(id).await?;
    Ok(Json(history))
}

async fn get_by_status(
    State(state): State<AppState>,
    Path(status): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state.orders.get_by_status(&status).await?;
    Ok(Json(orders))
}
