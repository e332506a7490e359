use super::ListParams;
use crate::{
    entities::stock_history::MovementType,
    errors::ServiceError,
    services::stock::{CreateStockLevelRequest, MovementContext, UpdateAlertSettingsRequest},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
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
        .route("/", post(create_stock_level).get(list_stock_levels))
        .route("/low-stock", get(get_low_stock_items))
        .route("/:id", get(get_stock_level).delete(delete_stock_level))
        .route("/:id/alert-settings", put(update_alert_settings))
        .route("/:id/movements", post(apply_movement))
        .route("/:id/history", get(get_history))
}

#[derive(Debug, Deserialize)]
struct ApplyMovementRequest {
    quantity: i32,
    r#type: String,
    reference: Option<String>,
    performed_by: Option<String>,
    notes: Option<String>,
}

async fn create_stock_level(
    State(state): State<AppState>,
    Json(payload): Json<CreateStockLevelRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let level = state.stock.create_stock_level(payload).await?;
    Ok((StatusCode::CREATED, Json(level)))
}

async fn list_stock_levels(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (items, total) = state
        .stock
        .list_stock_levels(params.page, params.per_page)
        .await?;
    Ok(Json(json!({
        "items": items,
        "total": total,
        "page": params.page,
        "per_page": params.per_page,
    })))
}

async fn get_stock_level(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let level = state.stock.get_stock_level(id).await?;
    Ok(Json(level))
}

async fn delete_stock_level(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.stock.delete_stock_level(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_alert_settings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAlertSettingsRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let level = state.stock.update_alert_settings(id, payload).await?;
    Ok(Json(level))
}

async fn apply_movement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApplyMovementRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let movement = MovementType::from_str(&payload.r#type).ok_or_else(|| {
        ServiceError::ValidationError(format!("Unknown movement type '{}'", payload.r#type))
    })?;
    let ctx = MovementContext {
        reference: payload.reference,
        performed_by: payload.performed_by,
        notes: payload.notes,
    };
    let level = state
        .stock
        .apply_movement(id, payload.quantity, movement, ctx)
        .await?;
    Ok(Json(level))
}

async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let history = state.stock.get_history(id).await?;
    Ok(Json(history))
}

async fn get_low_stock_items(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let items = state.stock.get_low_stock_items().await?;
    Ok(Json(items))
}
