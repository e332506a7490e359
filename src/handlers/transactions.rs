use crate::{
    errors::ServiceError, services::warehouse_transactions::CreateTransactionRequest, AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_transaction))
        .route("/:id", get(get_transaction))
        .route("/:id/status", put(update_status))
        .route("/:id/process", post(process_transaction))
        .route("/:id/reverse", post(reverse_transaction))
        .route("/:id/audit", get(get_audit_trail))
        .route("/warehouse/:warehouse_id", get(get_by_warehouse))
        .route("/product/:product_id", get(get_by_product))
}

#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    status: String,
    performed_by: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProcessTransactionRequest {
    #[serde(default)]
    actual_quantities: HashMap<Uuid, i32>,
    performed_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReverseTransactionRequest {
    reason: Option<String>,
    performed_by: Option<String>,
}

async fn create_transaction(
    State(state): State<AppState>,
    Json(payload): Json<CreateTransactionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state.transactions.create_transaction(payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let transaction = state.transactions.get_transaction(id).await?;
    Ok(Json(transaction))
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state
        .transactions
        .update_status(id, &payload.status, payload.performed_by, payload.reason)
        .await?;
    Ok(Json(updated))
}

async fn process_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProcessTransactionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let processed = state
        .transactions
        .process_transaction(id, payload.actual_quantities, payload.performed_by)
        .await?;
    Ok(Json(processed))
}

async fn reverse_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReverseTransactionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let reversal = state
        .transactions
        .reverse_transaction(id, payload.reason, payload.performed_by)
        .await?;
    Ok((StatusCode::CREATED, Json(reversal)))
}

async fn get_audit_trail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let entries = state.transactions.get_audit_trail(id).await?;
    Ok(Json(entries))
}

async fn get_by_warehouse(
    State(state): State<AppState>,
    Path(warehouse_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let transactions = state.transactions.get_by_warehouse(warehouse_id).await?;
    Ok(Json(transactions))
}

async fn get_by_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let transactions = state.transactions.get_by_product(product_id).await?;
    Ok(Json(transactions))
}
