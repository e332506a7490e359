//! HTTP surface: thin axum routers over the services. All semantics live in
//! `services`; handlers only translate between JSON and service calls.

pub mod orders;
pub mod products;
pub mod stock;
pub mod transactions;

use crate::AppState;
use axum::{routing::get, Json, Router};
use serde::Deserialize;
use serde_json::json;

/// Common pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Builds the full API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/products", products::router())
        .nest("/api/v1/stock-levels", stock::router())
        .nest("/api/v1/transactions", transactions::router())
        .nest("/api/v1/orders", orders::router())
}
