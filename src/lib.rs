//! Stockflow API Library
//!
//! Order lifecycle and stock accounting: a per-location stock ledger with an
//! append-only movement history, a warehouse transaction processor, and a
//! table-driven order workflow engine.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod jobs;
pub mod migrator;
pub mod services;

use std::sync::Arc;

/// Shared application state handed to the HTTP layer.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub event_sender: Arc<events::EventSender>,
    pub products: services::ProductService,
    pub stock: services::StockLedgerService,
    pub transactions: services::WarehouseTransactionService,
    pub orders: services::OrderService,
    pub reports: services::ReportService,
}

impl AppState {
    /// Wires every service onto one pool and one event channel.
    pub fn new(db: Arc<db::DbPool>, event_sender: Arc<events::EventSender>) -> Self {
        Self {
            products: services::ProductService::new(db.clone()),
            stock: services::StockLedgerService::new(db.clone(), event_sender.clone()),
            transactions: services::WarehouseTransactionService::new(
                db.clone(),
                event_sender.clone(),
            ),
            orders: services::OrderService::new(db.clone(), event_sender.clone()),
            reports: services::ReportService::new(db.clone()),
            db,
            event_sender,
        }
    }
}
