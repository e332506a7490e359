//! Service layer. Each service owns one subsystem's semantics and runs every
//! mutating operation inside a single database transaction; HTTP handlers
//! stay thin over these.

pub mod order_workflow;
pub mod orders;
pub mod products;
pub mod reports;
pub mod stock;
pub mod warehouse_transactions;

pub use orders::OrderService;
pub use products::ProductService;
pub use reports::ReportService;
pub use stock::StockLedgerService;
pub use warehouse_transactions::WarehouseTransactionService;
