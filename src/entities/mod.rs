// Catalog
pub mod product;

// Stock ledger
pub mod stock_history;
pub mod stock_level;

// Warehouse transactions
pub mod inventory_transaction;
pub mod transaction_audit;
pub mod transaction_item;
pub mod warehouse_stock_level;

// Orders
pub mod order;
pub mod order_item;
pub mod order_status_history;
