use crate::{
    db::DbPool,
    entities::{
        inventory_transaction::{
            self, Entity as TransactionEntity, TransactionStatus, TransactionType,
        },
        product::Entity as ProductEntity,
        transaction_audit::{self, Entity as TransactionAuditEntity},
        transaction_item::{self, Entity as TransactionItemEntity},
        warehouse_stock_level::{self, Entity as WarehouseStockLevelEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateTransactionItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Planned quantity must be positive"))]
    pub planned_quantity: i32,
    pub unit_cost: Option<Decimal>,
    pub lot_number: Option<String>,
    pub serial_number: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateTransactionRequest {
    pub r#type: String,
    pub warehouse_id: Uuid,
    pub destination_warehouse_id: Option<Uuid>,
    #[serde(default = "default_priority")]
    pub priority: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    #[validate(length(min = 1, message = "Transaction must have at least one item"))]
    pub items: Vec<CreateTransactionItemRequest>,
}

fn default_priority() -> String {
    "normal".to_string()
}

/// A transaction with its line items.
#[derive(Debug, Serialize)]
pub struct TransactionWithItems {
    #[serde(flatten)]
    pub transaction: inventory_transaction::Model,
    pub items: Vec<transaction_item::Model>,
}

/// Counts same-day rows of the given type and formats the next
/// `{PREFIX}-{YYYYMMDD}-{seq:04}` number. Must run inside the unit of work
/// that inserts the row; the unique index on `transaction_number` backstops
/// cross-transaction races.
async fn next_transaction_number<C: ConnectionTrait>(
    conn: &C,
    tx_type: TransactionType,
    now: DateTime<Utc>,
) -> Result<String, ServiceError> {
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ServiceError::InternalError("Invalid midnight timestamp".to_string()))?;

    let count = TransactionEntity::find()
        .filter(inventory_transaction::Column::Type.eq(tx_type.as_str()))
        .filter(inventory_transaction::Column::CreatedAt.gte(midnight))
        .count(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(format!(
        "{}-{}-{:04}",
        tx_type.prefix(),
        now.format("%Y%m%d"),
        count + 1
    ))
}

/// Loads the (warehouse, product) aggregate, creating it with zero counters
/// when absent.
async fn find_or_create_warehouse_level<C: ConnectionTrait>(
    conn: &C,
    warehouse_id: Uuid,
    product_id: Uuid,
) -> Result<warehouse_stock_level::Model, ServiceError> {
    let existing = WarehouseStockLevelEntity::find()
        .filter(warehouse_stock_level::Column::WarehouseId.eq(warehouse_id))
        .filter(warehouse_stock_level::Column::ProductId.eq(product_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if let Some(level) = existing {
        return Ok(level);
    }

    warehouse_stock_level::ActiveModel {
        id: Set(Uuid::new_v4()),
        warehouse_id: Set(warehouse_id),
        product_id: Set(product_id),
        available_quantity: Set(0),
        allocated_quantity: Set(0),
        reserved_quantity: Set(0),
        damaged_quantity: Set(0),
        total_quantity: Set(0),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)
}

/// Writes new counter values back, recomputing the total so the
/// `total = available + allocated + damaged` invariant holds on every write.
async fn save_warehouse_level<C: ConnectionTrait>(
    conn: &C,
    level: warehouse_stock_level::Model,
    available: i32,
    allocated: i32,
    reserved: i32,
    damaged: i32,
) -> Result<warehouse_stock_level::Model, ServiceError> {
    let mut active: warehouse_stock_level::ActiveModel = level.into();
    active.available_quantity = Set(available);
    active.allocated_quantity = Set(allocated);
    active.reserved_quantity = Set(reserved);
    active.damaged_quantity = Set(damaged);
    active.total_quantity = Set(available + allocated + damaged);
    active.updated_at = Set(Some(Utc::now()));
    active.update(conn).await.map_err(ServiceError::db_error)
}

/// Applies one transaction type's warehouse effect for a single product.
async fn apply_warehouse_effect<C: ConnectionTrait>(
    conn: &C,
    tx_type: TransactionType,
    warehouse_id: Uuid,
    destination_warehouse_id: Option<Uuid>,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    let level = find_or_create_warehouse_level(conn, warehouse_id, product_id).await?;
    let (available, allocated, reserved, damaged) = (
        level.available_quantity,
        level.allocated_quantity,
        level.reserved_quantity,
        level.damaged_quantity,
    );

    match tx_type {
        TransactionType::Receipt | TransactionType::Return => {
            save_warehouse_level(conn, level, available + quantity, allocated, reserved, damaged)
                .await?;
        }
        TransactionType::Shipment => {
            if available < quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "Cannot ship {} of product {}: only {} available at warehouse {}",
                    quantity, product_id, available, warehouse_id
                )));
            }
            save_warehouse_level(conn, level, available - quantity, allocated, reserved, damaged)
                .await?;
        }
        TransactionType::Transfer => {
            let destination = destination_warehouse_id.ok_or_else(|| {
                ServiceError::ValidationError(
                    "Transfer transactions require a destination warehouse".to_string(),
                )
            })?;
            if available < quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "Cannot transfer {} of product {}: only {} available at warehouse {}",
                    quantity, product_id, available, warehouse_id
                )));
            }
            save_warehouse_level(conn, level, available - quantity, allocated, reserved, damaged)
                .await?;

            let dest_level = find_or_create_warehouse_level(conn, destination, product_id).await?;
            let dest_available = dest_level.available_quantity + quantity;
            let (da, dr, dd) = (
                dest_level.allocated_quantity,
                dest_level.reserved_quantity,
                dest_level.damaged_quantity,
            );
            save_warehouse_level(conn, dest_level, dest_available, da, dr, dd).await?;
        }
        TransactionType::Adjustment | TransactionType::CycleCount => {
            // Quantity is the counted/target available amount, not a delta.
            if quantity < 0 {
                return Err(ServiceError::ValidationError(
                    "Counted quantity cannot be negative".to_string(),
                ));
            }
            save_warehouse_level(conn, level, quantity, allocated, reserved, damaged).await?;
        }
        TransactionType::Damage => {
            if available < quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "Cannot mark {} of product {} damaged: only {} available",
                    quantity, product_id, available
                )));
            }
            save_warehouse_level(
                conn,
                level,
                available - quantity,
                allocated,
                reserved,
                damaged + quantity,
            )
            .await?;
        }
        TransactionType::Allocation => {
            if available < quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "Cannot allocate {} of product {}: only {} available",
                    quantity, product_id, available
                )));
            }
            save_warehouse_level(
                conn,
                level,
                available - quantity,
                allocated + quantity,
                reserved,
                damaged,
            )
            .await?;
        }
        TransactionType::Deallocation => {
            if allocated < quantity {
                return Err(ServiceError::InvalidState(format!(
                    "Cannot deallocate {} of product {}: only {} allocated",
                    quantity, product_id, allocated
                )));
            }
            save_warehouse_level(
                conn,
                level,
                available + quantity,
                allocated - quantity,
                reserved,
                damaged,
            )
            .await?;
        }
        TransactionType::Reservation => {
            // Reservations earmark available stock; they never exceed it.
            if reserved + quantity > available {
                return Err(ServiceError::InsufficientStock(format!(
                    "Cannot reserve {} of product {}: {} available with {} already reserved",
                    quantity, product_id, available, reserved
                )));
            }
            save_warehouse_level(conn, level, available, allocated, reserved + quantity, damaged)
                .await?;
        }
        TransactionType::Release => {
            if reserved < quantity {
                return Err(ServiceError::InvalidState(format!(
                    "Cannot release {} of product {}: only {} reserved",
                    quantity, product_id, reserved
                )));
            }
            save_warehouse_level(conn, level, available, allocated, reserved - quantity, damaged)
                .await?;
        }
    }

    Ok(())
}

async fn append_audit<C: ConnectionTrait>(
    conn: &C,
    transaction_id: Uuid,
    action: &str,
    performed_by: Option<&str>,
    reason: Option<&str>,
    metadata: Option<serde_json::Value>,
) -> Result<(), ServiceError> {
    transaction_audit::ActiveModel {
        id: Set(Uuid::new_v4()),
        transaction_id: Set(transaction_id),
        action: Set(action.to_string()),
        performed_by: Set(performed_by.map(str::to_string)),
        reason: Set(reason.map(str::to_string)),
        metadata: Set(metadata),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)?;
    Ok(())
}

fn parse_type(s: &str) -> Result<TransactionType, ServiceError> {
    TransactionType::from_str(s)
        .ok_or_else(|| ServiceError::ValidationError(format!("Unknown transaction type '{}'", s)))
}

fn parse_status(s: &str) -> Result<TransactionStatus, ServiceError> {
    TransactionStatus::from_str(s)
        .ok_or_else(|| ServiceError::ValidationError(format!("Unknown transaction status '{}'", s)))
}

/// Applies inventory transactions (receipts, shipments, transfers,
/// adjustments, allocation-family moves) to the per-warehouse stock
/// aggregates, with an append-only audit trail per transaction.
#[derive(Clone)]
pub struct WarehouseTransactionService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl WarehouseTransactionService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates a draft transaction with its items. Line items denormalize
    /// the product's sku/name at creation time.
    #[instrument(skip(self, request), fields(warehouse_id = %request.warehouse_id, r#type = %request.r#type))]
    pub async fn create_transaction(
        &self,
        request: CreateTransactionRequest,
    ) -> Result<TransactionWithItems, ServiceError> {
        request.validate()?;
        for item in &request.items {
            item.validate()?;
        }

        let tx_type = parse_type(&request.r#type)?;
        if tx_type == TransactionType::Transfer && request.destination_warehouse_id.is_none() {
            return Err(ServiceError::ValidationError(
                "Transfer transactions require a destination warehouse".to_string(),
            ));
        }

        let db = self.db_pool.as_ref();
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let now = Utc::now();
        let number = next_transaction_number(&txn, tx_type, now).await?;

        let transaction = inventory_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            transaction_number: Set(number),
            r#type: Set(tx_type.as_str().to_string()),
            status: Set(TransactionStatus::Draft.as_str().to_string()),
            priority: Set(request.priority.clone()),
            warehouse_id: Set(request.warehouse_id),
            destination_warehouse_id: Set(request.destination_warehouse_id),
            parent_transaction_id: Set(None),
            reversal_transaction_id: Set(None),
            is_reversed: Set(false),
            reference: Set(request.reference.clone()),
            notes: Set(request.notes.clone()),
            created_by: Set(request.created_by.clone()),
            approved_at: Set(None),
            processed_at: Set(None),
            completed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        let mut items = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let product = ProductEntity::find_by_id(item.product_id)
                .one(&txn)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", item.product_id))
                })?;

            let total_cost = item
                .unit_cost
                .map(|cost| cost * Decimal::from(item.planned_quantity));

            let inserted = transaction_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                transaction_id: Set(transaction.id),
                product_id: Set(product.id),
                sku: Set(product.sku.clone()),
                product_name: Set(product.name.clone()),
                planned_quantity: Set(item.planned_quantity),
                actual_quantity: Set(None),
                variance_quantity: Set(None),
                unit_cost: Set(item.unit_cost),
                total_cost: Set(total_cost),
                lot_number: Set(item.lot_number.clone()),
                serial_number: Set(item.serial_number.clone()),
                expiry_date: Set(item.expiry_date),
                created_at: Set(now),
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::db_error)?;
            items.push(inserted);
        }

        append_audit(
            &txn,
            transaction.id,
            "created",
            request.created_by.as_deref(),
            None,
            None,
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            transaction_id = %transaction.id,
            transaction_number = %transaction.transaction_number,
            items = items.len(),
            "Inventory transaction created"
        );

        self.event_sender
            .send_or_log(Event::TransactionCreated(transaction.id))
            .await;

        Ok(TransactionWithItems { transaction, items })
    }

    /// Moves a transaction along the fixed status table, stamping the
    /// role-specific timestamp and appending one audit row.
    #[instrument(skip(self, performed_by, reason), fields(transaction_id = %id, new_status = new_status))]
    pub async fn update_status(
        &self,
        id: Uuid,
        new_status: &str,
        performed_by: Option<String>,
        reason: Option<String>,
    ) -> Result<inventory_transaction::Model, ServiceError> {
        let next = parse_status(new_status)?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let transaction = TransactionEntity::find_by_id(id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Transaction {} not found", id)))?;

        let current = parse_status(&transaction.status)?;
        if !current.can_transition_to(next) {
            return Err(ServiceError::InvalidTransition(format!(
                "Transaction cannot move from {} to {}",
                current.as_str(),
                next.as_str()
            )));
        }

        let now = Utc::now();
        let old_status = transaction.status.clone();
        let mut active: inventory_transaction::ActiveModel = transaction.into();
        active.status = Set(next.as_str().to_string());
        active.updated_at = Set(Some(now));
        match next {
            TransactionStatus::Approved => active.approved_at = Set(Some(now)),
            TransactionStatus::Processing => active.processed_at = Set(Some(now)),
            TransactionStatus::Completed => active.completed_at = Set(Some(now)),
            _ => {}
        }
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;

        append_audit(
            &txn,
            updated.id,
            "status_changed",
            performed_by.as_deref(),
            reason.as_deref(),
            Some(json!({ "from": old_status, "to": next.as_str() })),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            transaction_id = %updated.id,
            from = %old_status,
            to = %updated.status,
            "Transaction status updated"
        );

        self.event_sender
            .send_or_log(Event::TransactionStatusChanged {
                transaction_id: updated.id,
                old_status,
                new_status: updated.status.clone(),
            })
            .await;

        Ok(updated)
    }

    /// Processes an approved transaction: records actual quantities and
    /// variances, applies the warehouse effects, and completes it.
    ///
    /// `actual_quantities` maps transaction item ids to counted quantities;
    /// items absent from the map are processed at their planned quantity.
    #[instrument(skip(self, actual_quantities, performed_by), fields(transaction_id = %id))]
    pub async fn process_transaction(
        &self,
        id: Uuid,
        actual_quantities: HashMap<Uuid, i32>,
        performed_by: Option<String>,
    ) -> Result<TransactionWithItems, ServiceError> {
        let db = self.db_pool.as_ref();
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let transaction = TransactionEntity::find_by_id(id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Transaction {} not found", id)))?;

        let status = parse_status(&transaction.status)?;
        if status != TransactionStatus::Approved {
            return Err(ServiceError::InvalidState(format!(
                "Transaction {} is {}; only approved transactions can be processed",
                transaction.transaction_number, transaction.status
            )));
        }
        let tx_type = parse_type(&transaction.r#type)?;

        let items = TransactionItemEntity::find()
            .filter(transaction_item::Column::TransactionId.eq(id))
            .order_by_asc(transaction_item::Column::CreatedAt)
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let now = Utc::now();
        let mut processed_items = Vec::with_capacity(items.len());
        for item in items {
            let actual = actual_quantities
                .get(&item.id)
                .copied()
                .unwrap_or(item.planned_quantity);
            if actual < 0 {
                return Err(ServiceError::ValidationError(format!(
                    "Actual quantity for item {} cannot be negative",
                    item.id
                )));
            }
            let variance = actual - item.planned_quantity;
            let product_id = item.product_id;

            let mut active: transaction_item::ActiveModel = item.into();
            active.actual_quantity = Set(Some(actual));
            active.variance_quantity = Set(Some(variance));
            let updated_item = active.update(&txn).await.map_err(ServiceError::db_error)?;

            apply_warehouse_effect(
                &txn,
                tx_type,
                transaction.warehouse_id,
                transaction.destination_warehouse_id,
                product_id,
                actual,
            )
            .await?;

            processed_items.push(updated_item);
        }

        let mut active: inventory_transaction::ActiveModel = transaction.into();
        active.status = Set(TransactionStatus::Completed.as_str().to_string());
        active.processed_at = Set(Some(now));
        active.completed_at = Set(Some(now));
        active.updated_at = Set(Some(now));
        let completed = active.update(&txn).await.map_err(ServiceError::db_error)?;

        append_audit(
            &txn,
            completed.id,
            "processed",
            performed_by.as_deref(),
            None,
            None,
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            transaction_id = %completed.id,
            transaction_number = %completed.transaction_number,
            "Transaction processed and completed"
        );

        self.event_sender
            .send_or_log(Event::TransactionCompleted(completed.id))
            .await;

        Ok(TransactionWithItems {
            transaction: completed,
            items: processed_items,
        })
    }

    /// Creates and completes a counter-transaction undoing a completed
    /// transaction's warehouse effects. Legal exactly once per transaction.
    /// The only operation that mutates two transactions together.
    #[instrument(skip(self, reason, performed_by), fields(transaction_id = %id))]
    pub async fn reverse_transaction(
        &self,
        id: Uuid,
        reason: Option<String>,
        performed_by: Option<String>,
    ) -> Result<TransactionWithItems, ServiceError> {
        let db = self.db_pool.as_ref();
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let original = TransactionEntity::find_by_id(id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Transaction {} not found", id)))?;

        if original.is_reversed {
            return Err(ServiceError::Conflict(format!(
                "Transaction {} has already been reversed",
                original.transaction_number
            )));
        }
        let status = parse_status(&original.status)?;
        if status != TransactionStatus::Completed {
            return Err(ServiceError::InvalidState(format!(
                "Transaction {} is {}; only completed transactions can be reversed",
                original.transaction_number, original.status
            )));
        }

        let original_type = parse_type(&original.r#type)?;
        let reversal_type = original_type.reversal_type();

        let items = TransactionItemEntity::find()
            .filter(transaction_item::Column::TransactionId.eq(id))
            .order_by_asc(transaction_item::Column::CreatedAt)
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let now = Utc::now();
        let number = next_transaction_number(&txn, reversal_type, now).await?;

        let reversal = inventory_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            transaction_number: Set(number),
            r#type: Set(reversal_type.as_str().to_string()),
            status: Set(TransactionStatus::Completed.as_str().to_string()),
            priority: Set(original.priority.clone()),
            warehouse_id: Set(original.warehouse_id),
            destination_warehouse_id: Set(original.destination_warehouse_id),
            parent_transaction_id: Set(Some(original.id)),
            reversal_transaction_id: Set(None),
            is_reversed: Set(false),
            reference: Set(Some(original.transaction_number.clone())),
            notes: Set(reason.clone()),
            created_by: Set(performed_by.clone()),
            approved_at: Set(Some(now)),
            processed_at: Set(Some(now)),
            completed_at: Set(Some(now)),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        let mut reversal_items = Vec::with_capacity(items.len());
        for item in &items {
            // The reversal undoes what actually happened, not what was planned.
            let quantity = item.actual_quantity.unwrap_or(item.planned_quantity);

            let inserted = transaction_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                transaction_id: Set(reversal.id),
                product_id: Set(item.product_id),
                sku: Set(item.sku.clone()),
                product_name: Set(item.product_name.clone()),
                planned_quantity: Set(quantity),
                actual_quantity: Set(Some(quantity)),
                variance_quantity: Set(Some(0)),
                unit_cost: Set(item.unit_cost),
                total_cost: Set(item.total_cost),
                lot_number: Set(item.lot_number.clone()),
                serial_number: Set(item.serial_number.clone()),
                expiry_date: Set(item.expiry_date),
                created_at: Set(now),
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::db_error)?;

            apply_warehouse_effect(
                &txn,
                reversal_type,
                reversal.warehouse_id,
                reversal.destination_warehouse_id,
                inserted.product_id,
                quantity,
            )
            .await?;

            reversal_items.push(inserted);
        }

        let mut active: inventory_transaction::ActiveModel = original.into();
        active.status = Set(TransactionStatus::Reversed.as_str().to_string());
        active.is_reversed = Set(true);
        active.reversal_transaction_id = Set(Some(reversal.id));
        active.updated_at = Set(Some(now));
        let reversed_original = active.update(&txn).await.map_err(ServiceError::db_error)?;

        append_audit(
            &txn,
            reversed_original.id,
            "reversed",
            performed_by.as_deref(),
            reason.as_deref(),
            Some(json!({ "reversal_transaction_id": reversal.id })),
        )
        .await?;
        append_audit(
            &txn,
            reversal.id,
            "created_as_reversal",
            performed_by.as_deref(),
            reason.as_deref(),
            Some(json!({ "original_transaction_id": reversed_original.id })),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            transaction_id = %reversed_original.id,
            reversal_id = %reversal.id,
            "Transaction reversed"
        );

        self.event_sender
            .send_or_log(Event::TransactionReversed {
                transaction_id: reversed_original.id,
                reversal_id: reversal.id,
            })
            .await;

        Ok(TransactionWithItems {
            transaction: reversal,
            items: reversal_items,
        })
    }

    #[instrument(skip(self), fields(transaction_id = %id))]
    pub async fn get_transaction(&self, id: Uuid) -> Result<TransactionWithItems, ServiceError> {
        let db = self.db_pool.as_ref();

        let transaction = TransactionEntity::find_by_id(id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Transaction {} not found", id)))?;

        let items = TransactionItemEntity::find()
            .filter(transaction_item::Column::TransactionId.eq(id))
            .order_by_asc(transaction_item::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(TransactionWithItems { transaction, items })
    }

    /// Transactions whose source or destination is the given warehouse,
    /// newest first.
    #[instrument(skip(self), fields(warehouse_id = %warehouse_id))]
    pub async fn get_by_warehouse(
        &self,
        warehouse_id: Uuid,
    ) -> Result<Vec<inventory_transaction::Model>, ServiceError> {
        TransactionEntity::find()
            .filter(
                sea_orm::Condition::any()
                    .add(inventory_transaction::Column::WarehouseId.eq(warehouse_id))
                    .add(
                        inventory_transaction::Column::DestinationWarehouseId.eq(warehouse_id),
                    ),
            )
            .order_by_desc(inventory_transaction::Column::CreatedAt)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Transactions with at least one line item for the given product,
    /// newest first.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn get_by_product(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<inventory_transaction::Model>, ServiceError> {
        let db = self.db_pool.as_ref();

        let item_rows = TransactionItemEntity::find()
            .filter(transaction_item::Column::ProductId.eq(product_id))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut ids: Vec<Uuid> = item_rows.iter().map(|i| i.transaction_id).collect();
        ids.sort();
        ids.dedup();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        TransactionEntity::find()
            .filter(inventory_transaction::Column::Id.is_in(ids))
            .order_by_desc(inventory_transaction::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Audit entries for a transaction, oldest first.
    #[instrument(skip(self), fields(transaction_id = %id))]
    pub async fn get_audit_trail(
        &self,
        id: Uuid,
    ) -> Result<Vec<transaction_audit::Model>, ServiceError> {
        let db = self.db_pool.as_ref();

        TransactionEntity::find_by_id(id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Transaction {} not found", id)))?;

        TransactionAuditEntity::find()
            .filter(transaction_audit::Column::TransactionId.eq(id))
            .order_by_asc(transaction_audit::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }
}
