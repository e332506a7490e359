use crate::{
    db::DbPool,
    entities::{
        stock_history::{self, Entity as StockHistoryEntity, MovementType},
        stock_level::{self, Entity as StockLevelEntity, StockStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateStockLevelRequest {
    pub product_id: Uuid,
    pub location_id: Uuid,
    #[validate(range(min = 0, message = "Initial quantity cannot be negative"))]
    pub initial_quantity: i32,
    #[validate(range(min = 0, message = "Minimum threshold cannot be negative"))]
    pub minimum_threshold: i32,
    pub maximum_threshold: Option<i32>,
    #[serde(default = "default_alert_enabled")]
    pub alert_enabled: bool,
    pub reorder_quantity: Option<i32>,
}

fn default_alert_enabled() -> bool {
    true
}

/// Partial update for alert settings. Absent fields are left unchanged.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateAlertSettingsRequest {
    pub minimum_threshold: Option<i32>,
    pub maximum_threshold: Option<i32>,
    pub alert_enabled: Option<bool>,
    pub reorder_quantity: Option<i32>,
}

/// Context recorded with each movement.
#[derive(Debug, Clone, Default)]
pub struct MovementContext {
    pub reference: Option<String>,
    pub performed_by: Option<String>,
    pub notes: Option<String>,
}

/// Computes the post-movement quantity and the signed delta.
///
/// Addition and reduction treat `quantity` as a delta magnitude; adjustment
/// and inventory_count treat it as the new absolute value. A reduction past
/// zero fails with `InsufficientStock` and an addition/reduction with a
/// negative magnitude is a validation error.
pub fn compute_movement(
    before: i32,
    quantity: i32,
    movement: MovementType,
) -> Result<(i32, i32), ServiceError> {
    match movement {
        MovementType::Addition => {
            if quantity < 0 {
                return Err(ServiceError::ValidationError(
                    "Movement quantity cannot be negative".to_string(),
                ));
            }
            Ok((before + quantity, quantity))
        }
        MovementType::Reduction => {
            if quantity < 0 {
                return Err(ServiceError::ValidationError(
                    "Movement quantity cannot be negative".to_string(),
                ));
            }
            if before < quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "Cannot reduce by {}: only {} available",
                    quantity, before
                )));
            }
            Ok((before - quantity, -quantity))
        }
        MovementType::Adjustment | MovementType::InventoryCount => {
            if quantity < 0 {
                return Err(ServiceError::ValidationError(
                    "Counted quantity cannot be negative".to_string(),
                ));
            }
            Ok((quantity, quantity - before))
        }
    }
}

/// Applies one movement inside the caller's unit of work: mutates the stock
/// level, re-derives its status, and appends the history row. Emits nothing;
/// callers publish events after their transaction commits.
pub(crate) async fn apply_movement_on<C: ConnectionTrait>(
    conn: &C,
    stock_level_id: Uuid,
    quantity: i32,
    movement: MovementType,
    ctx: &MovementContext,
) -> Result<(stock_level::Model, stock_history::Model), ServiceError> {
    let level = StockLevelEntity::find_by_id(stock_level_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Stock level {} not found", stock_level_id))
        })?;

    let before = level.current_quantity;
    let (after, changed) = compute_movement(before, quantity, movement)?;

    let status = StockStatus::derive(after, level.minimum_threshold, level.maximum_threshold);

    let mut active: stock_level::ActiveModel = level.into();
    active.current_quantity = Set(after);
    active.status = Set(status.as_str().to_string());
    active.updated_at = Set(Some(Utc::now()));
    let updated = active.update(conn).await.map_err(ServiceError::db_error)?;

    let history = stock_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        stock_level_id: Set(stock_level_id),
        r#type: Set(movement.as_str().to_string()),
        quantity_before: Set(before),
        quantity_after: Set(after),
        quantity_changed: Set(changed),
        reference: Set(ctx.reference.clone()),
        performed_by: Set(ctx.performed_by.clone()),
        notes: Set(ctx.notes.clone()),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)?;

    Ok((updated, history))
}

/// Per-product-per-location stock ledger: quantity movements, derived status,
/// and the append-only movement history.
#[derive(Clone)]
pub struct StockLedgerService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl StockLedgerService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates the stock level for a product/location pair.
    #[instrument(skip(self, request), fields(product_id = %request.product_id, location_id = %request.location_id))]
    pub async fn create_stock_level(
        &self,
        request: CreateStockLevelRequest,
    ) -> Result<stock_level::Model, ServiceError> {
        request.validate()?;

        let db = self.db_pool.as_ref();

        let existing = StockLevelEntity::find()
            .filter(stock_level::Column::ProductId.eq(request.product_id))
            .filter(stock_level::Column::LocationId.eq(request.location_id))
            .one(db)
            .await
            .map_err(ServiceError::db_error)?;

        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Stock level already exists for product {} at location {}",
                request.product_id, request.location_id
            )));
        }

        let status = StockStatus::derive(
            request.initial_quantity,
            request.minimum_threshold,
            request.maximum_threshold,
        );

        let model = stock_level::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(request.product_id),
            location_id: Set(request.location_id),
            current_quantity: Set(request.initial_quantity),
            minimum_threshold: Set(request.minimum_threshold),
            maximum_threshold: Set(request.maximum_threshold),
            status: Set(status.as_str().to_string()),
            alert_enabled: Set(request.alert_enabled),
            reorder_quantity: Set(request.reorder_quantity),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(db)
        .await
        .map_err(ServiceError::db_error)?;

        info!(stock_level_id = %model.id, "Stock level created");

        Ok(model)
    }

    #[instrument(skip(self), fields(stock_level_id = %id))]
    pub async fn get_stock_level(&self, id: Uuid) -> Result<stock_level::Model, ServiceError> {
        StockLevelEntity::find_by_id(id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Stock level {} not found", id)))
    }

    /// Lists stock levels with pagination, newest first.
    #[instrument(skip(self))]
    pub async fn list_stock_levels(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<stock_level::Model>, u64), ServiceError> {
        let paginator = StockLevelEntity::find()
            .order_by_desc(stock_level::Column::CreatedAt)
            .paginate(self.db_pool.as_ref(), per_page);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count stock levels");
            ServiceError::db_error(e)
        })?;

        let items = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;

        Ok((items, total))
    }

    /// Applies a quantity-changing movement as one atomic unit, then emits
    /// a stock-updated event and, when the post-movement status warrants it,
    /// a stock alert.
    #[instrument(skip(self, ctx), fields(stock_level_id = %stock_level_id, movement = movement.as_str(), quantity = quantity))]
    pub async fn apply_movement(
        &self,
        stock_level_id: Uuid,
        quantity: i32,
        movement: MovementType,
        ctx: MovementContext,
    ) -> Result<stock_level::Model, ServiceError> {
        let db = self.db_pool.as_ref();

        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let (updated, history) =
            apply_movement_on(&txn, stock_level_id, quantity, movement, &ctx).await?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            stock_level_id = %stock_level_id,
            quantity_before = history.quantity_before,
            quantity_after = history.quantity_after,
            status = %updated.status,
            "Stock movement applied"
        );

        self.event_sender
            .send_or_log(Event::StockUpdated {
                stock_level_id: updated.id,
                product_id: updated.product_id,
                quantity: updated.current_quantity,
                status: updated.status.clone(),
            })
            .await;

        if updated.alert_enabled && updated.stock_status().is_alertable() {
            self.event_sender
                .send_or_log(Event::StockAlert {
                    stock_level_id: updated.id,
                    product_id: updated.product_id,
                    quantity: updated.current_quantity,
                    status: updated.status.clone(),
                })
                .await;
        }

        Ok(updated)
    }

    /// Mutates thresholds/alert flags and re-derives the status. No movement
    /// record is written.
    #[instrument(skip(self, request), fields(stock_level_id = %id))]
    pub async fn update_alert_settings(
        &self,
        id: Uuid,
        request: UpdateAlertSettingsRequest,
    ) -> Result<stock_level::Model, ServiceError> {
        let db = self.db_pool.as_ref();

        let level = StockLevelEntity::find_by_id(id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Stock level {} not found", id)))?;

        let minimum = request.minimum_threshold.unwrap_or(level.minimum_threshold);
        if minimum < 0 {
            return Err(ServiceError::ValidationError(
                "Minimum threshold cannot be negative".to_string(),
            ));
        }
        let maximum = match request.maximum_threshold {
            Some(max) => Some(max),
            None => level.maximum_threshold,
        };
        let current = level.current_quantity;

        let mut active: stock_level::ActiveModel = level.into();
        active.minimum_threshold = Set(minimum);
        active.maximum_threshold = Set(maximum);
        if let Some(alert_enabled) = request.alert_enabled {
            active.alert_enabled = Set(alert_enabled);
        }
        if let Some(reorder) = request.reorder_quantity {
            active.reorder_quantity = Set(Some(reorder));
        }
        active.status = Set(StockStatus::derive(current, minimum, maximum)
            .as_str()
            .to_string());
        active.updated_at = Set(Some(Utc::now()));

        let updated = active.update(db).await.map_err(ServiceError::db_error)?;

        info!(stock_level_id = %id, status = %updated.status, "Alert settings updated");

        Ok(updated)
    }

    /// Deletes a stock level. Levels referenced by history are retained.
    #[instrument(skip(self), fields(stock_level_id = %id))]
    pub async fn delete_stock_level(&self, id: Uuid) -> Result<(), ServiceError> {
        let db = self.db_pool.as_ref();

        let level = StockLevelEntity::find_by_id(id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Stock level {} not found", id)))?;

        let history_count = StockHistoryEntity::find()
            .filter(stock_history::Column::StockLevelId.eq(id))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;

        if history_count > 0 {
            warn!(stock_level_id = %id, history_count = history_count, "Refusing to delete stock level with history");
            return Err(ServiceError::Conflict(format!(
                "Stock level {} has {} movement records and cannot be deleted",
                id, history_count
            )));
        }

        StockLevelEntity::delete_by_id(level.id)
            .exec(db)
            .await
            .map_err(ServiceError::db_error)?;

        info!(stock_level_id = %id, "Stock level deleted");

        Ok(())
    }

    /// Movement history for a stock level, newest first.
    #[instrument(skip(self), fields(stock_level_id = %id))]
    pub async fn get_history(&self, id: Uuid) -> Result<Vec<stock_history::Model>, ServiceError> {
        // Existence check so a bad id maps to NotFound rather than an empty list
        self.get_stock_level(id).await?;

        StockHistoryEntity::find()
            .filter(stock_history::Column::StockLevelId.eq(id))
            .order_by_desc(stock_history::Column::CreatedAt)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Stock levels currently low or out of stock with alerting enabled.
    #[instrument(skip(self))]
    pub async fn get_low_stock_items(&self) -> Result<Vec<stock_level::Model>, ServiceError> {
        StockLevelEntity::find()
            .filter(stock_level::Column::AlertEnabled.eq(true))
            .filter(
                stock_level::Column::Status.is_in([
                    StockStatus::Low.as_str(),
                    StockStatus::OutOfStock.as_str(),
                ]),
            )
            .order_by_asc(stock_level::Column::CurrentQuantity)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addition_adds() {
        assert_eq!(
            compute_movement(10, 5, MovementType::Addition).unwrap(),
            (15, 5)
        );
    }

    #[test]
    fn reduction_subtracts_and_guards() {
        assert_eq!(
            compute_movement(10, 4, MovementType::Reduction).unwrap(),
            (6, -4)
        );
        assert!(matches!(
            compute_movement(3, 4, MovementType::Reduction),
            Err(ServiceError::InsufficientStock(_))
        ));
    }

    #[test]
    fn adjustment_is_absolute() {
        assert_eq!(
            compute_movement(10, 25, MovementType::Adjustment).unwrap(),
            (25, 15)
        );
        assert_eq!(
            compute_movement(10, 4, MovementType::InventoryCount).unwrap(),
            (4, -6)
        );
    }

    #[test]
    fn negative_magnitudes_are_rejected() {
        for movement in [
            MovementType::Addition,
            MovementType::Reduction,
            MovementType::Adjustment,
        ] {
            assert!(matches!(
                compute_movement(10, -1, movement),
                Err(ServiceError::ValidationError(_))
            ));
        }
    }
}
