use crate::{
    db::DbPool,
    entities::{
        order::{self, Entity as OrderEntity, OrderStatus},
        order_item::{self, Entity as OrderItemEntity},
        order_status_history::{self, Entity as OrderStatusHistoryEntity},
        product::Entity as ProductEntity,
        stock_history::MovementType,
        stock_level::{self, Entity as StockLevelEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        order_workflow::{self, TransitionAction, TransitionCondition},
        stock::{apply_movement_on, MovementContext},
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

const PAYMENT_STATUS_PAID: &str = "paid";

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateOrderItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
    /// Overrides the catalog unit price when set.
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_payment_status")]
    pub payment_status: String,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "Order must have at least one item"))]
    pub items: Vec<CreateOrderItemRequest>,
}

fn default_priority() -> String {
    "normal".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_payment_status() -> String {
    "unpaid".to_string()
}

/// An order with its line items.
#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

async fn next_order_number<C: ConnectionTrait>(
    conn: &C,
    now: chrono::DateTime<Utc>,
) -> Result<String, ServiceError> {
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ServiceError::InternalError("Invalid midnight timestamp".to_string()))?;

    let count = OrderEntity::find()
        .filter(order::Column::CreatedAt.gte(midnight))
        .count(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(format!("ORD-{}-{:04}", now.format("%Y%m%d"), count + 1))
}

/// Stock levels for a product in allocation order: oldest row first, id as
/// the tie-break, so allocation and release walk the same sequence.
async fn stock_levels_for_product<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<Vec<stock_level::Model>, ServiceError> {
    StockLevelEntity::find()
        .filter(stock_level::Column::ProductId.eq(product_id))
        .order_by_asc(stock_level::Column::CreatedAt)
        .order_by_asc(stock_level::Column::Id)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

fn parse_order_status(s: &str) -> Result<OrderStatus, ServiceError> {
    OrderStatus::from_str(s)
        .ok_or_else(|| ServiceError::ValidationError(format!("Unknown order status '{}'", s)))
}

/// Order lifecycle: creation, workflow-driven status changes with their
/// stock side effects, tracking, and queries.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates a draft order with its line items. Line items denormalize the
    /// product's sku/name; the order total is the sum of line totals.
    #[instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderWithItems, ServiceError> {
        request.validate()?;
        for item in &request.items {
            item.validate()?;
        }

        let db = self.db_pool.as_ref();
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let now = Utc::now();
        let order_number = next_order_number(&txn, now).await?;

        let mut total_amount = Decimal::ZERO;
        let mut lines = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let product = ProductEntity::find_by_id(item.product_id)
                .one(&txn)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", item.product_id))
                })?;

            let unit_price = item
                .unit_price
                .or(product.unit_price)
                .unwrap_or(Decimal::ZERO);
            let total_price = unit_price * Decimal::from(item.quantity);
            total_amount += total_price;

            lines.push((product, item.quantity, unit_price, total_price));
        }

        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(order_number),
            customer_id: Set(request.customer_id),
            status: Set(OrderStatus::Draft.as_str().to_string()),
            priority: Set(request.priority.clone()),
            order_date: Set(now),
            total_amount: Set(total_amount),
            currency: Set(request.currency.clone()),
            payment_status: Set(request.payment_status.clone()),
            shipping_address: Set(request.shipping_address.clone()),
            billing_address: Set(request.billing_address.clone()),
            tracking_number: Set(None),
            carrier: Set(None),
            notes: Set(request.notes.clone()),
            created_at: Set(now),
            updated_at: Set(None),
            version: Set(1),
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        let mut items = Vec::with_capacity(lines.len());
        for (product, quantity, unit_price, total_price) in lines {
            let inserted = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(product.id),
                sku: Set(product.sku.clone()),
                product_name: Set(product.name.clone()),
                quantity: Set(quantity),
                unit_price: Set(unit_price),
                total_price: Set(total_price),
                allocated_quantity: Set(0),
                picked_quantity: Set(0),
                packed_quantity: Set(0),
                shipped_quantity: Set(0),
                created_at: Set(now),
                updated_at: Set(None),
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::db_error)?;
            items.push(inserted);
        }

        // Creation writes a synthetic draft→draft row so the history always
        // starts with a record.
        order_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            from_status: Set(OrderStatus::Draft.as_str().to_string()),
            to_status: Set(OrderStatus::Draft.as_str().to_string()),
            changed_by: Set(None),
            reason: Set(Some("Order created".to_string())),
            metadata: Set(None),
            created_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            items = items.len(),
            total_amount = %order.total_amount,
            "Order created"
        );

        self.event_sender
            .send_or_log(Event::OrderCreated(order.id))
            .await;

        Ok(OrderWithItems { order, items })
    }

    /// Transitions an order along the workflow table. Conditions are checked
    /// against live state before anything is mutated; stock actions run in
    /// the same unit of work as the status change and its history row.
    #[instrument(skip(self, changed_by, reason), fields(order_id = %id, new_status = new_status))]
    pub async fn update_status(
        &self,
        id: Uuid,
        new_status: &str,
        changed_by: Option<String>,
        reason: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        let target = parse_order_status(new_status)?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let order = OrderEntity::find_by_id(id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

        let current = parse_order_status(&order.status)?;
        let transition = order_workflow::find_transition(current, target).ok_or_else(|| {
            ServiceError::InvalidTransition(format!(
                "Order cannot move from {} to {}",
                current.as_str(),
                target.as_str()
            ))
        })?;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        for condition in transition.conditions {
            self.check_condition(&txn, *condition, &order, &items)
                .await?;
        }

        let mut stock_events = Vec::new();
        for action in transition.actions {
            match action {
                TransitionAction::AllocateStock => {
                    self.allocate_stock(&txn, &order, &items, &changed_by, &mut stock_events)
                        .await?;
                }
                TransitionAction::ReleaseStock => {
                    self.release_stock(&txn, &order, &items, &changed_by, &mut stock_events)
                        .await?;
                }
            }
        }

        let now = Utc::now();
        let old_status = order.status.clone();
        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(target.as_str().to_string());
        active.version = Set(version + 1);
        active.updated_at = Set(Some(now));
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;

        order_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(updated.id),
            from_status: Set(old_status.clone()),
            to_status: Set(updated.status.clone()),
            changed_by: Set(changed_by),
            reason: Set(reason),
            metadata: Set(Some(json!({
                "conditions": transition
                    .conditions
                    .iter()
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>(),
            }))),
            created_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            order_id = %updated.id,
            from = %old_status,
            to = %updated.status,
            "Order status updated"
        );

        for event in stock_events {
            self.event_sender.send_or_log(event).await;
        }
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id: updated.id,
                old_status,
                new_status: updated.status.clone(),
            })
            .await;

        Ok(updated)
    }

    /// Evaluates one named transition condition against live order and
    /// stock state. Fails with `PreconditionFailed` before any mutation.
    async fn check_condition<C: ConnectionTrait>(
        &self,
        conn: &C,
        condition: TransitionCondition,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> Result<(), ServiceError> {
        let satisfied = match condition {
            TransitionCondition::PaymentVerified => order.payment_status == PAYMENT_STATUS_PAID,
            TransitionCondition::StockAvailable => {
                let mut ok = true;
                for item in items {
                    let levels = stock_levels_for_product(conn, item.product_id).await?;
                    let total: i64 = levels.iter().map(|l| i64::from(l.current_quantity)).sum();
                    if total < i64::from(item.quantity) {
                        ok = false;
                        break;
                    }
                }
                ok
            }
            TransitionCondition::StockAllocated => items
                .iter()
                .all(|item| item.allocated_quantity >= item.quantity),
            TransitionCondition::AllItemsPicked => {
                items.iter().all(|item| item.picked_quantity >= item.quantity)
            }
            TransitionCondition::ShippingLabelCreated => order
                .tracking_number
                .as_deref()
                .map_or(false, |t| !t.trim().is_empty()),
        };

        if satisfied {
            Ok(())
        } else {
            Err(ServiceError::PreconditionFailed(format!(
                "Condition '{}' is not satisfied for order {}",
                condition.as_str(),
                order.order_number
            )))
        }
    }

    /// Walks each line item's stock levels oldest-first, reducing availability
    /// through the ledger until the requested quantity is covered or supply
    /// runs out. The covered amount is recorded as the item's allocation;
    /// partial coverage is permitted.
    async fn allocate_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: &order::Model,
        items: &[order_item::Model],
        changed_by: &Option<String>,
        stock_events: &mut Vec<Event>,
    ) -> Result<(), ServiceError> {
        for item in items {
            let levels = stock_levels_for_product(conn, item.product_id).await?;

            let mut remaining = item.quantity - item.allocated_quantity;
            let mut covered = item.allocated_quantity;
            for level in levels {
                if remaining <= 0 {
                    break;
                }
                if level.current_quantity <= 0 {
                    continue;
                }
                let take = remaining.min(level.current_quantity);
                let ctx = MovementContext {
                    reference: Some(order.order_number.clone()),
                    performed_by: changed_by.clone(),
                    notes: Some(format!("Allocated to order {}", order.order_number)),
                };
                let (updated_level, _) = apply_movement_on(
                    conn,
                    level.id,
                    take,
                    MovementType::Reduction,
                    &ctx,
                )
                .await?;
                push_stock_events(stock_events, &updated_level);

                remaining -= take;
                covered += take;
            }

            if covered != item.allocated_quantity {
                let mut active: order_item::ActiveModel = item.clone().into();
                active.allocated_quantity = Set(covered);
                active.updated_at = Set(Some(Utc::now()));
                active.update(conn).await.map_err(ServiceError::db_error)?;
            }
        }
        Ok(())
    }

    /// Returns each item's allocated quantity to the first stock level for
    /// its product and resets the allocation to zero.
    async fn release_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: &order::Model,
        items: &[order_item::Model],
        changed_by: &Option<String>,
        stock_events: &mut Vec<Event>,
    ) -> Result<(), ServiceError> {
        for item in items {
            if item.allocated_quantity <= 0 {
                continue;
            }

            let levels = stock_levels_for_product(conn, item.product_id).await?;
            let first = levels.into_iter().next().ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "No stock level exists for product {} to release into",
                    item.product_id
                ))
            })?;

            let ctx = MovementContext {
                reference: Some(order.order_number.clone()),
                performed_by: changed_by.clone(),
                notes: Some(format!("Released from order {}", order.order_number)),
            };
            let (updated_level, _) = apply_movement_on(
                conn,
                first.id,
                item.allocated_quantity,
                MovementType::Addition,
                &ctx,
            )
            .await?;
            push_stock_events(stock_events, &updated_level);

            let mut active: order_item::ActiveModel = item.clone().into();
            active.allocated_quantity = Set(0);
            active.updated_at = Set(Some(Utc::now()));
            active.update(conn).await.map_err(ServiceError::db_error)?;
        }
        Ok(())
    }

    /// Sets the tracking number and carrier on an order.
    #[instrument(skip(self, tracking_number, carrier), fields(order_id = %id))]
    pub async fn update_tracking(
        &self,
        id: Uuid,
        tracking_number: String,
        carrier: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        if tracking_number.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Tracking number cannot be empty".to_string(),
            ));
        }

        let db = self.db_pool.as_ref();

        let order = OrderEntity::find_by_id(id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

        let mut active: order::ActiveModel = order.into();
        active.tracking_number = Set(Some(tracking_number.clone()));
        if carrier.is_some() {
            active.carrier = Set(carrier);
        }
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(db).await.map_err(ServiceError::db_error)?;

        info!(order_id = %updated.id, tracking_number = %tracking_number, "Order tracking updated");

        self.event_sender
            .send_or_log(Event::OrderTrackingUpdated {
                order_id: updated.id,
                tracking_number,
            })
            .await;

        Ok(updated)
    }

    /// Cancels an order through the workflow, releasing stock where the
    /// current status requires it.
    #[instrument(skip(self, changed_by, reason), fields(order_id = %id))]
    pub async fn cancel_order(
        &self,
        id: Uuid,
        changed_by: Option<String>,
        reason: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        self.update_status(id, OrderStatus::Cancelled.as_str(), changed_by, reason)
            .await
    }

    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn get_order(&self, id: Uuid) -> Result<OrderWithItems, ServiceError> {
        let db = self.db_pool.as_ref();

        let order = OrderEntity::find_by_id(id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(OrderWithItems { order, items })
    }

    /// Statuses the order can move to from where it is now.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn get_valid_transitions(&self, id: Uuid) -> Result<Vec<OrderStatus>, ServiceError> {
        let order = OrderEntity::find_by_id(id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

        let current = parse_order_status(&order.status)?;
        Ok(order_workflow::valid_transitions(current))
    }

    /// Orders in a given status, newest first.
    #[instrument(skip(self))]
    pub async fn get_by_status(&self, status: &str) -> Result<Vec<order::Model>, ServiceError> {
        let parsed = parse_order_status(status)?;

        OrderEntity::find()
            .filter(order::Column::Status.eq(parsed.as_str()))
            .order_by_desc(order::Column::CreatedAt)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Status transition history for an order, oldest first.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn get_status_history(
        &self,
        id: Uuid,
    ) -> Result<Vec<order_status_history::Model>, ServiceError> {
        let db = self.db_pool.as_ref();

        OrderEntity::find_by_id(id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

        OrderStatusHistoryEntity::find()
            .filter(order_status_history::Column::OrderId.eq(id))
            .order_by_asc(order_status_history::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }
}

fn push_stock_events(events: &mut Vec<Event>, level: &stock_level::Model) {
    events.push(Event::StockUpdated {
        stock_level_id: level.id,
        product_id: level.product_id,
        quantity: level.current_quantity,
        status: level.status.clone(),
    });
    if level.alert_enabled && level.stock_status().is_alertable() {
        events.push(Event::StockAlert {
            stock_level_id: level.id,
            product_id: level.product_id,
            quantity: level.current_quantity,
            status: level.status.clone(),
        });
    }
}
