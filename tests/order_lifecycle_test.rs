use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use stockflow_api::{
    db::{establish_connection, run_migrations, DbPool},
    entities::{
        order::OrderStatus,
        order_item::{self, Entity as OrderItem},
        stock_level::StockStatus,
    },
    errors::ServiceError,
    events::EventSender,
    services::{
        orders::{CreateOrderItemRequest, CreateOrderRequest, OrderService},
        products::{CreateProductRequest, ProductService},
        stock::{CreateStockLevelRequest, StockLedgerService},
    },
};
use tokio::sync::mpsc;
use uuid::Uuid;

struct TestContext {
    db: Arc<DbPool>,
    orders: OrderService,
    stock: StockLedgerService,
    products: ProductService,
}

async fn setup() -> TestContext {
    let db = Arc::new(
        establish_connection("sqlite::memory:")
            .await
            .expect("Failed to create DB pool"),
    );
    run_migrations(db.as_ref())
        .await
        .expect("Failed to run migrations");

    let (tx, mut rx) = mpsc::channel(100);
    tokio::spawn(async move { while rx.recv().await.is_some() {} });
    let event_sender = Arc::new(EventSender::new(tx));

    TestContext {
        orders: OrderService::new(db.clone(), event_sender.clone()),
        stock: StockLedgerService::new(db.clone(), event_sender),
        products: ProductService::new(db.clone()),
        db,
    }
}

async fn create_product(ctx: &TestContext, sku: &str, price: i64) -> Uuid {
    ctx.products
        .create_product(CreateProductRequest {
            sku: sku.to_string(),
            name: format!("Product {}", sku),
            description: None,
            unit_price: Some(Decimal::new(price, 2)),
        })
        .await
        .expect("product creation failed")
        .id
}

async fn create_stock(ctx: &TestContext, product_id: Uuid, quantity: i32) -> Uuid {
    ctx.stock
        .create_stock_level(CreateStockLevelRequest {
            product_id,
            location_id: Uuid::new_v4(),
            initial_quantity: quantity,
            minimum_threshold: 0,
            maximum_threshold: None,
            alert_enabled: true,
            reorder_quantity: None,
        })
        .await
        .expect("stock level creation failed")
        .id
}

fn order_request(product_id: Uuid, quantity: i32, payment_status: &str) -> CreateOrderRequest {
    CreateOrderRequest {
        customer_id: Uuid::new_v4(),
        priority: "normal".to_string(),
        currency: "USD".to_string(),
        payment_status: payment_status.to_string(),
        shipping_address: Some("1 Test Way".to_string()),
        billing_address: None,
        notes: None,
        items: vec![CreateOrderItemRequest {
            product_id,
            quantity,
            unit_price: None,
        }],
    }
}

async fn order_item(ctx: &TestContext, order_id: Uuid) -> order_item::Model {
    OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .one(ctx.db.as_ref())
        .await
        .expect("query failed")
        .expect("order item missing")
}

#[tokio::test]
async fn creation_computes_totals_and_starts_in_draft() {
    let ctx = setup().await;
    let product = create_product(&ctx, "ORD-P1", 2_50).await;

    let created = ctx
        .orders
        .create_order(order_request(product, 4, "unpaid"))
        .await
        .expect("order creation failed");

    assert_eq!(created.order.status, OrderStatus::Draft.as_str());
    assert_eq!(created.order.total_amount, Decimal::new(10_00, 2));
    assert_eq!(created.items.len(), 1);
    assert_eq!(created.items[0].quantity, 4);
    assert_eq!(created.items[0].allocated_quantity, 0);

    let date = chrono::Utc::now().format("%Y%m%d").to_string();
    assert_eq!(created.order.order_number, format!("ORD-{}-0001", date));

    // Creation writes the synthetic initial history row.
    let history = ctx
        .orders
        .get_status_history(created.order.id)
        .await
        .expect("history failed");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_status, "draft");
    assert_eq!(history[0].to_status, "draft");
}

#[tokio::test]
async fn creation_with_unknown_product_is_not_found() {
    let ctx = setup().await;
    let err = ctx
        .orders
        .create_order(order_request(Uuid::new_v4(), 1, "unpaid"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn draft_cannot_jump_to_shipped() {
    let ctx = setup().await;
    let product = create_product(&ctx, "ORD-P2", 1_00).await;
    let created = ctx
        .orders
        .create_order(order_request(product, 1, "paid"))
        .await
        .expect("order creation failed");

    let err = ctx
        .orders
        .update_status(created.order.id, "shipped", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition(_)));
}

#[tokio::test]
async fn confirmation_requires_payment_and_stock() {
    let ctx = setup().await;
    let product = create_product(&ctx, "ORD-P3", 1_00).await;
    create_stock(&ctx, product, 5).await;

    // Unpaid order with ample stock: payment_verified fails.
    let unpaid = ctx
        .orders
        .create_order(order_request(product, 2, "unpaid"))
        .await
        .expect("order creation failed");
    ctx.orders
        .update_status(unpaid.order.id, "pending", None, None)
        .await
        .expect("draft -> pending failed");
    let err = ctx
        .orders
        .update_status(unpaid.order.id, "confirmed", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PreconditionFailed(_)));

    // Status is unchanged after the failed condition.
    let reloaded = ctx
        .orders
        .get_order(unpaid.order.id)
        .await
        .expect("get failed");
    assert_eq!(reloaded.order.status, OrderStatus::Pending.as_str());

    // Paid order wanting more than total stock: stock_available fails.
    let oversized = ctx
        .orders
        .create_order(order_request(product, 20, "paid"))
        .await
        .expect("order creation failed");
    ctx.orders
        .update_status(oversized.order.id, "pending", None, None)
        .await
        .expect("draft -> pending failed");
    let err = ctx
        .orders
        .update_status(oversized.order.id, "confirmed", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PreconditionFailed(_)));
}

#[tokio::test]
async fn allocation_and_release_round_trip() {
    let ctx = setup().await;
    let product = create_product(&ctx, "ORD-P4", 5_00).await;
    let stock_level = create_stock(&ctx, product, 10).await;

    let created = ctx
        .orders
        .create_order(order_request(product, 10, "paid"))
        .await
        .expect("order creation failed");
    let id = created.order.id;

    ctx.orders
        .update_status(id, "pending", None, None)
        .await
        .expect("draft -> pending failed");
    ctx.orders
        .update_status(id, "confirmed", None, None)
        .await
        .expect("pending -> confirmed failed");

    // confirmed -> processing allocates the full line.
    ctx.orders
        .update_status(id, "processing", None, None)
        .await
        .expect("confirmed -> processing failed");

    let level = ctx
        .stock
        .get_stock_level(stock_level)
        .await
        .expect("get failed");
    assert_eq!(level.current_quantity, 0);
    assert_eq!(level.status, StockStatus::OutOfStock.as_str());
    assert_eq!(order_item(&ctx, id).await.allocated_quantity, 10);

    // processing -> cancelled releases everything back.
    ctx.orders
        .update_status(id, "cancelled", None, Some("customer request".to_string()))
        .await
        .expect("processing -> cancelled failed");

    let level = ctx
        .stock
        .get_stock_level(stock_level)
        .await
        .expect("get failed");
    assert_eq!(level.current_quantity, 10);
    assert_eq!(order_item(&ctx, id).await.allocated_quantity, 0);

    // The ledger recorded both movements.
    let history = ctx
        .stock
        .get_history(stock_level)
        .await
        .expect("history failed");
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn allocation_spans_multiple_stock_levels_oldest_first() {
    let ctx = setup().await;
    let product = create_product(&ctx, "ORD-P5", 1_00).await;
    let older = create_stock(&ctx, product, 6).await;
    // Keep created_at strictly ordered so the allocation walk is deterministic.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let newer = create_stock(&ctx, product, 6).await;

    let created = ctx
        .orders
        .create_order(order_request(product, 9, "paid"))
        .await
        .expect("order creation failed");
    let id = created.order.id;

    ctx.orders
        .update_status(id, "pending", None, None)
        .await
        .expect("draft -> pending failed");
    ctx.orders
        .update_status(id, "confirmed", None, None)
        .await
        .expect("pending -> confirmed failed");
    ctx.orders
        .update_status(id, "processing", None, None)
        .await
        .expect("confirmed -> processing failed");

    let older_level = ctx.stock.get_stock_level(older).await.expect("get failed");
    let newer_level = ctx.stock.get_stock_level(newer).await.expect("get failed");
    assert_eq!(older_level.current_quantity, 0);
    assert_eq!(newer_level.current_quantity, 3);
    assert_eq!(order_item(&ctx, id).await.allocated_quantity, 9);
}

#[tokio::test]
async fn full_path_to_shipped() {
    let ctx = setup().await;
    let product = create_product(&ctx, "ORD-P6", 3_00).await;
    create_stock(&ctx, product, 10).await;

    let created = ctx
        .orders
        .create_order(order_request(product, 4, "paid"))
        .await
        .expect("order creation failed");
    let id = created.order.id;

    for status in ["pending", "confirmed", "processing", "picking"] {
        ctx.orders
            .update_status(id, status, Some("fulfiller".to_string()), None)
            .await
            .unwrap_or_else(|e| panic!("transition to {} failed: {}", status, e));
    }

    // picking -> packed requires every line picked in full.
    let err = ctx
        .orders
        .update_status(id, "packed", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PreconditionFailed(_)));

    let item = order_item(&ctx, id).await;
    let mut active: order_item::ActiveModel = item.into();
    active.picked_quantity = Set(4);
    active
        .update(ctx.db.as_ref())
        .await
        .expect("pick update failed");

    ctx.orders
        .update_status(id, "packed", None, None)
        .await
        .expect("picking -> packed failed");

    // packed -> shipped requires a tracking number.
    let err = ctx
        .orders
        .update_status(id, "shipped", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PreconditionFailed(_)));

    ctx.orders
        .update_tracking(id, "1Z999AA10123456784".to_string(), Some("UPS".to_string()))
        .await
        .expect("tracking update failed");
    let shipped = ctx
        .orders
        .update_status(id, "shipped", None, None)
        .await
        .expect("packed -> shipped failed");
    assert_eq!(shipped.status, OrderStatus::Shipped.as_str());

    let history = ctx
        .orders
        .get_status_history(id)
        .await
        .expect("history failed");
    // Initial synthetic row plus six transitions.
    assert_eq!(history.len(), 7);
    assert_eq!(history.last().map(|h| h.to_status.as_str()), Some("shipped"));
}

#[tokio::test]
async fn valid_transitions_reflect_the_workflow_table() {
    let ctx = setup().await;
    let product = create_product(&ctx, "ORD-P7", 1_00).await;
    create_stock(&ctx, product, 10).await;

    let created = ctx
        .orders
        .create_order(order_request(product, 1, "paid"))
        .await
        .expect("order creation failed");
    let id = created.order.id;

    ctx.orders
        .update_status(id, "pending", None, None)
        .await
        .expect("draft -> pending failed");
    ctx.orders
        .update_status(id, "confirmed", None, None)
        .await
        .expect("pending -> confirmed failed");

    let transitions = ctx
        .orders
        .get_valid_transitions(id)
        .await
        .expect("transitions failed");
    assert_eq!(
        transitions,
        vec![OrderStatus::Processing, OrderStatus::Cancelled]
    );
}

#[tokio::test]
async fn cancel_order_uses_the_workflow() {
    let ctx = setup().await;
    let product = create_product(&ctx, "ORD-P8", 1_00).await;

    let created = ctx
        .orders
        .create_order(order_request(product, 1, "unpaid"))
        .await
        .expect("order creation failed");

    let cancelled = ctx
        .orders
        .cancel_order(created.order.id, None, Some("duplicate".to_string()))
        .await
        .expect("cancel failed");
    assert_eq!(cancelled.status, OrderStatus::Cancelled.as_str());

    // A cancelled order can only move to refunded.
    let err = ctx
        .orders
        .update_status(created.order.id, "pending", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition(_)));
}

#[tokio::test]
async fn orders_are_queryable_by_status() {
    let ctx = setup().await;
    let product = create_product(&ctx, "ORD-P9", 1_00).await;

    let first = ctx
        .orders
        .create_order(order_request(product, 1, "unpaid"))
        .await
        .expect("order creation failed");
    ctx.orders
        .create_order(order_request(product, 2, "unpaid"))
        .await
        .expect("order creation failed");
    ctx.orders
        .update_status(first.order.id, "pending", None, None)
        .await
        .expect("draft -> pending failed");

    let drafts = ctx.orders.get_by_status("draft").await.expect("query failed");
    assert_eq!(drafts.len(), 1);
    let pending = ctx
        .orders
        .get_by_status("pending")
        .await
        .expect("query failed");
    assert_eq!(pending.len(), 1);

    let err = ctx.orders.get_by_status("bogus").await.unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}
