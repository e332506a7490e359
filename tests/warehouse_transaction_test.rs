use std::collections::HashMap;
use std::sync::Arc;

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use stockflow_api::{
    db::{establish_connection, run_migrations, DbPool},
    entities::{
        inventory_transaction::{TransactionStatus, TransactionType},
        warehouse_stock_level::{self, Entity as WarehouseStockLevel},
    },
    errors::ServiceError,
    events::EventSender,
    services::{
        products::{CreateProductRequest, ProductService},
        warehouse_transactions::{
            CreateTransactionItemRequest, CreateTransactionRequest, WarehouseTransactionService,
        },
    },
};
use tokio::sync::mpsc;
use uuid::Uuid;

struct TestContext {
    db: Arc<DbPool>,
    service: WarehouseTransactionService,
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
        service: WarehouseTransactionService::new(db.clone(), event_sender),
        products: ProductService::new(db.clone()),
        db,
    }
}

async fn create_product(ctx: &TestContext, sku: &str) -> Uuid {
    ctx.products
        .create_product(CreateProductRequest {
            sku: sku.to_string(),
            name: format!("Product {}", sku),
            description: None,
            unit_price: None,
        })
        .await
        .expect("product creation failed")
        .id
}

fn request(
    r#type: &str,
    warehouse_id: Uuid,
    destination: Option<Uuid>,
    product_id: Uuid,
    quantity: i32,
) -> CreateTransactionRequest {
    CreateTransactionRequest {
        r#type: r#type.to_string(),
        warehouse_id,
        destination_warehouse_id: destination,
        priority: "normal".to_string(),
        reference: None,
        notes: None,
        created_by: Some("tester".to_string()),
        items: vec![CreateTransactionItemRequest {
            product_id,
            planned_quantity: quantity,
            unit_cost: None,
            lot_number: None,
            serial_number: None,
            expiry_date: None,
        }],
    }
}

async fn approve(ctx: &TestContext, id: Uuid) {
    ctx.service
        .update_status(id, "pending", Some("tester".to_string()), None)
        .await
        .expect("draft -> pending failed");
    ctx.service
        .update_status(id, "approved", Some("tester".to_string()), None)
        .await
        .expect("pending -> approved failed");
}

async fn warehouse_level(
    ctx: &TestContext,
    warehouse_id: Uuid,
    product_id: Uuid,
) -> warehouse_stock_level::Model {
    WarehouseStockLevel::find()
        .filter(warehouse_stock_level::Column::WarehouseId.eq(warehouse_id))
        .filter(warehouse_stock_level::Column::ProductId.eq(product_id))
        .one(ctx.db.as_ref())
        .await
        .expect("query failed")
        .expect("warehouse stock level missing")
}

/// Seeds stock into a warehouse via a processed receipt.
async fn seed_stock(ctx: &TestContext, warehouse_id: Uuid, product_id: Uuid, quantity: i32) {
    let created = ctx
        .service
        .create_transaction(request("receipt", warehouse_id, None, product_id, quantity))
        .await
        .expect("receipt creation failed");
    approve(ctx, created.transaction.id).await;
    ctx.service
        .process_transaction(created.transaction.id, HashMap::new(), None)
        .await
        .expect("receipt processing failed");
}

#[tokio::test]
async fn transaction_numbers_carry_type_prefix_and_daily_sequence() {
    let ctx = setup().await;
    let product = create_product(&ctx, "NUM-1").await;
    let warehouse = Uuid::new_v4();

    let first = ctx
        .service
        .create_transaction(request("receipt", warehouse, None, product, 1))
        .await
        .expect("create failed");
    let second = ctx
        .service
        .create_transaction(request("receipt", warehouse, None, product, 1))
        .await
        .expect("create failed");

    let date = chrono::Utc::now().format("%Y%m%d").to_string();
    assert_eq!(
        first.transaction.transaction_number,
        format!("RCP-{}-0001", date)
    );
    assert_eq!(
        second.transaction.transaction_number,
        format!("RCP-{}-0002", date)
    );

    // Sequences are per type.
    let shipment = ctx
        .service
        .create_transaction(request("shipment", warehouse, None, product, 1))
        .await
        .expect("create failed");
    assert_eq!(
        shipment.transaction.transaction_number,
        format!("SHP-{}-0001", date)
    );
}

#[tokio::test]
async fn lifecycle_rejects_edges_missing_from_the_table() {
    let ctx = setup().await;
    let product = create_product(&ctx, "LIFE-1").await;
    let warehouse = Uuid::new_v4();

    let created = ctx
        .service
        .create_transaction(request("receipt", warehouse, None, product, 5))
        .await
        .expect("create failed");
    let id = created.transaction.id;
    assert_eq!(created.transaction.status, TransactionStatus::Draft.as_str());

    // draft -> approved skips pending
    let err = ctx
        .service
        .update_status(id, "approved", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition(_)));

    let pending = ctx
        .service
        .update_status(id, "pending", None, None)
        .await
        .expect("draft -> pending failed");
    assert_eq!(pending.status, TransactionStatus::Pending.as_str());

    let approved = ctx
        .service
        .update_status(id, "approved", None, None)
        .await
        .expect("pending -> approved failed");
    assert!(approved.approved_at.is_some());

    let cancelled = ctx
        .service
        .update_status(id, "cancelled", None, Some("no longer needed".to_string()))
        .await
        .expect("approved -> cancelled failed");
    assert_eq!(cancelled.status, TransactionStatus::Cancelled.as_str());

    // cancelled is terminal
    let err = ctx
        .service
        .update_status(id, "pending", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition(_)));
}

#[tokio::test]
async fn processing_requires_approved_status() {
    let ctx = setup().await;
    let product = create_product(&ctx, "PROC-1").await;
    let warehouse = Uuid::new_v4();

    let created = ctx
        .service
        .create_transaction(request("receipt", warehouse, None, product, 5))
        .await
        .expect("create failed");

    let err = ctx
        .service
        .process_transaction(created.transaction.id, HashMap::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
}

#[tokio::test]
async fn receipt_adds_available_and_total() {
    let ctx = setup().await;
    let product = create_product(&ctx, "RCPT-1").await;
    let warehouse = Uuid::new_v4();

    seed_stock(&ctx, warehouse, product, 50).await;

    let level = warehouse_level(&ctx, warehouse, product).await;
    assert_eq!(level.available_quantity, 50);
    assert_eq!(level.allocated_quantity, 0);
    assert_eq!(level.total_quantity, 50);
}

#[tokio::test]
async fn actual_quantities_override_planned_and_record_variance() {
    let ctx = setup().await;
    let product = create_product(&ctx, "VAR-1").await;
    let warehouse = Uuid::new_v4();

    let created = ctx
        .service
        .create_transaction(request("receipt", warehouse, None, product, 50))
        .await
        .expect("create failed");
    approve(&ctx, created.transaction.id).await;

    let mut actuals = HashMap::new();
    actuals.insert(created.items[0].id, 47);
    let processed = ctx
        .service
        .process_transaction(created.transaction.id, actuals, None)
        .await
        .expect("processing failed");

    assert_eq!(processed.items[0].actual_quantity, Some(47));
    assert_eq!(processed.items[0].variance_quantity, Some(-3));
    assert!(processed.transaction.completed_at.is_some());

    let level = warehouse_level(&ctx, warehouse, product).await;
    assert_eq!(level.available_quantity, 47);
}

#[tokio::test]
async fn shipment_beyond_available_stock_rolls_back() {
    let ctx = setup().await;
    let product = create_product(&ctx, "SHIP-1").await;
    let warehouse = Uuid::new_v4();

    seed_stock(&ctx, warehouse, product, 10).await;

    let shipment = ctx
        .service
        .create_transaction(request("shipment", warehouse, None, product, 25))
        .await
        .expect("create failed");
    approve(&ctx, shipment.transaction.id).await;

    let err = ctx
        .service
        .process_transaction(shipment.transaction.id, HashMap::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientStock(_)));

    // Nothing moved, the transaction is still approved.
    let level = warehouse_level(&ctx, warehouse, product).await;
    assert_eq!(level.available_quantity, 10);
    let reloaded = ctx
        .service
        .get_transaction(shipment.transaction.id)
        .await
        .expect("get failed");
    assert_eq!(
        reloaded.transaction.status,
        TransactionStatus::Approved.as_str()
    );
    assert_eq!(reloaded.items[0].actual_quantity, None);
}

#[tokio::test]
async fn transfer_requires_destination_and_moves_stock_atomically() {
    let ctx = setup().await;
    let product = create_product(&ctx, "TRF-1").await;
    let source = Uuid::new_v4();
    let destination = Uuid::new_v4();

    let err = ctx
        .service
        .create_transaction(request("transfer", source, None, product, 5))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));

    seed_stock(&ctx, source, product, 30).await;

    let transfer = ctx
        .service
        .create_transaction(request("transfer", source, Some(destination), product, 12))
        .await
        .expect("create failed");
    approve(&ctx, transfer.transaction.id).await;
    ctx.service
        .process_transaction(transfer.transaction.id, HashMap::new(), None)
        .await
        .expect("processing failed");

    let src = warehouse_level(&ctx, source, product).await;
    let dst = warehouse_level(&ctx, destination, product).await;
    assert_eq!(src.available_quantity, 18);
    assert_eq!(src.total_quantity, 18);
    assert_eq!(dst.available_quantity, 12);
    assert_eq!(dst.total_quantity, 12);
}

#[tokio::test]
async fn adjustment_sets_available_to_the_counted_amount() {
    let ctx = setup().await;
    let product = create_product(&ctx, "ADJ-1").await;
    let warehouse = Uuid::new_v4();

    seed_stock(&ctx, warehouse, product, 40).await;

    let adjustment = ctx
        .service
        .create_transaction(request("adjustment", warehouse, None, product, 25))
        .await
        .expect("create failed");
    approve(&ctx, adjustment.transaction.id).await;
    ctx.service
        .process_transaction(adjustment.transaction.id, HashMap::new(), None)
        .await
        .expect("processing failed");

    let level = warehouse_level(&ctx, warehouse, product).await;
    assert_eq!(level.available_quantity, 25);
    assert_eq!(level.total_quantity, 25);
}

#[tokio::test]
async fn allocation_and_deallocation_move_between_counters() {
    let ctx = setup().await;
    let product = create_product(&ctx, "ALC-1").await;
    let warehouse = Uuid::new_v4();

    seed_stock(&ctx, warehouse, product, 20).await;

    let allocation = ctx
        .service
        .create_transaction(request("allocation", warehouse, None, product, 8))
        .await
        .expect("create failed");
    approve(&ctx, allocation.transaction.id).await;
    ctx.service
        .process_transaction(allocation.transaction.id, HashMap::new(), None)
        .await
        .expect("processing failed");

    let level = warehouse_level(&ctx, warehouse, product).await;
    assert_eq!(level.available_quantity, 12);
    assert_eq!(level.allocated_quantity, 8);
    assert_eq!(level.total_quantity, 20);

    let deallocation = ctx
        .service
        .create_transaction(request("deallocation", warehouse, None, product, 8))
        .await
        .expect("create failed");
    approve(&ctx, deallocation.transaction.id).await;
    ctx.service
        .process_transaction(deallocation.transaction.id, HashMap::new(), None)
        .await
        .expect("processing failed");

    let level = warehouse_level(&ctx, warehouse, product).await;
    assert_eq!(level.available_quantity, 20);
    assert_eq!(level.allocated_quantity, 0);
    assert_eq!(level.total_quantity, 20);
}

#[tokio::test]
async fn reversal_restores_the_pre_receipt_baseline() {
    let ctx = setup().await;
    let product = create_product(&ctx, "REV-1").await;
    let warehouse = Uuid::new_v4();

    seed_stock(&ctx, warehouse, product, 10).await;

    let receipt = ctx
        .service
        .create_transaction(request("receipt", warehouse, None, product, 50))
        .await
        .expect("create failed");
    approve(&ctx, receipt.transaction.id).await;
    ctx.service
        .process_transaction(receipt.transaction.id, HashMap::new(), None)
        .await
        .expect("processing failed");
    assert_eq!(
        warehouse_level(&ctx, warehouse, product)
            .await
            .available_quantity,
        60
    );

    let reversal = ctx
        .service
        .reverse_transaction(
            receipt.transaction.id,
            Some("receiving error".to_string()),
            Some("tester".to_string()),
        )
        .await
        .expect("reversal failed");

    assert_eq!(reversal.transaction.r#type, TransactionType::Shipment.as_str());
    assert_eq!(
        reversal.transaction.parent_transaction_id,
        Some(receipt.transaction.id)
    );
    assert_eq!(reversal.items[0].planned_quantity, 50);
    assert_eq!(reversal.items[0].variance_quantity, Some(0));

    let original = ctx
        .service
        .get_transaction(receipt.transaction.id)
        .await
        .expect("get failed");
    assert!(original.transaction.is_reversed);
    assert_eq!(
        original.transaction.status,
        TransactionStatus::Reversed.as_str()
    );
    assert_eq!(
        original.transaction.reversal_transaction_id,
        Some(reversal.transaction.id)
    );

    assert_eq!(
        warehouse_level(&ctx, warehouse, product)
            .await
            .available_quantity,
        10
    );
}

#[tokio::test]
async fn reversing_twice_conflicts() {
    let ctx = setup().await;
    let product = create_product(&ctx, "REV-2").await;
    let warehouse = Uuid::new_v4();

    seed_stock(&ctx, warehouse, product, 50).await;

    let receipt = ctx
        .service
        .create_transaction(request("receipt", warehouse, None, product, 20))
        .await
        .expect("create failed");
    approve(&ctx, receipt.transaction.id).await;
    ctx.service
        .process_transaction(receipt.transaction.id, HashMap::new(), None)
        .await
        .expect("processing failed");

    ctx.service
        .reverse_transaction(receipt.transaction.id, None, None)
        .await
        .expect("first reversal failed");
    let err = ctx
        .service
        .reverse_transaction(receipt.transaction.id, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn audit_trail_records_the_lifecycle_in_order() {
    let ctx = setup().await;
    let product = create_product(&ctx, "AUD-1").await;
    let warehouse = Uuid::new_v4();

    let created = ctx
        .service
        .create_transaction(request("receipt", warehouse, None, product, 5))
        .await
        .expect("create failed");
    approve(&ctx, created.transaction.id).await;
    ctx.service
        .process_transaction(created.transaction.id, HashMap::new(), None)
        .await
        .expect("processing failed");
    ctx.service
        .reverse_transaction(created.transaction.id, Some("test".to_string()), None)
        .await
        .expect("reversal failed");

    let trail = ctx
        .service
        .get_audit_trail(created.transaction.id)
        .await
        .expect("audit failed");
    let actions: Vec<&str> = trail.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(
        actions,
        vec![
            "created",
            "status_changed",
            "status_changed",
            "processed",
            "reversed"
        ]
    );
}

#[tokio::test]
async fn queries_by_warehouse_and_product() {
    let ctx = setup().await;
    let product_a = create_product(&ctx, "QRY-A").await;
    let product_b = create_product(&ctx, "QRY-B").await;
    let warehouse = Uuid::new_v4();
    let other = Uuid::new_v4();

    ctx.service
        .create_transaction(request("receipt", warehouse, None, product_a, 5))
        .await
        .expect("create failed");
    ctx.service
        .create_transaction(request("receipt", other, None, product_b, 5))
        .await
        .expect("create failed");
    ctx.service
        .create_transaction(request("transfer", warehouse, Some(other), product_a, 2))
        .await
        .expect("create failed");

    let by_warehouse = ctx
        .service
        .get_by_warehouse(other)
        .await
        .expect("query failed");
    assert_eq!(by_warehouse.len(), 2);

    let by_product = ctx
        .service
        .get_by_product(product_a)
        .await
        .expect("query failed");
    assert_eq!(by_product.len(), 2);
}
