use std::sync::Arc;

use sea_orm::EntityTrait;
use stockflow_api::{
    db::{establish_connection, run_migrations, DbPool},
    entities::{
        stock_history::{Entity as StockHistory, MovementType},
        stock_level::{Entity as StockLevel, StockStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock::{
        CreateStockLevelRequest, MovementContext, StockLedgerService, UpdateAlertSettingsRequest,
    },
};
use tokio::sync::mpsc;
use uuid::Uuid;

async fn setup() -> (Arc<DbPool>, StockLedgerService, mpsc::Receiver<Event>) {
    let db = Arc::new(
        establish_connection("sqlite::memory:")
            .await
            .expect("Failed to create DB pool"),
    );
    run_migrations(db.as_ref())
        .await
        .expect("Failed to run migrations");

    let (tx, rx) = mpsc::channel(100);
    let event_sender = Arc::new(EventSender::new(tx));
    let service = StockLedgerService::new(db.clone(), event_sender);

    (db, service, rx)
}

fn create_request(initial: i32, minimum: i32, maximum: Option<i32>) -> CreateStockLevelRequest {
    CreateStockLevelRequest {
        product_id: Uuid::new_v4(),
        location_id: Uuid::new_v4(),
        initial_quantity: initial,
        minimum_threshold: minimum,
        maximum_threshold: maximum,
        alert_enabled: true,
        reorder_quantity: None,
    }
}

#[tokio::test]
async fn create_derives_initial_status() {
    let (_db, service, _rx) = setup().await;

    let empty = service
        .create_stock_level(create_request(0, 10, None))
        .await
        .expect("create failed");
    assert_eq!(empty.status, StockStatus::OutOfStock.as_str());

    let low = service
        .create_stock_level(create_request(5, 10, None))
        .await
        .expect("create failed");
    assert_eq!(low.status, StockStatus::Low.as_str());

    let over = service
        .create_stock_level(create_request(150, 10, Some(100)))
        .await
        .expect("create failed");
    assert_eq!(over.status, StockStatus::Overstocked.as_str());

    let ok = service
        .create_stock_level(create_request(50, 10, Some(100)))
        .await
        .expect("create failed");
    assert_eq!(ok.status, StockStatus::Available.as_str());
}

#[tokio::test]
async fn duplicate_product_location_pair_conflicts() {
    let (_db, service, _rx) = setup().await;

    let request = create_request(10, 2, None);
    let product_id = request.product_id;
    let location_id = request.location_id;
    service
        .create_stock_level(request)
        .await
        .expect("create failed");

    let duplicate = CreateStockLevelRequest {
        product_id,
        location_id,
        initial_quantity: 1,
        minimum_threshold: 0,
        maximum_threshold: None,
        alert_enabled: false,
        reorder_quantity: None,
    };
    let err = service.create_stock_level(duplicate).await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn movements_update_quantity_and_append_history() {
    let (db, service, _rx) = setup().await;

    let level = service
        .create_stock_level(create_request(10, 2, None))
        .await
        .expect("create failed");

    let after_add = service
        .apply_movement(
            level.id,
            5,
            MovementType::Addition,
            MovementContext::default(),
        )
        .await
        .expect("addition failed");
    assert_eq!(after_add.current_quantity, 15);

    let after_sub = service
        .apply_movement(
            level.id,
            4,
            MovementType::Reduction,
            MovementContext {
                reference: Some("ORD-1".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("reduction failed");
    assert_eq!(after_sub.current_quantity, 11);

    let after_count = service
        .apply_movement(
            level.id,
            3,
            MovementType::InventoryCount,
            MovementContext::default(),
        )
        .await
        .expect("count failed");
    assert_eq!(after_count.current_quantity, 3);

    let history = service.get_history(level.id).await.expect("history failed");
    assert_eq!(history.len(), 3);
    // Newest first.
    assert_eq!(history[0].quantity_before, 11);
    assert_eq!(history[0].quantity_after, 3);
    assert_eq!(history[0].quantity_changed, -8);
    assert_eq!(history[2].quantity_before, 10);
    assert_eq!(history[2].quantity_after, 15);
    assert_eq!(history[2].quantity_changed, 5);
    assert_eq!(history[1].reference.as_deref(), Some("ORD-1"));

    let rows = StockHistory::find()
        .all(db.as_ref())
        .await
        .expect("query failed");
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn over_reduction_fails_and_leaves_state_unchanged() {
    let (_db, service, _rx) = setup().await;

    let level = service
        .create_stock_level(create_request(3, 0, None))
        .await
        .expect("create failed");

    let err = service
        .apply_movement(
            level.id,
            4,
            MovementType::Reduction,
            MovementContext::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientStock(_)));

    let reloaded = service
        .get_stock_level(level.id)
        .await
        .expect("get failed");
    assert_eq!(reloaded.current_quantity, 3);

    let history = service.get_history(level.id).await.expect("history failed");
    assert!(history.is_empty());
}

#[tokio::test]
async fn reduction_to_zero_marks_out_of_stock_and_alerts() {
    let (_db, service, mut rx) = setup().await;

    let level = service
        .create_stock_level(create_request(10, 2, None))
        .await
        .expect("create failed");

    let updated = service
        .apply_movement(
            level.id,
            10,
            MovementType::Reduction,
            MovementContext::default(),
        )
        .await
        .expect("reduction failed");
    assert_eq!(updated.current_quantity, 0);
    assert_eq!(updated.status, StockStatus::OutOfStock.as_str());

    let first = rx.recv().await.expect("no event");
    assert!(matches!(first, Event::StockUpdated { quantity: 0, .. }));
    let second = rx.recv().await.expect("no alert event");
    match second {
        Event::StockAlert {
            stock_level_id,
            quantity,
            ..
        } => {
            assert_eq!(stock_level_id, level.id);
            assert_eq!(quantity, 0);
        }
        other => panic!("expected StockAlert, got {:?}", other),
    }
}

#[tokio::test]
async fn alert_settings_rederive_status_without_movement() {
    let (_db, service, _rx) = setup().await;

    let level = service
        .create_stock_level(create_request(50, 10, None))
        .await
        .expect("create failed");
    assert_eq!(level.status, StockStatus::Available.as_str());

    let updated = service
        .update_alert_settings(
            level.id,
            UpdateAlertSettingsRequest {
                minimum_threshold: Some(60),
                ..Default::default()
            },
        )
        .await
        .expect("update failed");
    assert_eq!(updated.status, StockStatus::Low.as_str());
    assert_eq!(updated.current_quantity, 50);

    let history = service.get_history(level.id).await.expect("history failed");
    assert!(history.is_empty());
}

#[tokio::test]
async fn delete_refuses_while_history_exists() {
    let (db, service, _rx) = setup().await;

    let level = service
        .create_stock_level(create_request(10, 2, None))
        .await
        .expect("create failed");
    service
        .apply_movement(
            level.id,
            1,
            MovementType::Addition,
            MovementContext::default(),
        )
        .await
        .expect("movement failed");

    let err = service.delete_stock_level(level.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    let untouched = service
        .create_stock_level(create_request(1, 0, None))
        .await
        .expect("create failed");
    service
        .delete_stock_level(untouched.id)
        .await
        .expect("delete failed");
    assert!(StockLevel::find_by_id(untouched.id)
        .one(db.as_ref())
        .await
        .expect("query failed")
        .is_none());
}

#[tokio::test]
async fn low_stock_listing_respects_alert_flag() {
    let (_db, service, _rx) = setup().await;

    let low = service
        .create_stock_level(create_request(2, 5, None))
        .await
        .expect("create failed");
    let out = service
        .create_stock_level(create_request(0, 5, None))
        .await
        .expect("create failed");
    service
        .create_stock_level(create_request(50, 5, None))
        .await
        .expect("create failed");

    let mut silenced = create_request(1, 5, None);
    silenced.alert_enabled = false;
    service
        .create_stock_level(silenced)
        .await
        .expect("create failed");

    let items = service.get_low_stock_items().await.expect("listing failed");
    let ids: Vec<Uuid> = items.iter().map(|l| l.id).collect();
    assert_eq!(items.len(), 2);
    assert!(ids.contains(&low.id));
    assert!(ids.contains(&out.id));
}

#[tokio::test]
async fn unknown_stock_level_is_not_found() {
    let (_db, service, _rx) = setup().await;

    let err = service.get_stock_level(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let err = service.get_history(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}
