use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Handle for emitting domain events to the notification pipeline.
///
/// Services receive an `EventSender` explicitly; emission is fire-and-forget
/// and a failed send must never fail or roll back the operation that
/// produced the event.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Best-effort send: logs and swallows failures. Used after a unit of
    /// work has already committed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Failed to publish domain event");
        }
    }
}

/// Domain events emitted by the core services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderTrackingUpdated {
        order_id: Uuid,
        tracking_number: String,
    },

    // Stock ledger events
    StockUpdated {
        stock_level_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        status: String,
    },
    StockAlert {
        stock_level_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        status: String,
    },

    // Warehouse transaction events
    TransactionCreated(Uuid),
    TransactionStatusChanged {
        transaction_id: Uuid,
        old_status: String,
        new_status: String,
    },
    TransactionCompleted(Uuid),
    TransactionReversed {
        transaction_id: Uuid,
        reversal_id: Uuid,
    },
}

/// Drains the event channel and logs each event. This is the in-process
/// stand-in for the external notification pipeline; delivery is best-effort
/// by contract.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::StockAlert {
                stock_level_id,
                product_id,
                quantity,
                status,
            } => {
                warn!(
                    stock_level_id = %stock_level_id,
                    product_id = %product_id,
                    quantity = quantity,
                    status = %status,
                    "Stock alert raised"
                );
            }
            other => {
                info!(event = ?other, "Domain event");
            }
        }
    }

    info!("Event channel closed; stopping event processing loop");
}
