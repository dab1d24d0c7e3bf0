use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// The events that can occur in the system. Sending is decoupled from the
/// request path; the processing loop below drains them in the background.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartItemAdded { user_id: i64, product_id: i64 },
    CartItemUpdated { user_id: i64, item_id: i64 },
    CartItemRemoved { user_id: i64, item_id: i64 },
    CartCleared(i64),

    // Checkout events
    OrderCompleted { order_id: i64, user_id: i64 },

    // Product events
    ProductStockChanged {
        product_id: i64,
        old_quantity: i32,
        new_quantity: i32,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is gone.
    /// Domain events are telemetry here; losing one never fails a request.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event: {}", e);
        }
    }
}

/// Processes incoming events until the channel closes.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderCompleted { order_id, user_id } => {
                info!(order_id, user_id, "order completed");
            }
            Event::ProductStockChanged {
                product_id,
                old_quantity,
                new_quantity,
            } => {
                info!(product_id, old_quantity, new_quantity, "product stock changed");
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    info!("Event processing loop stopped");
}
