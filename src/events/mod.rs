use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events emitted by the domain services and fanned out by the in-process
/// event loop. The channel is fire-and-forget: services never block on
/// delivery and a full channel only costs a warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // User events
    UserRegistered(Uuid),
    UserLoggedIn(Uuid),

    // Cart events
    CartCreated(Uuid),
    CartLineAdded {
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    CartLineUpdated {
        cart_id: Uuid,
        line_id: Uuid,
    },
    CartLineRemoved {
        cart_id: Uuid,
        line_id: Uuid,
    },
    CartValidated {
        cart_id: Uuid,
        client_id: Uuid,
        total: Decimal,
    },
    CartStatusChanged {
        cart_id: Uuid,
        old_status: String,
        new_status: String,
    },

    // Stock events
    StockReserved {
        product_id: Uuid,
        quantity: i32,
    },
    StockReleased {
        product_id: Uuid,
        quantity: i32,
    },

    // Catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductDeleted(Uuid),

    // Shop events
    ShopCreated(Uuid),
    ShopUpdated(Uuid),

    // Grade events
    GradePromoted {
        vendor_id: Uuid,
        old_tier: String,
        new_tier: String,
    },

    // Messaging events
    MessageSent {
        message_id: Uuid,
        conversation_id: Uuid,
    },

    // Generic event for custom messages
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    },
}

impl Event {
    pub fn with_data(data: String) -> Self {
        Event::Generic {
            message: data,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
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

    /// Sends an event and downgrades delivery failure to a warning. Domain
    /// operations must not fail because the event loop is behind.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event delivery failed: {}", e);
        }
    }
}

/// Handlers implementing this trait process events asynchronously.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

/// Processes incoming events and distributes them to registered handlers.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handlers: Vec<Box<dyn EventHandler>>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::CartValidated {
                cart_id,
                client_id,
                total,
            } => {
                info!(%cart_id, %client_id, %total, "cart validated");
            }
            Event::GradePromoted {
                vendor_id,
                old_tier,
                new_tier,
            } => {
                info!(%vendor_id, %old_tier, %new_tier, "vendor promoted");
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }

        for handler in &handlers {
            if let Err(e) = handler.handle_event(event.clone()).await {
                error!("Event handler failed: {}", e);
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);

        let id = Uuid::new_v4();
        sender.send(Event::CartCreated(id)).await.unwrap();

        match rx.recv().await {
            Some(Event::CartCreated(got)) => assert_eq!(got, id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_fails_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        assert!(sender.send(Event::with_data("lost".into())).await.is_err());
    }
}
