//! # Domain Events
//!
//! A typed event bus so the finalize logic never depends on a UI
//! notification mechanism. Subscribers (list refresh, printing,
//! dashboards) attach through `subscribe()`; publishing with no
//! subscribers is a no-op, not an error.

use tokio::sync::broadcast;

use caixa_core::types::FiscalStatus;

/// Events the checkout publishes.
#[derive(Debug, Clone)]
pub enum CheckoutEvent {
    /// A sale reached its terminal Completed phase.
    SaleFinalized {
        sale_id: String,
        series: i64,
        number: i64,
        total_cents: i64,
    },

    /// A sale's fiscal status changed (authorized, pending, cancelled),
    /// during finalize or through the manual retry/cancel actions.
    FiscalStatusChanged {
        sale_id: String,
        status: FiscalStatus,
    },
}

/// Broadcast bus for checkout events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CheckoutEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        EventBus { tx }
    }

    /// Attaches a new subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<CheckoutEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event. Nobody listening is fine.
    pub fn publish(&self, event: CheckoutEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new(64)
    }
}
