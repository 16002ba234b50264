use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

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

    /// Sends an event and logs instead of failing when the channel is closed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropping domain event");
        }
    }
}

/// Creates a bounded event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

// Domain events published after a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    // Service visit events
    ServiceVisitCreated(Uuid),
    ServiceVisitStatusChanged {
        visit_id: Uuid,
        old_status: String,
        new_status: String,
    },
    ServiceVisitDeleted(Uuid),

    // Invoice events
    InvoiceCreated {
        invoice_id: Uuid,
        invoice_number: String,
        total_cents: i64,
    },
    InvoiceSubmitted(Uuid),
    InvoiceApproved(Uuid),
    InvoiceRejected(Uuid),
    InvoiceDeleted(Uuid),

    // Payment events
    InvoicePaymentRecorded {
        invoice_id: Uuid,
        payment_id: Uuid,
        amount_cents: i64,
    },
    InvoicePaymentStatusChanged {
        invoice_id: Uuid,
        payment_status: String,
    },

    // Coupon events
    CouponCreated(Uuid),
    CouponUpdated(Uuid),
    CouponRedeemed {
        coupon_id: Uuid,
        invoice_id: Uuid,
        customer_id: Uuid,
    },

    // Warranty events
    WarrantyCreated(Uuid),
    WarrantyCardUploaded {
        invoice_id: Uuid,
        item_index: usize,
        vehicles_synced: usize,
    },
}

pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::ServiceVisitStatusChanged {
                visit_id,
                old_status,
                new_status,
            } => {
                info!(%visit_id, %old_status, %new_status, "Service visit status changed");
            }
            Event::InvoiceApproved(invoice_id) => {
                info!(%invoice_id, "Invoice approved");
            }
            Event::InvoiceRejected(invoice_id) => {
                info!(%invoice_id, "Invoice rejected");
            }
            Event::InvoicePaymentRecorded {
                invoice_id,
                payment_id,
                amount_cents,
            } => {
                info!(%invoice_id, %payment_id, amount_cents, "Invoice payment recorded");
            }
            Event::WarrantyCardUploaded {
                invoice_id,
                item_index,
                vehicles_synced,
            } => {
                info!(%invoice_id, item_index, vehicles_synced, "Warranty card uploaded");
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    warn!("Event processing loop has ended");
}
