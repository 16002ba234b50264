//! Outbound customer notifications.
//!
//! Delivery itself (WhatsApp, email) lives behind a gateway; this module only decides
//! what to send and reports per-channel outcomes back to the caller.

use crate::entities::{invoice, service_visit};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::{path::Path, time::Duration};
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification gateway rejected the request: {0}")]
    Rejected(String),
    #[error("notification gateway unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("no delivery channel available for {0}")]
    NoChannel(String),
}

/// Which channels accepted an invoice notification.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NotificationReport {
    pub email: bool,
    pub whatsapp: bool,
    pub errors: Vec<String>,
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Tells the customer their visit changed phase.
    async fn notify_service_visit_status(
        &self,
        visit: &service_visit::Model,
        customer_name: &str,
        status: service_visit::VisitStatus,
    ) -> Result<(), NotificationError>;

    /// Sends the approved invoice, with its document when one was rendered.
    async fn send_invoice_notifications(
        &self,
        invoice: &invoice::Model,
        document: Option<&Path>,
    ) -> NotificationReport;
}

/// Logs what would have been sent. Used when no gateway is configured.
#[derive(Clone, Debug, Default)]
pub struct LogOnlyDispatcher;

#[async_trait]
impl NotificationDispatcher for LogOnlyDispatcher {
    async fn notify_service_visit_status(
        &self,
        visit: &service_visit::Model,
        customer_name: &str,
        status: service_visit::VisitStatus,
    ) -> Result<(), NotificationError> {
        info!(
            visit_id = %visit.id,
            customer = customer_name,
            %status,
            "Service visit status notification (not delivered, no gateway)"
        );
        Ok(())
    }

    async fn send_invoice_notifications(
        &self,
        invoice: &invoice::Model,
        document: Option<&Path>,
    ) -> NotificationReport {
        info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            document = ?document,
            "Invoice notification (not delivered, no gateway)"
        );
        NotificationReport::default()
    }
}

#[derive(Debug, Serialize)]
struct GatewayMessage<'a> {
    channel: &'a str,
    event: &'a str,
    customer_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    recipient: Option<&'a str>,
    customer_name: &'a str,
    reference_id: Uuid,
    reference_number: Option<&'a str>,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachment: Option<String>,
}

/// Posts notifications to an HTTP gateway that fans them out to WhatsApp and email.
#[derive(Clone)]
pub struct WebhookDispatcher {
    client: Client,
    endpoint: String,
}

impl WebhookDispatcher {
    pub fn new(endpoint: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to construct reqwest client for notification gateway")?;
        Ok(Self::with_client(endpoint, client))
    }

    pub fn with_client(endpoint: impl Into<String>, client: Client) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn post(&self, message: &GatewayMessage<'_>) -> Result<(), NotificationError> {
        let response = self.client.post(&self.endpoint).json(message).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(NotificationError::Rejected(format!("{} {}", status, body)))
        }
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    #[instrument(skip(self, visit), fields(visit_id = %visit.id))]
    async fn notify_service_visit_status(
        &self,
        visit: &service_visit::Model,
        customer_name: &str,
        status: service_visit::VisitStatus,
    ) -> Result<(), NotificationError> {
        let message = GatewayMessage {
            channel: "whatsapp",
            event: "service_visit_status",
            customer_id: visit.customer_id,
            recipient: None,
            customer_name,
            reference_id: visit.id,
            reference_number: Some(&visit.vehicle_number),
            status: status.to_string(),
            attachment: None,
        };
        self.post(&message).await
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.id))]
    async fn send_invoice_notifications(
        &self,
        invoice: &invoice::Model,
        document: Option<&Path>,
    ) -> NotificationReport {
        let customer = &invoice.customer_details;
        let attachment = document.map(|path| path.display().to_string());
        let mut report = NotificationReport::default();

        let whatsapp = GatewayMessage {
            channel: "whatsapp",
            event: "invoice_approved",
            customer_id: invoice.customer_id,
            recipient: Some(&customer.phone),
            customer_name: &customer.name,
            reference_id: invoice.id,
            reference_number: Some(&invoice.invoice_number),
            status: invoice.status.to_string(),
            attachment: attachment.clone(),
        };
        match self.post(&whatsapp).await {
            Ok(()) => report.whatsapp = true,
            Err(e) => {
                warn!(error = %e, "WhatsApp invoice notification failed");
                report.errors.push(format!("whatsapp: {}", e));
            }
        }

        match customer.email.as_deref() {
            Some(email) => {
                let message = GatewayMessage {
                    channel: "email",
                    recipient: Some(email),
                    ..whatsapp
                };
                match self.post(&message).await {
                    Ok(()) => report.email = true,
                    Err(e) => {
                        warn!(error = %e, "Email invoice notification failed");
                        report.errors.push(format!("email: {}", e));
                    }
                }
            }
            None => report
                .errors
                .push(format!("email: {}", NotificationError::NoChannel(customer.name.clone()))),
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::invoice::{
        CustomerSnapshot, InvoiceStatus, LineItems, PaymentStatus, VehicleSnapshots,
    };
    use chrono::Utc;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn invoice(email: Option<&str>) -> invoice::Model {
        let now = Utc::now();
        invoice::Model {
            id: Uuid::new_v4(),
            invoice_number: "INV-000001".into(),
            service_visit_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            vehicle_number: "KA01AB1234".into(),
            customer_details: CustomerSnapshot {
                id: Uuid::new_v4(),
                name: "Asha Rao".into(),
                email: email.map(str::to_string),
                phone: "+919800000001".into(),
                address: None,
            },
            vehicle_details: VehicleSnapshots::default(),
            items: LineItems::default(),
            subtotal_cents: 50_000,
            discount_type: None,
            discount_value: 0,
            discount_cents: 0,
            coupon_id: None,
            coupon_code: None,
            tax_rate_bps: 0,
            tax_cents: 0,
            total_cents: 50_000,
            paid_cents: 0,
            due_cents: 50_000,
            status: InvoiceStatus::Approved,
            payment_status: PaymentStatus::Unpaid,
            payment_method: None,
            rejection_reason: None,
            access_token: None,
            access_token_expires_at: None,
            document_path: None,
            approval_report: None,
            notes: None,
            terms: None,
            approved_at: Some(now),
            approved_by: None,
            created_by: None,
            version: 2,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn webhook_reports_each_channel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/notify"))
            .and(body_partial_json(serde_json::json!({"channel": "whatsapp"})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/notify"))
            .and(body_partial_json(serde_json::json!({"channel": "email"})))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::new(format!("{}/notify", server.uri())).unwrap();
        let report = dispatcher
            .send_invoice_notifications(&invoice(Some("asha@example.com")), None)
            .await;

        assert!(report.whatsapp);
        assert!(!report.email);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("email:"));
    }

    #[tokio::test]
    async fn missing_email_is_reported_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::new(server.uri()).unwrap();
        let report = dispatcher
            .send_invoice_notifications(&invoice(None), Some(Path::new("/tmp/inv.txt")))
            .await;

        assert!(report.whatsapp);
        assert!(!report.email);
        assert_eq!(report.errors.len(), 1);
    }
}
