//! Printable projection of an invoice and the renderer seam.
//!
//! Rendering is idempotent: the same invoice always renders to the same path, so a
//! missing artifact can be regenerated on download.

use super::InvoiceService;
use crate::{
    auth::Actor,
    entities::invoice::{self, CustomerSnapshot, InvoiceStatus, LineItemKind, VehicleSnapshot},
    errors::ServiceError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue::Unchanged, Set};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write invoice document: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to lay out invoice document: {0}")]
    Layout(String),
}

impl From<RenderError> for ServiceError {
    fn from(err: RenderError) -> Self {
        ServiceError::ExternalServiceError(err.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DocumentHeader {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub status: InvoiceStatus,
    pub issued_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub vehicle_number: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DocumentLine {
    pub position: usize,
    pub kind: LineItemKind,
    pub name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub warranty: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DocumentTotals {
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub coupon_code: Option<String>,
    pub tax_rate_bps: i32,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub due_cents: i64,
}

/// Everything a renderer needs; nothing else is read from the invoice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InvoiceDocument {
    pub header: DocumentHeader,
    pub customer: CustomerSnapshot,
    pub vehicles: Vec<VehicleSnapshot>,
    pub lines: Vec<DocumentLine>,
    pub totals: DocumentTotals,
    pub notes: Option<String>,
    pub terms: Option<String>,
}

impl From<&invoice::Model> for InvoiceDocument {
    fn from(model: &invoice::Model) -> Self {
        Self {
            header: DocumentHeader {
                invoice_id: model.id,
                invoice_number: model.invoice_number.clone(),
                status: model.status,
                issued_at: model.created_at,
                approved_at: model.approved_at,
                vehicle_number: model.vehicle_number.clone(),
            },
            customer: model.customer_details.clone(),
            vehicles: model.vehicle_details.0.clone(),
            lines: model
                .items
                .0
                .iter()
                .enumerate()
                .map(|(index, item)| DocumentLine {
                    position: index + 1,
                    kind: item.kind,
                    name: item.name.clone(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price_cents,
                    tax_cents: item.tax_cents,
                    total_cents: item.total_cents,
                    warranty: item
                        .is_warranty_bearing()
                        .then(|| item.warranty_terms.clone().unwrap_or_else(|| "Standard".into())),
                })
                .collect(),
            totals: DocumentTotals {
                subtotal_cents: model.subtotal_cents,
                discount_cents: model.discount_cents,
                coupon_code: model.coupon_code.clone(),
                tax_rate_bps: model.tax_rate_bps,
                tax_cents: model.tax_cents,
                total_cents: model.total_cents,
                paid_cents: model.paid_cents,
                due_cents: model.due_cents,
            },
            notes: model.notes.clone(),
            terms: model.terms.clone(),
        }
    }
}

/// Turns an invoice projection into a file. Calling it twice for the same invoice must
/// produce the same path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InvoiceRenderer: Send + Sync {
    async fn render(&self, document: &InvoiceDocument) -> Result<PathBuf, RenderError>;
}

/// Plain-text renderer writing `<root>/invoices/<invoice number>.txt`.
#[derive(Clone, Debug)]
pub struct TextInvoiceRenderer {
    root: PathBuf,
}

impl TextInvoiceRenderer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn layout(document: &InvoiceDocument) -> Result<String, RenderError> {
        let mut out = String::new();
        let header = &document.header;
        let customer = &document.customer;
        let totals = &document.totals;
        let fail = |e: std::fmt::Error| RenderError::Layout(e.to_string());

        writeln!(out, "INVOICE {}", header.invoice_number).map_err(fail)?;
        writeln!(out, "Issued: {}", header.issued_at.format("%Y-%m-%d")).map_err(fail)?;
        if let Some(approved_at) = header.approved_at {
            writeln!(out, "Approved: {}", approved_at.format("%Y-%m-%d")).map_err(fail)?;
        }
        writeln!(out, "Vehicle: {}", header.vehicle_number).map_err(fail)?;
        writeln!(out).map_err(fail)?;
        writeln!(out, "Bill to: {}", customer.name).map_err(fail)?;
        writeln!(out, "Phone: {}", customer.phone).map_err(fail)?;
        if let Some(email) = &customer.email {
            writeln!(out, "Email: {}", email).map_err(fail)?;
        }
        if let Some(address) = &customer.address {
            writeln!(out, "Address: {}", address).map_err(fail)?;
        }
        for vehicle in &document.vehicles {
            writeln!(
                out,
                "Registered vehicle: {} {} {}",
                vehicle.registration_number,
                vehicle.make.as_deref().unwrap_or(""),
                vehicle.model.as_deref().unwrap_or("")
            )
            .map_err(fail)?;
        }
        writeln!(out).map_err(fail)?;
        for line in &document.lines {
            writeln!(
                out,
                "{:>3}. {:<32} {:>4} x {:>10} = {:>10}{}",
                line.position,
                line.name,
                line.quantity,
                money(line.unit_price_cents),
                money(line.total_cents),
                line.warranty
                    .as_deref()
                    .map(|w| format!("  [warranty: {}]", w))
                    .unwrap_or_default()
            )
            .map_err(fail)?;
        }
        writeln!(out).map_err(fail)?;
        writeln!(out, "Subtotal: {}", money(totals.subtotal_cents)).map_err(fail)?;
        if totals.discount_cents > 0 {
            match &totals.coupon_code {
                Some(code) => writeln!(out, "Discount ({}): -{}", code, money(totals.discount_cents)),
                None => writeln!(out, "Discount: -{}", money(totals.discount_cents)),
            }
            .map_err(fail)?;
        }
        writeln!(out, "Tax: {}", money(totals.tax_cents)).map_err(fail)?;
        writeln!(out, "Total: {}", money(totals.total_cents)).map_err(fail)?;
        writeln!(out, "Paid: {}", money(totals.paid_cents)).map_err(fail)?;
        writeln!(out, "Due: {}", money(totals.due_cents)).map_err(fail)?;
        if let Some(notes) = &document.notes {
            writeln!(out, "\nNotes: {}", notes).map_err(fail)?;
        }
        if let Some(terms) = &document.terms {
            writeln!(out, "Terms: {}", terms).map_err(fail)?;
        }
        Ok(out)
    }
}

#[async_trait]
impl InvoiceRenderer for TextInvoiceRenderer {
    async fn render(&self, document: &InvoiceDocument) -> Result<PathBuf, RenderError> {
        let body = Self::layout(document)?;
        let dir = self.root.join("invoices");
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}.txt", document.header.invoice_number));
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }
}

fn money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, cents / 100, cents % 100)
}

/// A rendered document ready to stream.
#[derive(Clone, Debug)]
pub struct DocumentFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl InvoiceService {
    /// Renders the document and records its path. Used by approval and downloads.
    pub(crate) async fn render_and_store(
        &self,
        invoice: &invoice::Model,
    ) -> Result<PathBuf, ServiceError> {
        let path = self.renderer.render(&InvoiceDocument::from(invoice)).await?;
        invoice::ActiveModel {
            id: Unchanged(invoice.id),
            document_path: Set(Some(path.to_string_lossy().into_owned())),
            ..Default::default()
        }
        .update(self.db_pool.as_ref())
        .await
        .map_err(ServiceError::db_error)?;
        debug!(invoice_id = %invoice.id, path = %path.display(), "Invoice document rendered");
        Ok(path)
    }

    /// Staff download; the caller identity was already established by the extractor.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn document_for_staff(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> Result<DocumentFile, ServiceError> {
        let invoice = self.get(id).await?;
        self.load_document(&invoice).await
    }

    /// Public download gated by the access token issued on approval.
    #[instrument(skip(self, token))]
    pub async fn document_for_token(
        &self,
        id: Uuid,
        token: Option<&str>,
    ) -> Result<DocumentFile, ServiceError> {
        let token = token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ServiceError::InvalidAccessToken("access token is required".into()))?;

        let invoice = self
            .find(id)
            .await?
            .ok_or_else(|| ServiceError::InvalidAccessToken("access token does not match".into()))?;
        check_access_token(&invoice, token, Utc::now())?;
        self.load_document(&invoice).await
    }

    async fn load_document(&self, invoice: &invoice::Model) -> Result<DocumentFile, ServiceError> {
        if invoice.status != InvoiceStatus::Approved {
            return Err(ServiceError::Conflict(format!(
                "invoice {} is {}, documents are issued once approved",
                invoice.invoice_number, invoice.status
            )));
        }

        let stored = invoice.document_path.as_deref().map(PathBuf::from);
        let path = match stored {
            Some(path) if file_exists(&path).await => path,
            _ => self.render_and_store(invoice).await?,
        };
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ServiceError::StorageError(e.to_string()))?;

        Ok(DocumentFile {
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("{}.txt", invoice.invoice_number)),
            content_type: content_type_for(&path),
            bytes,
        })
    }
}

/// Token must match exactly and still be live.
pub fn check_access_token(
    invoice: &invoice::Model,
    token: &str,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    match (&invoice.access_token, invoice.access_token_expires_at) {
        (Some(stored), Some(expires_at)) if tokens_match(stored, token) => {
            if now >= expires_at {
                Err(ServiceError::AccessTokenExpired)
            } else {
                Ok(())
            }
        }
        _ => Err(ServiceError::InvalidAccessToken(
            "access token does not match".into(),
        )),
    }
}

/// Compares fixed-length digests so timing reveals neither content nor length.
fn tokens_match(stored: &str, presented: &str) -> bool {
    let stored = Sha256::digest(stored.as_bytes());
    let presented = Sha256::digest(presented.as_bytes());
    stored
        .iter()
        .zip(presented.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("pdf") => "application/pdf",
        Some("html") => "text/html; charset=utf-8",
        _ => "text/plain; charset=utf-8",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::invoice::{
        InvoiceLineItem, LineItems, PaymentStatus, VehicleSnapshots,
    };
    use crate::entities::product::PartRef;
    use assert_matches::assert_matches;
    use chrono::Duration;

    fn approved_invoice() -> invoice::Model {
        let now = Utc::now();
        invoice::Model {
            id: Uuid::new_v4(),
            invoice_number: "INV-000007".into(),
            service_visit_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            vehicle_number: "KA01AB1234".into(),
            customer_details: CustomerSnapshot {
                id: Uuid::new_v4(),
                name: "Asha Rao".into(),
                email: None,
                phone: "+919800000001".into(),
                address: Some("12 MG Road".into()),
            },
            vehicle_details: VehicleSnapshots(vec![]),
            items: LineItems(vec![InvoiceLineItem {
                kind: LineItemKind::Product,
                part: Some(PartRef::Persisted(Uuid::new_v4())),
                name: "Battery".into(),
                quantity: 1,
                unit_price_cents: 650_000,
                tax_cents: 0,
                total_cents: 650_000,
                has_warranty: true,
                warranty_terms: Some("24 months".into()),
                warranty_cards: vec![],
            }]),
            subtotal_cents: 650_000,
            discount_type: None,
            discount_value: 0,
            discount_cents: 50_000,
            coupon_id: None,
            coupon_code: Some("MONSOON".into()),
            tax_rate_bps: 0,
            tax_cents: 0,
            total_cents: 600_000,
            paid_cents: 0,
            due_cents: 600_000,
            status: InvoiceStatus::Approved,
            payment_status: PaymentStatus::Unpaid,
            payment_method: None,
            rejection_reason: None,
            access_token: Some("abc".into()),
            access_token_expires_at: Some(now + Duration::days(7)),
            document_path: None,
            approval_report: None,
            notes: None,
            terms: Some("Payable on delivery".into()),
            approved_at: Some(now),
            approved_by: Some("u-1".into()),
            created_by: None,
            version: 2,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn layout_includes_lines_and_totals() {
        let text = TextInvoiceRenderer::layout(&InvoiceDocument::from(&approved_invoice())).unwrap();
        assert!(text.starts_with("INVOICE INV-000007"));
        assert!(text.contains("Battery"));
        assert!(text.contains("[warranty: 24 months]"));
        assert!(text.contains("Discount (MONSOON): -500.00"));
        assert!(text.contains("Due: 6000.00"));
    }

    #[test]
    fn token_comparison_needs_an_exact_match() {
        assert!(tokens_match("abc", "abc"));
        assert!(!tokens_match("abc", "abd"));
        assert!(!tokens_match("abc", "abcd"));
        assert!(!tokens_match("abc", ""));
    }

    #[test]
    fn token_checks_distinguish_invalid_from_expired() {
        let invoice = approved_invoice();
        let now = Utc::now();
        assert!(check_access_token(&invoice, "abc", now).is_ok());
        assert_matches!(
            check_access_token(&invoice, "abd", now),
            Err(ServiceError::InvalidAccessToken(_))
        );
        assert_matches!(
            check_access_token(&invoice, "abc", now + Duration::days(8)),
            Err(ServiceError::AccessTokenExpired)
        );

        let mut no_token = invoice;
        no_token.access_token = None;
        assert_matches!(
            check_access_token(&no_token, "abc", now),
            Err(ServiceError::InvalidAccessToken(_))
        );
    }

    #[tokio::test]
    async fn text_renderer_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = TextInvoiceRenderer::new(dir.path());
        let document = InvoiceDocument::from(&approved_invoice());

        let first = renderer.render(&document).await.unwrap();
        let second = renderer.render(&document).await.unwrap();
        assert_eq!(first, second);
        assert!(first.ends_with("invoices/INV-000007.txt"));
    }

    #[test]
    fn money_formats_minor_units() {
        assert_eq!(money(50_000), "500.00");
        assert_eq!(money(5), "0.05");
        assert_eq!(money(-125), "-1.25");
    }
}
