//! Invoices raised from completed service visits.
//!
//! Every status change is a single conditional write keyed on the expected status, so
//! two managers racing on the same invoice cannot both win. Work that follows approval
//! (document, warranties, notifications) lives in [`approval`] and never rolls the
//! approval back.

pub mod approval;
pub mod document;
pub mod payments;

use crate::{
    auth::{Actor, MANAGER_ROLES},
    db::DbPool,
    entities::{
        coupon::{self, DiscountType},
        coupon_usage, customer,
        invoice::{
            self, CustomerSnapshot, InvoiceLineItem, InvoiceStatus, LineItemKind, LineItems,
            PaymentStatus, VehicleSnapshot, VehicleSnapshots,
        },
        invoice_payment,
        product::PartRef,
        service_visit::{self, VisitStatus},
        vehicle, warranty,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        activity::{ActivityEntry, ActivityLogger},
        coupons::{self, Redemption},
        media::MediaStore,
        notifications::NotificationDispatcher,
        parts::PartResolver,
        sequences::{self, SequenceGenerator, INVOICE_SEQUENCE},
    },
};
use chrono::{Duration, Utc};
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use slog::Logger;
use std::{path::Path, sync::Arc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

pub use approval::ApprovalOutcome;
pub use document::{
    DocumentFile, InvoiceDocument, InvoiceRenderer, RenderError, TextInvoiceRenderer,
};
pub use payments::{PaymentReceipt, RecordPayment};

/// Tunables read from `AppConfig`.
#[derive(Clone, Copy, Debug)]
pub struct InvoiceSettings {
    pub access_token_ttl: Duration,
    /// Used when a warranty text carries no month count
    pub default_warranty_months: u32,
}

impl Default for InvoiceSettings {
    fn default() -> Self {
        Self {
            access_token_ttl: Duration::days(7),
            default_warranty_months: 12,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemInput {
    pub kind: LineItemKind,
    /// Required for product lines
    pub part_id: Option<String>,
    /// Required for labour lines; product lines default to the resolved part name
    pub name: Option<String>,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub has_warranty: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualDiscount {
    pub discount_type: DiscountType,
    pub value: i64,
}

#[derive(Clone, Debug)]
pub struct NewInvoice {
    pub service_visit_id: Uuid,
    pub items: Vec<LineItemInput>,
    pub coupon_code: Option<String>,
    /// Applied only when no coupon is redeemed
    pub discount: Option<ManualDiscount>,
    pub tax_rate_bps: i32,
    pub notes: Option<String>,
    pub terms: Option<String>,
    pub save_as_draft: bool,
}

#[derive(Clone, Debug, Default)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub customer_id: Option<Uuid>,
    pub service_visit_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct InvoiceService {
    db_pool: Arc<DbPool>,
    parts: PartResolver,
    sequences: Arc<dyn SequenceGenerator>,
    renderer: Arc<dyn InvoiceRenderer>,
    notifier: Arc<dyn NotificationDispatcher>,
    media: MediaStore,
    activity: Arc<dyn ActivityLogger>,
    settings: InvoiceSettings,
    event_sender: Option<Arc<EventSender>>,
    logger: Logger,
}

impl InvoiceService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db_pool: Arc<DbPool>,
        parts: PartResolver,
        sequences: Arc<dyn SequenceGenerator>,
        renderer: Arc<dyn InvoiceRenderer>,
        notifier: Arc<dyn NotificationDispatcher>,
        media: MediaStore,
        activity: Arc<dyn ActivityLogger>,
        settings: InvoiceSettings,
        logger: Logger,
    ) -> Self {
        Self {
            db_pool,
            parts,
            sequences,
            renderer,
            notifier,
            media,
            activity,
            settings,
            event_sender: None,
            logger,
        }
    }

    pub fn with_event_sender(mut self, event_sender: Arc<EventSender>) -> Self {
        self.event_sender = Some(event_sender);
        self
    }

    /// Raises an invoice for a completed visit.
    ///
    /// An unusable coupon is dropped without failing the invoice. A usable one is
    /// claimed inside the invoice transaction, so the invoice and its coupon ledger
    /// entry commit together or not at all.
    #[instrument(skip(self, actor, input), fields(visit_id = %input.service_visit_id))]
    pub async fn create_from_service_visit(
        &self,
        actor: &Actor,
        input: NewInvoice,
    ) -> Result<invoice::Model, ServiceError> {
        validate_input(&input)?;
        let db = self.db_pool.as_ref();

        let visit = service_visit::Entity::find_by_id(input.service_visit_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Service visit {} not found",
                    input.service_visit_id
                ))
            })?;
        if visit.status != VisitStatus::Completed {
            return Err(ServiceError::ValidationError(format!(
                "service visit is {}; only completed visits can be invoiced",
                visit.status
            )));
        }
        let customer = customer::Entity::find_by_id(visit.customer_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::ValidationError("service visit has no customer".to_string())
            })?;
        let vehicles = vehicle::Entity::find()
            .filter(vehicle::Column::CustomerId.eq(customer.id))
            .order_by_asc(vehicle::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let items = self.build_line_items(&input.items).await?;
        let subtotal_cents = sum_cents(items.iter().map(|item| item.total_cents), "subtotal")?;
        let tax_cents = sum_cents(items.iter().map(|item| item.tax_cents), "tax")?;

        let coupon_id = match input
            .coupon_code
            .as_deref()
            .map(coupons::normalize_code)
            .filter(|code| !code.is_empty())
        {
            Some(code) => self.eligible_coupon(db, &code, customer.id, subtotal_cents).await?,
            None => None,
        };

        // claimed before the transaction; an aborted invoice leaves a gap in numbering
        let number = self.sequences.next_value(INVOICE_SEQUENCE).await?;
        let invoice_id = Uuid::new_v4();

        let txn = db.begin().await.map_err(ServiceError::db_error)?;
        let redemption = match coupon_id {
            Some(coupon_id) => {
                redeem_in_savepoint(&txn, coupon_id, customer.id, invoice_id, subtotal_cents)
                    .await?
            }
            None => None,
        };

        let applied = AppliedDiscount::resolve(redemption.as_ref(), input.discount, subtotal_cents);
        let total_cents = subtotal_cents - applied.discount_cents;
        let status = if input.save_as_draft {
            InvoiceStatus::Draft
        } else {
            InvoiceStatus::PendingApproval
        };

        let created = invoice::ActiveModel {
            id: Set(invoice_id),
            invoice_number: Set(sequences::format_number("INV", number)),
            service_visit_id: Set(visit.id),
            customer_id: Set(customer.id),
            vehicle_number: Set(visit.vehicle_number.clone()),
            customer_details: Set(CustomerSnapshot {
                id: customer.id,
                name: customer.name.clone(),
                email: customer.email.clone(),
                phone: customer.phone.clone(),
                address: customer.address.clone(),
            }),
            vehicle_details: Set(VehicleSnapshots(
                vehicles
                    .iter()
                    .map(|v| VehicleSnapshot {
                        id: v.id,
                        registration_number: v.registration_number.clone(),
                        make: v.make.clone(),
                        model: v.model.clone(),
                        year: v.year,
                    })
                    .collect(),
            )),
            items: Set(LineItems(items)),
            subtotal_cents: Set(subtotal_cents),
            discount_type: Set(applied.discount_type),
            discount_value: Set(applied.discount_value),
            discount_cents: Set(applied.discount_cents),
            coupon_id: Set(applied.coupon_id),
            coupon_code: Set(applied.coupon_code),
            tax_rate_bps: Set(input.tax_rate_bps),
            tax_cents: Set(tax_cents),
            total_cents: Set(total_cents),
            paid_cents: Set(0),
            due_cents: Set(total_cents),
            status: Set(status),
            payment_status: Set(PaymentStatus::Unpaid),
            payment_method: Set(None),
            rejection_reason: Set(None),
            access_token: Set(None),
            access_token_expires_at: Set(None),
            document_path: Set(None),
            approval_report: Set(None),
            notes: Set(input.notes),
            terms: Set(input.terms),
            approved_at: Set(None),
            approved_by: Set(None),
            created_by: Set(Some(actor.user_id.clone())),
            version: Set(1),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            invoice_id = %created.id,
            invoice_number = %created.invoice_number,
            total_cents = created.total_cents,
            "Invoice created"
        );
        counter!("autoshop.invoices.created", 1, "status" => created.status.to_string());
        self.publish(Event::InvoiceCreated {
            invoice_id: created.id,
            invoice_number: created.invoice_number.clone(),
            total_cents: created.total_cents,
        })
        .await;
        if let Some(redemption) = &redemption {
            self.publish(Event::CouponRedeemed {
                coupon_id: redemption.coupon_id,
                invoice_id: created.id,
                customer_id: created.customer_id,
            })
            .await;
        }
        self.activity
            .log_activity(
                ActivityEntry::new(
                    actor,
                    "create",
                    "invoice",
                    created.id,
                    format!(
                        "Raised invoice {} for {}",
                        created.invoice_number, created.vehicle_number
                    ),
                )
                .with_details(json!({
                    "service_visit_id": created.service_visit_id,
                    "total_cents": created.total_cents,
                    "coupon_code": created.coupon_code,
                })),
            )
            .await;

        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<invoice::Model, ServiceError> {
        self.find(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Invoice {} not found", id)))
    }

    pub(crate) async fn find(&self, id: Uuid) -> Result<Option<invoice::Model>, ServiceError> {
        invoice::Entity::find_by_id(id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: InvoiceFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<invoice::Model>, u64), ServiceError> {
        let db = self.db_pool.as_ref();
        let mut query = invoice::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(invoice::Column::Status.eq(status));
        }
        if let Some(payment_status) = filter.payment_status {
            query = query.filter(invoice::Column::PaymentStatus.eq(payment_status));
        }
        if let Some(customer_id) = filter.customer_id {
            query = query.filter(invoice::Column::CustomerId.eq(customer_id));
        }
        if let Some(visit_id) = filter.service_visit_id {
            query = query.filter(invoice::Column::ServiceVisitId.eq(visit_id));
        }

        let paginator = query
            .order_by_desc(invoice::Column::CreatedAt)
            .paginate(db, limit.max(1));
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let invoices = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((invoices, total))
    }

    /// Moves a draft into the approval queue.
    #[instrument(skip(self, actor))]
    pub async fn submit(&self, actor: &Actor, id: Uuid) -> Result<invoice::Model, ServiceError> {
        let db = self.db_pool.as_ref();
        let result = invoice::Entity::update_many()
            .col_expr(invoice::Column::Status, Expr::value(InvoiceStatus::PendingApproval))
            .col_expr(invoice::Column::Version, Expr::col(invoice::Column::Version).add(1))
            .col_expr(invoice::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(invoice::Column::Id.eq(id))
            .filter(invoice::Column::Status.eq(InvoiceStatus::Draft))
            .exec(db)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(self.status_conflict(id, InvoiceStatus::Draft).await);
        }

        let invoice = self.get(id).await?;
        info!(invoice_id = %id, "Invoice submitted for approval");
        self.publish(Event::InvoiceSubmitted(id)).await;
        self.activity
            .log_activity(ActivityEntry::new(
                actor,
                "submit",
                "invoice",
                id,
                format!("Submitted invoice {} for approval", invoice.invoice_number),
            ))
            .await;
        Ok(invoice)
    }

    /// Terminal refusal of a pending invoice.
    #[instrument(skip(self, actor, reason))]
    pub async fn reject(
        &self,
        actor: &Actor,
        id: Uuid,
        reason: &str,
    ) -> Result<invoice::Model, ServiceError> {
        actor.require_any_role(MANAGER_ROLES)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::ValidationError(
                "a rejection reason is required".to_string(),
            ));
        }

        let result = invoice::Entity::update_many()
            .col_expr(invoice::Column::Status, Expr::value(InvoiceStatus::Rejected))
            .col_expr(invoice::Column::RejectionReason, Expr::value(reason.to_string()))
            .col_expr(invoice::Column::Version, Expr::col(invoice::Column::Version).add(1))
            .col_expr(invoice::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(invoice::Column::Id.eq(id))
            .filter(invoice::Column::Status.eq(InvoiceStatus::PendingApproval))
            .exec(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(self.status_conflict(id, InvoiceStatus::PendingApproval).await);
        }

        let invoice = self.get(id).await?;
        info!(invoice_id = %id, "Invoice rejected");
        counter!("autoshop.invoices.rejected", 1);
        self.publish(Event::InvoiceRejected(id)).await;
        self.activity
            .log_activity(
                ActivityEntry::new(
                    actor,
                    "reject",
                    "invoice",
                    id,
                    format!("Rejected invoice {}", invoice.invoice_number),
                )
                .with_details(json!({ "reason": reason })),
            )
            .await;
        Ok(invoice)
    }

    /// Removes an invoice with its payments, warranties and coupon claim.
    #[instrument(skip(self, actor))]
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> Result<(), ServiceError> {
        actor.require_any_role(MANAGER_ROLES)?;
        let invoice = self.get(id).await?;

        let txn = self
            .db_pool
            .as_ref()
            .begin()
            .await
            .map_err(ServiceError::db_error)?;
        release_coupon(&txn, &invoice).await?;
        invoice_payment::Entity::delete_many()
            .filter(invoice_payment::Column::InvoiceId.eq(id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        warranty::Entity::delete_many()
            .filter(warranty::Column::InvoiceId.eq(id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        let result = invoice::Entity::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Invoice {} not found", id)));
        }
        txn.commit().await.map_err(ServiceError::db_error)?;

        if let Some(path) = invoice.document_path.as_deref() {
            if let Err(e) = self.media.remove(Path::new(path)).await {
                slog::warn!(self.logger, "Failed to remove invoice document";
                    "invoice_id" => id.to_string(),
                    "path" => path.to_string(),
                    "error" => e.to_string());
            }
        }

        info!(invoice_id = %id, "Invoice deleted");
        self.publish(Event::InvoiceDeleted(id)).await;
        self.activity
            .log_activity(ActivityEntry::new(
                actor,
                "delete",
                "invoice",
                id,
                format!("Deleted invoice {}", invoice.invoice_number),
            ))
            .await;
        Ok(())
    }

    async fn build_line_items(
        &self,
        inputs: &[LineItemInput],
    ) -> Result<Vec<InvoiceLineItem>, ServiceError> {
        let part_ids: Vec<String> = inputs
            .iter()
            .filter(|item| item.kind == LineItemKind::Product)
            .filter_map(|item| item.part_id.clone())
            .collect();
        let resolution = self.parts.resolve(&part_ids).await?;
        if !resolution.not_found.is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "unknown parts: {}",
                resolution.not_found.join(", ")
            )));
        }

        inputs
            .iter()
            .map(|input| {
                let resolved = match input.kind {
                    LineItemKind::Product => input
                        .part_id
                        .as_deref()
                        .and_then(|part_id| resolution.get(part_id)),
                    LineItemKind::Labour => None,
                };
                let name = input
                    .name
                    .as_deref()
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .or_else(|| resolved.map(|part| part.name.clone()))
                    .ok_or_else(|| {
                        ServiceError::ValidationError("line item name is required".to_string())
                    })?;
                let part: Option<PartRef> = resolved.map(|part| part.part.clone());
                Ok(InvoiceLineItem {
                    kind: input.kind,
                    has_warranty: input.has_warranty && part.is_some(),
                    warranty_terms: resolved.and_then(|part| part.warranty.clone()),
                    part,
                    name,
                    quantity: input.quantity,
                    unit_price_cents: input.unit_price_cents,
                    tax_cents: input.tax_cents,
                    total_cents: input.total_cents,
                    warranty_cards: Vec::new(),
                })
            })
            .collect()
    }

    /// Coupon id when `code` would apply right now; `None` drops the coupon.
    async fn eligible_coupon<C>(
        &self,
        conn: &C,
        code: &str,
        customer_id: Uuid,
        purchase_cents: i64,
    ) -> Result<Option<Uuid>, ServiceError>
    where
        C: ConnectionTrait,
    {
        let Some(coupon) = coupons::find_by_code(conn, code).await? else {
            debug!(code, "Ignoring unknown coupon");
            return Ok(None);
        };
        let usages = coupons::count_customer_usages(conn, coupon.id, customer_id).await?;
        match coupons::evaluate(&coupon, usages, purchase_cents, Utc::now()) {
            Ok(_) => Ok(Some(coupon.id)),
            Err(rejection) => {
                debug!(code, reason = %rejection, "Ignoring coupon");
                Ok(None)
            }
        }
    }

    /// Reloads the invoice to explain why a conditional status write matched nothing.
    pub(crate) async fn status_conflict(&self, id: Uuid, expected: InvoiceStatus) -> ServiceError {
        match self.find(id).await {
            Ok(Some(invoice)) => ServiceError::Conflict(format!(
                "invoice {} is {}, expected {}",
                invoice.invoice_number, invoice.status, expected
            )),
            Ok(None) => ServiceError::NotFound(format!("Invoice {} not found", id)),
            Err(e) => e,
        }
    }

    pub(crate) async fn publish(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event).await;
        }
    }
}

/// Claims the coupon in a savepoint so a late rejection leaves the invoice intact.
async fn redeem_in_savepoint(
    txn: &DatabaseTransaction,
    coupon_id: Uuid,
    customer_id: Uuid,
    invoice_id: Uuid,
    purchase_cents: i64,
) -> Result<Option<Redemption>, ServiceError> {
    let savepoint = txn.begin().await.map_err(ServiceError::db_error)?;
    match coupons::redeem(&savepoint, coupon_id, customer_id, invoice_id, purchase_cents).await {
        Ok(redemption) => {
            savepoint.commit().await.map_err(ServiceError::db_error)?;
            Ok(Some(redemption))
        }
        Err(e) => {
            savepoint.rollback().await.map_err(ServiceError::db_error)?;
            if matches!(e, ServiceError::DatabaseError(_)) {
                return Err(e);
            }
            warn!(%coupon_id, %invoice_id, error = %e, "Coupon not applied");
            Ok(None)
        }
    }
}

/// Gives back the coupon use claimed by `invoice`.
async fn release_coupon(
    txn: &DatabaseTransaction,
    invoice: &invoice::Model,
) -> Result<(), ServiceError> {
    let Some(coupon_id) = invoice.coupon_id else {
        return Ok(());
    };
    let released = coupon_usage::Entity::delete_many()
        .filter(coupon_usage::Column::InvoiceId.eq(invoice.id))
        .filter(coupon_usage::Column::CouponId.eq(coupon_id))
        .exec(txn)
        .await
        .map_err(ServiceError::db_error)?;
    if released.rows_affected > 0 {
        coupon::Entity::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount)
                    .sub(released.rows_affected as i64),
            )
            .filter(coupon::Column::Id.eq(coupon_id))
            .filter(coupon::Column::UsedCount.gte(released.rows_affected as i64))
            .exec(txn)
            .await
            .map_err(ServiceError::db_error)?;
    }
    Ok(())
}

/// Discount columns as stored on the invoice.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct AppliedDiscount {
    discount_type: Option<DiscountType>,
    discount_value: i64,
    discount_cents: i64,
    coupon_id: Option<Uuid>,
    coupon_code: Option<String>,
}

impl AppliedDiscount {
    fn resolve(
        redemption: Option<&Redemption>,
        manual: Option<ManualDiscount>,
        subtotal_cents: i64,
    ) -> Self {
        match (redemption, manual) {
            (Some(r), _) => Self {
                discount_type: Some(r.discount_type),
                discount_value: r.discount_value,
                discount_cents: r.discount_cents,
                coupon_id: Some(r.coupon_id),
                coupon_code: Some(r.code.clone()),
            },
            (None, Some(m)) => Self {
                discount_type: Some(m.discount_type),
                discount_value: m.value,
                discount_cents: coupons::discount_for(m.discount_type, m.value, None, subtotal_cents),
                coupon_id: None,
                coupon_code: None,
            },
            (None, None) => Self::default(),
        }
    }
}

/// Ceiling for any single amount on a line (ten million rupees).
pub const MAX_LINE_AMOUNT_CENTS: i64 = 1_000_000_000;

fn sum_cents(mut amounts: impl Iterator<Item = i64>, what: &str) -> Result<i64, ServiceError> {
    amounts
        .try_fold(0i64, |acc, amount| acc.checked_add(amount))
        .ok_or_else(|| ServiceError::ValidationError(format!("invoice {} is out of range", what)))
}

fn validate_input(input: &NewInvoice) -> Result<(), ServiceError> {
    let invalid = |msg: String| Err(ServiceError::ValidationError(msg));
    if input.items.is_empty() {
        return invalid("an invoice needs at least one line item".to_string());
    }
    if !(0..=10_000).contains(&input.tax_rate_bps) {
        return invalid(format!("tax rate {} bps is out of range", input.tax_rate_bps));
    }
    for (index, item) in input.items.iter().enumerate() {
        let line = index + 1;
        if item.quantity < 1 {
            return invalid(format!("line {}: quantity must be at least 1", line));
        }
        if item.unit_price_cents < 0 || item.tax_cents < 0 || item.total_cents < 0 {
            return invalid(format!("line {}: amounts cannot be negative", line));
        }
        if [item.unit_price_cents, item.tax_cents, item.total_cents]
            .iter()
            .any(|amount| *amount > MAX_LINE_AMOUNT_CENTS)
        {
            return invalid(format!(
                "line {}: amounts cannot exceed {} cents",
                line, MAX_LINE_AMOUNT_CENTS
            ));
        }
        match item.kind {
            LineItemKind::Product
                if item.part_id.as_deref().map_or(true, |id| id.trim().is_empty()) =>
            {
                return invalid(format!("line {}: product lines need a part", line));
            }
            LineItemKind::Labour
                if item.name.as_deref().map_or(true, |name| name.trim().is_empty()) =>
            {
                return invalid(format!("line {}: labour lines need a name", line));
            }
            _ => {}
        }
    }
    if let Some(discount) = input.discount {
        let ceiling = match discount.discount_type {
            DiscountType::Percentage => 100,
            DiscountType::Fixed => i64::MAX,
        };
        if !(0..=ceiling).contains(&discount.value) {
            return invalid(format!("discount value {} is out of range", discount.value));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    fn product_line(part_id: &str, total_cents: i64) -> LineItemInput {
        LineItemInput {
            kind: LineItemKind::Product,
            part_id: Some(part_id.to_string()),
            name: None,
            quantity: 1,
            unit_price_cents: total_cents,
            tax_cents: 0,
            total_cents,
            has_warranty: true,
        }
    }

    fn new_invoice(items: Vec<LineItemInput>) -> NewInvoice {
        NewInvoice {
            service_visit_id: Uuid::new_v4(),
            items,
            coupon_code: None,
            discount: None,
            tax_rate_bps: 1_800,
            notes: None,
            terms: None,
            save_as_draft: false,
        }
    }

    #[test]
    fn accepts_well_formed_input() {
        let mut labour = product_line("x", 40_000);
        labour.kind = LineItemKind::Labour;
        labour.part_id = None;
        labour.name = Some("Wheel alignment".into());
        assert!(validate_input(&new_invoice(vec![product_line("battery", 650_000), labour])).is_ok());
    }

    #[rstest]
    #[case::no_items(new_invoice(vec![]))]
    #[case::zero_quantity(new_invoice(vec![LineItemInput { quantity: 0, ..product_line("battery", 100) }]))]
    #[case::negative_total(new_invoice(vec![product_line("battery", -1)]))]
    #[case::product_without_part(new_invoice(vec![LineItemInput { part_id: Some(" ".into()), ..product_line("battery", 100) }]))]
    #[case::oversized_total(new_invoice(vec![product_line("battery", i64::MAX), product_line("battery", 1)]))]
    #[case::oversized_tax(new_invoice(vec![LineItemInput { tax_cents: MAX_LINE_AMOUNT_CENTS + 1, ..product_line("battery", 100) }]))]
    #[case::labour_without_name(new_invoice(vec![LineItemInput { kind: LineItemKind::Labour, part_id: None, ..product_line("battery", 100) }]))]
    fn rejects_malformed_input(#[case] input: NewInvoice) {
        assert_matches!(validate_input(&input), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn amount_sums_fail_instead_of_overflowing() {
        assert_eq!(sum_cents([1, 2, 3].into_iter(), "subtotal").unwrap(), 6);
        assert_matches!(
            sum_cents([i64::MAX, 1].into_iter(), "subtotal"),
            Err(ServiceError::ValidationError(msg)) if msg.contains("subtotal")
        );
    }

    #[test]
    fn percentage_discount_over_hundred_is_rejected() {
        let mut input = new_invoice(vec![product_line("battery", 100)]);
        input.discount = Some(ManualDiscount {
            discount_type: DiscountType::Percentage,
            value: 150,
        });
        assert_matches!(validate_input(&input), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn coupon_redemption_wins_over_manual_discount() {
        let redemption = Redemption {
            coupon_id: Uuid::new_v4(),
            code: "MONSOON".into(),
            discount_type: DiscountType::Fixed,
            discount_value: 5_000,
            discount_cents: 5_000,
            usage_id: Uuid::new_v4(),
        };
        let manual = ManualDiscount {
            discount_type: DiscountType::Percentage,
            value: 50,
        };

        let applied = AppliedDiscount::resolve(Some(&redemption), Some(manual), 50_000);
        assert_eq!(applied.discount_cents, 5_000);
        assert_eq!(applied.coupon_code.as_deref(), Some("MONSOON"));

        let applied = AppliedDiscount::resolve(None, Some(manual), 50_000);
        assert_eq!(applied.discount_cents, 25_000);
        assert_eq!(applied.coupon_id, None);

        assert_eq!(AppliedDiscount::resolve(None, None, 50_000), AppliedDiscount::default());
    }
}
