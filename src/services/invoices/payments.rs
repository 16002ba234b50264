//! Settlement of approved invoices.
//!
//! `paid_cents + due_cents == total_cents` holds after every operation here: the
//! arithmetic runs inside the database as one conditional update, never as a
//! read-modify-write.

use super::InvoiceService;
use crate::{
    auth::Actor,
    entities::{
        invoice::{self, InvoiceStatus, PaymentStatus},
        invoice_payment::{self, PaymentMode},
    },
    errors::ServiceError,
    events::Event,
    services::activity::ActivityEntry,
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordPayment {
    pub amount_cents: i64,
    pub mode: PaymentMode,
    pub transaction_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PaymentReceipt {
    pub invoice: invoice::Model,
    pub payment: invoice_payment::Model,
}

impl InvoiceService {
    /// Marks an approved invoice fully paid or fully unpaid.
    ///
    /// Partial settlement only happens through [`InvoiceService::record_payment`].
    #[instrument(skip(self, actor))]
    pub async fn set_payment_status(
        &self,
        actor: &Actor,
        id: Uuid,
        status: PaymentStatus,
        method: Option<PaymentMode>,
    ) -> Result<invoice::Model, ServiceError> {
        let update = invoice::Entity::update_many();
        let update = match status {
            PaymentStatus::Paid => update
                .col_expr(invoice::Column::PaidCents, Expr::col(invoice::Column::TotalCents).into())
                .col_expr(invoice::Column::DueCents, Expr::value(0i64))
                .col_expr(invoice::Column::PaymentMethod, Expr::value(method)),
            PaymentStatus::Unpaid => update
                .col_expr(invoice::Column::PaidCents, Expr::value(0i64))
                .col_expr(invoice::Column::DueCents, Expr::col(invoice::Column::TotalCents).into())
                .col_expr(
                    invoice::Column::PaymentMethod,
                    Expr::value(Option::<PaymentMode>::None),
                ),
            PaymentStatus::Partial => {
                return Err(ServiceError::ValidationError(
                    "partial settlement is recorded as individual payments".to_string(),
                ))
            }
        };

        let result = update
            .col_expr(invoice::Column::PaymentStatus, Expr::value(status))
            .col_expr(invoice::Column::Version, Expr::col(invoice::Column::Version).add(1))
            .col_expr(invoice::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(invoice::Column::Id.eq(id))
            .filter(invoice::Column::Status.eq(InvoiceStatus::Approved))
            .exec(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(self.status_conflict(id, InvoiceStatus::Approved).await);
        }

        let invoice = self.get(id).await?;
        info!(invoice_id = %id, payment_status = %status, "Invoice payment status set");
        counter!("autoshop.invoices.payment_status_set", 1, "status" => status.to_string());
        self.publish(Event::InvoicePaymentStatusChanged {
            invoice_id: id,
            payment_status: status.to_string(),
        })
        .await;
        self.activity
            .log_activity(
                ActivityEntry::new(
                    actor,
                    "set_payment_status",
                    "invoice",
                    id,
                    format!("Marked invoice {} as {}", invoice.invoice_number, status),
                )
                .with_details(json!({ "method": method })),
            )
            .await;
        Ok(invoice)
    }

    /// Applies one payment and appends it to the ledger, atomically.
    #[instrument(skip(self, actor, payment), fields(amount_cents = payment.amount_cents))]
    pub async fn record_payment(
        &self,
        actor: &Actor,
        id: Uuid,
        payment: RecordPayment,
    ) -> Result<PaymentReceipt, ServiceError> {
        if payment.amount_cents <= 0 {
            return Err(ServiceError::ValidationError(
                "payment amount must be positive".to_string(),
            ));
        }

        let txn = self
            .db_pool
            .as_ref()
            .begin()
            .await
            .map_err(ServiceError::db_error)?;
        let now = Utc::now();
        let applied = invoice::Entity::update_many()
            .col_expr(
                invoice::Column::PaidCents,
                Expr::col(invoice::Column::PaidCents).add(payment.amount_cents),
            )
            .col_expr(
                invoice::Column::DueCents,
                Expr::col(invoice::Column::DueCents).sub(payment.amount_cents),
            )
            .col_expr(invoice::Column::PaymentMethod, Expr::value(payment.mode))
            .col_expr(invoice::Column::Version, Expr::col(invoice::Column::Version).add(1))
            .col_expr(invoice::Column::UpdatedAt, Expr::value(now))
            .filter(invoice::Column::Id.eq(id))
            .filter(invoice::Column::Status.eq(InvoiceStatus::Approved))
            .filter(invoice::Column::DueCents.gte(payment.amount_cents))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        if applied.rows_affected == 0 {
            return Err(payment_refused(&txn, id, payment.amount_cents).await);
        }

        let updated = invoice::Entity::find_by_id(id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Invoice {} not found", id)))?;
        let payment_status = PaymentStatus::from_amounts(updated.paid_cents, updated.due_cents);
        invoice::Entity::update_many()
            .col_expr(invoice::Column::PaymentStatus, Expr::value(payment_status))
            .filter(invoice::Column::Id.eq(id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let entry = invoice_payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_id: Set(id),
            amount_cents: Set(payment.amount_cents),
            mode: Set(payment.mode),
            transaction_id: Set(payment.transaction_id),
            notes: Set(payment.notes),
            recorded_by: Set(Some(actor.user_id.clone())),
            recorded_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        let invoice = invoice::Model {
            payment_status,
            ..updated
        };
        info!(
            invoice_id = %id,
            amount_cents = entry.amount_cents,
            due_cents = invoice.due_cents,
            "Payment recorded"
        );
        counter!("autoshop.invoices.payments_recorded", 1, "mode" => entry.mode.to_string());
        self.publish(Event::InvoicePaymentRecorded {
            invoice_id: id,
            payment_id: entry.id,
            amount_cents: entry.amount_cents,
        })
        .await;
        self.activity
            .log_activity(
                ActivityEntry::new(
                    actor,
                    "record_payment",
                    "invoice",
                    id,
                    format!(
                        "Recorded payment of {} cents on {}",
                        entry.amount_cents, invoice.invoice_number
                    ),
                )
                .with_details(json!({
                    "payment_id": entry.id,
                    "mode": entry.mode,
                    "payment_status": invoice.payment_status,
                })),
            )
            .await;

        Ok(PaymentReceipt {
            invoice,
            payment: entry,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_payments(
        &self,
        id: Uuid,
    ) -> Result<Vec<invoice_payment::Model>, ServiceError> {
        self.get(id).await?;
        invoice_payment::Entity::find()
            .filter(invoice_payment::Column::InvoiceId.eq(id))
            .order_by_asc(invoice_payment::Column::RecordedAt)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }
}

/// Explains why the guarded payment update matched no row.
async fn payment_refused<C>(conn: &C, id: Uuid, amount_cents: i64) -> ServiceError
where
    C: ConnectionTrait,
{
    match invoice::Entity::find_by_id(id).one(conn).await {
        Ok(None) => ServiceError::NotFound(format!("Invoice {} not found", id)),
        Ok(Some(invoice)) if invoice.status != InvoiceStatus::Approved => {
            ServiceError::Conflict(format!(
                "invoice {} is {}, expected approved",
                invoice.invoice_number, invoice.status
            ))
        }
        Ok(Some(invoice)) => ServiceError::ValidationError(format!(
            "payment of {} exceeds the {} due on {}",
            amount_cents, invoice.due_cents, invoice.invoice_number
        )),
        Err(e) => ServiceError::db_error(e),
    }
}
