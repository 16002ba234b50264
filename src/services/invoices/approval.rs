use super::InvoiceService;
use crate::{
    auth::{Actor, MANAGER_ROLES},
    entities::{
        invoice::{self, ApprovalReport, InvoiceStatus, NotificationsSent, TaskOutcome},
        warranty,
    },
    errors::ServiceError,
    events::Event,
    services::{activity::ActivityEntry, warranties},
};
use chrono::Utc;
use metrics::counter;
use rand::RngCore;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Unchanged, ColumnTrait, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

/// What approval committed and how the follow-up tasks went.
#[derive(Clone, Debug, Serialize)]
pub struct ApprovalOutcome {
    pub invoice: invoice::Model,
    pub report: ApprovalReport,
    pub warranties: Vec<warranty::Model>,
}

/// 32 random bytes, hex encoded.
pub fn generate_access_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl InvoiceService {
    /// Approves a pending invoice, then runs the follow-up tasks.
    ///
    /// Only the status write can fail the call. Rendering, warranty creation and
    /// notifications each succeed or fail on their own and land in the returned
    /// report, which is also stored on the invoice.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn approve(&self, actor: &Actor, id: Uuid) -> Result<ApprovalOutcome, ServiceError> {
        actor.require_any_role(MANAGER_ROLES)?;
        let now = Utc::now();

        let result = invoice::Entity::update_many()
            .col_expr(invoice::Column::Status, Expr::value(InvoiceStatus::Approved))
            .col_expr(invoice::Column::AccessToken, Expr::value(generate_access_token()))
            .col_expr(
                invoice::Column::AccessTokenExpiresAt,
                Expr::value(now + self.settings.access_token_ttl),
            )
            .col_expr(invoice::Column::ApprovedAt, Expr::value(now))
            .col_expr(invoice::Column::ApprovedBy, Expr::value(actor.user_id.clone()))
            .col_expr(invoice::Column::Version, Expr::col(invoice::Column::Version).add(1))
            .col_expr(invoice::Column::UpdatedAt, Expr::value(now))
            .filter(invoice::Column::Id.eq(id))
            .filter(invoice::Column::Status.eq(InvoiceStatus::PendingApproval))
            .exec(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(self.status_conflict(id, InvoiceStatus::PendingApproval).await);
        }

        let approved = self.get(id).await?;
        info!(invoice_id = %id, invoice_number = %approved.invoice_number, "Invoice approved");
        counter!("autoshop.invoices.approved", 1);
        self.publish(Event::InvoiceApproved(id)).await;

        let mut report = ApprovalReport::default();

        let document = match self.render_and_store(&approved).await {
            Ok(path) => {
                report.document = TaskOutcome::succeeded();
                Some(path)
            }
            Err(e) => {
                self.task_failed(id, "render_document", &e);
                report.document = TaskOutcome::failed(e.to_string());
                None
            }
        };

        let warranties = match self.create_warranties(&approved).await {
            Ok(created) => {
                report.warranties = TaskOutcome::succeeded();
                report.warranties_created = created.len() as u32;
                for record in &created {
                    self.publish(Event::WarrantyCreated(record.id)).await;
                }
                created
            }
            Err(e) => {
                self.task_failed(id, "create_warranties", &e);
                report.warranties = TaskOutcome::failed(e.to_string());
                Vec::new()
            }
        };

        let sent = self
            .notifier
            .send_invoice_notifications(&approved, document.as_deref())
            .await;
        report.notifications_sent = NotificationsSent {
            email: sent.email,
            whatsapp: sent.whatsapp,
        };
        for error in &sent.errors {
            slog::warn!(self.logger, "Invoice notification failed";
                "invoice_id" => id.to_string(),
                "error" => error.clone());
        }
        report.notification_errors = sent.errors;

        let invoice = self.store_report(&approved, &report).await;

        self.activity
            .log_activity(
                ActivityEntry::new(
                    actor,
                    "approve",
                    "invoice",
                    id,
                    format!("Approved invoice {}", invoice.invoice_number),
                )
                .with_details(json!({
                    "document": report.document.ok,
                    "warranties_created": report.warranties_created,
                    "email": report.notifications_sent.email,
                    "whatsapp": report.notifications_sent.whatsapp,
                })),
            )
            .await;

        Ok(ApprovalOutcome {
            invoice,
            report,
            warranties,
        })
    }

    async fn create_warranties(
        &self,
        invoice: &invoice::Model,
    ) -> Result<Vec<warranty::Model>, ServiceError> {
        let start = invoice.approved_at.unwrap_or_else(Utc::now);
        let txn = self
            .db_pool
            .as_ref()
            .begin()
            .await
            .map_err(ServiceError::db_error)?;
        let created = warranties::create_for_invoice(
            &txn,
            invoice,
            self.settings.default_warranty_months,
            start,
        )
        .await?;
        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(created)
    }

    /// Best-effort: a failed write keeps the report in the response only.
    async fn store_report(
        &self,
        approved: &invoice::Model,
        report: &ApprovalReport,
    ) -> invoice::Model {
        let active = invoice::ActiveModel {
            id: Unchanged(approved.id),
            approval_report: Set(Some(report.clone())),
            ..Default::default()
        };
        match active.update(self.db_pool.as_ref()).await {
            Ok(updated) => updated,
            Err(e) => {
                slog::warn!(self.logger, "Failed to store approval report";
                    "invoice_id" => approved.id.to_string(),
                    "error" => e.to_string());
                invoice::Model {
                    approval_report: Some(report.clone()),
                    ..approved.clone()
                }
            }
        }
    }

    fn task_failed(&self, id: Uuid, task: &str, error: &ServiceError) {
        counter!("autoshop.invoices.approval_task_failed", 1, "task" => task.to_string());
        slog::warn!(self.logger, "Post-approval task failed";
            "invoice_id" => id.to_string(),
            "task" => task.to_string(),
            "error" => error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_tokens_are_long_and_unique() {
        let first = generate_access_token();
        let second = generate_access_token();
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }
}
