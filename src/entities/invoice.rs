use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{entity::prelude::*, ActiveValue::Set, FromJsonQueryResult};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::coupon::DiscountType;
use super::invoice_payment::PaymentMode;
use super::product::PartRef;

/// Approval state of an invoice. `Approved` and `Rejected` are terminal.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InvoiceStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "pending_approval")]
    PendingApproval,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

/// Settlement state; only meaningful once the invoice is approved.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "unpaid")]
    Unpaid,
    #[sea_orm(string_value = "partial")]
    Partial,
    #[sea_orm(string_value = "paid")]
    Paid,
}

impl PaymentStatus {
    /// Settlement state implied by the running totals.
    pub fn from_amounts(paid_cents: i64, due_cents: i64) -> Self {
        if due_cents == 0 {
            PaymentStatus::Paid
        } else if paid_cents > 0 {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Unpaid
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LineItemKind {
    Product,
    Labour,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ItemWarrantyCard {
    pub url: String,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    pub kind: LineItemKind,
    /// Resolved part; `None` for labour lines
    pub part: Option<PartRef>,
    pub name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub tax_cents: i64,
    /// Caller-computed line total, tax included
    pub total_cents: i64,
    pub has_warranty: bool,
    /// Warranty text of the part at invoicing time
    pub warranty_terms: Option<String>,
    #[serde(default)]
    pub warranty_cards: Vec<ItemWarrantyCard>,
}

impl InvoiceLineItem {
    /// Only persisted products carry warranty tracking; catalog parts never do.
    pub fn is_warranty_bearing(&self) -> bool {
        self.has_warranty
            && self.kind == LineItemKind::Product
            && self
                .part
                .as_ref()
                .is_some_and(|part| part.persisted_id().is_some())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct LineItems(pub Vec<InvoiceLineItem>);

/// Customer profile frozen at invoicing time.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema,
)]
pub struct CustomerSnapshot {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: String,
    pub address: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct VehicleSnapshot {
    pub id: Uuid,
    pub registration_number: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct VehicleSnapshots(pub Vec<VehicleSnapshot>);

impl VehicleSnapshots {
    pub fn contains_vehicle(&self, vehicle_id: Uuid) -> bool {
        self.0.iter().any(|snapshot| snapshot.id == vehicle_id)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TaskOutcome {
    pub ok: bool,
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn succeeded() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NotificationsSent {
    pub email: bool,
    pub whatsapp: bool,
}

/// Outcome of the best-effort work that follows approval.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema,
)]
pub struct ApprovalReport {
    pub document: TaskOutcome,
    pub warranties: TaskOutcome,
    pub warranties_created: u32,
    pub notifications_sent: NotificationsSent,
    #[serde(default)]
    pub notification_errors: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub invoice_number: String,
    pub service_visit_id: Uuid,
    pub customer_id: Uuid,
    pub vehicle_number: String,
    #[sea_orm(column_type = "Json")]
    pub customer_details: CustomerSnapshot,
    #[sea_orm(column_type = "Json")]
    pub vehicle_details: VehicleSnapshots,
    #[sea_orm(column_type = "Json")]
    pub items: LineItems,
    pub subtotal_cents: i64,
    pub discount_type: Option<DiscountType>,
    pub discount_value: i64,
    pub discount_cents: i64,
    pub coupon_id: Option<Uuid>,
    pub coupon_code: Option<String>,
    /// Informational rate in basis points; line totals already carry tax
    pub tax_rate_bps: i32,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub due_cents: i64,
    pub status: InvoiceStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMode>,
    pub rejection_reason: Option<String>,
    pub access_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub document_path: Option<String>,
    #[sea_orm(column_type = "Json", nullable)]
    pub approval_report: Option<ApprovalReport>,
    pub notes: Option<String>,
    pub terms: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub created_by: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::invoice_payment::Entity")]
    Payments,
    #[sea_orm(has_many = "super::warranty::Entity")]
    Warranties,
}

impl Related<super::invoice_payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl Related<super::warranty::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Warranties.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);

        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_status_follows_amounts() {
        assert_eq!(PaymentStatus::from_amounts(0, 500), PaymentStatus::Unpaid);
        assert_eq!(PaymentStatus::from_amounts(300, 200), PaymentStatus::Partial);
        assert_eq!(PaymentStatus::from_amounts(500, 0), PaymentStatus::Paid);
        // a zero-total invoice has nothing outstanding
        assert_eq!(PaymentStatus::from_amounts(0, 0), PaymentStatus::Paid);
    }

    #[test]
    fn labour_lines_never_carry_warranty() {
        let line = InvoiceLineItem {
            kind: LineItemKind::Labour,
            part: None,
            name: "Wheel alignment".into(),
            quantity: 1,
            unit_price_cents: 40_000,
            tax_cents: 0,
            total_cents: 40_000,
            has_warranty: true,
            warranty_terms: None,
            warranty_cards: vec![],
        };
        assert!(!line.is_warranty_bearing());
    }

    #[test]
    fn only_persisted_products_carry_warranty() {
        let mut line = InvoiceLineItem {
            kind: LineItemKind::Product,
            part: Some(PartRef::Catalog("battery".into())),
            name: "Battery".into(),
            quantity: 1,
            unit_price_cents: 650_000,
            tax_cents: 0,
            total_cents: 650_000,
            has_warranty: true,
            warranty_terms: None,
            warranty_cards: vec![],
        };
        assert!(!line.is_warranty_bearing());

        line.part = Some(PartRef::Persisted(Uuid::new_v4()));
        assert!(line.is_warranty_bearing());

        line.has_warranty = false;
        assert!(!line.is_warranty_bearing());
    }
}
