use crate::{
    db::DbPool,
    entities::{
        invoice,
        warranty::{self, WarrantyStatus},
    },
    errors::ServiceError,
    services::sequences::{self, WARRANTY_SEQUENCE},
};
use chrono::{DateTime, Months, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::{collections::HashSet, sync::Arc};
use tracing::{info, instrument};
use uuid::Uuid;

static FIRST_INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("static regex"));

/// Longest warranty accepted from free text, in months.
pub const MAX_WARRANTY_MONTHS: u32 = 1_200;

/// Months of cover stated in a free-text warranty description.
///
/// Takes the first integer literal as a month count ("6 months", "24 months
/// manufacturer warranty"). Text without a usable number, including "0", yields
/// `default_months`. Units are not interpreted: "1 year" reads as 1.
pub fn parse_duration_months(text: Option<&str>, default_months: u32) -> u32 {
    text.and_then(|text| FIRST_INTEGER.find(text))
        .and_then(|found| found.as_str().parse::<u32>().ok())
        .filter(|months| *months > 0)
        .map(|months| months.min(MAX_WARRANTY_MONTHS))
        .unwrap_or(default_months)
}

pub fn end_date(start: DateTime<Utc>, months: u32) -> Result<DateTime<Utc>, ServiceError> {
    start
        .checked_add_months(Months::new(months))
        .ok_or_else(|| ServiceError::InternalError(format!("warranty of {} months overflows", months)))
}

/// Creates one warranty per warranty-bearing product line of an approved invoice.
///
/// Lines that already have a warranty are skipped, so a retried approval task never
/// duplicates records.
pub async fn create_for_invoice<C>(
    conn: &C,
    invoice: &invoice::Model,
    default_months: u32,
    start: DateTime<Utc>,
) -> Result<Vec<warranty::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    let existing: HashSet<i32> = warranty::Entity::find()
        .filter(warranty::Column::InvoiceId.eq(invoice.id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?
        .into_iter()
        .map(|w| w.line_index)
        .collect();

    let mut created = Vec::new();
    for (index, item) in invoice.items.0.iter().enumerate() {
        let line_index = index as i32;
        if !item.is_warranty_bearing() || existing.contains(&line_index) {
            continue;
        }
        let Some(part) = item.part.as_ref() else {
            continue;
        };

        let months = parse_duration_months(item.warranty_terms.as_deref(), default_months);
        let number = sequences::next_in(conn, WARRANTY_SEQUENCE).await?;
        let record = warranty::ActiveModel {
            id: Set(Uuid::new_v4()),
            warranty_number: Set(sequences::format_number("WRN", number)),
            invoice_id: Set(invoice.id),
            customer_id: Set(invoice.customer_id),
            product_id: Set(part.canonical_id()),
            product_name: Set(item.name.clone()),
            line_index: Set(line_index),
            duration_months: Set(months as i32),
            status: Set(WarrantyStatus::Active),
            start_date: Set(start),
            end_date: Set(end_date(start, months)?),
            terms: Set(item.warranty_terms.clone()),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;
        created.push(record);
    }

    if !created.is_empty() {
        info!(invoice_id = %invoice.id, count = created.len(), "Warranties created");
    }
    Ok(created)
}

/// Read access to warranty records.
#[derive(Clone)]
pub struct WarrantyService {
    db_pool: Arc<DbPool>,
}

impl WarrantyService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<warranty::Model, ServiceError> {
        warranty::Entity::find_by_id(id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Warranty {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn list_for_invoice(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<warranty::Model>, ServiceError> {
        warranty::Entity::find()
            .filter(warranty::Column::InvoiceId.eq(invoice_id))
            .order_by_asc(warranty::Column::LineIndex)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn list_for_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<warranty::Model>, ServiceError> {
        warranty::Entity::find()
            .filter(warranty::Column::CustomerId.eq(customer_id))
            .order_by_desc(warranty::Column::StartDate)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }
}
