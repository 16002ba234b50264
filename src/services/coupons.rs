//! Coupon validation, discount calculation and redemption.
//!
//! Validation is a read. Redemption happens only inside the invoice-creation
//! transaction: the usage counter is claimed with a conditional increment, the
//! per-customer count is taken again once the row is claimed, and the ledger entry is
//! written next to the invoice it belongs to.

use crate::{
    auth::{Actor, MANAGER_ROLES},
    db::DbPool,
    entities::{
        coupon::{self, DiscountType},
        coupon_usage,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::activity::{ActivityEntry, ActivityLogger},
};
use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use sea_orm::{
    sea_query::{Condition, Expr},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Why a coupon does not apply.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case", tag = "code")]
pub enum CouponRejection {
    #[error("coupon not found")]
    NotFound,
    #[error("coupon is inactive")]
    Inactive,
    #[error("coupon is not valid yet")]
    NotYetValid,
    #[error("coupon has expired")]
    Expired,
    #[error("coupon usage limit reached")]
    UsageLimitReached,
    #[error("coupon already used the maximum number of times by this customer")]
    CustomerLimitReached,
    #[error("minimum purchase of {minimum_cents} not met")]
    BelowMinimumPurchase { minimum_cents: i64 },
}

impl CouponRejection {
    /// Stable machine-readable code, matching the serialized tag.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Inactive => "inactive",
            Self::NotYetValid => "not_yet_valid",
            Self::Expired => "expired",
            Self::UsageLimitReached => "usage_limit_reached",
            Self::CustomerLimitReached => "customer_limit_reached",
            Self::BelowMinimumPurchase { .. } => "below_minimum_purchase",
        }
    }
}

impl From<CouponRejection> for ServiceError {
    fn from(rejection: CouponRejection) -> Self {
        match rejection {
            CouponRejection::NotFound => ServiceError::NotFound(rejection.to_string()),
            other => ServiceError::Conflict(other.to_string()),
        }
    }
}

/// Upper-cased, trimmed form under which codes are stored and looked up.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Discount for `purchase_cents`, always within `0..=purchase_cents`.
pub fn calculate_discount(coupon: &coupon::Model, purchase_cents: i64) -> i64 {
    discount_for(
        coupon.discount_type,
        coupon.discount_value,
        coupon.max_discount_cents,
        purchase_cents,
    )
}

/// Shared by coupons and manual invoice discounts.
pub fn discount_for(
    discount_type: DiscountType,
    value: i64,
    max_discount_cents: Option<i64>,
    purchase_cents: i64,
) -> i64 {
    if purchase_cents <= 0 || value <= 0 {
        return 0;
    }
    let raw = match discount_type {
        DiscountType::Fixed => value,
        DiscountType::Percentage => {
            let amount = Decimal::from(purchase_cents) * Decimal::from(value.min(100)) / dec!(100);
            let rounded = amount
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_i64()
                .unwrap_or(0);
            match max_discount_cents {
                Some(cap) => rounded.min(cap),
                None => rounded,
            }
        }
    };
    raw.clamp(0, purchase_cents)
}

/// Applies every eligibility rule in order and returns the discount on success.
pub fn evaluate(
    coupon: &coupon::Model,
    customer_usages: u64,
    purchase_cents: i64,
    now: DateTime<Utc>,
) -> Result<i64, CouponRejection> {
    if !coupon.is_active {
        return Err(CouponRejection::Inactive);
    }
    if coupon.valid_from.is_some_and(|from| now < from) {
        return Err(CouponRejection::NotYetValid);
    }
    if coupon.valid_until.is_some_and(|until| now > until) {
        return Err(CouponRejection::Expired);
    }
    if coupon
        .usage_limit
        .is_some_and(|limit| coupon.used_count >= limit)
    {
        return Err(CouponRejection::UsageLimitReached);
    }
    if coupon
        .per_customer_limit
        .is_some_and(|limit| customer_usages >= limit.max(0) as u64)
    {
        return Err(CouponRejection::CustomerLimitReached);
    }
    if purchase_cents < coupon.min_purchase_cents {
        return Err(CouponRejection::BelowMinimumPurchase {
            minimum_cents: coupon.min_purchase_cents,
        });
    }
    Ok(calculate_discount(coupon, purchase_cents))
}

pub async fn find_by_code<C>(conn: &C, code: &str) -> Result<Option<coupon::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    coupon::Entity::find()
        .filter(coupon::Column::Code.eq(normalize_code(code)))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

pub async fn count_customer_usages<C>(
    conn: &C,
    coupon_id: Uuid,
    customer_id: Uuid,
) -> Result<u64, ServiceError>
where
    C: ConnectionTrait,
{
    coupon_usage::Entity::find()
        .filter(coupon_usage::Column::CouponId.eq(coupon_id))
        .filter(coupon_usage::Column::CustomerId.eq(customer_id))
        .count(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Discount committed by a redemption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Redemption {
    pub coupon_id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub discount_cents: i64,
    pub usage_id: Uuid,
}

/// Claims one use of a coupon for `invoice_id`.
///
/// Must run on the invoice transaction (or a savepoint of it). Any error leaves the
/// caller responsible for rolling that savepoint back.
pub async fn redeem<C>(
    conn: &C,
    coupon_id: Uuid,
    customer_id: Uuid,
    invoice_id: Uuid,
    purchase_cents: i64,
) -> Result<Redemption, ServiceError>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    let claimed = coupon::Entity::update_many()
        .col_expr(
            coupon::Column::UsedCount,
            Expr::col(coupon::Column::UsedCount).add(1),
        )
        .col_expr(
            coupon::Column::Version,
            Expr::col(coupon::Column::Version).add(1),
        )
        .col_expr(coupon::Column::UpdatedAt, Expr::value(now))
        .filter(coupon::Column::Id.eq(coupon_id))
        .filter(coupon::Column::IsActive.eq(true))
        .filter(
            Condition::any()
                .add(coupon::Column::UsageLimit.is_null())
                .add(Expr::col(coupon::Column::UsedCount).lt(Expr::col(coupon::Column::UsageLimit))),
        )
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;
    if claimed.rows_affected == 0 {
        return Err(CouponRejection::UsageLimitReached.into());
    }

    let coupon = coupon::Entity::find_by_id(coupon_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or(CouponRejection::NotFound)?;

    // counted only after the row is claimed, so concurrent redemptions see each other
    let usages = count_customer_usages(conn, coupon_id, customer_id).await?;
    if coupon
        .per_customer_limit
        .is_some_and(|limit| usages >= limit.max(0) as u64)
    {
        return Err(CouponRejection::CustomerLimitReached.into());
    }
    if coupon.valid_until.is_some_and(|until| now > until) {
        return Err(CouponRejection::Expired.into());
    }
    if purchase_cents < coupon.min_purchase_cents {
        return Err(CouponRejection::BelowMinimumPurchase {
            minimum_cents: coupon.min_purchase_cents,
        }
        .into());
    }

    let discount_cents = calculate_discount(&coupon, purchase_cents);
    let usage = coupon_usage::ActiveModel {
        id: Set(Uuid::new_v4()),
        coupon_id: Set(coupon.id),
        invoice_id: Set(invoice_id),
        customer_id: Set(customer_id),
        discount_cents: Set(discount_cents),
        used_at: Set(now),
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)?;

    debug!(coupon_id = %coupon.id, %invoice_id, discount_cents, "Coupon redeemed");
    counter!("autoshop.coupons.redeemed", 1);
    Ok(Redemption {
        coupon_id: coupon.id,
        code: coupon.code,
        discount_type: coupon.discount_type,
        discount_value: coupon.discount_value,
        discount_cents,
        usage_id: usage.id,
    })
}

#[derive(Clone, Debug, Serialize)]
pub struct CouponValidation {
    pub valid: bool,
    pub code: String,
    pub reason: Option<String>,
    pub rejection: Option<CouponRejection>,
    pub discount_cents: i64,
    #[serde(skip)]
    pub coupon: Option<coupon::Model>,
}

impl CouponValidation {
    fn rejected(code: String, rejection: CouponRejection, coupon: Option<coupon::Model>) -> Self {
        Self {
            valid: false,
            code,
            reason: Some(rejection.to_string()),
            rejection: Some(rejection),
            discount_cents: 0,
            coupon,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewCoupon {
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub max_discount_cents: Option<i64>,
    pub min_purchase_cents: i64,
    pub usage_limit: Option<i32>,
    pub per_customer_limit: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: bool,
}

#[derive(Clone, Debug, Default)]
pub struct CouponPatch {
    pub description: Option<String>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<i64>,
    pub max_discount_cents: Option<Option<i64>>,
    pub min_purchase_cents: Option<i64>,
    pub usage_limit: Option<Option<i32>>,
    pub per_customer_limit: Option<Option<i32>>,
    pub valid_from: Option<Option<DateTime<Utc>>>,
    pub valid_until: Option<Option<DateTime<Utc>>>,
    pub is_active: Option<bool>,
}

struct CouponTerms {
    discount_type: DiscountType,
    discount_value: i64,
    max_discount_cents: Option<i64>,
    min_purchase_cents: i64,
    usage_limit: Option<i32>,
    per_customer_limit: Option<i32>,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
}

impl CouponTerms {
    fn check(&self) -> Result<(), ServiceError> {
        let invalid = |msg: &str| Err(ServiceError::ValidationError(msg.to_string()));
        if self.discount_value <= 0 {
            return invalid("discount_value must be positive");
        }
        if self.discount_type == DiscountType::Percentage && self.discount_value > 100 {
            return invalid("percentage discount cannot exceed 100");
        }
        if self.max_discount_cents.is_some_and(|cap| cap <= 0) {
            return invalid("max_discount_cents must be positive");
        }
        if self.min_purchase_cents < 0 {
            return invalid("min_purchase_cents cannot be negative");
        }
        if self.usage_limit.is_some_and(|limit| limit < 1)
            || self.per_customer_limit.is_some_and(|limit| limit < 1)
        {
            return invalid("usage limits must be at least 1");
        }
        if let (Some(from), Some(until)) = (self.valid_from, self.valid_until) {
            if until <= from {
                return invalid("valid_until must be after valid_from");
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct CouponService {
    db_pool: Arc<DbPool>,
    activity: Arc<dyn ActivityLogger>,
    event_sender: Option<Arc<EventSender>>,
}

impl CouponService {
    pub fn new(db_pool: Arc<DbPool>, activity: Arc<dyn ActivityLogger>) -> Self {
        Self {
            db_pool,
            activity,
            event_sender: None,
        }
    }

    pub fn with_event_sender(mut self, event_sender: Arc<EventSender>) -> Self {
        self.event_sender = Some(event_sender);
        self
    }

    /// Checks whether `code` applies to this customer and purchase.
    #[instrument(skip(self))]
    pub async fn validate(
        &self,
        code: &str,
        customer_id: Uuid,
        purchase_cents: i64,
    ) -> Result<CouponValidation, ServiceError> {
        let db = self.db_pool.as_ref();
        let code = normalize_code(code);
        let Some(coupon) = find_by_code(db, &code).await? else {
            return Ok(CouponValidation::rejected(code, CouponRejection::NotFound, None));
        };

        let usages = count_customer_usages(db, coupon.id, customer_id).await?;
        Ok(match evaluate(&coupon, usages, purchase_cents, Utc::now()) {
            Ok(discount_cents) => CouponValidation {
                valid: true,
                code,
                reason: None,
                rejection: None,
                discount_cents,
                coupon: Some(coupon),
            },
            Err(rejection) => CouponValidation::rejected(code, rejection, Some(coupon)),
        })
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create(
        &self,
        actor: &Actor,
        input: NewCoupon,
    ) -> Result<coupon::Model, ServiceError> {
        actor.require_any_role(MANAGER_ROLES)?;
        let db = self.db_pool.as_ref();
        let code = normalize_code(&input.code);
        if code.is_empty() {
            return Err(ServiceError::ValidationError("code is required".to_string()));
        }
        CouponTerms {
            discount_type: input.discount_type,
            discount_value: input.discount_value,
            max_discount_cents: input.max_discount_cents,
            min_purchase_cents: input.min_purchase_cents,
            usage_limit: input.usage_limit,
            per_customer_limit: input.per_customer_limit,
            valid_from: input.valid_from,
            valid_until: input.valid_until,
        }
        .check()?;

        if find_by_code(db, &code).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "coupon {} already exists",
                code
            )));
        }

        let created = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code),
            description: Set(input.description),
            discount_type: Set(input.discount_type),
            discount_value: Set(input.discount_value),
            max_discount_cents: Set(input.max_discount_cents),
            min_purchase_cents: Set(input.min_purchase_cents),
            usage_limit: Set(input.usage_limit),
            per_customer_limit: Set(input.per_customer_limit),
            used_count: Set(0),
            valid_from: Set(input.valid_from),
            valid_until: Set(input.valid_until),
            is_active: Set(input.is_active),
            version: Set(1),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(ServiceError::db_error)?;

        info!(coupon_id = %created.id, code = %created.code, "Coupon created");
        self.publish(Event::CouponCreated(created.id)).await;
        self.activity
            .log_activity(ActivityEntry::new(
                actor,
                "create",
                "coupon",
                created.id,
                format!("Created coupon {}", created.code),
            ))
            .await;
        Ok(created)
    }

    /// Updates terms; the code and usage counter are not editable.
    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        actor: &Actor,
        id: Uuid,
        patch: CouponPatch,
    ) -> Result<coupon::Model, ServiceError> {
        actor.require_any_role(MANAGER_ROLES)?;
        let db = self.db_pool.as_ref();
        let current = self.get(id).await?;

        let terms = CouponTerms {
            discount_type: patch.discount_type.unwrap_or(current.discount_type),
            discount_value: patch.discount_value.unwrap_or(current.discount_value),
            max_discount_cents: patch.max_discount_cents.unwrap_or(current.max_discount_cents),
            min_purchase_cents: patch.min_purchase_cents.unwrap_or(current.min_purchase_cents),
            usage_limit: patch.usage_limit.unwrap_or(current.usage_limit),
            per_customer_limit: patch
                .per_customer_limit
                .unwrap_or(current.per_customer_limit),
            valid_from: patch.valid_from.unwrap_or(current.valid_from),
            valid_until: patch.valid_until.unwrap_or(current.valid_until),
        };
        terms.check()?;

        let version = current.version;
        let mut active: coupon::ActiveModel = current.into();
        if let Some(description) = patch.description {
            active.description = Set(Some(description));
        }
        if let Some(is_active) = patch.is_active {
            active.is_active = Set(is_active);
        }
        active.discount_type = Set(terms.discount_type);
        active.discount_value = Set(terms.discount_value);
        active.max_discount_cents = Set(terms.max_discount_cents);
        active.min_purchase_cents = Set(terms.min_purchase_cents);
        active.usage_limit = Set(terms.usage_limit);
        active.per_customer_limit = Set(terms.per_customer_limit);
        active.valid_from = Set(terms.valid_from);
        active.valid_until = Set(terms.valid_until);
        active.version = Set(version + 1);
        active.updated_at = Set(Utc::now());

        // redemptions bump the version too, so a concurrent redemption surfaces as a conflict
        let updated = coupon::Entity::update(active)
            .filter(coupon::Column::Version.eq(version))
            .exec(db)
            .await
            .map_err(|e| ServiceError::from_guarded_update(e, id))?;

        self.publish(Event::CouponUpdated(id)).await;
        self.activity
            .log_activity(ActivityEntry::new(
                actor,
                "update",
                "coupon",
                id,
                format!("Updated coupon {}", updated.code),
            ))
            .await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<coupon::Model, ServiceError> {
        coupon::Entity::find_by_id(id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn get_by_code(&self, code: &str) -> Result<coupon::Model, ServiceError> {
        find_by_code(self.db_pool.as_ref(), code)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", normalize_code(code))))
    }

    /// Redemption history of a coupon.
    #[instrument(skip(self))]
    pub async fn usages(&self, id: Uuid) -> Result<Vec<coupon_usage::Model>, ServiceError> {
        coupon_usage::Entity::find()
            .filter(coupon_usage::Column::CouponId.eq(id))
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn publish(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;
    use proptest::prelude::*;

    fn coupon(discount_type: DiscountType, value: i64) -> coupon::Model {
        let now = Utc::now();
        coupon::Model {
            id: Uuid::new_v4(),
            code: "SAVE10".into(),
            description: None,
            discount_type,
            discount_value: value,
            max_discount_cents: None,
            min_purchase_cents: 0,
            usage_limit: None,
            per_customer_limit: None,
            used_count: 0,
            valid_from: None,
            valid_until: None,
            is_active: true,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn codes_are_normalized() {
        assert_eq!(normalize_code("  save10 "), "SAVE10");
    }

    #[test]
    fn percentage_is_rounded_and_capped() {
        let mut c = coupon(DiscountType::Percentage, 15);
        assert_eq!(calculate_discount(&c, 10_005), 1_501);
        c.max_discount_cents = Some(1_000);
        assert_eq!(calculate_discount(&c, 10_005), 1_000);
    }

    #[test]
    fn fixed_discount_never_exceeds_purchase() {
        let c = coupon(DiscountType::Fixed, 80_000);
        assert_eq!(calculate_discount(&c, 50_000), 50_000);
        assert_eq!(calculate_discount(&c, 0), 0);
    }

    #[test]
    fn evaluation_order() {
        let now = Utc::now();
        let mut c = coupon(DiscountType::Fixed, 500);
        c.min_purchase_cents = 1_000;
        c.per_customer_limit = Some(1);
        c.usage_limit = Some(3);

        assert_eq!(evaluate(&c, 0, 2_000, now), Ok(500));
        assert_matches!(
            evaluate(&c, 0, 999, now),
            Err(CouponRejection::BelowMinimumPurchase { minimum_cents: 1_000 })
        );
        assert_eq!(
            evaluate(&c, 1, 2_000, now),
            Err(CouponRejection::CustomerLimitReached)
        );
        c.used_count = 3;
        assert_eq!(
            evaluate(&c, 0, 2_000, now),
            Err(CouponRejection::UsageLimitReached)
        );
        c.valid_until = Some(now - Duration::days(1));
        assert_eq!(evaluate(&c, 0, 2_000, now), Err(CouponRejection::Expired));
        c.valid_from = Some(now + Duration::days(1));
        c.valid_until = None;
        assert_eq!(evaluate(&c, 0, 2_000, now), Err(CouponRejection::NotYetValid));
        c.is_active = false;
        assert_eq!(evaluate(&c, 0, 2_000, now), Err(CouponRejection::Inactive));
    }

    proptest! {
        #[test]
        fn discount_stays_within_purchase(
            percentage in any::<bool>(),
            value in 0i64..1_000_000,
            cap in proptest::option::of(1i64..1_000_000),
            purchase in -1_000i64..10_000_000,
        ) {
            let kind = if percentage { DiscountType::Percentage } else { DiscountType::Fixed };
            let discount = discount_for(kind, value, cap, purchase);
            prop_assert!(discount >= 0);
            prop_assert!(discount <= purchase.max(0));
        }
    }
}
