use crate::{
    auth::Actor,
    entities::{
        coupon::{self, DiscountType},
        coupon_usage,
    },
    services::coupons::{CouponPatch, CouponValidation, NewCoupon},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Distinguishes an absent field from an explicit `null`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "code": "monsoon",
    "customer_id": "123e4567-e89b-12d3-a456-426614174000",
    "purchase_cents": 500000
}))]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    pub customer_id: Uuid,
    #[validate(range(min = 0))]
    pub purchase_cents: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CouponValidationResponse {
    pub valid: bool,
    /// Normalized code
    pub code: String,
    pub coupon_id: Option<Uuid>,
    pub discount_type: Option<DiscountType>,
    pub discount_cents: i64,
    /// Machine-readable rejection code, e.g. `expired`
    pub rejection: Option<String>,
    pub reason: Option<String>,
}

impl From<CouponValidation> for CouponValidationResponse {
    fn from(validation: CouponValidation) -> Self {
        Self {
            valid: validation.valid,
            code: validation.code,
            coupon_id: validation.coupon.as_ref().map(|c| c.id),
            discount_type: validation.coupon.as_ref().map(|c| c.discount_type),
            discount_cents: validation.discount_cents,
            rejection: validation.rejection.as_ref().map(|r| r.code().to_string()),
            reason: validation.reason,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "code": "MONSOON",
    "discount_type": "percentage",
    "discount_value": 10,
    "max_discount_cents": 50000,
    "min_purchase_cents": 200000,
    "usage_limit": 100,
    "per_customer_limit": 1
}))]
pub struct CreateCouponRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    /// Percent for `percentage`, minor units for `fixed`
    pub discount_value: i64,
    pub max_discount_cents: Option<i64>,
    #[serde(default)]
    pub min_purchase_cents: i64,
    pub usage_limit: Option<i32>,
    pub per_customer_limit: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Omitted fields are left alone; `null` clears an optional limit.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateCouponRequest {
    pub description: Option<String>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i64>)]
    pub max_discount_cents: Option<Option<i64>>,
    pub min_purchase_cents: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i32>)]
    pub usage_limit: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i32>)]
    pub per_customer_limit: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<DateTime<Utc>>)]
    pub valid_from: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<DateTime<Utc>>)]
    pub valid_until: Option<Option<DateTime<Utc>>>,
    pub is_active: Option<bool>,
}

impl From<UpdateCouponRequest> for CouponPatch {
    fn from(request: UpdateCouponRequest) -> Self {
        Self {
            description: request.description,
            discount_type: request.discount_type,
            discount_value: request.discount_value,
            max_discount_cents: request.max_discount_cents,
            min_purchase_cents: request.min_purchase_cents,
            usage_limit: request.usage_limit,
            per_customer_limit: request.per_customer_limit,
            valid_from: request.valid_from,
            valid_until: request.valid_until,
            is_active: request.is_active,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CouponResponse {
    pub id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub max_discount_cents: Option<i64>,
    pub min_purchase_cents: i64,
    pub usage_limit: Option<i32>,
    pub per_customer_limit: Option<i32>,
    pub used_count: i32,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<coupon::Model> for CouponResponse {
    fn from(model: coupon::Model) -> Self {
        Self {
            id: model.id,
            code: model.code,
            description: model.description,
            discount_type: model.discount_type,
            discount_value: model.discount_value,
            max_discount_cents: model.max_discount_cents,
            min_purchase_cents: model.min_purchase_cents,
            usage_limit: model.usage_limit,
            per_customer_limit: model.per_customer_limit,
            used_count: model.used_count,
            valid_from: model.valid_from,
            valid_until: model.valid_until,
            is_active: model.is_active,
            version: model.version,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CouponUsageResponse {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub customer_id: Uuid,
    pub discount_cents: i64,
    pub used_at: DateTime<Utc>,
}

impl From<coupon_usage::Model> for CouponUsageResponse {
    fn from(model: coupon_usage::Model) -> Self {
        Self {
            id: model.id,
            invoice_id: model.invoice_id,
            customer_id: model.customer_id,
            discount_cents: model.discount_cents,
            used_at: model.used_at,
        }
    }
}

pub fn coupon_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_coupon))
        .route("/validate", post(validate_coupon))
        .route("/code/:code", get(get_coupon_by_code))
        .route("/:id", get(get_coupon).patch(update_coupon))
        .route("/:id/usages", get(list_coupon_usages))
}

#[utoipa::path(
    post,
    path = "/api/v1/coupons/validate",
    request_body = ValidateCouponRequest,
    responses(
        (status = 200, description = "Validation outcome; rejections are not errors", body = ApiResponse<CouponValidationResponse>)
    ),
    tag = "coupons"
)]
pub async fn validate_coupon(
    State(state): State<AppState>,
    Json(payload): Json<ValidateCouponRequest>,
) -> ApiResult<CouponValidationResponse> {
    payload.validate()?;
    let validation = state
        .services
        .coupons
        .validate(&payload.code, payload.customer_id, payload.purchase_cents)
        .await?;
    Ok(Json(ApiResponse::success(validation.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/coupons",
    request_body = CreateCouponRequest,
    responses(
        (status = 200, description = "Coupon created", body = ApiResponse<CouponResponse>),
        (status = 400, description = "Invalid terms", body = crate::errors::ErrorResponse),
        (status = 403, description = "Caller may not manage coupons", body = crate::errors::ErrorResponse),
        (status = 409, description = "Code already exists", body = crate::errors::ErrorResponse)
    ),
    tag = "coupons"
)]
pub async fn create_coupon(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreateCouponRequest>,
) -> ApiResult<CouponResponse> {
    payload.validate()?;
    let input = NewCoupon {
        code: payload.code,
        description: payload.description,
        discount_type: payload.discount_type,
        discount_value: payload.discount_value,
        max_discount_cents: payload.max_discount_cents,
        min_purchase_cents: payload.min_purchase_cents,
        usage_limit: payload.usage_limit,
        per_customer_limit: payload.per_customer_limit,
        valid_from: payload.valid_from,
        valid_until: payload.valid_until,
        is_active: payload.is_active,
    };
    let coupon = state.services.coupons.create(&actor, input).await?;
    Ok(Json(ApiResponse::success(coupon.into())))
}

#[utoipa::path(
    patch,
    path = "/api/v1/coupons/{id}",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    request_body = UpdateCouponRequest,
    responses(
        (status = 200, description = "Coupon updated", body = ApiResponse<CouponResponse>),
        (status = 409, description = "Coupon changed concurrently", body = crate::errors::ErrorResponse)
    ),
    tag = "coupons"
)]
pub async fn update_coupon(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCouponRequest>,
) -> ApiResult<CouponResponse> {
    let coupon = state
        .services
        .coupons
        .update(&actor, id, payload.into())
        .await?;
    Ok(Json(ApiResponse::success(coupon.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/coupons/{id}",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    responses(
        (status = 200, description = "Coupon fetched", body = ApiResponse<CouponResponse>),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse)
    ),
    tag = "coupons"
)]
pub async fn get_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<CouponResponse> {
    let coupon = state.services.coupons.get(id).await?;
    Ok(Json(ApiResponse::success(coupon.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/coupons/code/{code}",
    params(("code" = String, Path, description = "Coupon code, any case")),
    responses(
        (status = 200, description = "Coupon fetched", body = ApiResponse<CouponResponse>),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse)
    ),
    tag = "coupons"
)]
pub async fn get_coupon_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<CouponResponse> {
    let coupon = state.services.coupons.get_by_code(&code).await?;
    Ok(Json(ApiResponse::success(coupon.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/coupons/{id}/usages",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    responses(
        (status = 200, description = "Redemption history", body = ApiResponse<Vec<CouponUsageResponse>>)
    ),
    tag = "coupons"
)]
pub async fn list_coupon_usages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<CouponUsageResponse>> {
    let usages = state.services.coupons.usages(id).await?;
    Ok(Json(ApiResponse::success(
        usages.into_iter().map(Into::into).collect(),
    )))
}
