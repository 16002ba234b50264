use crate::{
    auth::Actor,
    entities::{
        invoice::ItemWarrantyCard,
        warranty::{self, WarrantyStatus},
    },
    errors::ServiceError,
    services::warranty_sync::{LineWarrantyCards, SyncSkipReason, WarrantyCardUpload},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, ToSchema)]
#[schema(example = json!({
    "id": "aa0e8400-e29b-41d4-a716-446655440000",
    "warranty_number": "WRN-000042",
    "invoice_id": "3d1f7a0c-2b5e-4f7e-8c11-7b9e6c0a5d21",
    "customer_id": "123e4567-e89b-12d3-a456-426614174000",
    "product_id": "550e8400-e29b-41d4-a716-446655440000",
    "product_name": "Brake pads (front)",
    "duration_months": 6,
    "status": "active",
    "in_force": true,
    "start_date": "2026-03-02T10:30:00Z",
    "end_date": "2026-09-02T10:30:00Z"
}))]
pub struct WarrantyResponse {
    pub id: Uuid,
    pub warranty_number: String,
    pub invoice_id: Uuid,
    pub customer_id: Uuid,
    /// Canonical part id of the covered product
    pub product_id: String,
    pub product_name: String,
    /// Invoice line the warranty was raised for
    pub line_index: i32,
    pub duration_months: i32,
    pub status: WarrantyStatus,
    /// Active and not past its end date
    pub in_force: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub terms: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<warranty::Model> for WarrantyResponse {
    fn from(model: warranty::Model) -> Self {
        Self {
            in_force: model.is_in_force(Utc::now()),
            id: model.id,
            warranty_number: model.warranty_number,
            invoice_id: model.invoice_id,
            customer_id: model.customer_id,
            product_id: model.product_id,
            product_name: model.product_name,
            line_index: model.line_index,
            duration_months: model.duration_months,
            status: model.status,
            start_date: model.start_date,
            end_date: model.end_date,
            terms: model.terms,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UploadWarrantyCardRequest {
    #[validate(length(min = 1, max = 255))]
    pub filename: String,
    /// File content, base64 encoded
    #[validate(length(min = 1))]
    pub content_base64: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WarrantyCardUploadResponse {
    pub invoice_id: Uuid,
    pub item_index: usize,
    pub card: ItemWarrantyCard,
    pub synced_vehicle_ids: Vec<Uuid>,
    /// Set when the card was kept on the invoice only
    pub sync_skipped: Option<SyncSkipReason>,
}

impl From<WarrantyCardUpload> for WarrantyCardUploadResponse {
    fn from(upload: WarrantyCardUpload) -> Self {
        Self {
            invoice_id: upload.invoice_id,
            item_index: upload.item_index,
            card: upload.card,
            synced_vehicle_ids: upload.synced_vehicle_ids,
            sync_skipped: upload.sync_skipped,
        }
    }
}

pub fn warranty_routes() -> Router<AppState> {
    Router::new().route("/:id", get(get_warranty))
}

/// Warranty routes nested under an invoice.
pub fn invoice_warranty_routes() -> Router<AppState> {
    Router::new()
        .route("/:id/warranties", get(list_invoice_warranties))
        .route("/:id/warranty-cards", get(list_warranty_cards))
        .route(
            "/:id/items/:item_index/warranty-card",
            axum::routing::post(upload_warranty_card),
        )
}

pub fn customer_warranty_routes() -> Router<AppState> {
    Router::new().route("/:id/warranties", get(list_customer_warranties))
}

#[utoipa::path(
    get,
    path = "/api/v1/warranties/{id}",
    params(("id" = Uuid, Path, description = "Warranty ID")),
    responses(
        (status = 200, description = "Warranty fetched", body = ApiResponse<WarrantyResponse>),
        (status = 404, description = "Warranty not found", body = crate::errors::ErrorResponse)
    ),
    tag = "warranties"
)]
pub async fn get_warranty(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<WarrantyResponse> {
    let warranty = state.services.warranties.get(id).await?;
    Ok(Json(ApiResponse::success(warranty.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}/warranties",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Warranties raised by the invoice", body = ApiResponse<Vec<WarrantyResponse>>)
    ),
    tag = "warranties"
)]
pub async fn list_invoice_warranties(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<WarrantyResponse>> {
    let warranties = state.services.warranties.list_for_invoice(id).await?;
    Ok(Json(ApiResponse::success(
        warranties.into_iter().map(Into::into).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/customers/{id}/warranties",
    params(("id" = Uuid, Path, description = "Customer ID")),
    responses(
        (status = 200, description = "Warranties held by the customer, newest first", body = ApiResponse<Vec<WarrantyResponse>>)
    ),
    tag = "warranties"
)]
pub async fn list_customer_warranties(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<WarrantyResponse>> {
    let warranties = state.services.warranties.list_for_customer(id).await?;
    Ok(Json(ApiResponse::success(
        warranties.into_iter().map(Into::into).collect(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/items/{item_index}/warranty-card",
    params(
        ("id" = Uuid, Path, description = "Invoice ID"),
        ("item_index" = usize, Path, description = "Zero-based line index")
    ),
    request_body = UploadWarrantyCardRequest,
    responses(
        (status = 200, description = "Card stored; vehicle sync outcome included", body = ApiResponse<WarrantyCardUploadResponse>),
        (status = 400, description = "Bad index or file", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse)
    ),
    tag = "warranties"
)]
pub async fn upload_warranty_card(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, item_index)): Path<(Uuid, usize)>,
    Json(payload): Json<UploadWarrantyCardRequest>,
) -> ApiResult<WarrantyCardUploadResponse> {
    payload.validate()?;
    let bytes = STANDARD
        .decode(payload.content_base64.trim())
        .map_err(|_| ServiceError::ValidationError("content_base64 is not valid base64".to_string()))?;
    if bytes.len() > state.config.max_image_bytes {
        return Err(ServiceError::ValidationError(format!(
            "file is {} bytes, limit is {}",
            bytes.len(),
            state.config.max_image_bytes
        )));
    }

    let upload = state
        .services
        .warranty_sync
        .upload_card(&actor, id, item_index, bytes, &payload.filename)
        .await?;
    Ok(Json(ApiResponse::success(upload.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}/warranty-cards",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Cards per invoice line", body = ApiResponse<Vec<LineWarrantyCards>>),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse)
    ),
    tag = "warranties"
)]
pub async fn list_warranty_cards(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<LineWarrantyCards>> {
    let cards = state.services.warranty_sync.list_cards(id).await?;
    Ok(Json(ApiResponse::success(cards)))
}
