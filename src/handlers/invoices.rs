use crate::{
    auth::Actor,
    entities::{
        coupon::DiscountType,
        invoice::{
            self, ApprovalReport, CustomerSnapshot, InvoiceLineItem, InvoiceStatus,
            ItemWarrantyCard, LineItemKind, PaymentStatus, VehicleSnapshot,
        },
        invoice_payment::{self, PaymentMode},
    },
    errors::ServiceError,
    handlers::warranties::WarrantyResponse,
    services::invoices::{
        ApprovalOutcome, DocumentFile, InvoiceFilter, LineItemInput, ManualDiscount, NewInvoice,
        PaymentReceipt, RecordPayment,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Default, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct InvoiceListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<InvoiceStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub customer_id: Option<Uuid>,
    pub service_visit_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct LineItemRequest {
    #[serde(default = "default_line_kind")]
    pub kind: LineItemKind,
    /// Product UUID (optionally `product-` prefixed) or catalog id
    pub part_id: Option<String>,
    pub name: Option<String>,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(range(min = 0, max = 1000000000))]
    pub unit_price_cents: i64,
    #[serde(default)]
    #[validate(range(min = 0, max = 1000000000))]
    pub tax_cents: i64,
    /// Line total including tax, as computed by the caller
    #[validate(range(min = 0, max = 1000000000))]
    pub total_cents: i64,
    #[serde(default)]
    pub has_warranty: bool,
}

fn default_line_kind() -> LineItemKind {
    LineItemKind::Product
}

impl From<LineItemRequest> for LineItemInput {
    fn from(request: LineItemRequest) -> Self {
        Self {
            kind: request.kind,
            part_id: request.part_id,
            name: request.name,
            quantity: request.quantity,
            unit_price_cents: request.unit_price_cents,
            tax_cents: request.tax_cents,
            total_cents: request.total_cents,
            has_warranty: request.has_warranty,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
pub struct ManualDiscountRequest {
    pub discount_type: DiscountType,
    /// Percent for `percentage`, minor units for `fixed`
    pub value: i64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "service_visit_id": "6f1c2a9e-5d2b-4c8e-9a57-0c8f2a1d3b44",
    "items": [
        {"kind": "product", "part_id": "brake-pads-front", "quantity": 1, "unit_price_cents": 240000, "total_cents": 240000, "has_warranty": true},
        {"kind": "labour", "name": "Brake service", "quantity": 1, "unit_price_cents": 60000, "total_cents": 60000}
    ],
    "coupon_code": "MONSOON",
    "tax_rate_bps": 1800
}))]
pub struct CreateInvoiceRequest {
    pub service_visit_id: Uuid,
    #[validate(length(min = 1))]
    #[validate]
    pub items: Vec<LineItemRequest>,
    pub coupon_code: Option<String>,
    pub discount: Option<ManualDiscountRequest>,
    #[serde(default)]
    #[validate(range(min = 0, max = 10000))]
    pub tax_rate_bps: i32,
    pub notes: Option<String>,
    pub terms: Option<String>,
    #[serde(default)]
    pub save_as_draft: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RejectInvoiceRequest {
    #[validate(length(min = 1, max = 1000))]
    pub reason: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentStatusRequest {
    /// `paid` or `unpaid`
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMode>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({"amount_cents": 30000, "mode": "upi", "transaction_id": "UPI-883201"}))]
pub struct RecordPaymentRequest {
    #[validate(range(min = 1))]
    pub amount_cents: i64,
    pub mode: PaymentMode,
    pub transaction_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DocumentQuery {
    /// Access token issued on approval
    pub token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvoiceLineItemResponse {
    pub index: usize,
    pub kind: LineItemKind,
    pub part_id: Option<String>,
    pub name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub has_warranty: bool,
    pub warranty_terms: Option<String>,
    pub warranty_cards: Vec<ItemWarrantyCard>,
}

impl InvoiceLineItemResponse {
    fn new(index: usize, item: InvoiceLineItem) -> Self {
        Self {
            index,
            kind: item.kind,
            part_id: item.part.as_ref().map(|part| part.canonical_id()),
            name: item.name,
            quantity: item.quantity,
            unit_price_cents: item.unit_price_cents,
            tax_cents: item.tax_cents,
            total_cents: item.total_cents,
            has_warranty: item.has_warranty,
            warranty_terms: item.warranty_terms,
            warranty_cards: item.warranty_cards,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub invoice_number: String,
    pub service_visit_id: Uuid,
    pub customer_id: Uuid,
    pub vehicle_number: String,
    pub customer: CustomerSnapshot,
    pub vehicles: Vec<VehicleSnapshot>,
    pub items: Vec<InvoiceLineItemResponse>,
    pub subtotal_cents: i64,
    pub discount_type: Option<DiscountType>,
    pub discount_value: i64,
    pub discount_cents: i64,
    pub coupon_code: Option<String>,
    pub tax_rate_bps: i32,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub due_cents: i64,
    pub status: InvoiceStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMode>,
    pub rejection_reason: Option<String>,
    /// Shareable token for the public document route
    pub access_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub has_document: bool,
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

impl From<invoice::Model> for InvoiceResponse {
    fn from(model: invoice::Model) -> Self {
        Self {
            id: model.id,
            invoice_number: model.invoice_number,
            service_visit_id: model.service_visit_id,
            customer_id: model.customer_id,
            vehicle_number: model.vehicle_number,
            customer: model.customer_details,
            vehicles: model.vehicle_details.0,
            items: model
                .items
                .0
                .into_iter()
                .enumerate()
                .map(|(index, item)| InvoiceLineItemResponse::new(index, item))
                .collect(),
            subtotal_cents: model.subtotal_cents,
            discount_type: model.discount_type,
            discount_value: model.discount_value,
            discount_cents: model.discount_cents,
            coupon_code: model.coupon_code,
            tax_rate_bps: model.tax_rate_bps,
            tax_cents: model.tax_cents,
            total_cents: model.total_cents,
            paid_cents: model.paid_cents,
            due_cents: model.due_cents,
            status: model.status,
            payment_status: model.payment_status,
            payment_method: model.payment_method,
            rejection_reason: model.rejection_reason,
            access_token: model.access_token,
            access_token_expires_at: model.access_token_expires_at,
            has_document: model.document_path.is_some(),
            approval_report: model.approval_report,
            notes: model.notes,
            terms: model.terms,
            approved_at: model.approved_at,
            approved_by: model.approved_by,
            created_by: model.created_by,
            version: model.version,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApprovalResponse {
    pub invoice: InvoiceResponse,
    pub report: ApprovalReport,
    pub warranties: Vec<WarrantyResponse>,
}

impl From<ApprovalOutcome> for ApprovalResponse {
    fn from(outcome: ApprovalOutcome) -> Self {
        Self {
            invoice: outcome.invoice.into(),
            report: outcome.report,
            warranties: outcome.warranties.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub amount_cents: i64,
    pub mode: PaymentMode,
    pub transaction_id: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl From<invoice_payment::Model> for PaymentResponse {
    fn from(model: invoice_payment::Model) -> Self {
        Self {
            id: model.id,
            invoice_id: model.invoice_id,
            amount_cents: model.amount_cents,
            mode: model.mode,
            transaction_id: model.transaction_id,
            notes: model.notes,
            recorded_by: model.recorded_by,
            recorded_at: model.recorded_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentReceiptResponse {
    pub invoice: InvoiceResponse,
    pub payment: PaymentResponse,
}

impl From<PaymentReceipt> for PaymentReceiptResponse {
    fn from(receipt: PaymentReceipt) -> Self {
        Self {
            invoice: receipt.invoice.into(),
            payment: receipt.payment.into(),
        }
    }
}

pub fn invoice_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_invoices).post(create_invoice))
        .route("/:id", get(get_invoice).delete(delete_invoice))
        .route("/:id/submit", post(submit_invoice))
        .route("/:id/approve", post(approve_invoice))
        .route("/:id/reject", post(reject_invoice))
        .route("/:id/payment-status", put(set_payment_status))
        .route("/:id/payments", get(list_payments).post(record_payment))
        .route("/:id/document", get(download_document))
}

/// Token-gated routes that sit outside the authenticated API.
pub fn public_invoice_routes() -> Router<AppState> {
    Router::new().route("/:id/document", get(download_public_document))
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices",
    request_body = CreateInvoiceRequest,
    responses(
        (status = 200, description = "Invoice raised", body = ApiResponse<InvoiceResponse>),
        (status = 400, description = "Visit not completed or invalid line items", body = crate::errors::ErrorResponse),
        (status = 404, description = "Service visit not found", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn create_invoice(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreateInvoiceRequest>,
) -> ApiResult<InvoiceResponse> {
    payload.validate()?;

    let input = NewInvoice {
        service_visit_id: payload.service_visit_id,
        items: payload.items.into_iter().map(Into::into).collect(),
        coupon_code: payload.coupon_code,
        discount: payload.discount.map(|d| ManualDiscount {
            discount_type: d.discount_type,
            value: d.value,
        }),
        tax_rate_bps: payload.tax_rate_bps,
        notes: payload.notes,
        terms: payload.terms,
        save_as_draft: payload.save_as_draft,
    };
    let invoice = state
        .services
        .invoices
        .create_from_service_visit(&actor, input)
        .await?;
    Ok(Json(ApiResponse::success(invoice.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices",
    params(InvoiceListQuery),
    responses(
        (status = 200, description = "Invoices listed", body = ApiResponse<PaginatedResponse<InvoiceResponse>>)
    ),
    tag = "invoices"
)]
pub async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<InvoiceListQuery>,
) -> ApiResult<PaginatedResponse<InvoiceResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let filter = InvoiceFilter {
        status: query.status,
        payment_status: query.payment_status,
        customer_id: query.customer_id,
        service_visit_id: query.service_visit_id,
    };

    let (invoices, total) = state.services.invoices.list(filter, page, limit).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        invoices.into_iter().map(Into::into).collect(),
        total,
        page,
        limit,
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice fetched", body = ApiResponse<InvoiceResponse>),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<InvoiceResponse> {
    let invoice = state.services.invoices.get(id).await?;
    Ok(Json(ApiResponse::success(invoice.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/submit",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Draft submitted for approval", body = ApiResponse<InvoiceResponse>),
        (status = 409, description = "Invoice is not a draft", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn submit_invoice(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<InvoiceResponse> {
    let invoice = state.services.invoices.submit(&actor, id).await?;
    Ok(Json(ApiResponse::success(invoice.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/approve",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice approved; follow-up task outcomes in the report", body = ApiResponse<ApprovalResponse>),
        (status = 403, description = "Caller may not approve", body = crate::errors::ErrorResponse),
        (status = 409, description = "Invoice is not pending approval", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn approve_invoice(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<ApprovalResponse> {
    let outcome = state.services.invoices.approve(&actor, id).await?;
    Ok(Json(ApiResponse::success(outcome.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/reject",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    request_body = RejectInvoiceRequest,
    responses(
        (status = 200, description = "Invoice rejected", body = ApiResponse<InvoiceResponse>),
        (status = 403, description = "Caller may not reject", body = crate::errors::ErrorResponse),
        (status = 409, description = "Invoice is not pending approval", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn reject_invoice(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectInvoiceRequest>,
) -> ApiResult<InvoiceResponse> {
    payload.validate()?;
    let invoice = state
        .services
        .invoices
        .reject(&actor, id, &payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(invoice.into())))
}

#[utoipa::path(
    delete,
    path = "/api/v1/invoices/{id}",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice deleted", body = ApiResponse<serde_json::Value>),
        (status = 403, description = "Caller may not delete", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn delete_invoice(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<serde_json::Value> {
    state.services.invoices.delete(&actor, id).await?;
    Ok(Json(ApiResponse::success(json!({ "id": id, "deleted": true }))))
}

#[utoipa::path(
    put,
    path = "/api/v1/invoices/{id}/payment-status",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    request_body = PaymentStatusRequest,
    responses(
        (status = 200, description = "Payment status set", body = ApiResponse<InvoiceResponse>),
        (status = 400, description = "Partial is not settable here", body = crate::errors::ErrorResponse),
        (status = 409, description = "Invoice is not approved", body = crate::errors::ErrorResponse)
    ),
    tag = "payments"
)]
pub async fn set_payment_status(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<PaymentStatusRequest>,
) -> ApiResult<InvoiceResponse> {
    let invoice = state
        .services
        .invoices
        .set_payment_status(&actor, id, payload.payment_status, payload.payment_method)
        .await?;
    Ok(Json(ApiResponse::success(invoice.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/payments",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    request_body = RecordPaymentRequest,
    responses(
        (status = 200, description = "Payment recorded", body = ApiResponse<PaymentReceiptResponse>),
        (status = 400, description = "Amount exceeds the balance due", body = crate::errors::ErrorResponse),
        (status = 409, description = "Invoice is not approved", body = crate::errors::ErrorResponse)
    ),
    tag = "payments"
)]
pub async fn record_payment(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<RecordPaymentRequest>,
) -> ApiResult<PaymentReceiptResponse> {
    payload.validate()?;
    let receipt = state
        .services
        .invoices
        .record_payment(
            &actor,
            id,
            RecordPayment {
                amount_cents: payload.amount_cents,
                mode: payload.mode,
                transaction_id: payload.transaction_id,
                notes: payload.notes,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(receipt.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}/payments",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Payment ledger", body = ApiResponse<Vec<PaymentResponse>>),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse)
    ),
    tag = "payments"
)]
pub async fn list_payments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<PaymentResponse>> {
    let payments = state.services.invoices.list_payments(id).await?;
    Ok(Json(ApiResponse::success(
        payments.into_iter().map(Into::into).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}/document",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice document", content_type = "text/plain"),
        (status = 409, description = "Invoice is not approved", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn download_document(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let file = state
        .services
        .invoices
        .document_for_staff(&actor, id)
        .await?;
    Ok(document_response(file))
}

#[utoipa::path(
    get,
    path = "/public/invoices/{id}/document",
    params(("id" = Uuid, Path, description = "Invoice ID"), DocumentQuery),
    responses(
        (status = 200, description = "Invoice document", content_type = "text/plain"),
        (status = 401, description = "Missing or wrong access token", body = crate::errors::ErrorResponse),
        (status = 410, description = "Access token expired", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn download_public_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<DocumentQuery>,
) -> Result<Response, ServiceError> {
    let file = state
        .services
        .invoices
        .document_for_token(id, query.token.as_deref())
        .await?;
    Ok(document_response(file))
}

fn document_response(file: DocumentFile) -> Response {
    (
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", file.file_name),
            ),
        ],
        file.bytes,
    )
        .into_response()
}
