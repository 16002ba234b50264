use crate::{
    auth::Actor,
    entities::service_visit::{self, PartUsage, StageTimestamps, VisitStatus},
    services::{
        parts::ResolvedPart,
        service_visits::{
            NewServiceVisit, PartUsageInput, ServiceVisitFilter, ServiceVisitPatch,
            SuggestedParts,
        },
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
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
pub struct ServiceVisitListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub customer_id: Option<Uuid>,
    pub status: Option<VisitStatus>,
    pub vehicle_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct PartUsageRequest {
    #[validate(length(min = 1))]
    #[schema(example = "engine-oil")]
    pub part_id: String,
    #[validate(range(min = 1))]
    #[schema(example = 1)]
    pub quantity: i32,
    /// Overrides the catalog or product price
    pub unit_price_cents: Option<i64>,
}

impl From<PartUsageRequest> for PartUsageInput {
    fn from(request: PartUsageRequest) -> Self {
        Self {
            part_id: request.part_id,
            quantity: request.quantity,
            unit_price_cents: request.unit_price_cents,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "customer_id": "123e4567-e89b-12d3-a456-426614174000",
    "vehicle_number": "KA01AB1234",
    "complaint": "Brakes squeal when stopping",
    "handlers": ["emp-17"],
    "before_images": ["data:image/jpeg;base64,/9j/4AAQSkZJRg=="]
}))]
pub struct CreateServiceVisitRequest {
    pub customer_id: Uuid,
    /// Registration number of the serviced vehicle
    #[validate(length(min = 1, max = 32))]
    pub vehicle_number: String,
    /// Initial phase; defaults to `inquired`
    pub status: Option<VisitStatus>,
    pub complaint: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub handlers: Vec<String>,
    /// Stored references or `data:` URLs to upload
    #[serde(default)]
    pub before_images: Vec<String>,
    #[serde(default)]
    pub after_images: Vec<String>,
    #[serde(default)]
    #[validate]
    pub parts_used: Vec<PartUsageRequest>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "status": "completed",
    "after_images": ["data:image/png;base64,iVBORw0KGgo="],
    "version": 2
}))]
pub struct UpdateServiceVisitRequest {
    pub status: Option<VisitStatus>,
    pub handlers: Option<Vec<String>>,
    pub before_images: Option<Vec<String>>,
    pub after_images: Option<Vec<String>>,
    #[validate]
    pub parts_used: Option<Vec<PartUsageRequest>>,
    pub complaint: Option<String>,
    pub notes: Option<String>,
    /// Version the client last read; stale patches are refused
    pub version: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceVisitResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub vehicle_number: String,
    pub status: VisitStatus,
    pub complaint: Option<String>,
    pub notes: Option<String>,
    pub handlers: Vec<String>,
    pub before_images: Vec<String>,
    pub after_images: Vec<String>,
    pub parts_used: Vec<PartUsage>,
    pub stage_timestamps: StageTimestamps,
    pub version: i32,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<service_visit::Model> for ServiceVisitResponse {
    fn from(model: service_visit::Model) -> Self {
        Self {
            id: model.id,
            customer_id: model.customer_id,
            vehicle_number: model.vehicle_number,
            status: model.status,
            complaint: model.complaint,
            notes: model.notes,
            handlers: model.handlers.0,
            before_images: model.before_images.0,
            after_images: model.after_images.0,
            parts_used: model.parts_used.0,
            stage_timestamps: model.stage_timestamps,
            version: model.version,
            created_by: model.created_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SuggestedPart {
    pub requested_id: String,
    /// Persisted product id or catalog id
    pub part_id: String,
    pub source: String,
    pub name: String,
    pub category: String,
    pub brand: Option<String>,
    pub price_cents: i64,
    pub warranty: Option<String>,
    pub stock: Option<i32>,
}

impl From<ResolvedPart> for SuggestedPart {
    fn from(part: ResolvedPart) -> Self {
        let source = if part.part.persisted_id().is_some() {
            "product"
        } else {
            "catalog"
        };
        Self {
            requested_id: part.requested_id,
            part_id: part.part.canonical_id(),
            source: source.to_string(),
            name: part.name,
            category: part.category,
            brand: part.brand,
            price_cents: part.price_cents,
            warranty: part.warranty,
            stock: part.stock,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SuggestedPartsResponse {
    pub visit_id: Uuid,
    pub vehicle_id: Option<Uuid>,
    pub parts: Vec<SuggestedPart>,
    /// Selected identifiers that matched neither a product nor the catalog
    pub not_found: Vec<String>,
}

impl From<SuggestedParts> for SuggestedPartsResponse {
    fn from(suggested: SuggestedParts) -> Self {
        Self {
            visit_id: suggested.visit_id,
            vehicle_id: suggested.vehicle_id,
            parts: suggested
                .resolution
                .resolved
                .into_iter()
                .map(SuggestedPart::from)
                .collect(),
            not_found: suggested.resolution.not_found,
        }
    }
}

pub fn service_visit_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_service_visits).post(create_service_visit))
        .route(
            "/:id",
            get(get_service_visit)
                .patch(update_service_visit)
                .delete(delete_service_visit),
        )
        .route("/:id/suggested-parts", get(get_suggested_parts))
}

#[utoipa::path(
    post,
    path = "/api/v1/service-visits",
    request_body = CreateServiceVisitRequest,
    responses(
        (status = 200, description = "Service visit opened", body = ApiResponse<ServiceVisitResponse>),
        (status = 400, description = "Invalid request or unmet phase requirement", body = crate::errors::ErrorResponse),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse)
    ),
    tag = "service-visits"
)]
pub async fn create_service_visit(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreateServiceVisitRequest>,
) -> ApiResult<ServiceVisitResponse> {
    payload.validate()?;

    let visit = state
        .services
        .service_visits
        .create(
            &actor,
            NewServiceVisit {
                customer_id: payload.customer_id,
                vehicle_number: payload.vehicle_number,
                status: payload.status,
                complaint: payload.complaint,
                notes: payload.notes,
                handlers: payload.handlers,
                before_images: payload.before_images,
                after_images: payload.after_images,
                parts_used: payload.parts_used.into_iter().map(Into::into).collect(),
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(visit.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/service-visits",
    params(ServiceVisitListQuery),
    responses(
        (status = 200, description = "Service visits listed", body = ApiResponse<PaginatedResponse<ServiceVisitResponse>>)
    ),
    tag = "service-visits"
)]
pub async fn list_service_visits(
    State(state): State<AppState>,
    Query(query): Query<ServiceVisitListQuery>,
) -> ApiResult<PaginatedResponse<ServiceVisitResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let filter = ServiceVisitFilter {
        customer_id: query.customer_id,
        status: query.status,
        vehicle_number: query.vehicle_number,
    };

    let (visits, total) = state
        .services
        .service_visits
        .list(filter, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        visits.into_iter().map(Into::into).collect(),
        total,
        page,
        limit,
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/service-visits/{id}",
    params(("id" = Uuid, Path, description = "Service visit ID")),
    responses(
        (status = 200, description = "Service visit fetched", body = ApiResponse<ServiceVisitResponse>),
        (status = 404, description = "Service visit not found", body = crate::errors::ErrorResponse)
    ),
    tag = "service-visits"
)]
pub async fn get_service_visit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ServiceVisitResponse> {
    let visit = state.services.service_visits.get(id).await?;
    Ok(Json(ApiResponse::success(visit.into())))
}

#[utoipa::path(
    patch,
    path = "/api/v1/service-visits/{id}",
    params(("id" = Uuid, Path, description = "Service visit ID")),
    request_body = UpdateServiceVisitRequest,
    responses(
        (status = 200, description = "Service visit updated", body = ApiResponse<ServiceVisitResponse>),
        (status = 400, description = "Unmet phase requirement", body = crate::errors::ErrorResponse),
        (status = 404, description = "Service visit not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Visit changed since it was read", body = crate::errors::ErrorResponse)
    ),
    tag = "service-visits"
)]
pub async fn update_service_visit(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateServiceVisitRequest>,
) -> ApiResult<ServiceVisitResponse> {
    payload.validate()?;

    let patch = ServiceVisitPatch {
        status: payload.status,
        handlers: payload.handlers,
        before_images: payload.before_images,
        after_images: payload.after_images,
        parts_used: payload
            .parts_used
            .map(|parts| parts.into_iter().map(Into::into).collect()),
        complaint: payload.complaint,
        notes: payload.notes,
        expected_version: payload.version,
    };
    let visit = state
        .services
        .service_visits
        .update(&actor, id, patch)
        .await?;
    Ok(Json(ApiResponse::success(visit.into())))
}

#[utoipa::path(
    delete,
    path = "/api/v1/service-visits/{id}",
    params(("id" = Uuid, Path, description = "Service visit ID")),
    responses(
        (status = 200, description = "Service visit deleted", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Service visit not found", body = crate::errors::ErrorResponse)
    ),
    tag = "service-visits"
)]
pub async fn delete_service_visit(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<serde_json::Value> {
    state.services.service_visits.delete(&actor, id).await?;
    Ok(Json(ApiResponse::success(json!({ "id": id, "deleted": true }))))
}

#[utoipa::path(
    get,
    path = "/api/v1/service-visits/{id}/suggested-parts",
    params(("id" = Uuid, Path, description = "Service visit ID")),
    responses(
        (status = 200, description = "Parts selected on the serviced vehicle", body = ApiResponse<SuggestedPartsResponse>),
        (status = 404, description = "Service visit not found", body = crate::errors::ErrorResponse)
    ),
    tag = "service-visits"
)]
pub async fn get_suggested_parts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SuggestedPartsResponse> {
    let suggested = state.services.service_visits.suggested_parts(id).await?;
    Ok(Json(ApiResponse::success(suggested.into())))
}
