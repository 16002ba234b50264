use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Autoshop API",
        version = "0.1.0",
        description = r#"
# Autoshop Workshop API

Service-to-invoice workflow for a vehicle workshop.

- **Service visits**: intake, stage tracking from inquired to completed, photos and parts used
- **Invoices**: raised from completed visits, submitted, approved or rejected by a manager
- **Coupons**: validated and redeemed atomically when an invoice is raised
- **Payments**: ledger entries against approved invoices; `due = total - paid` always holds
- **Warranties**: created per warranty-bearing product line on approval; warranty cards
  uploaded per line are mirrored onto the customer's matching vehicles

## Caller identity

Requests are authenticated upstream. The gateway forwards the caller in
`X-User-Id`, `X-User-Name` and `X-User-Role` headers. Approving, rejecting or deleting
invoices and managing coupons require the `manager` or `admin` role.

## Public documents

`GET /public/invoices/{id}/document?token=...` serves an approved invoice with the
access token issued on approval. Tokens expire after the configured number of days.
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "service-visits", description = "Service visit intake and stage tracking"),
        (name = "invoices", description = "Invoice lifecycle"),
        (name = "payments", description = "Payment status and ledger"),
        (name = "coupons", description = "Coupon management and validation"),
        (name = "warranties", description = "Warranties and warranty cards")
    ),
    paths(
        crate::handlers::service_visits::create_service_visit,
        crate::handlers::service_visits::list_service_visits,
        crate::handlers::service_visits::get_service_visit,
        crate::handlers::service_visits::update_service_visit,
        crate::handlers::service_visits::delete_service_visit,
        crate::handlers::service_visits::get_suggested_parts,

        crate::handlers::invoices::create_invoice,
        crate::handlers::invoices::list_invoices,
        crate::handlers::invoices::get_invoice,
        crate::handlers::invoices::submit_invoice,
        crate::handlers::invoices::approve_invoice,
        crate::handlers::invoices::reject_invoice,
        crate::handlers::invoices::delete_invoice,
        crate::handlers::invoices::set_payment_status,
        crate::handlers::invoices::record_payment,
        crate::handlers::invoices::list_payments,
        crate::handlers::invoices::download_document,
        crate::handlers::invoices::download_public_document,

        crate::handlers::coupons::validate_coupon,
        crate::handlers::coupons::create_coupon,
        crate::handlers::coupons::update_coupon,
        crate::handlers::coupons::get_coupon,
        crate::handlers::coupons::get_coupon_by_code,
        crate::handlers::coupons::list_coupon_usages,

        crate::handlers::warranties::get_warranty,
        crate::handlers::warranties::list_invoice_warranties,
        crate::handlers::warranties::list_customer_warranties,
        crate::handlers::warranties::upload_warranty_card,
        crate::handlers::warranties::list_warranty_cards,
    ),
    components(
        schemas(
            crate::entities::service_visit::VisitStatus,
            crate::entities::service_visit::StageTimestamps,
            crate::entities::service_visit::PartUsage,
            crate::handlers::service_visits::CreateServiceVisitRequest,
            crate::handlers::service_visits::UpdateServiceVisitRequest,
            crate::handlers::service_visits::ServiceVisitResponse,
            crate::handlers::service_visits::SuggestedPartsResponse,

            crate::entities::invoice::InvoiceStatus,
            crate::entities::invoice::PaymentStatus,
            crate::entities::invoice::LineItemKind,
            crate::entities::invoice::ApprovalReport,
            crate::entities::invoice_payment::PaymentMode,
            crate::handlers::invoices::CreateInvoiceRequest,
            crate::handlers::invoices::RejectInvoiceRequest,
            crate::handlers::invoices::PaymentStatusRequest,
            crate::handlers::invoices::RecordPaymentRequest,
            crate::handlers::invoices::InvoiceResponse,
            crate::handlers::invoices::ApprovalResponse,
            crate::handlers::invoices::PaymentReceiptResponse,

            crate::entities::coupon::DiscountType,
            crate::handlers::coupons::ValidateCouponRequest,
            crate::handlers::coupons::CouponValidationResponse,
            crate::handlers::coupons::CreateCouponRequest,
            crate::handlers::coupons::UpdateCouponRequest,
            crate::handlers::coupons::CouponResponse,
            crate::handlers::coupons::CouponUsageResponse,

            crate::entities::warranty::WarrantyStatus,
            crate::services::warranty_sync::SyncSkipReason,
            crate::handlers::warranties::WarrantyResponse,
            crate::handlers::warranties::UploadWarrantyCardRequest,
            crate::handlers::warranties::WarrantyCardUploadResponse,

            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
