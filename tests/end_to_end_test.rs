mod common;

use axum::body::to_bytes;
use axum::http::{header, Method, StatusCode};
use common::{json_body, manager, staff, TestApp};
use serde_json::{json, Value};

async fn ok_data(response: axum::response::Response) -> Value {
    assert_eq!(response.status(), StatusCode::OK, "unexpected status");
    let body = json_body(response).await;
    assert_eq!(body["success"], json!(true));
    body["data"].clone()
}

#[tokio::test]
async fn visit_to_paid_invoice_over_http() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Vikram", true).await;
    let pads = app.seed_product("Ceramic Pads", 50_000, Some("6 months")).await;
    let vehicle = app
        .seed_vehicle(customer.id, "KA05MN7777", &[pads.id.to_string()])
        .await;
    let staff = staff();
    let manager = manager();

    let visit = ok_data(
        app.request(
            Method::POST,
            "/api/v1/service-visits",
            Some(json!({
                "customer_id": customer.id,
                "vehicle_number": "KA05MN7777",
                "complaint": "Grinding noise when braking"
            })),
            Some(&staff),
        )
        .await,
    )
    .await;
    assert_eq!(visit["status"], json!("inquired"));
    let visit_id = visit["id"].as_str().unwrap().to_string();

    let suggested = ok_data(
        app.request(
            Method::GET,
            &format!("/api/v1/service-visits/{visit_id}/suggested-parts"),
            None,
            Some(&staff),
        )
        .await,
    )
    .await;
    assert_eq!(suggested["vehicle_id"], json!(vehicle.id));

    let working = ok_data(
        app.request(
            Method::PATCH,
            &format!("/api/v1/service-visits/{visit_id}"),
            Some(json!({
                "status": "working",
                "handlers": ["Arjun"],
                "before_images": ["https://cdn.example.com/v/before-1.jpg"]
            })),
            Some(&staff),
        )
        .await,
    )
    .await;
    assert_eq!(working["status"], json!("working"));

    let completed = ok_data(
        app.request(
            Method::PATCH,
            &format!("/api/v1/service-visits/{visit_id}"),
            Some(json!({
                "status": "completed",
                "after_images": ["https://cdn.example.com/v/after-1.jpg"],
                "parts_used": [{ "part_id": pads.id, "quantity": 1 }]
            })),
            Some(&staff),
        )
        .await,
    )
    .await;
    assert_eq!(completed["status"], json!("completed"));

    let invoice = ok_data(
        app.request(
            Method::POST,
            "/api/v1/invoices",
            Some(json!({
                "service_visit_id": visit_id,
                "items": [{
                    "part_id": pads.id,
                    "quantity": 1,
                    "unit_price_cents": 50_000,
                    "total_cents": 50_000,
                    "has_warranty": true
                }]
            })),
            Some(&staff),
        )
        .await,
    )
    .await;
    assert_eq!(invoice["status"], json!("pending_approval"));
    assert_eq!(invoice["total_cents"], json!(50_000));
    let invoice_id = invoice["id"].as_str().unwrap().to_string();

    let forbidden = app
        .request(
            Method::POST,
            &format!("/api/v1/invoices/{invoice_id}/approve"),
            None,
            Some(&staff),
        )
        .await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let approval = ok_data(
        app.request(
            Method::POST,
            &format!("/api/v1/invoices/{invoice_id}/approve"),
            None,
            Some(&manager),
        )
        .await,
    )
    .await;
    assert_eq!(approval["invoice"]["status"], json!("approved"));
    assert_eq!(approval["report"]["document"]["ok"], json!(true));
    assert_eq!(approval["report"]["warranties_created"], json!(1));
    assert_eq!(approval["warranties"][0]["product_id"], json!(pads.id.to_string()));
    assert_eq!(approval["warranties"][0]["duration_months"], json!(6));
    let token = approval["invoice"]["access_token"].as_str().unwrap().to_string();

    let customer_warranties = ok_data(
        app.request(
            Method::GET,
            &format!("/api/v1/customers/{}/warranties", customer.id),
            None,
            Some(&staff),
        )
        .await,
    )
    .await;
    assert_eq!(customer_warranties.as_array().map(Vec::len), Some(1));
    assert_eq!(customer_warranties[0]["in_force"], json!(true));

    let partial = ok_data(
        app.request(
            Method::POST,
            &format!("/api/v1/invoices/{invoice_id}/payments"),
            Some(json!({ "amount_cents": 30_000, "mode": "cash" })),
            Some(&staff),
        )
        .await,
    )
    .await;
    assert_eq!(partial["invoice"]["payment_status"], json!("partial"));
    assert_eq!(partial["invoice"]["due_cents"], json!(20_000));

    let settled = ok_data(
        app.request(
            Method::POST,
            &format!("/api/v1/invoices/{invoice_id}/payments"),
            Some(json!({ "amount_cents": 20_000, "mode": "upi", "transaction_id": "UPI-1" })),
            Some(&staff),
        )
        .await,
    )
    .await;
    assert_eq!(settled["invoice"]["payment_status"], json!("paid"));
    assert_eq!(settled["invoice"]["paid_cents"], json!(50_000));
    assert_eq!(settled["invoice"]["due_cents"], json!(0));

    let ledger = ok_data(
        app.request(
            Method::GET,
            &format!("/api/v1/invoices/{invoice_id}/payments"),
            None,
            Some(&staff),
        )
        .await,
    )
    .await;
    assert_eq!(ledger.as_array().map(Vec::len), Some(2));

    let document = app
        .request(
            Method::GET,
            &format!("/public/invoices/{invoice_id}/document?token={token}"),
            None,
            None,
        )
        .await;
    assert_eq!(document.status(), StatusCode::OK);
    assert!(document
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains(".txt")));
    let bytes = to_bytes(document.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains(invoice["invoice_number"].as_str().unwrap()));
    assert!(text.contains("Vikram"));
}
