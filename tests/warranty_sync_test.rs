mod common;

use assert_matches::assert_matches;
use autoshop_api::{
    entities::warranty::WarrantyStatus,
    errors::ServiceError,
    services::{invoices::NewInvoice, warranty_sync::SyncSkipReason},
};
use axum::http::{Method, StatusCode};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Months;
use common::{json_body, manager, product_line, staff, TestApp};
use serde_json::json;
use tokio::task::JoinSet;

const CARD: &[u8] = b"%PDF-1.4 warranty card";

#[tokio::test]
async fn approval_creates_warranties_for_persisted_products_only() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Farah", true).await;
    let pads = app.seed_product("Ceramic Pads", 240_000, Some("6 months")).await;
    let wipers = app.seed_product("Wiper Blades", 80_000, None).await;
    let visit = app.completed_visit(customer.id, "GJ01ZZ1111").await;

    let invoice = app
        .state
        .services
        .invoices
        .create_from_service_visit(
            &staff(),
            NewInvoice {
                service_visit_id: visit.id,
                items: vec![
                    product_line(&pads.id.to_string(), 240_000, true),
                    product_line("battery", 650_000, true),
                    product_line("engine-oil", 120_000, false),
                    product_line(&wipers.id.to_string(), 80_000, true),
                ],
                coupon_code: None,
                discount: None,
                tax_rate_bps: 0,
                notes: None,
                terms: None,
                save_as_draft: false,
            },
        )
        .await
        .unwrap();

    let outcome = app
        .state
        .services
        .invoices
        .approve(&manager(), invoice.id)
        .await
        .unwrap();
    assert!(outcome.report.warranties.ok);
    assert_eq!(outcome.report.warranties_created, 2);

    let warranties = app
        .state
        .services
        .warranties
        .list_for_invoice(invoice.id)
        .await
        .unwrap();
    assert_eq!(warranties.len(), 2);

    let pads_warranty = &warranties[0];
    assert_eq!(pads_warranty.line_index, 0);
    assert_eq!(pads_warranty.product_id, pads.id.to_string());
    assert_eq!(pads_warranty.duration_months, 6);
    assert_eq!(pads_warranty.status, WarrantyStatus::Active);
    assert_eq!(
        pads_warranty.end_date,
        pads_warranty.start_date.checked_add_months(Months::new(6)).unwrap()
    );
    assert!(pads_warranty.warranty_number.starts_with("WRN-"));

    let wipers_warranty = &warranties[1];
    assert_eq!(wipers_warranty.line_index, 3);
    assert_eq!(wipers_warranty.duration_months, 12);
    assert!(warranties.iter().all(|w| w.product_id != "battery"));

    let for_customer = app
        .state
        .services
        .warranties
        .list_for_customer(customer.id)
        .await
        .unwrap();
    assert_eq!(for_customer.len(), 2);
}

#[tokio::test]
async fn card_is_mirrored_onto_the_vehicle_that_selected_the_part() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Farah", true).await;
    let pads = app.seed_product("Ceramic Pads", 240_000, Some("6 months")).await;
    let vehicle = app
        .seed_vehicle(customer.id, "GJ01ZZ1111", &[format!("product-{}", pads.id)])
        .await;
    let visit = app.completed_visit(customer.id, "GJ01ZZ1111").await;
    let invoice = app
        .invoice_for(visit.id, &pads.id.to_string(), 240_000, None)
        .await;
    let sync = &app.state.services.warranty_sync;

    let first = sync
        .upload_card(&staff(), invoice.id, 0, CARD.to_vec(), "card.pdf")
        .await
        .unwrap();
    assert_eq!(first.synced_vehicle_ids, vec![vehicle.id]);
    assert_eq!(first.sync_skipped, None);

    let second = sync
        .upload_card(&staff(), invoice.id, 0, b"re-scanned card".to_vec(), "card-v2.pdf")
        .await
        .unwrap();
    assert_eq!(second.synced_vehicle_ids, vec![vehicle.id]);

    let reloaded = app.reload_vehicle(vehicle.id).await;
    assert_eq!(reloaded.warranty_cards.0.len(), 1);
    let mirrored = &reloaded.warranty_cards.0[0];
    assert_eq!(mirrored.part_id, pads.id.to_string());
    assert_eq!(mirrored.file_name, "card-v2.pdf");
    assert_eq!(mirrored.file_url, second.card.url);
    assert_eq!(mirrored.invoice_id, invoice.id);

    let lines = sync.list_cards(invoice.id).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].cards.len(), 2);
    assert_eq!(lines[0].part_id, Some(pads.id.to_string()));

    let stored = app
        .storage_dir()
        .join("warranty-cards")
        .join(invoice.id.to_string());
    let files = std::fs::read_dir(stored).unwrap().count();
    assert_eq!(files, 2);
}

#[tokio::test]
async fn vehicles_without_the_part_are_left_alone() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Farah", true).await;
    let pads = app.seed_product("Ceramic Pads", 240_000, None).await;
    let vehicle = app
        .seed_vehicle(customer.id, "GJ01ZZ1111", &["engine-oil".to_string()])
        .await;
    let visit = app.completed_visit(customer.id, "GJ01ZZ1111").await;
    let invoice = app
        .invoice_for(visit.id, &pads.id.to_string(), 240_000, None)
        .await;

    let upload = app
        .state
        .services
        .warranty_sync
        .upload_card(&staff(), invoice.id, 0, CARD.to_vec(), "card.pdf")
        .await
        .unwrap();

    assert!(upload.synced_vehicle_ids.is_empty());
    assert_eq!(upload.sync_skipped, Some(SyncSkipReason::NoMatchingVehicle));
    assert!(app.reload_vehicle(vehicle.id).await.warranty_cards.0.is_empty());
}

#[tokio::test]
async fn catalog_parts_and_vehicleless_invoices_skip_sync() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Farah", true).await;
    let pads = app.seed_product("Ceramic Pads", 240_000, None).await;
    let visit = app.completed_visit(customer.id, "GJ01ZZ1111").await;
    let sync = &app.state.services.warranty_sync;

    let catalog_invoice = app.invoice_for(visit.id, "battery", 650_000, None).await;
    let upload = sync
        .upload_card(&staff(), catalog_invoice.id, 0, CARD.to_vec(), "card.pdf")
        .await
        .unwrap();
    assert_eq!(upload.sync_skipped, Some(SyncSkipReason::NotPersistedProduct));

    let product_invoice = app
        .invoice_for(visit.id, &pads.id.to_string(), 240_000, None)
        .await;
    assert!(product_invoice.vehicle_details.0.is_empty());
    let upload = sync
        .upload_card(&staff(), product_invoice.id, 0, CARD.to_vec(), "card.pdf")
        .await
        .unwrap();
    assert_eq!(upload.sync_skipped, Some(SyncSkipReason::NoVehicleSnapshot));
    assert_eq!(sync.list_cards(product_invoice.id).await.unwrap()[0].cards.len(), 1);
}

#[tokio::test]
async fn out_of_range_line_is_rejected() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Farah", true).await;
    let visit = app.completed_visit(customer.id, "GJ01ZZ1111").await;
    let invoice = app.invoice_for(visit.id, "battery", 650_000, None).await;

    let result = app
        .state
        .services
        .warranty_sync
        .upload_card(&staff(), invoice.id, 3, CARD.to_vec(), "card.pdf")
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(msg)) if msg.contains("out of range"));
}

#[tokio::test]
async fn upload_route_decodes_base64_payloads() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Farah", true).await;
    let pads = app.seed_product("Ceramic Pads", 240_000, None).await;
    let vehicle = app
        .seed_vehicle(customer.id, "GJ01ZZ1111", &[pads.id.to_string()])
        .await;
    let visit = app.completed_visit(customer.id, "GJ01ZZ1111").await;
    let invoice = app
        .invoice_for(visit.id, &pads.id.to_string(), 240_000, None)
        .await;
    let uri = format!("/api/v1/invoices/{}/items/0/warranty-card", invoice.id);

    let bad = app
        .request(
            Method::POST,
            &uri,
            Some(json!({ "filename": "card.pdf", "content_base64": "***" })),
            Some(&staff()),
        )
        .await;
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

    let ok = app
        .request(
            Method::POST,
            &uri,
            Some(json!({ "filename": "card.pdf", "content_base64": STANDARD.encode(CARD) })),
            Some(&staff()),
        )
        .await;
    assert_eq!(ok.status(), StatusCode::OK);
    let body = json_body(ok).await;
    assert_eq!(body["data"]["synced_vehicle_ids"], json!([vehicle.id]));

    let cards = app
        .request(
            Method::GET,
            &format!("/api/v1/invoices/{}/warranty-cards", invoice.id),
            None,
            Some(&staff()),
        )
        .await;
    assert_eq!(cards.status(), StatusCode::OK);
}

#[tokio::test]
async fn concurrent_uploads_for_one_vehicle_keep_every_card() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Farah", true).await;
    let pads = app.seed_product("Ceramic Pads", 240_000, Some("6 months")).await;
    let battery = app.seed_product("Exide Battery", 650_000, Some("24 months")).await;
    let vehicle = app
        .seed_vehicle(
            customer.id,
            "GJ01ZZ1111",
            &[pads.id.to_string(), battery.id.to_string()],
        )
        .await;
    let visit = app.completed_visit(customer.id, "GJ01ZZ1111").await;
    let first = app
        .invoice_for(visit.id, &pads.id.to_string(), 240_000, None)
        .await;
    let second = app
        .invoice_for(visit.id, &battery.id.to_string(), 650_000, None)
        .await;

    let mut uploads = JoinSet::new();
    for invoice_id in [first.id, second.id] {
        let sync = app.state.services.warranty_sync.clone();
        uploads.spawn(async move {
            sync.upload_card(&staff(), invoice_id, 0, CARD.to_vec(), "card.pdf")
                .await
        });
    }
    while let Some(joined) = uploads.join_next().await {
        let upload = joined.expect("task panicked").expect("card uploaded");
        assert_eq!(upload.synced_vehicle_ids, vec![vehicle.id]);
    }

    let reloaded = app.reload_vehicle(vehicle.id).await;
    assert_eq!(reloaded.warranty_cards.0.len(), 2);
    assert!(reloaded.warranty_cards.for_part(&pads.id.to_string()).is_some());
    assert!(reloaded.warranty_cards.for_part(&battery.id.to_string()).is_some());
    assert_eq!(reloaded.version, vehicle.version + 2);
}
