mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use autoshop_api::{
    entities::service_visit::VisitStatus,
    errors::ServiceError,
    services::service_visits::{NewServiceVisit, PartUsageInput, ServiceVisitPatch},
};
use common::{staff, Doubles, FailingNotifier, TestApp};

const BEFORE: &str = "https://cdn.example.com/before.jpg";
const AFTER: &str = "https://cdn.example.com/after.jpg";

fn to(status: VisitStatus) -> ServiceVisitPatch {
    ServiceVisitPatch {
        status: Some(status),
        ..Default::default()
    }
}

#[tokio::test]
async fn unverified_customer_cannot_open_a_visit() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Kiran", false).await;

    let result = app
        .state
        .services
        .service_visits
        .create(
            &staff(),
            NewServiceVisit {
                customer_id: customer.id,
                vehicle_number: "KA01AB1234".to_string(),
                status: None,
                complaint: None,
                notes: None,
                handlers: Vec::new(),
                before_images: Vec::new(),
                after_images: Vec::new(),
                parts_used: Vec::new(),
            },
        )
        .await;

    assert_matches!(result, Err(ServiceError::ValidationError(msg)) if msg.contains("not verified"));
}

#[tokio::test]
async fn working_requires_handler_and_before_image() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Kiran", true).await;
    let visit = app.open_visit(customer.id, "KA01AB1234").await;
    let visits = &app.state.services.service_visits;

    let err = visits
        .update(&staff(), visit.id, to(VisitStatus::Working))
        .await
        .unwrap_err();
    assert_matches!(&err, ServiceError::ValidationError(msg)
        if msg.contains("handler") && msg.contains("before-service image"));

    let err = visits
        .update(
            &staff(),
            visit.id,
            ServiceVisitPatch {
                status: Some(VisitStatus::Working),
                handlers: Some(vec!["Arjun".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(&err, ServiceError::ValidationError(msg) if !msg.contains("handler"));

    let working = visits
        .update(
            &staff(),
            visit.id,
            ServiceVisitPatch {
                status: Some(VisitStatus::Working),
                handlers: Some(vec!["Arjun".to_string()]),
                before_images: Some(vec![BEFORE.to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(working.status, VisitStatus::Working);
    assert!(working.stage_timestamps.working.is_some());
    assert_eq!(working.version, visit.version + 1);
}

#[tokio::test]
async fn blank_or_unknown_image_entries_do_not_count() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Kiran", true).await;
    let visit = app.open_visit(customer.id, "KA01AB1234").await;
    let visits = &app.state.services.service_visits;

    for entry in ["", "   ", "before.jpg"] {
        let result = visits
            .update(
                &staff(),
                visit.id,
                ServiceVisitPatch {
                    status: Some(VisitStatus::Working),
                    handlers: Some(vec!["Arjun".to_string()]),
                    before_images: Some(vec![entry.to_string()]),
                    ..Default::default()
                },
            )
            .await;
        assert_matches!(result, Err(ServiceError::ValidationError(_)), "{entry:?}");
    }

    let unchanged = visits.get(visit.id).await.unwrap();
    assert_eq!(unchanged.status, VisitStatus::Inquired);
    assert!(unchanged.before_images.0.is_empty());
    assert_eq!(unchanged.version, visit.version);
}

#[tokio::test]
async fn completion_requires_after_image_and_regressions_are_allowed() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Kiran", true).await;
    let visit = app.open_visit(customer.id, "KA01AB1234").await;
    let visits = &app.state.services.service_visits;

    visits
        .update(
            &staff(),
            visit.id,
            ServiceVisitPatch {
                status: Some(VisitStatus::Working),
                handlers: Some(vec!["Arjun".to_string()]),
                before_images: Some(vec![BEFORE.to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_matches!(
        visits.update(&staff(), visit.id, to(VisitStatus::Completed)).await,
        Err(ServiceError::ValidationError(msg)) if msg.contains("after-service image")
    );

    let completed = visits
        .update(
            &staff(),
            visit.id,
            ServiceVisitPatch {
                status: Some(VisitStatus::Completed),
                after_images: Some(vec![AFTER.to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(completed.status, VisitStatus::Completed);

    let reopened = visits
        .update(&staff(), visit.id, to(VisitStatus::Inquired))
        .await
        .unwrap();
    assert_eq!(reopened.status, VisitStatus::Inquired);
    assert!(reopened.stage_timestamps.completed.is_some());

    let statuses = app.notifier.visit_statuses.lock().unwrap().clone();
    assert_eq!(
        statuses,
        vec![VisitStatus::Working, VisitStatus::Completed, VisitStatus::Inquired]
    );
}

#[tokio::test]
async fn stale_version_is_rejected() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Kiran", true).await;
    let visit = app.open_visit(customer.id, "KA01AB1234").await;
    let visits = &app.state.services.service_visits;

    visits
        .update(
            &staff(),
            visit.id,
            ServiceVisitPatch {
                notes: Some("customer waiting".to_string()),
                expected_version: Some(visit.version),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let stale = visits
        .update(
            &staff(),
            visit.id,
            ServiceVisitPatch {
                notes: Some("second edit".to_string()),
                expected_version: Some(visit.version),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(stale, Err(ServiceError::ConcurrentModification(id)) if id == visit.id);
}

#[tokio::test]
async fn notification_failure_does_not_fail_the_transition() {
    let app = TestApp::with_doubles(Doubles {
        notifier: Some(Arc::new(FailingNotifier)),
        ..Default::default()
    })
    .await;
    let customer = app.seed_customer("Kiran", true).await;

    let completed = app.completed_visit(customer.id, "KA01AB1234").await;
    assert_eq!(completed.status, VisitStatus::Completed);
}

#[tokio::test]
async fn parts_used_resolve_against_products_and_catalog() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Kiran", true).await;
    let pads = app.seed_product("Ceramic Pads", 240_000, Some("6 months")).await;
    let visit = app.open_visit(customer.id, "KA01AB1234").await;
    let visits = &app.state.services.service_visits;

    let updated = visits
        .update(
            &staff(),
            visit.id,
            ServiceVisitPatch {
                parts_used: Some(vec![
                    PartUsageInput {
                        part_id: format!("product-{}", pads.id),
                        quantity: 2,
                        unit_price_cents: None,
                    },
                    PartUsageInput {
                        part_id: "engine-oil".to_string(),
                        quantity: 1,
                        unit_price_cents: Some(99_000),
                    },
                ]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let parts = &updated.parts_used.0;
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].name, "Ceramic Pads");
    assert_eq!(parts[0].unit_price_cents, 240_000);
    assert_eq!(parts[1].name, "Engine Oil");
    assert_eq!(parts[1].unit_price_cents, 99_000);

    let unknown = visits
        .update(
            &staff(),
            visit.id,
            ServiceVisitPatch {
                parts_used: Some(vec![PartUsageInput {
                    part_id: "flux-capacitor".to_string(),
                    quantity: 1,
                    unit_price_cents: None,
                }]),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(unknown, Err(ServiceError::ValidationError(msg)) if msg.contains("flux-capacitor"));
}

#[tokio::test]
async fn suggested_parts_come_from_the_vehicle_selection() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Kiran", true).await;
    let pads = app.seed_product("Ceramic Pads", 240_000, Some("6 months")).await;
    let vehicle = app
        .seed_vehicle(
            customer.id,
            "KA01AB1234",
            &[
                format!("product-{}", pads.id),
                "engine-oil".to_string(),
                "discontinued-part".to_string(),
            ],
        )
        .await;
    let visit = app.open_visit(customer.id, "KA01AB1234").await;

    let suggested = app
        .state
        .services
        .service_visits
        .suggested_parts(visit.id)
        .await
        .unwrap();

    assert_eq!(suggested.vehicle_id, Some(vehicle.id));
    assert_eq!(suggested.resolution.resolved.len(), 2);
    assert_eq!(suggested.resolution.not_found, vec!["discontinued-part".to_string()]);
    let product = suggested
        .resolution
        .get(&format!("product-{}", pads.id))
        .expect("product resolved through the legacy prefix");
    assert_eq!(product.part.persisted_id(), Some(pads.id));
}
