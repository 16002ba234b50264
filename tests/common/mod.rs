#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use autoshop_api::{
    auth::{Actor, USER_ID_HEADER, USER_NAME_HEADER, USER_ROLE_HEADER},
    config::AppConfig,
    db,
    entities::{
        coupon::{self, DiscountType},
        customer, invoice, product, service_visit,
        vehicle::{self, SelectedParts, WarrantyCards},
    },
    events::{self, EventSender},
    handlers::{AppServices, Collaborators},
    logging,
    services::{
        coupons::NewCoupon,
        invoices::{InvoiceDocument, InvoiceRenderer, LineItemInput, NewInvoice, RenderError},
        notifications::{NotificationDispatcher, NotificationError, NotificationReport},
        service_visits::{NewServiceVisit, ServiceVisitPatch},
    },
    AppState,
};
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub fn manager() -> Actor {
    Actor::new("u-manager", "Meera", "manager")
}

pub fn staff() -> Actor {
    Actor::new("u-staff", "Arjun", "staff")
}

/// Records every notification instead of delivering it.
#[derive(Default)]
pub struct RecordingNotifier {
    pub visit_statuses: Mutex<Vec<service_visit::VisitStatus>>,
    pub invoices: Mutex<Vec<(Uuid, Option<PathBuf>)>>,
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn notify_service_visit_status(
        &self,
        _visit: &service_visit::Model,
        _customer_name: &str,
        status: service_visit::VisitStatus,
    ) -> Result<(), NotificationError> {
        self.visit_statuses.lock().unwrap().push(status);
        Ok(())
    }

    async fn send_invoice_notifications(
        &self,
        invoice: &invoice::Model,
        document: Option<&Path>,
    ) -> NotificationReport {
        self.invoices
            .lock()
            .unwrap()
            .push((invoice.id, document.map(Path::to_path_buf)));
        NotificationReport {
            email: invoice.customer_details.email.is_some(),
            whatsapp: true,
            errors: Vec::new(),
        }
    }
}

/// A gateway that is down.
pub struct FailingNotifier;

#[async_trait]
impl NotificationDispatcher for FailingNotifier {
    async fn notify_service_visit_status(
        &self,
        visit: &service_visit::Model,
        _customer_name: &str,
        _status: service_visit::VisitStatus,
    ) -> Result<(), NotificationError> {
        Err(NotificationError::Rejected(format!("visit {}", visit.id)))
    }

    async fn send_invoice_notifications(
        &self,
        _invoice: &invoice::Model,
        _document: Option<&Path>,
    ) -> NotificationReport {
        NotificationReport {
            email: false,
            whatsapp: false,
            errors: vec!["gateway unreachable".to_string()],
        }
    }
}

pub struct FailingRenderer;

#[async_trait]
impl InvoiceRenderer for FailingRenderer {
    async fn render(&self, _document: &InvoiceDocument) -> Result<PathBuf, RenderError> {
        Err(RenderError::Layout("template missing".to_string()))
    }
}

#[derive(Default)]
pub struct Doubles {
    pub renderer: Option<Arc<dyn InvoiceRenderer>>,
    pub notifier: Option<Arc<dyn NotificationDispatcher>>,
}

/// Application wired against a private in-memory database and storage directory.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub notifier: Arc<RecordingNotifier>,
    storage: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_doubles(Doubles::default()).await
    }

    pub async fn with_doubles(doubles: Doubles) -> Self {
        let storage = tempfile::tempdir().expect("temp storage dir");
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.storage_dir = storage.path().to_string_lossy().into_owned();

        let pool = db::connect_in_memory()
            .await
            .expect("in-memory database with schema");
        let db_arc = Arc::new(pool);

        let (event_sender, event_rx) = events::channel(256);
        let event_sender: Arc<EventSender> = Arc::new(event_sender);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let logger = logging::discard_logger();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut collaborators = Collaborators::from_config(db_arc.clone(), &cfg, &logger);
        collaborators.notifier = doubles.notifier.unwrap_or_else(|| notifier.clone());
        if let Some(renderer) = doubles.renderer {
            collaborators.renderer = renderer;
        }

        let services = AppServices::with_collaborators(
            db_arc.clone(),
            &cfg,
            event_sender.clone(),
            &logger,
            collaborators,
        );
        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        Self {
            router: autoshop_api::app_router(state.clone()),
            state,
            notifier,
            storage,
            _event_task: event_task,
        }
    }

    pub fn storage_dir(&self) -> &Path {
        self.storage.path()
    }

    /// Sends a request, with gateway identity headers when `actor` is given.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        actor: Option<&Actor>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            builder = builder
                .header(USER_ID_HEADER, actor.user_id.as_str())
                .header(USER_NAME_HEADER, actor.user_name.as_str())
                .header(USER_ROLE_HEADER, actor.user_role.as_str());
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router error during test request")
    }

    pub async fn seed_customer(&self, name: &str, verified: bool) -> customer::Model {
        customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            email: Set(Some(format!("{}@example.com", name.to_lowercase()))),
            phone: Set("+919800000001".to_string()),
            address: Set(None),
            is_verified: Set(verified),
            ..Default::default()
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed customer")
    }

    pub async fn seed_vehicle(
        &self,
        customer_id: Uuid,
        registration: &str,
        selected: &[String],
    ) -> vehicle::Model {
        vehicle::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            registration_number: Set(registration.to_string()),
            make: Set(Some("Maruti".to_string())),
            model: Set(Some("Swift".to_string())),
            year: Set(Some(2019)),
            selected_parts: Set(SelectedParts(selected.to_vec())),
            warranty_cards: Set(WarrantyCards::default()),
            ..Default::default()
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed vehicle")
    }

    pub async fn seed_product(
        &self,
        name: &str,
        price_cents: i64,
        warranty: Option<&str>,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            category: Set("Brakes".to_string()),
            brand: Set(Some("Bosch".to_string())),
            selling_price_cents: Set(price_cents),
            stock: Set(10),
            warranty: Set(warranty.map(str::to_string)),
            ..Default::default()
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed product")
    }

    pub async fn seed_coupon(
        &self,
        code: &str,
        discount_type: DiscountType,
        value: i64,
        usage_limit: Option<i32>,
        per_customer_limit: Option<i32>,
    ) -> coupon::Model {
        self.state
            .services
            .coupons
            .create(
                &manager(),
                NewCoupon {
                    code: code.to_string(),
                    description: None,
                    discount_type,
                    discount_value: value,
                    max_discount_cents: None,
                    min_purchase_cents: 0,
                    usage_limit,
                    per_customer_limit,
                    valid_from: None,
                    valid_until: None,
                    is_active: true,
                },
            )
            .await
            .expect("seed coupon")
    }

    pub async fn open_visit(&self, customer_id: Uuid, registration: &str) -> service_visit::Model {
        self.state
            .services
            .service_visits
            .create(
                &staff(),
                NewServiceVisit {
                    customer_id,
                    vehicle_number: registration.to_string(),
                    status: None,
                    complaint: Some("Squealing brakes".to_string()),
                    notes: None,
                    handlers: Vec::new(),
                    before_images: Vec::new(),
                    after_images: Vec::new(),
                    parts_used: Vec::new(),
                },
            )
            .await
            .expect("open visit")
    }

    /// Opens a visit and walks it to completed.
    pub async fn completed_visit(
        &self,
        customer_id: Uuid,
        registration: &str,
    ) -> service_visit::Model {
        let visit = self.open_visit(customer_id, registration).await;
        self.state
            .services
            .service_visits
            .update(
                &staff(),
                visit.id,
                ServiceVisitPatch {
                    status: Some(service_visit::VisitStatus::Completed),
                    handlers: Some(vec!["Arjun".to_string()]),
                    after_images: Some(vec!["https://cdn.example.com/after.jpg".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .expect("complete visit")
    }

    /// Raises a pending invoice with a single product line.
    pub async fn invoice_for(
        &self,
        visit_id: Uuid,
        part_id: &str,
        total_cents: i64,
        coupon_code: Option<&str>,
    ) -> invoice::Model {
        self.state
            .services
            .invoices
            .create_from_service_visit(
                &staff(),
                NewInvoice {
                    service_visit_id: visit_id,
                    items: vec![product_line(part_id, total_cents, true)],
                    coupon_code: coupon_code.map(str::to_string),
                    discount: None,
                    tax_rate_bps: 0,
                    notes: None,
                    terms: None,
                    save_as_draft: false,
                },
            )
            .await
            .expect("raise invoice")
    }

    pub async fn reload_vehicle(&self, id: Uuid) -> vehicle::Model {
        vehicle::Entity::find_by_id(id)
            .one(self.state.db.as_ref())
            .await
            .expect("load vehicle")
            .expect("vehicle exists")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn product_line(part_id: &str, total_cents: i64, has_warranty: bool) -> LineItemInput {
    LineItemInput {
        kind: autoshop_api::entities::invoice::LineItemKind::Product,
        part_id: Some(part_id.to_string()),
        name: None,
        quantity: 1,
        unit_price_cents: total_cents,
        tax_cents: 0,
        total_cents,
        has_warranty,
    }
}

pub async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}
