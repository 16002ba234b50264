pub mod coupons;
pub mod invoices;
pub mod service_visits;
pub mod warranties;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    logging::component_logger,
    services::{
        activity::{ActivityLogger, TracingActivityLogger},
        coupons::CouponService,
        invoices::{InvoiceRenderer, InvoiceService, InvoiceSettings, TextInvoiceRenderer},
        media::MediaStore,
        notifications::{LogOnlyDispatcher, NotificationDispatcher, WebhookDispatcher},
        parts::PartResolver,
        sequences::{DbSequenceGenerator, SequenceGenerator},
        service_visits::ServiceVisitService,
        warranties::WarrantyService,
        warranty_sync::WarrantySyncService,
    },
};
use slog::Logger;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Pluggable collaborators; tests swap these for failing or recording doubles.
#[derive(Clone)]
pub struct Collaborators {
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub renderer: Arc<dyn InvoiceRenderer>,
    pub activity: Arc<dyn ActivityLogger>,
    pub sequences: Arc<dyn SequenceGenerator>,
}

impl Collaborators {
    /// Production wiring derived from configuration.
    pub fn from_config(db_pool: Arc<DbPool>, config: &AppConfig, logger: &Logger) -> Self {
        let notifier: Arc<dyn NotificationDispatcher> = match config
            .notification_webhook_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
        {
            Some(url) => match WebhookDispatcher::new(url) {
                Ok(dispatcher) => Arc::new(dispatcher),
                Err(e) => {
                    slog::warn!(logger, "Notification gateway unavailable, logging only";
                        "error" => e.to_string());
                    Arc::new(LogOnlyDispatcher)
                }
            },
            None => Arc::new(LogOnlyDispatcher),
        };
        Self {
            notifier,
            renderer: Arc::new(TextInvoiceRenderer::new(&config.storage_dir)),
            activity: Arc::new(TracingActivityLogger),
            sequences: Arc::new(DbSequenceGenerator::new(db_pool)),
        }
    }
}

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub parts: Arc<PartResolver>,
    pub service_visits: Arc<ServiceVisitService>,
    pub invoices: Arc<InvoiceService>,
    pub coupons: Arc<CouponService>,
    pub warranties: Arc<WarrantyService>,
    pub warranty_sync: Arc<WarrantySyncService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        event_sender: Arc<EventSender>,
        logger: &Logger,
    ) -> Self {
        let collaborators = Collaborators::from_config(db_pool.clone(), config, logger);
        Self::with_collaborators(db_pool, config, event_sender, logger, collaborators)
    }

    pub fn with_collaborators(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        event_sender: Arc<EventSender>,
        logger: &Logger,
        collaborators: Collaborators,
    ) -> Self {
        let media = MediaStore::new(
            &config.storage_dir,
            &config.media_base_url,
            config.max_image_bytes,
        );
        let parts = PartResolver::new(db_pool.clone());
        let settings = InvoiceSettings {
            access_token_ttl: chrono::Duration::days(config.access_token_ttl_days),
            default_warranty_months: config.default_warranty_months,
        };

        let service_visits = ServiceVisitService::new(
            db_pool.clone(),
            parts.clone(),
            media.clone(),
            collaborators.notifier.clone(),
            collaborators.activity.clone(),
            component_logger(logger, "service_visits"),
        )
        .with_event_sender(event_sender.clone());
        let invoices = InvoiceService::new(
            db_pool.clone(),
            parts.clone(),
            collaborators.sequences.clone(),
            collaborators.renderer.clone(),
            collaborators.notifier.clone(),
            media.clone(),
            collaborators.activity.clone(),
            settings,
            component_logger(logger, "invoices"),
        )
        .with_event_sender(event_sender.clone());
        let coupons = CouponService::new(db_pool.clone(), collaborators.activity.clone())
            .with_event_sender(event_sender.clone());
        let warranty_sync = WarrantySyncService::new(
            db_pool.clone(),
            media,
            collaborators.activity,
            component_logger(logger, "warranty_sync"),
        )
        .with_event_sender(event_sender);

        Self {
            parts: Arc::new(parts),
            service_visits: Arc::new(service_visits),
            invoices: Arc::new(invoices),
            coupons: Arc::new(coupons),
            warranties: Arc::new(WarrantyService::new(db_pool)),
            warranty_sync: Arc::new(warranty_sync),
        }
    }
}
