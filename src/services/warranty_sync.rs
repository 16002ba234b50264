//! Warranty card uploads and their propagation to the customer's vehicles.
//!
//! A card always lands on the invoice line first. It is mirrored onto a vehicle only
//! when the line is a persisted product the vehicle has selected, and the vehicle is
//! one the invoice was raised for. Uploads for one invoice are serialized, and so are
//! card writes to one vehicle; each vehicle write also carries a version guard.

use crate::{
    auth::Actor,
    db::DbPool,
    entities::{
        invoice::{self, ItemWarrantyCard, LineItems},
        vehicle::{self, VehicleWarrantyCard},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        activity::{ActivityEntry, ActivityLogger},
        locks::KeyedLocks,
        media::MediaStore,
        parts::selection_keys,
    },
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveValue::Unchanged, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use serde::Serialize;
use serde_json::json;
use slog::Logger;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Why an uploaded card was not mirrored onto any vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncSkipReason {
    /// Labour line or catalog part
    NotPersistedProduct,
    NoVehicleSnapshot,
    NoMatchingVehicle,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct WarrantyCardUpload {
    pub invoice_id: Uuid,
    pub item_index: usize,
    pub card: ItemWarrantyCard,
    pub synced_vehicle_ids: Vec<Uuid>,
    pub sync_skipped: Option<SyncSkipReason>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct LineWarrantyCards {
    pub item_index: usize,
    pub name: String,
    pub part_id: Option<String>,
    pub cards: Vec<ItemWarrantyCard>,
}

#[derive(Clone)]
pub struct WarrantySyncService {
    db_pool: Arc<DbPool>,
    media: MediaStore,
    locks: Arc<KeyedLocks>,
    vehicle_locks: Arc<KeyedLocks>,
    activity: Arc<dyn ActivityLogger>,
    event_sender: Option<Arc<EventSender>>,
    logger: Logger,
}

impl WarrantySyncService {
    pub fn new(
        db_pool: Arc<DbPool>,
        media: MediaStore,
        activity: Arc<dyn ActivityLogger>,
        logger: Logger,
    ) -> Self {
        Self {
            db_pool,
            media,
            locks: Arc::new(KeyedLocks::new()),
            vehicle_locks: Arc::new(KeyedLocks::new()),
            activity,
            event_sender: None,
            logger,
        }
    }

    pub fn with_event_sender(mut self, event_sender: Arc<EventSender>) -> Self {
        self.event_sender = Some(event_sender);
        self
    }

    /// Stores a card for one invoice line and mirrors it onto matching vehicles.
    ///
    /// A skipped sync is not an error: the upload succeeds and the reason is
    /// returned.
    #[instrument(skip(self, actor, bytes), fields(size = bytes.len()))]
    pub async fn upload_card(
        &self,
        actor: &Actor,
        invoice_id: Uuid,
        item_index: usize,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<WarrantyCardUpload, ServiceError> {
        let guard = self.locks.acquire(invoice_id).await;
        let result = self
            .upload_locked(actor, invoice_id, item_index, bytes, filename)
            .await;
        drop(guard);
        result
    }

    async fn upload_locked(
        &self,
        actor: &Actor,
        invoice_id: Uuid,
        item_index: usize,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<WarrantyCardUpload, ServiceError> {
        let db = self.db_pool.as_ref();

        let invoice = invoice::Entity::find_by_id(invoice_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Invoice {} not found", invoice_id)))?;
        let Some(item) = invoice.items.0.get(item_index) else {
            return Err(ServiceError::ValidationError(format!(
                "item index {} is out of range; invoice {} has {} items",
                item_index,
                invoice.invoice_number,
                invoice.items.0.len()
            )));
        };
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(ServiceError::ValidationError("a file name is required".to_string()));
        }

        let stored = self
            .media
            .store_file(&format!("warranty-cards/{}", invoice_id), filename, &bytes)
            .await?;
        let card = ItemWarrantyCard {
            url: stored.url,
            filename: filename.to_string(),
            uploaded_at: Utc::now(),
        };

        let targets = match item.part.as_ref().and_then(|part| part.persisted_id()) {
            None => Err(SyncSkipReason::NotPersistedProduct),
            Some(_) if invoice.vehicle_details.0.is_empty() => {
                Err(SyncSkipReason::NoVehicleSnapshot)
            }
            Some(product_id) => {
                let matched = self.matching_vehicles(&invoice, product_id).await?;
                if matched.is_empty() {
                    Err(SyncSkipReason::NoMatchingVehicle)
                } else {
                    Ok(matched)
                }
            }
        };

        let _vehicle_guards = match &targets {
            Ok(vehicle_ids) => self.vehicle_locks.acquire_many(vehicle_ids.iter().copied()).await,
            Err(_) => Vec::new(),
        };

        let mut items = invoice.items.0.clone();
        items[item_index].warranty_cards.push(card.clone());
        let part_id = item.part.as_ref().map(|part| part.canonical_id());
        let part_name = item.name.clone();

        let txn = db.begin().await.map_err(ServiceError::db_error)?;
        let active = invoice::ActiveModel {
            id: Unchanged(invoice.id),
            items: Set(LineItems(items)),
            version: Set(invoice.version + 1),
            updated_at: Set(card.uploaded_at),
            ..Default::default()
        };
        invoice::Entity::update(active)
            .filter(invoice::Column::Version.eq(invoice.version))
            .exec(&txn)
            .await
            .map_err(|e| ServiceError::from_guarded_update(e, invoice.id))?;

        let mut synced_vehicle_ids = Vec::new();
        if let (Ok(vehicle_ids), Some(part_id)) = (&targets, &part_id) {
            for vehicle_id in vehicle_ids {
                // re-read inside the transaction so a concurrent upsert is never overwritten
                let Some(current) = vehicle::Entity::find_by_id(*vehicle_id)
                    .one(&txn)
                    .await
                    .map_err(ServiceError::db_error)?
                else {
                    continue;
                };
                let mut cards = current.warranty_cards.clone();
                cards.upsert(VehicleWarrantyCard {
                    part_id: part_id.clone(),
                    part_name: part_name.clone(),
                    file_url: card.url.clone(),
                    file_name: card.filename.clone(),
                    invoice_id: invoice.id,
                    uploaded_at: card.uploaded_at,
                });
                let active = vehicle::ActiveModel {
                    id: Unchanged(current.id),
                    warranty_cards: Set(cards),
                    version: Set(current.version + 1),
                    updated_at: Set(card.uploaded_at),
                    ..Default::default()
                };
                vehicle::Entity::update(active)
                    .filter(vehicle::Column::Version.eq(current.version))
                    .exec(&txn)
                    .await
                    .map_err(|e| ServiceError::from_guarded_update(e, current.id))?;
                synced_vehicle_ids.push(current.id);
            }
        }
        txn.commit().await.map_err(ServiceError::db_error)?;

        let sync_skipped = targets.err();
        if let Some(reason) = sync_skipped {
            slog::warn!(self.logger, "Warranty card not synced to any vehicle";
                "invoice_id" => invoice.id.to_string(),
                "item_index" => item_index,
                "reason" => reason.to_string());
            counter!("autoshop.warranty_sync.skipped", 1, "reason" => reason.to_string());
        } else {
            counter!("autoshop.warranty_sync.synced", synced_vehicle_ids.len() as u64);
        }
        info!(
            invoice_id = %invoice.id,
            item_index,
            vehicles = synced_vehicle_ids.len(),
            "Warranty card uploaded"
        );
        self.publish(Event::WarrantyCardUploaded {
            invoice_id: invoice.id,
            item_index,
            vehicles_synced: synced_vehicle_ids.len(),
        })
        .await;
        self.activity
            .log_activity(
                ActivityEntry::new(
                    actor,
                    "upload_warranty_card",
                    "invoice",
                    invoice.id,
                    format!(
                        "Uploaded warranty card for {} on {}",
                        part_name, invoice.invoice_number
                    ),
                )
                .with_details(json!({
                    "item_index": item_index,
                    "synced_vehicle_ids": synced_vehicle_ids,
                    "sync_skipped": sync_skipped,
                })),
            )
            .await;

        Ok(WarrantyCardUpload {
            invoice_id: invoice.id,
            item_index,
            card,
            synced_vehicle_ids,
            sync_skipped,
        })
    }

    /// Cards attached to each line of an invoice, lines without cards included.
    #[instrument(skip(self))]
    pub async fn list_cards(&self, invoice_id: Uuid) -> Result<Vec<LineWarrantyCards>, ServiceError> {
        let invoice = invoice::Entity::find_by_id(invoice_id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Invoice {} not found", invoice_id)))?;
        Ok(invoice
            .items
            .0
            .into_iter()
            .enumerate()
            .map(|(item_index, item)| LineWarrantyCards {
                item_index,
                part_id: item.part.as_ref().map(|part| part.canonical_id()),
                name: item.name,
                cards: item.warranty_cards,
            })
            .collect())
    }

    /// Ids of the customer's vehicles that were part of the invoice and have
    /// selected the product.
    async fn matching_vehicles(
        &self,
        invoice: &invoice::Model,
        product_id: Uuid,
    ) -> Result<Vec<Uuid>, ServiceError> {
        let keys = selection_keys(&product_id.to_string());
        let vehicles = vehicle::Entity::find()
            .filter(vehicle::Column::CustomerId.eq(invoice.customer_id))
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        Ok(vehicles
            .into_iter()
            .filter(|v| {
                invoice.vehicle_details.contains_vehicle(v.id)
                    || v.registration_number == invoice.vehicle_number
            })
            .filter(|v| keys.iter().any(|key| v.selected_parts.contains(key)))
            .map(|v| v.id)
            .collect())
    }

    async fn publish(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event).await;
        }
    }
}
