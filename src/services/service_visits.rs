//! Service visit phases and the rules for moving between them.
//!
//! Any phase may be entered from any other, regressions included. What a target phase
//! demands of the visit is listed in one table, [`preconditions`], and checked against
//! the visit as it would look once the whole patch is applied.

use crate::{
    auth::Actor,
    db::DbPool,
    entities::{
        customer,
        service_visit::{
            self, Handlers, ImageRefs, PartUsage, PartsUsed, StageTimestamps, VisitStatus,
        },
        vehicle,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        activity::{ActivityEntry, ActivityLogger},
        locks::KeyedLocks,
        media::{ImageInput, MediaStore},
        notifications::NotificationDispatcher,
        parts::{PartResolution, PartResolver},
    },
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use slog::Logger;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// A requirement a visit must meet before entering a phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precondition {
    HandlerAssigned,
    BeforeImage,
    AfterImage,
}

impl Precondition {
    fn holds(self, state: &VisitState<'_>) -> bool {
        match self {
            Precondition::HandlerAssigned => !state.handlers.is_empty(),
            Precondition::BeforeImage => !state.before_images.is_empty(),
            Precondition::AfterImage => !state.after_images.is_empty(),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Precondition::HandlerAssigned => "at least one handler must be assigned",
            Precondition::BeforeImage => "at least one before-service image is required",
            Precondition::AfterImage => "at least one after-service image is required",
        }
    }
}

/// Transition table: what entering `target` requires, whatever the current phase.
pub fn preconditions(target: VisitStatus) -> &'static [Precondition] {
    use Precondition::*;
    match target {
        VisitStatus::Inquired => &[],
        VisitStatus::Working | VisitStatus::Waiting => &[HandlerAssigned, BeforeImage],
        VisitStatus::Completed => &[HandlerAssigned, AfterImage],
    }
}

/// The parts of a visit the transition table looks at.
#[derive(Clone, Copy, Debug)]
pub struct VisitState<'a> {
    pub handlers: &'a [String],
    pub before_images: &'a [String],
    pub after_images: &'a [String],
}

/// Fails with every unmet precondition of `target`.
pub fn check_transition(target: VisitStatus, state: &VisitState<'_>) -> Result<(), ServiceError> {
    let unmet: Vec<&str> = preconditions(target)
        .iter()
        .filter(|rule| !rule.holds(state))
        .map(|rule| rule.describe())
        .collect();
    if unmet.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::ValidationError(format!(
            "cannot move visit to {}: {}",
            target,
            unmet.join("; ")
        )))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartUsageInput {
    pub part_id: String,
    pub quantity: i32,
    /// Overrides the resolved price when present
    pub unit_price_cents: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct NewServiceVisit {
    pub customer_id: Uuid,
    pub vehicle_number: String,
    pub status: Option<VisitStatus>,
    pub complaint: Option<String>,
    pub notes: Option<String>,
    pub handlers: Vec<String>,
    pub before_images: Vec<String>,
    pub after_images: Vec<String>,
    pub parts_used: Vec<PartUsageInput>,
}

/// Partial update; `None` leaves a field as it is.
#[derive(Clone, Debug, Default)]
pub struct ServiceVisitPatch {
    pub status: Option<VisitStatus>,
    pub handlers: Option<Vec<String>>,
    pub before_images: Option<Vec<String>>,
    pub after_images: Option<Vec<String>>,
    pub parts_used: Option<Vec<PartUsageInput>>,
    pub complaint: Option<String>,
    pub notes: Option<String>,
    /// Rejects the patch when the stored version differs
    pub expected_version: Option<i32>,
}

#[derive(Clone, Debug, Default)]
pub struct ServiceVisitFilter {
    pub customer_id: Option<Uuid>,
    pub status: Option<VisitStatus>,
    pub vehicle_number: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SuggestedParts {
    pub visit_id: Uuid,
    pub vehicle_id: Option<Uuid>,
    pub resolution: PartResolution,
}

#[derive(Clone)]
pub struct ServiceVisitService {
    db_pool: Arc<DbPool>,
    parts: PartResolver,
    media: MediaStore,
    notifier: Arc<dyn NotificationDispatcher>,
    activity: Arc<dyn ActivityLogger>,
    event_sender: Option<Arc<EventSender>>,
    locks: KeyedLocks,
    logger: Logger,
}

impl ServiceVisitService {
    pub fn new(
        db_pool: Arc<DbPool>,
        parts: PartResolver,
        media: MediaStore,
        notifier: Arc<dyn NotificationDispatcher>,
        activity: Arc<dyn ActivityLogger>,
        logger: Logger,
    ) -> Self {
        Self {
            db_pool,
            parts,
            media,
            notifier,
            activity,
            event_sender: None,
            locks: KeyedLocks::new(),
            logger,
        }
    }

    pub fn with_event_sender(mut self, event_sender: Arc<EventSender>) -> Self {
        self.event_sender = Some(event_sender);
        self
    }

    /// Opens a visit for a verified customer.
    #[instrument(skip(self, input), fields(customer_id = %input.customer_id))]
    pub async fn create(
        &self,
        actor: &Actor,
        input: NewServiceVisit,
    ) -> Result<service_visit::Model, ServiceError> {
        let db = self.db_pool.as_ref();
        let vehicle_number = input.vehicle_number.trim().to_string();
        if vehicle_number.is_empty() {
            return Err(ServiceError::ValidationError(
                "vehicle_number is required".to_string(),
            ));
        }

        let customer = self.load_customer(input.customer_id).await?;
        if !customer.is_verified {
            return Err(ServiceError::ValidationError(format!(
                "customer {} is not verified",
                customer.id
            )));
        }

        let before = self.media.parse_images(&input.before_images)?;
        let after = self.media.parse_images(&input.after_images)?;
        let handlers = clean_handlers(input.handlers);
        let status = input.status.unwrap_or(VisitStatus::Inquired);

        check_transition(
            status,
            &VisitState {
                handlers: &handlers,
                before_images: &input.before_images,
                after_images: &input.after_images,
            },
        )?;
        let parts_used = self.resolve_usage(input.parts_used).await?;

        let id = Uuid::new_v4();
        let folder = format!("visits/{}", id);
        let before_images = self.media.store_images(&folder, before).await?;
        let after_images = self.media.store_images(&folder, after).await?;

        let now = Utc::now();
        let mut stamps = StageTimestamps::default();
        stamps.stamp(status, now);

        let visit = service_visit::ActiveModel {
            id: Set(id),
            customer_id: Set(customer.id),
            vehicle_number: Set(vehicle_number),
            status: Set(status),
            complaint: Set(input.complaint),
            notes: Set(input.notes),
            handlers: Set(Handlers(handlers)),
            before_images: Set(ImageRefs(before_images)),
            after_images: Set(ImageRefs(after_images)),
            parts_used: Set(PartsUsed(parts_used)),
            stage_timestamps: Set(stamps),
            version: Set(1),
            created_by: Set(Some(actor.user_id.clone())),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(ServiceError::db_error)?;

        info!(visit_id = %visit.id, status = %visit.status, "Service visit created");
        counter!("autoshop.service_visits.created", 1);
        self.publish(Event::ServiceVisitCreated(visit.id)).await;
        self.activity
            .log_activity(ActivityEntry::new(
                actor,
                "create",
                "service_visit",
                visit.id,
                format!("Opened service visit for {}", visit.vehicle_number),
            ))
            .await;

        Ok(visit)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<service_visit::Model, ServiceError> {
        service_visit::Entity::find_by_id(id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Service visit {} not found", id)))
    }

    /// Newest first, paginated from page 1.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: ServiceVisitFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<service_visit::Model>, u64), ServiceError> {
        let db = self.db_pool.as_ref();
        let mut query = service_visit::Entity::find();
        if let Some(customer_id) = filter.customer_id {
            query = query.filter(service_visit::Column::CustomerId.eq(customer_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(service_visit::Column::Status.eq(status));
        }
        if let Some(vehicle_number) = filter.vehicle_number {
            query = query.filter(service_visit::Column::VehicleNumber.eq(vehicle_number));
        }

        let paginator = query
            .order_by_desc(service_visit::Column::CreatedAt)
            .paginate(db, limit.max(1));
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let visits = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((visits, total))
    }

    /// Applies a patch in one guarded write.
    ///
    /// Image uploads are validated before anything else; a status change is checked
    /// against the patched visit; the phase timestamp is stamped only when the status
    /// actually changes.
    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        actor: &Actor,
        id: Uuid,
        patch: ServiceVisitPatch,
    ) -> Result<service_visit::Model, ServiceError> {
        let before_uploads = patch
            .before_images
            .as_deref()
            .map(|images| self.media.parse_images(images))
            .transpose()?;
        let after_uploads = patch
            .after_images
            .as_deref()
            .map(|images| self.media.parse_images(images))
            .transpose()?;

        let guard = self.locks.acquire(id).await;
        let current = self.get(id).await?;
        if let Some(expected) = patch.expected_version {
            if expected != current.version {
                return Err(ServiceError::ConcurrentModification(id));
            }
        }

        let handlers = match patch.handlers {
            Some(handlers) => clean_handlers(handlers),
            None => current.handlers.0.clone(),
        };
        let before_view = patch
            .before_images
            .clone()
            .unwrap_or_else(|| current.before_images.0.clone());
        let after_view = patch
            .after_images
            .clone()
            .unwrap_or_else(|| current.after_images.0.clone());

        let status_change = patch.status.filter(|target| *target != current.status);
        if let Some(target) = status_change {
            check_transition(
                target,
                &VisitState {
                    handlers: &handlers,
                    before_images: &before_view,
                    after_images: &after_view,
                },
            )?;
        }

        let parts_used = match patch.parts_used {
            Some(inputs) => Some(self.resolve_usage(inputs).await?),
            None => None,
        };

        let folder = format!("visits/{}", id);
        let before_images = self.store_optional(&folder, before_uploads).await?;
        let after_images = self.store_optional(&folder, after_uploads).await?;

        let previous_status = current.status;
        let previous_version = current.version;
        let mut stamps = current.stage_timestamps.clone();
        let mut active: service_visit::ActiveModel = current.into();

        if let Some(target) = status_change {
            stamps.stamp(target, Utc::now());
            active.status = Set(target);
            active.stage_timestamps = Set(stamps);
        }
        active.handlers = Set(Handlers(handlers));
        if let Some(images) = before_images {
            active.before_images = Set(ImageRefs(images));
        }
        if let Some(images) = after_images {
            active.after_images = Set(ImageRefs(images));
        }
        if let Some(parts) = parts_used {
            active.parts_used = Set(PartsUsed(parts));
        }
        if let Some(complaint) = patch.complaint {
            active.complaint = Set(Some(complaint));
        }
        if let Some(notes) = patch.notes {
            active.notes = Set(Some(notes));
        }
        active.version = Set(previous_version + 1);
        active.updated_at = Set(Utc::now());

        let updated = service_visit::Entity::update(active)
            .filter(service_visit::Column::Version.eq(previous_version))
            .exec(self.db_pool.as_ref())
            .await
            .map_err(|e| ServiceError::from_guarded_update(e, id))?;
        drop(guard);

        if let Some(target) = status_change {
            info!(visit_id = %id, from = %previous_status, to = %target, "Service visit status changed");
            counter!("autoshop.service_visits.transitions", 1, "to" => target.to_string());
            self.publish(Event::ServiceVisitStatusChanged {
                visit_id: id,
                old_status: previous_status.to_string(),
                new_status: target.to_string(),
            })
            .await;
            self.notify_status(&updated).await;
        }

        self.activity
            .log_activity(
                ActivityEntry::new(
                    actor,
                    "update",
                    "service_visit",
                    id,
                    format!("Updated service visit for {}", updated.vehicle_number),
                )
                .with_details(serde_json::json!({
                    "status": updated.status,
                    "previous_status": previous_status,
                    "version": updated.version,
                })),
            )
            .await;

        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> Result<(), ServiceError> {
        let guard = self.locks.acquire(id).await;
        let result = service_visit::Entity::delete_by_id(id)
            .exec(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        drop(guard);

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Service visit {} not found",
                id
            )));
        }

        info!(visit_id = %id, "Service visit deleted");
        self.publish(Event::ServiceVisitDeleted(id)).await;
        self.activity
            .log_activity(ActivityEntry::new(
                actor,
                "delete",
                "service_visit",
                id,
                "Deleted service visit",
            ))
            .await;
        Ok(())
    }

    /// Resolves the parts selected on the serviced vehicle.
    #[instrument(skip(self))]
    pub async fn suggested_parts(&self, id: Uuid) -> Result<SuggestedParts, ServiceError> {
        let visit = self.get(id).await?;
        let vehicle = vehicle::Entity::find()
            .filter(vehicle::Column::CustomerId.eq(visit.customer_id))
            .filter(vehicle::Column::RegistrationNumber.eq(visit.vehicle_number.clone()))
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        let resolution = match &vehicle {
            Some(vehicle) => self.parts.resolve(&vehicle.selected_parts.0).await?,
            None => PartResolution::default(),
        };

        Ok(SuggestedParts {
            visit_id: visit.id,
            vehicle_id: vehicle.map(|v| v.id),
            resolution,
        })
    }

    async fn load_customer(&self, id: Uuid) -> Result<customer::Model, ServiceError> {
        customer::Entity::find_by_id(id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {} not found", id)))
    }

    async fn resolve_usage(
        &self,
        inputs: Vec<PartUsageInput>,
    ) -> Result<Vec<PartUsage>, ServiceError> {
        if let Some(bad) = inputs.iter().find(|input| input.quantity < 1) {
            return Err(ServiceError::ValidationError(format!(
                "quantity for part {} must be at least 1",
                bad.part_id
            )));
        }
        let ids: Vec<String> = inputs.iter().map(|input| input.part_id.clone()).collect();
        let resolution = self.parts.resolve(&ids).await?;
        if !resolution.not_found.is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "unknown parts: {}",
                resolution.not_found.join(", ")
            )));
        }

        inputs
            .into_iter()
            .map(|input| {
                let part = resolution.get(&input.part_id).ok_or_else(|| {
                    ServiceError::ValidationError(format!("unknown part {}", input.part_id))
                })?;
                Ok(PartUsage {
                    part_id: part.part.canonical_id(),
                    name: part.name.clone(),
                    quantity: input.quantity,
                    unit_price_cents: input.unit_price_cents.unwrap_or(part.price_cents),
                })
            })
            .collect()
    }

    async fn store_optional(
        &self,
        folder: &str,
        images: Option<Vec<ImageInput>>,
    ) -> Result<Option<Vec<String>>, ServiceError> {
        match images {
            Some(images) => Ok(Some(self.media.store_images(folder, images).await?)),
            None => Ok(None),
        }
    }

    async fn notify_status(&self, visit: &service_visit::Model) {
        let customer_name = match self.load_customer(visit.customer_id).await {
            Ok(customer) => customer.name,
            Err(e) => {
                warn!(visit_id = %visit.id, error = %e, "Skipping status notification");
                return;
            }
        };
        if let Err(e) = self
            .notifier
            .notify_service_visit_status(visit, &customer_name, visit.status)
            .await
        {
            slog::warn!(self.logger, "Service visit status notification failed";
                "visit_id" => visit.id.to_string(),
                "status" => visit.status.to_string(),
                "error" => e.to_string());
        }
    }

    async fn publish(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event).await;
        }
    }
}

fn clean_handlers(handlers: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(handlers.len());
    for handler in handlers {
        let handler = handler.trim();
        if !handler.is_empty() && !cleaned.iter().any(|h| h == handler) {
            cleaned.push(handler.to_string());
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    fn strings(n: usize, prefix: &str) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}-{i}")).collect()
    }

    #[rstest]
    #[case(VisitStatus::Inquired, 0, 0, 0, true)]
    #[case(VisitStatus::Working, 1, 1, 0, true)]
    #[case(VisitStatus::Working, 0, 1, 0, false)]
    #[case(VisitStatus::Working, 1, 0, 0, false)]
    #[case(VisitStatus::Waiting, 1, 1, 0, true)]
    #[case(VisitStatus::Waiting, 0, 1, 1, false)]
    #[case(VisitStatus::Completed, 1, 0, 1, true)]
    #[case(VisitStatus::Completed, 1, 1, 0, false)]
    #[case(VisitStatus::Completed, 0, 1, 1, false)]
    fn transition_table(
        #[case] target: VisitStatus,
        #[case] handlers: usize,
        #[case] before: usize,
        #[case] after: usize,
        #[case] allowed: bool,
    ) {
        let handlers = strings(handlers, "emp");
        let before = strings(before, "before");
        let after = strings(after, "after");
        let state = VisitState {
            handlers: &handlers,
            before_images: &before,
            after_images: &after,
        };
        assert_eq!(check_transition(target, &state).is_ok(), allowed);
    }

    #[test]
    fn rejection_lists_every_unmet_rule() {
        let empty: Vec<String> = vec![];
        let state = VisitState {
            handlers: &empty,
            before_images: &empty,
            after_images: &empty,
        };
        assert_matches!(
            check_transition(VisitStatus::Completed, &state),
            Err(ServiceError::ValidationError(msg))
                if msg.contains("handler") && msg.contains("after-service")
        );
    }

    #[test]
    fn handlers_are_trimmed_and_deduplicated() {
        let cleaned = clean_handlers(vec![
            " emp-1 ".into(),
            "".into(),
            "emp-2".into(),
            "emp-1".into(),
        ]);
        assert_eq!(cleaned, vec!["emp-1".to_string(), "emp-2".to_string()]);
    }
}
