use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{entity::prelude::*, ActiveValue::Set, FromJsonQueryResult};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Phase of a service visit.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VisitStatus {
    #[sea_orm(string_value = "inquired")]
    Inquired,
    #[sea_orm(string_value = "working")]
    Working,
    #[sea_orm(string_value = "waiting")]
    Waiting,
    #[sea_orm(string_value = "completed")]
    Completed,
}

/// When each phase was last entered. Entries are only ever added or refreshed.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema,
)]
pub struct StageTimestamps {
    pub inquired: Option<DateTime<Utc>>,
    pub working: Option<DateTime<Utc>>,
    pub waiting: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
}

impl StageTimestamps {
    pub fn stamp(&mut self, status: VisitStatus, at: DateTime<Utc>) {
        match status {
            VisitStatus::Inquired => self.inquired = Some(at),
            VisitStatus::Working => self.working = Some(at),
            VisitStatus::Waiting => self.waiting = Some(at),
            VisitStatus::Completed => self.completed = Some(at),
        }
    }

    pub fn get(&self, status: VisitStatus) -> Option<DateTime<Utc>> {
        match status {
            VisitStatus::Inquired => self.inquired,
            VisitStatus::Working => self.working,
            VisitStatus::Waiting => self.waiting,
            VisitStatus::Completed => self.completed,
        }
    }
}

/// Employee references assigned to the visit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct Handlers(pub Vec<String>);

/// Stored image references (media URLs), in capture order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct ImageRefs(pub Vec<String>);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PartUsage {
    pub part_id: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct PartsUsed(pub Vec<PartUsage>);

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "service_visits")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub customer_id: Uuid,
    /// Registration number of the serviced vehicle, not a foreign key
    pub vehicle_number: String,
    pub status: VisitStatus,
    pub complaint: Option<String>,
    pub notes: Option<String>,
    #[sea_orm(column_type = "Json")]
    pub handlers: Handlers,
    #[sea_orm(column_type = "Json")]
    pub before_images: ImageRefs,
    #[sea_orm(column_type = "Json")]
    pub after_images: ImageRefs,
    #[sea_orm(column_type = "Json")]
    pub parts_used: PartsUsed,
    #[sea_orm(column_type = "Json")]
    pub stage_timestamps: StageTimestamps,
    pub version: i32,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);

        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn stamping_keeps_earlier_phases() {
        let mut stamps = StageTimestamps::default();
        let first = Utc::now();
        stamps.stamp(VisitStatus::Working, first);
        stamps.stamp(VisitStatus::Inquired, first);
        let later = first + chrono::Duration::minutes(5);
        stamps.stamp(VisitStatus::Working, later);

        assert_eq!(stamps.get(VisitStatus::Working), Some(later));
        assert_eq!(stamps.get(VisitStatus::Inquired), Some(first));
        assert_eq!(stamps.get(VisitStatus::Completed), None);
    }

    #[test]
    fn status_round_trips_through_text() {
        assert_eq!(VisitStatus::Completed.to_string(), "completed");
        assert_eq!(VisitStatus::from_str("waiting").unwrap(), VisitStatus::Waiting);
        assert!(VisitStatus::from_str("archived").is_err());
    }
}
