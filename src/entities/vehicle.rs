use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{entity::prelude::*, ActiveValue::Set, FromJsonQueryResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordered set of part identifiers picked for this vehicle.
///
/// Entries are catalog ids or persisted product ids, the latter sometimes carrying
/// the legacy `product-` prefix.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct SelectedParts(pub Vec<String>);

impl SelectedParts {
    pub fn contains(&self, entry: &str) -> bool {
        self.0.iter().any(|part| part == entry)
    }
}

/// Warranty card mirrored from an invoice upload, one per part.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleWarrantyCard {
    pub part_id: String,
    pub part_name: String,
    pub file_url: String,
    pub file_name: String,
    pub invoice_id: Uuid,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct WarrantyCards(pub Vec<VehicleWarrantyCard>);

impl WarrantyCards {
    /// Replaces the card for the same part, or appends when the part has none yet.
    pub fn upsert(&mut self, card: VehicleWarrantyCard) {
        match self.0.iter_mut().find(|existing| existing.part_id == card.part_id) {
            Some(existing) => *existing = card,
            None => self.0.push(card),
        }
    }

    pub fn for_part(&self, part_id: &str) -> Option<&VehicleWarrantyCard> {
        self.0.iter().find(|card| card.part_id == part_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vehicles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub customer_id: Uuid,
    pub registration_number: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    #[sea_orm(column_type = "Json")]
    pub selected_parts: SelectedParts,
    #[sea_orm(column_type = "Json")]
    pub warranty_cards: WarrantyCards,
    /// Bumped on every warranty-card write
    pub version: i32,
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
            if active_model.version.is_not_set() {
                active_model.version = Set(1);
            }
        }
        active_model.updated_at = Set(now);

        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(part_id: &str, file: &str) -> VehicleWarrantyCard {
        VehicleWarrantyCard {
            part_id: part_id.to_string(),
            part_name: "Brake Pads".to_string(),
            file_url: format!("/media/warranty-cards/{file}"),
            file_name: file.to_string(),
            invoice_id: Uuid::nil(),
            uploaded_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_replaces_card_for_same_part() {
        let mut cards = WarrantyCards::default();
        cards.upsert(card("p-1", "first.pdf"));
        cards.upsert(card("p-2", "other.pdf"));
        cards.upsert(card("p-1", "second.pdf"));

        assert_eq!(cards.0.len(), 2);
        assert_eq!(cards.for_part("p-1").unwrap().file_name, "second.pdf");
        assert_eq!(cards.0[0].part_id, "p-1");
    }
}
