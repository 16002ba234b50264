use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{entity::prelude::*, ActiveValue::Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stocked part sold by the shop.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub brand: Option<String>,
    pub selling_price_cents: i64,
    pub stock: i32,
    /// Free text such as "6 months" or "24 months manufacturer warranty"
    pub warranty: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

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

/// Identity of a part after prefix normalization: a stocked product or a static catalog entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "source", content = "id", rename_all = "snake_case")]
pub enum PartRef {
    Persisted(Uuid),
    Catalog(String),
}

impl PartRef {
    /// Identifier as stored in selections and warranty records.
    pub fn canonical_id(&self) -> String {
        match self {
            PartRef::Persisted(id) => id.to_string(),
            PartRef::Catalog(id) => id.clone(),
        }
    }

    pub fn persisted_id(&self) -> Option<Uuid> {
        match self {
            PartRef::Persisted(id) => Some(*id),
            PartRef::Catalog(_) => None,
        }
    }
}
