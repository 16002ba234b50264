//! Part resolution across stocked products and the static catalog.
//!
//! Identifiers arrive from vehicles, visits and invoice lines in three shapes:
//! a product uuid, the same uuid behind the legacy `product-` prefix, or a catalog id.
//! [`normalize`] maps each shape onto a [`PartRef`] once; [`PartResolver`] then looks the
//! part up in the product table first and falls back to the catalog.

pub mod catalog;

use crate::{
    db::DbPool,
    entities::product::{self, PartRef},
    errors::ServiceError,
};
use metrics::counter;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, instrument};
use uuid::Uuid;

pub use catalog::CatalogPart;

/// Prefix some clients put in front of product ids.
pub const LEGACY_PREFIX: &str = "product-";

/// Strips the legacy prefix and classifies the identifier.
///
/// Anything that is not a well-formed product key is treated as a catalog id and keeps
/// its original spelling.
pub fn normalize(raw: &str) -> PartRef {
    let stripped = raw.strip_prefix(LEGACY_PREFIX).unwrap_or(raw);
    match Uuid::parse_str(stripped) {
        Ok(id) => PartRef::Persisted(id),
        Err(_) => PartRef::Catalog(raw.to_string()),
    }
}

/// Both spellings a vehicle's selection may use for a part.
pub fn selection_keys(part_id: &str) -> [String; 2] {
    [part_id.to_string(), format!("{}{}", LEGACY_PREFIX, part_id)]
}

/// Canonical view of a part, whichever store it came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedPart {
    /// Identifier exactly as the caller supplied it
    pub requested_id: String,
    pub part: PartRef,
    pub name: String,
    pub category: String,
    pub brand: Option<String>,
    pub price_cents: i64,
    pub warranty: Option<String>,
    /// `None` for catalog parts, which carry no stock
    pub stock: Option<i32>,
}

impl ResolvedPart {
    fn from_product(requested_id: &str, product: &product::Model) -> Self {
        Self {
            requested_id: requested_id.to_string(),
            part: PartRef::Persisted(product.id),
            name: product.name.clone(),
            category: product.category.clone(),
            brand: product.brand.clone(),
            price_cents: product.selling_price_cents,
            warranty: product.warranty.clone(),
            stock: Some(product.stock),
        }
    }

    fn from_catalog(requested_id: &str, entry: &CatalogPart) -> Self {
        Self {
            requested_id: requested_id.to_string(),
            part: PartRef::Catalog(entry.id.to_string()),
            name: entry.name.to_string(),
            category: entry.category.to_string(),
            brand: None,
            price_cents: entry.price_cents,
            warranty: None,
            stock: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PartResolution {
    pub resolved: Vec<ResolvedPart>,
    pub not_found: Vec<String>,
}

impl PartResolution {
    pub fn get(&self, requested_id: &str) -> Option<&ResolvedPart> {
        self.resolved
            .iter()
            .find(|part| part.requested_id == requested_id)
    }
}

/// Read-only lookup over products and the catalog.
#[derive(Clone)]
pub struct PartResolver {
    db_pool: Arc<DbPool>,
}

impl PartResolver {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Resolves a batch of identifiers; misses are reported, never raised.
    #[instrument(skip(self))]
    pub async fn resolve(&self, ids: &[String]) -> Result<PartResolution, ServiceError> {
        let normalized: Vec<(&String, PartRef)> =
            ids.iter().map(|raw| (raw, normalize(raw))).collect();

        let keys: Vec<Uuid> = normalized
            .iter()
            .filter_map(|(_, part)| part.persisted_id())
            .collect();
        let products = self.load_products(keys).await?;

        let mut resolution = PartResolution::default();
        for (raw, part) in normalized {
            let from_store = part
                .persisted_id()
                .and_then(|id| products.get(&id))
                .map(|product| ResolvedPart::from_product(raw, product));

            // catalog ids never carry the prefix, so the fallback uses the raw spelling
            match from_store.or_else(|| catalog::find(raw).map(|e| ResolvedPart::from_catalog(raw, e)))
            {
                Some(resolved) => resolution.resolved.push(resolved),
                None => resolution.not_found.push(raw.clone()),
            }
        }

        if !resolution.not_found.is_empty() {
            debug!(missing = ?resolution.not_found, "Unresolved part identifiers");
            counter!(
                "autoshop.parts.unresolved",
                resolution.not_found.len() as u64
            );
        }
        Ok(resolution)
    }

    async fn load_products(
        &self,
        keys: Vec<Uuid>,
    ) -> Result<HashMap<Uuid, product::Model>, ServiceError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = product::Entity::find()
            .filter(product::Column::Id.is_in(keys))
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        Ok(rows.into_iter().map(|row| (row.id, row)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const KEY: &str = "7f1c2a9e-4b7d-4c55-9a57-0d5c4f1b2e3a";

    #[rstest]
    #[case(KEY, PartRef::Persisted(Uuid::parse_str(KEY).unwrap()))]
    #[case("product-7f1c2a9e-4b7d-4c55-9a57-0d5c4f1b2e3a", PartRef::Persisted(Uuid::parse_str(KEY).unwrap()))]
    #[case("brake-pads-front", PartRef::Catalog("brake-pads-front".into()))]
    #[case("product-not-a-key", PartRef::Catalog("product-not-a-key".into()))]
    #[case("", PartRef::Catalog(String::new()))]
    fn normalize_classifies_identifiers(#[case] raw: &str, #[case] expected: PartRef) {
        assert_eq!(normalize(raw), expected);
    }

    #[test]
    fn selection_keys_cover_both_spellings() {
        assert_eq!(
            selection_keys("abc"),
            ["abc".to_string(), "product-abc".to_string()]
        );
    }
}
