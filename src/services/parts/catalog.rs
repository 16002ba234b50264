//! Predefined parts offered without a product record.

use serde::Serialize;
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct CatalogPart {
    pub id: &'static str,
    pub name: &'static str,
    pub category: &'static str,
    pub price_cents: i64,
}

const fn part(
    id: &'static str,
    name: &'static str,
    category: &'static str,
    price_cents: i64,
) -> CatalogPart {
    CatalogPart {
        id,
        name,
        category,
        price_cents,
    }
}

pub static CATALOG: &[CatalogPart] = &[
    part("engine-oil", "Engine Oil", "Lubricants", 120_000),
    part("oil-filter", "Oil Filter", "Filters", 35_000),
    part("air-filter", "Air Filter", "Filters", 45_000),
    part("cabin-filter", "Cabin Air Filter", "Filters", 55_000),
    part("fuel-filter", "Fuel Filter", "Filters", 60_000),
    part("brake-pads-front", "Front Brake Pads", "Brakes", 220_000),
    part("brake-pads-rear", "Rear Brake Pads", "Brakes", 180_000),
    part("brake-fluid", "Brake Fluid", "Brakes", 40_000),
    part("spark-plug", "Spark Plug", "Ignition", 25_000),
    part("battery", "Battery", "Electrical", 650_000),
    part("wiper-blades", "Wiper Blades", "Accessories", 30_000),
    part("coolant", "Coolant", "Lubricants", 50_000),
    part("clutch-plate", "Clutch Plate", "Transmission", 450_000),
    part("timing-belt", "Timing Belt", "Engine", 380_000),
    part("headlight-bulb", "Headlight Bulb", "Electrical", 20_000),
];

/// Looks up a catalog entry by its exact id.
pub fn find(id: &str) -> Option<&'static CatalogPart> {
    CATALOG.iter().find(|part| part.id == id)
}
