use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::serde_ids;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(deserialize_with = "serde_ids::id")]
    pub id: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub name: String,
}
super::impl_entity!(Category, categories);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewCategory {
    pub name: String,
}

/// A sellable plan or service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(deserialize_with = "serde_ids::id")]
    pub id: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub name: String,
    #[serde(default, alias = "category_id", deserialize_with = "serde_ids::text")]
    pub category_id: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub price: Decimal,
    #[serde(default, alias = "monthly_goal")]
    pub monthly_goal: Option<Decimal>,
}
super::impl_entity!(Product, products);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewProduct {
    pub name: String,
    pub category_id: String,
    pub price: Decimal,
    pub monthly_goal: Option<Decimal>,
}
