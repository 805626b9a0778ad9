use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::serde_ids;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Income {
    #[serde(deserialize_with = "serde_ids::id")]
    pub id: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub date: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub amount: Decimal,
    #[serde(default, alias = "product_id", deserialize_with = "serde_ids::opt_id")]
    pub product_id: Option<String>,
    #[serde(default, alias = "salesperson_id", deserialize_with = "serde_ids::opt_id")]
    pub salesperson_id: Option<String>,
    #[serde(default, alias = "client_id", deserialize_with = "serde_ids::opt_id")]
    pub client_id: Option<String>,
    #[serde(default, alias = "product_name")]
    pub product_name: Option<String>,
    #[serde(default, alias = "salesperson_name")]
    pub salesperson_name: Option<String>,
    #[serde(default, alias = "client_name")]
    pub client_name: Option<String>,
}
super::impl_entity!(Income, incomes);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewIncome {
    pub date: String,
    pub description: String,
    pub amount: Decimal,
    pub product_id: Option<String>,
    pub salesperson_id: Option<String>,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseCategory {
    #[serde(rename = "oficina")]
    Office,
    #[serde(rename = "transporte")]
    Transport,
    #[serde(rename = "marketing")]
    Marketing,
    #[serde(rename = "personal")]
    Staff,
    #[serde(rename = "equipamiento")]
    Equipment,
    #[serde(rename = "otros")]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    #[serde(deserialize_with = "serde_ids::id")]
    pub id: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub date: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub amount: Decimal,
    #[serde(default)]
    pub category: Option<ExpenseCategory>,
    #[serde(default, alias = "category_name")]
    pub category_name: Option<String>,
}
super::impl_entity!(Expense, expenses);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewExpense {
    pub date: String,
    pub description: String,
    pub amount: Decimal,
    pub category: Option<ExpenseCategory>,
}
