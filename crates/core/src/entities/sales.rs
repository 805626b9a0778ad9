use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{keep_unset, serde_ids};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalespersonRole {
    #[serde(rename = "admin")]
    Admin,
    #[default]
    #[serde(rename = "vendedor", alias = "seller")]
    Seller,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Salesperson {
    #[serde(deserialize_with = "serde_ids::id")]
    pub id: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub email: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default, alias = "monthly_sales_goal")]
    pub monthly_sales_goal: Option<Decimal>,
    #[serde(default, alias = "rol", deserialize_with = "serde_ids::null_as_default")]
    pub role: SalespersonRole,
}
super::impl_entity!(Salesperson, salespeople, keep_local = keep_salesperson_fields);

fn keep_salesperson_fields(salesperson: &mut Salesperson, other: &Salesperson) -> bool {
    keep_unset(&mut salesperson.avatar, &other.avatar)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewSalesperson {
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub monthly_sales_goal: Option<Decimal>,
    pub role: SalespersonRole,
}

/// Who a goal is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalTarget<'a> {
    Salesperson(&'a str),
    Business,
}

/// A sales target ("meta") for one salesperson or the whole business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    #[serde(deserialize_with = "serde_ids::id")]
    pub id: String,
    /// `None` targets the whole business.
    #[serde(
        default,
        alias = "vendedorId",
        alias = "vendedor_id",
        deserialize_with = "serde_ids::opt_id"
    )]
    pub salesperson_id: Option<String>,
    #[serde(
        default,
        alias = "metaValor",
        alias = "meta_valor",
        deserialize_with = "serde_ids::null_as_default"
    )]
    pub target_value: Decimal,
    #[serde(default, alias = "periodo", deserialize_with = "serde_ids::null_as_default")]
    pub period: String,
    #[serde(
        default,
        alias = "fechaInicio",
        alias = "fecha_inicio",
        deserialize_with = "serde_ids::null_as_default"
    )]
    pub start_date: String,
    #[serde(
        default,
        alias = "fechaFin",
        alias = "fecha_fin",
        deserialize_with = "serde_ids::null_as_default"
    )]
    pub end_date: String,
    #[serde(
        default = "serde_ids::default_true",
        alias = "activa",
        deserialize_with = "serde_ids::bool_or_true"
    )]
    pub active: bool,
    #[serde(default, alias = "created_at")]
    pub created_at: Option<String>,
    #[serde(
        default,
        alias = "tipoMeta",
        alias = "tipo_meta",
        deserialize_with = "serde_ids::null_as_default"
    )]
    pub goal_type: String,
    #[serde(default, alias = "categoria")]
    pub category: Option<String>,
    #[serde(default, alias = "descripcion")]
    pub description: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub month: Option<u32>,
}
super::impl_entity!(Goal, goals, keep_local = keep_goal_fields);

/// Year and month are only kept client-side.
fn keep_goal_fields(goal: &mut Goal, other: &Goal) -> bool {
    keep_unset(&mut goal.year, &other.year) | keep_unset(&mut goal.month, &other.month)
}

impl Goal {
    pub fn target(&self) -> GoalTarget<'_> {
        match self.salesperson_id.as_deref() {
            Some(id) => GoalTarget::Salesperson(id),
            None => GoalTarget::Business,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewGoal {
    pub salesperson_id: Option<String>,
    pub target_value: Decimal,
    pub period: String,
    pub start_date: String,
    pub end_date: String,
    pub goal_type: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
}

/// Partial goal edit; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GoalUpdate {
    pub salesperson_id: Option<Option<String>>,
    pub target_value: Option<Decimal>,
    pub period: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub active: Option<bool>,
    pub goal_type: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
}

impl GoalUpdate {
    pub fn apply_to(&self, goal: &Goal) -> Goal {
        let mut merged = goal.clone();
        if let Some(salesperson_id) = &self.salesperson_id {
            merged.salesperson_id = salesperson_id.clone();
        }
        if let Some(value) = self.target_value {
            merged.target_value = value;
        }
        if let Some(period) = &self.period {
            merged.period = period.clone();
        }
        if let Some(start) = &self.start_date {
            merged.start_date = start.clone();
        }
        if let Some(end) = &self.end_date {
            merged.end_date = end.clone();
        }
        if let Some(active) = self.active {
            merged.active = active;
        }
        if let Some(goal_type) = &self.goal_type {
            merged.goal_type = goal_type.clone();
        }
        if let Some(category) = &self.category {
            merged.category = Some(category.clone());
        }
        if let Some(description) = &self.description {
            merged.description = Some(description.clone());
        }
        merged
    }
}
