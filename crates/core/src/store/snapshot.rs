use serde::{Deserialize, Serialize};

use crate::entities::serde_ids::null_as_default;
use crate::entities::{
    BillingAccount, Category, Client, Expense, Goal, Income, PipelineNote, PipelineStatus,
    Product, Salesperson, Subscriber,
};

/// The full CRM dataset, as returned by `GET /crm-data`.
///
/// Missing or `null` collections decode as empty lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmSnapshot {
    #[serde(default, deserialize_with = "null_as_default")]
    pub salespeople: Vec<Salesperson>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub categories: Vec<Category>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub products: Vec<Product>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub clients: Vec<Client>,
    #[serde(rename = "bans", default, deserialize_with = "null_as_default")]
    pub billing_accounts: Vec<BillingAccount>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subscribers: Vec<Subscriber>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pipeline_statuses: Vec<PipelineStatus>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pipeline_notes: Vec<PipelineNote>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub incomes: Vec<Income>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub expenses: Vec<Expense>,
    #[serde(rename = "metas", default, deserialize_with = "null_as_default")]
    pub goals: Vec<Goal>,
}

/// Dashboard counters derived from the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmStats {
    pub total_clients: usize,
    pub total_products: usize,
    pub total_salespeople: usize,
    pub active_billing_accounts: usize,
}

impl CrmSnapshot {
    pub fn stats(&self) -> CrmStats {
        CrmStats {
            total_clients: self.clients.len(),
            total_products: self.products.len(),
            total_salespeople: self.salespeople.len(),
            active_billing_accounts: self
                .billing_accounts
                .iter()
                .filter(|ban| ban.is_active())
                .count(),
        }
    }

    pub fn total_records(&self) -> usize {
        self.salespeople.len()
            + self.categories.len()
            + self.products.len()
            + self.clients.len()
            + self.billing_accounts.len()
            + self.subscribers.len()
            + self.pipeline_statuses.len()
            + self.pipeline_notes.len()
            + self.incomes.len()
            + self.expenses.len()
            + self.goals.len()
    }
}
