//! Mutation commands: one per entity kind and operation.
//!
//! Server-backed kinds are validated locally, sent through the
//! [`CrmGateway`], and applied to the store through the reconciler only after
//! the server confirmed them. Session-scoped kinds are applied to the store
//! directly with a locally generated id.

mod validation;
mod wire;

pub use validation::{BAN_NUMBER_DIGITS, PHONE_NUMBER_DIGITS};

use chrono::Utc;
use log::{debug, info, warn};
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;

use crate::entities::{
    BillingAccount, Category, Client, Entity, EntityKind, Expense, Goal, GoalUpdate, Income,
    NewBillingAccount, NewCategory, NewClient, NewExpense, NewGoal, NewIncome,
    NewPipelineNote, NewPipelineStatus, NewProduct, NewSalesperson, NewSubscriber,
    PipelineNote, PipelineStatus, PipelineValues, Product, Salesperson, Subscriber,
    SubscriberStatus, DEFAULT_CLIENT_GROUP,
};
use crate::errors::{Error, Result};
use crate::gateway::{CrmGateway, HttpMethod};
use crate::store::{ApplyOutcome, CrmSnapshot, CrmStats, EntityStore};
use crate::sync::{Change, ChangeEvent, SyncReconciler};

const SNAPSHOT_PATH: &str = "/crm-data";
const LOCAL_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const LOCAL_ID_SUFFIX_LEN: usize = 9;

/// Id for session-scoped records: `<unix millis>-<9 base36 chars>`.
///
/// Unique enough within one session; not collision-safe across machines.
pub fn local_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..LOCAL_ID_SUFFIX_LEN)
        .map(|_| LOCAL_ID_ALPHABET[rng.gen_range(0..LOCAL_ID_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}", Utc::now().timestamp_millis(), suffix)
}

fn collection_path(kind: EntityKind) -> Result<&'static str> {
    kind.api_path()
        .ok_or_else(|| Error::validation(format!("{} are not stored on the server", kind)))
}

/// Decodes a server row. Acknowledgments without an id yield `None`.
fn decode_record<T: Entity>(response: Value) -> Option<T> {
    let has_id = response
        .get("id")
        .map(|id| !id.is_null())
        .unwrap_or(false);
    if !has_id {
        return None;
    }
    match serde_json::from_value(response) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!("[Commands] Undecodable {} row: {}", T::KIND, err);
            None
        }
    }
}

fn keep<T>(_: &mut T) {}

fn fill_missing(target: &mut Option<String>, source: &Option<String>) {
    if target.is_none() {
        target.clone_from(source);
    }
}

fn fill_empty(target: &mut String, source: &str) {
    if target.is_empty() {
        *target = source.to_string();
    }
}

/// Entry point for every mutation of the CRM dataset.
#[derive(Clone)]
pub struct CrmCommands {
    gateway: Arc<dyn CrmGateway>,
    reconciler: SyncReconciler,
}

impl std::fmt::Debug for CrmCommands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmCommands")
            .field("store", self.reconciler.store())
            .finish()
    }
}

impl CrmCommands {
    pub fn new(gateway: Arc<dyn CrmGateway>, reconciler: SyncReconciler) -> Self {
        Self {
            gateway,
            reconciler,
        }
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        self.reconciler.store()
    }

    pub fn reconciler(&self) -> &SyncReconciler {
        &self.reconciler
    }

    /// Fetches the full dataset and installs it.
    pub async fn load_snapshot(&self) -> Result<CrmStats> {
        let response = self
            .send(None, "load", SNAPSHOT_PATH.to_string(), HttpMethod::Get, None)
            .await?;
        let snapshot: CrmSnapshot = serde_json::from_value(response)
            .map_err(|err| Error::malformed_response(format!("Unreadable snapshot: {}", err)))?;
        let total = snapshot.total_records();
        self.store().replace_all(snapshot);
        info!("[Commands] Snapshot loaded ({} records)", total);
        Ok(self.store().stats())
    }

    pub fn stats(&self) -> CrmStats {
        self.store().stats()
    }

    // ── Plumbing ────────────────────────────────────────────────────────────

    async fn send(
        &self,
        kind: Option<EntityKind>,
        operation: &str,
        path: String,
        method: HttpMethod,
        body: Option<Value>,
    ) -> Result<Value> {
        debug!(
            "[Commands] {} {} via {} {}",
            operation,
            kind.map(|k| k.wire_name()).unwrap_or("dataset"),
            method,
            path
        );
        self.gateway.call(&path, method, body).await
    }

    async fn create_remote<T: Entity>(
        &self,
        body: Value,
        fill: impl FnOnce(&mut T),
    ) -> Result<T> {
        let path = collection_path(T::KIND)?.to_string();
        let response = self
            .send(Some(T::KIND), "create", path, HttpMethod::Post, Some(body))
            .await?;
        let mut record: T = decode_record(response).ok_or_else(|| {
            Error::malformed_response(format!("create {} response carried no record id", T::KIND))
        })?;
        fill(&mut record);
        let outcome = self.reconciler.apply(ChangeEvent::local(Change::Created(
            record.clone().into_record(),
        )));
        Ok(self.settled("create", record, outcome))
    }

    /// Sends an update; applies the server's row, or `submitted` when the
    /// response is only an acknowledgment.
    ///
    /// Local-only fields the server row lacks are taken from `submitted`.
    async fn update_remote<T: Entity>(&self, submitted: T, body: Value) -> Result<T> {
        let path = format!("{}/{}", collection_path(T::KIND)?, submitted.id());
        let response = self
            .send(Some(T::KIND), "update", path, HttpMethod::Put, Some(body))
            .await?;
        let record = match decode_record::<T>(response) {
            Some(mut confirmed) if confirmed.id() == submitted.id() => {
                confirmed.keep_local_fields(&submitted);
                confirmed
            }
            _ => submitted,
        };
        let outcome = self.reconciler.apply(ChangeEvent::local(Change::Updated(
            record.clone().into_record(),
        )));
        Ok(self.settled("update", record, outcome))
    }

    /// The record as the store holds it after applying `record`.
    ///
    /// Differs from `record` when a broadcast got there first or a newer
    /// version is already stored; a tombstoned record is returned as sent.
    fn settled<T: Entity>(&self, operation: &str, record: T, outcome: ApplyOutcome) -> T {
        if !outcome.is_applied() {
            debug!(
                "[Commands] {} {} '{}' settled as {:?}",
                operation,
                T::KIND,
                record.id(),
                outcome
            );
        }
        self.store().get::<T>(record.id()).unwrap_or(record)
    }

    async fn delete_remote(&self, kind: EntityKind, id: &str) -> Result<()> {
        let path = format!("{}/{}", collection_path(kind)?, id);
        self.send(Some(kind), "delete", path, HttpMethod::Delete, None)
            .await?;
        self.reconciler
            .apply(ChangeEvent::local(Change::Deleted(kind, id.to_string())));
        Ok(())
    }

    fn existing<T: Entity>(&self, id: &str) -> Result<T> {
        self.store()
            .get::<T>(id)
            .ok_or_else(|| Error::validation(format!("Unknown {} record '{}'", T::KIND, id)))
    }

    // ── Salespeople ─────────────────────────────────────────────────────────

    pub async fn create_salesperson(&self, input: NewSalesperson) -> Result<Salesperson> {
        validation::required(&input.name, "Name")?;
        validation::required(&input.email, "Email")?;
        if let Some(goal) = input.monthly_sales_goal {
            validation::non_negative(goal, "Monthly sales goal")?;
        }
        self.create_remote(wire::new_salesperson(&input), |record: &mut Salesperson| {
            fill_missing(&mut record.avatar, &input.avatar);
            if record.monthly_sales_goal.is_none() {
                record.monthly_sales_goal = input.monthly_sales_goal;
            }
        })
        .await
    }

    pub async fn update_salesperson(&self, record: Salesperson) -> Result<Salesperson> {
        validation::required(&record.name, "Name")?;
        validation::required(&record.email, "Email")?;
        let body = wire::salesperson(&record);
        self.update_remote(record, body).await
    }

    /// Clients owned by the salesperson keep existing without an owner.
    pub async fn delete_salesperson(&self, id: &str) -> Result<()> {
        self.delete_remote(EntityKind::Salesperson, id).await
    }

    // ── Catalog ─────────────────────────────────────────────────────────────

    pub async fn create_category(&self, input: NewCategory) -> Result<Category> {
        validation::required(&input.name, "Name")?;
        self.create_remote(wire::new_category(&input), keep).await
    }

    pub async fn update_category(&self, record: Category) -> Result<Category> {
        validation::required(&record.name, "Name")?;
        let body = wire::category(&record);
        self.update_remote(record, body).await
    }

    /// Refused while any product still belongs to the category.
    pub async fn delete_category(&self, id: &str) -> Result<()> {
        let in_use = self
            .store()
            .read(|data| data.products.iter().any(|p| p.category_id == id));
        if in_use {
            return Err(Error::validation(
                "Cannot delete a category that still has products",
            ));
        }
        self.delete_remote(EntityKind::Category, id).await
    }

    pub async fn create_product(&self, input: NewProduct) -> Result<Product> {
        validation::required(&input.name, "Name")?;
        validation::required(&input.category_id, "Category")?;
        validation::non_negative(input.price, "Price")?;
        self.create_remote(wire::new_product(&input), |record: &mut Product| {
            fill_empty(&mut record.category_id, &input.category_id);
        })
        .await
    }

    pub async fn update_product(&self, record: Product) -> Result<Product> {
        validation::required(&record.name, "Name")?;
        validation::non_negative(record.price, "Price")?;
        let body = wire::product(&record);
        self.update_remote(record, body).await
    }

    pub async fn delete_product(&self, id: &str) -> Result<()> {
        self.delete_remote(EntityKind::Product, id).await
    }

    // ── Clients ─────────────────────────────────────────────────────────────

    pub async fn create_client(&self, input: NewClient) -> Result<Client> {
        validation::required(&input.name, "Name")?;
        self.create_remote(wire::new_client(&input), |record: &mut Client| {
            fill_missing(&mut record.salesperson_id, &input.salesperson_id);
            fill_missing(&mut record.pipeline_status_id, &input.pipeline_status_id);
            fill_missing(&mut record.mobile, &input.mobile);
            fill_empty(
                &mut record.group,
                input.group.as_deref().unwrap_or(DEFAULT_CLIENT_GROUP),
            );
            if record.pipeline_values == PipelineValues::default() {
                record.pipeline_values = input.pipeline_values.clone();
            }
        })
        .await
    }

    /// The server does not keep the client's grouping or pipeline amounts;
    /// those are carried over from the submitted record.
    pub async fn update_client(&self, record: Client) -> Result<Client> {
        validation::required(&record.name, "Name")?;
        let body = wire::client(&record);
        self.update_remote(record, body).await
    }

    /// Also removes the client's billing accounts, their subscribers and the
    /// client's pipeline notes from the store.
    pub async fn delete_client(&self, id: &str) -> Result<()> {
        self.delete_remote(EntityKind::Client, id).await
    }

    // ── Billing accounts ────────────────────────────────────────────────────

    pub async fn create_billing_account(
        &self,
        input: NewBillingAccount,
    ) -> Result<BillingAccount> {
        validation::required(&input.client_id, "Client")?;
        validation::ban_number(&input.number)?;
        self.store()
            .read(|data| validation::unique_ban(data, &input.number, None))?;
        self.create_remote(
            wire::new_billing_account(&input),
            |record: &mut BillingAccount| {
                fill_empty(&mut record.client_id, &input.client_id);
                fill_empty(&mut record.number, &input.number);
            },
        )
        .await
    }

    pub async fn update_billing_account(&self, record: BillingAccount) -> Result<BillingAccount> {
        validation::ban_number(&record.number)?;
        if record.is_active() {
            self.store()
                .read(|data| validation::unique_ban(data, &record.number, Some(&record.id)))?;
        }
        let body = wire::billing_account(&record);
        self.update_remote(record, body).await
    }

    /// Also removes the account's subscribers from the store.
    pub async fn delete_billing_account(&self, id: &str) -> Result<()> {
        self.delete_remote(EntityKind::BillingAccount, id).await
    }

    // ── Subscribers ─────────────────────────────────────────────────────────

    pub async fn create_subscriber(&self, input: NewSubscriber) -> Result<Subscriber> {
        validation::required(&input.ban_id, "BAN")?;
        validation::phone_number(&input.phone_number)?;
        self.store()
            .read(|data| validation::unique_phone(data, &input.phone_number, None))?;
        self.create_remote(wire::new_subscriber(&input), |record: &mut Subscriber| {
            fill_empty(&mut record.ban_id, &input.ban_id);
            fill_missing(&mut record.product_id, &input.product_id);
            fill_missing(&mut record.category_id, &input.category_id);
            fill_missing(&mut record.contract_end_date, &input.contract_end_date);
            fill_missing(&mut record.equipment, &input.equipment);
            fill_missing(&mut record.city, &input.city);
        })
        .await
    }

    pub async fn update_subscriber(&self, record: Subscriber) -> Result<Subscriber> {
        validation::phone_number(&record.phone_number)?;
        self.store().read(|data| {
            validation::unique_phone(data, &record.phone_number, Some(&record.id))
        })?;
        let body = wire::subscriber(&record);
        self.update_remote(record, body).await
    }

    pub async fn delete_subscriber(&self, id: &str) -> Result<()> {
        self.delete_remote(EntityKind::Subscriber, id).await
    }

    /// Marks the line as cancelled; the record stays in the dataset.
    pub async fn cancel_subscriber(&self, id: &str) -> Result<Subscriber> {
        let mut record: Subscriber = self.existing(id)?;
        record.status = SubscriberStatus::Cancelled;
        self.update_subscriber(record).await
    }

    // ── Pipeline (session-scoped) ───────────────────────────────────────────

    pub fn create_pipeline_status(&self, input: NewPipelineStatus) -> Result<PipelineStatus> {
        validation::required(&input.name, "Name")?;
        let record = PipelineStatus {
            id: local_id(),
            name: input.name,
            color: input.color,
        };
        self.store()
            .apply_create(record.clone().into_record(), None);
        Ok(record)
    }

    pub fn update_pipeline_status(&self, record: PipelineStatus) -> Result<PipelineStatus> {
        validation::required(&record.name, "Name")?;
        match self
            .store()
            .apply_update(record.clone().into_record(), None)
        {
            ApplyOutcome::Applied => Ok(record),
            _ => Err(Error::validation(format!(
                "Unknown pipeline status '{}'",
                record.id
            ))),
        }
    }

    /// Clients in this stage are left without a stage.
    pub fn delete_pipeline_status(&self, id: &str) {
        self.store().apply_delete(EntityKind::PipelineStatus, id);
    }

    /// Notes are append-only; there is no update or delete.
    pub fn add_pipeline_note(&self, input: NewPipelineNote) -> Result<PipelineNote> {
        validation::required(&input.client_id, "Client")?;
        validation::required(&input.text, "Note")?;
        let record = PipelineNote {
            id: local_id(),
            client_id: input.client_id,
            author_id: input.author_id,
            text: input.text,
            created_at: Utc::now(),
        };
        self.store()
            .apply_create(record.clone().into_record(), None);
        Ok(record)
    }

    // ── Finance ─────────────────────────────────────────────────────────────

    pub async fn create_income(&self, input: NewIncome) -> Result<Income> {
        validation::non_negative(input.amount, "Amount")?;
        self.create_remote(wire::new_income(&input), |record: &mut Income| {
            fill_missing(&mut record.product_id, &input.product_id);
            fill_missing(&mut record.salesperson_id, &input.salesperson_id);
            fill_missing(&mut record.client_id, &input.client_id);
        })
        .await
    }

    pub async fn update_income(&self, record: Income) -> Result<Income> {
        validation::non_negative(record.amount, "Amount")?;
        let body = wire::income(&record);
        self.update_remote(record, body).await
    }

    pub async fn delete_income(&self, id: &str) -> Result<()> {
        self.delete_remote(EntityKind::Income, id).await
    }

    pub async fn create_expense(&self, input: NewExpense) -> Result<Expense> {
        validation::non_negative(input.amount, "Amount")?;
        self.create_remote(wire::new_expense(&input), |record: &mut Expense| {
            if record.category.is_none() {
                record.category = input.category;
            }
        })
        .await
    }

    pub async fn update_expense(&self, record: Expense) -> Result<Expense> {
        validation::non_negative(record.amount, "Amount")?;
        let body = wire::expense(&record);
        self.update_remote(record, body).await
    }

    pub async fn delete_expense(&self, id: &str) -> Result<()> {
        self.delete_remote(EntityKind::Expense, id).await
    }

    // ── Goals ───────────────────────────────────────────────────────────────

    pub async fn create_goal(&self, input: NewGoal) -> Result<Goal> {
        validation::non_negative(input.target_value, "Target value")?;
        validation::period_window(&input.start_date, &input.end_date)?;
        self.create_remote(wire::new_goal(&input), |record: &mut Goal| {
            fill_missing(&mut record.salesperson_id, &input.salesperson_id);
            fill_empty(&mut record.start_date, &input.start_date);
            fill_empty(&mut record.end_date, &input.end_date);
            fill_empty(&mut record.goal_type, &input.goal_type);
            if record.year.is_none() {
                record.year = input.year;
            }
            if record.month.is_none() {
                record.month = input.month;
            }
            if record.created_at.is_none() {
                record.created_at = Some(Utc::now().to_rfc3339());
            }
        })
        .await
    }

    /// Merges `changes` over the stored goal and sends the result.
    pub async fn update_goal(&self, id: &str, changes: GoalUpdate) -> Result<Goal> {
        let current: Goal = self.existing(id)?;
        let merged = changes.apply_to(&current);
        validation::non_negative(merged.target_value, "Target value")?;
        validation::period_window(&merged.start_date, &merged.end_date)?;
        let body = wire::goal(&merged);
        self.update_remote(merged, body).await
    }

    pub async fn delete_goal(&self, id: &str) -> Result<()> {
        self.delete_remote(EntityKind::Goal, id).await
    }
}

#[cfg(test)]
mod tests;
