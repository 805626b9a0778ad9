//! In-memory normalized store of every CRM entity.
//!
//! The store is the single owner of entity records. All mutation goes through
//! [`EntityStore::replace_all`] and the three apply operations, which are
//! total and idempotent by id. Readers receive clones.

mod snapshot;

pub use snapshot::{CrmSnapshot, CrmStats};

use chrono::{DateTime, Utc};
use log::debug;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

use crate::entities::{
    with_record, BillingAccount, Category, Client, Entity, EntityKind, EntityRecord, Expense,
    Goal, Income, PipelineNote, PipelineStatus, Product, Salesperson, Subscriber,
};
use crate::sync::ChangeAction;

const CHANGE_CHANNEL_CAPACITY: usize = 256;
/// Deleted ids remembered per store; the oldest are forgotten first.
pub const DEFAULT_TOMBSTONE_LIMIT: usize = 4096;

/// Runs `$body` with `$ty` aliased to the record type of `$kind`.
macro_rules! by_kind {
    ($kind:expr, $ty:ident => $body:expr) => {
        match $kind {
            EntityKind::Salesperson => {
                type $ty = Salesperson;
                $body
            }
            EntityKind::Category => {
                type $ty = Category;
                $body
            }
            EntityKind::Product => {
                type $ty = Product;
                $body
            }
            EntityKind::Client => {
                type $ty = Client;
                $body
            }
            EntityKind::BillingAccount => {
                type $ty = BillingAccount;
                $body
            }
            EntityKind::Subscriber => {
                type $ty = Subscriber;
                $body
            }
            EntityKind::PipelineStatus => {
                type $ty = PipelineStatus;
                $body
            }
            EntityKind::PipelineNote => {
                type $ty = PipelineNote;
                $body
            }
            EntityKind::Income => {
                type $ty = Income;
                $body
            }
            EntityKind::Expense => {
                type $ty = Expense;
                $body
            }
            EntityKind::Goal => {
                type $ty = Goal;
                $body
            }
        }
    };
}

/// What an apply operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Create for an id that is already stored.
    AlreadyPresent,
    /// Update or delete for an id that is not stored.
    NotFound,
    /// Update carrying a version older than the stored one.
    Stale,
    /// Create for an id that was deleted earlier.
    Tombstoned,
}

impl ApplyOutcome {
    pub fn is_applied(self) -> bool {
        self == ApplyOutcome::Applied
    }
}

/// Notification published for every store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// The whole dataset was replaced.
    Reloaded,
    Record {
        kind: EntityKind,
        action: ChangeAction,
        id: String,
    },
}

impl StoreChange {
    fn record(kind: EntityKind, action: ChangeAction, id: impl Into<String>) -> Self {
        StoreChange::Record {
            kind,
            action,
            id: id.into(),
        }
    }
}

type RecordKey = (EntityKind, String);

#[derive(Debug, Default)]
struct StoreState {
    data: CrmSnapshot,
    versions: HashMap<RecordKey, DateTime<Utc>>,
    tombstones: HashSet<RecordKey>,
    tombstone_order: VecDeque<RecordKey>,
}

impl StoreState {
    fn with_snapshot(data: CrmSnapshot) -> Self {
        let mut versions = HashMap::new();
        for kind in EntityKind::ALL {
            by_kind!(kind, T => seed_versions::<T>(&data, &mut versions));
        }
        Self {
            data,
            versions,
            ..Self::default()
        }
    }

    fn bump_version(&mut self, kind: EntityKind, id: &str, version: DateTime<Utc>) {
        let slot = self
            .versions
            .entry((kind, id.to_string()))
            .or_insert(version);
        if version > *slot {
            *slot = version;
        }
    }

    fn forget(&mut self, kind: EntityKind, id: &str, limit: usize) {
        let key = (kind, id.to_string());
        self.versions.remove(&key);
        if self.tombstones.insert(key.clone()) {
            self.tombstone_order.push_back(key);
        }
        while self.tombstone_order.len() > limit {
            if let Some(oldest) = self.tombstone_order.pop_front() {
                self.tombstones.remove(&oldest);
            }
        }
    }
}

fn seed_versions<T: Entity>(
    data: &CrmSnapshot,
    versions: &mut HashMap<RecordKey, DateTime<Utc>>,
) {
    for record in T::collection(data) {
        if let Some(version) = record.version() {
            versions.insert((T::KIND, record.id().to_string()), version);
        }
    }
}

/// Result of offering a created record to its collection.
enum Insertion {
    Inserted,
    /// The id was present; it took local-only fields from the offered record.
    Filled,
    Present,
}

fn insert_or_fill<T: Entity>(data: &mut CrmSnapshot, record: T) -> Insertion {
    let list = T::collection_mut(data);
    match list.iter().position(|existing| existing.id() == record.id()) {
        Some(index) if list[index].keep_local_fields(&record) => Insertion::Filled,
        Some(_) => Insertion::Present,
        None => {
            list.push(record);
            Insertion::Inserted
        }
    }
}

fn replace_existing<T: Entity>(data: &mut CrmSnapshot, mut record: T) -> bool {
    match T::collection_mut(data)
        .iter_mut()
        .find(|existing| existing.id() == record.id())
    {
        Some(slot) => {
            record.keep_local_fields(slot);
            *slot = record;
            true
        }
        None => false,
    }
}

fn remove_by_id<T: Entity>(data: &mut CrmSnapshot, id: &str) -> bool {
    let list = T::collection_mut(data);
    let before = list.len();
    list.retain(|existing| existing.id() != id);
    list.len() != before
}

fn contains_id<T: Entity>(data: &CrmSnapshot, id: &str) -> bool {
    T::collection(data).iter().any(|existing| existing.id() == id)
}

/// Shared, observable store of the CRM dataset.
pub struct EntityStore {
    state: RwLock<StoreState>,
    changes: broadcast::Sender<StoreChange>,
    tombstone_limit: usize,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("records", &self.read_state().data.total_records())
            .finish()
    }
}

impl EntityStore {
    pub fn new() -> Self {
        Self::with_tombstone_limit(DEFAULT_TOMBSTONE_LIMIT)
    }

    /// Store that remembers at most `limit` deleted ids.
    pub fn with_tombstone_limit(limit: usize) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(StoreState::default()),
            changes,
            tombstone_limit: limit,
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, changes: Vec<StoreChange>) {
        for change in changes {
            // No subscribers is fine.
            let _ = self.changes.send(change);
        }
    }

    /// Subscribes to store mutations.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// Installs a full dataset and drops tombstones. Versions restart from
    /// the stamps carried by the snapshot records.
    pub fn replace_all(&self, snapshot: CrmSnapshot) {
        let total = snapshot.total_records();
        {
            let mut state = self.write_state();
            *state = StoreState::with_snapshot(snapshot);
        }
        debug!("[Store] Dataset replaced ({} records)", total);
        self.publish(vec![StoreChange::Reloaded]);
    }

    /// Inserts `record` unless its id is already present or was deleted.
    ///
    /// A stored record with the same id only takes the local-only fields it
    /// is missing from `record`.
    pub fn apply_create(
        &self,
        record: EntityRecord,
        version: Option<DateTime<Utc>>,
    ) -> ApplyOutcome {
        let kind = record.kind();
        let id = record.id().to_string();
        let insertion = {
            let mut state = self.write_state();
            if state.tombstones.contains(&(kind, id.clone())) {
                return ApplyOutcome::Tombstoned;
            }
            let insertion = with_record!(record, r => insert_or_fill(&mut state.data, r));
            if let (Insertion::Inserted, Some(version)) = (&insertion, version) {
                state.bump_version(kind, &id, version);
            }
            insertion
        };
        match insertion {
            Insertion::Inserted => {
                self.publish(vec![StoreChange::record(kind, ChangeAction::Created, id)]);
                ApplyOutcome::Applied
            }
            Insertion::Filled => {
                debug!("[Store] {} '{}' took local fields from a late create", kind, id);
                self.publish(vec![StoreChange::record(kind, ChangeAction::Updated, id)]);
                ApplyOutcome::AlreadyPresent
            }
            Insertion::Present => ApplyOutcome::AlreadyPresent,
        }
    }

    /// Replaces the stored record with the same id, keeping the stored
    /// local-only fields that `record` leaves unset.
    ///
    /// A version older than the newest one already applied for this id is
    /// rejected. Unversioned updates always apply.
    pub fn apply_update(
        &self,
        record: EntityRecord,
        version: Option<DateTime<Utc>>,
    ) -> ApplyOutcome {
        let kind = record.kind();
        let id = record.id().to_string();
        {
            let mut state = self.write_state();
            if let Some(incoming) = version {
                if let Some(current) = state.versions.get(&(kind, id.clone())) {
                    if incoming < *current {
                        return ApplyOutcome::Stale;
                    }
                }
            }
            let replaced = with_record!(record, r => replace_existing(&mut state.data, r));
            if !replaced {
                return ApplyOutcome::NotFound;
            }
            if let Some(version) = version {
                state.bump_version(kind, &id, version);
            }
        }
        self.publish(vec![StoreChange::record(kind, ChangeAction::Updated, id)]);
        ApplyOutcome::Applied
    }

    /// Removes the record with `id` and cascades to dependent records.
    ///
    /// The id is tombstoned either way so a late create echo cannot bring it
    /// back.
    pub fn apply_delete(&self, kind: EntityKind, id: &str) -> ApplyOutcome {
        let changes = {
            let mut state = self.write_state();
            let removed = by_kind!(kind, T => remove_by_id::<T>(&mut state.data, id));
            state.forget(kind, id, self.tombstone_limit);
            if !removed {
                return ApplyOutcome::NotFound;
            }
            let mut changes = vec![StoreChange::record(kind, ChangeAction::Deleted, id)];
            cascade_delete(&mut state, kind, id, self.tombstone_limit, &mut changes);
            changes
        };
        self.publish(changes);
        ApplyOutcome::Applied
    }

    pub fn get<T: Entity>(&self, id: &str) -> Option<T> {
        T::collection(&self.read_state().data)
            .iter()
            .find(|record| record.id() == id)
            .cloned()
    }

    pub fn list<T: Entity>(&self) -> Vec<T> {
        T::collection(&self.read_state().data).clone()
    }

    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        let state = self.read_state();
        by_kind!(kind, T => contains_id::<T>(&state.data, id))
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        let state = self.read_state();
        by_kind!(kind, T => T::collection(&state.data).len())
    }

    pub fn is_empty(&self) -> bool {
        self.read_state().data.total_records() == 0
    }

    /// Runs `f` against the current dataset without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&CrmSnapshot) -> R) -> R {
        f(&self.read_state().data)
    }

    pub fn snapshot(&self) -> CrmSnapshot {
        self.read_state().data.clone()
    }

    pub fn stats(&self) -> CrmStats {
        self.read_state().data.stats()
    }

    /// Newest version applied for a record, if the server stamps its kind.
    pub fn version_of(&self, kind: EntityKind, id: &str) -> Option<DateTime<Utc>> {
        self.read_state()
            .versions
            .get(&(kind, id.to_string()))
            .copied()
    }
}

fn cascade_delete(
    state: &mut StoreState,
    kind: EntityKind,
    id: &str,
    limit: usize,
    changes: &mut Vec<StoreChange>,
) {
    match kind {
        EntityKind::Client => {
            let ban_ids: Vec<String> = state
                .data
                .billing_accounts
                .iter()
                .filter(|ban| ban.client_id == id)
                .map(|ban| ban.id.clone())
                .collect();
            for ban_id in ban_ids {
                remove_by_id::<BillingAccount>(&mut state.data, &ban_id);
                state.forget(EntityKind::BillingAccount, &ban_id, limit);
                changes.push(StoreChange::record(
                    EntityKind::BillingAccount,
                    ChangeAction::Deleted,
                    ban_id.as_str(),
                ));
                cascade_delete(state, EntityKind::BillingAccount, &ban_id, limit, changes);
            }

            let note_ids: Vec<String> = state
                .data
                .pipeline_notes
                .iter()
                .filter(|note| note.client_id == id)
                .map(|note| note.id.clone())
                .collect();
            state.data.pipeline_notes.retain(|note| note.client_id != id);
            for note_id in note_ids {
                state.forget(EntityKind::PipelineNote, &note_id, limit);
                changes.push(StoreChange::record(
                    EntityKind::PipelineNote,
                    ChangeAction::Deleted,
                    note_id,
                ));
            }
        }
        EntityKind::BillingAccount => {
            let subscriber_ids: Vec<String> = state
                .data
                .subscribers
                .iter()
                .filter(|sub| sub.ban_id == id)
                .map(|sub| sub.id.clone())
                .collect();
            state.data.subscribers.retain(|sub| sub.ban_id != id);
            for sub_id in subscriber_ids {
                state.forget(EntityKind::Subscriber, &sub_id, limit);
                changes.push(StoreChange::record(
                    EntityKind::Subscriber,
                    ChangeAction::Deleted,
                    sub_id,
                ));
            }
        }
        EntityKind::Salesperson => {
            for client in state
                .data
                .clients
                .iter_mut()
                .filter(|client| client.salesperson_id.as_deref() == Some(id))
            {
                client.salesperson_id = None;
                changes.push(StoreChange::record(
                    EntityKind::Client,
                    ChangeAction::Updated,
                    client.id.as_str(),
                ));
            }
        }
        EntityKind::PipelineStatus => {
            for client in state
                .data
                .clients
                .iter_mut()
                .filter(|client| client.pipeline_status_id.as_deref() == Some(id))
            {
                client.pipeline_status_id = None;
                changes.push(StoreChange::record(
                    EntityKind::Client,
                    ChangeAction::Updated,
                    client.id.as_str(),
                ));
            }
        }
        _ => {}
    }
}
