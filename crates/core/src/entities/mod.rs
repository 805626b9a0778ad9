//! Business entities held by the [`EntityStore`](crate::store::EntityStore).

mod accounts;
mod catalog;
mod finance;
mod pipeline;
mod sales;
pub(crate) mod serde_ids;

pub use accounts::*;
pub use catalog::*;
pub use finance::*;
pub use pipeline::*;
pub use sales::*;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::store::CrmSnapshot;

/// The eleven entity collections of the CRM dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Salesperson,
    Category,
    Product,
    Client,
    BillingAccount,
    Subscriber,
    PipelineStatus,
    PipelineNote,
    Income,
    Expense,
    Goal,
}

impl EntityKind {
    pub const ALL: [EntityKind; 11] = [
        EntityKind::Salesperson,
        EntityKind::Category,
        EntityKind::Product,
        EntityKind::Client,
        EntityKind::BillingAccount,
        EntityKind::Subscriber,
        EntityKind::PipelineStatus,
        EntityKind::PipelineNote,
        EntityKind::Income,
        EntityKind::Expense,
        EntityKind::Goal,
    ];

    /// Type tag used by the broadcast server and the snapshot payload.
    pub fn wire_name(self) -> &'static str {
        match self {
            EntityKind::Salesperson => "salespeople",
            EntityKind::Category => "categories",
            EntityKind::Product => "products",
            EntityKind::Client => "clients",
            EntityKind::BillingAccount => "bans",
            EntityKind::Subscriber => "subscribers",
            EntityKind::PipelineStatus => "pipelineStatuses",
            EntityKind::PipelineNote => "pipelineNotes",
            EntityKind::Income => "incomes",
            EntityKind::Expense => "expenses",
            EntityKind::Goal => "metas",
        }
    }

    /// Parses a broadcast type tag. Accepts the snake_case table names too.
    pub fn from_wire_name(name: &str) -> Option<Self> {
        let kind = match name.trim() {
            "salespeople" => EntityKind::Salesperson,
            "categories" => EntityKind::Category,
            "products" => EntityKind::Product,
            "clients" | "clientes" => EntityKind::Client,
            "bans" => EntityKind::BillingAccount,
            "subscribers" => EntityKind::Subscriber,
            "pipelineStatuses" | "pipeline_statuses" => EntityKind::PipelineStatus,
            "pipelineNotes" | "pipeline_notes" => EntityKind::PipelineNote,
            "incomes" => EntityKind::Income,
            "expenses" => EntityKind::Expense,
            "metas" | "goals" => EntityKind::Goal,
            _ => return None,
        };
        Some(kind)
    }

    /// REST collection path for server-backed kinds.
    pub fn api_path(self) -> Option<&'static str> {
        match self {
            EntityKind::Salesperson => Some("/salespeople"),
            EntityKind::Category => Some("/categories"),
            EntityKind::Product => Some("/products"),
            EntityKind::Client => Some("/clients"),
            EntityKind::BillingAccount => Some("/bans"),
            EntityKind::Subscriber => Some("/subscribers"),
            EntityKind::Income => Some("/incomes"),
            EntityKind::Expense => Some("/expenses"),
            EntityKind::Goal => Some("/metas"),
            EntityKind::PipelineStatus | EntityKind::PipelineNote => None,
        }
    }

    /// Whether mutations of this kind round-trip through the server.
    ///
    /// Session-scoped kinds only live in the local store and do not survive a
    /// reload.
    pub fn is_server_backed(self) -> bool {
        self.api_path().is_some()
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Kinds that are kept only for the current session.
pub fn session_scoped_kinds() -> Vec<EntityKind> {
    EntityKind::ALL
        .into_iter()
        .filter(|kind| !kind.is_server_backed())
        .collect()
}

/// A record type stored in one of the snapshot collections.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &str;

    /// Server-assigned modification timestamp, when the server stamps this kind.
    fn version(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn collection(snapshot: &CrmSnapshot) -> &Vec<Self>;

    fn collection_mut(snapshot: &mut CrmSnapshot) -> &mut Vec<Self>;

    fn into_record(self) -> EntityRecord;

    /// Fills fields the server does not persist from `other` where `self`
    /// leaves them unset. Returns whether anything was filled.
    fn keep_local_fields(&mut self, _other: &Self) -> bool {
        false
    }
}

/// Copies `source` into `target` when `target` is unset.
pub(crate) fn keep_unset<V: Clone + Default + PartialEq>(target: &mut V, source: &V) -> bool {
    let unset = V::default();
    if *target != unset || *source == unset {
        return false;
    }
    target.clone_from(source);
    true
}

/// One typed record of any entity kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "record", rename_all = "camelCase")]
pub enum EntityRecord {
    Salesperson(Salesperson),
    Category(Category),
    Product(Product),
    Client(Client),
    BillingAccount(BillingAccount),
    Subscriber(Subscriber),
    PipelineStatus(PipelineStatus),
    PipelineNote(PipelineNote),
    Income(Income),
    Expense(Expense),
    Goal(Goal),
}

/// Expands `$body` once per variant with `$record` bound to the inner value.
macro_rules! with_record {
    ($value:expr, $record:ident => $body:expr) => {
        match $value {
            EntityRecord::Salesperson($record) => $body,
            EntityRecord::Category($record) => $body,
            EntityRecord::Product($record) => $body,
            EntityRecord::Client($record) => $body,
            EntityRecord::BillingAccount($record) => $body,
            EntityRecord::Subscriber($record) => $body,
            EntityRecord::PipelineStatus($record) => $body,
            EntityRecord::PipelineNote($record) => $body,
            EntityRecord::Income($record) => $body,
            EntityRecord::Expense($record) => $body,
            EntityRecord::Goal($record) => $body,
        }
    };
}
pub(crate) use with_record;

impl EntityRecord {
    pub fn kind(&self) -> EntityKind {
        with_record!(self, record => entity_kind_of(record))
    }

    pub fn id(&self) -> &str {
        with_record!(self, record => record.id())
    }

    pub fn version(&self) -> Option<DateTime<Utc>> {
        with_record!(self, record => record.version())
    }

    /// Decodes a JSON record of the given kind.
    pub fn from_value(kind: EntityKind, value: serde_json::Value) -> serde_json::Result<Self> {
        let record = match kind {
            EntityKind::Salesperson => EntityRecord::Salesperson(serde_json::from_value(value)?),
            EntityKind::Category => EntityRecord::Category(serde_json::from_value(value)?),
            EntityKind::Product => EntityRecord::Product(serde_json::from_value(value)?),
            EntityKind::Client => EntityRecord::Client(serde_json::from_value(value)?),
            EntityKind::BillingAccount => {
                EntityRecord::BillingAccount(serde_json::from_value(value)?)
            }
            EntityKind::Subscriber => EntityRecord::Subscriber(serde_json::from_value(value)?),
            EntityKind::PipelineStatus => {
                EntityRecord::PipelineStatus(serde_json::from_value(value)?)
            }
            EntityKind::PipelineNote => EntityRecord::PipelineNote(serde_json::from_value(value)?),
            EntityKind::Income => EntityRecord::Income(serde_json::from_value(value)?),
            EntityKind::Expense => EntityRecord::Expense(serde_json::from_value(value)?),
            EntityKind::Goal => EntityRecord::Goal(serde_json::from_value(value)?),
        };
        Ok(record)
    }
}

fn entity_kind_of<T: Entity>(_: &T) -> EntityKind {
    T::KIND
}

/// Implements [`Entity`] for a record type stored in `$field` of the snapshot.
macro_rules! impl_entity {
    ($ty:ident, $field:ident $(, keep_local = $keep:ident)?) => {
        impl $crate::entities::Entity for $ty {
            const KIND: $crate::entities::EntityKind = $crate::entities::EntityKind::$ty;

            fn id(&self) -> &str {
                &self.id
            }

            fn collection(snapshot: &$crate::store::CrmSnapshot) -> &Vec<Self> {
                &snapshot.$field
            }

            fn collection_mut(snapshot: &mut $crate::store::CrmSnapshot) -> &mut Vec<Self> {
                &mut snapshot.$field
            }

            fn into_record(self) -> $crate::entities::EntityRecord {
                $crate::entities::EntityRecord::$ty(self)
            }

            $(
                fn keep_local_fields(&mut self, other: &Self) -> bool {
                    $keep(self, other)
                }
            )?
        }
    };
    ($ty:ident, $field:ident, version = $version:ident $(, keep_local = $keep:ident)?) => {
        impl $crate::entities::Entity for $ty {
            const KIND: $crate::entities::EntityKind = $crate::entities::EntityKind::$ty;

            fn id(&self) -> &str {
                &self.id
            }

            fn version(&self) -> Option<chrono::DateTime<chrono::Utc>> {
                self.$version
            }

            fn collection(snapshot: &$crate::store::CrmSnapshot) -> &Vec<Self> {
                &snapshot.$field
            }

            fn collection_mut(snapshot: &mut $crate::store::CrmSnapshot) -> &mut Vec<Self> {
                &mut snapshot.$field
            }

            fn into_record(self) -> $crate::entities::EntityRecord {
                $crate::entities::EntityRecord::$ty(self)
            }

            $(
                fn keep_local_fields(&mut self, other: &Self) -> bool {
                    $keep(self, other)
                }
            )?
        }
    };
}
pub(crate) use impl_entity;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_wire_name(kind.wire_name()), Some(kind));
        }
        assert_eq!(
            EntityKind::from_wire_name("pipeline_statuses"),
            Some(EntityKind::PipelineStatus)
        );
        assert_eq!(EntityKind::from_wire_name("widgets"), None);
    }

    #[test]
    fn pipeline_kinds_are_session_scoped() {
        assert_eq!(
            session_scoped_kinds(),
            vec![EntityKind::PipelineStatus, EntityKind::PipelineNote]
        );
        assert!(EntityKind::BillingAccount.is_server_backed());
        assert!(EntityKind::Category.is_server_backed());
    }

    #[test]
    fn record_decodes_snake_case_rows() {
        let record = EntityRecord::from_value(
            EntityKind::BillingAccount,
            serde_json::json!({
                "id": 17,
                "client_id": "c1",
                "number": "618093419",
                "status": "activo",
                "last_updated": "2026-01-01T00:00:00.000Z"
            }),
        )
        .expect("decode ban");

        assert_eq!(record.kind(), EntityKind::BillingAccount);
        assert_eq!(record.id(), "17");
        assert!(record.version().is_some());
    }
}
