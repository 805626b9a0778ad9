//! Typed change events flowing into the reconciler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::entities::serde_ids::opt_timestamp;
use crate::entities::{EntityKind, EntityRecord};

/// Mutation verbs carried by broadcasts and store notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
}

impl ChangeAction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "created" => Some(ChangeAction::Created),
            "updated" => Some(ChangeAction::Updated),
            "deleted" => Some(ChangeAction::Deleted),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeAction::Created => "created",
            ChangeAction::Updated => "updated",
            ChangeAction::Deleted => "deleted",
        }
    }
}

/// Where a change came from. Only used for logging; both apply the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyContext {
    LocalMutation,
    RemoteBroadcast,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Created(EntityRecord),
    Updated(EntityRecord),
    Deleted(EntityKind, String),
}

impl Change {
    pub fn kind(&self) -> EntityKind {
        match self {
            Change::Created(record) | Change::Updated(record) => record.kind(),
            Change::Deleted(kind, _) => *kind,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Change::Created(record) | Change::Updated(record) => record.id(),
            Change::Deleted(_, id) => id,
        }
    }

    pub fn action(&self) -> ChangeAction {
        match self {
            Change::Created(_) => ChangeAction::Created,
            Change::Updated(_) => ChangeAction::Updated,
            Change::Deleted(..) => ChangeAction::Deleted,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub change: Change,
    /// Broadcast time, absent for local mutations.
    pub timestamp: Option<DateTime<Utc>>,
    pub context: ApplyContext,
}

impl ChangeEvent {
    pub fn local(change: Change) -> Self {
        Self {
            change,
            timestamp: None,
            context: ApplyContext::LocalMutation,
        }
    }

    pub fn remote(change: Change, timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            change,
            timestamp,
            context: ApplyContext::RemoteBroadcast,
        }
    }

    /// Version the store compares against.
    ///
    /// The record's own server timestamp wins; remote events fall back to the
    /// broadcast time.
    pub fn version(&self) -> Option<DateTime<Utc>> {
        let own = match &self.change {
            Change::Created(record) | Change::Updated(record) => record.version(),
            Change::Deleted(..) => None,
        };
        match self.context {
            ApplyContext::LocalMutation => own,
            ApplyContext::RemoteBroadcast => own.or(self.timestamp),
        }
    }
}

#[derive(Debug, Error)]
pub enum InvalidUpdate {
    #[error("unknown entity type '{0}'")]
    UnknownType(String),
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("{0} payload has no id")]
    MissingId(EntityKind),
    #[error("malformed {kind} record: {source}")]
    Record {
        kind: EntityKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Raw `data-update` payload as emitted by the broadcast server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireUpdate {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub action: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, deserialize_with = "opt_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl WireUpdate {
    /// Validates the payload into a typed remote event.
    pub fn into_event(self) -> Result<ChangeEvent, InvalidUpdate> {
        let kind = EntityKind::from_wire_name(&self.entity_type)
            .ok_or_else(|| InvalidUpdate::UnknownType(self.entity_type.clone()))?;
        let action = ChangeAction::parse(&self.action)
            .ok_or_else(|| InvalidUpdate::UnknownAction(self.action.clone()))?;

        let change = match action {
            ChangeAction::Deleted => {
                let id = payload_id(&self.data).ok_or(InvalidUpdate::MissingId(kind))?;
                Change::Deleted(kind, id)
            }
            ChangeAction::Created | ChangeAction::Updated => {
                if payload_id(&self.data).is_none() {
                    return Err(InvalidUpdate::MissingId(kind));
                }
                let record = EntityRecord::from_value(kind, self.data)
                    .map_err(|source| InvalidUpdate::Record { kind, source })?;
                if action == ChangeAction::Created {
                    Change::Created(record)
                } else {
                    Change::Updated(record)
                }
            }
        };
        Ok(ChangeEvent::remote(change, self.timestamp))
    }
}

/// Id of a broadcast payload: `{id}` or a bare id.
fn payload_id(data: &Value) -> Option<String> {
    let raw = match data {
        Value::Object(map) => map.get("id")?,
        other => other,
    };
    match raw {
        Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
