use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::serde_ids;

/// A sales funnel stage. Session-scoped: the server has no endpoint for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    #[serde(deserialize_with = "serde_ids::id")]
    pub id: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub color: String,
}
super::impl_entity!(PipelineStatus, pipeline_statuses);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewPipelineStatus {
    pub name: String,
    pub color: String,
}

/// Append-only note on a client, written by a salesperson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineNote {
    #[serde(deserialize_with = "serde_ids::id")]
    pub id: String,
    #[serde(default, alias = "client_id", deserialize_with = "serde_ids::text")]
    pub client_id: String,
    #[serde(default, alias = "author_id", deserialize_with = "serde_ids::text")]
    pub author_id: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub text: String,
    #[serde(alias = "created_at")]
    pub created_at: DateTime<Utc>,
}
super::impl_entity!(PipelineNote, pipeline_notes);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewPipelineNote {
    pub client_id: String,
    pub author_id: String,
    pub text: String,
}
